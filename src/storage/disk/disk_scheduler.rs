use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{BurrowError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// Owned page-size buffer shuttled between the scheduler and its callers.
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

enum DiskRequest {
    Read {
        page_id: PageId,
        reply: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

/// DiskScheduler funnels page I/O through a background worker thread.
/// Requests are queued on a channel and answered over per-request reply
/// channels, so callers observe synchronous reads and writes while the
/// file is touched by a single thread.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_tx: Sender<DiskRequest>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (request_tx, request_rx) = bounded::<DiskRequest>(64);
        let dm = Arc::clone(&disk_manager);

        let worker = thread::spawn(move || Self::run_worker(dm, request_rx));

        Self {
            disk_manager,
            request_tx,
            worker: Some(worker),
        }
    }

    /// Reads a page, blocking until the worker has filled a buffer.
    pub fn read_sync(&self, page_id: PageId) -> Result<PageBuf> {
        let (reply_tx, reply_rx) = bounded(1);
        self.submit(DiskRequest::Read {
            page_id,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|e| BurrowError::DiskScheduler(e.to_string()))?
    }

    /// Writes a page, blocking until the worker has completed the write.
    pub fn write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (reply_tx, reply_rx) = bounded(1);
        self.submit(DiskRequest::Write {
            page_id,
            data: buf,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|e| BurrowError::DiskScheduler(e.to_string()))?
    }

    fn submit(&self, request: DiskRequest) -> Result<()> {
        self.request_tx
            .send(request)
            .map_err(|e| BurrowError::DiskScheduler(format!("failed to queue request: {e}")))
    }

    fn run_worker(disk_manager: Arc<DiskManager>, requests: Receiver<DiskRequest>) {
        for request in requests.iter() {
            match request {
                DiskRequest::Read { page_id, reply } => {
                    let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                    let result = disk_manager.read_page(page_id, &mut buf[..]).map(|()| buf);
                    let _ = reply.send(result);
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    reply,
                } => {
                    let _ = reply.send(disk_manager.write_page(page_id, &data[..]));
                }
                DiskRequest::Shutdown => break,
            }
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        let _ = self.request_tx.send(DiskRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
