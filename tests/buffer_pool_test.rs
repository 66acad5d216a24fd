//! Integration tests for the buffer pool manager

use std::sync::Arc;
use std::thread;

use burrow::buffer::BufferPoolManager;
use burrow::common::{BurrowError, PageId};
use burrow::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, 2, dm);
    (bpm, temp_file)
}

#[test]
fn test_buffer_pool_basic_operations() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = {
        let mut guard = bpm.new_page().unwrap().upgrade_write();
        guard.data_mut()[0] = 0xDE;
        guard.data_mut()[1] = 0xAD;
        guard.data_mut()[2] = 0xBE;
        guard.data_mut()[3] = 0xEF;
        guard.page_id()
    };

    let guard = bpm.fetch_page_read(page_id).unwrap();
    assert_eq!(&guard.data()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

/// Scenario: fill a four-frame pool, re-access the first page, and check
/// that the next allocation victimizes one of the others, with the dirty
/// victim written back.
#[test]
fn test_buffer_pool_lru_k_eviction_choice() {
    let (bpm, _temp) = create_bpm(4);

    let page_ids: Vec<PageId> = (0..4)
        .map(|i| {
            let mut guard = bpm.new_page().unwrap().upgrade_write();
            guard.data_mut()[0] = (i + 1) as u8;
            guard.page_id()
        })
        .collect();

    // Read p1 back; its second access moves it off the young list.
    {
        let guard = bpm.fetch_page_read(page_ids[0]).unwrap();
        assert_eq!(guard.data()[0], 1);
    }

    let writes_before = bpm.disk_manager().num_writes();

    let p5 = bpm.new_page().unwrap().page_id();
    assert_eq!(p5, PageId::new(4));

    // p1 was just accessed, so the victim is one of p2..p4.
    assert!(
        bpm.pin_count(page_ids[0]).is_some(),
        "recently accessed page must stay resident"
    );
    let evicted: Vec<PageId> = page_ids[1..]
        .iter()
        .copied()
        .filter(|&page_id| bpm.pin_count(page_id).is_none())
        .collect();
    assert_eq!(evicted.len(), 1);

    // The victim was dirty, so eviction must have written it back...
    assert!(bpm.disk_manager().num_writes() > writes_before);

    // ...and its contents survive a re-fetch.
    let marker = (page_ids.iter().position(|&p| p == evicted[0]).unwrap() + 1) as u8;
    let guard = bpm.fetch_page_read(evicted[0]).unwrap();
    assert_eq!(guard.data()[0], marker);
}

#[test]
fn test_buffer_pool_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let test_data = b"Persistence test data";
    let page_id = {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        let page_id = {
            let mut guard = bpm.new_page().unwrap().upgrade_write();
            guard.data_mut()[..test_data.len()].copy_from_slice(test_data);
            guard.page_id()
        };

        bpm.flush_page(page_id).unwrap();
        page_id
    };

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(&guard.data()[..test_data.len()], test_data);
    }
}

#[test]
fn test_buffer_pool_eviction_write_back() {
    let (bpm, _temp) = create_bpm(3);

    let page_ids: Vec<PageId> = (0..3)
        .map(|i| {
            let mut guard = bpm.new_page().unwrap().upgrade_write();
            guard.data_mut()[0] = i as u8;
            guard.page_id()
        })
        .collect();

    for &page_id in &page_ids {
        assert_eq!(bpm.pin_count(page_id), Some(0));
    }

    // Creating a fourth page evicts one of the three.
    let new_page_id = bpm.new_page().unwrap().page_id();
    assert_eq!(new_page_id, PageId::new(3));

    // Every original page still reads back its marker, fetched from disk
    // where necessary.
    for (i, &page_id) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[0], i as u8);
    }
}

#[test]
fn test_buffer_pool_pin_prevents_eviction() {
    let (bpm, _temp) = create_bpm(2);

    let _guard1 = bpm.new_page().unwrap();
    let _guard2 = bpm.new_page().unwrap();

    let result = bpm.new_page();
    assert!(matches!(result, Err(BurrowError::PoolExhausted)));
}

#[test]
fn test_buffer_pool_unpin_contract() {
    let (bpm, _temp) = create_bpm(4);

    let page_id = bpm.new_page().unwrap().page_id();

    // The guard already unpinned the page; a second unpin fails.
    assert!(!bpm.unpin_page(page_id, false));
    // So does unpinning something that was never resident.
    assert!(!bpm.unpin_page(PageId::new(12345), false));

    // A pinned page unpins once per pin.
    let guard_a = bpm.fetch_page_read(page_id).unwrap();
    let guard_b = bpm.fetch_page_read(page_id).unwrap();
    assert_eq!(bpm.pin_count(page_id), Some(2));
    drop(guard_a);
    assert_eq!(bpm.pin_count(page_id), Some(1));
    drop(guard_b);
    assert_eq!(bpm.pin_count(page_id), Some(0));
}

#[test]
fn test_buffer_pool_delete_page() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = {
        let mut guard = bpm.new_page().unwrap().upgrade_write();
        guard.data_mut()[0] = 42;
        guard.page_id()
    };

    assert!(bpm.delete_page(page_id));
    assert_eq!(bpm.pin_count(page_id), None);

    // Deleting a page that is not resident reports success.
    assert!(bpm.delete_page(page_id));
}

#[test]
fn test_buffer_pool_cannot_delete_pinned_page() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = bpm.new_page().unwrap().page_id();
    let _guard = bpm.fetch_page_read(page_id).unwrap();

    assert!(!bpm.delete_page(page_id));
}

#[test]
fn test_buffer_pool_flush_all() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_ids = {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        let page_ids: Vec<PageId> = (0..5)
            .map(|i| {
                let mut guard = bpm.new_page().unwrap().upgrade_write();
                guard.data_mut()[0] = i as u8;
                guard.page_id()
            })
            .collect();

        bpm.flush_all_pages().unwrap();
        page_ids
    };

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        for (i, &page_id) in page_ids.iter().enumerate() {
            let guard = bpm.fetch_page_read(page_id).unwrap();
            assert_eq!(guard.data()[0], i as u8);
        }
    }
}

#[test]
fn test_buffer_pool_replacer_accounting() {
    let (bpm, _temp) = create_bpm(4);

    let guard_a = bpm.new_page().unwrap();
    let guard_b = bpm.new_page().unwrap();
    assert_eq!(bpm.evictable_frame_count(), 0);

    drop(guard_a);
    assert_eq!(bpm.evictable_frame_count(), 1);
    drop(guard_b);
    assert_eq!(bpm.evictable_frame_count(), 2);

    let _guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
    assert_eq!(bpm.evictable_frame_count(), 1);
}

#[test]
fn test_buffer_pool_frame_conservation() {
    let (bpm, _temp) = create_bpm(5);

    // Every allocation, eviction and deletion keeps
    // free + resident == pool_size.
    let page_ids: Vec<PageId> = (0..15)
        .map(|_| {
            let page_id = bpm.new_page().unwrap().page_id();
            assert_eq!(bpm.free_frame_count() + bpm.resident_page_count(), 5);
            page_id
        })
        .collect();

    for &page_id in page_ids.iter().take(5) {
        bpm.delete_page(page_id);
        assert_eq!(bpm.free_frame_count() + bpm.resident_page_count(), 5);
    }
}

#[test]
fn test_buffer_pool_concurrent_readers() {
    let (bpm, _temp) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let page_id = {
        let mut guard = bpm.new_page().unwrap().upgrade_write();
        guard.data_mut()[0] = 7;
        guard.page_id()
    };

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for _ in 0..100 {
                    let guard = bpm.fetch_page_read(page_id).unwrap();
                    assert_eq!(guard.data()[0], 7);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(bpm.pin_count(page_id), Some(0));
}

#[test]
fn test_buffer_pool_large_workload() {
    let (bpm, _temp) = create_bpm(5);

    let page_ids: Vec<PageId> = (0..20)
        .map(|_| bpm.new_page().unwrap().page_id())
        .collect();

    for &page_id in &page_ids {
        let mut guard = bpm.fetch_page_write(page_id).unwrap();
        let id_bytes = page_id.as_u32().to_le_bytes();
        guard.data_mut()[..4].copy_from_slice(&id_bytes);
    }

    for &page_id in &page_ids {
        let guard = bpm.fetch_page_read(page_id).unwrap();
        let id_bytes: [u8; 4] = guard.data()[..4].try_into().unwrap();
        assert_eq!(u32::from_le_bytes(id_bytes), page_id.as_u32());
    }
}
