use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, INVALID_PAGE_ID};

use super::btree_page::LeafPageRef;
use super::key_comparator::GenericKey;

/// Cursor over the leaf chain in ascending key order.
///
/// The iterator caches its current `(key, record)` entry and remembers
/// only `(page_id, index)`; it takes a read guard for the moment of each
/// step and never holds one across user code. Walking off the last entry
/// turns it into the end sentinel (`page_id == INVALID_PAGE_ID`).
pub struct IndexIterator<const N: usize> {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    index: usize,
    entry: Option<(GenericKey<N>, RecordId)>,
}

impl<const N: usize> IndexIterator<N> {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        page_id: PageId,
        index: usize,
        entry: Option<(GenericKey<N>, RecordId)>,
    ) -> Self {
        Self {
            bpm,
            page_id,
            index,
            entry,
        }
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            page_id: INVALID_PAGE_ID,
            index: 0,
            entry: None,
        }
    }

    /// The cached entry; None once the iterator is the end sentinel.
    pub fn entry(&self) -> Option<&(GenericKey<N>, RecordId)> {
        self.entry.as_ref()
    }

    /// True at the last entry of the last leaf (and on the end sentinel):
    /// there is nothing further to advance to.
    pub fn is_end(&self) -> Result<bool> {
        if self.page_id == INVALID_PAGE_ID {
            return Ok(true);
        }
        let guard = self.bpm.fetch_page_read(self.page_id)?;
        let leaf = LeafPageRef::<N>::new(guard.data());
        Ok(leaf.next_page_id() == INVALID_PAGE_ID && self.index == leaf.size() - 1)
    }

    /// Steps to the next entry, hopping leaves through `next_page_id` and
    /// degrading to the end sentinel past the last entry.
    pub fn advance(&mut self) -> Result<()> {
        if self.page_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let next_page_id = {
            let guard = self.bpm.fetch_page_read(self.page_id)?;
            let leaf = LeafPageRef::<N>::new(guard.data());

            if self.index + 1 < leaf.size() {
                self.index += 1;
                self.entry = Some((
                    GenericKey::from_slice(leaf.key_at(self.index)),
                    leaf.record_at(self.index),
                ));
                return Ok(());
            }
            leaf.next_page_id()
        };

        if next_page_id == INVALID_PAGE_ID {
            self.page_id = INVALID_PAGE_ID;
            self.index = 0;
            self.entry = None;
            return Ok(());
        }

        let guard = self.bpm.fetch_page_read(next_page_id)?;
        let leaf = LeafPageRef::<N>::new(guard.data());
        self.page_id = next_page_id;
        self.index = 0;
        self.entry = Some((GenericKey::from_slice(leaf.key_at(0)), leaf.record_at(0)));
        Ok(())
    }
}

impl<const N: usize> PartialEq for IndexIterator<N> {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.index == other.index
    }
}

impl<const N: usize> Eq for IndexIterator<N> {}
