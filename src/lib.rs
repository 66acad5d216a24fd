//! Burrow - the disk-oriented core of a single-node relational database.
//!
//! The crate implements the hot path every index operation travels: a
//! fixed-size buffer pool that caches disk pages in memory, an LRU-K
//! replacer that decides which cached page to give up when the pool is
//! full, and a B+ tree index whose pages are borrowed from the pool
//! through pinning guards.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): file-backed page I/O
//!   - `DiskManager`: reads and writes fixed-size pages by page id
//!   - `DiskScheduler`: background worker that serializes disk requests
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: page table, free list, pinning and eviction
//!   - `LruKReplacer`: LRU-K replacement policy over evictable frames
//!   - `Frame`: per-frame metadata plus the page bytes
//!   - `PageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII pin handles
//!
//! - **Index** (`index`): ordered access method
//!   - `BPlusTree`: search, insert, remove, range iteration
//!   - `IndexIterator`: leaf-chain cursor in key order
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use burrow::buffer::BufferPoolManager;
//! use burrow::index::{BPlusTree, GenericKey, UInt32Comparator};
//! use burrow::storage::disk::DiskManager;
//! use burrow::{PageId, RecordId};
//!
//! let disk_manager = Arc::new(DiskManager::new("index.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! // The tree stores its root pointer in a header page.
//! let header_page_id = {
//!     let guard = bpm.new_page().unwrap();
//!     guard.page_id()
//! };
//!
//! let tree: BPlusTree<4, _> =
//!     BPlusTree::new(header_page_id, Arc::clone(&bpm), UInt32Comparator, 32, 32).unwrap();
//!
//! tree.insert(&GenericKey::from_u32(42), RecordId::new(PageId::new(7), 0))
//!     .unwrap();
//! assert!(tree.get_value(&GenericKey::from_u32(42)).unwrap().is_some());
//! ```
//!
//! An operation that holds guards on `d` pages at once (tree depth plus
//! the header) needs `pool_size >= d + 1` frames; with fewer it fails
//! with [`BurrowError::PoolExhausted`].

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{BurrowError, PageId, RecordId, Result};
