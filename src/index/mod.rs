pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod key_comparator;

pub use btree_index::BPlusTree;
pub use btree_iterator::IndexIterator;
pub use btree_page::{
    btree_page_kind, BTreePageKind, HeaderPageMut, HeaderPageRef, InternalPageMut,
    InternalPageRef, LeafPageMut, LeafPageRef,
};
pub use key_comparator::{BytewiseComparator, GenericKey, KeyComparator, UInt32Comparator};
