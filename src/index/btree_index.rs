use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{PageId, RecordId, Result, INVALID_PAGE_ID};

use super::btree_iterator::IndexIterator;
use super::btree_page::{
    btree_page_kind, BTreePageKind, HeaderPageMut, HeaderPageRef, InternalPageMut,
    InternalPageRef, LeafPageMut, LeafPageRef,
};
use super::key_comparator::{GenericKey, KeyComparator};

/// Write-path state: the header guard (held for the whole mutation, which
/// serializes structural changes at the root), the root as of descent
/// start, the stack of write guards from root toward the leaf, and each
/// visited child's index within its parent for sibling lookups.
struct Context {
    header: WritePageGuard,
    root_page_id: PageId,
    write_set: Vec<WritePageGuard>,
    child_index: HashMap<PageId, usize>,
}

impl Context {
    fn is_root(&self, page_id: PageId) -> bool {
        page_id == self.root_page_id
    }
}

/// B+ tree index over fixed-size `N`-byte keys and `RecordId` values,
/// borrowing every page it touches from the buffer pool.
///
/// Reads descend with shared guards, taking each child before releasing
/// its parent. Mutations write-latch the header and the whole root-to-leaf
/// path, then split, merge or redistribute bottom-up through the guard
/// stack. Duplicate keys are rejected.
pub struct BPlusTree<const N: usize, C: KeyComparator> {
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl<const N: usize, C: KeyComparator> BPlusTree<N, C> {
    /// Creates a tree whose header lives at `header_page_id`, resetting it
    /// to the empty state.
    pub fn new(
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(leaf_max_size >= 2, "leaf_max_size must be at least 2");
        assert!(internal_max_size >= 3, "internal_max_size must be at least 3");

        {
            let mut guard = bpm.fetch_page_write(header_page_id)?;
            HeaderPageMut::new(guard.data_mut()).set_root_page_id(INVALID_PAGE_ID);
        }

        Ok(Self {
            header_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        })
    }

    /// Attaches to a tree previously persisted under `header_page_id`
    /// without touching its contents.
    pub fn open(
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        Self {
            header_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        }
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn root_page_id(&self) -> Result<PageId> {
        let guard = self.bpm.fetch_page_read(self.header_page_id)?;
        Ok(HeaderPageRef::new(guard.data()).root_page_id())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root_page_id()? == INVALID_PAGE_ID)
    }

    /// Point lookup.
    pub fn get_value(&self, key: &GenericKey<N>) -> Result<Option<RecordId>> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if root_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut guard = self.bpm.fetch_page_read(root_page_id)?;
        drop(header_guard);

        loop {
            match btree_page_kind(guard.data()) {
                BTreePageKind::Internal => {
                    let (_, child) = InternalPageRef::<N>::new(guard.data())
                        .find_child(key.as_bytes(), &self.comparator);
                    // Child guard is taken before the parent guard drops.
                    let child_guard = self.bpm.fetch_page_read(child)?;
                    guard = child_guard;
                }
                BTreePageKind::Leaf => {
                    let leaf = LeafPageRef::<N>::new(guard.data());
                    return Ok(leaf
                        .find(key.as_bytes(), &self.comparator)
                        .map(|(_, record)| record));
                }
            }
        }
    }

    /// Inserts a `(key, record)` pair; returns false when the key already
    /// exists and leaves the tree unchanged in that case.
    pub fn insert(&self, key: &GenericKey<N>, record: RecordId) -> Result<bool> {
        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();

        // Empty tree: the first leaf becomes the root.
        if root_page_id == INVALID_PAGE_ID {
            let mut root_guard = self.bpm.new_page()?.upgrade_write();
            let root_page_id = root_guard.page_id();
            let mut leaf = LeafPageMut::<N>::new(root_guard.data_mut());
            leaf.init(self.leaf_max_size);
            leaf.insert(key.as_bytes(), record, &self.comparator);
            HeaderPageMut::new(header_guard.data_mut()).set_root_page_id(root_page_id);
            return Ok(true);
        }

        let mut ctx = Context {
            header: header_guard,
            root_page_id,
            write_set: Vec::new(),
            child_index: HashMap::new(),
        };

        let mut guard = self.bpm.fetch_page_write(root_page_id)?;
        while btree_page_kind(guard.data()) == BTreePageKind::Internal {
            let (_, child) = InternalPageRef::<N>::new(guard.data())
                .find_child(key.as_bytes(), &self.comparator);
            ctx.write_set.push(guard);
            guard = self.bpm.fetch_page_write(child)?;
        }

        {
            let mut leaf = LeafPageMut::<N>::new(guard.data_mut());
            if leaf.size() < leaf.max_size() - 1 {
                return Ok(leaf.insert(key.as_bytes(), record, &self.comparator));
            }
            // The insert that fills the last slot triggers a split.
            if !leaf.insert(key.as_bytes(), record, &self.comparator) {
                return Ok(false);
            }
        }

        let mut new_guard = self.bpm.new_page()?.upgrade_write();
        let new_page_id = new_guard.page_id();
        let mut separator = [0u8; N];
        {
            let mut new_leaf = LeafPageMut::<N>::new(new_guard.data_mut());
            new_leaf.init(self.leaf_max_size);

            let mut old_leaf = LeafPageMut::<N>::new(guard.data_mut());
            let min_size = old_leaf.min_size();
            let cur_size = old_leaf.size();

            new_leaf.copy_entries_from(old_leaf.data(), min_size, cur_size);
            new_leaf.set_size(cur_size - min_size);
            old_leaf.set_size(min_size);

            new_leaf.set_next_page_id(old_leaf.next_page_id());
            old_leaf.set_next_page_id(new_page_id);

            separator.copy_from_slice(new_leaf.key_at(0));
        }

        ctx.write_set.push(guard);
        self.insert_in_parent(&mut ctx, separator, new_guard)?;
        Ok(true)
    }

    /// Links a freshly split-off right page into the tree: `key` is the
    /// separator pushed up, `right_guard` the new page, and the top of the
    /// context stack the page that was split.
    fn insert_in_parent(
        &self,
        ctx: &mut Context,
        key: [u8; N],
        right_guard: WritePageGuard,
    ) -> Result<()> {
        let cur_page_id = ctx.write_set.last().expect("split without context").page_id();
        let right_page_id = right_guard.page_id();

        // Splitting the root grows the tree by one level.
        if ctx.is_root(cur_page_id) {
            let mut new_root_guard = self.bpm.new_page()?.upgrade_write();
            let new_root_id = new_root_guard.page_id();
            {
                let mut root = InternalPageMut::<N>::new(new_root_guard.data_mut());
                root.init(self.internal_max_size);
                root.populate_root(cur_page_id, &key, right_page_id);
            }
            HeaderPageMut::new(ctx.header.data_mut()).set_root_page_id(new_root_id);
            ctx.root_page_id = new_root_id;
            ctx.write_set.pop();
            return Ok(());
        }

        // The split page is done with; its parent is next on the stack.
        ctx.write_set.pop();
        drop(right_guard);

        let parent_guard = ctx.write_set.last_mut().expect("missing parent guard");
        let (parent_size, parent_max) = {
            let parent = InternalPageRef::<N>::new(parent_guard.data());
            (parent.size(), parent.max_size())
        };

        if parent_size < parent_max {
            InternalPageMut::<N>::new(parent_guard.data_mut()).insert(
                &key,
                right_page_id,
                &self.comparator,
            );
            ctx.write_set.pop();
            return Ok(());
        }

        // Parent is full: split it around its midpoint. Which half takes
        // the new entry, and which key moves up, depends on where the new
        // key lands relative to the two middle separators.
        let mut new_parent_guard = self.bpm.new_page()?.upgrade_write();
        let mut pushed = [0u8; N];
        let mut last_before_pushed = [0u8; N];
        let up_key;
        {
            let mut parent = InternalPageMut::<N>::new(parent_guard.data_mut());
            let mut new_page = InternalPageMut::<N>::new(new_parent_guard.data_mut());
            new_page.init(self.internal_max_size);

            let min_size = parent.min_size();
            let cur_size = parent.size();
            pushed.copy_from_slice(parent.key_at(min_size));
            last_before_pushed.copy_from_slice(parent.key_at(min_size - 1));

            if self.comparator.compare(&key, &pushed) == Ordering::Greater {
                new_page.copy_entries_from(parent.data(), min_size, cur_size);
                parent.set_size(min_size);
                new_page.set_size(cur_size - min_size);
                new_page.insert(&key, right_page_id, &self.comparator);
                up_key = pushed;
            } else if self.comparator.compare(&key, &last_before_pushed) == Ordering::Greater {
                new_page.copy_entries_from(parent.data(), min_size, cur_size);
                parent.set_size(min_size);
                new_page.set_size(cur_size - min_size);
                // The new key precedes every separator that moved right,
                // so it becomes the new page's first entry and the key
                // pushed up.
                new_page.insert_front(&key, right_page_id);
                up_key = key;
            } else {
                // New key belongs left of the midpoint: give the new page
                // one extra entry so both halves stay at min_size after
                // the insert lands on the left.
                new_page.copy_entries_from(parent.data(), min_size - 1, cur_size);
                parent.set_size(min_size - 1);
                new_page.set_size(cur_size - min_size + 1);
                parent.insert(&key, right_page_id, &self.comparator);
                up_key = last_before_pushed;
            }
        }

        self.insert_in_parent(ctx, up_key, new_parent_guard)
    }

    /// Removes a key; absent keys are a no-op.
    pub fn remove(&self, key: &GenericKey<N>) -> Result<()> {
        let header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if root_page_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let mut ctx = Context {
            header: header_guard,
            root_page_id,
            write_set: Vec::new(),
            child_index: HashMap::new(),
        };

        let mut guard = self.bpm.fetch_page_write(root_page_id)?;
        while btree_page_kind(guard.data()) == BTreePageKind::Internal {
            let (child_index, child) = InternalPageRef::<N>::new(guard.data())
                .find_child(key.as_bytes(), &self.comparator);
            ctx.child_index.insert(child, child_index);
            ctx.write_set.push(guard);
            guard = self.bpm.fetch_page_write(child)?;
        }

        let Some((_, record)) =
            LeafPageRef::<N>::new(guard.data()).find(key.as_bytes(), &self.comparator)
        else {
            return Ok(());
        };

        ctx.write_set.push(guard);
        self.delete_entry(&mut ctx, key.as_array(), record)
    }

    /// Deletes `(key, record)` from the leaf on top of the context stack
    /// and restores the tree invariants bottom-up.
    fn delete_entry(&self, ctx: &mut Context, key: [u8; N], record: RecordId) -> Result<()> {
        let mut cur_guard = ctx.write_set.pop().expect("delete without context");
        let cur_page_id = cur_guard.page_id();

        {
            let mut leaf = LeafPageMut::<N>::new(cur_guard.data_mut());
            if !leaf.delete(&key, record, &self.comparator) {
                return Ok(());
            }
        }

        let (size, min_size, max_size) = {
            let leaf = LeafPageRef::<N>::new(cur_guard.data());
            (leaf.size(), leaf.min_size(), leaf.max_size())
        };

        if ctx.is_root(cur_page_id) {
            if size == 0 {
                HeaderPageMut::new(ctx.header.data_mut()).set_root_page_id(INVALID_PAGE_ID);
                ctx.root_page_id = INVALID_PAGE_ID;
                drop(cur_guard);
                self.bpm.delete_page(cur_page_id);
            }
            return Ok(());
        }

        if size >= min_size {
            return Ok(());
        }

        // Underflow: borrow from or merge with a direct sibling. The
        // rightmost child leans left, everyone else leans right.
        let index_in_parent = ctx.child_index[&cur_page_id];
        let (sibling_page_id, is_last) = {
            let parent_guard = ctx.write_set.last().expect("underflow without parent");
            let parent = InternalPageRef::<N>::new(parent_guard.data());
            let is_last = index_in_parent == parent.size() - 1;
            let sibling = if is_last {
                parent.child_at(index_in_parent - 1)
            } else {
                parent.child_at(index_in_parent + 1)
            };
            (sibling, is_last)
        };
        let sibling_guard = self.bpm.fetch_page_write(sibling_page_id)?;

        // Orient the pair and name the parent separator between them.
        let sep_index = if is_last {
            index_in_parent
        } else {
            index_in_parent + 1
        };
        let mut up_key = [0u8; N];
        {
            let parent_guard = ctx.write_set.last().expect("underflow without parent");
            up_key.copy_from_slice(InternalPageRef::<N>::new(parent_guard.data()).key_at(sep_index));
        }
        let (mut left_guard, mut right_guard) = if is_last {
            (sibling_guard, cur_guard)
        } else {
            (cur_guard, sibling_guard)
        };
        let right_page_id = right_guard.page_id();

        let (left_size, right_size, left_max) = {
            let left = LeafPageRef::<N>::new(left_guard.data());
            let right = LeafPageRef::<N>::new(right_guard.data());
            (left.size(), right.size(), left.max_size())
        };
        debug_assert_eq!(left_max, max_size);

        if left_size + right_size < left_max {
            // Merge right into left and unlink it from the leaf chain.
            {
                let right_data = right_guard.data();
                let mut left = LeafPageMut::<N>::new(left_guard.data_mut());
                left.merge_from(right_data);
                left.set_next_page_id(LeafPageRef::<N>::new(right_data).next_page_id());
            }
            drop(left_guard);
            drop(right_guard);
            self.delete_internal_entry(ctx, up_key, right_page_id)?;
            self.bpm.delete_page(right_page_id);
            return Ok(());
        }

        // Redistribute one entry across the boundary and refresh the
        // parent separator to the new boundary key.
        let mut new_separator = [0u8; N];
        {
            let mut left = LeafPageMut::<N>::new(left_guard.data_mut());
            let mut right = LeafPageMut::<N>::new(right_guard.data_mut());
            if is_last {
                let moved_index = left.size() - 1;
                let mut moved_key = [0u8; N];
                moved_key.copy_from_slice(left.key_at(moved_index));
                let moved_record = left.record_at(moved_index);

                right.shift_right_one();
                right.set_entry_at(0, &moved_key, moved_record);
                let left_size = left.size();
                left.set_size(left_size - 1);
                new_separator = moved_key;
            } else {
                let mut first_key = [0u8; N];
                first_key.copy_from_slice(right.key_at(0));
                let first_record = right.record_at(0);

                left.append_entry(&first_key, first_record);
                right.shift_left_one();
                new_separator.copy_from_slice(right.key_at(0));
            }
        }
        let parent_guard = ctx.write_set.last_mut().expect("underflow without parent");
        InternalPageMut::<N>::new(parent_guard.data_mut()).set_key_at(sep_index, &new_separator);
        Ok(())
    }

    /// Internal-page counterpart of `delete_entry`: removes the separator
    /// `(key, child)` from the page on top of the stack, collapsing the
    /// root or rebalancing as needed.
    fn delete_internal_entry(
        &self,
        ctx: &mut Context,
        key: [u8; N],
        child: PageId,
    ) -> Result<()> {
        let mut cur_guard = ctx.write_set.pop().expect("internal delete without context");
        let cur_page_id = cur_guard.page_id();

        {
            let mut page = InternalPageMut::<N>::new(cur_guard.data_mut());
            let removed = page.delete(&key, child, &self.comparator);
            debug_assert!(removed, "separator missing during merge");
        }

        let (size, min_size) = {
            let page = InternalPageRef::<N>::new(cur_guard.data());
            (page.size(), page.min_size())
        };

        if ctx.is_root(cur_page_id) {
            // A root left with a single child hands the root role down.
            if size == 1 {
                let only_child = InternalPageRef::<N>::new(cur_guard.data()).child_at(0);
                HeaderPageMut::new(ctx.header.data_mut()).set_root_page_id(only_child);
                ctx.root_page_id = only_child;
                drop(cur_guard);
                self.bpm.delete_page(cur_page_id);
            }
            return Ok(());
        }

        if size >= min_size {
            return Ok(());
        }

        let index_in_parent = ctx.child_index[&cur_page_id];
        let (sibling_page_id, is_last) = {
            let parent_guard = ctx.write_set.last().expect("underflow without parent");
            let parent = InternalPageRef::<N>::new(parent_guard.data());
            let is_last = index_in_parent == parent.size() - 1;
            let sibling = if is_last {
                parent.child_at(index_in_parent - 1)
            } else {
                parent.child_at(index_in_parent + 1)
            };
            (sibling, is_last)
        };
        let sibling_guard = self.bpm.fetch_page_write(sibling_page_id)?;

        let sep_index = if is_last {
            index_in_parent
        } else {
            index_in_parent + 1
        };
        let mut up_key = [0u8; N];
        {
            let parent_guard = ctx.write_set.last().expect("underflow without parent");
            up_key.copy_from_slice(InternalPageRef::<N>::new(parent_guard.data()).key_at(sep_index));
        }
        let (mut left_guard, mut right_guard) = if is_last {
            (sibling_guard, cur_guard)
        } else {
            (cur_guard, sibling_guard)
        };
        let right_page_id = right_guard.page_id();

        let (left_size, right_size, left_max) = {
            let left = InternalPageRef::<N>::new(left_guard.data());
            let right = InternalPageRef::<N>::new(right_guard.data());
            (left.size(), right.size(), left.max_size())
        };

        if left_size + right_size < left_max {
            // The separator comes down to bridge the two halves: it is the
            // routing key for the right page's first child.
            {
                let right_data = right_guard.data();
                let right_first_child = InternalPageRef::<N>::new(right_data).child_at(0);
                let mut left = InternalPageMut::<N>::new(left_guard.data_mut());
                left.append_entry(&up_key, right_first_child);
                left.extend_from(right_data, 1);
            }
            drop(left_guard);
            drop(right_guard);
            self.delete_internal_entry(ctx, up_key, right_page_id)?;
            self.bpm.delete_page(right_page_id);
            return Ok(());
        }

        // Rotate one entry through the parent separator.
        let mut new_separator = [0u8; N];
        {
            let mut left = InternalPageMut::<N>::new(left_guard.data_mut());
            let mut right = InternalPageMut::<N>::new(right_guard.data_mut());
            if is_last {
                let moved_index = left.size() - 1;
                let mut moved_key = [0u8; N];
                moved_key.copy_from_slice(left.key_at(moved_index));
                let moved_child = left.child_at(moved_index);

                right.shift_right_one();
                right.set_entry_at(0, &moved_key, moved_child);
                // The displaced first child's routing key is the old
                // separator.
                right.set_key_at(1, &up_key);
                let left_size = left.size();
                left.set_size(left_size - 1);
                new_separator = moved_key;
            } else {
                let right_first_child = right.child_at(0);
                left.append_entry(&up_key, right_first_child);
                new_separator.copy_from_slice(right.key_at(1));
                right.shift_left_one();
            }
        }
        let parent_guard = ctx.write_set.last_mut().expect("underflow without parent");
        InternalPageMut::<N>::new(parent_guard.data_mut()).set_key_at(sep_index, &new_separator);
        Ok(())
    }

    /// Iterator positioned at the smallest key; the end iterator when the
    /// tree is empty.
    pub fn begin(&self) -> Result<IndexIterator<N>> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if root_page_id == INVALID_PAGE_ID {
            return Ok(IndexIterator::end(Arc::clone(&self.bpm)));
        }

        let mut guard = self.bpm.fetch_page_read(root_page_id)?;
        drop(header_guard);

        while btree_page_kind(guard.data()) == BTreePageKind::Internal {
            let child = InternalPageRef::<N>::new(guard.data()).child_at(0);
            let child_guard = self.bpm.fetch_page_read(child)?;
            guard = child_guard;
        }

        let leaf = LeafPageRef::<N>::new(guard.data());
        let entry = (GenericKey::from_slice(leaf.key_at(0)), leaf.record_at(0));
        Ok(IndexIterator::new(
            Arc::clone(&self.bpm),
            guard.page_id(),
            0,
            Some(entry),
        ))
    }

    /// Iterator positioned at an exact key match; the end iterator when
    /// the key is absent.
    pub fn begin_at(&self, key: &GenericKey<N>) -> Result<IndexIterator<N>> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let root_page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if root_page_id == INVALID_PAGE_ID {
            return Ok(IndexIterator::end(Arc::clone(&self.bpm)));
        }

        let mut guard = self.bpm.fetch_page_read(root_page_id)?;
        drop(header_guard);

        while btree_page_kind(guard.data()) == BTreePageKind::Internal {
            let (_, child) = InternalPageRef::<N>::new(guard.data())
                .find_child(key.as_bytes(), &self.comparator);
            let child_guard = self.bpm.fetch_page_read(child)?;
            guard = child_guard;
        }

        let leaf = LeafPageRef::<N>::new(guard.data());
        match leaf.find(key.as_bytes(), &self.comparator) {
            Some((index, record)) => Ok(IndexIterator::new(
                Arc::clone(&self.bpm),
                guard.page_id(),
                index,
                Some((*key, record)),
            )),
            None => Ok(IndexIterator::end(Arc::clone(&self.bpm))),
        }
    }

    /// The past-the-last sentinel iterator.
    pub fn end(&self) -> IndexIterator<N> {
        IndexIterator::end(Arc::clone(&self.bpm))
    }
}
