//! Arena-backed tree storage with expansion state and a removal ledger.
//!
//! [`ExpandableTree`] owns every item as a node in a flat arena keyed by
//! [`ItemId`]. Root order and per-parent child order are explicit vectors,
//! so positions are cheap to resolve and splice. The tree itself never
//! notifies anyone; [`crate::model::FlexibleListController`] layers the
//! visible sequence and the observer contract on top.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::item::{ItemFlags, ItemId, ItemKind};

/// Global counter for unique item IDs.
static ITEM_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_item_id() -> ItemId {
    ITEM_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A single arena node.
struct Node<T> {
    data: T,
    flags: ItemFlags,
    kind: ItemKind,
    parent: Option<ItemId>,
    children: Vec<ItemId>,
    /// The `Header` item this node is grouped under, if any.
    header: Option<ItemId>,
}

/// An item (and its whole subtree) lifted out of the arena.
///
/// Detaching preserves everything position-independent: payloads, flags,
/// kinds (including nested expansion state), and child order. Re-attaching
/// allocates fresh IDs, so a detached subtree can be held indefinitely
/// without keeping arena slots alive.
#[derive(Clone, Debug)]
pub struct DetachedItem<T> {
    /// The item payload.
    pub data: T,
    /// The item's capability flags.
    pub flags: ItemFlags,
    /// The item's kind, including expansion state for expandables.
    pub kind: ItemKind,
    /// The header the item was linked to at detach time, if any.
    ///
    /// Re-attaching keeps the link only while that header is still live;
    /// item IDs are never reused, so a stale link can only go dead.
    pub header: Option<ItemId>,
    /// Detached children, in order.
    pub children: Vec<DetachedItem<T>>,
}

impl<T> DetachedItem<T> {
    /// Creates a detached leaf item.
    pub fn new(data: T, flags: ItemFlags, kind: ItemKind) -> Self {
        Self {
            data,
            flags,
            kind,
            header: None,
            children: Vec::new(),
        }
    }

    /// Total number of items in this subtree, itself included.
    pub fn subtree_len(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(DetachedItem::subtree_len)
            .sum::<usize>()
    }
}

/// Hierarchical item storage with per-item expansion state.
///
/// Invariants upheld by construction:
///
/// - Every non-root node's `parent` names a live node whose `children`
///   vector contains it at exactly one index.
/// - No node is its own ancestor: children are only ever created fresh
///   (via [`add_child`](Self::add_child)) or grafted from a detached
///   subtree whose nodes get new IDs.
/// - Only `Expandable` items carry expansion state or children.
/// - Header links always name a live `Header` node; detaching a header
///   clears every link that would otherwise dangle.
pub struct ExpandableTree<T> {
    nodes: HashMap<ItemId, Node<T>>,
    /// Top-level items, in order.
    roots: Vec<ItemId>,
    /// Per-parent ledger of removed children: `(former child index, subtree)`.
    ///
    /// Entries are kept in removal order and replayed ascending by index on
    /// restore. Detaching a parent discards its ledger.
    removed: HashMap<ItemId, Vec<(usize, DetachedItem<T>)>>,
}

impl<T> ExpandableTree<T> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            removed: HashMap::new(),
        }
    }

    /// Total number of live items, at any depth.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no items.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the item is live in the arena.
    pub fn contains(&self, id: ItemId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Top-level items, in order.
    pub fn roots(&self) -> &[ItemId] {
        &self.roots
    }

    /// Position of a top-level item among the roots.
    pub fn root_index_of(&self, id: ItemId) -> Option<usize> {
        self.roots.iter().position(|&r| r == id)
    }

    /// Inserts a new top-level item at `index` (clamped to the root count).
    pub fn insert_root(&mut self, index: usize, data: T, flags: ItemFlags, kind: ItemKind) -> ItemId {
        let id = next_item_id();
        self.nodes.insert(
            id,
            Node {
                data,
                flags,
                kind,
                parent: None,
                children: Vec::new(),
                header: None,
            },
        );
        let index = index.min(self.roots.len());
        self.roots.insert(index, id);
        id
    }

    /// Moves a top-level item to `index` among the roots (clamped after the
    /// item leaves its old slot). Returns `false` for non-root IDs.
    pub fn reorder_root(&mut self, id: ItemId, index: usize) -> bool {
        let Some(old) = self.root_index_of(id) else {
            return false;
        };
        self.roots.remove(old);
        let index = index.min(self.roots.len());
        self.roots.insert(index, id);
        true
    }

    /// Adds a child under `parent` at `index`.
    ///
    /// An index beyond the current child count appends, mirroring how sub
    /// item lists tolerate loose indices. Returns `None` when the parent is
    /// missing or not expandable.
    pub fn add_child(
        &mut self,
        parent: ItemId,
        index: usize,
        data: T,
        flags: ItemFlags,
        kind: ItemKind,
    ) -> Option<ItemId> {
        if !self.nodes.get(&parent)?.kind.is_expandable() {
            return None;
        }
        let id = next_item_id();
        self.nodes.insert(
            id,
            Node {
                data,
                flags,
                kind,
                parent: Some(parent),
                children: Vec::new(),
                header: None,
            },
        );
        let siblings = &mut self.nodes.get_mut(&parent)?.children;
        let index = index.min(siblings.len());
        siblings.insert(index, id);
        Some(id)
    }

    /// The parent of an item, or `None` for roots and unknown IDs.
    pub fn parent_of(&self, id: ItemId) -> Option<ItemId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// The children of an item, in order. Empty for leaves and unknown IDs.
    pub fn children(&self, id: ItemId) -> &[ItemId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Number of direct children.
    pub fn child_count(&self, id: ItemId) -> usize {
        self.children(id).len()
    }

    /// Position of an item within its parent's children.
    pub fn index_in_parent(&self, id: ItemId) -> Option<usize> {
        let parent = self.parent_of(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Walks the parent chain up to the top-level ancestor.
    pub fn top_ancestor(&self, id: ItemId) -> ItemId {
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            current = parent;
        }
        current
    }

    /// Whether `ancestor` lies on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: ItemId, id: ItemId) -> bool {
        let mut current = self.parent_of(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent_of(node);
        }
        false
    }

    /// Borrows an item's payload.
    pub fn data(&self, id: ItemId) -> Option<&T> {
        self.nodes.get(&id).map(|n| &n.data)
    }

    /// Mutably borrows an item's payload.
    pub fn data_mut(&mut self, id: ItemId) -> Option<&mut T> {
        self.nodes.get_mut(&id).map(|n| &mut n.data)
    }

    /// Replaces an item's payload, returning the old one.
    pub fn set_data(&mut self, id: ItemId, data: T) -> Option<T> {
        self.nodes
            .get_mut(&id)
            .map(|n| std::mem::replace(&mut n.data, data))
    }

    /// An item's flags.
    pub fn flags(&self, id: ItemId) -> Option<ItemFlags> {
        self.nodes.get(&id).map(|n| n.flags)
    }

    /// An item's kind.
    pub fn kind(&self, id: ItemId) -> Option<ItemKind> {
        self.nodes.get(&id).map(|n| n.kind)
    }

    /// Whether an expandable item currently shows its children.
    pub fn is_expanded(&self, id: ItemId) -> bool {
        self.kind(id).is_some_and(|k| k.is_expanded())
    }

    /// Links an item to a header item, or unlinks it with `None`.
    ///
    /// The target must be a live [`ItemKind::Header`] item. Returns `false`
    /// (and changes nothing) when either end is unsuitable.
    pub fn set_header(&mut self, id: ItemId, header: Option<ItemId>) -> bool {
        if let Some(h) = header {
            if !self.nodes.get(&h).is_some_and(|n| n.kind.is_header()) {
                return false;
            }
        }
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.header = header;
                true
            }
            None => false,
        }
    }

    /// The header an item is linked to, if any.
    pub fn header_of(&self, id: ItemId) -> Option<ItemId> {
        self.nodes.get(&id).and_then(|n| n.header)
    }

    /// Sets the expansion state of an expandable item.
    ///
    /// Returns `false` (and changes nothing) for non-expandable or unknown
    /// items. Only this item's state changes; nested expansion state of
    /// descendants is untouched.
    pub fn set_expanded(&mut self, id: ItemId, expanded: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => match &mut node.kind {
                ItemKind::Expandable { expanded: state } => {
                    *state = expanded;
                    true
                }
                ItemKind::Plain | ItemKind::Header => false,
            },
            None => false,
        }
    }

    /// Recomputes every item's hidden flag from a predicate on its payload.
    pub fn set_hidden_where<F>(&mut self, hide: F)
    where
        F: Fn(&T) -> bool,
    {
        for node in self.nodes.values_mut() {
            node.flags.hidden = hide(&node.data);
        }
    }

    /// Clears the hidden flag on every item.
    pub fn clear_hidden(&mut self) {
        for node in self.nodes.values_mut() {
            node.flags.hidden = false;
        }
    }

    /// The descendants of `id` that belong in the visible sequence, in
    /// depth-first order.
    ///
    /// Hidden items are skipped along with their whole subtree; collapsed
    /// expandables contribute themselves but not their children.
    pub fn visible_descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        self.collect_visible_children(id, &mut out);
        out
    }

    /// The full visible sequence: every non-hidden root followed by its
    /// visible descendants.
    pub fn visible_sequence(&self) -> Vec<ItemId> {
        let mut out = Vec::new();
        for &root in &self.roots {
            let Some(node) = self.nodes.get(&root) else {
                continue;
            };
            if node.flags.hidden {
                continue;
            }
            out.push(root);
            if node.kind.is_expanded() {
                self.collect_visible_children(root, &mut out);
            }
        }
        out
    }

    fn collect_visible_children(&self, id: ItemId, out: &mut Vec<ItemId>) {
        for &child in self.children(id) {
            let Some(node) = self.nodes.get(&child) else {
                continue;
            };
            if node.flags.hidden {
                continue;
            }
            out.push(child);
            if node.kind.is_expanded() {
                self.collect_visible_children(child, out);
            }
        }
    }

    /// Lifts an item and its whole subtree out of the arena.
    ///
    /// Expansion state of the item and all descendants is preserved in the
    /// returned [`DetachedItem`]. The item's own removal ledger (if any) is
    /// discarded with it. Remaining items linked to a header inside the
    /// detached subtree are unlinked.
    pub fn detach(&mut self, id: ItemId) -> Option<DetachedItem<T>> {
        if !self.nodes.contains_key(&id) {
            return None;
        }
        match self.parent_of(id) {
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.retain(|&c| c != id);
                }
            }
            None => {
                self.roots.retain(|&r| r != id);
            }
        }
        let detached = self.take_subtree(id);
        self.clear_dangling_headers();
        detached
    }

    fn take_subtree(&mut self, id: ItemId) -> Option<DetachedItem<T>> {
        let node = self.nodes.remove(&id)?;
        self.removed.remove(&id);
        let mut children = Vec::with_capacity(node.children.len());
        for child in node.children {
            if let Some(detached) = self.take_subtree(child) {
                children.push(detached);
            }
        }
        Some(DetachedItem {
            data: node.data,
            flags: node.flags,
            kind: node.kind,
            header: node.header,
            children,
        })
    }

    /// Unlinks every node whose header no longer exists.
    fn clear_dangling_headers(&mut self) {
        let dangling: Vec<ItemId> = self
            .nodes
            .iter()
            .filter_map(|(&id, node)| {
                let header = node.header?;
                (!self.nodes.contains_key(&header)).then_some(id)
            })
            .collect();
        for id in dangling {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.header = None;
            }
        }
    }

    /// Grafts a detached subtree in as a top-level item at `index` (clamped).
    ///
    /// Fresh IDs are allocated for the whole subtree; the returned ID is the
    /// new root of the grafted subtree.
    pub fn attach_detached_root(&mut self, index: usize, item: DetachedItem<T>) -> ItemId {
        let id = self.attach_subtree(None, item);
        let index = index.min(self.roots.len());
        self.roots.insert(index, id);
        id
    }

    /// Grafts a detached subtree in as a child of `parent` at `index`
    /// (clamped to the child count).
    ///
    /// Returns `None` when the parent is missing or not expandable.
    pub fn attach_detached_child(
        &mut self,
        parent: ItemId,
        index: usize,
        item: DetachedItem<T>,
    ) -> Option<ItemId> {
        if !self.nodes.get(&parent)?.kind.is_expandable() {
            return None;
        }
        let id = self.attach_subtree(Some(parent), item);
        let siblings = &mut self.nodes.get_mut(&parent)?.children;
        let index = index.min(siblings.len());
        siblings.insert(index, id);
        Some(id)
    }

    fn attach_subtree(&mut self, parent: Option<ItemId>, item: DetachedItem<T>) -> ItemId {
        let id = next_item_id();
        let children: Vec<ItemId> = item
            .children
            .into_iter()
            .map(|child| self.attach_subtree(Some(id), child))
            .collect();
        // A header that disappeared while the item was detached stays gone.
        let header = item.header.filter(|h| self.nodes.contains_key(h));
        self.nodes.insert(
            id,
            Node {
                data: item.data,
                flags: item.flags,
                kind: item.kind,
                parent,
                children,
                header,
            },
        );
        id
    }

    /// Removes `child` from `parent`, recording the subtree in the parent's
    /// removal ledger for a later [`restore_removed_children`](Self::restore_removed_children).
    ///
    /// Returns the child's former index, or `None` when `child` is not a
    /// direct child of `parent`.
    pub fn remove_child(&mut self, parent: ItemId, child: ItemId) -> Option<usize> {
        if self.parent_of(child) != Some(parent) {
            return None;
        }
        let index = self.index_in_parent(child)?;
        let detached = self.detach(child)?;
        self.removed.entry(parent).or_default().push((index, detached));
        Some(index)
    }

    /// Number of ledger entries awaiting restore under `parent`.
    pub fn removed_child_count(&self, parent: ItemId) -> usize {
        self.removed.get(&parent).map_or(0, Vec::len)
    }

    /// Re-attaches every ledgered child of `parent` and clears the ledger.
    ///
    /// Entries are replayed ascending by their recorded index, each clamped
    /// to the current child count. Returns the number of children restored;
    /// 0 when the parent is gone or its ledger is empty.
    pub fn restore_removed_children(&mut self, parent: ItemId) -> usize {
        let Some(mut entries) = self.removed.remove(&parent) else {
            return 0;
        };
        if !self.contains(parent) {
            return 0;
        }
        entries.sort_by_key(|(index, _)| *index);
        let count = entries.len();
        for (index, item) in entries {
            self.attach_detached_child(parent, index, item);
        }
        count
    }
}

impl<T> Default for ExpandableTree<T> {
    fn default() -> Self {
        Self::new()
    }
}
