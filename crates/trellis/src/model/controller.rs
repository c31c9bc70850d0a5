//! The list controller: flat visible sequence over the expandable tree.
//!
//! [`FlexibleListController`] is the facade that ties the pieces together.
//! It owns an [`ExpandableTree`] as the source of truth, projects it into a
//! flat visible sequence (the positions observers and the selection tracker
//! work in), and emits [`ListSignals`] after every structural edit. Removed
//! items park in an undo buffer that can be replayed until a deadline
//! expires.
//!
//! # Threading
//!
//! The controller is owned by the thread that created it: every structural
//! edit asserts thread affinity and panics on violation, while read-only
//! queries may come from any thread. Internally each edit takes the state
//! write lock, mutates, releases the lock, and only then emits — slots may
//! therefore query the controller freely. The undo deadline callback runs
//! on the scheduler thread but touches only the undo buffer's own mutex.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use trellis_core::{Scheduler, TaskId, ThreadAffinity};

use crate::model::item::{ItemFlags, ItemId, ItemKind};
use crate::model::selection::{SelectionSnapshot, SelectionTracker};
use crate::model::signals::ListSignals;
use crate::model::tree::{DetachedItem, ExpandableTree};

/// How long restored removals stay available when no explicit timeout is
/// given to [`FlexibleListController::start_undo_timer`].
pub const DEFAULT_UNDO_TIMEOUT: Duration = Duration::from_millis(5000);

/// Where a removed item sat before removal.
enum RestoreSlot {
    /// A top-level item, at this index among the roots.
    Root { root_index: usize },
    /// A child of `parent`, at this index among its siblings.
    Child { parent: ItemId, child_index: usize },
}

/// One undo buffer entry: a detached subtree plus enough placement to put
/// it back.
struct RestoreEntry<T> {
    /// Visible position at the moment of removal.
    position: usize,
    slot: RestoreSlot,
    item: DetachedItem<T>,
}

/// Tree plus its flat projection, guarded together so they never diverge.
struct ListState<T> {
    tree: ExpandableTree<T>,
    /// The visible sequence: non-hidden roots and the visible descendants
    /// of expanded items, in order. All public positions index this vector.
    visible: Vec<ItemId>,
}

/// A structural notification recorded under the lock, emitted after it.
enum Emit {
    Inserted(usize),
    RangeInserted(usize, usize),
    Removed(usize),
    RangeRemoved(usize, usize),
    Changed(usize),
    Moved(usize, usize),
    Refresh,
}

/// Flat list controller with selection, expansion, filtering, section
/// headers, and undoable removal.
///
/// # Example
///
/// ```
/// use trellis::model::{FlexibleListController, ItemFlags, ItemKind};
///
/// let list = FlexibleListController::new();
/// list.insert(0, "alpha", ItemFlags::new(), ItemKind::Plain);
/// list.insert(1, "beta", ItemFlags::new(), ItemKind::Plain);
///
/// list.signals().item_removed.connect(|&position| {
///     println!("removed row {position}");
/// });
///
/// list.remove_at(0);
/// assert_eq!(list.item_count(), 1);
///
/// // Removed items stay restorable until the undo buffer is purged
/// assert!(list.restore_deleted());
/// assert_eq!(list.item_count(), 2);
/// ```
pub struct FlexibleListController<T> {
    state: RwLock<ListState<T>>,
    selection: SelectionTracker,
    signals: ListSignals,
    affinity: ThreadAffinity,
    scheduler: Arc<Scheduler>,
    /// Undo buffer. Its own mutex, never taken together with the state
    /// lock's write side, so the scheduler thread can purge it safely.
    undo: Arc<Mutex<Vec<RestoreEntry<T>>>>,
    undo_task: Mutex<Option<TaskId>>,
}

impl<T: Send + 'static> FlexibleListController<T> {
    /// Creates an empty controller with its own scheduler thread.
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(Scheduler::new()))
    }

    /// Creates an empty controller sharing an existing scheduler.
    pub fn with_scheduler(scheduler: Arc<Scheduler>) -> Self {
        Self {
            state: RwLock::new(ListState {
                tree: ExpandableTree::new(),
                visible: Vec::new(),
            }),
            selection: SelectionTracker::new(),
            signals: ListSignals::new(),
            affinity: ThreadAffinity::current(),
            scheduler,
            undo: Arc::new(Mutex::new(Vec::new())),
            undo_task: Mutex::new(None),
        }
    }

    /// The change notification signals.
    pub fn signals(&self) -> &ListSignals {
        &self.signals
    }

    /// The selection tracker. Positions it reports index the visible
    /// sequence; the controller realigns them on every structural edit.
    pub fn selection(&self) -> &SelectionTracker {
        &self.selection
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Number of visible items.
    pub fn item_count(&self) -> usize {
        self.state.read().visible.len()
    }

    /// Whether the visible sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.state.read().visible.is_empty()
    }

    /// The stable ID of the item at a visible position.
    pub fn item_id(&self, position: usize) -> Option<ItemId> {
        self.state.read().visible.get(position).copied()
    }

    /// Runs a closure against the payload at a visible position.
    pub fn with_item<F, R>(&self, position: usize, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let state = self.state.read();
        let id = *state.visible.get(position)?;
        state.tree.data(id).map(f)
    }

    /// Clones the payload at a visible position.
    pub fn get(&self, position: usize) -> Option<T>
    where
        T: Clone,
    {
        self.with_item(position, T::clone)
    }

    /// The visible position of the first item equal to `data`.
    pub fn position_of(&self, data: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        let state = self.state.read();
        state
            .visible
            .iter()
            .position(|&id| state.tree.data(id) == Some(data))
    }

    /// Whether any visible item equals `data`.
    pub fn contains(&self, data: &T) -> bool
    where
        T: PartialEq,
    {
        self.position_of(data).is_some()
    }

    /// The flags of the item at a visible position.
    pub fn flags(&self, position: usize) -> Option<ItemFlags> {
        let state = self.state.read();
        let id = *state.visible.get(position)?;
        state.tree.flags(id)
    }

    /// Whether the item at a visible position can own children.
    pub fn is_expandable(&self, position: usize) -> bool {
        let state = self.state.read();
        state
            .visible
            .get(position)
            .and_then(|&id| state.tree.kind(id))
            .is_some_and(|k| k.is_expandable())
    }

    /// Whether the item at a visible position currently shows its children.
    pub fn is_expanded(&self, position: usize) -> bool {
        let state = self.state.read();
        state
            .visible
            .get(position)
            .is_some_and(|&id| state.tree.is_expanded(id))
    }

    /// Number of direct children under the item at a visible position.
    pub fn sub_item_count(&self, position: usize) -> usize {
        let state = self.state.read();
        state
            .visible
            .get(position)
            .map_or(0, |&id| state.tree.child_count(id))
    }

    // ---------------------------------------------------------------------
    // Structural edits
    // ---------------------------------------------------------------------

    /// Inserts a top-level item so it appears at `position` in the visible
    /// sequence (clamped to the item count).
    ///
    /// A position that lands inside another item's expanded children snaps
    /// past that subtree: children are only ever placed through
    /// [`insert_sub_item`](Self::insert_sub_item). Hidden items join the
    /// tree but not the visible sequence, and emit nothing.
    pub fn insert(&self, position: usize, data: T, flags: ItemFlags, kind: ItemKind) -> ItemId {
        self.affinity.assert_same_thread();
        let mut emits = Vec::new();
        let id;
        {
            let mut state = self.state.write();
            let mut pos = position.min(state.visible.len());

            let root_index = if pos == state.visible.len() {
                state.tree.roots().len()
            } else {
                let anchor = state.visible[pos];
                match state.tree.parent_of(anchor) {
                    // Anchor is a root: the new item takes its slot.
                    None => state
                        .tree
                        .root_index_of(anchor)
                        .unwrap_or(state.tree.roots().len()),
                    // Anchor is inside an expanded block: snap past it.
                    Some(_) => {
                        let top = state.tree.top_ancestor(anchor);
                        let top_pos = state
                            .visible
                            .iter()
                            .position(|&v| v == top)
                            .unwrap_or(pos);
                        pos = top_pos + 1 + state.tree.visible_descendants(top).len();
                        state
                            .tree
                            .root_index_of(top)
                            .map(|i| i + 1)
                            .unwrap_or(state.tree.roots().len())
                    }
                }
            };

            id = state.tree.insert_root(root_index, data, flags, kind);
            if flags.hidden {
                tracing::debug!(target: "trellis::model", ?id, "inserted hidden item");
            } else {
                state.visible.insert(pos, id);
                self.selection.shift_on_insert(pos, 1);
                tracing::debug!(target: "trellis::model", ?id, position = pos, "inserted item");
                emits.push(Emit::Inserted(pos));
            }
        }
        self.emit_all(emits);
        id
    }

    /// Appends a top-level item.
    pub fn push(&self, data: T, flags: ItemFlags, kind: ItemKind) -> ItemId {
        self.insert(usize::MAX, data, flags, kind)
    }

    /// Adds a child under the expandable item at `parent_position`.
    ///
    /// The child joins the parent's sub item list at `child_index` (an index
    /// beyond the child count appends). When the parent is expanded and the
    /// child is not hidden it also enters the visible sequence with a single
    /// insert notification. Returns `None` when the parent position is out
    /// of range or the item there is not expandable.
    pub fn insert_sub_item(
        &self,
        parent_position: usize,
        child_index: usize,
        data: T,
        flags: ItemFlags,
        kind: ItemKind,
    ) -> Option<ItemId> {
        self.affinity.assert_same_thread();
        let mut emits = Vec::new();
        let id;
        {
            let mut state = self.state.write();
            let parent_id = *state.visible.get(parent_position)?;
            let Some(new_id) = state.tree.add_child(parent_id, child_index, data, flags, kind)
            else {
                tracing::warn!(
                    target: "trellis::model",
                    parent_position,
                    "sub item rejected: parent is not expandable"
                );
                return None;
            };
            id = new_id;

            if state.tree.is_expanded(parent_id) && !flags.hidden {
                let offset = state
                    .tree
                    .visible_descendants(parent_id)
                    .iter()
                    .position(|&d| d == id)
                    .unwrap_or(0);
                let vis_pos = parent_position + 1 + offset;
                state.visible.insert(vis_pos, id);
                self.selection.shift_on_insert(vis_pos, 1);
                emits.push(Emit::Inserted(vis_pos));
            }
        }
        self.emit_all(emits);
        Some(id)
    }

    /// Replaces the payload at a visible position.
    ///
    /// Out-of-range positions are rejected with a log entry instead of a
    /// panic. Returns whether the update happened.
    pub fn update(&self, position: usize, data: T) -> bool {
        self.affinity.assert_same_thread();
        {
            let mut state = self.state.write();
            let Some(&id) = state.visible.get(position) else {
                tracing::warn!(target: "trellis::model", position, "update out of range");
                return false;
            };
            state.tree.set_data(id, data);
        }
        self.signals.item_changed.emit(position);
        true
    }

    /// Mutates the payload at a visible position in place.
    ///
    /// Emits `item_changed` after the closure runs. Returns `None` when the
    /// position is out of range.
    pub fn modify<F, R>(&self, position: usize, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        self.affinity.assert_same_thread();
        let result = {
            let mut state = self.state.write();
            let id = *state.visible.get(position)?;
            state.tree.data_mut(id).map(f)?
        };
        self.signals.item_changed.emit(position);
        Some(result)
    }

    /// Moves the top-level item at `from` to `to`.
    ///
    /// Both positions must name top-level items in the visible sequence;
    /// moving rows into or out of expanded blocks is rejected. Selection
    /// follows the moved item. Returns whether the move happened.
    pub fn move_item(&self, from: usize, to: usize) -> bool {
        self.affinity.assert_same_thread();
        let mut emits = Vec::new();
        {
            let mut state = self.state.write();
            if from >= state.visible.len() || to >= state.visible.len() {
                tracing::warn!(target: "trellis::model", from, to, "move out of range");
                return false;
            }
            if from == to {
                return true;
            }
            let id = state.visible[from];
            if state.tree.parent_of(id).is_some()
                || state
                    .tree
                    .parent_of(state.visible[to])
                    .is_some()
            {
                tracing::warn!(
                    target: "trellis::model",
                    from,
                    to,
                    "move rejected: only top-level items can move"
                );
                return false;
            }

            state.visible.remove(from);
            state.visible.insert(to, id);

            // Mirror the new order among the roots: place after the closest
            // preceding root in the visible sequence. Indices are taken
            // while `id` still holds its old root slot, so roots behind it
            // need no +1 once it leaves.
            let old_root_index = state.tree.root_index_of(id).unwrap_or(0);
            let root_index = state.visible[..to]
                .iter()
                .rev()
                .find_map(|&v| {
                    if state.tree.parent_of(v).is_none() {
                        state
                            .tree
                            .root_index_of(v)
                            .map(|i| if i > old_root_index { i } else { i + 1 })
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            state.tree.reorder_root(id, root_index);

            self.selection.shift_on_move(from, to);
            tracing::debug!(target: "trellis::model", from, to, "moved item");
            emits.push(Emit::Moved(from, to));
        }
        self.emit_all(emits);
        true
    }

    /// Removes the item at a visible position.
    ///
    /// An expanded item is collapsed first (with its own notifications), so
    /// its children leave the screen with the subtree and come back with it
    /// on restore. The removed subtree joins the undo buffer. Out-of-range
    /// positions are rejected with a log entry.
    pub fn remove_at(&self, position: usize) {
        self.affinity.assert_same_thread();
        let mut emits = Vec::new();
        let mut restores = Vec::new();
        {
            let mut state = self.state.write();
            if position >= state.visible.len() {
                tracing::warn!(target: "trellis::model", position, "remove out of range");
                return;
            }
            Self::remove_one(&mut state, &self.selection, position, &mut emits, &mut restores);
            emits.push(Emit::Removed(position));
        }
        self.undo.lock().extend(restores);
        self.emit_all(emits);
    }

    /// Removes `count` contiguous items starting at `start`, with a single
    /// range notification.
    ///
    /// Expanded items in the range collapse as they are reached, which
    /// shrinks the sequence; the removal stops early (with a log entry) if
    /// the range runs out of items. The whole range is rejected when
    /// `start + count` exceeds the item count.
    pub fn remove_range(&self, start: usize, count: usize) {
        self.affinity.assert_same_thread();
        if count == 0 {
            return;
        }
        let mut emits = Vec::new();
        let mut restores = Vec::new();
        {
            let mut state = self.state.write();
            if start >= state.visible.len() || start + count > state.visible.len() {
                tracing::warn!(
                    target: "trellis::model",
                    start,
                    count,
                    len = state.visible.len(),
                    "remove range out of range"
                );
                return;
            }

            let mut removed = 0;
            for _ in 0..count {
                if start >= state.visible.len() {
                    tracing::warn!(
                        target: "trellis::model",
                        start,
                        count,
                        removed,
                        "remove range shortened by collapses"
                    );
                    break;
                }
                Self::remove_one(&mut state, &self.selection, start, &mut emits, &mut restores);
                removed += 1;
            }
            if removed > 0 {
                emits.push(Emit::RangeRemoved(start, removed));
            }
        }
        self.undo.lock().extend(restores);
        self.emit_all(emits);
    }

    /// Removes the items at the given visible positions.
    ///
    /// Positions are deduplicated and processed from the highest down so
    /// each removal leaves the remaining positions valid. Consecutive runs
    /// coalesce into one range notification each; isolated positions get a
    /// single-item notification.
    pub fn remove_many(&self, positions: &[usize]) {
        self.affinity.assert_same_thread();
        if positions.is_empty() {
            return;
        }
        let mut sorted = positions.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();

        let mut i = 0;
        while i < sorted.len() {
            let mut len = 1;
            while i + len < sorted.len()
                && sorted[i + len - 1] > 0
                && sorted[i + len] == sorted[i + len - 1] - 1
            {
                len += 1;
            }
            let run_start = sorted[i + len - 1];
            if len == 1 {
                self.remove_at(run_start);
            } else {
                self.remove_range(run_start, len);
            }
            i += len;
        }
    }

    /// Shows the children of the expandable item at `position`.
    ///
    /// Returns the number of rows inserted: 0 when the position is out of
    /// range, the item is not expandable, already expanded, or has no
    /// children. One range-insert covers the children; the parent itself
    /// gets a change notification so its disclosure state can redraw.
    pub fn expand(&self, position: usize) -> usize {
        self.affinity.assert_same_thread();
        let mut emits = Vec::new();
        let inserted;
        {
            let mut state = self.state.write();
            let Some(&id) = state.visible.get(position) else {
                return 0;
            };
            let kind = state.tree.kind(id);
            if !kind.is_some_and(|k| k.is_expandable())
                || state.tree.is_expanded(id)
                || state.tree.child_count(id) == 0
            {
                return 0;
            }

            state.tree.set_expanded(id, true);
            let descendants = state.tree.visible_descendants(id);
            inserted = descendants.len();
            state
                .visible
                .splice(position + 1..position + 1, descendants);
            self.selection.shift_on_insert(position + 1, inserted);

            tracing::debug!(target: "trellis::model", position, inserted, "expanded item");
            if inserted > 0 {
                emits.push(Emit::RangeInserted(position + 1, inserted));
            }
            emits.push(Emit::Changed(position));
        }
        self.emit_all(emits);
        inserted
    }

    /// Hides the children of the expanded item at `position`.
    ///
    /// Returns the number of rows removed (0 for a no-op). Nested expansion
    /// state is preserved: re-expanding brings grandchildren back exactly
    /// as they were.
    pub fn collapse(&self, position: usize) -> usize {
        self.affinity.assert_same_thread();
        let mut emits = Vec::new();
        let removed;
        {
            let mut state = self.state.write();
            if position >= state.visible.len() {
                return 0;
            }
            removed = Self::collapse_at(&mut state, &self.selection, position, &mut emits);
        }
        self.emit_all(emits);
        removed
    }

    /// Hides every item whose payload fails the predicate and rebuilds the
    /// visible sequence.
    ///
    /// The selection is discarded (positions are meaningless across a
    /// reshape) and a single `full_refresh` fires.
    pub fn set_filter<F>(&self, keep: F)
    where
        F: Fn(&T) -> bool,
    {
        self.affinity.assert_same_thread();
        {
            let mut state = self.state.write();
            state.tree.set_hidden_where(|data| !keep(data));
            state.visible = state.tree.visible_sequence();
            self.selection.reset();
            tracing::debug!(
                target: "trellis::model",
                visible = state.visible.len(),
                "applied filter"
            );
        }
        self.emit_all(vec![Emit::Refresh]);
    }

    /// Clears the hidden flag everywhere and rebuilds the visible sequence.
    pub fn clear_filter(&self) {
        self.affinity.assert_same_thread();
        {
            let mut state = self.state.write();
            state.tree.clear_hidden();
            state.visible = state.tree.visible_sequence();
            self.selection.reset();
        }
        self.emit_all(vec![Emit::Refresh]);
    }

    // ---------------------------------------------------------------------
    // Section headers
    // ---------------------------------------------------------------------

    /// Links the item at `position` to the header item at `header_position`.
    ///
    /// The target must hold an [`ItemKind::Header`] item. The linked item
    /// gets a change notification so grouped views can redraw. A link to a
    /// header that is later removed is cleared with the header. Returns
    /// whether the link was made.
    pub fn link_to_header(&self, position: usize, header_position: usize) -> bool {
        self.affinity.assert_same_thread();
        {
            let mut state = self.state.write();
            let (Some(&id), Some(&header)) = (
                state.visible.get(position),
                state.visible.get(header_position),
            ) else {
                tracing::warn!(
                    target: "trellis::model",
                    position,
                    header_position,
                    "link out of range"
                );
                return false;
            };
            if !state.tree.set_header(id, Some(header)) {
                tracing::warn!(
                    target: "trellis::model",
                    position,
                    header_position,
                    "link rejected: target is not a header"
                );
                return false;
            }
        }
        self.signals.item_changed.emit(position);
        true
    }

    /// Removes the header link of the item at `position`, if any.
    ///
    /// Returns whether a link was removed; unlinked and out-of-range
    /// positions are no-ops.
    pub fn unlink_from_header(&self, position: usize) -> bool {
        self.affinity.assert_same_thread();
        {
            let mut state = self.state.write();
            let Some(&id) = state.visible.get(position) else {
                return false;
            };
            if state.tree.header_of(id).is_none() {
                return false;
            }
            state.tree.set_header(id, None);
        }
        self.signals.item_changed.emit(position);
        true
    }

    /// The visible position of the header the item at `position` is linked
    /// to. `None` for unlinked items and for headers currently filtered out.
    pub fn header_of(&self, position: usize) -> Option<usize> {
        let state = self.state.read();
        let id = *state.visible.get(position)?;
        let header = state.tree.header_of(id)?;
        state.visible.iter().position(|&v| v == header)
    }

    /// Whether the item at a visible position is a section header.
    pub fn is_header(&self, position: usize) -> bool {
        let state = self.state.read();
        state
            .visible
            .get(position)
            .and_then(|&id| state.tree.kind(id))
            .is_some_and(|k| k.is_header())
    }

    // ---------------------------------------------------------------------
    // Undo buffer
    // ---------------------------------------------------------------------

    /// Arms (or re-arms) the undo purge deadline.
    ///
    /// When the deadline passes, the undo buffer is discarded and restore
    /// becomes impossible. Calling again replaces the previous deadline, so
    /// a removal followed by another removal keeps one merged buffer with
    /// the newest deadline. If the scheduler has shut down, no deadline is
    /// armed and the buffer stays restorable.
    pub fn start_undo_timer(&self, timeout: Option<Duration>) {
        self.stop_undo_timer();
        let bin = self.undo.clone();
        let task = self
            .scheduler
            .schedule_once(timeout.unwrap_or(DEFAULT_UNDO_TIMEOUT), move || {
                let mut entries = bin.lock();
                if !entries.is_empty() {
                    tracing::debug!(
                        target: "trellis::model",
                        purged = entries.len(),
                        "undo deadline expired"
                    );
                    entries.clear();
                }
            });
        match task {
            Ok(task) => *self.undo_task.lock() = Some(task),
            Err(err) => {
                tracing::warn!(target: "trellis::model", %err, "undo deadline not armed");
            }
        }
    }

    /// Cancels a pending undo deadline. Harmless when none is armed.
    pub fn stop_undo_timer(&self) {
        if let Some(task) = self.undo_task.lock().take() {
            let _ = self.scheduler.cancel(task);
        }
    }

    /// Whether removed items are still available for restore.
    pub fn is_restore_in_time(&self) -> bool {
        !self.undo.lock().is_empty()
    }

    /// Number of subtrees parked in the undo buffer.
    pub fn deleted_count(&self) -> usize {
        self.undo.lock().len()
    }

    /// Clones the payloads parked in the undo buffer, in removal order.
    ///
    /// Only the top of each removed subtree is listed; children travel with
    /// their parent.
    pub fn deleted_items(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.undo
            .lock()
            .iter()
            .map(|entry| entry.item.data.clone())
            .collect()
    }

    /// Discards the undo buffer without restoring.
    pub fn empty_undo_buffer(&self) {
        self.undo.lock().clear();
    }

    /// Puts every removed subtree back where it came from.
    ///
    /// Entries replay in reverse removal order, so interleaved removals
    /// restore to exactly the pre-removal sequence. Children whose parent
    /// has meanwhile disappeared are skipped with a log entry. The current
    /// selection is cleared first (with notification). Returns `false` when
    /// the buffer was empty.
    pub fn restore_deleted(&self) -> bool {
        self.affinity.assert_same_thread();
        self.stop_undo_timer();

        let entries = std::mem::take(&mut *self.undo.lock());
        if entries.is_empty() {
            return false;
        }

        self.selection.clear(self.item_count());

        let mut emits = Vec::new();
        {
            let mut state = self.state.write();
            for entry in entries.into_iter().rev() {
                let hidden = entry.item.flags.hidden;
                match entry.slot {
                    RestoreSlot::Root { root_index } => {
                        let id = state.tree.attach_detached_root(root_index, entry.item);
                        if !hidden {
                            let vis_pos = entry.position.min(state.visible.len());
                            Self::splice_restored(&mut state, id, vis_pos, &mut emits);
                        }
                    }
                    RestoreSlot::Child {
                        parent,
                        child_index,
                    } => {
                        if !state.tree.contains(parent) {
                            tracing::warn!(
                                target: "trellis::model",
                                "restore skipped: parent no longer exists"
                            );
                            continue;
                        }
                        let Some(id) =
                            state.tree.attach_detached_child(parent, child_index, entry.item)
                        else {
                            continue;
                        };
                        if hidden || !state.tree.is_expanded(parent) {
                            continue;
                        }
                        let Some(parent_pos) =
                            state.visible.iter().position(|&v| v == parent)
                        else {
                            continue;
                        };
                        let offset = state
                            .tree
                            .visible_descendants(parent)
                            .iter()
                            .position(|&d| d == id)
                            .unwrap_or(0);
                        Self::splice_restored(&mut state, id, parent_pos + 1 + offset, &mut emits);
                    }
                }
            }
            tracing::debug!(
                target: "trellis::model",
                visible = state.visible.len(),
                "restored deleted items"
            );
        }
        self.emit_all(emits);
        true
    }

    // ---------------------------------------------------------------------
    // Selection facade
    // ---------------------------------------------------------------------

    /// Toggles selection at a visible position.
    ///
    /// Positions holding non-selectable items are rejected silently (with a
    /// log entry).
    pub fn toggle_selection(&self, position: usize) {
        let selectable = self.flags(position).is_some_and(|f| f.selectable);
        if !selectable {
            tracing::debug!(target: "trellis::model", position, "toggle rejected: not selectable");
            return;
        }
        self.selection.toggle(position);
    }

    /// Selects every visible position.
    pub fn select_all(&self) {
        self.selection.select_all(self.item_count());
    }

    /// Clears the selection, fast-clearing when everything was selected.
    pub fn clear_selection(&self) {
        self.selection.clear(self.item_count());
    }

    /// Whether the visible position is selected.
    pub fn is_selected(&self, position: usize) -> bool {
        self.selection.is_selected(position)
    }

    /// Selected visible positions, ascending.
    pub fn selected_positions(&self) -> Vec<usize> {
        self.selection.selected_positions()
    }

    /// Number of selected positions.
    pub fn selected_count(&self) -> usize {
        self.selection.count()
    }

    /// Captures the selection for persistence.
    pub fn selection_snapshot(&self) -> SelectionSnapshot {
        self.selection.snapshot()
    }

    /// Restores a previously captured selection. Silent.
    pub fn restore_selection(&self, snapshot: &SelectionSnapshot) {
        self.selection.restore(snapshot);
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Collapses the expanded item at `position`. Returns rows removed.
    fn collapse_at(
        state: &mut ListState<T>,
        selection: &SelectionTracker,
        position: usize,
        emits: &mut Vec<Emit>,
    ) -> usize {
        let id = state.visible[position];
        if !state.tree.is_expanded(id) {
            return 0;
        }
        // The visible descendants occupy exactly the slots after the parent.
        let removed = state.tree.visible_descendants(id).len();
        if removed > 0 {
            state.visible.drain(position + 1..position + 1 + removed);
        }
        state.tree.set_expanded(id, false);
        selection.shift_on_remove(position + 1, removed);

        tracing::debug!(target: "trellis::model", position, removed, "collapsed item");
        if removed > 0 {
            emits.push(Emit::RangeRemoved(position + 1, removed));
        }
        emits.push(Emit::Changed(position));
        removed
    }

    /// Detaches the item at `position` into a restore entry.
    ///
    /// Collapses it first if expanded so the whole subtree leaves with the
    /// parent. The caller emits the removal notification itself (one per
    /// item or one per range).
    fn remove_one(
        state: &mut ListState<T>,
        selection: &SelectionTracker,
        position: usize,
        emits: &mut Vec<Emit>,
        restores: &mut Vec<RestoreEntry<T>>,
    ) {
        Self::collapse_at(state, selection, position, emits);

        let id = state.visible[position];
        let slot = match state.tree.parent_of(id) {
            None => RestoreSlot::Root {
                root_index: state
                    .tree
                    .root_index_of(id)
                    .unwrap_or(state.tree.roots().len()),
            },
            Some(parent) => RestoreSlot::Child {
                parent,
                child_index: state.tree.index_in_parent(id).unwrap_or(0),
            },
        };
        let Some(item) = state.tree.detach(id) else {
            tracing::warn!(target: "trellis::model", ?id, "detach failed for visible item");
            return;
        };
        state.visible.remove(position);
        selection.shift_on_remove(position, 1);
        restores.push(RestoreEntry {
            position,
            slot,
            item,
        });
        tracing::debug!(target: "trellis::model", position, "removed item");
    }

    /// Splices a restored item (and its visible descendants) back into the
    /// visible sequence and records the insert notification.
    fn splice_restored(
        state: &mut ListState<T>,
        id: ItemId,
        vis_pos: usize,
        emits: &mut Vec<Emit>,
    ) {
        let mut rows = vec![id];
        rows.extend(state.tree.visible_descendants(id));
        let span = rows.len();
        let vis_pos = vis_pos.min(state.visible.len());
        state.visible.splice(vis_pos..vis_pos, rows);
        if span == 1 {
            emits.push(Emit::Inserted(vis_pos));
        } else {
            emits.push(Emit::RangeInserted(vis_pos, span));
        }
    }

    /// Emits recorded notifications, in order, after the lock is gone.
    fn emit_all(&self, emits: Vec<Emit>) {
        for emit in emits {
            match emit {
                Emit::Inserted(pos) => self.signals.item_inserted.emit(pos),
                Emit::RangeInserted(start, count) => {
                    self.signals.item_range_inserted.emit((start, count))
                }
                Emit::Removed(pos) => self.signals.item_removed.emit(pos),
                Emit::RangeRemoved(start, count) => {
                    self.signals.item_range_removed.emit((start, count))
                }
                Emit::Changed(pos) => self.signals.item_changed.emit(pos),
                Emit::Moved(from, to) => self.signals.item_moved.emit((from, to)),
                Emit::Refresh => self.signals.full_refresh.emit(()),
            }
        }
    }
}

impl<T: Send + 'static> Default for FlexibleListController<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    type Events = Arc<Mutex<Vec<String>>>;

    fn record(list: &FlexibleListController<String>) -> Events {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let signals = list.signals();

        let e = events.clone();
        signals.item_inserted.connect(move |&p| {
            e.lock().push(format!("ins {p}"));
        });
        let e = events.clone();
        signals.item_range_inserted.connect(move |&(s, c)| {
            e.lock().push(format!("ins-range {s}+{c}"));
        });
        let e = events.clone();
        signals.item_removed.connect(move |&p| {
            e.lock().push(format!("rm {p}"));
        });
        let e = events.clone();
        signals.item_range_removed.connect(move |&(s, c)| {
            e.lock().push(format!("rm-range {s}+{c}"));
        });
        let e = events.clone();
        signals.item_changed.connect(move |&p| {
            e.lock().push(format!("chg {p}"));
        });
        let e = events.clone();
        signals.item_moved.connect(move |&(f, t)| {
            e.lock().push(format!("mv {f}->{t}"));
        });
        let e = events.clone();
        signals.full_refresh.connect(move |_| {
            e.lock().push("refresh".to_string());
        });

        events
    }

    fn filled(items: &[&str]) -> FlexibleListController<String> {
        let list = FlexibleListController::new();
        for item in items {
            list.push(item.to_string(), ItemFlags::new(), ItemKind::Plain);
        }
        list
    }

    fn contents(list: &FlexibleListController<String>) -> Vec<String> {
        (0..list.item_count())
            .map(|p| list.get(p).unwrap())
            .collect()
    }

    #[test]
    fn test_insert_and_query() {
        let list = filled(&["a", "c"]);
        let events = record(&list);

        list.insert(1, "b".to_string(), ItemFlags::new(), ItemKind::Plain);
        assert_eq!(contents(&list), vec!["a", "b", "c"]);
        assert_eq!(list.position_of(&"c".to_string()), Some(2));
        assert!(list.contains(&"b".to_string()));
        assert_eq!(*events.lock(), vec!["ins 1"]);

        // Out-of-range insert clamps to append
        list.insert(99, "d".to_string(), ItemFlags::new(), ItemKind::Plain);
        assert_eq!(list.item_count(), 4);
        assert_eq!(list.get(3), Some("d".to_string()));
    }

    #[test]
    fn test_hidden_insert_emits_nothing() {
        let list = filled(&["a"]);
        let events = record(&list);

        list.insert(
            0,
            "ghost".to_string(),
            ItemFlags::new().with_hidden(true),
            ItemKind::Plain,
        );
        assert_eq!(list.item_count(), 1);
        assert!(events.lock().is_empty());

        // The hidden item surfaces once the filter clears
        list.clear_filter();
        assert_eq!(list.item_count(), 2);
    }

    #[test]
    fn test_update_bounds_checked() {
        let list = filled(&["a", "b"]);
        let events = record(&list);

        assert!(list.update(1, "B".to_string()));
        assert_eq!(list.get(1), Some("B".to_string()));
        assert!(!list.update(5, "X".to_string()));
        assert_eq!(*events.lock(), vec!["chg 1"]);
    }

    #[test]
    fn test_expand_collapse_accounting() {
        let list = filled(&["top"]);
        let parent =
            list.insert(0, "parent".to_string(), ItemFlags::new(), ItemKind::expandable());
        list.insert_sub_item(0, 0, "c0".to_string(), ItemFlags::new(), ItemKind::Plain);
        list.insert_sub_item(0, 1, "c1".to_string(), ItemFlags::new(), ItemKind::Plain);
        let events = record(&list);

        assert_eq!(list.item_count(), 2);
        let inserted = list.expand(0);
        assert_eq!(inserted, 2);
        assert_eq!(contents(&list), vec!["parent", "c0", "c1", "top"]);
        assert!(list.is_expanded(0));

        let removed = list.collapse(0);
        assert_eq!(removed, 2);
        assert_eq!(list.item_count(), 2);
        assert!(!list.is_expanded(0));

        assert_eq!(
            *events.lock(),
            vec!["ins-range 1+2", "chg 0", "rm-range 1+2", "chg 0"]
        );
        let _ = parent;
    }

    #[test]
    fn test_expand_noop_cases() {
        let list = filled(&["plain"]);
        list.insert(1, "empty".to_string(), ItemFlags::new(), ItemKind::expandable());

        assert_eq!(list.expand(0), 0); // Not expandable
        assert_eq!(list.expand(1), 0); // No children
        assert_eq!(list.expand(9), 0); // Out of range
        assert_eq!(list.collapse(0), 0);
    }

    #[test]
    fn test_nested_expansion_survives_collapse() {
        let list = FlexibleListController::new();
        list.insert(0, "outer".to_string(), ItemFlags::new(), ItemKind::expandable());
        list.insert_sub_item(0, 0, "inner".to_string(), ItemFlags::new(), ItemKind::expandable());
        list.expand(0);
        // inner at position 1 with one grandchild
        let inner_child = list.insert_sub_item(1, 0, "deep".to_string(), ItemFlags::new(), ItemKind::Plain);
        assert!(inner_child.is_some());
        list.expand(1);
        assert_eq!(list.item_count(), 3);

        // Collapsing outer hides both levels
        assert_eq!(list.collapse(0), 2);
        assert_eq!(list.item_count(), 1);

        // Re-expanding outer brings inner back still expanded
        assert_eq!(list.expand(0), 2);
        assert_eq!(contents(&list), vec!["outer", "inner", "deep"]);
        assert!(list.is_expanded(1));
    }

    #[test]
    fn test_remove_at_collapses_first() {
        let list = filled(&["top"]);
        list.insert(0, "parent".to_string(), ItemFlags::new(), ItemKind::expandable());
        list.insert_sub_item(0, 0, "child".to_string(), ItemFlags::new(), ItemKind::Plain);
        list.expand(0);
        assert_eq!(list.item_count(), 3);
        let events = record(&list);

        list.remove_at(0);
        // Collapse notifications precede the removal itself
        assert_eq!(*events.lock(), vec!["rm-range 1+1", "chg 0", "rm 0"]);
        assert_eq!(contents(&list), vec!["top"]);

        // Restore brings the parent back with its child intact
        assert!(list.restore_deleted());
        assert_eq!(list.get(0), Some("parent".to_string()));
        assert_eq!(list.sub_item_count(0), 1);
    }

    #[test]
    fn test_remove_range_single_notification() {
        let list = filled(&["a", "b", "c", "d", "e"]);
        let events = record(&list);

        list.remove_range(1, 3);
        assert_eq!(contents(&list), vec!["a", "e"]);
        assert_eq!(*events.lock(), vec!["rm-range 1+3"]);

        // Out-of-range rejected wholesale
        list.remove_range(1, 5);
        assert_eq!(list.item_count(), 2);
    }

    #[test]
    fn test_remove_many_coalesces_runs() {
        let list = filled(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let events = record(&list);

        // 5,6,7 coalesce into one range; 2 stays single
        list.remove_many(&[5, 6, 7, 2]);
        assert_eq!(contents(&list), vec!["a", "b", "d", "e"]);
        assert_eq!(*events.lock(), vec!["rm-range 5+3", "rm 2"]);
    }

    #[test]
    fn test_remove_many_handles_duplicates_and_zero() {
        let list = filled(&["a", "b", "c"]);
        list.remove_many(&[0, 0, 1]);
        assert_eq!(contents(&list), vec!["c"]);
    }

    #[test]
    fn test_undo_restores_exact_order() {
        let list = filled(&["i0", "i1", "i2", "i3", "i4", "i5", "i6"]);

        list.remove_many(&[3, 4, 5]);
        assert_eq!(contents(&list), vec!["i0", "i1", "i2", "i6"]);
        assert_eq!(list.deleted_count(), 3);
        assert!(list.is_restore_in_time());

        assert!(list.restore_deleted());
        assert_eq!(
            contents(&list),
            vec!["i0", "i1", "i2", "i3", "i4", "i5", "i6"]
        );
        assert!(!list.is_restore_in_time());

        // Second restore has nothing to do
        assert!(!list.restore_deleted());
    }

    #[test]
    fn test_undo_merges_separate_removals() {
        let list = filled(&["a", "b", "c", "d"]);

        list.remove_at(1); // b
        list.remove_at(2); // d (shifted)
        assert_eq!(contents(&list), vec!["a", "c"]);
        assert_eq!(list.deleted_count(), 2);
        assert_eq!(list.deleted_items(), vec!["b", "d"]);

        assert!(list.restore_deleted());
        assert_eq!(contents(&list), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_undo_timer_purges_buffer() {
        let list = filled(&["a", "b"]);
        list.remove_at(0);
        list.start_undo_timer(Some(Duration::from_millis(20)));

        assert!(list.is_restore_in_time());
        std::thread::sleep(Duration::from_millis(80));
        assert!(!list.is_restore_in_time());
        assert!(!list.restore_deleted());
        assert_eq!(contents(&list), vec!["b"]);
    }

    #[test]
    fn test_undo_timer_rearm_replaces_deadline() {
        let list = filled(&["a", "b"]);
        list.remove_at(0);
        list.start_undo_timer(Some(Duration::from_millis(30)));

        // Second removal re-arms with a later deadline
        std::thread::sleep(Duration::from_millis(15));
        list.remove_at(0);
        list.start_undo_timer(Some(Duration::from_millis(100)));

        // The original deadline passing must not purge the merged buffer
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(list.deleted_count(), 2);
        assert!(list.restore_deleted());
        assert_eq!(contents(&list), vec!["a", "b"]);
    }

    #[test]
    fn test_stop_undo_timer_is_idempotent() {
        let list = filled(&["a"]);
        list.stop_undo_timer();
        list.remove_at(0);
        list.start_undo_timer(Some(Duration::from_millis(20)));
        list.stop_undo_timer();
        list.stop_undo_timer();

        std::thread::sleep(Duration::from_millis(50));
        assert!(list.is_restore_in_time()); // Deadline was cancelled
    }

    #[test]
    fn test_undo_timer_with_stopped_scheduler_keeps_buffer() {
        let scheduler = Arc::new(Scheduler::new());
        let list = FlexibleListController::with_scheduler(scheduler.clone());
        list.push("a".to_string(), ItemFlags::new(), ItemKind::Plain);
        scheduler.shutdown();

        list.remove_at(0);
        // No deadline can be armed, so the buffer stays restorable
        list.start_undo_timer(Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(40));
        assert!(list.is_restore_in_time());
        assert!(list.restore_deleted());
        assert_eq!(list.get(0), Some("a".to_string()));
    }

    #[test]
    fn test_header_linking() {
        let list = FlexibleListController::new();
        list.push(
            "Fruit".to_string(),
            ItemFlags::new().with_selectable(false),
            ItemKind::Header,
        );
        list.push("apple".to_string(), ItemFlags::new(), ItemKind::Plain);
        list.push("banana".to_string(), ItemFlags::new(), ItemKind::Plain);
        let events = record(&list);

        assert!(list.is_header(0));
        assert!(!list.is_header(1));

        assert!(list.link_to_header(1, 0));
        assert!(list.link_to_header(2, 0));
        assert_eq!(list.header_of(1), Some(0));
        assert_eq!(list.header_of(2), Some(0));
        assert_eq!(*events.lock(), vec!["chg 1", "chg 2"]);

        // Non-header targets and out-of-range positions are rejected
        assert!(!list.link_to_header(2, 1));
        assert!(!list.link_to_header(9, 0));

        assert!(list.unlink_from_header(2));
        assert_eq!(list.header_of(2), None);
        assert!(!list.unlink_from_header(2));
        assert_eq!(*events.lock(), vec!["chg 1", "chg 2", "chg 2"]);
    }

    #[test]
    fn test_header_removal_clears_links() {
        let list = FlexibleListController::new();
        list.push("Fruit".to_string(), ItemFlags::new(), ItemKind::Header);
        list.push("apple".to_string(), ItemFlags::new(), ItemKind::Plain);
        list.link_to_header(1, 0);

        list.remove_at(0);
        assert_eq!(list.header_of(0), None);

        // Restoring the header (with a fresh ID) does not resurrect the link
        assert!(list.restore_deleted());
        assert_eq!(list.get(0), Some("Fruit".to_string()));
        assert_eq!(list.header_of(1), None);
    }

    #[test]
    fn test_removed_item_keeps_header_link_through_restore() {
        let list = FlexibleListController::new();
        list.push("Fruit".to_string(), ItemFlags::new(), ItemKind::Header);
        list.push("apple".to_string(), ItemFlags::new(), ItemKind::Plain);
        list.link_to_header(1, 0);

        list.remove_at(1);
        assert!(list.restore_deleted());
        assert_eq!(list.header_of(1), Some(0));
    }

    #[test]
    fn test_selection_realigns_on_remove() {
        let list = filled(&["a", "b", "c", "d"]);
        list.selection().set_mode(crate::model::SelectionMode::Multi);
        list.toggle_selection(1);
        list.toggle_selection(3);

        list.remove_at(1);
        // b's selection vanished with it; d shifted from 3 to 2
        assert_eq!(list.selected_positions(), vec![2]);
        assert_eq!(list.get(2), Some("d".to_string()));
    }

    #[test]
    fn test_selection_realigns_on_insert_and_move() {
        let list = filled(&["a", "b", "c"]);
        list.selection().set_mode(crate::model::SelectionMode::Multi);
        list.toggle_selection(2);

        list.insert(0, "z".to_string(), ItemFlags::new(), ItemKind::Plain);
        assert_eq!(list.selected_positions(), vec![3]);

        list.move_item(3, 0);
        assert_eq!(list.selected_positions(), vec![0]);
        assert_eq!(list.get(0), Some("c".to_string()));
    }

    #[test]
    fn test_toggle_rejects_non_selectable() {
        let list = FlexibleListController::new();
        list.push("locked".to_string(), ItemFlags::disabled(), ItemKind::Plain);
        list.toggle_selection(0);
        assert_eq!(list.selected_count(), 0);
    }

    #[test]
    fn test_select_all_then_fast_clear() {
        let list = filled(&["a", "b", "c"]);
        let refreshes = Arc::new(Mutex::new(0));
        let refreshes_clone = refreshes.clone();
        list.selection().refreshed.connect(move |_| {
            *refreshes_clone.lock() += 1;
        });

        list.select_all();
        assert_eq!(list.selected_count(), 3);

        list.clear_selection();
        assert_eq!(list.selected_count(), 0);
        assert_eq!(*refreshes.lock(), 1);
    }

    #[test]
    fn test_filter_full_refresh_and_clear() {
        let list = filled(&["apple", "banana", "avocado"]);
        list.select_all();
        let events = record(&list);

        list.set_filter(|s| s.starts_with('a'));
        assert_eq!(contents(&list), vec!["apple", "avocado"]);
        assert_eq!(list.selected_count(), 0);
        assert_eq!(*events.lock(), vec!["refresh"]);

        list.clear_filter();
        assert_eq!(list.item_count(), 3);
        assert_eq!(*events.lock(), vec!["refresh", "refresh"]);
    }

    #[test]
    fn test_move_item() {
        let list = filled(&["a", "b", "c"]);
        let events = record(&list);

        assert!(list.move_item(0, 2));
        assert_eq!(contents(&list), vec!["b", "c", "a"]);
        assert_eq!(*events.lock(), vec!["mv 0->2"]);

        assert!(!list.move_item(0, 9));
        assert!(list.move_item(1, 1));
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn test_insert_snaps_past_expanded_block() {
        let list = FlexibleListController::new();
        list.push("parent".to_string(), ItemFlags::new(), ItemKind::expandable());
        list.insert_sub_item(0, 0, "child".to_string(), ItemFlags::new(), ItemKind::Plain);
        list.push("tail".to_string(), ItemFlags::new(), ItemKind::Plain);
        list.expand(0);
        assert_eq!(contents(&list), vec!["parent", "child", "tail"]);

        // Position 1 points at the child row: the new top-level item lands
        // after the whole expanded block instead of splitting it.
        list.insert(1, "new".to_string(), ItemFlags::new(), ItemKind::Plain);
        assert_eq!(contents(&list), vec!["parent", "child", "new", "tail"]);
    }

    #[test]
    fn test_insert_sub_item_into_collapsed_parent() {
        let list = FlexibleListController::new();
        list.push("parent".to_string(), ItemFlags::new(), ItemKind::expandable());
        let events = record(&list);

        // Child added while collapsed: no visible change, no notification
        let id = list.insert_sub_item(0, 0, "child".to_string(), ItemFlags::new(), ItemKind::Plain);
        assert!(id.is_some());
        assert_eq!(list.item_count(), 1);
        assert!(events.lock().is_empty());

        // Sub items under plain items are rejected
        let list2 = filled(&["plain"]);
        assert!(list2
            .insert_sub_item(0, 0, "x".to_string(), ItemFlags::new(), ItemKind::Plain)
            .is_none());
    }

    #[test]
    fn test_cross_thread_mutation_panics() {
        let list = Arc::new(filled(&["a"]));
        let list_clone = list.clone();
        let result = std::thread::spawn(move || {
            list_clone.remove_at(0);
        })
        .join();
        assert!(result.is_err(), "structural edit off-thread must panic");

        // Read-only queries from other threads are fine
        let list_clone = list.clone();
        let count = std::thread::spawn(move || list_clone.item_count())
            .join()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_modify_in_place() {
        let list = filled(&["small"]);
        let len = list.modify(0, |s| {
            s.push_str("er");
            s.len()
        });
        assert_eq!(len, Some(7));
        assert_eq!(list.get(0), Some("smaller".to_string()));
        assert_eq!(list.modify(9, |_| ()), None);
    }
}
