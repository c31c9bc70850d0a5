//! Batched dispatch of visual change units.
//!
//! A view layer reacts to structural notifications by preparing one change
//! unit per affected row (a removal fade, a move slide, an insertion fade).
//! [`PendingChangeQueue`] collects those units and flushes them in the fixed
//! order removals, then moves, then additions, so rows leave the screen
//! before survivors slide and newcomers appear. The actual visual work is
//! behind the [`ChangeDispatcher`] trait; the queue only owns ordering and
//! completion bookkeeping.

use std::collections::HashSet;

use trellis_core::Signal;

/// Caller-chosen identity of one change unit (typically a row's stable ID).
pub type ChangeHandle = u64;

/// Receives the flushed change units.
///
/// `start_*` is called once per unit during [`PendingChangeQueue::run_pending`];
/// the implementation reports completion back via
/// [`PendingChangeQueue::finish`]. `cancel` is called for units torn down by
/// [`end_change`](PendingChangeQueue::end_change) or
/// [`end_all_changes`](PendingChangeQueue::end_all_changes), whether or not
/// they were dispatched yet.
pub trait ChangeDispatcher {
    /// Begin the removal unit for `handle`.
    fn start_remove(&mut self, handle: ChangeHandle);

    /// Begin the move unit for `handle`.
    fn start_move(&mut self, handle: ChangeHandle, from: usize, to: usize);

    /// Begin the addition unit for `handle`.
    fn start_add(&mut self, handle: ChangeHandle);

    /// A unit was torn down before completing on its own.
    fn cancel(&mut self, handle: ChangeHandle) {
        let _ = handle;
    }
}

/// A queued move unit.
#[derive(Debug, Clone, Copy)]
struct MoveUnit {
    handle: ChangeHandle,
    from: usize,
    to: usize,
}

/// Collects change units and flushes them in remove, move, add order.
///
/// # Completion contract
///
/// Every unit that enters the queue leaves it through exactly one of:
/// [`finish`](Self::finish) (normal completion),
/// [`end_change`](Self::end_change), or
/// [`end_all_changes`](Self::end_all_changes). Each exit emits
/// [`unit_finished`](Self::unit_finished) for the unit; the transition to a
/// fully idle queue emits [`finished`](Self::finished) exactly once per
/// batch.
///
/// # Example
///
/// ```
/// use trellis::model::{ChangeDispatcher, ChangeHandle, PendingChangeQueue};
///
/// struct Immediate(Vec<ChangeHandle>);
/// impl ChangeDispatcher for Immediate {
///     fn start_remove(&mut self, handle: ChangeHandle) { self.0.push(handle); }
///     fn start_move(&mut self, handle: ChangeHandle, _: usize, _: usize) { self.0.push(handle); }
///     fn start_add(&mut self, handle: ChangeHandle) { self.0.push(handle); }
/// }
///
/// let mut queue = PendingChangeQueue::new();
/// queue.enqueue_remove(7);
/// queue.enqueue_add(9);
///
/// let mut dispatcher = Immediate(Vec::new());
/// queue.run_pending(&mut dispatcher);
/// assert_eq!(dispatcher.0, vec![7, 9]);
///
/// queue.finish(7);
/// queue.finish(9);
/// assert!(!queue.is_running());
/// ```
pub struct PendingChangeQueue {
    pending_removes: Vec<ChangeHandle>,
    pending_moves: Vec<MoveUnit>,
    pending_adds: Vec<ChangeHandle>,
    /// Units dispatched to the [`ChangeDispatcher`] but not yet finished.
    active: HashSet<ChangeHandle>,
    /// A unit completed or was torn down.
    pub unit_finished: Signal<ChangeHandle>,
    /// The queue became fully idle.
    pub finished: Signal<()>,
}

impl PendingChangeQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            pending_removes: Vec::new(),
            pending_moves: Vec::new(),
            pending_adds: Vec::new(),
            active: HashSet::new(),
            unit_finished: Signal::new(),
            finished: Signal::new(),
        }
    }

    /// Whether `handle` is anywhere in the queue (pending or active).
    fn knows(&self, handle: ChangeHandle) -> bool {
        self.active.contains(&handle)
            || self.pending_removes.contains(&handle)
            || self.pending_adds.contains(&handle)
            || self.pending_moves.iter().any(|m| m.handle == handle)
    }

    /// Queues a removal unit.
    ///
    /// Returns `true` when the caller should request a flush. A handle
    /// already queued or active is rejected.
    pub fn enqueue_remove(&mut self, handle: ChangeHandle) -> bool {
        if self.knows(handle) {
            tracing::warn!(target: "trellis::model", handle, "duplicate change unit rejected");
            return false;
        }
        self.pending_removes.push(handle);
        true
    }

    /// Queues a move unit.
    ///
    /// A move with no distance completes trivially and is rejected, as is a
    /// handle already queued or active.
    pub fn enqueue_move(&mut self, handle: ChangeHandle, from: usize, to: usize) -> bool {
        if from == to || self.knows(handle) {
            return false;
        }
        self.pending_moves.push(MoveUnit { handle, from, to });
        true
    }

    /// Queues an addition unit.
    ///
    /// Returns `true` when the caller should request a flush.
    pub fn enqueue_add(&mut self, handle: ChangeHandle) -> bool {
        if self.knows(handle) {
            tracing::warn!(target: "trellis::model", handle, "duplicate change unit rejected");
            return false;
        }
        self.pending_adds.push(handle);
        true
    }

    /// Whether any units are waiting for the next flush.
    pub fn has_pending(&self) -> bool {
        !self.pending_removes.is_empty()
            || !self.pending_moves.is_empty()
            || !self.pending_adds.is_empty()
    }

    /// Whether any units are pending or still running.
    pub fn is_running(&self) -> bool {
        !self.active.is_empty() || self.has_pending()
    }

    /// Flushes every pending unit to the dispatcher.
    ///
    /// Removals go first, highest position handles first so earlier rows
    /// keep their slots while later rows leave. Moves follow in enqueue
    /// order, then additions ascending. Dispatched units become active until
    /// [`finish`](Self::finish) is called for them.
    pub fn run_pending(&mut self, dispatcher: &mut impl ChangeDispatcher) {
        if !self.has_pending() {
            return;
        }
        tracing::debug!(
            target: "trellis::model",
            removes = self.pending_removes.len(),
            moves = self.pending_moves.len(),
            adds = self.pending_adds.len(),
            "flushing pending change units"
        );

        self.pending_removes.sort_unstable_by(|a, b| b.cmp(a));
        for handle in std::mem::take(&mut self.pending_removes) {
            self.active.insert(handle);
            dispatcher.start_remove(handle);
        }

        for unit in std::mem::take(&mut self.pending_moves) {
            self.active.insert(unit.handle);
            dispatcher.start_move(unit.handle, unit.from, unit.to);
        }

        self.pending_adds.sort_unstable();
        for handle in std::mem::take(&mut self.pending_adds) {
            self.active.insert(handle);
            dispatcher.start_add(handle);
        }
    }

    /// Marks an active unit as completed.
    ///
    /// Returns `false` for unknown handles. Emits `unit_finished`, and
    /// `finished` when this was the last outstanding unit.
    pub fn finish(&mut self, handle: ChangeHandle) -> bool {
        if !self.active.remove(&handle) {
            return false;
        }
        self.unit_finished.emit(handle);
        if !self.is_running() {
            self.finished.emit(());
        }
        true
    }

    /// Tears down one unit, dispatched or not.
    ///
    /// The dispatcher's `cancel` runs even for units that were still
    /// pending, and the unit counts toward completion like a normal finish.
    /// Returns `false` for unknown handles.
    pub fn end_change(&mut self, handle: ChangeHandle, dispatcher: &mut impl ChangeDispatcher) -> bool {
        let was_running = self.is_running();
        let mut found = self.active.remove(&handle);

        if !found {
            let before = self.pending_removes.len();
            self.pending_removes.retain(|&h| h != handle);
            found |= self.pending_removes.len() != before;
        }
        if !found {
            let before = self.pending_moves.len();
            self.pending_moves.retain(|m| m.handle != handle);
            found |= self.pending_moves.len() != before;
        }
        if !found {
            let before = self.pending_adds.len();
            self.pending_adds.retain(|&h| h != handle);
            found |= self.pending_adds.len() != before;
        }

        if !found {
            return false;
        }

        dispatcher.cancel(handle);
        self.unit_finished.emit(handle);
        if was_running && !self.is_running() {
            self.finished.emit(());
        }
        true
    }

    /// Tears down every unit in the queue.
    ///
    /// Each unit gets a `cancel` callback and a `unit_finished` emission;
    /// `finished` fires once at the end if anything was outstanding.
    pub fn end_all_changes(&mut self, dispatcher: &mut impl ChangeDispatcher) {
        let was_running = self.is_running();

        let mut handles: Vec<ChangeHandle> = std::mem::take(&mut self.pending_removes);
        handles.extend(std::mem::take(&mut self.pending_moves).into_iter().map(|m| m.handle));
        handles.extend(std::mem::take(&mut self.pending_adds));
        handles.extend(self.active.drain());

        for handle in &handles {
            dispatcher.cancel(*handle);
        }
        for handle in handles {
            self.unit_finished.emit(handle);
        }

        if was_running {
            self.finished.emit(());
        }
    }
}

impl Default for PendingChangeQueue {
    fn default() -> Self {
        Self::new()
    }
}
