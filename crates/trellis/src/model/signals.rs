//! Change notification signals for list containers.

use trellis_core::Signal;

/// Signals emitted by [`crate::model::FlexibleListController`] when the
/// visible sequence changes.
///
/// One structural edit produces exactly one structural notification (plus
/// any notifications for side effects such as an automatic collapse before
/// removal). Positions in insert notifications refer to the post-change
/// sequence; positions in remove notifications refer to the pre-change
/// sequence. Range payloads are `(start, count)`.
///
/// Signals fire after the container's internal lock is released, so slots
/// may query the container freely.
///
/// # Example
///
/// ```
/// use trellis::model::ListSignals;
///
/// let signals = ListSignals::new();
/// signals.item_range_removed.connect(|&(start, count)| {
///     println!("{count} items removed starting at {start}");
/// });
/// signals.item_range_removed.emit((2, 3));
/// ```
pub struct ListSignals {
    /// A single item was inserted at the given position.
    pub item_inserted: Signal<usize>,
    /// `count` items were inserted starting at `start`: `(start, count)`.
    pub item_range_inserted: Signal<(usize, usize)>,
    /// A single item was removed from the given position.
    pub item_removed: Signal<usize>,
    /// `count` items were removed starting at `start`: `(start, count)`.
    pub item_range_removed: Signal<(usize, usize)>,
    /// The item at the given position changed in place.
    pub item_changed: Signal<usize>,
    /// An item moved: `(from, to)`, both in the respective pre/post sequences.
    pub item_moved: Signal<(usize, usize)>,
    /// The whole sequence changed; observers should re-query everything.
    pub full_refresh: Signal<()>,
}

impl ListSignals {
    /// Creates a new set of signals with no connections.
    pub fn new() -> Self {
        Self {
            item_inserted: Signal::new(),
            item_range_inserted: Signal::new(),
            item_removed: Signal::new(),
            item_range_removed: Signal::new(),
            item_changed: Signal::new(),
            item_moved: Signal::new(),
            full_refresh: Signal::new(),
        }
    }

    /// Blocks or unblocks all structural signals at once.
    pub fn set_blocked(&self, blocked: bool) {
        self.item_inserted.set_blocked(blocked);
        self.item_range_inserted.set_blocked(blocked);
        self.item_removed.set_blocked(blocked);
        self.item_range_removed.set_blocked(blocked);
        self.item_changed.set_blocked(blocked);
        self.item_moved.set_blocked(blocked);
        self.full_refresh.set_blocked(blocked);
    }
}

impl Default for ListSignals {
    fn default() -> Self {
        Self::new()
    }
}
