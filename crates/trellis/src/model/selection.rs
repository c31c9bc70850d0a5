//! Position-based selection tracking.
//!
//! [`SelectionTracker`] keeps the set of selected positions for a flat
//! visible sequence. It does not know about the items themselves; the
//! owning container realigns the tracked positions whenever the sequence
//! shifts (see the `shift_on_*` methods) so selection follows items through
//! inserts and removes.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use trellis_core::Signal;

/// How many items may be selected at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionMode {
    /// Toggling a position first clears any other selection.
    #[default]
    Single,
    /// Positions accumulate; each toggle flips one position independently.
    Multi,
}

/// A serializable snapshot of the selected positions.
///
/// Snapshots capture positions, not items. Restoring a snapshot is only
/// meaningful while the sequence still has the same shape (the typical
/// save/restore-across-recreation cycle).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    positions: Vec<usize>,
}

impl SelectionSnapshot {
    /// The selected positions, ascending.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Number of selected positions in the snapshot.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Internal state behind the tracker's mutex.
#[derive(Debug, Default)]
struct TrackerState {
    mode: SelectionMode,
    selected: HashSet<usize>,
}

/// Tracks which positions of a visible sequence are selected.
///
/// All methods take `&self`; state lives behind a mutex and the signals fire
/// after the lock is released, so slots may query the tracker re-entrantly.
///
/// # Signals
///
/// - [`changed`](Self::changed): the selection state of one position flipped.
///   The tracker state is updated before the signal fires, so a slot querying
///   [`is_selected`](Self::is_selected) sees the new state.
/// - [`refreshed`](Self::refreshed): the whole selection was discarded at
///   once (fast clear); observers should re-query every position.
///
/// # Example
///
/// ```
/// use trellis::model::{SelectionMode, SelectionTracker};
///
/// let tracker = SelectionTracker::with_mode(SelectionMode::Multi);
/// tracker.toggle(2);
/// tracker.toggle(5);
/// assert_eq!(tracker.selected_positions(), vec![2, 5]);
///
/// tracker.toggle(2);
/// assert!(!tracker.is_selected(2));
/// ```
pub struct SelectionTracker {
    state: Mutex<TrackerState>,
    /// The selection state of one position flipped.
    pub changed: Signal<usize>,
    /// The whole selection was discarded; re-query every position.
    pub refreshed: Signal<()>,
}

impl SelectionTracker {
    /// Creates a tracker in [`SelectionMode::Single`].
    pub fn new() -> Self {
        Self::with_mode(SelectionMode::default())
    }

    /// Creates a tracker with the given mode.
    pub fn with_mode(mode: SelectionMode) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                mode,
                selected: HashSet::new(),
            }),
            changed: Signal::new(),
            refreshed: Signal::new(),
        }
    }

    /// The current selection mode.
    pub fn mode(&self) -> SelectionMode {
        self.state.lock().mode
    }

    /// Switches the selection mode.
    ///
    /// The current selection is kept as-is; in `Single` mode the next toggle
    /// collapses it to one position.
    pub fn set_mode(&self, mode: SelectionMode) {
        self.state.lock().mode = mode;
    }

    /// Whether the given position is selected.
    pub fn is_selected(&self, position: usize) -> bool {
        self.state.lock().selected.contains(&position)
    }

    /// Number of selected positions.
    pub fn count(&self) -> usize {
        self.state.lock().selected.len()
    }

    /// The selected positions, ascending.
    pub fn selected_positions(&self) -> Vec<usize> {
        let mut positions: Vec<usize> = self.state.lock().selected.iter().copied().collect();
        positions.sort_unstable();
        positions
    }

    /// Toggles the selection state of one position.
    ///
    /// In `Single` mode any other selection is cleared first (each cleared
    /// position gets its own `changed` emission) and the position always
    /// ends up selected. In `Multi` mode the position flips independently.
    pub fn toggle(&self, position: usize) {
        let mut cleared = Vec::new();
        {
            let mut state = self.state.lock();
            if state.mode == SelectionMode::Single {
                cleared = state
                    .selected
                    .iter()
                    .copied()
                    .filter(|&p| p != position)
                    .collect();
                cleared.sort_unstable();
                for p in &cleared {
                    state.selected.remove(p);
                }
            }
            if !state.selected.remove(&position) {
                state.selected.insert(position);
            }
            tracing::debug!(
                target: "trellis::model",
                position,
                selected_count = state.selected.len(),
                "toggled selection"
            );
        }

        for p in cleared {
            self.changed.emit(p);
        }
        self.changed.emit(position);
    }

    /// Selects every position in `0..total_count`.
    ///
    /// Emits `changed` for each position.
    pub fn select_all(&self, total_count: usize) {
        {
            let mut state = self.state.lock();
            state.selected = (0..total_count).collect();
        }
        tracing::debug!(target: "trellis::model", total_count, "selected all");
        for position in 0..total_count {
            self.changed.emit(position);
        }
    }

    /// Clears the selection.
    ///
    /// When every one of the `total_count` positions is selected, the set is
    /// discarded in one step and a single `refreshed` fires instead of a
    /// `changed` per position.
    pub fn clear(&self, total_count: usize) {
        let cleared = {
            let mut state = self.state.lock();
            if state.selected.is_empty() {
                return;
            }
            if state.selected.len() == total_count {
                state.selected.clear();
                None
            } else {
                let mut positions: Vec<usize> = std::mem::take(&mut state.selected)
                    .into_iter()
                    .collect();
                positions.sort_unstable();
                Some(positions)
            }
        };

        match cleared {
            None => {
                tracing::debug!(target: "trellis::model", total_count, "fast-cleared selection");
                self.refreshed.emit(());
            }
            Some(positions) => {
                tracing::debug!(
                    target: "trellis::model",
                    count = positions.len(),
                    "cleared selection"
                );
                for position in positions {
                    self.changed.emit(position);
                }
            }
        }
    }

    /// Silently removes one position from the set, if present.
    ///
    /// No `changed` fires; the caller is expected to notify the position as
    /// part of a larger structural change (typically its removal).
    pub fn deselect_silent(&self, position: usize) {
        self.state.lock().selected.remove(&position);
    }

    /// Silently discards the whole selection.
    ///
    /// Used when the sequence is rebuilt wholesale and a `full_refresh`
    /// already tells observers to re-query everything.
    pub fn reset(&self) {
        self.state.lock().selected.clear();
    }

    /// Realigns positions after `count` items were inserted at `start`.
    ///
    /// Selected positions at or beyond `start` shift up. Silent.
    pub fn shift_on_insert(&self, start: usize, count: usize) {
        let mut state = self.state.lock();
        let old = std::mem::take(&mut state.selected);
        state.selected = old
            .into_iter()
            .map(|p| if p >= start { p + count } else { p })
            .collect();
    }

    /// Realigns positions after `count` items were removed at `start`.
    ///
    /// Selected positions inside the removed range are dropped; positions
    /// beyond it shift down. Silent.
    pub fn shift_on_remove(&self, start: usize, count: usize) {
        let mut state = self.state.lock();
        let old = std::mem::take(&mut state.selected);
        state.selected = old
            .into_iter()
            .filter(|&p| p < start || p >= start + count)
            .map(|p| if p >= start + count { p - count } else { p })
            .collect();
    }

    /// Realigns positions after the item at `from` moved to `to`.
    ///
    /// The moved position follows its item; positions between the two slots
    /// shift by one. Silent.
    pub fn shift_on_move(&self, from: usize, to: usize) {
        if from == to {
            return;
        }
        let mut state = self.state.lock();
        let old = std::mem::take(&mut state.selected);
        state.selected = old
            .into_iter()
            .map(|p| {
                if p == from {
                    to
                } else if from < to && p > from && p <= to {
                    p - 1
                } else if to < from && p >= to && p < from {
                    p + 1
                } else {
                    p
                }
            })
            .collect();
    }

    /// Captures the current selection for persistence.
    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            positions: self.selected_positions(),
        }
    }

    /// Replaces the selection with a previously captured snapshot. Silent.
    pub fn restore(&self, snapshot: &SelectionSnapshot) {
        let mut state = self.state.lock();
        state.selected = snapshot.positions.iter().copied().collect();
    }
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
