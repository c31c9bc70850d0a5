//! List and tree containers with change notifications.
//!
//! This module provides the building blocks for data-driven list UIs: a
//! flat list facade over a hierarchical item store, with selection,
//! expand/collapse, filtering, section headers, staged change dispatch, and
//! undoable removal. Observers subscribe to fine-grained structural signals
//! instead of diffing snapshots.
//!
//! # Core Types
//!
//! - `FlexibleListController`: The facade tying everything together
//! - `ExpandableTree`: Hierarchical item store with visibility projection
//! - `SelectionTracker`: Position-based selection with single/multi modes
//! - `PendingChangeQueue`: Stages remove/move/add units for batched dispatch
//! - `ListSignals`: The structural change notification set
//! - `ItemFlags` / `ItemKind`: Per-item capabilities and shape
//!
//! # Example
//!
//! ```
//! use trellis::model::{FlexibleListController, ItemFlags, ItemKind};
//!
//! let list = FlexibleListController::new();
//! list.push("inbox".to_string(), ItemFlags::new(), ItemKind::expandable());
//! list.insert_sub_item(0, 0, "unread".to_string(), ItemFlags::new(), ItemKind::Plain);
//!
//! list.signals().item_range_inserted.connect(|&(start, count)| {
//!     println!("{count} rows appeared at {start}");
//! });
//!
//! assert_eq!(list.expand(0), 1);
//! assert_eq!(list.item_count(), 2);
//! ```
//!
//! # Positions and IDs
//!
//! Public positions index the *visible* sequence: hidden items and the
//! children of collapsed items do not count. Positions shift with every
//! structural edit, so anything that must survive edits holds an [`ItemId`]
//! instead.
//!
//! # Threading
//!
//! Containers are owned by the thread that created them. Structural edits
//! assert thread affinity; read-only queries are allowed from any thread.
//! Signals always fire on the editing thread, after internal locks are
//! released.

mod controller;
mod item;
mod pending;
mod selection;
mod signals;
mod tree;

pub use controller::{FlexibleListController, DEFAULT_UNDO_TIMEOUT};
pub use item::{ItemFlags, ItemId, ItemKind};
pub use pending::{ChangeDispatcher, ChangeHandle, PendingChangeQueue};
pub use selection::{SelectionMode, SelectionSnapshot, SelectionTracker};
pub use signals::ListSignals;
pub use tree::{DetachedItem, ExpandableTree};
