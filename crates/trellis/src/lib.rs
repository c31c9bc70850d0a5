//! Trellis - list and tree containers with selection, expansion, and
//! undoable removal.
//!
//! The main entry point is [`model::FlexibleListController`], which keeps a
//! flat visible sequence over a hierarchical item store and notifies
//! observers through signals.
//!
//! # Example
//!
//! ```
//! use trellis::model::{FlexibleListController, ItemFlags, ItemKind};
//!
//! let list = FlexibleListController::new();
//! list.push("first".to_string(), ItemFlags::new(), ItemKind::Plain);
//! list.push("second".to_string(), ItemFlags::new(), ItemKind::Plain);
//!
//! list.remove_at(0);
//! assert!(list.restore_deleted());
//! assert_eq!(list.item_count(), 2);
//! ```

pub use trellis_core::*;

pub mod model;
