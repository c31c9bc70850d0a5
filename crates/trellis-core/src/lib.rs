//! Core systems for Trellis.
//!
//! This crate provides the foundational components of the Trellis list toolkit:
//!
//! - **Signal/Slot System**: Type-safe change notification
//! - **Scheduler**: Cancellable delayed callbacks on a dedicated timer thread
//! - **Thread Affinity**: Runtime checks for single-owner-thread containers
//!
//! # Signal/Slot Example
//!
//! ```
//! use trellis_core::Signal;
//!
//! // Create a signal that notifies when an item changes
//! let item_changed = Signal::<usize>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = item_changed.connect(|&position| {
//!     println!("Item changed at position {}", position);
//! });
//!
//! // Emit the signal
//! item_changed.emit(7);
//!
//! // Disconnect when done
//! item_changed.disconnect(conn_id);
//! ```
//!
//! # Scheduler Example
//!
//! ```
//! use trellis_core::Scheduler;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new();
//! let id = scheduler.schedule_once(Duration::from_millis(10), || {
//!     println!("Deadline reached");
//! }).unwrap();
//!
//! // Deadlines can be cancelled until they fire
//! scheduler.cancel(id).ok();
//! ```

mod error;
pub mod logging;
mod scheduler;
pub mod signal;
pub mod thread_check;

pub use error::{Result, SchedulerError, TrellisError};
pub use scheduler::{Scheduler, TaskId};
pub use signal::{ConnectionId, Signal};
pub use thread_check::ThreadAffinity;
