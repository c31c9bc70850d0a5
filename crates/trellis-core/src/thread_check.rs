//! Thread affinity verification utilities for Trellis.
//!
//! Containers in this workspace are owned by a single thread: the thread that
//! created them performs all structural edits, while read-only queries may
//! come from anywhere. This module provides the runtime checks that enforce
//! the ownership side of that contract.
//!
//! # Usage
//!
//! ```
//! use trellis_core::thread_check::ThreadAffinity;
//!
//! struct MyContainer {
//!     affinity: ThreadAffinity,
//!     items: std::cell::RefCell<Vec<i32>>,
//! }
//!
//! impl MyContainer {
//!     fn new() -> Self {
//!         Self {
//!             affinity: ThreadAffinity::current(),
//!             items: std::cell::RefCell::new(Vec::new()),
//!         }
//!     }
//!
//!     fn push(&self, value: i32) {
//!         // Panic if a structural edit comes from the wrong thread
//!         self.affinity.assert_same_thread();
//!         self.items.borrow_mut().push(value);
//!     }
//! }
//! ```
//!
//! Two levels of checking are provided:
//!
//! - **Debug assertions** ([`ThreadAffinity::debug_assert_same_thread`]): Only
//!   active in debug builds. Use these liberally for zero-cost production
//!   performance.
//! - **Runtime assertions** ([`ThreadAffinity::assert_same_thread`]): Always
//!   active. Use for structural mutations where a silent cross-thread edit
//!   would corrupt bookkeeping.

use std::thread::ThreadId;

/// Thread affinity tracker for objects.
///
/// This struct records the thread on which an object was created and provides
/// methods to verify that subsequent operations occur on the same thread.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Create a new thread affinity tracker for the current thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// Get the thread ID this affinity is bound to.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Check if the current thread matches this affinity.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Assert that we are on the same thread as the affinity.
    ///
    /// This always runs (debug and release builds).
    ///
    /// # Panics
    ///
    /// Panics with a descriptive message if called from a different thread.
    #[inline]
    pub fn assert_same_thread(&self) {
        self.assert_same_thread_with_msg("object accessed from wrong thread")
    }

    /// Assert that we are on the same thread, with a custom message.
    ///
    /// # Panics
    ///
    /// Panics if called from a different thread.
    pub fn assert_same_thread_with_msg(&self, msg: &str) {
        if !self.is_same_thread() {
            self.panic_wrong_thread(msg);
        }
    }

    /// Debug-only assertion that we are on the same thread.
    ///
    /// This is a no-op in release builds.
    #[inline]
    pub fn debug_assert_same_thread(&self) {
        #[cfg(debug_assertions)]
        self.assert_same_thread();
    }

    /// Debug-only assertion with a custom message.
    #[inline]
    pub fn debug_assert_same_thread_with_msg(&self, msg: &str) {
        #[cfg(debug_assertions)]
        self.assert_same_thread_with_msg(msg);
    }

    #[cold]
    #[inline(never)]
    fn panic_wrong_thread(&self, msg: &str) -> ! {
        let current = std::thread::current();
        let current_name = current.name().unwrap_or("<unnamed>");
        let current_id = current.id();

        panic!(
            "\n\
            ══════════════════════════════════════════════════════════════════════\n\
            THREAD AFFINITY VIOLATION\n\
            ══════════════════════════════════════════════════════════════════════\n\
            \n\
            {msg}\n\
            \n\
            Object was created on thread: {:?}\n\
            Current thread: \"{current_name}\" (ID: {current_id:?})\n\
            \n\
            This object has thread affinity and must only be mutated from the\n\
            thread on which it was created. Structural edits (insert, remove,\n\
            move, expand, collapse) from other threads would race with observer\n\
            notifications and corrupt position bookkeeping.\n\
            \n\
            POSSIBLE SOLUTIONS:\n\
            \n\
            1. Route the edit through the owning thread\n\
            2. Use a signal connection to request the edit from the owner\n\
            3. Perform only read-only queries from other threads\n\
            \n\
            ══════════════════════════════════════════════════════════════════════",
            self.thread_id
        )
    }
}
