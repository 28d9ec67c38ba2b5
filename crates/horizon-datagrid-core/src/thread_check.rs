//! Thread affinity verification for Horizon DataGrid.
//!
//! The grid's internal state (flattened hierarchies, slot tables, selection
//! indices) is not synchronized for concurrent access. All mutation must
//! happen on the thread that owns the grid (in an application, the UI
//! thread). Mutating a model or the grid from any other thread is a usage
//! error, and the contract is to fail fast with a descriptive panic rather
//! than attempt cross-thread marshaling.
//!
//! [`ThreadAffinity`] records the owning thread at construction time and is
//! asserted at every public mutating entry point:
//!
//! ```
//! use horizon_datagrid_core::ThreadAffinity;
//!
//! struct Model {
//!     affinity: ThreadAffinity,
//!     rows: std::cell::RefCell<Vec<String>>,
//! }
//!
//! impl Model {
//!     fn new() -> Self {
//!         Self {
//!             affinity: ThreadAffinity::current(),
//!             rows: std::cell::RefCell::new(Vec::new()),
//!         }
//!     }
//!
//!     fn push(&self, row: String) {
//!         self.affinity.assert_same_thread();
//!         self.rows.borrow_mut().push(row);
//!     }
//! }
//! ```
//!
//! The check runs in release builds too: a silently corrupted slot table is
//! far harder to diagnose than an early panic at the offending call site.

use std::thread::ThreadId;

/// Thread affinity tracker for grid models.
///
/// Records the thread on which an object was created and verifies that
/// subsequent operations occur on the same thread. The assertion runs
/// *before* any state is touched, so a violating call leaves the object
/// unchanged.
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
    /// # Panics
    ///
    /// Panics with a descriptive message if called from a different thread.
    #[inline]
    pub fn assert_same_thread(&self) {
        self.assert_same_thread_with_msg("grid state accessed from wrong thread")
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

    #[cold]
    #[inline(never)]
    fn panic_wrong_thread(&self, msg: &str) -> ! {
        let current = std::thread::current();
        let current_name = current.name().unwrap_or("<unnamed>");
        let current_id = current.id();

        panic!(
            "\n\
            ══════════════════════════════════════════════════════════════════\n\
            THREAD AFFINITY VIOLATION\n\
            ══════════════════════════════════════════════════════════════════\n\
            \n\
            {msg}\n\
            \n\
            Object was created on thread: {:?}\n\
            Current thread: \"{current_name}\" (ID: {current_id:?})\n\
            \n\
            The DataGrid's models keep index-addressable views (flattened\n\
            hierarchy, slot table, selection) that are not synchronized for\n\
            concurrent access. Mutate bound collections and models only from\n\
            the thread that created them, and deliver results from worker\n\
            threads back to that thread before applying them.\n\
            \n\
            ══════════════════════════════════════════════════════════════════",
            self.thread_id
        )
    }
}
