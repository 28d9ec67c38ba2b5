//! Signal/slot system for Horizon DataGrid.
//!
//! This module provides a type-safe, Qt-inspired signal/slot mechanism for
//! change notification between the grid's models, adapters, and views.
//! Signals are emitted by models when their state changes, and connected
//! slots (callbacks) are invoked in response.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The main signal type for emitting notifications
//! - [`ConnectionId`] - Unique identifier returned when connecting a slot
//! - [`ConnectionGuard`] - RAII guard that disconnects when dropped
//!
//! # Ordering
//!
//! All slots run synchronously, inline on the emitting thread, in connection
//! order. The grid's flattening and slot bookkeeping depend on notifications
//! arriving in exactly the order the mutations happened, so there is no
//! queued or cross-thread delivery here: a component that needs work on
//! another thread must arrange that itself, outside the grid.
//!
//! # Example
//!
//! ```
//! use horizon_datagrid_core::Signal;
//!
//! // Create a signal that passes a string argument
//! let text_changed = Signal::<String>::new();
//!
//! // Connect a slot (closure)
//! let conn_id = text_changed.connect(|text| {
//!     println!("Text changed to: {}", text);
//! });
//!
//! // Emit the signal
//! text_changed.emit("Hello, World!".to_string());
//!
//! // Disconnect when done
//! text_changed.disconnect(conn_id);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via
    /// [`Signal::disconnect`]. The ID remains valid until the connection is
    /// explicitly disconnected or the signal is dropped.
    pub struct ConnectionId;
}

/// Internal storage for a single connection.
struct Connection<Args> {
    slot: Arc<dyn Fn(&Args) + Send + Sync>,
}

/// A type-safe signal that can have multiple connected slots.
///
/// When a signal is emitted, all connected slots are invoked with the
/// provided arguments, synchronously and in connection order.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for
///   signals with no arguments, or a tuple like `(String, i32)` for multiple
///   arguments.
///
/// # Re-entrancy
///
/// A slot may connect or disconnect other slots on the same signal while it
/// runs; the emission in progress operates on a snapshot of the connection
/// table taken when `emit` was called.
pub struct Signal<Args> {
    /// All active connections.
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
    /// Whether signal emission is temporarily blocked.
    blocked: AtomicBool,
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// Returns a `ConnectionId` that can be used to disconnect the slot later.
    ///
    /// # Example
    ///
    /// ```
    /// use horizon_datagrid_core::Signal;
    ///
    /// let signal = Signal::<String>::new();
    /// let id = signal.connect(|s| println!("Got: {}", s));
    /// signal.emit("Hello".to_string());
    /// ```
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let connection = Connection {
            slot: Arc::new(slot),
        };
        self.connections.lock().insert(connection)
    }

    /// Connect a slot and return an RAII guard for it.
    ///
    /// The connection is removed when the returned [`ConnectionGuard`] is
    /// dropped. Useful for adapters whose lifetime is shorter than the
    /// model they observe.
    pub fn connect_guarded<F>(self: &Arc<Self>, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard {
            signal: Arc::clone(self),
            id,
        }
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false`
    /// otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Block signal emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing. Deferred-refresh scopes
    /// use this to suppress intermediate notifications during batch updates.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots synchronously.
    ///
    /// If the signal is blocked, this does nothing.
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(
                target: crate::logging::targets::SIGNAL,
                "signal blocked, skipping emit"
            );
            return;
        }

        // Snapshot the slots so a slot can connect/disconnect re-entrantly.
        let slots: Vec<Arc<dyn Fn(&Args) + Send + Sync>> = {
            let connections = self.connections.lock();
            connections.iter().map(|(_, c)| c.slot.clone()).collect()
        };

        tracing::trace!(
            target: crate::logging::targets::SIGNAL,
            connection_count = slots.len(),
            "emitting signal"
        );

        for slot in slots {
            slot(&args);
        }
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connection_count", &self.connection_count())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

/// RAII guard for a signal connection.
///
/// Disconnects the slot when dropped. Obtained via
/// [`Signal::connect_guarded`].
pub struct ConnectionGuard<Args> {
    signal: Arc<Signal<Args>>,
    id: ConnectionId,
}

impl<Args> ConnectionGuard<Args> {
    /// The connection ID held by this guard.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        self.signal.disconnect(self.id);
    }
}

impl<Args> std::fmt::Debug for ConnectionGuard<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard").field("id", &self.id).finish()
    }
}
