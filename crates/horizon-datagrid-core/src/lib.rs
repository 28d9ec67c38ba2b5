//! Core systems for Horizon DataGrid.
//!
//! This crate provides the foundational machinery shared by the DataGrid
//! model/view layers:
//!
//! - **Signal/Slot System**: Type-safe, synchronous change notification
//! - **Thread Affinity**: Fail-fast verification that mutable grid state is
//!   only touched from the thread that owns it
//! - **Logging**: `tracing` target constants for per-subsystem filtering
//!
//! Unlike a full GUI event loop, everything here is deliberately synchronous:
//! the DataGrid's internal bookkeeping (flattened hierarchies, slot tables,
//! selection indices) relies on change notifications being delivered in the
//! exact order the mutations happened. Slots run inline on the emitting
//! thread, and cross-thread mutation of affine state is a hard usage error
//! rather than something to marshal.
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_datagrid_core::Signal;
//!
//! let value_changed = Signal::<i32>::new();
//!
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! value_changed.emit(42);
//!
//! value_changed.disconnect(conn_id);
//! ```

pub mod logging;
pub mod signal;
pub mod thread_check;

pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use thread_check::ThreadAffinity;
