//! Logging facilities for Horizon DataGrid.
//!
//! Horizon DataGrid uses the `tracing` crate for instrumentation. To see
//! logs, install a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Recoverable failures (a sort descriptor that cannot be applied and is
//! rolled back, a filter descriptor with no usable accessor, a duplicate
//! sort resolved away during view-to-model sync) are logged at `warn` or
//! `debug` against the targets below rather than propagated as errors.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem, e.g.
/// `RUST_LOG=horizon_datagrid::sorting=debug`.
pub mod targets {
    /// Core machinery (signals, thread checks).
    pub const CORE: &str = "horizon_datagrid_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_datagrid_core::signal";
    /// Hierarchical model and flattening.
    pub const HIERARCHY: &str = "horizon_datagrid::hierarchy";
    /// Sorting model/adapter synchronization.
    pub const SORTING: &str = "horizon_datagrid::sorting";
    /// Filtering model/adapter and predicate compilation.
    pub const FILTERING: &str = "horizon_datagrid::filtering";
    /// Search model and result scanning.
    pub const SEARCH: &str = "horizon_datagrid::search";
    /// Collection view refresh and mapping.
    pub const VIEW: &str = "horizon_datagrid::view";
    /// Slot/display bookkeeping and scroll guards.
    pub const DISPLAY: &str = "horizon_datagrid::display";
    /// Summary aggregation and debounced recalculation.
    pub const SUMMARIES: &str = "horizon_datagrid::summaries";
}
