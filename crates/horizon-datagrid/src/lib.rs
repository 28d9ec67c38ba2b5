//! Horizon DataGrid - a virtualized, model-driven data grid core.
//!
//! The crate splits along a Model/View seam:
//!
//! - [`model`] holds the authoritative feature state: columns and cell
//!   values, sorting/filtering/search descriptors, and the hierarchical
//!   row model with its flattened projection.
//! - [`view`] projects source rows through filter, sort, and grouping
//!   into display order, reporting changes as minimal edits.
//! - [`adapter`] keeps the feature models and the view in sync in both
//!   directions.
//! - [`grid`] is the facade: slots, scrolling, selection, summaries,
//!   validation, and the [`DataGrid`](grid::DataGrid) type tying it all
//!   together.
//!
//! Everything is synchronous and single-threaded by contract; mutating
//! entry points assert the owning thread.
//!
//! # Example
//!
//! ```
//! use horizon_datagrid::grid::DataGrid;
//! use horizon_datagrid::model::{CellValue, Column, ColumnId, SortingModifiers};
//!
//! #[derive(Clone)]
//! struct File { id: u64, name: String, size: i64 }
//!
//! let grid = DataGrid::new(|f: &File| f.id);
//! grid.add_column(
//!     Column::new("Name")
//!         .with_path("name")
//!         .with_accessor(|f: &File| CellValue::from(f.name.clone())),
//! );
//! grid.set_rows(vec![
//!     File { id: 1, name: "b.txt".into(), size: 10 },
//!     File { id: 2, name: "a.txt".into(), size: 20 },
//! ]);
//! grid.header_click(&ColumnId::path("name"), SortingModifiers::default());
//! assert_eq!(grid.row_key_at(0), Some(2));
//! ```

pub mod adapter;
pub mod grid;
pub mod model;
pub mod view;

pub use horizon_datagrid_core::logging;
pub use horizon_datagrid_core::{ConnectionGuard, ConnectionId, Signal, ThreadAffinity};

pub use grid::DataGrid;
