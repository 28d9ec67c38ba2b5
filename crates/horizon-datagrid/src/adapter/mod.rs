//! Adapters between the grid-level models and the collection view.
//!
//! Each adapter owns one direction-of-truth problem: the sorting adapter
//! keeps [`SortingModel`](crate::model::SortingModel) and the view's sort
//! descriptions bidirectionally in sync, the filtering adapter compiles
//! filter descriptors into a single view predicate, and the search adapter
//! scans visible cells into [`SearchResult`](crate::model::SearchResult)s.
//!
//! All three share [`FastPathOptions`]: value extraction goes through
//! column accessors (and optionally the view's path-accessor registry), and
//! a descriptor whose column has no usable accessor either gets skipped
//! with a [`MissingAccessor`] diagnostic or, in strict mode, fails hard.

pub mod filtering;
pub mod search;
pub mod sorting;

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use horizon_datagrid_core::Signal;

use crate::model::column::ColumnId;

pub use filtering::FilteringAdapter;
pub use search::SearchAdapter;
pub use sorting::SortingAdapter;

/// Which adapter raised a [`MissingAccessor`] diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPathFeature {
    Sorting,
    Filtering,
    Searching,
}

/// Diagnostic payload for a descriptor that could not be evaluated because
/// no accessor was found for its column.
#[derive(Debug, Clone)]
pub struct MissingAccessor {
    pub feature: FastPathFeature,
    pub column_id: ColumnId,
}

/// Accessor-resolution policy shared by the adapters.
pub struct FastPathOptions {
    /// Resolve values through column accessors only; when clear, the view's
    /// path-accessor registry is consulted as a fallback.
    use_accessors_only: AtomicBool,
    /// Escalate a missing accessor from a skipped descriptor to a panic.
    throw_on_missing_accessor: AtomicBool,
    /// Raised once per descriptor whose accessor could not be resolved.
    pub missing_accessor: Signal<MissingAccessor>,
}

impl Default for FastPathOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl FastPathOptions {
    pub fn new() -> Self {
        Self {
            use_accessors_only: AtomicBool::new(false),
            throw_on_missing_accessor: AtomicBool::new(false),
            missing_accessor: Signal::new(),
        }
    }

    pub fn use_accessors_only(&self) -> bool {
        self.use_accessors_only.load(AtomicOrdering::SeqCst)
    }

    pub fn set_use_accessors_only(&self, value: bool) {
        self.use_accessors_only.store(value, AtomicOrdering::SeqCst);
    }

    pub fn throw_on_missing_accessor(&self) -> bool {
        self.throw_on_missing_accessor.load(AtomicOrdering::SeqCst)
    }

    pub fn set_throw_on_missing_accessor(&self, value: bool) {
        self.throw_on_missing_accessor
            .store(value, AtomicOrdering::SeqCst);
    }

    /// Report a descriptor with no usable accessor.
    ///
    /// # Panics
    ///
    /// Panics when strict mode
    /// ([`set_throw_on_missing_accessor`](Self::set_throw_on_missing_accessor))
    /// is enabled.
    pub(crate) fn report_missing(&self, feature: FastPathFeature, column_id: &ColumnId) {
        // The target position of the macro requires a constant, so each
        // feature warns under its own subsystem target.
        match feature {
            FastPathFeature::Sorting => tracing::warn!(
                target: crate::logging::targets::SORTING,
                column = %column_id,
                "no accessor for column, descriptor skipped"
            ),
            FastPathFeature::Filtering => tracing::warn!(
                target: crate::logging::targets::FILTERING,
                column = %column_id,
                "no accessor for column, descriptor skipped"
            ),
            FastPathFeature::Searching => tracing::warn!(
                target: crate::logging::targets::SEARCH,
                column = %column_id,
                "no accessor for column, descriptor skipped"
            ),
        }
        self.missing_accessor.emit(MissingAccessor {
            feature,
            column_id: column_id.clone(),
        });
        if self.throw_on_missing_accessor() {
            panic!(
                "no accessor registered for column '{column_id}' ({feature:?}); \
                 register a column accessor or a path accessor, or disable \
                 throw_on_missing_accessor"
            );
        }
    }
}

impl std::fmt::Debug for FastPathOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastPathOptions")
            .field("use_accessors_only", &self.use_accessors_only())
            .field("throw_on_missing_accessor", &self.throw_on_missing_accessor())
            .finish()
    }
}
