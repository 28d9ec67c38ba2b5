//! Sorting descriptors and the grid-level sorting model.
//!
//! The [`SortingModel`] is the authoritative description of how the grid is
//! sorted: an ordered list of [`SortingDescriptor`]s, one per column. The
//! sorting adapter projects this list onto the collection view's sort
//! descriptions and, when the view is sorted externally, resynchronizes the
//! model from the view.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use horizon_datagrid_core::{Signal, ThreadAffinity};
use parking_lot::RwLock;

use crate::model::column::{ColumnId, SortComparer, SortDirection};
use crate::model::value::TextCompare;

/// How a sort is evaluated: by property path or by custom comparer.
///
/// The two are mutually exclusive by construction; a descriptor carries
/// exactly one.
pub enum SortKey<R> {
    /// Sort by the cell values produced by the path's registered accessor.
    Path(String),
    /// Sort by comparing row items directly.
    Comparer(SortComparer<R>),
}

impl<R> SortKey<R> {
    /// Keys are equal when both are the same path, or both are the same
    /// comparer instance.
    pub fn same_key(&self, other: &SortKey<R>) -> bool {
        match (self, other) {
            (SortKey::Path(a), SortKey::Path(b)) => a == b,
            (SortKey::Comparer(a), SortKey::Comparer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<R> Clone for SortKey<R> {
    fn clone(&self) -> Self {
        match self {
            SortKey::Path(p) => SortKey::Path(p.clone()),
            SortKey::Comparer(c) => SortKey::Comparer(Arc::clone(c)),
        }
    }
}

impl<R> std::fmt::Debug for SortKey<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortKey::Path(p) => f.debug_tuple("Path").field(p).finish(),
            SortKey::Comparer(_) => f.write_str("Comparer(..)"),
        }
    }
}

/// One column's sort: identity, key, direction, and text semantics.
pub struct SortingDescriptor<R> {
    pub column_id: ColumnId,
    pub key: SortKey<R>,
    pub direction: SortDirection,
    pub text_compare: TextCompare,
}

impl<R> SortingDescriptor<R> {
    /// Path-keyed descriptor, ascending, case-sensitive.
    pub fn by_path(column_id: ColumnId, path: impl Into<String>) -> Self {
        Self {
            column_id,
            key: SortKey::Path(path.into()),
            direction: SortDirection::Ascending,
            text_compare: TextCompare::CaseSensitive,
        }
    }

    /// Comparer-keyed descriptor, ascending.
    pub fn by_comparer(column_id: ColumnId, comparer: SortComparer<R>) -> Self {
        Self {
            column_id,
            key: SortKey::Comparer(comparer),
            direction: SortDirection::Ascending,
            text_compare: TextCompare::CaseSensitive,
        }
    }

    pub fn with_direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_text_compare(mut self, text_compare: TextCompare) -> Self {
        self.text_compare = text_compare;
        self
    }

    /// Same column, same key, same direction, same text semantics.
    pub fn same_sort(&self, other: &SortingDescriptor<R>) -> bool {
        self.column_id == other.column_id
            && self.direction == other.direction
            && self.text_compare == other.text_compare
            && self.key.same_key(&other.key)
    }
}

impl<R> Clone for SortingDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            column_id: self.column_id.clone(),
            key: self.key.clone(),
            direction: self.direction,
            text_compare: self.text_compare,
        }
    }
}

impl<R> std::fmt::Debug for SortingDescriptor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortingDescriptor")
            .field("column_id", &self.column_id)
            .field("key", &self.key)
            .field("direction", &self.direction)
            .field("text_compare", &self.text_compare)
            .finish()
    }
}

/// What a repeated toggle on an already-sorted column does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortCycleMode {
    /// Ascending, then descending, then unsorted, then ascending again.
    #[default]
    AscendingDescendingNone,
    /// Ascending and descending alternate; never returns to unsorted.
    AscendingDescending,
}

/// Interaction modifiers accompanying a toggle (Shift/Ctrl analogues).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortingModifiers {
    /// Add to / cycle within the existing sort set instead of replacing it.
    pub multi: bool,
    /// Remove this column's sort instead of cycling it.
    pub clear: bool,
}

/// Payload of [`SortingModel::sorting_changed`].
pub struct SortingChange<R> {
    pub old: Vec<SortingDescriptor<R>>,
    pub new: Vec<SortingDescriptor<R>>,
}

/// Ordered set of sorting descriptors with toggle/cycle interaction logic.
///
/// At most one descriptor per column id; [`apply`](Self::apply) resolves
/// duplicates by keeping the first occurrence and logging the rest away.
pub struct SortingModel<R> {
    affinity: ThreadAffinity,
    descriptors: RwLock<Vec<SortingDescriptor<R>>>,
    cycle_mode: RwLock<SortCycleMode>,
    multi_sort_enabled: AtomicBool,
    /// When set, the model is the single source of truth and external edits
    /// to the view's sort descriptions are overwritten on the next sync.
    owns_view_sorts: AtomicBool,
    /// Emitted after the descriptor set actually changed.
    pub sorting_changed: Signal<SortingChange<R>>,
}

impl<R> Default for SortingModel<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> SortingModel<R> {
    pub fn new() -> Self {
        Self {
            affinity: ThreadAffinity::current(),
            descriptors: RwLock::new(Vec::new()),
            cycle_mode: RwLock::new(SortCycleMode::default()),
            multi_sort_enabled: AtomicBool::new(true),
            owns_view_sorts: AtomicBool::new(true),
            sorting_changed: Signal::new(),
        }
    }

    /// Snapshot of the current descriptor list.
    pub fn descriptors(&self) -> Vec<SortingDescriptor<R>> {
        self.descriptors.read().clone()
    }

    /// The descriptor for `column_id`, if any, with its position.
    pub fn descriptor_for(&self, column_id: &ColumnId) -> Option<(usize, SortingDescriptor<R>)> {
        self.descriptors
            .read()
            .iter()
            .enumerate()
            .find(|(_, d)| &d.column_id == column_id)
            .map(|(i, d)| (i, d.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    pub fn cycle_mode(&self) -> SortCycleMode {
        *self.cycle_mode.read()
    }

    pub fn set_cycle_mode(&self, mode: SortCycleMode) {
        *self.cycle_mode.write() = mode;
    }

    pub fn is_multi_sort_enabled(&self) -> bool {
        self.multi_sort_enabled.load(AtomicOrdering::SeqCst)
    }

    pub fn set_multi_sort_enabled(&self, enabled: bool) {
        self.multi_sort_enabled.store(enabled, AtomicOrdering::SeqCst);
    }

    pub fn owns_view_sorts(&self) -> bool {
        self.owns_view_sorts.load(AtomicOrdering::SeqCst)
    }

    pub fn set_owns_view_sorts(&self, owns: bool) {
        self.owns_view_sorts.store(owns, AtomicOrdering::SeqCst);
    }

    /// Replace the descriptor set.
    ///
    /// Duplicate column ids are resolved first-wins with a debug log. No
    /// signal is emitted when the resolved set equals the current one.
    /// Returns `true` if the set changed.
    pub fn apply(&self, descriptors: Vec<SortingDescriptor<R>>) -> bool {
        self.affinity.assert_same_thread();
        let resolved = dedup_by_column(descriptors);
        let old = {
            let current = self.descriptors.read();
            if same_sort_list(&current, &resolved) {
                return false;
            }
            current.clone()
        };
        *self.descriptors.write() = resolved.clone();
        tracing::debug!(
            target: crate::logging::targets::SORTING,
            count = resolved.len(),
            "sorting descriptors applied"
        );
        self.sorting_changed.emit(SortingChange { old, new: resolved });
        true
    }

    /// Apply a user interaction against `descriptor`'s column.
    ///
    /// Plain toggle replaces the set with this single column, cycling its
    /// direction when it was already the sole sort. The `multi` modifier
    /// cycles the column in place (or appends it) while keeping the rest of
    /// the set; it degrades to a plain toggle when multi-sort is disabled.
    /// The `clear` modifier removes the column's descriptor.
    pub fn toggle(&self, descriptor: SortingDescriptor<R>, modifiers: SortingModifiers) -> bool {
        self.affinity.assert_same_thread();

        if modifiers.clear {
            return self.remove(&descriptor.column_id);
        }

        let multi = modifiers.multi && self.is_multi_sort_enabled();
        let cycle_mode = self.cycle_mode();
        let current = self.descriptors.read().clone();
        let existing = current
            .iter()
            .position(|d| d.column_id == descriptor.column_id);

        let next = if multi {
            let mut next = current;
            match existing {
                Some(i) => match cycle_direction(next[i].direction, cycle_mode) {
                    Some(direction) => next[i].direction = direction,
                    None => {
                        next.remove(i);
                    }
                },
                None => next.push(descriptor),
            }
            next
        } else {
            match existing {
                // Cycle only when this column was the sole sort; otherwise a
                // plain toggle restarts it ascending.
                Some(0) if current.len() == 1 => {
                    match cycle_direction(current[0].direction, cycle_mode) {
                        Some(direction) => {
                            let mut d = current[0].clone();
                            d.direction = direction;
                            vec![d]
                        }
                        None => Vec::new(),
                    }
                }
                _ => vec![descriptor],
            }
        };

        self.apply(next)
    }

    /// Remove the descriptor for `column_id`. Returns `true` if one existed.
    pub fn remove(&self, column_id: &ColumnId) -> bool {
        self.affinity.assert_same_thread();
        let current = self.descriptors.read().clone();
        let next: Vec<_> = current
            .iter()
            .filter(|d| &d.column_id != column_id)
            .cloned()
            .collect();
        if next.len() == current.len() {
            return false;
        }
        self.apply(next)
    }

    /// Clear all sorting.
    pub fn clear(&self) -> bool {
        self.affinity.assert_same_thread();
        self.apply(Vec::new())
    }
}

impl<R> std::fmt::Debug for SortingModel<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortingModel")
            .field("descriptors", &*self.descriptors.read())
            .field("cycle_mode", &self.cycle_mode())
            .field("owns_view_sorts", &self.owns_view_sorts())
            .finish()
    }
}

/// The direction after one more toggle, `None` meaning "unsorted".
fn cycle_direction(current: SortDirection, mode: SortCycleMode) -> Option<SortDirection> {
    match (current, mode) {
        (SortDirection::Ascending, _) => Some(SortDirection::Descending),
        (SortDirection::Descending, SortCycleMode::AscendingDescending) => {
            Some(SortDirection::Ascending)
        }
        (SortDirection::Descending, SortCycleMode::AscendingDescendingNone) => None,
    }
}

/// Keep the first descriptor per column id, logging the duplicates away.
pub(crate) fn dedup_by_column<R>(
    descriptors: Vec<SortingDescriptor<R>>,
) -> Vec<SortingDescriptor<R>> {
    let mut out: Vec<SortingDescriptor<R>> = Vec::with_capacity(descriptors.len());
    for d in descriptors {
        if out.iter().any(|kept| kept.column_id == d.column_id) {
            tracing::debug!(
                target: crate::logging::targets::SORTING,
                column = %d.column_id,
                "duplicate sorting descriptor resolved (first occurrence wins)"
            );
            continue;
        }
        out.push(d);
    }
    out
}

pub(crate) fn same_sort_list<R>(a: &[SortingDescriptor<R>], b: &[SortingDescriptor<R>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_sort(y))
}
