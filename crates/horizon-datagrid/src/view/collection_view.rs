//! Sorted, filtered, grouped projection over a flat row collection.
//!
//! [`CollectionView`] owns the source rows and maintains a proxy mapping
//! between source order and view order: `view_to_source` for addressing and
//! `source_to_view` for reverse lookups (`None` for rows hidden by the
//! filter). Sorting is stable, so equal rows keep their source order and
//! repeated refreshes are idempotent.
//!
//! Property paths are resolved through an accessor registry rather than
//! reflection: a path used in a sort description must have been registered
//! up front, and [`set_sort_descriptions`](CollectionView::set_sort_descriptions)
//! validates every path *before* mutating anything, so a failing apply
//! leaves the view untouched.

use std::collections::HashMap;
use std::sync::Arc;

use horizon_datagrid_core::{Signal, ThreadAffinity};
use parking_lot::RwLock;

use crate::model::changes::ViewChange;
use crate::model::column::ValueAccessor;
use crate::model::filtering::FilterPredicate;
use crate::model::value::CellValue;
use crate::view::sort_description::{ViewSortDescription, ViewSortKey};

/// Errors raised when configuring the view.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// A sort description referenced a property path with no registered
    /// accessor.
    #[error("no accessor registered for property path '{0}'")]
    UnresolvedPath(String),
}

/// Groups view rows by the key an accessor extracts.
pub struct GroupDescription<R> {
    key: ValueAccessor<R>,
}

impl<R> GroupDescription<R> {
    pub fn new<F>(key: F) -> Self
    where
        F: Fn(&R) -> CellValue + Send + Sync + 'static,
    {
        Self { key: Arc::new(key) }
    }

    pub fn key_of(&self, row: &R) -> CellValue {
        (self.key)(row)
    }
}

impl<R> Clone for GroupDescription<R> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
        }
    }
}

/// A contiguous run of view rows sharing one group key.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRun {
    pub key: CellValue,
    /// First view row of the run.
    pub start: usize,
    pub len: usize,
}

struct RowMapping {
    view_to_source: Vec<usize>,
    source_to_view: Vec<Option<usize>>,
}

impl RowMapping {
    fn identity(len: usize) -> Self {
        Self {
            view_to_source: (0..len).collect(),
            source_to_view: (0..len).map(Some).collect(),
        }
    }
}

/// The sorted/filtered/grouped view over a flat row collection.
pub struct CollectionView<R> {
    affinity: ThreadAffinity,
    source: RwLock<Vec<R>>,
    mapping: RwLock<RowMapping>,
    sort_descriptions: RwLock<Vec<ViewSortDescription<R>>>,
    filter: RwLock<Option<FilterPredicate<R>>>,
    group_by: RwLock<Option<GroupDescription<R>>>,
    group_runs: RwLock<Vec<GroupRun>>,
    accessors: RwLock<HashMap<String, ValueAccessor<R>>>,
    defer_depth: RwLock<usize>,
    pending_refresh: RwLock<bool>,
    /// Emitted after the visible rows changed.
    pub view_changed: Signal<ViewChange>,
    /// Emitted whenever the sort description list is replaced, including by
    /// callers other than the sorting adapter.
    pub sort_descriptions_changed: Signal<()>,
}

impl<R: Clone + 'static> CollectionView<R> {
    pub fn new(items: Vec<R>) -> Self {
        let len = items.len();
        Self {
            affinity: ThreadAffinity::current(),
            source: RwLock::new(items),
            mapping: RwLock::new(RowMapping::identity(len)),
            sort_descriptions: RwLock::new(Vec::new()),
            filter: RwLock::new(None),
            group_by: RwLock::new(None),
            group_runs: RwLock::new(Vec::new()),
            accessors: RwLock::new(HashMap::new()),
            defer_depth: RwLock::new(0),
            pending_refresh: RwLock::new(false),
            view_changed: Signal::new(),
            sort_descriptions_changed: Signal::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessor registry
    // ------------------------------------------------------------------

    /// Register the accessor behind a property path.
    pub fn register_path_accessor<F>(&self, path: impl Into<String>, accessor: F)
    where
        F: Fn(&R) -> CellValue + Send + Sync + 'static,
    {
        self.accessors.write().insert(path.into(), Arc::new(accessor));
    }

    pub fn accessor_for_path(&self, path: &str) -> Option<ValueAccessor<R>> {
        self.accessors.read().get(path).cloned()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Number of visible rows.
    pub fn len(&self) -> usize {
        self.mapping.read().view_to_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source_len(&self) -> usize {
        self.source.read().len()
    }

    /// Clone of the row at a view index.
    pub fn item_at(&self, view_index: usize) -> Option<R> {
        let source_index = self.view_to_source(view_index)?;
        self.source.read().get(source_index).cloned()
    }

    /// Run `f` against the row at a view index.
    pub fn with_item<U>(&self, view_index: usize, f: impl FnOnce(&R) -> U) -> Option<U> {
        let source_index = self.view_to_source(view_index)?;
        self.source.read().get(source_index).map(f)
    }

    pub fn view_to_source(&self, view_index: usize) -> Option<usize> {
        self.mapping.read().view_to_source.get(view_index).copied()
    }

    /// `None` when the source row is filtered out.
    pub fn source_to_view(&self, source_index: usize) -> Option<usize> {
        self.mapping
            .read()
            .source_to_view
            .get(source_index)
            .copied()
            .flatten()
    }

    /// Clones of all visible rows in view order.
    pub fn visible_items(&self) -> Vec<R> {
        let source = self.source.read();
        self.mapping
            .read()
            .view_to_source
            .iter()
            .filter_map(|&i| source.get(i).cloned())
            .collect()
    }

    /// The contiguous group runs from the last refresh; empty without a
    /// group description.
    pub fn group_runs(&self) -> Vec<GroupRun> {
        self.group_runs.read().clone()
    }

    pub fn sort_descriptions(&self) -> Vec<ViewSortDescription<R>> {
        self.sort_descriptions.read().clone()
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.read().is_some()
    }

    pub fn is_sorted(&self) -> bool {
        !self.sort_descriptions.read().is_empty()
    }

    pub fn is_grouped(&self) -> bool {
        self.group_by.read().is_some()
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Replace the sort description list.
    ///
    /// Every path-keyed description is resolved against the accessor
    /// registry first; an unresolved path fails the whole call without
    /// changing the view. On success the view refreshes and reports a
    /// `Reset`.
    pub fn set_sort_descriptions(
        &self,
        descriptions: Vec<ViewSortDescription<R>>,
    ) -> Result<(), ViewError> {
        self.affinity.assert_same_thread();
        {
            let accessors = self.accessors.read();
            for description in &descriptions {
                if let ViewSortKey::Path(path) = &description.key {
                    if !accessors.contains_key(path) {
                        return Err(ViewError::UnresolvedPath(path.clone()));
                    }
                }
            }
        }
        *self.sort_descriptions.write() = descriptions;
        self.sort_descriptions_changed.emit(());
        self.refresh_or_defer();
        Ok(())
    }

    /// Install or clear the row filter.
    ///
    /// Installing the same predicate instance again is a no-op, so adapters
    /// can reapply a cached compiled filter without triggering a refresh.
    pub fn set_filter(&self, filter: Option<FilterPredicate<R>>) {
        self.affinity.assert_same_thread();
        {
            let current = self.filter.read();
            match (&*current, &filter) {
                (None, None) => return,
                (Some(a), Some(b)) if Arc::ptr_eq(a, b) => return,
                _ => {}
            }
        }
        *self.filter.write() = filter;
        self.refresh_or_defer();
    }

    /// Install or clear grouping. Grouping prepends an implicit ascending
    /// sort by the group key so runs are contiguous.
    pub fn set_group_by(&self, group: Option<GroupDescription<R>>) {
        self.affinity.assert_same_thread();
        *self.group_by.write() = group;
        self.refresh_or_defer();
    }

    /// Enter a deferred-refresh scope. Mutations made while the guard is
    /// alive accumulate; the single refresh (and `Reset` notification)
    /// happens when the last guard drops.
    pub fn defer_refresh(&self) -> DeferRefreshGuard<'_, R> {
        self.affinity.assert_same_thread();
        *self.defer_depth.write() += 1;
        DeferRefreshGuard { view: self }
    }

    pub fn is_refresh_deferred(&self) -> bool {
        *self.defer_depth.read() > 0
    }

    // ------------------------------------------------------------------
    // Source mutation
    // ------------------------------------------------------------------

    /// Insert a row at a source position.
    pub fn insert_item(&self, source_index: usize, item: R) {
        self.affinity.assert_same_thread();
        {
            let mut source = self.source.write();
            let source_index = source_index.min(source.len());
            source.insert(source_index, item);
        }
        if self.note_pending() {
            return;
        }
        let source_index = source_index.min(self.source.read().len() - 1);
        self.refresh_mapping();
        if let Some(view_index) = self.source_to_view(source_index) {
            self.view_changed.emit(ViewChange::Inserted {
                index: view_index,
                count: 1,
            });
        }
    }

    /// Append a row.
    pub fn push_item(&self, item: R) {
        let at = self.source.read().len();
        self.insert_item(at, item);
    }

    /// Remove and return the row at a source position.
    pub fn remove_item(&self, source_index: usize) -> Option<R> {
        self.affinity.assert_same_thread();
        let old_view_index = self.source_to_view(source_index);
        let removed = {
            let mut source = self.source.write();
            if source_index >= source.len() {
                return None;
            }
            source.remove(source_index)
        };
        if !self.note_pending() {
            self.refresh_mapping();
            if let Some(view_index) = old_view_index {
                self.view_changed.emit(ViewChange::Removed {
                    index: view_index,
                    count: 1,
                });
            }
        }
        Some(removed)
    }

    /// Replace the row at a source position, re-evaluating its filter and
    /// sort placement.
    pub fn update_item(&self, source_index: usize, item: R) {
        self.affinity.assert_same_thread();
        let old_view_index = self.source_to_view(source_index);
        {
            let mut source = self.source.write();
            let Some(slot) = source.get_mut(source_index) else { return };
            *slot = item;
        }
        if self.note_pending() {
            return;
        }
        self.refresh_mapping();
        let new_view_index = self.source_to_view(source_index);
        match (old_view_index, new_view_index) {
            (None, None) => {}
            (None, Some(index)) => {
                self.view_changed.emit(ViewChange::Inserted { index, count: 1 })
            }
            (Some(index), None) => {
                self.view_changed.emit(ViewChange::Removed { index, count: 1 })
            }
            (Some(old), Some(new)) if old == new => {
                self.view_changed.emit(ViewChange::Updated { index: new })
            }
            (Some(old), Some(new)) => {
                self.view_changed.emit(ViewChange::Removed { index: old, count: 1 });
                self.view_changed.emit(ViewChange::Inserted { index: new, count: 1 });
            }
        }
    }

    /// Reorder a row within the source. In an unsorted, unfiltered view
    /// this is a view move; otherwise the view order is recomputed (ties in
    /// a stable sort follow source order).
    pub fn move_item(&self, from: usize, to: usize) {
        self.affinity.assert_same_thread();
        {
            let mut source = self.source.write();
            if from >= source.len() || to >= source.len() || from == to {
                return;
            }
            let item = source.remove(from);
            source.insert(to, item);
        }
        if self.note_pending() {
            return;
        }
        let plain = !self.is_sorted() && !self.is_filtered() && !self.is_grouped();
        self.refresh_mapping();
        if plain {
            self.view_changed.emit(ViewChange::Moved { from, to });
        } else {
            self.view_changed.emit(ViewChange::Reset);
        }
    }

    /// Replace the whole source collection.
    pub fn reset_items(&self, items: Vec<R>) {
        self.affinity.assert_same_thread();
        *self.source.write() = items;
        if self.note_pending() {
            return;
        }
        self.refresh_mapping();
        self.view_changed.emit(ViewChange::Reset);
    }

    /// Rebuild the mapping from the current configuration and report a
    /// `Reset`.
    pub fn refresh(&self) {
        self.affinity.assert_same_thread();
        self.refresh_mapping();
        self.view_changed.emit(ViewChange::Reset);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// In a deferred scope, record that a refresh is owed and report `true`.
    fn note_pending(&self) -> bool {
        if *self.defer_depth.read() > 0 {
            *self.pending_refresh.write() = true;
            true
        } else {
            false
        }
    }

    fn refresh_or_defer(&self) {
        if self.note_pending() {
            return;
        }
        self.refresh_mapping();
        self.view_changed.emit(ViewChange::Reset);
    }

    fn end_defer(&self) {
        let refresh_now = {
            let mut depth = self.defer_depth.write();
            debug_assert!(*depth > 0);
            *depth -= 1;
            if *depth == 0 {
                let mut pending = self.pending_refresh.write();
                std::mem::take(&mut *pending)
            } else {
                false
            }
        };
        if refresh_now {
            tracing::debug!(
                target: crate::logging::targets::VIEW,
                "deferred refresh committed"
            );
            self.refresh_mapping();
            self.view_changed.emit(ViewChange::Reset);
        }
    }

    fn refresh_mapping(&self) {
        let source = self.source.read();
        let filter = self.filter.read().clone();
        let group_by = self.group_by.read().clone();
        let descriptions = self.sort_descriptions.read().clone();
        let accessors = self.accessors.read().clone();

        let mut view: Vec<usize> = (0..source.len())
            .filter(|&i| filter.as_ref().map(|f| f(&source[i])).unwrap_or(true))
            .collect();

        if group_by.is_some() || !descriptions.is_empty() {
            view.sort_by(|&a, &b| {
                let ra = &source[a];
                let rb = &source[b];
                if let Some(group) = &group_by {
                    let ord = group.key_of(ra).compare(&group.key_of(rb));
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                for description in &descriptions {
                    let ord = match &description.key {
                        ViewSortKey::Comparer(cmp) => cmp(ra, rb),
                        ViewSortKey::Path(path) => match accessors.get(path) {
                            Some(accessor) => accessor(ra)
                                .compare_with(&accessor(rb), description.text_compare),
                            // Validated at install time; a vanished accessor
                            // degrades to "equal" rather than panicking.
                            None => std::cmp::Ordering::Equal,
                        },
                    };
                    let ord = description.direction.apply(ord);
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let mut source_to_view = vec![None; source.len()];
        for (view_index, &source_index) in view.iter().enumerate() {
            source_to_view[source_index] = Some(view_index);
        }

        let runs = match &group_by {
            None => Vec::new(),
            Some(group) => {
                let mut runs: Vec<GroupRun> = Vec::new();
                for (view_index, &source_index) in view.iter().enumerate() {
                    let key = group.key_of(&source[source_index]);
                    match runs.last_mut() {
                        Some(run) if run.key == key => run.len += 1,
                        _ => runs.push(GroupRun {
                            key,
                            start: view_index,
                            len: 1,
                        }),
                    }
                }
                runs
            }
        };

        *self.mapping.write() = RowMapping {
            view_to_source: view,
            source_to_view,
        };
        *self.group_runs.write() = runs;
    }
}

impl<R> std::fmt::Debug for CollectionView<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionView")
            .field("source_len", &self.source.read().len())
            .field("view_len", &self.mapping.read().view_to_source.len())
            .field("sorted", &!self.sort_descriptions.read().is_empty())
            .field("filtered", &self.filter.read().is_some())
            .finish()
    }
}

/// RAII scope for batched view updates; see
/// [`CollectionView::defer_refresh`].
pub struct DeferRefreshGuard<'a, R: Clone + 'static> {
    view: &'a CollectionView<R>,
}

impl<R: Clone + 'static> Drop for DeferRefreshGuard<'_, R> {
    fn drop(&mut self) {
        self.view.end_defer();
    }
}
