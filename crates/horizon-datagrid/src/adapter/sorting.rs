//! Bidirectional synchronization between the sorting model and the view.
//!
//! The adapter listens to [`SortingModel::sorting_changed`] and projects the
//! descriptor list onto the view's sort descriptions, and listens to the
//! view's sort descriptions to resynchronize the model when the view is
//! sorted externally. Suppression flags break the feedback loop in each
//! direction.
//!
//! Applying the model to the view is transactional: the view validates all
//! property paths before mutating, and on failure the adapter restores both
//! the view's previous sort descriptions and the model's previous
//! descriptors, so the two sides never diverge.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use horizon_datagrid_core::ConnectionId;
use parking_lot::{Mutex, RwLock};

use crate::model::column::{Column, ColumnId};
use crate::model::sorting::{
    SortKey, SortingChange, SortingDescriptor, SortingModel, SortingModifiers,
};
use crate::view::collection_view::CollectionView;
use crate::view::sort_description::{sorts_equal, ViewSortDescription, ViewSortKey};

/// Keeps a [`SortingModel`] and a [`CollectionView`]'s sort descriptions in
/// sync.
pub struct SortingAdapter<R: Clone + Send + Sync + 'static> {
    inner: Arc<Inner<R>>,
}

struct Inner<R: Clone + Send + Sync + 'static> {
    model: Arc<SortingModel<R>>,
    columns: Arc<RwLock<Vec<Column<R>>>>,
    view: RwLock<Option<Arc<CollectionView<R>>>>,
    /// Ignore view sort-description changes caused by our own apply.
    suppress_view_sync: AtomicBool,
    /// Ignore model changes caused by our own resync or rollback.
    suppress_model_sync: AtomicBool,
    model_conn: Mutex<Option<ConnectionId>>,
    view_conn: Mutex<Option<ConnectionId>>,
}

impl<R: Clone + Send + Sync + 'static> SortingAdapter<R> {
    pub fn new(model: Arc<SortingModel<R>>, columns: Arc<RwLock<Vec<Column<R>>>>) -> Self {
        let inner = Arc::new(Inner {
            model,
            columns,
            view: RwLock::new(None),
            suppress_view_sync: AtomicBool::new(false),
            suppress_model_sync: AtomicBool::new(false),
            model_conn: Mutex::new(None),
            view_conn: Mutex::new(None),
        });

        let weak: Weak<Inner<R>> = Arc::downgrade(&inner);
        let conn = inner.model.sorting_changed.connect(move |change: &SortingChange<R>| {
            if let Some(inner) = weak.upgrade() {
                if inner.suppress_model_sync.load(AtomicOrdering::SeqCst) {
                    return;
                }
                inner.apply_model_to_view(&change.new, &change.old);
            }
        });
        *inner.model_conn.lock() = Some(conn);

        Self { inner }
    }

    pub fn model(&self) -> &Arc<SortingModel<R>> {
        &self.inner.model
    }

    /// Attach the view to keep in sync. The current model state is applied
    /// immediately when the model owns the sorts; otherwise the model is
    /// seeded from the view's existing sort descriptions.
    pub fn attach_view(&self, view: Arc<CollectionView<R>>) {
        self.detach_view();

        let weak: Weak<Inner<R>> = Arc::downgrade(&self.inner);
        let conn = view.sort_descriptions_changed.connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.on_view_sorts_changed();
            }
        });
        *self.inner.view_conn.lock() = Some(conn);
        *self.inner.view.write() = Some(view);

        let descriptors = self.inner.model.descriptors();
        if self.inner.model.owns_view_sorts() || !descriptors.is_empty() {
            self.inner.apply_model_to_view(&descriptors, &descriptors);
        } else {
            self.inner.sync_model_from_view();
        }
    }

    pub fn detach_view(&self) {
        let view = self.inner.view.write().take();
        if let (Some(view), Some(conn)) = (view, self.inner.view_conn.lock().take()) {
            view.sort_descriptions_changed.disconnect(conn);
        }
    }

    /// Translate a header interaction on `column` into a model toggle.
    ///
    /// Non-sortable columns and columns with neither a comparer nor a
    /// property path are ignored with a log entry. Returns `true` when the
    /// model changed.
    pub fn handle_header_click(&self, column: &Column<R>, modifiers: SortingModifiers) -> bool {
        if !column.can_user_sort() {
            tracing::debug!(
                target: crate::logging::targets::SORTING,
                column = %column.id(),
                "header click on non-sortable column ignored"
            );
            return false;
        }
        let descriptor = if let Some(comparer) = column.sort_comparer() {
            SortingDescriptor::by_comparer(column.id(), Arc::clone(comparer))
        } else if let Some(path) = column.property_path() {
            SortingDescriptor::by_path(column.id(), path)
        } else {
            tracing::warn!(
                target: crate::logging::targets::SORTING,
                column = %column.id(),
                "column has no sort comparer and no property path, cannot sort"
            );
            return false;
        };
        self.inner.model.toggle(descriptor, modifiers)
    }

    /// Force a model-to-view reapplication, e.g. after changing ownership.
    pub fn resync(&self) {
        let descriptors = self.inner.model.descriptors();
        self.inner.apply_model_to_view(&descriptors, &descriptors);
    }
}

impl<R: Clone + Send + Sync + 'static> Drop for SortingAdapter<R> {
    fn drop(&mut self) {
        if let Some(conn) = self.inner.model_conn.lock().take() {
            self.inner.model.sorting_changed.disconnect(conn);
        }
        self.detach_view();
    }
}

impl<R: Clone + Send + Sync + 'static> Inner<R> {
    /// Project the model's descriptors onto the view, rolling back both
    /// sides when the view rejects the sort.
    fn apply_model_to_view(
        &self,
        new: &[SortingDescriptor<R>],
        old: &[SortingDescriptor<R>],
    ) {
        let Some(view) = self.view.read().clone() else { return };

        let target: Vec<ViewSortDescription<R>> = new
            .iter()
            .map(|d| {
                let key = match &d.key {
                    SortKey::Path(path) => ViewSortKey::Path(path.clone()),
                    SortKey::Comparer(cmp) => ViewSortKey::Comparer(Arc::clone(cmp)),
                };
                ViewSortDescription {
                    key,
                    direction: d.direction,
                    text_compare: d.text_compare,
                }
            })
            .collect();

        // Idempotence: an equal sort set must not trigger a refresh.
        if sorts_equal(&view.sort_descriptions(), &target) {
            return;
        }

        let rollback = view.sort_descriptions();
        self.suppress_view_sync.store(true, AtomicOrdering::SeqCst);
        let result = view.set_sort_descriptions(target);
        self.suppress_view_sync.store(false, AtomicOrdering::SeqCst);

        if let Err(err) = result {
            tracing::warn!(
                target: crate::logging::targets::SORTING,
                error = %err,
                "sort apply failed, rolling back model and view"
            );
            self.suppress_view_sync.store(true, AtomicOrdering::SeqCst);
            if let Err(rollback_err) = view.set_sort_descriptions(rollback) {
                tracing::warn!(
                    target: crate::logging::targets::SORTING,
                    error = %rollback_err,
                    "view sort rollback failed"
                );
            }
            self.suppress_view_sync.store(false, AtomicOrdering::SeqCst);

            self.suppress_model_sync.store(true, AtomicOrdering::SeqCst);
            self.model.apply(old.to_vec());
            self.suppress_model_sync.store(false, AtomicOrdering::SeqCst);
        }
    }

    /// The view's sort descriptions changed underneath us.
    fn on_view_sorts_changed(&self) {
        if self.suppress_view_sync.load(AtomicOrdering::SeqCst) {
            return;
        }
        if self.model.owns_view_sorts() {
            // The model is authoritative; overwrite the external edit.
            let descriptors = self.model.descriptors();
            self.apply_model_to_view(&descriptors, &descriptors);
        } else {
            self.sync_model_from_view();
        }
    }

    /// Rebuild the model's descriptors from the view's sort descriptions,
    /// attributing each to a column where possible.
    fn sync_model_from_view(&self) {
        let Some(view) = self.view.read().clone() else { return };
        let columns = self.columns.read();

        let mut descriptors: Vec<SortingDescriptor<R>> = Vec::new();
        for description in view.sort_descriptions() {
            let column = columns.iter().find(|c| match &description.key {
                ViewSortKey::Comparer(cmp) => c
                    .sort_comparer()
                    .is_some_and(|own| Arc::ptr_eq(own, cmp)),
                ViewSortKey::Path(path) => c.property_path() == Some(path.as_str()),
            });
            let column_id = match (column, &description.key) {
                (Some(c), _) => c.id(),
                (None, ViewSortKey::Path(path)) => ColumnId::path(path),
                (None, ViewSortKey::Comparer(_)) => {
                    tracing::debug!(
                        target: crate::logging::targets::SORTING,
                        "view sort by unowned comparer has no column, skipped"
                    );
                    continue;
                }
            };
            let key = match &description.key {
                ViewSortKey::Path(path) => SortKey::Path(path.clone()),
                ViewSortKey::Comparer(cmp) => SortKey::Comparer(Arc::clone(cmp)),
            };
            descriptors.push(SortingDescriptor {
                column_id,
                key,
                direction: description.direction,
                text_compare: description.text_compare,
            });
        }

        self.suppress_model_sync.store(true, AtomicOrdering::SeqCst);
        self.model.apply(descriptors);
        self.suppress_model_sync.store(false, AtomicOrdering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::column::SortDirection;
    use crate::model::value::CellValue;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: &'static str,
        size: i64,
    }

    fn row(name: &'static str, size: i64) -> Row {
        Row { name, size }
    }

    struct Fixture {
        adapter: SortingAdapter<Row>,
        view: Arc<CollectionView<Row>>,
        columns: Arc<RwLock<Vec<Column<Row>>>>,
    }

    fn fixture() -> Fixture {
        let view = Arc::new(CollectionView::new(vec![
            row("cherry", 30),
            row("apple", 10),
            row("banana", 20),
        ]));
        view.register_path_accessor("name", |r: &Row| CellValue::from(r.name));
        view.register_path_accessor("size", |r: &Row| CellValue::Int(r.size));

        let columns = Arc::new(RwLock::new(vec![
            Column::new("Name")
                .with_path("name")
                .with_accessor(|r: &Row| CellValue::from(r.name)),
            Column::new("Size")
                .with_path("size")
                .with_accessor(|r: &Row| CellValue::Int(r.size)),
        ]));

        let adapter = SortingAdapter::new(Arc::new(SortingModel::new()), columns.clone());
        adapter.attach_view(view.clone());
        Fixture { adapter, view, columns }
    }

    fn names(view: &CollectionView<Row>) -> Vec<&'static str> {
        view.visible_items().iter().map(|r| r.name).collect()
    }

    #[test]
    fn test_header_click_sorts_view_through_model() {
        let f = fixture();
        let name_col = f.columns.read()[0].clone();

        assert!(f.adapter.handle_header_click(&name_col, SortingModifiers::default()));
        assert_eq!(names(&f.view), vec!["apple", "banana", "cherry"]);

        // Second click flips direction.
        f.adapter.handle_header_click(&name_col, SortingModifiers::default());
        assert_eq!(names(&f.view), vec!["cherry", "banana", "apple"]);

        // Third click clears the sort; view returns to source order.
        f.adapter.handle_header_click(&name_col, SortingModifiers::default());
        assert!(f.adapter.model().is_empty());
        assert_eq!(names(&f.view), vec!["cherry", "apple", "banana"]);
    }

    #[test]
    fn test_multi_column_sort() {
        let f = fixture();
        let columns = f.columns.read().clone();
        let multi = SortingModifiers { multi: true, clear: false };

        f.adapter.handle_header_click(&columns[1], multi);
        f.adapter.handle_header_click(&columns[0], multi);
        assert_eq!(f.view.sort_descriptions().len(), 2);
    }

    #[test]
    fn test_failed_apply_rolls_back_model_and_view() {
        let f = fixture();
        let name_col = f.columns.read()[0].clone();
        f.adapter.handle_header_click(&name_col, SortingModifiers::default());
        assert_eq!(names(&f.view), vec!["apple", "banana", "cherry"]);

        // A descriptor with an unregistered path fails in the view; both
        // sides must come back to the pre-apply state.
        let bad = SortingDescriptor::by_path(ColumnId::path("missing"), "missing");
        f.adapter.model().apply(vec![bad]);

        let descriptors = f.adapter.model().descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].column_id, name_col.id());
        assert_eq!(names(&f.view), vec!["apple", "banana", "cherry"]);
        assert_eq!(f.view.sort_descriptions().len(), 1);
    }

    #[test]
    fn test_external_view_sort_resyncs_model_when_not_owned() {
        let f = fixture();
        f.adapter.model().set_owns_view_sorts(false);

        f.view
            .set_sort_descriptions(vec![ViewSortDescription::by_path(
                "size",
                SortDirection::Descending,
            )])
            .unwrap();

        let descriptors = f.adapter.model().descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].direction, SortDirection::Descending);
        // Attributed to the Size column by path.
        assert_eq!(descriptors[0].column_id, f.columns.read()[1].id());
    }

    #[test]
    fn test_external_view_sort_overwritten_when_model_owns() {
        let f = fixture();
        let name_col = f.columns.read()[0].clone();
        f.adapter.handle_header_click(&name_col, SortingModifiers::default());

        f.view
            .set_sort_descriptions(vec![ViewSortDescription::by_path(
                "size",
                SortDirection::Descending,
            )])
            .unwrap();

        // Model owns the sorts, so the external edit was reverted.
        assert_eq!(names(&f.view), vec!["apple", "banana", "cherry"]);
        let descriptors = f.adapter.model().descriptors();
        assert_eq!(descriptors[0].column_id, name_col.id());
    }

    #[test]
    fn test_equal_sort_apply_does_not_refresh() {
        let f = fixture();
        let name_col = f.columns.read()[0].clone();
        f.adapter.handle_header_click(&name_col, SortingModifiers::default());

        let events = Arc::new(parking_lot::Mutex::new(0usize));
        let e = events.clone();
        f.view.view_changed.connect(move |_| *e.lock() += 1);

        // Re-applying the identical descriptor set is fully silent.
        f.adapter.resync();
        assert_eq!(*events.lock(), 0);
    }

    #[test]
    fn test_non_sortable_column_is_ignored() {
        let f = fixture();
        let col = Column::<Row>::new("Locked").with_path("name").not_sortable();
        assert!(!f.adapter.handle_header_click(&col, SortingModifiers::default()));
        assert!(f.adapter.model().is_empty());
    }
}
