//! Compiles filtering descriptors into the view's row predicate.
//!
//! On every [`FilteringModel`] change the adapter resolves each
//! descriptor's accessor (column accessor first, then the view's
//! path-accessor registry unless restricted), compiles the set into a
//! single conjunctive predicate, and installs it on the view. The compiled
//! predicate is cached keyed by the descriptor list, so reapplying an
//! unchanged filter reuses the same predicate instance and the view's
//! identity check turns it into a no-op.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use horizon_datagrid_core::ConnectionId;
use parking_lot::{Mutex, RwLock};

use crate::adapter::{FastPathFeature, FastPathOptions};
use crate::model::column::{Column, ColumnId, ValueAccessor};
use crate::model::filtering::{
    FilterOperator, FilterPredicate, FilteringDescriptor, FilteringModel,
};
use crate::view::collection_view::CollectionView;

/// Projects the [`FilteringModel`] onto the view's filter predicate.
pub struct FilteringAdapter<R: Clone + Send + Sync + 'static> {
    inner: Arc<Inner<R>>,
}

struct Inner<R: Clone + Send + Sync + 'static> {
    model: Arc<FilteringModel<R>>,
    columns: Arc<RwLock<Vec<Column<R>>>>,
    options: Arc<FastPathOptions>,
    view: RwLock<Option<Arc<CollectionView<R>>>>,
    /// Last compiled predicate and the descriptors it was compiled from.
    compiled: RwLock<Option<(Vec<FilteringDescriptor<R>>, FilterPredicate<R>)>>,
    suppress: AtomicBool,
    model_conn: Mutex<Option<ConnectionId>>,
}

impl<R: Clone + Send + Sync + 'static> FilteringAdapter<R> {
    pub fn new(
        model: Arc<FilteringModel<R>>,
        columns: Arc<RwLock<Vec<Column<R>>>>,
        options: Arc<FastPathOptions>,
    ) -> Self {
        let inner = Arc::new(Inner {
            model,
            columns,
            options,
            view: RwLock::new(None),
            compiled: RwLock::new(None),
            suppress: AtomicBool::new(false),
            model_conn: Mutex::new(None),
        });

        let weak: Weak<Inner<R>> = Arc::downgrade(&inner);
        let conn = inner.model.filtering_changed.connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                if !inner.suppress.load(AtomicOrdering::SeqCst) {
                    inner.reinstall();
                }
            }
        });
        *inner.model_conn.lock() = Some(conn);

        Self { inner }
    }

    pub fn model(&self) -> &Arc<FilteringModel<R>> {
        &self.inner.model
    }

    pub fn options(&self) -> &Arc<FastPathOptions> {
        &self.inner.options
    }

    /// Attach the view and apply the current filter state to it.
    pub fn attach_view(&self, view: Arc<CollectionView<R>>) {
        *self.inner.view.write() = Some(view);
        self.inner.reinstall();
    }

    pub fn detach_view(&self) {
        if let Some(view) = self.inner.view.write().take() {
            view.set_filter(None);
        }
        *self.inner.compiled.write() = None;
    }

    /// Recompile and reinstall, e.g. after accessor registration changed.
    pub fn reapply(&self) {
        *self.inner.compiled.write() = None;
        self.inner.reinstall();
    }
}

impl<R: Clone + Send + Sync + 'static> Drop for FilteringAdapter<R> {
    fn drop(&mut self) {
        if let Some(conn) = self.inner.model_conn.lock().take() {
            self.inner.model.filtering_changed.disconnect(conn);
        }
    }
}

enum Clause<R> {
    Value {
        accessor: ValueAccessor<R>,
        descriptor: FilteringDescriptor<R>,
    },
    Custom(FilterPredicate<R>),
}

impl<R> Clause<R> {
    fn passes(&self, row: &R) -> bool {
        match self {
            Clause::Value { accessor, descriptor } => descriptor.evaluate(&accessor(row)),
            Clause::Custom(predicate) => predicate(row),
        }
    }
}

impl<R: Clone + Send + Sync + 'static> Inner<R> {
    fn reinstall(&self) {
        let Some(view) = self.view.read().clone() else { return };
        let descriptors = self.model.descriptors();

        if descriptors.is_empty() {
            *self.compiled.write() = None;
            view.set_filter(None);
            return;
        }

        // Unchanged descriptor set: reuse the cached predicate so the
        // view's identity check skips the refresh.
        if let Some((cached_descriptors, predicate)) = &*self.compiled.read() {
            if cached_descriptors.len() == descriptors.len()
                && cached_descriptors
                    .iter()
                    .zip(&descriptors)
                    .all(|(a, b)| a.same_filter(b))
            {
                view.set_filter(Some(Arc::clone(predicate)));
                return;
            }
        }

        let clauses = self.compile_clauses(&view, &descriptors);
        let predicate: FilterPredicate<R> =
            Arc::new(move |row: &R| clauses.iter().all(|clause| clause.passes(row)));

        *self.compiled.write() = Some((descriptors, Arc::clone(&predicate)));
        view.set_filter(Some(predicate));
    }

    /// Resolve each descriptor to an evaluable clause; descriptors without
    /// a usable accessor are reported and dropped (or escalate in strict
    /// mode).
    fn compile_clauses(
        &self,
        view: &CollectionView<R>,
        descriptors: &[FilteringDescriptor<R>],
    ) -> Vec<Clause<R>> {
        let columns = self.columns.read();
        let mut clauses = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if descriptor.operator == FilterOperator::Custom {
                match &descriptor.predicate {
                    Some(predicate) => clauses.push(Clause::Custom(Arc::clone(predicate))),
                    None => {
                        tracing::warn!(
                            target: crate::logging::targets::FILTERING,
                            column = %descriptor.column_id,
                            "custom filter without predicate skipped"
                        );
                    }
                }
                continue;
            }
            match self.resolve_accessor(view, &columns, &descriptor.column_id) {
                Some(accessor) => clauses.push(Clause::Value {
                    accessor,
                    descriptor: descriptor.clone(),
                }),
                None => {
                    self.options
                        .report_missing(FastPathFeature::Filtering, &descriptor.column_id);
                }
            }
        }
        clauses
    }

    fn resolve_accessor(
        &self,
        view: &CollectionView<R>,
        columns: &[Column<R>],
        column_id: &ColumnId,
    ) -> Option<ValueAccessor<R>> {
        let column = columns.iter().find(|c| c.matches_id(column_id));
        if let Some(accessor) = column.and_then(|c| c.accessor()) {
            return Some(Arc::clone(accessor));
        }
        if self.options.use_accessors_only() {
            return None;
        }
        // Fall back to the path registry, via the column's path or a
        // path-keyed column id.
        let path = column
            .and_then(|c| c.property_path())
            .map(str::to_owned)
            .or(match column_id {
                ColumnId::Path(p) => Some(p.to_string()),
                ColumnId::Handle(_) => None,
            })?;
        view.accessor_for_path(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
        adapter: FilteringAdapter<Row>,
        view: Arc<CollectionView<Row>>,
        columns: Arc<RwLock<Vec<Column<Row>>>>,
    }

    fn fixture() -> Fixture {
        let view = Arc::new(CollectionView::new(vec![
            row("alpha", 5),
            row("beta", 15),
            row("gamma", 25),
        ]));
        view.register_path_accessor("size", |r: &Row| CellValue::Int(r.size));

        let columns = Arc::new(RwLock::new(vec![
            Column::new("Name")
                .with_path("name")
                .with_accessor(|r: &Row| CellValue::from(r.name)),
            // Size column relies on the view's path registry.
            Column::new("Size").with_path("size"),
        ]));

        let adapter = FilteringAdapter::new(
            Arc::new(FilteringModel::new()),
            columns.clone(),
            Arc::new(FastPathOptions::new()),
        );
        adapter.attach_view(view.clone());
        Fixture { adapter, view, columns }
    }

    fn names(view: &CollectionView<Row>) -> Vec<&'static str> {
        view.visible_items().iter().map(|r| r.name).collect()
    }

    fn size_id(f: &Fixture) -> ColumnId {
        f.columns.read()[1].id()
    }

    fn name_id(f: &Fixture) -> ColumnId {
        f.columns.read()[0].id()
    }

    #[test]
    fn test_filter_through_column_accessor() {
        let f = fixture();
        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::contains(name_id(&f), "a"));
        assert_eq!(names(&f.view), vec!["alpha", "beta", "gamma"]);

        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::contains(name_id(&f), "et"));
        assert_eq!(names(&f.view), vec!["beta"]);
    }

    #[test]
    fn test_filter_through_path_registry_fallback() {
        let f = fixture();
        f.adapter.model().set_or_update(FilteringDescriptor::new(
            size_id(&f),
            FilterOperator::GreaterThan,
            vec![CellValue::Int(10)],
        ));
        assert_eq!(names(&f.view), vec!["beta", "gamma"]);
    }

    #[test]
    fn test_descriptors_conjoin() {
        let f = fixture();
        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::contains(name_id(&f), "a"));
        f.adapter.model().set_or_update(FilteringDescriptor::new(
            size_id(&f),
            FilterOperator::LessThan,
            vec![CellValue::Int(20)],
        ));
        assert_eq!(names(&f.view), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_clearing_model_clears_view_filter() {
        let f = fixture();
        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::contains(name_id(&f), "et"));
        assert_eq!(f.view.len(), 1);

        f.adapter.model().clear();
        assert_eq!(f.view.len(), 3);
        assert!(!f.view.is_filtered());
    }

    #[test]
    fn test_missing_accessor_skips_descriptor_with_diagnostic() {
        let f = fixture();
        let reported = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let r = reported.clone();
        f.adapter
            .options()
            .missing_accessor
            .connect(move |m: &crate::adapter::MissingAccessor| {
                r.lock().push((m.feature, m.column_id.clone()));
            });

        let unknown = ColumnId::path("unknown");
        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::equals(unknown.clone(), 1i64));

        // Descriptor skipped: everything still visible.
        assert_eq!(f.view.len(), 3);
        assert_eq!(
            *reported.lock(),
            vec![(FastPathFeature::Filtering, unknown)]
        );
    }

    #[test]
    fn test_strict_mode_escalates_missing_accessor() {
        let f = fixture();
        f.adapter.options().set_throw_on_missing_accessor(true);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            f.adapter
                .model()
                .set_or_update(FilteringDescriptor::equals(ColumnId::path("unknown"), 1i64));
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_use_accessors_only_disables_registry_fallback() {
        let f = fixture();
        f.adapter.options().set_use_accessors_only(true);

        f.adapter.model().set_or_update(FilteringDescriptor::new(
            size_id(&f),
            FilterOperator::GreaterThan,
            vec![CellValue::Int(10)],
        ));
        // Size column has no accessor of its own, fallback is off: skipped.
        assert_eq!(f.view.len(), 3);
    }

    #[test]
    fn test_unchanged_reapply_reuses_predicate_instance() {
        let f = fixture();
        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::contains(name_id(&f), "et"));

        let events = Arc::new(parking_lot::Mutex::new(0usize));
        let e = events.clone();
        f.view.view_changed.connect(move |_| *e.lock() += 1);

        // The model treats the identical descriptor as a no-op, and even a
        // forced reinstall reuses the cached predicate.
        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::contains(name_id(&f), "et"));
        f.adapter.inner_reinstall_for_test();
        assert_eq!(*events.lock(), 0);
    }

    #[test]
    fn test_custom_predicate_filters_rows() {
        let f = fixture();
        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::custom(name_id(&f), |r: &Row| {
                r.size % 2 == 1
            }));
        assert_eq!(names(&f.view), vec!["alpha", "beta", "gamma"]);

        f.adapter
            .model()
            .set_or_update(FilteringDescriptor::custom(name_id(&f), |r: &Row| {
                r.size > 20
            }));
        assert_eq!(names(&f.view), vec!["gamma"]);
    }

    impl FilteringAdapter<Row> {
        fn inner_reinstall_for_test(&self) {
            self.inner.reinstall();
        }
    }
}
