//! The grid facade.
//!
//! [`DataGrid`] owns the column list, the collection view, the optional
//! hierarchical model, and the feature models, and wires the adapters
//! between them. It is single-threaded by contract (every mutating entry
//! point asserts the owning thread) and synchronous: after a structural
//! mutation the grid itself rebuilds slots, prunes selection, rescans the
//! search, and invalidates summaries in one pass, rather than daisy-chaining
//! signal handlers back into itself.
//!
//! Rows are identified by a caller-supplied key function. Selection,
//! validation, and search survival across sorting and filtering all hinge
//! on those keys being stable for the lifetime of a row.

pub mod display;
pub mod selection;
pub mod summary;
pub mod validation;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use horizon_datagrid_core::ThreadAffinity;
use parking_lot::RwLock;

use crate::adapter::filtering::FilteringAdapter;
use crate::adapter::search::SearchAdapter;
use crate::adapter::sorting::SortingAdapter;
use crate::adapter::FastPathOptions;
use crate::model::column::{Column, ColumnHandle, ColumnId, SortComparer};
use crate::model::filtering::{FilteringDescriptor, FilteringModel};
use crate::model::hierarchy::{HierarchicalModel, HierarchicalOptions, NodeKey};
use crate::model::search::{SearchDescriptor, SearchError, SearchModel};
use crate::model::sorting::{SortKey, SortingModel, SortingModifiers};
use crate::view::collection_view::{CollectionView, GroupDescription};

use display::{
    compute_displayed_columns, scroll_column_into_view, ColumnGeometry, DisplayData,
    SlotKind, SlotLayoutOptions, SlotTable, SummaryPlacement,
};
use selection::{SelectionFlags, SelectionModel};
use summary::SummaryModel;
use validation::CellValidationState;

/// Produces the stable identity of a row.
pub type RowKeyFn<R> = Arc<dyn Fn(&R) -> u64 + Send + Sync>;

/// Viewport metrics the display calculations run against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub horizontal_offset: f64,
}

/// The grid: columns, rows, feature models, and display state in one place.
pub struct DataGrid<R: Clone + Send + Sync + 'static> {
    affinity: ThreadAffinity,
    columns: Arc<RwLock<Vec<Column<R>>>>,
    view: Arc<CollectionView<R>>,
    hierarchy: Arc<RwLock<Option<Arc<HierarchicalModel<R>>>>>,
    row_key: RowKeyFn<R>,
    selection: SelectionModel,
    sorting: SortingAdapter<R>,
    filtering: FilteringAdapter<R>,
    search: SearchAdapter<R>,
    options: Arc<FastPathOptions>,
    summaries: SummaryModel<R>,
    validation: CellValidationState,
    slots: RwLock<SlotTable>,
    display: RwLock<DisplayData>,
    layout: RwLock<SlotLayoutOptions>,
    collapsed_groups: RwLock<HashSet<usize>>,
    viewport: RwLock<Viewport>,
    row_height: RwLock<f64>,
}

impl<R: Clone + Send + Sync + 'static> DataGrid<R> {
    pub fn new<F>(row_key: F) -> Self
    where
        F: Fn(&R) -> u64 + Send + Sync + 'static,
    {
        let columns: Arc<RwLock<Vec<Column<R>>>> = Arc::new(RwLock::new(Vec::new()));
        let view = Arc::new(CollectionView::new(Vec::new()));
        let options = Arc::new(FastPathOptions::new());
        let hierarchy: Arc<RwLock<Option<Arc<HierarchicalModel<R>>>>> =
            Arc::new(RwLock::new(None));

        let sorting = SortingAdapter::new(Arc::new(SortingModel::new()), columns.clone());
        sorting.attach_view(view.clone());

        let filtering = FilteringAdapter::new(
            Arc::new(FilteringModel::new()),
            columns.clone(),
            options.clone(),
        );
        filtering.attach_view(view.clone());

        let search = SearchAdapter::new(Arc::new(SearchModel::new()), columns.clone(), options.clone());
        {
            let hierarchy = hierarchy.clone();
            let view = view.clone();
            search.set_row_provider(Arc::new(move || match hierarchy.read().as_ref() {
                Some(model) => model.visible_items(),
                None => view.visible_items(),
            }));
        }

        Self {
            affinity: ThreadAffinity::current(),
            columns,
            view,
            hierarchy,
            row_key: Arc::new(row_key),
            selection: SelectionModel::new(),
            sorting,
            filtering,
            search,
            options,
            summaries: SummaryModel::new(),
            validation: CellValidationState::new(),
            slots: RwLock::new(SlotTable::default()),
            display: RwLock::new(DisplayData::new()),
            layout: RwLock::new(SlotLayoutOptions::default()),
            collapsed_groups: RwLock::new(HashSet::new()),
            viewport: RwLock::new(Viewport::default()),
            row_height: RwLock::new(24.0),
        }
    }

    // Component access.

    pub fn view(&self) -> &Arc<CollectionView<R>> {
        &self.view
    }

    pub fn columns(&self) -> &Arc<RwLock<Vec<Column<R>>>> {
        &self.columns
    }

    pub fn selection(&self) -> &SelectionModel {
        &self.selection
    }

    pub fn sorting(&self) -> &SortingAdapter<R> {
        &self.sorting
    }

    pub fn filtering(&self) -> &FilteringAdapter<R> {
        &self.filtering
    }

    pub fn search(&self) -> &SearchAdapter<R> {
        &self.search
    }

    pub fn summaries(&self) -> &SummaryModel<R> {
        &self.summaries
    }

    pub fn validation(&self) -> &CellValidationState {
        &self.validation
    }

    pub fn fast_path_options(&self) -> &Arc<FastPathOptions> {
        &self.options
    }

    pub fn hierarchical_model(&self) -> Option<Arc<HierarchicalModel<R>>> {
        self.hierarchy.read().clone()
    }

    pub fn is_hierarchical(&self) -> bool {
        self.hierarchy.read().is_some()
    }

    // Columns.

    /// Append a column. A column carrying both a property path and an
    /// accessor also registers the accessor with the view, so path-based
    /// sorting and filtering resolve without further setup.
    pub fn add_column(&self, column: Column<R>) -> ColumnHandle {
        self.affinity.assert_same_thread();
        let handle = column.handle();
        if let (Some(path), Some(accessor)) = (column.property_path(), column.accessor()) {
            let accessor = Arc::clone(accessor);
            self.view
                .register_path_accessor(path.to_owned(), move |row: &R| accessor(row));
        }
        self.columns.write().push(column);
        handle
    }

    pub fn column_by_id(&self, id: &ColumnId) -> Option<Column<R>> {
        self.columns.read().iter().find(|c| c.matches_id(id)).cloned()
    }

    // Rows.

    /// Replace all rows of a flat grid.
    pub fn set_rows(&self, rows: Vec<R>) {
        self.affinity.assert_same_thread();
        self.view.reset_items(rows);
        self.after_structure_change();
    }

    pub fn insert_row(&self, source_index: usize, row: R) {
        self.affinity.assert_same_thread();
        self.view.insert_item(source_index, row);
        self.after_structure_change();
    }

    pub fn remove_row(&self, source_index: usize) -> Option<R> {
        self.affinity.assert_same_thread();
        let removed = self.view.remove_item(source_index);
        if let Some(row) = &removed {
            self.validation.clear_row((self.row_key)(row));
        }
        self.after_structure_change();
        removed
    }

    pub fn update_row(&self, source_index: usize, row: R) {
        self.affinity.assert_same_thread();
        self.view.update_item(source_index, row);
        self.after_structure_change();
    }

    /// Switch to hierarchical rows. The returned model is also reachable
    /// through [`hierarchical_model`](Self::hierarchical_model); mutations
    /// made directly on it must be followed by
    /// [`notify_rows_changed`](Self::notify_rows_changed).
    pub fn enable_hierarchical_rows(
        &self,
        options: HierarchicalOptions<R>,
        roots: Vec<R>,
    ) -> Arc<HierarchicalModel<R>> {
        self.affinity.assert_same_thread();
        let model = Arc::new(HierarchicalModel::new(options));
        model.set_roots(roots);
        *self.hierarchy.write() = Some(model.clone());
        if !self.sorting.model().is_empty() {
            self.sync_hierarchy_sort();
        }
        self.after_structure_change();
        model
    }

    pub fn disable_hierarchical_rows(&self) {
        self.affinity.assert_same_thread();
        if self.hierarchy.write().take().is_some() {
            self.after_structure_change();
        }
    }

    /// The rows in display order: the flattened hierarchy when one is
    /// enabled, the collection view otherwise.
    pub fn visible_rows(&self) -> Vec<R> {
        match self.hierarchy.read().as_ref() {
            Some(model) => model.visible_items(),
            None => self.view.visible_items(),
        }
    }

    pub fn visible_row_count(&self) -> usize {
        match self.hierarchy.read().as_ref() {
            Some(model) => model.len(),
            None => self.view.len(),
        }
    }

    pub fn row_at(&self, view_row: usize) -> Option<R> {
        match self.hierarchy.read().as_ref() {
            Some(model) => model.item_at(view_row),
            None => self.view.item_at(view_row),
        }
    }

    pub fn row_key_at(&self, view_row: usize) -> Option<u64> {
        self.row_at(view_row).map(|row| (self.row_key)(&row))
    }

    // Sorting, filtering, searching.

    /// Route a header click into the sorting model. Returns `false` for an
    /// unknown or unsortable column.
    ///
    /// In hierarchical mode the resulting descriptor list is also projected
    /// onto the sibling comparer, so siblings reorder within their parent
    /// instead of the flat view being sorted.
    pub fn header_click(&self, column_id: &ColumnId, modifiers: SortingModifiers) -> bool {
        self.affinity.assert_same_thread();
        let Some(column) = self.column_by_id(column_id) else {
            return false;
        };
        let handled = self.sorting.handle_header_click(&column, modifiers);
        if handled {
            self.sync_hierarchy_sort();
            self.after_structure_change();
        }
        handled
    }

    /// Reapply the sorting model's descriptors as the hierarchy's sibling
    /// comparer. No-op for flat grids.
    fn sync_hierarchy_sort(&self) {
        let Some(model) = self.hierarchy.read().clone() else {
            return;
        };
        let descriptors = self.sorting.model().descriptors();
        let mut parts: Vec<SortComparer<R>> = Vec::new();
        for descriptor in descriptors {
            let direction = descriptor.direction;
            match descriptor.key {
                SortKey::Comparer(comparer) => {
                    parts.push(Arc::new(move |a: &R, b: &R| direction.apply(comparer(a, b))));
                }
                SortKey::Path(path) => match self.view.accessor_for_path(&path) {
                    Some(accessor) => {
                        let text_compare = descriptor.text_compare;
                        parts.push(Arc::new(move |a: &R, b: &R| {
                            direction
                                .apply(accessor(a).compare_with(&accessor(b), text_compare))
                        }));
                    }
                    None => {
                        tracing::warn!(
                            target: crate::logging::targets::HIERARCHY,
                            path = %path,
                            "no accessor for sort path, skipping in sibling order"
                        );
                    }
                },
            }
        }
        if parts.is_empty() {
            model.apply_sibling_comparer(None, true);
            return;
        }
        let comparer: SortComparer<R> = Arc::new(move |a: &R, b: &R| {
            for part in &parts {
                let ordering = part(a, b);
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        model.apply_sibling_comparer(Some(comparer), true);
    }

    /// Install or replace a filter clause for its column.
    pub fn apply_filter(&self, descriptor: FilteringDescriptor<R>) {
        self.affinity.assert_same_thread();
        self.filtering.model().set_or_update(descriptor);
        self.after_structure_change();
    }

    pub fn remove_filter(&self, column_id: &ColumnId) {
        self.affinity.assert_same_thread();
        if self.filtering.model().remove(column_id) {
            self.after_structure_change();
        }
    }

    pub fn clear_filters(&self) {
        self.affinity.assert_same_thread();
        if self.filtering.model().clear() {
            self.after_structure_change();
        }
    }

    /// Run or update a search over the visible rows. Searching never
    /// changes row visibility, so no structural pass follows.
    pub fn run_search(&self, descriptor: SearchDescriptor) -> Result<usize, SearchError> {
        self.affinity.assert_same_thread();
        self.search.set_or_update(descriptor)
    }

    pub fn clear_search(&self) {
        self.affinity.assert_same_thread();
        self.search.clear();
    }

    // Grouping.

    pub fn set_group_by(&self, group: Option<GroupDescription<R>>) {
        self.affinity.assert_same_thread();
        self.collapsed_groups.write().clear();
        self.view.set_group_by(group);
        self.after_structure_change();
    }

    pub fn collapse_group(&self, group: usize) -> bool {
        self.affinity.assert_same_thread();
        if !self.collapsed_groups.write().insert(group) {
            return false;
        }
        self.rebuild_slots();
        self.normalize_display();
        true
    }

    pub fn expand_group(&self, group: usize) -> bool {
        self.affinity.assert_same_thread();
        if !self.collapsed_groups.write().remove(&group) {
            return false;
        }
        self.rebuild_slots();
        self.normalize_display();
        true
    }

    pub fn is_group_collapsed(&self, group: usize) -> bool {
        self.collapsed_groups.read().contains(&group)
    }

    // Slots.

    pub fn set_slot_layout(&self, layout: SlotLayoutOptions) {
        self.affinity.assert_same_thread();
        *self.layout.write() = layout;
        self.rebuild_slots();
        self.normalize_display();
    }

    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    pub fn slot_kind_at(&self, slot: usize) -> Option<SlotKind> {
        self.slots.read().kind_at(slot)
    }

    pub fn slot_of_row(&self, view_row: usize) -> Option<usize> {
        self.slots.read().slot_of_row(view_row)
    }

    pub fn row_of_slot(&self, slot: usize) -> Option<usize> {
        self.slots.read().row_of_slot(slot)
    }

    /// Toggle the hierarchy node behind a slot. `false` when the grid is
    /// flat, the slot is not a row, or the node is a leaf.
    pub fn try_toggle_hierarchical_at_slot(&self, slot: usize) -> bool {
        self.affinity.assert_same_thread();
        let Some(model) = self.hierarchy.read().clone() else {
            return false;
        };
        let Some(row) = self.row_of_slot(slot) else {
            return false;
        };
        let Some(key) = model.node_at(row) else {
            return false;
        };
        if !model.toggle(key) {
            return false;
        }
        self.after_structure_change();
        true
    }

    /// Expand ancestors so the node is visible, then scroll its slot in.
    pub fn reveal_node(&self, key: NodeKey) -> Option<usize> {
        self.affinity.assert_same_thread();
        let model = self.hierarchy.read().clone()?;
        let row = model.expand_to(key)?;
        self.after_structure_change();
        self.slot_of_row(row)
    }

    // Selection.

    /// Apply a selection gesture to the row behind a slot. Non-row slots
    /// are not selectable.
    pub fn select_at_slot(&self, slot: usize, flags: SelectionFlags) -> bool {
        self.affinity.assert_same_thread();
        let Some(row) = self.row_of_slot(slot) else {
            return false;
        };
        let Some(key) = self.row_key_at(row) else {
            return false;
        };
        self.selection.select(key, flags);
        true
    }

    /// The slots of the selected rows, in display order. Rows whose group
    /// is collapsed stay selected but contribute no slot.
    pub fn selected_slots(&self) -> Vec<usize> {
        let rows = self.visible_rows();
        let slots = self.slots.read();
        rows.iter()
            .enumerate()
            .filter(|(_, row)| self.selection.is_selected((self.row_key)(row)))
            .filter_map(|(index, _)| slots.slot_of_row(index))
            .collect()
    }

    // Display.

    pub fn display(&self) -> DisplayData {
        *self.display.read()
    }

    pub fn viewport(&self) -> Viewport {
        *self.viewport.read()
    }

    pub fn row_height(&self) -> f64 {
        *self.row_height.read()
    }

    pub fn set_row_height(&self, height: f64) {
        self.affinity.assert_same_thread();
        *self.row_height.write() = height.max(1.0);
    }

    pub fn set_viewport_size(&self, width: f64, height: f64) {
        self.affinity.assert_same_thread();
        {
            let mut viewport = self.viewport.write();
            viewport.width = width;
            viewport.height = height;
        }
        self.normalize_display();
        self.recompute_displayed_columns();
    }

    /// Scroll the slot range by `delta` pixels, positive scrolling down.
    pub fn scroll_vertically(&self, delta: f64) {
        self.affinity.assert_same_thread();
        let count = self.slot_count();
        let height = self.row_height();
        let viewport_height = self.viewport.read().height;
        let mut display = self.display.write();
        display.scroll_vertically(delta, |_| height, count);
        display.update_displayed_slots(viewport_height, |_| height, count);
    }

    pub fn set_horizontal_offset(&self, offset: f64) {
        self.affinity.assert_same_thread();
        let offset = offset.max(0.0);
        self.viewport.write().horizontal_offset = offset;
        self.recompute_displayed_columns();
    }

    /// Scroll horizontally just enough to fully display a column.
    pub fn ensure_column_displayed(&self, column_index: usize) {
        self.affinity.assert_same_thread();
        let geometry = self.column_geometry();
        let viewport = *self.viewport.read();
        let offset = scroll_column_into_view(
            &geometry,
            viewport.width,
            viewport.horizontal_offset,
            column_index,
        );
        if offset != viewport.horizontal_offset {
            self.set_horizontal_offset(offset);
        }
    }

    pub fn column_geometry(&self) -> Vec<ColumnGeometry> {
        self.columns
            .read()
            .iter()
            .enumerate()
            .map(|(index, column)| ColumnGeometry {
                index,
                width: column.width(),
                frozen: column.is_frozen(),
                visible: column.is_visible(),
            })
            .collect()
    }

    // Summaries.

    /// Run the debounced summary recalculation if its deadline passed.
    pub fn process_pending(&self, now: Instant) -> bool {
        self.affinity.assert_same_thread();
        if !self.summaries.is_pending() {
            return false;
        }
        let rows = self.visible_rows();
        self.summaries.process_pending(now, &rows)
    }

    /// Recalculate summaries immediately, bypassing the debounce.
    pub fn recalculate_summaries(&self) {
        self.affinity.assert_same_thread();
        if !self.summaries.has_descriptors() {
            return;
        }
        let rows = self.visible_rows();
        self.summaries.recalculate(&rows);
    }

    // Structural bookkeeping.

    /// Re-derive everything that hangs off the visible rows. Called by the
    /// grid after every mutation it routes itself; callers mutating the
    /// view or hierarchy directly call it afterwards.
    pub fn notify_rows_changed(&self) {
        self.affinity.assert_same_thread();
        self.after_structure_change();
    }

    fn after_structure_change(&self) {
        self.rebuild_slots();

        let rows = self.visible_rows();
        let alive: HashSet<u64> = rows.iter().map(|row| (self.row_key)(row)).collect();
        self.selection.retain_keys(|key| alive.contains(&key));

        if let Err(error) = self.search.refresh(true) {
            tracing::warn!(
                target: crate::logging::targets::VIEW,
                %error,
                "search rescan failed after row change"
            );
        }

        if self.summaries.has_descriptors() {
            self.summaries.invalidate(Instant::now());
        }

        self.normalize_display();
    }

    fn rebuild_slots(&self) {
        let row_count = self.visible_row_count();
        let group_runs = if self.is_hierarchical() {
            Vec::new()
        } else {
            self.view.group_runs()
        };
        let collapsed = self.collapsed_groups.read().clone();
        let mut layout = *self.layout.read();
        if !self.summaries.has_descriptors() {
            layout.summary = SummaryPlacement::None;
        }
        *self.slots.write() = SlotTable::build(row_count, &group_runs, &collapsed, layout);
    }

    fn normalize_display(&self) {
        let count = self.slot_count();
        let height = self.row_height();
        let viewport_height = self.viewport.read().height;
        let mut display = self.display.write();
        display.normalize_vertical(count);
        if viewport_height > 0.0 {
            display.update_displayed_slots(viewport_height, |_| height, count);
        }
    }

    fn recompute_displayed_columns(&self) {
        let geometry = self.column_geometry();
        let viewport = *self.viewport.read();
        let mut display = self.display.write();
        compute_displayed_columns(
            &geometry,
            viewport.width,
            viewport.horizontal_offset,
            &mut display,
        );
    }
}

impl<R: Clone + Send + Sync + 'static> std::fmt::Debug for DataGrid<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataGrid")
            .field("columns", &self.columns.read().len())
            .field("rows", &self.visible_row_count())
            .field("slots", &self.slot_count())
            .field("hierarchical", &self.is_hierarchical())
            .finish()
    }
}
