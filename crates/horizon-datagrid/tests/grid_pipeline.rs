//! End-to-end grid pipeline tests: columns, view, adapters, slots, and
//! selection working together through the public API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use horizon_datagrid::grid::display::{SlotKind, SlotLayoutOptions, SummaryPlacement};
use horizon_datagrid::grid::selection::SelectionFlags;
use horizon_datagrid::grid::summary::{SummaryAggregate, SummaryDescriptor};
use horizon_datagrid::grid::DataGrid;
use horizon_datagrid::model::{
    CellValue, Column, ColumnId, FilterOperator, FilteringDescriptor, SearchDescriptor,
    SortDirection, SortingDescriptor, SortingModifiers, ViewChange,
};
use horizon_datagrid::view::collection_view::GroupDescription;

#[derive(Debug, Clone, PartialEq)]
struct FileRow {
    id: u64,
    name: String,
    kind: &'static str,
    size: i64,
}

fn row(id: u64, name: &str, kind: &'static str, size: i64) -> FileRow {
    FileRow { id, name: name.to_owned(), kind, size }
}

fn sample() -> Vec<FileRow> {
    vec![
        row(1, "report.pdf", "document", 420),
        row(2, "notes.txt", "document", 12),
        row(3, "backup.zip", "archive", 9000),
        row(4, "photo.png", "image", 1500),
        row(5, "draft.txt", "document", 33),
    ]
}

fn file_grid() -> DataGrid<FileRow> {
    let grid = DataGrid::new(|f: &FileRow| f.id);
    grid.add_column(
        Column::new("Name")
            .with_path("name")
            .with_accessor(|f: &FileRow| CellValue::from(f.name.clone()))
            .with_width(160.0),
    );
    grid.add_column(
        Column::new("Kind")
            .with_path("kind")
            .with_accessor(|f: &FileRow| CellValue::from(f.kind))
            .with_width(80.0),
    );
    grid.add_column(
        Column::new("Size")
            .with_path("size")
            .with_accessor(|f: &FileRow| CellValue::from(f.size))
            .with_width(80.0),
    );
    grid
}

fn visible_ids(grid: &DataGrid<FileRow>) -> Vec<u64> {
    grid.visible_rows().iter().map(|f| f.id).collect()
}

#[test]
fn test_filter_sort_search_compose() {
    let grid = file_grid();
    grid.set_rows(sample());

    grid.apply_filter(FilteringDescriptor::equals(ColumnId::path("kind"), "document"));
    assert_eq!(visible_ids(&grid), vec![1, 2, 5]);

    grid.header_click(&ColumnId::path("size"), SortingModifiers::default());
    assert_eq!(visible_ids(&grid), vec![2, 5, 1]);

    // Search runs over the filtered, sorted rows and reports view-order
    // row indices.
    let count = grid.run_search(SearchDescriptor::new("txt")).unwrap();
    assert_eq!(count, 2);
    let results = grid.search().model().results();
    assert_eq!(results[0].row, 0); // notes.txt
    assert_eq!(results[1].row, 1); // draft.txt

    // Dropping the filter rescans; backup.zip still does not match.
    grid.clear_filters();
    assert_eq!(grid.visible_row_count(), 5);
    assert_eq!(grid.search().model().result_count(), 2);
}

#[test]
fn test_selection_follows_rows_through_sorting() {
    let grid = file_grid();
    grid.set_rows(sample());

    // Select backup.zip by its slot, then reverse the order twice.
    let slot = grid.slot_of_row(2).unwrap();
    grid.select_at_slot(slot, SelectionFlags::replace());
    assert!(grid.selection().is_selected(3));

    grid.header_click(&ColumnId::path("size"), SortingModifiers::default());
    grid.header_click(&ColumnId::path("size"), SortingModifiers::default());
    // Descending by size puts the selected row first.
    assert_eq!(grid.row_key_at(0), Some(3));
    assert_eq!(grid.selected_slots(), vec![0]);
}

#[test]
fn test_multi_column_sort_via_modifier() {
    let grid = file_grid();
    grid.set_rows(sample());

    grid.header_click(&ColumnId::path("kind"), SortingModifiers::default());
    grid.header_click(&ColumnId::path("size"), SortingModifiers { multi: true, clear: false });

    // kind ascending, then size ascending within each kind.
    assert_eq!(visible_ids(&grid), vec![3, 2, 5, 1, 4]);
    assert_eq!(grid.sorting().model().descriptors().len(), 2);
}

#[test]
fn test_failed_sort_rolls_back_model_and_view() {
    let grid = file_grid();
    grid.set_rows(sample());
    let before = visible_ids(&grid);

    // No accessor is registered for this path, so the view rejects the
    // sort and the adapter rolls the model back.
    grid.sorting().model().apply(vec![SortingDescriptor::by_path(
        ColumnId::path("owner"),
        "owner",
    )]);

    assert!(grid.sorting().model().is_empty());
    assert!(grid.view().sort_descriptions().is_empty());
    assert_eq!(visible_ids(&grid), before);
}

#[test]
fn test_deferred_refresh_emits_single_reset() {
    let grid = file_grid();
    grid.set_rows(sample());

    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    grid.view()
        .view_changed
        .connect(move |ch: &ViewChange| e.lock().push(*ch));

    {
        let _guard = grid.view().defer_refresh();
        grid.view().push_item(row(6, "extra.txt", "document", 5));
        grid.view().remove_item(0);
        grid.view().push_item(row(7, "more.txt", "document", 6));
        assert!(events.lock().is_empty());
    }
    assert_eq!(*events.lock(), vec![ViewChange::Reset]);

    grid.notify_rows_changed();
    assert_eq!(grid.visible_row_count(), 6);
    assert_eq!(grid.slot_count(), 6);
}

#[test]
fn test_grouped_slots_with_summary_and_collapse() {
    let grid = file_grid();
    grid.summaries().set_descriptors(vec![SummaryDescriptor {
        column_id: ColumnId::path("size"),
        aggregate: SummaryAggregate::Sum(Arc::new(|f: &FileRow| CellValue::Int(f.size))),
    }]);
    grid.summaries().set_recalc_delay(Duration::ZERO);
    grid.set_slot_layout(SlotLayoutOptions {
        summary: SummaryPlacement::Bottom,
        ..SlotLayoutOptions::default()
    });
    grid.set_rows(sample());
    grid.set_group_by(Some(GroupDescription::new(|f: &FileRow| {
        CellValue::from(f.kind)
    })));

    // 3 group headers + 5 rows + summary row.
    assert_eq!(grid.slot_count(), 9);
    assert_eq!(grid.slot_kind_at(0), Some(SlotKind::GroupHeader));
    assert_eq!(grid.slot_kind_at(8), Some(SlotKind::SummaryRow));

    // Collapse the first group (archive: one row).
    assert!(grid.collapse_group(0));
    assert_eq!(grid.slot_count(), 8);
    assert_eq!(grid.slot_of_row(0), None);

    assert!(grid.process_pending(Instant::now()));
    assert_eq!(
        grid.summaries().value(&ColumnId::path("size")),
        Some(CellValue::Int(10965))
    );
}

#[test]
fn test_summary_tracks_filtered_rows() {
    let grid = file_grid();
    grid.summaries().set_descriptors(vec![SummaryDescriptor {
        column_id: ColumnId::path("size"),
        aggregate: SummaryAggregate::Sum(Arc::new(|f: &FileRow| CellValue::Int(f.size))),
    }]);
    grid.summaries().set_recalc_delay(Duration::ZERO);
    grid.set_rows(sample());

    grid.apply_filter(FilteringDescriptor::new(
        ColumnId::path("size"),
        FilterOperator::LessThan,
        vec![CellValue::Int(100)],
    ));
    assert!(grid.process_pending(Instant::now()));
    assert_eq!(
        grid.summaries().value(&ColumnId::path("size")),
        Some(CellValue::Int(45))
    );
}

#[test]
fn test_search_navigation_wraps() {
    let grid = file_grid();
    grid.set_rows(sample());
    let count = grid.run_search(SearchDescriptor::new("txt")).unwrap();
    assert_eq!(count, 2);

    let model = grid.search().model();
    assert_eq!(model.current_index(), -1);
    assert_eq!(model.move_next(), Some(0));
    assert_eq!(model.move_next(), Some(1));
    assert_eq!(model.move_next(), Some(0));
    assert_eq!(model.move_previous(), Some(1));
}

#[test]
fn test_explicit_sort_descriptors_through_model() {
    let grid = file_grid();
    grid.set_rows(sample());

    grid.sorting().model().apply(vec![
        SortingDescriptor::by_path(ColumnId::path("kind"), "kind"),
        SortingDescriptor::by_path(ColumnId::path("size"), "size")
            .with_direction(SortDirection::Descending),
    ]);
    grid.notify_rows_changed();

    assert_eq!(visible_ids(&grid), vec![3, 1, 5, 2, 4]);
}

#[test]
fn test_viewport_scrolling_stays_consistent() {
    let grid = file_grid();
    grid.set_rows((0..100).map(|i| row(i, "f", "document", i as i64)).collect());
    grid.set_row_height(20.0);
    grid.set_viewport_size(320.0, 200.0);

    grid.scroll_vertically(1000.0);
    let display = grid.display();
    assert_eq!(display.first_scrolling_slot, 50);
    assert_eq!(display.last_scrolling_slot, 59);

    // Filter down to 10 rows: scroll position clamps back into range.
    grid.apply_filter(FilteringDescriptor::new(
        ColumnId::path("size"),
        FilterOperator::LessThan,
        vec![CellValue::Int(10)],
    ));
    let display = grid.display();
    assert_eq!(display.first_scrolling_slot, 9);
    assert!(display.neg_vertical_offset >= 0.0);
}

#[test]
fn test_horizontal_virtualization_tracks_column_widths() {
    let grid = file_grid();
    grid.set_rows(sample());
    grid.set_viewport_size(200.0, 200.0);

    grid.set_horizontal_offset(0.0);
    let display = grid.display();
    assert_eq!(display.first_displayed_scrolling_col, 0);
    // Name (160) fits; Kind would end at 240 > 200.
    assert_eq!(display.last_totally_displayed_scrolling_col, 0);

    grid.ensure_column_displayed(2);
    let display = grid.display();
    assert_eq!(display.last_totally_displayed_scrolling_col, 2);
    // Name + Kind + Size = 320; offset aligns Size's right edge.
    assert_eq!(grid.viewport().horizontal_offset, 120.0);
}

#[test]
fn test_selection_identity_survives_sort_and_growth() {
    use horizon_datagrid::grid::selection::SelectionMode;

    let grid = file_grid();
    grid.selection().set_mode(SelectionMode::MultiSelection);
    grid.set_rows(sample());
    grid.select_at_slot(1, SelectionFlags::add()); // notes.txt, id 2
    grid.select_at_slot(2, SelectionFlags::add()); // backup.zip, id 3

    grid.insert_row(0, row(6, "aaa.txt", "document", 1));
    grid.insert_row(3, row(7, "zzz.bin", "archive", 99_999));
    for _ in 0..2 {
        grid.header_click(&ColumnId::path("size"), SortingModifiers::default());
        grid.header_click(&ColumnId::path("size"), SortingModifiers::default());
    }

    let mut selected = grid.selection().selected_keys();
    selected.sort_unstable();
    assert_eq!(selected, vec![2, 3]);
    // Both selected rows still resolve to slots, wherever they moved.
    assert_eq!(grid.selected_slots().len(), 2);
}

#[test]
fn test_removing_selected_row_clears_its_state() {
    let grid = file_grid();
    grid.set_rows(sample());
    grid.select_at_slot(0, SelectionFlags::replace());
    assert!(grid.selection().is_selected(1));

    grid.remove_row(0);
    assert!(!grid.selection().is_selected(1));
    assert_eq!(grid.selection().current_key(), None);
    assert_eq!(grid.visible_row_count(), 4);
}
