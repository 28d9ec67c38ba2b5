//! File-browser style walkthrough of the grid core.
//!
//! Builds a hierarchical grid over a fake directory tree, then drives it
//! from the console: expanding, sorting, filtering, and searching, printing
//! the slot sequence after each step.
//!
//! Run with: cargo run -p horizon-datagrid --example file_browser
//! Set RUST_LOG=horizon=trace to watch the internal change traffic.

use horizon_datagrid::grid::selection::SelectionFlags;
use horizon_datagrid::grid::DataGrid;
use horizon_datagrid::model::{
    CellValue, Column, ColumnId, FilteringDescriptor, HierarchicalOptions, SearchDescriptor,
    SortingModifiers,
};

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    id: u64,
    name: &'static str,
    size: i64,
    children: Vec<Entry>,
}

fn file(id: u64, name: &'static str, size: i64) -> Entry {
    Entry { id, name, size, children: Vec::new() }
}

fn dir(id: u64, name: &'static str, children: Vec<Entry>) -> Entry {
    Entry { id, name, size: 0, children }
}

fn tree() -> Vec<Entry> {
    vec![
        dir(1, "src", vec![
            file(2, "lib.rs", 4_200),
            file(3, "main.rs", 380),
            dir(4, "model", vec![file(5, "value.rs", 2_900), file(6, "column.rs", 3_100)]),
        ]),
        dir(7, "tests", vec![file(8, "pipeline.rs", 5_600)]),
        file(9, "README.md", 1_800),
        file(10, "Cargo.toml", 540),
    ]
}

fn print_rows(title: &str, grid: &DataGrid<Entry>) {
    println!("\n== {title} ==");
    let model = grid.hierarchical_model();
    for (index, entry) in grid.visible_rows().iter().enumerate() {
        let depth = model
            .as_ref()
            .and_then(|m| m.node_at(index).and_then(|k| m.depth_of(k)))
            .unwrap_or(0);
        let selected = grid
            .selected_slots()
            .contains(&grid.slot_of_row(index).unwrap_or(usize::MAX));
        println!(
            "{}{}{} ({} bytes)",
            if selected { "> " } else { "  " },
            "  ".repeat(depth),
            entry.name,
            entry.size,
        );
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let grid = DataGrid::new(|e: &Entry| e.id);
    grid.add_column(
        Column::new("Name")
            .with_path("name")
            .with_accessor(|e: &Entry| CellValue::from(e.name))
            .with_width(220.0),
    );
    grid.add_column(
        Column::new("Size")
            .with_path("size")
            .with_accessor(|e: &Entry| CellValue::from(e.size))
            .with_width(90.0),
    );

    let model = grid.enable_hierarchical_rows(
        HierarchicalOptions::new(|e: &Entry| e.children.clone())
            .with_item_key(|e: &Entry| e.id),
        tree(),
    );
    print_rows("collapsed roots", &grid);

    model.expand_all();
    grid.notify_rows_changed();
    print_rows("everything expanded", &grid);

    grid.select_at_slot(1, SelectionFlags::replace());
    grid.header_click(&ColumnId::path("name"), SortingModifiers::default());
    print_rows("after clicking the Name header", &grid);

    match grid.run_search(SearchDescriptor::new(".rs")) {
        Ok(count) => {
            println!("\nsearch \".rs\": {count} hits");
            while let Some(index) = grid.search().model().move_next() {
                let result = grid.search().model().current_result();
                if let Some(result) = result {
                    println!("  hit at row {index}: {}", result.text);
                }
                if index + 1 == count {
                    break;
                }
            }
        }
        Err(error) => println!("search failed: {error}"),
    }

    // Flat mode with a filter, for comparison.
    grid.disable_hierarchical_rows();
    grid.set_rows(vec![
        file(2, "lib.rs", 4_200),
        file(3, "main.rs", 380),
        file(5, "value.rs", 2_900),
        file(8, "pipeline.rs", 5_600),
        file(9, "README.md", 1_800),
    ]);
    grid.apply_filter(FilteringDescriptor::new(
        ColumnId::path("size"),
        horizon_datagrid::model::FilterOperator::GreaterThan,
        vec![CellValue::Int(1_000)],
    ));
    print_rows("flat, filtered to size > 1000", &grid);

    let sum: i64 = grid.visible_rows().iter().map(|e| e.size).sum();
    println!("\nvisible total: {sum} bytes across {} rows", grid.visible_row_count());
    println!("done");
}
