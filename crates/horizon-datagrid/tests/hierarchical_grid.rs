//! Hierarchical rows driven through the grid facade: flattening, slot
//! mapping, search over the flattened projection, and live children
//! changes.

use std::sync::Arc;

use parking_lot::Mutex;

use horizon_datagrid::grid::selection::SelectionFlags;
use horizon_datagrid::grid::DataGrid;
use horizon_datagrid::model::{
    CellValue, ChildrenChange, Column, HierarchicalOptions, SearchDescriptor,
};

#[derive(Debug, Clone, PartialEq)]
struct Node {
    id: u64,
    name: &'static str,
    children: Vec<Node>,
}

fn leaf(id: u64, name: &'static str) -> Node {
    Node { id, name, children: Vec::new() }
}

fn branch(id: u64, name: &'static str, children: Vec<Node>) -> Node {
    Node { id, name, children }
}

fn tree_grid() -> DataGrid<Node> {
    let grid = DataGrid::new(|n: &Node| n.id);
    grid.add_column(
        Column::new("Name")
            .with_path("name")
            .with_accessor(|n: &Node| CellValue::from(n.name)),
    );
    grid
}

/// src(main.rs, lib.rs), tests(basic.rs), README.md
fn sample() -> Vec<Node> {
    vec![
        branch(1, "src", vec![leaf(2, "main.rs"), leaf(3, "lib.rs")]),
        branch(4, "tests", vec![leaf(5, "basic.rs")]),
        leaf(6, "README.md"),
    ]
}

fn visible_names(grid: &DataGrid<Node>) -> Vec<&'static str> {
    grid.visible_rows().iter().map(|n| n.name).collect()
}

#[test]
fn test_slots_track_expansion() {
    let grid = tree_grid();
    grid.enable_hierarchical_rows(
        HierarchicalOptions::new(|n: &Node| n.children.clone()).with_item_key(|n: &Node| n.id),
        sample(),
    );
    assert_eq!(visible_names(&grid), vec!["src", "tests", "README.md"]);
    assert_eq!(grid.slot_count(), 3);

    assert!(grid.try_toggle_hierarchical_at_slot(0));
    assert_eq!(
        visible_names(&grid),
        vec!["src", "main.rs", "lib.rs", "tests", "README.md"]
    );
    assert_eq!(grid.slot_count(), 5);
    assert_eq!(grid.row_key_at(1), Some(2));

    // Leaf slots do not toggle.
    assert!(!grid.try_toggle_hierarchical_at_slot(4));
}

#[test]
fn test_search_scans_flattened_rows() {
    let grid = tree_grid();
    let model = grid.enable_hierarchical_rows(
        HierarchicalOptions::new(|n: &Node| n.children.clone()).with_item_key(|n: &Node| n.id),
        sample(),
    );

    // Collapsed: only the roots are scanned.
    let count = grid.run_search(SearchDescriptor::new(".rs")).unwrap();
    assert_eq!(count, 0);

    model.expand_all();
    grid.notify_rows_changed();
    assert_eq!(grid.search().model().result_count(), 3);

    let results = grid.search().model().results();
    assert_eq!(results[0].row, 1); // main.rs
    assert_eq!(results[2].row, 4); // basic.rs
}

#[test]
fn test_reveal_node_expands_ancestors() {
    let grid = tree_grid();
    let model = grid.enable_hierarchical_rows(
        HierarchicalOptions::new(|n: &Node| n.children.clone()).with_item_key(|n: &Node| n.id),
        sample(),
    );
    model.expand_all();
    let (_, lib) = model.find_visible(|n| n.name == "lib.rs").unwrap();
    model.collapse_all();
    grid.notify_rows_changed();
    assert_eq!(grid.slot_count(), 3);

    let slot = grid.reveal_node(lib);
    assert_eq!(slot, Some(2));
    assert_eq!(grid.slot_count(), 5);
}

#[test]
fn test_live_children_changes_flow_into_slots() {
    let shared = Arc::new(Mutex::new(vec![leaf(10, "a.log"), leaf(11, "b.log")]));
    let source = shared.clone();
    let grid = tree_grid();
    let model = grid.enable_hierarchical_rows(
        HierarchicalOptions::new(move |n: &Node| {
            if n.name == "logs" {
                source.lock().clone()
            } else {
                Vec::new()
            }
        })
        .with_item_key(|n: &Node| n.id)
        .auto_expand_root(),
        vec![branch(1, "logs", Vec::new())],
    );
    grid.notify_rows_changed();
    assert_eq!(visible_names(&grid), vec!["logs", "a.log", "b.log"]);

    let root = model.node_at(0).unwrap();
    shared.lock().push(leaf(12, "c.log"));
    model.apply_children_change(Some(root), ChildrenChange::Inserted { index: 2, count: 1 });
    grid.notify_rows_changed();
    assert_eq!(visible_names(&grid), vec!["logs", "a.log", "b.log", "c.log"]);
    assert_eq!(grid.slot_count(), 4);

    shared.lock().remove(0);
    model.apply_children_change(Some(root), ChildrenChange::Removed { index: 0, count: 1 });
    grid.notify_rows_changed();
    assert_eq!(visible_names(&grid), vec!["logs", "b.log", "c.log"]);
}

#[test]
fn test_selection_pruned_when_subtree_collapses() {
    let grid = tree_grid();
    grid.enable_hierarchical_rows(
        HierarchicalOptions::new(|n: &Node| n.children.clone()).with_item_key(|n: &Node| n.id),
        sample(),
    );
    grid.try_toggle_hierarchical_at_slot(0);
    grid.select_at_slot(1, SelectionFlags::replace());
    grid.select_at_slot(2, SelectionFlags::add());
    // Single-selection default: only the last click survives.
    assert_eq!(grid.selection().selected_keys(), vec![3]);

    grid.try_toggle_hierarchical_at_slot(0);
    assert!(!grid.selection().has_selection());
    // The root itself is still selectable.
    assert!(grid.select_at_slot(0, SelectionFlags::replace()));
    assert!(grid.selection().is_selected(1));
}

#[test]
fn test_expanded_state_survives_root_replacement() {
    let grid = tree_grid();
    let model = grid.enable_hierarchical_rows(
        HierarchicalOptions::new(|n: &Node| n.children.clone()).with_item_key(|n: &Node| n.id),
        sample(),
    );
    grid.try_toggle_hierarchical_at_slot(0);
    assert_eq!(grid.visible_row_count(), 5);

    // Repopulating with the same item keys restores the expansion.
    model.set_roots(sample());
    grid.notify_rows_changed();
    assert_eq!(
        visible_names(&grid),
        vec!["src", "main.rs", "lib.rs", "tests", "README.md"]
    );
}
