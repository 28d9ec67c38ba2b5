//! Slot table and display bookkeeping.
//!
//! The display layer addresses *slots*, not rows: the slot sequence
//! interleaves data rows with group headers/footers and an optional summary
//! row. [`SlotTable`] maps between view rows and slots; [`DisplayData`]
//! tracks which slot range and column range are scrolled into view.
//!
//! Scroll state is defensive by construction: every scrolling operation
//! first normalizes `first_scrolling_slot` and `neg_vertical_offset`, so a
//! stale `-1` sentinel or a negative offset left over from a structural
//! change can never drive the walk out of range.

use std::collections::HashSet;

use crate::view::collection_view::GroupRun;

/// What a slot renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Row,
    GroupHeader,
    GroupFooter,
    SummaryRow,
    /// Blank space filling the viewport below the last slot.
    Filler,
}

/// Where the summary row sits in the slot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryPlacement {
    #[default]
    None,
    Top,
    Bottom,
}

/// Slot-sequence construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotLayoutOptions {
    pub group_footers: bool,
    pub summary: SummaryPlacement,
    /// Append a trailing filler slot.
    pub filler: bool,
}

/// One entry in the slot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub kind: SlotKind,
    /// View row index, for `Row` slots.
    pub row: Option<usize>,
    /// Group run index, for headers/footers and the rows under them.
    pub group: Option<usize>,
}

/// The materialized slot sequence plus the row/slot mappings.
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: Vec<Slot>,
    row_to_slot: Vec<Option<usize>>,
}

impl SlotTable {
    /// Build the slot sequence for `row_count` view rows.
    ///
    /// Without group runs the sequence is the rows themselves (plus summary
    /// and filler per `options`). With group runs every run contributes a
    /// header, its rows unless the run is collapsed, and optionally a
    /// footer.
    pub fn build(
        row_count: usize,
        group_runs: &[GroupRun],
        collapsed_groups: &HashSet<usize>,
        options: SlotLayoutOptions,
    ) -> Self {
        let mut slots = Vec::new();
        let mut row_to_slot = vec![None; row_count];

        if options.summary == SummaryPlacement::Top {
            slots.push(Slot { kind: SlotKind::SummaryRow, row: None, group: None });
        }

        if group_runs.is_empty() {
            for row in 0..row_count {
                row_to_slot[row] = Some(slots.len());
                slots.push(Slot { kind: SlotKind::Row, row: Some(row), group: None });
            }
        } else {
            for (group, run) in group_runs.iter().enumerate() {
                slots.push(Slot {
                    kind: SlotKind::GroupHeader,
                    row: None,
                    group: Some(group),
                });
                if !collapsed_groups.contains(&group) {
                    for row in run.start..run.start + run.len {
                        if row < row_count {
                            row_to_slot[row] = Some(slots.len());
                            slots.push(Slot {
                                kind: SlotKind::Row,
                                row: Some(row),
                                group: Some(group),
                            });
                        }
                    }
                }
                if options.group_footers {
                    slots.push(Slot {
                        kind: SlotKind::GroupFooter,
                        row: None,
                        group: Some(group),
                    });
                }
            }
        }

        if options.summary == SummaryPlacement::Bottom {
            slots.push(Slot { kind: SlotKind::SummaryRow, row: None, group: None });
        }
        if options.filler {
            slots.push(Slot { kind: SlotKind::Filler, row: None, group: None });
        }

        Self { slots, row_to_slot }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot_at(&self, slot: usize) -> Option<&Slot> {
        self.slots.get(slot)
    }

    pub fn kind_at(&self, slot: usize) -> Option<SlotKind> {
        self.slots.get(slot).map(|s| s.kind)
    }

    /// The slot showing a view row; `None` when the row's group is
    /// collapsed.
    pub fn slot_of_row(&self, row: usize) -> Option<usize> {
        self.row_to_slot.get(row).copied().flatten()
    }

    /// The view row behind a slot, for `Row` slots.
    pub fn row_of_slot(&self, slot: usize) -> Option<usize> {
        self.slots.get(slot).and_then(|s| s.row)
    }
}

/// Scroll position over slots and columns.
///
/// Slot and column fields use `-1` to mean "nothing displayed". The
/// negative offsets hold the portion of the first displayed slot/column
/// scrolled out of view, and are invariantly non-negative after any
/// operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayData {
    pub first_scrolling_slot: i32,
    pub last_scrolling_slot: i32,
    pub neg_vertical_offset: f64,
    pub first_displayed_scrolling_col: i32,
    pub last_totally_displayed_scrolling_col: i32,
    pub neg_horizontal_offset: f64,
}

impl Default for DisplayData {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayData {
    pub fn new() -> Self {
        Self {
            first_scrolling_slot: -1,
            last_scrolling_slot: -1,
            neg_vertical_offset: 0.0,
            first_displayed_scrolling_col: -1,
            last_totally_displayed_scrolling_col: -1,
            neg_horizontal_offset: 0.0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Clamp the vertical scroll fields into the valid range for
    /// `slot_count` slots.
    pub fn normalize_vertical(&mut self, slot_count: usize) {
        if slot_count == 0 {
            self.first_scrolling_slot = -1;
            self.last_scrolling_slot = -1;
            self.neg_vertical_offset = 0.0;
            return;
        }
        let max = (slot_count - 1) as i32;
        if self.first_scrolling_slot < 0 {
            self.first_scrolling_slot = 0;
            self.neg_vertical_offset = 0.0;
        }
        if self.first_scrolling_slot > max {
            self.first_scrolling_slot = max;
            self.neg_vertical_offset = 0.0;
        }
        if self.neg_vertical_offset < 0.0 {
            self.neg_vertical_offset = 0.0;
        }
        if self.last_scrolling_slot < self.first_scrolling_slot
            || self.last_scrolling_slot > max
        {
            self.last_scrolling_slot = self.first_scrolling_slot;
        }
    }

    /// Scroll the slot range by `delta` device-independent pixels
    /// (positive scrolls down). `slot_height` supplies per-slot heights.
    ///
    /// The state is normalized on entry, so the walk is in-range even when
    /// the previous state was corrupted by a structural change.
    pub fn scroll_vertically(
        &mut self,
        delta: f64,
        slot_height: impl Fn(usize) -> f64,
        slot_count: usize,
    ) {
        self.normalize_vertical(slot_count);
        if slot_count == 0 {
            return;
        }

        let mut first = self.first_scrolling_slot as usize;
        let mut offset = self.neg_vertical_offset + delta;

        if delta >= 0.0 {
            while first + 1 < slot_count && offset >= slot_height(first) {
                offset -= slot_height(first);
                first += 1;
            }
            if offset >= slot_height(first) {
                // Bottom of the scroll range.
                offset = slot_height(first);
            }
        } else {
            while offset < 0.0 && first > 0 {
                first -= 1;
                offset += slot_height(first);
            }
            if offset < 0.0 {
                offset = 0.0;
            }
        }

        self.first_scrolling_slot = first as i32;
        self.neg_vertical_offset = offset;
        if self.last_scrolling_slot < self.first_scrolling_slot {
            self.last_scrolling_slot = self.first_scrolling_slot;
        }
        tracing::trace!(
            target: crate::logging::targets::DISPLAY,
            first = self.first_scrolling_slot,
            offset = self.neg_vertical_offset,
            "vertical scroll"
        );
    }

    /// Recompute `last_scrolling_slot` for a viewport of `height` pixels.
    pub fn update_displayed_slots(
        &mut self,
        height: f64,
        slot_height: impl Fn(usize) -> f64,
        slot_count: usize,
    ) {
        self.normalize_vertical(slot_count);
        if slot_count == 0 {
            return;
        }
        let first = self.first_scrolling_slot as usize;
        let mut y = -self.neg_vertical_offset;
        let mut last = first;
        for slot in first..slot_count {
            y += slot_height(slot);
            last = slot;
            if y >= height {
                break;
            }
        }
        self.last_scrolling_slot = last as i32;
    }
}

/// Width/frozen/visible geometry of one column, in display order.
#[derive(Debug, Clone, Copy)]
pub struct ColumnGeometry {
    pub index: usize,
    pub width: f64,
    pub frozen: bool,
    pub visible: bool,
}

/// Total width of the visible frozen columns.
pub fn frozen_width(columns: &[ColumnGeometry]) -> f64 {
    columns
        .iter()
        .filter(|c| c.visible && c.frozen)
        .map(|c| c.width)
        .sum()
}

/// Recompute the displayed scrolling-column range for a horizontal offset.
///
/// `first_displayed_scrolling_col` is the first visible unfrozen column not
/// entirely scrolled off to the left, with `neg_horizontal_offset` holding
/// the hidden portion of its width; `last_totally_displayed_scrolling_col`
/// is the last column whose right edge still fits in the cells area.
pub fn compute_displayed_columns(
    columns: &[ColumnGeometry],
    cells_width: f64,
    horizontal_offset: f64,
    display: &mut DisplayData,
) {
    let available = cells_width - frozen_width(columns);
    let scrolling: Vec<&ColumnGeometry> = columns
        .iter()
        .filter(|c| c.visible && !c.frozen)
        .collect();

    if available <= 0.0 || scrolling.is_empty() {
        display.first_displayed_scrolling_col = -1;
        display.last_totally_displayed_scrolling_col = -1;
        display.neg_horizontal_offset = 0.0;
        return;
    }

    let horizontal_offset = horizontal_offset.max(0.0);
    let mut remaining = horizontal_offset;
    let mut first = scrolling.len() - 1;
    let mut neg = 0.0;
    for (i, column) in scrolling.iter().enumerate() {
        if remaining < column.width {
            first = i;
            neg = remaining;
            break;
        }
        remaining -= column.width;
    }

    let mut last_totally = -1i32;
    let mut x = -neg;
    for column in scrolling.iter().skip(first) {
        x += column.width;
        if x <= available {
            last_totally = column.index as i32;
        } else {
            break;
        }
    }

    display.first_displayed_scrolling_col = scrolling[first].index as i32;
    display.neg_horizontal_offset = neg;
    display.last_totally_displayed_scrolling_col = last_totally;
}

/// The horizontal offset that brings `target` fully into view, leaving the
/// offset unchanged when the column is frozen, hidden, or already fully
/// displayed.
pub fn scroll_column_into_view(
    columns: &[ColumnGeometry],
    cells_width: f64,
    horizontal_offset: f64,
    target: usize,
) -> f64 {
    let Some(column) = columns.iter().find(|c| c.index == target) else {
        return horizontal_offset;
    };
    if column.frozen || !column.visible {
        return horizontal_offset;
    }

    let available = cells_width - frozen_width(columns);
    if available <= 0.0 {
        return horizontal_offset;
    }

    // Left edge of the target within the scrolling region.
    let left: f64 = columns
        .iter()
        .filter(|c| c.visible && !c.frozen && c.index < target)
        .map(|c| c.width)
        .sum();
    let right = left + column.width;

    if left < horizontal_offset {
        // Scrolled off to the left: align its left edge.
        left
    } else if right > horizontal_offset + available {
        // Sticking out to the right: align its right edge.
        right - available
    } else {
        horizontal_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::value::CellValue;

    fn runs(groups: &[(i64, usize, usize)]) -> Vec<GroupRun> {
        groups.iter()
            .map(|&(key, start, len)| GroupRun {
                key: CellValue::Int(key),
                start,
                len,
            })
            .collect()
    }

    #[test]
    fn test_flat_slot_table_is_rows() {
        let table = SlotTable::build(3, &[], &HashSet::new(), SlotLayoutOptions::default());
        assert_eq!(table.len(), 3);
        assert_eq!(table.kind_at(1), Some(SlotKind::Row));
        assert_eq!(table.slot_of_row(2), Some(2));
        assert_eq!(table.row_of_slot(2), Some(2));
    }

    #[test]
    fn test_grouped_slot_table_interleaves_headers() {
        let table = SlotTable::build(
            5,
            &runs(&[(1, 0, 3), (2, 3, 2)]),
            &HashSet::new(),
            SlotLayoutOptions::default(),
        );
        // header, r0, r1, r2, header, r3, r4
        assert_eq!(table.len(), 7);
        assert_eq!(table.kind_at(0), Some(SlotKind::GroupHeader));
        assert_eq!(table.slot_of_row(0), Some(1));
        assert_eq!(table.kind_at(4), Some(SlotKind::GroupHeader));
        assert_eq!(table.slot_of_row(3), Some(5));
    }

    #[test]
    fn test_collapsed_group_hides_rows() {
        let mut collapsed = HashSet::new();
        collapsed.insert(0);
        let table = SlotTable::build(
            5,
            &runs(&[(1, 0, 3), (2, 3, 2)]),
            &collapsed,
            SlotLayoutOptions::default(),
        );
        // header, header, r3, r4
        assert_eq!(table.len(), 4);
        assert_eq!(table.slot_of_row(1), None);
        assert_eq!(table.slot_of_row(3), Some(2));
    }

    #[test]
    fn test_footers_and_summary() {
        let table = SlotTable::build(
            2,
            &runs(&[(1, 0, 2)]),
            &HashSet::new(),
            SlotLayoutOptions {
                group_footers: true,
                summary: SummaryPlacement::Bottom,
                filler: true,
            },
        );
        // header, r0, r1, footer, summary, filler
        assert_eq!(table.len(), 6);
        assert_eq!(table.kind_at(3), Some(SlotKind::GroupFooter));
        assert_eq!(table.kind_at(4), Some(SlotKind::SummaryRow));
        assert_eq!(table.kind_at(5), Some(SlotKind::Filler));
    }

    #[test]
    fn test_scroll_normalizes_corrupted_state() {
        let mut display = DisplayData::new();
        display.first_scrolling_slot = -1;
        display.neg_vertical_offset = -12.0;

        display.scroll_vertically(0.0, |_| 20.0, 10);
        assert_eq!(display.first_scrolling_slot, 0);
        assert!(display.neg_vertical_offset >= 0.0);
        assert!(display.neg_vertical_offset < 12.0);
    }

    #[test]
    fn test_scroll_down_walks_slots() {
        let mut display = DisplayData::new();
        display.scroll_vertically(50.0, |_| 20.0, 10);
        assert_eq!(display.first_scrolling_slot, 2);
        assert_eq!(display.neg_vertical_offset, 10.0);

        display.scroll_vertically(-30.0, |_| 20.0, 10);
        assert_eq!(display.first_scrolling_slot, 1);
        assert_eq!(display.neg_vertical_offset, 0.0);
    }

    #[test]
    fn test_scroll_clamps_at_ends() {
        let mut display = DisplayData::new();
        display.scroll_vertically(-100.0, |_| 20.0, 5);
        assert_eq!(display.first_scrolling_slot, 0);
        assert_eq!(display.neg_vertical_offset, 0.0);

        display.scroll_vertically(10_000.0, |_| 20.0, 5);
        assert_eq!(display.first_scrolling_slot, 4);
        assert!(display.neg_vertical_offset <= 20.0);
    }

    #[test]
    fn test_scroll_empty_table_resets() {
        let mut display = DisplayData::new();
        display.first_scrolling_slot = 7;
        display.scroll_vertically(10.0, |_| 20.0, 0);
        assert_eq!(display.first_scrolling_slot, -1);
        assert_eq!(display.neg_vertical_offset, 0.0);
    }

    #[test]
    fn test_update_displayed_slots() {
        let mut display = DisplayData::new();
        display.scroll_vertically(10.0, |_| 20.0, 10);
        display.update_displayed_slots(100.0, |_| 20.0, 10);
        // First slot half-hidden, so six slots intersect the viewport.
        assert_eq!(display.first_scrolling_slot, 0);
        assert_eq!(display.last_scrolling_slot, 5);
    }

    fn geometry() -> Vec<ColumnGeometry> {
        vec![
            ColumnGeometry { index: 0, width: 50.0, frozen: true, visible: true },
            ColumnGeometry { index: 1, width: 100.0, frozen: false, visible: true },
            ColumnGeometry { index: 2, width: 100.0, frozen: false, visible: true },
            ColumnGeometry { index: 3, width: 100.0, frozen: false, visible: true },
            ColumnGeometry { index: 4, width: 100.0, frozen: false, visible: false },
            ColumnGeometry { index: 5, width: 100.0, frozen: false, visible: true },
        ]
    }

    #[test]
    fn test_displayed_columns_at_origin() {
        let mut display = DisplayData::new();
        compute_displayed_columns(&geometry(), 300.0, 0.0, &mut display);
        assert_eq!(display.first_displayed_scrolling_col, 1);
        assert_eq!(display.neg_horizontal_offset, 0.0);
        // 300 - 50 frozen = 250 available: columns 1 and 2 fit wholly.
        assert_eq!(display.last_totally_displayed_scrolling_col, 2);
    }

    #[test]
    fn test_displayed_columns_with_offset() {
        let mut display = DisplayData::new();
        compute_displayed_columns(&geometry(), 300.0, 130.0, &mut display);
        // 130 into the scrolling region: column 1 fully hidden, column 2
        // hidden by 30.
        assert_eq!(display.first_displayed_scrolling_col, 2);
        assert_eq!(display.neg_horizontal_offset, 30.0);
        // -30 + 100 + 100 = 170 <= 250, next (col 5) would end at 270.
        assert_eq!(display.last_totally_displayed_scrolling_col, 3);
    }

    #[test]
    fn test_hidden_columns_are_skipped() {
        let mut display = DisplayData::new();
        compute_displayed_columns(&geometry(), 1000.0, 0.0, &mut display);
        // Column 4 is hidden; the last totally displayed is column 5.
        assert_eq!(display.last_totally_displayed_scrolling_col, 5);
    }

    #[test]
    fn test_scroll_column_into_view_right() {
        let columns = geometry();
        // Column 5 sits at [300, 400) of the scrolling region; 250 of
        // width available, so the offset must become 150.
        let offset = scroll_column_into_view(&columns, 300.0, 0.0, 5);
        assert_eq!(offset, 150.0);

        let mut display = DisplayData::new();
        compute_displayed_columns(&columns, 300.0, offset, &mut display);
        assert_eq!(display.last_totally_displayed_scrolling_col, 5);
    }

    #[test]
    fn test_scroll_column_into_view_left_and_noop() {
        let columns = geometry();
        let offset = scroll_column_into_view(&columns, 300.0, 150.0, 1);
        assert_eq!(offset, 0.0);

        // Already fully visible: unchanged.
        let offset = scroll_column_into_view(&columns, 300.0, 0.0, 2);
        assert_eq!(offset, 0.0);
        // Frozen column never changes the offset.
        let offset = scroll_column_into_view(&columns, 300.0, 75.0, 0);
        assert_eq!(offset, 75.0);
    }
}
