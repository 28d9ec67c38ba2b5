//! Column definitions.
//!
//! A [`Column`] describes one vertical slice of the grid: how to read a
//! cell value out of a row item, how to sort by it, and the geometry the
//! display layer needs (width, frozen, visible). Columns are identified by
//! a [`ColumnId`], which is stable across column reordering and survives in
//! sorting/filtering descriptors.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::model::value::CellValue;

/// Extracts a cell value from a row item.
pub type ValueAccessor<R> = Arc<dyn Fn(&R) -> CellValue + Send + Sync>;

/// Compares two row items directly, bypassing cell values.
pub type SortComparer<R> = Arc<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

static NEXT_COLUMN_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque per-process unique handle for a column instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnHandle(u64);

impl ColumnHandle {
    fn next() -> Self {
        ColumnHandle(NEXT_COLUMN_HANDLE.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Identity used by descriptors to refer to a column.
///
/// `Handle` identifies a concrete [`Column`] instance added to a grid.
/// `Path` identifies a column by its property path, which lets descriptors
/// be built before the column objects exist (or outlive them).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnId {
    Handle(ColumnHandle),
    Path(Arc<str>),
}

impl ColumnId {
    /// Build a path-based identity.
    pub fn path(path: impl AsRef<str>) -> Self {
        ColumnId::Path(Arc::from(path.as_ref()))
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnId::Handle(h) => write!(f, "#{}", h.0),
            ColumnId::Path(p) => f.write_str(p),
        }
    }
}

/// Sort direction for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    /// Apply this direction to an ascending comparison result.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// A grid column.
///
/// Built fluently:
///
/// ```
/// use horizon_datagrid::model::column::Column;
/// use horizon_datagrid::model::value::CellValue;
///
/// struct Row { name: String, size: i64 }
///
/// let name = Column::<Row>::new("Name")
///     .with_path("name")
///     .with_accessor(|r: &Row| CellValue::from(r.name.as_str()));
/// let size = Column::<Row>::new("Size")
///     .with_path("size")
///     .with_accessor(|r: &Row| CellValue::Int(r.size))
///     .with_width(80.0);
/// ```
#[derive(Clone)]
pub struct Column<R> {
    handle: ColumnHandle,
    header: String,
    property_path: Option<String>,
    accessor: Option<ValueAccessor<R>>,
    sort_comparer: Option<SortComparer<R>>,
    width: f64,
    frozen: bool,
    visible: bool,
    can_user_sort: bool,
}

impl<R> Column<R> {
    /// Create a column with the given header text.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            handle: ColumnHandle::next(),
            header: header.into(),
            property_path: None,
            accessor: None,
            sort_comparer: None,
            width: 100.0,
            frozen: false,
            visible: true,
            can_user_sort: true,
        }
    }

    /// Set the property path this column binds to.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.property_path = Some(path.into());
        self
    }

    /// Set the accessor that reads this column's cell value from a row.
    pub fn with_accessor<F>(mut self, accessor: F) -> Self
    where
        F: Fn(&R) -> CellValue + Send + Sync + 'static,
    {
        self.accessor = Some(Arc::new(accessor));
        self
    }

    /// Set a custom comparer used instead of cell-value comparison when
    /// sorting by this column.
    pub fn with_sort_comparer<F>(mut self, comparer: F) -> Self
    where
        F: Fn(&R, &R) -> Ordering + Send + Sync + 'static,
    {
        self.sort_comparer = Some(Arc::new(comparer));
        self
    }

    /// Set the column width in device-independent pixels.
    pub fn with_width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    /// Freeze the column so it does not scroll horizontally.
    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    /// Hide the column.
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Disallow user-initiated sorting on this column.
    pub fn not_sortable(mut self) -> Self {
        self.can_user_sort = false;
        self
    }

    /// This column's stable identity.
    pub fn id(&self) -> ColumnId {
        ColumnId::Handle(self.handle)
    }

    /// The instance handle.
    pub fn handle(&self) -> ColumnHandle {
        self.handle
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn property_path(&self) -> Option<&str> {
        self.property_path.as_deref()
    }

    pub fn accessor(&self) -> Option<&ValueAccessor<R>> {
        self.accessor.as_ref()
    }

    pub fn sort_comparer(&self) -> Option<&SortComparer<R>> {
        self.sort_comparer.as_ref()
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn can_user_sort(&self) -> bool {
        self.can_user_sort
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Whether `id` refers to this column, by handle or by path.
    pub fn matches_id(&self, id: &ColumnId) -> bool {
        match id {
            ColumnId::Handle(h) => *h == self.handle,
            ColumnId::Path(p) => self.property_path.as_deref() == Some(p.as_ref()),
        }
    }

    /// Read this column's cell value from a row, `Null` when the column has
    /// no accessor.
    pub fn value_of(&self, row: &R) -> CellValue {
        match &self.accessor {
            Some(accessor) => accessor(row),
            None => CellValue::Null,
        }
    }
}

impl<R> fmt::Debug for Column<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("handle", &self.handle)
            .field("header", &self.header)
            .field("property_path", &self.property_path)
            .field("width", &self.width)
            .field("frozen", &self.frozen)
            .field("visible", &self.visible)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        name: &'static str,
    }

    #[test]
    fn test_handles_are_unique() {
        let a = Column::<Row>::new("A");
        let b = Column::<Row>::new("B");
        assert_ne!(a.handle(), b.handle());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_matches_id_by_path() {
        let col = Column::<Row>::new("Name").with_path("name");
        assert!(col.matches_id(&ColumnId::path("name")));
        assert!(!col.matches_id(&ColumnId::path("size")));
        assert!(col.matches_id(&col.id()));
    }

    #[test]
    fn test_value_of_without_accessor_is_null() {
        let col = Column::<Row>::new("Name");
        assert!(col.value_of(&Row { name: "x" }).is_null());

        let col = col.with_accessor(|r: &Row| CellValue::from(r.name));
        assert_eq!(col.value_of(&Row { name: "x" }), CellValue::from("x"));
    }

    #[test]
    fn test_direction_apply() {
        assert_eq!(
            SortDirection::Descending.apply(Ordering::Less),
            Ordering::Greater
        );
        assert_eq!(SortDirection::Ascending.reversed(), SortDirection::Descending);
    }
}
