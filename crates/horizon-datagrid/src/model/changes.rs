//! Change notifications carried by model signals.
//!
//! Every structural mutation of the flattened hierarchy or the collection
//! view is reported as a typed change record describing the affected index
//! range, so downstream consumers (slot table, selection, display) can apply
//! a minimal splice instead of rebuilding.

/// What caused a flattened-hierarchy edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenedChangeKind {
    /// Rows inserted via a children change.
    Insert,
    /// Rows removed via a children change.
    Remove,
    /// A node was expanded, revealing its visible subtree.
    Expand,
    /// A node was collapsed, hiding its visible subtree.
    Collapse,
    /// Sibling order changed; the visible set is unchanged.
    Reorder,
    /// The whole projection was rebuilt.
    Reset,
}

/// A splice edit against the flattened row projection.
///
/// At `index`, `removed` rows were taken out and `inserted` rows were put
/// in. A `Reset` carries the full old and new lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenedChange {
    pub index: usize,
    pub removed: usize,
    pub inserted: usize,
    pub kind: FlattenedChangeKind,
}

impl FlattenedChange {
    pub fn reset(old_len: usize, new_len: usize) -> Self {
        Self {
            index: 0,
            removed: old_len,
            inserted: new_len,
            kind: FlattenedChangeKind::Reset,
        }
    }
}

/// A change to the visible rows of a collection view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    Inserted { index: usize, count: usize },
    Removed { index: usize, count: usize },
    Moved { from: usize, to: usize },
    /// The row at `index` changed in place without moving.
    Updated { index: usize },
    /// The view was rebuilt; all cached indices are stale.
    Reset,
}

/// A change applied to one node's children (or to the root set).
///
/// Counts and indices are in terms of the children collection as returned
/// by the children selector *after* the mutation, except `Removed`, whose
/// index range refers to the pre-mutation collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildrenChange {
    Inserted { index: usize, count: usize },
    Removed { index: usize, count: usize },
    Moved { from: usize, to: usize },
    /// The children collection was replaced wholesale.
    Reset,
}
