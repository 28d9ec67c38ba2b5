//! View-level sort descriptions.
//!
//! A [`ViewSortDescription`] is the collection view's notion of one sort
//! layer: a key (property path or comparer) and a direction, with no column
//! identity attached. The sorting adapter translates between these and the
//! column-addressed [`SortingDescriptor`](crate::model::SortingDescriptor)s
//! of the sorting model.

use std::sync::Arc;

use crate::model::column::{SortComparer, SortDirection};
use crate::model::value::TextCompare;

/// The sort key of a view sort description.
pub enum ViewSortKey<R> {
    Path(String),
    Comparer(SortComparer<R>),
}

impl<R> ViewSortKey<R> {
    pub fn same_key(&self, other: &ViewSortKey<R>) -> bool {
        match (self, other) {
            (ViewSortKey::Path(a), ViewSortKey::Path(b)) => a == b,
            (ViewSortKey::Comparer(a), ViewSortKey::Comparer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<R> Clone for ViewSortKey<R> {
    fn clone(&self) -> Self {
        match self {
            ViewSortKey::Path(p) => ViewSortKey::Path(p.clone()),
            ViewSortKey::Comparer(c) => ViewSortKey::Comparer(Arc::clone(c)),
        }
    }
}

impl<R> std::fmt::Debug for ViewSortKey<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewSortKey::Path(p) => f.debug_tuple("Path").field(p).finish(),
            ViewSortKey::Comparer(_) => f.write_str("Comparer(..)"),
        }
    }
}

/// One sort layer applied by the collection view.
pub struct ViewSortDescription<R> {
    pub key: ViewSortKey<R>,
    pub direction: SortDirection,
    pub text_compare: TextCompare,
}

impl<R> ViewSortDescription<R> {
    pub fn by_path(path: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            key: ViewSortKey::Path(path.into()),
            direction,
            text_compare: TextCompare::CaseSensitive,
        }
    }

    pub fn by_comparer(comparer: SortComparer<R>, direction: SortDirection) -> Self {
        Self {
            key: ViewSortKey::Comparer(comparer),
            direction,
            text_compare: TextCompare::CaseSensitive,
        }
    }

    pub fn with_text_compare(mut self, text_compare: TextCompare) -> Self {
        self.text_compare = text_compare;
        self
    }

    pub fn same_sort(&self, other: &ViewSortDescription<R>) -> bool {
        self.direction == other.direction
            && self.text_compare == other.text_compare
            && self.key.same_key(&other.key)
    }
}

impl<R> Clone for ViewSortDescription<R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            direction: self.direction,
            text_compare: self.text_compare,
        }
    }
}

impl<R> std::fmt::Debug for ViewSortDescription<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewSortDescription")
            .field("key", &self.key)
            .field("direction", &self.direction)
            .finish()
    }
}

/// Element-wise equality of two sort description lists, the no-op test the
/// sorting adapter uses before touching the view.
pub fn sorts_equal<R>(a: &[ViewSortDescription<R>], b: &[ViewSortDescription<R>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_sort(y))
}
