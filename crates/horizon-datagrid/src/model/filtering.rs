//! Filtering descriptors and the grid-level filtering model.
//!
//! A [`FilteringDescriptor`] captures one column's filter: an operator from
//! the fixed catalog plus its operand values, or a custom row predicate.
//! The [`FilteringModel`] holds one descriptor per column; the filtering
//! adapter compiles the set into a single view predicate (all descriptors
//! must pass).

use std::sync::Arc;

use horizon_datagrid_core::{Signal, ThreadAffinity};
use parking_lot::RwLock;

use crate::model::column::ColumnId;
use crate::model::value::{CellValue, TextCompare};

/// Row-level predicate used by [`FilterOperator::Custom`] descriptors.
pub type FilterPredicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// The filter operator catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// Inclusive on both bounds; takes two operands.
    Between,
    /// Membership in the operand set.
    In,
    /// Evaluated via the descriptor's predicate, not an accessor.
    Custom,
}

/// One column's filter.
pub struct FilteringDescriptor<R> {
    pub column_id: ColumnId,
    pub operator: FilterOperator,
    /// One operand for simple operators, two for `Between`, any number for
    /// `In`, none for `Custom`.
    pub operands: Vec<CellValue>,
    pub predicate: Option<FilterPredicate<R>>,
    pub text_compare: TextCompare,
}

impl<R> FilteringDescriptor<R> {
    pub fn new(
        column_id: ColumnId,
        operator: FilterOperator,
        operands: Vec<CellValue>,
    ) -> Self {
        Self {
            column_id,
            operator,
            operands,
            predicate: None,
            text_compare: TextCompare::CaseSensitive,
        }
    }

    pub fn equals(column_id: ColumnId, value: impl Into<CellValue>) -> Self {
        Self::new(column_id, FilterOperator::Equals, vec![value.into()])
    }

    pub fn contains(column_id: ColumnId, value: impl Into<CellValue>) -> Self {
        Self::new(column_id, FilterOperator::Contains, vec![value.into()])
    }

    pub fn between(
        column_id: ColumnId,
        low: impl Into<CellValue>,
        high: impl Into<CellValue>,
    ) -> Self {
        Self::new(
            column_id,
            FilterOperator::Between,
            vec![low.into(), high.into()],
        )
    }

    pub fn in_set(column_id: ColumnId, values: Vec<CellValue>) -> Self {
        Self::new(column_id, FilterOperator::In, values)
    }

    /// A custom filter evaluated against the whole row item.
    pub fn custom<F>(column_id: ColumnId, predicate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        Self {
            column_id,
            operator: FilterOperator::Custom,
            operands: Vec::new(),
            predicate: Some(Arc::new(predicate)),
            text_compare: TextCompare::CaseSensitive,
        }
    }

    pub fn with_text_compare(mut self, text_compare: TextCompare) -> Self {
        self.text_compare = text_compare;
        self
    }

    /// Structural equality: same column, operator, operands, text mode, and
    /// (for `Custom`) the same predicate instance.
    pub fn same_filter(&self, other: &FilteringDescriptor<R>) -> bool {
        self.column_id == other.column_id
            && self.operator == other.operator
            && self.operands == other.operands
            && self.text_compare == other.text_compare
            && match (&self.predicate, &other.predicate) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }

    /// Evaluate this descriptor's operator against an extracted cell value.
    ///
    /// `Custom` descriptors are not evaluated here; the adapter invokes
    /// their predicate on the row item directly.
    pub fn evaluate(&self, value: &CellValue) -> bool {
        evaluate_operator(self.operator, value, &self.operands, self.text_compare)
    }
}

impl<R> Clone for FilteringDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            column_id: self.column_id.clone(),
            operator: self.operator,
            operands: self.operands.clone(),
            predicate: self.predicate.clone(),
            text_compare: self.text_compare,
        }
    }
}

impl<R> std::fmt::Debug for FilteringDescriptor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteringDescriptor")
            .field("column_id", &self.column_id)
            .field("operator", &self.operator)
            .field("operands", &self.operands)
            .field("custom", &self.predicate.is_some())
            .finish()
    }
}

fn evaluate_operator(
    operator: FilterOperator,
    value: &CellValue,
    operands: &[CellValue],
    text: TextCompare,
) -> bool {
    use std::cmp::Ordering;

    let first = operands.first();
    let ord_to = |operand: &CellValue| value.compare_with(operand, text);
    let text_op = |f: fn(&TextCompare, &str, &str) -> bool| -> bool {
        match (value.as_text(), first.and_then(CellValue::as_text)) {
            (Some(hay), Some(needle)) => f(&text, hay, needle),
            _ => false,
        }
    };

    match operator {
        FilterOperator::Equals => first.is_some_and(|op| ord_to(op) == Ordering::Equal),
        FilterOperator::NotEquals => first.is_some_and(|op| ord_to(op) != Ordering::Equal),
        FilterOperator::Contains => text_op(TextCompare::contains),
        FilterOperator::StartsWith => text_op(TextCompare::starts_with),
        FilterOperator::EndsWith => text_op(TextCompare::ends_with),
        FilterOperator::GreaterThan => first.is_some_and(|op| ord_to(op) == Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => {
            first.is_some_and(|op| ord_to(op) != Ordering::Less)
        }
        FilterOperator::LessThan => first.is_some_and(|op| ord_to(op) == Ordering::Less),
        FilterOperator::LessThanOrEqual => {
            first.is_some_and(|op| ord_to(op) != Ordering::Greater)
        }
        FilterOperator::Between => match operands {
            [low, high] => {
                value.compare_with(low, text) != Ordering::Less
                    && value.compare_with(high, text) != Ordering::Greater
            }
            _ => false,
        },
        FilterOperator::In => operands.iter().any(|op| ord_to(op) == Ordering::Equal),
        FilterOperator::Custom => true,
    }
}

/// Set of active filters, at most one per column.
pub struct FilteringModel<R> {
    affinity: ThreadAffinity,
    descriptors: RwLock<Vec<FilteringDescriptor<R>>>,
    /// Emitted after the descriptor set changed.
    pub filtering_changed: Signal<()>,
}

impl<R> Default for FilteringModel<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> FilteringModel<R> {
    pub fn new() -> Self {
        Self {
            affinity: ThreadAffinity::current(),
            descriptors: RwLock::new(Vec::new()),
            filtering_changed: Signal::new(),
        }
    }

    pub fn descriptors(&self) -> Vec<FilteringDescriptor<R>> {
        self.descriptors.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    /// Install or replace the filter for the descriptor's column.
    ///
    /// Returns `true` if the set changed (an identical descriptor is a
    /// silent no-op).
    pub fn set_or_update(&self, descriptor: FilteringDescriptor<R>) -> bool {
        self.affinity.assert_same_thread();
        {
            let mut descriptors = self.descriptors.write();
            match descriptors
                .iter()
                .position(|d| d.column_id == descriptor.column_id)
            {
                Some(i) => {
                    if descriptors[i].same_filter(&descriptor) {
                        return false;
                    }
                    descriptors[i] = descriptor;
                }
                None => descriptors.push(descriptor),
            }
        }
        tracing::debug!(
            target: crate::logging::targets::FILTERING,
            count = self.descriptors.read().len(),
            "filtering descriptors changed"
        );
        self.filtering_changed.emit(());
        true
    }

    /// Remove the filter for `column_id`. Returns `true` if one existed.
    pub fn remove(&self, column_id: &ColumnId) -> bool {
        self.affinity.assert_same_thread();
        let removed = {
            let mut descriptors = self.descriptors.write();
            let before = descriptors.len();
            descriptors.retain(|d| &d.column_id != column_id);
            descriptors.len() != before
        };
        if removed {
            self.filtering_changed.emit(());
        }
        removed
    }

    /// Drop all filters.
    pub fn clear(&self) -> bool {
        self.affinity.assert_same_thread();
        let cleared = {
            let mut descriptors = self.descriptors.write();
            if descriptors.is_empty() {
                return false;
            }
            descriptors.clear();
            true
        };
        if cleared {
            self.filtering_changed.emit(());
        }
        cleared
    }
}

impl<R> std::fmt::Debug for FilteringModel<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteringModel")
            .field("descriptors", &*self.descriptors.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str) -> ColumnId {
        ColumnId::path(path)
    }

    #[test]
    fn test_comparison_operators() {
        let d = FilteringDescriptor::<()>::new(
            id("size"),
            FilterOperator::GreaterThan,
            vec![CellValue::Int(10)],
        );
        assert!(d.evaluate(&CellValue::Int(11)));
        assert!(!d.evaluate(&CellValue::Int(10)));
        // Mixed numeric types compare numerically.
        assert!(d.evaluate(&CellValue::Float(10.5)));
    }

    #[test]
    fn test_between_is_inclusive() {
        let d = FilteringDescriptor::<()>::between(id("size"), 10i64, 20i64);
        assert!(d.evaluate(&CellValue::Int(10)));
        assert!(d.evaluate(&CellValue::Int(20)));
        assert!(!d.evaluate(&CellValue::Int(21)));
    }

    #[test]
    fn test_in_set() {
        let d = FilteringDescriptor::<()>::in_set(
            id("kind"),
            vec![CellValue::from("a"), CellValue::from("b")],
        );
        assert!(d.evaluate(&CellValue::from("b")));
        assert!(!d.evaluate(&CellValue::from("c")));
    }

    #[test]
    fn test_text_operators_respect_case_mode() {
        let d = FilteringDescriptor::<()>::contains(id("name"), "ops")
            .with_text_compare(TextCompare::CaseInsensitive);
        assert!(d.evaluate(&CellValue::from("OPS report")));

        let d = FilteringDescriptor::<()>::contains(id("name"), "ops");
        assert!(!d.evaluate(&CellValue::from("OPS report")));
    }

    #[test]
    fn test_text_operator_on_non_text_is_false() {
        let d = FilteringDescriptor::<()>::contains(id("name"), "1");
        assert!(!d.evaluate(&CellValue::Int(11)));
    }

    #[test]
    fn test_set_or_update_replaces_per_column() {
        let model = FilteringModel::<()>::new();
        model.set_or_update(FilteringDescriptor::equals(id("a"), 1i64));
        model.set_or_update(FilteringDescriptor::equals(id("b"), 2i64));
        model.set_or_update(FilteringDescriptor::equals(id("a"), 3i64));

        let descriptors = model.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].operands, vec![CellValue::Int(3)]);
    }

    #[test]
    fn test_identical_update_is_silent() {
        let model = FilteringModel::<()>::new();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let f = fired.clone();
        model
            .filtering_changed
            .connect(move |_| { f.fetch_add(1, std::sync::atomic::Ordering::SeqCst); });

        assert!(model.set_or_update(FilteringDescriptor::equals(id("a"), 1i64)));
        assert!(!model.set_or_update(FilteringDescriptor::equals(id("a"), 1i64)));
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let model = FilteringModel::<()>::new();
        model.set_or_update(FilteringDescriptor::equals(id("a"), 1i64));
        model.set_or_update(FilteringDescriptor::equals(id("b"), 2i64));

        assert!(model.remove(&id("a")));
        assert!(!model.remove(&id("a")));
        assert!(model.clear());
        assert!(model.is_empty());
        assert!(!model.clear());
    }
}
