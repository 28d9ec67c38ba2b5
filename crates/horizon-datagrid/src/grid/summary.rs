//! Summary aggregates with debounced recalculation.
//!
//! Summaries aggregate over the *visible* rows, so every sort, filter, or
//! hierarchy change invalidates them. Rather than recomputing on each of a
//! burst of changes, invalidation arms a deadline; the grid pumps
//! [`process_pending`](SummaryModel::process_pending) with the current
//! instant (there is no event loop here), and the recalculation runs once
//! the deadline passes. A zero delay recalculates on the next pump.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use horizon_datagrid_core::{Signal, ThreadAffinity};
use parking_lot::RwLock;

use crate::model::column::{ColumnId, ValueAccessor};
use crate::model::value::CellValue;

/// The aggregate computed for one summary cell.
pub enum SummaryAggregate<R> {
    /// Row count; needs no accessor.
    Count,
    Sum(ValueAccessor<R>),
    Min(ValueAccessor<R>),
    Max(ValueAccessor<R>),
    /// Arbitrary fold over the visible rows.
    Custom(Arc<dyn Fn(&[R]) -> CellValue + Send + Sync>),
}

impl<R> Clone for SummaryAggregate<R> {
    fn clone(&self) -> Self {
        match self {
            SummaryAggregate::Count => SummaryAggregate::Count,
            SummaryAggregate::Sum(a) => SummaryAggregate::Sum(Arc::clone(a)),
            SummaryAggregate::Min(a) => SummaryAggregate::Min(Arc::clone(a)),
            SummaryAggregate::Max(a) => SummaryAggregate::Max(Arc::clone(a)),
            SummaryAggregate::Custom(f) => SummaryAggregate::Custom(Arc::clone(f)),
        }
    }
}

impl<R> std::fmt::Debug for SummaryAggregate<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SummaryAggregate::Count => "Count",
            SummaryAggregate::Sum(_) => "Sum",
            SummaryAggregate::Min(_) => "Min",
            SummaryAggregate::Max(_) => "Max",
            SummaryAggregate::Custom(_) => "Custom",
        };
        f.write_str(name)
    }
}

/// One summary cell: which column shows which aggregate.
pub struct SummaryDescriptor<R> {
    pub column_id: ColumnId,
    pub aggregate: SummaryAggregate<R>,
}

impl<R> Clone for SummaryDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            column_id: self.column_id.clone(),
            aggregate: self.aggregate.clone(),
        }
    }
}

/// Summary configuration, cache, and debounce state.
pub struct SummaryModel<R> {
    affinity: ThreadAffinity,
    descriptors: RwLock<Vec<SummaryDescriptor<R>>>,
    values: RwLock<HashMap<ColumnId, CellValue>>,
    valid: RwLock<bool>,
    delay: RwLock<Duration>,
    deadline: RwLock<Option<Instant>>,
    /// Emitted after a recalculation refreshed the cached values.
    pub summaries_changed: Signal<()>,
}

impl<R: Clone + 'static> Default for SummaryModel<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone + 'static> SummaryModel<R> {
    pub fn new() -> Self {
        Self {
            affinity: ThreadAffinity::current(),
            descriptors: RwLock::new(Vec::new()),
            values: RwLock::new(HashMap::new()),
            valid: RwLock::new(false),
            delay: RwLock::new(Duration::from_millis(250)),
            deadline: RwLock::new(None),
            summaries_changed: Signal::new(),
        }
    }

    pub fn set_descriptors(&self, descriptors: Vec<SummaryDescriptor<R>>) {
        self.affinity.assert_same_thread();
        *self.descriptors.write() = descriptors;
        *self.valid.write() = false;
    }

    pub fn descriptors(&self) -> Vec<SummaryDescriptor<R>> {
        self.descriptors.read().clone()
    }

    pub fn has_descriptors(&self) -> bool {
        !self.descriptors.read().is_empty()
    }

    pub fn recalc_delay(&self) -> Duration {
        *self.delay.read()
    }

    pub fn set_recalc_delay(&self, delay: Duration) {
        *self.delay.write() = delay;
    }

    /// Cached value for a column, `None` while invalidated or for columns
    /// with no summary.
    pub fn value(&self, column_id: &ColumnId) -> Option<CellValue> {
        if !*self.valid.read() {
            return None;
        }
        self.values.read().get(column_id).cloned()
    }

    pub fn is_valid(&self) -> bool {
        *self.valid.read()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.read().is_some()
    }

    /// Mark the cache stale and (re-)arm the recalculation deadline.
    /// Repeated invalidations within the delay window collapse into one
    /// recalculation.
    pub fn invalidate(&self, now: Instant) {
        self.affinity.assert_same_thread();
        if !self.has_descriptors() {
            return;
        }
        *self.valid.write() = false;
        *self.deadline.write() = Some(now + self.recalc_delay());
    }

    /// Recalculate now if the deadline has passed, with `rows` as the
    /// visible rows. Returns `true` when a recalculation ran.
    pub fn process_pending(&self, now: Instant, rows: &[R]) -> bool {
        self.affinity.assert_same_thread();
        let due = {
            let deadline = self.deadline.read();
            matches!(*deadline, Some(d) if now >= d)
        };
        if !due {
            return false;
        }
        *self.deadline.write() = None;
        self.recalculate(rows);
        true
    }

    /// Recalculate immediately, bypassing the debounce.
    pub fn recalculate(&self, rows: &[R]) {
        self.affinity.assert_same_thread();
        let descriptors = self.descriptors.read().clone();
        let mut values = HashMap::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            values.insert(
                descriptor.column_id.clone(),
                evaluate_aggregate(&descriptor.aggregate, rows),
            );
        }
        *self.values.write() = values;
        *self.valid.write() = true;
        *self.deadline.write() = None;
        tracing::debug!(
            target: crate::logging::targets::SUMMARIES,
            rows = rows.len(),
            aggregates = descriptors.len(),
            "summaries recalculated"
        );
        self.summaries_changed.emit(());
    }
}

impl<R: Clone + 'static> std::fmt::Debug for SummaryModel<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryModel")
            .field("descriptors", &self.descriptors.read().len())
            .field("valid", &self.is_valid())
            .field("pending", &self.is_pending())
            .finish()
    }
}

fn evaluate_aggregate<R>(aggregate: &SummaryAggregate<R>, rows: &[R]) -> CellValue {
    match aggregate {
        SummaryAggregate::Count => CellValue::Int(rows.len() as i64),
        SummaryAggregate::Sum(accessor) => {
            let mut int_sum = 0i64;
            let mut float_sum = 0.0f64;
            let mut any_float = false;
            let mut any = false;
            for row in rows {
                match accessor(row) {
                    CellValue::Int(n) => {
                        int_sum += n;
                        any = true;
                    }
                    CellValue::Float(f) => {
                        float_sum += f;
                        any_float = true;
                        any = true;
                    }
                    _ => {}
                }
            }
            if !any {
                CellValue::Null
            } else if any_float {
                CellValue::Float(float_sum + int_sum as f64)
            } else {
                CellValue::Int(int_sum)
            }
        }
        SummaryAggregate::Min(accessor) => fold_extreme(rows, accessor, std::cmp::Ordering::Less),
        SummaryAggregate::Max(accessor) => {
            fold_extreme(rows, accessor, std::cmp::Ordering::Greater)
        }
        SummaryAggregate::Custom(f) => f(rows),
    }
}

fn fold_extreme<R>(
    rows: &[R],
    accessor: &ValueAccessor<R>,
    keep: std::cmp::Ordering,
) -> CellValue {
    let mut best: Option<CellValue> = None;
    for row in rows {
        let value = accessor(row);
        if value.is_null() {
            continue;
        }
        best = match best {
            None => Some(value),
            Some(current) => {
                if value.compare(&current) == keep {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.unwrap_or(CellValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Row {
        size: i64,
    }

    fn rows(sizes: &[i64]) -> Vec<Row> {
        sizes.iter().map(|&size| Row { size }).collect()
    }

    fn size_accessor() -> ValueAccessor<Row> {
        Arc::new(|r: &Row| CellValue::Int(r.size))
    }

    fn model_with_sum() -> SummaryModel<Row> {
        let model = SummaryModel::new();
        model.set_descriptors(vec![
            SummaryDescriptor {
                column_id: ColumnId::path("size"),
                aggregate: SummaryAggregate::Sum(size_accessor()),
            },
            SummaryDescriptor {
                column_id: ColumnId::path("count"),
                aggregate: SummaryAggregate::Count,
            },
        ]);
        model
    }

    #[test]
    fn test_aggregates() {
        let data = rows(&[3, 1, 2]);
        let acc = size_accessor();
        assert_eq!(
            evaluate_aggregate(&SummaryAggregate::Sum(acc.clone()), &data),
            CellValue::Int(6)
        );
        assert_eq!(
            evaluate_aggregate(&SummaryAggregate::Min(acc.clone()), &data),
            CellValue::Int(1)
        );
        assert_eq!(
            evaluate_aggregate(&SummaryAggregate::Max(acc), &data),
            CellValue::Int(3)
        );
        assert_eq!(
            evaluate_aggregate(&SummaryAggregate::<Row>::Count, &data),
            CellValue::Int(3)
        );
    }

    #[test]
    fn test_empty_rows_yield_null_extremes() {
        let data: Vec<Row> = Vec::new();
        assert_eq!(
            evaluate_aggregate(&SummaryAggregate::Min(size_accessor()), &data),
            CellValue::Null
        );
        assert_eq!(
            evaluate_aggregate(&SummaryAggregate::<Row>::Count, &data),
            CellValue::Int(0)
        );
    }

    #[test]
    fn test_invalidate_hides_values_until_recalc() {
        let model = model_with_sum();
        model.recalculate(&rows(&[1, 2]));
        assert_eq!(model.value(&ColumnId::path("size")), Some(CellValue::Int(3)));

        let now = Instant::now();
        model.invalidate(now);
        assert_eq!(model.value(&ColumnId::path("size")), None);
        assert!(model.is_pending());
    }

    #[test]
    fn test_debounce_coalesces_invalidations() {
        let model = model_with_sum();
        model.set_recalc_delay(Duration::from_millis(100));
        let start = Instant::now();

        model.invalidate(start);
        model.invalidate(start + Duration::from_millis(50));

        // First deadline has passed but the second invalidation pushed it.
        assert!(!model.process_pending(start + Duration::from_millis(120), &rows(&[1])));
        assert!(model.process_pending(start + Duration::from_millis(151), &rows(&[1, 2, 3])));
        assert_eq!(model.value(&ColumnId::path("size")), Some(CellValue::Int(6)));
        // Nothing pending afterwards.
        assert!(!model.process_pending(start + Duration::from_millis(500), &rows(&[])));
    }

    #[test]
    fn test_zero_delay_recalculates_on_next_pump() {
        let model = model_with_sum();
        model.set_recalc_delay(Duration::ZERO);
        let now = Instant::now();
        model.invalidate(now);
        assert!(model.process_pending(now, &rows(&[5])));
        assert_eq!(model.value(&ColumnId::path("size")), Some(CellValue::Int(5)));
    }

    #[test]
    fn test_changed_signal_fires_on_recalc() {
        let model = model_with_sum();
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let f = fired.clone();
        model
            .summaries_changed
            .connect(move |_| { f.fetch_add(1, std::sync::atomic::Ordering::SeqCst); });

        model.recalculate(&rows(&[1]));
        model.invalidate(Instant::now());
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
