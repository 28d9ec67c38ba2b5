//! Cell-level validation state.
//!
//! Validation results are keyed by row identity and column, like
//! selection, so they survive sorting and filtering. Only `Error`
//! severity blocks an edit commit; `Info` and `Warning` annotate the
//! cell without holding the edit open.

use std::collections::HashMap;

use horizon_datagrid_core::{Signal, ThreadAffinity};
use parking_lot::RwLock;

use crate::model::column::ColumnId;

/// Severity of one validation finding, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ValidationSeverity {
    #[default]
    None,
    Info,
    Warning,
    Error,
}

/// One validation finding for a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub severity: ValidationSeverity,
    pub message: String,
}

impl ValidationResult {
    /// An error-severity finding.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Error,
            message: message.into(),
        }
    }

    pub fn with_severity(mut self, severity: ValidationSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Payload of [`CellValidationState::validation_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationChange {
    pub row_key: u64,
    pub column_id: ColumnId,
}

/// Findings for every validated cell, keyed by row identity and column.
pub struct CellValidationState {
    affinity: ThreadAffinity,
    results: RwLock<HashMap<(u64, ColumnId), Vec<ValidationResult>>>,
    /// Emitted when one cell's findings change.
    pub validation_changed: Signal<ValidationChange>,
}

impl Default for CellValidationState {
    fn default() -> Self {
        Self::new()
    }
}

impl CellValidationState {
    pub fn new() -> Self {
        Self {
            affinity: ThreadAffinity::current(),
            results: RwLock::new(HashMap::new()),
            validation_changed: Signal::new(),
        }
    }

    /// Replace one cell's findings. An empty list clears the cell.
    pub fn set_results(&self, row_key: u64, column_id: ColumnId, results: Vec<ValidationResult>) {
        self.affinity.assert_same_thread();
        let changed = {
            let mut map = self.results.write();
            if results.is_empty() {
                map.remove(&(row_key, column_id.clone())).is_some()
            } else {
                map.insert((row_key, column_id.clone()), results);
                true
            }
        };
        if changed {
            self.validation_changed
                .emit(ValidationChange { row_key, column_id });
        }
    }

    pub fn results_for(&self, row_key: u64, column_id: &ColumnId) -> Vec<ValidationResult> {
        self.results
            .read()
            .get(&(row_key, column_id.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Strongest severity among a cell's findings.
    pub fn severity_for(&self, row_key: u64, column_id: &ColumnId) -> ValidationSeverity {
        self.results
            .read()
            .get(&(row_key, column_id.clone()))
            .map(|results| {
                results
                    .iter()
                    .map(|r| r.severity)
                    .max()
                    .unwrap_or(ValidationSeverity::None)
            })
            .unwrap_or(ValidationSeverity::None)
    }

    /// Strongest severity across a whole row.
    pub fn row_severity(&self, row_key: u64) -> ValidationSeverity {
        self.results
            .read()
            .iter()
            .filter(|((key, _), _)| *key == row_key)
            .flat_map(|(_, results)| results.iter().map(|r| r.severity))
            .max()
            .unwrap_or(ValidationSeverity::None)
    }

    /// Whether committing an edit to this cell must be refused. Only
    /// `Error` findings block; warnings and infos commit.
    pub fn blocks_commit(&self, row_key: u64, column_id: &ColumnId) -> bool {
        self.severity_for(row_key, column_id) == ValidationSeverity::Error
    }

    pub fn has_errors(&self) -> bool {
        self.results
            .read()
            .values()
            .flatten()
            .any(|r| r.severity == ValidationSeverity::Error)
    }

    /// Drop all findings for one row, for when the row leaves the data.
    pub fn clear_row(&self, row_key: u64) {
        self.affinity.assert_same_thread();
        let cleared: Vec<ColumnId> = {
            let mut map = self.results.write();
            let keys: Vec<(u64, ColumnId)> = map
                .keys()
                .filter(|(key, _)| *key == row_key)
                .cloned()
                .collect();
            for key in &keys {
                map.remove(key);
            }
            keys.into_iter().map(|(_, column)| column).collect()
        };
        for column_id in cleared {
            self.validation_changed
                .emit(ValidationChange { row_key, column_id });
        }
    }

    pub fn clear(&self) {
        self.affinity.assert_same_thread();
        self.results.write().clear();
    }
}

impl std::fmt::Debug for CellValidationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellValidationState")
            .field("cells", &self.results.read().len())
            .finish()
    }
}
