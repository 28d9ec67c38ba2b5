//! Scans visible cells into search results.
//!
//! The search adapter walks the visible rows (supplied by a row provider,
//! so flat and hierarchical grids share the machinery) and the in-scope
//! columns, renders each cell to display text through its accessor, and
//! matches it against the compiled descriptor. Results land in the
//! [`SearchModel`] in row-major order; navigation stays in the model.
//!
//! Searching never filters: a non-matching row stays visible, it just is
//! not a result.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::adapter::{FastPathFeature, FastPathOptions};
use crate::model::column::Column;
use crate::model::search::{
    CompiledSearch, SearchDescriptor, SearchError, SearchModel, SearchResult, SearchScope,
};

/// Supplies the rows to scan, in display order.
pub type RowProvider<R> = Arc<dyn Fn() -> Vec<R> + Send + Sync>;

/// Runs scans for a [`SearchModel`] over grid rows and columns.
pub struct SearchAdapter<R: Clone + Send + Sync + 'static> {
    model: Arc<SearchModel>,
    columns: Arc<RwLock<Vec<Column<R>>>>,
    options: Arc<FastPathOptions>,
    rows: RwLock<Option<RowProvider<R>>>,
    /// Descriptor the current results were scanned with.
    scanned: RwLock<Option<SearchDescriptor>>,
}

impl<R: Clone + Send + Sync + 'static> SearchAdapter<R> {
    pub fn new(
        model: Arc<SearchModel>,
        columns: Arc<RwLock<Vec<Column<R>>>>,
        options: Arc<FastPathOptions>,
    ) -> Self {
        Self {
            model,
            columns,
            options,
            rows: RwLock::new(None),
            scanned: RwLock::new(None),
        }
    }

    pub fn model(&self) -> &Arc<SearchModel> {
        &self.model
    }

    pub fn set_row_provider(&self, provider: RowProvider<R>) {
        *self.rows.write() = Some(provider);
    }

    /// Install a descriptor and scan. An unchanged descriptor skips the
    /// rescan; returns the result count.
    pub fn set_or_update(&self, descriptor: SearchDescriptor) -> Result<usize, SearchError> {
        let changed = self.model.set_descriptor(descriptor);
        self.refresh(changed)
    }

    /// Rescan with the model's current descriptor.
    ///
    /// With `force` false the scan is skipped when the descriptor is the
    /// one the current results came from; structural changes to the rows
    /// must pass `force` true.
    pub fn refresh(&self, force: bool) -> Result<usize, SearchError> {
        let Some(descriptor) = self.model.descriptor() else {
            *self.scanned.write() = None;
            if self.model.result_count() > 0 {
                self.model.replace_results(Vec::new());
            }
            return Ok(0);
        };

        if !force && self.scanned.read().as_ref() == Some(&descriptor) {
            return Ok(self.model.result_count());
        }

        let compiled = CompiledSearch::compile(&descriptor)?;
        let results = self.scan(&descriptor, &compiled);
        let count = results.len();
        *self.scanned.write() = Some(descriptor);
        self.model.replace_results(results);
        tracing::debug!(
            target: crate::logging::targets::SEARCH,
            results = count,
            "search scan complete"
        );
        Ok(count)
    }

    /// Drop descriptor and results.
    pub fn clear(&self) {
        *self.scanned.write() = None;
        self.model.clear();
    }

    fn scan(&self, descriptor: &SearchDescriptor, compiled: &CompiledSearch) -> Vec<SearchResult> {
        if compiled.is_empty() {
            return Vec::new();
        }
        let Some(provider) = self.rows.read().clone() else {
            return Vec::new();
        };
        let rows = provider();

        // Resolve accessors up front, one diagnostic per unresolvable
        // column rather than one per row.
        let scan_columns: Vec<_> = {
            let columns = self.columns.read();
            columns
                .iter()
                .filter(|c| match descriptor.scope {
                    SearchScope::AllColumns => true,
                    SearchScope::VisibleColumns => c.is_visible(),
                })
                .filter_map(|c| match c.accessor() {
                    Some(accessor) => Some((c.id(), Arc::clone(accessor))),
                    None => {
                        self.options
                            .report_missing(FastPathFeature::Searching, &c.id());
                        None
                    }
                })
                .collect()
        };

        let mut results = Vec::new();
        for (row_index, row) in rows.iter().enumerate() {
            for (column_id, accessor) in &scan_columns {
                let text = accessor(row).to_display_string();
                let text = compiled.normalize(&text);
                if let Some(spans) = compiled.match_text(&text) {
                    results.push(SearchResult {
                        row: row_index,
                        column_id: column_id.clone(),
                        text: text.into_owned(),
                        spans,
                    });
                }
            }
        }
        results
    }
}

impl<R: Clone + Send + Sync + 'static> std::fmt::Debug for SearchAdapter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAdapter")
            .field("model", &self.model)
            .finish()
    }
}
