//! Search descriptors, match scanning, and the search model.
//!
//! Searching differs from filtering: it never removes rows. The
//! [`SearchModel`] holds the active [`SearchDescriptor`], the flat list of
//! [`SearchResult`]s produced by the search adapter's scan, and a cursor
//! over that list for next/previous navigation with optional wraparound.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use horizon_datagrid_core::{Signal, ThreadAffinity};
use parking_lot::RwLock;
use unicode_segmentation::UnicodeSegmentation;

use crate::model::column::ColumnId;
use crate::model::value::TextCompare;

/// How a search term is matched against cell text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMatchMode {
    #[default]
    Contains,
    StartsWith,
    /// The whole cell text must equal the term.
    Exact,
    /// The term is a regular expression.
    Regex,
}

/// How multiple whitespace-separated terms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermCombineMode {
    /// A cell matches when any term matches.
    #[default]
    AnyTerm,
    /// A cell matches only when every term matches.
    AllTerms,
}

/// Which columns the scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    VisibleColumns,
    AllColumns,
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDescriptor {
    pub term: String,
    pub match_mode: SearchMatchMode,
    pub combine_mode: TermCombineMode,
    pub scope: SearchScope,
    pub case_sensitive: bool,
    /// Matches must align with word boundaries.
    pub whole_word: bool,
    /// Fold accented latin letters and strip combining marks from cell
    /// text (and literal terms) before matching. Regex patterns are
    /// matched against the folded text as written.
    pub diacritic_insensitive: bool,
    /// Collapse whitespace runs in cell text before matching.
    pub normalize_whitespace: bool,
}

impl SearchDescriptor {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            match_mode: SearchMatchMode::default(),
            combine_mode: TermCombineMode::default(),
            scope: SearchScope::default(),
            case_sensitive: false,
            whole_word: false,
            diacritic_insensitive: false,
            normalize_whitespace: false,
        }
    }

    pub fn with_match_mode(mut self, mode: SearchMatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn with_combine_mode(mut self, mode: TermCombineMode) -> Self {
        self.combine_mode = mode;
        self
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn whole_word(mut self) -> Self {
        self.whole_word = true;
        self
    }

    pub fn diacritic_insensitive(mut self) -> Self {
        self.diacritic_insensitive = true;
        self
    }

    pub fn normalize_whitespace(mut self) -> Self {
        self.normalize_whitespace = true;
        self
    }
}

/// A byte-addressed span within the matched cell text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub len: usize,
}

/// One matching cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Visible row index at scan time.
    pub row: usize,
    pub column_id: ColumnId,
    /// The cell text that was scanned (after whitespace normalization when
    /// requested); spans index into this string.
    pub text: String,
    pub spans: Vec<MatchSpan>,
}

/// Errors raised while compiling a search descriptor.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// A descriptor compiled for repeated matching during a scan.
pub struct CompiledSearch {
    terms: Vec<CompiledTerm>,
    combine_mode: TermCombineMode,
    whole_word: bool,
    diacritic_insensitive: bool,
    normalize_whitespace: bool,
}

enum CompiledTerm {
    Literal {
        needle: String,
        mode: SearchMatchMode,
        case: TextCompare,
    },
    Pattern(regex::Regex),
}

impl CompiledSearch {
    /// Compile `descriptor`. Regex terms are validated here, so a bad
    /// pattern fails once rather than per cell.
    pub fn compile(descriptor: &SearchDescriptor) -> Result<Self, SearchError> {
        let case = if descriptor.case_sensitive {
            TextCompare::CaseSensitive
        } else {
            TextCompare::CaseInsensitive
        };
        let mut terms = Vec::new();
        for raw in descriptor.term.split_whitespace() {
            let term = match descriptor.match_mode {
                SearchMatchMode::Regex => CompiledTerm::Pattern(
                    regex::RegexBuilder::new(raw)
                        .case_insensitive(!descriptor.case_sensitive)
                        .build()?,
                ),
                mode => {
                    let needle = if descriptor.diacritic_insensitive {
                        fold_diacritics(raw).unwrap_or_else(|| raw.to_string())
                    } else {
                        raw.to_string()
                    };
                    CompiledTerm::Literal { needle, mode, case }
                }
            };
            terms.push(term);
        }
        Ok(Self {
            terms,
            combine_mode: descriptor.combine_mode,
            whole_word: descriptor.whole_word,
            diacritic_insensitive: descriptor.diacritic_insensitive,
            normalize_whitespace: descriptor.normalize_whitespace,
        })
    }

    /// Whether the descriptor has any terms at all.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Normalize cell text per the descriptor, returning it unchanged when
    /// no normalization is requested.
    pub fn normalize<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        let mut out = std::borrow::Cow::Borrowed(text);
        if self.normalize_whitespace {
            let collapsed: String =
                out.split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed != *out {
                out = std::borrow::Cow::Owned(collapsed);
            }
        }
        if self.diacritic_insensitive {
            if let Some(folded) = fold_diacritics(&out) {
                out = std::borrow::Cow::Owned(folded);
            }
        }
        out
    }

    /// Match against (already-normalized) cell text, returning the highlight
    /// spans, or `None` when the cell does not match under the combine mode.
    pub fn match_text(&self, text: &str) -> Option<Vec<MatchSpan>> {
        if self.terms.is_empty() {
            return None;
        }
        let mut spans = Vec::new();
        let mut matched_terms = 0usize;
        for term in &self.terms {
            let mut term_spans = term.find_all(text);
            if self.whole_word {
                term_spans.retain(|s| is_word_aligned(text, s));
            }
            if !term_spans.is_empty() {
                matched_terms += 1;
                spans.extend(term_spans);
            }
        }
        let matches = match self.combine_mode {
            TermCombineMode::AnyTerm => matched_terms > 0,
            TermCombineMode::AllTerms => matched_terms == self.terms.len(),
        };
        if !matches {
            return None;
        }
        spans.sort_by_key(|s| (s.start, s.len));
        spans.dedup();
        Some(spans)
    }
}

impl CompiledTerm {
    fn find_all(&self, text: &str) -> Vec<MatchSpan> {
        match self {
            CompiledTerm::Pattern(re) => re
                .find_iter(text)
                .map(|m| MatchSpan {
                    start: m.start(),
                    len: m.len(),
                })
                .collect(),
            CompiledTerm::Literal { needle, mode, case } => match mode {
                SearchMatchMode::Exact => {
                    if case.eq(text, needle) {
                        vec![MatchSpan {
                            start: 0,
                            len: text.len(),
                        }]
                    } else {
                        Vec::new()
                    }
                }
                SearchMatchMode::StartsWith => match prefix_len(text, needle, *case) {
                    Some(len) => vec![MatchSpan { start: 0, len }],
                    None => Vec::new(),
                },
                _ => find_occurrences(text, needle, *case),
            },
        }
    }
}

/// Byte length of `needle`'s occurrence at the start of `hay`, if it is
/// there. Case-insensitive comparison walks both strings through lowercase
/// expansion so the returned length stays a valid byte offset into `hay`.
fn prefix_len(hay: &str, needle: &str, case: TextCompare) -> Option<usize> {
    if case == TextCompare::CaseSensitive {
        return hay.starts_with(needle).then_some(needle.len());
    }
    let mut needle_chars = needle.chars().flat_map(char::to_lowercase).peekable();
    let mut consumed = 0usize;
    for c in hay.chars() {
        if needle_chars.peek().is_none() {
            break;
        }
        for lc in c.to_lowercase() {
            match needle_chars.next() {
                Some(nc) if nc == lc => {}
                Some(_) => return None,
                // Needle ended mid-expansion of a haystack char.
                None => return None,
            }
        }
        consumed += c.len_utf8();
    }
    needle_chars.peek().is_none().then_some(consumed)
}

fn find_occurrences(hay: &str, needle: &str, case: TextCompare) -> Vec<MatchSpan> {
    if needle.is_empty() {
        return Vec::new();
    }
    if case == TextCompare::CaseSensitive {
        return hay
            .match_indices(needle)
            .map(|(start, m)| MatchSpan {
                start,
                len: m.len(),
            })
            .collect();
    }
    let mut spans = Vec::new();
    let mut at = 0usize;
    while at < hay.len() {
        if let Some(len) = prefix_len(&hay[at..], needle, case) {
            spans.push(MatchSpan { start: at, len });
            at += len.max(1);
        } else {
            at += hay[at..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
        }
    }
    spans
}

/// Replace accented latin letters with their base letter and drop
/// combining marks. Returns `None` when nothing changed. The fold covers
/// latin-1 and the common latin-extended-A letters; scripts outside it
/// pass through untouched.
fn fold_diacritics(text: &str) -> Option<String> {
    let mut changed = false;
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if ('\u{0300}'..='\u{036f}').contains(&c) {
            changed = true;
            continue;
        }
        match fold_char(c) {
            Some(base) => {
                changed = true;
                out.push(base);
            }
            None => out.push(c),
        }
    }
    changed.then_some(out)
}

fn fold_char(c: char) -> Option<char> {
    Some(match c {
        'à'..='å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'è'..='ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ì'..='ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò'..='ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ù'..='ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ý' | 'ÿ' => 'y',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ź' | 'ż' | 'ž' => 'z',
        'À'..='Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => 'C',
        'È'..='Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => 'E',
        'Ì'..='Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => 'I',
        'Ñ' | 'Ń' | 'Ņ' | 'Ň' => 'N',
        'Ò'..='Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' => 'O',
        'Ù'..='Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => 'U',
        'Ý' => 'Y',
        'Ś' | 'Ŝ' | 'Ş' | 'Š' => 'S',
        'Ź' | 'Ż' | 'Ž' => 'Z',
        _ => return None,
    })
}

/// Whether the span's edges coincide with Unicode word boundaries.
fn is_word_aligned(text: &str, span: &MatchSpan) -> bool {
    let end = span.start + span.len;
    let mut start_ok = span.start == 0;
    let mut end_ok = end == text.len();
    for (i, word) in text.split_word_bound_indices() {
        if i == span.start {
            start_ok = true;
        }
        if i + word.len() == end {
            end_ok = true;
        }
    }
    start_ok && end_ok
}

/// The search state: active descriptor, results, and navigation cursor.
///
/// The model never scans by itself; the search adapter runs the scan and
/// installs results via [`replace_results`](Self::replace_results).
pub struct SearchModel {
    affinity: ThreadAffinity,
    descriptor: RwLock<Option<SearchDescriptor>>,
    results: RwLock<Vec<SearchResult>>,
    current: RwLock<Option<usize>>,
    wrap_navigation: AtomicBool,
    update_selection_on_navigate: AtomicBool,
    /// Emitted with the new result count after a scan.
    pub results_changed: Signal<usize>,
    /// Emitted with the new cursor position, `-1` when cleared.
    pub current_changed: Signal<isize>,
}

impl Default for SearchModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchModel {
    pub fn new() -> Self {
        Self {
            affinity: ThreadAffinity::current(),
            descriptor: RwLock::new(None),
            results: RwLock::new(Vec::new()),
            current: RwLock::new(None),
            wrap_navigation: AtomicBool::new(true),
            update_selection_on_navigate: AtomicBool::new(false),
            results_changed: Signal::new(),
            current_changed: Signal::new(),
        }
    }

    pub fn descriptor(&self) -> Option<SearchDescriptor> {
        self.descriptor.read().clone()
    }

    /// Store the active descriptor. Returns `true` when it differs from the
    /// previous one.
    pub fn set_descriptor(&self, descriptor: SearchDescriptor) -> bool {
        self.affinity.assert_same_thread();
        let mut slot = self.descriptor.write();
        if slot.as_ref() == Some(&descriptor) {
            return false;
        }
        *slot = Some(descriptor);
        true
    }

    pub fn results(&self) -> Vec<SearchResult> {
        self.results.read().clone()
    }

    pub fn result_count(&self) -> usize {
        self.results.read().len()
    }

    /// Replace the result list after a scan. Resets the cursor.
    pub fn replace_results(&self, results: Vec<SearchResult>) {
        self.affinity.assert_same_thread();
        let count = results.len();
        *self.results.write() = results;
        let had_cursor = self.current.write().take().is_some();
        tracing::debug!(
            target: crate::logging::targets::SEARCH,
            count,
            "search results replaced"
        );
        self.results_changed.emit(count);
        if had_cursor {
            self.current_changed.emit(-1);
        }
    }

    /// Cursor position, `-1` when no result is current.
    pub fn current_index(&self) -> isize {
        self.current.read().map_or(-1, |i| i as isize)
    }

    pub fn current_result(&self) -> Option<SearchResult> {
        let current = *self.current.read();
        current.and_then(|i| self.results.read().get(i).cloned())
    }

    pub fn wrap_navigation(&self) -> bool {
        self.wrap_navigation.load(AtomicOrdering::SeqCst)
    }

    pub fn set_wrap_navigation(&self, wrap: bool) {
        self.wrap_navigation.store(wrap, AtomicOrdering::SeqCst);
    }

    pub fn update_selection_on_navigate(&self) -> bool {
        self.update_selection_on_navigate.load(AtomicOrdering::SeqCst)
    }

    pub fn set_update_selection_on_navigate(&self, update: bool) {
        self.update_selection_on_navigate
            .store(update, AtomicOrdering::SeqCst);
    }

    /// Advance the cursor. From the cleared position this lands on the
    /// first result. At the last result it wraps to the first when
    /// wraparound is on, otherwise stays put and returns `None`.
    pub fn move_next(&self) -> Option<usize> {
        self.affinity.assert_same_thread();
        let len = self.results.read().len();
        if len == 0 {
            return None;
        }
        let next = match *self.current.read() {
            None => 0,
            Some(i) if i + 1 < len => i + 1,
            Some(_) if self.wrap_navigation() => 0,
            Some(_) => return None,
        };
        self.set_current(next);
        Some(next)
    }

    /// Step the cursor backwards, with the symmetric wraparound rule.
    pub fn move_previous(&self) -> Option<usize> {
        self.affinity.assert_same_thread();
        let len = self.results.read().len();
        if len == 0 {
            return None;
        }
        let prev = match *self.current.read() {
            None => len - 1,
            Some(i) if i > 0 => i - 1,
            Some(_) if self.wrap_navigation() => len - 1,
            Some(_) => return None,
        };
        self.set_current(prev);
        Some(prev)
    }

    fn set_current(&self, index: usize) {
        let changed = {
            let mut current = self.current.write();
            let changed = *current != Some(index);
            *current = Some(index);
            changed
        };
        if changed {
            self.current_changed.emit(index as isize);
        }
    }

    /// Drop the descriptor, results, and cursor.
    pub fn clear(&self) {
        self.affinity.assert_same_thread();
        *self.descriptor.write() = None;
        let had_results = !self.results.read().is_empty();
        let had_cursor = self.current.write().take().is_some();
        self.results.write().clear();
        if had_results {
            self.results_changed.emit(0);
        }
        if had_cursor {
            self.current_changed.emit(-1);
        }
    }
}

impl std::fmt::Debug for SearchModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchModel")
            .field("descriptor", &*self.descriptor.read())
            .field("result_count", &self.result_count())
            .field("current_index", &self.current_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(d: SearchDescriptor) -> CompiledSearch {
        CompiledSearch::compile(&d).unwrap()
    }

    fn result(row: usize) -> SearchResult {
        SearchResult {
            row,
            column_id: ColumnId::path("name"),
            text: String::new(),
            spans: Vec::new(),
        }
    }

    #[test]
    fn test_contains_case_insensitive_spans() {
        let search = compile(SearchDescriptor::new("fox"));
        let spans = search.match_text("The FOX and the fox").unwrap();
        assert_eq!(
            spans,
            vec![MatchSpan { start: 4, len: 3 }, MatchSpan { start: 16, len: 3 }]
        );
    }

    #[test]
    fn test_starts_with_and_exact() {
        let starts = compile(
            SearchDescriptor::new("the").with_match_mode(SearchMatchMode::StartsWith),
        );
        assert!(starts.match_text("The fox").is_some());
        assert!(starts.match_text("A fox").is_none());

        let exact =
            compile(SearchDescriptor::new("fox").with_match_mode(SearchMatchMode::Exact));
        assert!(exact.match_text("Fox").is_some());
        assert!(exact.match_text("Foxes").is_none());
    }

    #[test]
    fn test_regex_mode() {
        let search = compile(
            SearchDescriptor::new(r"f.x").with_match_mode(SearchMatchMode::Regex),
        );
        let spans = search.match_text("fix and FAX").unwrap();
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_bad_regex_is_an_error() {
        let d = SearchDescriptor::new(r"f(").with_match_mode(SearchMatchMode::Regex);
        assert!(matches!(
            CompiledSearch::compile(&d),
            Err(SearchError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_all_terms_combine() {
        let any = compile(SearchDescriptor::new("red blue"));
        assert!(any.match_text("red car").is_some());

        let all = compile(
            SearchDescriptor::new("red blue").with_combine_mode(TermCombineMode::AllTerms),
        );
        assert!(all.match_text("red car").is_none());
        assert!(all.match_text("blue and red").is_some());
    }

    #[test]
    fn test_whole_word() {
        let search = compile(SearchDescriptor::new("cat").whole_word());
        assert!(search.match_text("the cat sat").is_some());
        assert!(search.match_text("concatenate").is_none());
    }

    #[test]
    fn test_normalize_whitespace() {
        let search = compile(SearchDescriptor::new("a b").normalize_whitespace());
        let text = search.normalize("a\t\t b");
        assert_eq!(text.as_ref(), "a b");
        assert!(search.match_text(&text).is_some());
    }

    #[test]
    fn test_normalize_collapses_whitespace_only_text() {
        let search = compile(SearchDescriptor::new("a").normalize_whitespace());
        assert_eq!(search.normalize("  \t ").as_ref(), "");
        assert_eq!(search.normalize("").as_ref(), "");
    }

    #[test]
    fn test_diacritic_insensitive_matching() {
        let search = compile(SearchDescriptor::new("cafe").diacritic_insensitive());
        let text = search.normalize("Café crème");
        assert_eq!(text.as_ref(), "Cafe creme");
        let spans = search.match_text(&text).unwrap();
        assert_eq!(spans, vec![MatchSpan { start: 0, len: 4 }]);

        // The term is folded too, so an accented needle still matches.
        let accented = compile(SearchDescriptor::new("café").diacritic_insensitive());
        assert!(accented.match_text(&accented.normalize("CAFE")).is_some());

        // Combining marks are stripped, not just precomposed letters.
        assert_eq!(search.normalize("Cafe\u{0301}").as_ref(), "Cafe");

        // Without the flag the accent blocks the match.
        let plain = compile(SearchDescriptor::new("cafe"));
        assert!(plain.match_text(&plain.normalize("Café")).is_none());
    }

    #[test]
    fn test_navigation_visits_results_in_order() {
        let model = SearchModel::new();
        model.replace_results(vec![result(0), result(3), result(5)]);

        assert_eq!(model.current_index(), -1);
        assert_eq!(model.move_next(), Some(0));
        assert_eq!(model.move_next(), Some(1));
        assert_eq!(model.move_next(), Some(2));
        // Wraps by default.
        assert_eq!(model.move_next(), Some(0));
    }

    #[test]
    fn test_navigation_without_wrap_stops_at_ends() {
        let model = SearchModel::new();
        model.set_wrap_navigation(false);
        model.replace_results(vec![result(0), result(1)]);

        assert_eq!(model.move_next(), Some(0));
        assert_eq!(model.move_next(), Some(1));
        assert_eq!(model.move_next(), None);
        assert_eq!(model.current_index(), 1);

        assert_eq!(model.move_previous(), Some(0));
        assert_eq!(model.move_previous(), None);
    }

    #[test]
    fn test_replace_results_resets_cursor() {
        let model = SearchModel::new();
        model.replace_results(vec![result(0), result(1)]);
        model.move_next();
        assert_eq!(model.current_index(), 0);

        model.replace_results(vec![result(2)]);
        assert_eq!(model.current_index(), -1);
    }

    #[test]
    fn test_move_previous_from_cleared_lands_on_last() {
        let model = SearchModel::new();
        model.replace_results(vec![result(0), result(1), result(2)]);
        assert_eq!(model.move_previous(), Some(2));
    }
}
