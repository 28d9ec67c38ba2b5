//! Cell values and text comparison modes.
//!
//! [`CellValue`] is the dynamically-typed value that flows through sorting,
//! filtering, searching, and summaries. Accessors extract a `CellValue` from
//! a row item; the comparison and matching machinery then operates on the
//! value without knowing the row type.

use std::cmp::Ordering;
use std::fmt;

/// A dynamically-typed cell value.
///
/// Produced by column accessors and path accessors, consumed by sort
/// comparisons, filter operators, search scanning, and summary aggregates.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Absent value. Sorts before everything else.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Whether this value is [`CellValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// The contained text, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a float, widening integers. `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(n) => Some(*n as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Render the value as display text, the form search scanning matches
    /// against. `Null` renders as the empty string.
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(n) => n.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }

    /// Total-order comparison across all value variants.
    ///
    /// `Null` orders first. Numeric variants (`Int`, `Float`) compare by
    /// numeric value, so mixed-type numeric columns sort sensibly. Across
    /// otherwise-incomparable variants the ordering falls back to a fixed
    /// variant rank (`Null < Bool < numeric < Text`), keeping sorts stable
    /// and panic-free on heterogeneous data. Float `NaN` orders after all
    /// other floats.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        use CellValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => compare_f64(*a, *b),
            (Int(a), Float(b)) => compare_f64(*a as f64, *b),
            (Float(a), Int(b)) => compare_f64(*a, *b as f64),
            (Text(a), Text(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }

    /// Like [`compare`](Self::compare), but text comparisons honor the given
    /// case sensitivity.
    pub fn compare_with(&self, other: &CellValue, text: TextCompare) -> Ordering {
        match (self, other) {
            (CellValue::Text(a), CellValue::Text(b)) => text.cmp(a, b),
            _ => self.compare(other),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Bool(_) => 1,
            CellValue::Int(_) | CellValue::Float(_) => 2,
            CellValue::Text(_) => 3,
        }
    }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| {
        // NaN orders after every non-NaN value.
        match (a.is_nan(), b.is_nan()) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => Ordering::Equal,
        }
    })
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Case sensitivity for text comparison in sorting and filtering.
///
/// Case-insensitive comparison folds via Unicode simple case folding
/// approximated with `char::to_lowercase`, which covers the grid's
/// ordering and equality needs without a locale table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextCompare {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

impl TextCompare {
    /// Compare two strings under this mode.
    pub fn cmp(&self, a: &str, b: &str) -> Ordering {
        match self {
            TextCompare::CaseSensitive => a.cmp(b),
            TextCompare::CaseInsensitive => {
                let mut ia = a.chars().flat_map(char::to_lowercase);
                let mut ib = b.chars().flat_map(char::to_lowercase);
                loop {
                    match (ia.next(), ib.next()) {
                        (None, None) => return Ordering::Equal,
                        (None, Some(_)) => return Ordering::Less,
                        (Some(_), None) => return Ordering::Greater,
                        (Some(ca), Some(cb)) => match ca.cmp(&cb) {
                            Ordering::Equal => continue,
                            other => return other,
                        },
                    }
                }
            }
        }
    }

    /// Test two strings for equality under this mode.
    pub fn eq(&self, a: &str, b: &str) -> bool {
        self.cmp(a, b) == Ordering::Equal
    }

    /// Whether `haystack` contains `needle` under this mode.
    pub fn contains(&self, haystack: &str, needle: &str) -> bool {
        match self {
            TextCompare::CaseSensitive => haystack.contains(needle),
            TextCompare::CaseInsensitive => fold(haystack).contains(&fold(needle)),
        }
    }

    /// Whether `haystack` starts with `needle` under this mode.
    pub fn starts_with(&self, haystack: &str, needle: &str) -> bool {
        match self {
            TextCompare::CaseSensitive => haystack.starts_with(needle),
            TextCompare::CaseInsensitive => fold(haystack).starts_with(&fold(needle)),
        }
    }

    /// Whether `haystack` ends with `needle` under this mode.
    pub fn ends_with(&self, haystack: &str, needle: &str) -> bool {
        match self {
            TextCompare::CaseSensitive => haystack.ends_with(needle),
            TextCompare::CaseInsensitive => fold(haystack).ends_with(&fold(needle)),
        }
    }
}

fn fold(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(CellValue::Null.compare(&CellValue::Int(0)), Ordering::Less);
        assert_eq!(
            CellValue::Text("".into()).compare(&CellValue::Null),
            Ordering::Greater
        );
        assert_eq!(CellValue::Null.compare(&CellValue::Null), Ordering::Equal);
    }

    #[test]
    fn test_mixed_numeric_compare() {
        assert_eq!(
            CellValue::Int(2).compare(&CellValue::Float(2.5)),
            Ordering::Less
        );
        assert_eq!(
            CellValue::Float(3.0).compare(&CellValue::Int(3)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_nan_orders_last_among_floats() {
        assert_eq!(
            CellValue::Float(f64::NAN).compare(&CellValue::Float(1.0)),
            Ordering::Greater
        );
        assert_eq!(
            CellValue::Float(1.0).compare(&CellValue::Float(f64::NAN)),
            Ordering::Less
        );
    }

    #[test]
    fn test_case_insensitive_text() {
        let ci = TextCompare::CaseInsensitive;
        assert!(ci.eq("Straße", "STRASSE") == false); // no full case folding
        assert!(ci.eq("Hello", "hELLO"));
        assert!(ci.contains("The Quick Fox", "quick"));
        assert!(ci.starts_with("Alpha", "ALP"));
        assert!(ci.ends_with("Omega", "EGA"));
        assert_eq!(ci.cmp("apple", "APPLE"), Ordering::Equal);
    }

    #[test]
    fn test_display_string() {
        assert_eq!(CellValue::Null.to_display_string(), "");
        assert_eq!(CellValue::Int(42).to_display_string(), "42");
        assert_eq!(CellValue::from("abc").to_display_string(), "abc");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(CellValue::from(None::<i64>), CellValue::Null);
        assert_eq!(CellValue::from(Some(7i64)), CellValue::Int(7));
    }
}
