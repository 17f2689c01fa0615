//! Unicode-aware string folding and collation.
//!
//! Names are compared the way a listener expects to see them in a library
//! browser: case and accents are ignored first (`"Édith"` sorts next to
//! `"edith"`), and the raw string only breaks ties so that the order is total.

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold a string for case- and accent-insensitive comparison.
pub fn fold(s: &str) -> String {
    if s.is_ascii() {
        return s.to_ascii_lowercase();
    }
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compare two strings in collation order.
pub fn collate(a: &str, b: &str) -> Ordering {
    if a.is_ascii() && b.is_ascii() {
        let folded = a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase()));
        return folded.then_with(|| a.cmp(b));
    }
    fold(a).cmp(&fold(b)).then_with(|| a.cmp(b))
}

/// Parse the leading decimal number of a string, as in `"3/12"` → `3`.
///
/// Returns `None` if the string does not start with a digit.
pub fn numeric_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    // Saturate instead of failing on absurdly long digit runs
    Some(s[..end].parse::<i64>().unwrap_or(i64::MAX))
}

/// Compare two strings by their leading numbers; strings without a number
/// sort first.
pub fn compare_numeric(a: &str, b: &str) -> Ordering {
    match (numeric_prefix(a), numeric_prefix(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_case_and_accents() {
        assert_eq!(fold("Beyoncé"), "beyonce");
        assert_eq!(fold("MOTÖRHEAD"), "motorhead");
        assert_eq!(fold("abc"), "abc");
    }

    #[test]
    fn test_collate_ignores_case_first() {
        assert_eq!(collate("apple", "Banana"), Ordering::Less);
        assert_eq!(collate("Zebra", "apple"), Ordering::Greater);
        assert_eq!(collate("Édith", "edith"), "Édith".cmp("edith"));
        assert_eq!(collate("Émile", "Fred"), Ordering::Less);
    }

    #[test]
    fn test_collate_is_total() {
        assert_ne!(collate("abc", "ABC"), Ordering::Equal);
        assert_eq!(collate("abc", "abc"), Ordering::Equal);
    }

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(numeric_prefix("07"), Some(7));
        assert_eq!(numeric_prefix("3/12"), Some(3));
        assert_eq!(numeric_prefix("A1"), None);
        assert_eq!(numeric_prefix(""), None);
    }

    #[test]
    fn test_compare_numeric() {
        assert_eq!(compare_numeric("2", "10"), Ordering::Less);
        assert_eq!(compare_numeric("", "1"), Ordering::Less);
        assert_eq!(compare_numeric("x", "y"), Ordering::Equal);
    }
}
