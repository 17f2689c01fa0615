use regex::{Regex, RegexBuilder};

use crate::collate::fold;
use crate::error::Result;

/// Where in the candidate string the filter value must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPosition {
    /// The whole string.
    Full,
    /// Any substring.
    Anywhere,
    /// A prefix.
    Prefix,
}

/// Matches a single string value.
///
/// Four modes: full match, substring, prefix, and regular expression. The
/// first three can be case and accent insensitive. Negation is applied last,
/// as an XOR on the result.
#[derive(Debug, Clone)]
pub struct StringFilter {
    value: String,
    folded: Option<String>,
    regex: Option<Regex>,
    position: MatchPosition,
    negated: bool,
}

impl StringFilter {
    pub fn new(value: impl Into<String>, fold_case: bool, position: MatchPosition, negated: bool) -> Self {
        let value = value.into();
        let folded = fold_case.then(|| fold(&value));
        Self {
            value,
            folded,
            regex: None,
            position,
            negated,
        }
    }

    /// A regular expression filter; matches anywhere unless anchored.
    pub fn regex(pattern: impl Into<String>, fold_case: bool, negated: bool) -> Result<Self> {
        let value = pattern.into();
        let regex = RegexBuilder::new(&value)
            .case_insensitive(fold_case)
            .build()?;
        Ok(Self {
            folded: fold_case.then(|| fold(&value)),
            value,
            regex: Some(regex),
            position: MatchPosition::Anywhere,
            negated,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn toggle_negated(&mut self) {
        self.negated = !self.negated;
    }

    pub fn fold_case(&self) -> bool {
        self.folded.is_some()
    }

    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    pub fn position(&self) -> MatchPosition {
        self.position
    }

    pub fn matches(&self, s: &str) -> bool {
        self.matches_without_negation(s) != self.negated
    }

    pub fn matches_without_negation(&self, s: &str) -> bool {
        if let Some(regex) = &self.regex {
            return regex.is_match(s);
        }
        match &self.folded {
            Some(folded) => compare(self.position, &fold(s), folded),
            None => compare(self.position, s, &self.value),
        }
    }

    /// Operator as written in filter expressions.
    pub fn operator(&self) -> String {
        if self.is_regex() {
            return if self.negated { "!~" } else { "=~" }.to_string();
        }
        let op = match (self.position, self.fold_case()) {
            (MatchPosition::Full, false) => {
                return if self.negated { "!=" } else { "==" }.to_string();
            }
            (MatchPosition::Full, true) => "eq_ci",
            (MatchPosition::Anywhere, false) => "contains",
            (MatchPosition::Anywhere, true) => "contains_ci",
            (MatchPosition::Prefix, false) => "starts_with",
            (MatchPosition::Prefix, true) => "starts_with_ci",
        };
        if self.negated {
            format!("!{}", op)
        } else {
            op.to_string()
        }
    }
}

fn compare(position: MatchPosition, s: &str, value: &str) -> bool {
    match position {
        MatchPosition::Full => s == value,
        MatchPosition::Anywhere => s.contains(value),
        MatchPosition::Prefix => s.starts_with(value),
    }
}
