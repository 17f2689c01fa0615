use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::{
    AndSongFilter, AudioFormatSongFilter, BaseSongFilter, FilterExpr, MatchPosition,
    StringFilter, TagSongFilter, UriSongFilter,
};
use crate::error::{DbError, Result};
use crate::song::AudioFormat;
use crate::tag::TagType;

/// The key of a filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKey {
    Tag(TagType),
    Any,
    File,
    Base,
    ModifiedSince,
    AddedSince,
    AudioFormat,
    Priority,
}

impl FilterKey {
    fn from_name(name: &str) -> Option<Self> {
        let key = match name.to_ascii_lowercase().as_str() {
            "any" => FilterKey::Any,
            "file" | "filename" => FilterKey::File,
            "base" => FilterKey::Base,
            "modified-since" => FilterKey::ModifiedSince,
            "added-since" => FilterKey::AddedSince,
            "audioformat" => FilterKey::AudioFormat,
            "prio" => FilterKey::Priority,
            _ => return TagType::from_name(name).map(FilterKey::Tag),
        };
        Some(key)
    }
}

fn error(message: impl Into<String>) -> DbError {
    DbError::Filter(message.into())
}

/// Parse a time stamp: unix seconds, RFC 3339, or a UTC date with optional
/// time of day.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0).ok_or_else(|| error("Time stamp out of range"));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(t.and_utc());
    }
    if let Some(t) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(t.and_utc());
    }
    Err(error(format!("Malformed time stamp: {}", s)))
}

/// URIs given to `base` must stay inside the catalog.
fn check_local_uri(uri: &str) -> Result<()> {
    let unsafe_uri = uri.starts_with('/')
        || uri
            .split('/')
            .any(|segment| segment == "." || segment == "..");
    if unsafe_uri {
        return Err(error(format!("Bad URI: {}", uri)));
    }
    Ok(())
}

/// One legacy `(key, value)` pair.
pub(super) fn parse_pair(key: &str, value: &str, fold_case: bool) -> Result<FilterExpr> {
    let key =
        FilterKey::from_name(key).ok_or_else(|| error(format!("Unknown filter type: {}", key)))?;
    let position = if fold_case {
        MatchPosition::Anywhere
    } else {
        MatchPosition::Full
    };
    let string_filter = || StringFilter::new(value, fold_case, position, false);

    Ok(match key {
        FilterKey::Base => {
            check_local_uri(value)?;
            FilterExpr::Base(BaseSongFilter {
                value: value.to_string(),
            })
        }
        FilterKey::ModifiedSince => FilterExpr::ModifiedSince(parse_timestamp(value)?),
        FilterKey::AddedSince => FilterExpr::AddedSince(parse_timestamp(value)?),
        FilterKey::File => FilterExpr::Uri(UriSongFilter {
            filter: string_filter(),
        }),
        FilterKey::Any => FilterExpr::Tag(TagSongFilter {
            tag_type: None,
            filter: string_filter(),
        }),
        FilterKey::Tag(tag_type) => FilterExpr::Tag(TagSongFilter {
            tag_type: Some(tag_type),
            filter: string_filter(),
        }),
        FilterKey::AudioFormat => FilterExpr::AudioFormat(AudioFormatSongFilter {
            format: AudioFormat::parse(value, false)?,
            mask: false,
        }),
        FilterKey::Priority => {
            let priority = value
                .trim()
                .parse::<u32>()
                .map_err(|_| error("Number expected"))?;
            FilterExpr::Priority(check_priority(priority)?)
        }
    })
}

fn check_priority(value: u32) -> Result<u8> {
    u8::try_from(value).map_err(|_| error("Invalid priority value"))
}

/// Parse a complete parenthesized expression; trailing text is an error.
pub(super) fn parse_expression(input: &str, fold_case: bool) -> Result<FilterExpr> {
    let mut parser = Parser {
        input,
        pos: 0,
        fold_case,
    };
    if !parser.rest().starts_with('(') {
        return Err(error("'(' expected"));
    }
    let expr = parser.expression()?;
    if !parser.rest().is_empty() {
        return Err(error("Unparsed garbage after expression"));
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    fold_case: bool,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn advance(&mut self, bytes: usize) {
        self.pos += bytes;
        self.skip_whitespace();
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.advance(token.len());
            true
        } else {
            false
        }
    }

    fn expect_close(&mut self) -> Result<()> {
        if self.eat(")") {
            Ok(())
        } else {
            Err(error("')' expected"))
        }
    }

    /// A run of word characters, followed by optional whitespace.
    fn word(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        let word = &rest[..len];
        self.advance(len);
        word
    }

    fn quoted(&mut self) -> Result<String> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        let quote = match chars.next() {
            Some((_, c @ ('"' | '\''))) => c,
            _ => return Err(error("Quoted string expected")),
        };

        let mut value = String::new();
        while let Some((i, c)) = chars.next() {
            if c == quote {
                self.advance(i + c.len_utf8());
                return Ok(value);
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                }
            } else {
                value.push(c);
            }
        }
        Err(error("Closing quote not found"))
    }

    /// `( ... )`, positioned on the opening parenthesis.
    fn expression(&mut self) -> Result<FilterExpr> {
        self.advance(1);

        if self.rest().starts_with('(') {
            let first = self.expression()?;
            if self.eat(")") {
                return Ok(first);
            }
            let mut and = AndSongFilter { items: vec![first] };
            loop {
                if self.word() != "AND" {
                    return Err(error("'AND' expected"));
                }
                if !self.rest().starts_with('(') {
                    return Err(error("'(' expected"));
                }
                and.items.push(self.expression()?);
                if self.eat(")") {
                    return Ok(FilterExpr::And(and));
                }
            }
        }

        if self.eat("!") {
            if !self.rest().starts_with('(') {
                return Err(error("'(' expected"));
            }
            let inner = self.expression()?;
            self.expect_close()?;
            return Ok(FilterExpr::Not(Box::new(inner)));
        }

        let name = self.word();
        let key = FilterKey::from_name(name)
            .ok_or_else(|| error(format!("Unknown filter type: {}", name)))?;

        let expr = match key {
            FilterKey::ModifiedSince => FilterExpr::ModifiedSince(parse_timestamp(&self.quoted()?)?),
            FilterKey::AddedSince => FilterExpr::AddedSince(parse_timestamp(&self.quoted()?)?),
            FilterKey::Base => {
                let value = self.quoted()?;
                check_local_uri(&value)?;
                FilterExpr::Base(BaseSongFilter { value })
            }
            FilterKey::AudioFormat => {
                let mask = if self.eat("==") {
                    false
                } else if self.eat("=~") {
                    true
                } else {
                    return Err(error("'==' or '=~' expected"));
                };
                let format = AudioFormat::parse(&self.quoted()?, mask)?;
                FilterExpr::AudioFormat(AudioFormatSongFilter { format, mask })
            }
            FilterKey::Priority => {
                if !self.eat(">=") {
                    return Err(error("'>=' expected"));
                }
                let rest = self.rest();
                let len = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                if len == 0 {
                    return Err(error("Number expected"));
                }
                let value = rest[..len]
                    .parse::<u32>()
                    .map_err(|_| error("Invalid priority value"))?;
                self.advance(len);
                FilterExpr::Priority(check_priority(value)?)
            }
            FilterKey::File => FilterExpr::Uri(UriSongFilter {
                filter: self.string_filter()?,
            }),
            FilterKey::Any => FilterExpr::Tag(TagSongFilter {
                tag_type: None,
                filter: self.string_filter()?,
            }),
            FilterKey::Tag(tag_type) => FilterExpr::Tag(TagSongFilter {
                tag_type: Some(tag_type),
                filter: self.string_filter()?,
            }),
        };
        self.expect_close()?;
        Ok(expr)
    }

    /// Operator and quoted value of a tag or URI term.
    fn string_filter(&mut self) -> Result<StringFilter> {
        for (token, negated) in [("=~", false), ("!~", true)] {
            if self.eat(token) {
                return StringFilter::regex(self.quoted()?, self.fold_case, negated);
            }
        }
        for (token, negated) in [("==", false), ("!=", true)] {
            if self.eat(token) {
                let value = self.quoted()?;
                return Ok(StringFilter::new(value, self.fold_case, MatchPosition::Full, negated));
            }
        }

        let negated = self.eat("!");
        let op = self.word();
        let (position, fold_case) = match op.to_ascii_lowercase().as_str() {
            "eq_cs" => (MatchPosition::Full, false),
            "eq_ci" => (MatchPosition::Full, true),
            "contains" => (MatchPosition::Anywhere, self.fold_case),
            "contains_cs" => (MatchPosition::Anywhere, false),
            "contains_ci" => (MatchPosition::Anywhere, true),
            "starts_with" => (MatchPosition::Prefix, self.fold_case),
            "starts_with_cs" => (MatchPosition::Prefix, false),
            "starts_with_ci" => (MatchPosition::Prefix, true),
            _ => return Err(error("'==' or '!=' expected")),
        };
        let value = self.quoted()?;
        Ok(StringFilter::new(value, fold_case, position, negated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(s: &str) -> Result<FilterExpr> {
        parse_expression(s, false)
    }

    fn err(s: &str) -> String {
        parse(s).unwrap_err().to_string()
    }

    #[test]
    fn test_tag_terms() {
        let FilterExpr::Tag(f) = parse(r#"(ARTIST == "Abba")"#).unwrap() else {
            panic!("expected a tag filter");
        };
        assert_eq!(f.tag_type, Some(TagType::Artist));
        assert_eq!(f.filter.value(), "Abba");
        assert_eq!(f.filter.position(), MatchPosition::Full);

        let FilterExpr::Tag(f) = parse(r#"(album !contains_ci 'gold')"#).unwrap() else {
            panic!("expected a tag filter");
        };
        assert!(f.filter.is_negated());
        assert!(f.filter.fold_case());
        assert_eq!(f.filter.position(), MatchPosition::Anywhere);
    }

    #[test]
    fn test_whitespace_is_flexible() {
        let e = parse(r#"(  ( Artist=="A" )   AND   (Title  !=  "B")  )"#).unwrap();
        assert!(matches!(e, FilterExpr::And(ref a) if a.items.len() == 2));
    }

    #[test]
    fn test_escapes() {
        let FilterExpr::Uri(f) = parse(r#"(file == "a \"b\" \\ c")"#).unwrap() else {
            panic!("expected a uri filter");
        };
        assert_eq!(f.filter.value(), r#"a "b" \ c"#);
    }

    #[test]
    fn test_special_forms() {
        assert!(matches!(
            parse(r#"(base "music/A")"#).unwrap(),
            FilterExpr::Base(BaseSongFilter { ref value }) if value == "music/A"
        ));
        assert!(matches!(parse("(prio >= 255)").unwrap(), FilterExpr::Priority(255)));
        assert!(matches!(
            parse(r#"(AudioFormat =~ "44100:*:2")"#).unwrap(),
            FilterExpr::AudioFormat(AudioFormatSongFilter { mask: true, .. })
        ));
        let FilterExpr::ModifiedSince(t) = parse(r#"(modified-since "2024-03-01")"#).unwrap()
        else {
            panic!("expected modified-since");
        };
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_errors_are_descriptive() {
        assert_eq!(err("(prio >= 256)"), "Invalid priority value");
        assert_eq!(err("(prio >= x)"), "Number expected");
        assert_eq!(err("(prio == 1)"), "'>=' expected");
        assert_eq!(err(r#"(Bogus == "x")"#), "Unknown filter type: Bogus");
        assert_eq!(err(r#"(Artist == "x)"#), "Closing quote not found");
        assert_eq!(err(r#"(Artist == x)"#), "Quoted string expected");
        assert_eq!(err(r#"(Artist ~~ "x")"#), "'==' or '!=' expected");
        assert_eq!(err(r#"((Artist == "x") OR (Title == "y"))"#), "'AND' expected");
        assert_eq!(err(r#"(Artist == "x""#), "')' expected");
        assert_eq!(err(r#"(Artist == "x") trailing"#), "Unparsed garbage after expression");
        assert_eq!(err(r#"(AudioFormat != "1:2:3")"#), "'==' or '=~' expected");
        assert_eq!(err(r#"(base "../etc")"#), "Bad URI: ../etc");
        assert!(parse(r#"(Artist =~ "(")"#).is_err());
    }

    #[test]
    fn test_timestamps() {
        let t = Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp(&t.timestamp().to_string()).unwrap(), t);
        assert_eq!(parse_timestamp("2021-06-01T12:30:00Z").unwrap(), t);
        assert_eq!(parse_timestamp("2021-06-01T14:30:00+02:00").unwrap(), t);
        assert_eq!(parse_timestamp("2021-06-01T12:30:00").unwrap(), t);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_legacy_pairs() {
        assert!(matches!(
            parse_pair("file", "a.mp3", false).unwrap(),
            FilterExpr::Uri(_)
        ));
        assert!(matches!(
            parse_pair("any", "x", true).unwrap(),
            FilterExpr::Tag(TagSongFilter { tag_type: None, .. })
        ));
        assert!(parse_pair("nope", "x", false).is_err());
        assert!(parse_pair("base", "/abs", false).is_err());
    }
}
