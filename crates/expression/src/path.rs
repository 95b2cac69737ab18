//! Path grammar: `segment ( '.' segment | '[' index ']' )*`.
//!
//! A segment is an identifier (`[A-Za-z_][A-Za-z0-9_-]*`, which covers
//! aliases and record ids); an index is a non-negative integer or a
//! quoted string.

use std::fmt;

use crate::error::ExpressionError;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key access (`.foo` or `["foo"]`).
    Key(String),
    /// Array element access (`[3]`).
    Index(usize),
}

/// A parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<PathSegment>,
    source: String,
}

impl Path {
    /// Parse a path expression.
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let src = input.trim();
        if src.is_empty() {
            return Err(invalid(input, "empty path"));
        }

        let mut segments = Vec::new();
        let chars: Vec<char> = src.chars().collect();
        let mut i = 0;

        segments.push(PathSegment::Key(parse_identifier(src, &chars, &mut i)?));

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    segments.push(PathSegment::Key(parse_identifier(src, &chars, &mut i)?));
                }
                '[' => {
                    i += 1;
                    segments.push(parse_index(src, &chars, &mut i)?);
                }
                other => {
                    return Err(invalid(src, format!("unexpected character {other:?}")));
                }
            }
        }

        Ok(Self {
            segments,
            source: src.to_owned(),
        })
    }

    /// The parsed segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The first segment's key, if it is a key.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// The path text as written (trimmed).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path has no segments. Never true for a parsed path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> ExpressionError {
    ExpressionError::InvalidPath {
        path: path.to_owned(),
        reason: reason.into(),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn parse_identifier(src: &str, chars: &[char], i: &mut usize) -> Result<String, ExpressionError> {
    if *i >= chars.len() || !is_ident_start(chars[*i]) {
        return Err(invalid(src, format!("expected identifier at offset {i}", i = *i)));
    }
    let start = *i;
    while *i < chars.len() && is_ident_continue(chars[*i]) {
        *i += 1;
    }
    Ok(chars[start..*i].iter().collect())
}

fn parse_index(src: &str, chars: &[char], i: &mut usize) -> Result<PathSegment, ExpressionError> {
    if *i >= chars.len() {
        return Err(invalid(src, "unterminated '['"));
    }
    let segment = match chars[*i] {
        '"' | '\'' => {
            let quote = chars[*i];
            *i += 1;
            let start = *i;
            while *i < chars.len() && chars[*i] != quote {
                *i += 1;
            }
            if *i >= chars.len() {
                return Err(invalid(src, "unterminated quoted index"));
            }
            let key: String = chars[start..*i].iter().collect();
            *i += 1;
            PathSegment::Key(key)
        }
        c if c.is_ascii_digit() => {
            let start = *i;
            while *i < chars.len() && chars[*i].is_ascii_digit() {
                *i += 1;
            }
            let digits: String = chars[start..*i].iter().collect();
            let index = digits
                .parse::<usize>()
                .map_err(|_| invalid(src, format!("index {digits:?} out of range")))?;
            PathSegment::Index(index)
        }
        other => {
            return Err(invalid(
                src,
                format!("expected integer or quoted string index, found {other:?}"),
            ));
        }
    };
    if *i >= chars.len() || chars[*i] != ']' {
        return Err(invalid(src, "expected ']'"));
    }
    *i += 1;
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn single_segment() {
        let path = Path::parse("apiKey").unwrap();
        assert_eq!(path.segments(), &[PathSegment::Key("apiKey".into())]);
        assert_eq!(path.head(), Some("apiKey"));
    }

    #[test]
    fn dotted_segments() {
        let path = Path::parse("extract_emails.count").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("extract_emails".into()),
                PathSegment::Key("count".into()),
            ]
        );
    }

    #[test]
    fn array_index() {
        let path = Path::parse("emails[0].subject").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("emails".into()),
                PathSegment::Index(0),
                PathSegment::Key("subject".into()),
            ]
        );
    }

    #[rstest]
    #[case("items[\"first name\"]", "first name")]
    #[case("items['first name']", "first name")]
    fn quoted_string_index(#[case] input: &str, #[case] expected: &str) {
        let path = Path::parse(input).unwrap();
        assert_eq!(
            path.segments()[1],
            PathSegment::Key(expected.to_owned())
        );
    }

    #[test]
    fn record_id_head() {
        let path = Path::parse("email_001.classify.type").unwrap();
        assert_eq!(path.head(), Some("email_001"));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        let path = Path::parse("  apiKey  ").unwrap();
        assert_eq!(path.source(), "apiKey");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case(".leading")]
    #[case("a..b")]
    #[case("a[")]
    #[case("a[1")]
    #[case("a['x]")]
    #[case("a[-1]")]
    #[case("9lives")]
    #[case("a b")]
    fn invalid_paths_rejected(#[case] input: &str) {
        assert!(Path::parse(input).is_err(), "{input:?} should be rejected");
    }

    #[test]
    fn dashes_allowed_in_segments() {
        let path = Path::parse("step-2.result").unwrap();
        assert_eq!(path.head(), Some("step-2"));
    }
}
