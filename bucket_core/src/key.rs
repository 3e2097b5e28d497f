//! Caller-supplied bucket identifiers.
//!
//! The controller never looks inside a key; it only hashes and compares it. The
//! variants exist so that integers, strings, symbolic tags and tuples of those can
//! share one statically known key type.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies one bucket inside a controller's table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    /// An integer identifier, e.g. a user id.
    Int(i64),
    /// An arbitrary string, e.g. an IP address or API key.
    Str(String),
    /// A symbolic tag such as `:login`.
    Tag(String),
    /// A tuple of keys, e.g. `(:upload, 42)`.
    Composite(Vec<BucketKey>),
}

/// Errors produced while parsing the text form of a key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("unbalanced parentheses in key `{0}`")]
    Unbalanced(String),
    #[error("unexpected text after composite key `{0}`")]
    TrailingInput(String),
    #[error("empty element in composite key `{0}`")]
    EmptyElement(String),
    #[error("unterminated quoted string in key `{0}`")]
    UnterminatedQuote(String),
}

impl BucketKey {
    /// Creates a symbolic tag key.
    pub fn tag(name: impl Into<String>) -> Self {
        BucketKey::Tag(name.into())
    }

    /// Creates a composite key from its parts.
    pub fn composite<I>(parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<BucketKey>,
    {
        BucketKey::Composite(parts.into_iter().map(Into::into).collect())
    }
}

impl From<i64> for BucketKey {
    fn from(value: i64) -> Self {
        BucketKey::Int(value)
    }
}

impl From<&str> for BucketKey {
    fn from(value: &str) -> Self {
        BucketKey::Str(value.to_string())
    }
}

impl From<String> for BucketKey {
    fn from(value: String) -> Self {
        BucketKey::Str(value)
    }
}

impl fmt::Display for BucketKey {
    /// Writes the text form accepted by [`FromStr`]. Strings and tags that would
    /// read back as something else are written in double quotes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Int(i) => write!(f, "{}", i),
            BucketKey::Str(s) if reads_as_other_key(s) => write_quoted(f, s),
            BucketKey::Str(s) => f.write_str(s),
            BucketKey::Tag(t) if needs_quotes(t) => {
                f.write_str(":")?;
                write_quoted(f, t)
            }
            BucketKey::Tag(t) => write!(f, ":{}", t),
            BucketKey::Composite(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Whether `s` cannot be written bare, inside or outside a composite.
fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.trim() != s
        || s.chars().any(|c| matches!(c, '(' | ')' | ',' | '"' | '\\'))
}

/// A bare string that would parse as a tag or an integer, or needs quotes anyway.
fn reads_as_other_key(s: &str) -> bool {
    needs_quotes(s) || s.starts_with(':') || s.parse::<i64>().is_ok()
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        if c == '"' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{}", c)?;
    }
    f.write_str("\"")
}

impl FromStr for BucketKey {
    type Err = KeyParseError;

    /// Parses the text form used on the command line and in query strings.
    ///
    /// * `42` is an integer key.
    /// * `:login` is a tag; `:"two words"` is a tag with a quoted name.
    /// * `(:upload, 42)` is a composite; nesting is allowed.
    /// * `"42"` is a string key; `\"` and `\\` escape inside the quotes.
    /// * Anything else is taken verbatim as a string key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if trimmed.starts_with('(') {
            return parse_composite(trimmed);
        }

        if trimmed.starts_with('"') {
            return unquote(trimmed).map(BucketKey::Str);
        }

        if let Some(tag) = trimmed.strip_prefix(':') {
            if tag.starts_with('"') {
                return unquote(tag).map(BucketKey::Tag);
            }
            if !tag.is_empty() {
                return Ok(BucketKey::Tag(tag.to_string()));
            }
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(BucketKey::Int(i));
        }

        Ok(BucketKey::Str(trimmed.to_string()))
    }
}

/// Reads a double-quoted string that must make up all of `s`.
fn unquote(s: &str) -> Result<String, KeyParseError> {
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            '"' => {
                if !s[i + 1..].trim().is_empty() {
                    return Err(KeyParseError::TrailingInput(s.to_string()));
                }
                return Ok(out);
            }
            _ => out.push(c),
        }
    }
    Err(KeyParseError::UnterminatedQuote(s.to_string()))
}

/// Walks `s` and reports each structural character (parentheses and commas)
/// that is not inside a quoted string, with its byte offset.
fn structural_chars(s: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut in_quotes = false;
    let mut escaped = false;
    s.char_indices().filter(move |&(_, c)| {
        if escaped {
            escaped = false;
            return false;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '(' | ')' | ',' => return !in_quotes,
            _ => {}
        }
        false
    })
}

fn parse_composite(s: &str) -> Result<BucketKey, KeyParseError> {
    // Find the parenthesis that closes the opening one.
    let mut depth = 0usize;
    let mut close = None;
    for (i, c) in structural_chars(s) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let close = close.ok_or_else(|| KeyParseError::Unbalanced(s.to_string()))?;
    if !s[close + 1..].trim().is_empty() {
        return Err(KeyParseError::TrailingInput(s.to_string()));
    }

    let inner = &s[1..close];
    if inner.trim().is_empty() {
        return Ok(BucketKey::Composite(Vec::new()));
    }

    let mut parts = Vec::new();
    for part in split_top_level(inner) {
        if part.trim().is_empty() {
            return Err(KeyParseError::EmptyElement(s.to_string()));
        }
        parts.push(part.parse()?);
    }
    Ok(BucketKey::Composite(parts))
}

/// Splits on commas that are not nested inside parentheses or quotes.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in structural_chars(s) {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}
