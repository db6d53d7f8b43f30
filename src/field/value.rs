//! Typed field values and the records handed to callbacks.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::{BuddyError, Result};

/// Separator used by the target when it flattens a list into one string.
pub const LIST_SEPARATOR: char = ':';

/// A 1-based `line.column` position as the target prints it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    /// 1-based line.
    pub line: u32,
    /// 1-based byte column.
    pub column: u32,
}

impl Pos {
    /// The first character of a buffer.
    pub const ZERO: Self = Self { line: 1, column: 1 };

    /// Build a position from 1-based coordinates.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Convert to 0-based `(line, character)` coordinates.
    #[must_use]
    pub const fn to_zero_indexed(self) -> (u32, u32) {
        (self.line.saturating_sub(1), self.column.saturating_sub(1))
    }

    /// Build a position from 0-based `(line, character)` coordinates.
    #[must_use]
    pub const fn from_zero_indexed(line: u32, character: u32) -> Self {
        Self {
            line: line.saturating_add(1),
            column: character.saturating_add(1),
        }
    }
}

impl Display for Pos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.line, self.column)
    }
}

impl FromStr for Pos {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (line, column) = s
            .split_once('.')
            .ok_or_else(|| format!("expected `line.column`, got {s:?}"))?;
        let line = line
            .parse()
            .map_err(|e| format!("bad line in {s:?}: {e}"))?;
        let column = column
            .parse()
            .map_err(|e| format!("bad column in {s:?}: {e}"))?;
        Ok(Self { line, column })
    }
}

/// A selection: anchor and head positions, printed as `a.b,c.d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    /// Fixed end of the selection.
    pub anchor: Pos,
    /// Moving end of the selection.
    pub head: Pos,
}

impl Cursor {
    /// Build a cursor from its two ends.
    #[must_use]
    pub const fn new(anchor: Pos, head: Pos) -> Self {
        Self { anchor, head }
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.anchor, self.head)
    }
}

impl FromStr for Cursor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (anchor, head) = s
            .split_once(',')
            .ok_or_else(|| format!("expected `anchor,head`, got {s:?}"))?;
        Ok(Self {
            anchor: anchor.parse()?,
            head: head.parse()?,
        })
    }
}

/// A parsed field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Verbatim text.
    Text(String),
    /// Decimal integer.
    Integer(i64),
    /// Colon-separated list.
    List(Vec<String>),
    /// One selection.
    Cursor(Cursor),
    /// Colon-separated selections.
    Cursors(Vec<Cursor>),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::List(_) => "list",
            Self::Cursor(_) => "cursor",
            Self::Cursors(_) => "cursor list",
        }
    }
}

/// Signature of a field parser: raw wire string to typed value, or a reason.
pub type ParseFn = fn(&str) -> std::result::Result<FieldValue, String>;

/// Keep the raw string.
///
/// # Errors
///
/// Never fails.
pub fn text(raw: &str) -> std::result::Result<FieldValue, String> {
    Ok(FieldValue::Text(raw.to_owned()))
}

/// Decimal integer, surrounding whitespace ignored.
///
/// # Errors
///
/// Returns the reason when `raw` is not a decimal integer.
pub fn integer(raw: &str) -> std::result::Result<FieldValue, String> {
    raw.trim()
        .parse()
        .map(FieldValue::Integer)
        .map_err(|e| format!("not an integer: {raw:?} ({e})"))
}

/// Split on every colon.
///
/// Colons inside items are not escaped by the target, so an item holding a
/// colon comes back as two items.
///
/// # Errors
///
/// Never fails.
pub fn colons(raw: &str) -> std::result::Result<FieldValue, String> {
    Ok(FieldValue::List(split_list(raw)))
}

/// One `anchor,head` selection.
///
/// # Errors
///
/// Returns the reason when `raw` is not `l.c,l.c`.
pub fn cursor(raw: &str) -> std::result::Result<FieldValue, String> {
    raw.parse().map(FieldValue::Cursor)
}

/// Colon-separated `anchor,head` selections.
///
/// # Errors
///
/// Returns the reason for the first malformed selection.
pub fn cursors(raw: &str) -> std::result::Result<FieldValue, String> {
    raw.split(LIST_SEPARATOR)
        .map(str::parse)
        .collect::<std::result::Result<Vec<Cursor>, _>>()
        .map(FieldValue::Cursors)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(LIST_SEPARATOR).map(str::to_owned).collect()
}

/// Typed record produced by decoding one inbound message.
///
/// Holds exactly the fields the request asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    values: BTreeMap<String, FieldValue>,
}

impl Fields {
    /// Empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `name`, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    /// Raw access to one value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Number of fields in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record is empty (a bare `msg_and_then` acknowledgement).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Field names in the record, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Text field.
    ///
    /// # Errors
    ///
    /// `MissingField` if absent, `Parse` if the field holds another type.
    pub fn text(&self, name: &str) -> Result<&str> {
        match self.require(name)? {
            FieldValue::Text(s) => Ok(s),
            other => Err(mismatch(name, "text", other)),
        }
    }

    /// Integer field.
    ///
    /// # Errors
    ///
    /// `MissingField` if absent, `Parse` if the field holds another type.
    pub fn integer(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            FieldValue::Integer(n) => Ok(*n),
            other => Err(mismatch(name, "integer", other)),
        }
    }

    /// List field.
    ///
    /// # Errors
    ///
    /// `MissingField` if absent, `Parse` if the field holds another type.
    pub fn list(&self, name: &str) -> Result<&[String]> {
        match self.require(name)? {
            FieldValue::List(items) => Ok(items),
            other => Err(mismatch(name, "list", other)),
        }
    }

    /// Cursor field.
    ///
    /// # Errors
    ///
    /// `MissingField` if absent, `Parse` if the field holds another type.
    pub fn cursor(&self, name: &str) -> Result<Cursor> {
        match self.require(name)? {
            FieldValue::Cursor(c) => Ok(*c),
            other => Err(mismatch(name, "cursor", other)),
        }
    }

    /// Cursor-list field.
    ///
    /// # Errors
    ///
    /// `MissingField` if absent, `Parse` if the field holds another type.
    pub fn cursors(&self, name: &str) -> Result<&[Cursor]> {
        match self.require(name)? {
            FieldValue::Cursors(c) => Ok(c),
            other => Err(mismatch(name, "cursor list", other)),
        }
    }

    fn require(&self, name: &str) -> Result<&FieldValue> {
        self.values
            .get(name)
            .ok_or_else(|| BuddyError::MissingField(name.to_owned()))
    }
}

fn mismatch(name: &str, wanted: &str, found: &FieldValue) -> BuddyError {
    BuddyError::Parse {
        field: name.to_owned(),
        reason: format!("expected {wanted}, field holds {}", found.kind()),
    }
}
