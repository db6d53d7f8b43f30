//! Field spec table.
//!
//! A [`FieldSpec`] says how one named value travels from the target to the
//! host: the target-side expression that produces it (`expand`), an
//! optional wrapper that evaluates the request in a required context
//! (`embed`), and the host-side conversion of the raw wire string (`parse`).
//!
//! A [`FieldSet`] is the immutable, ordered table of specs a session is
//! built with. [`FieldSet::standard`] covers the values most callers need.

pub mod value;

use std::collections::HashMap;
use std::sync::Arc;

use crate::registry::InboundMessage;
use crate::snippet::escape::{check_balanced, validate_field_name};
use crate::{BuddyError, Result};

pub use value::{Cursor, FieldValue, Fields, ParseFn, Pos};

/// Signature of an embed wrapper: request snippet in, wrapped snippet out.
pub type EmbedFn = fn(&str) -> String;

/// Target-side value namespace a field reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Transient values: `%val(name)`.
    Val,
    /// Arguments of the invoking command: `%arg(name)`.
    Arg,
    /// Options: `%opt(name)`.
    Opt,
    /// Registers: `%reg(name)`.
    Reg,
    /// Client environment: `%val(client_env_name)`.
    ClientEnv,
}

impl Namespace {
    /// Expression reading `key` from this namespace.
    #[must_use]
    pub fn expand(self, key: &str) -> String {
        match self {
            Self::Val => format!("%val({key})"),
            Self::Arg => format!("%arg({key})"),
            Self::Opt => format!("%opt({key})"),
            Self::Reg => format!("%reg({key})"),
            Self::ClientEnv => format!("%val(client_env_{key})"),
        }
    }
}

/// Where the expression for a field comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Read the field's own name from a namespace.
    Namespaced(Namespace),
    /// A fixed expression regardless of the field name.
    Keyed(String),
}

/// How to request, wrap and parse one field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    expansion: Expansion,
    embed: Option<EmbedFn>,
    parse: ParseFn,
}

impl FieldSpec {
    /// Field read from `namespace` under its own name.
    #[must_use]
    pub fn namespaced(namespace: Namespace, parse: ParseFn) -> Self {
        Self {
            expansion: Expansion::Namespaced(namespace),
            embed: None,
            parse,
        }
    }

    /// `%val(name)` field.
    #[must_use]
    pub fn val(parse: ParseFn) -> Self {
        Self::namespaced(Namespace::Val, parse)
    }

    /// `%arg(name)` field.
    #[must_use]
    pub fn arg(parse: ParseFn) -> Self {
        Self::namespaced(Namespace::Arg, parse)
    }

    /// `%opt(name)` field.
    #[must_use]
    pub fn opt(parse: ParseFn) -> Self {
        Self::namespaced(Namespace::Opt, parse)
    }

    /// `%reg(name)` field.
    #[must_use]
    pub fn reg(parse: ParseFn) -> Self {
        Self::namespaced(Namespace::Reg, parse)
    }

    /// `%val(client_env_name)` field.
    #[must_use]
    pub fn client_env(parse: ParseFn) -> Self {
        Self::namespaced(Namespace::ClientEnv, parse)
    }

    /// Field produced by a fixed `expression`.
    #[must_use]
    pub fn keyed(expression: impl Into<String>, parse: ParseFn) -> Self {
        Self {
            expansion: Expansion::Keyed(expression.into()),
            embed: None,
            parse,
        }
    }

    /// Evaluate this field's request inside `embed`.
    #[must_use]
    pub fn with_embed(mut self, embed: EmbedFn) -> Self {
        self.embed = Some(embed);
        self
    }

    /// Target-side expression producing the value of field `key`.
    #[must_use]
    pub fn expand(&self, key: &str) -> String {
        match &self.expansion {
            Expansion::Namespaced(ns) => ns.expand(key),
            Expansion::Keyed(expression) => expression.clone(),
        }
    }

    /// Wrap a request snippet; identity unless an embed was configured.
    #[must_use]
    pub fn embed(&self, snippet: &str) -> String {
        match self.embed {
            Some(embed) => embed(snippet),
            None => snippet.to_owned(),
        }
    }

    /// Convert the raw wire value of field `key`.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Parse` naming `key` when `raw` is malformed.
    pub fn parse(&self, key: &str, raw: &str) -> Result<FieldValue> {
        (self.parse)(raw).map_err(|reason| BuddyError::Parse {
            field: key.to_owned(),
            reason,
        })
    }
}

/// Evaluate `snippet` with the whole buffer selected, in a draft context.
#[must_use]
pub fn whole_buffer(snippet: &str) -> String {
    format!("eval -draft %(exec '%'; {snippet})")
}

/// Ordered, immutable mapping of field name to [`FieldSpec`].
///
/// Cheap to clone; clones share the table.
#[derive(Debug, Clone)]
pub struct FieldSet {
    inner: Arc<Table>,
}

#[derive(Debug)]
struct Table {
    order: Vec<String>,
    specs: HashMap<String, FieldSpec>,
}

/// Incremental constructor for a [`FieldSet`].
#[derive(Debug, Default)]
pub struct FieldSetBuilder {
    order: Vec<String>,
    specs: HashMap<String, FieldSpec>,
    invalid: Option<BuddyError>,
}

impl FieldSetBuilder {
    /// Add or replace field `name`.
    #[must_use]
    pub fn field(mut self, name: &str, spec: FieldSpec) -> Self {
        if let Err(err) = validate_field_name(name) {
            self.invalid.get_or_insert(err);
            return self;
        }
        // Keyed expressions land inside the request's `%(...)` body.
        if let Expansion::Keyed(expression) = &spec.expansion {
            if let Err(err) = check_balanced(expression) {
                self.invalid.get_or_insert(err);
                return self;
            }
        }
        if self.specs.insert(name.to_owned(), spec).is_none() {
            self.order.push(name.to_owned());
        }
        self
    }

    /// Freeze the table.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Encoding` for the first field whose name or
    /// keyed expression cannot be embedded in a snippet.
    pub fn build(self) -> Result<FieldSet> {
        if let Some(err) = self.invalid {
            return Err(err);
        }
        Ok(FieldSet {
            inner: Arc::new(Table {
                order: self.order,
                specs: self.specs,
            }),
        })
    }
}

impl FieldSet {
    /// Start an empty table.
    #[must_use]
    pub fn builder() -> FieldSetBuilder {
        FieldSetBuilder::default()
    }

    /// The standard table: buffer, session, cursor and option values.
    #[must_use]
    pub fn standard() -> Self {
        let builder = Self::builder()
            .field("buffile", FieldSpec::val(value::text))
            .field("session", FieldSpec::val(value::text))
            .field("client", FieldSpec::val(value::text))
            .field("timestamp", FieldSpec::val(value::integer))
            .field("cursor_line", FieldSpec::val(value::integer))
            .field("cursor_column", FieldSpec::val(value::integer))
            .field(
                "content",
                FieldSpec::keyed("%val(selection)", value::text).with_embed(whole_buffer),
            )
            .field("selection", FieldSpec::val(value::text))
            .field("selections", FieldSpec::val(value::colons))
            .field("selection_desc", FieldSpec::val(value::cursor))
            .field("selections_desc", FieldSpec::val(value::cursors))
            .field("filetype", FieldSpec::opt(value::text))
            .field("1", FieldSpec::arg(value::text))
            .field("completers", FieldSpec::opt(value::colons));
        let FieldSetBuilder { order, specs, .. } = builder;
        Self {
            inner: Arc::new(Table { order, specs }),
        }
    }

    /// Spec for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.inner.specs.get(name)
    }

    /// Whether `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.specs.contains_key(name)
    }

    /// Declared names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.order.iter().map(String::as_str)
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.order.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.order.is_empty()
    }

    /// Spec for `name`, or an encoding error for undeclared names.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Encoding` when `name` is not declared.
    pub fn require(&self, name: &str) -> Result<&FieldSpec> {
        self.get(name)
            .ok_or_else(|| BuddyError::Encoding(format!("undeclared field: {name}")))
    }

    /// Decode the `requested` fields of `message` into a typed record.
    ///
    /// Fields the message carries but the request did not ask for are
    /// ignored.
    ///
    /// # Errors
    ///
    /// `MissingField` for the first requested field the message lacks,
    /// `Parse` when a value is not a string or fails its conversion.
    pub fn decode(&self, requested: &[String], message: &InboundMessage) -> Result<Fields> {
        let mut fields = Fields::new();
        for name in requested {
            let spec = self.require(name)?;
            let raw = message.raw(name)?;
            fields.insert(name.clone(), spec.parse(name, raw)?);
        }
        Ok(fields)
    }
}
