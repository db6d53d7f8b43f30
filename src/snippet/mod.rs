//! Snippet builder.
//!
//! The target has no serializer and cannot call the host. Every request is
//! therefore a small program in the target's own command language that
//! assembles a JSON line out of plain text edits in an isolated scratch
//! buffer and pipes it to the inbound FIFO:
//!
//! 1. open `{"command":"<id>"` in the scratch buffer,
//! 2. for each field, append `,"<name>":"<value>"` where the value is the
//!    field's expansion, then escape backslash, quote, newline and tab,
//! 3. close the object and write the buffer to the inbound pipe,
//! 4. optionally block on the reply pipe and evaluate what comes back.
//!
//! Two hidden helper commands do the per-field work; [`SnippetBuilder::prelude`]
//! declares them and must be sent once before any request.

pub mod escape;

use std::path::Path;

use crate::field::FieldSet;
use crate::registry::CorrelationId;
use crate::{BuddyError, Result};

use escape::{check_balanced, validate_bare_word, validate_command_name, validate_params};

/// Scratch buffer the JSON line is assembled in.
pub const SCRATCH_BUFFER: &str = "*buddy-expand*";

/// Helper appending one `,"key":"value"` pair; clobbers register `q`.
pub const KEY_VALUE_HELPER: &str = "buddy-json-key-value";

/// Helper escaping every value selection saved in register `p`.
pub const ESCAPE_HELPER: &str = "buddy-json-escape";

/// Builds target-side text for requests, declarations and replies.
#[derive(Debug, Clone)]
pub struct SnippetBuilder {
    fields: FieldSet,
    inbound: String,
    reply: String,
}

impl SnippetBuilder {
    /// Builder writing requests to `inbound` and reading replies from `reply`.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Encoding` when a pipe path cannot be typed into
    /// the target as a bare word.
    pub fn new(fields: FieldSet, inbound: &Path, reply: &Path) -> Result<Self> {
        let inbound = path_word(inbound)?;
        let reply = path_word(reply)?;
        Ok(Self {
            fields,
            inbound,
            reply,
        })
    }

    /// Field table requests are resolved against.
    #[must_use]
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Declarations of the hidden helper commands.
    #[must_use]
    pub fn prelude(&self) -> String {
        format!(
            r#"# mutates register q
def -hidden -override {KEY_VALUE_HELPER} -params 2 %{{
    reg q %arg{{2}}
    exec -buffer {SCRATCH_BUFFER} 'gea,"' %arg{{1}} '":"__"<esc>hh"q<a-R>"p<a-Z>a'
}}
# mutates register p
def -hidden -override {ESCAPE_HELPER} %{{
    try %{{ exec '"pzs["\\]<ret>i\<esc>' }}
    try %{{ exec '"pzs\n<ret>c\n<esc>' }}
    try %{{ exec '"pzs\t<ret>c\t<esc>' }}
    try %{{ exec '"pz;Ls.?\K_<ret>d' }}
}}"#
        )
    }

    /// Program writing the `requested` fields of correlation `id` as one
    /// JSON line to the inbound pipe.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Encoding` for a field the table does not declare.
    pub fn request(&self, id: CorrelationId, requested: &[String]) -> Result<String> {
        let mut pairs = Vec::with_capacity(requested.len());
        for name in requested {
            let spec = self.fields.require(name)?;
            let line = format!("{KEY_VALUE_HELPER} {name} {}", spec.expand(name));
            pairs.push(spec.embed(&line));
        }
        let pairs = pairs.join("\n    ");
        Ok(format!(
            r#"eval -draft -no-hooks %(
    edit -debug -scratch {SCRATCH_BUFFER}
    exec '%di{{"command":"{id}"'
)
eval -draft -no-hooks -save-regs pq %(
    reg p ''
    {pairs}
    eval -buffer {SCRATCH_BUFFER} %(
        {ESCAPE_HELPER}
        exec gea}}<esc>
        exec '%|cat>{inbound}<ret>'
        delete-buffer!
    )
)"#,
            inbound = self.inbound,
        ))
    }

    /// `snippet` followed by a blocking read of the reply pipe whose content
    /// is evaluated in place.
    #[must_use]
    pub fn with_reply(&self, snippet: &str) -> String {
        format!("{snippet}\neval %sh{{ cat {} }}", self.reply)
    }

    /// Run caller text ahead of `snippet`.
    ///
    /// `message` is evaluated at top level, never inside a `%(...)` block,
    /// so it may contain any parentheses.
    #[must_use]
    pub fn prefixed(message: &str, snippet: &str) -> String {
        format!("{message}\n{snippet}")
    }

    /// Persistent declaration of command `name` running `body`; replaces any
    /// earlier command of the same name.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Encoding` for an unsafe name, multi-line or
    /// unbalanced parameters, or an unbalanced body.
    pub fn declare(name: &str, params: &str, body: &str) -> Result<String> {
        validate_command_name(name)?;
        validate_params(params)?;
        check_balanced(body)?;
        let params = params.trim();
        let head = if params.is_empty() {
            format!("def -override {name}")
        } else {
            format!("def -override {name} {params}")
        };
        Ok(format!("{head} %(\n{body}\n)"))
    }
}

fn path_word(path: &Path) -> Result<String> {
    let word = path
        .to_str()
        .ok_or_else(|| BuddyError::Encoding(format!("non UTF-8 path: {}", path.display())))?;
    validate_bare_word(word)?;
    Ok(word.to_owned())
}
