//! Escaping and validation for text embedded in snippets.
//!
//! Everything here is pure. The target-side JSON escape runs inside the
//! target as editing commands; [`escape_json_value`] and [`encode_line`]
//! reproduce its output on the host so the wire format can be checked
//! without a running session.

use crate::{BuddyError, Result};

/// Field name reserved for the correlation id.
pub const COMMAND_KEY: &str = "command";

/// Quote `text` as a single-quoted target string.
///
/// Inside single quotes the target only treats `'` specially, and a doubled
/// `''` stands for one quote.
#[must_use]
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Escape a value the way the target-side escape helper does.
///
/// Backslash and double quote get a backslash prefix, newline and tab
/// become `\n` and `\t`. Other control characters pass through unchanged,
/// which a JSON parser rejects.
#[must_use]
pub fn escape_json_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// The complete line the target writes for `command` carrying `values`.
#[must_use]
pub fn encode_line(command: &str, values: &[(&str, &str)]) -> String {
    let mut line = format!("{{\"{COMMAND_KEY}\":\"{command}\"");
    for (key, value) in values {
        line.push_str(&format!(",\"{key}\":\"{}\"", escape_json_value(value)));
    }
    line.push_str("}\n");
    line
}

/// Check that `text` can sit inside a `%(...)` block.
///
/// The target nests `%(` blocks by counting parentheses, so an unbalanced
/// payload would end the block early or swallow what follows.
///
/// # Errors
///
/// Returns `BuddyError::Encoding` when the parentheses do not balance.
pub fn check_balanced(text: &str) -> Result<()> {
    let mut depth: usize = 0;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    BuddyError::Encoding(format!("unbalanced `)` in {text:?}"))
                })?;
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(BuddyError::Encoding(format!(
            "{depth} unclosed `(` in {text:?}"
        )))
    }
}

/// Field names are JSON keys and key-typed text, so `[A-Za-z0-9_-]` only.
///
/// # Errors
///
/// Returns `BuddyError::Encoding` for empty, reserved or unsafe names.
pub fn validate_field_name(name: &str) -> Result<()> {
    if name == COMMAND_KEY {
        return Err(BuddyError::Encoding(format!(
            "field name `{COMMAND_KEY}` is reserved"
        )));
    }
    validate_identifier("field name", name)
}

/// Command names become target command declarations: `[A-Za-z0-9_-]`.
///
/// # Errors
///
/// Returns `BuddyError::Encoding` for empty or unsafe names.
pub fn validate_command_name(name: &str) -> Result<()> {
    validate_identifier("command name", name)
}

/// A bare word (such as a pipe path) typed into the target's key language.
///
/// Whitespace, `<`, quotes, `%` and parentheses would all change meaning.
///
/// # Errors
///
/// Returns `BuddyError::Encoding` when `word` contains any of them.
pub fn validate_bare_word(word: &str) -> Result<()> {
    let ok = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+'));
    if ok {
        Ok(())
    } else {
        Err(BuddyError::Encoding(format!(
            "cannot embed {word:?} as a bare word"
        )))
    }
}

/// Command parameter declarations (`-params 1`, `-docstring ...`) go on the
/// declaration line ahead of the `%(` body.
///
/// # Errors
///
/// Returns `BuddyError::Encoding` for multi-line or unbalanced parameters.
pub fn validate_params(params: &str) -> Result<()> {
    if params.contains(['\n', '\r']) {
        return Err(BuddyError::Encoding(format!(
            "command parameters must be one line: {params:?}"
        )));
    }
    check_balanced(params)
}

fn validate_identifier(what: &str, name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(BuddyError::Encoding(format!("invalid {what}: {name:?}")))
    }
}
