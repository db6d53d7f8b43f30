//! Unit tests for snippet escaping and name validation.

use kak_buddy::snippet::escape::{
    check_balanced, encode_line, escape_json_value, quote, validate_bare_word,
    validate_command_name, validate_field_name, validate_params,
};
use kak_buddy::BuddyError;

#[test]
fn quote_doubles_single_quotes() {
    assert_eq!(quote("plain"), "'plain'");
    assert_eq!(quote("it's"), "'it''s'");
    assert_eq!(quote("''"), "''''''");
}

#[test]
fn json_escape_handles_backslash_quote_newline_tab() {
    assert_eq!(escape_json_value(r#"a\b"#), r#"a\\b"#);
    assert_eq!(escape_json_value(r#"say "hi""#), r#"say \"hi\""#);
    assert_eq!(escape_json_value("l1\nl2"), r"l1\nl2");
    assert_eq!(escape_json_value("a\tb"), r"a\tb");
    assert_eq!(escape_json_value("c{}d|'"), "c{}d|'");
}

#[test]
fn encoded_line_is_valid_json_with_command_first() {
    let line = encode_line("7", &[("buffile", "/tmp/a \"b\".txt")]);
    assert!(line.starts_with(r#"{"command":"7","#));
    assert!(line.ends_with("}\n"));
    let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(value["buffile"], "/tmp/a \"b\".txt");
}

#[test]
fn encoded_line_without_fields() {
    assert_eq!(encode_line("0", &[]), "{\"command\":\"0\"}\n");
}

#[test]
fn balanced_parentheses_accepted() {
    assert!(check_balanced("").is_ok());
    assert!(check_balanced("eval %(exec '%(x)')").is_ok());
}

#[test]
fn unbalanced_parentheses_rejected() {
    assert!(matches!(check_balanced("(("), Err(BuddyError::Encoding(_))));
    assert!(matches!(check_balanced(")("), Err(BuddyError::Encoding(_))));
}

#[test]
fn field_names_restricted() {
    assert!(validate_field_name("buffile").is_ok());
    assert!(validate_field_name("cursor_line").is_ok());
    assert!(validate_field_name("1").is_ok());
    assert!(validate_field_name("command").is_err());
    assert!(validate_field_name("").is_err());
    assert!(validate_field_name("has space").is_err());
    assert!(validate_field_name("quote\"").is_err());
}

#[test]
fn command_names_restricted() {
    assert!(validate_command_name("buddy-cursor").is_ok());
    assert!(validate_command_name("evil; rm").is_err());
    assert!(validate_command_name("").is_err());
}

#[test]
fn bare_words_allow_paths_only() {
    assert!(validate_bare_word("/tmp/kak-buddy-Ab12/fifo").is_ok());
    assert!(validate_bare_word("/tmp/with space/fifo").is_err());
    assert!(validate_bare_word("/tmp/<ret>").is_err());
    assert!(validate_bare_word("%sh{x}").is_err());
}

#[test]
fn params_single_line_and_balanced() {
    assert!(validate_params("-params 0..1 -docstring 'show (cursor)'").is_ok());
    assert!(validate_params("-params 1\n-hidden").is_err());
    assert!(validate_params("-docstring 'oops ('").is_err());
}
