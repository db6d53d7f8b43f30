//! Unit tests for `BuddyConfig` parsing, defaults and validation.

use std::time::Duration;

use kak_buddy::{BuddyConfig, BuddyError, ChannelConfig};

fn full_toml() -> &'static str {
    r#"
session = "main"
client = "client0"
kak_binary = "/usr/local/bin/kak"

[channel]
reply_timeout_seconds = 3
reply_poll_millis = 20
reopen_backoff_millis = 50
log_preview_chars = 40
temp_prefix = "buddy_test"
"#
}

#[test]
fn parses_full_config() {
    let config = BuddyConfig::from_toml_str(full_toml()).expect("valid config");
    assert_eq!(config.session, "main");
    assert_eq!(config.client.as_deref(), Some("client0"));
    assert_eq!(config.kak_binary, "/usr/local/bin/kak");
    assert_eq!(config.channel.reply_timeout(), Some(Duration::from_secs(3)));
    assert_eq!(config.channel.reply_poll(), Duration::from_millis(20));
    assert_eq!(config.channel.reopen_backoff(), Duration::from_millis(50));
    assert_eq!(config.channel.log_preview_chars, 40);
    assert_eq!(config.channel.temp_prefix, "buddy_test");
}

#[test]
fn minimal_config_uses_defaults() {
    let config = BuddyConfig::from_toml_str("session = \"s\"").expect("valid config");
    assert_eq!(config, BuddyConfig::for_session("s"));
    assert_eq!(config.kak_binary, "kak");
    assert!(config.client.is_none());
    assert_eq!(config.channel, ChannelConfig::default());
    assert_eq!(config.channel.reply_timeout(), Some(Duration::from_secs(10)));
}

#[test]
fn zero_reply_timeout_means_unbounded() {
    let config = BuddyConfig::from_toml_str(
        "session = \"s\"\n[channel]\nreply_timeout_seconds = 0\n",
    )
    .expect("valid config");
    assert_eq!(config.channel.reply_timeout(), None);
}

#[test]
fn missing_session_is_rejected() {
    let err = BuddyConfig::from_toml_str("client = \"c\"").unwrap_err();
    assert!(matches!(err, BuddyError::Config(_)));
}

#[test]
fn invalid_values_are_rejected() {
    let cases = [
        "session = \"\"",
        "session = \"two words\"",
        "session = \"s\"\nclient = \"\"",
        "session = \"s\"\nkak_binary = \" \"",
        "session = \"s\"\n[channel]\nreply_poll_millis = 0",
        "session = \"s\"\n[channel]\nlog_preview_chars = 0",
        "session = \"s\"\n[channel]\ntemp_prefix = \"../escape\"",
    ];
    for raw in cases {
        let err = BuddyConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, BuddyError::Config(_)), "accepted {raw:?}");
    }
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kak-buddy.toml");
    std::fs::write(&path, full_toml()).expect("write config");
    let config = BuddyConfig::load_from_path(&path).expect("load");
    assert_eq!(config.session, "main");
}

#[test]
fn load_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = BuddyConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().starts_with("config: failed to read config"));
}
