//! Requests answered through the real inbound pipe.

use kak_buddy::channel::codec::MAX_LINE_BYTES;
use kak_buddy::snippet::escape::encode_line;
use kak_buddy::{BuddyError, RequestState};

use super::test_helpers::{start, SimulatedTarget, WAIT};

#[tokio::test]
async fn ask_completes_with_decoded_fields() {
    let (buddy, recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);

    let request = buddy.ask(&["buffile", "cursor_line"]).await.unwrap();
    assert_eq!(request.state(), RequestState::Sent);
    let sent = recorder.sent();
    assert!(sent
        .last()
        .unwrap()
        .text
        .contains(&format!("\"command\":\"{}\"", request.id())));

    target
        .answer(request.id(), &[("buffile", "/tmp/a 'b'.txt"), ("cursor_line", "3")])
        .await;
    let fields = tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fields.text("buffile").unwrap(), "/tmp/a 'b'.txt");
    assert_eq!(fields.integer("cursor_line").unwrap(), 3);
    assert!(buddy.registry().is_empty());

    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn awkward_values_survive_the_pipe() {
    let (buddy, _recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);
    let samples = ["c:d", "c|d", "c'd", "c\"d", "c\\d", "'\"\\:|", "c{}d", "a\nb\tc"];

    for sample in samples {
        let request = buddy.ask(&["selection"]).await.unwrap();
        target.answer(request.id(), &[("selection", sample)]).await;
        let fields = tokio::time::timeout(WAIT, request.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fields.text("selection").unwrap(), sample);
    }

    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn reader_survives_garbage_and_unknown_ids() {
    let (buddy, _recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);

    let request = buddy.ask(&["filetype"]).await.unwrap();
    target.write("this is not json\n").await;
    target.write("{\"command\":\"999999\"}\n").await;
    target.write("\n").await;
    target.answer(request.id(), &[("filetype", "rust")]).await;

    let fields = tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fields.text("filetype").unwrap(), "rust");

    buddy.teardown().await.unwrap();
}

/// A line that is not UTF-8 is skipped; an answer batched behind it in the
/// same write still settles its request.
#[tokio::test]
async fn invalid_utf8_line_does_not_drop_batched_answer() {
    let (buddy, _recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);

    let request = buddy.ask(&["buffile"]).await.unwrap();
    let mut batch = b"{\"command\":\"x\xff\"}\n".to_vec();
    batch.extend_from_slice(encode_line(&request.id().to_string(), &[("buffile", "/a")]).as_bytes());
    target.write_bytes(&batch).await;

    let fields = tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fields.text("buffile").unwrap(), "/a");

    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn over_long_line_does_not_drop_batched_answer() {
    let (buddy, _recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);

    let request = buddy.ask(&["filetype"]).await.unwrap();
    let mut batch = vec![b'x'; MAX_LINE_BYTES + 16];
    batch.push(b'\n');
    batch.extend_from_slice(encode_line(&request.id().to_string(), &[("filetype", "rust")]).as_bytes());
    target.write_bytes(&batch).await;

    let fields = tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fields.text("filetype").unwrap(), "rust");

    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn missing_field_errors_the_request() {
    let (buddy, _recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);

    let request = buddy.ask(&["buffile"]).await.unwrap();
    target.answer(request.id(), &[]).await;
    let err = tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, BuddyError::MissingField("buffile".into()));

    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn msg_and_then_completes_without_fields() {
    let (buddy, recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);

    let request = buddy.msg_and_then("exec ihello<esc>").await.unwrap();
    assert!(recorder.sent().last().unwrap().text.starts_with("exec ihello<esc>\n"));
    target.answer(request.id(), &[]).await;
    let fields = tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(fields.is_empty());

    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn msg_and_ask_accepts_unbalanced_parentheses() {
    let (buddy, recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);

    let request = buddy
        .msg_and_ask("exec 'i:)<esc>'", &["buffile"])
        .await
        .unwrap();
    assert!(recorder.sent().last().unwrap().text.starts_with("exec 'i:)<esc>'\n"));
    target.answer(request.id(), &[("buffile", "/b")]).await;
    let fields = tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fields.text("buffile").unwrap(), "/b");

    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn undeclared_field_sends_nothing() {
    let (buddy, recorder) = start().await;
    let before = recorder.count();
    let err = buddy.ask(&["no_such_field"]).await.unwrap_err();
    assert!(matches!(err, BuddyError::Encoding(_)));
    assert_eq!(recorder.count(), before);
    assert!(buddy.registry().is_empty());
    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn failed_send_removes_entry() {
    let (buddy, recorder) = start().await;
    recorder.set_failing(true);
    let err = buddy.ask(&["buffile"]).await.unwrap_err();
    assert!(matches!(err, BuddyError::Transport(_)));
    assert!(buddy.registry().is_empty());
    recorder.set_failing(false);
    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn msg_sends_text_verbatim() {
    let (buddy, recorder) = start().await;
    buddy.msg("echo -markup {Information}hi").await.unwrap();
    assert_eq!(
        recorder.sent().last().unwrap().text,
        "echo -markup {Information}hi"
    );
    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn init_sends_helper_prelude_first() {
    let (buddy, recorder) = start().await;
    let first = &recorder.sent()[0];
    assert!(first.text.contains("buddy-json-key-value"));
    assert!(first.text.contains("buddy-json-escape"));
    buddy.teardown().await.unwrap();
}
