//! Correlation of concurrent requests and handler firing rules.

use std::collections::HashSet;

use kak_buddy::snippet::escape::encode_line;
use tokio::sync::mpsc;

use super::test_helpers::{start, SimulatedTarget, WAIT};

/// Deterministic shuffle: `i -> (7i + 3) mod n` is a permutation for every
/// `n` coprime with 7.
fn shuffled(n: usize) -> Vec<usize> {
    (0..n).map(|i| (7 * i + 3) % n).collect()
}

async fn concurrent_requests_resolve_to_their_own_data(n: usize) {
    let (buddy, _recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);

    let mut requests = Vec::with_capacity(n);
    for _ in 0..n {
        requests.push(buddy.ask(&["buffile"]).await.unwrap());
    }
    let ids: HashSet<_> = requests.iter().map(kak_buddy::Request::id).collect();
    assert_eq!(ids.len(), n, "correlation ids must be unique");

    // All answers in one write, out of order.
    let mut batch = String::new();
    for i in shuffled(n) {
        let file = format!("/file-{i}");
        batch.push_str(&encode_line(
            &requests[i].id().to_string(),
            &[("buffile", file.as_str())],
        ));
    }
    target.write(&batch).await;

    for (i, request) in requests.into_iter().enumerate() {
        let fields = tokio::time::timeout(WAIT, request.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fields.text("buffile").unwrap(), format!("/file-{i}"));
    }
    assert!(buddy.registry().is_empty());
    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn four_concurrent_requests() {
    concurrent_requests_resolve_to_their_own_data(4).await;
}

#[tokio::test]
async fn eight_concurrent_requests() {
    concurrent_requests_resolve_to_their_own_data(8).await;
}

#[tokio::test]
async fn twelve_concurrent_requests() {
    concurrent_requests_resolve_to_their_own_data(12).await;
}

#[tokio::test]
async fn sixteen_concurrent_requests() {
    concurrent_requests_resolve_to_their_own_data(16).await;
}

#[tokio::test]
async fn one_shot_reply_handler_fires_once() {
    let (buddy, _recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let request = buddy
        .ask_with_reply(&["cursor_line"], move |fields| {
            tx.send(fields.integer("cursor_line")?).ok();
            Ok("nop".into())
        })
        .await
        .unwrap();
    let id = request.id();

    let reply = target.answer_and_read_reply(id, &[("cursor_line", "4")]).await;
    assert_eq!(reply, "nop");
    // Duplicate line for the same id is dropped.
    target.answer(id, &[("cursor_line", "5")]).await;

    tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rx.recv().await, Some(4));
    assert!(rx.recv().await.is_none(), "handler dropped after firing once");
    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn persistent_command_fires_per_invocation() {
    let (buddy, recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let id = buddy
        .def("buddy-count", "-params 1", &["1"], move |fields| {
            let arg = fields.text("1").unwrap_or_default().to_owned();
            tx.send(arg).ok();
        })
        .await
        .unwrap();
    assert!(recorder
        .sent()
        .last()
        .unwrap()
        .text
        .starts_with("def -override buddy-count -params 1 %(\n"));

    for arg in ["a", "b", "c"] {
        target.answer(id, &[("1", arg)]).await;
    }
    for expected in ["a", "b", "c"] {
        let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(got, expected);
    }
    assert!(buddy.registry().contains(id));
    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn redefinition_replaces_handler() {
    let (buddy, _recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let first_tx = tx.clone();
    let first = buddy
        .def("buddy-x", "", &[], move |_| {
            first_tx.send("first").ok();
        })
        .await
        .unwrap();
    let second = buddy
        .def("buddy-x", "", &[], move |_| {
            tx.send("second").ok();
        })
        .await
        .unwrap();
    assert_ne!(first, second);
    assert!(!buddy.registry().contains(first));

    target.answer(first, &[]).await;
    target.answer(second, &[]).await;
    let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, "second");
    buddy.teardown().await.unwrap();
}
