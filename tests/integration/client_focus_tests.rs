//! Several clients sharing one session's pipes and registry.

use std::collections::{BTreeSet, HashSet};

use kak_buddy::{ClientFocus, Delivery};
use tokio::sync::mpsc;

use super::test_helpers::{start, SimulatedTarget, WAIT};

async fn clients_share_one_command(m: usize) {
    let (buddy, recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let id = buddy
        .def("buddy-who", "", &["client"], move |fields| {
            tx.send(fields.text("client").unwrap_or_default().to_owned())
                .ok();
        })
        .await
        .unwrap();

    let clients: Vec<_> = (0..m).map(|i| buddy.focus(format!("client{i}"))).collect();
    for client in &clients {
        client.msg("buddy-who").await.unwrap();
    }
    let focused: Vec<_> = recorder
        .sent()
        .into_iter()
        .filter(|s| s.text == "buddy-who")
        .map(|s| s.focus)
        .collect();
    assert_eq!(focused.len(), m);
    assert!(focused.iter().all(|f| f.delivery == Delivery::Required));

    // Each client runs the command; the target answers in its context.
    for client in &clients {
        let name = client.client().unwrap().to_owned();
        target.answer(id, &[("client", name.as_str())]).await;
    }

    let mut seen = BTreeSet::new();
    for _ in 0..m {
        let who = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert!(seen.insert(who), "each invocation dispatched once");
    }
    let expected: BTreeSet<_> = (0..m).map(|i| format!("client{i}")).collect();
    assert_eq!(seen, expected);
    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn two_clients() {
    clients_share_one_command(2).await;
}

#[tokio::test]
async fn four_clients() {
    clients_share_one_command(4).await;
}

#[tokio::test]
async fn six_clients() {
    clients_share_one_command(6).await;
}

#[tokio::test]
async fn eight_clients() {
    clients_share_one_command(8).await;
}

#[tokio::test]
async fn ids_are_global_across_clients() {
    let (buddy, recorder) = start().await;
    let a = buddy.focus("a");
    let b = buddy.focus_if_exists("b");

    let mut ids = HashSet::new();
    for _ in 0..3 {
        assert!(ids.insert(a.ask(&["buffile"]).await.unwrap().id()));
        assert!(ids.insert(b.ask(&["buffile"]).await.unwrap().id()));
    }
    assert_eq!(buddy.registry().len(), 6);

    let sent = recorder.sent();
    assert!(sent.iter().any(|s| s.focus == ClientFocus::required("a")));
    assert!(sent.iter().any(|s| s.focus == ClientFocus::if_exists("b")));
    buddy.teardown().await.unwrap();
}

#[tokio::test]
async fn focus_views_share_lifecycle() {
    let (buddy, _recorder) = start().await;
    let focused = buddy.focus("client0");
    assert_eq!(focused.session(), "test-session");
    assert_eq!(focused.client(), Some("client0"));
    assert_eq!(focused.unfocused().client(), None);
    assert_eq!(focused.inbound_path(), buddy.inbound_path());

    focused.teardown().await.unwrap();
    assert!(buddy.is_torn_down());
    buddy.teardown().await.unwrap();
}
