//! Whole-buffer content with cursor markers written by a reply command.
//!
//! The editor side is simulated with a one-line buffer that understands
//! `exec a|i <keys> <esc>` and runs `write-cursor` through the real pipes.

use kak_buddy::field::value::Cursor;
use kak_buddy::{Buddy, CorrelationId, Pos};

use super::test_helpers::{start, SimulatedTarget, WAIT};

/// Single-line buffer with a collapsed cursor, as a byte offset.
struct SimulatedBuffer {
    text: String,
    cursor: usize,
}

impl SimulatedBuffer {
    fn new() -> Self {
        Self {
            text: "\n".to_owned(),
            cursor: 0,
        }
    }

    fn selection_desc(&self) -> String {
        let column = u32::try_from(self.cursor + 1).unwrap();
        Cursor::new(Pos::new(1, column), Pos::new(1, column)).to_string()
    }

    /// Apply an `exec` line: the mode key, then keys concatenated up to
    /// `<esc>`, with `<space>` standing for a space.
    fn exec(&mut self, line: &str) {
        let mut args = line.strip_prefix("exec ").unwrap().split_whitespace();
        assert!(matches!(args.next(), Some("a" | "i")));
        let mut inserted = String::new();
        for key in args.take_while(|key| *key != "<esc>") {
            inserted.push_str(if key == "<space>" { " " } else { key });
        }
        self.text.insert_str(self.cursor, &inserted);
        self.cursor += inserted.len();
    }
}

/// Runs `script` line by line, sending `write-cursor` through the pipes and
/// applying the reply it gets back. Returns the replies in order.
async fn run_script(
    target: &SimulatedTarget,
    buffer: &mut SimulatedBuffer,
    write_cursor: CorrelationId,
    script: &str,
) -> Vec<String> {
    let mut replies = Vec::new();
    for line in script.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line == "write-cursor" {
            let desc = buffer.selection_desc();
            let reply = target
                .answer_and_read_reply(write_cursor, &[("selection_desc", desc.as_str())])
                .await;
            buffer.exec(&reply);
            replies.push(reply);
        } else {
            buffer.exec(line);
        }
    }
    replies
}

async fn define_write_cursor(buddy: &Buddy) -> CorrelationId {
    buddy
        .def_with_reply("write-cursor", "", &["selection_desc"], |fields| {
            Ok(format!("exec a {} <esc>", fields.cursor("selection_desc")?))
        })
        .await
        .unwrap()
}

/// `hello`, a space, then two cursor markers each describing where it was
/// written; the content comes back byte for byte.
#[tokio::test]
async fn content_carries_markers_at_exact_offsets() {
    let (buddy, recorder) = start().await;
    let target = SimulatedTarget::attach(&buddy);
    let write_cursor = define_write_cursor(&buddy).await;

    let script = "exec i hello <space> <esc>\nwrite-cursor\nexec a <space> <esc>\nwrite-cursor";
    buddy.msg(script).await.unwrap();
    assert_eq!(recorder.sent().last().unwrap().text, script);

    let mut buffer = SimulatedBuffer::new();
    let replies = run_script(&target, &mut buffer, write_cursor, script).await;
    assert_eq!(replies, ["exec a 1.7,1.7 <esc>", "exec a 1.15,1.15 <esc>"]);

    let request = buddy.ask(&["content"]).await.unwrap();
    assert!(recorder
        .sent()
        .last()
        .unwrap()
        .text
        .contains("eval -draft %(exec '%'; buddy-json-key-value content %val(selection))"));
    target
        .answer(request.id(), &[("content", buffer.text.as_str())])
        .await;

    let fields = tokio::time::timeout(WAIT, request.wait())
        .await
        .unwrap()
        .unwrap();
    let content = fields.text("content").unwrap();
    assert_eq!(content, "hello 1.7,1.7 1.15,1.15\n");
    assert_eq!(&content[..6], "hello ");
    assert_eq!(content[6..13].parse::<Cursor>(), Ok(Cursor::new(Pos::new(1, 7), Pos::new(1, 7))));
    assert_eq!(&content[13..14], " ");
    assert_eq!(
        content[14..23].parse::<Cursor>(),
        Ok(Cursor::new(Pos::new(1, 15), Pos::new(1, 15)))
    );

    // The command is persistent: it is still registered after two calls.
    assert!(buddy.registry().contains(write_cursor));

    buddy.teardown().await.unwrap();
}
