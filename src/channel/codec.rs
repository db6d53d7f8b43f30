//! Newline codec for the inbound pipe.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! runaway writer cannot make the reader buffer without bound. A single
//! physical read may carry several lines; the codec yields them one by one
//! in arrival order and buffers a trailing partial line until its newline
//! arrives.
//!
//! A line that is too long or not UTF-8 comes out as
//! [`InboundFrame::Rejected`] rather than as a decode error. A decode error
//! ends a [`FramedRead`](tokio_util::codec::FramedRead) stream, and with it
//! every line still buffered from the same read.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{BuddyError, Result};

/// Maximum inbound line length: 1 MiB.
///
/// Longer lines decode to [`InboundFrame::Rejected`] with
/// `"line too long"`; the codec then discards input up to the next newline
/// and carries on.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A complete UTF-8 line, without its newline.
    Line(String),
    /// A line that could not be framed, with the reason.
    Rejected(String),
}

/// UTF-8 line codec with a [`MAX_LINE_BYTES`] limit.
///
/// # Examples
///
/// ```rust,ignore
/// use tokio_util::codec::FramedRead;
/// use kak_buddy::channel::codec::LineCodec;
///
/// let frames = FramedRead::new(receiver, LineCodec::new());
/// ```
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    /// Codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = InboundFrame;
    type Error = BuddyError;

    /// Next complete line from `src`.
    ///
    /// `Ok(None)` while only a partial line is buffered. Only I/O failures
    /// are returned as errors.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        frame(self.0.decode(src))
    }

    /// Final unterminated line when the writer closes.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        frame(self.0.decode_eof(src))
    }
}

fn frame(
    decoded: std::result::Result<Option<String>, LinesCodecError>,
) -> Result<Option<InboundFrame>> {
    match decoded {
        Ok(line) => Ok(line.map(InboundFrame::Line)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(InboundFrame::Rejected(format!(
            "line too long: exceeded {MAX_LINE_BYTES} bytes"
        )))),
        Err(LinesCodecError::Io(io_err)) if io_err.kind() == std::io::ErrorKind::InvalidData => {
            Ok(Some(InboundFrame::Rejected(format!("invalid utf-8: {io_err}"))))
        }
        Err(LinesCodecError::Io(io_err)) => Err(BuddyError::Io(io_err.to_string())),
    }
}
