//! Named pipes shared with the target session.
//!
//! Each runtime instance owns a private temporary directory holding two
//! FIFOs:
//! - `fifo`: the target appends one JSON line per answered request.
//! - `replyfifo`: the host appends reply text for synchronous requests.
//!
//! Submodules:
//! - `codec`: line framing for the inbound pipe.
//! - `reader`: the task reading `fifo` and dispatching into the registry.
//! - `reply`: non-blocking appends to `replyfifo`.

pub mod codec;
pub mod reader;
pub mod reply;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use nix::sys::stat::Mode;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::ChannelConfig;
use crate::{BuddyError, Result};

const INBOUND_NAME: &str = "fifo";
const REPLY_NAME: &str = "replyfifo";

/// The pair of pipes and the directory holding them.
///
/// Dropping a `Channels` removes the directory; [`Channels::teardown`] does
/// so explicitly and reports failures.
#[derive(Debug)]
pub struct Channels {
    dir: Mutex<Option<TempDir>>,
    inbound: PathBuf,
    reply: PathBuf,
}

impl Channels {
    /// Create a fresh directory named after `config.temp_prefix` and both
    /// pipes inside it, readable and writable by the owner only.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Transport` if the directory or a pipe cannot be
    /// created.
    pub fn create(config: &ChannelConfig) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", config.temp_prefix))
            .tempdir()
            .map_err(|e| BuddyError::Transport(format!("cannot create channel directory: {e}")))?;
        let inbound = dir.path().join(INBOUND_NAME);
        let reply = dir.path().join(REPLY_NAME);
        make_fifo(&inbound)?;
        make_fifo(&reply)?;
        info!(dir = %dir.path().display(), "channels created");
        Ok(Self {
            dir: Mutex::new(Some(dir)),
            inbound,
            reply,
        })
    }

    /// Pipe the target writes answers to.
    #[must_use]
    pub fn inbound(&self) -> &Path {
        &self.inbound
    }

    /// Pipe the target reads replies from.
    #[must_use]
    pub fn reply(&self) -> &Path {
        &self.reply
    }

    /// Whether [`Self::teardown`] already ran.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.dir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_none()
    }

    /// Remove both pipes and their directory. Returns `false` when already
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Io` if a pipe or the directory cannot be removed.
    pub fn teardown(&self) -> Result<bool> {
        let Some(dir) = self
            .dir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        else {
            return Ok(false);
        };
        for path in [&self.inbound, &self.reply] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(BuddyError::Io(format!(
                        "cannot remove {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        let shown = dir.path().display().to_string();
        dir.close()
            .map_err(|e| BuddyError::Io(format!("cannot remove {shown}: {e}")))?;
        debug!(dir = shown, "channels removed");
        Ok(true)
    }
}

fn make_fifo(path: &Path) -> Result<()> {
    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR)
        .map_err(|e| BuddyError::Transport(format!("mkfifo {}: {e}", path.display())))
}
