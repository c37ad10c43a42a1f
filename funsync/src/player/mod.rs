//! Player process lifecycle and the playback feed
//!
//! Runs mpv as a child process with its JSON IPC socket enabled, observes
//! the playback position and idle state, and converts them into ticks for
//! the synchronization session. Keeping the player out of process means no
//! media handling happens in this crate at all.

pub mod ipc;

use crate::error::{Error, Result};
use ipc::{MpvEvent, MpvIpc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Observe ids for the subscribed mpv properties
const TIME_POS_ID: u64 = 1;
const CORE_IDLE_ID: u64 = 2;

/// A running mpv instance and its IPC connection
pub struct Player {
    child: Child,
    ipc: MpvIpc,
    socket_path: PathBuf,
}

impl Player {
    /// Spawn mpv for `video` and connect to its IPC socket
    pub async fn launch(mpv_path: &str, video: &Path) -> Result<Self> {
        let socket_path =
            std::env::temp_dir().join(format!("funsync-mpv-{}.sock", std::process::id()));
        // A stale socket from an earlier crash would block mpv from binding
        let _ = std::fs::remove_file(&socket_path);

        let child = Command::new(mpv_path)
            .arg(format!("--input-ipc-server={}", socket_path.display()))
            .arg(video)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Player(format!("cannot launch {}: {}", mpv_path, e)))?;
        info!("Launched {} for {}", mpv_path, video.display());

        let ipc = MpvIpc::connect(&socket_path).await?;
        Ok(Self {
            child,
            ipc,
            socket_path,
        })
    }

    /// Observe playback and feed ticks until the player exits
    ///
    /// The callback receives `(position_secs, is_idle)`:
    /// - every position change while playing ticks with the new timestamp
    ///   and the current idle flag
    /// - entering idle (pause, seek-in-progress, stop) ticks once with an
    ///   absent position and `is_idle` true
    pub async fn run(mut self, mut on_tick: impl FnMut(Option<f64>, bool)) -> Result<()> {
        self.ipc.observe_property(TIME_POS_ID, "time-pos").await?;
        self.ipc.observe_property(CORE_IDLE_ID, "core-idle").await?;

        let mut core_idle = false;
        while let Some(event) = self.ipc.next_event().await? {
            match event {
                MpvEvent::PropertyChange {
                    observe_id: TIME_POS_ID,
                    data,
                } => {
                    let position = data.as_ref().and_then(|d| d.as_f64());
                    on_tick(position, core_idle);
                }
                MpvEvent::PropertyChange {
                    observe_id: CORE_IDLE_ID,
                    data,
                } => {
                    core_idle = data.as_ref().and_then(|d| d.as_bool()).unwrap_or(false);
                    if core_idle {
                        on_tick(None, true);
                    }
                }
                MpvEvent::PropertyChange { .. } => {}
                MpvEvent::Shutdown => {
                    debug!("mpv sent shutdown");
                    break;
                }
            }
        }

        info!("Closing mpv...");
        self.wait_for_exit().await;
        Ok(())
    }

    /// Reap mpv, killing it if it lingers past a short grace period
    async fn wait_for_exit(&mut self) {
        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(Ok(status)) => debug!("mpv exited with {}", status),
            Ok(Err(e)) => warn!("Cannot reap mpv: {}", e),
            Err(_) => {
                warn!("mpv did not exit, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!("Cannot kill mpv: {}", e);
                }
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // The child itself is covered by kill_on_drop
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
