//! mpv JSON IPC client
//!
//! mpv exposes a newline-delimited JSON protocol on the socket passed via
//! `--input-ipc-server`. Commands carry a `request_id`; replies echo it
//! together with an `error` status string; asynchronous events carry an
//! `event` key instead. Only property-change and shutdown events matter
//! here, everything else is skipped.

use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Retry pacing while mpv creates its socket at startup
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const CONNECT_ATTEMPTS: u32 = 50;

/// Decoded asynchronous mpv event
#[derive(Debug, Clone, PartialEq)]
pub enum MpvEvent {
    /// An observed property changed; `data` is absent while the property
    /// is unavailable (e.g. no timestamp during a seek)
    PropertyChange {
        observe_id: u64,
        data: Option<Value>,
    },
    /// mpv is quitting
    Shutdown,
}

/// One IPC connection to a running mpv
pub struct MpvIpc {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl MpvIpc {
    /// Connect to mpv's IPC socket, retrying while the player starts up
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let mut attempts = 0;
        let stream = loop {
            match UnixStream::connect(socket_path).await {
                Ok(stream) => break stream,
                Err(e) => {
                    attempts += 1;
                    if attempts >= CONNECT_ATTEMPTS {
                        return Err(Error::Player(format!(
                            "cannot reach mpv IPC socket {}: {}",
                            socket_path.display(),
                            e
                        )));
                    }
                    tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                }
            }
        };
        debug!("Connected to mpv IPC at {}", socket_path.display());

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
            next_request_id: 0,
        })
    }

    /// Subscribe to property-change events for `property`
    ///
    /// Matching events will carry `observe_id`.
    pub async fn observe_property(&mut self, observe_id: u64, property: &str) -> Result<()> {
        self.command(json!(["observe_property", observe_id, property]))
            .await
    }

    /// Send one command; its reply is consumed (and checked) by
    /// `next_event`
    async fn command(&mut self, args: Value) -> Result<()> {
        self.next_request_id += 1;
        let request = json!({ "command": args, "request_id": self.next_request_id });
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Player(format!("cannot write to mpv: {}", e)))
    }

    /// Next decoded event, or `None` once mpv closed the socket
    pub async fn next_event(&mut self) -> Result<Option<MpvEvent>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| Error::Player(format!("mpv IPC read failed: {}", e)))?;
            let Some(line) = line else {
                return Ok(None);
            };
            if line.is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Ignoring malformed mpv message: {}", e);
                    continue;
                }
            };

            if value.get("event").is_some() {
                match decode_event(&value) {
                    Some(event) => return Ok(Some(event)),
                    None => continue,
                }
            }

            // Not an event: a command reply. Failures are logged, never
            // fatal; a rejected observe shows up as missing ticks anyway.
            if let Some(error) = value.get("error").and_then(Value::as_str) {
                if error != "success" {
                    warn!(
                        "mpv rejected command {:?}: {}",
                        value.get("request_id"),
                        error
                    );
                }
                continue;
            }

            debug!("Unhandled mpv message: {}", value);
        }
    }
}

/// Decode the events this client reacts to; `None` for all others
fn decode_event(value: &Value) -> Option<MpvEvent> {
    match value.get("event").and_then(Value::as_str)? {
        "property-change" => {
            let observe_id = value.get("id").and_then(Value::as_u64)?;
            let data = value.get("data").filter(|d| !d.is_null()).cloned();
            Some(MpvEvent::PropertyChange { observe_id, data })
        }
        "shutdown" => Some(MpvEvent::Shutdown),
        _ => None,
    }
}
