//! Command bus between the playback feed and the device manager
//!
//! Single producer (the playback session), single consumer (the device
//! manager). Sends never block, so the playback feed can never be stalled
//! by a slow or dead device task. The consumer's timed receive doubles as
//! the keep-alive timer: a timeout means "nothing new arrived, resend the
//! last instruction".

use std::time::Duration;
use tokio::sync::mpsc;

/// Message carried from the playback session to the device manager
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandMessage {
    /// New instruction to dispatch to all devices
    Value {
        /// Playback position that produced the instruction, in milliseconds
        position_ms: f64,
        /// Normalized instruction in `[0, 1]`
        instruction: f64,
    },
    /// Playback went idle; devices should drop to rest
    Stop,
    /// Orderly end of the session; the consumer disconnects and exits
    Shutdown,
}

/// Outcome of a timed receive on the bus
#[derive(Debug)]
pub enum BusRecv {
    /// A message arrived within the timeout
    Message(CommandMessage),
    /// Nothing arrived; time to resend the last instruction
    TimedOut,
    /// The producer dropped without sending `Shutdown`
    Closed,
}

/// Producer half of the bus
///
/// Sending on a closed bus is silently ignored: the device subsystem being
/// gone must not affect playback.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<CommandMessage>,
}

impl CommandSender {
    /// Push a message without blocking
    pub fn send(&self, message: CommandMessage) {
        let _ = self.tx.send(message);
    }
}

/// Consumer half of the bus
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<CommandMessage>,
}

impl CommandReceiver {
    /// Wait up to `timeout` for the next message
    pub async fn recv_timeout(&mut self, timeout: Duration) -> BusRecv {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => BusRecv::Message(message),
            Ok(None) => BusRecv::Closed,
            Err(_) => BusRecv::TimedOut,
        }
    }
}

/// Create a connected sender/receiver pair
///
/// The queue is unbounded: instructions are small and the consumer drains
/// them faster than a playback feed produces them, so depth stays shallow
/// while no distinct instruction is ever dropped.
pub fn channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, CommandReceiver { rx })
}
