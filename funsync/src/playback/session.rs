//! Per-playback synchronization session
//!
//! Consumes position/idle ticks from the player feed, tracks the timeline
//! cursor, and pushes instruction updates onto the command bus. The session
//! is purely reactive: it never blocks, holds no timer, and does no I/O
//! beyond the non-blocking bus push, so it is safe to call from the feed's
//! event loop at tick rate.

use crate::bus::{CommandMessage, CommandSender};
use crate::playback::InstructionMap;
use crate::script::ActionTimeline;
use std::sync::Arc;
use tracing::{debug, info};

/// State machine driven by player ticks
///
/// One session per playback. All cursor state lives here; the timeline
/// itself is shared and immutable.
pub struct SyncSession {
    timeline: Arc<ActionTimeline>,
    map: InstructionMap,
    /// Position delta between consecutive ticks above which playback is
    /// treated as discontinuous (seek), in milliseconds
    jump_threshold_ms: f64,
    bus: CommandSender,

    /// True before the first active tick and again after an idle edge
    idle: bool,
    /// Timeline index returned by the previous lookup (the cursor hint)
    last_index: Option<usize>,
    last_position_ms: Option<f64>,
    last_instruction: Option<f64>,
    /// Position at which the active action last changed
    previous_change_position_ms: Option<f64>,
    /// Index that was active before the last action change; interpolation
    /// ramps from its instruction toward the current one
    previous_changed_index: Option<usize>,
}

impl SyncSession {
    pub fn new(
        timeline: Arc<ActionTimeline>,
        map: InstructionMap,
        jump_threshold_ms: f64,
        bus: CommandSender,
    ) -> Self {
        Self {
            timeline,
            map,
            jump_threshold_ms,
            bus,
            idle: true,
            last_index: None,
            last_position_ms: None,
            last_instruction: None,
            previous_change_position_ms: None,
            previous_changed_index: None,
        }
    }

    /// Feed one player tick into the session
    ///
    /// `position_secs` is the playback position, absent while the player
    /// has no timestamp (startup, seeking, stopped). An absent position and
    /// an explicit idle flag are treated identically.
    pub fn on_tick(&mut self, position_secs: Option<f64>, is_idle: bool) {
        let position_ms = match position_secs {
            Some(secs) if !is_idle => secs * 1000.0,
            _ => {
                self.enter_idle();
                return;
            }
        };

        let jumped = match self.last_position_ms {
            Some(last) => (position_ms - last).abs() > self.jump_threshold_ms,
            None => false,
        };
        if jumped {
            info!("Detected playback jump to {:.0} ms", position_ms);
        }

        let (index, current) = self.timeline.lookup(position_ms, self.last_index, jumped);
        let next = self.timeline.get(index + 1);
        // The previous action only participates once a previous lookup
        // exists; after an idle reset interpolation restarts from scratch
        let previous_changed = match (self.last_index, self.previous_changed_index) {
            (Some(_), Some(previous)) => self.timeline.get(previous),
            _ => None,
        };

        let instruction = self.map.compute(previous_changed, current, next, position_ms);

        // Coalesce: only a changed instruction (or the first after a reset)
        // is worth a bus message
        if self.last_index.is_none() || Some(instruction) != self.last_instruction {
            self.bus.send(CommandMessage::Value {
                position_ms,
                instruction,
            });
        }

        if self.last_index != Some(index) {
            match self.previous_change_position_ms {
                Some(previous_ms) => debug!(
                    "Action {:?} -> {} at {:.0} ms ({:.0} ms since previous change)",
                    self.last_index,
                    index,
                    position_ms,
                    position_ms - previous_ms
                ),
                None => debug!("Action {:?} -> {} at {:.0} ms", self.last_index, index, position_ms),
            }
            self.previous_changed_index = self.last_index;
            self.previous_change_position_ms = Some(position_ms);
        }

        self.last_instruction = Some(instruction);
        self.last_index = Some(index);
        self.last_position_ms = Some(position_ms);
        self.idle = false;
    }

    /// Idle edge: reset the cursor and rest the devices
    ///
    /// Only the first idle tick after activity acts; repeats are no-ops.
    /// Clearing `last_index` forces a full search on resume, so stale
    /// cursor state can never survive a pause or seek-while-paused.
    fn enter_idle(&mut self) {
        if self.idle {
            return;
        }
        info!("Playback skipped or paused");
        self.idle = true;
        self.last_index = None;
        self.bus.send(CommandMessage::Stop);
    }
}
