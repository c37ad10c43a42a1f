//! Playback synchronization
//!
//! Pure instruction mapping plus the per-playback session that drives it
//! from player ticks.

pub mod instruction;
pub mod session;

pub use instruction::InstructionMap;
pub use session::SyncSession;
