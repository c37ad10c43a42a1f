//! # funsync Library
//!
//! Synchronizes haptic output devices against video playback.
//!
//! **Purpose:** Index a funscript action timeline, convert playback ticks
//! into normalized actuator instructions, and dispatch them to
//! Buttplug/Intiface devices with per-actuator range mapping.
//!
//! **Architecture:** mpv runs as a child process and feeds position/idle
//! ticks over its JSON IPC socket; a per-playback session maps ticks to
//! instructions and pushes them onto an SPSC command bus; the device
//! manager consumes the bus, keeps devices alive during silence, and drives
//! the websocket protocol client.

pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod playback;
pub mod player;
pub mod script;

pub use error::{Error, Result};
