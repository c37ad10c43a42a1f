//! Device manager: command dispatch, keep-alive, and scan cycling
//!
//! Owns the device-control client and the consumer half of the command bus.
//! One loop serves three duties: dispatching instructions as they arrive,
//! re-sending the last instruction when the bus stays quiet (devices drop
//! output when not refreshed), and cycling the server's device scan so
//! late-arriving hardware joins mid-playback.

use crate::bus::{BusRecv, CommandMessage, CommandReceiver};
use crate::config::{Config, DevicePreference};
use crate::device::{self, DeviceControl, DeviceInfo};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Bus consumer driving all connected devices
///
/// Generic over [`DeviceControl`] so the loop can run against a scripted
/// client in tests.
pub struct DeviceManager<C: DeviceControl> {
    client: C,
    bus: CommandReceiver,
    preferences: Vec<DevicePreference>,
    keep_alive: Duration,
    idle_instruction: f64,
    scan_window: Duration,
    scan_cycle: Duration,

    /// Snapshot of connected devices, replaced once per scan cycle
    devices: Vec<DeviceInfo>,
    last_instruction: Option<f64>,
    scanning: bool,
    cycle_started: Instant,
}

impl<C: DeviceControl> DeviceManager<C> {
    pub fn new(client: C, bus: CommandReceiver, config: &Config) -> Self {
        Self {
            client,
            bus,
            preferences: config.devices.clone(),
            keep_alive: Duration::from_secs_f64(config.keep_alive_interval_secs),
            idle_instruction: config.idle_instruction,
            scan_window: Duration::from_secs_f64(config.scan_window_secs),
            scan_cycle: Duration::from_secs_f64(config.scan_cycle_secs),
            devices: Vec::new(),
            last_instruction: None,
            scanning: false,
            cycle_started: Instant::now(),
        }
    }

    /// Serve the bus until `Shutdown` (or a dropped producer), then
    /// disconnect
    pub async fn run(mut self) {
        self.devices = self.client.devices().await;
        if self.devices.is_empty() {
            warn!("No device found, playing the video without sync");
        } else {
            for dev in &self.devices {
                info!(
                    "Device ready: {} (index {}, {} actuator(s))",
                    dev.name,
                    dev.index,
                    dev.actuators.len()
                );
            }
        }

        // Open the first scan window right away
        self.cycle_started = Instant::now();
        self.start_scanning().await;

        loop {
            self.advance_scan_cycle().await;

            match self.bus.recv_timeout(self.keep_alive).await {
                BusRecv::Message(CommandMessage::Value {
                    position_ms,
                    instruction,
                }) => {
                    debug!(
                        "Dispatching instruction {:.3} for position {:.0} ms",
                        instruction, position_ms
                    );
                    self.dispatch(instruction).await;
                    self.last_instruction = Some(instruction);
                }
                BusRecv::Message(CommandMessage::Stop) => {
                    debug!("Playback stopped, resting devices");
                    self.dispatch(0.0).await;
                    self.last_instruction = Some(0.0);
                }
                BusRecv::TimedOut => {
                    let instruction = self.last_instruction.unwrap_or(self.idle_instruction);
                    debug!(
                        "Keeping devices alive, re-sending instruction {:.3}",
                        instruction
                    );
                    self.dispatch(instruction).await;
                }
                BusRecv::Message(CommandMessage::Shutdown) | BusRecv::Closed => break,
            }
        }

        if let Err(e) = self.client.disconnect().await {
            debug!("Device server disconnect: {}", e);
        }
        info!("Device manager stopped");
    }

    /// Advance the scan cycle opportunistically
    ///
    /// Called once per loop iteration, so the timing granularity is the
    /// keep-alive timeout. The cycle is measured in seconds, so that is
    /// plenty.
    async fn advance_scan_cycle(&mut self) {
        let elapsed = self.cycle_started.elapsed();

        if self.scanning && elapsed >= self.scan_window {
            self.stop_scanning().await;
        }

        if elapsed >= self.scan_cycle {
            // Close the window unconditionally before taking the census;
            // a scan left open would keep the device list churning
            self.stop_scanning().await;
            self.refresh_devices().await;
            self.cycle_started = Instant::now();
            self.start_scanning().await;
        }
    }

    /// Replace the device snapshot and log the population change
    async fn refresh_devices(&mut self) {
        let current = self.client.devices().await;
        let before = self.devices.len();
        let after = current.len();
        if after > before {
            info!("{} new device(s) detected", after - before);
        } else if after < before {
            info!("{} device(s) disconnected", before - after);
        }
        self.devices = current;
    }

    /// Send one instruction to every actuator of every connected device
    ///
    /// Each actuator gets the instruction clamped into its configured
    /// range. A failed send is logged and skipped; the next instruction
    /// supersedes it anyway.
    async fn dispatch(&mut self, instruction: f64) {
        for dev in &self.devices {
            for actuator in &dev.actuators {
                let range = device::resolve_range(&self.preferences, dev, actuator);
                let value = device::clamp_to_range(instruction, range);
                if let Err(e) = self.client.send_scalar(dev.index, actuator, value).await {
                    warn!(
                        "Cannot drive {} actuator {}: {}",
                        dev.name, actuator.index, e
                    );
                }
            }
        }
    }

    async fn start_scanning(&mut self) {
        match self.client.start_scanning().await {
            Ok(()) => {
                debug!("Device scan started");
                self.scanning = true;
            }
            Err(e) => warn!("Cannot start device scan: {}", e),
        }
    }

    async fn stop_scanning(&mut self) {
        if let Err(e) = self.client.stop_scanning().await {
            warn!("Cannot stop device scan: {}", e);
        }
        self.scanning = false;
    }
}
