//! Device control: discovery, preference mapping, and command dispatch
//!
//! The manager and the preference logic are written against the
//! [`DeviceControl`] contract rather than a concrete connection, so the
//! dispatch and keep-alive behavior can be exercised with a scripted client.

pub mod intiface;
pub mod manager;
pub mod protocol;

pub use intiface::IntifaceClient;
pub use manager::DeviceManager;

use crate::config::DevicePreference;
use crate::error::Result;
use async_trait::async_trait;

/// One controllable output feature of a device
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorInfo {
    /// Ordinal feature index, used in scalar commands
    pub index: u32,
    /// Feature descriptor reported by the server (e.g. "Air Pump")
    pub description: String,
    /// Actuator type reported by the server (e.g. "Vibrate")
    pub actuator_type: String,
}

/// A connected device as reported by the control server
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Server-assigned device index, stable for the connection's lifetime
    pub index: u32,
    /// Product name, used for preference matching
    pub name: String,
    pub actuators: Vec<ActuatorInfo>,
}

/// Contract between the device manager and a control-server client
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Snapshot of the currently connected devices
    async fn devices(&self) -> Vec<DeviceInfo>;
    /// Ask the server to start scanning for new devices
    async fn start_scanning(&mut self) -> Result<()>;
    /// Ask the server to stop scanning
    async fn stop_scanning(&mut self) -> Result<()>;
    /// Drive one actuator to `value` in `[0, 1]`
    async fn send_scalar(
        &mut self,
        device_index: u32,
        actuator: &ActuatorInfo,
        value: f64,
    ) -> Result<()>;
    /// Close the connection
    async fn disconnect(&mut self) -> Result<()>;
}

/// Output range for an actuator after applying configured preferences
///
/// Resolution order, first match wins:
/// 1. device entry keyed by `name`, then actuator entry keyed by
///    `description`
/// 2. entries keyed by ordinal index instead (an entry's key is its name or
///    description when present, its index otherwise)
/// 3. unrestricted `[0, 1]`
pub fn resolve_range(
    preferences: &[DevicePreference],
    device: &DeviceInfo,
    actuator: &ActuatorInfo,
) -> [f64; 2] {
    let device_preference = preferences
        .iter()
        .find(|p| p.name.as_deref() == Some(device.name.as_str()))
        .or_else(|| {
            preferences
                .iter()
                .find(|p| p.name.is_none() && p.index == Some(device.index))
        });

    let Some(device_preference) = device_preference else {
        return [0.0, 1.0];
    };

    device_preference
        .actuators
        .iter()
        .find(|a| a.description.as_deref() == Some(actuator.description.as_str()))
        .or_else(|| {
            device_preference
                .actuators
                .iter()
                .find(|a| a.description.is_none() && a.index == Some(actuator.index))
        })
        .map(|a| a.range)
        .unwrap_or([0.0, 1.0])
}

/// Clamp an instruction into an actuator's resolved range
pub fn clamp_to_range(instruction: f64, range: [f64; 2]) -> f64 {
    instruction.clamp(range[0], range[1])
}
