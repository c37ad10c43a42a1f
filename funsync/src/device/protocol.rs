//! Buttplug v3 message types and frame codec
//!
//! The protocol frames every transmission as a JSON array of single-key
//! objects, the key naming the message type; serde's externally tagged enum
//! representation matches that exactly. Replies echo the request's `Id`;
//! server-initiated events carry `Id` 0.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Protocol version spoken by this client
pub const MESSAGE_VERSION: u32 = 3;

/// Any protocol message, client- or server-originated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ButtplugMessage {
    // Client -> server
    RequestServerInfo(RequestServerInfo),
    RequestDeviceList(MessageId),
    StartScanning(MessageId),
    StopScanning(MessageId),
    ScalarCmd(ScalarCmd),
    // Server -> client
    ServerInfo(ServerInfo),
    DeviceList(DeviceList),
    DeviceAdded(DeviceAdded),
    DeviceRemoved(DeviceRemoved),
    ScanningFinished(MessageId),
    Ok(MessageId),
    Error(ErrorMessage),
}

/// Body for messages that carry nothing but their id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageId {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestServerInfo {
    pub id: u32,
    pub client_name: String,
    pub message_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    pub id: u32,
    pub server_name: String,
    pub message_version: u32,
    pub max_ping_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceList {
    pub id: u32,
    pub devices: Vec<DeviceMessageInfo>,
}

/// Device description shared by `DeviceList` and `DeviceAdded`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMessageInfo {
    pub device_index: u32,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_display_name: Option<String>,
    #[serde(default)]
    pub device_messages: DeviceMessages,
}

/// Command families a device accepts; only scalar output is used here
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMessages {
    #[serde(default)]
    pub scalar_cmd: Vec<ScalarFeature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalarFeature {
    #[serde(default)]
    pub feature_descriptor: String,
    #[serde(default)]
    pub step_count: u32,
    pub actuator_type: String,
}

/// `DeviceAdded` is a `DeviceMessageInfo` with the event id inlined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAdded {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(flatten)]
    pub device: DeviceMessageInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceRemoved {
    pub id: u32,
    pub device_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalarCmd {
    pub id: u32,
    pub device_index: u32,
    pub scalars: Vec<ScalarEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalarEntry {
    pub index: u32,
    pub scalar: f64,
    pub actuator_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorMessage {
    pub id: u32,
    pub error_message: String,
    pub error_code: i32,
}

/// Id carried by a message, 0 for server-initiated events
pub fn message_id(message: &ButtplugMessage) -> u32 {
    match message {
        ButtplugMessage::RequestServerInfo(m) => m.id,
        ButtplugMessage::RequestDeviceList(m) => m.id,
        ButtplugMessage::StartScanning(m) => m.id,
        ButtplugMessage::StopScanning(m) => m.id,
        ButtplugMessage::ScalarCmd(m) => m.id,
        ButtplugMessage::ServerInfo(m) => m.id,
        ButtplugMessage::DeviceList(m) => m.id,
        ButtplugMessage::DeviceAdded(m) => m.id,
        ButtplugMessage::DeviceRemoved(m) => m.id,
        ButtplugMessage::ScanningFinished(m) => m.id,
        ButtplugMessage::Ok(m) => m.id,
        ButtplugMessage::Error(m) => m.id,
    }
}

/// Encode messages into one wire frame
pub fn encode_frame(messages: &[ButtplugMessage]) -> Result<String> {
    Ok(serde_json::to_string(messages)?)
}

/// Decode a wire frame, skipping message types this client does not speak
///
/// The array itself must parse; individual unsupported messages (sensor
/// readings, raw endpoints) are logged and dropped so they cannot poison
/// the rest of the frame.
pub fn decode_frame(text: &str) -> Result<Vec<ButtplugMessage>> {
    let items: Vec<serde_json::Value> = serde_json::from_str(text)
        .map_err(|e| Error::Protocol(format!("malformed frame: {}", e)))?;
    let mut messages = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<ButtplugMessage>(item.clone()) {
            Ok(message) => messages.push(message),
            Err(_) => debug!("Ignoring unsupported message: {}", item),
        }
    }
    Ok(messages)
}
