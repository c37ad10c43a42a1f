//! Websocket client for Intiface Central
//!
//! Speaks Buttplug v3 over a single websocket connection. A reader task
//! owns the receive half: replies are routed back to waiting requests by
//! message id, device events fold into a shared registry. All writes go
//! through the owning task, so the send half needs no lock.

use crate::device::protocol::{
    self, ButtplugMessage, MessageId, RequestServerInfo, ScalarCmd, ScalarEntry,
};
use crate::device::{ActuatorInfo, DeviceControl, DeviceInfo};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Client name reported in the handshake
const CLIENT_NAME: &str = "funsync";

/// How long to wait for a server reply before giving up on a request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type Pending = Arc<Mutex<HashMap<u32, oneshot::Sender<ButtplugMessage>>>>;
type Registry = Arc<RwLock<HashMap<u32, DeviceInfo>>>;

/// Connected Buttplug v3 client
pub struct IntifaceClient {
    sink: WsSink,
    pending: Pending,
    registry: Registry,
    next_id: u32,
    reader: JoinHandle<()>,
}

impl IntifaceClient {
    /// Connect to the server and perform the Buttplug handshake
    ///
    /// On success the device registry is seeded from the server's current
    /// device list and kept up to date by the reader task from then on.
    pub async fn connect(address: &str) -> Result<Self> {
        let (stream, _) = connect_async(address)
            .await
            .map_err(|e| Error::Device(format!("cannot connect to {}: {}", address, e)))?;
        info!("Connected to device server at {}", address);

        let (sink, source) = stream.split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let reader = tokio::spawn(reader_loop(source, pending.clone(), registry.clone()));

        let mut client = Self {
            sink,
            pending,
            registry,
            next_id: 0,
            reader,
        };

        let reply = client
            .request(|id| {
                ButtplugMessage::RequestServerInfo(RequestServerInfo {
                    id,
                    client_name: CLIENT_NAME.to_string(),
                    message_version: protocol::MESSAGE_VERSION,
                })
            })
            .await?;
        let ButtplugMessage::ServerInfo(server) = reply else {
            return Err(Error::Protocol(format!(
                "unexpected handshake reply: {:?}",
                reply
            )));
        };
        info!(
            "Device server: {} (message version {})",
            server.server_name, server.message_version
        );
        if server.max_ping_time > 0 {
            warn!(
                "Server expects a ping every {} ms; this client does not ping and may be dropped",
                server.max_ping_time
            );
        }

        let reply = client
            .request(|id| ButtplugMessage::RequestDeviceList(MessageId { id }))
            .await?;
        let ButtplugMessage::DeviceList(list) = reply else {
            return Err(Error::Protocol(format!(
                "unexpected device list reply: {:?}",
                reply
            )));
        };
        {
            let mut registry = client.registry.write().await;
            for device in &list.devices {
                let info = device_info(device);
                info!(
                    "Device present: {} (index {}, {} actuator(s))",
                    info.name,
                    info.index,
                    info.actuators.len()
                );
                registry.insert(info.index, info);
            }
        }

        Ok(client)
    }

    /// Send one request and wait for the reply carrying the same id
    async fn request(
        &mut self,
        build: impl FnOnce(u32) -> ButtplugMessage,
    ) -> Result<ButtplugMessage> {
        self.next_id += 1;
        let id = self.next_id;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(id, reply_tx);

        let frame = protocol::encode_frame(&[build(id)])?;
        if let Err(e) = self.sink.send(WsMessage::Text(frame)).await {
            self.pending.lock().await.remove(&id);
            return Err(Error::Device(format!(
                "cannot send to device server: {}",
                e
            )));
        }

        let reply = match tokio::time::timeout(REQUEST_TIMEOUT, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(Error::Device(
                    "device server connection closed".to_string(),
                ))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(Error::Device(
                    "timed out waiting for device server reply".to_string(),
                ));
            }
        };

        if let ButtplugMessage::Error(e) = reply {
            return Err(Error::Device(format!(
                "server rejected request: {} (code {})",
                e.error_message, e.error_code
            )));
        }
        Ok(reply)
    }
}

#[async_trait]
impl DeviceControl for IntifaceClient {
    async fn devices(&self) -> Vec<DeviceInfo> {
        let registry = self.registry.read().await;
        let mut list: Vec<DeviceInfo> = registry.values().cloned().collect();
        list.sort_by_key(|d| d.index);
        list
    }

    async fn start_scanning(&mut self) -> Result<()> {
        self.request(|id| ButtplugMessage::StartScanning(MessageId { id }))
            .await
            .map(|_| ())
    }

    async fn stop_scanning(&mut self) -> Result<()> {
        self.request(|id| ButtplugMessage::StopScanning(MessageId { id }))
            .await
            .map(|_| ())
    }

    async fn send_scalar(
        &mut self,
        device_index: u32,
        actuator: &ActuatorInfo,
        value: f64,
    ) -> Result<()> {
        self.request(|id| {
            ButtplugMessage::ScalarCmd(ScalarCmd {
                id,
                device_index,
                scalars: vec![ScalarEntry {
                    index: actuator.index,
                    scalar: value,
                    actuator_type: actuator.actuator_type.clone(),
                }],
            })
        })
        .await
        .map(|_| ())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let _ = self.sink.send(WsMessage::Close(None)).await;
        self.reader.abort();
        debug!("Disconnected from device server");
        Ok(())
    }
}

/// Receive loop: route replies to waiters, fold device events into the
/// registry, drop everything else
async fn reader_loop(mut source: WsSource, pending: Pending, registry: Registry) {
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Device server connection lost: {}", e);
                break;
            }
        };

        let messages = match protocol::decode_frame(&text) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Ignoring malformed frame: {}", e);
                continue;
            }
        };

        for message in messages {
            handle_message(message, &pending, &registry).await;
        }
    }

    // Failing the waiters turns in-flight requests into immediate errors
    pending.lock().await.clear();
    debug!("Device server reader finished");
}

async fn handle_message(message: ButtplugMessage, pending: &Pending, registry: &Registry) {
    match message {
        ButtplugMessage::DeviceAdded(added) => {
            let info = device_info(&added.device);
            info!("Device connected: {} (index {})", info.name, info.index);
            registry.write().await.insert(info.index, info);
        }
        ButtplugMessage::DeviceRemoved(removed) => {
            if let Some(info) = registry.write().await.remove(&removed.device_index) {
                info!(
                    "Device disconnected: {} (index {})",
                    info.name, removed.device_index
                );
            }
        }
        ButtplugMessage::ScanningFinished(_) => debug!("Server finished scanning"),
        other => {
            let id = protocol::message_id(&other);
            let waiter = if id != 0 {
                pending.lock().await.remove(&id)
            } else {
                None
            };
            match waiter {
                Some(waiter) => {
                    let _ = waiter.send(other);
                }
                None => debug!("Unrouted server message: {:?}", other),
            }
        }
    }
}

/// Map a wire device description onto the manager's device model
///
/// Actuators are the device's scalar features; their ordinal position in
/// the feature list is the index scalar commands address.
fn device_info(device: &protocol::DeviceMessageInfo) -> DeviceInfo {
    let actuators = device
        .device_messages
        .scalar_cmd
        .iter()
        .enumerate()
        .map(|(position, feature)| ActuatorInfo {
            index: position as u32,
            description: feature.feature_descriptor.clone(),
            actuator_type: feature.actuator_type.clone(),
        })
        .collect();
    DeviceInfo {
        index: device.device_index,
        name: device.device_name.clone(),
        actuators,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::protocol::{DeviceMessages, ScalarFeature};

    #[test]
    fn device_info_assigns_ordinal_actuator_indices() {
        let wire = protocol::DeviceMessageInfo {
            device_index: 4,
            device_name: "Lovense Edge".to_string(),
            device_display_name: None,
            device_messages: DeviceMessages {
                scalar_cmd: vec![
                    ScalarFeature {
                        feature_descriptor: "Vibrator 1".to_string(),
                        step_count: 20,
                        actuator_type: "Vibrate".to_string(),
                    },
                    ScalarFeature {
                        feature_descriptor: "Vibrator 2".to_string(),
                        step_count: 20,
                        actuator_type: "Vibrate".to_string(),
                    },
                ],
            },
        };
        let info = device_info(&wire);
        assert_eq!(info.index, 4);
        assert_eq!(info.name, "Lovense Edge");
        assert_eq!(info.actuators.len(), 2);
        assert_eq!(info.actuators[0].index, 0);
        assert_eq!(info.actuators[1].index, 1);
        assert_eq!(info.actuators[1].description, "Vibrator 2");
    }

    #[test]
    fn device_without_scalar_features_has_no_actuators() {
        let wire = protocol::DeviceMessageInfo {
            device_index: 0,
            device_name: "Sensor Only".to_string(),
            device_display_name: None,
            device_messages: DeviceMessages::default(),
        };
        assert!(device_info(&wire).actuators.is_empty());
    }
}
