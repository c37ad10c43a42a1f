//! Device manager dispatch and keep-alive tests
//!
//! Runs the manager loop against a scripted device-control client and a
//! real command bus, checking:
//! - per-actuator range clamping during dispatch
//! - Stop resting devices at their configured floor
//! - keep-alive resends after a quiet bus
//! - the scan cycle refreshing the device census
//! - per-device send failures not aborting the rest of a dispatch
//! - orderly exit (with disconnect) on Shutdown and on a dropped producer

use async_trait::async_trait;
use funsync::bus::{self, CommandMessage};
use funsync::config::{ActuatorPreference, Config, DevicePreference};
use funsync::device::{ActuatorInfo, DeviceControl, DeviceInfo, DeviceManager};
use funsync::error::{Error, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    StartScanning,
    StopScanning,
    SendScalar {
        device: u32,
        actuator: u32,
        value: f64,
    },
    Disconnect,
}

/// Scripted client: records every call, serves a mutable device list, and
/// can be told to fail sends for one device
#[derive(Clone, Default)]
struct MockClient {
    calls: Arc<Mutex<Vec<Call>>>,
    devices: Arc<Mutex<Vec<DeviceInfo>>>,
    fail_device: Option<u32>,
}

impl MockClient {
    fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices: Arc::new(Mutex::new(devices)),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn sends(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::SendScalar { .. }))
            .collect()
    }
}

#[async_trait]
impl DeviceControl for MockClient {
    async fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.lock().unwrap().clone()
    }

    async fn start_scanning(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::StartScanning);
        Ok(())
    }

    async fn stop_scanning(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::StopScanning);
        Ok(())
    }

    async fn send_scalar(
        &mut self,
        device_index: u32,
        actuator: &ActuatorInfo,
        value: f64,
    ) -> Result<()> {
        if self.fail_device == Some(device_index) {
            return Err(Error::Device("scripted send failure".to_string()));
        }
        self.calls.lock().unwrap().push(Call::SendScalar {
            device: device_index,
            actuator: actuator.index,
            value,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Disconnect);
        Ok(())
    }
}

fn device(index: u32, name: &str, actuator_count: u32) -> DeviceInfo {
    DeviceInfo {
        index,
        name: name.to_string(),
        actuators: (0..actuator_count)
            .map(|i| ActuatorInfo {
                index: i,
                description: format!("Vibrator {}", i + 1),
                actuator_type: "Vibrate".to_string(),
            })
            .collect(),
    }
}

/// Short keep-alive, scan cycle pushed out of the way
fn quiet_scan_config() -> Config {
    Config {
        keep_alive_interval_secs: 0.03,
        scan_window_secs: 60.0,
        scan_cycle_secs: 120.0,
        ..Config::default()
    }
}

#[tokio::test]
async fn dispatch_clamps_into_the_preferred_range() {
    let mock = MockClient::with_devices(vec![device(0, "Lovense Max", 1)]);
    let mut config = quiet_scan_config();
    config.devices = vec![DevicePreference {
        name: Some("Lovense Max".to_string()),
        index: None,
        actuators: vec![ActuatorPreference {
            description: None,
            index: Some(0),
            range: [0.0, 0.25],
        }],
    }];

    let (tx, rx) = bus::channel();
    tx.send(CommandMessage::Value {
        position_ms: 1000.0,
        instruction: 0.9,
    });
    tx.send(CommandMessage::Shutdown);
    DeviceManager::new(mock.clone(), rx, &config).run().await;

    let sends = mock.sends();
    assert_eq!(
        sends[0],
        Call::SendScalar {
            device: 0,
            actuator: 0,
            value: 0.25,
        }
    );
}

#[tokio::test]
async fn stop_rests_devices_at_their_configured_floor() {
    let mock = MockClient::with_devices(vec![device(2, "Lovense Edge", 1)]);
    let mut config = quiet_scan_config();
    config.devices = vec![DevicePreference {
        name: Some("Lovense Edge".to_string()),
        index: None,
        actuators: vec![ActuatorPreference {
            description: None,
            index: Some(0),
            range: [0.2, 0.8],
        }],
    }];

    let (tx, rx) = bus::channel();
    tx.send(CommandMessage::Stop);
    tx.send(CommandMessage::Shutdown);
    DeviceManager::new(mock.clone(), rx, &config).run().await;

    let sends = mock.sends();
    assert_eq!(
        sends[0],
        Call::SendScalar {
            device: 2,
            actuator: 0,
            value: 0.2,
        }
    );
}

#[tokio::test]
async fn quiet_bus_resends_the_last_instruction() {
    let mock = MockClient::with_devices(vec![device(0, "Lovense Gush", 1)]);
    let config = quiet_scan_config();

    let (tx, rx) = bus::channel();
    tx.send(CommandMessage::Value {
        position_ms: 0.0,
        instruction: 0.5,
    });
    tokio::spawn(async move {
        sleep(Duration::from_millis(120)).await;
        tx.send(CommandMessage::Shutdown);
    });
    DeviceManager::new(mock.clone(), rx, &config).run().await;

    let resends = mock
        .sends()
        .iter()
        .filter(|call| matches!(call, Call::SendScalar { value, .. } if *value == 0.5))
        .count();
    // The initial dispatch plus at least one keep-alive within 120 ms
    assert!(resends >= 2, "expected keep-alive resends, got {}", resends);
}

#[tokio::test]
async fn keep_alive_before_any_instruction_uses_the_idle_default() {
    let mock = MockClient::with_devices(vec![device(0, "Lovense Gush", 1)]);
    let mut config = quiet_scan_config();
    config.idle_instruction = 0.1;

    let (tx, rx) = bus::channel();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        tx.send(CommandMessage::Shutdown);
    });
    DeviceManager::new(mock.clone(), rx, &config).run().await;

    let sends = mock.sends();
    assert!(!sends.is_empty());
    assert!(sends
        .iter()
        .all(|call| matches!(call, Call::SendScalar { value, .. } if *value == 0.1)));
}

#[tokio::test]
async fn scan_cycle_refreshes_the_device_census() {
    let mock = MockClient::with_devices(vec![device(0, "Lovense Max", 1)]);
    let config = Config {
        keep_alive_interval_secs: 0.02,
        scan_window_secs: 0.04,
        scan_cycle_secs: 0.08,
        ..Config::default()
    };

    let (tx, rx) = bus::channel();
    tx.send(CommandMessage::Value {
        position_ms: 0.0,
        instruction: 0.5,
    });
    let registry = mock.devices.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        // Two more devices appear while the manager runs; the next census
        // must pick them up
        {
            let mut devices = registry.lock().unwrap();
            devices.push(device(1, "Lovense Edge", 1));
            devices.push(device(2, "Lovense Gush", 1));
        }
        sleep(Duration::from_millis(200)).await;
        tx.send(CommandMessage::Value {
            position_ms: 5000.0,
            instruction: 0.75,
        });
        sleep(Duration::from_millis(30)).await;
        tx.send(CommandMessage::Shutdown);
    });
    DeviceManager::new(mock.clone(), rx, &config).run().await;

    let calls = mock.calls();
    let starts = calls.iter().filter(|c| **c == Call::StartScanning).count();
    let stops = calls.iter().filter(|c| **c == Call::StopScanning).count();
    assert!(starts >= 2, "expected repeated scan starts, got {}", starts);
    assert!(stops >= 2, "expected repeated scan stops, got {}", stops);

    // The very first dispatch saw only the original device
    assert_eq!(
        calls.iter().find(|c| matches!(c, Call::SendScalar { .. })),
        Some(&Call::SendScalar {
            device: 0,
            actuator: 0,
            value: 0.5,
        })
    );

    // After the census, dispatch covers all three devices
    let mut late_devices: Vec<u32> = calls
        .iter()
        .filter_map(|c| match c {
            Call::SendScalar { device, value, .. } if *value == 0.75 => Some(*device),
            _ => None,
        })
        .collect();
    late_devices.sort_unstable();
    late_devices.dedup();
    assert_eq!(late_devices, vec![0, 1, 2]);
}

#[tokio::test]
async fn send_failure_on_one_device_does_not_abort_the_dispatch() {
    let mut mock = MockClient::with_devices(vec![
        device(0, "Broken Toy", 2),
        device(1, "Lovense Gush", 1),
    ]);
    mock.fail_device = Some(0);
    let config = quiet_scan_config();

    let (tx, rx) = bus::channel();
    tx.send(CommandMessage::Value {
        position_ms: 0.0,
        instruction: 0.5,
    });
    tx.send(CommandMessage::Shutdown);
    DeviceManager::new(mock.clone(), rx, &config).run().await;

    let sends = mock.sends();
    assert_eq!(
        sends[0],
        Call::SendScalar {
            device: 1,
            actuator: 0,
            value: 0.5,
        }
    );
}

#[tokio::test]
async fn shutdown_message_ends_the_loop_with_a_disconnect() {
    let mock = MockClient::with_devices(vec![device(0, "Lovense Max", 1)]);
    let config = quiet_scan_config();

    let (tx, rx) = bus::channel();
    tx.send(CommandMessage::Shutdown);
    DeviceManager::new(mock.clone(), rx, &config).run().await;

    let calls = mock.calls();
    assert_eq!(calls.last(), Some(&Call::Disconnect));
    assert!(mock.sends().is_empty());
}

#[tokio::test]
async fn dropped_producer_ends_the_loop_with_a_disconnect() {
    let mock = MockClient::with_devices(vec![]);
    let config = quiet_scan_config();

    let (tx, rx) = bus::channel();
    drop(tx);
    DeviceManager::new(mock.clone(), rx, &config).run().await;

    assert_eq!(mock.calls().last(), Some(&Call::Disconnect));
}
