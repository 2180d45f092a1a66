//! # btleplug Backend Module
//!
//! [`CentralLink`] implementation over the first system Bluetooth adapter.
//! The adapter's event stream runs on its own task and is mapped into
//! [`CentralEvent`]s; commands spawn short-lived tasks so the session never
//! blocks on the radio. Peripheral handles are cached by id as they are
//! discovered so connect and disconnect can look them up later.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use btleplug::api::{Central, CentralEvent as BtleEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use log::{debug, warn};

use crate::central::{AdapterState, CentralEvent, CentralLink, EventSender};
use crate::device::DeviceId;
use crate::error::CentralError;

type PeripheralCache = Arc<Mutex<HashMap<DeviceId, Peripheral>>>;

pub struct BtleCentral {
    adapter: Adapter,
    events: EventSender,
    peripherals: PeripheralCache,
}

impl BtleCentral {
    /// Bind to the first adapter, report its current power state, and start
    /// forwarding its event stream.
    pub async fn new(events: EventSender) -> Result<Self, CentralError> {
        let manager = Manager::new()
            .await
            .map_err(|e| CentralError::ManagerInit(e.to_string()))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| CentralError::ManagerInit(e.to_string()))?;
        let adapter = adapters.into_iter().next().ok_or(CentralError::NoAdapter)?;

        let stream = adapter
            .events()
            .await
            .map_err(|e| CentralError::ManagerInit(e.to_string()))?;
        let peripherals: PeripheralCache = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(forward_events(
            adapter.clone(),
            stream,
            events.clone(),
            Arc::clone(&peripherals),
        ));

        // Seed the session with the radio's current power state; later
        // changes arrive through the event stream.
        let state = match adapter.adapter_state().await {
            Ok(state) => map_state(state),
            Err(e) => {
                warn!("Failed to query adapter state: {}", e);
                AdapterState::Unknown
            }
        };
        let _ = events.send(CentralEvent::StateUpdated(state));

        Ok(Self {
            adapter,
            events,
            peripherals,
        })
    }

    fn peripheral(&self, id: &DeviceId) -> Option<Peripheral> {
        self.peripherals.lock().unwrap().get(id).cloned()
    }
}

impl CentralLink for BtleCentral {
    fn start_scan(&mut self) {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                warn!("Failed to start scan: {}", e);
            }
        });
    }

    fn stop_scan(&mut self) {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        });
    }

    fn connect(&mut self, id: &DeviceId) {
        let Some(peripheral) = self.peripheral(id) else {
            let _ = self.events.send(CentralEvent::ConnectFailed {
                id: id.clone(),
                error: Some(format!("peripheral {} has not been discovered", id)),
            });
            return;
        };
        let events = self.events.clone();
        let id = id.clone();
        tokio::spawn(async move {
            // Success surfaces as a DeviceConnected event on the adapter
            // stream; only failures are reported from here.
            if let Err(e) = peripheral.connect().await {
                warn!("Failed to connect to {}: {}", id, e);
                let _ = events.send(CentralEvent::ConnectFailed {
                    id,
                    error: Some(e.to_string()),
                });
            }
        });
    }

    fn disconnect(&mut self, id: &DeviceId) {
        let Some(peripheral) = self.peripheral(id) else {
            let _ = self.events.send(CentralEvent::PeripheralDisconnected {
                id: id.clone(),
                error: Some(format!("peripheral {} has not been discovered", id)),
            });
            return;
        };
        let events = self.events.clone();
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                warn!("Failed to disconnect from {}: {}", id, e);
                let _ = events.send(CentralEvent::PeripheralDisconnected {
                    id,
                    error: Some(e.to_string()),
                });
            }
        });
    }

    fn discover_services(&mut self, id: &DeviceId) {
        let Some(peripheral) = self.peripheral(id) else {
            debug!("No cached handle for {} to discover services on", id);
            return;
        };
        let id = id.clone();
        tokio::spawn(async move {
            match peripheral.discover_services().await {
                Ok(()) => debug!(
                    "Discovered {} services on {}",
                    peripheral.services().len(),
                    id
                ),
                Err(e) => warn!("Service discovery on {} failed: {}", id, e),
            }
        });
    }
}

fn map_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

/// Pump the adapter's event stream into the session's channel until either
/// side goes away.
async fn forward_events(
    adapter: Adapter,
    mut stream: Pin<Box<dyn Stream<Item = BtleEvent> + Send>>,
    out: EventSender,
    peripherals: PeripheralCache,
) {
    while let Some(event) = stream.next().await {
        let forwarded = match event {
            BtleEvent::DeviceDiscovered(pid) | BtleEvent::DeviceUpdated(pid) => {
                let id = DeviceId::new(pid.to_string());
                let Ok(peripheral) = adapter.peripheral(&pid).await else {
                    warn!("Peripheral {} vanished before lookup", id);
                    continue;
                };
                let properties = peripheral.properties().await.ok().flatten();
                let (name, rssi) = match properties {
                    Some(props) => (props.local_name, props.rssi),
                    None => (None, None),
                };
                peripherals.lock().unwrap().insert(id.clone(), peripheral);
                CentralEvent::PeripheralDiscovered { id, name, rssi }
            }
            BtleEvent::DeviceConnected(pid) => CentralEvent::PeripheralConnected {
                id: DeviceId::new(pid.to_string()),
            },
            BtleEvent::DeviceDisconnected(pid) => CentralEvent::PeripheralDisconnected {
                id: DeviceId::new(pid.to_string()),
                error: None,
            },
            BtleEvent::StateUpdate(state) => CentralEvent::StateUpdated(map_state(state)),
            _ => continue,
        };
        if out.send(forwarded).is_err() {
            // Session gone; nothing left to report to.
            break;
        }
    }
    debug!("Adapter event stream ended");
}
