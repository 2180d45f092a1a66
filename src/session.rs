//! # Bluetooth Session Module
//!
//! Bridges a callback-driven radio backend into observable state and
//! awaitable connect/disconnect operations.
//!
//! ## Key Components
//! - `BluetoothSession`: cloneable handle used by callers
//! - `SessionActor`: task that owns every piece of observed state
//! - `SessionState`: snapshot published through a watch channel
//!
//! ## Event Flow
//! Backend callbacks arrive as [`CentralEvent`]s on an unbounded channel and
//! are applied by the actor one at a time, so no lock ever guards the
//! observed state. Callers talk to the actor through a command channel and
//! receive results over oneshot channels.
//!
//! Connect and disconnect each hold a single waiter slot. A waiter is resumed
//! by the next matching callback for its peripheral; a second request of the
//! same kind is rejected while one is in flight. There is no timeout: a
//! connect to an unreachable peripheral suspends until the caller gives up.

use std::collections::HashMap;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot, watch};

use crate::btle::BtleCentral;
use crate::central::{AdapterState, CentralEvent, CentralLink, EventReceiver};
use crate::device::{DeviceId, DiscoveredPeripheral};
use crate::error::{CentralError, SessionError};

const STATUS_CONNECTING: &str = "Connecting...";
const STATUS_DISCONNECTED: &str = "Disconnected";

fn connected_status(name: Option<&str>) -> String {
    format!("Connected to {}", name.unwrap_or("device"))
}

fn failed_status(error: Option<&str>) -> String {
    format!("Failed to connect: {}", error.unwrap_or("Unknown error"))
}

/// Options applied when a session starts.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Begin scanning as soon as the adapter reports itself powered on.
    pub auto_scan: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { auto_scan: true }
    }
}

/// Snapshot of everything the session observes about the radio.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Peripherals seen by the current scan, in first-discovery order with
    /// no duplicates.
    pub peripherals: Vec<DiscoveredPeripheral>,
    /// Last RSSI reading per peripheral, in dBm.
    pub signal_strengths: HashMap<DeviceId, i16>,
    /// Human-readable connection status per peripheral. Survives rescans.
    pub statuses: HashMap<DeviceId, String>,
    /// Power state last reported by the adapter.
    pub adapter: AdapterState,
    /// Whether discovery is currently running.
    pub scanning: bool,
}

enum SessionCommand {
    StartScan {
        done: oneshot::Sender<()>,
    },
    StopScan {
        done: oneshot::Sender<()>,
    },
    Connect {
        id: DeviceId,
        reply: oneshot::Sender<Result<DiscoveredPeripheral, SessionError>>,
    },
    Disconnect {
        id: DeviceId,
        reply: oneshot::Sender<Result<DiscoveredPeripheral, SessionError>>,
    },
}

/// Cloneable handle to a running session.
///
/// The session task runs until the backend's event channel closes or every
/// handle has been dropped; operations after that fail with
/// [`SessionError::Terminated`].
#[derive(Clone)]
pub struct BluetoothSession {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl BluetoothSession {
    /// Open a session over the first system Bluetooth adapter.
    pub async fn open(options: SessionOptions) -> Result<Self, CentralError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let link = BtleCentral::new(event_tx).await?;
        Ok(Self::with_link(link, event_rx, options))
    }

    /// Start a session over the given backend link.
    ///
    /// `events` carries the backend's callback traffic; the session applies
    /// every event on its own task. Must be called from within a tokio
    /// runtime.
    pub fn with_link<L: CentralLink>(
        link: L,
        events: EventReceiver,
        options: SessionOptions,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let actor = SessionActor {
            link,
            commands: command_rx,
            events,
            updates: state_tx,
            state: SessionState::default(),
            pending_connect: None,
            pending_disconnect: None,
            auto_scan: options.auto_scan,
        };
        tokio::spawn(actor.run());
        Self {
            commands: command_tx,
            state: state_rx,
        }
    }

    /// Clear prior discoveries and begin a duplicate-free scan.
    ///
    /// Resets the peripheral list and signal strengths; connection statuses
    /// survive a rescan. Completes once the session has applied the request.
    pub async fn start_scanning(&self) -> Result<(), SessionError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::StartScan { done: done_tx })
            .map_err(|_| SessionError::Terminated)?;
        done_rx.await.map_err(|_| SessionError::Terminated)
    }

    /// Halt discovery. Does nothing if no scan is running.
    pub async fn stop_scanning(&self) -> Result<(), SessionError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::StopScan { done: done_tx })
            .map_err(|_| SessionError::Terminated)?;
        done_rx.await.map_err(|_| SessionError::Terminated)
    }

    /// Connect to a peripheral, suspending until the radio reports the
    /// outcome for it.
    ///
    /// Only one connect may be in flight per session; a second request fails
    /// immediately with [`SessionError::OperationPending`]. There is no
    /// timeout, so callers that need one should wrap this future.
    pub async fn connect(&self, id: &DeviceId) -> Result<DiscoveredPeripheral, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Connect {
                id: id.clone(),
                reply: reply_tx,
            })
            .map_err(|_| SessionError::Terminated)?;
        reply_rx.await.map_err(|_| SessionError::Terminated)?
    }

    /// Drop the connection to a peripheral, suspending until the radio
    /// reports the disconnect for it.
    ///
    /// A disconnect the radio reports without an error is a success; one
    /// reported with an error fails with that error carried verbatim.
    pub async fn disconnect(&self, id: &DeviceId) -> Result<DiscoveredPeripheral, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Disconnect {
                id: id.clone(),
                reply: reply_tx,
            })
            .map_err(|_| SessionError::Terminated)?;
        reply_rx.await.map_err(|_| SessionError::Terminated)?
    }

    /// Peripherals discovered by the current scan, in first-discovery order.
    pub fn peripherals(&self) -> Vec<DiscoveredPeripheral> {
        self.state.borrow().peripherals.clone()
    }

    /// Last signal strength reading for a peripheral, in dBm.
    pub fn signal_strength(&self, id: &DeviceId) -> Option<i16> {
        self.state.borrow().signal_strengths.get(id).copied()
    }

    /// Current connection status text for a peripheral, if any was reported.
    pub fn connection_status(&self, id: &DeviceId) -> Option<String> {
        self.state.borrow().statuses.get(id).cloned()
    }

    /// Whether discovery is currently running.
    pub fn is_scanning(&self) -> bool {
        self.state.borrow().scanning
    }

    /// Power state last reported by the adapter.
    pub fn adapter_state(&self) -> AdapterState {
        self.state.borrow().adapter
    }

    /// Full snapshot of the observed state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch for state changes. `borrow` on the receiver yields the latest
    /// snapshot; `changed`/`wait_for` suspend until a new one is published.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

/// A suspended connect or disconnect caller.
struct Waiter {
    id: DeviceId,
    reply: oneshot::Sender<Result<DiscoveredPeripheral, SessionError>>,
}

struct SessionActor<L: CentralLink> {
    link: L,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: EventReceiver,
    updates: watch::Sender<SessionState>,
    state: SessionState,
    pending_connect: Option<Waiter>,
    pending_disconnect: Option<Waiter>,
    auto_scan: bool,
}

impl<L: CentralLink> SessionActor<L> {
    async fn run(mut self) {
        debug!("Bluetooth session started");
        loop {
            // Events are applied before commands so a request submitted after
            // a callback always observes that callback's effects.
            tokio::select! {
                biased;
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Backend event channel closed, session shutting down");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All session handles dropped, session shutting down");
                        break;
                    }
                },
            }
        }
        // Dropping the actor drops any pending waiters, failing their
        // callers with `Terminated`.
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartScan { done } => {
                self.begin_scan();
                let _ = done.send(());
            }
            SessionCommand::StopScan { done } => {
                if self.state.scanning {
                    self.link.stop_scan();
                    self.state.scanning = false;
                    self.publish();
                }
                let _ = done.send(());
            }
            SessionCommand::Connect { id, reply } => {
                if self.pending_connect.is_some() {
                    let _ = reply.send(Err(SessionError::OperationPending));
                    return;
                }
                debug!("Connect requested for {}", id);
                self.state.statuses.insert(id.clone(), STATUS_CONNECTING.to_string());
                self.pending_connect = Some(Waiter { id: id.clone(), reply });
                self.link.connect(&id);
                self.publish();
            }
            SessionCommand::Disconnect { id, reply } => {
                if self.pending_disconnect.is_some() {
                    let _ = reply.send(Err(SessionError::OperationPending));
                    return;
                }
                debug!("Disconnect requested for {}", id);
                self.pending_disconnect = Some(Waiter { id: id.clone(), reply });
                self.link.disconnect(&id);
                // No transient status exists for disconnects.
            }
        }
    }

    fn handle_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::StateUpdated(adapter) => {
                debug!("Adapter state is now {:?}", adapter);
                self.state.adapter = adapter;
                if adapter == AdapterState::PoweredOn && self.auto_scan {
                    self.begin_scan();
                } else {
                    self.publish();
                }
            }
            CentralEvent::PeripheralDiscovered { id, name, rssi } => {
                if let Some(rssi) = rssi {
                    self.state.signal_strengths.insert(id.clone(), rssi);
                }
                match self.state.peripherals.iter_mut().find(|p| p.id == id) {
                    Some(known) => {
                        if name.is_some() {
                            known.name = name;
                        }
                        if let Some(rssi) = rssi {
                            known.rssi = rssi;
                        }
                    }
                    None => {
                        debug!("Discovered {} ({})", id, name.as_deref().unwrap_or("no name"));
                        self.state.peripherals.push(DiscoveredPeripheral {
                            id,
                            name,
                            rssi: rssi.unwrap_or(0),
                        });
                    }
                }
                self.publish();
            }
            CentralEvent::PeripheralConnected { id } => {
                let name = self
                    .state
                    .peripherals
                    .iter()
                    .find(|p| p.id == id)
                    .and_then(|p| p.name.clone());
                self.state
                    .statuses
                    .insert(id.clone(), connected_status(name.as_deref()));
                self.link.discover_services(&id);
                let snapshot = self.snapshot(&id);
                self.resolve_connect(&id, Ok(snapshot));
                self.publish();
            }
            CentralEvent::ConnectFailed { id, error } => {
                warn!(
                    "Failed to connect to {}: {}",
                    id,
                    error.as_deref().unwrap_or("no error given")
                );
                self.state
                    .statuses
                    .insert(id.clone(), failed_status(error.as_deref()));
                let failure = match error {
                    Some(reason) => SessionError::ConnectionFailed(reason),
                    None => SessionError::UnknownFailure,
                };
                self.resolve_connect(&id, Err(failure));
                self.publish();
            }
            CentralEvent::PeripheralDisconnected { id, error: None } => {
                debug!("{} disconnected", id);
                self.state
                    .statuses
                    .insert(id.clone(), STATUS_DISCONNECTED.to_string());
                let snapshot = self.snapshot(&id);
                self.resolve_disconnect(&id, Ok(snapshot));
                self.publish();
            }
            CentralEvent::PeripheralDisconnected { id, error: Some(reason) } => {
                // An erroring disconnect leaves the status map untouched.
                warn!("{} disconnected with error: {}", id, reason);
                self.resolve_disconnect(&id, Err(SessionError::ConnectionFailed(reason)));
                self.publish();
            }
        }
    }

    fn begin_scan(&mut self) {
        self.state.peripherals.clear();
        self.state.signal_strengths.clear();
        self.state.scanning = true;
        self.link.start_scan();
        self.publish();
    }

    /// Resume the pending connect waiter if the outcome is for its peripheral.
    fn resolve_connect(&mut self, id: &DeviceId, outcome: Result<DiscoveredPeripheral, SessionError>) {
        match self.pending_connect.take() {
            Some(waiter) if waiter.id == *id => {
                let _ = waiter.reply.send(outcome);
            }
            other => {
                if let Some(waiter) = &other {
                    warn!("Connect outcome for {} while waiting on {}", id, waiter.id);
                }
                self.pending_connect = other;
            }
        }
    }

    /// Resume the pending disconnect waiter if the outcome is for its peripheral.
    fn resolve_disconnect(&mut self, id: &DeviceId, outcome: Result<DiscoveredPeripheral, SessionError>) {
        match self.pending_disconnect.take() {
            Some(waiter) if waiter.id == *id => {
                let _ = waiter.reply.send(outcome);
            }
            other => {
                if let Some(waiter) = &other {
                    warn!("Disconnect outcome for {} while waiting on {}", id, waiter.id);
                }
                self.pending_disconnect = other;
            }
        }
    }

    /// Discovery snapshot for a peripheral, synthesized from the RSSI map
    /// when the peripheral is not in the current scan list.
    fn snapshot(&self, id: &DeviceId) -> DiscoveredPeripheral {
        self.state
            .peripherals
            .iter()
            .find(|p| p.id == *id)
            .cloned()
            .unwrap_or_else(|| DiscoveredPeripheral {
                id: id.clone(),
                name: None,
                rssi: self.state.signal_strengths.get(id).copied().unwrap_or(0),
            })
    }

    fn publish(&self) {
        self.updates.send_replace(self.state.clone());
    }
}
