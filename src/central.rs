//! # Central Link Module
//!
//! The seam between the session and whatever drives the actual radio.
//! A backend implements [`CentralLink`] for the commands the session issues
//! and reports everything the radio does back as [`CentralEvent`]s over a
//! channel. Backend callbacks may fire on any thread; the channel marshals
//! them onto the session task, which owns all observed state.

use tokio::sync::mpsc;

use crate::device::DeviceId;

/// Power and authorization state reported by the Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl Default for AdapterState {
    fn default() -> Self {
        AdapterState::Unknown
    }
}

/// A delegate callback from the radio, delivered to the session as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    /// The adapter changed power or authorization state.
    StateUpdated(AdapterState),
    /// An advertisement was received. Repeats for a known peripheral update
    /// its name and signal strength rather than adding a new entry.
    PeripheralDiscovered {
        id: DeviceId,
        name: Option<String>,
        rssi: Option<i16>,
    },
    /// A connection attempt completed successfully.
    PeripheralConnected { id: DeviceId },
    /// A connection attempt failed; `error` carries the stack's description
    /// when it gave one.
    ConnectFailed {
        id: DeviceId,
        error: Option<String>,
    },
    /// A connection ended. `None` means a benign disconnect; `Some` carries
    /// the stack's error description.
    PeripheralDisconnected {
        id: DeviceId,
        error: Option<String>,
    },
}

/// Commands the session issues to the radio backend.
///
/// All commands are fire and forget, mirroring the void methods of a platform
/// central: outcomes come back as [`CentralEvent`]s, never as return values.
pub trait CentralLink: Send + 'static {
    /// Begin a duplicate-free scan with no service filter.
    fn start_scan(&mut self);
    /// Stop an active scan.
    fn stop_scan(&mut self);
    /// Ask the radio to connect to a peripheral.
    fn connect(&mut self, id: &DeviceId);
    /// Ask the radio to drop a connection.
    fn disconnect(&mut self, id: &DeviceId);
    /// Enumerate services on a connected peripheral. The session never waits
    /// on the result.
    fn discover_services(&mut self, id: &DeviceId);
}

/// Sending half of the event channel a backend reports through.
pub type EventSender = mpsc::UnboundedSender<CentralEvent>;

/// Receiving half handed to the session at construction.
pub type EventReceiver = mpsc::UnboundedReceiver<CentralEvent>;
