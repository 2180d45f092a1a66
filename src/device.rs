//! # Device Model Module
//!
//! Core types shared by the scanner-facing session and the persisted roster:
//! peripheral identity, live discovery snapshots, the saved device record,
//! and the connection lifecycle state machine.
//!
//! ## Connection Lifecycle
//! Valid transitions form a ring with one failure edge:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
//!                     |                                            ^
//!                     +--------------- (failed) -------------------+
//! ```
//!
//! The two transient states (`Connecting`, `Disconnecting`) can never be
//! entered while the other is active, so a record cannot be told to connect
//! and disconnect at the same time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StateError;

/// Opaque peripheral identity assigned by the platform Bluetooth stack.
///
/// Unique per device per host; depending on the platform it may be a MAC
/// address or a generated UUID, so it is only ever compared, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A peripheral as currently known to an active scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    pub id: DeviceId,
    /// Advertised local name, when the advertisement carried one.
    pub name: Option<String>,
    /// Last signal strength reading in dBm, `0` when none was reported.
    pub rssi: i16,
}

/// Connection lifecycle state of a saved device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl ConnectionState {
    /// Whether this state is one of the in-flight states.
    pub fn is_transient(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Disconnecting)
    }

    /// Whether moving from this state to `to` follows the lifecycle ring.
    pub fn can_transition(self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }

    /// Apply a transition, rejecting anything off the ring.
    pub fn transition(self, to: ConnectionState) -> Result<ConnectionState, StateError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(StateError { from: self, to })
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
        };
        write!(f, "{}", label)
    }
}

/// A saved device as persisted in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    /// Display name captured at save time, `"Unknown"` when none was advertised.
    pub name: String,
    /// Signal strength in dBm captured at save time, `0` when unavailable.
    pub rssi: i16,
    /// When the device was last discovered or saved.
    pub last_seen: DateTime<Utc>,
    pub state: ConnectionState,
}

impl DeviceRecord {
    /// Snapshot a discovery observation into a saveable record.
    ///
    /// Missing advertisement data falls back to the save defaults, and a
    /// fresh record always starts out `Disconnected`.
    pub fn from_discovery(id: DeviceId, name: Option<String>, rssi: Option<i16>) -> Self {
        Self {
            id,
            name: name.unwrap_or_else(|| "Unknown".to_string()),
            rssi: rssi.unwrap_or(0),
            last_seen: Utc::now(),
            state: ConnectionState::Disconnected,
        }
    }
}
