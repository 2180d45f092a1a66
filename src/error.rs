//! # Error Types Module
//!
//! Centralized error handling for the blueroster crate.
//! Provides custom error types for each module with proper context and error chaining.
//!
//! ## Error Types
//! - `SessionError`: connect/disconnect failures surfaced by the session bridge
//! - `CentralError`: Bluetooth adapter discovery and initialization failures
//! - `StateError`: rejected connection lifecycle transitions
//! - `StoreError`: device roster I/O, parsing and lookup errors
//! - `ConfigError`: configuration file I/O and parsing errors
//! - `TrackerError`: failures from the combined save/connect workflow

use std::fmt;

use crate::device::{ConnectionState, DeviceId};

/// Errors surfaced by session connect and disconnect operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The Bluetooth stack reported an error for the operation.
    ConnectionFailed(String),
    /// The stack reported a connect failure without any error detail.
    UnknownFailure,
    /// Another connect or disconnect is already waiting on its outcome.
    OperationPending,
    /// The session task has shut down.
    Terminated,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ConnectionFailed(reason) => {
                write!(f, "Connection operation failed: {}", reason)
            }
            SessionError::UnknownFailure => {
                write!(f, "Connection failed without an error from the Bluetooth stack")
            }
            SessionError::OperationPending => {
                write!(f, "Another connect or disconnect is already pending on this session")
            }
            SessionError::Terminated => {
                write!(f, "Bluetooth session has shut down")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors raised while binding to a Bluetooth adapter.
#[derive(Debug, Clone)]
pub enum CentralError {
    /// Bluetooth manager initialization failed
    ManagerInit(String),
    /// Bluetooth adapter not found or not available
    NoAdapter,
}

impl fmt::Display for CentralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CentralError::ManagerInit(msg) => {
                write!(f, "Failed to initialize Bluetooth manager: {}", msg)
            }
            CentralError::NoAdapter => {
                write!(f, "No Bluetooth adapter found. Please ensure Bluetooth is enabled.")
            }
        }
    }
}

impl std::error::Error for CentralError {}

/// A connection lifecycle transition that falls off the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid connection state transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for StateError {}

/// Errors that can occur while reading or mutating the device roster.
#[derive(Debug)]
pub enum StoreError {
    /// Failed to read the roster file
    ReadFailed(std::io::Error),
    /// Failed to write the roster file
    WriteFailed(std::io::Error),
    /// Failed to parse the roster file
    ParseFailed(toml::de::Error),
    /// Failed to serialize the roster
    SerializeFailed(toml::ser::Error),
    /// No platform data directory to place the roster in
    NoDataDir,
    /// The device is not in the roster
    UnknownDevice(DeviceId),
    /// A state change was rejected by the lifecycle ring
    State(StateError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ReadFailed(e) => {
                write!(f, "Failed to read device list: {}", e)
            }
            StoreError::WriteFailed(e) => {
                write!(f, "Failed to write device list: {}", e)
            }
            StoreError::ParseFailed(e) => {
                write!(f, "Failed to parse device list: {}", e)
            }
            StoreError::SerializeFailed(e) => {
                write!(f, "Failed to serialize device list: {}", e)
            }
            StoreError::NoDataDir => {
                write!(f, "Could not determine a data directory for the device list")
            }
            StoreError::UnknownDevice(id) => {
                write!(f, "Device {} is not in the saved list", id)
            }
            StoreError::State(e) => {
                write!(f, "Rejected state change: {}", e)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::ReadFailed(e) => Some(e),
            StoreError::WriteFailed(e) => Some(e),
            StoreError::ParseFailed(e) => Some(e),
            StoreError::SerializeFailed(e) => Some(e),
            StoreError::State(e) => Some(e),
            StoreError::NoDataDir | StoreError::UnknownDevice(_) => None,
        }
    }
}

impl From<StateError> for StoreError {
    fn from(e: StateError) -> Self {
        StoreError::State(e)
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// No platform configuration directory available
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::NoConfigDir => {
                write!(f, "Could not determine a configuration directory")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::NoConfigDir => None,
        }
    }
}

/// Errors from the tracker workflow that drives both session and roster.
#[derive(Debug)]
pub enum TrackerError {
    /// The underlying session operation failed
    Session(SessionError),
    /// The roster could not be read or updated
    Store(StoreError),
    /// The device is not in the current discovery list
    NotDiscovered(DeviceId),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Session(e) => {
                write!(f, "Bluetooth operation failed: {}", e)
            }
            TrackerError::Store(e) => {
                write!(f, "Device list operation failed: {}", e)
            }
            TrackerError::NotDiscovered(id) => {
                write!(f, "Device {} has not been discovered in the current scan", id)
            }
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerError::Session(e) => Some(e),
            TrackerError::Store(e) => Some(e),
            TrackerError::NotDiscovered(_) => None,
        }
    }
}

impl From<SessionError> for TrackerError {
    fn from(e: SessionError) -> Self {
        TrackerError::Session(e)
    }
}

impl From<StoreError> for TrackerError {
    fn from(e: StoreError) -> Self {
        TrackerError::Store(e)
    }
}
