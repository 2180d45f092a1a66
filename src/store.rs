//! # Device Store Module
//!
//! Persisted roster of saved devices. Every mutation writes straight through
//! to a TOML file so the roster survives restarts without an explicit save
//! step.
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/blueroster/devices.toml
//! - Linux: ~/.local/share/blueroster/devices.toml
//! - Windows: %APPDATA%\blueroster\devices.toml

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::device::{ConnectionState, DeviceId, DeviceRecord};
use crate::error::StoreError;

/// On-disk shape of the roster file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RosterFile {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

/// Default roster location under the platform data directory.
pub fn default_devices_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir().ok_or(StoreError::NoDataDir)?;
    Ok(data_dir.join("blueroster").join("devices.toml"))
}

/// Persisted collection of saved devices.
#[derive(Debug)]
pub struct DeviceStore {
    path: PathBuf,
    devices: Vec<DeviceRecord>,
}

impl DeviceStore {
    /// Open the roster at the default platform location.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(default_devices_path()?)
    }

    /// Open a roster file, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let devices = match fs::read_to_string(&path) {
            Ok(contents) => {
                let file: RosterFile =
                    toml::from_str(&contents).map_err(StoreError::ParseFailed)?;
                file.devices
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::ReadFailed(e)),
        };
        debug!("Loaded {} saved devices from {}", devices.len(), path.display());
        Ok(Self { path, devices })
    }

    /// Where this roster persists.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Look up a saved device.
    pub fn get(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.id == *id)
    }

    /// All saved devices, most recently seen first.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        let mut devices = self.devices.clone();
        devices.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        devices
    }

    /// Insert or replace a record by id, then persist.
    pub fn insert(&mut self, record: DeviceRecord) -> Result<(), StoreError> {
        match self.devices.iter_mut().find(|d| d.id == record.id) {
            Some(existing) => *existing = record,
            None => self.devices.push(record),
        }
        self.persist()
    }

    /// Remove a record, reporting whether the id was saved at all.
    pub fn remove(&mut self, id: &DeviceId) -> Result<bool, StoreError> {
        let before = self.devices.len();
        self.devices.retain(|d| d.id != *id);
        if self.devices.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Apply a connection lifecycle transition to a saved device.
    ///
    /// Transitions must follow the ring
    /// `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`
    /// (with the failure edge `Connecting -> Disconnected`); anything else is
    /// rejected without touching the file.
    pub fn set_state(&mut self, id: &DeviceId, state: ConnectionState) -> Result<(), StoreError> {
        let record = self
            .devices
            .iter_mut()
            .find(|d| d.id == *id)
            .ok_or_else(|| StoreError::UnknownDevice(id.clone()))?;
        record.state = record.state.transition(state).map_err(StoreError::State)?;
        debug!("{} is now {}", id, state);
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::WriteFailed)?;
        }
        let file = RosterFile {
            devices: self.devices.clone(),
        };
        let contents = toml::to_string_pretty(&file).map_err(StoreError::SerializeFailed)?;
        fs::write(&self.path, contents).map_err(StoreError::WriteFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn record(id: &str, minutes_ago: i64) -> DeviceRecord {
        let mut record = DeviceRecord::from_discovery(
            DeviceId::from(id),
            Some(format!("Device {}", id)),
            Some(-60),
        );
        record.last_seen = Utc::now() - Duration::minutes(minutes_ago);
        record
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = DeviceStore::open(dir.path().join("devices.toml")).expect("Failed to open");
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_persists_across_reopen() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("devices.toml");

        let mut store = DeviceStore::open(&path).expect("Failed to open");
        store.insert(record("AA:BB", 0)).expect("Failed to insert");
        store.insert(record("CC:DD", 1)).expect("Failed to insert");

        let reopened = DeviceStore::open(&path).expect("Failed to reopen");
        assert_eq!(reopened.len(), 2);
        let saved = reopened.get(&DeviceId::from("AA:BB")).expect("record missing");
        assert_eq!(saved.name, "Device AA:BB");
        assert_eq!(saved.rssi, -60);
        assert_eq!(saved.state, ConnectionState::Disconnected);
    }

    #[test]
    fn test_insert_replaces_existing_id() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut store = DeviceStore::open(dir.path().join("devices.toml")).expect("Failed to open");

        store.insert(record("AA:BB", 5)).expect("Failed to insert");
        let mut update = record("AA:BB", 0);
        update.rssi = -42;
        store.insert(update).expect("Failed to upsert");

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&DeviceId::from("AA:BB")).map(|d| d.rssi), Some(-42));
    }

    #[test]
    fn test_remove_reports_presence() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("devices.toml");
        let mut store = DeviceStore::open(&path).expect("Failed to open");

        store.insert(record("AA:BB", 0)).expect("Failed to insert");
        assert!(store.remove(&DeviceId::from("AA:BB")).expect("Failed to remove"));
        assert!(!store.remove(&DeviceId::from("AA:BB")).expect("Failed to remove"));

        let reopened = DeviceStore::open(&path).expect("Failed to reopen");
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_devices_sorted_by_recency() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut store = DeviceStore::open(dir.path().join("devices.toml")).expect("Failed to open");

        store.insert(record("OLD", 30)).expect("Failed to insert");
        store.insert(record("NEW", 0)).expect("Failed to insert");
        store.insert(record("MID", 10)).expect("Failed to insert");

        let ids: Vec<_> = store.devices().into_iter().map(|d| d.id).collect();
        assert_eq!(
            ids,
            vec![DeviceId::from("NEW"), DeviceId::from("MID"), DeviceId::from("OLD")]
        );
    }

    #[test]
    fn test_set_state_walks_the_ring_and_persists() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("devices.toml");
        let mut store = DeviceStore::open(&path).expect("Failed to open");
        let id = DeviceId::from("AA:BB");

        store.insert(record("AA:BB", 0)).expect("Failed to insert");
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
            ConnectionState::Disconnected,
        ] {
            store.set_state(&id, state).expect("ring transition rejected");
        }
        store.set_state(&id, ConnectionState::Connecting).expect("reconnect rejected");

        let reopened = DeviceStore::open(&path).expect("Failed to reopen");
        assert_eq!(
            reopened.get(&id).map(|d| d.state),
            Some(ConnectionState::Connecting)
        );
    }

    #[test]
    fn test_set_state_rejects_off_ring_transitions() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut store = DeviceStore::open(dir.path().join("devices.toml")).expect("Failed to open");
        let id = DeviceId::from("AA:BB");
        store.insert(record("AA:BB", 0)).expect("Failed to insert");

        let err = store
            .set_state(&id, ConnectionState::Connected)
            .expect_err("jump to Connected allowed");
        assert!(matches!(err, StoreError::State(_)));

        store.set_state(&id, ConnectionState::Connecting).expect("connect rejected");
        let err = store
            .set_state(&id, ConnectionState::Disconnecting)
            .expect_err("transient chain allowed");
        assert!(matches!(err, StoreError::State(_)));
        // The rejected transition left the record untouched.
        assert_eq!(
            store.get(&id).map(|d| d.state),
            Some(ConnectionState::Connecting)
        );
    }

    #[test]
    fn test_set_state_unknown_device() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut store = DeviceStore::open(dir.path().join("devices.toml")).expect("Failed to open");

        let err = store
            .set_state(&DeviceId::from("missing"), ConnectionState::Connecting)
            .expect_err("unknown id accepted");
        assert!(matches!(err, StoreError::UnknownDevice(_)));
    }

    #[test]
    fn test_corrupt_file_is_a_parse_error() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("devices.toml");
        fs::write(&path, "not [ valid toml").expect("Failed to write");

        let err = DeviceStore::open(&path).expect_err("corrupt file accepted");
        assert!(matches!(err, StoreError::ParseFailed(_)));
    }
}
