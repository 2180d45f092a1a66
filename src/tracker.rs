//! # Device Tracker Module
//!
//! Ties a live [`BluetoothSession`] to the saved roster: snapshots
//! discoveries into records and drives each record around the connection
//! lifecycle ring while the session talks to the radio.

use log::{debug, warn};

use crate::device::{ConnectionState, DeviceId, DeviceRecord};
use crate::error::{StoreError, TrackerError};
use crate::session::BluetoothSession;
use crate::store::DeviceStore;

pub struct DeviceTracker {
    session: BluetoothSession,
    store: DeviceStore,
}

impl DeviceTracker {
    pub fn new(session: BluetoothSession, store: DeviceStore) -> Self {
        Self { session, store }
    }

    /// The live session handle.
    pub fn session(&self) -> &BluetoothSession {
        &self.session
    }

    /// The saved roster.
    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    /// Mutable access to the roster for direct record management.
    pub fn store_mut(&mut self) -> &mut DeviceStore {
        &mut self.store
    }

    /// Saved devices, most recently seen first.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.store.devices()
    }

    /// Save a currently discovered peripheral to the roster.
    ///
    /// Missing advertisement data falls back to the save defaults: name
    /// `"Unknown"`, RSSI `0`. Re-saving a known device refreshes its name,
    /// RSSI and recency but keeps its connection state, so an active
    /// connection cannot be reset by a rescan.
    pub fn save_discovered(&mut self, id: &DeviceId) -> Result<DeviceRecord, TrackerError> {
        let peripheral = self
            .session
            .peripherals()
            .into_iter()
            .find(|p| p.id == *id)
            .ok_or_else(|| TrackerError::NotDiscovered(id.clone()))?;
        let mut record = DeviceRecord::from_discovery(
            peripheral.id,
            peripheral.name,
            self.session.signal_strength(id),
        );
        if let Some(existing) = self.store.get(id) {
            record.state = existing.state;
        }
        debug!("Saving {} as {:?}", id, record.name);
        self.store.insert(record.clone())?;
        Ok(record)
    }

    /// Remove a device from the roster, reporting whether it was saved.
    pub fn forget(&mut self, id: &DeviceId) -> Result<bool, TrackerError> {
        Ok(self.store.remove(id)?)
    }

    /// Connect to a saved device, walking its record around the state ring.
    ///
    /// The record passes through `Connecting` while the radio works. On
    /// success it settles at `Connected`; on failure it resets to
    /// `Disconnected` and the failure is returned. A record already in a
    /// transient state (or already connected) rejects the attempt before the
    /// radio is touched.
    pub async fn connect(&mut self, id: &DeviceId) -> Result<DeviceRecord, TrackerError> {
        self.store.set_state(id, ConnectionState::Connecting)?;
        match self.session.connect(id).await {
            Ok(_) => {
                self.store.set_state(id, ConnectionState::Connected)?;
                self.record(id)
            }
            Err(e) => {
                self.reset_to_disconnected(id);
                Err(TrackerError::Session(e))
            }
        }
    }

    /// Disconnect a saved device.
    ///
    /// The record settles at `Disconnected` whether the radio reported the
    /// disconnect as benign or as an error, since the link is down either
    /// way; an error is still returned to the caller.
    pub async fn disconnect(&mut self, id: &DeviceId) -> Result<DeviceRecord, TrackerError> {
        self.store.set_state(id, ConnectionState::Disconnecting)?;
        let outcome = self.session.disconnect(id).await;
        self.store.set_state(id, ConnectionState::Disconnected)?;
        match outcome {
            Ok(_) => self.record(id),
            Err(e) => Err(TrackerError::Session(e)),
        }
    }

    fn record(&self, id: &DeviceId) -> Result<DeviceRecord, TrackerError> {
        self.store
            .get(id)
            .cloned()
            .ok_or_else(|| TrackerError::Store(StoreError::UnknownDevice(id.clone())))
    }

    fn reset_to_disconnected(&mut self, id: &DeviceId) {
        if let Err(e) = self.store.set_state(id, ConnectionState::Disconnected) {
            warn!("Could not reset {} after failed connect: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::fake::{FakeCentral, LinkCall};
    use crate::central::CentralEvent;
    use crate::error::SessionError;
    use crate::session::SessionOptions;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

    fn harness() -> (
        DeviceTracker,
        UnboundedSender<CentralEvent>,
        UnboundedReceiver<LinkCall>,
        TempDir,
    ) {
        let dir = tempdir().expect("Failed to create temp dir");
        let store =
            DeviceStore::open(dir.path().join("devices.toml")).expect("Failed to open store");
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (link, calls) = FakeCentral::new();
        let session =
            BluetoothSession::with_link(link, event_rx, SessionOptions { auto_scan: false });
        (DeviceTracker::new(session, store), event_tx, calls, dir)
    }

    fn discovered(id: &str, name: Option<&str>, rssi: Option<i16>) -> CentralEvent {
        CentralEvent::PeripheralDiscovered {
            id: DeviceId::from(id),
            name: name.map(str::to_string),
            rssi,
        }
    }

    async fn await_discovery(session: &BluetoothSession, id: &DeviceId) {
        let mut updates = session.subscribe();
        updates
            .wait_for(|s| s.peripherals.iter().any(|p| p.id == *id))
            .await
            .expect("session stopped");
    }

    #[tokio::test]
    async fn test_save_discovered_uses_defaults() {
        let (mut tracker, events, _calls, _dir) = harness();
        let id = DeviceId::from("A");
        events.send(discovered("A", None, None)).unwrap();
        await_discovery(tracker.session(), &id).await;

        let record = tracker.save_discovered(&id).expect("save failed");
        assert_eq!(record.name, "Unknown");
        assert_eq!(record.rssi, 0);
        assert_eq!(record.state, ConnectionState::Disconnected);
        assert_eq!(tracker.devices().len(), 1);
    }

    #[tokio::test]
    async fn test_save_requires_discovery() {
        let (mut tracker, _events, _calls, _dir) = harness();

        let err = tracker
            .save_discovered(&DeviceId::from("ghost"))
            .expect_err("undiscovered device saved");
        assert!(matches!(err, TrackerError::NotDiscovered(_)));
    }

    #[tokio::test]
    async fn test_forget_reports_presence() {
        let (mut tracker, events, _calls, _dir) = harness();
        let id = DeviceId::from("A");
        events.send(discovered("A", Some("Alpha"), Some(-60))).unwrap();
        await_discovery(tracker.session(), &id).await;

        tracker.save_discovered(&id).expect("save failed");
        assert!(tracker.forget(&id).expect("forget failed"));
        assert!(tracker.devices().is_empty());
        assert!(!tracker.forget(&id).expect("forget failed"));
    }

    #[tokio::test]
    async fn test_save_connect_disconnect_lifecycle() {
        let (mut tracker, events, mut calls, _dir) = harness();
        let session = tracker.session().clone();
        let id = DeviceId::from("A1");

        events.send(discovered("A1", Some("Sensor"), Some(-60))).unwrap();
        await_discovery(&session, &id).await;

        let record = tracker.save_discovered(&id).expect("save failed");
        assert_eq!(record.name, "Sensor");
        assert_eq!(record.rssi, -60);
        assert_eq!(record.state, ConnectionState::Disconnected);

        // Connect: the record passes through Connecting and settles Connected.
        let task = {
            let id = id.clone();
            tokio::spawn(async move {
                let result = tracker.connect(&id).await;
                (tracker, result)
            })
        };
        let mut updates = session.subscribe();
        updates
            .wait_for(|s| s.statuses.get(&id).map(String::as_str) == Some("Connecting..."))
            .await
            .expect("session stopped");
        events
            .send(CentralEvent::PeripheralConnected { id: id.clone() })
            .unwrap();
        let (mut tracker, result) = task.await.unwrap();
        let record = result.expect("connect failed");
        assert_eq!(record.state, ConnectionState::Connected);
        assert_eq!(
            session.connection_status(&id).as_deref(),
            Some("Connected to Sensor")
        );

        // Disconnect: benign callback settles the record Disconnected.
        let task = {
            let id = id.clone();
            tokio::spawn(async move {
                let result = tracker.disconnect(&id).await;
                (tracker, result)
            })
        };
        loop {
            if calls.recv().await == Some(LinkCall::Disconnect(id.clone())) {
                break;
            }
        }
        events
            .send(CentralEvent::PeripheralDisconnected { id: id.clone(), error: None })
            .unwrap();
        let (tracker, result) = task.await.unwrap();
        let record = result.expect("disconnect failed");
        assert_eq!(record.state, ConnectionState::Disconnected);
        assert_eq!(session.connection_status(&id).as_deref(), Some("Disconnected"));
        assert_eq!(tracker.devices()[0].state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_resets_record() {
        let (mut tracker, events, _calls, _dir) = harness();
        let session = tracker.session().clone();
        let id = DeviceId::from("A");

        events.send(discovered("A", Some("Alpha"), Some(-60))).unwrap();
        await_discovery(&session, &id).await;
        tracker.save_discovered(&id).expect("save failed");

        let task = {
            let id = id.clone();
            tokio::spawn(async move {
                let result = tracker.connect(&id).await;
                (tracker, result)
            })
        };
        let mut updates = session.subscribe();
        updates
            .wait_for(|s| s.statuses.contains_key(&id))
            .await
            .expect("session stopped");
        events
            .send(CentralEvent::ConnectFailed { id: id.clone(), error: None })
            .unwrap();

        let (tracker, result) = task.await.unwrap();
        let err = result.expect_err("connect succeeded");
        assert!(matches!(
            err,
            TrackerError::Session(SessionError::UnknownFailure)
        ));
        assert_eq!(
            tracker.store().get(&id).map(|d| d.state),
            Some(ConnectionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_connect_rejected_while_transient() {
        let (mut tracker, events, mut calls, _dir) = harness();
        let id = DeviceId::from("A");

        events.send(discovered("A", Some("Alpha"), Some(-60))).unwrap();
        await_discovery(tracker.session(), &id).await;
        tracker.save_discovered(&id).expect("save failed");
        tracker
            .store_mut()
            .set_state(&id, ConnectionState::Connecting)
            .expect("state change failed");

        let err = tracker.connect(&id).await.expect_err("transient connect accepted");
        assert!(matches!(err, TrackerError::Store(StoreError::State(_))));
        // The radio was never asked.
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_requires_connected_record() {
        let (mut tracker, events, _calls, _dir) = harness();
        let id = DeviceId::from("A");

        events.send(discovered("A", Some("Alpha"), Some(-60))).unwrap();
        await_discovery(tracker.session(), &id).await;
        tracker.save_discovered(&id).expect("save failed");

        let err = tracker
            .disconnect(&id)
            .await
            .expect_err("disconnect of idle record accepted");
        assert!(matches!(err, TrackerError::Store(StoreError::State(_))));
    }

    #[tokio::test]
    async fn test_disconnect_error_still_settles_record() {
        let (mut tracker, events, mut calls, _dir) = harness();
        let session = tracker.session().clone();
        let id = DeviceId::from("A");

        events.send(discovered("A", Some("Alpha"), Some(-60))).unwrap();
        await_discovery(&session, &id).await;
        tracker.save_discovered(&id).expect("save failed");
        tracker
            .store_mut()
            .set_state(&id, ConnectionState::Connecting)
            .expect("state change failed");
        tracker
            .store_mut()
            .set_state(&id, ConnectionState::Connected)
            .expect("state change failed");

        let task = {
            let id = id.clone();
            tokio::spawn(async move {
                let result = tracker.disconnect(&id).await;
                (tracker, result)
            })
        };
        loop {
            if calls.recv().await == Some(LinkCall::Disconnect(id.clone())) {
                break;
            }
        }
        events
            .send(CentralEvent::PeripheralDisconnected {
                id: id.clone(),
                error: Some("Timeout".to_string()),
            })
            .unwrap();

        let (tracker, result) = task.await.unwrap();
        let err = result.expect_err("disconnect succeeded");
        assert!(matches!(
            err,
            TrackerError::Session(SessionError::ConnectionFailed(_))
        ));
        assert_eq!(
            tracker.store().get(&id).map(|d| d.state),
            Some(ConnectionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_resave_keeps_connection_state() {
        let (mut tracker, events, _calls, _dir) = harness();
        let id = DeviceId::from("A");

        events.send(discovered("A", Some("Alpha"), Some(-60))).unwrap();
        await_discovery(tracker.session(), &id).await;
        tracker.save_discovered(&id).expect("save failed");
        tracker
            .store_mut()
            .set_state(&id, ConnectionState::Connecting)
            .expect("state change failed");
        tracker
            .store_mut()
            .set_state(&id, ConnectionState::Connected)
            .expect("state change failed");

        // A rescan sees the device again with a fresher reading.
        events.send(discovered("A", Some("Alpha"), Some(-48))).unwrap();
        let mut updates = tracker.session().subscribe();
        updates
            .wait_for(|s| s.signal_strengths.get(&id) == Some(&-48))
            .await
            .expect("session stopped");

        let record = tracker.save_discovered(&id).expect("resave failed");
        assert_eq!(record.rssi, -48);
        assert_eq!(record.state, ConnectionState::Connected);
        assert_eq!(
            tracker.store().get(&id).map(|d| d.state),
            Some(ConnectionState::Connected)
        );
    }
}
