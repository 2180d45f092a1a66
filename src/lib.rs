//! # blueroster
//!
//! Bluetooth LE session bridge with a persisted device roster.
//!
//! The crate has two halves. [`BluetoothSession`] wraps a callback-driven
//! radio backend into observable state (discovered peripherals, signal
//! strengths, connection status text) plus awaitable `connect` and
//! `disconnect` operations. [`DeviceStore`] keeps saved devices on disk with
//! a connection lifecycle state machine, and [`DeviceTracker`] drives both
//! together: save a discovery, connect it, disconnect it, forget it.
//!
//! There is no UI here; any frontend can watch the session state and render
//! it however it likes.
//!
//! ```no_run
//! use blueroster::{BluetoothSession, Config, DeviceStore, DeviceTracker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     blueroster::init_logging();
//!     let config = Config::load()?;
//!
//!     let session = BluetoothSession::open(config.session_options()).await?;
//!     session.start_scanning().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     session.stop_scanning().await?;
//!
//!     let store = DeviceStore::open(config.devices_path()?)?;
//!     let mut tracker = DeviceTracker::new(session.clone(), store);
//!     if let Some(peripheral) = session.peripherals().first() {
//!         let record = tracker.save_discovered(&peripheral.id)?;
//!         tracker.connect(&record.id).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod central;
pub mod config;
pub mod device;
pub mod error;
pub mod session;
pub mod store;
pub mod tracker;

pub use btle::BtleCentral;
pub use central::{AdapterState, CentralEvent, CentralLink, EventReceiver, EventSender};
pub use config::Config;
pub use device::{ConnectionState, DeviceId, DeviceRecord, DiscoveredPeripheral};
pub use error::{
    CentralError, ConfigError, SessionError, StateError, StoreError, TrackerError,
};
pub use session::{BluetoothSession, SessionOptions, SessionState};
pub use store::{default_devices_path, DeviceStore};
pub use tracker::DeviceTracker;

/// Initialize logging with an `info` default filter.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
