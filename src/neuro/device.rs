//! Seam towards the vendor SDK. Discovery and acquisition are opaque; the
//! controller only sees scan results, a sensor handle and sample channels.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use super::{ResistSample, SensorInfo, SensorState, SignalSample};
use crate::feed::StatusEvent;

pub trait SensorBackend: Send + Sync {
    fn start_scan(&self) -> Result<()>;

    /// Stops scanning and returns every sensor seen since `start_scan`.
    fn stop_scan(&self) -> Vec<SensorInfo>;

    fn create_sensor(&self, info: &SensorInfo) -> Result<Arc<dyn Sensor>>;
}

pub trait Sensor: Send + Sync {
    fn info(&self) -> &SensorInfo;
    fn state(&self) -> SensorState;
    fn battery(&self) -> u8;

    /// State and battery notifications for as long as the sensor stays
    /// connected. A new subscription replaces the previous one.
    fn subscribe_status(&self) -> mpsc::Receiver<StatusEvent>;

    /// Signal arrives in batches; the channel closes when the stream stops.
    fn start_signal(&self) -> Result<mpsc::Receiver<Vec<SignalSample>>>;
    fn stop_signal(&self);

    fn start_resist(&self) -> Result<mpsc::Receiver<ResistSample>>;
    fn stop_resist(&self);

    fn disconnect(&self);
}
