use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex,
};

use anyhow::{bail, Result};
use rand::prelude::*;
use tokio::{
    sync::mpsc,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{
    device::{Sensor, SensorBackend},
    ResistSample, SensorInfo, SensorState, SignalSample,
};
use crate::feed::StatusEvent;

const MOCK_SENSOR_COUNT: usize = 3;
const SCAN_DISCOVERY_DELAY: Duration = Duration::from_millis(500);
const SIGNAL_BATCH_SIZE: usize = 25;
const SIGNAL_BATCH_INTERVAL: Duration = Duration::from_millis(100);
const RESIST_INTERVAL: Duration = Duration::from_secs(1);
const BATTERY_DRAIN_INTERVAL: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;

/// Stand-in for the vendor scanner so the app runs without a headset.
pub struct SimulatedBackend {
    scan_started: Mutex<Option<Instant>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            scan_started: Mutex::new(None),
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_sensor_info(index: usize) -> SensorInfo {
    SensorInfo {
        index,
        name: format!("MockBrainBit-{index}"),
        address: format!("00:11:22:33:44:{index:02}"),
        serial_number: format!("MB{}", 1000 + index),
    }
}

impl SensorBackend for SimulatedBackend {
    fn start_scan(&self) -> Result<()> {
        let mut started = self
            .scan_started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *started = Some(Instant::now());
        Ok(())
    }

    fn stop_scan(&self) -> Vec<SensorInfo> {
        let started = self
            .scan_started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match started {
            Some(at) if at.elapsed() >= SCAN_DISCOVERY_DELAY => {
                (0..MOCK_SENSOR_COUNT).map(mock_sensor_info).collect()
            }
            _ => Vec::new(),
        }
    }

    fn create_sensor(&self, info: &SensorInfo) -> Result<Arc<dyn Sensor>> {
        Ok(Arc::new(SimulatedSensor::new(info.clone())))
    }
}

struct SensorStreams {
    state: SensorState,
    signal: Option<CancellationToken>,
    resist: Option<CancellationToken>,
    status: Option<CancellationToken>,
}

pub struct SimulatedSensor {
    info: SensorInfo,
    battery: Arc<AtomicU8>,
    streams: Mutex<SensorStreams>,
}

impl SimulatedSensor {
    pub fn new(info: SensorInfo) -> Self {
        Self {
            info,
            battery: Arc::new(AtomicU8::new(thread_rng().gen_range(70..=100))),
            streams: Mutex::new(SensorStreams {
                state: SensorState::InRange,
                signal: None,
                resist: None,
                status: None,
            }),
        }
    }

    fn streams(&self) -> std::sync::MutexGuard<'_, SensorStreams> {
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Sensor for SimulatedSensor {
    fn info(&self) -> &SensorInfo {
        &self.info
    }

    fn state(&self) -> SensorState {
        self.streams().state
    }

    fn battery(&self) -> u8 {
        self.battery.load(Ordering::Relaxed)
    }

    fn subscribe_status(&self) -> mpsc::Receiver<StatusEvent> {
        let mut streams = self.streams();
        if let Some(previous) = streams.status.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(drain_battery(Arc::clone(&self.battery), tx, token.clone()));
        streams.status = Some(token);
        rx
    }

    fn start_signal(&self) -> Result<mpsc::Receiver<Vec<SignalSample>>> {
        let mut streams = self.streams();
        if streams.state != SensorState::InRange {
            bail!("sensor {} is out of range", self.info.name);
        }
        if let Some(previous) = streams.signal.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(generate_signal(tx, token.clone()));
        streams.signal = Some(token);
        Ok(rx)
    }

    fn stop_signal(&self) {
        if let Some(token) = self.streams().signal.take() {
            token.cancel();
        }
    }

    fn start_resist(&self) -> Result<mpsc::Receiver<ResistSample>> {
        let mut streams = self.streams();
        if streams.state != SensorState::InRange {
            bail!("sensor {} is out of range", self.info.name);
        }
        if let Some(previous) = streams.resist.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(generate_resist(tx, token.clone()));
        streams.resist = Some(token);
        Ok(rx)
    }

    fn stop_resist(&self) {
        if let Some(token) = self.streams().resist.take() {
            token.cancel();
        }
    }

    fn disconnect(&self) {
        let mut streams = self.streams();
        let tokens = [
            streams.signal.take(),
            streams.resist.take(),
            streams.status.take(),
        ];
        for token in tokens.into_iter().flatten() {
            token.cancel();
        }
        streams.state = SensorState::OutOfRange;
    }
}

fn mock_signal_sample(rng: &mut impl Rng) -> SignalSample {
    let base = rng.gen_range(-50.0..50.0);
    let noise = rng.gen_range(-20.0..20.0);
    let mut channel = || base + noise + rng.gen_range(-10.0..10.0);
    SignalSample {
        o1: channel(),
        o2: channel(),
        t3: channel(),
        t4: channel(),
    }
}

async fn generate_signal(tx: mpsc::Sender<Vec<SignalSample>>, token: CancellationToken) {
    let mut ticker = time::interval(SIGNAL_BATCH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rng = StdRng::from_entropy();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let batch = (0..SIGNAL_BATCH_SIZE).map(|_| mock_signal_sample(&mut rng)).collect();
                if tx.send(batch).await.is_err() {
                    break;
                }
            }
            _ = token.cancelled() => break,
        }
    }
}

/// Loses one percent per interval until empty.
async fn drain_battery(
    battery: Arc<AtomicU8>,
    tx: mpsc::Sender<StatusEvent>,
    token: CancellationToken,
) {
    let mut ticker = time::interval_at(
        Instant::now() + BATTERY_DRAIN_INTERVAL,
        BATTERY_DRAIN_INTERVAL,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Ok(previous) = battery.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |level| {
                    level.checked_sub(1)
                }) else {
                    continue;
                };
                let event = StatusEvent::BatteryChanged { battery: previous - 1 };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            _ = token.cancelled() => break,
        }
    }
}

async fn generate_resist(tx: mpsc::Sender<ResistSample>, token: CancellationToken) {
    let mut ticker = time::interval(RESIST_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rng = StdRng::from_entropy();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut ohms = || rng.gen_range(1_500_000.0..3_000_000.0);
                let sample = ResistSample {
                    o1: ohms(),
                    o2: ohms(),
                    t3: ohms(),
                    t4: ohms(),
                };
                if tx.send(sample).await.is_err() {
                    break;
                }
            }
            _ = token.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn scan_finds_sensors_after_discovery_delay() {
        let backend = SimulatedBackend::new();
        backend.start_scan().unwrap();
        assert!(backend.stop_scan().is_empty());

        backend.start_scan().unwrap();
        time::sleep(Duration::from_secs(1)).await;
        let found = backend.stop_scan();
        assert_eq!(found.len(), 3);
        assert_eq!(found[1].name, "MockBrainBit-1");
        assert_eq!(found[1].address, "00:11:22:33:44:01");
        assert_eq!(found[1].serial_number, "MB1001");
    }

    #[tokio::test(start_paused = true)]
    async fn signal_stream_delivers_batches_until_stopped() {
        let sensor = SimulatedSensor::new(mock_sensor_info(0));
        assert!((70..=100).contains(&sensor.battery()));

        let mut rx = sensor.start_signal().unwrap();
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), SIGNAL_BATCH_SIZE);

        sensor.stop_signal();
        while rx.recv().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn battery_drains_while_subscribed() {
        let sensor = SimulatedSensor::new(mock_sensor_info(1));
        let start = sensor.battery();
        let mut status = sensor.subscribe_status();

        assert_eq!(
            status.recv().await,
            Some(StatusEvent::BatteryChanged { battery: start - 1 })
        );
        assert_eq!(sensor.battery(), start - 1);

        sensor.disconnect();
        assert_eq!(status.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_sensor_refuses_streams() {
        let sensor = SimulatedSensor::new(mock_sensor_info(2));
        let mut resist = sensor.start_resist().unwrap();
        let sample = resist.recv().await.unwrap();
        assert!((1_500_000.0..3_000_000.0).contains(&sample.t4));

        sensor.disconnect();
        assert_eq!(sensor.state(), SensorState::OutOfRange);
        assert!(sensor.start_signal().is_err());
        while resist.recv().await.is_some() {}
    }
}
