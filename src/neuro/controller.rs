use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    device::{Sensor, SensorBackend},
    emotions::{EmotionalMath, EmotionsProcessor},
    DeviceStatus, SensorInfo, SensorState, SensorStatus, StreamKind,
};
use crate::{
    attention::MetricsStream,
    feed::{FeedHub, FeedSubscription, StatusEvent, StreamMessage},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub type MathFactory = Arc<dyn Fn() -> Box<dyn EmotionalMath> + Send + Sync>;

/// A forwarding task from a sensor channel into the hub. Cancelled on drop.
struct StreamTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamTask {
    fn spawn<T, F>(mut rx: mpsc::Receiver<T>, mut forward: F) -> Self
    where
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    item = rx.recv() => match item {
                        Some(item) => forward(item),
                        None => break,
                    },
                    _ = cancelled.cancelled() => break,
                }
            }
        });
        Self { token, handle }
    }
}

impl Drop for StreamTask {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Signal and emotions share the sensor's signal channel, so only one of
/// them can be active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalMode {
    Raw,
    Emotions,
}

#[derive(Default)]
struct NeuroInner {
    discovered: Vec<SensorInfo>,
    sensor: Option<Arc<dyn Sensor>>,
    signal: Option<(SignalMode, StreamTask)>,
    resist: Option<StreamTask>,
    status: Option<StreamTask>,
}

impl NeuroInner {
    fn connected_sensor(&self) -> Result<Arc<dyn Sensor>> {
        match &self.sensor {
            Some(sensor) if sensor.state() == SensorState::InRange => Ok(Arc::clone(sensor)),
            _ => Err(anyhow!("Sensor not connected")),
        }
    }
}

/// Device lifecycle: scanning, connecting and the data streams of a single
/// headset. Everything it receives is republished on the [`FeedHub`].
#[derive(Clone)]
pub struct NeuroController {
    inner: Arc<Mutex<NeuroInner>>,
    backend: Arc<dyn SensorBackend>,
    hub: FeedHub,
    math_factory: MathFactory,
}

impl NeuroController {
    pub fn new(backend: Arc<dyn SensorBackend>, hub: FeedHub, math_factory: MathFactory) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NeuroInner::default())),
            backend,
            hub,
            math_factory,
        }
    }

    fn lock(&self) -> MutexGuard<'_, NeuroInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected_sensor().is_ok()
    }

    pub fn status(&self) -> DeviceStatus {
        let inner = self.lock();
        let sensor_info = inner.sensor.as_ref().map(|sensor| {
            let info = sensor.info();
            SensorStatus {
                name: info.name.clone(),
                address: info.address.clone(),
                serial_number: info.serial_number.clone(),
                battery: sensor.battery(),
                state: sensor.state(),
            }
        });
        DeviceStatus {
            connected: inner.connected_sensor().is_ok(),
            sensor_info,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub async fn scan_devices(&self, duration: Duration) -> Result<Vec<SensorInfo>> {
        self.lock().discovered.clear();
        self.backend.start_scan().context("failed to start scanner")?;
        tokio::time::sleep(duration).await;

        let found: Vec<SensorInfo> = self
            .backend
            .stop_scan()
            .into_iter()
            .enumerate()
            .map(|(index, info)| SensorInfo { index, ..info })
            .collect();

        log_info!("Scan finished, {} sensor(s) found", found.len());
        self.lock().discovered = found.clone();
        Ok(found)
    }

    pub fn connect_sensor(&self, index: usize) -> Result<bool> {
        let info = {
            let inner = self.lock();
            inner
                .discovered
                .get(index)
                .cloned()
                .ok_or_else(|| anyhow!("Invalid sensor index: {index}"))?
        };

        // A previous headset is released before the new one takes over.
        self.disconnect_sensor();

        let sensor = self
            .backend
            .create_sensor(&info)
            .with_context(|| format!("failed to connect to {}", info.name))?;
        let state = sensor.state();
        let battery = sensor.battery();
        let hub = self.hub.clone();
        let status = StreamTask::spawn(sensor.subscribe_status(), move |event| {
            hub.publish(StreamMessage::Status(event));
        });
        {
            let mut inner = self.lock();
            inner.sensor = Some(sensor);
            inner.status = Some(status);
        }

        log_info!("Connected to {} ({})", info.name, info.address);
        self.hub
            .publish(StreamMessage::Status(StatusEvent::StateChanged { state }));
        self.hub
            .publish(StreamMessage::Status(StatusEvent::BatteryChanged { battery }));

        Ok(state == SensorState::InRange)
    }

    pub fn disconnect_sensor(&self) {
        let sensor = {
            let mut inner = self.lock();
            inner.signal = None;
            inner.resist = None;
            inner.status = None;
            inner.sensor.take()
        };

        if let Some(sensor) = sensor {
            sensor.disconnect();
            log_info!("Disconnected from {}", sensor.info().name);
            self.hub.publish(StreamMessage::Status(StatusEvent::StateChanged {
                state: SensorState::OutOfRange,
            }));
        }
    }

    pub fn start_stream(&self, kind: StreamKind) -> Result<()> {
        match kind {
            StreamKind::Signal => self.start_signal(),
            StreamKind::Resist => self.start_resist(),
            StreamKind::Emotions => self.start_emotions_stream(),
        }
    }

    pub fn stop_stream(&self, kind: StreamKind) {
        match kind {
            StreamKind::Signal => self.stop_signal_mode(SignalMode::Raw),
            StreamKind::Resist => self.stop_resist(),
            StreamKind::Emotions => self.stop_signal_mode(SignalMode::Emotions),
        }
    }

    pub fn active_streams(&self) -> Vec<StreamKind> {
        let inner = self.lock();
        let mut active = Vec::new();
        match inner.signal.as_ref().map(|(mode, _)| *mode) {
            Some(SignalMode::Raw) => active.push(StreamKind::Signal),
            Some(SignalMode::Emotions) => active.push(StreamKind::Emotions),
            None => {}
        }
        if inner.resist.is_some() {
            active.push(StreamKind::Resist);
        }
        active
    }

    fn start_signal(&self) -> Result<()> {
        let mut inner = self.lock();
        let sensor = inner.connected_sensor()?;
        if matches!(inner.signal, Some((SignalMode::Emotions, _))) {
            bail!("Emotions stream is active, stop it before starting raw signal");
        }
        inner.signal = None;
        let rx = sensor.start_signal().context("Error starting signal")?;

        let hub = self.hub.clone();
        let task = StreamTask::spawn(rx, move |batch| {
            hub.publish(StreamMessage::Signal(batch));
        });
        inner.signal = Some((SignalMode::Raw, task));
        log_info!("Started signal streaming");
        Ok(())
    }

    fn start_resist(&self) -> Result<()> {
        let mut inner = self.lock();
        let sensor = inner.connected_sensor()?;
        inner.resist = None;
        let rx = sensor.start_resist().context("Error starting resist")?;

        let hub = self.hub.clone();
        let task = StreamTask::spawn(rx, move |sample| {
            hub.publish(StreamMessage::Resist(sample));
        });
        inner.resist = Some(task);
        log_info!("Started resist streaming");
        Ok(())
    }

    fn start_emotions_stream(&self) -> Result<()> {
        let mut inner = self.lock();
        let sensor = inner.connected_sensor()?;
        inner.signal = None;

        let mut processor = EmotionsProcessor::new((self.math_factory)());
        processor.start_calibration();
        let rx = sensor.start_signal().context("Error starting emotions")?;

        let hub = self.hub.clone();
        let task = StreamTask::spawn(rx, move |batch| {
            if let Some(payload) = processor.process(&batch) {
                hub.publish(StreamMessage::Emotions(payload));
            }
        });
        inner.signal = Some((SignalMode::Emotions, task));
        log_info!("Started emotions streaming");
        Ok(())
    }

    fn stop_signal_mode(&self, mode: SignalMode) {
        let mut inner = self.lock();
        let Ok(sensor) = inner.connected_sensor() else {
            return;
        };
        match inner.signal.as_ref().map(|(active, _)| *active) {
            Some(active) if active == mode => {
                inner.signal = None;
                sensor.stop_signal();
                log_info!("Stopped {:?} signal streaming", mode);
            }
            Some(active) => {
                log_warn!("Ignoring stop for {:?}, signal is in {:?} mode", mode, active);
            }
            None => log_debug!("No signal stream to stop"),
        }
    }

    fn stop_resist(&self) {
        let mut inner = self.lock();
        let Ok(sensor) = inner.connected_sensor() else {
            return;
        };
        if inner.resist.take().is_some() {
            sensor.stop_resist();
            log_info!("Stopped resist streaming");
        }
    }
}

impl MetricsStream for NeuroController {
    fn start_emotions(&self) -> Result<()> {
        if !self.is_connected() {
            bail!("Connect a BrainBit headset before loading a video");
        }
        self.start_emotions_stream().map_err(|err| {
            log_error!("Error starting emotions: {err:#}");
            err
        })
    }

    fn stop_emotions(&self) {
        self.stop_signal_mode(SignalMode::Emotions);
    }

    fn subscribe(&self) -> FeedSubscription {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neuro::{emotions::SimulatedMath, simulated::SimulatedBackend};
    use rand::{rngs::StdRng, SeedableRng};
    use tokio::time;

    fn controller() -> NeuroController {
        let factory: MathFactory = Arc::new(|| {
            Box::new(
                SimulatedMath::with_rng(1, StdRng::seed_from_u64(3))
                    .with_artifact_probabilities(0.0, 0.0),
            ) as Box<dyn EmotionalMath>
        });
        NeuroController::new(Arc::new(SimulatedBackend::new()), FeedHub::new(64), factory)
    }

    async fn connected() -> NeuroController {
        let controller = controller();
        controller.scan_devices(Duration::from_secs(1)).await.unwrap();
        assert!(controller.connect_sensor(0).unwrap());
        controller
    }

    #[tokio::test(start_paused = true)]
    async fn scan_and_connect() {
        let controller = controller();
        let found = controller.scan_devices(Duration::from_secs(1)).await.unwrap();
        assert_eq!(found.len(), 3);
        assert!(!controller.is_connected());

        let mut feed = controller.subscribe();
        assert!(controller.connect_sensor(2).unwrap());
        assert!(controller.is_connected());
        assert_eq!(
            feed.next().await,
            Some(StreamMessage::Status(StatusEvent::StateChanged {
                state: SensorState::InRange
            }))
        );

        let status = controller.status();
        assert!(status.connected);
        assert_eq!(status.sensor_info.unwrap().name, "MockBrainBit-2");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_rejects_unknown_index() {
        let controller = controller();
        let err = controller.connect_sensor(0).unwrap_err();
        assert_eq!(err.to_string(), "Invalid sensor index: 0");
    }

    #[tokio::test(start_paused = true)]
    async fn streams_require_connection() {
        let controller = controller();
        assert!(controller.start_stream(StreamKind::Signal).is_err());
        assert!(controller.start_emotions().is_err());
        controller.stop_stream(StreamKind::Resist);
        assert!(controller.active_streams().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn signal_batches_reach_the_hub() {
        let controller = connected().await;
        let mut feed = controller.subscribe();
        controller.start_stream(StreamKind::Signal).unwrap();
        assert_eq!(controller.active_streams(), vec![StreamKind::Signal]);

        loop {
            match feed.next().await {
                Some(StreamMessage::Signal(batch)) => {
                    assert_eq!(batch.len(), 25);
                    break;
                }
                Some(_) => continue,
                None => panic!("hub closed"),
            }
        }

        controller.stop_stream(StreamKind::Signal);
        assert!(controller.active_streams().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn emotions_replace_raw_signal_and_calibrate() {
        let controller = connected().await;
        controller.start_stream(StreamKind::Signal).unwrap();
        let mut feed = controller.subscribe();
        controller.start_emotions().unwrap();
        assert_eq!(controller.active_streams(), vec![StreamKind::Emotions]);

        // Stopping raw signal must not end the emotions stream.
        controller.stop_stream(StreamKind::Signal);
        assert_eq!(controller.active_streams(), vec![StreamKind::Emotions]);

        let mut saw_progress = false;
        loop {
            match feed.next().await {
                Some(StreamMessage::Emotions(payload)) if payload.calibration_percent.is_some() => {
                    saw_progress = true;
                }
                Some(StreamMessage::Emotions(payload)) => {
                    assert!(payload.rel_attention.is_some());
                    break;
                }
                Some(_) => continue,
                None => panic!("hub closed"),
            }
        }
        assert!(saw_progress);

        controller.stop_emotions();
        assert!(controller.active_streams().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn raw_signal_cannot_take_over_emotions() {
        let controller = connected().await;
        controller.start_emotions().unwrap();

        let err = controller.start_stream(StreamKind::Signal).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Emotions stream is active, stop it before starting raw signal"
        );
        assert_eq!(controller.active_streams(), vec![StreamKind::Emotions]);

        controller.stop_emotions();
        controller.start_stream(StreamKind::Signal).unwrap();
        assert_eq!(controller.active_streams(), vec![StreamKind::Signal]);
    }

    #[tokio::test(start_paused = true)]
    async fn battery_updates_follow_the_connection() {
        let controller = controller();
        controller.scan_devices(Duration::from_secs(1)).await.unwrap();
        let mut feed = controller.subscribe();
        controller.connect_sensor(1).unwrap();

        assert!(matches!(
            feed.next().await,
            Some(StreamMessage::Status(StatusEvent::StateChanged { .. }))
        ));
        let Some(StreamMessage::Status(StatusEvent::BatteryChanged { battery })) =
            feed.next().await
        else {
            panic!("expected battery level after connect");
        };
        assert_eq!(
            feed.next().await,
            Some(StreamMessage::Status(StatusEvent::BatteryChanged {
                battery: battery - 1
            }))
        );

        controller.disconnect_sensor();
        assert_eq!(
            feed.next().await,
            Some(StreamMessage::Status(StatusEvent::StateChanged {
                state: SensorState::OutOfRange
            }))
        );
        assert!(time::timeout(Duration::from_secs(120), feed.next())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_everything() {
        let controller = connected().await;
        controller.start_stream(StreamKind::Resist).unwrap();
        controller.start_stream(StreamKind::Signal).unwrap();

        controller.disconnect_sensor();
        assert!(!controller.is_connected());
        assert!(controller.active_streams().is_empty());
        assert!(controller.status().sensor_info.is_none());

        time::sleep(Duration::from_secs(2)).await;
        controller.disconnect_sensor();
    }
}
