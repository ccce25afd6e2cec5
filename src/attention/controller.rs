use std::sync::{Arc, Weak};

use anyhow::Result;
use log::{info, warn};
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    sampling::TaskGuard, AttentionSample, MetricEvent, MetricsFeedAdapter, PlaybackGuard,
    PlaybackKind, PlaybackSource, PlayerState, SamplingTimer, SeriesBuffer, SessionFinishedEvent,
    SessionSnapshot, SessionState, VideoSource,
};
use crate::{
    events::{
        emit, UiEmitter, ATTENTION_SAMPLE, SESSION_ERROR, SESSION_FINISHED, SESSION_STATE_CHANGED,
    },
    feed::{FeedSubscription, StatusEvent, StreamMessage},
    neuro::SensorState,
    settings::FocusSettings,
};

const HEADSET_LOST: &str = "Headset went out of range";

/// Source of the emotions feed the session calibrates and samples from.
pub trait MetricsStream: Send + Sync {
    fn start_emotions(&self) -> Result<()>;
    fn stop_emotions(&self);
    fn subscribe(&self) -> FeedSubscription;
}

struct SessionInner {
    state: SessionState,
    session_id: Option<String>,
    /// Bumped on every load and teardown; tasks of older sessions compare
    /// against it and bail out.
    generation: u64,
    video: Option<VideoSource>,
    playback: Option<PlaybackGuard>,
    player_state: PlayerState,
    feed: MetricsFeedAdapter,
    series: SeriesBuffer,
    sampler: SamplingTimer,
    stream_active: bool,
    stream_error: Option<String>,
    feed_task: Option<TaskGuard>,
    state_task: Option<TaskGuard>,
    seek_poller: Option<TaskGuard>,
    settings: FocusSettings,
}

impl SessionInner {
    fn new(settings: FocusSettings) -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            generation: 0,
            video: None,
            playback: None,
            player_state: PlayerState::Unstarted,
            feed: MetricsFeedAdapter::new(),
            series: SeriesBuffer::new(),
            sampler: SamplingTimer::new(settings.sample_interval()),
            stream_active: false,
            stream_error: None,
            feed_task: None,
            state_task: None,
            seek_poller: None,
            settings,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let finished = self.state == SessionState::Finished;
        SessionSnapshot {
            session_id: self.session_id.clone(),
            state: self.state,
            video: self.video.clone(),
            player_state: self.player_state,
            calibrated: self.feed.is_calibrated(),
            calibration: (self.state == SessionState::Calibrating).then(|| self.feed.calibration()),
            latest_attention: (self.state == SessionState::Tracking)
                .then(|| self.feed.latest_attention())
                .flatten(),
            latest_reading: self.feed.is_calibrated().then(|| self.feed.latest()),
            sample_count: self.series.len(),
            sampling: self.sampler.is_running(),
            furthest_position_seconds: self.playback.as_ref().map(PlaybackGuard::last_valid_time),
            seek_corrections: self
                .playback
                .as_ref()
                .map_or(0, PlaybackGuard::corrections),
            series: finished.then(|| self.series.snapshot()),
            summary: finished.then(|| self.series.summary()).flatten(),
            stream_error: self.stream_error.clone(),
        }
    }
}

struct Shared {
    inner: Mutex<SessionInner>,
    stream: Arc<dyn MetricsStream>,
    emitter: Arc<dyn UiEmitter>,
}

/// Ties a loaded video, the emotions feed and periodic sampling into one
/// attention-over-playback-time series.
#[derive(Clone)]
pub struct AttentionSessionController {
    shared: Arc<Shared>,
}

impl AttentionSessionController {
    pub fn new(
        stream: Arc<dyn MetricsStream>,
        emitter: Arc<dyn UiEmitter>,
        settings: FocusSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(SessionInner::new(settings)),
                stream,
                emitter,
            }),
        }
    }

    fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    async fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.shared.inner.lock().await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.lock().await.snapshot()
    }

    /// Takes effect from the next loaded video.
    pub async fn apply_settings(&self, settings: FocusSettings) {
        self.lock().await.settings = settings;
    }

    /// Starts a fresh session for `video`, discarding whatever the previous
    /// one collected, and requests the emotions stream.
    pub async fn load_video(
        &self,
        video: VideoSource,
        source: Arc<dyn PlaybackSource>,
    ) -> SessionSnapshot {
        let mut inner = self.lock().await;
        self.release(&mut inner);

        inner.generation += 1;
        let generation = inner.generation;
        let kind = source.kind();
        let tolerance = inner.settings.seek_tolerance(kind);
        let sample_interval = inner.settings.sample_interval();
        let poll_interval = inner.settings.seek_poll_interval();

        inner.session_id = Some(Uuid::new_v4().to_string());
        inner.video = Some(video);
        inner.playback = Some(PlaybackGuard::new(Arc::clone(&source), tolerance));
        inner.player_state = PlayerState::Unstarted;
        inner.feed = MetricsFeedAdapter::new();
        inner.series.clear();
        inner.sampler = SamplingTimer::new(sample_interval);
        inner.stream_error = None;
        inner.state = SessionState::Loaded;

        inner.state_task = Some(self.spawn_state_watch(generation, source.as_ref()));
        if kind == PlaybackKind::RemoteEmbedded {
            inner.seek_poller = Some(self.spawn_seek_poller(generation, poll_interval));
        }

        info!(
            "Loaded video for session {}",
            inner.session_id.as_deref().unwrap_or_default()
        );
        self.request_stream(&mut inner);
        self.emit_state(&inner);
        inner.snapshot()
    }

    /// Manual retry after the emotions stream failed to start or dropped.
    /// A session that was already calibrated keeps its calibration.
    pub async fn retry_metrics_stream(&self) -> SessionSnapshot {
        let mut inner = self.lock().await;
        if inner.state == SessionState::Loaded && !inner.stream_active && inner.playback.is_some() {
            self.request_stream(&mut inner);
            self.reconcile(&mut inner);
            self.emit_state(&inner);
        }
        inner.snapshot()
    }

    /// Cancels everything and returns to idle.
    pub async fn teardown(&self) -> SessionSnapshot {
        let mut inner = self.lock().await;
        self.release(&mut inner);
        inner.generation += 1;
        inner.state = SessionState::Idle;
        inner.session_id = None;
        inner.video = None;
        inner.playback = None;
        inner.player_state = PlayerState::Unstarted;
        inner.feed = MetricsFeedAdapter::new();
        inner.series.clear();
        inner.stream_error = None;
        self.emit_state(&inner);
        inner.snapshot()
    }

    pub async fn handle_player_state(&self, state: PlayerState) {
        let mut inner = self.lock().await;
        self.apply_player_state(&mut inner, state);
    }

    pub async fn handle_metric(&self, event: MetricEvent) {
        let mut inner = self.lock().await;
        self.apply_metric(&mut inner, event);
    }

    pub async fn report_time(&self, seconds: f64) {
        if let Some(playback) = self.lock().await.playback.as_mut() {
            playback.report_time(seconds);
        }
    }

    /// Returns the position playback was pushed back to, if the seek was
    /// refused.
    pub async fn report_seeking(&self, seconds: f64) -> Option<f64> {
        let mut inner = self.lock().await;
        let corrected = inner.playback.as_mut()?.on_seeking(seconds);
        if let Some(target) = corrected {
            info!("Blocked backward seek to {seconds:.1}s, restoring {target:.1}s");
        }
        corrected
    }

    pub async fn report_seeked(&self) {
        if let Some(playback) = self.lock().await.playback.as_mut() {
            playback.on_seeked();
        }
    }

    fn release(&self, inner: &mut SessionInner) {
        inner.sampler.stop();
        inner.seek_poller = None;
        inner.feed_task = None;
        inner.state_task = None;
        if inner.stream_active {
            self.shared.stream.stop_emotions();
            inner.stream_active = false;
        }
    }

    fn request_stream(&self, inner: &mut SessionInner) {
        // Subscribe first so nothing published right after the start is missed.
        let subscription = self.shared.stream.subscribe();
        match self.shared.stream.start_emotions() {
            Ok(()) => {
                inner.stream_active = true;
                inner.stream_error = None;
                inner.state = SessionState::Calibrating;
                inner.feed_task = Some(self.spawn_feed(inner.generation, subscription));
            }
            Err(err) => {
                let message = err.to_string();
                warn!("Metrics stream failed to start: {err:#}");
                inner.stream_active = false;
                inner.stream_error = Some(message.clone());
                emit(
                    self.shared.emitter.as_ref(),
                    SESSION_ERROR,
                    &json!({ "message": message }),
                );
            }
        }
    }

    /// The feed died under a running stream. Sampling stops and the session
    /// waits in Loaded for a manual retry.
    fn lose_stream(&self, inner: &mut SessionInner, message: &str) {
        if !inner.stream_active {
            return;
        }
        warn!("Metrics stream lost: {message}");
        inner.sampler.stop();
        inner.feed_task = None;
        self.shared.stream.stop_emotions();
        inner.stream_active = false;
        inner.feed.clear_reading();
        inner.stream_error = Some(message.to_string());
        if matches!(inner.state, SessionState::Calibrating | SessionState::Tracking) {
            inner.state = SessionState::Loaded;
        }
        emit(
            self.shared.emitter.as_ref(),
            SESSION_ERROR,
            &json!({ "message": message }),
        );
        self.emit_state(inner);
    }

    fn apply_metric(&self, inner: &mut SessionInner, event: MetricEvent) {
        if !inner.stream_active || !inner.state.is_active() {
            return;
        }
        if inner.feed.on_metric(event) {
            info!("Calibration complete");
        }
        self.reconcile(inner);
        self.emit_state(inner);
    }

    fn apply_player_state(&self, inner: &mut SessionInner, state: PlayerState) {
        if inner.playback.is_none() || !inner.state.is_active() {
            return;
        }
        inner.player_state = state;

        if state == PlayerState::Ended {
            let can_finish = match inner.state {
                SessionState::Calibrating | SessionState::Tracking => true,
                SessionState::Loaded => inner.stream_active && inner.feed.is_calibrated(),
                _ => false,
            };
            if can_finish {
                self.finish(inner);
            }
        } else {
            self.reconcile(inner);
        }
        self.emit_state(inner);
    }

    /// Moves between calibrating, ready/paused and tracking after any input.
    fn reconcile(&self, inner: &mut SessionInner) {
        let playing = inner.player_state == PlayerState::Playing;
        match inner.state {
            SessionState::Calibrating | SessionState::Loaded
                if inner.stream_active && inner.feed.is_calibrated() =>
            {
                if playing {
                    self.enter_tracking(inner);
                } else {
                    inner.state = SessionState::Loaded;
                }
            }
            SessionState::Tracking if !playing => {
                inner.sampler.stop();
                inner.state = SessionState::Loaded;
            }
            _ => {}
        }
    }

    fn enter_tracking(&self, inner: &mut SessionInner) {
        inner.state = SessionState::Tracking;
        let generation = inner.generation;
        let weak = Arc::downgrade(&self.shared);
        inner.sampler.start(move || {
            let weak = weak.clone();
            async move {
                if let Some(controller) = Self::upgrade(&weak) {
                    controller.sample_tick(generation).await;
                }
            }
        });
    }

    fn finish(&self, inner: &mut SessionInner) {
        inner.sampler.stop();
        inner.seek_poller = None;
        inner.feed_task = None;
        if inner.stream_active {
            self.shared.stream.stop_emotions();
            inner.stream_active = false;
        }
        inner.state = SessionState::Finished;

        let event = SessionFinishedEvent {
            session_id: inner.session_id.clone().unwrap_or_default(),
            series: inner.series.snapshot(),
            summary: inner.series.summary(),
        };
        info!(
            "Session {} finished with {} samples",
            event.session_id,
            event.series.len()
        );
        emit(self.shared.emitter.as_ref(), SESSION_FINISHED, &event);
    }

    async fn sample_tick(&self, generation: u64) {
        let mut inner = self.lock().await;
        if inner.generation != generation || inner.state != SessionState::Tracking {
            return;
        }
        let (Some(attention), Some(playback)) =
            (inner.feed.latest_attention(), inner.playback.as_ref())
        else {
            return;
        };

        let sample = AttentionSample {
            playback_time_seconds: playback.current_time().max(0.0).floor() as u64,
            attention,
        };
        inner.series.append(sample);
        emit(self.shared.emitter.as_ref(), ATTENTION_SAMPLE, &sample);
    }

    fn spawn_feed(&self, generation: u64, mut subscription: FeedSubscription) -> TaskGuard {
        let weak = Arc::downgrade(&self.shared);
        TaskGuard::spawn(async move {
            while let Some(message) = subscription.next().await {
                // `None` marks the headset dropping out.
                let metric = match message {
                    StreamMessage::Emotions(payload) => match MetricEvent::from_payload(&payload) {
                        Some(event) => Some(event),
                        None => continue,
                    },
                    StreamMessage::Status(StatusEvent::StateChanged {
                        state: SensorState::OutOfRange,
                    }) => None,
                    _ => continue,
                };
                let Some(controller) = Self::upgrade(&weak) else {
                    break;
                };
                let mut inner = controller.lock().await;
                if inner.generation != generation {
                    break;
                }
                match metric {
                    Some(event) => controller.apply_metric(&mut inner, event),
                    None => {
                        controller.lose_stream(&mut inner, HEADSET_LOST);
                        break;
                    }
                }
            }
        })
    }

    fn spawn_state_watch(&self, generation: u64, source: &dyn PlaybackSource) -> TaskGuard {
        let weak = Arc::downgrade(&self.shared);
        let mut states = source.subscribe();
        TaskGuard::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                let Some(controller) = Self::upgrade(&weak) else {
                    break;
                };
                let mut inner = controller.lock().await;
                if inner.generation != generation {
                    break;
                }
                controller.apply_player_state(&mut inner, state);
            }
        })
    }

    fn spawn_seek_poller(&self, generation: u64, period: std::time::Duration) -> TaskGuard {
        let weak = Arc::downgrade(&self.shared);
        TaskGuard::every(period, move || {
            let weak = weak.clone();
            async move {
                let Some(controller) = Self::upgrade(&weak) else {
                    return;
                };
                let mut inner = controller.lock().await;
                if inner.generation != generation {
                    return;
                }
                if let Some(target) = inner.playback.as_mut().and_then(PlaybackGuard::poll) {
                    info!("Embedded player scrubbed back, restoring {target:.1}s");
                }
            }
        })
    }

    fn emit_state(&self, inner: &SessionInner) {
        emit(
            self.shared.emitter.as_ref(),
            SESSION_STATE_CHANGED,
            &inner.snapshot(),
        );
    }
}
