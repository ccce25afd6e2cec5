pub mod commands;
pub mod controller;
pub mod metrics;
pub mod playback;
pub mod sampling;
pub mod series;
pub mod state;
pub mod video;

pub use controller::{AttentionSessionController, MetricsStream};
pub use metrics::{CalibrationState, LatestReading, MetricEvent, MetricsFeedAdapter};
pub use playback::{PlaybackGuard, PlaybackKind, PlaybackSource, PlayerState, WebviewPlayer};
pub use sampling::{SamplingTimer, TaskGuard};
pub use series::{AttentionSample, SeriesBuffer, SeriesSummary};
pub use state::{SessionFinishedEvent, SessionSnapshot, SessionState};
pub use video::VideoSource;
