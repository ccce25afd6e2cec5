use serde::Serialize;

use super::{
    AttentionSample, CalibrationState, LatestReading, PlayerState, SeriesSummary, VideoSource,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Loaded,
    Calibrating,
    Tracking,
    Finished,
}

impl SessionState {
    /// States in which a video is loaded and the session can still progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Loaded | SessionState::Calibrating | SessionState::Tracking
        )
    }
}

/// What the dashboard renders. Fields are only populated in the states where
/// they are meaningful.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub state: SessionState,
    pub video: Option<VideoSource>,
    pub player_state: PlayerState,
    pub calibrated: bool,
    /// Present while calibrating.
    pub calibration: Option<CalibrationState>,
    /// Present while tracking.
    pub latest_attention: Option<f64>,
    pub latest_reading: Option<LatestReading>,
    pub sample_count: usize,
    /// Whether the sampling timer is running.
    pub sampling: bool,
    /// Furthest playback position reached without skipping ahead.
    pub furthest_position_seconds: Option<f64>,
    pub seek_corrections: u32,
    /// Frozen series, present once finished.
    pub series: Option<Vec<AttentionSample>>,
    pub summary: Option<SeriesSummary>,
    pub stream_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFinishedEvent {
    pub session_id: String,
    pub series: Vec<AttentionSample>,
    pub summary: Option<SeriesSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = SessionSnapshot {
            state: SessionState::Calibrating,
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"], json!("calibrating"));
        assert_eq!(value["playerState"], json!("unstarted"));
        assert_eq!(value["sampleCount"], json!(0));
        assert_eq!(value["seekCorrections"], json!(0));
        assert_eq!(value["sampling"], json!(false));
    }

    #[test]
    fn only_loaded_through_tracking_are_active() {
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::Calibrating.is_active());
        assert!(!SessionState::Finished.is_active());
    }
}
