use serde::Serialize;

use crate::feed::EmotionsPayload;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricEvent {
    Calibration {
        percent: u8,
        both_sides_artifacted: bool,
        sequence_artifacted: bool,
    },
    Reading {
        rel_attention: Option<f64>,
        rel_relaxation: Option<f64>,
        inst_attention: Option<f64>,
        inst_relaxation: Option<f64>,
        both_sides_artifacted: bool,
        sequence_artifacted: bool,
    },
}

impl MetricEvent {
    /// A payload carrying `calibration_percent` is progress; otherwise any
    /// metric field makes it a reading. Payloads with neither are ignored.
    pub fn from_payload(payload: &EmotionsPayload) -> Option<Self> {
        let both_sides_artifacted = payload.is_both_sides_artifacted.unwrap_or(false);
        let sequence_artifacted = payload.is_sequence_artifacted.unwrap_or(false);

        if let Some(percent) = payload.calibration_percent {
            return Some(MetricEvent::Calibration {
                percent: percent.min(100),
                both_sides_artifacted,
                sequence_artifacted,
            });
        }

        payload.has_reading().then_some(MetricEvent::Reading {
            rel_attention: payload.rel_attention,
            rel_relaxation: payload.rel_relaxation,
            inst_attention: payload.inst_attention,
            inst_relaxation: payload.inst_relaxation,
            both_sides_artifacted,
            sequence_artifacted,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationState {
    pub in_progress: bool,
    pub percent: u8,
    pub both_sides_artifacted: bool,
    pub sequence_artifacted: bool,
    pub completed: bool,
}

/// Latest relaxation/attention figures for display next to the video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestReading {
    pub rel_attention: Option<f64>,
    pub rel_relaxation: Option<f64>,
    pub inst_attention: Option<f64>,
    pub inst_relaxation: Option<f64>,
}

/// Reactive view over the emotions feed. Duplicate events are harmless and
/// calibration, once completed, stays completed for the adapter's lifetime.
#[derive(Debug, Clone, Default)]
pub struct MetricsFeedAdapter {
    calibration: CalibrationState,
    latest: LatestReading,
}

fn unit(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(|v| v.clamp(0.0, 1.0))
}

impl MetricsFeedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this event is the one that completed calibration.
    pub fn on_metric(&mut self, event: MetricEvent) -> bool {
        let was_calibrated = self.calibration.completed;

        match event {
            MetricEvent::Calibration {
                percent,
                both_sides_artifacted,
                sequence_artifacted,
            } => {
                self.calibration.both_sides_artifacted = both_sides_artifacted;
                self.calibration.sequence_artifacted = sequence_artifacted;
                if !self.calibration.completed {
                    self.calibration.percent = self.calibration.percent.max(percent);
                    self.calibration.in_progress = percent < 100;
                    self.calibration.completed = percent >= 100;
                }
            }
            MetricEvent::Reading {
                rel_attention,
                rel_relaxation,
                inst_attention,
                inst_relaxation,
                both_sides_artifacted,
                sequence_artifacted,
            } => {
                // A reading without a percent only arrives after the vendor
                // math finished calibrating.
                self.calibration.completed = true;
                self.calibration.in_progress = false;
                self.calibration.percent = 100;
                self.calibration.both_sides_artifacted = both_sides_artifacted;
                self.calibration.sequence_artifacted = sequence_artifacted;

                let latest = &mut self.latest;
                latest.rel_attention = unit(rel_attention).or(latest.rel_attention);
                latest.rel_relaxation = unit(rel_relaxation).or(latest.rel_relaxation);
                latest.inst_attention = unit(inst_attention).or(latest.inst_attention);
                latest.inst_relaxation = unit(inst_relaxation).or(latest.inst_relaxation);
            }
        }

        !was_calibrated && self.calibration.completed
    }

    /// Forgets the last reading, keeping calibration. Used when the feed
    /// drops so a stale value is never sampled.
    pub fn clear_reading(&mut self) {
        self.latest = LatestReading::default();
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.completed
    }

    pub fn calibration(&self) -> CalibrationState {
        self.calibration
    }

    /// Relative attention, the smoothed value sampled into the series.
    pub fn latest_attention(&self) -> Option<f64> {
        self.latest.rel_attention
    }

    pub fn latest(&self) -> LatestReading {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration(percent: u8) -> MetricEvent {
        MetricEvent::Calibration {
            percent,
            both_sides_artifacted: false,
            sequence_artifacted: false,
        }
    }

    fn reading(rel_attention: Option<f64>) -> MetricEvent {
        MetricEvent::Reading {
            rel_attention,
            rel_relaxation: Some(0.4),
            inst_attention: None,
            inst_relaxation: None,
            both_sides_artifacted: false,
            sequence_artifacted: false,
        }
    }

    #[test]
    fn calibration_completes_at_one_hundred_percent() {
        let mut adapter = MetricsFeedAdapter::new();
        assert!(!adapter.on_metric(calibration(50)));
        assert!(adapter.calibration().in_progress);
        assert_eq!(adapter.calibration().percent, 50);

        assert!(adapter.on_metric(calibration(100)));
        assert!(adapter.is_calibrated());
        assert!(!adapter.calibration().in_progress);

        // Only the first completing event reports the transition.
        assert!(!adapter.on_metric(calibration(100)));
        assert!(!adapter.on_metric(reading(Some(0.7))));
        assert_eq!(adapter.latest_attention(), Some(0.7));
    }

    #[test]
    fn reading_completes_calibration_without_percent() {
        let mut adapter = MetricsFeedAdapter::new();
        adapter.on_metric(calibration(10));
        assert!(adapter.on_metric(reading(None)));
        assert!(adapter.is_calibrated());
        assert_eq!(adapter.latest_attention(), None);
    }

    #[test]
    fn calibration_never_reverts() {
        let mut adapter = MetricsFeedAdapter::new();
        adapter.on_metric(calibration(100));
        adapter.on_metric(calibration(20));
        assert!(adapter.is_calibrated());
        assert_eq!(adapter.calibration().percent, 100);
    }

    #[test]
    fn reading_without_attention_keeps_previous_value() {
        let mut adapter = MetricsFeedAdapter::new();
        adapter.on_metric(reading(Some(0.6)));
        adapter.on_metric(reading(None));
        assert_eq!(adapter.latest_attention(), Some(0.6));
        adapter.on_metric(reading(Some(1.4)));
        assert_eq!(adapter.latest_attention(), Some(1.0));
    }

    #[test]
    fn clearing_reading_keeps_calibration() {
        let mut adapter = MetricsFeedAdapter::new();
        adapter.on_metric(reading(Some(0.8)));
        adapter.clear_reading();
        assert!(adapter.is_calibrated());
        assert_eq!(adapter.latest_attention(), None);

        assert!(!adapter.on_metric(calibration(30)));
        assert_eq!(adapter.calibration().percent, 100);
    }

    #[test]
    fn payload_classification() {
        let progress = EmotionsPayload {
            calibration_percent: Some(30),
            is_both_sides_artifacted: Some(true),
            ..Default::default()
        };
        assert_eq!(
            MetricEvent::from_payload(&progress),
            Some(MetricEvent::Calibration {
                percent: 30,
                both_sides_artifacted: true,
                sequence_artifacted: false,
            })
        );

        let flags_only = EmotionsPayload {
            is_sequence_artifacted: Some(true),
            ..Default::default()
        };
        assert_eq!(MetricEvent::from_payload(&flags_only), None);
    }

    #[test]
    fn artifact_flags_follow_latest_event() {
        let mut adapter = MetricsFeedAdapter::new();
        adapter.on_metric(MetricEvent::Calibration {
            percent: 40,
            both_sides_artifacted: true,
            sequence_artifacted: true,
        });
        assert!(adapter.calibration().both_sides_artifacted);
        adapter.on_metric(calibration(60));
        assert!(!adapter.calibration().sequence_artifacted);
    }
}
