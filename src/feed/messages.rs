use serde::{Deserialize, Serialize};

use crate::neuro::{ResistSample, SensorState, SignalSample};

/// Envelope pushed to the dashboard as `{ "type": ..., "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Signal(Vec<SignalSample>),
    Resist(ResistSample),
    Status(StatusEvent),
    Emotions(EmotionsPayload),
}

impl StreamMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Signal(_) => "signal",
            StreamMessage::Resist(_) => "resist",
            StreamMessage::Status(_) => "status",
            StreamMessage::Emotions(_) => "emotions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    StateChanged { state: SensorState },
    BatteryChanged { battery: u8 },
}

/// Calibration progress and emotion readings share one payload shape; every
/// field is optional and absent fields are skipped on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionsPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel_relaxation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel_attention: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst_relaxation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst_attention: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_both_sides_artifacted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sequence_artifacted: Option<bool>,
}

impl EmotionsPayload {
    pub fn has_reading(&self) -> bool {
        self.rel_relaxation.is_some()
            || self.rel_attention.is_some()
            || self.inst_relaxation.is_some()
            || self.inst_attention.is_some()
    }
}
