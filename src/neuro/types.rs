use std::{fmt, str::FromStr};

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// One sample of the four BrainBit electrodes, in microvolts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    #[serde(rename = "O1")]
    pub o1: f64,
    #[serde(rename = "O2")]
    pub o2: f64,
    #[serde(rename = "T3")]
    pub t3: f64,
    #[serde(rename = "T4")]
    pub t4: f64,
}

/// Electrode resistance in ohms. Values above 2 MOhm indicate good contact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResistSample {
    #[serde(rename = "O1")]
    pub o1: f64,
    #[serde(rename = "O2")]
    pub o2: f64,
    #[serde(rename = "T3")]
    pub t3: f64,
    #[serde(rename = "T4")]
    pub t4: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub index: usize,
    pub name: String,
    pub address: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    InRange,
    OutOfRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorStatus {
    pub name: String,
    pub address: String,
    pub serial_number: String,
    pub battery: u8,
    pub state: SensorState,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub connected: bool,
    pub sensor_info: Option<SensorStatus>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Signal,
    Resist,
    Emotions,
}

impl FromStr for StreamKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "signal" => Ok(StreamKind::Signal),
            "resist" => Ok(StreamKind::Resist),
            "emotions" => Ok(StreamKind::Emotions),
            other => Err(anyhow!("Unknown data type: {other}")),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Signal => "signal",
            StreamKind::Resist => "resist",
            StreamKind::Emotions => "emotions",
        };
        f.write_str(name)
    }
}
