use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::attention::PlaybackKind;

/// Tunables for the attention session and the device streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusSettings {
    pub sample_interval_ms: u64,
    /// Backward seek tolerance for local file playback, which reports time natively.
    pub local_seek_tolerance_secs: f64,
    /// Embedded players are polled, so their time resolution is coarser.
    pub embedded_seek_tolerance_secs: f64,
    pub seek_poll_interval_ms: u64,
    pub scan_duration_secs: u64,
    pub calibration_length_secs: u32,
    pub stream_channel_capacity: usize,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            local_seek_tolerance_secs: 0.5,
            embedded_seek_tolerance_secs: 1.0,
            seek_poll_interval_ms: 500,
            scan_duration_secs: 5,
            calibration_length_secs: 6,
            stream_channel_capacity: 256,
        }
    }
}

impl FocusSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn seek_poll_interval(&self) -> Duration {
        Duration::from_millis(self.seek_poll_interval_ms)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn seek_tolerance(&self, kind: PlaybackKind) -> f64 {
        match kind {
            PlaybackKind::LocalFile => self.local_seek_tolerance_secs,
            PlaybackKind::RemoteEmbedded => self.embedded_seek_tolerance_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 || self.seek_poll_interval_ms == 0 {
            bail!("intervals must be greater than zero");
        }
        if !(self.local_seek_tolerance_secs >= 0.0 && self.embedded_seek_tolerance_secs >= 0.0) {
            bail!("seek tolerances must be non-negative");
        }
        if self.calibration_length_secs == 0 {
            bail!("calibration length must be greater than zero");
        }
        if self.stream_channel_capacity == 0 {
            bail!("stream channel capacity must be greater than zero");
        }
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<FocusSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<FocusSettings>(&contents)
                .ok()
                .filter(|settings| settings.validate().is_ok())
                .unwrap_or_default()
        } else {
            FocusSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> FocusSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: FocusSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &FocusSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
