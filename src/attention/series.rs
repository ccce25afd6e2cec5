use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionSample {
    pub playback_time_seconds: u64,
    pub attention: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub sample_count: usize,
    pub mean_attention: f64,
    pub min_attention: f64,
    pub max_attention: f64,
    pub covered_seconds: u64,
}

/// Samples of the current session, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SeriesBuffer {
    samples: Vec<AttentionSample>,
}

impl SeriesBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: AttentionSample) {
        self.samples.push(sample);
    }

    pub fn snapshot(&self) -> Vec<AttentionSample> {
        self.samples.clone()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn summary(&self) -> Option<SeriesSummary> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        let (sum, min, max) = self.samples.iter().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, min, max), sample| {
                (
                    sum + sample.attention,
                    min.min(sample.attention),
                    max.max(sample.attention),
                )
            },
        );

        Some(SeriesSummary {
            sample_count: self.samples.len(),
            mean_attention: sum / self.samples.len() as f64,
            min_attention: min,
            max_attention: max,
            covered_seconds: last
                .playback_time_seconds
                .saturating_sub(first.playback_time_seconds),
        })
    }
}
