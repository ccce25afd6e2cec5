use anyhow::Result;
use log::{error, info};
use rand::prelude::*;

use super::SignalSample;
use crate::feed::EmotionsPayload;

pub const SAMPLING_RATE_HZ: u32 = 250;
const ARTIFACT_BOTH_SIDES_PROBABILITY: f64 = 0.01;
const ARTIFACT_SEQUENCE_PROBABILITY: f64 = 0.005;

/// Left/right bipolar pair fed to the emotion math.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BipolarSample {
    pub left: f64,
    pub right: f64,
}

impl From<&SignalSample> for BipolarSample {
    fn from(sample: &SignalSample) -> Self {
        Self {
            left: sample.t3 - sample.o1,
            right: sample.t4 - sample.o2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MentalData {
    pub rel_attention: f64,
    pub rel_relaxation: f64,
    pub inst_attention: f64,
    pub inst_relaxation: f64,
}

/// Vendor emotion/relaxation estimator. Opaque: we push bipolar samples and
/// read back calibration progress, artifact flags and mental data.
pub trait EmotionalMath: Send {
    fn start_calibration(&mut self);
    fn push_bipolars(&mut self, samples: &[BipolarSample]) -> Result<()>;
    fn process_data(&mut self) -> Result<()>;
    fn calibration_finished(&self) -> bool;
    fn calibration_percent(&self) -> u8;
    fn is_both_sides_artifacted(&mut self) -> bool;
    fn is_artifacted_sequence(&mut self) -> bool;
    fn read_mental_data(&mut self) -> Vec<MentalData>;
}

/// Development replacement for the vendor library. Calibration completes
/// after `calibration_secs` worth of samples at 250 Hz.
pub struct SimulatedMath {
    rng: StdRng,
    calibration_samples: u64,
    seen_samples: u64,
    pending_samples: u64,
    calibrating: bool,
    finished: bool,
    both_sides_probability: f64,
    sequence_probability: f64,
}

impl SimulatedMath {
    pub fn new(calibration_secs: u32) -> Self {
        Self::with_rng(calibration_secs, StdRng::from_entropy())
    }

    pub fn with_rng(calibration_secs: u32, rng: StdRng) -> Self {
        Self {
            rng,
            calibration_samples: u64::from(calibration_secs) * u64::from(SAMPLING_RATE_HZ),
            seen_samples: 0,
            pending_samples: 0,
            calibrating: false,
            finished: false,
            both_sides_probability: ARTIFACT_BOTH_SIDES_PROBABILITY,
            sequence_probability: ARTIFACT_SEQUENCE_PROBABILITY,
        }
    }

    pub fn with_artifact_probabilities(mut self, both_sides: f64, sequence: f64) -> Self {
        self.both_sides_probability = both_sides;
        self.sequence_probability = sequence;
        self
    }
}

impl EmotionalMath for SimulatedMath {
    fn start_calibration(&mut self) {
        self.calibrating = true;
        self.finished = false;
        self.seen_samples = 0;
        self.pending_samples = 0;
    }

    fn push_bipolars(&mut self, samples: &[BipolarSample]) -> Result<()> {
        self.pending_samples += samples.len() as u64;
        if self.calibrating {
            self.seen_samples += samples.len() as u64;
        }
        Ok(())
    }

    fn process_data(&mut self) -> Result<()> {
        if self.calibrating && self.seen_samples >= self.calibration_samples {
            self.calibrating = false;
            self.finished = true;
            self.pending_samples = 0;
        }
        Ok(())
    }

    fn calibration_finished(&self) -> bool {
        self.finished
    }

    fn calibration_percent(&self) -> u8 {
        if self.finished {
            return 100;
        }
        if self.calibration_samples == 0 {
            return 0;
        }
        (self.seen_samples * 100 / self.calibration_samples).min(100) as u8
    }

    fn is_both_sides_artifacted(&mut self) -> bool {
        self.rng.gen_bool(self.both_sides_probability)
    }

    fn is_artifacted_sequence(&mut self) -> bool {
        self.rng.gen_bool(self.sequence_probability)
    }

    fn read_mental_data(&mut self) -> Vec<MentalData> {
        if !self.finished || self.pending_samples == 0 {
            return Vec::new();
        }
        self.pending_samples = 0;
        vec![MentalData {
            rel_relaxation: self.rng.gen_range(0.3..0.9),
            rel_attention: self.rng.gen_range(0.3..0.9),
            inst_relaxation: self.rng.gen_range(0.2..1.0),
            inst_attention: self.rng.gen_range(0.2..1.0),
        }]
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Drives the emotion math over raw signal batches and shapes the payloads
/// sent as `emotions` stream messages.
pub struct EmotionsProcessor {
    math: Box<dyn EmotionalMath>,
    calibrating: bool,
}

impl EmotionsProcessor {
    pub fn new(math: Box<dyn EmotionalMath>) -> Self {
        Self {
            math,
            calibrating: false,
        }
    }

    pub fn start_calibration(&mut self) {
        self.math.start_calibration();
        self.calibrating = true;
        info!("Started emotions calibration");
    }

    /// Returns calibration progress while calibrating, the latest mental
    /// reading afterwards, or nothing when the batch yields no output.
    pub fn process(&mut self, batch: &[SignalSample]) -> Option<EmotionsPayload> {
        match self.try_process(batch) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Error processing emotions data: {err:#}");
                None
            }
        }
    }

    fn try_process(&mut self, batch: &[SignalSample]) -> Result<Option<EmotionsPayload>> {
        let bipolars: Vec<BipolarSample> = batch.iter().map(BipolarSample::from).collect();
        self.math.push_bipolars(&bipolars)?;
        self.math.process_data()?;

        let both_sides = self.math.is_both_sides_artifacted();
        let sequence = self.math.is_artifacted_sequence();

        if self.calibrating && !self.math.calibration_finished() {
            // Artifact flags only ride along when set, so the UI does not
            // flash warnings on every progress update.
            return Ok(Some(EmotionsPayload {
                calibration_percent: Some(self.math.calibration_percent()),
                is_both_sides_artifacted: both_sides.then_some(true),
                is_sequence_artifacted: sequence.then_some(true),
                ..Default::default()
            }));
        }

        if !self.math.calibration_finished() {
            return Ok(None);
        }
        if self.calibrating {
            self.calibrating = false;
            info!("Calibration finished");
        }

        let Some(data) = self.math.read_mental_data().pop() else {
            return Ok(None);
        };
        Ok(Some(EmotionsPayload {
            calibration_percent: None,
            rel_relaxation: Some(round2(data.rel_relaxation)),
            rel_attention: Some(round2(data.rel_attention)),
            inst_relaxation: Some(round2(data.inst_relaxation)),
            inst_attention: Some(round2(data.inst_attention)),
            is_both_sides_artifacted: Some(both_sides),
            is_sequence_artifacted: Some(sequence),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn quiet_math(calibration_secs: u32) -> Box<dyn EmotionalMath> {
        Box::new(
            SimulatedMath::with_rng(calibration_secs, StdRng::seed_from_u64(7))
                .with_artifact_probabilities(0.0, 0.0),
        )
    }

    fn batch(len: usize) -> Vec<SignalSample> {
        vec![
            SignalSample {
                o1: 1.0,
                o2: 2.0,
                t3: 4.0,
                t4: 8.0,
            };
            len
        ]
    }

    #[test]
    fn bipolar_channels_are_temporal_minus_occipital() {
        let sample = batch(1)[0];
        let bipolar = BipolarSample::from(&sample);
        assert_eq!(bipolar, BipolarSample { left: 3.0, right: 6.0 });
    }

    #[test]
    fn nothing_is_emitted_before_calibration_starts() {
        let mut processor = EmotionsProcessor::new(quiet_math(1));
        assert_eq!(processor.process(&batch(25)), None);
    }

    #[test]
    fn calibration_progress_then_readings() {
        let mut processor = EmotionsProcessor::new(quiet_math(1));
        processor.start_calibration();

        let progress = processor.process(&batch(125)).unwrap();
        assert_eq!(progress.calibration_percent, Some(50));
        assert_eq!(progress.is_both_sides_artifacted, None);
        assert!(!progress.has_reading());

        // Crossing the threshold finishes calibration; the batch that did it
        // is consumed by the math.
        assert_eq!(processor.process(&batch(125)), None);

        let reading = processor.process(&batch(25)).unwrap();
        assert_eq!(reading.calibration_percent, None);
        let attention = reading.rel_attention.unwrap();
        assert!((0.3..=0.9).contains(&attention));
        assert_eq!(round2(attention), attention);
        assert_eq!(reading.is_both_sides_artifacted, Some(false));
    }

    #[test]
    fn artifact_flags_only_present_when_set_during_calibration() {
        let math = SimulatedMath::with_rng(1, StdRng::seed_from_u64(1))
            .with_artifact_probabilities(1.0, 0.0);
        let mut processor = EmotionsProcessor::new(Box::new(math));
        processor.start_calibration();

        let progress = processor.process(&batch(10)).unwrap();
        assert_eq!(progress.is_both_sides_artifacted, Some(true));
        assert_eq!(progress.is_sequence_artifacted, None);
    }

    struct FailingMath;

    impl EmotionalMath for FailingMath {
        fn start_calibration(&mut self) {}
        fn push_bipolars(&mut self, _: &[BipolarSample]) -> Result<()> {
            Err(anyhow!("buffer overflow"))
        }
        fn process_data(&mut self) -> Result<()> {
            Ok(())
        }
        fn calibration_finished(&self) -> bool {
            false
        }
        fn calibration_percent(&self) -> u8 {
            0
        }
        fn is_both_sides_artifacted(&mut self) -> bool {
            false
        }
        fn is_artifacted_sequence(&mut self) -> bool {
            false
        }
        fn read_mental_data(&mut self) -> Vec<MentalData> {
            Vec::new()
        }
    }

    #[test]
    fn math_errors_drop_the_batch() {
        let mut processor = EmotionsProcessor::new(Box::new(FailingMath));
        processor.start_calibration();
        assert_eq!(processor.process(&batch(25)), None);
    }
}
