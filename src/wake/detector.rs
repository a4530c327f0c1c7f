//! Keyword detection backends
//!
//! The gate consumes detection through the [`KeywordDetector`] trait so the
//! engine can be swapped: the Porcupine engine when the `porcupine` feature
//! is enabled, an energy-threshold fallback otherwise, scripted fakes in
//! tests.

use crate::Result;

/// Samples per detector frame (32 ms at 16 kHz)
pub const FRAME_LENGTH: usize = 512;

/// Sample rate the detectors consume
pub const SAMPLE_RATE: u32 = 16_000;

/// Runs trigger-phrase detection over fixed-length mono frames
pub trait KeywordDetector: Send {
    /// Samples per channel each frame must carry
    fn frame_length(&self) -> usize;

    /// Process one frame; returns true when the trigger phrase is observed
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying engine fails; the gate skips the
    /// frame and continues.
    fn process(&mut self, frame: &[i16]) -> Result<bool>;
}

/// Energy-threshold detector
///
/// Triggers on sustained speech energy rather than a specific phrase: a run
/// of consecutive frames whose RMS exceeds the threshold arms the gate.
/// Stands in for the keyword engine in builds without the `porcupine`
/// feature.
pub struct EnergyDetector {
    threshold: f32,
    voiced_run: usize,
    required_run: usize,
}

/// Consecutive voiced frames required to trigger (~96 ms)
const REQUIRED_VOICED_FRAMES: usize = 3;

impl EnergyDetector {
    /// Create a detector; higher `sensitivity` in [0, 1] triggers more easily
    #[must_use]
    pub fn new(sensitivity: f32) -> Self {
        let sensitivity = sensitivity.clamp(0.0, 1.0);
        Self {
            threshold: (0.06 * (1.0 - sensitivity)).max(0.005),
            voiced_run: 0,
            required_run: REQUIRED_VOICED_FRAMES,
        }
    }
}

impl KeywordDetector for EnergyDetector {
    fn frame_length(&self) -> usize {
        FRAME_LENGTH
    }

    fn process(&mut self, frame: &[i16]) -> Result<bool> {
        if rms_energy(frame) > self.threshold {
            self.voiced_run += 1;
        } else {
            self.voiced_run = 0;
        }

        Ok(self.voiced_run == self.required_run)
    }
}

/// RMS energy of a frame, normalized to [0, 1]
#[allow(clippy::cast_precision_loss)]
fn rms_energy(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = frame
        .iter()
        .map(|&s| {
            let normalized = f32::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();
    (sum_squares / frame.len() as f32).sqrt()
}

/// Porcupine keyword engine
#[cfg(feature = "porcupine")]
pub struct PorcupineDetector {
    engine: porcupine::Porcupine,
}

#[cfg(feature = "porcupine")]
impl PorcupineDetector {
    /// Initialize the engine from the configured keyword model
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::WakeWord`] when the engine cannot load the
    /// model.
    pub fn new(config: &crate::config::PorcupineConfig) -> Result<Self> {
        let engine = porcupine::PorcupineBuilder::new_with_keyword_paths(
            &config.api_key,
            &[config.keyword_model_path.clone()],
        )
        .sensitivities(&[config.sensitivity])
        .init()
        .map_err(|e| crate::Error::WakeWord(format!("porcupine init failed: {e:?}")))?;

        tracing::debug!(
            model = %config.keyword_model_path.display(),
            sensitivity = config.sensitivity,
            "porcupine detector initialized"
        );

        Ok(Self { engine })
    }
}

#[cfg(feature = "porcupine")]
impl KeywordDetector for PorcupineDetector {
    fn frame_length(&self) -> usize {
        self.engine.frame_length() as usize
    }

    fn process(&mut self, frame: &[i16]) -> Result<bool> {
        let keyword_index = self
            .engine
            .process(frame)
            .map_err(|e| crate::Error::WakeWord(format!("porcupine process failed: {e:?}")))?;
        Ok(keyword_index >= 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_of_silence_is_zero() {
        assert!(rms_energy(&vec![0i16; FRAME_LENGTH]) < 1e-6);
        assert!(rms_energy(&[]) < 1e-6);
    }

    #[test]
    fn sustained_speech_triggers_once_per_run() {
        let mut detector = EnergyDetector::new(0.5);
        let loud = vec![8000i16; FRAME_LENGTH];
        let quiet = vec![0i16; FRAME_LENGTH];

        assert!(!detector.process(&loud).unwrap());
        assert!(!detector.process(&loud).unwrap());
        assert!(detector.process(&loud).unwrap());
        // Continuing the run does not re-fire on the next frame
        assert!(!detector.process(&loud).unwrap());

        // Silence resets the run
        assert!(!detector.process(&quiet).unwrap());
        assert!(!detector.process(&loud).unwrap());
    }

    #[test]
    fn quiet_frames_never_trigger() {
        let mut detector = EnergyDetector::new(0.5);
        let quiet = vec![100i16; FRAME_LENGTH];

        for _ in 0..50 {
            assert!(!detector.process(&quiet).unwrap());
        }
    }

    #[test]
    fn higher_sensitivity_lowers_threshold() {
        let eager = EnergyDetector::new(0.9);
        let strict = EnergyDetector::new(0.1);
        assert!(eager.threshold < strict.threshold);
    }
}
