//! PCM audio value object
//!
//! Every stage of the pipeline works on [`Audio`]: normalized `f32` samples
//! in `[-1.0, 1.0]` plus sample rate and channel count. Keeping one canonical
//! representation means format conversion (and its clamping) happens exactly
//! once at each socket boundary instead of inside every stage.

use crate::{Error, Result};

/// Peak-amplitude silence threshold, roughly -40 dB FS
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;

/// Canonical bit depth on the wire
const BIT_DEPTH: u16 = 16;

/// A block of audio samples with its format
///
/// Immutable by convention: transforms return a new value rather than
/// mutating in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Audio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    bit_depth: u16,
}

impl Audio {
    /// Build from raw little-endian 16-bit PCM bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the byte length is odd.
    pub fn from_pcm16(data: &[u8], sample_rate: u32, channels: u16) -> Result<Self> {
        if data.len() % 2 != 0 {
            return Err(Error::MalformedInput(format!(
                "pcm16 byte length {} is odd",
                data.len()
            )));
        }

        let samples = data
            .chunks_exact(2)
            .map(|pair| {
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                // Normalize by 32768 for both signs so the round trip is exact
                f32::from(sample) / 32768.0
            })
            .collect();

        Ok(Self {
            samples,
            sample_rate,
            channels,
            bit_depth: BIT_DEPTH,
        })
    }

    /// Build directly from normalized samples
    #[must_use]
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            bit_depth: BIT_DEPTH,
        }
    }

    /// Normalized samples
    #[must_use]
    pub fn as_f32(&self) -> &[f32] {
        &self.samples
    }

    /// Signed 16-bit view of the samples
    ///
    /// Samples are clamped to `[-1.0, 1.0]` before scaling; the scale factor
    /// is 32768 with saturation at ±32767/−32768.
    #[must_use]
    pub fn as_int16(&self) -> Vec<i16> {
        self.samples.iter().map(|&s| f32_to_i16(s)).collect()
    }

    /// Little-endian 16-bit PCM byte view of the samples
    #[must_use]
    pub fn as_pcm16(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for &s in &self.samples {
            bytes.extend_from_slice(&f32_to_i16(s).to_le_bytes());
        }
        bytes
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count (1 = mono, 2 = interleaved stereo)
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of samples per channel
    #[must_use]
    pub fn frame_length(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Resample to the target rate
    ///
    /// A no-op clone when the target equals the current rate. Downsampling
    /// runs a sinc low-pass (Hanning windowed, cutoff = target/2) before
    /// interpolation to suppress aliasing.
    #[must_use]
    pub fn resample(&self, target_rate: u32) -> Self {
        if target_rate == self.sample_rate {
            return self.clone();
        }

        let samples = super::resample(
            &self.samples,
            f64::from(self.sample_rate),
            f64::from(target_rate),
        );

        Self {
            samples,
            sample_rate: target_rate,
            channels: self.channels,
            bit_depth: self.bit_depth,
        }
    }

    /// Downmix interleaved stereo to mono by averaging sample pairs
    ///
    /// A no-op clone for mono input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedChannelLayout`] for anything other than
    /// one or two channels, and [`Error::MalformedInput`] if a stereo buffer
    /// has an odd sample count.
    pub fn stereo_to_mono(&self) -> Result<Self> {
        match self.channels {
            1 => Ok(self.clone()),
            2 => {
                if self.samples.len() % 2 != 0 {
                    return Err(Error::MalformedInput(format!(
                        "stereo buffer has odd sample count {}",
                        self.samples.len()
                    )));
                }

                let mono = self
                    .samples
                    .chunks_exact(2)
                    .map(|pair| (pair[0] + pair[1]) / 2.0)
                    .collect();

                Ok(Self {
                    samples: mono,
                    sample_rate: self.sample_rate,
                    channels: 1,
                    bit_depth: self.bit_depth,
                })
            }
            channels => Err(Error::UnsupportedChannelLayout { channels }),
        }
    }

    /// Whether the peak absolute sample is below the default threshold
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.is_silent_with_threshold(DEFAULT_SILENCE_THRESHOLD)
    }

    /// Whether the peak absolute sample is below `threshold`
    #[must_use]
    pub fn is_silent_with_threshold(&self, threshold: f32) -> bool {
        self.samples.iter().all(|s| s.abs() <= threshold)
    }
}

/// Clamp to `[-1.0, 1.0]`, scale by 32768, saturate at the i16 bounds
#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    let scaled = sample.clamp(-1.0, 1.0) * 32768.0;
    if scaled >= 32767.0 {
        32767
    } else if scaled <= -32768.0 {
        -32768
    } else {
        scaled as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn pcm16_round_trip_is_exact() {
        let values: Vec<i16> = vec![0, 1, -1, 1000, -1000, 32767, -32768, 12345, -12345];
        let bytes = pcm_bytes(&values);

        let audio = Audio::from_pcm16(&bytes, 16_000, 1).unwrap();
        assert_eq!(audio.as_int16(), values);
        assert_eq!(audio.as_pcm16(), bytes);
    }

    #[test]
    fn odd_length_pcm_is_rejected() {
        let err = Audio::from_pcm16(&[0x01, 0x02, 0x03], 16_000, 1).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn out_of_range_samples_saturate() {
        let audio = Audio::from_samples(vec![2.0, -2.0, 1.0, -1.0], 16_000, 1);
        assert_eq!(audio.as_int16(), vec![32767, -32768, 32767, -32768]);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let audio = Audio::from_samples(vec![0.1, 0.2, 0.3, 0.4], 16_000, 1);
        assert_eq!(audio.resample(16_000), audio);
    }

    #[test]
    fn stereo_downmix_averages_pairs() {
        let bytes = pcm_bytes(&[1000, 2000, -4000, -2000, 0, 600]);
        let stereo = Audio::from_pcm16(&bytes, 16_000, 2).unwrap();
        assert_eq!(stereo.frame_length(), 3);

        let mono = stereo.stereo_to_mono().unwrap();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.frame_length(), 3);
        assert_eq!(mono.as_int16(), vec![1500, -3000, 300]);
    }

    #[test]
    fn mono_downmix_is_noop() {
        let audio = Audio::from_samples(vec![0.5, -0.5], 16_000, 1);
        let mixed = audio.stereo_to_mono().unwrap();
        assert_eq!(mixed, audio);
    }

    #[test]
    fn quad_channel_layout_is_unsupported() {
        let audio = Audio::from_samples(vec![0.0; 8], 16_000, 4);
        let err = audio.stereo_to_mono().unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedChannelLayout { channels: 4 }
        ));
    }

    #[test]
    fn silence_detection_uses_peak_amplitude() {
        let quiet = Audio::from_samples(vec![0.004, -0.009, 0.0], 16_000, 1);
        assert!(quiet.is_silent());

        let spike = Audio::from_samples(vec![0.0, 0.0, 0.2, 0.0], 16_000, 1);
        assert!(!spike.is_silent());
        assert!(spike.is_silent_with_threshold(0.5));
    }

    #[test]
    fn frame_length_counts_per_channel() {
        let stereo = Audio::from_samples(vec![0.0; 1024], 16_000, 2);
        assert_eq!(stereo.frame_length(), 512);
    }
}
