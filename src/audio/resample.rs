//! Sample-rate conversion
//!
//! Linear interpolation, preceded by a sinc low-pass when downsampling. The
//! client's 16 kHz rate sits below the model's 24 kHz band, so the filter is
//! required on the model-to-client path: unfiltered decimation folds energy
//! above the new Nyquist back into the audible band and the model's VAD
//! starts misclassifying the artifacts.

use std::f64::consts::PI;

/// Resample `input` from `input_rate` to `target_rate`
///
/// Interleaved multi-channel input is not supported here; callers downmix
/// first.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(input: &[f32], input_rate: f64, target_rate: f64) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }

    let ratio = target_rate / input_rate;
    let output_len = (input.len() as f64 * ratio) as usize;

    let filtered;
    let source: &[f32] = if target_rate < input_rate {
        filtered = low_pass(input, input_rate, target_rate / 2.0);
        &filtered
    } else {
        input
    };

    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let position = i as f64 / ratio;
        let index = position as usize;
        let fraction = position - index as f64;

        if index >= source.len() - 1 {
            output.push(source[source.len() - 1]);
            continue;
        }

        let a = source[index];
        let b = source[index + 1];
        output.push(a + (b - a) * fraction as f32);
    }

    output
}

/// Windowed-sinc low-pass filter
///
/// Cutoff at `cutoff` Hz, Hanning window to suppress ringing. Samples within
/// half a window of either edge are passed through unfiltered.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn low_pass(input: &[f32], sample_rate: f64, cutoff: f64) -> Vec<f32> {
    let window_size = (sample_rate / cutoff * 2.0) as usize;
    let mut filtered = input.to_vec();

    let half = (window_size / 2) as isize;
    let end = input.len().saturating_sub(window_size);

    for i in window_size..end {
        let mut sum = 0.0f32;
        let mut weight_sum = 0.0f32;

        for j in -half..half {
            let x = j as f64 * PI * cutoff / sample_rate;
            let mut weight = if x == 0.0 { 1.0 } else { (x.sin() / x) as f32 };
            weight *= (0.5 * (1.0 + (2.0 * PI * j as f64 / window_size as f64).cos())) as f32;

            sum += input[(i as isize + j) as usize] * weight;
            weight_sum += weight;
        }

        filtered[i] = sum / weight_sum;
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsample_ratio_scales_length() {
        let input = vec![0.0f32; 1024];
        let output = resample(&input, 16_000.0, 24_000.0);
        assert_eq!(output.len(), 1536);
    }

    #[test]
    fn downsample_ratio_scales_length() {
        let input = vec![0.0f32; 2400];
        let output = resample(&input, 24_000.0, 16_000.0);
        assert_eq!(output.len(), 1600);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(resample(&[], 16_000.0, 24_000.0).is_empty());
    }

    #[test]
    fn constant_signal_survives_round_trip() {
        let input = vec![0.25f32; 4800];
        let up = resample(&input, 16_000.0, 24_000.0);
        let down = resample(&up, 24_000.0, 16_000.0);

        assert_eq!(down.len(), input.len());
        for sample in down {
            assert!((sample - 0.25).abs() < 1e-3, "sample drifted: {sample}");
        }
    }

    #[test]
    fn downsample_attenuates_above_nyquist() {
        // 11 kHz tone at 24 kHz input is above the 8 kHz Nyquist of the
        // 16 kHz target; the filtered output must carry far less energy.
        let input: Vec<f32> = (0..4800)
            .map(|i| {
                let t = i as f32 / 24_000.0;
                (2.0 * std::f32::consts::PI * 11_000.0 * t).sin()
            })
            .collect();

        let output = resample(&input, 24_000.0, 16_000.0);

        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>() / s.len() as f32;
        // Compare interior regions to avoid the unfiltered edges.
        let input_energy = energy(&input[200..4600]);
        let output_energy = energy(&output[200..1400]);

        assert!(
            output_energy < input_energy / 10.0,
            "aliasing energy not suppressed: in={input_energy} out={output_energy}"
        );
    }
}
