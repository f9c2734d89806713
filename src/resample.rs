//! Polyphase sample-rate conversion
//!
//! Integer-exact rate conversion for rendered 8-bit clips. The
//! converter reduces the rate pair by its GCD and precomputes one
//! 14-tap Hamming-windowed-sinc filter per input phase in Q16.16;
//! resampling then runs entirely on an integer phase accumulator, so
//! there is no floating-point drift across arbitrarily long buffers.

use std::f64::consts::PI;

/// Taps per polyphase filter
const TAPS: usize = 14;

/// Center offset of the tap window
const TAP_CENTER: f64 = 6.0;

/// Hamming window angular step (2*pi / 28)
const WINDOW_STEP: f64 = 0.224_399_475_256_413_8;

/// Polyphase windowed-sinc rate converter
///
/// Construction precomputes the whole filter bank; a converter built
/// with equal rates is an identity pass-through. The converter is
/// immutable and can be shared freely between calls.
#[derive(Debug, Clone)]
pub struct Decimator {
    input_rate: i32,
    output_rate: i32,
    table: Option<Vec<[i32; TAPS]>>,
}

impl Decimator {
    /// Build a converter from `input_rate` to `output_rate` (Hz)
    pub fn new(input_rate: i32, output_rate: i32) -> Self {
        if output_rate == input_rate {
            return Decimator {
                input_rate,
                output_rate,
                table: None,
            };
        }

        let divisor = gcd(input_rate, output_rate);
        let input_rate = input_rate / divisor;
        let output_rate = output_rate / divisor;

        let mut table = vec![[0i32; TAPS]; input_rate as usize];
        let scale = output_rate as f64 / input_rate as f64;
        for (phase, taps) in table.iter_mut().enumerate() {
            let center = phase as f64 / input_rate as f64 + TAP_CENTER;
            let first = ((1.0 + (center - 7.0)).floor() as i32).max(0);
            let last = ((center + 7.0).ceil() as i32).min(TAPS as i32);

            for tap in first..last {
                let distance = (tap as f64 - center) * PI;
                // The sinc limit at zero distance is the scale factor
                // itself; dividing there would blow up on rounding
                // noise.
                let mut value = scale;
                if !(-1.0e-4..=1.0e-4).contains(&distance) {
                    value = scale * (distance.sin() / distance);
                }
                value *= 0.54 + 0.46 * (WINDOW_STEP * (tap as f64 - center)).cos();
                taps[tap as usize] = (0.5 + 65536.0 * value).floor() as i32;
            }
        }

        Decimator {
            input_rate,
            output_rate,
            table: Some(table),
        }
    }

    /// Resample a signed 8-bit clip.
    ///
    /// Every input sample scatters its 14 scaled taps into a wide
    /// accumulator at the current output offset; the integer phase
    /// accumulator advances the offset by `output_rate / input_rate`
    /// exactly. Accumulators are rounded and saturated back to 8 bits
    /// in a final pass. Identity converters return the input untouched.
    pub fn resample(&self, samples: Vec<i8>) -> Vec<i8> {
        let Some(table) = &self.table else {
            return samples;
        };

        let out_len =
            (self.output_rate as i64 * samples.len() as i64 / self.input_rate as i64) as usize
                + TAPS;
        let mut accumulator = vec![0i32; out_len];
        let mut out_index = 0usize;
        let mut phase = 0i32;

        for &sample in &samples {
            let taps = &table[phase as usize];
            for (tap, &coefficient) in taps.iter().enumerate() {
                accumulator[out_index + tap] =
                    accumulator[out_index + tap].wrapping_add(coefficient.wrapping_mul(sample as i32));
            }
            phase += self.output_rate;
            let advance = phase / self.input_rate;
            out_index += advance as usize;
            phase -= advance * self.input_rate;
        }

        accumulator
            .iter()
            .map(|&value| (value.wrapping_add(32768) >> 16).clamp(-128, 127) as i8)
            .collect()
    }

    /// Rescale a sample rate by the conversion ratio
    pub fn scale_rate(&self, rate: i32) -> i32 {
        if self.table.is_none() {
            return rate;
        }
        (self.output_rate as i64 * rate as i64 / self.input_rate as i64) as i32
    }

    /// Rescale a sample position by the conversion ratio, shifted by
    /// the tap-center group delay so trim windows stay aligned
    pub fn scale_position(&self, position: i32) -> i32 {
        if self.table.is_none() {
            return position;
        }
        (position as i64 * self.output_rate as i64 / self.input_rate as i64) as i32
            + TAP_CENTER as i32
    }
}

fn gcd(mut a: i32, mut b: i32) -> i32 {
    while b != 0 {
        let remainder = a % b;
        a = b;
        b = remainder;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_when_rates_match() {
        let decimator = Decimator::new(22050, 22050);
        let samples: Vec<i8> = (0..100).map(|n| (n % 41) as i8 - 20).collect();
        assert_eq!(decimator.resample(samples.clone()), samples);
        assert_eq!(decimator.scale_rate(22050), 22050);
        assert_eq!(decimator.scale_position(1234), 1234);
    }

    #[test]
    fn test_rates_reduce_by_gcd() {
        let decimator = Decimator::new(22050, 11025);
        assert_eq!(decimator.input_rate, 2);
        assert_eq!(decimator.output_rate, 1);
        assert_eq!(decimator.table.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_halving_output_length() {
        let decimator = Decimator::new(22050, 11025);
        let samples = vec![0i8; 1000];
        assert_eq!(decimator.resample(samples).len(), 500 + TAPS);
    }

    #[test]
    fn test_tap_rows_sum_near_unity_gain() {
        // Each phase's taps approximate the conversion scale factor in
        // Q16.16; half-rate conversion means roughly 32768 per row.
        let decimator = Decimator::new(22050, 11025);
        for taps in decimator.table.as_ref().unwrap() {
            let sum: i32 = taps.iter().sum();
            assert!(
                (sum - 32768).abs() < 2048,
                "tap row sums to {} instead of ~32768",
                sum
            );
        }
    }

    #[test]
    fn test_scale_rate_and_position() {
        let decimator = Decimator::new(22050, 44100);
        assert_eq!(decimator.scale_rate(22050), 44100);
        assert_eq!(decimator.scale_position(100), 206);
    }

    #[test]
    fn test_constant_signal_resamples_to_constant() {
        let decimator = Decimator::new(22050, 11025);
        let samples = vec![100i8; 2000];
        let resampled = decimator.resample(samples);
        // Ignore the filter's warm-up and tail regions.
        let body = &resampled[TAPS..resampled.len() - TAPS];
        for &value in body {
            assert!((98..=102).contains(&value), "got {}", value);
        }
    }
}
