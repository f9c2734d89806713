//! Time-varying recursive filter
//!
//! Each instrument carries a filter descriptor of up to four
//! second-order sections per channel: channel 0 is the feed-forward
//! (zero) section, channel 1 the feedback (pole) section. Sections are
//! described in polar form - a magnitude code (dB-like) and a frequency
//! code (equal-tempered octaves above 32.7 Hz) - at both the start and
//! the end of the note, and a dedicated envelope sweeps between the
//! two states while the note plays.
//!
//! Coefficients are re-derived every 128 samples and applied in place
//! over the block, with a Z-sample lookahead for the zero section. The
//! derivation runs in f32 with f64 transcendentals and truncating
//! Q16.16 quantization, in the same operation order as the original
//! engine, so filtered output matches it bit-for-bit.

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Maximum second-order sections per channel
pub const MAX_PAIRS: usize = 4;

/// Coefficient slots per channel (two per section)
const COEFF_SLOTS: usize = MAX_PAIRS * 2;

/// Samples between coefficient recomputations
const BLOCK_LEN: usize = 128;

/// Magnitude code to dB scale (1/655.36)
const MAGNITUDE_SCALE: f32 = 0.001_525_878_9;

/// Frequency code to octave scale (1/8192)
const FREQUENCY_SCALE: f32 = 1.220_703_1e-4;

/// Unity-gain code to dB scale (1/327.68)
const UNITY_SCALE: f32 = 0.003_051_757_8;

/// Pole/zero filter descriptor for one instrument
///
/// Index layout follows the binary format: `frequencies[channel][w][pair]`
/// and `magnitudes[channel][w][pair]` with `w = 0` for the start-of-note
/// code and `w = 1` for the end-of-note code. `unity` is the broadband
/// gain code pair applied through channel 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundFilter {
    /// Live second-order sections per channel (0..=4)
    pub pairs: [i32; 2],
    /// Frequency codes, per channel / start-end / pair
    pub frequencies: [[[i32; MAX_PAIRS]; 2]; 2],
    /// Magnitude codes, per channel / start-end / pair
    pub magnitudes: [[[i32; MAX_PAIRS]; 2]; 2],
    /// Broadband unity-gain code at note start and end
    pub unity: [i32; 2],
}

impl SoundFilter {
    /// Create an empty (bypassed) filter
    pub fn new() -> Self {
        SoundFilter {
            pairs: [0; 2],
            frequencies: [[[0; MAX_PAIRS]; 2]; 2],
            magnitudes: [[[0; MAX_PAIRS]; 2]; 2],
            unity: [0; 2],
        }
    }

    /// Section radius at `position` (0..1 progress through the note)
    fn magnitude(&self, channel: usize, pair: usize, position: f32) -> f32 {
        let code = self.magnitudes[channel][0][pair] as f32
            + position
                * (self.magnitudes[channel][1][pair] - self.magnitudes[channel][0][pair]) as f32;
        let decibels = code * MAGNITUDE_SCALE;
        1.0 - (10.0f64.powf((-decibels / 20.0) as f64)) as f32
    }

    /// Section angle in radians/sample at `position`
    fn frequency(&self, channel: usize, pair: usize, position: f32) -> f32 {
        let code = self.frequencies[channel][0][pair] as f32
            + position
                * (self.frequencies[channel][1][pair] - self.frequencies[channel][0][pair]) as f32;
        normalize(code * FREQUENCY_SCALE)
    }

    /// Apply the filter to `samples` in place, sweeping the descriptor
    /// from its start to its end state as `envelope` progresses.
    ///
    /// Coefficients are recomputed every 128 samples (the first block
    /// is shorter, bounded by the pole count). The leading edge limits
    /// the pole sum to the filtered history available so far; the
    /// trailing edge raises the zero sum's lower bound instead of
    /// looking past the buffer while keeping the full pole bound - an
    /// asymmetry inherited from the original engine and reproduced
    /// as-is. A buffer shorter than the combined tap count is left
    /// untouched.
    pub fn apply(&self, envelope: &Envelope, samples: &mut [i32]) {
        if self.pairs[0] == 0 && self.pairs[1] == 0 {
            return;
        }

        let sample_count = samples.len();
        let period = sample_count as i32 + 1;
        let mut coefficients = FilterCoefficients::new();
        let mut sweep = envelope.stepper();

        let mut sweep_value = sweep.step(period);
        let mut zeros = coefficients.compute(self, 0, sweep_value as f32 / 65536.0);
        let mut poles = coefficients.compute(self, 1, sweep_value as f32 / 65536.0);
        if sample_count < zeros + poles {
            return;
        }

        // Leading edge: no filtered history yet, pole sum limited to n.
        let mut n = 0usize;
        let leading_end = poles.min(sample_count - zeros);
        while n < leading_end {
            let mut value =
                ((samples[n + zeros] as i64 * coefficients.forward_multiplier as i64) >> 16) as i32;
            for k in 0..zeros {
                value = value.wrapping_add(
                    ((samples[n + zeros - 1 - k] as i64 * coefficients.quantized[0][k] as i64)
                        >> 16) as i32,
                );
            }
            for k in 0..n {
                value = value.wrapping_sub(
                    ((samples[n - 1 - k] as i64 * coefficients.quantized[1][k] as i64) >> 16)
                        as i32,
                );
            }
            samples[n] = value;
            sweep_value = sweep.step(period);
            n += 1;
        }

        let mut block_end = BLOCK_LEN;
        loop {
            if block_end > sample_count - zeros {
                block_end = sample_count - zeros;
            }

            while n < block_end {
                let mut value = ((samples[n + zeros] as i64
                    * coefficients.forward_multiplier as i64)
                    >> 16) as i32;
                for k in 0..zeros {
                    value = value.wrapping_add(
                        ((samples[n + zeros - 1 - k] as i64 * coefficients.quantized[0][k] as i64)
                            >> 16) as i32,
                    );
                }
                for k in 0..poles {
                    value = value.wrapping_sub(
                        ((samples[n - 1 - k] as i64 * coefficients.quantized[1][k] as i64) >> 16)
                            as i32,
                    );
                }
                samples[n] = value;
                sweep_value = sweep.step(period);
                n += 1;
            }

            if n >= sample_count - zeros {
                // Trailing edge: clamp the zero sum to the buffer end,
                // keep the last computed pole bound.
                while n < sample_count {
                    let mut value = 0i32;
                    for k in (n + zeros - sample_count)..zeros {
                        value = value.wrapping_add(
                            ((samples[n + zeros - 1 - k] as i64
                                * coefficients.quantized[0][k] as i64)
                                >> 16) as i32,
                        );
                    }
                    for k in 0..poles {
                        value = value.wrapping_sub(
                            ((samples[n - 1 - k] as i64 * coefficients.quantized[1][k] as i64)
                                >> 16) as i32,
                        );
                    }
                    samples[n] = value;
                    sweep.step(period);
                    n += 1;
                }
                return;
            }

            zeros = coefficients.compute(self, 0, sweep_value as f32 / 65536.0);
            poles = coefficients.compute(self, 1, sweep_value as f32 / 65536.0);
            block_end += BLOCK_LEN;
        }
    }
}

impl Default for SoundFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Frequency code (octaves) to angular frequency (radians/sample at
/// the 22050 Hz engine rate), anchored at C1 = 32.703197 Hz
fn normalize(code: f32) -> f32 {
    let hz = 32.703_197_f32 * (2.0f64.powf(code as f64)) as f32;
    hz * 3.141_592_7 / 11025.0
}

/// Per-application coefficient state
///
/// The original engine kept these rows in process-wide statics; owning
/// them per apply call makes concurrent synthesis of independent
/// sounds safe.
struct FilterCoefficients {
    /// f32 working rows, one per channel
    rows: [[f32; COEFF_SLOTS]; 2],
    /// Q16.16 quantized rows, one per channel
    quantized: [[i32; COEFF_SLOTS]; 2],
    /// Broadband linear gain derived from the unity code (channel 0)
    gain: f32,
    /// Q16.16 gain applied to the unfiltered input sample
    forward_multiplier: i32,
}

impl FilterCoefficients {
    fn new() -> Self {
        FilterCoefficients {
            rows: [[0.0; COEFF_SLOTS]; 2],
            quantized: [[0; COEFF_SLOTS]; 2],
            gain: 0.0,
            forward_multiplier: 0,
        }
    }

    /// Derive one channel's coefficient row at `position` (0..1) and
    /// return its live tap count.
    ///
    /// Second-order sections are folded into the row by recursive
    /// convolution, growing the polynomial by two taps per section.
    /// Channel 0 additionally bakes the broadband gain into its row
    /// and refreshes the Q16.16 forward multiplier.
    fn compute(&mut self, filter: &SoundFilter, channel: usize, position: f32) -> usize {
        if channel == 0 {
            let code =
                filter.unity[0] as f32 + (filter.unity[1] - filter.unity[0]) as f32 * position;
            let decibels = code * UNITY_SCALE;
            self.gain = (0.1f64.powf((decibels / 20.0) as f64)) as f32;
            self.forward_multiplier = (self.gain * 65536.0) as i32;
        }

        if filter.pairs[channel] == 0 {
            return 0;
        }
        let pairs = filter.pairs[channel] as usize;

        let radius = filter.magnitude(channel, 0, position);
        let angle = filter.frequency(channel, 0, position);
        self.rows[channel][0] = -2.0 * radius * ((angle as f64).cos() as f32);
        self.rows[channel][1] = radius * radius;

        for pair in 1..pairs {
            let radius = filter.magnitude(channel, pair, position);
            let angle = filter.frequency(channel, pair, position);
            let cosine = -2.0 * radius * ((angle as f64).cos() as f32);
            let squared = radius * radius;

            let row = &mut self.rows[channel];
            row[pair * 2 + 1] = row[pair * 2 - 1] * squared;
            row[pair * 2] = row[pair * 2 - 1] * cosine + row[pair * 2 - 2] * squared;
            for slot in (2..=pair * 2 - 1).rev() {
                row[slot] += row[slot - 1] * cosine + row[slot - 2] * squared;
            }
            row[1] += row[0] * cosine + squared;
            row[0] += cosine;
        }

        if channel == 0 {
            for slot in 0..pairs * 2 {
                self.rows[0][slot] *= self.gain;
            }
        }

        for slot in 0..pairs * 2 {
            self.quantized[channel][slot] = (self.rows[channel][slot] * 65536.0) as i32;
        }
        pairs * 2
    }
}
