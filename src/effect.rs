//! Sound-effect mixing
//!
//! A sound effect is up to ten instruments, each with its own start
//! offset, plus a trim window. Mixing renders every instrument at the
//! engine's fixed 22050 Hz base rate, folds the 16-bit voices into a
//! shared signed 8-bit buffer with saturation, and yields a
//! [`RawSound`] ready for playback or resampling.

use serde::{Deserialize, Serialize};

use crate::instrument::Instrument;
use crate::resample::Decimator;

/// Fixed sample rate of every synthesized instrument, in Hz
pub const BASE_SAMPLE_RATE: i32 = 22050;

/// Instrument slots per sound effect
pub const MAX_INSTRUMENTS: usize = 10;

/// Granularity of the common start-delay trim, in milliseconds
const DELAY_UNIT_MS: i32 = 20;

/// A declarative sound effect: up to ten instruments and a trim window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEffect {
    /// Instrument slots; empty slots stay silent
    pub instruments: [Option<Instrument>; MAX_INSTRUMENTS],
    /// Trim window start in milliseconds
    pub start: i32,
    /// Trim window end in milliseconds
    pub end: i32,
}

impl SoundEffect {
    /// Create an empty sound effect
    pub fn new() -> Self {
        SoundEffect {
            instruments: std::array::from_fn(|_| None),
            start: 0,
            end: 0,
        }
    }

    /// Mix every instrument into one signed 8-bit buffer at the base
    /// rate.
    ///
    /// Each 16-bit voice sample is folded to 8 bits by an arithmetic
    /// right shift and added at the instrument's offset; sums leaving
    /// the 8-bit range saturate by sign instead of wrapping. An effect
    /// with no instruments mixes to an empty buffer.
    pub fn mix(&self) -> Vec<i8> {
        let mut max_length = 0;
        for instrument in self.instruments.iter().flatten() {
            if instrument.duration + instrument.offset > max_length {
                max_length = instrument.duration + instrument.offset;
            }
        }
        if max_length == 0 {
            return Vec::new();
        }

        let total = (max_length * BASE_SAMPLE_RATE / 1000) as usize;
        let mut samples = vec![0i8; total];
        for instrument in self.instruments.iter().flatten() {
            let sample_count = (instrument.duration * BASE_SAMPLE_RATE / 1000) as usize;
            let offset = (instrument.offset * BASE_SAMPLE_RATE / 1000) as usize;
            let rendered = instrument.synthesize(sample_count, instrument.duration);

            for (n, &value) in rendered.iter().enumerate() {
                let mut mixed = (value >> 8) + samples[n + offset] as i32;
                if (mixed + 128) & !255 != 0 {
                    mixed = mixed >> 31 ^ 127;
                }
                samples[n + offset] = mixed as i8;
            }
        }
        samples
    }

    /// Trim dead air shared by every instrument.
    ///
    /// Finds the largest whole multiple of 20 ms by which every
    /// instrument offset (and the trim window, when one is set) can be
    /// shifted left, applies the shift, and returns it in 20 ms units.
    /// Returns 0 when nothing can be trimmed.
    pub fn calculate_delay(&mut self) -> i32 {
        let mut min_delay = i32::MAX;
        for instrument in self.instruments.iter().flatten() {
            if instrument.offset / DELAY_UNIT_MS < min_delay {
                min_delay = instrument.offset / DELAY_UNIT_MS;
            }
        }
        if self.start < self.end && self.start / DELAY_UNIT_MS < min_delay {
            min_delay = self.start / DELAY_UNIT_MS;
        }
        if min_delay == i32::MAX || min_delay == 0 {
            return 0;
        }

        for instrument in self.instruments.iter_mut().flatten() {
            instrument.offset -= min_delay * DELAY_UNIT_MS;
        }
        if self.start < self.end {
            self.start -= min_delay * DELAY_UNIT_MS;
            self.end -= min_delay * DELAY_UNIT_MS;
        }
        min_delay
    }

    /// Mix and wrap the result with the trim window converted from
    /// milliseconds to sample positions
    pub fn to_raw_sound(&self) -> RawSound {
        RawSound {
            sample_rate: BASE_SAMPLE_RATE,
            samples: self.mix(),
            start: self.start * BASE_SAMPLE_RATE / 1000,
            end: self.end * BASE_SAMPLE_RATE / 1000,
        }
    }
}

impl Default for SoundEffect {
    fn default() -> Self {
        Self::new()
    }
}

/// A rendered mono 8-bit PCM clip with its trim positions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSound {
    /// Sample rate in Hz
    pub sample_rate: i32,
    /// Signed 8-bit PCM samples
    pub samples: Vec<i8>,
    /// Trim/loop start position in samples
    pub start: i32,
    /// Trim/loop end position in samples
    pub end: i32,
}

impl RawSound {
    /// Run the clip through a rate converter, rescaling the sample
    /// rate and the trim positions to match.
    ///
    /// A degenerate window (`start == end`) is kept degenerate; a
    /// window that collapses during rescaling is reopened by one
    /// sample, mirroring the original engine.
    pub fn resample(mut self, decimator: &Decimator) -> RawSound {
        self.samples = decimator.resample(self.samples);
        self.sample_rate = decimator.scale_rate(self.sample_rate);
        if self.start == self.end {
            self.start = decimator.scale_position(self.start);
            self.end = self.start;
        } else {
            self.start = decimator.scale_position(self.start);
            self.end = decimator.scale_position(self.end);
            if self.start == self.end {
                self.start -= 1;
            }
        }
        self
    }
}
