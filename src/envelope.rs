//! Piecewise-linear control envelopes
//!
//! Every time-varying parameter of the synthesizer (pitch, volume,
//! modulation rate/depth, gate period, filter sweep) is driven by an
//! envelope: an ordered list of segments mapping normalized note time
//! (0..65536) to a normalized value (0..65536), stepped once per output
//! sample. Stepping runs in Q15 fixed point with truncating division,
//! matching the original client's ramps bit-for-bit.
//!
//! The curve itself is immutable shared data; the sample cursor lives
//! in a separate [`EnvelopeStepper`] so one parameter set can be
//! synthesized repeatedly (or from several threads) without hidden
//! state.

use serde::{Deserialize, Serialize};

use crate::waveform::Waveform;

/// Q15 shift used for envelope amplitude accumulation
const AMPLITUDE_SHIFT: u32 = 15;

/// Full scale of the normalized time/value domain
const DOMAIN_SCALE: f64 = 65536.0;

/// One envelope breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Time to reach this breakpoint, in 1/65536ths of the note duration
    pub duration: u16,
    /// Target value at the breakpoint (0..65535)
    pub peak: u16,
}

/// A piecewise-linear control curve
///
/// `start` and `end` hold the curve's range in domain units (Hz codes,
/// gain codes, sample counts); the stepped output (0..65536) is
/// rescaled into that range by the consumer. `form` selects the
/// oscillator shape when the envelope also drives a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Generator shape used when this envelope drives an oscillator
    pub form: Waveform,
    /// Domain-unit value at the start of the curve
    pub start: i32,
    /// Domain-unit value at the end of the curve
    pub end: i32,
    /// Breakpoints in playback order
    pub segments: Vec<Segment>,
}

impl Envelope {
    /// Create the default two-segment full-scale ramp (the shape the
    /// client constructs before decoding fills it in)
    pub fn new() -> Self {
        Envelope {
            form: Waveform::Off,
            start: 0,
            end: 0,
            segments: vec![
                Segment {
                    duration: 0,
                    peak: 0,
                },
                Segment {
                    duration: 65535,
                    peak: 65535,
                },
            ],
        }
    }

    /// Create a stepper positioned at the start of the curve
    pub fn stepper(&self) -> EnvelopeStepper<'_> {
        EnvelopeStepper::new(self)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample cursor for stepping an [`Envelope`] over one synthesis pass
///
/// The stepper holds the segment index, the Q15 amplitude accumulator
/// and the per-tick delta. The legacy engine kept this state inside the
/// envelope object itself; splitting it out keeps envelopes shareable
/// and every synthesis pass independent.
#[derive(Debug)]
pub struct EnvelopeStepper<'a> {
    envelope: &'a Envelope,
    /// Tick at which the current segment ends
    threshold: i32,
    /// Index of the segment being interpolated towards
    index: usize,
    /// Per-tick Q15 amplitude delta
    step: i32,
    /// Q15 amplitude accumulator
    amplitude: i32,
    /// Samples stepped so far
    ticks: i32,
}

impl<'a> EnvelopeStepper<'a> {
    fn new(envelope: &'a Envelope) -> Self {
        EnvelopeStepper {
            envelope,
            threshold: 0,
            index: 0,
            step: 0,
            amplitude: 0,
            ticks: 0,
        }
    }

    /// Rewind the cursor to the start of the curve
    pub fn reset(&mut self) {
        self.threshold = 0;
        self.index = 0;
        self.step = 0;
        self.amplitude = 0;
        self.ticks = 0;
    }

    /// Advance one sample of a `period`-sample pass and return the
    /// interpolated value (0..65536).
    ///
    /// Segment thresholds are scaled from normalized time to sample
    /// ticks through f64, and the ramp delta uses truncating integer
    /// division; both match the original engine exactly. The amplitude
    /// accumulator wraps like 32-bit arithmetic (the final tick of a
    /// full-scale ramp overflows transiently before the subtraction).
    /// Stepping past `period` holds the last returned value.
    pub fn step(&mut self, period: i32) -> i32 {
        let segments = &self.envelope.segments;
        if segments.is_empty() {
            return 0;
        }
        if self.ticks >= period {
            // Past the declared pass length: clamped no-op.
            return self.amplitude.wrapping_sub(self.step) >> AMPLITUDE_SHIFT;
        }

        if self.ticks >= self.threshold {
            self.amplitude = (segments[self.index].peak as i32) << AMPLITUDE_SHIFT;
            if self.index + 1 < segments.len() {
                self.index += 1;
            }
            self.threshold =
                (segments[self.index].duration as f64 / DOMAIN_SCALE * period as f64) as i32;
            if self.threshold > self.ticks {
                self.step = (((segments[self.index].peak as i32) << AMPLITUDE_SHIFT)
                    - self.amplitude)
                    / (self.threshold - self.ticks);
            }
        }

        self.amplitude = self.amplitude.wrapping_add(self.step);
        self.ticks += 1;
        self.amplitude.wrapping_sub(self.step) >> AMPLITUDE_SHIFT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Envelope {
        Envelope::new()
    }

    #[test]
    fn test_first_step_returns_first_peak() {
        let envelope = ramp();
        let mut stepper = envelope.stepper();
        assert_eq!(stepper.step(100), 0);
    }

    #[test]
    fn test_last_step_returns_last_peak() {
        let envelope = ramp();
        let mut stepper = envelope.stepper();
        let mut last = 0;
        for _ in 0..100 {
            last = stepper.step(100);
        }
        assert_eq!(last, 65535);
    }

    #[test]
    fn test_ramp_is_monotonic() {
        let envelope = ramp();
        let mut stepper = envelope.stepper();
        let mut previous = -1;
        for _ in 0..1000 {
            let value = stepper.step(1000);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn test_constant_envelope_holds_peak() {
        let envelope = Envelope {
            segments: vec![
                Segment {
                    duration: 0,
                    peak: 4096,
                },
                Segment {
                    duration: 65535,
                    peak: 4096,
                },
            ],
            ..Envelope::new()
        };
        let mut stepper = envelope.stepper();
        for _ in 0..500 {
            assert_eq!(stepper.step(500), 4096);
        }
    }

    #[test]
    fn test_step_past_period_holds_last_value() {
        let envelope = ramp();
        let mut stepper = envelope.stepper();
        let mut last = 0;
        for _ in 0..50 {
            last = stepper.step(50);
        }
        for _ in 0..10 {
            assert_eq!(stepper.step(50), last);
        }
    }

    #[test]
    fn test_reset_rewinds_cursor() {
        let envelope = ramp();
        let mut stepper = envelope.stepper();
        let first: Vec<i32> = (0..20).map(|_| stepper.step(20)).collect();
        stepper.reset();
        let second: Vec<i32> = (0..20).map(|_| stepper.step(20)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_segments_yield_zero() {
        let envelope = Envelope {
            segments: Vec::new(),
            ..Envelope::new()
        };
        let mut stepper = envelope.stepper();
        assert_eq!(stepper.step(10), 0);
    }
}
