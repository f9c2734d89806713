//! Instrument voice synthesis
//!
//! An instrument is one voice of a sound effect: a bank of up to five
//! delayed, detuned oscillators sharing a pitch and a volume envelope,
//! optional vibrato/tremolo modulation, an optional re-triggering
//! gate, a feedback echo and a time-varying filter. [`Instrument::synthesize`]
//! runs the full pipeline and returns a signed 16-bit buffer.
//!
//! The legacy engine accumulated into process-wide scratch arrays; here
//! every pass owns its buffers, so independent sounds can be rendered
//! concurrently.

use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, EnvelopeStepper};
use crate::filter::SoundFilter;
use crate::waveform::{self, Waveform};

/// Oscillator slots per instrument
pub const OSCILLATOR_SLOTS: usize = 5;

/// Ratio between adjacent oscillator pitch codes: 2^(1/120), a tenth
/// of a semitone, at the engine's full stored precision
const PITCH_CODE_RATIO: f64 = 1.0057929410678534;

/// Phase accumulator units per cycle, per millisecond (32768 / 1000)
const PHASE_UNITS_PER_MS: f64 = 32.768;

/// One oscillator slot
///
/// Each slot replays the instrument's base waveform with its own mix
/// volume, pitch offset and start delay. A zero volume disables the
/// slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oscillator {
    /// Mix volume in percent (0..100); zero disables the slot
    pub volume: i32,
    /// Pitch offset in tenths of a semitone
    pub pitch: i32,
    /// Start delay in milliseconds
    pub delay: i32,
}

/// Low-frequency modulation pair: a rate curve and a depth curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lfo {
    /// Modulation rate curve; its `form` selects the modulator shape
    pub rate: Envelope,
    /// Modulation depth curve
    pub depth: Envelope,
}

/// Re-triggering gate envelope pair
///
/// The gate alternates between a silenced span and an audible span,
/// re-deriving the span length from whichever curve is active. It
/// starts silenced, which is what gives gated instruments their
/// chopped attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    /// Span-length curve while the gate is silencing output; its
    /// `start`/`end` range scales both curves
    pub release: Envelope,
    /// Span-length curve while the gate is passing output
    pub attack: Envelope,
}

/// One voice of a sound effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Base pitch curve; its `form` selects the oscillator waveform
    pub pitch: Envelope,
    /// Base volume curve
    pub volume: Envelope,
    /// Optional pitch modulation, added to the pitch value
    pub vibrato: Option<Lfo>,
    /// Optional volume modulation, scaling the volume value
    pub tremolo: Option<Lfo>,
    /// Optional re-triggering gate
    pub gate: Option<Gate>,
    /// The oscillator bank
    pub oscillators: [Oscillator; OSCILLATOR_SLOTS],
    /// Echo tap delay in milliseconds; zero disables the echo
    pub delay_time: i32,
    /// Echo decay in percent
    pub delay_decay: i32,
    /// Filter descriptor; bypassed when both channels are empty
    pub filter: SoundFilter,
    /// Progress curve for the filter's start-to-end sweep
    pub filter_envelope: Envelope,
    /// Note duration in milliseconds
    pub duration: i32,
    /// Start offset within the sound effect, in milliseconds
    pub offset: i32,
}

impl Instrument {
    /// Create an instrument with the client's pre-decode defaults
    pub fn new() -> Self {
        Instrument {
            pitch: Envelope::new(),
            volume: Envelope::new(),
            vibrato: None,
            tremolo: None,
            gate: None,
            oscillators: [Oscillator::default(); OSCILLATOR_SLOTS],
            delay_time: 0,
            delay_decay: 100,
            filter: SoundFilter::new(),
            filter_envelope: Envelope::new(),
            duration: 500,
            offset: 0,
        }
    }

    /// Render `sample_count` samples of a `duration`-millisecond note
    /// as signed 16-bit values in an i32 buffer.
    ///
    /// Durations under 10 ms produce silence of the requested length.
    /// The pipeline is oscillators, gate, echo, filter, then the final
    /// 16-bit clamp; all earlier stages run unsaturated with wrapping
    /// 32-bit arithmetic like the original engine.
    pub fn synthesize(&self, sample_count: usize, duration: i32) -> Vec<i32> {
        let mut samples = vec![0i32; sample_count];
        if duration < 10 {
            return samples;
        }
        let sample_rate = sample_count as f64 / duration as f64;
        let period = sample_count as i32;

        let mut pitch = self.pitch.stepper();
        let mut volume = self.volume.stepper();
        let mut vibrato = self.vibrato.as_ref().map(|lfo| LfoState::new(lfo, sample_rate));
        let mut tremolo = self.tremolo.as_ref().map(|lfo| LfoState::new(lfo, sample_rate));

        let mut phases = [0i32; OSCILLATOR_SLOTS];
        let mut delays = [0usize; OSCILLATOR_SLOTS];
        let mut volume_steps = [0i32; OSCILLATOR_SLOTS];
        let mut pitch_steps = [0i32; OSCILLATOR_SLOTS];
        let mut pitch_base_steps = [0i32; OSCILLATOR_SLOTS];
        for (slot, oscillator) in self.oscillators.iter().enumerate() {
            if oscillator.volume != 0 {
                delays[slot] = (oscillator.delay as f64 * sample_rate) as usize;
                volume_steps[slot] = (oscillator.volume << 14) / 100;
                pitch_steps[slot] = ((self.pitch.end - self.pitch.start) as f64
                    * PHASE_UNITS_PER_MS
                    * PITCH_CODE_RATIO.powf(oscillator.pitch as f64)
                    / sample_rate) as i32;
                pitch_base_steps[slot] =
                    (self.pitch.start as f64 * PHASE_UNITS_PER_MS / sample_rate) as i32;
            }
        }

        for i in 0..sample_count {
            let mut pitch_value = pitch.step(period);
            let mut volume_value = volume.step(period);

            if let Some(state) = vibrato.as_mut() {
                pitch_value = pitch_value.wrapping_add(state.modulate(period) >> 1);
            }
            if let Some(state) = tremolo.as_mut() {
                volume_value = volume_value
                    .wrapping_mul((state.modulate(period) >> 1).wrapping_add(32768))
                    >> 15;
            }

            for slot in 0..OSCILLATOR_SLOTS {
                if self.oscillators[slot].volume != 0 {
                    let position = delays[slot] + i;
                    if position < sample_count {
                        samples[position] = samples[position].wrapping_add(waveform::evaluate(
                            phases[slot],
                            volume_value.wrapping_mul(volume_steps[slot]) >> 15,
                            self.pitch.form,
                        ));
                        phases[slot] = phases[slot]
                            .wrapping_add(pitch_value.wrapping_mul(pitch_steps[slot]) >> 16)
                            .wrapping_add(pitch_base_steps[slot]);
                    }
                }
            }
        }

        if let Some(gate) = &self.gate {
            apply_gate(gate, &mut samples);
        }

        if self.delay_time > 0 && self.delay_decay > 0 {
            let delay_samples = (self.delay_time as f64 * sample_rate) as usize;
            for n in delay_samples..sample_count {
                samples[n] = samples[n]
                    .wrapping_add(samples[n - delay_samples].wrapping_mul(self.delay_decay) / 100);
            }
        }

        self.filter.apply(&self.filter_envelope, &mut samples);

        for sample in samples.iter_mut() {
            *sample = (*sample).clamp(-32768, 32767);
        }
        samples
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-pass state of one LFO: envelope cursors plus the fixed phase
/// increments derived from the rate curve's range and the sample rate
struct LfoState<'a> {
    rate: EnvelopeStepper<'a>,
    depth: EnvelopeStepper<'a>,
    form: Waveform,
    /// Phase increment spanned by the rate curve's full swing
    range_step: i32,
    /// Phase increment at the rate curve's start value
    base_step: i32,
    phase: i32,
}

impl<'a> LfoState<'a> {
    fn new(lfo: &'a Lfo, sample_rate: f64) -> Self {
        LfoState {
            rate: lfo.rate.stepper(),
            depth: lfo.depth.stepper(),
            form: lfo.rate.form,
            range_step: ((lfo.rate.end - lfo.rate.start) as f64 * PHASE_UNITS_PER_MS / sample_rate)
                as i32,
            base_step: (lfo.rate.start as f64 * PHASE_UNITS_PER_MS / sample_rate) as i32,
            phase: 0,
        }
    }

    /// Step both curves, evaluate the modulator at the current phase
    /// and advance the phase
    fn modulate(&mut self, period: i32) -> i32 {
        let rate_value = self.rate.step(period);
        let depth_value = self.depth.step(period);
        let value = waveform::evaluate(self.phase, depth_value, self.form);
        self.phase = self
            .phase
            .wrapping_add(self.base_step)
            .wrapping_add(rate_value.wrapping_mul(self.range_step) >> 16);
        value
    }
}

/// Alternate silenced/audible spans over the rendered buffer
///
/// A phase counter advances 256 units per sample towards a span length
/// re-derived each sample from the active curve, rescaled through the
/// release curve's domain range; reaching it flips the gate. Output is
/// zeroed while the gate is in its silenced state.
fn apply_gate(gate: &Gate, samples: &mut [i32]) {
    let period = samples.len() as i32;
    let mut release = gate.release.stepper();
    let mut attack = gate.attack.stepper();
    let range = gate.release.end - gate.release.start;

    let mut counter = 0i32;
    let mut muted = true;
    for sample in samples.iter_mut() {
        let release_value = release.step(period);
        let attack_value = attack.step(period);
        let span = if muted {
            (release_value.wrapping_mul(range) >> 8) + gate.release.start
        } else {
            (attack_value.wrapping_mul(range) >> 8) + gate.release.start
        };

        counter += 256;
        if counter >= span {
            counter = 0;
            muted = !muted;
        }
        if muted {
            *sample = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Segment;

    /// Envelope holding one value for the whole pass
    fn constant(value: u16) -> Envelope {
        Envelope {
            segments: vec![
                Segment {
                    duration: 0,
                    peak: value,
                },
                Segment {
                    duration: 65535,
                    peak: value,
                },
            ],
            ..Envelope::new()
        }
    }

    fn sine_tone(frequency: i32) -> Instrument {
        let mut instrument = Instrument::new();
        instrument.pitch = Envelope {
            form: Waveform::Sine,
            start: frequency,
            end: frequency,
            ..constant(0)
        };
        instrument.volume = constant(65535);
        instrument.oscillators[0].volume = 100;
        instrument
    }

    #[test]
    fn test_short_duration_is_silent() {
        let instrument = sine_tone(440);
        let samples = instrument.synthesize(2048, 9);
        assert_eq!(samples.len(), 2048);
        assert!(samples.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_sine_tone_is_nonsilent_and_clamped() {
        let instrument = sine_tone(440);
        let samples = instrument.synthesize(11025, 500);
        assert!(samples.iter().any(|&v| v != 0));
        assert!(samples.iter().all(|&v| (-32768..=32767).contains(&v)));
    }

    #[test]
    fn test_oscillator_delay_offsets_output() {
        let mut instrument = sine_tone(440);
        instrument.oscillators[0].delay = 100;
        let samples = instrument.synthesize(11025, 500);
        // 100 ms at 22.05 samples/ms
        let delay_samples = (100.0 * (11025.0 / 500.0)) as usize;
        assert!(samples[..delay_samples].iter().all(|&v| v == 0));
        assert!(samples[delay_samples..].iter().any(|&v| v != 0));
    }

    #[test]
    fn test_inactive_slots_add_nothing() {
        let reference = sine_tone(440).synthesize(4410, 200);
        let mut instrument = sine_tone(440);
        instrument.oscillators[3] = Oscillator {
            volume: 0,
            pitch: 1200,
            delay: 50,
        };
        assert_eq!(instrument.synthesize(4410, 200), reference);
    }

    #[test]
    fn test_echo_adds_decayed_copy() {
        let mut instrument = sine_tone(440);
        instrument.oscillators[0].delay = 100;
        let dry = instrument.synthesize(11025, 500);

        instrument.delay_time = 200;
        instrument.delay_decay = 50;
        let wet = instrument.synthesize(11025, 500);

        // The oscillator starts at 100 ms and the tap is 200 ms, so the
        // first echoed signal lands at 300 ms; everything before that
        // is identical to the dry render.
        let echo_start = (300.0 * 22.05) as usize;
        assert_eq!(&wet[..echo_start], &dry[..echo_start]);
        assert!(wet[echo_start..]
            .iter()
            .zip(&dry[echo_start..])
            .any(|(w, d)| w != d));
    }

    #[test]
    fn test_gate_silences_runs() {
        let mut instrument = sine_tone(440);
        instrument.gate = Some(Gate {
            release: Envelope {
                start: 2000,
                end: 2000,
                ..constant(65535)
            },
            attack: constant(65535),
        });
        let samples = instrument.synthesize(11025, 500);
        let zero_run = samples.iter().take_while(|&&v| v == 0).count();
        // Gate starts silenced: span of 2000/256 units, about 7 samples.
        assert!(zero_run >= 7, "expected a leading silenced run, got {}", zero_run);
        assert!(samples.iter().any(|&v| v != 0));
    }

    #[test]
    fn test_tremolo_changes_amplitude_profile() {
        let plain = sine_tone(440).synthesize(11025, 500);
        let mut instrument = sine_tone(440);
        instrument.tremolo = Some(Lfo {
            rate: Envelope {
                form: Waveform::Sine,
                start: 8,
                end: 8,
                ..constant(0)
            },
            depth: constant(65535),
        });
        let modulated = instrument.synthesize(11025, 500);
        assert_ne!(plain, modulated);
    }
}
