//! Oscillator waveform generators
//!
//! The four generator shapes of the synthesis engine and the
//! process-wide lookup tables they index. Phase is a 15-bit value
//! (32768 units per cycle); higher accumulator bits wrap. The sine and
//! noise tables are built once on first use and shared read-only, so
//! concurrent synthesis passes never contend.
//!
//! The noise table is drawn from a 48-bit LCG identical to
//! `java.util.Random` seeded with 0, which is what the original client
//! uses; this keeps noise-based instruments byte-identical to the
//! legacy output.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Entries in the sine and noise tables (one 15-bit phase cycle)
const TABLE_LEN: usize = 32768;

/// Phase units over which one noise value is held
const NOISE_HOLD_PHASE: i32 = 2607;

/// Divisor mapping a table index to radians for the sine table
const SINE_DIVISOR: f64 = 5215.1903;

/// Peak amplitude of the sine table
const SINE_SCALE: f64 = 16384.0;

/// Oscillator generator shape, selected per envelope
///
/// The binary format stores this as a byte tag; anything outside the
/// four defined shapes evaluates to silence, so unknown tags map to
/// [`Waveform::Off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    /// No generator; evaluates to silence
    Off,
    /// Bipolar square wave (half period high, half low)
    Square,
    /// Table-lookup sine wave
    Sine,
    /// Bipolar sawtooth ramp
    Sawtooth,
    /// White noise held constant over 2607-phase-unit blocks
    Noise,
}

impl Waveform {
    /// Map a format tag to a shape
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Waveform::Square,
            2 => Waveform::Sine,
            3 => Waveform::Sawtooth,
            4 => Waveform::Noise,
            _ => Waveform::Off,
        }
    }

    /// Format tag for this shape
    pub fn tag(self) -> u8 {
        match self {
            Waveform::Off => 0,
            Waveform::Square => 1,
            Waveform::Sine => 2,
            Waveform::Sawtooth => 3,
            Waveform::Noise => 4,
        }
    }
}

/// Evaluate one generator sample
///
/// `phase` is the oscillator's phase accumulator and `amplitude` the
/// peak level. All arithmetic wraps like the original 32-bit engine;
/// only the shapes' own shifts scale the result.
pub fn evaluate(phase: i32, amplitude: i32, form: Waveform) -> i32 {
    match form {
        Waveform::Square => {
            if (phase & 32767) < 16384 {
                amplitude
            } else {
                -amplitude
            }
        }
        Waveform::Sine => sine_table()[(phase & 32767) as usize].wrapping_mul(amplitude) >> 14,
        Waveform::Sawtooth => (amplitude.wrapping_mul(phase & 32767) >> 14).wrapping_sub(amplitude),
        Waveform::Noise => {
            amplitude.wrapping_mul(noise_table()[(phase / NOISE_HOLD_PHASE & 32767) as usize])
        }
        Waveform::Off => 0,
    }
}

/// 48-bit LCG with the `java.util.Random` constants
///
/// Only `next_int` is needed; the client builds its noise table from
/// the raw 32-bit outputs of a zero-seeded instance.
struct Lcg48 {
    seed: u64,
}

impl Lcg48 {
    const MULTIPLIER: u64 = 0x5DEECE66D;
    const ADDEND: u64 = 0xB;
    const MASK: u64 = (1 << 48) - 1;

    fn new(seed: u64) -> Self {
        Lcg48 {
            seed: (seed ^ Self::MULTIPLIER) & Self::MASK,
        }
    }

    fn next_int(&mut self) -> i32 {
        self.seed = self
            .seed
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::ADDEND)
            & Self::MASK;
        (self.seed >> 16) as u32 as i32
    }
}

fn sine_table() -> &'static [i32; TABLE_LEN] {
    static SINE: OnceLock<Box<[i32; TABLE_LEN]>> = OnceLock::new();
    SINE.get_or_init(|| {
        let mut table = Box::new([0i32; TABLE_LEN]);
        for (index, entry) in table.iter_mut().enumerate() {
            *entry = ((index as f64 / SINE_DIVISOR).sin() * SINE_SCALE) as i32;
        }
        table
    })
}

fn noise_table() -> &'static [i32; TABLE_LEN] {
    static NOISE: OnceLock<Box<[i32; TABLE_LEN]>> = OnceLock::new();
    NOISE.get_or_init(|| {
        let mut rng = Lcg48::new(0);
        let mut table = Box::new([0i32; TABLE_LEN]);
        for entry in table.iter_mut() {
            *entry = (rng.next_int() & 2) - 1;
        }
        table
    })
}
