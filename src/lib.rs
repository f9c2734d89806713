//! Synthesizer for the classic RuneScape "synth" sound-effect format
//!
//! A bit-accurate software reimplementation of the game client's
//! instrument synthesizer. Sound effects in this format are not sampled
//! audio: they are tiny declarative parameter sets (envelopes,
//! oscillator gains/pitches/delays, filter pole/zero descriptors) that
//! the client renders on demand. This crate reproduces that renderer,
//! including its Q16.16/Q15 fixed-point arithmetic and its lookup
//! tables, so the produced PCM matches the original engine
//! byte-for-byte.
//!
//! # Features
//! - Envelope-driven oscillator bank (square/sine/sawtooth/noise, up to
//!   5 voices per instrument) with vibrato and tremolo modulation
//! - Re-triggering attack/release gate and feedback echo
//! - Time-varying recursive filter with per-128-sample coefficient sweeps
//! - Ten-instrument additive mixer with 8-bit saturation at 22050 Hz
//! - Polyphase windowed-sinc resampler for rate conversion
//! - Binary codec for the on-disk format and WAV export
//!
//! # Crate feature flags
//! - `synth-format` (default): binary codec for the on-disk format (`codec`)
//! - `export-wav` (default): WAV export (`export`, enables optional `hound` dep)
//!
//! # Quick start
//! ## Render a decoded sound effect
//! ```no_run
//! # #[cfg(feature = "synth-format")]
//! # {
//! use jagsynth::codec;
//! let data = std::fs::read("prayer_drain.synth").unwrap();
//! let effect = codec::decode_sound_effect(&data).unwrap();
//! let sound = effect.to_raw_sound();
//! assert_eq!(sound.sample_rate, 22050);
//! # }
//! ```
//!
//! ## Resample to a device rate
//! ```no_run
//! # #[cfg(feature = "synth-format")]
//! # {
//! use jagsynth::{codec, Decimator};
//! let data = std::fs::read("prayer_drain.synth").unwrap();
//! let effect = codec::decode_sound_effect(&data).unwrap();
//! let decimator = Decimator::new(22050, 44100);
//! let sound = effect.to_raw_sound().resample(&decimator);
//! # }
//! ```

#![warn(missing_docs)]

// Domain modules (feature-gated for modular use)
pub mod effect; // Sound-effect mixing
pub mod envelope; // Piecewise-linear control curves
pub mod filter; // Time-varying recursive filter
pub mod instrument; // Instrument voice synthesis
pub mod resample; // Polyphase rate conversion
pub mod waveform; // Oscillator shapes and tables

#[cfg(feature = "synth-format")]
pub mod codec; // Binary Format I/O
#[cfg(feature = "export-wav")]
pub mod export; // WAV Export

/// Error types for synthesizer operations
#[derive(thiserror::Error, Debug)]
pub enum SynthError {
    /// Error while decoding the binary sound format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SynthError {
    /// Converts a String into `SynthError::Other`.
    ///
    /// Convenience conversion for generic string errors. Prefer the
    /// specific variant constructors (`ParseError`, `AudioFileError`)
    /// where the error type is known.
    fn from(msg: String) -> Self {
        SynthError::Other(msg)
    }
}

impl From<&str> for SynthError {
    /// Converts a string slice into `SynthError::Other`.
    ///
    /// See [`From<String>`] for guidance on when to use explicit
    /// variant constructors instead.
    fn from(msg: &str) -> Self {
        SynthError::Other(msg.to_string())
    }
}

/// Result type for synthesizer operations
pub type Result<T> = std::result::Result<T, SynthError>;

// Public API exports
pub use effect::{RawSound, SoundEffect, BASE_SAMPLE_RATE};
pub use envelope::{Envelope, EnvelopeStepper, Segment};
pub use filter::SoundFilter;
pub use instrument::{Gate, Instrument, Lfo, Oscillator};
pub use resample::Decimator;
pub use waveform::Waveform;

#[cfg(feature = "synth-format")]
pub use codec::{decode_sound_effect, encode_sound_effect};
#[cfg(feature = "export-wav")]
pub use export::export_to_wav;
