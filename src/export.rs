//! WAV Export
//!
//! Writes rendered clips as mono 8-bit PCM WAV files. The on-disk
//! unsigned-offset convention for 8-bit WAV data is handled by the
//! `hound` writer.

use std::path::Path;

use crate::effect::RawSound;
use crate::{Result, SynthError};

/// Write a [`RawSound`] as a mono 8-bit PCM WAV file at its own sample
/// rate
///
/// # Examples
///
/// ```no_run
/// # #[cfg(feature = "synth-format")]
/// # {
/// use jagsynth::{codec, export_to_wav};
///
/// let data = std::fs::read("teleport.synth").unwrap();
/// let effect = codec::decode_sound_effect(&data).unwrap();
/// export_to_wav(&effect.to_raw_sound(), "teleport.wav").unwrap();
/// # }
/// ```
pub fn export_to_wav<P: AsRef<Path>>(sound: &RawSound, path: P) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sound.sample_rate as u32,
        bits_per_sample: 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|error| SynthError::AudioFileError(error.to_string()))?;
    for &sample in &sound.samples {
        writer
            .write_sample(sample)
            .map_err(|error| SynthError::AudioFileError(error.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|error| SynthError::AudioFileError(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_writes_readable_wav() {
        let sound = RawSound {
            sample_rate: 22050,
            samples: (0..64).map(|n| ((n % 9) * 3 - 12) as i8).collect(),
            start: 0,
            end: 0,
        };
        let path = std::env::temp_dir().join("jagsynth_export_test.wav");
        export_to_wav(&sound, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 8);
        let samples: Vec<i8> = reader.samples::<i8>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, sound.samples);
        std::fs::remove_file(&path).ok();
    }
}
