//! Binary Format I/O
//!
//! Reader and writer for the on-disk synth sound-effect format: a
//! big-endian byte stream using two variable-width "smart" integer
//! forms, presence markers for optional envelope pairs, and a packed
//! filter descriptor. The decoder is strict - running off the end of
//! the data or exceeding a table capacity is a parse error, never a
//! silent truncation or a panic.
//!
//! Archive and cache lookup is the caller's responsibility; this
//! module only consumes the raw bytes of one sound effect.

use crate::effect::SoundEffect;
use crate::envelope::{Envelope, Segment};
use crate::filter::{SoundFilter, MAX_PAIRS};
use crate::instrument::{Gate, Instrument, Lfo, Oscillator, OSCILLATOR_SLOTS};
use crate::waveform::Waveform;
use crate::{Result, SynthError};

/// Cursor over a big-endian synth byte stream
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    /// Wrap a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, position: 0 }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.position
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.position + count > self.data.len() {
            return Err(SynthError::ParseError(format!(
                "unexpected end of data at byte {} (wanted {} more)",
                self.position, count
            )));
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    /// Read one unsigned byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Peek at the next byte without consuming it
    pub fn peek_u8(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or_else(|| {
                SynthError::ParseError(format!("unexpected end of data at byte {}", self.position))
            })
    }

    /// Read a big-endian unsigned 16-bit value
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian signed 32-bit value
    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an unsigned smart value: one byte below 128, otherwise two
    /// bytes biased by 0x8000 (0..32767)
    pub fn read_u16_smart(&mut self) -> Result<i32> {
        if self.peek_u8()? < 128 {
            Ok(self.read_u8()? as i32)
        } else {
            Ok(self.read_u16()? as i32 - 0x8000)
        }
    }

    /// Read a signed smart value: one byte biased by 64 below 128,
    /// otherwise two bytes biased by 0xC000 (-16384..16383)
    pub fn read_i16_smart(&mut self) -> Result<i32> {
        if self.peek_u8()? < 128 {
            Ok(self.read_u8()? as i32 - 64)
        } else {
            Ok(self.read_u16()? as i32 - 0xC000)
        }
    }
}

/// Growable big-endian writer mirroring [`Reader`]
#[derive(Debug, Default)]
pub struct Writer {
    data: Vec<u8>,
}

impl Writer {
    /// Create an empty writer
    pub fn new() -> Self {
        Writer::default()
    }

    /// Take the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Write one byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Write a big-endian unsigned 16-bit value
    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian signed 32-bit value
    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Write an unsigned smart value (0..32767)
    pub fn write_u16_smart(&mut self, value: i32) -> Result<()> {
        match value {
            0..=127 => self.write_u8(value as u8),
            128..=32767 => self.write_u16((value + 0x8000) as u16),
            _ => {
                return Err(SynthError::ParseError(format!(
                    "value {} out of unsigned smart range",
                    value
                )))
            }
        }
        Ok(())
    }

    /// Write a signed smart value (-16384..16383)
    pub fn write_i16_smart(&mut self, value: i32) -> Result<()> {
        match value {
            -64..=63 => self.write_u8((value + 64) as u8),
            -16384..=16383 => self.write_u16((value + 0xC000) as u16),
            _ => {
                return Err(SynthError::ParseError(format!(
                    "value {} out of signed smart range",
                    value
                )))
            }
        }
        Ok(())
    }
}

/// Decode a complete sound effect from its raw bytes
pub fn decode_sound_effect(data: &[u8]) -> Result<SoundEffect> {
    let mut reader = Reader::new(data);
    let mut effect = SoundEffect::new();
    for slot in effect.instruments.iter_mut() {
        if reader.peek_u8()? != 0 {
            *slot = Some(decode_instrument(&mut reader)?);
        } else {
            reader.read_u8()?;
        }
    }
    effect.start = reader.read_u16()? as i32;
    effect.end = reader.read_u16()? as i32;
    Ok(effect)
}

/// Encode a sound effect back to its binary form
///
/// Inverse of [`decode_sound_effect`]: decoding the produced bytes
/// yields an identical parameter set.
pub fn encode_sound_effect(effect: &SoundEffect) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    for slot in effect.instruments.iter() {
        match slot {
            Some(instrument) => encode_instrument(&mut writer, instrument)?,
            None => writer.write_u8(0),
        }
    }
    writer.write_u16(effect.start as u16);
    writer.write_u16(effect.end as u16);
    Ok(writer.into_bytes())
}

fn decode_envelope(reader: &mut Reader) -> Result<Envelope> {
    let form = Waveform::from_tag(reader.read_u8()?);
    let start = reader.read_i32()?;
    let end = reader.read_i32()?;
    let mut envelope = Envelope {
        form,
        start,
        end,
        segments: Vec::new(),
    };
    decode_segments(reader, &mut envelope)?;
    Ok(envelope)
}

fn decode_segments(reader: &mut Reader, envelope: &mut Envelope) -> Result<()> {
    let count = reader.read_u8()? as usize;
    let mut segments = Vec::with_capacity(count);
    for _ in 0..count {
        segments.push(Segment {
            duration: reader.read_u16()?,
            peak: reader.read_u16()?,
        });
    }
    envelope.segments = segments;
    Ok(())
}

fn decode_lfo(reader: &mut Reader) -> Result<Option<Lfo>> {
    if reader.peek_u8()? == 0 {
        reader.read_u8()?;
        return Ok(None);
    }
    Ok(Some(Lfo {
        rate: decode_envelope(reader)?,
        depth: decode_envelope(reader)?,
    }))
}

fn decode_instrument(reader: &mut Reader) -> Result<Instrument> {
    let mut instrument = Instrument::new();
    instrument.pitch = decode_envelope(reader)?;
    instrument.volume = decode_envelope(reader)?;
    instrument.vibrato = decode_lfo(reader)?;
    instrument.tremolo = decode_lfo(reader)?;

    if reader.peek_u8()? != 0 {
        instrument.gate = Some(Gate {
            release: decode_envelope(reader)?,
            attack: decode_envelope(reader)?,
        });
    } else {
        reader.read_u8()?;
    }

    let mut slot = 0usize;
    loop {
        let volume = reader.read_u16_smart()?;
        if volume == 0 {
            break;
        }
        if slot >= OSCILLATOR_SLOTS {
            return Err(SynthError::ParseError(format!(
                "more than {} oscillators at byte {}",
                OSCILLATOR_SLOTS,
                reader.position()
            )));
        }
        instrument.oscillators[slot] = Oscillator {
            volume,
            pitch: reader.read_i16_smart()?,
            delay: reader.read_u16_smart()?,
        };
        slot += 1;
    }

    instrument.delay_time = reader.read_u16_smart()?;
    instrument.delay_decay = reader.read_u16_smart()?;
    instrument.duration = reader.read_u16()? as i32;
    instrument.offset = reader.read_u16()? as i32;

    decode_filter(reader, &mut instrument.filter, &mut instrument.filter_envelope)?;
    Ok(instrument)
}

fn decode_filter(
    reader: &mut Reader,
    filter: &mut SoundFilter,
    envelope: &mut Envelope,
) -> Result<()> {
    let packed = reader.read_u8()?;
    filter.pairs[0] = (packed >> 4) as i32;
    filter.pairs[1] = (packed & 15) as i32;
    if filter.pairs[0] as usize > MAX_PAIRS || filter.pairs[1] as usize > MAX_PAIRS {
        return Err(SynthError::ParseError(format!(
            "filter pair counts {}/{} exceed {}",
            filter.pairs[0], filter.pairs[1], MAX_PAIRS
        )));
    }
    if packed == 0 {
        filter.unity = [0, 0];
        return Ok(());
    }

    filter.unity[0] = reader.read_u16()? as i32;
    filter.unity[1] = reader.read_u16()? as i32;
    let mask = reader.read_u8()? as i32;

    for channel in 0..2 {
        for pair in 0..filter.pairs[channel] as usize {
            filter.frequencies[channel][0][pair] = reader.read_u16()? as i32;
            filter.magnitudes[channel][0][pair] = reader.read_u16()? as i32;
        }
    }
    for channel in 0..2 {
        for pair in 0..filter.pairs[channel] as usize {
            if mask & (1 << (channel * 4) << pair) != 0 {
                filter.frequencies[channel][1][pair] = reader.read_u16()? as i32;
                filter.magnitudes[channel][1][pair] = reader.read_u16()? as i32;
            } else {
                filter.frequencies[channel][1][pair] = filter.frequencies[channel][0][pair];
                filter.magnitudes[channel][1][pair] = filter.magnitudes[channel][0][pair];
            }
        }
    }

    if mask != 0 || filter.unity[1] != filter.unity[0] {
        decode_segments(reader, envelope)?;
    }
    Ok(())
}

fn encode_envelope(writer: &mut Writer, envelope: &Envelope) -> Result<()> {
    writer.write_u8(envelope.form.tag());
    writer.write_i32(envelope.start);
    writer.write_i32(envelope.end);
    encode_segments(writer, envelope)
}

fn encode_segments(writer: &mut Writer, envelope: &Envelope) -> Result<()> {
    if envelope.segments.len() > u8::MAX as usize {
        return Err(SynthError::ParseError(format!(
            "envelope with {} segments cannot be encoded",
            envelope.segments.len()
        )));
    }
    writer.write_u8(envelope.segments.len() as u8);
    for segment in &envelope.segments {
        writer.write_u16(segment.duration);
        writer.write_u16(segment.peak);
    }
    Ok(())
}

fn encode_lfo(writer: &mut Writer, lfo: &Option<Lfo>) -> Result<()> {
    match lfo {
        Some(lfo) => {
            encode_envelope(writer, &lfo.rate)?;
            encode_envelope(writer, &lfo.depth)
        }
        None => {
            writer.write_u8(0);
            Ok(())
        }
    }
}

fn encode_instrument(writer: &mut Writer, instrument: &Instrument) -> Result<()> {
    encode_envelope(writer, &instrument.pitch)?;
    encode_envelope(writer, &instrument.volume)?;
    encode_lfo(writer, &instrument.vibrato)?;
    encode_lfo(writer, &instrument.tremolo)?;
    match &instrument.gate {
        Some(gate) => {
            encode_envelope(writer, &gate.release)?;
            encode_envelope(writer, &gate.attack)?;
        }
        None => writer.write_u8(0),
    }

    for oscillator in &instrument.oscillators {
        if oscillator.volume == 0 {
            break;
        }
        writer.write_u16_smart(oscillator.volume)?;
        writer.write_i16_smart(oscillator.pitch)?;
        writer.write_u16_smart(oscillator.delay)?;
    }
    writer.write_u16_smart(0)?;

    writer.write_u16_smart(instrument.delay_time)?;
    writer.write_u16_smart(instrument.delay_decay)?;
    writer.write_u16(instrument.duration as u16);
    writer.write_u16(instrument.offset as u16);

    encode_filter(writer, &instrument.filter, &instrument.filter_envelope)
}

fn encode_filter(writer: &mut Writer, filter: &SoundFilter, envelope: &Envelope) -> Result<()> {
    let packed = ((filter.pairs[0] << 4) | filter.pairs[1]) as u8;
    writer.write_u8(packed);
    if packed == 0 {
        return Ok(());
    }

    writer.write_u16(filter.unity[0] as u16);
    writer.write_u16(filter.unity[1] as u16);

    let mut mask = 0i32;
    for channel in 0..2 {
        for pair in 0..filter.pairs[channel] as usize {
            if filter.frequencies[channel][1][pair] != filter.frequencies[channel][0][pair]
                || filter.magnitudes[channel][1][pair] != filter.magnitudes[channel][0][pair]
            {
                mask |= 1 << (channel * 4) << pair;
            }
        }
    }
    writer.write_u8(mask as u8);

    for channel in 0..2 {
        for pair in 0..filter.pairs[channel] as usize {
            writer.write_u16(filter.frequencies[channel][0][pair] as u16);
            writer.write_u16(filter.magnitudes[channel][0][pair] as u16);
        }
    }
    for channel in 0..2 {
        for pair in 0..filter.pairs[channel] as usize {
            if mask & (1 << (channel * 4) << pair) != 0 {
                writer.write_u16(filter.frequencies[channel][1][pair] as u16);
                writer.write_u16(filter.magnitudes[channel][1][pair] as u16);
            }
        }
    }

    if mask != 0 || filter.unity[1] != filter.unity[0] {
        encode_segments(writer, envelope)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::MAX_INSTRUMENTS;

    #[test]
    fn test_smart_forms_round_trip() {
        let mut writer = Writer::new();
        for value in [0, 1, 127, 128, 1000, 32767] {
            writer.write_u16_smart(value).unwrap();
        }
        for value in [-16384, -64, -1, 0, 63, 64, 16383] {
            writer.write_i16_smart(value).unwrap();
        }
        let bytes = writer.into_bytes();
        let mut reader = Reader::new(&bytes);
        for value in [0, 1, 127, 128, 1000, 32767] {
            assert_eq!(reader.read_u16_smart().unwrap(), value);
        }
        for value in [-16384, -64, -1, 0, 63, 64, 16383] {
            assert_eq!(reader.read_i16_smart().unwrap(), value);
        }
        assert_eq!(reader.position(), bytes.len());
    }

    #[test]
    fn test_smart_width_selection() {
        let mut writer = Writer::new();
        writer.write_u16_smart(127).unwrap();
        assert_eq!(writer.data.len(), 1);
        writer.write_u16_smart(128).unwrap();
        assert_eq!(writer.data.len(), 3);
    }

    #[test]
    fn test_smart_range_rejected() {
        let mut writer = Writer::new();
        assert!(writer.write_u16_smart(32768).is_err());
        assert!(writer.write_u16_smart(-1).is_err());
        assert!(writer.write_i16_smart(16384).is_err());
    }

    #[test]
    fn test_decode_empty_effect() {
        // Ten absent-instrument markers plus the trim window.
        let mut data = vec![0u8; MAX_INSTRUMENTS];
        data.extend_from_slice(&[0x00, 0x64, 0x01, 0x2C]);
        let effect = decode_sound_effect(&data).unwrap();
        assert!(effect.instruments.iter().all(|slot| slot.is_none()));
        assert_eq!(effect.start, 100);
        assert_eq!(effect.end, 300);
    }

    #[test]
    fn test_truncated_input_is_parse_error() {
        let data = vec![0u8; 5];
        match decode_sound_effect(&data) {
            Err(SynthError::ParseError(_)) => {}
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_pair_overflow_is_parse_error() {
        let mut writer = Writer::new();
        let mut instrument = Instrument::new();
        instrument.pitch.form = crate::waveform::Waveform::Sine;
        instrument.oscillators[0].volume = 50;
        encode_instrument(&mut writer, &instrument).unwrap();
        let mut data = writer.into_bytes();
        // Corrupt the trailing filter descriptor byte: 5 zero pairs.
        let last = data.len() - 1;
        data[last] = 0x50;
        let mut reader = Reader::new(&data);
        assert!(decode_instrument(&mut reader).is_err());
    }

    #[test]
    fn test_effect_round_trip() {
        let mut effect = SoundEffect::new();

        let mut lead = Instrument::new();
        lead.pitch.form = crate::waveform::Waveform::Square;
        lead.pitch.start = 200;
        lead.pitch.end = 800;
        lead.oscillators[0] = Oscillator {
            volume: 100,
            pitch: 0,
            delay: 0,
        };
        lead.oscillators[1] = Oscillator {
            volume: 40,
            pitch: -1200,
            delay: 25,
        };
        lead.vibrato = Some(Lfo {
            rate: Envelope {
                form: crate::waveform::Waveform::Sine,
                start: 4,
                end: 12,
                ..Envelope::new()
            },
            depth: Envelope::new(),
        });
        lead.delay_time = 120;
        lead.delay_decay = 40;
        lead.duration = 700;
        lead.offset = 40;
        lead.filter.pairs = [1, 2];
        lead.filter.unity = [100, 300];
        lead.filter.frequencies[0][0][0] = 3000;
        lead.filter.magnitudes[0][0][0] = 1200;
        lead.filter.frequencies[0][1][0] = 3500;
        lead.filter.magnitudes[0][1][0] = 1200;
        for pair in 0..2 {
            filter_pair(&mut lead.filter, 1, pair);
        }
        effect.instruments[0] = Some(lead);

        let mut bass = Instrument::new();
        bass.pitch.form = crate::waveform::Waveform::Noise;
        bass.oscillators[0].volume = 70;
        bass.duration = 300;
        effect.instruments[3] = Some(bass);

        effect.start = 20;
        effect.end = 640;

        let encoded = encode_sound_effect(&effect).unwrap();
        let decoded = decode_sound_effect(&encoded).unwrap();
        assert_eq!(decoded, effect);
    }

    fn filter_pair(filter: &mut SoundFilter, channel: usize, pair: usize) {
        filter.frequencies[channel][0][pair] = 1000 + pair as i32 * 500;
        filter.magnitudes[channel][0][pair] = 800;
        filter.frequencies[channel][1][pair] = 1000 + pair as i32 * 500;
        filter.magnitudes[channel][1][pair] = 800;
    }
}
