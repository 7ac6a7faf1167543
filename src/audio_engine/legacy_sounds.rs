//! Legacy packed sound container support.
//!
//! A container starts with a small preamble holding the declared sound count at offset 0x6,
//! followed by 16-byte header entries from offset 0x10:
//!
//! ```text
//! u16 offset | u8 priority | u8 reserved | char[12] name
//! ```
//!
//! Each sound is a run of little-endian words starting at its header's offset and ending with
//! 0xFFFF. Every word other than 0 and the terminator is a PC-speaker divisor, which is turned
//! into a tone frequency in Hz.

use crate::audio_engine::audio_spec::{AudioSpec, SampleFormat};
use crate::audio_engine::constants::{
    LEGACY_COUNT_OFFSET, LEGACY_FIRST_HEADER, LEGACY_HEADER_LEN, LEGACY_NAME_LEN,
    LEGACY_TERMINATOR, PC_SPEAKER_AMPLITUDE_S16, PC_SPEAKER_AMPLITUDE_U8, PC_SPEAKER_DIVISOR,
    PC_SPEAKER_TICK_RATE,
};
use crate::audio_engine::errors::SoundLoadError;

/// A sound decoded from a legacy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySound {
    pub priority: u8,

    /// Tone frequencies in Hz, 0 for rests, ending with the terminator word.
    pub tones: Vec<u32>,
}

/// Converts one raw waveform word into its tone value.
pub fn tone_for_word(word: u16) -> u32 {
    match word {
        0 | LEGACY_TERMINATOR => u32::from(word),
        divisor => PC_SPEAKER_DIVISOR / u32::from(divisor),
    }
}

fn read_word(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn header_name(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Finds `name` in the container `data` and decodes its waveform.
///
/// Headers are scanned until the declared count is used up and the header table runs into the
/// end of the data, whichever comes last; an entry that would extend past the data ends the
/// scan.
pub fn decode_legacy_sound(data: &[u8], name: &str) -> Result<LegacySound, SoundLoadError> {
    let count = usize::from(read_word(data, LEGACY_COUNT_OFFSET).unwrap_or(0));

    let mut header = LEGACY_FIRST_HEADER;
    let mut index = 0;
    while index < count || header < data.len() {
        let Some(entry) = data.get(header..header + LEGACY_HEADER_LEN) else {
            break;
        };

        let offset = usize::from(u16::from_le_bytes([entry[0], entry[1]]));
        let priority = entry[2];
        let field = &entry[4..4 + LEGACY_NAME_LEN];

        if header_name(field) == name.as_bytes() {
            let tones = decode_tones(data, offset, name)?;
            return Ok(LegacySound { priority, tones });
        }

        header += LEGACY_HEADER_LEN;
        index += 1;
    }

    Err(SoundLoadError::NotFound {
        name: name.to_string(),
    })
}

fn decode_tones(data: &[u8], offset: usize, name: &str) -> Result<Vec<u32>, SoundLoadError> {
    if offset >= data.len() {
        return Err(SoundLoadError::InvalidOffset {
            name: name.to_string(),
            offset,
            len: data.len(),
        });
    }

    let mut tones = Vec::new();
    let mut pos = offset;
    loop {
        let word = read_word(data, pos).ok_or_else(|| SoundLoadError::Truncated {
            name: name.to_string(),
        })?;
        tones.push(tone_for_word(word));
        pos += 2;

        if word == LEGACY_TERMINATOR {
            return Ok(tones);
        }
    }
}

/// Renders PC-speaker tones into PCM for `spec`.
///
/// Each tone lasts 1/140 s and plays as a square wave; a rest is silence. Rendering stops at
/// the terminator.
pub fn render_pc_speaker(tones: &[u32], spec: &AudioSpec) -> Vec<u8> {
    let rate = u64::from(spec.rate.max(1));
    let tick_rate = u64::from(PC_SPEAKER_TICK_RATE);
    // Frame index at which tone `index` starts; rounding is carried across tones.
    let tone_start = |index: usize| (index as u64 * rate / tick_rate) as usize;
    let channels = usize::from(spec.channels.max(1));
    let audible = tones
        .iter()
        .take_while(|&&tone| tone != u32::from(LEGACY_TERMINATOR))
        .count();

    let (high, low, silence) = match spec.format {
        SampleFormat::U8 => (
            vec![0x80 + PC_SPEAKER_AMPLITUDE_U8],
            vec![0x80 - PC_SPEAKER_AMPLITUDE_U8],
            vec![0x80],
        ),
        SampleFormat::S16 => (
            PC_SPEAKER_AMPLITUDE_S16.to_ne_bytes().to_vec(),
            (-PC_SPEAKER_AMPLITUDE_S16).to_ne_bytes().to_vec(),
            0i16.to_ne_bytes().to_vec(),
        ),
    };

    let mut pcm = Vec::with_capacity(tone_start(audible) * spec.frame_bytes());
    let mut phase: u64 = 0;
    for (index, &tone) in tones[..audible].iter().enumerate() {
        for _ in tone_start(index)..tone_start(index + 1) {
            let sample = if tone == 0 {
                &silence
            } else {
                phase = (phase + u64::from(tone)) % rate;
                if phase * 2 < rate { &high } else { &low }
            };
            for _ in 0..channels {
                pcm.extend_from_slice(sample);
            }
        }
    }

    pcm
}
