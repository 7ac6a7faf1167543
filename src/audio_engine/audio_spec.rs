//! Output format description shared by the loaders, the mixer and the device layer.

use crate::audio_engine::constants::{DEFAULT_CHANNELS, DEFAULT_RATE, buffer_samples_for_rate};

/// PCM sample encoding of the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Unsigned 8-bit, silence at 0x80.
    U8,

    /// Signed 16-bit, native endian.
    #[default]
    S16,
}

impl SampleFormat {
    /// Bytes taken by one sample of one channel.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
        }
    }

    /// Byte value that encodes silence.
    pub fn silence(self) -> u8 {
        match self {
            Self::U8 => 0x80,
            Self::S16 => 0,
        }
    }

    /// Encodes a normalized sample (-1.0..=1.0) and appends it to `out`.
    pub fn push_normalized(self, value: f32, out: &mut Vec<u8>) {
        let value = if value.is_finite() {
            value.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        match self {
            Self::U8 => out.push((value * 127.0).round() as i16 as u8 ^ 0x80),
            Self::S16 => {
                let sample = (value * 32767.0).round() as i16;
                out.extend_from_slice(&sample.to_ne_bytes());
            }
        }
    }

    /// Decodes PCM bytes in this format into normalized samples.
    pub fn decode_normalized(self, pcm: &[u8]) -> Vec<f32> {
        match self {
            Self::U8 => pcm
                .iter()
                .map(|&b| ((f32::from(b) - 128.0) / 127.0).clamp(-1.0, 1.0))
                .collect(),
            Self::S16 => pcm
                .chunks_exact(2)
                .map(|b| (f32::from(i16::from_ne_bytes([b[0], b[1]])) / 32767.0).clamp(-1.0, 1.0))
                .collect(),
        }
    }
}

/// Output stream description: rate, channel count, sample encoding and buffer size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    /// Sample rate in Hz.
    pub rate: u32,

    /// Number of interleaved output channels (1 or 2).
    pub channels: u16,

    /// Sample encoding.
    pub format: SampleFormat,

    /// Device buffer size in sample frames.
    pub samples: u16,
}

impl AudioSpec {
    pub fn new(rate: u32, channels: u16, format: SampleFormat) -> Self {
        Self {
            rate,
            channels,
            format,
            samples: buffer_samples_for_rate(rate),
        }
    }

    /// Bytes taken by one interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * usize::from(self.channels.max(1))
    }

    /// Bytes in one device buffer.
    pub fn buffer_bytes(&self) -> usize {
        self.frame_bytes() * usize::from(self.samples)
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self::new(DEFAULT_RATE, DEFAULT_CHANNELS, SampleFormat::S16)
    }
}
