use std::sync::Arc;

use crate::audio_engine::audio_spec::{AudioSpec, SampleFormat};
use crate::audio_engine::channels::{balance_gains, clamp_balance};
use crate::audio_engine::constants::BALANCE_LIMIT;
use crate::audio_engine::sound_slot::SoundSlot;
use crate::messages::SoundId;

/// One mixing channel of the fixed pool.
///
/// A channel is either idle or playing one slot from its cursor onwards. It never owns the
/// waveform; the slot is shared with the catalog that loaded it.
#[derive(Debug)]
pub struct SoundChannel {
    spec: AudioSpec,
    sound: Option<SoundId>,
    slot: Option<Arc<SoundSlot>>,
    cursor: usize,
    playing: bool,
    forced: bool,
    balance: i16,
}

impl SoundChannel {
    pub fn new(spec: AudioSpec) -> Self {
        Self {
            spec,
            sound: None,
            slot: None,
            cursor: 0,
            playing: false,
            forced: false,
            balance: 0,
        }
    }

    /// Starts playing `slot` from the beginning. An unloaded slot leaves the channel idle.
    pub fn setup_sound(&mut self, sound: SoundId, slot: Arc<SoundSlot>, force: bool) {
        if !slot.is_loaded() {
            self.stop_sound();
            return;
        }

        self.sound = Some(sound);
        self.slot = Some(slot);
        self.cursor = 0;
        self.playing = true;
        self.forced = force;
    }

    /// Copies up to `buffer.len()` bytes of the waveform into `buffer` and advances the cursor.
    ///
    /// Stereo balance is applied while copying. Returns the number of bytes written; the rest of
    /// `buffer` is left untouched. Reaching the end of the waveform makes the channel idle.
    pub fn read_waveform(&mut self, buffer: &mut [u8]) -> usize {
        if !self.playing {
            return 0;
        }
        let Some(slot) = self.slot.as_ref() else {
            self.stop_sound();
            return 0;
        };

        let pcm = slot.pcm();
        let sample_bytes = self.spec.format.bytes_per_sample();
        let remaining = pcm.len().saturating_sub(self.cursor);
        let mut count = remaining.min(buffer.len());
        count -= count % sample_bytes;

        buffer[..count].copy_from_slice(&pcm[self.cursor..self.cursor + count]);
        if self.spec.is_stereo() && self.balance != 0 {
            apply_balance(&mut buffer[..count], self.spec.format, self.balance);
        }

        self.cursor += count;
        if pcm.len() - self.cursor < sample_bytes {
            self.stop_sound();
        }

        count
    }

    /// Makes the channel idle immediately. Calling it on an idle channel does nothing.
    pub fn stop_sound(&mut self) {
        self.playing = false;
        self.forced = false;
        self.sound = None;
        self.slot = None;
        self.cursor = 0;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_forced_playing(&self) -> bool {
        self.playing && self.forced
    }

    pub fn is_playing_sound(&self, sound: SoundId) -> bool {
        self.playing && self.sound == Some(sound)
    }

    pub fn set_balance(&mut self, balance: i16) {
        self.balance = clamp_balance(i32::from(balance));
    }

    pub fn balance(&self) -> i16 {
        self.balance
    }

    pub fn current_sound(&self) -> Option<SoundId> {
        self.sound.filter(|_| self.playing)
    }

    /// Priority of the slot being played, `None` when idle.
    pub fn priority(&self) -> Option<u8> {
        self.slot
            .as_ref()
            .filter(|_| self.playing)
            .map(|slot| slot.priority())
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

fn apply_balance(frames: &mut [u8], format: SampleFormat, balance: i16) {
    let (left, right) = balance_gains(balance);
    let limit = i32::from(BALANCE_LIMIT);

    match format {
        SampleFormat::U8 => {
            for frame in frames.chunks_exact_mut(2) {
                for (sample, gain) in frame.iter_mut().zip([left, right]) {
                    let centered = (i32::from(*sample) - 0x80) * gain / limit;
                    *sample = (centered + 0x80) as u8;
                }
            }
        }
        SampleFormat::S16 => {
            for frame in frames.chunks_exact_mut(4) {
                for (sample, gain) in frame.chunks_exact_mut(2).zip([left, right]) {
                    let value = i32::from(i16::from_ne_bytes([sample[0], sample[1]])) * gain / limit;
                    sample.copy_from_slice(&(value as i16).to_ne_bytes());
                }
            }
        }
    }
}
