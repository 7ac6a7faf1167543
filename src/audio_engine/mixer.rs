//! Real-time audio mixer implementation.
//!
//! This module provides the [`RtMixer`] struct which holds the channel pool, the attached
//! [`SoundCatalog`], the global volumes and the output format, and renders one buffer per
//! audio callback tick.
//!
//! The mixer lives behind a mutex shared by the game-logic threads and the audio thread. Every
//! operation here is short and bounded; [`RtMixer::render`] performs no I/O and only allocates
//! when a callback asks for a larger buffer than any before it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rtrb::Producer;

use crate::audio_engine::audio_spec::{AudioSpec, SampleFormat};
use crate::audio_engine::catalog::SoundCatalog;
use crate::audio_engine::channels::clamp_balance;
use crate::audio_engine::constants::{MAX_VOLUME, SCREEN_HALF_WIDTH, is_available_rate};
use crate::audio_engine::mix::{MixRoutine, routine_for};
use crate::audio_engine::music::MusicStream;
use crate::audio_engine::sound_channel::SoundChannel;
use crate::messages::{AudioMessage, PlayMode, SoundId};

/// Raw stream writer invoked at the start of every callback tick, before any mixing.
pub type SubCallback = Box<dyn FnMut(&mut [u8]) + Send>;

/// Handle returned when registering a [`SubCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubCallbackId(u64);

/// Outcome of [`RtMixer::set_output_format`].
#[derive(Debug)]
pub enum FormatChange {
    /// Unavailable rate or channel count. Only the hardware-variant preference was recorded.
    Rejected,

    /// The open device runs at another rate or channel count and has to be reopened first.
    RequiresReopen,

    /// The requested format is already active.
    Unchanged,

    /// The format was switched and every sound stopped. The detached catalog still holds
    /// slots laid out for `previous`.
    Changed {
        previous: AudioSpec,
        catalog: Option<SoundCatalog>,
    },
}

impl FormatChange {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Unchanged | Self::Changed { .. })
    }
}

pub struct RtMixer {
    /// Output format the channels and slots are laid out for.
    spec: AudioSpec,

    /// Mixing routine matching `spec.format`.
    mix_routine: &'static dyn MixRoutine,

    music_volume: u8,
    effect_volume: u8,

    /// Redirect sounds to their hardware-accelerated variant when one is loaded.
    use_hardware_variant: bool,

    /// Output is paused: ticks mix nothing and leave every cursor alone.
    output_paused: bool,

    /// Raised by `PlayMode::PauseAll`, cleared by the first tick without any playing channel.
    gameplay_paused: Arc<AtomicBool>,

    catalog: Option<SoundCatalog>,

    /// Rate and channel count of the open device stream, if any.
    device_layout: Option<(u32, u16)>,

    /// Fixed channel pool, empty until allocated.
    channels: Vec<SoundChannel>,

    /// Scratch buffer each source is read into before it is mixed.
    scratch: Vec<u8>,

    music: Option<Box<dyn MusicStream>>,

    sub_callbacks: Vec<(SubCallbackId, SubCallback)>,
    next_sub_callback: u64,

    /// Messages to the game-logic threads. Dropped when the queue is full.
    messages: Producer<AudioMessage>,
}

impl RtMixer {
    /// Creates a mixer without channels; nothing plays until [`RtMixer::allocate_channels`].
    pub fn new(
        spec: AudioSpec,
        gameplay_paused: Arc<AtomicBool>,
        messages: Producer<AudioMessage>,
    ) -> Self {
        Self {
            spec,
            mix_routine: routine_for(spec.format),
            music_volume: MAX_VOLUME,
            effect_volume: MAX_VOLUME,
            use_hardware_variant: false,
            output_paused: false,
            gameplay_paused,
            catalog: None,
            device_layout: None,
            channels: Vec::new(),
            scratch: Vec::new(),
            music: None,
            sub_callbacks: Vec::new(),
            next_sub_callback: 0,
            messages,
        }
    }

    /// Allocates a pool of `count` idle channels for the current output format.
    pub fn allocate_channels(&mut self, count: usize) {
        let spec = self.spec;
        self.channels = (0..count).map(|_| SoundChannel::new(spec)).collect();
        self.scratch = vec![0; spec.buffer_bytes()];
    }

    /// Drops the channel pool and scratch buffer. Playback requests become no-ops.
    pub fn release_channels(&mut self) {
        self.channels = Vec::new();
        self.scratch = Vec::new();
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// True for one of the available rates with one or two channels.
    pub fn supports_layout(rate: u32, channels: u16) -> bool {
        is_available_rate(rate) && (1..=2).contains(&channels)
    }

    /// Records the layout of the device stream rendering this mixer; `None` once it is closed.
    pub fn set_device_layout(&mut self, layout: Option<(u32, u16)>) {
        self.device_layout = layout;
    }

    /// Changes the output format.
    ///
    /// The hardware-variant preference is always recorded. A new format is accepted for one of
    /// the available rates and one or two channels, and while a device is open only if it keeps
    /// the device's rate and channel count. On a change the mixing routine is switched, the
    /// channel pool rebuilt and the catalog detached, so no slot of the old layout is ever
    /// mixed into the new one.
    pub fn set_output_format(
        &mut self,
        rate: u32,
        channels: u16,
        format: SampleFormat,
        use_hardware_variant: bool,
    ) -> FormatChange {
        self.use_hardware_variant = use_hardware_variant;

        if !Self::supports_layout(rate, channels) {
            return FormatChange::Rejected;
        }

        let spec = AudioSpec::new(rate, channels, format);
        if spec == self.spec {
            return FormatChange::Unchanged;
        }

        if self
            .device_layout
            .is_some_and(|layout| layout != (rate, channels))
        {
            return FormatChange::RequiresReopen;
        }

        let previous = std::mem::replace(&mut self.spec, spec);
        self.mix_routine = routine_for(format);
        let catalog = self.detach_catalog();
        if !self.channels.is_empty() {
            self.allocate_channels(self.channels.len());
        }

        FormatChange::Changed { previous, catalog }
    }

    pub fn use_hardware_variant(&self) -> bool {
        self.use_hardware_variant
    }

    pub fn set_music_volume(&mut self, volume: u8) {
        self.music_volume = volume.min(MAX_VOLUME);
    }

    pub fn set_effect_volume(&mut self, volume: u8) {
        self.effect_volume = volume.min(MAX_VOLUME);
    }

    pub fn music_volume(&self) -> u8 {
        self.music_volume
    }

    pub fn effect_volume(&self) -> u8 {
        self.effect_volume
    }

    /// Attaches `catalog`, returning the one it replaces.
    ///
    /// Channels playing slots of the previous catalog are stopped.
    pub fn attach_catalog(&mut self, catalog: SoundCatalog) -> Option<SoundCatalog> {
        self.stop_all_sounds();
        self.catalog.replace(catalog)
    }

    /// Detaches the current catalog and stops every channel.
    pub fn detach_catalog(&mut self) -> Option<SoundCatalog> {
        self.stop_all_sounds();
        self.catalog.take()
    }

    pub fn has_catalog(&self) -> bool {
        self.catalog.is_some()
    }

    /// Replaces the music producer, returning the previous one.
    pub fn set_music_stream(
        &mut self,
        music: Option<Box<dyn MusicStream>>,
    ) -> Option<Box<dyn MusicStream>> {
        std::mem::replace(&mut self.music, music)
    }

    pub fn register_sub_callback(&mut self, callback: SubCallback) -> SubCallbackId {
        let id = SubCallbackId(self.next_sub_callback);
        self.next_sub_callback += 1;
        self.sub_callbacks.push((id, callback));
        id
    }

    pub fn remove_sub_callback(&mut self, id: SubCallbackId) -> Option<SubCallback> {
        let index = self.sub_callbacks.iter().position(|(cb_id, _)| *cb_id == id)?;
        Some(self.sub_callbacks.remove(index).1)
    }

    pub fn set_output_paused(&mut self, paused: bool) {
        self.output_paused = paused;
    }

    pub fn is_output_paused(&self) -> bool {
        self.output_paused
    }

    /// Plays `sound` centered.
    pub fn play_sound(&mut self, sound: SoundId, mode: PlayMode) {
        self.play_stereo_sound(sound, mode, 0);
    }

    /// Plays `sound` panned towards the screen x-coordinate `x`.
    ///
    /// On mono output the coordinate is ignored.
    pub fn play_sound_at(&mut self, sound: SoundId, mode: PlayMode, x: i32) {
        if self.spec.is_stereo() {
            let balance = clamp_balance(x.saturating_sub(SCREEN_HALF_WIDTH));
            self.play_stereo_sound(sound, mode, balance);
        } else {
            self.play_sound(sound, mode);
        }
    }

    /// Plays `sound` with an explicit stereo balance.
    ///
    /// Unknown sounds, a missing catalog or a full pool of more important sounds make this a
    /// no-op.
    pub fn play_stereo_sound(&mut self, sound: SoundId, mode: PlayMode, balance: i16) {
        if self.channels.is_empty() {
            return;
        }
        let Some(catalog) = self.catalog.as_ref() else {
            return;
        };
        let Some(slot) = catalog.resolve(sound, self.use_hardware_variant) else {
            return;
        };

        if mode == PlayMode::NoRestart && self.is_playing(sound) {
            return;
        }

        if mode == PlayMode::PauseAll {
            self.gameplay_paused.store(true, Ordering::Release);
        }

        if mode == PlayMode::Force {
            self.stop_all_sounds();
        }

        let Some(index) = self.select_channel(slot.priority()) else {
            // No idle or preemptable channel: drop deterministically.
            return;
        };

        let is_stereo = self.spec.is_stereo();
        let channel = &mut self.channels[index];
        if is_stereo {
            channel.set_balance(balance);
        }
        channel.setup_sound(sound, slot, mode == PlayMode::Force);
    }

    /// Picks the channel for a sound of `priority`.
    ///
    /// The first idle channel wins. Without one, the lowest-priority playing channel is taken
    /// if its priority does not exceed `priority` (lowest index among equals).
    fn select_channel(&self, priority: u8) -> Option<usize> {
        if let Some(idle) = self.channels.iter().position(|c| !c.is_playing()) {
            return Some(idle);
        }

        self.channels
            .iter()
            .enumerate()
            .filter_map(|(index, channel)| channel.priority().map(|p| (index, p)))
            .filter(|&(_, current)| current <= priority)
            .min_by_key(|&(index, current)| (current, index))
            .map(|(index, _)| index)
    }

    /// Stops every channel playing `sound`.
    pub fn stop_sound(&mut self, sound: SoundId) {
        for channel in &mut self.channels {
            if channel.is_playing_sound(sound) {
                channel.stop_sound();
            }
        }
    }

    pub fn stop_all_sounds(&mut self) {
        for channel in &mut self.channels {
            channel.stop_sound();
        }
    }

    pub fn is_playing(&self, sound: SoundId) -> bool {
        self.channels.iter().any(|c| c.is_playing_sound(sound))
    }

    pub fn is_forced_playing(&self) -> bool {
        self.channels.iter().any(SoundChannel::is_forced_playing)
    }

    pub fn playing_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.is_playing()).count()
    }

    #[cfg(test)]
    pub fn channels(&self) -> &[SoundChannel] {
        &self.channels
    }

    /// Renders one callback tick into `output`.
    ///
    /// 1. `output` is filled with the format's silence.
    /// 2. Sub-callbacks write into it, paused or not.
    /// 3. While paused, or without a catalog, the tick ends here.
    /// 4. Music is mixed at the music volume.
    /// 5. Every playing channel is mixed at the effect volume.
    /// 6. If no channel was playing, the gameplay-pause flag is cleared.
    pub fn render(&mut self, output: &mut [u8]) {
        output.fill(self.spec.format.silence());

        for (_, callback) in &mut self.sub_callbacks {
            callback(output);
        }

        if self.output_paused || self.catalog.is_none() {
            return;
        }

        if self.scratch.len() < output.len() {
            self.scratch.resize(output.len(), 0);
        }
        let scratch = &mut self.scratch[..output.len()];
        let mix = self.mix_routine;

        if let Some(music) = self.music.as_mut() {
            if music.is_playing() {
                music.read_waveform(scratch);
                mix.mix(output, scratch, self.music_volume);
            }
        }

        let mut any_playing = false;
        for channel in &mut self.channels {
            if !channel.is_playing() {
                continue;
            }
            any_playing = true;

            let sound = channel.current_sound();
            let written = channel.read_waveform(scratch);
            mix.mix(&mut output[..written], &scratch[..written], self.effect_volume);

            if !channel.is_playing() {
                if let Some(sound) = sound {
                    let _ = self.messages.push(AudioMessage::SoundFinished { sound });
                }
            }
        }

        if !any_playing && self.gameplay_paused.swap(false, Ordering::AcqRel) {
            let _ = self.messages.push(AudioMessage::GameplayResumed);
        }
    }
}
