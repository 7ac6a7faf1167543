//! Audio Engine Module
//!
//! This module provides the real-time sound mixer of the game engine.
//! It is organized into sub-modules, each with a specific responsibility:
//!
//! - [`audio_stream`]: CPAL audio stream management and real-time callback
//! - [`audio_spec`]: Output format descriptor
//! - [`catalog`]: Identifier to slot mapping of one game segment
//! - [`constants`]: Configuration constants and limits
//! - [`errors`]: Audio-specific error types
//! - [`legacy_sounds`]: Legacy PC-speaker container decoding and rendering
//! - [`mix`]: Saturating mix routines per sample format
//! - [`mixer`]: Channel pool, preemption policy and per-tick rendering
//! - [`sample_loader`]: High-quality audio file loading and decoding
//! - [`sound_channel`]: One playback channel of the pool
//! - [`sound_slot`]: Loaded sound effects
//!
//! The main [`AudioMixer`] owns the output device. Game logic talks to the mixer through cheap
//! [`MixerHandle`] clones that may be passed to any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rtrb::{Consumer, RingBuffer};

use crate::audio_engine::audio_spec::{AudioSpec, SampleFormat};
use crate::audio_engine::audio_stream::{
    AudioStreamHandle, create_audio_stream, pause_stream, setup_logger, start_stream,
};
use crate::audio_engine::catalog::SoundCatalog;
use crate::audio_engine::constants::{AVAILABLE_RATES, MESSAGE_QUEUE_CAPACITY, NUM_CHANNELS};
use crate::audio_engine::errors::SoundLoadError;
use crate::audio_engine::mixer::{FormatChange, RtMixer, SubCallbackId};
use crate::audio_engine::music::MusicStream;
use crate::audio_engine::sound_slot::SoundSource;
use crate::messages::{AudioMessage, PlayMode, SoundId};

pub mod audio_spec;
mod audio_stream;
pub mod catalog;
mod channels;
pub mod constants;
pub mod errors;
pub mod legacy_sounds;
pub mod mix;
pub mod mixer;
pub mod music;
mod sample_loader;
pub mod sound_channel;
pub mod sound_slot;

/// Thread-safe handle to the shared mixer state.
///
/// Every call takes the mixer lock for a short, bounded time. A poisoned lock is logged and the
/// call becomes a no-op, like every other resolution failure.
#[derive(Clone)]
pub struct MixerHandle {
    mixer: Arc<Mutex<RtMixer>>,
    messages: Arc<Mutex<Consumer<AudioMessage>>>,
    gameplay_paused: Arc<AtomicBool>,
}

impl MixerHandle {
    fn new(spec: AudioSpec) -> Self {
        let gameplay_paused = Arc::new(AtomicBool::new(false));
        let (producer, consumer) = RingBuffer::new(MESSAGE_QUEUE_CAPACITY);
        let mixer = RtMixer::new(spec, Arc::clone(&gameplay_paused), producer);

        Self {
            mixer: Arc::new(Mutex::new(mixer)),
            messages: Arc::new(Mutex::new(consumer)),
            gameplay_paused,
        }
    }

    fn with_mixer<R>(&self, f: impl FnOnce(&mut RtMixer) -> R) -> Option<R> {
        match self.mixer.lock() {
            Ok(mut mixer) => Some(f(&mut mixer)),
            Err(_) => {
                log::error!("Failed to acquire mixer lock");
                None
            }
        }
    }

    pub fn play_sound(&self, sound: SoundId, mode: PlayMode) {
        self.with_mixer(|mixer| mixer.play_sound(sound, mode));
    }

    /// Plays `sound` panned towards the screen x-coordinate `x`.
    pub fn play_sound_at(&self, sound: SoundId, mode: PlayMode, x: i32) {
        self.with_mixer(|mixer| mixer.play_sound_at(sound, mode, x));
    }

    /// Plays `sound` with an explicit balance in -255..=255 (clamped).
    pub fn play_stereo_sound(&self, sound: SoundId, mode: PlayMode, balance: i16) {
        self.with_mixer(|mixer| mixer.play_stereo_sound(sound, mode, balance));
    }

    pub fn stop_sound(&self, sound: SoundId) {
        self.with_mixer(|mixer| mixer.stop_sound(sound));
    }

    pub fn stop_all_sounds(&self) {
        self.with_mixer(RtMixer::stop_all_sounds);
    }

    pub fn is_playing(&self, sound: SoundId) -> bool {
        self.with_mixer(|mixer| mixer.is_playing(sound))
            .unwrap_or(false)
    }

    pub fn is_forced_playing(&self) -> bool {
        self.with_mixer(|mixer| mixer.is_forced_playing())
            .unwrap_or(false)
    }

    /// Number of channels currently playing a sound.
    pub fn playing_channels(&self) -> usize {
        self.with_mixer(|mixer| mixer.playing_channels())
            .unwrap_or(0)
    }

    pub fn has_catalog(&self) -> bool {
        self.with_mixer(|mixer| mixer.has_catalog())
            .unwrap_or(false)
    }

    pub fn uses_hardware_variant(&self) -> bool {
        self.with_mixer(|mixer| mixer.use_hardware_variant())
            .unwrap_or(false)
    }

    /// True while a `PlayMode::PauseAll` sound keeps gameplay frozen.
    pub fn is_gameplay_paused(&self) -> bool {
        self.gameplay_paused.load(Ordering::Acquire)
    }

    pub fn set_music_volume(&self, volume: u8) {
        self.with_mixer(|mixer| mixer.set_music_volume(volume));
    }

    pub fn set_effect_volume(&self, volume: u8) {
        self.with_mixer(|mixer| mixer.set_effect_volume(volume));
    }

    pub fn music_volume(&self) -> u8 {
        self.with_mixer(|mixer| mixer.music_volume()).unwrap_or(0)
    }

    pub fn effect_volume(&self) -> u8 {
        self.with_mixer(|mixer| mixer.effect_volume()).unwrap_or(0)
    }

    /// Requests a new output format. See [`RtMixer::set_output_format`].
    ///
    /// The attached catalog is converted to the new format outside the mixer lock and attached
    /// again, unless another catalog or format was set in the meantime. While a device is open
    /// only the sample format may change here; see [`AudioMixer::set_output_format`].
    pub fn set_output_format(
        &self,
        rate: u32,
        channels: u16,
        format: SampleFormat,
        use_hardware_variant: bool,
    ) -> bool {
        let change = self.with_mixer(|mixer| {
            mixer.set_output_format(rate, channels, format, use_hardware_variant)
        });

        match change {
            None => false,
            Some(FormatChange::Rejected) => {
                log::warn!("Output format {rate} Hz, {channels} ch, {format:?} not available");
                false
            }
            Some(FormatChange::RequiresReopen) => {
                log::warn!(
                    "Output format {rate} Hz, {channels} ch needs the audio device to be reopened"
                );
                false
            }
            Some(FormatChange::Unchanged) => true,
            Some(FormatChange::Changed { previous, catalog }) => {
                if let Some(catalog) = catalog {
                    let target = AudioSpec::new(rate, channels, format);
                    let converted = catalog.convert(&previous, &target);
                    drop(catalog);
                    let leftover = self.with_mixer(|mixer| {
                        if mixer.has_catalog() || mixer.spec() != target {
                            Some(converted)
                        } else {
                            mixer.attach_catalog(converted)
                        }
                    });
                    drop(leftover);
                }
                log::info!("Output format set to {rate} Hz, {channels} ch, {format:?}");
                true
            }
        }
    }

    pub fn output_spec(&self) -> AudioSpec {
        self.with_mixer(|mixer| mixer.spec()).unwrap_or_default()
    }

    /// Sample rates accepted by [`MixerHandle::set_output_format`], ascending.
    pub fn available_sample_rates(&self) -> &'static [u32] {
        &AVAILABLE_RATES
    }

    /// Loads the sounds of one game segment for the current output format and attaches them.
    pub fn load_catalog(
        &self,
        source: &SoundSource,
        sounds: &[(SoundId, &str)],
    ) -> Result<(), SoundLoadError> {
        let catalog = SoundCatalog::load(source, sounds, &self.output_spec())?;
        self.attach_catalog(catalog);
        Ok(())
    }

    /// Makes `catalog` the active catalog. The previous one is dropped outside the lock.
    pub fn attach_catalog(&self, catalog: SoundCatalog) {
        let previous = self.with_mixer(|mixer| mixer.attach_catalog(catalog));
        drop(previous);
    }

    /// Stops every channel and detaches the active catalog.
    pub fn detach_catalog(&self) -> Option<SoundCatalog> {
        self.with_mixer(RtMixer::detach_catalog).flatten()
    }

    /// Registers a raw stream writer run at the start of every tick, before mixing.
    pub fn register_sub_callback<F>(&self, callback: F) -> Option<SubCallbackId>
    where
        F: FnMut(&mut [u8]) + Send + 'static,
    {
        self.with_mixer(|mixer| mixer.register_sub_callback(Box::new(callback)))
    }

    pub fn remove_sub_callback(&self, id: SubCallbackId) -> bool {
        let removed = self.with_mixer(|mixer| mixer.remove_sub_callback(id)).flatten();
        removed.is_some()
    }

    pub fn set_music_stream(&self, music: Box<dyn MusicStream>) {
        let previous = self.with_mixer(|mixer| mixer.set_music_stream(Some(music)));
        drop(previous);
    }

    pub fn clear_music_stream(&self) {
        let previous = self.with_mixer(|mixer| mixer.set_music_stream(None));
        drop(previous);
    }

    /// Receive a message from the audio thread.
    pub fn receive_message(&self) -> Option<AudioMessage> {
        let mut consumer = match self.messages.lock() {
            Ok(consumer) => consumer,
            Err(_) => {
                log::error!("Failed to acquire consumer lock");
                return None;
            }
        };
        consumer.pop().ok()
    }

    /// Renders one tick into `output`, as the device callback does.
    pub fn render(&self, output: &mut [u8]) {
        match self.mixer.lock() {
            Ok(mut mixer) => mixer.render(output),
            Err(_) => output.fill(0),
        }
    }

    fn set_output_paused(&self, paused: bool) {
        self.with_mixer(|mixer| mixer.set_output_paused(paused));
    }

    pub fn is_output_paused(&self) -> bool {
        self.with_mixer(|mixer| mixer.is_output_paused())
            .unwrap_or(false)
    }
}

/// Process-wide mixer with an explicit lifecycle.
///
/// `init()` allocates the channel pool and opens the output device; `shutdown()` undoes both.
/// If the device cannot be opened the mixer stays in silent mode: every call succeeds and
/// nothing plays.
pub struct AudioMixer {
    handle: MixerHandle,
    stream_handle: Option<AudioStreamHandle>,
    initialized: bool,
    device_failure_logged: bool,
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMixer {
    /// Creates an uninitialized mixer with the default output format.
    pub fn new() -> Self {
        setup_logger();

        Self {
            handle: MixerHandle::new(AudioSpec::default()),
            stream_handle: None,
            initialized: false,
            device_failure_logged: false,
        }
    }

    pub fn handle(&self) -> MixerHandle {
        self.handle.clone()
    }

    /// Allocates the channel pool and starts the output device.
    ///
    /// Returns false if the device failed; the mixer then runs in silent mode.
    pub fn init(&mut self) -> bool {
        if self.stream_handle.is_some() {
            return true;
        }

        self.handle
            .with_mixer(|mixer| mixer.allocate_channels(NUM_CHANNELS));
        let started = self.open_device();
        self.initialized = true;
        started
    }

    /// Changes the output format, reopening the device if its rate or channel count changes.
    ///
    /// Sounds already loaded are converted to the new format. Returns false if the format is
    /// not available; the current one then stays in effect.
    pub fn set_output_format(
        &mut self,
        rate: u32,
        channels: u16,
        format: SampleFormat,
        use_hardware_variant: bool,
    ) -> bool {
        let current = self.handle.output_spec();
        let relayout = (rate, channels) != (current.rate, current.channels);
        if !relayout || self.stream_handle.is_none() || !RtMixer::supports_layout(rate, channels) {
            return self
                .handle
                .set_output_format(rate, channels, format, use_hardware_variant);
        }

        self.close_device();
        let accepted = self
            .handle
            .set_output_format(rate, channels, format, use_hardware_variant);
        self.open_device();
        accepted
    }

    /// Opens and starts the device for the current output format.
    ///
    /// On failure the channel pool is released so every request becomes a no-op.
    fn open_device(&mut self) -> bool {
        let spec = self.handle.output_spec();
        let result = create_audio_stream(Arc::clone(&self.handle.mixer), spec).and_then(|handle| {
            start_stream(&handle.stream)?;
            if self.handle.is_output_paused() {
                pause_stream(&handle.stream)?;
            }
            Ok(handle)
        });

        match result {
            Ok(handle) => {
                log::info!(
                    "Sound mixer started with {NUM_CHANNELS} channels ({} Hz, {} ch)",
                    handle.output_sample_rate,
                    handle.output_channels
                );
                let layout = (handle.output_sample_rate, handle.output_channels);
                self.handle
                    .with_mixer(|mixer| mixer.set_device_layout(Some(layout)));
                self.stream_handle = Some(handle);
                true
            }
            Err(err) => {
                if !self.device_failure_logged {
                    log::warn!("Audio device unavailable, continuing without sound: {err}");
                    self.device_failure_logged = true;
                }
                self.handle.with_mixer(RtMixer::release_channels);
                false
            }
        }
    }

    fn close_device(&mut self) {
        if self.stream_handle.take().is_some() {
            self.handle
                .with_mixer(|mixer| mixer.set_device_layout(None));
            log::info!("Audio device closed");
        }
    }

    /// Allocates the channel pool without a device; the host drives [`MixerHandle::render`].
    pub fn init_offline(&mut self) {
        self.handle
            .with_mixer(|mixer| mixer.allocate_channels(NUM_CHANNELS));
        self.initialized = true;
    }

    /// Stops every sound, closes the device and releases the channel pool.
    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }

        self.handle.with_mixer(|mixer| {
            mixer.stop_all_sounds();
            mixer.release_channels();
        });

        self.close_device();
        self.initialized = false;
    }

    /// Pauses output: the device stops pulling and ticks mix no sound or music.
    pub fn pause_audio(&self) {
        self.handle.set_output_paused(true);
        if let Some(handle) = &self.stream_handle {
            if let Err(err) = pause_stream(&handle.stream) {
                log::warn!("{err}");
            }
        }
    }

    pub fn resume_audio(&self) {
        self.handle.set_output_paused(false);
        if let Some(handle) = &self.stream_handle {
            if let Err(err) = start_stream(&handle.stream) {
                log::warn!("{err}");
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// True while an output device is open.
    pub fn has_device(&self) -> bool {
        self.stream_handle.is_some()
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::audio_engine::legacy_sounds::render_pc_speaker;
    use crate::audio_engine::legacy_sounds::tests::build_container;
    use crate::audio_engine::sound_slot::SoundSlot;

    fn offline_mixer() -> AudioMixer {
        let mut mixer = AudioMixer::new();
        mixer.init_offline();
        mixer
    }

    fn catalog_with(sounds: &[(u16, u8, usize)]) -> SoundCatalog {
        let mut catalog = SoundCatalog::default();
        for &(id, priority, len) in sounds {
            catalog.insert(SoundId(id), SoundSlot::from_pcm(vec![0x10; len], priority));
        }
        catalog
    }

    #[test]
    fn test_uninitialized_mixer_is_silent() {
        let mixer = AudioMixer::new();
        let handle = mixer.handle();
        handle.attach_catalog(catalog_with(&[(1, 1, 64)]));

        handle.play_sound(SoundId(1), PlayMode::Normal);

        assert!(!mixer.is_initialized());
        assert!(!handle.is_playing(SoundId(1)));
    }

    #[test]
    fn test_offline_playback_and_events() {
        let mixer = offline_mixer();
        let handle = mixer.handle();
        handle.attach_catalog(catalog_with(&[(1, 1, 8)]));

        handle.play_sound(SoundId(1), PlayMode::PauseAll);
        assert!(handle.is_playing(SoundId(1)));
        assert!(handle.is_gameplay_paused());

        let mut output = vec![0u8; 32];
        handle.render(&mut output);
        handle.render(&mut output);

        assert!(!handle.is_playing(SoundId(1)));
        assert!(!handle.is_gameplay_paused());
        assert_eq!(
            handle.receive_message(),
            Some(AudioMessage::SoundFinished { sound: SoundId(1) })
        );
        assert_eq!(handle.receive_message(), Some(AudioMessage::GameplayResumed));
        assert_eq!(handle.receive_message(), None);
    }

    #[test]
    fn test_pause_and_resume_audio() {
        let mixer = offline_mixer();
        let handle = mixer.handle();
        handle.attach_catalog(catalog_with(&[(1, 1, 64)]));
        handle.play_sound(SoundId(1), PlayMode::Normal);

        mixer.pause_audio();
        assert!(handle.is_output_paused());
        let mut output = vec![0xAAu8; 16];
        handle.render(&mut output);
        assert!(output.iter().all(|&b| b == 0));

        mixer.resume_audio();
        handle.render(&mut output);
        assert!(output.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_shutdown_releases_channels() {
        let mut mixer = offline_mixer();
        let handle = mixer.handle();
        handle.attach_catalog(catalog_with(&[(1, 1, 64)]));
        handle.play_sound(SoundId(1), PlayMode::Force);
        assert!(handle.is_forced_playing());

        mixer.shutdown();

        assert!(!mixer.is_initialized());
        assert!(!handle.is_forced_playing());
        handle.play_sound(SoundId(1), PlayMode::Normal);
        assert!(!handle.is_playing(SoundId(1)));
    }

    #[test]
    fn test_set_output_format_and_rates() {
        let mixer = offline_mixer();
        let handle = mixer.handle();

        assert_eq!(
            handle.available_sample_rates(),
            &[11_025, 22_050, 44_100, 48_000, 49_716]
        );
        assert!(!handle.set_output_format(96_000, 2, SampleFormat::S16, false));
        assert_eq!(handle.output_spec(), AudioSpec::default());

        assert!(!handle.uses_hardware_variant());
        assert!(handle.set_output_format(22_050, 1, SampleFormat::U8, true));
        assert!(handle.uses_hardware_variant());
        assert_eq!(handle.output_spec().samples, 512);
    }

    #[test]
    fn test_format_change_converts_attached_catalog() {
        let mixer = offline_mixer();
        let handle = mixer.handle();
        let mut catalog = SoundCatalog::default();
        catalog.insert(SoundId(1), SoundSlot::from_pcm(vec![0; 128], 1));
        handle.attach_catalog(catalog);

        assert!(handle.set_output_format(44_100, 1, SampleFormat::U8, false));
        assert!(handle.has_catalog());

        handle.play_sound(SoundId(1), PlayMode::Normal);
        let mut output = vec![0u8; 16];
        handle.render(&mut output);

        // S16 silence re-encoded as U8 silence, one byte per frame.
        assert!(output.iter().all(|&b| b == 0x80));
        assert!(handle.is_playing(SoundId(1)));
    }

    #[test]
    fn test_format_change_rerenders_legacy_sounds() {
        let tmp = tempfile::tempdir().unwrap();
        let container = build_container(&[("BEEP", 3, &[0x0400, 0x0400])]);
        std::fs::write(tmp.path().join("SOUNDS.CK1"), container).unwrap();

        let mixer = offline_mixer();
        let handle = mixer.handle();
        handle
            .load_catalog(
                &SoundSource::new(tmp.path(), "SOUNDS.CK1"),
                &[(SoundId(4), "BEEP")],
            )
            .unwrap();

        let spec = AudioSpec::new(22_050, 1, SampleFormat::U8);
        assert!(handle.set_output_format(spec.rate, spec.channels, spec.format, false));

        let catalog = handle.detach_catalog().unwrap();
        let slot = catalog.resolve(SoundId(4), false).unwrap();
        assert_eq!(slot.priority(), 3);
        assert_eq!(slot.pcm(), render_pc_speaker(slot.tones(), &spec).as_slice());
    }

    #[test]
    fn test_format_change_without_device() {
        let mut mixer = offline_mixer();

        assert!(mixer.set_output_format(11_025, 2, SampleFormat::U8, false));
        assert!(!mixer.set_output_format(1_000, 2, SampleFormat::U8, false));

        assert!(!mixer.has_device());
        assert_eq!(
            mixer.handle().output_spec(),
            AudioSpec::new(11_025, 2, SampleFormat::U8)
        );
    }

    #[test]
    fn test_volume_defaults_and_caps() {
        let mixer = offline_mixer();
        let handle = mixer.handle();

        assert_eq!(handle.music_volume(), 128);
        handle.set_effect_volume(250);
        assert_eq!(handle.effect_volume(), 128);
        handle.set_music_volume(3);
        assert_eq!(handle.music_volume(), 3);
    }

    #[test]
    fn test_sub_callback_registration() {
        let mixer = offline_mixer();
        let handle = mixer.handle();
        let id = handle
            .register_sub_callback(|stream: &mut [u8]| stream.fill(3))
            .unwrap();

        let mut output = vec![0u8; 8];
        handle.render(&mut output);
        assert!(output.iter().all(|&b| b == 3));

        assert!(handle.remove_sub_callback(id));
        assert!(!handle.remove_sub_callback(id));
    }

    #[test]
    fn test_load_catalog_from_container() {
        let tmp = tempfile::tempdir().unwrap();
        let container = build_container(&[("BEEP", 3, &[0x0400, 0x0400])]);
        std::fs::write(tmp.path().join("SOUNDS.CK1"), container).unwrap();

        let mixer = offline_mixer();
        let handle = mixer.handle();
        handle
            .load_catalog(
                &SoundSource::new(tmp.path(), "SOUNDS.CK1"),
                &[(SoundId(4), "BEEP")],
            )
            .unwrap();

        handle.play_sound(SoundId(4), PlayMode::Normal);
        assert!(handle.is_playing(SoundId(4)));

        let catalog = handle.detach_catalog().unwrap();
        assert!(!handle.has_catalog());
        assert_eq!(catalog.resolve(SoundId(4), false).unwrap().priority(), 3);
        assert!(!handle.is_playing(SoundId(4)));
    }

    #[test]
    fn test_device_init_never_panics() {
        let mut mixer = AudioMixer::new();

        let started = mixer.init();

        assert!(mixer.is_initialized());
        assert_eq!(started, mixer.has_device());
        mixer.handle().play_sound(SoundId(1), PlayMode::Normal);
        mixer.shutdown();
    }

    #[test]
    fn test_catalog_swap_while_rendering() {
        let mixer = offline_mixer();
        let handle = mixer.handle();
        let stop = Arc::new(AtomicBool::new(false));

        let render_thread = {
            let handle = handle.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut output = vec![0u8; 4096];
                let mut ticks = 0u64;
                loop {
                    handle.render(&mut output);
                    while handle.receive_message().is_some() {}
                    ticks += 1;
                    if stop.load(Ordering::Acquire) {
                        return ticks;
                    }
                }
            })
        };

        for iteration in 0..10_000u16 {
            handle.attach_catalog(catalog_with(&[(1, 1, 256), (2, 5, 4096)]));
            handle.play_sound(SoundId(iteration % 3), PlayMode::Normal);
            handle.play_sound(SoundId(2), PlayMode::NoRestart);
            if iteration % 7 == 0 {
                handle.play_sound(SoundId(1), PlayMode::Force);
            }
            let catalog = handle.detach_catalog();
            assert!(catalog.is_some());
            assert_eq!(handle.playing_channels(), 0);
            assert!(!handle.is_playing(SoundId(1)));
        }

        stop.store(true, Ordering::Release);
        let ticks = render_thread.join().unwrap();
        assert!(ticks > 0);
    }
}
