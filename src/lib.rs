//! Fixed-channel software mixer for a 2D game engine.
//!
//! Short sound effects and a background music stream are blended into one output buffer that
//! a real-time audio callback hands to the device. See [`AudioMixer`] for the lifecycle and
//! [`MixerHandle`] for the playback API used by game logic.

mod audio_engine;
mod messages;

pub use audio_engine::audio_spec::{AudioSpec, SampleFormat};
pub use audio_engine::catalog::SoundCatalog;
pub use audio_engine::constants;
pub use audio_engine::errors::{DeviceError, SoundLoadError};
pub use audio_engine::legacy_sounds::{LegacySound, decode_legacy_sound, render_pc_speaker};
pub use audio_engine::mix::{MixRoutine, routine_for};
pub use audio_engine::mixer::SubCallbackId;
pub use audio_engine::music::MusicStream;
pub use audio_engine::sound_channel::SoundChannel;
pub use audio_engine::sound_slot::{SoundSlot, SoundSource};
pub use audio_engine::{AudioMixer, MixerHandle};
pub use messages::{AudioMessage, PlayMode, SoundId};
