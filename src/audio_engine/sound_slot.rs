//! Loaded sound effects.
//!
//! A [`SoundSlot`] holds one decoded sound as PCM bytes in the output format, ready to be
//! copied into the mix, together with its playback priority. Slots are immutable once loaded
//! and are shared read-only between the catalog and the channels playing them.

use std::path::{Path, PathBuf};

use crate::audio_engine::audio_spec::AudioSpec;
use crate::audio_engine::errors::SoundLoadError;
use crate::audio_engine::legacy_sounds::{LegacySound, decode_legacy_sound, render_pc_speaker};
use crate::audio_engine::sample_loader::{convert_pcm, load_high_quality};

/// Where the sounds of one game segment are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSource {
    /// Directory searched for high-quality replacement files.
    pub game_dir: PathBuf,

    /// File name of the legacy container inside `game_dir`.
    pub container: String,
}

impl SoundSource {
    pub fn new(game_dir: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            game_dir: game_dir.into(),
            container: container.into(),
        }
    }

    pub fn container_path(&self) -> PathBuf {
        self.game_dir.join(&self.container)
    }
}

/// One loaded sound effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoundSlot {
    pcm: Vec<u8>,
    priority: u8,
    high_quality: bool,
    tones: Vec<u32>,
}

impl SoundSlot {
    /// A slot without audio. Playing it does nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a slot from PCM bytes that already match the output format.
    pub fn from_pcm(pcm: Vec<u8>, priority: u8) -> Self {
        Self {
            pcm,
            priority,
            high_quality: false,
            tones: Vec::new(),
        }
    }

    /// Creates a slot by rendering a legacy PC-speaker sound for `spec`.
    pub fn from_legacy(sound: LegacySound, spec: &AudioSpec) -> Self {
        Self {
            pcm: render_pc_speaker(&sound.tones, spec),
            priority: sound.priority,
            high_quality: false,
            tones: sound.tones,
        }
    }

    /// Loads the sound `name` for `spec`.
    ///
    /// A high-quality replacement in the game directory wins; otherwise the legacy container is
    /// opened and searched.
    ///
    /// # Errors
    ///
    /// - `SoundLoadError::Io` if the container cannot be opened
    /// - `SoundLoadError::NotFound` if no header carries `name`
    pub fn load(source: &SoundSource, name: &str, spec: &AudioSpec) -> Result<Self, SoundLoadError> {
        if let Some(slot) = Self::load_high_quality(&source.game_dir, name, spec) {
            return Ok(slot);
        }

        let path = source.container_path();
        let data = std::fs::read(&path).inspect_err(|err| {
            log::warn!(
                "Sounds file '{}' unopenable attempting load of '{name}': {err}",
                path.display()
            );
        })?;

        Self::load_legacy(&data, name, spec)
    }

    /// Loads `name` from an already read container, still preferring a high-quality file.
    pub fn load_from_container(
        game_dir: &Path,
        container: &[u8],
        name: &str,
        spec: &AudioSpec,
    ) -> Result<Self, SoundLoadError> {
        if let Some(slot) = Self::load_high_quality(game_dir, name, spec) {
            return Ok(slot);
        }

        Self::load_legacy(container, name, spec)
    }

    fn load_high_quality(game_dir: &Path, name: &str, spec: &AudioSpec) -> Option<Self> {
        match load_high_quality(game_dir, name, spec) {
            Ok(Some(pcm)) => {
                log::debug!("Loaded high quality sound {name} of {} bytes", pcm.len());
                Some(Self {
                    pcm,
                    priority: 0,
                    high_quality: true,
                    tones: Vec::new(),
                })
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("High quality sound {name} unusable, using the classic one: {err}");
                None
            }
        }
    }

    fn load_legacy(container: &[u8], name: &str, spec: &AudioSpec) -> Result<Self, SoundLoadError> {
        let sound = decode_legacy_sound(container, name).inspect_err(|err| {
            log::warn!("Sound {name} not loaded: {err}");
        })?;
        let slot = Self::from_legacy(sound, spec);
        log::debug!("Loaded sound {name} of {} bytes", slot.len());
        Ok(slot)
    }

    /// Re-encodes the slot, loaded for `from`, for playback in `to`.
    ///
    /// Legacy slots are rendered again from their tones; other slots are converted sample by
    /// sample.
    pub fn convert(&self, from: &AudioSpec, to: &AudioSpec) -> Result<Self, SoundLoadError> {
        if from == to || !self.is_loaded() {
            return Ok(self.clone());
        }

        let pcm = if self.tones.is_empty() {
            convert_pcm(&self.pcm, from, to)?
        } else {
            render_pc_speaker(&self.tones, to)
        };

        Ok(Self {
            pcm,
            priority: self.priority,
            high_quality: self.high_quality,
            tones: self.tones.clone(),
        })
    }

    pub fn is_loaded(&self) -> bool {
        !self.pcm.is_empty()
    }

    /// PCM bytes in the output format the slot was loaded for.
    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn is_high_quality(&self) -> bool {
        self.high_quality
    }

    /// Decoded legacy tones, empty for high-quality and raw PCM slots.
    pub fn tones(&self) -> &[u32] {
        &self.tones
    }
}
