//! Audio-specific error types.

use thiserror::Error;

/// Errors that can occur while loading a sound into a slot.
#[derive(Debug, Error)]
pub enum SoundLoadError {
    /// Failed to open or read a sound file.
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),

    /// No header in the legacy container carries the requested name.
    #[error("sound \"{name}\" could not be found")]
    NotFound {
        /// Name that was searched for.
        name: String,
    },

    /// A header points outside the container.
    #[error("sound \"{name}\" points at offset {offset:#x}, container holds {len} bytes")]
    InvalidOffset {
        /// Name of the sound.
        name: String,
        /// Offset read from the header.
        offset: usize,
        /// Total container length.
        len: usize,
    },

    /// Waveform data ran out before the terminator word.
    #[error("sound \"{name}\" is missing its terminator")]
    Truncated {
        /// Name of the sound.
        name: String,
    },

    /// Failed to decode a high-quality audio file.
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Failed to create resampler.
    #[error("failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Failed to resample audio.
    #[error("failed to resample audio: {0}")]
    Resample(#[from] rubato::ResampleError),

    /// Sample buffer length does not match its frame layout.
    #[error("invalid sample buffer layout: {0}")]
    BufferLayout(String),

    /// Audio file has no default track.
    #[error("audio file has no default track")]
    NoDefaultTrack,

    /// Audio file is missing sample rate information.
    #[error("audio file is missing a sample rate")]
    MissingSampleRate,

    /// Audio file is missing channel information.
    #[error("audio file is missing channel information")]
    MissingChannels,

    /// Unsupported channel mapping configuration.
    #[error(
        "unsupported channel mapping: file has {file_channels} channels, output has {output_channels} channels (only mono↔stereo supported)"
    )]
    UnsupportedChannels {
        /// Number of channels in the source file.
        file_channels: usize,
        /// Number of channels expected for output.
        output_channels: usize,
    },

    /// Decoding succeeded but produced no audio.
    #[error("sound \"{name}\" contains no audio")]
    Empty {
        /// Name of the sound.
        name: String,
    },
}

/// Errors that can occur while opening the output device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio output device found")]
    NoDevice,

    #[error("no default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to pause audio stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),

    #[error("unsupported device sample format: {0}")]
    UnsupportedSampleFormat(cpal::SampleFormat),
}
