//! Message definitions shared between the game-logic threads and the audio thread.
//!
//! [`AudioMessage`] is the wire format of the lock-free queue that carries notifications out of
//! the real-time callback. [`SoundId`] and [`PlayMode`] make up the playback requests issued by
//! game logic.

/// Logical identifier of a game sound, resolved to a slot through the active catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(pub u16);

impl From<u16> for SoundId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// How a playback request interacts with sounds that are already playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    /// Claim a channel through the usual priority rules.
    #[default]
    Normal,

    /// Do nothing if the sound is already playing on any channel.
    NoRestart,

    /// Stop every channel first, then play. Always claims a channel.
    Force,

    /// Raise the gameplay-pause flag until no sound is playing anymore.
    PauseAll,
}

/// Message that is emitted from the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMessage {
    /// A channel reached the end of its waveform.
    SoundFinished { sound: SoundId },

    /// The callback found no playing channel and cleared the gameplay-pause flag.
    GameplayResumed,
}

impl AudioMessage {
    pub fn finished_sound(&self) -> Option<SoundId> {
        match self {
            AudioMessage::SoundFinished { sound } => Some(*sound),
            _ => None,
        }
    }
}
