//! Audio engine configuration constants and limits.

/// Number of mixing channels allocated when the mixer is initialized.
pub const NUM_CHANNELS: usize = 32;

/// Maximum volume level for music and effects (full scale).
pub const MAX_VOLUME: u8 = 128;

/// Output sample rates the mixer accepts, in ascending order.
pub const AVAILABLE_RATES: [u32; 5] = [11_025, 22_050, 44_100, 48_000, 49_716];

/// Default output sample rate.
pub const DEFAULT_RATE: u32 = 44_100;

/// Default number of output channels (stereo).
pub const DEFAULT_CHANNELS: u16 = 2;

/// Half the width of the game screen in pixels; x-coordinates are centered on it.
pub const SCREEN_HALF_WIDTH: i32 = 320 >> 1;

/// Largest magnitude a stereo balance can take.
pub const BALANCE_LIMIT: i16 = 255;

/// Dividend that turns a legacy PC-speaker word into a tone frequency in Hz.
pub const PC_SPEAKER_DIVISOR: u32 = 0x1234DD;

/// Word that terminates a legacy sound.
pub const LEGACY_TERMINATOR: u16 = 0xFFFF;

/// Offset of the declared sound count inside a legacy container.
pub const LEGACY_COUNT_OFFSET: usize = 0x6;

/// Offset of the first header entry inside a legacy container.
pub const LEGACY_FIRST_HEADER: usize = 0x10;

/// Size of one legacy header entry.
pub const LEGACY_HEADER_LEN: usize = 0x10;

/// Length of the name field inside a legacy header entry.
pub const LEGACY_NAME_LEN: usize = 12;

/// Number of PC-speaker tones played per second.
pub const PC_SPEAKER_TICK_RATE: u32 = 140;

/// Peak amplitude of a rendered PC-speaker square wave (signed 16-bit).
pub const PC_SPEAKER_AMPLITUDE_S16: i16 = 0x2000;

/// Peak amplitude of a rendered PC-speaker square wave around the unsigned 8-bit midpoint.
pub const PC_SPEAKER_AMPLITUDE_U8: u8 = 0x20;

/// Capacity of the queue carrying messages out of the audio thread.
pub const MESSAGE_QUEUE_CAPACITY: usize = 256;

/// Returns the buffer size in sample frames used for `rate`.
pub fn buffer_samples_for_rate(rate: u32) -> u16 {
    match rate {
        11_025 => 256,
        22_050 => 512,
        _ => 1024,
    }
}

/// Returns true if `rate` is one of [`AVAILABLE_RATES`].
pub fn is_available_rate(rate: u32) -> bool {
    AVAILABLE_RATES.contains(&rate)
}
