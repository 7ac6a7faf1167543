//! Pull interface of the background music producer.

/// A continuous PCM source mixed underneath the sound effects.
///
/// The producer decodes ahead of time; `read_waveform` runs on the audio thread and must not
/// block or perform I/O.
pub trait MusicStream: Send {
    fn is_playing(&self) -> bool;

    /// Fills `buffer` with PCM bytes in the mixer's output format.
    fn read_waveform(&mut self, buffer: &mut [u8]);
}
