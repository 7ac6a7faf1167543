//! Additive mixing routines, one per output sample format.
//!
//! The mixer picks a [`MixRoutine`] once when the output format changes and then calls it for
//! every source in the hot loop, so no per-sample format checks happen while mixing.

use crate::audio_engine::audio_spec::SampleFormat;
use crate::audio_engine::constants::MAX_VOLUME;

/// Additively mixes `src` into `dst`, scaled by `volume / MAX_VOLUME`, saturating at the
/// limits of the sample format.
pub trait MixRoutine: Send + Sync {
    fn mix(&self, dst: &mut [u8], src: &[u8], volume: u8);

    fn format(&self) -> SampleFormat;
}

/// Unsigned 8-bit samples centered on 0x80.
pub struct Unsigned8Mix;

/// Signed native-endian 16-bit samples.
pub struct Signed16Mix;

impl MixRoutine for Unsigned8Mix {
    fn mix(&self, dst: &mut [u8], src: &[u8], volume: u8) {
        let volume = i32::from(volume.min(MAX_VOLUME));
        for (d, s) in dst.iter_mut().zip(src) {
            let source = (i32::from(*s) - 0x80) * volume / i32::from(MAX_VOLUME);
            let mixed = (i32::from(*d) - 0x80 + source).clamp(-0x80, 0x7F);
            *d = (mixed + 0x80) as u8;
        }
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::U8
    }
}

impl MixRoutine for Signed16Mix {
    fn mix(&self, dst: &mut [u8], src: &[u8], volume: u8) {
        let volume = i32::from(volume.min(MAX_VOLUME));
        for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
            let existing = i32::from(i16::from_ne_bytes([d[0], d[1]]));
            let source = i32::from(i16::from_ne_bytes([s[0], s[1]])) * volume / i32::from(MAX_VOLUME);
            let mixed = (existing + source).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            d.copy_from_slice(&mixed.to_ne_bytes());
        }
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::S16
    }
}

/// Returns the mixing routine for `format`.
pub fn routine_for(format: SampleFormat) -> &'static dyn MixRoutine {
    match format {
        SampleFormat::U8 => &Unsigned8Mix,
        SampleFormat::S16 => &Signed16Mix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
    }

    fn s16_samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_s16_mix_full_volume_adds() {
        let mut dst = s16_bytes(&[0, 100, -100]);
        let src = s16_bytes(&[1000, -50, -50]);

        Signed16Mix.mix(&mut dst, &src, MAX_VOLUME);

        assert_eq!(s16_samples(&dst), vec![1000, 50, -150]);
    }

    #[test]
    fn test_s16_mix_scales_by_volume() {
        let mut dst = s16_bytes(&[0, 0]);
        let src = s16_bytes(&[1000, -1000]);

        Signed16Mix.mix(&mut dst, &src, MAX_VOLUME / 2);

        assert_eq!(s16_samples(&dst), vec![500, -500]);
    }

    #[test]
    fn test_s16_mix_clamps_instead_of_wrapping() {
        let mut dst = s16_bytes(&[0, 0]);
        let loud = s16_bytes(&[i16::MAX, i16::MIN]);

        Signed16Mix.mix(&mut dst, &loud, MAX_VOLUME);
        Signed16Mix.mix(&mut dst, &loud, MAX_VOLUME);

        assert_eq!(s16_samples(&dst), vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_u8_mix_around_midpoint() {
        let mut dst = vec![0x80, 0x80, 0x90];
        let src = vec![0x90, 0x70, 0x80];

        Unsigned8Mix.mix(&mut dst, &src, MAX_VOLUME);

        assert_eq!(dst, vec![0x90, 0x70, 0x90]);
    }

    #[test]
    fn test_u8_mix_clamps_instead_of_wrapping() {
        let mut dst = vec![0x80, 0x80];
        let loud = vec![0xFF, 0x00];

        Unsigned8Mix.mix(&mut dst, &loud, MAX_VOLUME);
        Unsigned8Mix.mix(&mut dst, &loud, MAX_VOLUME);

        assert_eq!(dst, vec![0xFF, 0x00]);
    }

    #[test]
    fn test_zero_volume_leaves_output_untouched() {
        let mut dst = s16_bytes(&[42, -42]);
        let src = s16_bytes(&[i16::MAX, i16::MAX]);

        Signed16Mix.mix(&mut dst, &src, 0);

        assert_eq!(s16_samples(&dst), vec![42, -42]);
    }

    #[test]
    fn test_routine_for_format() {
        assert_eq!(routine_for(SampleFormat::U8).format(), SampleFormat::U8);
        assert_eq!(routine_for(SampleFormat::S16).format(), SampleFormat::S16);
    }
}
