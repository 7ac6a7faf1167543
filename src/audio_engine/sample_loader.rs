//! High-quality sound file loading.
//!
//! This module decodes richer audio files (Ogg Vorbis, WAV) that replace the legacy container
//! sounds when present, and converts them into PCM bytes in the mixer's output format.

use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::audio_engine::audio_spec::{AudioSpec, SampleFormat};
use crate::audio_engine::channels::map_channels;
use crate::audio_engine::errors::SoundLoadError;

/// File extensions tried for a high-quality replacement, in order.
pub const HIGH_QUALITY_EXTENSIONS: [&str; 2] = ["ogg", "wav"];

/// Output frames produced per resampler call.
const RESAMPLE_CHUNK_FRAMES: usize = 256;

/// Interleaved floating point audio as read from a file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub channels: usize,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Returns the first high-quality replacement for `name` found in `game_dir`.
pub fn find_high_quality(game_dir: &Path, name: &str) -> Option<PathBuf> {
    HIGH_QUALITY_EXTENSIONS
        .iter()
        .map(|ext| game_dir.join(format!("{name}.{ext}")))
        .find(|path| path.is_file())
}

/// Loads the high-quality replacement for `name` if one exists.
///
/// # Returns
///
/// - `Ok(Some(pcm))`: PCM bytes in the format described by `spec`
/// - `Ok(None)`: No replacement file exists
/// - `Err(SoundLoadError)`: A replacement exists but could not be decoded
pub fn load_high_quality(
    game_dir: &Path,
    name: &str,
    spec: &AudioSpec,
) -> Result<Option<Vec<u8>>, SoundLoadError> {
    let Some(path) = find_high_quality(game_dir, name) else {
        return Ok(None);
    };

    let pcm = decode_audio_file_to_pcm(&path, spec)?;
    if pcm.is_empty() {
        return Err(SoundLoadError::Empty {
            name: name.to_string(),
        });
    }

    Ok(Some(pcm))
}

/// Decodes an audio file and converts it to PCM bytes for `spec`.
///
/// The channel layout is mapped (mono↔stereo), the sample rate converted when it differs from
/// the output rate, and every sample encoded in the output sample format.
pub fn decode_audio_file_to_pcm(path: &Path, spec: &AudioSpec) -> Result<Vec<u8>, SoundLoadError> {
    let decoded = decode_audio_file(path)?;
    let output_channels = usize::from(spec.channels.max(1));

    let mapped = map_channels(decoded.samples, decoded.channels, output_channels)?;
    let resampled = resample_interleaved(&mapped, output_channels, decoded.sample_rate, spec.rate)?;

    Ok(encode_pcm(&resampled, spec.format))
}

/// Decodes an audio file into interleaved `f32` samples.
///
/// # Errors
///
/// - File not found or cannot be opened
/// - Audio format not recognized or corrupted
/// - Missing track, rate or channel information
pub fn decode_audio_file(path: &Path) -> Result<DecodedAudio, SoundLoadError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or(SoundLoadError::NoDefaultTrack)?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(SoundLoadError::MissingSampleRate)?;
    let channels = track
        .codec_params
        .channels
        .ok_or(SoundLoadError::MissingChannels)?
        .count();

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(SoundLoadError::Decode(err)),
        };

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    Ok(DecodedAudio {
        channels,
        sample_rate,
        samples,
    })
}

/// Converts interleaved samples from `from_rate` to `to_rate`.
///
/// The result holds exactly `round(frames * to_rate / from_rate)` frames with the resampler's
/// delay removed.
pub fn resample_interleaved(
    samples: &[f32],
    channels: usize,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, SoundLoadError> {
    if from_rate == to_rate || from_rate == 0 || channels == 0 || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let iparams = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = Async::<f32>::new_sinc(
        ratio,
        1.0,
        &iparams,
        RESAMPLE_CHUNK_FRAMES,
        channels,
        FixedAsync::Output,
    )?;

    let in_frames = samples.len() / channels;
    let expected_frames = (in_frames as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let target_frames = delay + expected_frames;

    let mut resampled: Vec<f32> = Vec::with_capacity((target_frames + RESAMPLE_CHUNK_FRAMES) * channels);
    let mut out_f32: Vec<f32> = vec![0.0; RESAMPLE_CHUNK_FRAMES * channels];
    let mut consumed = 0;

    while resampled.len() / channels < target_frames {
        let need = resampler.input_frames_next();
        let frames = need.min(in_frames - consumed);

        let out_frames = resampler.output_frames_next();
        if out_f32.len() < channels * out_frames {
            out_f32.resize(channels * out_frames, 0.0);
        }

        let input = InterleavedSlice::new(
            &samples[consumed * channels..(consumed + frames) * channels],
            channels,
            frames,
        )
        .map_err(|err| SoundLoadError::BufferLayout(err.to_string()))?;
        let mut output = InterleavedSlice::new_mut(
            &mut out_f32[..(channels * out_frames)],
            channels,
            out_frames,
        )
        .map_err(|err| SoundLoadError::BufferLayout(err.to_string()))?;
        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            partial_len: (frames < need).then_some(frames),
            active_channels_mask: None,
        };
        let (in_used, out_used) =
            resampler.process_into_buffer(&input, &mut output, Some(&indexing))?;

        consumed = (consumed + in_used.min(frames)).min(in_frames);
        if out_used == 0 {
            break;
        }
        resampled.extend_from_slice(&out_f32[..out_used * channels]);
    }

    let start = (delay * channels).min(resampled.len());
    let mut out = resampled.split_off(start);
    out.resize(expected_frames * channels, 0.0);
    Ok(out)
}

/// Converts PCM bytes laid out for `from` into PCM bytes for `to`.
///
/// Samples are decoded to floating point, channel-mapped, resampled and encoded again.
pub fn convert_pcm(pcm: &[u8], from: &AudioSpec, to: &AudioSpec) -> Result<Vec<u8>, SoundLoadError> {
    if from == to {
        return Ok(pcm.to_vec());
    }

    let from_channels = usize::from(from.channels.max(1));
    let to_channels = usize::from(to.channels.max(1));

    let samples = from.format.decode_normalized(pcm);
    let mapped = map_channels(samples, from_channels, to_channels)?;
    let resampled = resample_interleaved(&mapped, to_channels, from.rate, to.rate)?;

    Ok(encode_pcm(&resampled, to.format))
}

/// Encodes normalized samples into PCM bytes.
pub fn encode_pcm(samples: &[f32], format: SampleFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * format.bytes_per_sample());
    for &sample in samples {
        format.push_normalized(sample, &mut out);
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use super::*;

    /// Helper function to create a PCM16 WAV file for testing.
    pub(crate) fn write_pcm16_wav(
        path: &Path,
        channels: u16,
        sample_rate_hz: u32,
        samples: &[i16],
    ) -> std::io::Result<()> {
        let bits_per_sample = 16u16;
        let block_align = channels * (bits_per_sample / 8);
        let byte_rate = sample_rate_hz * u32::from(block_align);
        let data_len_bytes = u32::try_from(samples.len() * 2).expect("sample data too large");
        let chunk_size = 36 + data_len_bytes;

        let mut file = File::create(path)?;
        file.write_all(b"RIFF")?;
        file.write_all(&chunk_size.to_le_bytes())?;
        file.write_all(b"WAVE")?;

        file.write_all(b"fmt ")?;
        file.write_all(&16u32.to_le_bytes())?;
        file.write_all(&1u16.to_le_bytes())?; // PCM
        file.write_all(&channels.to_le_bytes())?;
        file.write_all(&sample_rate_hz.to_le_bytes())?;
        file.write_all(&byte_rate.to_le_bytes())?;
        file.write_all(&block_align.to_le_bytes())?;
        file.write_all(&bits_per_sample.to_le_bytes())?;

        file.write_all(b"data")?;
        file.write_all(&data_len_bytes.to_le_bytes())?;
        for sample in samples {
            file.write_all(&sample.to_le_bytes())?;
        }

        Ok(())
    }

    #[test]
    fn test_decode_wav_to_f32() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.wav");

        let samples = [0i16, 16_384i16, -16_384i16, 32_767i16];
        write_pcm16_wav(&path, 1, 44_100, &samples).unwrap();

        let decoded = decode_audio_file(&path).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.samples.len(), samples.len());
        assert!(decoded.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_decode_to_pcm_maps_mono_to_stereo() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.wav");

        let samples = [0i16, 16_384i16, -16_384i16];
        write_pcm16_wav(&path, 1, 44_100, &samples).unwrap();

        let spec = AudioSpec::new(44_100, 2, SampleFormat::S16);
        let pcm = decode_audio_file_to_pcm(&path, &spec).unwrap();

        assert_eq!(pcm.len(), samples.len() * spec.frame_bytes());
        for frame in pcm.chunks_exact(4) {
            assert_eq!(&frame[0..2], &frame[2..4]);
        }
    }

    #[test]
    fn test_decode_to_u8_pcm() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.wav");

        write_pcm16_wav(&path, 1, 22_050, &[0i16, 0i16]).unwrap();

        let spec = AudioSpec::new(22_050, 1, SampleFormat::U8);
        let pcm = decode_audio_file_to_pcm(&path, &spec).unwrap();

        assert_eq!(pcm, vec![0x80, 0x80]);
    }

    #[test]
    fn test_resample_changes_length() {
        let input: Vec<f32> = (0..2_205).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();

        let output = resample_interleaved(&input, 1, 22_050, 44_100).unwrap();

        assert_eq!(output.len(), 4_410);
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = vec![0.1, 0.2, 0.3, 0.4];

        let output = resample_interleaved(&input, 2, 44_100, 44_100).unwrap();

        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_stereo_keeps_channels_apart() {
        let input: Vec<f32> = (0..1_000).flat_map(|_| [0.25, -0.25]).collect();

        let output = resample_interleaved(&input, 2, 44_100, 22_050).unwrap();

        assert_eq!(output.len(), 1_000);
        // Away from the filter edges both sides keep their level.
        for frame in output[200..800].chunks_exact(2) {
            assert!((frame[0] - 0.25).abs() < 0.02);
            assert!((frame[1] + 0.25).abs() < 0.02);
        }
    }

    #[test]
    fn test_convert_pcm_s16_stereo_to_u8_mono() {
        let from = AudioSpec::new(44_100, 2, SampleFormat::S16);
        let to = AudioSpec::new(44_100, 1, SampleFormat::U8);
        let pcm: Vec<u8> = [0i16, 0, 32_767, 32_767, -32_767, -32_767]
            .iter()
            .flat_map(|s| s.to_ne_bytes())
            .collect();

        let converted = convert_pcm(&pcm, &from, &to).unwrap();

        assert_eq!(converted, vec![0x80, 0xFF, 0x01]);
    }

    #[test]
    fn test_convert_pcm_same_spec_is_copy() {
        let spec = AudioSpec::default();

        assert_eq!(convert_pcm(&[1, 2, 3, 4], &spec, &spec).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_find_high_quality_prefers_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(find_high_quality(tmp.path(), "KEENJUMP").is_none());

        let wav = tmp.path().join("KEENJUMP.wav");
        write_pcm16_wav(&wav, 1, 44_100, &[0i16]).unwrap();

        assert_eq!(find_high_quality(tmp.path(), "KEENJUMP"), Some(wav));
    }

    #[test]
    fn test_load_high_quality_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();

        let result = load_high_quality(tmp.path(), "NOTHERE", &AudioSpec::default()).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_decode_invalid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nonexistent.wav");

        let result = decode_audio_file(&path);
        assert!(matches!(result, Err(SoundLoadError::Io(_))));
    }
}
