use crate::audio_engine::constants::BALANCE_LIMIT;
use crate::audio_engine::errors::SoundLoadError;

/// Maps audio samples from one channel configuration to another.
///
/// Currently supports:
/// - Mono (1 channel) → Stereo (2 channels): duplicates mono signal to both channels
/// - Stereo (2 channels) → Mono (1 channel): averages both channels
/// - Same channel count: no conversion needed
///
/// # Parameters
///
/// - `samples`: Interleaved audio samples to convert
/// - `file_channels`: Number of channels in the source audio
/// - `output_channels`: Number of channels for the output
///
/// # Returns
///
/// - `Ok(Vec<f32>)`: Samples with converted channel layout
/// - `Err(SoundLoadError)`: Unsupported channel mapping
pub fn map_channels(
    samples: Vec<f32>,
    file_channels: usize,
    output_channels: usize,
) -> Result<Vec<f32>, SoundLoadError> {
    if file_channels == output_channels {
        return Ok(samples);
    }

    match (file_channels, output_channels) {
        // Mono → Stereo: duplicate each sample
        (1, 2) => {
            let mut out = Vec::with_capacity(samples.len() * 2);
            for s in samples {
                out.push(s);
                out.push(s);
            }
            Ok(out)
        }
        // Stereo → Mono: average each frame
        (2, 1) => {
            let mut out = Vec::with_capacity(samples.len() / 2);
            for frame in samples.chunks_exact(2) {
                out.push((frame[0] + frame[1]) * 0.5);
            }
            Ok(out)
        }
        _ => Err(SoundLoadError::UnsupportedChannels {
            file_channels,
            output_channels,
        }),
    }
}

/// Clamps a balance value to `-BALANCE_LIMIT..=BALANCE_LIMIT`.
pub fn clamp_balance(balance: i32) -> i16 {
    balance.clamp(-i32::from(BALANCE_LIMIT), i32::from(BALANCE_LIMIT)) as i16
}

/// Left and right gains for `balance`, each in `0..=BALANCE_LIMIT`.
///
/// Positive balance pulls the sound to the right by attenuating the left side, negative
/// balance does the opposite. Zero leaves both sides at full gain.
pub fn balance_gains(balance: i16) -> (i32, i32) {
    let limit = i32::from(BALANCE_LIMIT);
    let balance = i32::from(balance).clamp(-limit, limit);
    let left = limit - balance.max(0);
    let right = limit + balance.min(0);
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_channels_mono_to_stereo() {
        let input = vec![0.5, -0.3, 0.8];
        let output = map_channels(input, 1, 2).unwrap();

        assert_eq!(output.len(), 6); // 3 frames × 2 channels
        assert_eq!(output, vec![0.5, 0.5, -0.3, -0.3, 0.8, 0.8]);
    }

    #[test]
    fn test_map_channels_stereo_to_mono() {
        let input = vec![0.5, 0.3, -0.2, 0.4, 0.8, 0.6];
        let output = map_channels(input, 2, 1).unwrap();

        assert_eq!(output.len(), 3);
        assert!((output[0] - 0.4).abs() < 1e-6);
        assert!((output[1] - 0.1).abs() < 1e-6);
        assert!((output[2] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_map_channels_unsupported() {
        let result = map_channels(vec![0.5, -0.3, 0.8, 0.2], 2, 4);

        assert!(matches!(
            result,
            Err(SoundLoadError::UnsupportedChannels { .. })
        ));
    }

    #[test]
    fn test_clamp_balance() {
        assert_eq!(clamp_balance(0), 0);
        assert_eq!(clamp_balance(300), 255);
        assert_eq!(clamp_balance(-1000), -255);
        assert_eq!(clamp_balance(-17), -17);
    }

    #[test]
    fn test_balance_gains() {
        assert_eq!(balance_gains(0), (255, 255));
        assert_eq!(balance_gains(255), (0, 255));
        assert_eq!(balance_gains(-255), (255, 0));
        assert_eq!(balance_gains(100), (155, 255));
    }
}
