//! Audio Stream Module
//!
//! This module handles CPAL audio stream management including:
//! - Stream initialization for the requested output format
//! - The real-time callback that renders the shared mixer
//! - Conversion from the mixer's PCM bytes to the device sample type

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, SizedSample, Stream, StreamConfig};
use env_logger::{Builder, Env};

use crate::audio_engine::audio_spec::{AudioSpec, SampleFormat};
use crate::audio_engine::errors::DeviceError;
use crate::audio_engine::mixer::RtMixer;

/// Handle to the running output stream
pub struct AudioStreamHandle {
    pub stream: Stream,
    pub output_channels: u16,
    pub output_sample_rate: u32,
}

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Users can override via `RUST_LOG`, e.g. `RUST_LOG=debug` to see every loaded sound.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// Create the output stream for `spec`, rendering from `mixer`.
///
/// The stream is built with the device's preferred sample type; the mixer renders in its current
/// sample format and the callback converts. A device that refuses the fixed buffer size is
/// retried with its default buffer size.
pub fn create_audio_stream(
    mixer: Arc<Mutex<RtMixer>>,
    spec: AudioSpec,
) -> Result<AudioStreamHandle, DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(DeviceError::NoDevice)?;

    let device_format = device.default_output_config()?.sample_format();

    let mut stream_config = StreamConfig {
        channels: spec.channels,
        sample_rate: spec.rate,
        buffer_size: BufferSize::Fixed(u32::from(spec.samples)),
    };

    let stream = match build_stream(&device, &stream_config, device_format, &mixer, spec) {
        Ok(stream) => stream,
        Err(DeviceError::BuildStream(err)) => {
            log::warn!(
                "Fixed buffer of {} samples refused ({err}), using the device default",
                spec.samples
            );
            stream_config.buffer_size = BufferSize::Default;
            build_stream(&device, &stream_config, device_format, &mixer, spec)?
        }
        Err(err) => return Err(err),
    };

    log::info!(
        "Audio device opened: {} Hz, {} ch, {} samples, {:?} mixed as {:?} ({:?} host)",
        spec.rate,
        spec.channels,
        spec.samples,
        device_format,
        spec.format,
        host.id()
    );

    Ok(AudioStreamHandle {
        stream,
        output_channels: spec.channels,
        output_sample_rate: spec.rate,
    })
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    device_format: cpal::SampleFormat,
    mixer: &Arc<Mutex<RtMixer>>,
    spec: AudioSpec,
) -> Result<Stream, DeviceError> {
    match device_format {
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, config, mixer, spec),
        cpal::SampleFormat::U8 => build_typed_stream::<u8>(device, config, mixer, spec),
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, config, mixer, spec),
        other => Err(DeviceError::UnsupportedSampleFormat(other)),
    }
}

fn build_typed_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: &Arc<Mutex<RtMixer>>,
    spec: AudioSpec,
) -> Result<Stream, DeviceError>
where
    T: SizedSample + FromSample<i16> + FromSample<u8>,
{
    let mixer = Arc::clone(mixer);
    let mut render_buffer = vec![0u8; spec.buffer_bytes()];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            render_device_tick(&mixer, &mut render_buffer, data);
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )?;

    Ok(stream)
}

/// Renders one device callback into `data`.
///
/// The sample format is read from the mixer under the same lock as the render, so a format
/// change between two callbacks is picked up by the next one.
fn render_device_tick<T>(mixer: &Mutex<RtMixer>, render_buffer: &mut Vec<u8>, data: &mut [T])
where
    T: SizedSample + FromSample<i16> + FromSample<u8>,
{
    let Ok(mut mixer) = mixer.lock() else {
        data.fill(T::EQUILIBRIUM);
        return;
    };

    let format = mixer.spec().format;
    let len = data.len() * format.bytes_per_sample();
    if render_buffer.len() < len {
        render_buffer.resize(len, 0);
    }
    let pcm = &mut render_buffer[..len];
    mixer.render(pcm);
    drop(mixer);

    write_device_samples(data, pcm, format);
}

/// Converts mixer PCM bytes in `format` into device samples.
fn write_device_samples<T>(data: &mut [T], pcm: &[u8], format: SampleFormat)
where
    T: SizedSample + FromSample<i16> + FromSample<u8>,
{
    match format {
        SampleFormat::U8 => {
            for (out, &byte) in data.iter_mut().zip(pcm) {
                *out = T::from_sample(byte);
            }
        }
        SampleFormat::S16 => {
            for (out, bytes) in data.iter_mut().zip(pcm.chunks_exact(2)) {
                *out = T::from_sample(i16::from_ne_bytes([bytes[0], bytes[1]]));
            }
        }
    }
}

/// Start playing the audio stream
pub fn start_stream(stream: &Stream) -> Result<(), DeviceError> {
    stream.play()?;
    Ok(())
}

/// Pause the audio stream
pub fn pause_stream(stream: &Stream) -> Result<(), DeviceError> {
    stream.pause()?;
    Ok(())
}
