// src/audio_io.rs

use crate::engine::Engine;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample as CpalSample, SampleFormat, StreamConfig};

/// Enumerate output devices on the default host.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.output_devices()?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Resolves the output device and its config up front, so the caller can
/// read the device's real sample rate and build the `Engine` with it
/// before any stream exists.
pub fn resolve_output_device(
    device_name: Option<&str>,
) -> Result<(cpal::Device, StreamConfig, SampleFormat)> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .with_context(|| format!("output device '{name}' not found"))?,
        None => host
            .default_output_device()
            .context("no default output device")?,
    };
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    Ok((device, config, sample_format))
}

/// Builds and starts the output stream, taking ownership of `engine`
/// directly into the callback closure. Nothing outside this callback ever
/// touches the engine — MIDI and REPL threads only ever reach it through
/// its `mpsc::Sender<EngineCommand>` — so no lock is needed here, and none
/// is taken: a poisoned-mutex panic on the audio thread would otherwise be
/// exactly the kind of failure the callback must never produce.
pub fn start_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    engine: Engine,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(device, config, engine, channels)?,
        SampleFormat::I16 => build_stream::<i16>(device, config, engine, channels)?,
        SampleFormat::U16 => build_stream::<u16>(device, config, engine, channels)?,
        other => anyhow::bail!("unsupported sample format: {other:?}"),
    };
    stream.play()?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: Engine,
    channels: usize,
) -> Result<cpal::Stream>
where
    T: CpalSample + FromSample<f32> + Send + 'static,
{
    let mut scratch_l: Vec<f32> = Vec::new();
    let mut scratch_r: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            if scratch_l.len() != frames {
                scratch_l.resize(frames, 0.0);
                scratch_r.resize(frames, 0.0);
            }
            engine.handle_commands();
            engine.mix(&mut scratch_l, &mut scratch_r);
            for (i, frame) in data.chunks_mut(channels).enumerate() {
                frame[0] = T::from_sample(scratch_l[i]);
                if channels > 1 {
                    frame[1] = T::from_sample(scratch_r[i]);
                    for ch in frame.iter_mut().skip(2) {
                        *ch = T::from_sample(0.0f32);
                    }
                }
            }
        },
        move |err| eprintln!("audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
