// src/decode.rs

use crate::sample::Sample;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("i/o error reading {0}")]
    Io(#[from] std::io::Error),
    #[error("wav decode error: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// The "sample decoder" collaborator: returns 16-bit L/R integer arrays and
/// the file's native sample rate.
pub trait SampleDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<(Vec<i16>, Vec<i16>, u32), DecodeError>;
}

/// Concrete `hound`-based WAV decoder. Mono files are duplicated to both
/// channels; anything beyond mono/stereo is rejected.
pub struct HoundDecoder;

impl SampleDecoder for HoundDecoder {
    fn decode(&self, path: &Path) -> Result<(Vec<i16>, Vec<i16>, u32), DecodeError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels != 1 && channels != 2 {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{channels}-channel WAV unsupported"
            )));
        }

        let samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int => match spec.bits_per_sample {
                16 => reader.samples::<i16>().collect::<Result<_, _>>()?,
                24 | 32 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> (spec.bits_per_sample - 16)) as i16))
                    .collect::<Result<_, _>>()?,
                bits => {
                    return Err(DecodeError::UnsupportedFormat(format!(
                        "{bits}-bit integer PCM unsupported"
                    )))
                }
            },
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v * crate::sample::MAX_VAL_16) as i16))
                .collect::<Result<_, _>>()?,
        };

        let (l, r) = if channels == 1 {
            (samples.clone(), samples)
        } else {
            let mut l = Vec::with_capacity(samples.len() / 2);
            let mut r = Vec::with_capacity(samples.len() / 2);
            for chunk in samples.chunks_exact(2) {
                l.push(chunk[0]);
                r.push(chunk[1]);
            }
            (l, r)
        };
        Ok((l, r, spec.sample_rate))
    }
}

/// Resamples a decoded Sample from `native_rate` to `target_rate` using a
/// sinc interpolator.
pub fn resample(sample: &Sample, native_rate: u32, target_rate: u32) -> Sample {
    if native_rate == target_rate {
        return sample.clone();
    }
    let ratio = target_rate as f64 / native_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let l_f64: Vec<f64> = sample.l.iter().map(|&v| v as f64 / crate::sample::MAX_VAL_16 as f64).collect();
    let r_f64: Vec<f64> = sample.r.iter().map(|&v| v as f64 / crate::sample::MAX_VAL_16 as f64).collect();

    let mut resampler = match SincFixedIn::<f64>::new(ratio, 2.0, params, sample.len, 2) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("resampler init failed ({e}); falling back to unresampled data");
            return sample.clone();
        }
    };
    let out = match resampler.process(&[l_f64, r_f64], None) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("resample failed ({e}); falling back to unresampled data");
            return sample.clone();
        }
    };
    let to_i16 = |v: f64| (v * crate::sample::MAX_VAL_16 as f64).clamp(-32768.0, 32767.0) as i16;
    let l: Vec<i16> = out[0].iter().map(|&v| to_i16(v)).collect();
    let r: Vec<i16> = out[1].iter().map(|&v| to_i16(v)).collect();
    Sample::from_arrays(l, r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity_when_rates_match() {
        let s = Sample::from_arrays(vec![1, 2, 3], vec![3, 2, 1]);
        let out = resample(&s, 48_000, 48_000);
        assert_eq!(out.l, s.l);
        assert_eq!(out.r, s.r);
    }
}
