// src/library.rs

use crate::decode::{DecodeError, SampleDecoder};
use crate::key_sampler::KeySampler;
use crate::sample::Sample;
use crate::sample_layer::SampleLayer;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

pub const LOWEST_KEY: i32 = 21;
pub const HIGHEST_KEY: i32 = 108;
const NUM_KEYS: usize = 128;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("sample directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("decode failed for {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("no sample files found under {0}")]
    NoSamplesFound(PathBuf),
    #[error("cannot borrow between keys with differing layer counts: key {key_a} has {layers_a} layers, key {key_b} has {layers_b}")]
    LayerCountMismatch {
        key_a: i32,
        key_b: i32,
        layers_a: usize,
        layers_b: usize,
    },
}

/// A fixed 128-slot array of optional KeySampler, indexed by MIDI key.
/// Populated once at startup; thereafter structurally stable.
pub struct Library {
    pub keys: Vec<Option<KeySampler>>,
    pub polyphony: usize,
}

struct ParsedFile {
    path: PathBuf,
    key: i32,
    layer: usize,
    #[allow(dead_code)]
    variation: usize,
}

/// Parses `on-KKK-L-V.ext` into (key, 0-based layer, variation).
fn parse_sample_path(path: &Path) -> Option<(i32, usize, usize)> {
    let stem = path.file_stem()?.to_str()?;
    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() != 4 || parts[0] != "on" {
        return None;
    }
    let key: i32 = parts[1].parse().ok()?;
    let layer: usize = parts[2].parse().ok()?;
    let variation: usize = parts[3].parse().ok()?;
    if layer == 0 {
        return None;
    }
    Some((key, layer - 1, variation))
}

fn discover(samples_dir: &Path) -> Result<HashMap<i32, Vec<ParsedFile>>, LoadError> {
    if !samples_dir.is_dir() {
        return Err(LoadError::MissingDirectory(samples_dir.to_path_buf()));
    }
    let mut by_key: HashMap<i32, Vec<ParsedFile>> = HashMap::new();
    let mut paths: Vec<PathBuf> = WalkDir::new(samples_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();
    for path in paths {
        if let Some((key, layer, variation)) = parse_sample_path(&path) {
            by_key.entry(key).or_default().push(ParsedFile {
                path,
                key,
                layer,
                variation,
            });
        }
    }
    if by_key.is_empty() {
        return Err(LoadError::NoSamplesFound(samples_dir.to_path_buf()));
    }
    Ok(by_key)
}

fn load_key(
    files: &[ParsedFile],
    decoder: &dyn SampleDecoder,
    tuning: &HashMap<String, f64>,
    library_rate: u32,
    polyphony: usize,
) -> Result<KeySampler, LoadError> {
    let key = files[0].key;
    let mut layers: Vec<SampleLayer> = Vec::new();
    for f in files {
        while layers.len() <= f.layer {
            layers.push(SampleLayer::new());
        }
        let (l, r, native_rate) =
            decoder
                .decode(&f.path)
                .map_err(|e| LoadError::Decode {
                    path: f.path.clone(),
                    source: e,
                })?;
        let mut sample = Sample::from_arrays(l, r);
        if native_rate != library_rate {
            sample = crate::decode::resample(&sample, native_rate, library_rate);
        }
        let filename = f.path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if let Some(&semitones) = tuning.get(filename) {
            sample = sample.stretched(semitones);
        }
        layers[f.layer].add_sample(Arc::new(sample));
    }
    Ok(KeySampler::new(key, layers, polyphony))
}

impl Library {
    /// Runs the full seven-step build pipeline: discovery, decode, tune,
    /// assemble, crop & RMS, borrow, transpose-fill.
    pub fn build(
        samples_dir: &Path,
        decoder: &dyn SampleDecoder,
        tuning: &HashMap<String, f64>,
        library_rate: u32,
        crop_thresh: f64,
        rms_time: f64,
        rr_borrow: i32,
        polyphony: usize,
    ) -> Result<Library, LoadError> {
        let by_key = discover(samples_dir)?;

        // Discovery + decode + tune + assemble, one independent task per key.
        let mut built: Vec<(i32, KeySampler)> = by_key
            .par_iter()
            .map(|(&key, files)| -> Result<(i32, KeySampler), LoadError> {
                let ks = load_key(files, decoder, tuning, library_rate, polyphony)?;
                Ok((key, ks))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Crop & RMS, per key, independent.
        built.par_iter_mut().for_each(|(_, ks)| {
            for layer in ks.layers.iter_mut() {
                apply_crop_and_rms(layer, crop_thresh, rms_time);
            }
        });

        let mut keys: Vec<Option<KeySampler>> = (0..NUM_KEYS).map(|_| None).collect();
        for (key, ks) in built {
            if key >= 0 && (key as usize) < NUM_KEYS {
                keys[key as usize] = Some(ks);
            }
        }

        if rr_borrow > 0 {
            borrow(&mut keys, rr_borrow)?;
        }
        transpose_fill(&mut keys, polyphony);

        Ok(Library { keys, polyphony })
    }

    pub fn get(&self, key: i32) -> Option<&KeySampler> {
        if key < 0 {
            return None;
        }
        self.keys.get(key as usize).and_then(|k| k.as_ref())
    }

    pub fn get_mut(&mut self, key: i32) -> Option<&mut KeySampler> {
        if key < 0 {
            return None;
        }
        self.keys.get_mut(key as usize).and_then(|k| k.as_mut())
    }
}

fn apply_crop_and_rms(layer: &mut SampleLayer, crop_thresh: f64, rms_time: f64) {
    layer.for_each_sample_mut(|s| {
        s.update_crop_thresh(crop_thresh);
        s.update_rms(rms_time);
    });
}

/// Snapshot every populated key's layers *before* borrowing begins so that
/// borrowed variety never propagates from one key to the next.
fn borrow(keys: &mut [Option<KeySampler>], rr_borrow: i32) -> Result<(), LoadError> {
    let snapshot: Vec<Option<Vec<SampleLayer>>> = keys
        .iter()
        .map(|k| k.as_ref().map(|ks| ks.copy_layers()))
        .collect();

    for key in LOWEST_KEY..=HIGHEST_KEY {
        let idx = key as usize;
        if keys[idx].is_none() {
            continue;
        }
        for j in 1..=rr_borrow {
            for (neighbor_key, semitone_dir) in [(key - j, 1.0), (key + j, -1.0)] {
                if neighbor_key < 0 || neighbor_key as usize >= keys.len() {
                    continue;
                }
                let Some(neighbor_layers) = &snapshot[neighbor_key as usize] else {
                    continue;
                };
                let ks = keys[idx].as_mut().unwrap();
                if ks.layers.len() != neighbor_layers.len() {
                    return Err(LoadError::LayerCountMismatch {
                        key_a: key,
                        key_b: neighbor_key,
                        layers_a: ks.layers.len(),
                        layers_b: neighbor_layers.len(),
                    });
                }
                let semitones = semitone_dir * j as f64;
                for (layer, neighbor_layer) in ks.layers.iter_mut().zip(neighbor_layers.iter()) {
                    layer.borrow_from(neighbor_layer, semitones);
                }
            }
        }
    }
    Ok(())
}

/// Fills every unpopulated slot in [LOWEST_KEY, HIGHEST_KEY] by
/// pitch-shifting the nearest populated neighbor. At equal distance the
/// lower neighbor wins (matches scenario S6).
fn transpose_fill(keys: &mut Vec<Option<KeySampler>>, polyphony: usize) {
    let originals: Vec<Option<Vec<SampleLayer>>> = keys
        .iter()
        .map(|k| k.as_ref().map(|ks| ks.copy_layers()))
        .collect();

    for key in LOWEST_KEY..=HIGHEST_KEY {
        let idx = key as usize;
        if keys[idx].is_some() {
            continue;
        }
        let mut found: Option<(i32, f64)> = None;
        let mut dist = 1;
        while found.is_none() && dist <= (HIGHEST_KEY - LOWEST_KEY) {
            let lower = key - dist;
            let higher = key + dist;
            if lower >= LOWEST_KEY && originals[lower as usize].is_some() {
                found = Some((lower, dist as f64));
            } else if higher <= HIGHEST_KEY && originals[higher as usize].is_some() {
                found = Some((higher, -(dist as f64)));
            }
            dist += 1;
        }
        if let Some((source_key, semitones)) = found {
            let source_layers = originals[source_key as usize].as_ref().unwrap();
            let layers = source_layers
                .iter()
                .map(|l| l.transpose(semitones))
                .collect();
            keys[idx] = Some(KeySampler::new(key, layers, polyphony));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_filename() {
        let p = PathBuf::from("samples/on-060-1-2.wav");
        assert_eq!(parse_sample_path(&p), Some((60, 0, 2)));
    }

    #[test]
    fn rejects_malformed_filename() {
        let p = PathBuf::from("samples/weird.wav");
        assert_eq!(parse_sample_path(&p), None);
    }

    #[test]
    fn scenario_s6_transpose_fill_tiebreak_prefers_lower_neighbor() {
        let mut keys: Vec<Option<KeySampler>> = (0..NUM_KEYS).map(|_| None).collect();
        let mut layer60 = SampleLayer::new();
        layer60.add_sample(Arc::new(Sample::from_arrays(vec![100; 50], vec![100; 50])));
        keys[60] = Some(KeySampler::new(60, vec![layer60], 4));
        let mut layer72 = SampleLayer::new();
        layer72.add_sample(Arc::new(Sample::from_arrays(vec![200; 50], vec![200; 50])));
        keys[72] = Some(KeySampler::new(72, vec![layer72], 4));

        transpose_fill(&mut keys, 4);

        for k in LOWEST_KEY..=HIGHEST_KEY {
            assert!(keys[k as usize].is_some(), "key {k} unfilled");
        }
        // key 66 is equidistant (6) from both 60 and 72; lower wins, so its
        // transpose direction should match borrowing from 60 (positive
        // semitone shift, since 66 > 60).
        let filled = &keys[66].as_ref().unwrap().layers[0];
        assert_eq!(filled.len(), 1);
    }
}
