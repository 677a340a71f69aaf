// src/config.rs

use crate::controls::{CcBinding, Controls};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Serde mirror of the parameter table; loaded from `defaults.json` beside
/// the sample directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineDefaults {
    pub transpose: i32,
    pub pitch_bend_max: i32,
    pub rr_borrow: i32,
    pub tau: f64,
    pub tau_cut: f64,
    pub tau_fade_in: f64,
    pub crop_thresh: f64,
    pub rms_time: f64,
    pub rms_low: f64,
    pub rms_high: f64,
    pub pan_low: f64,
    pub pan_high: f64,
    pub gamma_amp: f64,
    pub gamma_layer: f64,
    pub vel_mult: f64,
    pub mix_layers: bool,
    pub sustain: bool,
    pub polyphony: usize,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        let c = Controls::default();
        Self {
            transpose: c.transpose,
            pitch_bend_max: c.pitch_bend_max,
            rr_borrow: c.rr_borrow,
            tau: c.tau,
            tau_cut: c.tau_cut,
            tau_fade_in: c.tau_fade_in,
            crop_thresh: c.crop_thresh,
            rms_time: c.rms_time,
            rms_low: c.rms_low,
            rms_high: c.rms_high,
            pan_low: c.pan_low,
            pan_high: c.pan_high,
            gamma_amp: c.gamma_amp,
            gamma_layer: c.gamma_layer,
            vel_mult: c.vel_mult,
            mix_layers: c.mix_layers,
            sustain: c.sustain,
            polyphony: 8,
        }
    }
}

impl EngineDefaults {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading defaults file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing defaults file {}", path.display()))
    }

    pub fn into_controls(self) -> Controls {
        let mut c = Controls::default();
        c.transpose = self.transpose;
        c.pitch_bend_max = self.pitch_bend_max;
        c.rr_borrow = self.rr_borrow;
        c.update_tau(self.tau);
        c.update_tau_cut(self.tau_cut);
        c.update_tau_fade_in(self.tau_fade_in);
        c.crop_thresh = self.crop_thresh;
        c.rms_time = self.rms_time;
        c.rms_low = self.rms_low;
        c.rms_high = self.rms_high;
        c.pan_low = self.pan_low;
        c.pan_high = self.pan_high;
        c.gamma_amp = self.gamma_amp;
        c.gamma_layer = self.gamma_layer;
        c.vel_mult = self.vel_mult;
        c.mix_layers = self.mix_layers;
        c.sustain = self.sustain;
        c
    }
}

/// `tuning.json`: filename -> semitone offset, loaded at library build time.
pub fn load_tuning_file(path: &Path) -> Result<HashMap<String, f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading tuning file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing tuning file {}", path.display()))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CcBindingSpec {
    pub name: String,
    pub cc_num: u8,
    pub min: f64,
    pub max: f64,
    pub gamma: f64,
}

/// A list of CC bindings; entries with `cc_num >= 120` are rejected at
/// load and logged, not propagated as a hard error.
pub fn load_midi_mapping_file(path: &Path) -> Result<Vec<CcBinding>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading midi mapping file {}", path.display()))?;
    let specs: Vec<CcBindingSpec> = serde_json::from_str(&text)
        .with_context(|| format!("parsing midi mapping file {}", path.display()))?;
    let mut bindings = Vec::with_capacity(specs.len());
    for spec in specs {
        if spec.cc_num >= 120 {
            eprintln!(
                "midi mapping: rejecting binding for '{}', cc {} out of range (>=120)",
                spec.name, spec.cc_num
            );
            continue;
        }
        bindings.push(CcBinding {
            name: spec.name,
            cc_num: spec.cc_num,
            min: spec.min,
            max: spec.max,
            gamma: spec.gamma,
        });
    }
    Ok(bindings)
}
