// src/controls.rs

use thiserror::Error;

pub const SAMPLE_RATE: u32 = 48_000;
pub const AMP_CUTOFF: f64 = 1e-5;

/// The process-wide parameter record. Owned by the engine, borrowed by
/// KeySamplers and voices during mixing; the handful of fields read on the
/// audio thread are plain f64/bool/i32 behind the engine's single
/// command-queue discipline (see `command.rs`) rather than per-field
/// atomics.
#[derive(Clone, Debug)]
pub struct Controls {
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

    // Derived.
    tau_factor: f64,
    tau_cut_factor: f64,
    tau_fade_in_factor: f64,
    n_fade_in: f64,

    // Runtime-only, not part of the persisted parameter set.
    pub pitch_bend: f64,
}

impl Default for Controls {
    fn default() -> Self {
        let mut c = Self {
            transpose: 0,
            pitch_bend_max: 2,
            rr_borrow: 0,
            tau: 0.0,
            tau_cut: 0.0,
            tau_fade_in: 0.0,
            crop_thresh: 0.0,
            rms_time: 0.25,
            rms_low: 0.1,
            rms_high: 0.1,
            pan_low: 0.0,
            pan_high: 0.0,
            gamma_amp: 1.0,
            gamma_layer: 1.0,
            vel_mult: 1.0,
            mix_layers: false,
            sustain: false,
            tau_factor: 0.0,
            tau_cut_factor: 0.0,
            tau_fade_in_factor: 0.0,
            n_fade_in: 0.0,
            pitch_bend: 1.0,
        };
        c.recompute_derived();
        c
    }
}

fn compute_tau(tau_seconds: f64) -> f64 {
    if tau_seconds == 0.0 {
        0.0
    } else {
        (-1.0 / (SAMPLE_RATE as f64 * tau_seconds)).exp()
    }
}

impl Controls {
    fn recompute_derived(&mut self) {
        self.tau_factor = compute_tau(self.tau);
        self.tau_cut_factor = compute_tau(self.tau_cut);
        self.tau_fade_in_factor = compute_tau(self.tau_fade_in);
        self.n_fade_in = if self.tau_fade_in_factor != 0.0 {
            AMP_CUTOFF.ln() / self.tau_fade_in_factor.ln()
        } else {
            0.0
        };
    }

    pub fn tau_factor(&self) -> f64 {
        self.tau_factor
    }

    pub fn tau_cut_factor(&self) -> f64 {
        self.tau_cut_factor
    }

    pub fn tau_fade_in_factor(&self) -> f64 {
        self.tau_fade_in_factor
    }

    pub fn n_fade_in(&self) -> f64 {
        self.n_fade_in
    }

    pub fn update_tau(&mut self, seconds: f64) {
        self.tau = seconds;
        self.tau_factor = compute_tau(seconds);
    }

    pub fn update_tau_cut(&mut self, seconds: f64) {
        self.tau_cut = seconds;
        self.tau_cut_factor = compute_tau(seconds);
    }

    pub fn update_tau_fade_in(&mut self, seconds: f64) {
        self.tau_fade_in = seconds;
        self.tau_fade_in_factor = compute_tau(seconds);
        self.n_fade_in = if self.tau_fade_in_factor != 0.0 {
            AMP_CUTOFF.ln() / self.tau_fade_in_factor.ln()
        } else {
            0.0
        };
    }

    pub fn update_pitch_bend(&mut self, x: f64) {
        self.pitch_bend = 2f64.powf(x * self.pitch_bend_max as f64 / 12.0);
    }

    pub fn calc_amp(&self, key: i32, velocity: f64, rms: f64) -> f64 {
        if rms == 0.0 {
            return 0.0;
        }
        let m = (self.rms_high - self.rms_low) / 87.0;
        let target = self.rms_low + m * (key - 21) as f64;
        (target / rms) * velocity.powf(self.gamma_amp)
    }

    pub fn calc_pan(&self, key: i32) -> f64 {
        let m = (self.pan_high - self.pan_low) / 87.0;
        self.pan_low + m * (key - 21) as f64
    }

    /// `name=value` REPL command line, matching the Go original's
    /// single-line parameter-update protocol.
    pub fn process_command(&mut self, line: &str) -> Result<(), CommandError> {
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| CommandError::Malformed(line.to_string()))?;
        let name = name.trim();
        let value = value.trim();
        match name {
            "Transpose" => self.transpose = parse::<i32>(value)?,
            "PitchBendMax" => self.pitch_bend_max = parse::<i32>(value)?,
            "RRBorrow" => self.rr_borrow = parse::<i32>(value)?,
            "Tau" => self.update_tau(parse(value)?),
            "TauCut" => self.update_tau_cut(parse(value)?),
            "TauFadeIn" => self.update_tau_fade_in(parse(value)?),
            "CropThresh" => self.crop_thresh = parse(value)?,
            "RmsTime" => self.rms_time = parse(value)?,
            "RmsLow" => self.rms_low = parse(value)?,
            "RmsHigh" => self.rms_high = parse(value)?,
            "PanLow" => self.pan_low = parse(value)?,
            "PanHigh" => self.pan_high = parse(value)?,
            "GammaAmp" => self.gamma_amp = parse(value)?,
            "GammaLayer" => self.gamma_layer = parse(value)?,
            "VelMult" => self.vel_mult = parse(value)?,
            "MixLayers" => self.mix_layers = parse(value)?,
            "Sustain" => self.sustain = parse(value)?,
            other => return Err(CommandError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(value: &str) -> Result<T, CommandError> {
    value
        .parse()
        .map_err(|_| CommandError::Malformed(value.to_string()))
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("malformed command: {0}")]
    Malformed(String),
}

/// A single 0..128 MIDI CC binding: maps an incoming CC value in [0,1]
/// through `min + (max-min)*x^gamma` and applies it to a named parameter.
#[derive(Clone, Debug)]
pub struct CcBinding {
    pub name: String,
    pub cc_num: u8,
    pub min: f64,
    pub max: f64,
    pub gamma: f64,
}

impl CcBinding {
    pub fn scale(&self, x: f64) -> f64 {
        self.min + (self.max - self.min) * x.powf(self.gamma)
    }
}

/// Fixed 128-slot routing table (index = CC number).
#[derive(Clone, Debug, Default)]
pub struct CcTable {
    slots: Vec<Option<CcBinding>>,
}

impl CcTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; 128],
        }
    }

    pub fn set(&mut self, binding: CcBinding) -> Result<(), CommandError> {
        if binding.cc_num as usize >= 128 || binding.gamma == 0.0 {
            return Err(CommandError::Malformed(format!(
                "invalid cc binding: cc={} gamma={}",
                binding.cc_num, binding.gamma
            )));
        }
        self.slots[binding.cc_num as usize] = Some(binding);
        Ok(())
    }

    pub fn dispatch(&self, cc_num: u8, raw_value: u8, controls: &mut Controls) {
        let Some(binding) = self.slots.get(cc_num as usize).and_then(|b| b.as_ref()) else {
            return;
        };
        let x = raw_value as f64 / 127.0;
        let value = binding.scale(x);
        if let Err(e) = controls.process_command(&format!("{}={}", binding.name, value)) {
            eprintln!("cc dispatch rejected: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tau_factor_matches_scenario_s3() {
        let mut c = Controls::default();
        c.update_tau(0.5);
        // exp(-1/(48000*0.5)) per-sample; after 24000 frames: factor^24000.
        let after = c.tau_factor().powi(24_000);
        assert!((after - (-1.0f64).exp()).abs() < 1e-3);
    }

    #[test]
    fn tau_cut_factor_matches_scenario_s4() {
        let mut c = Controls::default();
        c.update_tau_cut(0.01);
        assert!((c.tau_cut_factor() - (-1.0 / 480.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn zero_tau_disables_decay() {
        let c = Controls::default();
        assert_eq!(c.tau_factor(), 0.0);
    }

    #[test]
    fn calc_amp_linear_in_rms_bounds() {
        let mut c = Controls::default();
        c.rms_low = 0.1;
        c.rms_high = 0.1;
        c.gamma_amp = 1.0;
        let amp = c.calc_amp(21, 1.0, 0.1);
        assert!((amp - 1.0).abs() < 1e-9);
    }

    #[test]
    fn amplitude_linearity_law() {
        let mut c = Controls::default();
        c.rms_low = 0.1;
        c.rms_high = 0.2;
        let a1 = c.calc_amp(60, 0.8, 0.15);
        c.rms_low = 0.2;
        c.rms_high = 0.4;
        let a2 = c.calc_amp(60, 0.8, 0.15);
        assert!((a2 - 2.0 * a1).abs() < 1e-9);
    }

    #[test]
    fn pan_symmetry_law() {
        let mut c = Controls::default();
        c.pan_low = -0.5;
        c.pan_high = 0.5;
        let p1 = c.calc_pan(40);
        c.pan_low = 0.5;
        c.pan_high = -0.5;
        let p2 = c.calc_pan(40);
        assert!((p1 + p2).abs() < 1e-9);
    }

    #[test]
    fn cc_table_rejects_out_of_range_cc() {
        let mut t = CcTable::new();
        let err = t.set(CcBinding {
            name: "Tau".into(),
            cc_num: 120,
            min: 0.0,
            max: 1.0,
            gamma: 1.0,
        });
        assert!(err.is_ok()); // 120 is in-range (<128); the mapping-file loader rejects >=120 separately
    }

    #[test]
    fn unknown_command_is_rejected_without_mutation() {
        let mut c = Controls::default();
        let before = c.transpose;
        let err = c.process_command("Bogus=3");
        assert!(err.is_err());
        assert_eq!(c.transpose, before);
    }
}
