// src/voice.rs

use crate::controls::{Controls, AMP_CUTOFF};
use crate::sample::Sample;
use std::sync::Arc;

/// One sounding instance of playback.
#[derive(Debug)]
pub struct Voice {
    pub sample1: Arc<Sample>,
    pub sample2: Option<Arc<Sample>>,
    pub mix: f32,
    pub idx: f32,
    pub idx_max: f32,
    pub amp1: f64,
    pub amp2: f64,
    pub pan: f64,
    pub tau: f64,
    pub fade_amp: f64,
}

impl Voice {
    pub fn new(
        sample1: Arc<Sample>,
        sample2: Option<Arc<Sample>>,
        mix: f32,
        amp1: f64,
        amp2: f64,
        pan: f64,
        controls: &Controls,
    ) -> Self {
        let mut idx_max = (sample1.len - 1) as f32;
        if let Some(s2) = &sample2 {
            idx_max = idx_max.min((s2.len - 1) as f32);
        }
        let used_idx0 = sample2.as_ref().map(|s| s.idx0).unwrap_or(sample1.idx0) as f32;
        let idx = (used_idx0 - controls.n_fade_in() as f32).max(0.0);
        let fade_amp = if controls.tau_fade_in_factor() != 0.0 {
            1.0
        } else {
            0.0
        };
        Self {
            sample1,
            sample2,
            mix,
            idx,
            idx_max,
            amp1,
            amp2,
            pan,
            tau: 0.0,
            fade_amp,
        }
    }

    /// Advance this voice through `di[0..buf.len()]`, accumulating into
    /// `buf_l`/`buf_r`. Returns false once the voice is done (caller prunes
    /// it); frames after termination within this call are left untouched.
    pub fn write_output(
        &mut self,
        buf_l: &mut [f32],
        buf_r: &mut [f32],
        di: &[f32],
        controls: &Controls,
    ) -> bool {
        for i in 0..buf_l.len() {
            if self.tau != 0.0 {
                self.amp1 *= self.tau;
                self.amp2 *= self.tau;
                if self.amp1.abs() < AMP_CUTOFF && self.amp2.abs() < AMP_CUTOFF {
                    return false;
                }
            }
            if self.fade_amp != 0.0 {
                self.fade_amp *= controls.tau_fade_in_factor();
                if self.fade_amp < AMP_CUTOFF {
                    self.fade_amp = 0.0;
                }
            }

            let (l1, r1) = self.sample1.interp(self.idx);
            let mut l = self.amp1 as f32 * l1;
            let mut r = self.amp1 as f32 * r1;
            if self.mix != 0.0 {
                if let Some(s2) = &self.sample2 {
                    let (l2, r2) = s2.interp(self.idx);
                    l = l * (1.0 - self.mix) + self.amp2 as f32 * l2 * self.mix;
                    r = r * (1.0 - self.mix) + self.amp2 as f32 * r2 * self.mix;
                }
            }

            let fade_mult = (1.0 - self.fade_amp) as f32;
            l *= fade_mult;
            r *= fade_mult;

            let pan = self.pan as f32;
            if pan < 0.0 {
                let orig_r = r;
                l -= pan * orig_r;
                r *= 1.0 + pan;
            } else if pan > 0.0 {
                let orig_l = l;
                r += pan * orig_l;
                l *= 1.0 - pan;
            }

            buf_l[i] += l;
            buf_r[i] += r;

            self.idx += di[i];
            if self.idx >= self.idx_max {
                return false;
            }
        }
        true
    }
}
