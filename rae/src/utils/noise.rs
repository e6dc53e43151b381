//! Playback realism for live preview.
//!
//! Adds a low level of pseudo-random hiss and rounds the square edges with a
//! one-pole low-pass, approximating a tape deck feeding the control line.
//! Never used on the export path.

use crate::structs::config::Realism;

/// 23-bit feedback shift register, the same recurrence used for substream
/// dither tables in lossless audio codecs.
#[derive(Debug, Clone, Copy)]
pub struct NoiseSource {
    seed: u32,
}

impl NoiseSource {
    pub fn new(seed: u32) -> Self {
        // an all-zero register never leaves zero
        let seed = seed & 0x7F_FFFF;
        Self {
            seed: if seed == 0 { 0x2A_5A5A } else { seed },
        }
    }

    /// Next value in `[-1.0, 1.0]`.
    pub fn next_unit(&mut self) -> f32 {
        let shr15 = self.seed >> 15;
        self.seed = ((self.seed << 8) ^ shr15 ^ (shr15 << 5)) & 0x7F_FFFF;
        (shr15 as f32 / 255.0) * 2.0 - 1.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RealismFilter {
    noise: NoiseSource,
    noise_level: f32,
    smoothing: f32,
    z1: f32,
}

impl RealismFilter {
    pub fn new(realism: &Realism) -> Self {
        Self {
            noise: NoiseSource::new(realism.seed),
            noise_level: realism.noise_level.clamp(0.0, 1.0),
            smoothing: realism.smoothing.clamp(0.0, 0.99),
            z1: 0.0,
        }
    }

    pub fn process(&mut self, samples: &mut [i16]) {
        for sample in samples.iter_mut() {
            let clean = *sample as f32 / 32768.0;
            let noisy = clean + self.noise.next_unit() * self.noise_level;
            self.z1 = self.smoothing * self.z1 + (1.0 - self.smoothing) * noisy;
            *sample = (self.z1 * 32768.0).clamp(-32768.0, 32767.0) as i16;
        }
    }
}
