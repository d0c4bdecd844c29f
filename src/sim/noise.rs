//! Seeded 1D gradient noise
//!
//! Coherent noise for the terrain height field. Each lattice point gets a
//! pseudo-random gradient derived from an integer hash of (cell, seed), so the
//! same seed always yields the same curve with no shared tables.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::config::NoiseParams;

fn hash_1d(x: i64, seed: u64) -> u64 {
    let mut h = seed;
    h = h.wrapping_add(x as u64).wrapping_mul(6364136223846793005);
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

/// Gradient in [-1, 1] for a lattice point
fn gradient(hash: u64) -> f32 {
    ((hash >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
}

/// Quintic fade curve (C2-continuous)
#[inline]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

/// Single octave of gradient noise, roughly in [-1, 1]
pub fn gradient_1d(x: f32, seed: u64) -> f32 {
    let x0 = x.floor();
    let cell = x0 as i64;
    let fx = x - x0;

    let n0 = gradient(hash_1d(cell, seed)) * fx;
    let n1 = gradient(hash_1d(cell + 1, seed)) * (fx - 1.0);

    // Max |n| of the raw lerp is 0.5, rescale to unit range
    (n0 + (n1 - n0) * fade(fx)) * 2.0
}

/// Fractal sum of octaves, normalized so the result stays in [-1, 1]
#[derive(Debug, Clone)]
pub struct FractalNoise {
    octaves: Vec<Octave>,
    norm: f32,
}

#[derive(Debug, Clone, Copy)]
struct Octave {
    seed: u64,
    frequency: f32,
    amplitude: f32,
    /// Decorrelates octaves sharing lattice points at x = 0
    offset: f32,
}

impl FractalNoise {
    pub fn new(seed: u64, params: &NoiseParams) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut frequency = params.frequency;
        let mut amplitude = 1.0;
        let mut norm = 0.0;
        let octaves = (0..params.octaves.max(1))
            .map(|_| {
                let octave = Octave {
                    seed: rng.random(),
                    frequency,
                    amplitude,
                    offset: rng.random_range(0.0..1024.0),
                };
                norm += amplitude;
                frequency *= params.lacunarity;
                amplitude *= params.persistence;
                octave
            })
            .collect();
        Self {
            octaves,
            norm: if norm > 0.0 { norm } else { 1.0 },
        }
    }

    pub fn sample(&self, x: f32) -> f32 {
        let total: f32 = self
            .octaves
            .iter()
            .map(|o| gradient_1d(x * o.frequency + o.offset, o.seed) * o.amplitude)
            .sum();
        (total / self.norm).clamp(-1.0, 1.0)
    }
}
