use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TerrainError;
use crate::generators::TerrainGenerator;
use crate::grid::{self, Vertex};

/// Diamond-square midpoint-displacement generator.
///
/// Requires `size` of the form 2^k+1. Corners are seeded to 0.5; every
/// frequency level halves the perturbation amplitude. Deterministic for a
/// fixed seed.
pub struct MpdGenerator {
    rng: StdRng,
}

impl MpdGenerator {
    pub fn new(seed: u64) -> Self {
        MpdGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform perturbation in [-amplitude/2, amplitude/2).
    fn perturb(&mut self, amplitude: f32) -> f32 {
        amplitude * (self.rng.gen::<f32>() - 0.5)
    }
}

impl TerrainGenerator for MpdGenerator {
    fn generate(&mut self, size: usize, data: &mut [Vertex]) -> Result<(), TerrainError> {
        if !grid::is_mpd_size(size) {
            return Err(TerrainError::InvalidInput(format!(
                "midpoint displacement needs a size of the form 2^k+1, got {size}"
            )));
        }

        // Initialize corners.
        data[0].h = 0.5;
        data[size - 1].h = 0.5;
        data[size * (size - 1)].h = 0.5;
        data[size * size - 1].h = 0.5;

        // Iterate over all step sizes, i.e. 'frequencies'.
        let mut amplitude = 1.0f32;
        let mut step = size - 1;
        while step > 1 {
            // All squares: the center becomes the mean of the four corners.
            let mut c = 0;
            while c < size - 1 {
                let mut r = 0;
                while r < size - 1 {
                    let tl = grid::index(c, r, size);
                    let bl = grid::index(c, r + step, size);
                    let tr = grid::index(c + step, r, size);
                    let br = grid::index(c + step, r + step, size);
                    let cent = grid::index(c + step / 2, r + step / 2, size);

                    let val = data[tl].h + data[bl].h + data[tr].h + data[br].h;
                    data[cent].h = val / 4.0 + self.perturb(amplitude);
                    r += step;
                }
                c += step;
            }

            // All diamonds: the center becomes the mean of its axis-aligned
            // neighbours; those missing at the boundary are just left out.
            let mut odd = false;
            let mut c = 0;
            while c < size {
                let mut r = if odd { 0 } else { step / 2 };
                while r < size {
                    let mut val = 0.0f32;
                    let mut n = 0u32;

                    if c > 0 {
                        val += data[grid::index(c - step / 2, r, size)].h;
                        n += 1;
                    }
                    if r > 0 {
                        val += data[grid::index(c, r - step / 2, size)].h;
                        n += 1;
                    }
                    if c < size - 1 {
                        val += data[grid::index(c + step / 2, r, size)].h;
                        n += 1;
                    }
                    if r < size - 1 {
                        val += data[grid::index(c, r + step / 2, size)].h;
                        n += 1;
                    }

                    data[grid::index(c, r, size)].h =
                        val / n as f32 + self.perturb(amplitude);
                    r += step;
                }
                c += step / 2;
                odd = !odd;
            }

            step /= 2;
            amplitude /= 2.0;
        }

        Ok(())
    }
}
