use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TerrainError;
use crate::generators::TerrainGenerator;
use crate::grid::Vertex;

/// Fills the plane with white noise ranging from 0 to 1.
pub struct WhiteNoiseGenerator {
    rng: StdRng,
}

impl WhiteNoiseGenerator {
    pub fn new(seed: u64) -> Self {
        WhiteNoiseGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl TerrainGenerator for WhiteNoiseGenerator {
    fn generate(&mut self, _size: usize, data: &mut [Vertex]) -> Result<(), TerrainError> {
        for v in data.iter_mut() {
            v.h = self.rng.gen::<f32>();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_are_in_unit_range() {
        let mut data = vec![Vertex::default(); 16];
        WhiteNoiseGenerator::new(3).generate(4, &mut data).unwrap();
        assert!(data.iter().all(|v| (0.0..1.0).contains(&v.h)));
        // Not all equal.
        assert!(data.iter().any(|v| v.h != data[0].h));
    }
}
