pub mod input;
pub mod mpd;
pub mod noise;

use crate::error::TerrainError;
use crate::grid::Vertex;

pub use input::FileGenerator;
pub use mpd::MpdGenerator;
pub use noise::WhiteNoiseGenerator;

/// Fills the vertex array of a freshly created patch.
pub trait TerrainGenerator {
    fn generate(&mut self, size: usize, data: &mut [Vertex]) -> Result<(), TerrainError>;
}
