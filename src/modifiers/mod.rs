pub mod flatten;
pub mod output;
pub mod relax;
pub mod relax_slope_1d;
pub mod stats;
pub mod subdivide;

use std::path::PathBuf;

use crate::grid::Vertex;

pub use relax::SlopeRescale;
pub use subdivide::{NeighborBorders, PathParams};

/// A queued terrain operator together with its static parameters.
///
/// The driver steps these in queue order; a modifier never starts before its
/// predecessor reports done.
#[derive(Debug, Clone)]
pub enum Modifier {
    /// Plan a path with A*, paint its constraint tube and stitch borders.
    Subdivide { params: PathParams },
    /// Copy the center column's heights over every other column.
    Flatten,
    /// Relax the center column against a fixed 1-D slope cap.
    RelaxSlope1d { max_slope: f32 },
    /// Iterative constraint relaxation over the whole field.
    Relax {
        rescale: SlopeRescale,
        iters_file: Option<PathBuf>,
    },
    /// Dump the height matrix as a JSON array of columns.
    OutputHeights { path: PathBuf },
    /// Dump the per-vertex flag matrix.
    OutputFlags { path: PathBuf },
    /// Dump the per-vertex constraint parameter matrix.
    OutputConstraints { path: PathBuf },
    /// Report per-constraint satisfaction, optionally appending a JSON
    /// record to a stats file.
    Stats { path: Option<PathBuf> },
}

/// A queue slot: the operator plus its per-run state.
#[derive(Debug)]
pub struct ModState {
    pub op: Modifier,
    pub done: bool,
    pub iterations: u32,
    /// Previous-step snapshot, allocated lazily under parallel relaxation.
    pub buffer: Option<Vec<Vertex>>,
}

impl ModState {
    pub fn new(op: Modifier) -> Self {
        ModState {
            op,
            done: false,
            iterations: 0,
            buffer: None,
        }
    }
}
