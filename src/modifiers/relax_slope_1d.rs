//! 1-D slope relaxation over the center column. Preparatory tooling for
//! flattened fields; the full solver treats the general case.

use crate::consts::{MAX_ITERATIONS, S_THRESHOLD};
use crate::grid::{self, Vertex};
use crate::modifiers::relax::move_slope;
use crate::output;

/// Relaxes one column until every adjacent pair satisfies the cap, or the
/// iteration cap is hit. Returns the iteration count and whether anything
/// moved.
pub fn relax_column(col: &mut [Vertex], scale: f32, max_slope: f32) -> (u32, bool) {
    let mut iterations = 0;
    let mut changed = false;

    while iterations < MAX_ITERATIONS {
        let mut done = true;
        iterations += 1;

        for r in 0..col.len() - 1 {
            let s = (col[r + 1].h - col[r].h) / scale;

            // The threshold absorbs floating point errors that would
            // otherwise keep the loop from ever exiting.
            if s.abs() > max_slope + S_THRESHOLD {
                move_slope(s, scale, col, r, r + 1, max_slope, 1.0);
                done = false;
                changed = true;
            }
        }

        if done {
            break;
        }
    }

    (iterations, changed)
}

/// One full modifier run on the center column.
pub fn step(size: usize, data: &mut [Vertex], max_slope: f32) -> bool {
    let scale = grid::scale(size);
    let mid = size >> 1;
    let col = &mut data[mid * size..(mid + 1) * size];

    let (iterations, changed) = relax_column(col, scale, max_slope);
    output::progress(&format!("Slope relaxation took {iterations} iterations."));
    changed
}
