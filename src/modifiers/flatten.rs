//! Flattens the terrain to 1-D by copying the center column's heights over
//! every other column.

use crate::grid::{self, Vertex};

pub fn step(size: usize, data: &mut [Vertex]) -> bool {
    let mid = size >> 1;
    let mut changed = false;

    for c in 0..size {
        if c == mid {
            continue;
        }
        for r in 0..size {
            let h = data[grid::index(mid, r, size)].h;
            let v = &mut data[grid::index(c, r, size)];
            if v.h != h {
                v.h = h;
                changed = true;
            }
        }
    }

    changed
}
