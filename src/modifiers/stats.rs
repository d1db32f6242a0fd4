//! Per-constraint satisfaction accounting plus a couple of whole-terrain
//! summary figures.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::consts::{R_THRESHOLD, S_THRESHOLD};
use crate::error::TerrainError;
use crate::grid::{self, Vertex, DIR_SLOPE, POSITION, ROUGHNESS, SLOPE};
use crate::modifiers::relax::{calc_roughness, quadrant_neighbours};
use crate::output;

/// One satisfaction record: counts, satisfied/unsatisfied splits and mean
/// distance from the goal per constraint family.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsRecord {
    pub n_s: u32,
    pub n_d: u32,
    pub n_r: u32,
    pub n_p: u32,
    pub s_s: u32,
    pub s_d: u32,
    pub s_r: u32,
    pub s_p: u32,
    pub u_s: u32,
    pub u_d: u32,
    pub u_r: u32,
    pub u_p: u32,
    pub d_s: f32,
    pub d_d: f32,
    pub d_r: f32,
    pub d_p: f32,
}

/// Walks the field once and tallies every constraint family. Slope and
/// directional satisfaction is conjunctive over all four quadrants.
pub fn collect(size: usize, data: &[Vertex]) -> StatsRecord {
    let scale = grid::scale(size);
    let mut rec = StatsRecord::default();
    let (mut sum_s, mut sum_d, mut sum_r, mut sum_p) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);

    for ix in 0..size * size {
        let v = &data[ix];

        if v.flags & SLOPE != 0 {
            rec.n_s += 1;
            let mut excess = 0.0f32;
            for dir in 0..4 {
                let Some((ixx, ixy)) = quadrant_neighbours(size, ix, dir) else {
                    continue;
                };
                let sx = (data[ixx].h - v.h) / scale;
                let sy = (data[ixy].h - v.h) / scale;
                let g = sx.hypot(sy);
                if g > v.c[0] + S_THRESHOLD {
                    excess = excess.max(g - v.c[0]);
                }
            }
            if excess > 0.0 {
                rec.u_s += 1;
                sum_s += excess;
            } else {
                rec.s_s += 1;
            }
        }

        if v.flags & DIR_SLOPE != 0 {
            rec.n_d += 1;
            let cap = v.c[0].hypot(v.c[1]);
            let dx = v.c[0] / cap;
            let dy = v.c[1] / cap;
            let mut excess = 0.0f32;
            for dir in 0..4 {
                let Some((ixx, ixy)) = quadrant_neighbours(size, ix, dir) else {
                    continue;
                };
                let sx = (data[ixx].h - v.h) / scale;
                let sy = (data[ixy].h - v.h) / scale;
                let dd = (sx * dx + sy * dy).abs();
                if dd > cap + S_THRESHOLD {
                    excess = excess.max(dd - cap);
                }
            }
            if excess > 0.0 {
                rec.u_d += 1;
                sum_d += excess;
            } else {
                rec.s_d += 1;
            }
        }

        if v.flags & ROUGHNESS != 0 {
            rec.n_r += 1;
            let distance = (calc_roughness(size, data, ix, scale) - v.c[0]).abs();
            if distance <= R_THRESHOLD {
                rec.s_r += 1;
            } else {
                rec.u_r += 1;
                sum_r += distance;
            }
        }

        if v.flags & POSITION != 0 {
            rec.n_p += 1;
            if v.h == v.c[2] {
                rec.s_p += 1;
            } else {
                rec.u_p += 1;
                sum_p += (v.h - v.c[2]).abs();
            }
        }
    }

    if rec.u_s > 0 {
        rec.d_s = sum_s / rec.u_s as f32;
    }
    if rec.u_d > 0 {
        rec.d_d = sum_d / rec.u_d as f32;
    }
    if rec.u_r > 0 {
        rec.d_r = sum_r / rec.u_r as f32;
    }
    if rec.u_p > 0 {
        rec.d_p = sum_p / rec.u_p as f32;
    }

    rec
}

/// Maximum 1-D slope, not to confuse with the gradient.
pub fn max_slope_1d(size: usize, data: &[Vertex]) -> f32 {
    let mut m = 0.0f32;
    for c in 0..size - 1 {
        for r in 0..size - 1 {
            let h = data[grid::index(c, r, size)].h;
            let s1 = (data[grid::index(c, r + 1, size)].h - h).abs();
            let s2 = (data[grid::index(c + 1, r, size)].h - h).abs();
            m = m.max(s1).max(s2);
        }
    }
    m
}

/// Maximum magnitude of the gradient vector.
pub fn max_gradient(size: usize, data: &[Vertex]) -> f32 {
    let mut m = 0.0f32;
    for c in 0..size - 1 {
        for r in 0..size - 1 {
            let h = data[grid::index(c, r, size)].h;
            let sx = data[grid::index(c + 1, r, size)].h - h;
            let sy = data[grid::index(c, r + 1, size)].h - h;
            m = m.max(sx.hypot(sy));
        }
    }
    m
}

/// Total supplies in Earth Mover's Distance terms: the summed weight of all
/// suppliers/consumers, i.e. the terrain's volume.
pub fn total_supplies(data: &[Vertex]) -> f64 {
    data.iter().map(|v| v.h as f64).sum()
}

/// One full stats run: print the summary, append the JSON record.
pub fn step(size: usize, data: &[Vertex], path: Option<&Path>) -> Result<bool, TerrainError> {
    let rec = collect(size, data);

    output::progress("Terrain stats:");
    output::progress(&format!("  max slope 1D:   {}", max_slope_1d(size, data)));
    output::progress(&format!("  max gradient:   {}", max_gradient(size, data)));
    output::progress(&format!("  total supplies: {}", total_supplies(data)));
    output::progress(&format!(
        "  slope:     {}/{} satisfied, mean excess {}",
        rec.s_s, rec.n_s, rec.d_s
    ));
    output::progress(&format!(
        "  dir slope: {}/{} satisfied, mean excess {}",
        rec.s_d, rec.n_d, rec.d_d
    ));
    output::progress(&format!(
        "  roughness: {}/{} satisfied, mean distance {}",
        rec.s_r, rec.n_r, rec.d_r
    ));
    output::progress(&format!(
        "  position:  {}/{} satisfied, mean distance {}",
        rec.s_p, rec.n_p, rec.d_p
    ));

    if let Some(path) = path {
        // A stats line failing to land is not worth killing the run for.
        if let Err(e) = append_record(path, &rec) {
            output::report_error(&e.to_string());
        }
    }

    Ok(false)
}

fn append_record(path: &Path, rec: &StatsRecord) -> Result<(), TerrainError> {
    let json = serde_json::to_string(rec)
        .map_err(|e| TerrainError::InvalidInput(format!("stats record serialization: {e}")))?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{json}"))
        .map_err(|e| TerrainError::io(path, e))
}
