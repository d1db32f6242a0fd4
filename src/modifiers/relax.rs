//! Iterative constraint relaxation.
//!
//! One pass sweeps every vertex and applies whichever of the four operators
//! its flags select. Under parallel (Jacobi) scheduling every operator reads
//! a snapshot of the previous pass and accumulates into the live field;
//! under sequential (Gauss–Seidel) scheduling it reads the live field
//! directly. The POSITION sweep runs last and separately; it is the only
//! place where material may be created or destroyed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::consts::{ITER_PRINT, MAX_ITERATIONS, R_THRESHOLD, STEP_SIZE, S_THRESHOLD};
use crate::error::TerrainError;
use crate::grid::{self, Vertex, DIR_SLOPE, POSITION, ROUGHNESS, SLOPE};
use crate::output;
use crate::patch::SolveMode;

/// How the slope operator splits the gradient cap over the two axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeRescale {
    /// Scale each axial slope by `cap / |gradient|`.
    #[default]
    GradientRatio,
    /// Scale the cap by `sqrt(s_axis^2 / (sx^2 + sy^2))` per axis.
    AxisShare,
}

/// Where a kernel reads the previous heights from.
enum Src<'a> {
    /// Jacobi: a read-only snapshot of the previous pass.
    Snapshot(&'a [Vertex]),
    /// Gauss–Seidel: the live output buffer itself.
    InPlace,
}

impl Src<'_> {
    fn buf<'s>(&'s self, out: &'s [Vertex]) -> &'s [Vertex] {
        match self {
            Src::Snapshot(buf) => buf,
            Src::InPlace => out,
        }
    }

    fn at(&self, out: &[Vertex], ix: usize) -> Vertex {
        self.buf(out)[ix]
    }
}

/// Moves a pair of vertices toward each other until their slope satisfies
/// the cap. The sum of the two heights is conserved.
pub(crate) fn move_slope(
    slope: f32,
    scale: f32,
    out: &mut [Vertex],
    i1: usize,
    i2: usize,
    max_slope: f32,
    weight: f32,
) {
    // a is the lowest point, b the highest.
    let (a, b) = if slope > 0.0 { (i1, i2) } else { (i2, i1) };
    let mv = (slope.abs() - max_slope) * scale * (0.5 * weight);
    out[a].h += mv;
    out[b].h -= mv;
}

/// The two orthogonal neighbours selected by quadrant `dir`; rotates the
/// pair clockwise around the vertex. None if either falls off the grid.
pub(crate) fn quadrant_neighbours(size: usize, ix: usize, dir: usize) -> Option<(usize, usize)> {
    let n = size as isize;
    let i = ix as isize;
    let ixx = i + match dir {
        0 => n,
        1 => -1,
        2 => -n,
        _ => 1,
    };
    let ixy = i + match dir {
        0 => 1,
        1 => n,
        2 => -1,
        _ => -n,
    };

    if ixx < 0 || ixx >= n * n || ixy < 0 || ixy >= n * n {
        return None;
    }
    // The row-stepping neighbour must stay on the vertex's column.
    let row_step = if dir == 0 || dir == 2 { ixy } else { ixx };
    if !grid::same_column(ix, row_step as usize, size) {
        return None;
    }
    Some((ixx as usize, ixy as usize))
}

/// Neighbour at offset `(c, r)` in the 8-neighbourhood, or None when it
/// falls off the grid or wraps across a column.
fn neighbour9(size: usize, ix: usize, c: isize, r: isize) -> Option<usize> {
    let n = size as isize;
    let ixx = ix as isize + c * n + r;
    if ixx < 0 || ixx >= n * n {
        return None;
    }
    let base = ix as isize + c * n;
    if base < 0 || base >= n * n {
        return None;
    }
    if !grid::same_column(base as usize, ixx as usize, size) {
        return None;
    }
    Some(ixx as usize)
}

/// Scale-invariant roughness: root of the summed squared slopes toward the
/// up-to-eight neighbours.
pub(crate) fn calc_roughness(size: usize, data: &[Vertex], ix: usize, scale: f32) -> f32 {
    let mut total = 0.0f32;
    for c in -1..=1 {
        for r in -1..=1 {
            if c == 0 && r == 0 {
                continue;
            }
            let Some(ixx) = neighbour9(size, ix, c, r) else {
                continue;
            };
            let s = (data[ixx].h - data[ix].h) / scale;
            total += s * s;
        }
    }
    total.sqrt()
}

/// Gradient-magnitude relaxation around one vertex.
fn relax_slope(
    size: usize,
    ix: usize,
    scale: f32,
    weight: f32,
    rescale: SlopeRescale,
    src: &Src,
    out: &mut [Vertex],
) -> bool {
    let mut done = true;

    for dir in 0..4 {
        let Some((ixx, ixy)) = quadrant_neighbours(size, ix, dir) else {
            continue;
        };

        let sx = (src.at(out, ixx).h - src.at(out, ix).h) / scale;
        let sy = (src.at(out, ixy).h - src.at(out, ix).h) / scale;
        let g = sx.hypot(sy);
        let cap = src.at(out, ix).c[0];

        // The threshold keeps floating point errors from oscillating forever.
        if g > cap + S_THRESHOLD {
            let (cap_x, cap_y) = match rescale {
                SlopeRescale::GradientRatio => {
                    let f = cap / g;
                    (sx.abs() * f, sy.abs() * f)
                }
                SlopeRescale::AxisShare => {
                    let s2 = sx * sx + sy * sy;
                    ((sx * sx / s2).sqrt() * cap, (sy * sy / s2).sqrt() * cap)
                }
            };
            move_slope(sx, scale, out, ix, ixx, cap_x, weight);
            move_slope(sy, scale, out, ix, ixy, cap_y, weight);
            done = false;
        }
    }

    done
}

/// Directional-derivative relaxation around one vertex. The target vector in
/// `c` caps the derivative along its own direction.
fn relax_dir_slope(
    size: usize,
    ix: usize,
    scale: f32,
    weight: f32,
    src: &Src,
    out: &mut [Vertex],
) -> bool {
    let mut done = true;

    for dir in 0..4 {
        let Some((ixx, ixy)) = quadrant_neighbours(size, ix, dir) else {
            continue;
        };

        let v = src.at(out, ix);
        let max_slope = v.c[0].hypot(v.c[1]);
        let dx = v.c[0] / max_slope;
        let dy = v.c[1] / max_slope;
        let sx = (src.at(out, ixx).h - v.h) / scale;
        let sy = (src.at(out, ixy).h - v.h) / scale;
        let dd = (sx * dx + sy * dy).abs();

        if dd > max_slope + S_THRESHOLD {
            let f = max_slope / dd;
            move_slope(sx, scale, out, ix, ixx, sx.abs() * f, weight);
            move_slope(sy, scale, out, ix, ixy, sy.abs() * f, weight);
            done = false;
        }
    }

    done
}

/// Roughness relaxation around one vertex: scales the neighbourhood's slopes
/// toward the target, then redistributes the summed supply change over all
/// nine cells so the total mass stays put.
fn relax_roughness(
    size: usize,
    ix: usize,
    scale: f32,
    weight: f32,
    src: &Src,
    out: &mut [Vertex],
) -> bool {
    let (current, target) = {
        let b = src.buf(out);
        (calc_roughness(size, b, ix, scale), b[ix].c[0])
    };
    // Without this threshold the whole landscape goes mad.
    if (current - target).abs() <= R_THRESHOLD {
        return true;
    }
    let factor = target / current;

    let mut moves = [0.0f32; 9];
    let mut d_supp = 0.0f32;
    {
        let b = src.buf(out);
        for c in -1..=1isize {
            for r in -1..=1isize {
                if c == 0 && r == 0 {
                    continue;
                }
                let Some(ixx) = neighbour9(size, ix, c, r) else {
                    continue;
                };
                // Proposed move as if the point were one unit away, so the
                // correction is scale invariant.
                let im = ((c + 1) * 3 + (r + 1)) as usize;
                let s = (b[ixx].h - b[ix].h) / scale;
                moves[im] = s * factor - s;
                d_supp += moves[im];
            }
        }
    }

    d_supp /= 9.0;
    for c in -1..=1isize {
        for r in -1..=1isize {
            let Some(ixx) = neighbour9(size, ix, c, r) else {
                continue;
            };
            let im = ((c + 1) * 3 + (r + 1)) as usize;
            let m = (moves[im] - d_supp) * scale;
            out[ixx].h += m * weight;
        }
    }

    false
}

/// One bounded solver step: up to `STEP_SIZE` passes over the whole field.
///
/// Marks the modifier done once a full pass changes nothing or the iteration
/// cap is reached; the latter is reported but still finishes the modifier.
#[allow(clippy::too_many_arguments)]
pub fn step(
    size: usize,
    mode: SolveMode,
    data: &mut [Vertex],
    rescale: SlopeRescale,
    iters_file: Option<&Path>,
    done: &mut bool,
    iterations: &mut u32,
    buffer: &mut Option<Vec<Vertex>>,
) -> Result<bool, TerrainError> {
    let scale = grid::scale(size);
    let n = size * size;
    let parallel = mode == SolveMode::Parallel;

    if parallel && buffer.is_none() {
        let mut buf = Vec::new();
        buf.try_reserve_exact(n)
            .map_err(|_| TerrainError::ResourceExhaustion("relaxation snapshot buffer".into()))?;
        buf.resize(n, Vertex::default());
        *buffer = Some(buf);
    }

    // Capture the roughness targets from the field as it is right now.
    if *iterations == 0 {
        for ix in 0..n {
            if data[ix].flags & ROUGHNESS != 0 {
                let r = calc_roughness(size, data, ix, scale);
                data[ix].c[0] = r;
            }
        }
    }

    // Under Jacobi scheduling every vertex is touched four times per
    // direction by each slope constraint and nine times by each roughness
    // constraint; a uniform reciprocal weight keeps superposition
    // mass-conserving.
    let weight = if parallel {
        if data.iter().any(|v| v.flags & ROUGHNESS != 0) {
            1.0 / 25.0
        } else {
            1.0 / 16.0
        }
    } else {
        1.0
    };

    let mut changed = false;
    let mut step_passes = 0;
    while step_passes < STEP_SIZE {
        step_passes += 1;
        *iterations += 1;

        if let Some(buf) = buffer.as_mut() {
            buf.copy_from_slice(data);
        }

        let pass_done = {
            let src = match buffer.as_deref() {
                Some(buf) if parallel => Src::Snapshot(buf),
                _ => Src::InPlace,
            };
            let mut pass_done = true;

            for ix in 0..n {
                let flags = src.at(data, ix).flags;
                if flags & SLOPE != 0 {
                    pass_done &= relax_slope(size, ix, scale, weight, rescale, &src, data);
                }
                if flags & DIR_SLOPE != 0 {
                    pass_done &= relax_dir_slope(size, ix, scale, weight, &src, data);
                }
                if flags & ROUGHNESS != 0 {
                    pass_done &= relax_roughness(size, ix, scale, weight, &src, data);
                }
            }

            // The position sweep runs last and separately; it overrides the
            // height completely and may create or destroy material.
            for ix in 0..n {
                let v = src.at(data, ix);
                if v.flags & POSITION != 0 {
                    pass_done &= data[ix].h == v.c[2];
                    data[ix].h = v.c[2];
                }
            }

            pass_done
        };

        if !pass_done {
            changed = true;
        }
        if *iterations % ITER_PRINT == 0 {
            output::progress(&format!("Relaxation running, {} iterations.", *iterations));
        }

        if pass_done || *iterations == MAX_ITERATIONS {
            if pass_done {
                output::progress(&format!("Relaxation took {} iterations.", *iterations));
            } else {
                output::report_error(
                    &TerrainError::Nonconvergence {
                        iterations: *iterations,
                    }
                    .to_string(),
                );
            }
            log_iterations(iters_file, *iterations);
            *buffer = None;
            *done = true;
            break;
        }
    }

    Ok(changed)
}

/// Appends the iteration count to the free-form iteration log. Failures are
/// reported and swallowed.
fn log_iterations(path: Option<&Path>, iterations: u32) {
    let Some(path) = path else {
        return;
    };
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "Relaxation took {iterations} iterations."));
    if let Err(e) = result {
        output::report_error(&TerrainError::io(path, e).to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{MpdGenerator, TerrainGenerator};

    fn relax_to_done(
        size: usize,
        mode: SolveMode,
        data: &mut [Vertex],
    ) -> u32 {
        let mut done = false;
        let mut iterations = 0;
        let mut buffer = None;
        while !done {
            step(
                size,
                mode,
                data,
                SlopeRescale::default(),
                None,
                &mut done,
                &mut iterations,
                &mut buffer,
            )
            .unwrap();
        }
        iterations
    }

    fn one_step(size: usize, mode: SolveMode, data: &mut [Vertex]) -> bool {
        let mut done = false;
        let mut iterations = 0;
        let mut buffer = None;
        step(
            size,
            mode,
            data,
            SlopeRescale::default(),
            None,
            &mut done,
            &mut iterations,
            &mut buffer,
        )
        .unwrap();
        done
    }

    fn total_mass(data: &[Vertex]) -> f64 {
        data.iter().map(|v| v.h as f64).sum()
    }

    fn max_slope_gradient(size: usize, data: &[Vertex]) -> f32 {
        let scale = grid::scale(size);
        let mut worst = 0.0f32;
        for ix in 0..size * size {
            if data[ix].flags & SLOPE == 0 {
                continue;
            }
            for dir in 0..4 {
                let Some((ixx, ixy)) = quadrant_neighbours(size, ix, dir) else {
                    continue;
                };
                let sx = (data[ixx].h - data[ix].h) / scale;
                let sy = (data[ixy].h - data[ix].h) / scale;
                worst = worst.max(sx.hypot(sy));
            }
        }
        worst
    }

    fn noisy_slope_field(size: usize, cap: f32) -> Vec<Vertex> {
        let mut data = vec![Vertex::default(); size * size];
        MpdGenerator::new(11).generate(size, &mut data).unwrap();
        for v in data.iter_mut() {
            v.flags = SLOPE;
            v.c[0] = cap;
        }
        data
    }

    #[test]
    fn mass_is_conserved_without_position_flags() {
        for mode in [SolveMode::Sequential, SolveMode::Parallel] {
            let size = 17;
            let mut data = noisy_slope_field(size, 0.001);
            let before = total_mass(&data);
            one_step(size, mode, &mut data);
            let after = total_mass(&data);
            let tolerance = 10.0 * f32::EPSILON as f64 * (size * size) as f64;
            assert!(
                (before - after).abs() <= tolerance,
                "{mode:?}: mass drifted from {before} to {after}"
            );
        }
    }

    #[test]
    fn mass_is_conserved_under_interior_roughness() {
        let size = 9;
        let mut data = vec![Vertex::default(); size * size];
        MpdGenerator::new(3).generate(size, &mut data).unwrap();
        for c in 1..size - 1 {
            for r in 1..size - 1 {
                data[grid::index(c, r, size)].flags = ROUGHNESS;
            }
        }

        // First step captures the targets from the untouched field and
        // converges immediately.
        let mut done = false;
        let mut iterations = 0;
        let mut buffer = None;
        step(
            size,
            SolveMode::Sequential,
            &mut data,
            SlopeRescale::default(),
            None,
            &mut done,
            &mut iterations,
            &mut buffer,
        )
        .unwrap();
        assert!(done);

        // Disturb the field so the measured roughness drifts off target,
        // then let the kernel chase it again.
        data[grid::index(4, 4, size)].h += 1.0;
        let before = total_mass(&data);
        let disturbed = data[grid::index(4, 4, size)].h;
        done = false;
        step(
            size,
            SolveMode::Sequential,
            &mut data,
            SlopeRescale::default(),
            None,
            &mut done,
            &mut iterations,
            &mut buffer,
        )
        .unwrap();
        let after = total_mass(&data);
        assert!((before - after).abs() <= 1e-3, "{before} vs {after}");
        // The kernel really did something.
        assert_ne!(data[grid::index(4, 4, size)].h, disturbed);
    }

    #[test]
    fn position_pin_dominates_and_pulls_neighbours() {
        let size = 3;
        let mut data = vec![Vertex::default(); size * size];
        for v in data.iter_mut() {
            v.flags = SLOPE;
            v.c[0] = 0.0;
        }
        let center = grid::index(1, 1, size);
        data[center].flags |= POSITION;
        data[center].c[2] = 2.0;

        one_step(size, SolveMode::Parallel, &mut data);

        assert_eq!(data[center].h, 2.0);
        for ix in 0..size * size {
            if ix != center {
                assert!(data[ix].h > 0.0, "vertex {ix} did not move");
            }
        }
    }

    #[test]
    fn slope_gradient_never_increases_across_passes() {
        let size = 9;
        let mut data = noisy_slope_field(size, 0.01);

        let mut done = false;
        let mut iterations = 0;
        let mut buffer = None;
        let mut previous = max_slope_gradient(size, &data);
        while !done && iterations < 500 {
            step(
                size,
                SolveMode::Sequential,
                &mut data,
                SlopeRescale::default(),
                None,
                &mut done,
                &mut iterations,
                &mut buffer,
            )
            .unwrap();
            let current = max_slope_gradient(size, &data);
            assert!(
                current <= previous + S_THRESHOLD,
                "gradient grew from {previous} to {current} at iteration {iterations}"
            );
            previous = current;
        }
    }

    #[test]
    fn converged_slope_field_satisfies_caps() {
        let size = 9;
        let cap = 0.01;
        for mode in [SolveMode::Sequential, SolveMode::Parallel] {
            let mut data = noisy_slope_field(size, cap);
            let iterations = relax_to_done(size, mode, &mut data);
            assert!(iterations < MAX_ITERATIONS, "{mode:?} hit the cap");
            let worst = max_slope_gradient(size, &data);
            assert!(
                worst <= cap + S_THRESHOLD,
                "{mode:?}: worst gradient {worst} above cap {cap}"
            );
        }
    }

    #[test]
    fn axis_share_rescale_also_converges() {
        let size = 9;
        let cap = 0.01;
        let mut data = noisy_slope_field(size, cap);
        let mut done = false;
        let mut iterations = 0;
        let mut buffer = None;
        while !done {
            step(
                size,
                SolveMode::Sequential,
                &mut data,
                SlopeRescale::AxisShare,
                None,
                &mut done,
                &mut iterations,
                &mut buffer,
            )
            .unwrap();
        }
        assert!(max_slope_gradient(size, &data) <= cap + S_THRESHOLD);
    }

    #[test]
    fn directional_cap_is_enforced() {
        let size = 5;
        let scale = grid::scale(size);
        let mut data = vec![Vertex::default(); size * size];
        // A steep ramp along the columns.
        for c in 0..size {
            for r in 0..size {
                data[grid::index(c, r, size)].h = c as f32 * scale * 0.5;
            }
        }
        // Cap the derivative along the column axis at 0.1 everywhere.
        for v in data.iter_mut() {
            v.flags = DIR_SLOPE;
            v.c[0] = 0.1;
            v.c[1] = 0.0;
        }

        relax_to_done(size, SolveMode::Sequential, &mut data);

        for ix in 0..size * size {
            for dir in 0..4 {
                let Some((ixx, ixy)) = quadrant_neighbours(size, ix, dir) else {
                    continue;
                };
                let sx = (data[ixx].h - data[ix].h) / scale;
                let sy = (data[ixy].h - data[ix].h) / scale;
                let dd = (sx * 1.0 + sy * 0.0).abs();
                assert!(dd <= 0.1 + S_THRESHOLD, "derivative {dd} at {ix}");
            }
        }
    }

    #[test]
    fn done_is_sticky_and_buffer_released() {
        let size = 5;
        let mut data = vec![Vertex::default(); size * size];
        // Nothing flagged: the first pass converges immediately.
        let mut done = false;
        let mut iterations = 0;
        let mut buffer = None;
        let changed = step(
            size,
            SolveMode::Parallel,
            &mut data,
            SlopeRescale::default(),
            None,
            &mut done,
            &mut iterations,
            &mut buffer,
        )
        .unwrap();
        assert!(done);
        assert!(!changed);
        assert_eq!(iterations, 1);
        assert!(buffer.is_none());
    }
}
