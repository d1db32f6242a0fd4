//! Path planning and constraint painting.
//!
//! A* plans a traversable path across the heightfield, then a tube of SLOPE
//! constraints is painted along it. With the directional feature enabled, an
//! annulus around the tube receives DIR_SLOPE constraints whose cap grows
//! with the distance from the tube boundary. Border vertices shared with
//! neighbouring patches are pinned with POSITION constraints last.

use crate::consts;
use crate::error::TerrainError;
use crate::grid::{self, GridPos, Vertex, DIR_SLOPE, POSITION, ROUGHNESS, SLOPE};
use crate::heap::{MinHeap, NodeRecord};
use crate::modifiers::relax;
use crate::output;

/// Tuning of the planner and the painted constraints.
#[derive(Debug, Clone)]
pub struct PathParams {
    /// Gradient cap inside the path tube.
    pub max_slope: f32,
    /// Ascend of the cap along the annulus, per unit of normalized distance.
    pub max_slope_falloff: f32,
    /// Tube radius in default-patch ground units.
    pub path_radius: f32,
    /// Width of the directional annulus in default-patch ground units.
    pub path_influence: f32,
    /// Linear coefficient of the slope term in the edge cost.
    pub cost_lin: f32,
    /// Exponent of the slope term in the edge cost.
    pub cost_pow: f32,
    pub use_dir_slope: bool,
    pub use_roughness: bool,
    pub use_border_stitch: bool,
}

impl Default for PathParams {
    fn default() -> Self {
        PathParams {
            max_slope: consts::MAX_SLOPE,
            max_slope_falloff: consts::MAX_SLOPE_FALLOFF,
            path_radius: consts::PATH_RADIUS,
            path_influence: consts::PATH_INFLUENCE,
            cost_lin: consts::COST_LIN,
            cost_pow: consts::COST_POW,
            use_dir_slope: true,
            use_roughness: false,
            use_border_stitch: true,
        }
    }
}

/// Index of the patch itself in the column-major 3x3 neighbour grid.
pub const CENTER_CELL: usize = 4;

/// Border heights mirrored from the 3x3 neighbour grid, gathered by the
/// scene right before the subdivider runs. Column-major like the grid
/// itself; the center cell stays empty. Edge cells carry a full strip in
/// this patch's traversal order, corner cells a single height.
#[derive(Debug, Clone, Default)]
pub struct NeighborBorders {
    pub cells: [Option<Vec<f32>>; 9],
}

impl NeighborBorders {
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }
}

/// One full subdivide run: plan, paint, seed roughness, stitch.
pub fn step(
    size: usize,
    data: &mut [Vertex],
    borders: &NeighborBorders,
    params: &PathParams,
) -> Result<bool, TerrainError> {
    let start = GridPos::new(0, 0);
    let goal = GridPos::new(size - 1, size - 1);
    let path = find_path(size, data, start, goal, params)?;
    output::progress(&format!("Planned a path of {} nodes.", path.len()));

    paint_tube(size, data, &path, params);

    if params.use_roughness {
        seed_roughness(size, data);
    }
    if params.use_border_stitch && !borders.is_empty() {
        stitch_borders(size, data, borders);
    }

    Ok(true)
}

/// Euclidean ground distance between two nodes, in scaled units.
fn heuristic(from: GridPos, to: GridPos, scale: f32) -> f32 {
    let dc = from.c as f32 - to.c as f32;
    let dr = from.r as f32 - to.r as f32;
    dc.hypot(dr) * scale
}

const DIRS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// A* over the 8-connected grid.
///
/// The edge cost penalizes steepness: `dist * (1 + slope^p * k)`. Every node
/// is pushed to the heap at most once; later cost improvements are written
/// to the record table in place. Edges never get cheaper retroactively on
/// this grid, so popped entries are processed as-is.
pub fn find_path(
    size: usize,
    data: &[Vertex],
    start: GridPos,
    goal: GridPos,
    params: &PathParams,
) -> Result<Vec<GridPos>, TerrainError> {
    let scale = grid::scale(size);
    let n = size * size;

    let mut records = Vec::new();
    records
        .try_reserve_exact(n)
        .map_err(|_| TerrainError::ResourceExhaustion("path planner node table".into()))?;
    records.resize(n, NodeRecord::unreached(size));

    let six = start.index(size);
    records[six] = NodeRecord {
        prev: start,
        cost: 0.0,
        score: heuristic(start, goal, scale),
    };

    let mut heap = MinHeap::new();
    heap.push(six, &records);

    while let Some(ix) = heap.pop(&records) {
        let pos = GridPos::new(ix / size, ix % size);
        if pos == goal {
            // Walk backwards from the goal through the predecessors.
            let mut path = vec![goal];
            let mut cur = goal;
            while cur != start {
                cur = records[cur.index(size)].prev;
                path.push(cur);
            }
            path.reverse();
            return Ok(path);
        }

        for (dc, dr) in DIRS {
            let nc = pos.c as isize + dc;
            let nr = pos.r as isize + dr;
            if nc < 0 || nr < 0 || nc >= size as isize || nr >= size as isize {
                continue;
            }
            let npos = GridPos::new(nc as usize, nr as usize);
            let nix = npos.index(size);

            let dist = ((dc * dc + dr * dr) as f32).sqrt() * scale;
            let slope = (data[nix].h - data[ix].h).abs() / dist;
            let cost =
                records[ix].cost + dist * (1.0 + slope.powf(params.cost_pow) * params.cost_lin);

            if cost < records[nix].cost {
                let first_visit = !records[nix].reached(size);
                records[nix].prev = pos;
                records[nix].cost = cost;
                records[nix].score = cost + heuristic(npos, goal, scale);
                if first_visit {
                    heap.push(nix, &records);
                }
            }
        }
    }

    // Finite edge weights make every node reachable; an empty heap here
    // means pathological input.
    Err(TerrainError::InvalidInput(format!(
        "no path from ({},{}) to ({},{})",
        start.c, start.r, goal.c, goal.r
    )))
}

/// Closest point of the axis-aligned ellipse `(x/rx)^2 + (y/ry)^2 = 1` to a
/// query point, by the usual three-round fixed-point iteration on the
/// first-quadrant parameter.
fn ellipse_closest_point(rx: f32, ry: f32, px: f32, py: f32) -> (f32, f32) {
    let sx = px.abs();
    let sy = py.abs();
    let mut tx = std::f32::consts::FRAC_1_SQRT_2;
    let mut ty = std::f32::consts::FRAC_1_SQRT_2;

    for _ in 0..3 {
        let x = rx * tx;
        let y = ry * ty;

        let ex = (rx * rx - ry * ry) * tx.powi(3) / rx;
        let ey = (ry * ry - rx * rx) * ty.powi(3) / ry;

        let qx = sx - ex;
        let qy = sy - ey;
        let rlen = (x - ex).hypot(y - ey);
        let qlen = qx.hypot(qy);
        if qlen == 0.0 {
            break;
        }

        tx = ((qx * rlen / qlen + ex) / rx).clamp(0.0, 1.0);
        ty = ((qy * rlen / qlen + ey) / ry).clamp(0.0, 1.0);
        let tlen = tx.hypot(ty);
        tx /= tlen;
        ty /= tlen;
    }

    ((rx * tx).copysign(px), (ry * ty).copysign(py))
}

/// Paints the constraint tube along the planned path.
///
/// The walkable disks are painted for the whole path first, the directional
/// annuli second; annulus painting never touches SLOPE vertices and keeps
/// the smallest magnitude where annuli overlap.
fn paint_tube(size: usize, data: &mut [Vertex], path: &[GridPos], params: &PathParams) {
    let scale = grid::scale(size);
    let radius = params.path_radius / scale;
    let influence = params.path_influence / scale;

    for node in path {
        paint_disk(size, data, *node, radius, params.max_slope);
    }
    if params.use_dir_slope {
        for node in path {
            paint_annulus(size, data, *node, radius, influence, params);
        }
    }
}

/// Clamped bounding box of an ellipse centered on `node`.
fn bounding_box(size: usize, node: GridPos, radius: f32) -> (usize, usize, usize, usize) {
    let reach = radius.ceil() as usize;
    let c0 = node.c.saturating_sub(reach);
    let r0 = node.r.saturating_sub(reach);
    let c1 = (node.c + reach).min(size - 1);
    let r1 = (node.r + reach).min(size - 1);
    (c0, r0, c1, r1)
}

fn paint_disk(size: usize, data: &mut [Vertex], node: GridPos, radius: f32, max_slope: f32) {
    let (c0, r0, c1, r1) = bounding_box(size, node, radius);
    for cc in c0..=c1 {
        for rr in r0..=r1 {
            let dc = cc as f32 - node.c as f32;
            let dr = rr as f32 - node.r as f32;
            if (dc * dc + dr * dr) / (radius * radius) > 1.0 {
                continue;
            }
            let v = &mut data[grid::index(cc, rr, size)];
            if v.flags & SLOPE == 0 {
                v.flags |= SLOPE;
                v.c[0] = max_slope;
            }
        }
    }
}

fn paint_annulus(
    size: usize,
    data: &mut [Vertex],
    node: GridPos,
    radius: f32,
    influence: f32,
    params: &PathParams,
) {
    let outer = radius + influence;
    let (c0, r0, c1, r1) = bounding_box(size, node, outer);

    for cc in c0..=c1 {
        for rr in r0..=r1 {
            let dc = cc as f32 - node.c as f32;
            let dr = rr as f32 - node.r as f32;
            let q2 = dc * dc + dr * dr;
            if q2 / (outer * outer) > 1.0 || q2 / (radius * radius) <= 1.0 {
                continue;
            }

            let v = &mut data[grid::index(cc, rr, size)];
            if v.flags & SLOPE != 0 {
                continue;
            }

            // Direction from the tube boundary to this vertex; its length is
            // the distance into the annulus.
            let (ex, er) = ellipse_closest_point(radius, radius, dc, dr);
            let ox = dc - ex;
            let oy = dr - er;
            let dist = ox.hypot(oy);
            if dist == 0.0 {
                continue;
            }

            let t = (dist / influence).clamp(0.0, 1.0);
            let magnitude = params.max_slope + params.max_slope_falloff * t.sqrt();

            // The smallest cap from any overlapping annulus wins.
            if v.flags & DIR_SLOPE != 0 && v.c[0].hypot(v.c[1]) <= magnitude {
                continue;
            }

            v.flags |= DIR_SLOPE;
            v.c[0] = ox / dist * magnitude;
            v.c[1] = oy / dist * magnitude;
        }
    }
}

/// Binds the landscape's current natural roughness as the per-vertex target,
/// so relaxation preserves texture away from the tube and borders. Tube
/// vertices are skipped; their gradient caps already occupy `c[0]`.
fn seed_roughness(size: usize, data: &mut [Vertex]) {
    let scale = grid::scale(size);
    for ix in 0..size * size {
        if data[ix].flags & (SLOPE | DIR_SLOPE) != 0 {
            continue;
        }
        let r = relax::calc_roughness(size, data, ix, scale);
        let v = &mut data[ix];
        v.flags |= ROUGHNESS;
        v.c[0] = r;
    }
}

/// Pins the vertices shared with present neighbours to the neighbour's
/// mirrored heights. Flags are OR-combined with whatever painting left.
fn stitch_borders(size: usize, data: &mut [Vertex], borders: &NeighborBorders) {
    for cell in 0..9 {
        if cell == CENTER_CELL {
            continue;
        }
        let Some(strip) = &borders.cells[cell] else {
            continue;
        };
        let dx = (cell / 3) as i32 - 1;
        let dy = (cell % 3) as i32 - 1;

        let oc = if dx < 0 { 0 } else { size - 1 };
        let or = if dy < 0 { 0 } else { size - 1 };

        match (dx, dy) {
            (0, _) => {
                for (c, &h) in strip.iter().enumerate().take(size) {
                    pin(&mut data[grid::index(c, or, size)], h);
                }
            }
            (_, 0) => {
                for (r, &h) in strip.iter().enumerate().take(size) {
                    pin(&mut data[grid::index(oc, r, size)], h);
                }
            }
            _ => {
                if let Some(&h) = strip.first() {
                    pin(&mut data[grid::index(oc, or, size)], h);
                }
            }
        }
    }
}

fn pin(v: &mut Vertex, h: f32) {
    v.flags |= POSITION;
    v.c[2] = h;
}
