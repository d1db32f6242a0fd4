//! Tuning constants for path planning and relaxation.

/// Default patch width/height in vertices; 2^7+1, that's 128 tiles.
pub const DEF_PATCH_SIZE: usize = 129;

/// Maximum gradient magnitude painted inside the path tube.
pub const MAX_SLOPE: f32 = 0.0035;
/// Ascend of the maximum slope the farther you get from the path boundary.
pub const MAX_SLOPE_FALLOFF: f32 = 0.05;
/// Radius of the path tube, in default-patch ground units.
pub const PATH_RADIUS: f32 = 2.2;
/// Distance from the tube over which the gradient constraint keeps holding.
pub const PATH_INFLUENCE: f32 = 10.0;

/// Linear coefficient of the slope term in the A* edge cost.
pub const COST_LIN: f32 = 10000.0;
/// Exponent of the slope term in the A* edge cost.
pub const COST_POW: f32 = 1.8;

/// Convergence threshold of slope error.
pub const S_THRESHOLD: f32 = 0.00001;
/// Convergence threshold of roughness error.
pub const R_THRESHOLD: f32 = 0.04;
/// Iteration cap for any relaxation run.
pub const MAX_ITERATIONS: u32 = 100_000;
/// Inner passes per driver step.
pub const STEP_SIZE: u32 = 10;
/// Print a progress line every this many iterations.
pub const ITER_PRINT: u32 = 1000;

/// Cap used by the 1-D center-column relaxation.
pub const MAX_SLOPE_1D: f32 = 0.0025;

// Output files.
pub const OUT_FILE_L: &str = "terrain_out_l.json";
pub const OUT_FILE_H: &str = "terrain_out_h.json";
pub const OUT_FILE_FLAGS: &str = "terrain_out_f.json";
pub const OUT_FILE_CONSTRS: &str = "terrain_out_c.json";
pub const OUT_FILE_ITERS: &str = "iter_out.txt";
pub const OUT_FILE_STATS: &str = "stats_out.txt";
