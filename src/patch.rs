//! One square heightfield and its modifier queue.

use std::collections::VecDeque;

use crate::error::TerrainError;
use crate::generators::TerrainGenerator;
use crate::grid::Vertex;
use crate::modifiers::{flatten, output, relax, relax_slope_1d, stats, subdivide};
use crate::modifiers::{ModState, Modifier, NeighborBorders};

/// How the relaxation solver schedules its updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    /// Gauss–Seidel: in-place updates, each vertex sees the freshest values.
    Sequential,
    /// Jacobi: every pass reads a snapshot of the previous one.
    Parallel,
    /// Replay a previously dumped terrain instead of synthesizing one.
    FromFile,
}

/// A square, column-major heightfield plus the ordered modifiers that the
/// driver steps over it.
pub struct Patch {
    pub pos: (i32, i32, i32),
    pub size: usize,
    pub mode: SolveMode,
    pub data: Vec<Vertex>,
    mods: VecDeque<ModState>,
}

impl Patch {
    pub fn new(mode: SolveMode, size: usize, pos: (i32, i32, i32)) -> Result<Self, TerrainError> {
        if size < 2 {
            return Err(TerrainError::InvalidInput(format!(
                "patch size must be at least 2, got {size}"
            )));
        }
        let n = size * size;
        let mut data = Vec::new();
        data.try_reserve_exact(n)
            .map_err(|_| TerrainError::ResourceExhaustion("patch vertex array".into()))?;
        data.resize(n, Vertex::default());

        Ok(Patch {
            pos,
            size,
            mode,
            data,
            mods: VecDeque::new(),
        })
    }

    /// Runs the generator synchronously and enqueues the modifier list.
    pub fn populate(
        &mut self,
        generator: &mut dyn TerrainGenerator,
        mods: Vec<Modifier>,
    ) -> Result<(), TerrainError> {
        generator.generate(self.size, &mut self.data)?;
        self.mods = mods.into_iter().map(ModState::new).collect();
        Ok(())
    }

    /// Advances the first unfinished modifier by one bounded step.
    ///
    /// Returns whether anything mutated. A modifier that finishes during
    /// this call does not hand over to its successor until the next call. A
    /// fatal error finishes the modifier and propagates.
    pub fn update(&mut self, borders: &NeighborBorders) -> Result<bool, TerrainError> {
        let size = self.size;
        let mode = self.mode;
        let data = &mut self.data;

        let Some(state) = self.mods.iter_mut().find(|m| !m.done) else {
            return Ok(false);
        };
        let ModState {
            op,
            done,
            iterations,
            buffer,
        } = state;

        let result = match op {
            Modifier::Subdivide { params } => {
                subdivide::step(size, data, borders, params).map(|changed| {
                    *done = true;
                    changed
                })
            }
            Modifier::Flatten => {
                *done = true;
                Ok(flatten::step(size, data))
            }
            Modifier::RelaxSlope1d { max_slope } => {
                *done = true;
                Ok(relax_slope_1d::step(size, data, *max_slope))
            }
            Modifier::Relax {
                rescale,
                iters_file,
            } => relax::step(
                size,
                mode,
                data,
                *rescale,
                iters_file.as_deref(),
                done,
                iterations,
                buffer,
            ),
            Modifier::OutputHeights { path } => output::write_heights(size, data, path).map(|_| {
                *done = true;
                false
            }),
            Modifier::OutputFlags { path } => output::write_flags(size, data, path).map(|_| {
                *done = true;
                false
            }),
            Modifier::OutputConstraints { path } => {
                output::write_constraints(size, data, path).map(|_| {
                    *done = true;
                    false
                })
            }
            Modifier::Stats { path } => stats::step(size, data, path.as_deref()).map(|changed| {
                *done = true;
                changed
            }),
        };

        match result {
            Ok(changed) => Ok(changed),
            Err(e) => {
                // A fatal error terminates the affected modifier.
                *done = true;
                Err(e)
            }
        }
    }

    /// Whether every queued modifier has finished.
    pub fn is_done(&self) -> bool {
        self.mods.iter().all(|m| m.done)
    }

    /// Whether the next modifier to run wants the neighbour border snapshot.
    pub fn wants_borders(&self) -> bool {
        matches!(
            self.mods.iter().find(|m| !m.done),
            Some(ModState {
                op: Modifier::Subdivide { params },
                ..
            }) if params.use_border_stitch
        )
    }

    /// Iterations spent by the queued modifiers so far.
    pub fn total_iterations(&self) -> u32 {
        self.mods.iter().map(|m| m.iterations).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{MAX_SLOPE_1D, S_THRESHOLD};
    use crate::generators::{MpdGenerator, WhiteNoiseGenerator};
    use crate::grid::{self, POSITION, SLOPE};
    use crate::modifiers::SlopeRescale;

    fn borders() -> NeighborBorders {
        NeighborBorders::default()
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert!(matches!(
            Patch::new(SolveMode::Sequential, 1, (0, 0, 0)),
            Err(TerrainError::InvalidInput(_))
        ));
        let patch = Patch::new(SolveMode::Sequential, 2, (0, 0, 0)).unwrap();
        assert_eq!(patch.data.len(), 4);
    }

    #[test]
    fn modifiers_run_strictly_in_order() {
        let mut patch = Patch::new(SolveMode::Sequential, 5, (0, 0, 0)).unwrap();
        patch
            .populate(
                &mut WhiteNoiseGenerator::new(9),
                vec![Modifier::Flatten, Modifier::Stats { path: None }],
            )
            .unwrap();

        assert!(!patch.is_done());
        // First call steps Flatten only; Stats must wait for the next call
        // even though Flatten finished.
        patch.update(&borders()).unwrap();
        assert!(patch.mods[0].done);
        assert!(!patch.mods[1].done);

        patch.update(&borders()).unwrap();
        assert!(patch.is_done());

        // Further polls are no-ops.
        assert!(!patch.update(&borders()).unwrap());
        assert!(patch.is_done());
    }

    #[test]
    fn position_pins_hold_after_any_completed_update() {
        let mut patch = Patch::new(SolveMode::Parallel, 3, (0, 0, 0)).unwrap();
        patch
            .populate(
                &mut WhiteNoiseGenerator::new(2),
                vec![Modifier::Relax {
                    rescale: SlopeRescale::default(),
                    iters_file: None,
                }],
            )
            .unwrap();
        for v in patch.data.iter_mut() {
            v.flags = SLOPE;
            v.c[0] = 0.0;
        }
        let center = grid::index(1, 1, 3);
        patch.data[center].flags |= POSITION;
        patch.data[center].c[2] = 2.0;

        while !patch.is_done() {
            patch.update(&borders()).unwrap();
            assert_eq!(patch.data[center].h, 2.0);
        }
    }

    #[test]
    fn full_pipeline_runs_to_done_without_files() {
        let size = 9;
        let mut patch = Patch::new(SolveMode::Parallel, size, (0, 0, 0)).unwrap();
        patch
            .populate(
                &mut MpdGenerator::new(4),
                vec![
                    Modifier::Subdivide {
                        params: Default::default(),
                    },
                    Modifier::Relax {
                        rescale: SlopeRescale::default(),
                        iters_file: None,
                    },
                    Modifier::Stats { path: None },
                ],
            )
            .unwrap();

        let mut ticks = 0u32;
        while !patch.is_done() {
            patch.update(&borders()).unwrap();
            ticks += 1;
            assert!(ticks < 200_000, "pipeline never finished");
        }
        // The tube must exist and satisfy its cap.
        assert!(patch.data.iter().any(|v| v.flags & SLOPE != 0));
    }

    #[test]
    fn flattened_1d_pipeline_relaxes_the_center_column() {
        let size = 9;
        let mut patch = Patch::new(SolveMode::Sequential, size, (0, 0, 0)).unwrap();
        patch
            .populate(
                &mut MpdGenerator::new(8),
                vec![
                    Modifier::Flatten,
                    Modifier::RelaxSlope1d {
                        max_slope: MAX_SLOPE_1D,
                    },
                ],
            )
            .unwrap();

        while !patch.is_done() {
            patch.update(&borders()).unwrap();
        }

        let scale = grid::scale(size);
        let mid = size >> 1;
        for r in 0..size - 1 {
            let s = (patch.data[grid::index(mid, r + 1, size)].h
                - patch.data[grid::index(mid, r, size)].h)
                / scale;
            assert!(s.abs() <= MAX_SLOPE_1D + S_THRESHOLD, "slope {s} at row {r}");
        }
    }

    #[test]
    fn generator_failure_is_fatal_for_populate() {
        let mut patch = Patch::new(SolveMode::Sequential, 6, (0, 0, 0)).unwrap();
        let err = patch.populate(&mut MpdGenerator::new(1), Vec::new());
        assert!(matches!(err, Err(TerrainError::InvalidInput(_))));
    }
}
