//! Headless patch arena: stable handles, the position index used to hook up
//! the 3x3 neighbour grid, and the per-tick driver loop.

use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::consts::{
    OUT_FILE_CONSTRS, OUT_FILE_FLAGS, OUT_FILE_H, OUT_FILE_ITERS, OUT_FILE_L, OUT_FILE_STATS,
};
use crate::error::TerrainError;
use crate::generators::{FileGenerator, MpdGenerator, TerrainGenerator};
use crate::grid;
use crate::modifiers::subdivide::CENTER_CELL;
use crate::modifiers::{Modifier, NeighborBorders, PathParams, SlopeRescale};
use crate::patch::{Patch, SolveMode};

/// Stable reference to a patch: arena slot plus a generation counter, so a
/// handle to a destroyed patch can never reach its successor in the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchHandle {
    index: usize,
    generation: u32,
}

struct Slot {
    generation: u32,
    patch: Option<Patch>,
}

pub struct Scene {
    slots: Vec<Slot>,
    by_pos: FxHashMap<(i32, i32), PatchHandle>,
    mode: SolveMode,
    patch_size: usize,
    seed: u64,
    spawned: u64,
    auto_surround: bool,
    out_dir: PathBuf,
    /// Replay generator shared by all patches, so successive patches read
    /// successive dump files.
    replay: Option<FileGenerator>,
}

impl Scene {
    pub fn new(mode: SolveMode, patch_size: usize, seed: u64) -> Self {
        Scene {
            slots: Vec::new(),
            by_pos: FxHashMap::default(),
            mode,
            patch_size,
            seed,
            spawned: 0,
            auto_surround: false,
            out_dir: PathBuf::from("."),
            replay: None,
        }
    }

    /// Surround every added patch with four unconstrained neighbours first.
    pub fn with_auto_surround(mut self, on: bool) -> Self {
        self.auto_surround = on;
        self
    }

    /// Directory the output modifiers write their dumps into.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    /// Adds a fully populated patch at a grid position: generator, the
    /// default modifier queue for the scene's mode, and neighbour hookup.
    pub fn add_patch(&mut self, pos: (i32, i32)) -> Result<PatchHandle, TerrainError> {
        if self.auto_surround {
            for (dx, dy) in [(0, -1), (-1, 0), (1, 0), (0, 1)] {
                let neighbour = (pos.0 + dx, pos.1 + dy);
                if !self.by_pos.contains_key(&neighbour) {
                    self.add_unconstrained_patch(neighbour)?;
                }
            }
        }

        let mods = self.default_mods();
        self.spawn(pos, mods)
    }

    /// Adds a bare generated patch with no modifiers; used as unconstrained
    /// surroundings for border stitching.
    pub fn add_unconstrained_patch(&mut self, pos: (i32, i32)) -> Result<PatchHandle, TerrainError> {
        self.spawn(pos, Vec::new())
    }

    fn spawn(&mut self, pos: (i32, i32), mods: Vec<Modifier>) -> Result<PatchHandle, TerrainError> {
        if self.mode == SolveMode::FromFile {
            let mut generator = self.replay.take().unwrap_or_else(|| {
                FileGenerator::with_files(
                    vec![
                        self.out_dir.join(OUT_FILE_L),
                        self.out_dir.join(OUT_FILE_H),
                    ],
                    Some(self.out_dir.join(OUT_FILE_FLAGS)),
                )
            });
            let result = self.insert_patch(pos, &mut generator, mods);
            self.replay = Some(generator);
            result
        } else {
            // Each patch gets its own random stream off the scene seed.
            self.spawned += 1;
            let mut generator = MpdGenerator::new(self.seed.wrapping_add(self.spawned - 1));
            self.insert_patch(pos, &mut generator, mods)
        }
    }

    fn default_mods(&self) -> Vec<Modifier> {
        match self.mode {
            SolveMode::FromFile => vec![Modifier::Stats {
                path: Some(self.out_dir.join(OUT_FILE_STATS)),
            }],
            _ => vec![
                Modifier::Subdivide {
                    params: PathParams::default(),
                },
                Modifier::OutputHeights {
                    path: self.out_dir.join(OUT_FILE_L),
                },
                Modifier::OutputFlags {
                    path: self.out_dir.join(OUT_FILE_FLAGS),
                },
                Modifier::OutputConstraints {
                    path: self.out_dir.join(OUT_FILE_CONSTRS),
                },
                Modifier::Relax {
                    rescale: SlopeRescale::default(),
                    iters_file: Some(self.out_dir.join(OUT_FILE_ITERS)),
                },
                Modifier::OutputHeights {
                    path: self.out_dir.join(OUT_FILE_H),
                },
                Modifier::Stats {
                    path: Some(self.out_dir.join(OUT_FILE_STATS)),
                },
            ],
        }
    }

    fn insert_patch(
        &mut self,
        pos: (i32, i32),
        generator: &mut dyn TerrainGenerator,
        mods: Vec<Modifier>,
    ) -> Result<PatchHandle, TerrainError> {
        if self.by_pos.contains_key(&pos) {
            return Err(TerrainError::InvalidInput(format!(
                "a patch already occupies ({}, {})",
                pos.0, pos.1
            )));
        }

        let mut patch = Patch::new(self.mode, self.patch_size, (pos.0, pos.1, 0))?;
        patch.populate(generator, mods)?;

        let index = match self.slots.iter().position(|s| s.patch.is_none()) {
            Some(free) => free,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    patch: None,
                });
                self.slots.len() - 1
            }
        };
        self.slots[index].patch = Some(patch);

        let handle = PatchHandle {
            index,
            generation: self.slots[index].generation,
        };
        self.by_pos.insert(pos, handle);
        Ok(handle)
    }

    pub fn get(&self, handle: PatchHandle) -> Option<&Patch> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.patch.as_ref()
    }

    /// Destroys a patch: buffers, snapshots and backing arrays go with it,
    /// and any in-flight modifier is aborted.
    pub fn remove_patch(&mut self, handle: PatchHandle) -> bool {
        let Some(patch) = self.get(handle) else {
            return false;
        };
        let pos = (patch.pos.0, patch.pos.1);
        self.by_pos.remove(&pos);
        let slot = &mut self.slots[handle.index];
        slot.patch = None;
        slot.generation += 1;
        true
    }

    /// Advances one patch by one bounded step.
    pub fn update(&mut self, handle: PatchHandle) -> Result<bool, TerrainError> {
        let Some(patch) = self.get(handle) else {
            return Err(TerrainError::InvalidInput("stale patch handle".into()));
        };

        // The subdivider gets a one-time snapshot of the neighbours' border
        // heights instead of live references.
        let borders = if patch.wants_borders() {
            self.gather_borders((patch.pos.0, patch.pos.1))
        } else {
            NeighborBorders::default()
        };

        let patch = self.slots[handle.index].patch.as_mut().unwrap();
        patch.update(&borders)
    }

    /// Advances every live patch by one step. Returns whether anything
    /// mutated anywhere.
    pub fn tick(&mut self) -> Result<bool, TerrainError> {
        let handles = self.handles();
        let mut changed = false;
        for handle in handles {
            changed |= self.update(handle)?;
        }
        Ok(changed)
    }

    pub fn handles(&self) -> Vec<PatchHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.patch.is_some())
            .map(|(index, s)| PatchHandle {
                index,
                generation: s.generation,
            })
            .collect()
    }

    pub fn all_done(&self) -> bool {
        self.slots
            .iter()
            .filter_map(|s| s.patch.as_ref())
            .all(Patch::is_done)
    }

    /// Snapshot of the mirrored border strips of every present neighbour in
    /// the column-major 3x3 grid around `pos`.
    fn gather_borders(&self, pos: (i32, i32)) -> NeighborBorders {
        let mut borders = NeighborBorders::default();
        for cell in 0..9 {
            if cell == CENTER_CELL {
                continue;
            }
            let dx = (cell / 3) as i32 - 1;
            let dy = (cell % 3) as i32 - 1;
            let Some(&handle) = self.by_pos.get(&(pos.0 + dx, pos.1 + dy)) else {
                continue;
            };
            let Some(neighbour) = self.get(handle) else {
                continue;
            };
            borders.cells[cell] = Some(border_strip(neighbour, dx, dy));
        }
        borders
    }
}

/// The neighbour-side heights of the vertices this patch shares with a
/// neighbour at offset `(dx, dy)`, in this patch's traversal order.
fn border_strip(neighbour: &Patch, dx: i32, dy: i32) -> Vec<f32> {
    let size = neighbour.size;
    let mc = if dx > 0 { 0 } else { size - 1 };
    let mr = if dy > 0 { 0 } else { size - 1 };

    match (dx, dy) {
        (0, _) => (0..size)
            .map(|c| neighbour.data[grid::index(c, mr, size)].h)
            .collect(),
        (_, 0) => (0..size)
            .map(|r| neighbour.data[grid::index(mc, r, size)].h)
            .collect(),
        _ => vec![neighbour.data[grid::index(mc, mr, size)].h],
    }
}
