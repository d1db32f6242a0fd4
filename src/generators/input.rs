use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::consts::{OUT_FILE_FLAGS, OUT_FILE_H, OUT_FILE_L};
use crate::error::TerrainError;
use crate::generators::TerrainGenerator;
use crate::grid::{self, Vertex};
use crate::output;

/// Replays previously written terrain files.
///
/// Each call to `generate` consumes the next height matrix in `files`, so a
/// scene that adds several replay patches walks through the dumps in order.
/// The flags matrix is read alongside so constrained regions stay visible.
pub struct FileGenerator {
    files: Vec<PathBuf>,
    flags_file: Option<PathBuf>,
    next: usize,
}

impl FileGenerator {
    /// Replays the standard dump sequence: the pre-relax heights first, then
    /// the relaxed ones.
    pub fn new() -> Self {
        FileGenerator {
            files: vec![PathBuf::from(OUT_FILE_L), PathBuf::from(OUT_FILE_H)],
            flags_file: Some(PathBuf::from(OUT_FILE_FLAGS)),
            next: 0,
        }
    }

    pub fn with_files(files: Vec<PathBuf>, flags_file: Option<PathBuf>) -> Self {
        FileGenerator {
            files,
            flags_file,
            next: 0,
        }
    }
}

impl Default for FileGenerator {
    fn default() -> Self {
        FileGenerator::new()
    }
}

fn read_matrix<T: serde::de::DeserializeOwned>(
    path: &Path,
    size: usize,
) -> Result<Vec<Vec<T>>, TerrainError> {
    let file = File::open(path).map_err(|e| TerrainError::io(path, e))?;
    let matrix: Vec<Vec<T>> = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        TerrainError::InvalidInput(format!("malformed terrain matrix in {}: {e}", path.display()))
    })?;

    if matrix.len() != size || matrix.iter().any(|col| col.len() != size) {
        return Err(TerrainError::InvalidInput(format!(
            "terrain matrix in {} is not {size}x{size}",
            path.display()
        )));
    }
    Ok(matrix)
}

impl TerrainGenerator for FileGenerator {
    fn generate(&mut self, size: usize, data: &mut [Vertex]) -> Result<(), TerrainError> {
        let Some(path) = self.files.get(self.next).cloned() else {
            return Err(TerrainError::InvalidInput(
                "no more known terrain files to read".into(),
            ));
        };

        let heights: Vec<Vec<f32>> = read_matrix(&path, size)?;
        for (c, col) in heights.iter().enumerate() {
            for (r, &h) in col.iter().enumerate() {
                data[grid::index(c, r, size)].h = h;
            }
        }

        if let Some(flags_path) = &self.flags_file {
            let flags: Vec<Vec<u32>> = read_matrix(flags_path, size)?;
            for (c, col) in flags.iter().enumerate() {
                for (r, &f) in col.iter().enumerate() {
                    data[grid::index(c, r, size)].flags = f;
                }
            }
        }

        output::progress(&format!("Terrain has been read from file: {}", path.display()));
        self.next += 1;
        Ok(())
    }
}
