//! Terrain dumps: JSON arrays of columns, one file per quantity. The
//! column-major layout means the first inner array is the first column of
//! the terrain.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::TerrainError;
use crate::grid::Vertex;
use crate::output;

fn write_matrix<T: Serialize>(path: &Path, matrix: &[Vec<T>]) -> Result<(), TerrainError> {
    let file = File::create(path).map_err(|e| TerrainError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, matrix).map_err(|e| TerrainError::io(path, e.into()))?;
    writer.flush().map_err(|e| TerrainError::io(path, e))?;

    output::progress(&format!(
        "Terrain has been written to file: {}",
        path.display()
    ));
    Ok(())
}

fn columns<T>(size: usize, data: &[Vertex], f: impl Fn(&Vertex) -> T) -> Vec<Vec<T>> {
    (0..size)
        .map(|c| data[c * size..(c + 1) * size].iter().map(&f).collect())
        .collect()
}

pub fn write_heights(size: usize, data: &[Vertex], path: &Path) -> Result<(), TerrainError> {
    write_matrix(path, &columns(size, data, |v| v.h))
}

pub fn write_flags(size: usize, data: &[Vertex], path: &Path) -> Result<(), TerrainError> {
    write_matrix(path, &columns(size, data, |v| v.flags))
}

pub fn write_constraints(size: usize, data: &[Vertex], path: &Path) -> Result<(), TerrainError> {
    write_matrix(path, &columns(size, data, |v| v.c))
}
