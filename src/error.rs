use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while building or solving a patch.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("out of memory: {0}")]
    ResourceExhaustion(String),

    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The relaxation solver hit its iteration cap before reaching a fixed
    /// point. Reported, but the modifier still finishes and emits the
    /// current field.
    #[error("relaxation stopped after {iterations} iterations without converging")]
    Nonconvergence { iterations: u32 },
}

impl TerrainError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TerrainError::Io {
            path: path.into(),
            source,
        }
    }
}
