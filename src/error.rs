//! Error type shared by the heightfield core.

use thiserror::Error;

/// Failures surfaced by terrain construction, editing and persistence.
///
/// Degenerate edits (zero brush, zero height delta) are not errors; they are
/// silent no-ops and never produce one of these.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("invalid grid: side length {side_length}, cell size {cell_size}")]
    InvalidGrid { side_length: i32, cell_size: i32 },

    #[error("heightmap {width}x{height} needs {expected} samples, got {actual}")]
    InvalidHeightmap {
        width: i32,
        height: i32,
        expected: usize,
        actual: usize,
    },

    #[error("texture table is full ({capacity} slots)")]
    TextureLimit { capacity: usize },

    #[error("texture reference '{0}' could not be resolved")]
    UnresolvedTexture(String),

    #[error("snapshot holds {actual} values, expected {expected}")]
    SnapshotLength { expected: usize, actual: usize },

    #[error("malformed terrain data: {0}")]
    Format(String),

    #[error("terrain stream i/o failed")]
    Io(#[from] std::io::Error),

    #[error("invalid terrain configuration: {0}")]
    Config(String),
}

pub type TerrainResult<T> = Result<T, TerrainError>;

impl From<toml::de::Error> for TerrainError {
    fn from(err: toml::de::Error) -> Self {
        TerrainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TerrainError {
    fn from(err: toml::ser::Error) -> Self {
        TerrainError::Config(err.to_string())
    }
}
