use crate::terrain_data::{GridFormat, NodeCoordinate};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TerrainError {
    #[error("lod {0} is outside of the quadtree")]
    InvalidLevel(u32),
    #[error("node ({row}, {col}) is outside of lod {lod} with {node_count} nodes per axis")]
    OutOfBounds {
        lod: u32,
        row: u32,
        col: u32,
        node_count: u32,
    },
    #[error("node id {0} is larger than the maximum node id")]
    InvalidId(u32),
    #[error("expected {expected} mip chain levels, found {found}")]
    LevelCountMismatch { expected: usize, found: usize },
    #[error("level {level} has to be {expected}x{expected} texels, found {}x{}", found.0, found.1)]
    ResolutionMismatch {
        level: u32,
        expected: u32,
        found: (u32, u32),
    },
    #[error("level {level} does not match the {expected:?} grid format ({found})")]
    FormatMismatch {
        level: u32,
        expected: GridFormat,
        found: String,
    },
    #[error("source image of level {level} for the {name} map is not available")]
    MissingSource { name: &'static str, level: u32 },
    #[error("bounds of node {parent} do not enclose the bounds of its child {child}")]
    BoundsViolation {
        parent: NodeCoordinate,
        child: NodeCoordinate,
    },
    #[error("invalid terrain descriptor: {0}")]
    Descriptor(#[from] ron::error::SpannedError),
}

pub type TerrainResult<T> = Result<T, TerrainError>;
