//! This module contains the quadtree addressing scheme of the terrain and the two
//! acceleration structures derived from it: the quadtree state and the min/max height bounds.
//!
//! # Explanation
//! The terrain is subdivided into a fixed pyramid of [`LOD_COUNT`] node grids.
//! Each node is identified by a flat [`NodeId`], which every GPU pass uses to index its
//! per-node buffers.
//!
//! Per-node data lives in a [`LeveledGrid`], one regular grid per lod.
//! The [`mip_chain`] module packs such a grid (or authored images of the same shape)
//! into a single texture, with one mip level per lod.

use bevy::render::render_resource::TextureFormat;

pub mod leveled_grid;
pub mod min_max;
pub mod mip_chain;
pub mod node_coordinate;

pub use leveled_grid::{GridTexel, LeveledGrid};
pub use min_max::{MinMaxHeight, MinMaxPyramid};
pub use mip_chain::{mip_level, pack_mip_chain, GridStore};
pub use node_coordinate::{
    decode, encode, level_offset, node_count, NodeCoordinate, NodeId, LOD_COUNT, MAX_LOD,
    MAX_LOD_NODE_COUNT, MAX_NODE_ID,
};

/// The quadtree state of a node, written by the traversal kernels.
pub type NodeState = u16;

/// The texel layout of a leveled grid texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridFormat {
    /// One   channel  16 bit
    R16,
    /// Two   channels 16 bit
    Rg16,
}

impl GridFormat {
    /// The format of the packed texture.
    pub fn texture_format(self) -> TextureFormat {
        match self {
            GridFormat::R16 => TextureFormat::R16Unorm,
            GridFormat::Rg16 => TextureFormat::Rg16Unorm,
        }
    }

    pub fn pixel_size(self) -> usize {
        match self {
            GridFormat::R16 => 2,
            GridFormat::Rg16 => 4,
        }
    }

    pub fn from_texture_format(format: TextureFormat) -> Option<Self> {
        [GridFormat::R16, GridFormat::Rg16]
            .into_iter()
            .find(|grid_format| grid_format.accepts(format))
    }

    /// Whether source images of this format can be copied verbatim.
    /// Authored 16 bit images are imported as integer formats, which share the byte layout.
    pub fn accepts(self, format: TextureFormat) -> bool {
        match self {
            GridFormat::R16 => matches!(format, TextureFormat::R16Unorm | TextureFormat::R16Uint),
            GridFormat::Rg16 => {
                matches!(format, TextureFormat::Rg16Unorm | TextureFormat::Rg16Uint)
            }
        }
    }
}
