//! This crate provides the data model of a GPU-driven terrain renderer.
//!
//! # Background
//! A GPU-driven terrain renderer decides on the GPU which parts of the terrain to draw
//! and at which level of detail. For this the compute and render passes need
//! shared answers to three questions:
//!
//! ## How is a piece of the terrain addressed?
//! The terrain is subdivided into a fixed quadtree pyramid, whose coarsest level consists of
//! 5x5 nodes. Every node has a flat [`NodeId`](terrain_data::NodeId), which is used to
//! index per-node buffers from any pass.
//! See the [`terrain_data`] module for more information.
//!
//! ## Where does the geometry of a node lie?
//! Each node stores the minimum and maximum height of the heightmap inside of its footprint.
//! The resulting [`MinMaxPyramid`](terrain_data::MinMaxPyramid) is conservative, thus a
//! node that is culled using these bounds guarantees that its children are culled as well.
//!
//! ## How does the per-node data reach the GPU?
//! Per-node data of all levels is packed into a single texture with one mip level per lod.
//! The [`TerrainAsset`](terrain::TerrainAsset) builds these textures once on first access
//! and shares them with every pass.

pub mod debug;
pub mod meshes;
pub mod plugin;
pub mod result;
pub mod terrain;
pub mod terrain_data;

pub use crate::plugin::TerrainPlugin;

#[allow(missing_docs)]
pub mod prelude {
    #[doc(hidden)]
    pub use crate::{
        debug::{DebugTerrain, TerrainBounds},
        meshes::TerrainMeshes,
        result::{TerrainError, TerrainResult},
        terrain::{Terrain, TerrainAsset, TerrainDescriptor, TerrainSource},
        terrain_data::{
            GridFormat, LeveledGrid, MinMaxHeight, MinMaxPyramid, NodeCoordinate, NodeId,
        },
        TerrainPlugin,
    };
}
