use crate::{
    result::{TerrainError, TerrainResult},
    terrain_data::{
        mip_chain::{grid_image, validate_sources},
        node_count, GridFormat, NodeCoordinate, NodeId, NodeState, LOD_COUNT,
    },
};
use bevy::prelude::*;
use bytemuck::Pod;
use ndarray::Array2;
use std::mem::size_of;

/// A texel type that can be stored in a [`LeveledGrid`] texture.
pub trait GridTexel: Pod + Default {
    const FORMAT: GridFormat;
}

impl GridTexel for NodeState {
    const FORMAT: GridFormat = GridFormat::R16;
}

/// Per-node data of the whole quadtree, stored as one `node_count(lod)`² grid per lod.
///
/// Both the quadtree state and the min/max height bounds are leveled grids,
/// so they share the addressing and the texture packing logic.
#[derive(Clone, Debug, PartialEq)]
pub struct LeveledGrid<T> {
    levels: Vec<Array2<T>>,
}

impl<T: Clone> LeveledGrid<T> {
    pub fn from_elem(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }

    pub fn from_fn(mut f: impl FnMut(NodeCoordinate) -> T) -> Self {
        let levels = (0..LOD_COUNT)
            .map(|lod| {
                let node_count = node_count(lod).unwrap_or_default() as usize;

                Array2::from_shape_fn((node_count, node_count), |(row, col)| {
                    f(NodeCoordinate::new(lod, row as u32, col as u32))
                })
            })
            .collect();

        Self { levels }
    }

    pub fn level(&self, lod: u32) -> TerrainResult<&Array2<T>> {
        self.levels
            .get(lod as usize)
            .ok_or(TerrainError::InvalidLevel(lod))
    }

    pub fn level_mut(&mut self, lod: u32) -> TerrainResult<&mut Array2<T>> {
        self.levels
            .get_mut(lod as usize)
            .ok_or(TerrainError::InvalidLevel(lod))
    }

    pub fn get(&self, node: NodeCoordinate) -> TerrainResult<&T> {
        // encoding validates the coordinate
        node.id()?;
        Ok(&self.level(node.lod)?[[node.row as usize, node.col as usize]])
    }

    pub fn get_mut(&mut self, node: NodeCoordinate) -> TerrainResult<&mut T> {
        node.id()?;
        Ok(&mut self.level_mut(node.lod)?[[node.row as usize, node.col as usize]])
    }

    pub fn get_by_id(&self, id: NodeId) -> TerrainResult<&T> {
        self.get(NodeCoordinate::from_id(id)?)
    }

    pub fn set(&mut self, node: NodeCoordinate, value: T) -> TerrainResult<()> {
        *self.get_mut(node)? = value;
        Ok(())
    }
}

impl<T: GridTexel> Default for LeveledGrid<T> {
    fn default() -> Self {
        Self::from_elem(T::default())
    }
}

impl<T: GridTexel> LeveledGrid<T> {
    /// Converts the grid into its mip chain source set, one image per lod.
    pub fn source_images(&self) -> Vec<Image> {
        self.levels
            .iter()
            .map(|level| {
                let texels = level.iter().copied().collect::<Vec<T>>();
                let data = bytemuck::cast_slice::<T, u8>(&texels).to_vec();

                grid_image(level.nrows() as u32, 1, T::FORMAT, data)
            })
            .collect()
    }

    /// Reads a grid back from a source set of authored images.
    pub fn from_images(sources: &[&Image]) -> TerrainResult<Self> {
        validate_sources(sources, T::FORMAT)?;

        let levels = sources
            .iter()
            .enumerate()
            .map(|(lod, image)| {
                let node_count = node_count(lod as u32)? as usize;
                let texels = image
                    .data
                    .chunks_exact(size_of::<T>())
                    .map(bytemuck::pod_read_unaligned)
                    .collect();

                Array2::from_shape_vec((node_count, node_count), texels).map_err(|_| {
                    TerrainError::ResolutionMismatch {
                        level: lod as u32,
                        expected: node_count as u32,
                        found: (
                            image.texture_descriptor.size.width,
                            image.texture_descriptor.size.height,
                        ),
                    }
                })
            })
            .collect::<TerrainResult<Vec<_>>>()?;

        Ok(Self { levels })
    }
}
