use crate::{
    result::{TerrainError, TerrainResult},
    terrain_data::{node_count, GridFormat, GridTexel, LeveledGrid, NodeCoordinate, MAX_LOD},
};
use bevy::{
    prelude::*,
    render::{primitives::Aabb, render_resource::Extent3d},
};
use bytemuck::{Pod, Zeroable};
use itertools::iproduct;
use ndarray::Array2;

/// The normalized vertical extent of the terrain inside a node.
#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct MinMaxHeight {
    pub min: u16,
    pub max: u16,
}

impl GridTexel for MinMaxHeight {
    const FORMAT: GridFormat = GridFormat::Rg16;
}

impl MinMaxHeight {
    /// The identity of [`MinMaxHeight::union`].
    pub const EMPTY: Self = Self {
        min: u16::MAX,
        max: u16::MIN,
    };

    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.min <= other.min && self.max >= other.max
    }

    /// The bounds as fractions of the vertical world size.
    pub fn normalized(self) -> (f32, f32) {
        (
            self.min as f32 / u16::MAX as f32,
            self.max as f32 / u16::MAX as f32,
        )
    }
}

impl FromIterator<MinMaxHeight> for MinMaxHeight {
    fn from_iter<I: IntoIterator<Item = MinMaxHeight>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::union)
    }
}

/// The min/max height acceleration structure.
///
/// Every node stores the bounds of the heightmap texels inside of its footprint,
/// thus each node encloses the bounds of its four children.
#[derive(Clone, Debug, PartialEq)]
pub struct MinMaxPyramid {
    grid: LeveledGrid<MinMaxHeight>,
}

impl MinMaxPyramid {
    /// Wraps an authored grid without checking its bounds, see [`MinMaxPyramid::validate`].
    pub fn from_grid(grid: LeveledGrid<MinMaxHeight>) -> Self {
        Self { grid }
    }

    /// Builds the pyramid from the bounds of the finest lod, aggregating every coarser lod.
    pub fn from_leaves(leaves: Array2<MinMaxHeight>) -> TerrainResult<Self> {
        let leaf_count = node_count(MAX_LOD)? as usize;

        if leaves.dim() != (leaf_count, leaf_count) {
            return Err(TerrainError::ResolutionMismatch {
                level: MAX_LOD,
                expected: leaf_count as u32,
                found: (leaves.ncols() as u32, leaves.nrows() as u32),
            });
        }

        let mut grid = LeveledGrid::default();
        *grid.level_mut(MAX_LOD)? = leaves;

        for lod in (0..MAX_LOD).rev() {
            let (parents, children) = (grid.level(lod)?.dim(), grid.level(lod + 1)?);

            let level = Array2::from_shape_fn(parents, |(row, col)| {
                iproduct!(0..2, 0..2)
                    .map(|(dr, dc)| children[[(row << 1) + dr, (col << 1) + dc]])
                    .collect::<MinMaxHeight>()
            });

            *grid.level_mut(lod)? = level;
        }

        Ok(Self { grid })
    }

    /// Builds the pyramid from a square, row-major heightmap of normalized 16 bit heights.
    ///
    /// The far edge texel of each leaf footprint is shared with the neighbouring leaf,
    /// so that bilinear samples between two leaves stay inside both bounds.
    pub fn from_heightmap(heights: &[u16], size: u32) -> TerrainResult<Self> {
        let leaf_count = node_count(MAX_LOD)?;

        let texel_count = (size as usize).checked_mul(size as usize);

        if size < leaf_count || texel_count != Some(heights.len()) {
            return Err(TerrainError::ResolutionMismatch {
                level: MAX_LOD,
                expected: leaf_count,
                found: (size, heights.len() as u32 / size.max(1)),
            });
        }

        let footprint = |index: usize| {
            let start = index * size as usize / leaf_count as usize;
            let end = ((index + 1) * size as usize / leaf_count as usize).min(size as usize - 1);
            start..=end
        };

        let leaves = Array2::from_shape_fn(
            (leaf_count as usize, leaf_count as usize),
            |(row, col)| {
                iproduct!(footprint(row), footprint(col))
                    .map(|(y, x)| {
                        let height = heights[y * size as usize + x];
                        MinMaxHeight::new(height, height)
                    })
                    .collect()
            },
        );

        Self::from_leaves(leaves)
    }

    /// Builds the pyramid from a single channel 16 bit height image.
    pub fn from_height_image(image: &Image) -> TerrainResult<Self> {
        let texture_format = image.texture_descriptor.format;

        if GridFormat::from_texture_format(texture_format) != Some(GridFormat::R16) {
            return Err(TerrainError::FormatMismatch {
                level: MAX_LOD,
                expected: GridFormat::R16,
                found: format!("{texture_format:?}"),
            });
        }

        let Extent3d { width, height, .. } = image.texture_descriptor.size;

        if width != height {
            return Err(TerrainError::ResolutionMismatch {
                level: MAX_LOD,
                expected: node_count(MAX_LOD)?,
                found: (width, height),
            });
        }

        let heights = image
            .data
            .chunks_exact(2)
            .map(bytemuck::pod_read_unaligned)
            .collect::<Vec<u16>>();

        Self::from_heightmap(&heights, width)
    }

    pub fn grid(&self) -> &LeveledGrid<MinMaxHeight> {
        &self.grid
    }

    pub fn get(&self, node: NodeCoordinate) -> TerrainResult<MinMaxHeight> {
        self.grid.get(node).copied()
    }

    /// The world space bounding box of the node.
    pub fn world_bounds(&self, node: NodeCoordinate, world_size: Vec3) -> TerrainResult<Aabb> {
        node.world_bounds(world_size, self.get(node)?)
    }

    /// Checks that every node encloses the bounds of its four children.
    pub fn validate(&self) -> TerrainResult<()> {
        for lod in 0..MAX_LOD {
            for parent in NodeCoordinate::iter_lod(lod)? {
                let bounds = self.get(parent)?;

                for child in parent.children().into_iter().flatten() {
                    if !bounds.contains(self.get(child)?) {
                        return Err(TerrainError::BoundsViolation { parent, child });
                    }
                }
            }
        }

        Ok(())
    }

    /// The mip chain source set of the pyramid.
    pub fn source_images(&self) -> Vec<Image> {
        self.grid.source_images()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_data::{mip_chain::level_data, pack_mip_chain, LOD_COUNT};
    use bevy::render::render_resource::{TextureDimension, TextureFormat};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_heightmap(size: u32, seed: u64) -> Vec<u16> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..size * size).map(|_| rng.random()).collect()
    }

    #[test]
    fn union_of_children() {
        let children = [
            MinMaxHeight::new(10, 40),
            MinMaxHeight::new(20, 90),
            MinMaxHeight::new(5, 15),
            MinMaxHeight::new(30, 31),
        ];

        let parent = children.into_iter().collect::<MinMaxHeight>();

        assert_eq!(parent, MinMaxHeight::new(5, 90));
        assert!(children.iter().all(|&child| parent.contains(child)));
        assert_eq!(
            MinMaxHeight::EMPTY.union(MinMaxHeight::new(3, 4)),
            MinMaxHeight::new(3, 4)
        );
    }

    #[test]
    fn parents_are_exact_unions_of_children() {
        let mins = [10, 20, 5, 30];
        let leaves = Array2::from_shape_fn((160, 160), |(row, col)| {
            let min = mins[(row % 2) * 2 + col % 2];
            MinMaxHeight::new(min, 200 + (row + col) as u16)
        });

        let pyramid = MinMaxPyramid::from_leaves(leaves).unwrap();

        let parent = pyramid.get(NodeCoordinate::new(4, 0, 0)).unwrap();
        assert_eq!(parent, MinMaxHeight::new(5, 202));

        let root = pyramid.get(NodeCoordinate::new(0, 4, 4)).unwrap();
        let children = NodeCoordinate::new(0, 4, 4).children().unwrap();
        let union = children
            .into_iter()
            .map(|child| pyramid.get(child).unwrap())
            .collect::<MinMaxHeight>();

        assert_eq!(root, union);
        assert_eq!(pyramid.validate(), Ok(()));
    }

    #[test]
    fn heightmap_bounds_are_conservative() {
        let size = 640;
        let heights = random_heightmap(size, 7);
        let pyramid = MinMaxPyramid::from_heightmap(&heights, size).unwrap();

        assert_eq!(pyramid.validate(), Ok(()));

        let global = heights
            .iter()
            .map(|&height| MinMaxHeight::new(height, height))
            .collect::<MinMaxHeight>();

        let coarsest = NodeCoordinate::iter_lod(0)
            .unwrap()
            .map(|node| pyramid.get(node).unwrap())
            .collect::<MinMaxHeight>();

        assert_eq!(coarsest, global);

        // every texel of the leaf footprint, including the shared far edge, lies inside the bounds
        let leaf = pyramid.get(NodeCoordinate::new(MAX_LOD, 3, 9)).unwrap();
        for (y, x) in iproduct!(12..=16, 36..=40) {
            let height = heights[y * size as usize + x];
            assert!(leaf.min <= height && height <= leaf.max);
        }
    }

    #[test]
    fn single_spike_propagates_to_every_ancestor() {
        let size = 160;
        let mut heights = vec![1000; (size * size) as usize];
        heights[(37 * size + 101) as usize] = 60000;

        let pyramid = MinMaxPyramid::from_heightmap(&heights, size).unwrap();

        let mut node = Some(NodeCoordinate::new(MAX_LOD, 37, 101));
        while let Some(current) = node {
            assert_eq!(pyramid.get(current).unwrap().max, 60000);
            node = current.parent();
        }

        assert_eq!(
            pyramid.get(NodeCoordinate::new(MAX_LOD, 100, 10)),
            Ok(MinMaxHeight::new(1000, 1000))
        );
    }

    #[test]
    fn rejects_small_heightmaps() {
        assert!(matches!(
            MinMaxPyramid::from_heightmap(&[0; 100 * 100], 100),
            Err(TerrainError::ResolutionMismatch { .. })
        ));
        assert!(matches!(
            MinMaxPyramid::from_heightmap(&[0; 10], 160),
            Err(TerrainError::ResolutionMismatch { .. })
        ));
    }

    #[test]
    fn rejects_oversized_heightmap_dimensions() {
        assert!(matches!(
            MinMaxPyramid::from_heightmap(&[0; 10], 70_000),
            Err(TerrainError::ResolutionMismatch { .. })
        ));
        assert!(matches!(
            MinMaxPyramid::from_heightmap(&[0; 10], u32::MAX),
            Err(TerrainError::ResolutionMismatch { .. })
        ));
    }

    #[test]
    fn detects_bounds_violations() {
        let mut grid = LeveledGrid::from_elem(MinMaxHeight::new(100, 200));
        let child = NodeCoordinate::new(3, 6, 9);
        grid.set(child, MinMaxHeight::new(50, 150)).unwrap();

        let pyramid = MinMaxPyramid::from_grid(grid);

        assert_eq!(
            pyramid.validate(),
            Err(TerrainError::BoundsViolation {
                parent: NodeCoordinate::new(2, 3, 4),
                child,
            })
        );
    }

    #[test]
    fn from_height_image() {
        let size = 320;
        let heights = random_heightmap(size, 11);
        let mut image = Image::new_fill(
            Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            TextureDimension::D2,
            &[0, 0],
            TextureFormat::R16Uint,
            default(),
        );
        image.data = bytemuck::cast_slice(heights.as_slice()).to_vec();

        assert_eq!(
            MinMaxPyramid::from_height_image(&image),
            MinMaxPyramid::from_heightmap(&heights, size)
        );

        image.texture_descriptor.size.height = size / 2;
        assert_eq!(
            MinMaxPyramid::from_height_image(&image),
            Err(TerrainError::ResolutionMismatch {
                level: MAX_LOD,
                expected: 160,
                found: (size, size / 2),
            })
        );

        image.texture_descriptor.format = TextureFormat::R8Unorm;
        assert!(matches!(
            MinMaxPyramid::from_height_image(&image),
            Err(TerrainError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn packs_as_two_channel_mip_chain() {
        let heights = random_heightmap(160, 3);
        let pyramid = MinMaxPyramid::from_heightmap(&heights, 160).unwrap();
        let images = pyramid.source_images();
        let sources = images.iter().collect::<Vec<_>>();

        let packed = pack_mip_chain(&sources, GridFormat::Rg16).unwrap();

        assert_eq!(packed.texture_descriptor.mip_level_count, LOD_COUNT);

        let root = pyramid.get(NodeCoordinate::new(0, 2, 3)).unwrap();
        let level = level_data(&packed, 0).unwrap();
        let offset = (2 * 5 + 3) * 4;
        let packed_root =
            bytemuck::pod_read_unaligned::<MinMaxHeight>(&level[offset..offset + 4]);

        assert_eq!(packed_root, root);
    }

    #[test]
    fn world_bounds_use_height_range() {
        let pyramid = MinMaxPyramid::from_grid(LeveledGrid::from_elem(MinMaxHeight::new(
            0,
            u16::MAX / 2 + 1,
        )));
        let world_size = Vec3::new(10240.0, 2048.0, 10240.0);

        let bounds = pyramid
            .world_bounds(NodeCoordinate::new(MAX_LOD, 0, 0), world_size)
            .unwrap();

        assert!((bounds.max().y - 1024.0).abs() < 0.1);
        assert_eq!(bounds.min().x, -5120.0);
        assert_eq!(bounds.max().x, -5056.0);
    }
}
