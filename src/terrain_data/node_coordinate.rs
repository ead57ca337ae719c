use crate::{
    result::{TerrainError, TerrainResult},
    terrain_data::MinMaxHeight,
};
use bevy::{prelude::*, render::primitives::Aabb};
use bytemuck::{Pod, Zeroable};
use itertools::iproduct;
use std::{fmt, str::FromStr};

/// The flat identifier of a quadtree node.
///
/// Node ids index the concatenation of all lod grids, ordered by increasing lod,
/// each lod row-major. Per-node GPU buffers use this id as their index.
pub type NodeId = u32;

/// The index of the finest lod of the quadtree.
pub const MAX_LOD: u32 = 5;
/// The number of lods of the quadtree (5x5, 10x10, 20x20, 40x40, 80x80 and 160x160 nodes).
pub const LOD_COUNT: u32 = MAX_LOD + 1;
/// The number of nodes per axis of the coarsest lod.
pub const MAX_LOD_NODE_COUNT: u32 = 5;
/// The largest valid node id.
pub const MAX_NODE_ID: NodeId = 34124;

const NODE_COUNTS: [u32; LOD_COUNT as usize] = node_counts();
const LEVEL_OFFSETS: [NodeId; LOD_COUNT as usize + 1] = level_offsets();

const _: () = assert!(LEVEL_OFFSETS[LOD_COUNT as usize] == MAX_NODE_ID + 1);

const fn node_counts() -> [u32; LOD_COUNT as usize] {
    let mut counts = [0; LOD_COUNT as usize];
    let mut lod = 0;

    while lod < LOD_COUNT as usize {
        counts[lod] = MAX_LOD_NODE_COUNT << lod;
        lod += 1;
    }

    counts
}

const fn level_offsets() -> [NodeId; LOD_COUNT as usize + 1] {
    let counts = node_counts();
    let mut offsets = [0; LOD_COUNT as usize + 1];
    let mut lod = 0;

    while lod < LOD_COUNT as usize {
        offsets[lod + 1] = offsets[lod] + counts[lod] * counts[lod];
        lod += 1;
    }

    offsets
}

/// The number of nodes per axis of the `lod`.
#[inline]
pub fn node_count(lod: u32) -> TerrainResult<u32> {
    NODE_COUNTS
        .get(lod as usize)
        .copied()
        .ok_or(TerrainError::InvalidLevel(lod))
}

/// The id of the first node of the `lod`.
#[inline]
pub fn level_offset(lod: u32) -> TerrainResult<NodeId> {
    if lod > MAX_LOD {
        return Err(TerrainError::InvalidLevel(lod));
    }

    Ok(LEVEL_OFFSETS[lod as usize])
}

/// Calculates the unique id of the node at the specified position.
/// These ids are tightly packed (no gaps).
pub fn encode(lod: u32, row: u32, col: u32) -> TerrainResult<NodeId> {
    let node_count = node_count(lod)?;

    if row >= node_count || col >= node_count {
        return Err(TerrainError::OutOfBounds {
            lod,
            row,
            col,
            node_count,
        });
    }

    Ok(LEVEL_OFFSETS[lod as usize] + row * node_count + col)
}

/// Recovers the position of the node with the specified id.
pub fn decode(id: NodeId) -> TerrainResult<NodeCoordinate> {
    if id > MAX_NODE_ID {
        return Err(TerrainError::InvalidId(id));
    }

    // number of lods whose first id is at most `id`, minus the zero offset of lod 0
    let lod = LEVEL_OFFSETS[1..].partition_point(|&offset| offset <= id);
    let node_count = NODE_COUNTS[lod];
    let local = id - LEVEL_OFFSETS[lod];

    Ok(NodeCoordinate {
        lod: lod as u32,
        row: local / node_count,
        col: local % node_count,
    })
}

/// The position of a node inside the quadtree.
///
/// Lod 0 is the coarsest level. Rows run along the world z axis and columns along the x axis.
#[repr(C)]
#[derive(Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Pod, Zeroable)]
pub struct NodeCoordinate {
    pub lod: u32,
    pub row: u32,
    pub col: u32,
}

impl NodeCoordinate {
    pub fn new(lod: u32, row: u32, col: u32) -> Self {
        Self { lod, row, col }
    }

    #[inline]
    pub fn id(self) -> TerrainResult<NodeId> {
        encode(self.lod, self.row, self.col)
    }

    #[inline]
    pub fn from_id(id: NodeId) -> TerrainResult<Self> {
        decode(id)
    }

    pub fn parent(self) -> Option<Self> {
        (self.lod > 0).then(|| Self::new(self.lod - 1, self.row >> 1, self.col >> 1))
    }

    pub fn children(self) -> Option<[Self; 4]> {
        (self.lod < MAX_LOD).then(|| {
            [(0, 0), (0, 1), (1, 0), (1, 1)].map(|(dr, dc)| {
                Self::new(self.lod + 1, (self.row << 1) + dr, (self.col << 1) + dc)
            })
        })
    }

    /// Iterates over all nodes of the `lod` in id order.
    pub fn iter_lod(lod: u32) -> TerrainResult<impl Iterator<Item = Self>> {
        let node_count = node_count(lod)?;

        Ok(iproduct!(0..node_count, 0..node_count)
            .map(move |(row, col)| Self::new(lod, row, col)))
    }

    /// The horizontal footprint (x, z) of a node at this lod in world units.
    pub fn world_size(self, world_size: Vec3) -> TerrainResult<Vec2> {
        Ok(world_size.xz() / node_count(self.lod)? as f32)
    }

    /// The world space bounding box of the node, for a terrain centered on the origin.
    ///
    /// The normalized height bounds are scaled by the vertical world size.
    pub fn world_bounds(self, world_size: Vec3, height: MinMaxHeight) -> TerrainResult<Aabb> {
        let node_size = self.world_size(world_size)?;
        let corner =
            Vec2::new(self.col as f32, self.row as f32) * node_size - 0.5 * world_size.xz();
        let (min_height, max_height) = height.normalized();

        Ok(Aabb::from_min_max(
            Vec3::new(corner.x, min_height * world_size.y, corner.y),
            Vec3::new(
                corner.x + node_size.x,
                max_height * world_size.y,
                corner.y + node_size.y,
            ),
        ))
    }
}

impl fmt::Display for NodeCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}_{}_{}", self.lod, self.row, self.col)
    }
}

impl FromStr for NodeCoordinate {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '_').map(str::parse);
        let mut next = || parts.next().unwrap_or_else(|| "".parse());

        Ok(Self {
            lod: next()?,
            row: next()?,
            col: next()?,
        })
    }
}
