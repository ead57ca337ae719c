use bevy::{
    prelude::*,
    render::{
        mesh::{Indices, PrimitiveTopology},
        render_asset::RenderAssetUsages,
    },
};
use itertools::iproduct;

/// The number of quads per side of the patch mesh.
pub const PATCH_QUAD_COUNT: u32 = 16;

/// The meshes shared by all terrains.
///
/// The patch is instanced once per visible leaf node and the unit cube is used to
/// visualize node bounds. Both are created when the plugin finishes building and live
/// as long as the app.
#[derive(Clone, Resource)]
pub struct TerrainMeshes {
    pub patch: Handle<Mesh>,
    pub unit_cube: Handle<Mesh>,
}

impl TerrainMeshes {
    pub fn new(meshes: &mut Assets<Mesh>) -> Self {
        Self {
            patch: meshes.add(create_patch_mesh(PATCH_QUAD_COUNT)),
            unit_cube: meshes.add(create_unit_cube()),
        }
    }
}

impl FromWorld for TerrainMeshes {
    fn from_world(world: &mut World) -> Self {
        let mut meshes = world.resource_mut::<Assets<Mesh>>();
        Self::new(&mut meshes)
    }
}

/// Creates a unit sized plane in the xz plane, centered on the origin and facing up,
/// subdivided into `quad_count`x`quad_count` quads.
pub fn create_patch_mesh(quad_count: u32) -> Mesh {
    let vertex_count = quad_count + 1;
    let step = 1.0 / quad_count as f32;

    let (positions, uvs): (Vec<[f32; 3]>, Vec<[f32; 2]>) =
        iproduct!(0..vertex_count, 0..vertex_count)
            .map(|(z, x)| {
                let uv = [x as f32 * step, z as f32 * step];
                ([uv[0] - 0.5, 0.0, uv[1] - 0.5], uv)
            })
            .unzip();

    let normals = vec![[0.0, 1.0, 0.0]; positions.len()];

    let indices = iproduct!(0..quad_count, 0..quad_count)
        .flat_map(|(z, x)| {
            let index = z * vertex_count + x;
            let below = index + vertex_count;

            [index, below, index + 1, index + 1, below, below + 1]
        })
        .collect();

    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
        .with_inserted_indices(Indices::U32(indices))
}

/// Creates a cube with a side length of one, centered on the origin.
pub fn create_unit_cube() -> Mesh {
    Cuboid::from_length(1.0).into()
}
