//! Contains a debug resource and systems controlling it to visualize the min/max height
//! bounds of the terrain nodes.

use crate::{
    meshes::TerrainMeshes,
    terrain::{Terrain, TerrainAsset, TerrainBuildFailed},
    terrain_data::{MinMaxPyramid, NodeCoordinate, LOD_COUNT},
};
use bevy::prelude::*;

#[derive(Clone, Debug, Resource)]
pub struct DebugTerrain {
    pub show_bounds: bool,
    /// The lod whose node bounds are drawn.
    pub bounds_lod: u32,
}

impl Default for DebugTerrain {
    fn default() -> Self {
        Self {
            show_bounds: false,
            bounds_lod: 0,
        }
    }
}

impl DebugTerrain {
    fn bounds_visibility(&self) -> Visibility {
        if self.show_bounds {
            Visibility::Visible
        } else {
            Visibility::Hidden
        }
    }
}

/// The CPU side min/max height pyramid of a built terrain.
#[derive(Component, Clone, Debug, Deref)]
pub struct TerrainBounds(pub MinMaxPyramid);

/// A cube visualizing the bounds of a single node, spawned as a child of its terrain.
#[derive(Component, Clone, Copy, Debug)]
pub struct NodeBoundsDebug(pub NodeCoordinate);

pub fn toggle_debug(input: Res<ButtonInput<KeyCode>>, mut debug: ResMut<DebugTerrain>) {
    if input.just_pressed(KeyCode::KeyB) {
        debug.show_bounds = !debug.show_bounds;
        let state = if debug.show_bounds { "on" } else { "off" };
        info!("Toggled the node bounds {state}.")
    }
    if input.just_pressed(KeyCode::KeyN) {
        debug.bounds_lod = (debug.bounds_lod + 1) % LOD_COUNT;
        let lod = debug.bounds_lod;
        info!("Showing the node bounds of lod {lod}.")
    }
}

pub(crate) fn insert_terrain_bounds(
    mut commands: Commands,
    terrain_assets: Res<Assets<TerrainAsset>>,
    images: Res<Assets<Image>>,
    terrains: Query<(Entity, &Terrain), (Without<TerrainBounds>, Without<TerrainBuildFailed>)>,
) {
    for (entity, terrain) in &terrains {
        let Some(asset) = terrain_assets.get(&terrain.0) else {
            continue;
        };

        if !asset.is_built() {
            continue;
        }

        match asset.min_max_pyramid(&*images) {
            Ok(pyramid) => {
                if let Err(error) = pyramid.validate() {
                    warn!("the min max height maps of terrain {entity} are not conservative: {error}");
                }

                commands.entity(entity).insert(TerrainBounds(pyramid));
            }
            Err(error) => {
                warn!("failed to read back the node bounds of terrain {entity}: {error}");
                commands.entity(entity).insert(TerrainBuildFailed);
            }
        }
    }
}

/// Spawns the bound cubes of the selected lod, replacing the ones of a previous lod.
pub(crate) fn spawn_bounds_debug(
    mut commands: Commands,
    debug: Res<DebugTerrain>,
    meshes: Res<TerrainMeshes>,
    mut terrain_assets: ResMut<Assets<TerrainAsset>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    terrains: Query<(Entity, &Terrain, Ref<TerrainBounds>)>,
    node_bounds: Query<(Entity, &NodeBoundsDebug, &Parent)>,
) {
    for (entity, terrain, bounds) in &terrains {
        if !bounds.is_added() && !debug.is_changed() {
            continue;
        }

        let spawned = node_bounds
            .iter()
            .filter(|(.., parent)| parent.get() == entity)
            .map(|(child, node, _)| (child, node.0))
            .collect::<Vec<_>>();

        if spawned.iter().any(|(_, node)| node.lod == debug.bounds_lod) {
            continue;
        }

        for (child, _) in spawned {
            commands.entity(child).despawn_recursive();
        }

        let Some(asset) = terrain_assets.get_mut(&terrain.0) else {
            continue;
        };

        let nodes = match NodeCoordinate::iter_lod(debug.bounds_lod) {
            Ok(nodes) => nodes,
            Err(error) => {
                warn!("cannot show the node bounds: {error}");
                continue;
            }
        };

        let material = asset.bounds_debug_material(&mut materials);
        let visibility = debug.bounds_visibility();

        commands.entity(entity).with_children(|parent| {
            for node in nodes {
                let Ok(aabb) = asset.node_bounds(node, &bounds) else {
                    continue;
                };

                parent.spawn((
                    NodeBoundsDebug(node),
                    Mesh3d(meshes.unit_cube.clone()),
                    MeshMaterial3d(material.clone()),
                    Transform::from_translation(aabb.center.into())
                        .with_scale((2.0 * aabb.half_extents).into()),
                    visibility,
                ));
            }
        });
    }
}

pub(crate) fn update_bounds_debug_visibility(
    debug: Res<DebugTerrain>,
    mut node_bounds: Query<&mut Visibility, With<NodeBoundsDebug>>,
) {
    if !debug.is_changed() {
        return;
    }

    let visibility = debug.bounds_visibility();

    for mut node_visibility in &mut node_bounds {
        node_visibility.set_if_neq(visibility);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        terrain::TerrainSources,
        terrain_data::{node_count, MinMaxHeight, MAX_LOD},
    };
    use bevy::ecs::system::RunSystemOnce;
    use ndarray::Array2;

    fn debug_world() -> (World, Entity) {
        let mut world = World::new();

        let mut meshes = Assets::<Mesh>::default();
        world.insert_resource(TerrainMeshes::new(&mut meshes));
        world.insert_resource(meshes);
        world.init_resource::<Assets<StandardMaterial>>();
        world.init_resource::<DebugTerrain>();

        let mut terrain_assets = Assets::<TerrainAsset>::default();
        let terrain = terrain_assets.add(TerrainAsset::new(
            Vec3::new(10240.0, 2048.0, 10240.0),
            TerrainSources::default(),
        ));
        world.insert_resource(terrain_assets);

        let leaf_count = node_count(MAX_LOD).unwrap() as usize;
        let pyramid = MinMaxPyramid::from_leaves(Array2::from_elem(
            (leaf_count, leaf_count),
            MinMaxHeight::new(0, u16::MAX),
        ))
        .unwrap();

        let entity = world
            .spawn((Terrain(terrain), TerrainBounds(pyramid)))
            .id();

        (world, entity)
    }

    fn spawned_lods(world: &mut World) -> Vec<u32> {
        world
            .query::<&NodeBoundsDebug>()
            .iter(world)
            .map(|node| node.0.lod)
            .collect()
    }

    #[test]
    fn toggle_bounds() {
        let mut world = World::new();
        world.init_resource::<DebugTerrain>();

        let mut input = ButtonInput::<KeyCode>::default();
        input.press(KeyCode::KeyB);
        input.press(KeyCode::KeyN);
        world.insert_resource(input);

        world.run_system_once(toggle_debug).unwrap();

        let debug = world.resource::<DebugTerrain>();
        assert!(debug.show_bounds);
        assert_eq!(debug.bounds_lod, 1);
    }

    #[test]
    fn bounds_follow_the_selected_lod() {
        let (mut world, _) = debug_world();

        world.run_system_once(spawn_bounds_debug).unwrap();
        assert_eq!(spawned_lods(&mut world), vec![0; 25]);

        world.resource_mut::<DebugTerrain>().bounds_lod = 1;
        world.run_system_once(spawn_bounds_debug).unwrap();
        assert_eq!(spawned_lods(&mut world), vec![1; 100]);
    }

    #[test]
    fn bound_cubes_cover_the_node_footprint() {
        let (mut world, _) = debug_world();

        world.run_system_once(spawn_bounds_debug).unwrap();

        let transforms = world
            .query::<(&NodeBoundsDebug, &Transform, &Visibility)>()
            .iter(&world)
            .map(|(node, transform, visibility)| (node.0, *transform, *visibility))
            .collect::<Vec<_>>();

        let (_, corner, visibility) = transforms
            .iter()
            .find(|(node, ..)| *node == NodeCoordinate::new(0, 0, 0))
            .unwrap();

        assert_eq!(*visibility, Visibility::Hidden);
        assert_eq!(corner.scale, Vec3::new(2048.0, 2048.0, 2048.0));
        assert_eq!(corner.translation, Vec3::new(-4096.0, 1024.0, -4096.0));
    }

    #[test]
    fn visibility_follows_the_toggle() {
        let (mut world, _) = debug_world();

        world.run_system_once(spawn_bounds_debug).unwrap();
        world.resource_mut::<DebugTerrain>().show_bounds = true;
        world.run_system_once(update_bounds_debug_visibility).unwrap();

        assert!(world
            .query::<&Visibility>()
            .iter(&world)
            .filter(|visibility| **visibility != Visibility::Inherited)
            .all(|visibility| *visibility == Visibility::Visible));
    }
}
