use crate::{
    debug::{
        insert_terrain_bounds, spawn_bounds_debug, toggle_debug, update_bounds_debug_visibility,
        DebugTerrain,
    },
    meshes::TerrainMeshes,
    terrain::{instantiate_terrains, warm_up_terrains, TerrainAsset, TerrainDescriptor},
};
use bevy::prelude::*;
use bevy_common_assets::ron::RonAssetPlugin;

/// The plugin for the terrain data model.
///
/// Loads terrain descriptors, builds the GPU resources of every spawned terrain and
/// provides the shared meshes and the bounds visualization.
pub struct TerrainPlugin {
    /// The file extensions of terrain descriptors.
    pub descriptor_extensions: &'static [&'static str],
}

impl Default for TerrainPlugin {
    fn default() -> Self {
        Self {
            descriptor_extensions: &["terrain.ron"],
        }
    }
}

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<TerrainDescriptor>::new(
            self.descriptor_extensions,
        ))
        .init_asset::<TerrainAsset>()
        .init_resource::<DebugTerrain>()
        .add_systems(
            Update,
            (
                instantiate_terrains,
                warm_up_terrains.after(instantiate_terrains),
                insert_terrain_bounds.after(warm_up_terrains),
                toggle_debug,
                spawn_bounds_debug
                    .after(insert_terrain_bounds)
                    .after(toggle_debug),
                update_bounds_debug_visibility.after(spawn_bounds_debug),
            ),
        );
    }

    fn finish(&self, app: &mut App) {
        app.init_resource::<TerrainMeshes>();
    }
}
