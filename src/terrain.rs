//! Contains the terrain asset, which owns the configuration of a terrain and the GPU
//! resources derived from it.

use crate::{
    result::TerrainResult,
    terrain_data::{
        mip_chain::{pack_into_store, resolve_sources},
        node_count, GridFormat, GridStore, LeveledGrid, MinMaxPyramid, NodeCoordinate,
    },
};
use bevy::{asset::LoadState, prelude::*, render::primitives::Aabb};
use derive_more::derive::From;
use serde::{Deserialize, Serialize};

fn default_world_size() -> [f32; 3] {
    [10240.0, 2048.0, 10240.0]
}

/// The authored description of a terrain, loaded from `*.terrain.ron` files.
///
/// All paths are asset paths. The per-lod source images are ordered from the coarsest
/// (5x5 nodes) to the finest lod.
#[derive(Asset, TypePath, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainDescriptor {
    /// Width, height and depth of the terrain in world units.
    #[serde(default = "default_world_size")]
    pub world_size: [f32; 3],
    pub albedo_map: String,
    pub height_map: String,
    pub normal_map: String,
    pub min_max_height_maps: Vec<String>,
    pub quadtree_maps: Vec<String>,
}

impl TerrainDescriptor {
    pub fn from_ron(source: &str) -> TerrainResult<Self> {
        Ok(ron::from_str(source)?)
    }
}

/// The source textures of a terrain.
#[derive(Clone, Debug, Default)]
pub struct TerrainSources {
    pub albedo_map: Handle<Image>,
    pub height_map: Handle<Image>,
    pub normal_map: Handle<Image>,
    /// The two channel min/max height image of each lod.
    pub min_max_height_maps: Vec<Handle<Image>>,
    /// The single channel quadtree state image of each lod.
    pub quadtree_maps: Vec<Handle<Image>>,
}

/// A terrain, consisting of its immutable configuration and the GPU resources derived from it.
///
/// The derived resources are built on first access and cached afterwards.
/// Building them requires exclusive access to the asset, so the first access is serialized
/// by the borrow checker. The [`TerrainPlugin`](crate::TerrainPlugin) performs this first
/// access in a warm-up pass once all sources are loaded.
#[derive(Asset, TypePath, Debug)]
pub struct TerrainAsset {
    world_size: Vec3,
    sources: TerrainSources,
    quadtree_map: Option<Handle<Image>>,
    min_max_height_map: Option<Handle<Image>>,
    bounds_debug_material: Option<Handle<StandardMaterial>>,
}

impl TerrainAsset {
    pub fn new(world_size: Vec3, sources: TerrainSources) -> Self {
        Self {
            world_size,
            sources,
            quadtree_map: None,
            min_max_height_map: None,
            bounds_debug_material: None,
        }
    }

    /// Starts loading all source textures of the descriptor.
    pub fn from_descriptor(descriptor: &TerrainDescriptor, asset_server: &AssetServer) -> Self {
        let load_all = |paths: &[String]| -> Vec<Handle<Image>> {
            paths
                .iter()
                .map(|path| asset_server.load(path.clone()))
                .collect()
        };

        Self::new(
            Vec3::from(descriptor.world_size),
            TerrainSources {
                albedo_map: asset_server.load(descriptor.albedo_map.clone()),
                height_map: asset_server.load(descriptor.height_map.clone()),
                normal_map: asset_server.load(descriptor.normal_map.clone()),
                min_max_height_maps: load_all(&descriptor.min_max_height_maps),
                quadtree_maps: load_all(&descriptor.quadtree_maps),
            },
        )
    }

    pub fn world_size(&self) -> Vec3 {
        self.world_size
    }

    pub fn albedo_map(&self) -> &Handle<Image> {
        &self.sources.albedo_map
    }

    pub fn height_map(&self) -> &Handle<Image> {
        &self.sources.height_map
    }

    pub fn normal_map(&self) -> &Handle<Image> {
        &self.sources.normal_map
    }

    /// The per-lod images the derived textures are packed from.
    pub fn mip_chain_sources(&self) -> impl Iterator<Item = &Handle<Image>> {
        self.sources
            .min_max_height_maps
            .iter()
            .chain(&self.sources.quadtree_maps)
    }

    /// The horizontal size of a node of the lod in world units.
    pub fn lod_node_size(&self, lod: u32) -> TerrainResult<Vec2> {
        Ok(self.world_size.xz() / node_count(lod)? as f32)
    }

    /// The world space bounding box of a node, relative to the terrain origin.
    pub fn node_bounds(
        &self,
        node: NodeCoordinate,
        pyramid: &MinMaxPyramid,
    ) -> TerrainResult<Aabb> {
        pyramid.world_bounds(node, self.world_size)
    }

    /// Returns the packed quadtree state texture, building it on first access.
    pub fn quadtree_map(&mut self, store: &mut impl GridStore) -> TerrainResult<Handle<Image>> {
        if let Some(handle) = &self.quadtree_map {
            return Ok(handle.clone());
        }

        let handle = pack_into_store(
            store,
            &self.sources.quadtree_maps,
            GridFormat::R16,
            "quadtree",
        )?;
        self.quadtree_map = Some(handle.clone());

        Ok(handle)
    }

    /// Returns the packed min/max height texture, building it on first access.
    pub fn min_max_height_map(
        &mut self,
        store: &mut impl GridStore,
    ) -> TerrainResult<Handle<Image>> {
        if let Some(handle) = &self.min_max_height_map {
            return Ok(handle.clone());
        }

        let handle = pack_into_store(
            store,
            &self.sources.min_max_height_maps,
            GridFormat::Rg16,
            "min max height",
        )?;
        self.min_max_height_map = Some(handle.clone());

        Ok(handle)
    }

    /// Returns the material used to visualize node bounds, creating it on first access.
    pub fn bounds_debug_material(
        &mut self,
        materials: &mut Assets<StandardMaterial>,
    ) -> Handle<StandardMaterial> {
        self.bounds_debug_material
            .get_or_insert_with(|| {
                materials.add(StandardMaterial {
                    base_color: Color::srgba(0.1, 0.9, 0.3, 0.2),
                    unlit: true,
                    alpha_mode: AlphaMode::Blend,
                    cull_mode: None,
                    ..default()
                })
            })
            .clone()
    }

    /// Builds all derived resources.
    pub fn warm_up(
        &mut self,
        store: &mut impl GridStore,
        materials: &mut Assets<StandardMaterial>,
    ) -> TerrainResult<()> {
        self.quadtree_map(store)?;
        self.min_max_height_map(store)?;
        self.bounds_debug_material(materials);

        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.quadtree_map.is_some() && self.min_max_height_map.is_some()
    }

    /// Reads the authored min/max height images back into a CPU side pyramid.
    pub fn min_max_pyramid(&self, store: &impl GridStore) -> TerrainResult<MinMaxPyramid> {
        let sources = resolve_sources(
            store,
            &self.sources.min_max_height_maps,
            "min max height",
        )?;

        Ok(MinMaxPyramid::from_grid(LeveledGrid::from_images(&sources)?))
    }
}

/// Spawns a terrain from a descriptor once it is loaded.
#[derive(Component, Clone, Debug, Deref, From)]
pub struct TerrainSource(pub Handle<TerrainDescriptor>);

/// The terrain asset of an instantiated terrain entity.
#[derive(Component, Clone, Debug, Deref, From)]
#[require(Transform, Visibility)]
pub struct Terrain(pub Handle<TerrainAsset>);

/// Marks terrains whose derived resources could not be built.
#[derive(Component, Clone, Debug)]
pub struct TerrainBuildFailed;

pub(crate) fn instantiate_terrains(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    descriptors: Res<Assets<TerrainDescriptor>>,
    mut terrain_assets: ResMut<Assets<TerrainAsset>>,
    sources: Query<(Entity, &TerrainSource), Without<Terrain>>,
) {
    for (entity, source) in &sources {
        let Some(descriptor) = descriptors.get(&source.0) else {
            continue;
        };

        let terrain = TerrainAsset::from_descriptor(descriptor, &asset_server);

        info!(
            "instantiated terrain {entity} with a world size of {}",
            terrain.world_size()
        );

        commands
            .entity(entity)
            .insert(Terrain(terrain_assets.add(terrain)));
    }
}

pub(crate) fn warm_up_terrains(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    mut terrain_assets: ResMut<Assets<TerrainAsset>>,
    mut images: ResMut<Assets<Image>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    terrains: Query<(Entity, &Terrain), Without<TerrainBuildFailed>>,
) {
    for (entity, terrain) in &terrains {
        let Some(asset) = terrain_assets.get(&terrain.0) else {
            continue;
        };

        if asset.is_built() {
            continue;
        }

        let failed = asset
            .mip_chain_sources()
            .any(|handle| matches!(asset_server.load_state(handle.id()), LoadState::Failed(_)));

        if !failed && asset.mip_chain_sources().any(|handle| !images.contains(handle)) {
            // wait for the sources to finish loading
            continue;
        }

        // mutable access marks the asset as modified, so only take it to build
        let Some(asset) = terrain_assets.get_mut(&terrain.0) else {
            continue;
        };

        match asset.warm_up(&mut *images, &mut materials) {
            Ok(()) => info!("built the GPU resources of terrain {entity}"),
            Err(error) => {
                error!("failed to build the GPU resources of terrain {entity}: {error}");
                commands.entity(entity).insert(TerrainBuildFailed);
            }
        }
    }
}
