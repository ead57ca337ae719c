//! Packs per-lod images into a single mip mapped texture.
//!
//! The mip levels of these textures do not form a visual downsample chain.
//! Each one stores the discrete per-node data of one quadtree lod, so the images are
//! copied verbatim and sampled without any filtering.
//! GPU mip chains shrink with each level, thus the finest lod is stored in mip 0
//! and lod `i` in mip [`mip_level`]`(i)`.

use crate::{
    result::{TerrainError, TerrainResult},
    terrain_data::{node_count, GridFormat, LOD_COUNT, MAX_LOD},
};
use bevy::{
    image::{ImageFilterMode, ImageSampler, ImageSamplerDescriptor},
    prelude::*,
    render::render_resource::*,
};

/// Storage for the textures of the terrain, usually the [`Assets<Image>`] collection.
pub trait GridStore {
    /// Returns the source image behind the handle, if it is available.
    fn source(&self, handle: &Handle<Image>) -> Option<&Image>;

    /// Takes ownership of a packed texture and returns its handle.
    fn allocate(&mut self, image: Image) -> Handle<Image>;
}

impl GridStore for Assets<Image> {
    fn source(&self, handle: &Handle<Image>) -> Option<&Image> {
        self.get(handle)
    }

    fn allocate(&mut self, image: Image) -> Handle<Image> {
        self.add(image)
    }
}

/// The mip level that stores the lod.
#[inline]
pub fn mip_level(lod: u32) -> TerrainResult<u32> {
    node_count(lod)?;
    Ok(MAX_LOD - lod)
}

pub(crate) fn grid_image(
    size: u32,
    mip_level_count: u32,
    format: GridFormat,
    data: Vec<u8>,
) -> Image {
    Image {
        data,
        texture_descriptor: TextureDescriptor {
            label: None,
            size: Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: format.texture_format(),
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        },
        sampler: ImageSampler::Descriptor(ImageSamplerDescriptor {
            mag_filter: ImageFilterMode::Nearest,
            min_filter: ImageFilterMode::Nearest,
            mipmap_filter: ImageFilterMode::Nearest,
            ..default()
        }),
        ..default()
    }
}

/// Checks that the sources form a complete mip chain source set of the format.
pub(crate) fn validate_sources(sources: &[&Image], format: GridFormat) -> TerrainResult<()> {
    if sources.len() != LOD_COUNT as usize {
        return Err(TerrainError::LevelCountMismatch {
            expected: LOD_COUNT as usize,
            found: sources.len(),
        });
    }

    for (lod, image) in (0..).zip(sources) {
        let expected = node_count(lod)?;
        let Extent3d { width, height, .. } = image.texture_descriptor.size;

        if width != expected || height != expected {
            return Err(TerrainError::ResolutionMismatch {
                level: lod,
                expected,
                found: (width, height),
            });
        }

        let texture_format = image.texture_descriptor.format;

        if !format.accepts(texture_format) {
            return Err(TerrainError::FormatMismatch {
                level: lod,
                expected: format,
                found: format!("{texture_format:?}"),
            });
        }

        let data_size = (expected * expected) as usize * format.pixel_size();

        if image.data.len() != data_size {
            return Err(TerrainError::FormatMismatch {
                level: lod,
                expected: format,
                found: format!("{} bytes instead of {data_size}", image.data.len()),
            });
        }
    }

    Ok(())
}

/// Packs the per-lod source images (ordered by lod) into a single mip mapped texture.
///
/// Every source is validated before the texture is assembled.
pub fn pack_mip_chain(sources: &[&Image], format: GridFormat) -> TerrainResult<Image> {
    validate_sources(sources, format)?;

    let data = (0..LOD_COUNT)
        .rev()
        .flat_map(|lod| sources[lod as usize].data.iter().copied())
        .collect();

    Ok(grid_image(
        node_count(MAX_LOD)?,
        LOD_COUNT,
        format,
        data,
    ))
}

/// Looks up the per-lod source images of the handles.
pub(crate) fn resolve_sources<'a>(
    store: &'a impl GridStore,
    sources: &[Handle<Image>],
    name: &'static str,
) -> TerrainResult<Vec<&'a Image>> {
    (0..)
        .zip(sources)
        .map(|(level, handle)| {
            store
                .source(handle)
                .ok_or(TerrainError::MissingSource { name, level })
        })
        .collect()
}

/// Resolves the source handles in the store, packs them and stores the resulting texture.
pub(crate) fn pack_into_store(
    store: &mut impl GridStore,
    sources: &[Handle<Image>],
    format: GridFormat,
    name: &'static str,
) -> TerrainResult<Handle<Image>> {
    let image = pack_mip_chain(&resolve_sources(store, sources, name)?, format)?;

    debug!(
        "packed the {name} map ({:?}, {} bytes)",
        format,
        image.data.len()
    );

    Ok(store.allocate(image))
}

/// Returns the verbatim data of the lod inside a packed texture.
pub fn level_data(image: &Image, lod: u32) -> TerrainResult<&[u8]> {
    let mip = mip_level(lod)?;
    let texture_format = image.texture_descriptor.format;
    let pixel_size = GridFormat::from_texture_format(texture_format)
        .ok_or_else(|| TerrainError::FormatMismatch {
            level: lod,
            expected: GridFormat::R16,
            found: format!("{texture_format:?}"),
        })?
        .pixel_size();
    let base_size = image.texture_descriptor.size.width as usize;

    let mip_size = |mip: u32| (base_size >> mip).pow(2) * pixel_size;
    let start = (0..mip).map(mip_size).sum::<usize>();
    let end = start + mip_size(mip);

    image.data.get(start..end).ok_or(TerrainError::ResolutionMismatch {
        level: lod,
        expected: node_count(lod)?,
        found: (
            image.texture_descriptor.size.width >> mip,
            image.texture_descriptor.size.height >> mip,
        ),
    })
}
