//! GPU array textures.
//!
//! This module provides [`ArrayTexture`], a wrapper around a layered WGPU
//! texture and its `D2Array` view, created from a [`DecodedTile`].

use crate::resources::texture::DecodedTile;

/// A tile resident on the GPU: one 2D texture with `layers` array layers.
#[derive(Debug)]
pub struct ArrayTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

impl ArrayTexture {
    /// Colour format of every tile. Tiles are authored in sRGB.
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Uploads a decoded tile into a new array texture.
    ///
    /// The decoded strip is already laid out layer after layer, so a single
    /// `write_texture` with `rows_per_image` set to the layer height fills
    /// every layer.
    pub fn from_decoded(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        tile: &DecodedTile,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: tile.width,
            height: tile.height,
            depth_or_array_layers: tile.layers,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &tile.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * tile.width),
                rows_per_image: Some(tile.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            array_layer_count: Some(tile.layers),
            ..Default::default()
        });

        Self {
            texture,
            view,
            width: tile.width,
            height: tile.height,
            layers: tile.layers,
        }
    }

    /// Frees the GPU memory right away instead of waiting for the last handle to drop.
    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

/// Sampler shared by all tiles. Clamped so the flow seam never bleeds.
pub fn create_tile_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("tile sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}
