//! Byte acquisition and CPU-side decoding of texture tiles.
//!
//! A tile file is any image format the `image` crate reads, holding the
//! tile's layers as a vertical strip (layer 0 on top). Decoding produces a
//! [`DecodedTile`] whose pixel buffer is already in the layout the GPU upload
//! expects, so the render thread only has to copy it.

use anyhow::{Context as _, bail};
use image::GenericImageView;

use crate::config::TileMetadata;

/// A tile decoded to RGBA8, `layers` images of `width` x `height` stacked vertically.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedTile {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub rgba: Vec<u8>,
}

impl DecodedTile {
    pub fn layer_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Pixels of one layer.
    pub fn layer(&self, layer: u32) -> &[u8] {
        let size = self.layer_bytes();
        let start = layer.min(self.layers.saturating_sub(1)) as usize * size;
        &self.rgba[start..start + size]
    }
}

/// Decodes `bytes` into a layered tile.
///
/// The layer height comes from the sidecar's `tile_resolution`, then from its
/// `layers` count, and defaults to square layers.
pub fn decode_tile(
    index: usize,
    bytes: &[u8],
    metadata: Option<&TileMetadata>,
) -> anyhow::Result<DecodedTile> {
    if bytes.is_empty() {
        bail!("tile {index} is empty");
    }
    let img = image::load_from_memory(bytes)
        .with_context(|| format!("tile {index} is not a readable image"))?;
    let (width, height) = img.dimensions();

    let layer_height = match metadata {
        Some(TileMetadata {
            tile_resolution: Some([w, h]),
            ..
        }) => {
            if *w != width {
                log::warn!("Tile {index} is {width}px wide but metadata says {w}px.");
            }
            *h
        }
        Some(TileMetadata {
            layers: Some(layers),
            ..
        }) if *layers > 0 => height / layers,
        _ => width,
    };
    if layer_height == 0 || layer_height > height {
        bail!("tile {index}: layer height {layer_height} does not fit a {width}x{height} image");
    }
    if height % layer_height != 0 {
        log::warn!(
            "Tile {index}: {height}px is not a multiple of the {layer_height}px layer height, dropping the remainder."
        );
    }
    let layers = height / layer_height;

    let mut rgba = img.to_rgba8().into_raw();
    rgba.truncate(width as usize * layer_height as usize * layers as usize * 4);

    log::debug!("Decoded tile {index}: {width}x{layer_height} with {layers} layers");
    Ok(DecodedTile {
        index,
        width,
        height: layer_height,
        layers,
        rgba,
    })
}

/// Deterministic colour for the fallback of tile `index`: hues a golden angle apart.
pub fn fallback_colour(index: usize) -> [u8; 4] {
    let hue = (index as f32 * 137.507_77) % 360.0;
    let (s, v) = (0.55, 0.85);
    let c = v * s;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (hue / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_u8 = |f: f32| ((f + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    [to_u8(r), to_u8(g), to_u8(b), 255]
}

/// Flat-colour replacement for a tile that could not be decoded.
pub fn fallback_tile(index: usize, width: u32, height: u32, layers: u32) -> DecodedTile {
    let (width, height, layers) = (width.max(1), height.max(1), layers.max(1));
    let rgba = fallback_colour(index)
        .iter()
        .cycle()
        .take(width as usize * height as usize * layers as usize * 4)
        .copied()
        .collect();
    DecodedTile {
        index,
        width,
        height,
        layers,
        rgba,
    }
}

/// Decodes on a blocking worker when a tokio runtime is around, inline otherwise.
pub async fn decode_off_thread(
    index: usize,
    bytes: Vec<u8>,
    metadata: Option<TileMetadata>,
) -> anyhow::Result<DecodedTile> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            return handle
                .spawn_blocking(move || decode_tile(index, &bytes, metadata.as_ref()))
                .await
                .with_context(|| format!("decode worker for tile {index} panicked"))?;
        }
    }
    decode_tile(index, &bytes, metadata.as_ref())
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("no window")?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("page origin is unavailable"))?;
    let base = reqwest::Url::parse(&format!("{}/", origin))?;
    Ok(base.join(file_name)?)
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

async fn fetch_remote(url: &str) -> anyhow::Result<Vec<u8>> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// Reads `location`: a `http(s)` URL, or a path (relative to the page origin on wasm).
pub async fn load_binary(location: &str) -> anyhow::Result<Vec<u8>> {
    if is_remote(location) {
        return fetch_remote(location).await;
    }
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(location)?;
        fetch_remote(url.as_str()).await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = location.strip_prefix("file://").unwrap_or(location);
        std::fs::read(path).with_context(|| format!("could not read {path}"))?
    };

    Ok(data)
}
