//! Where tile bytes come from.
//!
//! A [`TileSource`] only acquires bytes; it never looks at them. Decoding is
//! the same for every source.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};

use crate::{
    config::TileMetadata,
    error::{TileError, TileResult},
    resources::texture::load_binary,
};

/// File name of the optional sidecar next to the tiles.
pub const METADATA_FILE: &str = "metadata.json";

#[cfg(not(target_arch = "wasm32"))]
pub type SourceFuture<'a, T> = futures::future::BoxFuture<'a, anyhow::Result<T>>;
#[cfg(target_arch = "wasm32")]
pub type SourceFuture<'a, T> = futures::future::LocalBoxFuture<'a, anyhow::Result<T>>;

pub trait TileSource: Send + Sync {
    /// Number of tiles; indices run from `0` to `tile_count() - 1`.
    fn tile_count(&self) -> usize;

    /// Raw bytes of tile `index`.
    fn fetch(&self, index: usize) -> SourceFuture<'_, Vec<u8>>;

    /// The sidecar document, `Ok(None)` when the source has none.
    fn metadata(&self) -> SourceFuture<'_, Option<TileMetadata>>;
}

/// `<root>/0.<ext>`, `<root>/1.<ext>`, ... plus an optional `<root>/metadata.json`.
///
/// `root` is a directory on native targets and a path relative to the page
/// origin (or an absolute `http(s)` URL) on the web.
#[derive(Clone, Debug)]
pub struct FolderSource {
    root: PathBuf,
    extension: String,
    tile_count: usize,
}

impl FolderSource {
    pub fn new(root: impl Into<PathBuf>, tile_count: usize) -> Self {
        Self {
            root: root.into(),
            extension: "png".to_string(),
            tile_count,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Counts consecutive `<i>.<ext>` files starting at zero.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn discover(root: impl Into<PathBuf>, extension: &str) -> TileResult<Self> {
        let source = Self::new(root, 0).with_extension(extension);
        if !source.root.is_dir() {
            return Err(TileError::invalid_source(format!(
                "{} is not a directory",
                source.root.display()
            )));
        }
        let tile_count = (0..).take_while(|&i| source.tile_path(i).is_file()).count();
        if tile_count == 0 {
            return Err(TileError::invalid_source(format!(
                "no 0.{} in {}",
                source.extension,
                source.root.display()
            )));
        }
        log::debug!("Found {tile_count} tiles in {}", source.root.display());
        Ok(Self { tile_count, ..source })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("{index}.{}", self.extension))
    }

    fn location(path: &Path) -> anyhow::Result<String> {
        path.to_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("{} is not valid UTF-8", path.display()))
    }
}

impl TileSource for FolderSource {
    fn tile_count(&self) -> usize {
        self.tile_count
    }

    fn fetch(&self, index: usize) -> SourceFuture<'_, Vec<u8>> {
        Box::pin(async move {
            let location = Self::location(&self.tile_path(index))?;
            load_binary(&location).await
        })
    }

    fn metadata(&self) -> SourceFuture<'_, Option<TileMetadata>> {
        Box::pin(async move {
            let path = self.root.join(METADATA_FILE);
            #[cfg(not(target_arch = "wasm32"))]
            {
                if !path.is_file() {
                    return Ok(None);
                }
            }
            let bytes = match load_binary(&Self::location(&path)?).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::debug!("No tile metadata at {}: {e}", path.display());
                    return Ok(None);
                }
            };
            let metadata = TileMetadata::from_json_slice(&bytes)
                .with_context(|| format!("malformed {}", path.display()))?;
            Ok(Some(metadata))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileLocation {
    pub index: usize,
    /// `http(s)` URL or local path.
    pub url: String,
}

/// An explicit list of `{index, url}` pairs.
#[derive(Clone, Debug)]
pub struct UrlSource {
    /// Sorted by index, which is dense from zero.
    entries: Vec<TileLocation>,
    metadata_url: Option<String>,
}

impl UrlSource {
    /// Fails unless the indices are exactly `0..entries.len()` in any order.
    pub fn new(mut entries: Vec<TileLocation>) -> TileResult<Self> {
        if entries.is_empty() {
            return Err(TileError::invalid_source("empty tile list"));
        }
        entries.sort_by_key(|e| e.index);
        if let Some((expected, entry)) = entries.iter().enumerate().find(|(i, e)| e.index != *i) {
            return Err(TileError::invalid_source(format!(
                "tile indices must be dense from 0, expected {expected} but found {}",
                entry.index
            )));
        }
        Ok(Self {
            entries,
            metadata_url: None,
        })
    }

    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = Some(url.into());
        self
    }

    pub fn entries(&self) -> &[TileLocation] {
        &self.entries
    }
}

impl TileSource for UrlSource {
    fn tile_count(&self) -> usize {
        self.entries.len()
    }

    fn fetch(&self, index: usize) -> SourceFuture<'_, Vec<u8>> {
        Box::pin(async move {
            let entry = self
                .entries
                .get(index)
                .ok_or_else(|| anyhow!("no tile with index {index}"))?;
            load_binary(&entry.url).await
        })
    }

    fn metadata(&self) -> SourceFuture<'_, Option<TileMetadata>> {
        Box::pin(async move {
            let Some(url) = &self.metadata_url else {
                return Ok(None);
            };
            let bytes = load_binary(url).await?;
            Ok(Some(TileMetadata::from_json_slice(&bytes)?))
        })
    }
}

/// Byte buffers the host already holds, e.g. the entries of an unpacked archive.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    tiles: Vec<Vec<u8>>,
    metadata: Option<TileMetadata>,
}

impl MemorySource {
    pub fn new(tiles: Vec<Vec<u8>>) -> Self {
        Self {
            tiles,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: TileMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl TileSource for MemorySource {
    fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    fn fetch(&self, index: usize) -> SourceFuture<'_, Vec<u8>> {
        Box::pin(async move {
            self.tiles
                .get(index)
                .cloned()
                .ok_or_else(|| anyhow!("no tile with index {index}"))
        })
    }

    fn metadata(&self) -> SourceFuture<'_, Option<TileMetadata>> {
        Box::pin(async move { Ok(self.metadata.clone()) })
    }
}
