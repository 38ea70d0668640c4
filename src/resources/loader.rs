//! Fetching and decoding a whole tile set.
//!
//! Every tile is an independent task that ends in a [`TileOutcome`]; the
//! tasks are awaited together and a failing tile never cancels the others.
//! The result is a [`DecodedBatch`]: CPU-side pixels ready for upload, in
//! index order, with failed tiles already replaced by fallbacks.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::{channel::mpsc::UnboundedSender, future::join_all};

use crate::{
    config::TileMetadata,
    error::{TileError, TileResult},
    resources::{
        source::TileSource,
        texture::{DecodedTile, decode_off_thread, fallback_tile},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadStage {
    Fetch,
    Decode,
    Upload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadProgress {
    pub stage: LoadStage,
    /// Tiles through this stage so far, including failed ones.
    pub current: usize,
    pub total: usize,
}

pub type ProgressSender = UnboundedSender<LoadProgress>;

pub(crate) struct ProgressReporter<'a> {
    sender: Option<&'a ProgressSender>,
    total: usize,
    fetched: AtomicUsize,
    decoded: AtomicUsize,
    uploaded: AtomicUsize,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sender: Option<&'a ProgressSender>, total: usize) -> Self {
        Self {
            sender,
            total,
            fetched: AtomicUsize::new(0),
            decoded: AtomicUsize::new(0),
            uploaded: AtomicUsize::new(0),
        }
    }

    pub(crate) fn report(&self, stage: LoadStage) {
        let counter = match stage {
            LoadStage::Fetch => &self.fetched,
            LoadStage::Decode => &self.decoded,
            LoadStage::Upload => &self.uploaded,
        };
        let current = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(sender) = self.sender {
            // A dropped receiver only means nobody is watching.
            let _ = sender.unbounded_send(LoadProgress {
                stage,
                current,
                total: self.total,
            });
        }
    }
}

/// Result of one tile task.
#[derive(Clone, Debug, PartialEq)]
pub enum TileOutcome {
    Decoded(DecodedTile),
    Fallback { index: usize, reason: String },
}

impl TileOutcome {
    pub fn index(&self) -> usize {
        match self {
            TileOutcome::Decoded(tile) => tile.index,
            TileOutcome::Fallback { index, .. } => *index,
        }
    }
}

async fn decode_one(
    source: &dyn TileSource,
    index: usize,
    metadata: Option<TileMetadata>,
    progress: &ProgressReporter<'_>,
) -> TileOutcome {
    let fetched = source.fetch(index).await;
    progress.report(LoadStage::Fetch);
    let bytes = match fetched {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Tile {index} could not be fetched, using a fallback: {e:#}");
            progress.report(LoadStage::Decode);
            return TileOutcome::Fallback {
                index,
                reason: format!("{e:#}"),
            };
        }
    };

    let decoded = decode_off_thread(index, bytes, metadata).await;
    progress.report(LoadStage::Decode);
    match decoded {
        Ok(tile) => TileOutcome::Decoded(tile),
        Err(e) => {
            log::warn!("Tile {index} could not be decoded, using a fallback: {e:#}");
            TileOutcome::Fallback {
                index,
                reason: format!("{e:#}"),
            }
        }
    }
}

/// Fetches and decodes every tile of `source` concurrently. The outcomes are in index order.
pub async fn decode_tiles(
    source: &dyn TileSource,
    metadata: Option<&TileMetadata>,
    progress: Option<&ProgressSender>,
) -> Vec<TileOutcome> {
    let total = source.tile_count();
    let reporter = ProgressReporter::new(progress, total);
    let reporter = &reporter;
    join_all((0..total).map(|index| decode_one(source, index, metadata.cloned(), reporter))).await
}

/// Smallest layer count among decoded tiles.
pub fn authoritative_layer_count<'a>(
    tiles: impl IntoIterator<Item = &'a DecodedTile>,
) -> Option<u32> {
    tiles.into_iter().map(|tile| tile.layers).min()
}

/// A decoded tile set waiting to be committed to the GPU.
#[derive(Debug)]
pub struct DecodedBatch {
    pub(crate) generation: u64,
    tiles: Vec<DecodedTile>,
    layer_count: u32,
    fallbacks: Vec<usize>,
    metadata: Option<TileMetadata>,
    pub(crate) progress: Option<ProgressSender>,
}

impl DecodedBatch {
    /// Fills the gaps left by failed tiles and settles the layer count.
    ///
    /// Fails with [`TileError::NoUsableTiles`] when not a single tile decoded.
    pub fn assemble(
        mut outcomes: Vec<TileOutcome>,
        metadata: Option<TileMetadata>,
        fallback_size: u32,
    ) -> TileResult<Self> {
        let requested = outcomes.len();
        outcomes.sort_by_key(TileOutcome::index);

        let layer_count = authoritative_layer_count(outcomes.iter().filter_map(|o| match o {
            TileOutcome::Decoded(tile) => Some(tile),
            TileOutcome::Fallback { .. } => None,
        }))
        .ok_or(TileError::NoUsableTiles { requested })?;

        let resolution = metadata.as_ref().and_then(|m| m.tile_resolution);
        let (fallback_width, fallback_height) = match resolution {
            Some([w, h]) => (w, h),
            None => (fallback_size, fallback_size),
        };

        let mut fallbacks = Vec::new();
        let tiles = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                TileOutcome::Decoded(tile) => {
                    if tile.layers != layer_count {
                        log::warn!(
                            "Tile {} has {} layers, only the first {layer_count} will be shown.",
                            tile.index,
                            tile.layers
                        );
                    }
                    tile
                }
                TileOutcome::Fallback { index, .. } => {
                    fallbacks.push(index);
                    fallback_tile(index, fallback_width, fallback_height, layer_count)
                }
            })
            .collect();

        Ok(Self {
            generation: 0,
            tiles,
            layer_count,
            fallbacks,
            metadata,
            progress: None,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tiles(&self) -> &[DecodedTile] {
        &self.tiles
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    /// Indices of the tiles that were replaced by a flat colour.
    pub fn fallbacks(&self) -> &[usize] {
        &self.fallbacks
    }

    pub fn metadata(&self) -> Option<&TileMetadata> {
        self.metadata.as_ref()
    }
}

/// A load that has been requested but not yet decoded.
///
/// Decoding does not borrow the engine, so the host can drive it on any
/// executor while the engine keeps rendering. The generation ticket decides
/// at commit time whether the result is still wanted.
pub struct PendingLoad {
    source: Arc<dyn TileSource>,
    generation: u64,
    fallback_size: u32,
    progress: Option<ProgressSender>,
}

impl std::fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLoad")
            .field("tile_count", &self.source.tile_count())
            .field("generation", &self.generation)
            .finish()
    }
}

impl PendingLoad {
    pub(crate) fn new(source: Arc<dyn TileSource>, generation: u64, fallback_size: u32) -> Self {
        Self {
            source,
            generation,
            fallback_size,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tile_count(&self) -> usize {
        self.source.tile_count()
    }

    pub async fn decode(self) -> TileResult<DecodedBatch> {
        let requested = self.source.tile_count();
        if requested == 0 {
            return Err(TileError::invalid_source("the source has no tiles"));
        }

        let metadata = match self.source.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Ignoring unreadable tile metadata: {e:#}");
                None
            }
        };

        let outcomes = decode_tiles(
            self.source.as_ref(),
            metadata.as_ref(),
            self.progress.as_ref(),
        )
        .await;
        let mut batch = match DecodedBatch::assemble(outcomes, metadata, self.fallback_size) {
            Ok(batch) => batch,
            Err(e) => {
                log::error!("Tile load failed: {e}");
                return Err(e);
            }
        };
        batch.generation = self.generation;
        batch.progress = self.progress;
        Ok(batch)
    }
}
