/**
 * This module contains all logic for getting tiles from external files into memory:
 * acquiring bytes from a source, decoding them and assembling the tile set.
 */
pub mod loader;
pub mod source;
pub mod texture;

pub use loader::{DecodedBatch, LoadProgress, LoadStage, PendingLoad, ProgressSender, TileOutcome};
pub use source::{FolderSource, MemorySource, TileLocation, TileSource, UrlSource};
