//! Host-visible failures of the tile engine.
//!
//! Everything recoverable (a single tile failing to decode, mismatching layer
//! counts, a degenerate ribbon path) is handled in place and logged. Only the
//! cases below are surfaced so the host can switch to a simpler rendering mode.

pub type TileResult<T> = Result<T, TileError>;

#[derive(thiserror::Error, Debug)]
pub enum TileError {
    #[error("no usable tile among {requested} requested tiles")]
    NoUsableTiles { requested: usize },

    #[error("missing rendering capability: {0}")]
    MissingCapability(String),

    #[error("tile engine was disposed before the load could be committed")]
    Disposed,

    #[error("load was superseded by a newer load request")]
    Stale,

    #[error("invalid tile source: {0}")]
    InvalidSource(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TileError {
    pub fn missing_capability(msg: impl Into<String>) -> Self {
        Self::MissingCapability(msg.into())
    }

    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }

    /// `true` for failures that mean the array-texture path cannot be used at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoUsableTiles { .. } | Self::MissingCapability(_) | Self::InvalidSource(_)
        )
    }
}
