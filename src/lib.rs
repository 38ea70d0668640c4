//! flow-ribbon
//!
//! Animated ribbon meshes textured with looping, multi-layer texture tiles,
//! rendered with wgpu on native targets and the web. Two engines work
//! together:
//!
//! - the tile engine ([`TileEngine`]) loads a set of layered array textures,
//!   cycles the visible layer at a fixed cadence and optionally slides the
//!   tiles along the ribbon ("flow")
//! - the ribbon engine ([`RibbonEngine`]) builds a segmented ribbon along a
//!   path, binds every segment to a tile material and twists it with a wave
//!   that can be phase-locked to the layer cycle
//!
//! Both are driven once per frame by the host: `tick` with a monotonically
//! increasing timestamp and `update_wave_animation` with the same time in
//! seconds, in either order.
//!
//! High-level modules
//! - `config`: TOML engine configuration and the tile sidecar metadata
//! - `context`: device/queue wrapper and capability checks
//! - `data_structures`: tile state, path utilities, ribbon geometry, GPU textures and materials
//! - `error`: fatal, host-visible failures
//! - `pipelines`: the ribbon render pipeline and its shader
//! - `render`: draw lists recorded into a host render pass
//! - `resources`: tile sources, byte loading and decoding
//! - `ribbon` / `tiles`: the two engines
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod ribbon;
pub mod tiles;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use config::{EngineConfig, TileMetadata};
pub use context::Context;
pub use data_structures::tile_state::CycleVariant;
pub use error::{TileError, TileResult};
pub use ribbon::{RibbonEngine, RibbonState};
pub use tiles::{FrameClock, LoadReport, TileEngine};
pub use wgpu;

/// Installs a logger for hosts that do not bring their own: `env_logger` on
/// native targets, the browser console on the web.
pub fn init_logging() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            eprintln!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&format!("Could not initialize logger: {e}").into());
        }
    }
}
