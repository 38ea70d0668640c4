//! The texture tile engine.
//!
//! [`TileEngine`] owns a set of layered array textures, cycles their visible
//! layer at a fixed cadence and, in flow mode, slides every ribbon segment
//! from its tile to the next one. All of that is carried by one uniform
//! buffer shared by every material, written once per [`TileEngine::tick`].
//!
//! Loading happens in two phases so a host never has to hold the engine
//! across an `.await`:
//!
//! ```ignore
//! let pending = engine.prepare_load(Arc::new(FolderSource::new("tiles", 12)));
//! let batch = pending.decode().await?;
//! let report = engine.commit(&ctx, batch)?;
//! ```

use std::{sync::Arc, time::Duration};

use instant::Instant;

use crate::{
    config::{EngineConfig, TileConfig},
    context::Context,
    data_structures::{
        material::{
            ArrayTextureMaterial, FlowMaterial, LayerMaterial, SharedAnimationState,
            array_material_layout,
        },
        texture::{ArrayTexture, create_tile_sampler},
        tile_state::{CycleVariant, TileSetState},
    },
    error::{TileError, TileResult},
    resources::{
        loader::{DecodedBatch, LoadStage, PendingLoad, ProgressReporter, ProgressSender},
        source::TileSource,
    },
};

/// Turns wall time into the monotonically increasing timestamps `tick` expects.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    start: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// What a committed load ended up with.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadReport {
    pub tile_count: usize,
    pub layer_count: u32,
    /// Indices shown as a flat colour because they failed to load.
    pub fallbacks: Vec<usize>,
    pub variant: CycleVariant,
}

#[derive(Debug)]
pub struct TileEngine {
    config: TileConfig,
    state: TileSetState,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    shared: SharedAnimationState,
    textures: Vec<ArrayTexture>,
    layer_materials: Vec<LayerMaterial>,
    /// `flow_materials[slot]` samples `flow_tile(slot)` and the tile after it.
    flow_materials: Vec<FlowMaterial>,
    generation: u64,
    disposed: bool,
}

impl TileEngine {
    pub fn new(ctx: &Context, config: &EngineConfig) -> Self {
        let tiles = config.tiles.clone();
        let mut state = TileSetState::new(tiles.variant, tiles.cadence_fps);
        state.set_flow(tiles.flow_enabled, tiles.flow_speed);
        Self {
            config: tiles,
            state,
            layout: array_material_layout(&ctx.device),
            sampler: create_tile_sampler(&ctx.device),
            shared: SharedAnimationState::new(&ctx.device),
            textures: Vec::new(),
            layer_materials: Vec::new(),
            flow_materials: Vec::new(),
            generation: 0,
            disposed: false,
        }
    }

    pub fn state(&self) -> &TileSetState {
        &self.state
    }

    /// Layout every material's bind group follows; pipelines drawing with
    /// this engine's materials need it.
    pub fn material_layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn shared_state(&self) -> &SharedAnimationState {
        &self.shared
    }

    pub fn textures(&self) -> &[ArrayTexture] {
        &self.textures
    }

    pub fn tile_count(&self) -> usize {
        self.textures.len()
    }

    pub fn layer_count(&self) -> u32 {
        self.state.layer_count()
    }

    pub fn is_loaded(&self) -> bool {
        !self.textures.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Starts a new load. Any load prepared earlier becomes stale.
    pub fn prepare_load(&mut self, source: Arc<dyn TileSource>) -> PendingLoad {
        self.generation += 1;
        log::debug!(
            "Preparing load #{} of {} tiles",
            self.generation,
            source.tile_count()
        );
        PendingLoad::new(source, self.generation, self.config.fallback_tile_size)
    }

    /// Uploads a decoded batch and makes it the active tile set.
    ///
    /// Fails with [`TileError::Stale`] if another load was prepared since,
    /// and with [`TileError::Disposed`] once the engine is disposed. The
    /// previous tile set stays untouched in both cases.
    pub fn commit(&mut self, ctx: &Context, batch: DecodedBatch) -> TileResult<LoadReport> {
        if self.disposed {
            return Err(TileError::Disposed);
        }
        if batch.generation() != self.generation {
            log::debug!(
                "Dropping load #{}, #{} is current",
                batch.generation(),
                self.generation
            );
            return Err(TileError::Stale);
        }
        let deepest = batch.tiles().iter().map(|t| t.layers).max().unwrap_or(1);
        if let Err(e) = ctx.ensure_array_textures(deepest) {
            log::error!("Cannot use layered tiles: {e}");
            return Err(e);
        }

        if let Some(metadata) = batch.metadata() {
            self.config.apply_metadata(metadata);
            self.state.set_variant(self.config.variant);
            self.state.set_cadence_fps(self.config.cadence_fps);
        }

        self.release_textures();
        let reporter = ProgressReporter::new(batch.progress.as_ref(), batch.tile_count());
        self.textures = batch
            .tiles()
            .iter()
            .map(|tile| {
                let label = format!("tile {}", tile.index);
                let texture = ArrayTexture::from_decoded(&ctx.device, &ctx.queue, tile, &label);
                reporter.report(LoadStage::Upload);
                texture
            })
            .collect();

        self.state.reset(self.textures.len(), batch.layer_count());
        self.layer_materials = (0..self.textures.len())
            .map(|i| {
                LayerMaterial::new(
                    &ctx.device,
                    &self.layout,
                    i,
                    &self.textures[i],
                    &self.sampler,
                    &self.shared,
                )
            })
            .collect();
        self.rebuild_flow_materials(ctx);
        self.shared.write(&ctx.queue, self.state.uniform());

        let report = LoadReport {
            tile_count: self.textures.len(),
            layer_count: batch.layer_count(),
            fallbacks: batch.fallbacks().to_vec(),
            variant: self.state.variant(),
        };
        log::info!(
            "Loaded {} tiles with {} layers ({} fallbacks, {:?})",
            report.tile_count,
            report.layer_count,
            report.fallbacks.len(),
            report.variant
        );
        Ok(report)
    }

    /// Fetches, decodes and commits `source` in one go.
    pub async fn load(
        &mut self,
        ctx: &Context,
        source: Arc<dyn TileSource>,
    ) -> TileResult<LoadReport> {
        let batch = self.prepare_load(source).decode().await?;
        self.commit(ctx, batch)
    }

    pub async fn load_with_progress(
        &mut self,
        ctx: &Context,
        source: Arc<dyn TileSource>,
        progress: ProgressSender,
    ) -> TileResult<LoadReport> {
        let batch = self.prepare_load(source).with_progress(progress).decode().await?;
        self.commit(ctx, batch)
    }

    /// Advances layer cycling and flow to `now` and uploads the shared uniform.
    ///
    /// Whole tiles crossed by the flow offset are wrapped right away, so the
    /// uniform always carries an offset in `[0, 1)`. Returns `true` when the
    /// visible layer changed.
    pub fn tick(&mut self, ctx: &Context, now: Duration) -> bool {
        if self.disposed {
            return false;
        }
        let advanced = self.state.tick(now);
        if let Some(whole_tiles) = self.state.pending_flow_wrap() {
            self.wrap_flow_offset(whole_tiles);
        }
        self.shared.write(&ctx.queue, self.state.uniform());
        advanced
    }

    /// Shifts the tile pairing by `whole_tiles` and takes them off the flow offset.
    pub fn wrap_flow_offset(&mut self, whole_tiles: i64) {
        self.state.wrap_flow_offset(whole_tiles);
        let n = self.flow_materials.len();
        if n > 0 {
            // slot s now shows what slot s + k showed
            self.flow_materials.rotate_left(whole_tiles.rem_euclid(n as i64) as usize);
        }
        log::trace!(
            "Flow wrapped by {whole_tiles}, tile base offset is {}",
            self.state.tile_base_offset()
        );
    }

    /// Tiles sampled by the flow material of `slot`.
    pub fn flow_pair(&self, slot: usize) -> Option<(usize, usize)> {
        let n = self.textures.len();
        if n == 0 {
            return None;
        }
        let current = self.state.flow_tile(slot);
        Some((current, (current + 1) % n))
    }

    /// A standalone flow material for `segment_index` at the current pairing.
    ///
    /// It does not follow later wraps; [`TileEngine::material`] does.
    pub fn create_flow_material(
        &self,
        ctx: &Context,
        segment_index: usize,
    ) -> Option<FlowMaterial> {
        let (current, next) = self.flow_pair(segment_index)?;
        Some(FlowMaterial::new(
            &ctx.device,
            &self.layout,
            (current, next),
            (&self.textures[current], &self.textures[next]),
            &self.sampler,
            &self.shared,
        ))
    }

    fn rebuild_flow_materials(&mut self, ctx: &Context) {
        self.flow_materials = (0..self.textures.len())
            .filter_map(|slot| self.create_flow_material(ctx, slot))
            .collect();
    }

    /// The material a segment bound to `slot` draws with, following the current mode.
    pub fn material(&self, slot: usize) -> Option<&dyn ArrayTextureMaterial> {
        let n = self.textures.len();
        if n == 0 {
            return None;
        }
        if self.state.flow_enabled() {
            self.flow_materials
                .get(slot % n)
                .map(|m| m as &dyn ArrayTextureMaterial)
        } else {
            self.layer_materials
                .get(slot % n)
                .map(|m| m as &dyn ArrayTextureMaterial)
        }
    }

    pub fn set_flow(&mut self, ctx: &Context, enabled: bool, speed: f64) {
        self.state.set_flow(enabled, speed);
        self.shared.write(&ctx.queue, self.state.uniform());
    }

    pub fn set_variant(&mut self, variant: CycleVariant) {
        self.state.set_variant(variant);
    }

    pub fn set_cadence_fps(&mut self, fps: f64) {
        self.state.set_cadence_fps(fps);
    }

    /// See [`TileSetState::optimal_undulation_period`].
    pub fn optimal_undulation_period(&self, target_seconds: f64) -> f64 {
        self.state.optimal_undulation_period(target_seconds)
    }

    fn release_textures(&mut self) {
        self.layer_materials.clear();
        self.flow_materials.clear();
        for texture in self.textures.drain(..) {
            texture.destroy();
        }
    }

    /// Frees all GPU memory. Loads still in flight will fail to commit.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.release_textures();
        self.shared.destroy();
        self.generation += 1;
        self.disposed = true;
        log::debug!("Tile engine disposed");
    }
}

impl Drop for TileEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
