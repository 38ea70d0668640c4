//! Per-instance animation state of a tile set.
//!
//! [`TileSetState`] is the CPU-side half of the tile engine: it decides which
//! layer of the array textures is visible and how far the flow conveyor has
//! moved. It holds no GPU resources so it can be driven and tested without a
//! device; the engine copies [`TileSetState::uniform`] into the shared uniform
//! buffer once per frame.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the layer index moves once it reaches the last layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleVariant {
    /// `0, 1, .., n-1, 0, 1, ..`
    #[default]
    Wrap,
    /// `0, 1, .., n-1, n-2, .., 0, 1, ..`
    PingPong,
}

/// GPU copy of the animation state, shared by every bound material.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AnimationUniform {
    pub layer: u32,
    pub layer_count: u32,
    pub flow_offset: f32,
    pub flow_enabled: u32,
}

#[derive(Clone, Debug)]
pub struct TileSetState {
    tile_count: usize,
    layer_count: u32,
    variant: CycleVariant,
    layer: u32,
    direction: i32,
    flow_enabled: bool,
    flow_speed: f64,
    flow_offset: f64,
    tile_base_offset: i64,
    cadence: Duration,
    last_layer_advance: Duration,
    last_tick: Option<Duration>,
}

impl TileSetState {
    pub fn new(variant: CycleVariant, cadence_fps: f64) -> Self {
        Self {
            tile_count: 0,
            layer_count: 1,
            variant,
            layer: 0,
            direction: 1,
            flow_enabled: false,
            flow_speed: 0.0,
            flow_offset: 0.0,
            tile_base_offset: 0,
            cadence: cadence_interval(cadence_fps),
            last_layer_advance: Duration::ZERO,
            last_tick: None,
        }
    }

    /// Resets the state for a freshly loaded tile set.
    ///
    /// The frame clock carries over, so the next `tick` only accounts for the
    /// time since the last frame and the cadence restarts at the reload.
    pub fn reset(&mut self, tile_count: usize, layer_count: u32) {
        self.tile_count = tile_count;
        self.layer_count = layer_count.max(1);
        self.layer = 0;
        self.direction = 1;
        self.flow_offset = 0.0;
        self.tile_base_offset = 0;
        self.last_layer_advance = self.last_tick.unwrap_or(Duration::ZERO);
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn direction(&self) -> i32 {
        self.direction
    }

    pub fn variant(&self) -> CycleVariant {
        self.variant
    }

    pub fn set_variant(&mut self, variant: CycleVariant) {
        self.variant = variant;
        self.direction = 1;
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn cadence_fps(&self) -> f64 {
        1.0 / self.cadence.as_secs_f64()
    }

    pub fn set_cadence_fps(&mut self, fps: f64) {
        self.cadence = cadence_interval(fps);
    }

    pub fn flow_enabled(&self) -> bool {
        self.flow_enabled
    }

    pub fn flow_speed(&self) -> f64 {
        self.flow_speed
    }

    pub fn set_flow(&mut self, enabled: bool, speed: f64) {
        self.flow_enabled = enabled;
        self.flow_speed = speed;
    }

    pub fn flow_offset(&self) -> f64 {
        self.flow_offset
    }

    pub fn tile_base_offset(&self) -> i64 {
        self.tile_base_offset
    }

    /// Advances the animation to `now`.
    ///
    /// The layer moves at most one step per call and only once a full cadence
    /// interval has elapsed since the previous step. The flow offset follows
    /// the real elapsed time. Calling twice with the same timestamp is a no-op.
    /// Returns `true` if the layer changed.
    pub fn tick(&mut self, now: Duration) -> bool {
        let dt = match self.last_tick {
            Some(last) => now.saturating_sub(last),
            None => now,
        };
        self.last_tick = Some(self.last_tick.map_or(now, |last| last.max(now)));

        if self.flow_enabled && !dt.is_zero() {
            self.flow_offset += self.flow_speed * dt.as_secs_f64();
        }

        let since_advance = now.saturating_sub(self.last_layer_advance);
        if since_advance.is_zero() || since_advance < self.cadence {
            return false;
        }
        self.last_layer_advance = now;
        self.advance_layer();
        true
    }

    fn advance_layer(&mut self) {
        let last = self.layer_count.saturating_sub(1);
        if last == 0 {
            self.layer = 0;
            return;
        }
        match self.variant {
            CycleVariant::Wrap => {
                self.layer = (self.layer.min(last) + 1) % self.layer_count;
            }
            CycleVariant::PingPong => {
                let next = (self.layer.min(last) as i64 + self.direction as i64)
                    .clamp(0, last as i64);
                self.layer = next as u32;
                if self.layer == last {
                    self.direction = -1;
                } else if self.layer == 0 {
                    self.direction = 1;
                }
            }
        }
    }

    /// Signed number of whole tiles the flow offset has crossed since the last wrap.
    pub fn pending_flow_wrap(&self) -> Option<i64> {
        let whole = self.flow_offset.floor();
        if whole == 0.0 || !whole.is_finite() {
            None
        } else {
            Some(whole as i64)
        }
    }

    /// Moves `whole_tiles` from the fractional flow offset into the tile base offset.
    ///
    /// `tile_base_offset + flow_offset` stays the same.
    pub fn wrap_flow_offset(&mut self, whole_tiles: i64) {
        self.tile_base_offset += whole_tiles;
        self.flow_offset -= whole_tiles as f64;
        if self.tile_count > 0 {
            self.tile_base_offset = self.tile_base_offset.rem_euclid(self.tile_count as i64);
        }
    }

    /// Index of the first tile of the pair shown in `slot` while flowing.
    pub fn flow_tile(&self, slot: usize) -> usize {
        if self.tile_count == 0 {
            return 0;
        }
        let n = self.tile_count as i64;
        (slot as i64 + self.tile_base_offset).rem_euclid(n) as usize
    }

    /// Length in seconds of one full layer cycle at the current cadence.
    pub fn natural_period(&self) -> f64 {
        let fps = self.cadence_fps();
        match self.variant {
            CycleVariant::Wrap => self.layer_count as f64 / fps,
            CycleVariant::PingPong => 2.0 * self.layer_count.saturating_sub(1) as f64 / fps,
        }
    }

    /// The whole multiple of the natural layer period closest to `target_seconds`.
    ///
    /// Wave animations using this period stay phase-locked to layer cycling.
    pub fn optimal_undulation_period(&self, target_seconds: f64) -> f64 {
        let natural = self.natural_period();
        if !(natural > 0.0) || !natural.is_finite() {
            return target_seconds;
        }
        let multiple = (target_seconds / natural).round().max(1.0);
        multiple * natural
    }

    pub fn uniform(&self) -> AnimationUniform {
        AnimationUniform {
            layer: self.layer.min(self.layer_count.saturating_sub(1)),
            layer_count: self.layer_count,
            flow_offset: self.flow_offset.rem_euclid(1.0) as f32,
            flow_enabled: self.flow_enabled as u32,
        }
    }
}

fn cadence_interval(fps: f64) -> Duration {
    if fps > 0.0 && fps.is_finite() {
        Duration::from_secs_f64(1.0 / fps)
    } else {
        log::warn!("Invalid cadence of {fps} fps, using 30 fps.");
        Duration::from_secs_f64(1.0 / 30.0)
    }
}
