//! Engine configuration and the tile sidecar metadata document.
//!
//! [`EngineConfig`] is read from TOML and carries every tunable of both
//! engines. [`TileMetadata`] is the optional `metadata.json` shipped next to a
//! tile set; when present it overrides the configured variant and cadence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data_structures::tile_state::CycleVariant;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub tiles: TileConfig,
    #[serde(default)]
    pub ribbon: RibbonConfig,
    #[serde(default)]
    pub wave: WaveConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Layer updates per second, independent of the host frame rate.
    pub cadence_fps: f64,
    pub variant: CycleVariant,
    pub flow_enabled: bool,
    /// Signed, in tiles per second.
    pub flow_speed: f64,
    /// Edge length of the square fallback image used for undecodable tiles.
    pub fallback_tile_size: u32,
}

impl TileConfig {
    /// Applies the parts of a tile set's sidecar that override the config.
    pub fn apply_metadata(&mut self, metadata: &TileMetadata) {
        if let Some(variant) = metadata.variant {
            self.variant = variant;
        }
        if let Some(fps) = metadata.fps.filter(|fps| *fps > 0.0) {
            self.cadence_fps = fps;
        }
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            cadence_fps: 30.0,
            variant: CycleVariant::Wrap,
            flow_enabled: false,
            flow_speed: 0.25,
            fallback_tile_size: 256,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RibbonConfig {
    pub width: f32,
    /// Shifts every segment's material slot, so several ribbons can show different tiles.
    pub ribbon_offset: usize,
    pub vertices_per_segment: u32,
    pub normal_samples_per_segment: u32,
    pub normal_smoothing: f32,
    pub dedupe_distance: f32,
    pub resample_points: usize,
}

impl Default for RibbonConfig {
    fn default() -> Self {
        Self {
            width: 1.0,
            ribbon_offset: 0,
            vertices_per_segment: 16,
            normal_samples_per_segment: 50,
            normal_smoothing: 0.1,
            dedupe_distance: 1e-3,
            resample_points: 200,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    /// Waves per unit of arc length.
    pub frequency: f32,
    /// Radians per second.
    pub speed: f32,
    /// Peak twist in radians.
    pub amplitude: f32,
    /// Desired undulation period in seconds, snapped to the layer cycle.
    pub target_period: f64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            frequency: 0.15,
            speed: 1.0,
            amplitude: 0.35,
            target_period: 6.0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads the config at `path`, falling back to defaults if it is missing or malformed.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to parse config {}: {e}. Using defaults.", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Could not read config {}: {e}. Using defaults.", path.display());
                Self::default()
            }
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Sidecar document stored next to a tile set as `metadata.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileMetadata {
    #[serde(default, alias = "type")]
    pub variant: Option<CycleVariant>,
    /// `[width, height]` of one layer.
    #[serde(default)]
    pub tile_resolution: Option<[u32; 2]>,
    #[serde(default)]
    pub layers: Option<u32>,
    #[serde(default)]
    pub fps: Option<f64>,
}

impl TileMetadata {
    pub fn from_json_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.tiles.cadence_fps, 30.0);
        assert_eq!(config.tiles.variant, CycleVariant::Wrap);
        assert_eq!(config.ribbon.normal_samples_per_segment, 50);
        assert_eq!(config.ribbon.width, 1.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [tiles]
            variant = "ping-pong"
            cadence_fps = 24.0

            [wave]
            amplitude = 0.0
            "#,
        )
        .expect("parse");
        assert_eq!(config.tiles.variant, CycleVariant::PingPong);
        assert_eq!(config.tiles.cadence_fps, 24.0);
        assert_eq!(config.tiles.fallback_tile_size, 256);
        assert_eq!(config.wave.amplitude, 0.0);
        assert_eq!(config.wave.speed, 1.0);
        assert_eq!(config.ribbon.vertices_per_segment, 16);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = EngineConfig::default();
        config.ribbon.ribbon_offset = 3;
        let serialized = config.to_toml_string().expect("serialize");
        let deserialized = EngineConfig::from_toml_str(&serialized).expect("deserialize");
        assert_eq!(deserialized.ribbon.ribbon_offset, 3);
        assert_eq!(deserialized.tiles.variant, config.tiles.variant);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load("definitely/not/here.toml");
        assert_eq!(config.tiles.cadence_fps, 30.0);
    }

    #[test]
    fn sidecar_overrides_variant_and_cadence() {
        let metadata = TileMetadata::from_json_slice(
            br#"{ "variant": "ping-pong", "tileResolution": [64, 32], "fps": 12 }"#,
        )
        .expect("parse");
        assert_eq!(metadata.tile_resolution, Some([64, 32]));
        assert_eq!(metadata.layers, None);

        let mut config = EngineConfig::default();
        config.tiles.apply_metadata(&metadata);
        assert_eq!(config.tiles.variant, CycleVariant::PingPong);
        assert_eq!(config.tiles.cadence_fps, 12.0);
    }

    #[test]
    fn sidecar_accepts_type_alias() {
        let metadata = TileMetadata::from_json_slice(br#"{ "type": "wrap" }"#).expect("parse");
        assert_eq!(metadata.variant, Some(CycleVariant::Wrap));
    }
}
