//! The ribbon geometry engine.
//!
//! [`RibbonEngine`] turns a path into GPU buffers, one vertex/index buffer
//! pair per segment, and keeps them in sync with the wave deformation. The
//! geometry itself lives in [`RibbonMesh`]; this module only owns buffers,
//! the engine state and the link to the tile engine's materials.

use std::f64::consts::TAU;

use cgmath::{Vector2, Vector3};
use wgpu::util::DeviceExt;

use crate::{
    config::EngineConfig,
    context::Context,
    data_structures::{
        path::{PathOptions, dedupe_points, prepare_path},
        ribbon_mesh::{RibbonMesh, RibbonParams, WaveParams},
    },
    render::{Flat, Render},
    tiles::TileEngine,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RibbonState {
    #[default]
    Empty,
    Built,
    Animating,
}

#[derive(Debug)]
struct SegmentBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

#[derive(Debug)]
pub struct RibbonEngine {
    params: RibbonParams,
    ribbon_offset: usize,
    path_options: PathOptions,
    mesh: Option<RibbonMesh>,
    buffers: Vec<SegmentBuffers>,
    state: RibbonState,
}

impl RibbonEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            params: RibbonParams::from(config),
            ribbon_offset: config.ribbon.ribbon_offset,
            path_options: PathOptions {
                dedupe_distance: config.ribbon.dedupe_distance,
                resample_points: config.ribbon.resample_points,
                ..PathOptions::default()
            },
            mesh: None,
            buffers: Vec::new(),
            state: RibbonState::Empty,
        }
    }

    pub fn state(&self) -> RibbonState {
        self.state
    }

    pub fn mesh(&self) -> Option<&RibbonMesh> {
        self.mesh.as_ref()
    }

    pub fn segment_count(&self) -> usize {
        self.mesh.as_ref().map_or(0, RibbonMesh::segment_count)
    }

    pub fn params(&self) -> &RibbonParams {
        &self.params
    }

    pub fn set_ribbon_offset(&mut self, ribbon_offset: usize) {
        self.ribbon_offset = ribbon_offset;
        if let Some(mesh) = &mut self.mesh {
            mesh.bind_materials(ribbon_offset);
        }
    }

    /// Rebuilds the ribbon along `points`.
    ///
    /// Degenerate input (fewer than two distinct points) leaves the engine
    /// `Empty` and logs a warning.
    ///
    /// Segments can be built before any tiles are loaded; their materials are
    /// resolved against the current tile set when rendering.
    pub fn build_from_path(
        &mut self,
        ctx: &Context,
        points: &[Vector3<f32>],
        width: f32,
    ) -> RibbonState {
        self.clear();

        let points = dedupe_points(points, self.path_options.dedupe_distance);
        if points.len() < 2 {
            log::warn!(
                "Ribbon path needs at least 2 distinct points, got {}. Nothing to build.",
                points.len()
            );
            return self.state;
        }

        self.params.width = width;
        let Some(mut mesh) = RibbonMesh::build(&points, &self.params) else {
            log::warn!("Ribbon path of {} points has no usable length.", points.len());
            return self.state;
        };
        mesh.bind_materials(self.ribbon_offset);

        self.buffers = mesh
            .segments()
            .iter()
            .map(|segment| SegmentBuffers {
                vertex: ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("ribbon segment {} vertices", segment.index())),
                    contents: bytemuck::cast_slice(segment.vertices()),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                }),
                index: ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("ribbon segment {} indices", segment.index())),
                    contents: bytemuck::cast_slice(segment.indices()),
                    usage: wgpu::BufferUsages::INDEX,
                }),
                index_count: segment.indices().len() as u32,
            })
            .collect();
        for segment in mesh.segments_mut() {
            segment.mark_clean();
        }

        log::debug!(
            "Built ribbon: {:.2} units long, {} segments",
            mesh.total_length(),
            mesh.segment_count()
        );
        self.mesh = Some(mesh);
        self.state = RibbonState::Built;
        self.state
    }

    /// Normalizes and smooths raw 2D input, then builds along it.
    pub fn build_from_points_2d(
        &mut self,
        ctx: &Context,
        raw: &[Vector2<f32>],
        width: f32,
    ) -> RibbonState {
        let points = prepare_path(raw, &self.path_options);
        self.build_from_path(ctx, &points, width)
    }

    /// Replaces the wave parameters; takes effect on the next animation update.
    pub fn set_wave(&mut self, wave: WaveParams) {
        self.params.wave = wave;
        if let Some(mesh) = &mut self.mesh {
            mesh.set_wave(wave);
        }
    }

    /// Sets the wave speed so one undulation lasts a whole number of layer cycles.
    ///
    /// Returns the chosen period in seconds.
    pub fn sync_wave_to_tiles(&mut self, tiles: &TileEngine, target_seconds: f64) -> f64 {
        let period = tiles.optimal_undulation_period(target_seconds);
        if period > 0.0 && period.is_finite() {
            let sign = if self.params.wave.speed < 0.0 { -1.0 } else { 1.0 };
            self.set_wave(WaveParams {
                speed: (sign * TAU / period) as f32,
                ..self.params.wave
            });
        }
        period
    }

    /// Deforms the ribbon for `time` seconds and uploads the changed vertices.
    ///
    /// Buffers and materials are reused; repeating a timestamp does nothing.
    pub fn update_wave_animation(&mut self, ctx: &Context, time: f32) {
        let Some(mesh) = &mut self.mesh else {
            return;
        };
        if mesh.time() == Some(time) && self.state == RibbonState::Animating {
            return;
        }
        mesh.update_wave(time);
        for (segment, buffers) in mesh.segments_mut().iter_mut().zip(&self.buffers) {
            if segment.is_dirty() {
                ctx.queue
                    .write_buffer(&buffers.vertex, 0, bytemuck::cast_slice(segment.vertices()));
                segment.mark_clean();
            }
        }
        self.state = RibbonState::Animating;
    }

    /// Draw list for the current geometry. Segments whose material is missing are skipped.
    pub fn render<'a, 'pass>(&'a self, tiles: &'a TileEngine) -> Render<'a, 'pass>
    where
        'pass: 'a,
    {
        let Some(mesh) = &self.mesh else {
            return Render::None;
        };
        let flats = mesh
            .segments()
            .iter()
            .zip(&self.buffers)
            .filter_map(|(segment, buffers)| {
                let material = tiles.material(segment.material_slot())?;
                Some(Flat {
                    vertex: &buffers.vertex,
                    index: &buffers.index,
                    group: material.bind_group(),
                    amount: buffers.index_count,
                    id: segment.index() as u32,
                })
            })
            .collect();
        Render::Ribbon(flats)
    }

    fn clear(&mut self) {
        for buffers in self.buffers.drain(..) {
            buffers.vertex.destroy();
            buffers.index.destroy();
        }
        self.mesh = None;
        self.state = RibbonState::Empty;
    }

    pub fn dispose(&mut self) {
        self.clear();
    }
}
