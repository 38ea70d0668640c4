//! CPU-side ribbon geometry.
//!
//! A [`RibbonMesh`] is built once per path: the path is turned into a
//! piecewise-linear curve, a dense field of smoothed edge normals is computed
//! for the whole curve in one pass, and the curve is cut into segments of
//! roughly one ribbon width each. Every segment caches its undeformed frame so
//! [`RibbonMesh::update_wave`] only has to rotate the edge offsets and rewrite
//! the vertex array in place.

use std::f32::consts::TAU;

use cgmath::{InnerSpace, Quaternion, Rad, Rotation3, Vector3, VectorSpace, Zero};

use crate::config::EngineConfig;

/// Seed axis for the first edge normal. Paths are drawn in the XY plane.
const UP: Vector3<f32> = Vector3::new(0.0, 0.0, 1.0);
/// Seed axis used instead of [`UP`] when the path starts along it.
const RIGHT: Vector3<f32> = Vector3::new(1.0, 0.0, 0.0);
const EPSILON: f32 = 1e-6;

/// 32-byte vertex: position (12), normal (12), uv (8).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RibbonVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl RibbonVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<RibbonVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // normal
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // uv
                wgpu::VertexAttribute {
                    offset: 24,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveParams {
    /// Waves per unit of arc length.
    pub frequency: f32,
    /// Radians per second.
    pub speed: f32,
    /// Peak twist angle in radians.
    pub amplitude: f32,
}

impl WaveParams {
    pub const FLAT: WaveParams = WaveParams {
        frequency: 0.0,
        speed: 0.0,
        amplitude: 0.0,
    };

    /// Twist angle at `arc_length` along the path at `time` seconds.
    pub fn phase(&self, arc_length: f32, time: f32) -> f32 {
        (arc_length * self.frequency * TAU + time * self.speed).sin() * self.amplitude
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RibbonParams {
    pub width: f32,
    /// Quads along one segment.
    pub vertices_per_segment: u32,
    /// Density of the precomputed normal field.
    pub normal_samples_per_segment: u32,
    /// How far each normal moves towards its candidate per sample, in (0, 1].
    pub normal_smoothing: f32,
    pub wave: WaveParams,
}

impl Default for RibbonParams {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RibbonParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            width: config.ribbon.width,
            vertices_per_segment: config.ribbon.vertices_per_segment,
            normal_samples_per_segment: config.ribbon.normal_samples_per_segment,
            normal_smoothing: config.ribbon.normal_smoothing,
            wave: WaveParams {
                frequency: config.wave.frequency,
                speed: config.wave.speed,
                amplitude: config.wave.amplitude,
            },
        }
    }
}

/// Number of segments for a path of `length` and a ribbon of `width`: one per
/// started width-unit, and never zero.
pub fn segment_count(length: f32, width: f32) -> usize {
    if !(width > 0.0) || !(length > 0.0) {
        return 1;
    }
    // Absorb float noise so an exact multiple of the width does not gain a sliver segment.
    let units = length / width;
    let units = units - units * f32::EPSILON * 4.0;
    (units.ceil() as usize).max(1)
}

/// Piecewise-linear curve over a point list; `t` in [0, 1] is spread
/// uniformly across point indices.
#[derive(Clone, Debug)]
pub struct LinearCurve<'a> {
    points: &'a [Vector3<f32>],
}

impl<'a> LinearCurve<'a> {
    pub fn new(points: &'a [Vector3<f32>]) -> Self {
        debug_assert!(points.len() >= 2);
        Self { points }
    }

    pub fn point_at(&self, t: f32) -> Vector3<f32> {
        let last = self.points.len() - 1;
        let f = t.clamp(0.0, 1.0) * last as f32;
        let i = (f.floor() as usize).min(last - 1);
        self.points[i].lerp(self.points[i + 1], f - i as f32)
    }

    /// Central finite difference over `h`, one-sided at the ends.
    pub fn tangent_at(&self, t: f32, h: f32) -> Option<Vector3<f32>> {
        let a = self.point_at((t - h).max(0.0));
        let b = self.point_at((t + h).min(1.0));
        let d = b - a;
        if d.magnitude2() < EPSILON * EPSILON {
            None
        } else {
            Some(d.normalize())
        }
    }
}

/// Dense per-sample frame of the whole path.
#[derive(Clone, Debug, Default)]
pub struct PathFrames {
    pub positions: Vec<Vector3<f32>>,
    pub tangents: Vec<Vector3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub arc_lengths: Vec<f32>,
}

impl PathFrames {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Samples `curve` at `samples` evenly spaced parameters and computes
    /// smoothed, flip-free edge normals along it.
    pub fn compute(curve: &LinearCurve, samples: usize, smoothing: f32) -> Self {
        let samples = samples.max(2);
        let step = 1.0 / (samples - 1) as f32;
        let smoothing = smoothing.clamp(EPSILON, 1.0);

        let mut frames = PathFrames {
            positions: Vec::with_capacity(samples),
            tangents: Vec::with_capacity(samples),
            normals: Vec::with_capacity(samples),
            arc_lengths: Vec::with_capacity(samples),
        };

        let mut tangent = RIGHT;
        let mut arc = 0.0;
        for i in 0..samples {
            let t = i as f32 * step;
            let position = curve.point_at(t);
            tangent = curve.tangent_at(t, step).unwrap_or(tangent);
            if let Some(prev) = frames.positions.last() {
                arc += (position - *prev).magnitude();
            }

            let normal = match frames.normals.last() {
                None => seed_normal(tangent),
                Some(&prev) => next_normal(prev, tangent, smoothing),
            };

            frames.positions.push(position);
            frames.tangents.push(tangent);
            frames.normals.push(normal);
            frames.arc_lengths.push(arc);
        }
        frames
    }
}

fn seed_normal(tangent: Vector3<f32>) -> Vector3<f32> {
    let n = UP.cross(tangent);
    if n.magnitude2() > 1e-6 {
        return n.normalize();
    }
    let n = RIGHT.cross(tangent);
    if n.magnitude2() > 1e-6 {
        n.normalize()
    } else {
        Vector3::unit_y()
    }
}

fn next_normal(prev: Vector3<f32>, tangent: Vector3<f32>, smoothing: f32) -> Vector3<f32> {
    let binormal = tangent.cross(prev);
    let mut candidate = if binormal.magnitude2() < EPSILON {
        prev
    } else {
        binormal.cross(tangent).normalize()
    };
    if candidate.dot(prev) < 0.0 {
        candidate = -candidate;
    }
    let blended = prev.lerp(candidate, smoothing);
    if blended.magnitude2() < EPSILON {
        candidate
    } else {
        blended.normalize()
    }
}

/// One quad strip of the ribbon bound to one tile material.
#[derive(Clone, Debug)]
pub struct RibbonSegment {
    index: usize,
    material_slot: usize,
    base_positions: Vec<Vector3<f32>>,
    base_normals: Vec<Vector3<f32>>,
    tangents: Vec<Vector3<f32>>,
    arc_lengths: Vec<f32>,
    vertices: Vec<RibbonVertex>,
    indices: Vec<u16>,
    /// Per-vertex face normal sums, reused across updates.
    normal_sums: Vec<Vector3<f32>>,
    dirty: bool,
}

impl RibbonSegment {
    fn from_frames(index: usize, frames: &PathFrames, samples: &[usize]) -> Self {
        let columns = samples.len();
        let mut segment = Self {
            index,
            material_slot: index,
            base_positions: samples.iter().map(|&i| frames.positions[i]).collect(),
            base_normals: samples.iter().map(|&i| frames.normals[i]).collect(),
            tangents: samples.iter().map(|&i| frames.tangents[i]).collect(),
            arc_lengths: samples.iter().map(|&i| frames.arc_lengths[i]).collect(),
            vertices: vec![RibbonVertex::default(); columns * 2],
            indices: strip_indices(columns),
            normal_sums: vec![Vector3::zero(); columns * 2],
            dirty: true,
        };
        let last = (columns - 1).max(1) as f32;
        for (j, pair) in segment.vertices.chunks_exact_mut(2).enumerate() {
            let u = j as f32 / last;
            pair[0].uv = [u, 0.0];
            pair[1].uv = [u, 1.0];
        }
        segment
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Slot passed to the tile engine when looking up this segment's material:
    /// `segment index + ribbon offset`, reduced by the tile count at lookup.
    pub fn material_slot(&self) -> usize {
        self.material_slot
    }

    /// Tile this segment shows in a set of `tile_count` tiles.
    pub fn material_index(&self, tile_count: usize) -> Option<usize> {
        (tile_count > 0).then(|| self.material_slot % tile_count)
    }

    pub fn base_positions(&self) -> &[Vector3<f32>] {
        &self.base_positions
    }

    pub fn base_normals(&self) -> &[Vector3<f32>] {
        &self.base_normals
    }

    pub fn tangents(&self) -> &[Vector3<f32>] {
        &self.tangents
    }

    pub fn arc_lengths(&self) -> &[f32] {
        &self.arc_lengths
    }

    pub fn vertices(&self) -> &[RibbonVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Left and right edge positions of column `j`.
    pub fn edge(&self, j: usize) -> (Vector3<f32>, Vector3<f32>) {
        (
            self.vertices[2 * j].position.into(),
            self.vertices[2 * j + 1].position.into(),
        )
    }

    /// Rewrites the edge vertices in place for `time`.
    fn deform(&mut self, half_width: f32, wave: &WaveParams, time: f32) {
        for j in 0..self.base_positions.len() {
            let base = self.base_positions[j];
            let tangent = self.tangents[j];
            let phase = wave.phase(self.arc_lengths[j], time);
            let normal = if phase == 0.0 {
                self.base_normals[j]
            } else {
                Quaternion::from_axis_angle(tangent, Rad(phase)) * self.base_normals[j]
            };
            let offset = normal * half_width;
            self.vertices[2 * j].position = (base + offset).into();
            self.vertices[2 * j + 1].position = (base - offset).into();
        }
        self.recompute_normals();
        self.dirty = true;
    }

    /// Area-weighted vertex normals from the strip's triangles.
    fn recompute_normals(&mut self) {
        let sums = &mut self.normal_sums;
        sums.fill(Vector3::zero());
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let pa: Vector3<f32> = self.vertices[a].position.into();
            let pb: Vector3<f32> = self.vertices[b].position.into();
            let pc: Vector3<f32> = self.vertices[c].position.into();
            let face = (pb - pa).cross(pc - pa);
            sums[a] += face;
            sums[b] += face;
            sums[c] += face;
        }
        for (i, &sum) in sums.iter().enumerate() {
            let normal = if sum.magnitude2() > EPSILON * EPSILON {
                sum.normalize()
            } else {
                let j = i / 2;
                self.tangents[j].cross(self.base_normals[j]).normalize()
            };
            self.vertices[i].normal = normal.into();
        }
    }
}

/// Two counter-clockwise triangles per quad between consecutive columns.
fn strip_indices(columns: usize) -> Vec<u16> {
    let mut indices = Vec::with_capacity(columns.saturating_sub(1) * 6);
    for j in 0..columns.saturating_sub(1) {
        let l0 = (2 * j) as u16;
        let r0 = l0 + 1;
        let l1 = l0 + 2;
        let r1 = l0 + 3;
        indices.extend_from_slice(&[l0, r0, l1, l1, r0, r1]);
    }
    indices
}

#[derive(Clone, Debug)]
pub struct RibbonMesh {
    params: RibbonParams,
    frames: PathFrames,
    segments: Vec<RibbonSegment>,
    total_length: f32,
    time: Option<f32>,
}

impl RibbonMesh {
    /// Builds the ribbon for `points`, or `None` if the path is degenerate.
    pub fn build(points: &[Vector3<f32>], params: &RibbonParams) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        if !(params.width > 0.0) {
            log::warn!("Ribbon width must be positive, got {}", params.width);
            return None;
        }
        let total_length = crate::data_structures::path::path_length(points);
        if total_length <= EPSILON {
            return None;
        }

        let segment_count = segment_count(total_length, params.width);
        let per_segment = params.normal_samples_per_segment.max(1) as usize;
        let curve = LinearCurve::new(points);
        let frames = PathFrames::compute(
            &curve,
            segment_count * per_segment + 1,
            params.normal_smoothing,
        );

        let columns = params.vertices_per_segment.max(1) as usize + 1;
        let last_sample = frames.len() - 1;
        let segments = (0..segment_count)
            .map(|s| {
                let samples: Vec<usize> = (0..columns)
                    .map(|j| {
                        let f = (s as f32 + j as f32 / (columns - 1) as f32) * per_segment as f32;
                        (f.round() as usize).min(last_sample)
                    })
                    .collect();
                RibbonSegment::from_frames(s, &frames, &samples)
            })
            .collect();

        let mut mesh = Self {
            params: *params,
            frames,
            segments,
            total_length,
            time: None,
        };
        mesh.update_wave(0.0);
        Some(mesh)
    }

    /// Shifts every segment's material slot to `segment index + ribbon_offset`.
    ///
    /// The tile count is applied at lookup, so the binding stays valid when a
    /// tile set with a different count is loaded later.
    pub fn bind_materials(&mut self, ribbon_offset: usize) {
        for segment in &mut self.segments {
            segment.material_slot = segment.index + ribbon_offset;
        }
    }

    /// Deforms every segment for `time` seconds from the cached base frames.
    pub fn update_wave(&mut self, time: f32) {
        let half_width = self.params.width * 0.5;
        let wave = self.params.wave;
        for segment in &mut self.segments {
            segment.deform(half_width, &wave, time);
        }
        self.time = Some(time);
    }

    pub fn set_wave(&mut self, wave: WaveParams) {
        self.params.wave = wave;
    }

    pub fn params(&self) -> &RibbonParams {
        &self.params
    }

    pub fn frames(&self) -> &PathFrames {
        &self.frames
    }

    pub fn segments(&self) -> &[RibbonSegment] {
        &self.segments
    }

    pub(crate) fn segments_mut(&mut self) -> &mut [RibbonSegment] {
        &mut self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn total_length(&self) -> f32 {
        self.total_length
    }

    /// Time of the last deformation.
    pub fn time(&self) -> Option<f32> {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(width: f32) -> RibbonParams {
        RibbonParams {
            width,
            wave: WaveParams::FLAT,
            ..RibbonParams::default()
        }
    }

    fn line(length: f32) -> Vec<Vector3<f32>> {
        vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(length, 0.0, 0.0)]
    }

    #[test]
    fn segment_count_uses_ceiling() {
        assert_eq!(segment_count(10.0, 1.0), 10);
        assert_eq!(segment_count(10.3, 1.0), 11);
        assert_eq!(segment_count(0.2, 1.0), 1);
        assert_eq!(segment_count(4.0, 2.0), 2);
        assert_eq!(segment_count(10.00005, 1.0), 11);
        assert_eq!(segment_count(0.3 * 3.0, 0.3), 3);
    }

    #[test]
    fn curve_is_uniform_in_point_index() {
        let points = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 5.0, 0.0),
        ];
        let curve = LinearCurve::new(&points);
        assert_eq!(curve.point_at(0.5), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(curve.point_at(0.75), Vector3::new(1.0, 2.5, 0.0));
        assert_eq!(curve.point_at(2.0), points[2]);
    }

    #[test]
    fn seed_normal_points_left_of_travel() {
        let n = seed_normal(Vector3::unit_x());
        assert!((n - Vector3::unit_y()).magnitude() < 1e-6);
        let vertical = seed_normal(Vector3::unit_z());
        assert!(vertical.magnitude() > 0.99);
        assert!(vertical.dot(Vector3::unit_z()).abs() < 1e-6);
    }

    #[test]
    fn straight_line_has_flat_edges() {
        let mesh = RibbonMesh::build(&line(3.0), &flat(1.0)).expect("mesh");
        assert_eq!(mesh.segment_count(), 3);
        for segment in mesh.segments() {
            for j in 0..segment.base_positions().len() {
                let (left, right) = segment.edge(j);
                assert!((left.y - 0.5).abs() < 1e-5);
                assert!((right.y + 0.5).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn segments_share_boundaries() {
        let mesh = RibbonMesh::build(&line(4.0), &flat(1.0)).expect("mesh");
        for pair in mesh.segments().windows(2) {
            let end = *pair[0].base_positions().last().expect("end");
            let start = pair[1].base_positions()[0];
            assert!((end - start).magnitude() < 1e-5);
        }
    }

    #[test]
    fn wave_rotates_about_tangent() {
        let params = RibbonParams {
            width: 1.0,
            wave: WaveParams {
                frequency: 0.0,
                speed: 1.0,
                amplitude: std::f32::consts::FRAC_PI_2,
            },
            ..RibbonParams::default()
        };
        let mut mesh = RibbonMesh::build(&line(1.0), &params).expect("mesh");
        // sin(pi / 2) * amplitude = a quarter turn
        mesh.update_wave(std::f32::consts::FRAC_PI_2);
        let (left, right) = mesh.segments()[0].edge(0);
        assert!(left.y.abs() < 1e-5);
        assert!((left.z - 0.5).abs() < 1e-5);
        assert!((right.z + 0.5).abs() < 1e-5);
        // edges keep the full width
        assert!(((left - right).magnitude() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn update_is_idempotent_and_marks_dirty() {
        let mut mesh = RibbonMesh::build(&line(2.0), &RibbonParams::default()).expect("mesh");
        mesh.update_wave(1.25);
        let first: Vec<RibbonVertex> = mesh.segments()[1].vertices().to_vec();
        mesh.segments_mut()[1].mark_clean();
        mesh.update_wave(1.25);
        assert_eq!(first.as_slice(), mesh.segments()[1].vertices());
        assert!(mesh.segments()[1].is_dirty());
    }

    #[test]
    fn vertex_normals_face_the_viewer_on_flat_ribbon() {
        let mesh = RibbonMesh::build(&line(2.0), &flat(1.0)).expect("mesh");
        for vertex in mesh.segments()[0].vertices() {
            assert!((vertex.normal[2] - 1.0).abs() < 1e-5, "{:?}", vertex.normal);
        }
    }

    #[test]
    fn material_slots_wrap_with_offset() {
        let mut mesh = RibbonMesh::build(&line(5.0), &flat(1.0)).expect("mesh");
        mesh.bind_materials(2);
        let tiles: Vec<Option<usize>> =
            mesh.segments().iter().map(|s| s.material_index(3)).collect();
        assert_eq!(tiles, vec![Some(2), Some(0), Some(1), Some(2), Some(0)]);
    }

    #[test]
    fn binding_survives_tile_count_changes() {
        let mut mesh = RibbonMesh::build(&line(5.0), &flat(1.0)).expect("mesh");
        // bound while no tiles are loaded yet
        mesh.bind_materials(2);
        assert!(mesh.segments().iter().all(|s| s.material_index(0).is_none()));
        let three: Vec<usize> =
            mesh.segments().iter().filter_map(|s| s.material_index(3)).collect();
        assert_eq!(three, vec![2, 0, 1, 2, 0]);
        let four: Vec<usize> =
            mesh.segments().iter().filter_map(|s| s.material_index(4)).collect();
        assert_eq!(four, vec![2, 3, 0, 1, 2]);
    }

    #[test]
    fn wave_updates_reuse_normal_scratch() {
        let mut mesh = RibbonMesh::build(&line(2.0), &RibbonParams::default()).expect("mesh");
        let before = mesh.segments()[0].normal_sums.as_ptr();
        mesh.update_wave(0.4);
        mesh.update_wave(0.9);
        assert_eq!(before, mesh.segments()[0].normal_sums.as_ptr());
    }

    #[test]
    fn degenerate_paths_build_nothing() {
        assert!(RibbonMesh::build(&[Vector3::zero()], &flat(1.0)).is_none());
        assert!(RibbonMesh::build(&[Vector3::zero(), Vector3::zero()], &flat(1.0)).is_none());
        assert!(RibbonMesh::build(&line(1.0), &flat(0.0)).is_none());
    }

    #[test]
    fn indices_cover_every_quad() {
        let mesh = RibbonMesh::build(&line(1.0), &flat(1.0)).expect("mesh");
        let segment = &mesh.segments()[0];
        let columns = segment.base_positions().len();
        assert_eq!(segment.indices().len(), (columns - 1) * 6);
        assert_eq!(segment.vertices().len(), columns * 2);
        let max = *segment.indices().iter().max().expect("indices") as usize;
        assert_eq!(max, segment.vertices().len() - 1);
    }
}
