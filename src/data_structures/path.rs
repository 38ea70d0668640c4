//! Path preparation: turning raw freehand or vector-derived input into a clean
//! list of 3D points the ribbon builder can sample.
//!
//! The usual chain is [`normalize_points_2d`] → [`dedupe_points`] →
//! [`centripetal_resample`], bundled as [`prepare_path`].

use cgmath::{InnerSpace, Vector2, Vector3, VectorSpace};

/// Knot exponent of the centripetal Catmull-Rom parametrisation.
const CENTRIPETAL_ALPHA: f32 = 0.5;
/// Spline evaluations per input span before arc-length resampling.
const SAMPLES_PER_SPAN: usize = 16;

#[derive(Clone, Copy, Debug)]
pub struct NormalizeOptions {
    /// Length of the longer bounding-box side after scaling.
    pub target_size: f32,
    /// Z coordinate given to every point.
    pub depth: f32,
    /// Screen-space input grows downwards; flip it so the path is upright.
    pub flip_y: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            target_size: 10.0,
            depth: 0.0,
            flip_y: true,
        }
    }
}

/// Centres 2D input on the origin and scales it uniformly to `target_size`.
pub fn normalize_points_2d(
    points: &[Vector2<f32>],
    options: &NormalizeOptions,
) -> Vec<Vector3<f32>> {
    if points.is_empty() {
        return Vec::new();
    }
    let (mut min, mut max) = (points[0], points[0]);
    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    let center = (min + max) * 0.5;
    let extent = (max.x - min.x).max(max.y - min.y);
    let scale = if extent > f32::EPSILON {
        options.target_size / extent
    } else {
        1.0
    };
    let y_sign = if options.flip_y { -1.0 } else { 1.0 };

    points
        .iter()
        .map(|p| {
            let local = (*p - center) * scale;
            Vector3::new(local.x, local.y * y_sign, options.depth)
        })
        .collect()
}

/// Drops every point closer than `min_distance` to the last kept point.
pub fn dedupe_points(points: &[Vector3<f32>], min_distance: f32) -> Vec<Vector3<f32>> {
    let mut kept: Vec<Vector3<f32>> = Vec::with_capacity(points.len());
    for &p in points {
        match kept.last() {
            Some(last) if (p - *last).magnitude() < min_distance => {}
            _ => kept.push(p),
        }
    }
    kept
}

/// Total length of the polyline through `points`.
pub fn path_length(points: &[Vector3<f32>]) -> f32 {
    points.windows(2).map(|w| (w[1] - w[0]).magnitude()).sum()
}

/// Smooths `points` with a centripetal Catmull-Rom spline and returns `count`
/// points evenly spaced along its arc length.
///
/// The centripetal parametrisation never forms cusps or self-intersections
/// inside a span, which keeps the ribbon's normal field well behaved.
pub fn centripetal_resample(points: &[Vector3<f32>], count: usize) -> Vec<Vector3<f32>> {
    if points.len() < 2 {
        return points.to_vec();
    }
    let count = count.max(2);

    let n = points.len();
    let mut dense = Vec::with_capacity((n - 1) * SAMPLES_PER_SPAN + 1);
    for i in 0..n - 1 {
        let p1 = points[i];
        let p2 = points[i + 1];
        let p0 = if i == 0 { p1 * 2.0 - p2 } else { points[i - 1] };
        let p3 = if i + 2 < n { points[i + 2] } else { p2 * 2.0 - p1 };
        for s in 0..SAMPLES_PER_SPAN {
            dense.push(catmull_rom(p0, p1, p2, p3, s as f32 / SAMPLES_PER_SPAN as f32));
        }
    }
    dense.push(points[n - 1]);

    resample_by_arc_length(&dense, count)
}

fn knot(ti: f32, a: Vector3<f32>, b: Vector3<f32>) -> f32 {
    // Coincident control points would collapse the knot interval.
    ti + (b - a).magnitude().powf(CENTRIPETAL_ALPHA).max(1e-4)
}

/// Barry-Goldman evaluation of the span between `p1` and `p2` at `u` in [0, 1].
fn catmull_rom(
    p0: Vector3<f32>,
    p1: Vector3<f32>,
    p2: Vector3<f32>,
    p3: Vector3<f32>,
    u: f32,
) -> Vector3<f32> {
    let t0 = 0.0;
    let t1 = knot(t0, p0, p1);
    let t2 = knot(t1, p1, p2);
    let t3 = knot(t2, p2, p3);
    let t = t1 + (t2 - t1) * u;

    let a1 = p0 * ((t1 - t) / (t1 - t0)) + p1 * ((t - t0) / (t1 - t0));
    let a2 = p1 * ((t2 - t) / (t2 - t1)) + p2 * ((t - t1) / (t2 - t1));
    let a3 = p2 * ((t3 - t) / (t3 - t2)) + p3 * ((t - t2) / (t3 - t2));
    let b1 = a1 * ((t2 - t) / (t2 - t0)) + a2 * ((t - t0) / (t2 - t0));
    let b2 = a2 * ((t3 - t) / (t3 - t1)) + a3 * ((t - t1) / (t3 - t1));
    b1 * ((t2 - t) / (t2 - t1)) + b2 * ((t - t1) / (t2 - t1))
}

fn resample_by_arc_length(points: &[Vector3<f32>], count: usize) -> Vec<Vector3<f32>> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for w in points.windows(2) {
        total += (w[1] - w[0]).magnitude();
        cumulative.push(total);
    }
    if total <= f32::EPSILON {
        return vec![points[0]; 1];
    }

    let mut out = Vec::with_capacity(count);
    let mut span = 0;
    for k in 0..count {
        let target = total * k as f32 / (count - 1) as f32;
        while span + 1 < cumulative.len() - 1 && cumulative[span + 1] < target {
            span += 1;
        }
        let start = cumulative[span];
        let len = cumulative[span + 1] - start;
        let f = if len > 0.0 { ((target - start) / len).clamp(0.0, 1.0) } else { 0.0 };
        out.push(points[span].lerp(points[span + 1], f));
    }
    out
}

/// Options for [`prepare_path`].
#[derive(Clone, Copy, Debug)]
pub struct PathOptions {
    pub normalize: NormalizeOptions,
    pub dedupe_distance: f32,
    pub resample_points: usize,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            normalize: NormalizeOptions::default(),
            dedupe_distance: 1e-3,
            resample_points: 200,
        }
    }
}

/// Normalizes, dedupes and smooths raw 2D input in one go.
///
/// Returns fewer than two points when the input is degenerate; the ribbon
/// builder treats that as an empty path.
pub fn prepare_path(raw: &[Vector2<f32>], options: &PathOptions) -> Vec<Vector3<f32>> {
    let normalized = normalize_points_2d(raw, &options.normalize);
    let unique = dedupe_points(&normalized, options.dedupe_distance);
    if unique.len() < 2 {
        return unique;
    }
    centripetal_resample(&unique, options.resample_points)
}
