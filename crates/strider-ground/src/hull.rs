//! Convex hull of points projected onto the XZ plane, extruded along Y.
//!
//! The polygon is built with an angular gift-wrap starting at the vertex
//! furthest along -X. Vertex `i` and vertex `i + 1` form an edge; each edge
//! with non-zero length gets an outward vertical plane. A `[y_min, y_max]`
//! band padded by the caller's threshold bounds the hull vertically.
//!
//! Storage is fixed-size; building and querying never allocate.

use std::f32::consts::PI;

use nalgebra::{Point3, Vector3};

use strider_core::math::EPSILON;

use crate::plane::{Plane, closest_point_on_segment};

/// Vertex and plane capacity.
pub const MAX_HULL_VERTICES: usize = 32;

/// Angles closer than this are treated as equal during the wrap.
const ANGLE_EPSILON: f32 = 1e-6;

/// Plane distance still treated as inside, so points clamped onto the
/// boundary test as inside.
const INSIDE_TOLERANCE: f32 = EPSILON;

/// Angle of `v` in the XZ plane relative to `zero`, wrapped to `[-PI, PI]`.
fn relative_xz_angle(v: &Vector3<f32>, zero: &Vector3<f32>) -> f32 {
    let angle = v.z.atan2(v.x) - zero.z.atan2(zero.x);
    if angle < -PI {
        angle + 2.0 * PI
    } else if angle > PI {
        angle - 2.0 * PI
    } else {
        angle
    }
}

fn xz(p: &Point3<f32>) -> Point3<f32> {
    Point3::new(p.x, 0.0, p.z)
}

#[derive(Debug, Clone)]
pub struct ConvexHull2D {
    vertices: [Point3<f32>; MAX_HULL_VERTICES],
    vertex_count: usize,
    planes: [Plane; MAX_HULL_VERTICES],
    plane_count: usize,
    y_min: f32,
    y_max: f32,
}

impl Default for ConvexHull2D {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvexHull2D {
    /// Empty hull.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: [Point3::origin(); MAX_HULL_VERTICES],
            vertex_count: 0,
            planes: [Plane::default(); MAX_HULL_VERTICES],
            plane_count: 0,
            y_min: 0.0,
            y_max: 0.0,
        }
    }

    #[must_use]
    pub fn from_points(points: &[Point3<f32>], y_pad: f32) -> Self {
        let mut hull = Self::new();
        hull.build(points, y_pad);
        hull
    }

    pub fn clear(&mut self) {
        self.vertex_count = 0;
        self.plane_count = 0;
        self.y_min = 0.0;
        self.y_max = 0.0;
    }

    /// Replace the hull with the convex hull of `points`.
    ///
    /// Points beyond [`MAX_HULL_VERTICES`] are ignored. Collinear input
    /// yields a two-vertex segment hull; a single point yields a one-vertex
    /// hull.
    pub fn build(&mut self, points: &[Point3<f32>], y_pad: f32) {
        self.clear();
        let points = &points[..points.len().min(MAX_HULL_VERTICES)];
        let Some(first) = Self::start_index(points) else {
            return;
        };

        let mut used = [false; MAX_HULL_VERTICES];
        let mut order = [0_usize; MAX_HULL_VERTICES];
        let mut count = 0;

        let mut current = first;
        let mut previous_edge = Vector3::z();
        let mut worst_angle = -PI;

        loop {
            used[current] = true;
            order[count] = current;
            count += 1;
            if count == MAX_HULL_VERTICES {
                break;
            }

            let origin = points[current];
            let mut best: Option<(usize, f32, f32)> = None;
            for (i, p) in points.iter().enumerate() {
                if used[i] {
                    continue;
                }
                let edge = xz(p) - xz(&origin);
                let len_sq = edge.norm_squared();
                if len_sq <= EPSILON * EPSILON {
                    continue;
                }
                let angle = relative_xz_angle(&edge, &previous_edge);
                if angle >= 0.0 {
                    continue;
                }
                best = match best {
                    None if angle > worst_angle => Some((i, angle, len_sq)),
                    Some((_, best_angle, best_len))
                        if angle > best_angle + ANGLE_EPSILON
                            || (angle > worst_angle
                                && (angle - best_angle).abs() <= ANGLE_EPSILON
                                && len_sq > best_len) =>
                    {
                        Some((i, angle, len_sq))
                    }
                    other => other,
                };
            }

            let Some((next, _, _)) = best else {
                break;
            };
            previous_edge = xz(&points[next]) - xz(&origin);

            // The first edge keeps the -PI bound; afterwards the bound is the
            // turn back to the start vertex.
            if current != first {
                let back = xz(&points[first]) - xz(&points[next]);
                if back.norm_squared() <= EPSILON * EPSILON {
                    break;
                }
                let angle = relative_xz_angle(&back, &previous_edge);
                if angle >= 0.5 * PI {
                    worst_angle = angle - 2.0 * PI;
                } else if angle >= 0.0 {
                    // `next` sits on the closing edge.
                    break;
                } else {
                    worst_angle = angle;
                }
            }
            current = next;
        }

        for (slot, &index) in order[..count].iter().enumerate() {
            self.vertices[slot] = points[index];
        }
        self.vertex_count = count;
        self.rebuild_planes(y_pad);
    }

    /// Leftmost point; ties go to the largest Z so the first turn is valid.
    #[allow(clippy::float_cmp)]
    fn start_index(points: &[Point3<f32>]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, p) in points.iter().enumerate() {
            best = match best {
                Some(b) if p.x > points[b].x || (p.x == points[b].x && p.z <= points[b].z) => {
                    Some(b)
                }
                _ => Some(i),
            };
        }
        best
    }

    fn rebuild_planes(&mut self, y_pad: f32) {
        self.plane_count = 0;
        if self.vertex_count == 0 {
            return;
        }
        let mut start = self.vertices[self.vertex_count - 1];
        for i in 0..self.vertex_count {
            let end = self.vertices[i];
            let normal = (end - start).cross(&Vector3::y());
            if let Some(normal) = normal.try_normalize(EPSILON) {
                self.planes[self.plane_count] = Plane::from_point_normal(&start, &normal);
                self.plane_count += 1;
            }
            start = end;
        }

        let (lo, hi) = self
            .vertices()
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.y), hi.max(v.y)));
        self.y_min = lo - y_pad;
        self.y_max = hi + y_pad;
    }

    /// Rebuild with one extra point. Returns `false` when the hull is full.
    pub fn add_point(&mut self, point: Point3<f32>, y_pad: f32) -> bool {
        if self.vertex_count >= MAX_HULL_VERTICES {
            return false;
        }
        let mut points = self.vertices;
        points[self.vertex_count] = point;
        let count = self.vertex_count + 1;
        self.build(&points[..count], y_pad);
        true
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices[..self.vertex_count]
    }

    #[must_use]
    pub fn planes(&self) -> &[Plane] {
        &self.planes[..self.plane_count]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.vertex_count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    #[must_use]
    pub const fn y_range(&self) -> (f32, f32) {
        (self.y_min, self.y_max)
    }

    /// Edges as `(start, end)` pairs, closing back to the first vertex.
    pub fn edges(&self) -> impl Iterator<Item = (Point3<f32>, Point3<f32>)> + '_ {
        let n = self.vertex_count;
        (0..n).map(move |i| {
            let start = self.vertices[(i + n - 1) % n];
            (start, self.vertices[i])
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Inside the band and behind every edge plane. Needs at least 3 vertices.
    #[must_use]
    pub fn is_inside(&self, p: &Point3<f32>) -> bool {
        if self.vertex_count < 3 {
            return false;
        }
        if p.y < self.y_min || p.y > self.y_max {
            return false;
        }
        self.planes()
            .iter()
            .all(|plane| plane.signed_distance(p) <= INSIDE_TOLERANCE)
    }

    /// Nearest point on the hull walls.
    ///
    /// XZ comes from the nearest edge (or the segment / lone vertex for
    /// degenerate hulls). Y keeps `p.y` when it lies in the band and is
    /// clamped to the band otherwise. An empty hull returns `p`.
    #[must_use]
    pub fn closest_point_on_boundary(&self, p: &Point3<f32>) -> Point3<f32> {
        let flat = xz(p);
        let mut closest = match self.vertex_count {
            0 => return *p,
            1 => xz(&self.vertices[0]),
            2 => closest_point_on_segment(&xz(&self.vertices[0]), &xz(&self.vertices[1]), &flat),
            _ => {
                let mut best = flat;
                let mut best_dist = f32::MAX;
                for (a, b) in self.edges() {
                    let candidate = closest_point_on_segment(&xz(&a), &xz(&b), &flat);
                    let dist = (candidate - flat).norm_squared();
                    if dist < best_dist {
                        best_dist = dist;
                        best = candidate;
                    }
                }
                best
            }
        };
        closest.y = p.y.clamp(self.y_min, self.y_max);
        closest
    }

    /// Move `p` onto the boundary unless it is already inside.
    ///
    /// Returns whether `p` changed.
    pub fn clamp_to_hull(&self, p: &mut Point3<f32>) -> bool {
        if self.is_inside(p) {
            return false;
        }
        *p = self.closest_point_on_boundary(p);
        true
    }

    /// Zero when inside, otherwise the distance to the clamped point.
    #[must_use]
    pub fn outside_distance(&self, p: &Point3<f32>) -> f32 {
        let mut clamped = *p;
        if self.clamp_to_hull(&mut clamped) {
            (clamped - p).norm()
        } else {
            0.0
        }
    }

    /// Distance to the boundary, positive inside and negative outside.
    #[must_use]
    pub fn displacement_into_hull(&self, p: &Point3<f32>) -> f32 {
        let dist = (self.closest_point_on_boundary(p) - p).norm();
        if self.is_inside(p) { dist } else { -dist }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
