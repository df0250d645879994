//! Ground surface model: a convex ground hull in a local "hull space".
//!
//! Hull space puts the origin at the sampling line start with
//!
//! - X along the flattened start→end direction,
//! - Z along world up,
//! - Y = Z × X, the lateral axis.
//!
//! The hull polygon lives in hull X/Z (a vertical profile of the ground under
//! the line) and its band is the lateral Y extent. Height queries cast down
//! the hull Z axis onto the polygon's upper edges.

use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use tracing::{debug, trace};

use strider_core::config::{GroundProbeConfig, MAX_PROBE_SAMPLES};
use strider_core::error::{FaultLog, GroundFault};
use strider_core::math::{EPSILON, flatten, sanitize_ground_normal, try_normalize, up};
use strider_core::types::FrameNumber;

use crate::hull::ConvexHull2D;
use crate::plane::Plane;
use crate::probe::{PendingProbePool, ProbeRequest, ProbeResult, ProbeService};

// ---------------------------------------------------------------------------
// GroundModelState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundModelState {
    /// Nothing built and nothing requested.
    NoModel,
    /// No valid model yet, but batches are in flight.
    ProbesPending,
    /// Queries are served.
    ModelValid,
}

/// Ground point and normal found by a cast, both in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundHit {
    pub point: Point3<f32>,
    pub normal: Vector3<f32>,
}

// ---------------------------------------------------------------------------
// GroundSurfaceModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GroundSurfaceModel {
    config: GroundProbeConfig,
    hull: ConvexHull2D,
    hull_to_world: Isometry3<f32>,
    world_to_hull: Isometry3<f32>,
    /// Boundary planes through the outermost accepted contacts (hull space).
    min_plane: Plane,
    max_plane: Plane,
    min_x: f32,
    max_x: f32,
    valid: bool,
    pool: PendingProbePool,
    last_consumed: Option<FrameNumber>,
    faults: FaultLog,
}

impl Default for GroundSurfaceModel {
    fn default() -> Self {
        Self::new(GroundProbeConfig::default())
    }
}

impl GroundSurfaceModel {
    #[must_use]
    pub fn new(config: GroundProbeConfig) -> Self {
        Self {
            config,
            hull: ConvexHull2D::new(),
            hull_to_world: Isometry3::identity(),
            world_to_hull: Isometry3::identity(),
            min_plane: Plane::default(),
            max_plane: Plane::default(),
            min_x: 0.0,
            max_x: 0.0,
            valid: false,
            pool: PendingProbePool::new(),
            last_consumed: None,
            faults: FaultLog::default(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &GroundProbeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GroundProbeConfig) {
        self.config = config;
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub fn state(&self) -> GroundModelState {
        if self.valid {
            GroundModelState::ModelValid
        } else if self.pool.in_flight() > 0 {
            GroundModelState::ProbesPending
        } else {
            GroundModelState::NoModel
        }
    }

    #[must_use]
    pub const fn hull(&self) -> &ConvexHull2D {
        &self.hull
    }

    #[must_use]
    pub const fn hull_to_world(&self) -> &Isometry3<f32> {
        &self.hull_to_world
    }

    #[must_use]
    pub const fn world_to_hull(&self) -> &Isometry3<f32> {
        &self.world_to_hull
    }

    /// Hull-space X range between the outermost accepted contacts.
    #[must_use]
    pub const fn valid_x_range(&self) -> (f32, f32) {
        (self.min_x, self.max_x)
    }

    /// Faults recovered during the last `find_ground` or rebuild.
    #[must_use]
    pub const fn faults(&self) -> &FaultLog {
        &self.faults
    }

    /// Frame of the last batch turned into a model.
    #[must_use]
    pub const fn last_consumed_frame(&self) -> Option<FrameNumber> {
        self.last_consumed
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Drop the model and every in-flight batch.
    pub fn reset(&mut self, service: &mut dyn ProbeService) {
        self.pool.clear(service);
        self.hull.clear();
        self.valid = false;
        self.last_consumed = None;
        self.faults.clear();
    }

    // -----------------------------------------------------------------------
    // Probing
    // -----------------------------------------------------------------------

    /// Per-frame entry point.
    ///
    /// Polls in-flight batches, rebuilds from the newest completed batch if
    /// it is newer than the last one consumed, then issues a new batch along
    /// `start`→`end` for `frame`. Never blocks.
    pub fn find_ground(
        &mut self,
        service: &mut dyn ProbeService,
        start: Point3<f32>,
        end: Point3<f32>,
        reference: Point3<f32>,
        frame: FrameNumber,
    ) -> GroundModelState {
        self.faults.clear();
        self.pool.poll(service);

        let newest = self
            .pool
            .newest_complete()
            .filter(|batch| self.last_consumed.is_none_or(|last| batch.frame > last))
            .copied();
        if let Some(batch) = newest {
            self.last_consumed = Some(batch.frame);
            // Faults are recorded; the previous model stays in place.
            let _ = self.rebuild_from_probes(&batch.request, batch.results());
        }

        let request = ProbeRequest::new(start, end, reference, &self.config);
        if !self.pool.issue(service, &request, frame) {
            trace!(%frame, "probe pool full for this frame");
        }
        self.state()
    }

    /// Build the model from a completed set of probe results.
    ///
    /// The walk starts at the sample nearest the reference and runs outward
    /// both ways, each side stopping at its first unwalkable step. When that
    /// sample is missing, or the line is degenerate, the previous model is
    /// kept. Ground there steeper than the slope limit, or a walk that
    /// accepts nothing but that sample, invalidates it.
    pub fn rebuild_from_probes(
        &mut self,
        request: &ProbeRequest,
        results: &[ProbeResult],
    ) -> Result<(), GroundFault> {
        let outcome = self.construct(request, results);
        if let Err(fault) = outcome {
            debug!(%fault, "ground rebuild skipped");
            self.faults.record(fault);
        }
        outcome
    }

    fn construct(&mut self, request: &ProbeRequest, results: &[ProbeResult]) -> Result<(), GroundFault> {
        let cfg = &self.config;
        let results = &results[..results.len().min(MAX_PROBE_SAMPLES)];
        let reference = request.reference;
        let Some(anchor) = nearest_sample(request, results.len()) else {
            return Err(GroundFault::StaleOrMissingProbeData);
        };
        if !results[anchor].valid {
            return Err(GroundFault::StaleOrMissingProbeData);
        }

        let Some(x_axis) = try_normalize(&flatten(&(request.end - request.start))) else {
            return Err(GroundFault::DegenerateGeometry);
        };

        if steeper_than(reference, results, anchor, cfg.probe_radius, cfg.max_slope_deg.to_radians()) {
            self.valid = false;
            return Err(GroundFault::SlopeRejected);
        }

        let z_axis = up();
        let y_axis = z_axis.cross(&x_axis);
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            Matrix3::from_columns(&[x_axis, y_axis, z_axis]),
        ));
        let hull_to_world =
            Isometry3::from_parts(Translation3::from(request.start.coords), rotation);
        let world_to_hull = hull_to_world.inverse();

        // Walk outward from the anchor; each side stops at its first step too
        // large to be walkable.
        let (lo, cut_back) = walk_outward(results, anchor, (0..anchor).rev(), cfg);
        let (hi, cut_ahead) = walk_outward(results, anchor, anchor + 1..results.len(), cfg);
        if lo == hi {
            if cut_back || cut_ahead {
                self.valid = false;
                return Err(GroundFault::SlopeRejected);
            }
            return Err(GroundFault::StaleOrMissingProbeData);
        }

        let (first, last) = (&results[lo], &results[hi]);
        let start_ground = first.contact;
        let end_ground = last.contact;
        let start_normal = sanitize_ground_normal(&first.normal, cfg.min_normal_y);
        let end_normal = sanitize_ground_normal(&last.normal, cfg.min_normal_y);

        let line = end_ground - start_ground;
        let line_normal = try_normalize(&line.cross(&up()).cross(&line)).unwrap_or_else(up);

        let mut points = [Point3::origin(); MAX_PROBE_SAMPLES];
        let mut count = 0;
        points[count] = world_to_hull * start_ground;
        count += 1;
        points[count] = world_to_hull * end_ground;
        count += 1;
        for result in results[lo + 1..hi].iter().rev() {
            if result.valid
                && line_normal.dot(&(result.contact - start_ground)) > cfg.interior_min_rise
            {
                points[count] = world_to_hull * result.contact;
                count += 1;
            }
        }

        let start_hs = points[0];
        let end_hs = points[1];
        self.hull.build(&points[..count], cfg.hull_y_padding);
        self.min_plane = Plane::from_point_normal(&start_hs, &(world_to_hull * start_normal));
        self.max_plane = Plane::from_point_normal(&end_hs, &(world_to_hull * end_normal));
        self.min_x = start_hs.x;
        self.max_x = end_hs.x;
        self.hull_to_world = hull_to_world;
        self.world_to_hull = world_to_hull;
        self.valid = true;
        trace!(
            vertices = self.hull.len(),
            anchor,
            lo,
            hi,
            truncated = cut_back || cut_ahead,
            "ground hull rebuilt"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Cast a world-space ray against the hull.
    ///
    /// The ray is flattened onto its vertical plane in hull space; the
    /// nearest hull edge crossing wins. Without a crossing, the min or max
    /// boundary plane serves queries within the padded valid range.
    #[must_use]
    pub fn cast_ray_to_hull(&self, pos: &Point3<f32>, dir: &Vector3<f32>) -> Option<GroundHit> {
        if !self.valid {
            return None;
        }
        let (point, normal) =
            self.cast_in_hull_space(&(self.world_to_hull * pos), &(self.world_to_hull * dir))?;
        Some(GroundHit {
            point: self.hull_to_world * point,
            normal: self.hull_to_world * normal,
        })
    }

    fn cast_in_hull_space(
        &self,
        pos: &Point3<f32>,
        dir: &Vector3<f32>,
    ) -> Option<(Point3<f32>, Vector3<f32>)> {
        let dir_flat = Vector3::new(dir.x, 0.0, dir.z);
        let len_sq = dir_flat.norm_squared();
        if len_sq < EPSILON * EPSILON {
            return None;
        }
        let cut_normal = Vector3::y().cross(&dir_flat);
        let origin = Point3::new(pos.x, 0.0, pos.z);

        let mut best: Option<(f32, Point3<f32>, Vector3<f32>)> = None;
        for (a, b) in self.hull.edges() {
            let a = Point3::new(a.x, 0.0, a.z);
            let edge = Vector3::new(b.x, 0.0, b.z) - a.coords;
            let denom = cut_normal.dot(&edge);
            if denom.abs() < EPSILON * EPSILON {
                continue;
            }
            let t = cut_normal.dot(&(origin - a)) / denom;
            if !(-EPSILON..=1.0 + EPSILON).contains(&t) {
                continue;
            }
            let hit = a + edge * t.clamp(0.0, 1.0);
            let s = (hit - origin).dot(&dir_flat) / len_sq;
            if s < 0.0 || best.is_some_and(|(best_s, ..)| s >= best_s) {
                continue;
            }
            let Some(mut normal) = try_normalize(&edge.cross(&Vector3::y())) else {
                continue;
            };
            if normal.dot(&dir_flat) > 0.0 {
                normal = -normal;
            }
            best = Some((s, hit, normal));
        }
        if let Some((_, hit, normal)) = best {
            return Some((Point3::new(hit.x, pos.y, hit.z), normal));
        }

        let pad = self.config.outer_range_padding;
        if pos.x < self.min_x - pad || pos.x > self.max_x + pad {
            return None;
        }
        let plane = if pos.x > self.max_x {
            &self.max_plane
        } else {
            &self.min_plane
        };
        let t = plane.intersect_ray(&origin, &dir_flat)?;
        if t <= 0.0 {
            return None;
        }
        let hit = origin + dir_flat * t;
        Some((Point3::new(hit.x, pos.y, hit.z), *plane.normal()))
    }

    /// Vertical cast from above the sampling plane at `pos`.
    fn cast_down(&self, pos: &Point3<f32>) -> Option<GroundHit> {
        if !self.valid {
            return None;
        }
        let mut p = self.world_to_hull * pos;
        p.y = 0.0;
        p.z = self.config.cast_height;
        let (point, normal) = self.cast_in_hull_space(&p, &-Vector3::z())?;
        Some(GroundHit {
            point: self.hull_to_world * point,
            normal: self.hull_to_world * normal,
        })
    }

    /// Ground under `pos`: `pos` with its Y replaced by the ground height.
    #[must_use]
    pub fn project_point_to_ground(&self, pos: &Point3<f32>) -> Option<Point3<f32>> {
        self.cast_down(pos)
            .map(|hit| Point3::new(pos.x, hit.point.y, pos.z))
    }

    #[must_use]
    pub fn ground_normal_at(&self, pos: &Point3<f32>) -> Option<Vector3<f32>> {
        self.cast_down(pos).map(|hit| hit.normal)
    }

    /// Nearest ground point on the sampling line, clamped into the hull.
    #[must_use]
    pub fn closest_point_on_ground(&self, pos: &Point3<f32>) -> Option<Point3<f32>> {
        if !self.valid {
            return None;
        }
        let mut p = self.world_to_hull * pos;
        p.y = 0.0;
        self.hull.clamp_to_hull(&mut p);
        p.z = self.config.cast_height;
        let (point, _) = self.cast_in_hull_space(&p, &-Vector3::z())?;
        Some(self.hull_to_world * point)
    }

    /// Make sure the model does not put ground below a known solid point.
    ///
    /// When the projected ground at `pos` is missing or lower than `pos`,
    /// `pos` becomes a hull vertex. Returns whether the hull changed.
    /// An invalid model has no hull space to insert into and is left as is;
    /// the next accepted batch replaces it anyway.
    pub fn enforce_point_on_ground(&mut self, pos: &Point3<f32>) -> bool {
        if !self.valid {
            return false;
        }
        if self
            .project_point_to_ground(pos)
            .is_some_and(|ground| ground.y >= pos.y)
        {
            return false;
        }
        let mut p = self.world_to_hull * pos;
        p.y = 0.0;
        if !self.hull.add_point(p, self.config.hull_y_padding) {
            return false;
        }
        self.min_x = self.min_x.min(p.x);
        self.max_x = self.max_x.max(p.x);
        true
    }
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

/// Index of the ray whose origin is horizontally closest to the reference.
/// Ties go to the earlier sample.
fn nearest_sample(request: &ProbeRequest, count: usize) -> Option<usize> {
    let distance = |i: usize| flatten(&(request.ray(i).0 - request.reference)).norm_squared();
    (0..count).reduce(|best, i| if distance(i) < distance(best) { i } else { best })
}

/// Whether the ground at the anchor is too steep to stand on.
///
/// Measured from the reference to the anchor contact. When the anchor sits
/// right under the reference, the gradient to its nearest valid neighbour is
/// used instead, ahead first.
fn steeper_than(
    reference: Point3<f32>,
    results: &[ProbeResult],
    anchor: usize,
    min_run: f32,
    max_slope: f32,
) -> bool {
    let contact = results[anchor].contact;
    let run = flatten(&(contact - reference)).norm();
    let (rise, run) = if run > min_run {
        (contact.y - reference.y, run)
    } else {
        let neighbour = results[anchor + 1..]
            .iter()
            .find(|r| r.valid)
            .or_else(|| results[..anchor].iter().rev().find(|r| r.valid));
        let Some(neighbour) = neighbour else {
            return false;
        };
        (
            neighbour.contact.y - contact.y,
            flatten(&(neighbour.contact - contact)).norm(),
        )
    };
    run > EPSILON && rise.atan2(run).abs() > max_slope
}

/// Follow valid samples away from `anchor`, comparing each with the last
/// accepted one. Returns the outermost accepted index and whether a step
/// cut the walk short.
fn walk_outward(
    results: &[ProbeResult],
    anchor: usize,
    indices: impl Iterator<Item = usize>,
    cfg: &GroundProbeConfig,
) -> (usize, bool) {
    let mut last = anchor;
    for i in indices {
        if !results[i].valid {
            continue;
        }
        let dy = results[i].contact.y - results[last].contact.y;
        if dy > cfg.max_step_up || dy < -cfg.max_step_down {
            return (last, true);
        }
        last = i;
    }
    (last, false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
