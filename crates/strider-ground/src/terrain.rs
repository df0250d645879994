//! Analytic ground samplers and a latent probe service over them.
//!
//! [`LatentProbeService`] stands in for a physics engine's ray-cast job
//! system: it answers vertical rays against any [`GroundSampler`] and holds
//! each batch back for a configurable number of polls.

use nalgebra::{Point3, Vector3};

use strider_core::config::MAX_PROBE_SAMPLES;

use crate::probe::{ProbeHandle, ProbePoll, ProbeRequest, ProbeResult, ProbeService};

/// Ground height and normal at a horizontal position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundSample {
    pub height: f32,
    pub normal: Vector3<f32>,
}

/// Terrain that can be queried by horizontal position.
pub trait GroundSampler {
    /// Ground under `(x, z)`, or `None` over a hole / outside the terrain.
    fn sample(&self, x: f32, z: f32) -> Option<GroundSample>;

    /// Cast a vertical ray. `ray` must point down; its length bounds the hit.
    fn cast_down(&self, origin: &Point3<f32>, ray: &Vector3<f32>) -> ProbeResult {
        let Some(sample) = self.sample(origin.x, origin.z) else {
            return ProbeResult::miss();
        };
        let bottom = origin.y + ray.y.min(0.0);
        if sample.height > origin.y || sample.height < bottom {
            return ProbeResult::miss();
        }
        ProbeResult::hit(Point3::new(origin.x, sample.height, origin.z), sample.normal)
    }
}

// ---------------------------------------------------------------------------
// FlatGround
// ---------------------------------------------------------------------------

/// Infinite horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlatGround {
    pub height: f32,
}

impl GroundSampler for FlatGround {
    fn sample(&self, _x: f32, _z: f32) -> Option<GroundSample> {
        Some(GroundSample {
            height: self.height,
            normal: Vector3::y(),
        })
    }
}

// ---------------------------------------------------------------------------
// HeightField
// ---------------------------------------------------------------------------

/// Regular grid of heights with bilinear interpolation.
///
/// Row-major with `columns` samples along X; `origin` is the world position
/// of sample `(0, 0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    origin: Point3<f32>,
    cell: f32,
    columns: usize,
    rows: usize,
    heights: Vec<f32>,
}

impl HeightField {
    /// `None` when the grid is smaller than 2x2, `heights` has the wrong
    /// length or `cell` is not positive.
    #[must_use]
    pub fn new(
        origin: Point3<f32>,
        cell: f32,
        columns: usize,
        rows: usize,
        heights: Vec<f32>,
    ) -> Option<Self> {
        if columns < 2 || rows < 2 || heights.len() != columns * rows || cell <= 0.0 {
            return None;
        }
        Some(Self {
            origin,
            cell,
            columns,
            rows,
            heights,
        })
    }

    /// Grid filled from a height function of world `(x, z)`.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_fn(
        origin: Point3<f32>,
        cell: f32,
        columns: usize,
        rows: usize,
        f: impl Fn(f32, f32) -> f32,
    ) -> Option<Self> {
        let heights = (0..rows)
            .flat_map(|r| (0..columns).map(move |c| (c, r)))
            .map(|(c, r)| {
                f(
                    (c as f32).mul_add(cell, origin.x),
                    (r as f32).mul_add(cell, origin.z),
                )
            })
            .collect();
        Self::new(origin, cell, columns, rows, heights)
    }

    fn at(&self, c: usize, r: usize) -> f32 {
        self.heights[r * self.columns + c] + self.origin.y
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn height(&self, x: f32, z: f32) -> Option<f32> {
        let fx = (x - self.origin.x) / self.cell;
        let fz = (z - self.origin.z) / self.cell;
        let max_x = (self.columns - 1) as f32;
        let max_z = (self.rows - 1) as f32;
        if !(0.0..=max_x).contains(&fx) || !(0.0..=max_z).contains(&fz) {
            return None;
        }
        let c0 = (fx.floor() as usize).min(self.columns - 2);
        let r0 = (fz.floor() as usize).min(self.rows - 2);
        let tx = fx - c0 as f32;
        let tz = fz - r0 as f32;
        let a = (self.at(c0 + 1, r0) - self.at(c0, r0)).mul_add(tx, self.at(c0, r0));
        let b = (self.at(c0 + 1, r0 + 1) - self.at(c0, r0 + 1)).mul_add(tx, self.at(c0, r0 + 1));
        Some((b - a).mul_add(tz, a))
    }
}

impl GroundSampler for HeightField {
    fn sample(&self, x: f32, z: f32) -> Option<GroundSample> {
        let height = self.height(x, z)?;
        let h = self.cell * 0.5;
        let dx = self.height(x + h, z).unwrap_or(height) - self.height(x - h, z).unwrap_or(height);
        let dz = self.height(x, z + h).unwrap_or(height) - self.height(x, z - h).unwrap_or(height);
        let normal = Vector3::new(-dx / (2.0 * h), 1.0, -dz / (2.0 * h))
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::y);
        Some(GroundSample { height, normal })
    }
}

impl<F> GroundSampler for F
where
    F: Fn(f32, f32) -> Option<GroundSample>,
{
    fn sample(&self, x: f32, z: f32) -> Option<GroundSample> {
        self(x, z)
    }
}

// ---------------------------------------------------------------------------
// LatentProbeService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct InFlight {
    handle: ProbeHandle,
    polls_left: u32,
    results: [ProbeResult; MAX_PROBE_SAMPLES],
    count: usize,
}

/// Probe service answering rays against a [`GroundSampler`].
///
/// Each batch reports `Pending` for `latency` polls and then `Ready`.
/// Results are computed at request time, like a job that snapshots the
/// collision world when it is kicked.
#[derive(Debug, Clone)]
pub struct LatentProbeService<S> {
    sampler: S,
    latency: u32,
    next_handle: u64,
    in_flight: Vec<InFlight>,
}

impl<S: GroundSampler> LatentProbeService<S> {
    #[must_use]
    pub const fn new(sampler: S, latency: u32) -> Self {
        Self {
            sampler,
            latency,
            next_handle: 0,
            in_flight: Vec::new(),
        }
    }

    #[must_use]
    pub const fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Swap the terrain; batches already issued keep their results.
    pub fn set_sampler(&mut self, sampler: S) {
        self.sampler = sampler;
    }

    /// Batches issued and not yet collected or released.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<S: GroundSampler> ProbeService for LatentProbeService<S> {
    fn request_batch(&mut self, request: &ProbeRequest) -> ProbeHandle {
        self.next_handle += 1;
        let handle = ProbeHandle(self.next_handle);
        let count = request.sample_count.min(MAX_PROBE_SAMPLES);
        let mut results = [ProbeResult::miss(); MAX_PROBE_SAMPLES];
        for (i, result) in results.iter_mut().take(count).enumerate() {
            let (origin, ray) = request.ray(i);
            *result = self.sampler.cast_down(&origin, &ray);
        }
        self.in_flight.push(InFlight {
            handle,
            polls_left: self.latency,
            results,
            count,
        });
        handle
    }

    fn poll_batch(&mut self, handle: ProbeHandle, results: &mut [ProbeResult]) -> ProbePoll {
        let Some(index) = self.in_flight.iter().position(|b| b.handle == handle) else {
            return ProbePoll::Unknown;
        };
        let batch = &mut self.in_flight[index];
        if batch.polls_left > 0 {
            batch.polls_left -= 1;
            return ProbePoll::Pending;
        }
        let n = batch.count.min(results.len());
        results[..n].copy_from_slice(&batch.results[..n]);
        self.in_flight.swap_remove(index);
        ProbePoll::Ready(n)
    }

    fn release(&mut self, handle: ProbeHandle) {
        self.in_flight.retain(|b| b.handle != handle);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strider_core::config::GroundProbeConfig;

    #[test]
    fn flat_ground_hits_within_ray() {
        let ground = FlatGround { height: 0.2 };
        let hit = ground.cast_down(&Point3::new(1.0, 2.5, 0.0), &Vector3::new(0.0, -5.0, 0.0));
        assert!(hit.valid);
        assert_relative_eq!(hit.contact, Point3::new(1.0, 0.2, 0.0));

        let short = ground.cast_down(&Point3::new(1.0, 2.5, 0.0), &Vector3::new(0.0, -1.0, 0.0));
        assert!(!short.valid);

        let below = ground.cast_down(&Point3::new(1.0, 0.0, 0.0), &Vector3::new(0.0, -1.0, 0.0));
        assert!(!below.valid);
    }

    #[test]
    fn heightfield_interpolates_ramp() {
        let field =
            HeightField::from_fn(Point3::new(-2.0, 0.0, -2.0), 0.5, 9, 9, |x, _| 0.5 * x).unwrap();
        let sample = field.sample(0.3, 0.1).unwrap();
        assert_relative_eq!(sample.height, 0.15, epsilon = 1e-5);
        let expected = Vector3::new(-0.5, 1.0, 0.0).normalize();
        assert_relative_eq!(sample.normal, expected, epsilon = 1e-4);
        assert!(field.sample(5.0, 0.0).is_none());
    }

    #[test]
    fn heightfield_rejects_bad_shapes() {
        assert!(HeightField::new(Point3::origin(), 1.0, 1, 4, vec![0.0; 4]).is_none());
        assert!(HeightField::new(Point3::origin(), 1.0, 2, 2, vec![0.0; 3]).is_none());
        assert!(HeightField::new(Point3::origin(), 0.0, 2, 2, vec![0.0; 4]).is_none());
    }

    #[test]
    fn closures_are_samplers() {
        let hole = |x: f32, _z: f32| {
            (x < 0.0).then(|| GroundSample {
                height: 0.0,
                normal: Vector3::y(),
            })
        };
        assert!(hole.sample(-1.0, 0.0).is_some());
        assert!(hole.sample(1.0, 0.0).is_none());
    }

    #[test]
    fn latency_delays_ready() {
        let mut service = LatentProbeService::new(FlatGround::default(), 2);
        let request = ProbeRequest::new(
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::origin(),
            &GroundProbeConfig::default(),
        );
        let handle = service.request_batch(&request);
        let mut results = [ProbeResult::miss(); 4];
        assert_eq!(service.poll_batch(handle, &mut results), ProbePoll::Pending);
        assert_eq!(service.poll_batch(handle, &mut results), ProbePoll::Pending);
        assert_eq!(service.poll_batch(handle, &mut results), ProbePoll::Ready(4));
        assert!(results.iter().all(|r| r.valid));
        assert_eq!(service.poll_batch(handle, &mut results), ProbePoll::Unknown);
        assert_eq!(service.in_flight(), 0);
    }

    #[test]
    fn release_drops_batch() {
        let mut service = LatentProbeService::new(FlatGround::default(), 0);
        let request = ProbeRequest::new(
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::origin(),
            &GroundProbeConfig::default(),
        );
        let handle = service.request_batch(&request);
        service.release(handle);
        let mut results = [ProbeResult::miss(); 4];
        assert_eq!(service.poll_batch(handle, &mut results), ProbePoll::Unknown);
    }
}
