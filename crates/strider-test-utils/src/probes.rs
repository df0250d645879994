//! Probe fixtures: a stair-step terrain and a probe service with scripted
//! per-sample heights.

use nalgebra::{Point3, Vector3};
use strider_core::config::MAX_PROBE_SAMPLES;
use strider_ground::probe::{ProbeHandle, ProbePoll, ProbeRequest, ProbeResult, ProbeService};
use strider_ground::terrain::{GroundSample, GroundSampler};

// ---------------------------------------------------------------------------
// StepGround
// ---------------------------------------------------------------------------

/// Flat ground at `low` that rises to `high` for `z >= edge_z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepGround {
    pub low: f32,
    pub high: f32,
    pub edge_z: f32,
}

impl GroundSampler for StepGround {
    fn sample(&self, _x: f32, z: f32) -> Option<GroundSample> {
        let height = if z >= self.edge_z { self.high } else { self.low };
        Some(GroundSample {
            height,
            normal: Vector3::y(),
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedProbeService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ScriptedBatch {
    handle: ProbeHandle,
    request: ProbeRequest,
    heights: Vec<Option<f32>>,
    polls_left: u32,
}

/// Probe service that reports sample `i` at `heights[i]` (`None` is a miss).
///
/// Heights are captured when a batch is requested; `hold` keeps a batch
/// pending until `complete` is called, for out-of-order scenarios.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbeService {
    heights: Vec<Option<f32>>,
    latency: u32,
    next_handle: u64,
    batches: Vec<ScriptedBatch>,
    held: Vec<ProbeHandle>,
    requests: usize,
}

impl ScriptedProbeService {
    pub fn new(heights: &[f32], latency: u32) -> Self {
        Self {
            heights: heights.iter().copied().map(Some).collect(),
            latency,
            ..Self::default()
        }
    }

    pub fn set_heights(&mut self, heights: &[Option<f32>]) {
        self.heights = heights.to_vec();
    }

    /// Keep `handle` pending until [`Self::complete`].
    pub fn hold(&mut self, handle: ProbeHandle) {
        self.held.push(handle);
    }

    pub fn complete(&mut self, handle: ProbeHandle) {
        self.held.retain(|h| *h != handle);
    }

    /// Handle returned by the most recent request.
    pub fn last_handle(&self) -> Option<ProbeHandle> {
        (self.next_handle > 0).then_some(ProbeHandle(self.next_handle))
    }

    /// Batches requested so far.
    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn in_flight(&self) -> usize {
        self.batches.len()
    }
}

impl ProbeService for ScriptedProbeService {
    fn request_batch(&mut self, request: &ProbeRequest) -> ProbeHandle {
        self.next_handle += 1;
        self.requests += 1;
        let handle = ProbeHandle(self.next_handle);
        self.batches.push(ScriptedBatch {
            handle,
            request: *request,
            heights: self.heights.clone(),
            polls_left: self.latency,
        });
        handle
    }

    fn poll_batch(&mut self, handle: ProbeHandle, results: &mut [ProbeResult]) -> ProbePoll {
        let Some(index) = self.batches.iter().position(|b| b.handle == handle) else {
            return ProbePoll::Unknown;
        };
        if self.held.contains(&handle) {
            return ProbePoll::Pending;
        }
        let batch = &mut self.batches[index];
        if batch.polls_left > 0 {
            batch.polls_left -= 1;
            return ProbePoll::Pending;
        }
        let count = batch.request.sample_count.min(MAX_PROBE_SAMPLES).min(results.len());
        for (i, result) in results.iter_mut().take(count).enumerate() {
            let (origin, _) = batch.request.ray(i);
            *result = match batch.heights.get(i).copied().flatten() {
                Some(h) => ProbeResult::hit(Point3::new(origin.x, h, origin.z), Vector3::y()),
                None => ProbeResult::miss(),
            };
        }
        self.batches.swap_remove(index);
        ProbePoll::Ready(count)
    }

    fn release(&mut self, handle: ProbeHandle) {
        self.batches.retain(|b| b.handle != handle);
        self.held.retain(|h| *h != handle);
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

    fn request() -> ProbeRequest {
        ProbeRequest::new(
            Point3::new(0.0, 0.0, -0.75),
            Point3::new(0.0, 0.0, 0.75),
            Point3::origin(),
            &GroundProbeConfig::default(),
        )
    }

    #[test]
    fn step_ground_rises_at_edge() {
        let step = StepGround {
            low: 0.0,
            high: 0.2,
            edge_z: 0.3,
        };
        assert_relative_eq!(step.sample(0.0, 0.29).unwrap().height, 0.0);
        assert_relative_eq!(step.sample(0.0, 0.3).unwrap().height, 0.2);
    }

    #[test]
    fn scripted_heights_and_misses() {
        let mut service = ScriptedProbeService::new(&[0.0, 0.1, 0.2, 0.3], 0);
        service.set_heights(&[Some(0.0), None, Some(0.2), Some(0.3)]);
        let handle = service.request_batch(&request());
        let mut results = [ProbeResult::miss(); 4];
        assert_eq!(service.poll_batch(handle, &mut results), ProbePoll::Ready(4));
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert_relative_eq!(results[3].contact, Point3::new(0.0, 0.3, 0.75));
    }

    #[test]
    fn held_batches_stay_pending() {
        let mut service = ScriptedProbeService::new(&[0.0; 4], 0);
        let handle = service.request_batch(&request());
        service.hold(handle);
        let mut results = [ProbeResult::miss(); 4];
        assert_eq!(service.poll_batch(handle, &mut results), ProbePoll::Pending);
        service.complete(handle);
        assert_eq!(service.poll_batch(handle, &mut results), ProbePoll::Ready(4));
        assert_eq!(service.in_flight(), 0);
        assert_eq!(service.requests(), 1);
    }
}
