//! Asynchronous ground probes.
//!
//! A [`ProbeService`] runs batches of downward rays on some external job
//! system. Callers issue a batch with [`ProbeService::request_batch`] and
//! poll it on a later frame. The [`PendingProbePool`] keeps a fixed ring of
//! in-flight batches tagged by the frame that issued them.
//!
//! ```text
//! frame N:   issue ──► slot k (frame N, pending)
//! frame N+1: poll  ──► slot k complete ──► newest complete batch ──► hull
//! ```
//!
//! Reusing a slot forgets its handle, so a result that arrives for a
//! reclaimed slot is never read.

use nalgebra::{Point3, Vector3};
use tracing::trace;

use strider_core::config::{GroundProbeConfig, MAX_PROBE_SAMPLES};
use strider_core::types::FrameNumber;

/// Number of in-flight batch slots per ground model.
pub const PROBE_POOL_SLOTS: usize = 6;

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// One ray hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub contact: Point3<f32>,
    pub normal: Vector3<f32>,
    pub valid: bool,
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self::miss()
    }
}

impl ProbeResult {
    #[must_use]
    pub fn hit(contact: Point3<f32>, normal: Vector3<f32>) -> Self {
        Self {
            contact,
            normal,
            valid: true,
        }
    }

    #[must_use]
    pub fn miss() -> Self {
        Self {
            contact: Point3::origin(),
            normal: Vector3::y(),
            valid: false,
        }
    }
}

/// A line of evenly spaced downward rays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeRequest {
    /// Sampling line start (world space).
    pub start: Point3<f32>,
    /// Sampling line end (world space).
    pub end: Point3<f32>,
    /// Position the line is sampled around; rays start above its height.
    pub reference: Point3<f32>,
    pub sample_count: usize,
    /// Ray origin height above `reference`.
    pub lift: f32,
    /// Ray length, cast along -Y.
    pub length: f32,
    pub radius: f32,
}

impl ProbeRequest {
    /// Request shaped by a probe config.
    #[must_use]
    pub fn new(
        start: Point3<f32>,
        end: Point3<f32>,
        reference: Point3<f32>,
        config: &GroundProbeConfig,
    ) -> Self {
        Self {
            start,
            end,
            reference,
            sample_count: config.sample_count.clamp(1, MAX_PROBE_SAMPLES),
            lift: config.probe_lift,
            length: config.probe_length,
            radius: config.probe_radius,
        }
    }

    /// Origin and direction (scaled by length) of ray `i`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ray(&self, i: usize) -> (Point3<f32>, Vector3<f32>) {
        let t = if self.sample_count > 1 {
            i as f32 / (self.sample_count - 1) as f32
        } else {
            0.0
        };
        let mut origin = self.start + (self.end - self.start) * t;
        origin.y = self.reference.y + self.lift;
        (origin, Vector3::new(0.0, -self.length, 0.0))
    }
}

/// Opaque identifier of a batch issued to a [`ProbeService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeHandle(pub u64);

/// Outcome of polling a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePoll {
    /// Still running.
    Pending,
    /// Finished; this many results were written.
    Ready(usize),
    /// The service does not know the handle (dropped or never issued).
    Unknown,
}

/// External ray-probe job system.
pub trait ProbeService {
    /// Start a batch. Never blocks.
    fn request_batch(&mut self, request: &ProbeRequest) -> ProbeHandle;

    /// Check a batch; on completion copy its results into `results`.
    fn poll_batch(&mut self, handle: ProbeHandle, results: &mut [ProbeResult]) -> ProbePoll;

    /// The caller no longer wants `handle`.
    fn release(&mut self, _handle: ProbeHandle) {}
}

// ---------------------------------------------------------------------------
// ProbeBatch
// ---------------------------------------------------------------------------

/// Results of one request, tagged with the issuing frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeBatch {
    pub frame: FrameNumber,
    pub request: ProbeRequest,
    results: [ProbeResult; MAX_PROBE_SAMPLES],
    count: usize,
}

impl ProbeBatch {
    /// Batch with results already at hand.
    #[must_use]
    pub fn from_results(frame: FrameNumber, request: ProbeRequest, results: &[ProbeResult]) -> Self {
        let count = results.len().min(MAX_PROBE_SAMPLES);
        let mut batch = Self {
            frame,
            request,
            results: [ProbeResult::miss(); MAX_PROBE_SAMPLES],
            count,
        };
        batch.results[..count].copy_from_slice(&results[..count]);
        batch
    }

    #[must_use]
    pub fn results(&self) -> &[ProbeResult] {
        &self.results[..self.count]
    }
}

// ---------------------------------------------------------------------------
// PendingProbePool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct PendingSlot {
    handle: Option<ProbeHandle>,
    complete: bool,
    batch: ProbeBatch,
}

impl PendingSlot {
    fn empty() -> Self {
        Self {
            handle: None,
            complete: false,
            batch: ProbeBatch::from_results(
                FrameNumber(0),
                ProbeRequest {
                    start: Point3::origin(),
                    end: Point3::origin(),
                    reference: Point3::origin(),
                    sample_count: 0,
                    lift: 0.0,
                    length: 0.0,
                    radius: 0.0,
                },
                &[],
            ),
        }
    }

    const fn is_free(&self) -> bool {
        self.handle.is_none() && !self.complete
    }
}

/// Fixed ring of in-flight probe batches keyed by frame number.
#[derive(Debug, Clone)]
pub struct PendingProbePool {
    slots: [PendingSlot; PROBE_POOL_SLOTS],
}

impl Default for PendingProbePool {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingProbePool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [PendingSlot::empty(); PROBE_POOL_SLOTS],
        }
    }

    /// Free slot, else the slot with the oldest frame tag older than `frame`.
    fn claim(&self, frame: FrameNumber) -> Option<usize> {
        if let Some(free) = self.slots.iter().position(PendingSlot::is_free) {
            return Some(free);
        }
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.batch.frame < frame)
            .min_by_key(|(_, slot)| slot.batch.frame)
            .map(|(i, _)| i)
    }

    /// Issue `request` for `frame`. Returns `false` when every slot was
    /// already issued this frame.
    pub fn issue(
        &mut self,
        service: &mut dyn ProbeService,
        request: &ProbeRequest,
        frame: FrameNumber,
    ) -> bool {
        let Some(index) = self.claim(frame) else {
            return false;
        };
        let slot = &mut self.slots[index];
        if let Some(stale) = slot.handle.take() {
            trace!(frame = %slot.batch.frame, "reclaiming in-flight probe slot");
            service.release(stale);
        }
        slot.handle = Some(service.request_batch(request));
        slot.complete = false;
        slot.batch = ProbeBatch::from_results(frame, *request, &[]);
        slot.batch.count = request.sample_count.min(MAX_PROBE_SAMPLES);
        true
    }

    /// Poll every in-flight slot once.
    pub fn poll(&mut self, service: &mut dyn ProbeService) {
        for slot in &mut self.slots {
            let Some(handle) = slot.handle else {
                continue;
            };
            let count = slot.batch.count;
            match service.poll_batch(handle, &mut slot.batch.results[..count]) {
                ProbePoll::Pending => {}
                ProbePoll::Ready(n) => {
                    slot.batch.count = n.min(count);
                    slot.handle = None;
                    slot.complete = true;
                }
                ProbePoll::Unknown => {
                    *slot = PendingSlot::empty();
                }
            }
        }
    }

    /// Most recently issued batch that has completed.
    #[must_use]
    pub fn newest_complete(&self) -> Option<&ProbeBatch> {
        self.slots
            .iter()
            .filter(|slot| slot.complete)
            .map(|slot| &slot.batch)
            .max_by_key(|batch| batch.frame)
    }

    /// Batches issued but not yet complete.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.handle.is_some()).count()
    }

    /// Forget every slot, releasing in-flight handles.
    pub fn clear(&mut self, service: &mut dyn ProbeService) {
        for slot in &mut self.slots {
            if let Some(handle) = slot.handle {
                service.release(handle);
            }
            *slot = PendingSlot::empty();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Service whose batches complete only when the test says so.
    #[derive(Default)]
    struct ManualService {
        next: u64,
        ready: HashMap<u64, f32>,
        issued: Vec<u64>,
        released: Vec<u64>,
    }

    impl ManualService {
        fn complete(&mut self, handle: u64, height: f32) {
            self.ready.insert(handle, height);
        }
    }

    impl ProbeService for ManualService {
        fn request_batch(&mut self, _request: &ProbeRequest) -> ProbeHandle {
            self.next += 1;
            self.issued.push(self.next);
            ProbeHandle(self.next)
        }

        fn poll_batch(&mut self, handle: ProbeHandle, results: &mut [ProbeResult]) -> ProbePoll {
            if self.released.contains(&handle.0) {
                return ProbePoll::Unknown;
            }
            match self.ready.get(&handle.0) {
                Some(&h) => {
                    for r in results.iter_mut() {
                        *r = ProbeResult::hit(Point3::new(0.0, h, 0.0), Vector3::y());
                    }
                    ProbePoll::Ready(results.len())
                }
                None => ProbePoll::Pending,
            }
        }

        fn release(&mut self, handle: ProbeHandle) {
            self.released.push(handle.0);
        }
    }

    fn request() -> ProbeRequest {
        ProbeRequest::new(
            Point3::new(0.0, 0.0, -1.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::origin(),
            &GroundProbeConfig::default(),
        )
    }

    #[test]
    fn rays_are_evenly_spaced_and_lifted() {
        let req = request();
        let (first, dir) = req.ray(0);
        let (last, _) = req.ray(req.sample_count - 1);
        assert!((first.z + 1.0).abs() < 1e-6);
        assert!((last.z - 1.0).abs() < 1e-6);
        assert!((first.y - 2.5).abs() < 1e-6);
        assert!((dir.y + 5.0).abs() < 1e-6);
        let (second, _) = req.ray(1);
        assert!((second.z - (-1.0 + 2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn newest_complete_wins_over_stale() {
        let mut service = ManualService::default();
        let mut pool = PendingProbePool::new();
        assert!(pool.issue(&mut service, &request(), FrameNumber(1)));
        assert!(pool.issue(&mut service, &request(), FrameNumber(2)));

        // Frame 2 completes first, frame 1 later.
        service.complete(2, 0.5);
        pool.poll(&mut service);
        assert_eq!(pool.newest_complete().unwrap().frame, FrameNumber(2));

        service.complete(1, 0.1);
        pool.poll(&mut service);
        let newest = pool.newest_complete().unwrap();
        assert_eq!(newest.frame, FrameNumber(2));
        assert!((newest.results()[0].contact.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn full_pool_reclaims_oldest_and_discards_its_result() {
        let mut service = ManualService::default();
        let mut pool = PendingProbePool::new();
        for frame in 1..=PROBE_POOL_SLOTS as u64 {
            assert!(pool.issue(&mut service, &request(), FrameNumber(frame)));
        }
        assert_eq!(pool.in_flight(), PROBE_POOL_SLOTS);

        // Seventh request reclaims frame 1's slot.
        assert!(pool.issue(&mut service, &request(), FrameNumber(7)));
        assert_eq!(service.released, vec![1]);

        // The late result for frame 1 is never consumed.
        service.complete(1, 9.0);
        pool.poll(&mut service);
        assert!(pool.newest_complete().is_none());
    }

    #[test]
    fn cannot_issue_twice_per_slot_in_one_frame() {
        let mut service = ManualService::default();
        let mut pool = PendingProbePool::new();
        for _ in 0..PROBE_POOL_SLOTS {
            assert!(pool.issue(&mut service, &request(), FrameNumber(3)));
        }
        assert!(!pool.issue(&mut service, &request(), FrameNumber(3)));
    }

    #[test]
    fn unknown_handle_frees_slot() {
        let mut service = ManualService::default();
        let mut pool = PendingProbePool::new();
        pool.issue(&mut service, &request(), FrameNumber(1));
        service.released.push(1);
        pool.poll(&mut service);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.newest_complete().is_none());
    }

    #[test]
    fn clear_releases_in_flight() {
        let mut service = ManualService::default();
        let mut pool = PendingProbePool::new();
        pool.issue(&mut service, &request(), FrameNumber(1));
        pool.issue(&mut service, &request(), FrameNumber(2));
        pool.clear(&mut service);
        assert_eq!(service.released.len(), 2);
        assert_eq!(pool.in_flight(), 0);
    }
}
