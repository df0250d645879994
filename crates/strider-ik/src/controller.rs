//! Per-character leg IK controller.
//!
//! One [`LegIkController`] owns everything a character needs between
//! frames: the ground model, the mode blend and behavior, the root spring,
//! the freeze offsets and per-leg smoothing. [`LegIkController::update`]
//! runs once per frame:
//!
//! ```text
//!  blend.advance ──► probe ground ──► warmup? ──► per-leg ground adapt
//!       │                                              │
//!  fully out? reset                         behavior ankle targets
//!                                                      │
//!                              root adjust (aggregate, spring, clamp)
//!                                                      │
//!                                        two-bone solve per leg
//! ```
//!
//! Recovered problems are collected in a [`FaultLog`]; nothing in the
//! per-frame path returns an error.

use nalgebra::{Isometry3, Point3, Vector3};
use tracing::{debug, trace, warn};

use strider_core::config::LegIkConfig;
use strider_core::error::{FaultLog, StriderError};
use strider_core::math::{flatten, lerp, limit_angle_from_up, sanitize_ground_normal, seek, try_normalize, up};
use strider_core::spring::SpringTracker;
use strider_core::types::{FrameNumber, IkMode, LegCount, LegIndex, LegSet, MAX_LEGS};
use strider_ground::model::GroundSurfaceModel;
use strider_ground::probe::ProbeService;

use crate::chain::{LegJointNames, LegTopology};
use crate::freeze::FreezeState;
use crate::mode::{LegIkBehavior, ModeBlend, TargetContext};
use crate::pose::{JointPose, SkeletonPose};
use crate::root::{RootAdjustState, RootDeltaLimits, aggregate_raw_deltas};
use crate::solver::solve_two_bone;

// ---------------------------------------------------------------------------
// FrameInput
// ---------------------------------------------------------------------------

/// Character transform and timing for one update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub frame: FrameNumber,
    pub dt: f32,
    /// Character align (ground-level root transform) this frame.
    pub align: Isometry3<f32>,
    /// Align on the previous frame.
    pub prev_align: Isometry3<f32>,
    /// World-space character velocity.
    pub velocity: Vector3<f32>,
    /// The align moved discontinuously (stairs, teleport).
    pub discontinuity: bool,
}

impl FrameInput {
    /// Stationary input at `align`.
    #[must_use]
    pub fn new(frame: FrameNumber, dt: f32, align: Isometry3<f32>) -> Self {
        Self {
            frame,
            dt,
            align,
            prev_align: align,
            velocity: Vector3::zeros(),
            discontinuity: false,
        }
    }

    #[must_use]
    pub fn with_previous(mut self, prev_align: Isometry3<f32>) -> Self {
        self.prev_align = prev_align;
        self
    }

    #[must_use]
    pub fn with_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.velocity = velocity;
        self
    }

    #[must_use]
    pub fn with_discontinuity(mut self, discontinuity: bool) -> Self {
        self.discontinuity = discontinuity;
        self
    }

    /// Velocity, or the align displacement over `dt` when none was given.
    #[must_use]
    pub fn effective_velocity(&self) -> Vector3<f32> {
        if self.velocity != Vector3::zeros() || self.dt <= 0.0 || self.discontinuity {
            return self.velocity;
        }
        (self.align.translation.vector - self.prev_align.translation.vector) / self.dt
    }
}

// ---------------------------------------------------------------------------
// LegState
// ---------------------------------------------------------------------------

/// Smoothed ground contact of one leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegState {
    on_ground: bool,
    initialized: bool,
    ground_height: f32,
    height_spring: SpringTracker<f32>,
    ground_normal: Vector3<f32>,
    normal_spring: SpringTracker<Vector3<f32>>,
    ankle_target: Option<Point3<f32>>,
}

impl Default for LegState {
    fn default() -> Self {
        Self {
            on_ground: true,
            initialized: false,
            ground_height: 0.0,
            height_spring: SpringTracker::new(),
            ground_normal: up(),
            normal_spring: SpringTracker::new(),
            ankle_target: None,
        }
    }
}

impl LegState {
    #[must_use]
    pub const fn on_ground(&self) -> bool {
        self.on_ground
    }

    #[must_use]
    pub const fn ground_height(&self) -> f32 {
        self.ground_height
    }

    #[must_use]
    pub const fn ground_normal(&self) -> Vector3<f32> {
        self.ground_normal
    }

    /// Target handed to the last solve.
    #[must_use]
    pub const fn ankle_target(&self) -> Option<Point3<f32>> {
        self.ankle_target
    }
}

/// Requests that apply to the next update only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FrameOverrides {
    disabled_legs: [bool; MAX_LEGS],
    unfreeze: bool,
}

// ---------------------------------------------------------------------------
// LegIkController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LegIkController {
    config: LegIkConfig,
    topology: LegTopology,
    ground: GroundSurfaceModel,
    blend: ModeBlend,
    behavior: Option<LegIkBehavior>,
    freeze: FreezeState,
    root: RootAdjustState,
    legs: LegSet<LegState>,
    slope_blend: f32,
    warmup_remaining: u32,
    root_adjust_enabled: bool,
    root_spring_override: Option<f32>,
    melee_root_shift: f32,
    melee_foot_deltas: LegSet<f32>,
    scripted_targets: LegSet<Option<Point3<f32>>>,
    overrides: FrameOverrides,
    root_delta: f32,
    root_limits: RootDeltaLimits,
    faults: FaultLog,
}

impl LegIkController {
    #[must_use]
    pub fn new(config: LegIkConfig, topology: LegTopology) -> Self {
        let count = topology.leg_count();
        Self {
            ground: GroundSurfaceModel::new(config.ground.clone()),
            config,
            topology,
            blend: ModeBlend::new(),
            behavior: None,
            freeze: FreezeState::new(count),
            root: RootAdjustState::new(),
            legs: LegSet::splat(count, LegState::default()),
            slope_blend: 1.0,
            warmup_remaining: 0,
            root_adjust_enabled: true,
            root_spring_override: None,
            melee_root_shift: 0.0,
            melee_foot_deltas: LegSet::splat(count, 0.0),
            scripted_targets: LegSet::splat(count, None),
            overrides: FrameOverrides::default(),
            root_delta: 0.0,
            root_limits: RootDeltaLimits::UNBOUNDED,
            faults: FaultLog::default(),
        }
    }

    /// Validate `config` and bind `names` against `skeleton`.
    pub fn from_skeleton(
        config: LegIkConfig,
        names: &LegJointNames,
        skeleton: &SkeletonPose,
    ) -> Result<Self, StriderError> {
        config.validate()?;
        let topology = LegTopology::from_skeleton(names, skeleton).inspect_err(|err| {
            warn!(%err, "leg rig setup failed");
        })?;
        Ok(Self::new(config, topology))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub const fn config(&self) -> &LegIkConfig {
        &self.config
    }

    #[must_use]
    pub const fn topology(&self) -> &LegTopology {
        &self.topology
    }

    #[must_use]
    pub const fn leg_count(&self) -> LegCount {
        self.topology.leg_count()
    }

    #[must_use]
    pub const fn ground(&self) -> &GroundSurfaceModel {
        &self.ground
    }

    #[must_use]
    pub const fn ground_mut(&mut self) -> &mut GroundSurfaceModel {
        &mut self.ground
    }

    #[must_use]
    pub const fn mode(&self) -> IkMode {
        self.blend.mode()
    }

    #[must_use]
    pub const fn blend_weight(&self) -> f32 {
        self.blend.weight()
    }

    #[must_use]
    pub const fn behavior(&self) -> Option<LegIkBehavior> {
        self.behavior
    }

    /// Ground adaptation weight from model validity.
    #[must_use]
    pub const fn slope_blend(&self) -> f32 {
        self.slope_blend
    }

    /// Root delta applied by the last update.
    #[must_use]
    pub const fn root_delta(&self) -> f32 {
        self.root_delta
    }

    /// Window the last root delta was clamped to.
    #[must_use]
    pub const fn root_limits(&self) -> RootDeltaLimits {
        self.root_limits
    }

    #[must_use]
    pub const fn root_state(&self) -> &RootAdjustState {
        &self.root
    }

    #[must_use]
    pub const fn freeze(&self) -> &FreezeState {
        &self.freeze
    }

    #[must_use]
    pub fn leg(&self, leg: LegIndex) -> &LegState {
        &self.legs[leg]
    }

    #[must_use]
    pub fn on_ground(&self, leg: LegIndex) -> bool {
        self.legs[leg].on_ground
    }

    #[must_use]
    pub fn ground_normal(&self, leg: LegIndex) -> Vector3<f32> {
        self.legs[leg].ground_normal
    }

    /// Faults recovered during the last update.
    #[must_use]
    pub const fn faults(&self) -> &FaultLog {
        &self.faults
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Switch modes using the configured blend time for `mode`.
    pub fn set_mode(&mut self, mode: IkMode) {
        let blend_time = self.config.blend.blend_time(mode);
        self.set_mode_with_blend(mode, blend_time);
    }

    /// Switch modes with an explicit blend time.
    pub fn set_mode_with_blend(&mut self, mode: IkMode, blend_time: f32) {
        let was_out = self.blend.is_fully_out();
        let previous = self.blend.mode();
        if !self.blend.set_mode(mode, blend_time) {
            return;
        }
        debug!(from = %previous, to = %mode, blend_time, "leg ik mode change");
        if let Some(behavior) = LegIkBehavior::for_mode(mode) {
            behavior.start(&mut self.freeze);
            self.behavior = Some(behavior);
            if was_out {
                self.warmup_remaining = self.config.controller.warmup_frames;
            }
        }
    }

    /// Leave `leg` untouched on the next update.
    pub fn single_frame_disable_leg(&mut self, leg: LegIndex) {
        self.overrides.disabled_legs[leg.index()] = true;
    }

    /// Ignore held freeze offsets on the next update.
    pub fn single_frame_unfreeze(&mut self) {
        self.overrides.unfreeze = true;
    }

    /// Capture new freeze offsets on the next frame with valid ground.
    pub fn request_freeze(&mut self) {
        self.freeze.request_capture();
    }

    pub fn release_freeze(&mut self) {
        self.freeze.release();
    }

    /// World-space ankle target for scripted modes.
    pub fn set_scripted_target(&mut self, leg: LegIndex, target: Option<Point3<f32>>) {
        self.scripted_targets[leg] = target;
    }

    pub fn clear_scripted_targets(&mut self) {
        for (_, target) in self.scripted_targets.iter_mut() {
            *target = None;
        }
    }

    /// Root shift added to the aggregate in melee.
    pub fn set_melee_root_shift(&mut self, shift: f32) {
        self.melee_root_shift = shift;
    }

    /// Vertical foot offset added in melee.
    pub fn set_melee_foot_delta(&mut self, leg: LegIndex, delta: f32) {
        self.melee_foot_deltas[leg] = delta;
    }

    pub fn set_root_adjust_enabled(&mut self, enabled: bool) {
        self.root_adjust_enabled = enabled;
    }

    /// Replace the configured root height spring constant.
    pub fn set_root_spring_override(&mut self, k: Option<f32>) {
        self.root_spring_override = k;
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Run one frame and write the adjusted legs into `pose`.
    pub fn update<P: JointPose + ?Sized>(
        &mut self,
        pose: &mut P,
        service: &mut dyn ProbeService,
        input: &FrameInput,
    ) -> &FaultLog {
        self.faults.clear();
        let weight = self.blend.advance(input.dt);

        if self.blend.is_fully_out() {
            if self.behavior.is_some() {
                self.full_reset(service);
            }
            self.overrides = FrameOverrides::default();
            return &self.faults;
        }
        let Some(behavior) = self.behavior else {
            self.overrides = FrameOverrides::default();
            return &self.faults;
        };

        let animated = LegSet::from_fn(self.leg_count(), |leg| self.topology.chain(leg).ankle(&*pose));
        self.probe_ground(service, input, behavior, &animated);
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            self.root_delta = 0.0;
            self.overrides = FrameOverrides::default();
            return &self.faults;
        }

        let ground_valid = self.ground.is_valid();
        let slope_target = if ground_valid { 1.0 } else { 0.0 };
        self.slope_blend = seek(
            self.slope_blend,
            slope_target,
            self.config.controller.slope_blend_rate * input.dt,
        );

        let mut grounded = animated;
        for leg in animated.legs() {
            grounded[leg] = self.adapt_leg(leg, &animated[leg], input);
        }

        if behavior == LegIkBehavior::Freeze && ground_valid {
            self.freeze.try_capture(&input.align, &grounded);
        }

        let unfreeze = self.overrides.unfreeze;
        let targets = LegSet::from_fn(self.leg_count(), |leg| {
            let ctx = TargetContext {
                animated: animated[leg],
                grounded: grounded[leg],
                scripted: self.scripted_targets[leg],
                frozen: if unfreeze {
                    None
                } else {
                    self.freeze.held_target(leg, &input.align)
                },
                foot_delta: if behavior.uses_melee_offsets() {
                    self.melee_foot_deltas[leg]
                } else {
                    0.0
                },
            };
            let target = behavior.ankle_target(&ctx);
            animated[leg] + (target - animated[leg]) * weight
        });

        self.adjust_root(pose, &animated, &targets, behavior, input, weight);
        self.solve_legs(pose, &targets);

        self.overrides = FrameOverrides::default();
        &self.faults
    }

    fn is_leg_active(&self, leg: LegIndex) -> bool {
        !self.overrides.disabled_legs[leg.index()]
    }

    /// Issue this frame's batch along the align's forward axis.
    ///
    /// The line starts at the align, pulled back to the rearmost animated
    /// foot, and runs `line_length` ahead. Predictive modes push only the end
    /// further out by the forward speed.
    fn probe_ground(
        &mut self,
        service: &mut dyn ProbeService,
        input: &FrameInput,
        behavior: LegIkBehavior,
        animated: &LegSet<Point3<f32>>,
    ) {
        let cfg = &self.config.ground;
        let position = Point3::from(input.align.translation.vector);
        let forward = try_normalize(&flatten(&(input.align.rotation * Vector3::z())))
            .unwrap_or_else(Vector3::z);
        let rearmost = animated
            .iter()
            .map(|(_, ankle)| forward.dot(&(ankle - position)))
            .fold(0.0_f32, f32::min);
        let mut reach = cfg.line_length;
        if behavior.is_predictive() {
            let speed = forward.dot(&flatten(&input.effective_velocity())).max(0.0);
            reach += speed * cfg.look_ahead_time;
        }
        let start = position + forward * rearmost;
        let end = position + forward * reach;
        let state = self.ground.find_ground(service, start, end, position, input.frame);
        self.faults.extend(self.ground.faults());
        trace!(frame = %input.frame, ?state, rearmost, reach, "ground probed");
    }

    /// Smooth the ground under one leg and return its ground-adapted ankle.
    fn adapt_leg(&mut self, leg: LegIndex, animated: &Point3<f32>, input: &FrameInput) -> Point3<f32> {
        let align_y = input.align.translation.vector.y;
        let springs = &self.config.springs;
        let max_angle = self.config.controller.max_normal_angle_deg.to_radians();
        let min_normal_y = self.config.ground.min_normal_y;
        let state = &mut self.legs[leg];

        match self.ground.project_point_to_ground(animated) {
            Some(ground) => {
                let raw = self.ground.ground_normal_at(animated).unwrap_or_else(up);
                let normal = limit_angle_from_up(&sanitize_ground_normal(&raw, min_normal_y), max_angle);
                state.on_ground = true;
                if state.initialized {
                    state.ground_height =
                        state
                            .height_spring
                            .track(state.ground_height, ground.y, input.dt, springs.leg_height);
                    let tracked =
                        state
                            .normal_spring
                            .track(state.ground_normal, normal, input.dt, springs.foot_normal);
                    state.ground_normal = try_normalize(&tracked).unwrap_or(normal);
                } else {
                    state.initialized = true;
                    state.ground_height = ground.y;
                    state.ground_normal = normal;
                    state.height_spring.reset();
                    state.normal_spring.reset();
                }
            }
            None => state.on_ground = false,
        }

        let ground_y = if state.initialized { state.ground_height } else { align_y };
        let adapted_y = ground_y + (animated.y - align_y);
        Point3::new(animated.x, lerp(animated.y, adapted_y, self.slope_blend), animated.z)
    }

    fn adjust_root<P: JointPose + ?Sized>(
        &mut self,
        pose: &mut P,
        animated: &LegSet<Point3<f32>>,
        targets: &LegSet<Point3<f32>>,
        behavior: LegIkBehavior,
        input: &FrameInput,
        weight: f32,
    ) {
        self.root_delta = 0.0;
        self.root_limits = RootDeltaLimits::UNBOUNDED;
        if !(self.root_adjust_enabled && self.config.root.enabled) {
            return;
        }
        let root_cfg = &self.config.root;
        let raw = aggregate_raw_deltas(
            animated
                .legs()
                .filter(|&leg| self.is_leg_active(leg))
                .map(|leg| targets[leg].y - animated[leg].y),
            root_cfg.aggregation,
        );
        let Some(mut raw) = raw else {
            return;
        };
        if behavior.uses_melee_offsets() {
            raw += self.melee_root_shift;
        }

        let k_root = self.root_spring_override.unwrap_or(self.config.springs.root_height);
        let smoothed = self.root.update(
            input.align.translation.vector.y,
            raw,
            input.dt,
            input.discontinuity,
            k_root,
            self.config.springs.root_speed,
        );

        let mut limits = RootDeltaLimits::UNBOUNDED;
        for leg in animated.legs().filter(|&leg| self.is_leg_active(leg)) {
            let chain = self.topology.chain(leg);
            limits = limits.intersect(RootDeltaLimits::for_leg(
                &chain.hip(&*pose),
                &targets[leg],
                chain.reach(),
                root_cfg,
            ));
        }
        let limits = limits.capped(root_cfg.max_root_offset);
        let delta = limits.clamp(smoothed * weight);

        let offset = Vector3::new(0.0, delta, 0.0);
        for root in self.topology.roots() {
            pose.translate(root, &offset);
        }
        self.root_delta = delta;
        self.root_limits = limits;
    }

    fn solve_legs<P: JointPose + ?Sized>(&mut self, pose: &mut P, targets: &LegSet<Point3<f32>>) {
        for (leg, target) in targets.iter() {
            if !self.is_leg_active(leg) {
                continue;
            }
            let outcome = solve_two_bone(pose, self.topology.chain(leg), target);
            if let Some(fault) = outcome.fault() {
                trace!(%leg, %fault, "leg solve recovered");
                self.faults.record(fault);
            }
            self.legs[leg].ankle_target = Some(*target);
        }
    }

    /// Back to the freshly spawned state after a full blend-out.
    fn full_reset(&mut self, service: &mut dyn ProbeService) {
        debug!("leg ik fully blended out, resetting");
        self.root.reset();
        self.slope_blend = 1.0;
        for (_, state) in self.legs.iter_mut() {
            *state = LegState::default();
        }
        self.freeze.release();
        self.behavior = None;
        self.ground.reset(service);
        self.warmup_remaining = 0;
        self.root_delta = 0.0;
        self.root_limits = RootDeltaLimits::UNBOUNDED;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
