use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::types::IkMode;

/// Upper bound on rays per probe batch.
pub const MAX_PROBE_SAMPLES: usize = 16;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_sample_count() -> usize {
    4
}
const fn default_probe_lift() -> f32 {
    2.5
}
const fn default_probe_length() -> f32 {
    5.0
}
const fn default_probe_radius() -> f32 {
    0.05
}
const fn default_max_step_up() -> f32 {
    0.3
}
const fn default_max_step_down() -> f32 {
    0.4
}
const fn default_max_slope_deg() -> f32 {
    45.0
}
const fn default_hull_y_padding() -> f32 {
    0.25
}
const fn default_interior_min_rise() -> f32 {
    0.005
}
const fn default_outer_range_padding() -> f32 {
    0.2
}
const fn default_cast_height() -> f32 {
    6.0
}
const fn default_min_normal_y() -> f32 {
    0.707
}
const fn default_line_length() -> f32 {
    0.75
}
const fn default_look_ahead_time() -> f32 {
    0.25
}
const fn default_root_height_spring() -> f32 {
    7.0
}
const fn default_root_speed_spring() -> f32 {
    20.0
}
const fn default_leg_height_spring() -> f32 {
    300.0
}
const fn default_foot_normal_spring() -> f32 {
    20.0
}
const fn default_true() -> bool {
    true
}
const fn default_max_root_offset() -> f32 {
    0.5
}
const fn default_min_extension() -> f32 {
    0.25
}
const fn default_max_extension() -> f32 {
    0.999
}
const fn default_blend_time() -> f32 {
    0.2
}
const fn default_melee_blend_time() -> f32 {
    0.1
}
const fn default_fixed_dt() -> f32 {
    1.0 / 60.0
}
const fn default_warmup_frames() -> u32 {
    2
}
const fn default_slope_blend_rate() -> f32 {
    5.0
}
const fn default_max_normal_angle_deg() -> f32 {
    45.0
}

fn require_positive(field: &str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} (must be > 0)")))
    }
}

fn require_non_negative(field: &str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} (must be >= 0)")))
    }
}

// ---------------------------------------------------------------------------
// GroundProbeConfig
// ---------------------------------------------------------------------------

/// Probe layout and ground-hull acceptance thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundProbeConfig {
    /// Rays per batch, evenly spaced along the sampling line.
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,

    /// Height above the reference position where rays start (meters).
    #[serde(default = "default_probe_lift")]
    pub probe_lift: f32,

    /// Downward ray length (meters).
    #[serde(default = "default_probe_length")]
    pub probe_length: f32,

    /// Sphere-cast radius passed to the probe service.
    #[serde(default = "default_probe_radius")]
    pub probe_radius: f32,

    /// Largest accepted rise between consecutive contacts (meters).
    #[serde(default = "default_max_step_up")]
    pub max_step_up: f32,

    /// Largest accepted drop between consecutive contacts (meters).
    #[serde(default = "default_max_step_down")]
    pub max_step_down: f32,

    /// Steepest accepted slope from the reference to the first contact.
    #[serde(default = "default_max_slope_deg")]
    pub max_slope_deg: f32,

    /// Lateral band half-width around the hull (hull-space Y padding).
    #[serde(default = "default_hull_y_padding")]
    pub hull_y_padding: f32,

    /// Interior contacts below the start-end line plus this rise are dropped.
    #[serde(default = "default_interior_min_rise")]
    pub interior_min_rise: f32,

    /// Range past the first/last contact still served by the boundary planes.
    #[serde(default = "default_outer_range_padding")]
    pub outer_range_padding: f32,

    /// Hull-space height projection casts start from.
    #[serde(default = "default_cast_height")]
    pub cast_height: f32,

    /// Contact normals with a smaller Y are replaced by up.
    #[serde(default = "default_min_normal_y")]
    pub min_normal_y: f32,

    /// Forward extent of the sampling line from the character.
    #[serde(default = "default_line_length")]
    pub line_length: f32,

    /// Predictive modes extend the sampling line end by the forward speed times this.
    #[serde(default = "default_look_ahead_time")]
    pub look_ahead_time: f32,
}

impl Default for GroundProbeConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            probe_lift: default_probe_lift(),
            probe_length: default_probe_length(),
            probe_radius: default_probe_radius(),
            max_step_up: default_max_step_up(),
            max_step_down: default_max_step_down(),
            max_slope_deg: default_max_slope_deg(),
            hull_y_padding: default_hull_y_padding(),
            interior_min_rise: default_interior_min_rise(),
            outer_range_padding: default_outer_range_padding(),
            cast_height: default_cast_height(),
            min_normal_y: default_min_normal_y(),
            line_length: default_line_length(),
            look_ahead_time: default_look_ahead_time(),
        }
    }
}

impl GroundProbeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=MAX_PROBE_SAMPLES).contains(&self.sample_count) {
            return Err(ConfigError::InvalidSampleCount(self.sample_count));
        }
        require_positive("ground.probe_length", self.probe_length)?;
        require_non_negative("ground.probe_lift", self.probe_lift)?;
        require_non_negative("ground.max_step_up", self.max_step_up)?;
        require_non_negative("ground.max_step_down", self.max_step_down)?;
        require_positive("ground.line_length", self.line_length)?;
        if !(0.0..90.0).contains(&self.max_slope_deg) {
            return Err(ConfigError::invalid(
                "ground.max_slope_deg",
                format!("{} (must be in [0, 90))", self.max_slope_deg),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_normal_y) {
            return Err(ConfigError::invalid(
                "ground.min_normal_y",
                format!("{} (must be in [0, 1])", self.min_normal_y),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SpringConfig
// ---------------------------------------------------------------------------

/// Spring stiffness constants (critically damped, `omega = sqrt(k)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpringConfig {
    #[serde(default = "default_root_height_spring")]
    pub root_height: f32,
    #[serde(default = "default_root_speed_spring")]
    pub root_speed: f32,
    #[serde(default = "default_leg_height_spring")]
    pub leg_height: f32,
    #[serde(default = "default_foot_normal_spring")]
    pub foot_normal: f32,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            root_height: default_root_height_spring(),
            root_speed: default_root_speed_spring(),
            leg_height: default_leg_height_spring(),
            foot_normal: default_foot_normal_spring(),
        }
    }
}

impl SpringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("springs.root_height", self.root_height)?;
        require_positive("springs.root_speed", self.root_speed)?;
        require_positive("springs.leg_height", self.leg_height)?;
        require_positive("springs.foot_normal", self.foot_normal)
    }
}

// ---------------------------------------------------------------------------
// RootAdjustConfig
// ---------------------------------------------------------------------------

/// How per-leg root deltas combine into the shared root delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootAggregation {
    /// Lowest delta wins: the most compressed leg pulls the root down.
    #[default]
    MostCompressed,
    /// Highest delta wins: the root moves up to the highest foothold.
    MoveRootUp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootAdjustConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub aggregation: RootAggregation,

    /// Hard cap on the root delta magnitude (meters).
    #[serde(default = "default_max_root_offset")]
    pub max_root_offset: f32,

    /// Shortest allowed hip-to-ankle distance, as a fraction of `L1 + L2`.
    #[serde(default = "default_min_extension")]
    pub min_extension: f32,

    /// Longest allowed hip-to-ankle distance, as a fraction of `L1 + L2`.
    #[serde(default = "default_max_extension")]
    pub max_extension: f32,
}

impl Default for RootAdjustConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            aggregation: RootAggregation::default(),
            max_root_offset: default_max_root_offset(),
            min_extension: default_min_extension(),
            max_extension: default_max_extension(),
        }
    }
}

impl RootAdjustConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_negative("root.max_root_offset", self.max_root_offset)?;
        if !(0.0 <= self.min_extension
            && self.min_extension < self.max_extension
            && self.max_extension <= 1.0)
        {
            return Err(ConfigError::invalid(
                "root.min_extension/max_extension",
                "must satisfy 0 <= min < max <= 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ModeBlendConfig
// ---------------------------------------------------------------------------

/// Default blend-in time per mode; `disable` is the blend-out time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeBlendConfig {
    #[serde(default = "default_blend_time")]
    pub stopped: f32,
    #[serde(default = "default_blend_time")]
    pub moving: f32,
    #[serde(default = "default_blend_time")]
    pub moving_non_predictive: f32,
    #[serde(default = "default_melee_blend_time")]
    pub melee: f32,
    #[serde(default = "default_blend_time")]
    pub scripted: f32,
    #[serde(default = "default_blend_time")]
    pub scripted_move: f32,
    #[serde(default = "default_blend_time")]
    pub disable: f32,
}

impl Default for ModeBlendConfig {
    fn default() -> Self {
        Self {
            stopped: default_blend_time(),
            moving: default_blend_time(),
            moving_non_predictive: default_blend_time(),
            melee: default_melee_blend_time(),
            scripted: default_blend_time(),
            scripted_move: default_blend_time(),
            disable: default_blend_time(),
        }
    }
}

impl ModeBlendConfig {
    /// Blend time used when switching into `mode`.
    #[must_use]
    pub const fn blend_time(&self, mode: IkMode) -> f32 {
        match mode {
            IkMode::Disabled => self.disable,
            IkMode::Stopped => self.stopped,
            IkMode::Moving => self.moving,
            IkMode::MovingNonPredictive => self.moving_non_predictive,
            IkMode::Melee => self.melee,
            IkMode::Scripted => self.scripted,
            IkMode::ScriptedMove => self.scripted_move,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for mode in IkMode::ALL {
            let t = self.blend_time(mode);
            if !(t >= 0.0 && t.is_finite()) {
                return Err(ConfigError::invalid(
                    "blend",
                    format!("{mode} blend time {t} (must be >= 0)"),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Frame step used by the ECS frame clock (seconds).
    #[serde(default = "default_fixed_dt")]
    pub fixed_dt: f32,

    /// Frames after (re)start that only issue probes.
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,

    /// Rate at which ground adaptation fades in/out with model validity (1/s).
    #[serde(default = "default_slope_blend_rate")]
    pub slope_blend_rate: f32,

    /// Ground normals reported per leg are limited to this angle from up.
    #[serde(default = "default_max_normal_angle_deg")]
    pub max_normal_angle_deg: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fixed_dt: default_fixed_dt(),
            warmup_frames: default_warmup_frames(),
            slope_blend_rate: default_slope_blend_rate(),
            max_normal_angle_deg: default_max_normal_angle_deg(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("controller.fixed_dt", self.fixed_dt)?;
        require_positive("controller.slope_blend_rate", self.slope_blend_rate)?;
        if !(0.0..=90.0).contains(&self.max_normal_angle_deg) {
            return Err(ConfigError::invalid(
                "controller.max_normal_angle_deg",
                format!("{} (must be in [0, 90])", self.max_normal_angle_deg),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LegIkConfig
// ---------------------------------------------------------------------------

/// Complete leg-IK configuration, shared by every character in an app.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Resource)]
pub struct LegIkConfig {
    #[serde(default)]
    pub ground: GroundProbeConfig,
    #[serde(default)]
    pub springs: SpringConfig,
    #[serde(default)]
    pub root: RootAdjustConfig,
    #[serde(default)]
    pub blend: ModeBlendConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl LegIkConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ground.validate()?;
        self.springs.validate()?;
        self.root.validate()?;
        self.blend.validate()?;
        self.controller.validate()
    }

    /// Parse and validate a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "leg ik config loaded");
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
