use thiserror::Error;

use crate::types::LegIndex;

/// Top-level error type for strider setup and configuration.
#[derive(Debug, Error)]
pub enum StriderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid sample_count: {0} (must be in 2..={max})", max = crate::config::MAX_PROBE_SAMPLES)]
    InvalidSampleCount(usize),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while binding a leg rig to a skeleton.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Joint not found in skeleton: {0}")]
    MissingJoint(String),

    #[error("Joint index {index} out of range for skeleton with {count} joints")]
    JointOutOfRange { index: usize, count: usize },

    #[error("Zero-length {bone} on leg {leg}")]
    ZeroLengthBone { leg: LegIndex, bone: &'static str },

    #[error("Unsupported leg count: {0} (expected 2 or 4)")]
    LegCount(usize),
}

// ---------------------------------------------------------------------------
// Recovered faults
// ---------------------------------------------------------------------------

/// Per-frame problems that are recovered locally and never returned as `Err`.
///
/// Copy + static messages so they can be recorded in the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum GroundFault {
    #[error("Degenerate geometry: near-zero vector, step skipped")]
    DegenerateGeometry,

    #[error("Stale or missing probe data: using previous ground")]
    StaleOrMissingProbeData,

    #[error("Slope rejected: sample range truncated")]
    SlopeRejected,

    #[error("Target out of reach: distance clamped")]
    OutOfReachTarget,
}

impl GroundFault {
    pub const ALL: [Self; 4] = [
        Self::DegenerateGeometry,
        Self::StaleOrMissingProbeData,
        Self::SlopeRejected,
        Self::OutOfReachTarget,
    ];

    const fn slot(self) -> usize {
        match self {
            Self::DegenerateGeometry => 0,
            Self::StaleOrMissingProbeData => 1,
            Self::SlopeRejected => 2,
            Self::OutOfReachTarget => 3,
        }
    }
}

/// Fault counts for one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultLog {
    counts: [u16; 4],
}

impl FaultLog {
    pub fn record(&mut self, fault: GroundFault) {
        let slot = &mut self.counts[fault.slot()];
        *slot = slot.saturating_add(1);
    }

    #[must_use]
    pub const fn count(&self, fault: GroundFault) -> u16 {
        self.counts[fault.slot()]
    }

    #[must_use]
    pub fn contains(&self, fault: GroundFault) -> bool {
        self.count(fault) > 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    pub fn clear(&mut self) {
        self.counts = [0; 4];
    }

    /// Merge another log into this one.
    pub fn extend(&mut self, other: &Self) {
        for (a, b) in self.counts.iter_mut().zip(other.counts) {
            *a = a.saturating_add(b);
        }
    }

    /// Faults with a non-zero count.
    pub fn iter(&self) -> impl Iterator<Item = (GroundFault, u16)> + '_ {
        GroundFault::ALL
            .into_iter()
            .map(|f| (f, self.count(f)))
            .filter(|&(_, c)| c > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strider_error_from_config_error() {
        let err = ConfigError::InvalidSampleCount(1);
        let strider_err: StriderError = err.into();
        assert!(matches!(strider_err, StriderError::Config(_)));
        assert!(strider_err.to_string().contains("sample_count: 1"));
    }

    #[test]
    fn strider_error_from_setup_error() {
        let err = SetupError::MissingJoint("l_knee".into());
        let strider_err: StriderError = err.into();
        assert!(matches!(strider_err, StriderError::Setup(_)));
        assert!(strider_err.to_string().contains("l_knee"));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn setup_error_display_messages() {
        assert_eq!(
            SetupError::ZeroLengthBone {
                leg: LegIndex::FrontLeft,
                bone: "thigh"
            }
            .to_string(),
            "Zero-length thigh on leg front_left"
        );
        assert_eq!(
            SetupError::JointOutOfRange { index: 9, count: 4 }.to_string(),
            "Joint index 9 out of range for skeleton with 4 joints"
        );
        assert_eq!(
            SetupError::LegCount(3).to_string(),
            "Unsupported leg count: 3 (expected 2 or 4)"
        );
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::InvalidSampleCount(40).to_string(),
            "Invalid sample_count: 40 (must be in 2..=16)"
        );
        assert_eq!(
            ConfigError::invalid("springs.root_height", "must be > 0").to_string(),
            "Invalid value for springs.root_height: must be > 0"
        );
    }

    #[test]
    fn ground_fault_is_copy() {
        let fault = GroundFault::SlopeRejected;
        let copy = fault;
        assert_eq!(fault, copy);
        assert_eq!(
            GroundFault::OutOfReachTarget.to_string(),
            "Target out of reach: distance clamped"
        );
    }

    #[test]
    fn fault_log_counts_and_merges() {
        let mut log = FaultLog::default();
        assert!(log.is_empty());
        log.record(GroundFault::SlopeRejected);
        log.record(GroundFault::SlopeRejected);
        assert_eq!(log.count(GroundFault::SlopeRejected), 2);
        assert!(!log.contains(GroundFault::DegenerateGeometry));

        let mut other = FaultLog::default();
        other.record(GroundFault::DegenerateGeometry);
        log.extend(&other);
        assert_eq!(log.iter().count(), 2);

        log.clear();
        assert!(log.is_empty());
    }
}
