//! Error taxonomy for the eHTE engine.
//!
//! Per-group failures ([`EhteError::InsufficientData`],
//! [`EhteError::UnalignedGroup`], [`EhteError::DegenerateArm`]) are recoverable:
//! the estimator records them as diagnostics and reports NaN for the affected
//! arm. Failures repeated across simulated replicates are folded into one
//! [`EhteError::NullReplicates`] per arm. Validation and configuration
//! failures are fatal before any computation.

use serde::Serialize;

use crate::dataset::GroupKey;

/// Errors raised by the eHTE engine.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EhteError {
    /// A group has too few values for the requested statistic.
    #[error("insufficient data in {key}: need at least {needed}, got {got}")]
    InsufficientData {
        key: GroupKey,
        needed: usize,
        got: usize,
    },

    /// A bare sample is too small for the percentile rule.
    #[error("sample too small: need at least {needed} value(s), got {got}")]
    InsufficientSample { needed: usize, got: usize },

    /// Treatment percentiles with no placebo counterpart in the same permutation.
    #[error("{unmatched} treatment percentile(s) in {key} have no placebo match")]
    UnalignedGroup { key: GroupKey, unmatched: usize },

    /// An active arm selected for analysis has no observations.
    #[error("arm {arm_code} has no observations")]
    DegenerateArm { arm_code: i64 },

    /// The same per-group failure in `replicates` simulated replicates of one arm.
    #[error("arm {arm_code}: {replicates} null replicate(s) failed, e.g. {first}")]
    NullReplicates {
        arm_code: i64,
        replicates: usize,
        first: Box<EhteError>,
    },

    /// The input records violate the dataset contract.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The analysis configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl EhteError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Attach a group to a bare-sample error.
    pub fn in_group(self, key: GroupKey) -> Self {
        match self {
            Self::InsufficientSample { needed, got } => Self::InsufficientData { key, needed, got },
            other => other,
        }
    }

    /// The (permutation, arm) group an error belongs to, if any.
    pub fn group_key(&self) -> Option<GroupKey> {
        match self {
            Self::InsufficientData { key, .. } | Self::UnalignedGroup { key, .. } => Some(*key),
            _ => None,
        }
    }

    /// Stable variant name, as used in the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::InsufficientSample { .. } => "insufficient_sample",
            Self::UnalignedGroup { .. } => "unaligned_group",
            Self::DegenerateArm { .. } => "degenerate_arm",
            Self::NullReplicates { .. } => "null_replicates",
            Self::InvalidInput { .. } => "invalid_input",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }

    /// True for errors scoped to a single group or arm.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. }
                | Self::InsufficientSample { .. }
                | Self::UnalignedGroup { .. }
                | Self::DegenerateArm { .. }
                | Self::NullReplicates { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EhteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = EhteError::InsufficientData {
            key: GroupKey::new(3, 2),
            needed: 2,
            got: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("perm 3"), "{msg}");
        assert!(msg.contains("arm 2"), "{msg}");
        assert!(msg.contains("need at least 2, got 1"), "{msg}");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(EhteError::DegenerateArm { arm_code: 4 }.is_recoverable());
        assert!(
            EhteError::UnalignedGroup {
                key: GroupKey::observed(2),
                unmatched: 1
            }
            .is_recoverable()
        );
        assert!(!EhteError::invalid_input("no placebo").is_recoverable());
        assert!(!EhteError::invalid_config("n_perms = 0").is_recoverable());
    }

    #[test]
    fn test_in_group_attaches_key() {
        let err = EhteError::InsufficientSample { needed: 2, got: 1 }.in_group(GroupKey::new(4, 2));
        assert_eq!(
            err,
            EhteError::InsufficientData {
                key: GroupKey::new(4, 2),
                needed: 2,
                got: 1
            }
        );
        assert_eq!(err.group_key(), Some(GroupKey::new(4, 2)));
        let other = EhteError::DegenerateArm { arm_code: 3 };
        assert_eq!(other.clone().in_group(GroupKey::new(1, 3)), other);
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let err = EhteError::NullReplicates {
            arm_code: 2,
            replicates: 500,
            first: Box::new(EhteError::InsufficientData {
                key: GroupKey::new(1, 2),
                needed: 2,
                got: 1,
            }),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], err.kind());
        assert_eq!(json["first"]["kind"], "insufficient_data");
        assert!(err.to_string().contains("500 null replicate(s)"));
    }
}
