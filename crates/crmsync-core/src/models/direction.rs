//! Direction, platform and origin enums shared by every store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One of the two connected CRM platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Source,
    Target,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }

    pub const fn other(self) -> Self {
        match self {
            Self::Source => Self::Target,
            Self::Target => Self::Source,
        }
    }
}

/// Which platform is the source of truth for one propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    SourceToTarget,
    TargetToSource,
}

impl SyncDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SourceToTarget => "source_to_target",
            Self::TargetToSource => "target_to_source",
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::SourceToTarget => Self::TargetToSource,
            Self::TargetToSource => Self::SourceToTarget,
        }
    }

    /// Platform the change notification came from.
    pub const fn origin_platform(self) -> Platform {
        match self {
            Self::SourceToTarget => Platform::Source,
            Self::TargetToSource => Platform::Target,
        }
    }

    /// Platform that receives the write.
    pub const fn destination_platform(self) -> Platform {
        self.origin_platform().other()
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source_to_target" => Ok(Self::SourceToTarget),
            "target_to_source" => Ok(Self::TargetToSource),
            other => Err(Error::InvalidInput(format!("unknown sync direction: {other}"))),
        }
    }
}

/// Direction(s) a field mapping participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingDirection {
    SourceToTarget,
    TargetToSource,
    Both,
}

impl MappingDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SourceToTarget => "source_to_target",
            Self::TargetToSource => "target_to_source",
            Self::Both => "both",
        }
    }

    /// Whether a rule with this direction is evaluated when propagating `direction`.
    pub const fn applies_to(self, direction: SyncDirection) -> bool {
        matches!(
            (self, direction),
            (Self::Both, _)
                | (Self::SourceToTarget, SyncDirection::SourceToTarget)
                | (Self::TargetToSource, SyncDirection::TargetToSource)
        )
    }
}

impl FromStr for MappingDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source_to_target" => Ok(Self::SourceToTarget),
            "target_to_source" => Ok(Self::TargetToSource),
            "both" => Ok(Self::Both),
            other => Err(Error::InvalidInput(format!(
                "unknown mapping direction: {other}"
            ))),
        }
    }
}

/// What triggered a propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOrigin {
    Webhook,
    Manual,
    Form,
}

impl SyncOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Manual => "manual",
            Self::Form => "form",
        }
    }
}

impl FromStr for SyncOrigin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(Self::Webhook),
            "manual" => Ok(Self::Manual),
            "form" => Ok(Self::Form),
            other => Err(Error::InvalidInput(format!("unknown sync origin: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_applies_in_either_direction() {
        assert!(MappingDirection::Both.applies_to(SyncDirection::SourceToTarget));
        assert!(MappingDirection::Both.applies_to(SyncDirection::TargetToSource));
    }

    #[test]
    fn one_way_mapping_applies_only_to_its_direction() {
        assert!(MappingDirection::SourceToTarget.applies_to(SyncDirection::SourceToTarget));
        assert!(!MappingDirection::SourceToTarget.applies_to(SyncDirection::TargetToSource));
        assert!(!MappingDirection::TargetToSource.applies_to(SyncDirection::SourceToTarget));
    }

    #[test]
    fn direction_platforms_are_opposite() {
        let direction = SyncDirection::SourceToTarget;
        assert_eq!(direction.origin_platform(), Platform::Source);
        assert_eq!(direction.destination_platform(), Platform::Target);
        assert_eq!(direction.opposite(), SyncDirection::TargetToSource);
    }

    #[test]
    fn direction_parses_its_own_labels() {
        for direction in [SyncDirection::SourceToTarget, SyncDirection::TargetToSource] {
            assert_eq!(direction.as_str().parse::<SyncDirection>().unwrap(), direction);
        }
        assert!("sideways".parse::<SyncDirection>().is_err());
    }
}
