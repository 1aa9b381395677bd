use crate::errors::CoordinatorError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How many replicas must acknowledge a write before it counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    One,
    Two,
    Three,
    #[default]
    Quorum,
    All,
}

impl ConsistencyLevel {
    /// Successful responses needed for `replication_factor` replicas.
    pub fn required(&self, replication_factor: usize) -> usize {
        match self {
            ConsistencyLevel::One => 1,
            ConsistencyLevel::Two => 2,
            ConsistencyLevel::Three => 3,
            ConsistencyLevel::Quorum => replication_factor / 2 + 1,
            ConsistencyLevel::All => replication_factor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "one" => Ok(ConsistencyLevel::One),
            "two" => Ok(ConsistencyLevel::Two),
            "three" => Ok(ConsistencyLevel::Three),
            "quorum" => Ok(ConsistencyLevel::Quorum),
            "all" => Ok(ConsistencyLevel::All),
            _ => Err(CoordinatorError::InvalidConsistency(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_is_a_strict_majority() {
        assert_eq!(ConsistencyLevel::Quorum.required(1), 1);
        assert_eq!(ConsistencyLevel::Quorum.required(2), 2);
        assert_eq!(ConsistencyLevel::Quorum.required(3), 2);
        assert_eq!(ConsistencyLevel::Quorum.required(5), 3);
    }

    #[test]
    fn test_fixed_levels_ignore_replication_factor() {
        assert_eq!(ConsistencyLevel::One.required(5), 1);
        assert_eq!(ConsistencyLevel::Two.required(5), 2);
        assert_eq!(ConsistencyLevel::Three.required(5), 3);
        assert_eq!(ConsistencyLevel::All.required(5), 5);
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("QUORUM".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::Quorum);
        assert_eq!("one".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::One);
        assert!(matches!(
            "any".parse::<ConsistencyLevel>(),
            Err(CoordinatorError::InvalidConsistency(_))
        ));
    }
}
