//! The five-level severity scale shared by filters, priority resolution,
//! and the destination custom resource's `severity` label.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;

/// `CRITICAL > HIGH > MEDIUM > LOW > INFO`, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Rank used for floor comparisons; higher is more severe.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Severity {
    type Err = std::convert::Infallible;

    /// Case-insensitive; unknown severities map to [`Severity::Info`] per
    /// the normalizer's stated fallback rather than erroring, since a
    /// third-party scanner's severity string is never something we can
    /// reject an otherwise-valid event over.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "CRITICAL" | "CRIT" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" | "MED" | "MODERATE" => Severity::Medium,
            "LOW" => Severity::Low,
            _ => Severity::Info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_spec() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn unknown_strings_fall_back_to_info() {
        assert_eq!("wat".parse::<Severity>().unwrap(), Severity::Info);
        assert_eq!("hIgH".parse::<Severity>().unwrap(), Severity::High);
    }
}
