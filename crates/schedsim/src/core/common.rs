use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

/// Slack allowed when freeing resources, absorbing floating-point
/// accumulation over repeated assign/free cycles.
pub const RELEASE_TOLERANCE: f64 = 1e-3;

/// Width of the buckets used by per-day transaction counters.
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// How commit detects that a claim delta lost the race for its machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictMode {
    /// A delta conflicts iff its machine can no longer fit it, no matter
    /// how the machine changed in between. Required by Mesos-style
    /// allocation, where concurrent non-overlapping claims must coexist.
    ResourceFit,
    /// A delta conflicts iff its machine changed since the snapshot the
    /// delta was built from. This is Omega-style optimistic concurrency:
    /// the second scheduler to touch a machine is detected as stale.
    SequenceNumbers,
}

impl Display for ConflictMode {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ConflictMode::ResourceFit => write!(f, "resource-fit"),
            ConflictMode::SequenceNumbers => write!(f, "sequence-numbers"),
        }
    }
}

/// What happens to the rest of a transaction when one delta conflicts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionMode {
    /// Any conflict rolls back the whole transaction.
    AllOrNothing,
    /// Conflicting deltas are skipped, the rest commit.
    Incremental,
}

impl Display for TransactionMode {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            TransactionMode::AllOrNothing => write!(f, "all-or-nothing"),
            TransactionMode::Incremental => write!(f, "incremental"),
        }
    }
}
