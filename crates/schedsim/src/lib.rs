#![doc = include_str!("../readme.md")]

pub mod config;
pub mod core;
pub mod scheduler;
pub mod simulation;
pub mod workload_gen;

pub use crate::core::cell_state::{CellState, CommitResult};
pub use crate::core::claim_delta::ClaimDelta;
pub use crate::core::common::{ConflictMode, TransactionMode};
pub use crate::core::job::Job;
pub use crate::core::workload::Workload;
pub use crate::scheduler::allocator::{MesosAllocator, Offer};
pub use crate::scheduler::mesos::MesosScheduler;
pub use crate::scheduler::omega::OmegaScheduler;
pub use crate::simulation::ClusterSimulation;
