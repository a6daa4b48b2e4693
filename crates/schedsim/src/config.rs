//! Configuration of cells, schedulers and the allocator.

use std::collections::HashMap;
use std::fs;

use serde::{Deserialize, Serialize};

use crate::core::common::{ConflictMode, TransactionMode};

/// Shape and concurrency-control settings of a cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellConfig {
    pub num_machines: u32,
    pub cpus_per_machine: f64,
    pub mem_per_machine: f64,
    pub conflict_mode: ConflictMode,
    pub transaction_mode: TransactionMode,
}

/// Per-scheduler settings, shared by both scheduler kinds.
///
/// Think times are per workload name; unknown workloads default to 0.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub name: String,
    #[serde(default)]
    pub constant_think_times: HashMap<String, f64>,
    #[serde(default)]
    pub per_task_think_times: HashMap<String, f64>,
    #[serde(default)]
    pub num_machines_to_blacklist: u32,
}

impl SchedulerConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            constant_think_times: HashMap::new(),
            per_task_think_times: HashMap::new(),
            num_machines_to_blacklist: 0,
        }
    }

    pub fn constant_think_time(mut self, workload: &str, value: f64) -> Self {
        self.constant_think_times.insert(workload.to_owned(), value);
        self
    }

    pub fn per_task_think_time(mut self, workload: &str, value: f64) -> Self {
        self.per_task_think_times.insert(workload.to_owned(), value);
        self
    }
}

/// Tunables of the Mesos allocator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MesosAllocatorConfig {
    #[serde(default)]
    pub constant_think_time: f64,
    #[serde(default = "default_min_cpu_offer")]
    pub min_cpu_offer: f64,
    #[serde(default = "default_min_mem_offer")]
    pub min_mem_offer: f64,
    #[serde(default = "default_offer_batch_interval")]
    pub offer_batch_interval: f64,
}

fn default_min_cpu_offer() -> f64 {
    100.0
}

fn default_min_mem_offer() -> f64 {
    100.0
}

fn default_offer_batch_interval() -> f64 {
    1.0
}

impl Default for MesosAllocatorConfig {
    fn default() -> Self {
        Self {
            constant_think_time: 0.0,
            min_cpu_offer: default_min_cpu_offer(),
            min_mem_offer: default_min_mem_offer(),
            offer_batch_interval: default_offer_batch_interval(),
        }
    }
}

/// The Mesos side of an experiment: one allocator and its schedulers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MesosConfig {
    #[serde(default)]
    pub allocator: MesosAllocatorConfig,
    pub schedulers: Vec<SchedulerConfig>,
}

/// A full experiment description, loadable from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub cell: CellConfig,
    #[serde(default)]
    pub omega_schedulers: Vec<SchedulerConfig>,
    #[serde(default)]
    pub mesos: Option<MesosConfig>,
}

fn default_seed() -> u64 {
    123
}

impl ExperimentConfig {
    /// Reads an experiment config from a YAML file.
    /// Panics on unreadable or malformed input.
    pub fn from_file(file_name: &str) -> Self {
        let raw_data = fs::read_to_string(file_name)
            .unwrap_or_else(|e| panic!("invalid config: cannot read {}: {}", file_name, e));
        serde_yaml::from_str(&raw_data)
            .unwrap_or_else(|e| panic!("invalid config: cannot parse {}: {}", file_name, e))
    }
}
