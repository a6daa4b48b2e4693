use std::collections::{HashMap, VecDeque};

use crate::core::cell_state::CellState;
use crate::core::claim_delta::ClaimDelta;
use crate::core::job::Job;

/// Delay before a partially scheduled job re-enters its scheduler's queue.
pub const SCHEDULING_RETRY_PERIOD: f64 = 1.0;

/// Give up on a job after this many attempts that scheduled nothing at all.
pub const MAX_FRUITLESS_SCHEDULING_ATTEMPTS: u64 = 100;

/// Give up on a job unconditionally after this many attempts.
pub const MAX_SCHEDULING_ATTEMPTS: u64 = 1000;

/// State and behavior shared by all scheduler kinds: the pending job
/// queue, the think-time model, the first-fit placement algorithm and the
/// transaction counters. Composed into the concrete scheduler components.
pub struct SchedulerCore {
    pub name: String,
    constant_think_times: HashMap<String, f64>,
    per_task_think_times: HashMap<String, f64>,
    num_machines_to_blacklist: u32,

    pub pending_queue: VecDeque<Job>,
    /// True while a scheduling cycle is in flight. At most one
    /// think-delayed action exists per scheduler at a time.
    pub scheduling: bool,

    pub num_successful_transactions: u64,
    pub num_failed_transactions: u64,
    pub num_retried_transactions: u64,
    pub num_successful_task_transactions: u64,
    pub num_failed_task_transactions: u64,
    pub num_no_resources_found_scheduling_attempts: u64,
    pub num_jobs_timed_out_scheduling: u64,

    pub total_useful_time_scheduling: f64,
    pub total_wasted_time_scheduling: f64,
    pub first_attempt_useful_time_scheduling: f64,
    pub first_attempt_wasted_time_scheduling: f64,
}

impl SchedulerCore {
    pub fn new(
        name: &str,
        constant_think_times: HashMap<String, f64>,
        per_task_think_times: HashMap<String, f64>,
        num_machines_to_blacklist: u32,
    ) -> Self {
        Self {
            name: name.to_owned(),
            constant_think_times,
            per_task_think_times,
            num_machines_to_blacklist,
            pending_queue: VecDeque::new(),
            scheduling: false,
            num_successful_transactions: 0,
            num_failed_transactions: 0,
            num_retried_transactions: 0,
            num_successful_task_transactions: 0,
            num_failed_task_transactions: 0,
            num_no_resources_found_scheduling_attempts: 0,
            num_jobs_timed_out_scheduling: 0,
            total_useful_time_scheduling: 0.0,
            total_wasted_time_scheduling: 0.0,
            first_attempt_useful_time_scheduling: 0.0,
            first_attempt_wasted_time_scheduling: 0.0,
        }
    }

    /// Simulated scheduler latency for one scheduling attempt of a job:
    /// `constant + per_task * unscheduled_tasks`, with both terms
    /// defaulting to 0 for unknown workloads.
    pub fn think_time(&self, job: &Job) -> f64 {
        let constant = self.constant_think_times.get(&job.workload_name).copied().unwrap_or(0.0);
        let per_task = self.per_task_think_times.get(&job.workload_name).copied().unwrap_or(0.0);
        constant + per_task * job.unscheduled_tasks as f64
    }

    /// First-fit placement of a job's unscheduled tasks over the machines
    /// of the given cell state.
    ///
    /// Walks machine ids in order (minus the blacklisted tail), packs as
    /// many tasks as fit into one claim delta per machine, and applies each
    /// delta to the cell state right away so later machines see the reduced
    /// availability. Returns the built deltas; empty if nothing fits.
    pub fn schedule_job(&self, job: &Job, cell_state: &mut CellState) -> Vec<ClaimDelta> {
        let mut deltas = Vec::new();
        let mut remaining_tasks = job.unscheduled_tasks;
        let candidate_machines = cell_state.num_machines().saturating_sub(self.num_machines_to_blacklist);
        for machine_id in 0..candidate_machines {
            if remaining_tasks == 0 {
                break;
            }
            let num_tasks = job
                .num_tasks_to_schedule(
                    cell_state.available_cpus_on(machine_id),
                    cell_state.available_mem_on(machine_id),
                )
                .min(remaining_tasks);
            if num_tasks > 0 {
                let delta = ClaimDelta::new(
                    &self.name,
                    machine_id,
                    cell_state.machine_seq_num(machine_id),
                    job.task_duration,
                    num_tasks as f64 * job.cpus_per_task,
                    num_tasks as f64 * job.mem_per_task,
                );
                delta.apply(cell_state, false);
                deltas.push(delta);
                remaining_tasks -= num_tasks;
            }
        }
        deltas
    }

    /// Whether to stop retrying a job: either it never placed a single task
    /// in over [`MAX_FRUITLESS_SCHEDULING_ATTEMPTS`] tries, or it exhausted
    /// [`MAX_SCHEDULING_ATTEMPTS`] tries overall.
    pub fn should_abandon(&self, job: &Job) -> bool {
        (job.num_scheduling_attempts > MAX_FRUITLESS_SCHEDULING_ATTEMPTS
            && job.unscheduled_tasks == job.num_tasks)
            || job.num_scheduling_attempts > MAX_SCHEDULING_ATTEMPTS
    }

    pub fn record_useful_time_scheduling(&mut self, job: &mut Job, think_time: f64, first_attempt: bool) {
        job.useful_time_scheduling += think_time;
        self.total_useful_time_scheduling += think_time;
        if first_attempt {
            self.first_attempt_useful_time_scheduling += think_time;
        }
    }

    pub fn record_wasted_time_scheduling(&mut self, job: &mut Job, think_time: f64, first_attempt: bool) {
        job.wasted_time_scheduling += think_time;
        self.total_wasted_time_scheduling += think_time;
        if first_attempt {
            self.first_attempt_wasted_time_scheduling += think_time;
        }
    }
}

/// Number of tasks a batched per-machine delta covers for the given job.
pub(crate) fn tasks_covered(delta: &ClaimDelta, job: &Job) -> u32 {
    if job.cpus_per_task > 0.0 {
        (delta.cpus / job.cpus_per_task).round() as u32
    } else {
        (delta.mem / job.mem_per_task).round() as u32
    }
}
