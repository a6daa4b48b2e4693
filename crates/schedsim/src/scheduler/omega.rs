use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use schedsim_core::{cast, log_debug, log_info, Event, EventHandler, SimulationContext};

use crate::config::SchedulerConfig;
use crate::core::cell_state::CellState;
use crate::core::claim_delta::ClaimDelta;
use crate::core::common::SECONDS_PER_DAY;
use crate::core::events::{JobArrived, TaskFinished, ThinkTimeExpired};
use crate::core::job::Job;
use crate::scheduler::base::{tasks_covered, SchedulerCore, SCHEDULING_RETRY_PERIOD};

/// A scheduler using Omega-style optimistic concurrency control.
///
/// Each scheduling cycle works against a private snapshot of the shared
/// cell state taken at cycle start, then submits the resulting claim
/// deltas to the shared transactional commit. Staleness surfaces there as
/// conflicts (sequence-number mode is the intended configuration), and
/// the job retries with a fresh snapshot.
pub struct OmegaScheduler {
    pub core: SchedulerCore,
    cell_state: Rc<RefCell<CellState>>,
    private_cell_state: CellState,
    /// Successful transactions per simulated day, keyed by day index.
    pub daily_successful_transactions: BTreeMap<u64, u64>,
    /// Failed transactions per simulated day, keyed by day index.
    pub daily_failed_transactions: BTreeMap<u64, u64>,
    ctx: SimulationContext,
}

impl OmegaScheduler {
    pub fn new(config: SchedulerConfig, cell_state: Rc<RefCell<CellState>>, ctx: SimulationContext) -> Self {
        let core = SchedulerCore::new(
            &config.name,
            config.constant_think_times,
            config.per_task_think_times,
            config.num_machines_to_blacklist,
        );
        let private_cell_state = cell_state.borrow().clone();
        Self {
            core,
            cell_state,
            private_cell_state,
            daily_successful_transactions: BTreeMap::new(),
            daily_failed_transactions: BTreeMap::new(),
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn job_queue_size(&self) -> usize {
        self.core.pending_queue.len()
    }

    pub fn is_scheduling(&self) -> bool {
        self.core.scheduling
    }

    /// Enqueues a job and starts a scheduling cycle if none is in flight.
    pub fn add_job(&mut self, mut job: Job) {
        assert!(job.unscheduled_tasks > 0, "job {} must have unscheduled tasks", job.id);
        job.last_enqueued = self.ctx.time();
        log_debug!(
            self.ctx,
            "enqueued job {} of workload type {}",
            job.id,
            job.workload_name
        );
        self.core.pending_queue.push_back(job);
        if !self.core.scheduling {
            self.core.scheduling = true;
            let job = self.core.pending_queue.pop_front().unwrap();
            self.handle_job(job);
        }
    }

    /// Starts one scheduling cycle: syncs the private cell state to the
    /// shared one and spends the job's think time before claiming.
    fn handle_job(&mut self, mut job: Job) {
        job.update_time_in_queue_stats(self.ctx.time());
        job.last_scheduling_start_time = self.ctx.time();
        self.private_cell_state = self.cell_state.borrow().clone();
        log_debug!(self.ctx, "synced private cell state");
        let think_time = self.core.think_time(&job);
        self.ctx.emit_self(ThinkTimeExpired { job }, think_time);
    }

    fn on_think_time_expired(&mut self, mut job: Job) {
        assert!(job.unscheduled_tasks > 0, "job {} must have unscheduled tasks", job.id);
        let think_time = self.core.think_time(&job);
        job.num_scheduling_attempts += 1;
        job.num_task_scheduling_attempts += job.unscheduled_tasks as u64;

        let deltas = self.core.schedule_job(&job, &mut self.private_cell_state);
        log_debug!(
            self.ctx,
            "job {} ({}) finished {} seconds of think time, \
             now trying to claim resources for {} tasks with {} cpus and {} mem each",
            job.id,
            job.workload_name,
            think_time,
            job.num_tasks,
            job.cpus_per_task,
            job.mem_per_task
        );

        if !deltas.is_empty() {
            log_debug!(
                self.ctx,
                "submitting a transaction of {} deltas for job {}",
                deltas.len(),
                job.id
            );
            let result = self.cell_state.borrow_mut().commit(deltas, true, &self.ctx);
            let committed_tasks: u32 = result.committed.iter().map(|d| tasks_covered(d, &job)).sum();
            let conflicted_tasks: u32 = result.conflicted.iter().map(|d| tasks_covered(d, &job)).sum();
            job.unscheduled_tasks -= committed_tasks;
            log_debug!(self.ctx, "{} tasks committed for job {}", committed_tasks, job.id);

            self.core.num_successful_task_transactions += committed_tasks as u64;
            self.core.num_failed_task_transactions += conflicted_tasks as u64;
            if job.num_scheduling_attempts > 1 {
                self.core.num_retried_transactions += 1;
            }

            // Any conflict makes the whole attempt count as wasted,
            // even if part of the transaction committed.
            let first_attempt = job.num_scheduling_attempts == 1;
            let day = (self.ctx.time() / SECONDS_PER_DAY).floor() as u64;
            if result.conflicted.is_empty() {
                self.core.num_successful_transactions += 1;
                *self.daily_successful_transactions.entry(day).or_insert(0) += 1;
                self.core.record_useful_time_scheduling(&mut job, think_time, first_attempt);
            } else {
                self.core.num_failed_transactions += 1;
                *self.daily_failed_transactions.entry(day).or_insert(0) += 1;
                self.core.record_wasted_time_scheduling(&mut job, think_time, first_attempt);
            }
        } else {
            log_debug!(
                self.ctx,
                "not enough resources of the right shape to schedule even one task of job {}, \
                 not submitting a transaction",
                job.id
            );
            self.core.num_no_resources_found_scheduling_attempts += 1;
        }

        if job.unscheduled_tasks > 0 {
            if self.core.should_abandon(&job) {
                log_info!(
                    self.ctx,
                    "abandoning job {} ({} cpus, {} mem) with {}/{} remaining tasks after {} scheduling attempts",
                    job.id,
                    job.cpus_per_task,
                    job.mem_per_task,
                    job.unscheduled_tasks,
                    job.num_tasks,
                    job.num_scheduling_attempts
                );
                self.core.num_jobs_timed_out_scheduling += 1;
            } else {
                log_debug!(
                    self.ctx,
                    "job {} still has {} unscheduled tasks, re-enqueueing it",
                    job.id,
                    job.unscheduled_tasks
                );
                self.ctx.emit_self(JobArrived { job }, SCHEDULING_RETRY_PERIOD);
            }
        }

        self.core.scheduling = false;
        if let Some(next_job) = self.core.pending_queue.pop_front() {
            self.core.scheduling = true;
            self.handle_job(next_job);
        }
    }

    fn on_task_finished(&mut self, delta: ClaimDelta) {
        delta.un_apply(&mut self.cell_state.borrow_mut(), false);
        let cell_state = self.cell_state.borrow();
        log_debug!(
            self.ctx,
            "a task started by scheduler {} finished, freeing {} cpus and {} mem \
             (available: {} cpus, {} mem)",
            delta.scheduler,
            delta.cpus,
            delta.mem,
            cell_state.available_cpus(),
            cell_state.available_mem()
        );
    }
}

impl EventHandler for OmegaScheduler {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            JobArrived { job } => {
                self.add_job(job);
            }
            ThinkTimeExpired { job } => {
                self.on_think_time_expired(job);
            }
            TaskFinished { delta } => {
                self.on_task_finished(delta);
            }
        })
    }
}
