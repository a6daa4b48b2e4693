use std::collections::VecDeque;

use schedsim_core::{cast, log_debug, log_info, Event, EventHandler, Id, SimulationContext};

use crate::config::SchedulerConfig;
use crate::core::cell_state::CellState;
use crate::core::claim_delta::ClaimDelta;
use crate::core::events::{
    JobArrived, OfferRequestCancelled, OfferRequested, OfferResponded, ResourceOffered,
};
use crate::core::job::Job;
use crate::scheduler::allocator::Offer;
use crate::scheduler::base::{tasks_covered, SchedulerCore, SCHEDULING_RETRY_PERIOD};

// Availability below this is treated as an exhausted offer.
const OFFER_RESOURCE_EPSILON: f64 = 1e-6;

/// A scheduler driven by Mesos-style resource offers.
///
/// Instead of racing on the shared cell state, it asks the allocator for
/// an offer whenever it has pending jobs, schedules against the exclusive
/// snapshot carried by the offer, and hands the chosen claim deltas back
/// to the allocator for conflict-free commit.
pub struct MesosScheduler {
    pub core: SchedulerCore,
    allocator_id: Id,
    offer_queue: VecDeque<Offer>,
    ctx: SimulationContext,
}

impl MesosScheduler {
    pub fn new(config: SchedulerConfig, allocator_id: Id, ctx: SimulationContext) -> Self {
        Self {
            core: SchedulerCore::new(
                &config.name,
                config.constant_think_times,
                config.per_task_think_times,
                config.num_machines_to_blacklist,
            ),
            allocator_id,
            offer_queue: VecDeque::new(),
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

    /// Enqueues a job and asks the allocator for a resource offer.
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
        self.ctx.emit_now(
            OfferRequested { scheduler: self.core.name.clone() },
            self.allocator_id,
        );
    }

    /// Claims the full remaining availability of every machine on behalf of
    /// this scheduler, applying the deltas to the given cell state.
    ///
    /// The allocator calls this with `locked = true` against the shared
    /// cell state when building an offer, so that resources under offer
    /// stop looking available to everyone else.
    pub fn schedule_all_available(&self, cell_state: &mut CellState, locked: bool) -> Vec<ClaimDelta> {
        let mut deltas = Vec::new();
        for machine_id in 0..cell_state.num_machines() {
            let cpus = cell_state.available_cpus_on(machine_id);
            let mem = cell_state.available_mem_on(machine_id);
            if cpus > 0.0 || mem > 0.0 {
                let delta = ClaimDelta::new(
                    &self.core.name,
                    machine_id,
                    cell_state.machine_seq_num(machine_id),
                    0.0,
                    cpus,
                    mem,
                );
                delta.apply(cell_state, locked);
                deltas.push(delta);
            }
        }
        deltas
    }

    fn on_resource_offered(&mut self, offer: Offer) {
        self.offer_queue.push_back(offer);
        self.handle_next_offer();
    }

    fn handle_next_offer(&mut self) {
        if self.core.scheduling {
            return;
        }
        while let Some(mut offer) = self.offer_queue.pop_front() {
            self.core.scheduling = true;
            self.handle_offer(&mut offer);
            self.core.scheduling = false;
        }
    }

    /// Schedules as many pending jobs as fit into the offer's snapshot,
    /// then responds to the allocator after the accumulated think time.
    fn handle_offer(&mut self, offer: &mut Offer) {
        log_debug!(
            self.ctx,
            "handling offer {} with {} cpus and {} mem available",
            offer.id,
            offer.cell_state.available_cpus(),
            offer.cell_state.available_mem()
        );

        let mut response: Vec<ClaimDelta> = Vec::new();
        let mut agg_think_time = 0.0;
        while offer.cell_state.available_cpus() > OFFER_RESOURCE_EPSILON
            && offer.cell_state.available_mem() > OFFER_RESOURCE_EPSILON
        {
            let mut job = match self.core.pending_queue.pop_front() {
                Some(job) => job,
                None => break,
            };
            job.update_time_in_queue_stats(self.ctx.time());
            job.last_scheduling_start_time = self.ctx.time();
            let think_time = self.core.think_time(&job);
            agg_think_time += think_time;
            job.num_scheduling_attempts += 1;
            job.num_task_scheduling_attempts += job.unscheduled_tasks as u64;

            let deltas = self.core.schedule_job(&job, &mut offer.cell_state);
            let first_attempt = job.num_scheduling_attempts == 1;
            if !deltas.is_empty() {
                let scheduled_tasks: u32 = deltas.iter().map(|d| tasks_covered(d, &job)).sum();
                job.unscheduled_tasks -= scheduled_tasks;
                log_debug!(
                    self.ctx,
                    "scheduled {} tasks of job {} out of offer {}",
                    scheduled_tasks,
                    job.id,
                    offer.id
                );
                self.core.num_successful_transactions += 1;
                self.core.num_successful_task_transactions += scheduled_tasks as u64;
                self.core.record_useful_time_scheduling(&mut job, think_time, first_attempt);
                response.extend(deltas);
            } else {
                log_debug!(
                    self.ctx,
                    "offer {} has no room for even one task of job {}",
                    offer.id,
                    job.id
                );
                self.core.num_no_resources_found_scheduling_attempts += 1;
                self.core.record_wasted_time_scheduling(&mut job, think_time, first_attempt);
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
                    self.ctx.emit_self(JobArrived { job }, SCHEDULING_RETRY_PERIOD);
                }
            }
        }

        log_debug!(
            self.ctx,
            "responding to offer {} with {} claim deltas after {} seconds of think time",
            offer.id,
            response.len(),
            agg_think_time
        );
        self.ctx.emit(
            OfferResponded {
                offer_id: offer.id,
                scheduler: self.core.name.clone(),
                claim_deltas: response,
            },
            self.allocator_id,
            agg_think_time,
        );

        // Stay in the offer rotation only while there is work left.
        if self.core.pending_queue.is_empty() {
            self.ctx.emit_now(
                OfferRequestCancelled { scheduler: self.core.name.clone() },
                self.allocator_id,
            );
        } else {
            self.ctx.emit_now(
                OfferRequested { scheduler: self.core.name.clone() },
                self.allocator_id,
            );
        }
    }
}

impl EventHandler for MesosScheduler {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            JobArrived { job } => {
                self.add_job(job);
            }
            ResourceOffered { offer } => {
                self.on_resource_offered(offer);
            }
        })
    }
}
