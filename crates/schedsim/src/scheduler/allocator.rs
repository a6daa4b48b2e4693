use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexSet;
use serde::Serialize;

use schedsim_core::{cast, log_debug, Event, EventHandler, Id, SimulationContext};

use crate::config::MesosAllocatorConfig;
use crate::core::cell_state::CellState;
use crate::core::claim_delta::ClaimDelta;
use crate::core::common::ConflictMode;
use crate::core::events::{
    BuildOffer, OfferRequestCancelled, OfferRequested, OfferResponded, ResourceOffered,
    TaskFinished,
};
use crate::scheduler::mesos::MesosScheduler;

/// A one-shot handle on resources offered to a single scheduler.
///
/// Carries an exclusive snapshot of the cell state taken at offer-build
/// time; the matching locked deltas are retained allocator-side, keyed by
/// the offer id.
#[derive(Clone, Serialize)]
pub struct Offer {
    pub id: u64,
    pub scheduler: String,
    pub cell_state: CellState,
}

/// The central Mesos-style allocator.
///
/// Schedulers request offers; requests arriving within one batch interval
/// coalesce into a single offer round. Each round picks the requester with
/// the lowest dominant resource share, locks everything currently
/// available in the shared cell state on its behalf, and sends it the
/// offer. The response commits the chosen subset and releases the rest.
pub struct MesosAllocator {
    cell_state: Rc<RefCell<CellState>>,
    schedulers: HashMap<String, (Id, Rc<RefCell<MesosScheduler>>)>,
    /// Requesters in arrival order; DRF ties break in favor of earlier entries.
    schedulers_requesting_resources: IndexSet<String>,
    offered_deltas: HashMap<u64, Vec<ClaimDelta>>,
    next_offer_id: u64,
    build_and_send_offer_scheduled: bool,
    pub time_spent_allocating: f64,

    constant_think_time: f64,
    min_cpu_offer: f64,
    min_mem_offer: f64,
    offer_batch_interval: f64,

    ctx: SimulationContext,
}

impl MesosAllocator {
    pub fn new(
        config: MesosAllocatorConfig,
        cell_state: Rc<RefCell<CellState>>,
        ctx: SimulationContext,
    ) -> Self {
        if cell_state.borrow().conflict_mode() != ConflictMode::ResourceFit {
            panic!("invalid config: mesos allocation requires a cell state with the resource-fit conflict mode");
        }
        Self {
            cell_state,
            schedulers: HashMap::new(),
            schedulers_requesting_resources: IndexSet::new(),
            offered_deltas: HashMap::new(),
            next_offer_id: 0,
            build_and_send_offer_scheduled: false,
            time_spent_allocating: 0.0,
            constant_think_time: config.constant_think_time,
            min_cpu_offer: config.min_cpu_offer,
            min_mem_offer: config.min_mem_offer,
            offer_batch_interval: config.offer_batch_interval,
            ctx,
        }
    }

    pub fn add_scheduler(&mut self, id: Id, scheduler: Rc<RefCell<MesosScheduler>>) {
        let name = scheduler.borrow().name().to_owned();
        self.schedulers.insert(name, (id, scheduler));
    }

    fn on_offer_requested(&mut self, scheduler: String) {
        log_debug!(self.ctx, "received an offer request from {}", scheduler);
        self.schedulers_requesting_resources.insert(scheduler);
        self.sched_build_and_send_offer();
    }

    fn on_offer_request_cancelled(&mut self, scheduler: String) {
        log_debug!(self.ctx, "cancelling the outstanding offer request of {}", scheduler);
        self.schedulers_requesting_resources.shift_remove(&scheduler);
    }

    /// Arms the batched offer round unless one is already pending.
    /// Coalesces all requests arriving within one batch window.
    fn sched_build_and_send_offer(&mut self) {
        if !self.build_and_send_offer_scheduled {
            self.build_and_send_offer_scheduled = true;
            self.ctx.emit_self(BuildOffer {}, self.offer_batch_interval);
        }
    }

    fn on_build_offer(&mut self) {
        self.build_and_send_offer_scheduled = false;
        self.build_and_send_offer();
    }

    fn build_and_send_offer(&mut self) {
        let (available_cpus, available_mem) = {
            let cell_state = self.cell_state.borrow();
            log_debug!(
                self.ctx,
                "starting an offer round: {} of {} cpus and {} of {} mem available",
                cell_state.available_cpus(),
                cell_state.total_cpus(),
                cell_state.available_mem(),
                cell_state.total_mem()
            );
            (cell_state.available_cpus(), cell_state.available_mem())
        };

        if self.schedulers_requesting_resources.is_empty() {
            log_debug!(self.ctx, "not sending an offer: no schedulers currently want offers");
            return;
        }
        if available_cpus < self.min_cpu_offer || available_mem < self.min_mem_offer {
            log_debug!(
                self.ctx,
                "not sending an offer: only {} cpus and {} mem available, \
                 but the minimum offer size is {} cpus and {} mem",
                available_cpus,
                available_mem,
                self.min_cpu_offer,
                self.min_mem_offer
            );
            return;
        }

        let candidate_name = self.drf_sort_requesters().remove(0);
        let (candidate_id, candidate) = self
            .schedulers
            .get(&candidate_name)
            .unwrap_or_else(|| panic!("scheduler {} is not registered with the allocator", candidate_name))
            .clone();

        let offer = Offer {
            id: self.next_offer_id,
            scheduler: candidate_name.clone(),
            cell_state: self.cell_state.borrow().clone(),
        };
        self.next_offer_id += 1;

        // Lock the offered resources in the shared cell state, so that a
        // concurrent offer round does not see them as available.
        let locked_deltas = candidate
            .borrow()
            .schedule_all_available(&mut self.cell_state.borrow_mut(), true);
        if locked_deltas.is_empty() {
            return;
        }
        self.offered_deltas.insert(offer.id, locked_deltas);

        log_debug!(
            self.ctx,
            "sending offer {} to {} after {} seconds of allocator think time",
            offer.id,
            candidate_name,
            self.constant_think_time
        );
        self.time_spent_allocating += self.constant_think_time;
        self.ctx.emit(ResourceOffered { offer }, candidate_id, self.constant_think_time);
    }

    /// Requesters sorted by ascending dominant share: for each scheduler
    /// the larger of its occupied-cpu and occupied-mem fraction of the
    /// whole cell. Ties keep request arrival order (stable sort).
    fn drf_sort_requesters(&self) -> Vec<String> {
        let cell_state = self.cell_state.borrow();
        let total_cpus = cell_state.total_cpus();
        let total_mem = cell_state.total_mem();
        let mut dominant_shares: Vec<(String, f64)> = self
            .schedulers_requesting_resources
            .iter()
            .map(|name| {
                let share_of_cpus = cell_state.occupied_cpus_of(name) / total_cpus;
                let share_of_mem = cell_state.occupied_mem_of(name) / total_mem;
                let dominant_share = share_of_cpus.max(share_of_mem);
                log_debug!(self.ctx, "{}'s dominant share is {:.4}", name, dominant_share);
                (name.clone(), dominant_share)
            })
            .collect();
        dominant_shares.sort_by(|a, b| a.1.total_cmp(&b.1));
        dominant_shares.into_iter().map(|(name, _)| name).collect()
    }

    fn on_offer_responded(&mut self, offer_id: u64, scheduler: String, claim_deltas: Vec<ClaimDelta>) {
        log_debug!(
            self.ctx,
            "scheduler {} responded to offer {} with {} claim deltas",
            scheduler,
            offer_id,
            claim_deltas.len()
        );

        // Release the lock taken when the offer was built.
        if let Some(saved_deltas) = self.offered_deltas.remove(&offer_id) {
            let mut cell_state = self.cell_state.borrow_mut();
            for delta in &saved_deltas {
                delta.un_apply(&mut cell_state, true);
            }
        }
        log_debug!(
            self.ctx,
            "unlocked offer {}, {} cpus and {} mem now available",
            offer_id,
            self.cell_state.borrow().available_cpus(),
            self.cell_state.borrow().available_mem()
        );

        if !claim_deltas.is_empty() {
            let result = self.cell_state.borrow_mut().commit(claim_deltas, false, &self.ctx);
            if !result.conflicted.is_empty() {
                // The scheduler chose out of resources locked for it, so a
                // resource-fit commit must accept every delta.
                panic!(
                    "protocol violation: offer response from {} produced {} conflicting deltas",
                    scheduler,
                    result.conflicted.len()
                );
            }
            for delta in result.committed {
                let duration = delta.duration;
                self.ctx.emit_self(TaskFinished { delta }, duration);
            }
        }

        self.sched_build_and_send_offer();
    }

    fn on_task_finished(&mut self, delta: ClaimDelta) {
        delta.un_apply(&mut self.cell_state.borrow_mut(), false);
        {
            let cell_state = self.cell_state.borrow();
            log_debug!(
                self.ctx,
                "a task started by scheduler {} finished, freeing {} cpus and {} mem \
                 (available: {} cpus, {} mem), triggering a new offer round",
                delta.scheduler,
                delta.cpus,
                delta.mem,
                cell_state.available_cpus(),
                cell_state.available_mem()
            );
        }
        self.sched_build_and_send_offer();
    }
}

impl EventHandler for MesosAllocator {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            OfferRequested { scheduler } => {
                self.on_offer_requested(scheduler);
            }
            OfferRequestCancelled { scheduler } => {
                self.on_offer_request_cancelled(scheduler);
            }
            BuildOffer {} => {
                self.on_build_offer();
            }
            OfferResponded { offer_id, scheduler, claim_deltas } => {
                self.on_offer_responded(offer_id, scheduler, claim_deltas);
            }
            TaskFinished { delta } => {
                self.on_task_finished(delta);
            }
        })
    }
}
