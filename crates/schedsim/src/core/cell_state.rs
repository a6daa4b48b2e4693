use std::collections::HashMap;

use serde::Serialize;

use schedsim_core::{log_debug, SimulationContext};

use crate::core::claim_delta::ClaimDelta;
use crate::core::common::{ConflictMode, TransactionMode, RELEASE_TOLERANCE};
use crate::core::events::TaskFinished;

/// Outcome of a [`CellState::commit`] call.
///
/// Every submitted delta ends up in exactly one of the two lists.
#[derive(Clone, Debug)]
pub struct CommitResult {
    pub committed: Vec<ClaimDelta>,
    pub conflicted: Vec<ClaimDelta>,
}

/// The shared resource ledger of a cell: a fixed set of homogeneous
/// machines with per-machine allocation tracking and per-scheduler
/// occupied/locked accounting.
///
/// Occupied resources back running tasks; locked resources are reserved to
/// an in-flight offer. Both reduce availability. Each machine carries a
/// sequence number bumped on every successful non-locked apply, the token
/// of optimistic concurrency control.
///
/// Cloning produces a fully independent snapshot (schedulers use this for
/// private cell states and offers).
#[derive(Clone, Serialize)]
pub struct CellState {
    num_machines: u32,
    cpus_per_machine: f64,
    mem_per_machine: f64,
    conflict_mode: ConflictMode,
    transaction_mode: TransactionMode,

    allocated_cpus_per_machine: Vec<f64>,
    allocated_mem_per_machine: Vec<f64>,
    machine_seq_nums: Vec<u32>,

    occupied_cpus: HashMap<String, f64>,
    occupied_mem: HashMap<String, f64>,
    locked_cpus: HashMap<String, f64>,
    locked_mem: HashMap<String, f64>,

    total_occupied_cpus: f64,
    total_occupied_mem: f64,
    total_locked_cpus: f64,
    total_locked_mem: f64,
}

impl CellState {
    pub fn new(
        num_machines: u32,
        cpus_per_machine: f64,
        mem_per_machine: f64,
        conflict_mode: ConflictMode,
        transaction_mode: TransactionMode,
    ) -> Self {
        if num_machines == 0 {
            panic!("invalid config: the number of machines must be positive");
        }
        if cpus_per_machine <= 0.0 || mem_per_machine <= 0.0 {
            panic!("invalid config: machine cpu and memory capacities must be positive");
        }
        Self {
            num_machines,
            cpus_per_machine,
            mem_per_machine,
            conflict_mode,
            transaction_mode,
            allocated_cpus_per_machine: vec![0.0; num_machines as usize],
            allocated_mem_per_machine: vec![0.0; num_machines as usize],
            machine_seq_nums: vec![0; num_machines as usize],
            occupied_cpus: HashMap::new(),
            occupied_mem: HashMap::new(),
            locked_cpus: HashMap::new(),
            locked_mem: HashMap::new(),
            total_occupied_cpus: 0.0,
            total_occupied_mem: 0.0,
            total_locked_cpus: 0.0,
            total_locked_mem: 0.0,
        }
    }

    pub fn num_machines(&self) -> u32 {
        self.num_machines
    }

    pub fn cpus_per_machine(&self) -> f64 {
        self.cpus_per_machine
    }

    pub fn mem_per_machine(&self) -> f64 {
        self.mem_per_machine
    }

    pub fn conflict_mode(&self) -> ConflictMode {
        self.conflict_mode
    }

    pub fn transaction_mode(&self) -> TransactionMode {
        self.transaction_mode
    }

    pub fn total_cpus(&self) -> f64 {
        self.num_machines as f64 * self.cpus_per_machine
    }

    pub fn total_mem(&self) -> f64 {
        self.num_machines as f64 * self.mem_per_machine
    }

    pub fn available_cpus(&self) -> f64 {
        self.total_cpus() - (self.total_occupied_cpus + self.total_locked_cpus)
    }

    pub fn available_mem(&self) -> f64 {
        self.total_mem() - (self.total_occupied_mem + self.total_locked_mem)
    }

    pub fn total_occupied_cpus(&self) -> f64 {
        self.total_occupied_cpus
    }

    pub fn total_occupied_mem(&self) -> f64 {
        self.total_occupied_mem
    }

    pub fn total_locked_cpus(&self) -> f64 {
        self.total_locked_cpus
    }

    pub fn total_locked_mem(&self) -> f64 {
        self.total_locked_mem
    }

    /// Cpus occupied by the named scheduler (0 if it holds nothing).
    pub fn occupied_cpus_of(&self, scheduler: &str) -> f64 {
        self.occupied_cpus.get(scheduler).copied().unwrap_or(0.0)
    }

    pub fn occupied_mem_of(&self, scheduler: &str) -> f64 {
        self.occupied_mem.get(scheduler).copied().unwrap_or(0.0)
    }

    pub fn locked_cpus_of(&self, scheduler: &str) -> f64 {
        self.locked_cpus.get(scheduler).copied().unwrap_or(0.0)
    }

    pub fn locked_mem_of(&self, scheduler: &str) -> f64 {
        self.locked_mem.get(scheduler).copied().unwrap_or(0.0)
    }

    fn check_machine(&self, machine_id: u32) {
        if machine_id >= self.num_machines {
            panic!("there is no machine with id {}", machine_id);
        }
    }

    pub fn machine_seq_num(&self, machine_id: u32) -> u32 {
        self.check_machine(machine_id);
        self.machine_seq_nums[machine_id as usize]
    }

    pub fn increment_machine_seq_num(&mut self, machine_id: u32) {
        self.check_machine(machine_id);
        self.machine_seq_nums[machine_id as usize] += 1;
    }

    pub fn available_cpus_on(&self, machine_id: u32) -> f64 {
        self.check_machine(machine_id);
        self.cpus_per_machine - self.allocated_cpus_per_machine[machine_id as usize]
    }

    pub fn available_mem_on(&self, machine_id: u32) -> f64 {
        self.check_machine(machine_id);
        self.mem_per_machine - self.allocated_mem_per_machine[machine_id as usize]
    }

    pub fn allocated_cpus_on(&self, machine_id: u32) -> f64 {
        self.check_machine(machine_id);
        self.allocated_cpus_per_machine[machine_id as usize]
    }

    pub fn allocated_mem_on(&self, machine_id: u32) -> f64 {
        self.check_machine(machine_id);
        self.allocated_mem_per_machine[machine_id as usize]
    }

    /// Allocates resources on a machine to a scheduler.
    ///
    /// `locked` marks resources reserved to an in-flight offer rather than
    /// backing a running task. The machine id and both capacities are
    /// validated before anything is mutated, so a failed assign leaves the
    /// ledger untouched.
    pub fn assign_resources(
        &mut self,
        scheduler: &str,
        machine_id: u32,
        cpus: f64,
        mem: f64,
        locked: bool,
    ) {
        let available_cpus = self.available_cpus_on(machine_id);
        let available_mem = self.available_mem_on(machine_id);
        if available_cpus < cpus {
            panic!(
                "scheduler {} tried to claim {} cpus on machine {}, \
                 but it only has {} unallocated cpus right now",
                scheduler, cpus, machine_id, available_cpus
            );
        }
        if available_mem < mem {
            panic!(
                "scheduler {} tried to claim {} mem on machine {}, \
                 but it only has {} mem unallocated right now",
                scheduler, mem, machine_id, available_mem
            );
        }

        if locked {
            *self.locked_cpus.entry(scheduler.to_owned()).or_insert(0.0) += cpus;
            *self.locked_mem.entry(scheduler.to_owned()).or_insert(0.0) += mem;
            self.total_locked_cpus += cpus;
            self.total_locked_mem += mem;
        } else {
            *self.occupied_cpus.entry(scheduler.to_owned()).or_insert(0.0) += cpus;
            *self.occupied_mem.entry(scheduler.to_owned()).or_insert(0.0) += mem;
            self.total_occupied_cpus += cpus;
            self.total_occupied_mem += mem;
        }

        self.allocated_cpus_per_machine[machine_id as usize] += cpus;
        self.allocated_mem_per_machine[machine_id as usize] += mem;
    }

    /// Releases resources previously assigned to a scheduler.
    ///
    /// Freeing more than the scheduler holds panics, with
    /// [`RELEASE_TOLERANCE`] of slack to absorb floating accumulation.
    pub fn free_resources(
        &mut self,
        scheduler: &str,
        machine_id: u32,
        cpus: f64,
        mem: f64,
        locked: bool,
    ) {
        self.check_machine(machine_id);

        if locked {
            if !self.locked_cpus.contains_key(scheduler) {
                panic!("{} tried to free locked resources but holds none", scheduler);
            }
            let current_cpus = self.locked_cpus[scheduler];
            let current_mem = self.locked_mem[scheduler];
            if current_cpus < cpus - RELEASE_TOLERANCE || current_mem < mem - RELEASE_TOLERANCE {
                panic!(
                    "{} tried to free {} cpus and {} mem, \
                     but was only locking {} cpus and {} mem",
                    scheduler, cpus, mem, current_cpus, current_mem
                );
            }
            self.locked_cpus.insert(scheduler.to_owned(), current_cpus - cpus);
            self.locked_mem.insert(scheduler.to_owned(), current_mem - mem);
            self.total_locked_cpus -= cpus;
            self.total_locked_mem -= mem;
        } else {
            if !self.occupied_cpus.contains_key(scheduler) {
                panic!("{} tried to free resources but holds none", scheduler);
            }
            let current_cpus = self.occupied_cpus[scheduler];
            let current_mem = self.occupied_mem[scheduler];
            if current_cpus < cpus - RELEASE_TOLERANCE || current_mem < mem - RELEASE_TOLERANCE {
                panic!(
                    "{} tried to free {} cpus and {} mem, \
                     but was only occupying {} cpus and {} mem",
                    scheduler, cpus, mem, current_cpus, current_mem
                );
            }
            self.occupied_cpus.insert(scheduler.to_owned(), current_cpus - cpus);
            self.occupied_mem.insert(scheduler.to_owned(), current_mem - mem);
            self.total_occupied_cpus -= cpus;
            self.total_occupied_mem -= mem;
        }

        self.allocated_cpus_per_machine[machine_id as usize] -= cpus;
        self.allocated_mem_per_machine[machine_id as usize] -= mem;
    }

    /// Attempts to commit a transaction, applying non-conflicting deltas.
    ///
    /// Conflicts are detected per delta according to the cell's conflict
    /// mode. In all-or-nothing mode the first conflict rolls back every
    /// delta applied so far and fails the rest; in incremental mode
    /// conflicting deltas are skipped and the rest commit. Conflicts are
    /// reported as data in the result, never as errors.
    ///
    /// When `schedule_end_event` is set, one [`TaskFinished`] event per
    /// committed delta is emitted to the calling component at
    /// `now + delta.duration`; the receiver is expected to un-apply the
    /// delta against the shared cell state.
    pub fn commit(
        &mut self,
        deltas: Vec<ClaimDelta>,
        schedule_end_event: bool,
        ctx: &SimulationContext,
    ) -> CommitResult {
        let mut committed: Vec<ClaimDelta> = Vec::new();
        let mut conflicted: Vec<ClaimDelta> = Vec::new();
        let mut rollback = false;

        let mut deltas = deltas.into_iter();
        for delta in deltas.by_ref() {
            if self.causes_conflict(&delta) {
                self.log_conflict(&delta, ctx);
                conflicted.push(delta);
                if self.transaction_mode == TransactionMode::AllOrNothing {
                    rollback = true;
                    break;
                }
            } else {
                delta.apply(self, false);
                committed.push(delta);
            }
        }

        if rollback {
            // The unexamined remainder fails with the transaction.
            conflicted.extend(deltas);
            log_debug!(ctx, "rolling back {} deltas", committed.len());
            for delta in committed.drain(..) {
                delta.un_apply(self, false);
                conflicted.push(delta);
            }
        }

        if schedule_end_event {
            for delta in &committed {
                ctx.emit_self(TaskFinished { delta: delta.clone() }, delta.duration);
            }
        }

        CommitResult { committed, conflicted }
    }

    /// Tests whether this delta would conflict with the current ledger
    /// state, according to the cell's conflict mode.
    pub fn causes_conflict(&self, delta: &ClaimDelta) -> bool {
        match self.conflict_mode {
            ConflictMode::SequenceNumbers => {
                delta.machine_seq_num != self.machine_seq_num(delta.machine_id)
            }
            ConflictMode::ResourceFit => {
                self.available_cpus_on(delta.machine_id) < delta.cpus
                    || self.available_mem_on(delta.machine_id) < delta.mem
            }
        }
    }

    fn log_conflict(&self, delta: &ClaimDelta, ctx: &SimulationContext) {
        match self.conflict_mode {
            ConflictMode::SequenceNumbers => log_debug!(
                ctx,
                "sequence-number conflict (sched-{}, mach-{}, seq-num-{}, cpus-{}, mem-{})",
                delta.scheduler,
                delta.machine_id,
                delta.machine_seq_num,
                delta.cpus,
                delta.mem
            ),
            ConflictMode::ResourceFit => log_debug!(
                ctx,
                "resource-fit conflict (sched-{}, mach-{}, cpus-{}, mem-{})",
                delta.scheduler,
                delta.machine_id,
                delta.cpus,
                delta.mem
            ),
        }
    }
}
