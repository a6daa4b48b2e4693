//! Top-level simulation wiring.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use sugars::{rc, refcell};

use schedsim_core::{log_info, Id, RunStatus, Simulation, SimulationContext};

use crate::config::{CellConfig, ExperimentConfig, MesosAllocatorConfig, SchedulerConfig};
use crate::core::cell_state::CellState;
use crate::core::events::JobArrived;
use crate::core::workload::Workload;
use crate::scheduler::allocator::MesosAllocator;
use crate::scheduler::mesos::MesosScheduler;
use crate::scheduler::omega::OmegaScheduler;

/// Owns the event kernel, the shared cell state and the scheduler
/// registry, and drives a whole experiment.
///
/// Ownership is a tree: the simulation owns the cell and the components;
/// components hold shared handles on the cell and address each other by
/// component id, so there are no reference cycles.
pub struct ClusterSimulation {
    sim: Simulation,
    cell_state: Rc<RefCell<CellState>>,
    ctx: SimulationContext,
    omega_schedulers: HashMap<String, Rc<RefCell<OmegaScheduler>>>,
    mesos_schedulers: HashMap<String, Rc<RefCell<MesosScheduler>>>,
    allocator: Option<Rc<RefCell<MesosAllocator>>>,
    scheduler_ids: HashMap<String, Id>,
}

impl ClusterSimulation {
    pub fn new(seed: u64, cell: CellConfig) -> Self {
        let mut sim = Simulation::new(seed);
        let cell_state = rc!(refcell!(CellState::new(
            cell.num_machines,
            cell.cpus_per_machine,
            cell.mem_per_machine,
            cell.conflict_mode,
            cell.transaction_mode,
        )));
        let ctx = sim.create_context("driver");
        Self {
            sim,
            cell_state,
            ctx,
            omega_schedulers: HashMap::new(),
            mesos_schedulers: HashMap::new(),
            allocator: None,
            scheduler_ids: HashMap::new(),
        }
    }

    /// Builds a complete simulation from an experiment config.
    pub fn from_config(config: &ExperimentConfig) -> Self {
        let mut simulation = Self::new(config.seed, config.cell.clone());
        for scheduler_config in &config.omega_schedulers {
            simulation.add_omega_scheduler(scheduler_config.clone());
        }
        if let Some(mesos) = &config.mesos {
            simulation.set_allocator(mesos.allocator.clone());
            for scheduler_config in &mesos.schedulers {
                simulation.add_mesos_scheduler(scheduler_config.clone());
            }
        }
        simulation
    }

    pub fn cell_state(&self) -> Rc<RefCell<CellState>> {
        self.cell_state.clone()
    }

    pub fn time(&self) -> f64 {
        self.sim.time()
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    /// Performs a single event step. See [`Simulation::step`].
    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    /// Performs up to `step_count` event steps. See [`Simulation::steps`].
    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    pub fn create_context(&mut self, name: &str) -> SimulationContext {
        self.sim.create_context(name)
    }

    /// Returns the component id registered under the given name.
    pub fn lookup_id(&self, name: &str) -> Id {
        self.sim.lookup_id(name)
    }

    pub fn add_omega_scheduler(&mut self, config: SchedulerConfig) -> Rc<RefCell<OmegaScheduler>> {
        let name = config.name.clone();
        let ctx = self.sim.create_context(&name);
        let scheduler = rc!(refcell!(OmegaScheduler::new(config, self.cell_state.clone(), ctx)));
        let id = self.sim.add_handler(&name, scheduler.clone());
        self.scheduler_ids.insert(name.clone(), id);
        self.omega_schedulers.insert(name, scheduler.clone());
        scheduler
    }

    pub fn set_allocator(&mut self, config: MesosAllocatorConfig) -> Rc<RefCell<MesosAllocator>> {
        let ctx = self.sim.create_context("allocator");
        let allocator = rc!(refcell!(MesosAllocator::new(config, self.cell_state.clone(), ctx)));
        self.sim.add_handler("allocator", allocator.clone());
        self.allocator = Some(allocator.clone());
        allocator
    }

    pub fn add_mesos_scheduler(&mut self, config: SchedulerConfig) -> Rc<RefCell<MesosScheduler>> {
        let allocator = self
            .allocator
            .clone()
            .expect("the mesos allocator must be set before adding mesos schedulers");
        let allocator_id = self.sim.lookup_id("allocator");
        let name = config.name.clone();
        let ctx = self.sim.create_context(&name);
        let scheduler = rc!(refcell!(MesosScheduler::new(config, allocator_id, ctx)));
        let id = self.sim.add_handler(&name, scheduler.clone());
        allocator.borrow_mut().add_scheduler(id, scheduler.clone());
        self.scheduler_ids.insert(name.clone(), id);
        self.mesos_schedulers.insert(name, scheduler.clone());
        scheduler
    }

    pub fn omega_scheduler(&self, name: &str) -> Rc<RefCell<OmegaScheduler>> {
        self.omega_schedulers
            .get(name)
            .unwrap_or_else(|| panic!("unknown omega scheduler {}", name))
            .clone()
    }

    pub fn mesos_scheduler(&self, name: &str) -> Rc<RefCell<MesosScheduler>> {
        self.mesos_schedulers
            .get(name)
            .unwrap_or_else(|| panic!("unknown mesos scheduler {}", name))
            .clone()
    }

    pub fn allocator(&self) -> Option<Rc<RefCell<MesosAllocator>>> {
        self.allocator.clone()
    }

    /// Emits every job of the workload to the named scheduler at the job's
    /// submission time. Panics if the scheduler is not registered.
    pub fn add_workload(&mut self, workload: &Workload, scheduler_name: &str) {
        let scheduler_id = *self
            .scheduler_ids
            .get(scheduler_name)
            .unwrap_or_else(|| panic!("unknown scheduler {}", scheduler_name));
        for job in workload.jobs() {
            let delay = (job.submitted - self.sim.time()).max(0.0);
            self.ctx.emit(JobArrived { job: job.clone() }, scheduler_id, delay);
        }
    }

    /// Runs the simulation, logging a summary when it stops.
    pub fn run(&mut self, run_time: Option<f64>, wall_clock_timeout: Option<f64>) -> RunStatus {
        log_info!(self.ctx, "simulation started");
        let start = Instant::now();
        let status = self.sim.run(run_time, wall_clock_timeout);
        let elapsed = start.elapsed().as_secs_f64();
        let cell_state = self.cell_state.borrow();
        log_info!(
            self.ctx,
            "simulation finished at {:.3} ({:?}): {} events in {:.2}s, \
             cell occupancy {:.1}% cpus / {:.1}% mem",
            self.sim.time(),
            status,
            self.sim.event_count(),
            elapsed,
            cell_state.total_occupied_cpus() / cell_state.total_cpus() * 100.0,
            cell_state.total_occupied_mem() / cell_state.total_mem() * 100.0
        );
        status
    }
}
