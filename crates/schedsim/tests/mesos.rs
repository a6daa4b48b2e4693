use schedsim::config::{CellConfig, MesosAllocatorConfig, SchedulerConfig};
use schedsim::core::events::OfferResponded;
use schedsim::{ClaimDelta, ClusterSimulation, ConflictMode, Job, TransactionMode, Workload};
use schedsim_core::RunStatus;

fn mesos_cell(num_machines: u32) -> CellConfig {
    CellConfig {
        num_machines,
        cpus_per_machine: 100.0,
        mem_per_machine: 100.0,
        conflict_mode: ConflictMode::ResourceFit,
        transaction_mode: TransactionMode::Incremental,
    }
}

fn small_offer_allocator() -> MesosAllocatorConfig {
    MesosAllocatorConfig {
        constant_think_time: 0.0,
        min_cpu_offer: 1.0,
        min_mem_offer: 1.0,
        offer_batch_interval: 1.0,
    }
}

fn one_job_workload(job: Job) -> Workload {
    let mut workload = Workload::new(&job.workload_name);
    workload.add_job(job);
    workload
}

#[test]
fn offers_go_to_the_scheduler_with_the_lowest_dominant_share() {
    let mut simulation = ClusterSimulation::new(123, mesos_cell(1));
    simulation.set_allocator(small_offer_allocator());
    let m1 = simulation.add_mesos_scheduler(SchedulerConfig::new("m1"));
    let m2 = simulation.add_mesos_scheduler(SchedulerConfig::new("m2"));

    // Existing occupancy: m1 holds 40 cpus, m2 holds 10 in a 100-cpu cell,
    // so m2's dominant share (0.1) beats m1's (0.4).
    {
        let cell_state = simulation.cell_state();
        let mut cell_state = cell_state.borrow_mut();
        cell_state.assign_resources("m1", 0, 40.0, 40.0, false);
        cell_state.assign_resources("m2", 0, 10.0, 10.0, false);
    }

    simulation.add_workload(&one_job_workload(Job::new(1, 0.0, 1, 1000.0, "w", 10.0, 10.0, false)), "m1");
    simulation.add_workload(&one_job_workload(Job::new(2, 0.0, 1, 1000.0, "w", 10.0, 10.0, false)), "m2");

    // Both requests coalesce into one batched round at t=1.0, which serves
    // only the low-share scheduler.
    simulation.run(Some(1.0), None);
    {
        let cell_state = simulation.cell_state();
        let cell_state = cell_state.borrow();
        assert_eq!(cell_state.occupied_cpus_of("m2"), 20.0);
        assert_eq!(cell_state.occupied_cpus_of("m1"), 40.0);
    }
    assert_eq!(m2.borrow().core.num_successful_task_transactions, 1);
    assert_eq!(m1.borrow().core.num_successful_task_transactions, 0);

    // The next batched round picks the remaining requester.
    assert_eq!(simulation.run(None, None), RunStatus::Completed);
    assert_eq!(m1.borrow().core.num_successful_task_transactions, 1);
    let cell_state = simulation.cell_state();
    let cell_state = cell_state.borrow();
    // Pre-seeded occupancy stays, the scheduled tasks came and went.
    assert_eq!(cell_state.occupied_cpus_of("m1"), 40.0);
    assert_eq!(cell_state.occupied_cpus_of("m2"), 10.0);
    assert_eq!(cell_state.total_locked_cpus(), 0.0);
}

#[test]
fn drf_ties_break_by_request_arrival_order() {
    let mut simulation = ClusterSimulation::new(123, mesos_cell(1));
    simulation.set_allocator(small_offer_allocator());
    let m1 = simulation.add_mesos_scheduler(SchedulerConfig::new("m1"));
    let m2 = simulation.add_mesos_scheduler(SchedulerConfig::new("m2"));

    simulation.add_workload(&one_job_workload(Job::new(1, 0.0, 1, 1000.0, "w", 10.0, 10.0, false)), "m1");
    simulation.add_workload(&one_job_workload(Job::new(2, 0.0, 1, 1000.0, "w", 10.0, 10.0, false)), "m2");

    simulation.run(Some(1.0), None);
    // Equal (zero) shares: the first requester wins the first round.
    assert_eq!(m1.borrow().core.num_successful_task_transactions, 1);
    assert_eq!(m2.borrow().core.num_successful_task_transactions, 0);
}

#[test]
fn offers_lock_everything_and_release_the_unclaimed_complement() {
    let mut simulation = ClusterSimulation::new(123, mesos_cell(1));
    simulation.set_allocator(small_offer_allocator());
    simulation.add_mesos_scheduler(SchedulerConfig::new("m1"));
    simulation.add_workload(&one_job_workload(Job::new(1, 0.0, 1, 50.0, "w", 20.0, 20.0, false)), "m1");

    // Arrival, offer request, then the batched build at t=1 locks the
    // whole machine for the in-flight offer.
    simulation.steps(3);
    {
        let cell_state = simulation.cell_state();
        let cell_state = cell_state.borrow();
        assert_eq!(cell_state.locked_cpus_of("m1"), 100.0);
        assert_eq!(cell_state.total_locked_cpus(), 100.0);
        assert_eq!(cell_state.available_cpus(), 0.0);
        assert_eq!(cell_state.occupied_cpus_of("m1"), 0.0);
    }

    // The scheduler claims a 20-cpu subset; the response releases the
    // complement back to availability.
    simulation.steps(2);
    {
        let cell_state = simulation.cell_state();
        let cell_state = cell_state.borrow();
        assert_eq!(cell_state.locked_cpus_of("m1"), 0.0);
        assert_eq!(cell_state.total_locked_cpus(), 0.0);
        assert_eq!(cell_state.occupied_cpus_of("m1"), 20.0);
        assert_eq!(cell_state.available_cpus(), 80.0);
    }

    assert_eq!(simulation.run(None, None), RunStatus::Completed);
    let cell_state = simulation.cell_state();
    let cell_state = cell_state.borrow();
    assert_eq!(cell_state.available_cpus(), 100.0);
    assert_eq!(cell_state.total_locked_cpus(), 0.0);
    assert_eq!(cell_state.occupied_cpus_of("m1"), 0.0);
}

#[test]
fn no_offer_is_built_below_the_minimum_offer_size() {
    let mut simulation = ClusterSimulation::new(123, mesos_cell(1));
    // Default minimum offer is 100 cpus / 100 mem.
    simulation.set_allocator(MesosAllocatorConfig::default());
    let m1 = simulation.add_mesos_scheduler(SchedulerConfig::new("m1"));

    {
        let cell_state = simulation.cell_state();
        cell_state.borrow_mut().assign_resources("other", 0, 50.0, 50.0, false);
    }
    simulation.add_workload(&one_job_workload(Job::new(1, 0.0, 1, 5.0, "w", 10.0, 10.0, false)), "m1");

    assert_eq!(simulation.run(None, None), RunStatus::Completed);
    // Only 50 cpus were available, so the round at t=1 sent nothing.
    assert_eq!(m1.borrow().core.num_successful_task_transactions, 0);
    let cell_state = simulation.cell_state();
    assert_eq!(cell_state.borrow().occupied_cpus_of("m1"), 0.0);
}

#[test]
#[should_panic(expected = "resource-fit")]
fn the_allocator_rejects_sequence_number_cells() {
    let mut simulation = ClusterSimulation::new(
        123,
        CellConfig {
            num_machines: 1,
            cpus_per_machine: 100.0,
            mem_per_machine: 100.0,
            conflict_mode: ConflictMode::SequenceNumbers,
            transaction_mode: TransactionMode::Incremental,
        },
    );
    simulation.set_allocator(MesosAllocatorConfig::default());
}

#[test]
#[should_panic(expected = "protocol violation")]
fn conflicting_offer_responses_are_a_protocol_violation() {
    let mut simulation = ClusterSimulation::new(123, mesos_cell(1));
    simulation.set_allocator(small_offer_allocator());
    simulation.add_mesos_scheduler(SchedulerConfig::new("m1"));

    // An offer response claiming more than the whole cell cannot have come
    // out of a locked snapshot.
    let allocator_id = simulation.lookup_id("allocator");
    let injector = simulation.create_context("injector");
    injector.emit_now(
        OfferResponded {
            offer_id: 42,
            scheduler: "m1".to_string(),
            claim_deltas: vec![ClaimDelta::new("m1", 0, 0, 1.0, 1000.0, 1000.0)],
        },
        allocator_id,
    );
    simulation.run(None, None);
}
