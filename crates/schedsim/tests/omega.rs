use schedsim::config::{CellConfig, ExperimentConfig, SchedulerConfig};
use schedsim::{ClusterSimulation, ConflictMode, Job, TransactionMode, Workload};
use schedsim_core::RunStatus;

fn cell_config(conflict_mode: ConflictMode, transaction_mode: TransactionMode) -> CellConfig {
    CellConfig {
        num_machines: 1,
        cpus_per_machine: 100.0,
        mem_per_machine: 100.0,
        conflict_mode,
        transaction_mode,
    }
}

fn one_job_workload(job: Job) -> Workload {
    let mut workload = Workload::new(&job.workload_name);
    workload.add_job(job);
    workload
}

#[test]
fn single_job_commits_at_once_and_frees_at_task_end() {
    let mut simulation = ClusterSimulation::new(
        123,
        cell_config(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing),
    );
    let scheduler = simulation.add_omega_scheduler(SchedulerConfig::new("o1"));
    let workload = one_job_workload(Job::new(1, 0.0, 2, 5.0, "w", 10.0, 10.0, false));
    simulation.add_workload(&workload, "o1");

    // Arrival and the zero-think scheduling attempt both happen at t=0.
    simulation.steps(2);
    assert_eq!(simulation.time(), 0.0);
    {
        let cell_state = simulation.cell_state();
        let cell_state = cell_state.borrow();
        assert_eq!(cell_state.machine_seq_num(0), 1);
        assert_eq!(cell_state.occupied_cpus_of("o1"), 20.0);
        assert_eq!(cell_state.occupied_mem_of("o1"), 20.0);
        assert_eq!(cell_state.available_cpus(), 80.0);
    }
    {
        let scheduler = scheduler.borrow();
        assert_eq!(scheduler.core.num_successful_transactions, 1);
        assert_eq!(scheduler.core.num_successful_task_transactions, 2);
        assert_eq!(scheduler.job_queue_size(), 0);
        assert!(!scheduler.is_scheduling());
    }

    // The task-end event at t=5 frees the resources.
    assert_eq!(simulation.run(None, None), RunStatus::Completed);
    assert_eq!(simulation.time(), 5.0);
    let cell_state = simulation.cell_state();
    let cell_state = cell_state.borrow();
    assert_eq!(cell_state.available_cpus(), 100.0);
    assert_eq!(cell_state.available_mem(), 100.0);
    assert_eq!(cell_state.occupied_cpus_of("o1"), 0.0);
}

#[test]
fn losing_an_optimistic_race_fails_the_whole_transaction() {
    // Both schedulers snapshot the same cell at t=0 and think for one
    // second; the first commit bumps the machine's sequence number, so the
    // second scheduler's delta is stale.
    let config = ExperimentConfig {
        seed: 123,
        cell: cell_config(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing),
        omega_schedulers: vec![
            SchedulerConfig::new("o1").constant_think_time("w", 1.0),
            SchedulerConfig::new("o2").constant_think_time("w", 1.0),
        ],
        mesos: None,
    };
    let mut simulation = ClusterSimulation::from_config(&config);
    simulation.add_workload(&one_job_workload(Job::new(1, 0.0, 2, 100.0, "w", 10.0, 10.0, false)), "o1");
    simulation.add_workload(&one_job_workload(Job::new(2, 0.0, 2, 100.0, "w", 10.0, 10.0, false)), "o2");

    simulation.run(Some(1.0), None);
    let o1 = simulation.omega_scheduler("o1");
    let o2 = simulation.omega_scheduler("o2");
    {
        let cell_state = simulation.cell_state();
        let cell_state = cell_state.borrow();
        assert_eq!(cell_state.machine_seq_num(0), 1);
        assert_eq!(cell_state.occupied_cpus_of("o1"), 20.0);
        assert_eq!(cell_state.occupied_cpus_of("o2"), 0.0);
    }
    assert_eq!(o1.borrow().core.num_successful_transactions, 1);
    assert_eq!(o1.borrow().core.num_failed_transactions, 0);
    assert_eq!(o2.borrow().core.num_successful_transactions, 0);
    assert_eq!(o2.borrow().core.num_failed_transactions, 1);
    assert_eq!(o2.borrow().core.num_failed_task_transactions, 2);

    // The loser retries with a fresh snapshot and succeeds.
    assert_eq!(simulation.run(None, None), RunStatus::Completed);
    assert_eq!(o2.borrow().core.num_successful_transactions, 1);
    assert_eq!(o2.borrow().core.num_retried_transactions, 1);
    let cell_state = simulation.cell_state();
    assert_eq!(cell_state.borrow().available_cpus(), 100.0);
}

#[test]
fn any_conflict_makes_the_whole_attempt_count_as_wasted() {
    // Incremental mode with tasks spread over two machines: one delta
    // commits, one conflicts. The partial success still records the whole
    // think time as wasted.
    let config = ExperimentConfig {
        seed: 123,
        cell: CellConfig {
            num_machines: 2,
            cpus_per_machine: 100.0,
            mem_per_machine: 100.0,
            conflict_mode: ConflictMode::SequenceNumbers,
            transaction_mode: TransactionMode::Incremental,
        },
        omega_schedulers: vec![
            SchedulerConfig::new("o1").constant_think_time("w", 1.0),
            SchedulerConfig::new("o2").constant_think_time("w", 1.0),
        ],
        mesos: None,
    };
    let mut simulation = ClusterSimulation::from_config(&config);
    // o2 wins the race for machine 0; o1's two 60-cpu tasks need one
    // machine each, so its machine-0 delta goes stale while its machine-1
    // delta still commits.
    simulation.add_workload(&one_job_workload(Job::new(2, 0.0, 1, 100.0, "w", 60.0, 10.0, false)), "o2");
    simulation.add_workload(&one_job_workload(Job::new(1, 0.0, 2, 100.0, "w", 60.0, 10.0, false)), "o1");

    simulation.run(Some(1.5), None);
    let o1 = simulation.omega_scheduler("o1");
    let o1 = o1.borrow();
    assert_eq!(o1.core.num_failed_transactions, 1);
    assert_eq!(o1.core.num_successful_transactions, 0);
    assert_eq!(o1.core.num_successful_task_transactions, 1);
    assert_eq!(o1.core.num_failed_task_transactions, 1);
    assert_eq!(o1.core.total_wasted_time_scheduling, 1.0);
    assert_eq!(o1.core.total_useful_time_scheduling, 0.0);
}

#[test]
fn impossible_jobs_are_abandoned_after_repeated_fruitless_attempts() {
    let mut simulation = ClusterSimulation::new(
        123,
        cell_config(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing),
    );
    let scheduler = simulation.add_omega_scheduler(SchedulerConfig::new("o1"));
    // A single task that can never fit on any machine.
    let workload = one_job_workload(Job::new(1, 0.0, 1, 5.0, "w", 200.0, 10.0, false));
    simulation.add_workload(&workload, "o1");

    assert_eq!(simulation.run(None, None), RunStatus::Completed);
    let scheduler = scheduler.borrow();
    assert_eq!(scheduler.core.num_jobs_timed_out_scheduling, 1);
    assert_eq!(scheduler.core.num_no_resources_found_scheduling_attempts, 101);
    assert_eq!(scheduler.core.num_successful_transactions, 0);
    assert_eq!(scheduler.job_queue_size(), 0);
    let cell_state = simulation.cell_state();
    assert_eq!(cell_state.borrow().available_cpus(), 100.0);
}

#[test]
fn queued_jobs_are_scheduled_back_to_back() {
    let mut simulation = ClusterSimulation::new(
        123,
        cell_config(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing),
    );
    let scheduler = simulation.add_omega_scheduler(SchedulerConfig::new("o1").constant_think_time("w", 1.0));
    let mut workload = Workload::new("w");
    for id in 0..3 {
        workload.add_job(Job::new(id, 0.0, 1, 4.0, "w", 10.0, 10.0, false));
    }
    simulation.add_workload(&workload, "o1");

    assert_eq!(simulation.run(None, None), RunStatus::Completed);
    let scheduler = scheduler.borrow();
    // One cycle at a time: commits land at t=1, 2 and 3.
    assert_eq!(scheduler.core.num_successful_transactions, 3);
    assert_eq!(scheduler.core.num_failed_transactions, 0);
    assert_eq!(scheduler.core.total_useful_time_scheduling, 3.0);
    let cell_state = simulation.cell_state();
    assert_eq!(cell_state.borrow().available_cpus(), 100.0);
}
