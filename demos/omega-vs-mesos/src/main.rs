use std::io::Write;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use env_logger::Builder;

use schedsim::config::{
    CellConfig, ExperimentConfig, MesosAllocatorConfig, MesosConfig, SchedulerConfig,
};
use schedsim::workload_gen::RandomWorkloadGenerator;
use schedsim::{ClusterSimulation, ConflictMode, TransactionMode, Workload};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Style {
    Omega,
    Mesos,
}

/// Runs a synthetic workload through a cell managed either by optimistic
/// (omega) or offer-based (mesos) schedulers and reports the per-scheduler
/// transaction counters.
#[derive(Parser)]
#[command(about)]
struct Args {
    /// Concurrency-control style to simulate
    #[arg(long, value_enum, default_value = "omega")]
    style: Style,
    /// Number of machines in the cell
    #[arg(long, default_value_t = 100)]
    machines: u32,
    /// Cpus per machine
    #[arg(long, default_value_t = 32.0)]
    cpus: f64,
    /// Memory per machine
    #[arg(long, default_value_t = 64.0)]
    mem: f64,
    /// Number of schedulers competing for the cell
    #[arg(long, default_value_t = 2)]
    schedulers: u32,
    /// Number of jobs in the generated workload
    #[arg(long, default_value_t = 1000)]
    jobs: u32,
    /// Random seed
    #[arg(long, default_value_t = 123)]
    seed: u64,
    /// Wall-clock timeout in seconds
    #[arg(long, default_value_t = 60.0)]
    timeout: f64,
}

fn main() {
    let args = Args::parse();
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let scheduler_names: Vec<String> = (1..=args.schedulers)
        .map(|i| match args.style {
            Style::Omega => format!("omega-{}", i),
            Style::Mesos => format!("mesos-{}", i),
        })
        .collect();
    let scheduler_configs: Vec<SchedulerConfig> = scheduler_names
        .iter()
        .map(|name| {
            SchedulerConfig::new(name)
                .constant_think_time("synthetic", 0.1)
                .per_task_think_time("synthetic", 0.005)
        })
        .collect();

    let config = ExperimentConfig {
        seed: args.seed,
        cell: CellConfig {
            num_machines: args.machines,
            cpus_per_machine: args.cpus,
            mem_per_machine: args.mem,
            conflict_mode: match args.style {
                Style::Omega => ConflictMode::SequenceNumbers,
                Style::Mesos => ConflictMode::ResourceFit,
            },
            transaction_mode: match args.style {
                Style::Omega => TransactionMode::AllOrNothing,
                Style::Mesos => TransactionMode::Incremental,
            },
        },
        omega_schedulers: match args.style {
            Style::Omega => scheduler_configs.clone(),
            Style::Mesos => vec![],
        },
        mesos: match args.style {
            Style::Omega => None,
            Style::Mesos => Some(MesosConfig {
                allocator: MesosAllocatorConfig {
                    constant_think_time: 0.1,
                    min_cpu_offer: args.cpus,
                    min_mem_offer: args.mem,
                    offer_batch_interval: 1.0,
                },
                schedulers: scheduler_configs,
            }),
        },
    };
    let mut simulation = ClusterSimulation::from_config(&config);

    let generator = RandomWorkloadGenerator {
        workload_name: "synthetic".to_string(),
        job_count: args.jobs,
        tasks_min: 1,
        tasks_max: 10,
        cpus_per_task_min: 0.5,
        cpus_per_task_max: 4.0,
        mem_per_task_min: 1.0,
        mem_per_task_max: 8.0,
        interarrival_min: 0.1,
        interarrival_max: 2.0,
        duration_mean: 120.0,
        duration_dev: 40.0,
    };
    let generator_ctx = simulation.create_context("generator");
    let workload = generator.generate(&generator_ctx);

    // Round-robin the jobs across the schedulers.
    let mut split: Vec<Workload> = scheduler_names.iter().map(|_| Workload::new("synthetic")).collect();
    for (i, job) in workload.jobs().iter().enumerate() {
        split[i % scheduler_names.len()].add_job(job.clone());
    }
    for (name, shard) in scheduler_names.iter().zip(&split) {
        simulation.add_workload(shard, name);
    }

    let start = Instant::now();
    let status = simulation.run(None, Some(args.timeout));
    let elapsed = start.elapsed().as_secs_f64();

    println!(
        "{:?}: simulated {:.1}s of virtual time in {:.2}s ({} events, {:.0} events/s)",
        status,
        simulation.time(),
        elapsed,
        simulation.event_count(),
        simulation.event_count() as f64 / elapsed
    );
    for name in &scheduler_names {
        match args.style {
            Style::Omega => {
                let scheduler = simulation.omega_scheduler(name);
                let scheduler = scheduler.borrow();
                print_scheduler_report(name, &scheduler.core);
            }
            Style::Mesos => {
                let scheduler = simulation.mesos_scheduler(name);
                let scheduler = scheduler.borrow();
                print_scheduler_report(name, &scheduler.core);
            }
        }
    }
    if let Some(allocator) = simulation.allocator() {
        println!(
            "allocator: {:.1}s spent building offers",
            allocator.borrow().time_spent_allocating
        );
    }
}

fn print_scheduler_report(name: &str, core: &schedsim::scheduler::base::SchedulerCore) {
    println!(
        "{}: {} committed / {} failed transactions, {} tasks placed, {} retried, \
         {} jobs abandoned, think time {:.1}s useful / {:.1}s wasted",
        name,
        core.num_successful_transactions,
        core.num_failed_transactions,
        core.num_successful_task_transactions,
        core.num_retried_transactions,
        core.num_jobs_timed_out_scheduling,
        core.total_useful_time_scheduling,
        core.total_wasted_time_scheduling
    );
}
