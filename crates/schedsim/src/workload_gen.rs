//! Synthetic workload generation.

use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use schedsim_core::SimulationContext;

use crate::core::job::Job;
use crate::core::workload::Workload;

/// Generates a workload of jobs with uniformly distributed task shapes and
/// inter-arrival gaps, and normally distributed task durations (clamped to
/// at least one second).
///
/// Draws through the simulation-wide PRNG, so a given seed always yields
/// the same workload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomWorkloadGenerator {
    pub workload_name: String,
    pub job_count: u32,
    pub tasks_min: u32,
    pub tasks_max: u32,
    pub cpus_per_task_min: f64,
    pub cpus_per_task_max: f64,
    pub mem_per_task_min: f64,
    pub mem_per_task_max: f64,
    pub interarrival_min: f64,
    pub interarrival_max: f64,
    pub duration_mean: f64,
    pub duration_dev: f64,
}

impl RandomWorkloadGenerator {
    pub fn generate(&self, ctx: &SimulationContext) -> Workload {
        let mut workload = Workload::new(&self.workload_name);
        let duration_distribution = Normal::new(self.duration_mean, self.duration_dev).unwrap();

        let mut time = 0.0;
        for id in 0..self.job_count as u64 {
            let duration = ctx.sample_from_distribution(&duration_distribution);
            let job = Job::new(
                id,
                time,
                ctx.gen_range(self.tasks_min..=self.tasks_max),
                if duration > 1.0 { duration } else { 1.0 },
                &self.workload_name,
                ctx.gen_range(self.cpus_per_task_min..=self.cpus_per_task_max),
                ctx.gen_range(self.mem_per_task_min..=self.mem_per_task_max),
                false,
            );
            workload.add_job(job);
            time += ctx.gen_range(self.interarrival_min..=self.interarrival_max);
        }
        workload
    }
}
