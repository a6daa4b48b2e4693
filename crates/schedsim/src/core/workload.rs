use serde::Serialize;

use crate::core::job::Job;

/// A named, insertion-ordered collection of jobs.
///
/// Every contained job belongs to the workload by name. Cloning a
/// workload deep-copies every job, including its scheduling state.
#[derive(Clone, Debug, Serialize)]
pub struct Workload {
    name: String,
    jobs: Vec<Job>,
}

impl Workload {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            jobs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn num_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Panics if the job's workload name does not match this workload.
    pub fn add_job(&mut self, job: Job) {
        if job.workload_name != self.name {
            panic!(
                "job workload name {} does not match workload name {}",
                job.workload_name, self.name
            );
        }
        self.jobs.push(job);
    }

    pub fn add_jobs(&mut self, jobs: Vec<Job>) {
        for job in jobs {
            self.add_job(job);
        }
    }

    /// Total cpus requested across all tasks of all jobs.
    pub fn total_task_cpus(&self) -> f64 {
        self.jobs.iter().map(|j| j.num_tasks as f64 * j.cpus_per_task).sum()
    }

    /// Total memory requested across all tasks of all jobs.
    pub fn total_task_mem(&self) -> f64 {
        self.jobs.iter().map(|j| j.num_tasks as f64 * j.mem_per_task).sum()
    }

    pub fn total_useful_time_scheduling(&self) -> f64 {
        self.jobs.iter().map(|j| j.useful_time_scheduling).sum()
    }

    pub fn total_wasted_time_scheduling(&self) -> f64 {
        self.jobs.iter().map(|j| j.wasted_time_scheduling).sum()
    }
}
