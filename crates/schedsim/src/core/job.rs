use serde::Serialize;

/// A job submitted to a scheduler: a set of identical tasks with the same
/// per-task resource requirements and duration.
///
/// The identity fields are fixed at creation; the remaining fields are
/// scheduling state mutated as the job moves through queues and attempts.
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    pub id: u64,
    /// Virtual time at which the job enters the system.
    pub submitted: f64,
    pub num_tasks: u32,
    pub task_duration: f64,
    pub workload_name: String,
    pub cpus_per_task: f64,
    pub mem_per_task: f64,
    /// Rigid jobs require gang placement. Carried for workload fidelity;
    /// the placement algorithm treats all jobs as elastic.
    pub is_rigid: bool,

    /// Invariant: `0 <= unscheduled_tasks <= num_tasks`.
    pub unscheduled_tasks: u32,
    pub time_in_queue_till_first_scheduled: f64,
    pub time_in_queue_till_fully_scheduled: f64,
    pub last_enqueued: f64,
    pub last_scheduling_start_time: f64,
    pub num_scheduling_attempts: u64,
    pub num_task_scheduling_attempts: u64,
    pub useful_time_scheduling: f64,
    pub wasted_time_scheduling: f64,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        submitted: f64,
        num_tasks: u32,
        task_duration: f64,
        workload_name: &str,
        cpus_per_task: f64,
        mem_per_task: f64,
        is_rigid: bool,
    ) -> Self {
        Self {
            id,
            submitted,
            num_tasks,
            task_duration,
            workload_name: workload_name.to_owned(),
            cpus_per_task,
            mem_per_task,
            is_rigid,
            unscheduled_tasks: num_tasks,
            time_in_queue_till_first_scheduled: 0.0,
            time_in_queue_till_fully_scheduled: 0.0,
            last_enqueued: 0.0,
            last_scheduling_start_time: 0.0,
            num_scheduling_attempts: 0,
            num_task_scheduling_attempts: 0,
            useful_time_scheduling: 0.0,
            wasted_time_scheduling: 0.0,
        }
    }

    pub fn cpus_still_needed(&self) -> f64 {
        self.cpus_per_task * self.unscheduled_tasks as f64
    }

    pub fn mem_still_needed(&self) -> f64 {
        self.mem_per_task * self.unscheduled_tasks as f64
    }

    /// The maximum number of this job's tasks that fit into the specified
    /// resources. Each availability is first chopped down to a multiple of
    /// the task size. Returns 0 when either availability is exactly zero.
    pub fn num_tasks_to_schedule(&self, cpus_avail: f64, mem_avail: f64) -> u32 {
        if cpus_avail == 0.0 || mem_avail == 0.0 {
            return 0;
        }
        let cpus_chopped_to_task_size = cpus_avail - (cpus_avail % self.cpus_per_task);
        let mem_chopped_to_task_size = mem_avail - (mem_avail % self.mem_per_task);
        let max_tasks_by_cpus = (cpus_chopped_to_task_size / self.cpus_per_task).round() as u64;
        let max_tasks_by_mem = (mem_chopped_to_task_size / self.mem_per_task).round() as u64;
        (self.unscheduled_tasks as u64).min(max_tasks_by_cpus).min(max_tasks_by_mem) as u32
    }

    /// Accumulates queue-time statistics at the start of a scheduling cycle.
    ///
    /// Time since the last enqueue always counts towards the
    /// fully-scheduled bucket; it counts towards the first-scheduled bucket
    /// only while no scheduling attempt has been made yet.
    pub fn update_time_in_queue_stats(&mut self, current_time: f64) {
        self.time_in_queue_till_fully_scheduled += current_time - self.last_enqueued;
        if self.num_scheduling_attempts == 0 {
            self.time_in_queue_till_first_scheduled += current_time - self.last_enqueued;
        }
    }
}
