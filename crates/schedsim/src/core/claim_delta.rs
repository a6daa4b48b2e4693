use serde::Serialize;

use crate::core::cell_state::CellState;

/// One proposed reservation: a slice of one machine's resources claimed by
/// one scheduler for `duration` seconds.
///
/// `machine_seq_num` records the scheduler's belief about the machine's
/// version at the time the delta was built; commit compares it against the
/// live ledger to detect staleness in sequence-number mode.
#[derive(Clone, Debug, Serialize)]
pub struct ClaimDelta {
    pub scheduler: String,
    pub machine_id: u32,
    pub machine_seq_num: u32,
    pub duration: f64,
    pub cpus: f64,
    pub mem: f64,
}

impl ClaimDelta {
    pub fn new(
        scheduler: &str,
        machine_id: u32,
        machine_seq_num: u32,
        duration: f64,
        cpus: f64,
        mem: f64,
    ) -> Self {
        Self {
            scheduler: scheduler.to_owned(),
            machine_id,
            machine_seq_num,
            duration,
            cpus,
            mem,
        }
    }

    /// Assigns this delta's resources in the given cell state.
    ///
    /// Non-locked applies bump the machine's sequence number, marking the
    /// machine as changed for optimistic conflict detection. Locked applies
    /// (resources held by an in-flight offer) leave it untouched.
    pub fn apply(&self, cell_state: &mut CellState, locked: bool) {
        cell_state.assign_resources(&self.scheduler, self.machine_id, self.cpus, self.mem, locked);
        if !locked {
            cell_state.increment_machine_seq_num(self.machine_id);
        }
    }

    /// Frees this delta's resources. Never touches sequence numbers.
    pub fn un_apply(&self, cell_state: &mut CellState, locked: bool) {
        cell_state.free_resources(&self.scheduler, self.machine_id, self.cpus, self.mem, locked);
    }
}
