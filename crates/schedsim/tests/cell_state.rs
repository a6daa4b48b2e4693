use std::panic::{catch_unwind, AssertUnwindSafe};

use schedsim::{CellState, ClaimDelta, ConflictMode, TransactionMode};
use schedsim_core::{Simulation, SimulationContext};

fn cell(conflict_mode: ConflictMode, transaction_mode: TransactionMode) -> CellState {
    CellState::new(4, 100.0, 100.0, conflict_mode, transaction_mode)
}

fn commit_ctx() -> (Simulation, SimulationContext) {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("committer");
    (sim, ctx)
}

// The ledger invariants that must hold after every operation: machine
// allocations within capacity, per-machine sums matching the cached
// totals, and non-negative availability.
fn check_invariants(cell_state: &CellState, schedulers: &[&str]) {
    let mut sum_allocated_cpus = 0.0;
    let mut sum_allocated_mem = 0.0;
    for machine_id in 0..cell_state.num_machines() {
        let allocated_cpus = cell_state.allocated_cpus_on(machine_id);
        let allocated_mem = cell_state.allocated_mem_on(machine_id);
        assert!(allocated_cpus >= -1e-6 && allocated_cpus <= cell_state.cpus_per_machine() + 1e-6);
        assert!(allocated_mem >= -1e-6 && allocated_mem <= cell_state.mem_per_machine() + 1e-6);
        sum_allocated_cpus += allocated_cpus;
        sum_allocated_mem += allocated_mem;
    }
    let tracked_cpus = cell_state.total_occupied_cpus() + cell_state.total_locked_cpus();
    let tracked_mem = cell_state.total_occupied_mem() + cell_state.total_locked_mem();
    assert!((sum_allocated_cpus - tracked_cpus).abs() < 1e-6);
    assert!((sum_allocated_mem - tracked_mem).abs() < 1e-6);

    let occupied_cpus_by_scheduler: f64 = schedulers.iter().map(|s| cell_state.occupied_cpus_of(s)).sum();
    let occupied_mem_by_scheduler: f64 = schedulers.iter().map(|s| cell_state.occupied_mem_of(s)).sum();
    let locked_cpus_by_scheduler: f64 = schedulers.iter().map(|s| cell_state.locked_cpus_of(s)).sum();
    assert!((occupied_cpus_by_scheduler - cell_state.total_occupied_cpus()).abs() < 1e-6);
    assert!((occupied_mem_by_scheduler - cell_state.total_occupied_mem()).abs() < 1e-6);
    assert!((locked_cpus_by_scheduler - cell_state.total_locked_cpus()).abs() < 1e-6);

    assert!(cell_state.available_cpus() >= -1e-6);
    assert!(cell_state.available_mem() >= -1e-6);
}

#[test]
fn assign_and_free_keep_the_ledger_consistent() {
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    cell_state.assign_resources("s1", 0, 10.0, 20.0, false);
    cell_state.assign_resources("s2", 0, 30.0, 10.0, false);
    cell_state.assign_resources("s1", 1, 5.0, 5.0, true);
    check_invariants(&cell_state, &["s1", "s2"]);

    assert_eq!(cell_state.allocated_cpus_on(0), 40.0);
    assert_eq!(cell_state.available_cpus_on(0), 60.0);
    assert_eq!(cell_state.occupied_cpus_of("s1"), 10.0);
    assert_eq!(cell_state.occupied_mem_of("s2"), 10.0);
    assert_eq!(cell_state.locked_cpus_of("s1"), 5.0);
    assert_eq!(cell_state.total_occupied_cpus(), 40.0);
    assert_eq!(cell_state.total_locked_cpus(), 5.0);
    assert_eq!(cell_state.available_cpus(), 400.0 - 45.0);

    cell_state.free_resources("s2", 0, 30.0, 10.0, false);
    cell_state.free_resources("s1", 1, 5.0, 5.0, true);
    check_invariants(&cell_state, &["s1", "s2"]);
    assert_eq!(cell_state.allocated_cpus_on(0), 10.0);
    assert_eq!(cell_state.total_locked_cpus(), 0.0);
}

#[test]
#[should_panic(expected = "no machine with id")]
fn assign_rejects_unknown_machines() {
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    cell_state.assign_resources("s1", 4, 1.0, 1.0, false);
}

#[test]
#[should_panic(expected = "unallocated cpus")]
fn assign_rejects_cpu_overcommit() {
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    cell_state.assign_resources("s1", 0, 90.0, 10.0, false);
    cell_state.assign_resources("s1", 0, 20.0, 10.0, false);
}

#[test]
fn failed_assign_leaves_the_ledger_untouched() {
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    cell_state.assign_resources("s1", 0, 90.0, 10.0, false);
    let result = catch_unwind(AssertUnwindSafe(|| {
        cell_state.assign_resources("s2", 0, 20.0, 10.0, false);
    }));
    assert!(result.is_err());
    assert_eq!(cell_state.allocated_cpus_on(0), 90.0);
    assert_eq!(cell_state.occupied_cpus_of("s2"), 0.0);
    assert_eq!(cell_state.total_occupied_cpus(), 90.0);
    check_invariants(&cell_state, &["s1", "s2"]);
}

#[test]
#[should_panic(expected = "holds none")]
fn free_without_holding_panics() {
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    cell_state.free_resources("s1", 0, 1.0, 1.0, false);
}

#[test]
#[should_panic(expected = "was only occupying")]
fn freeing_more_than_held_panics() {
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    cell_state.assign_resources("s1", 0, 10.0, 10.0, false);
    cell_state.free_resources("s1", 0, 10.5, 10.0, false);
}

#[test]
fn freeing_within_tolerance_is_allowed() {
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    cell_state.assign_resources("s1", 0, 10.0, 10.0, false);
    // Slack of 1e-3 absorbs floating accumulation.
    cell_state.free_resources("s1", 0, 10.0005, 10.0, false);
}

#[test]
#[should_panic(expected = "invalid config")]
fn cells_need_at_least_one_machine() {
    CellState::new(0, 100.0, 100.0, ConflictMode::ResourceFit, TransactionMode::Incremental);
}

#[test]
fn apply_then_unapply_restores_allocations_but_not_seq_nums() {
    let mut cell_state = cell(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing);
    let delta = ClaimDelta::new("s1", 2, 0, 5.0, 30.0, 40.0);

    delta.apply(&mut cell_state, false);
    assert_eq!(cell_state.allocated_cpus_on(2), 30.0);
    assert_eq!(cell_state.machine_seq_num(2), 1);

    delta.un_apply(&mut cell_state, false);
    assert_eq!(cell_state.allocated_cpus_on(2), 0.0);
    assert_eq!(cell_state.allocated_mem_on(2), 0.0);
    assert_eq!(cell_state.occupied_cpus_of("s1"), 0.0);
    // Sequence numbers only ever move forward.
    assert_eq!(cell_state.machine_seq_num(2), 1);
}

#[test]
fn locked_applies_do_not_bump_seq_nums() {
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    let delta = ClaimDelta::new("s1", 0, 0, 0.0, 30.0, 40.0);
    delta.apply(&mut cell_state, true);
    assert_eq!(cell_state.machine_seq_num(0), 0);
    assert_eq!(cell_state.locked_cpus_of("s1"), 30.0);
}

#[test]
fn deep_copies_are_independent() {
    let mut cell_state = cell(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing);
    cell_state.assign_resources("s1", 0, 10.0, 10.0, false);

    let mut snapshot = cell_state.clone();
    snapshot.assign_resources("s2", 1, 50.0, 50.0, false);
    snapshot.increment_machine_seq_num(0);

    assert_eq!(cell_state.allocated_cpus_on(1), 0.0);
    assert_eq!(cell_state.occupied_cpus_of("s2"), 0.0);
    assert_eq!(cell_state.machine_seq_num(0), 0);
    assert_eq!(snapshot.allocated_cpus_on(1), 50.0);
}

#[test]
fn all_or_nothing_commit_rolls_back_everything_on_conflict() {
    let (_sim, ctx) = commit_ctx();
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::AllOrNothing);
    // Machine 1 is short on memory, so the middle delta conflicts.
    cell_state.assign_resources("other", 1, 0.0, 95.0, false);

    let deltas = vec![
        ClaimDelta::new("s1", 0, 0, 5.0, 50.0, 50.0),
        ClaimDelta::new("s1", 1, 0, 5.0, 10.0, 10.0),
        ClaimDelta::new("s1", 0, 0, 5.0, 10.0, 10.0),
    ];
    let result = cell_state.commit(deltas, false, &ctx);

    assert!(result.committed.is_empty());
    assert_eq!(result.conflicted.len(), 3);
    // The first delta was applied and rolled back, leaving allocations as
    // they were before the call.
    assert_eq!(cell_state.allocated_cpus_on(0), 0.0);
    assert_eq!(cell_state.occupied_cpus_of("s1"), 0.0);
    assert_eq!(cell_state.total_occupied_cpus(), 0.0);
    // The rolled-back apply still bumped the sequence number.
    assert_eq!(cell_state.machine_seq_num(0), 1);
    check_invariants(&cell_state, &["s1", "other"]);
}

#[test]
fn incremental_commit_skips_only_conflicting_deltas() {
    let (_sim, ctx) = commit_ctx();
    let mut cell_state = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
    cell_state.assign_resources("other", 1, 0.0, 95.0, false);

    let deltas = vec![
        ClaimDelta::new("s1", 0, 0, 5.0, 50.0, 50.0),
        ClaimDelta::new("s1", 1, 0, 5.0, 10.0, 10.0),
        ClaimDelta::new("s1", 0, 0, 5.0, 10.0, 10.0),
    ];
    let result = cell_state.commit(deltas, false, &ctx);

    assert_eq!(result.committed.len(), 2);
    assert_eq!(result.conflicted.len(), 1);
    assert_eq!(result.conflicted[0].machine_id, 1);
    assert_eq!(cell_state.allocated_cpus_on(0), 60.0);
    assert_eq!(cell_state.occupied_cpus_of("s1"), 60.0);
    check_invariants(&cell_state, &["s1", "other"]);
}

#[test]
fn stale_seq_nums_conflict_and_fresh_ones_commit() {
    let (_sim, ctx) = commit_ctx();
    let mut cell_state = cell(ConflictMode::SequenceNumbers, TransactionMode::Incremental);

    let fresh = ClaimDelta::new("s1", 0, 0, 5.0, 10.0, 10.0);
    let result = cell_state.commit(vec![fresh], false, &ctx);
    assert_eq!(result.committed.len(), 1);
    assert_eq!(cell_state.machine_seq_num(0), 1);

    // Another delta built from the old snapshot of machine 0 is stale now,
    // even though the machine could still fit it.
    let stale = ClaimDelta::new("s2", 0, 0, 5.0, 10.0, 10.0);
    let result = cell_state.commit(vec![stale], false, &ctx);
    assert!(result.committed.is_empty());
    assert_eq!(result.conflicted.len(), 1);

    let current = ClaimDelta::new("s2", 0, 1, 5.0, 10.0, 10.0);
    let result = cell_state.commit(vec![current], false, &ctx);
    assert_eq!(result.committed.len(), 1);
    assert_eq!(cell_state.machine_seq_num(0), 2);
}

#[test]
fn commit_schedules_one_end_event_per_committed_delta() {
    let (sim, ctx) = commit_ctx();
    let mut cell_state = cell(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing);

    let deltas = vec![
        ClaimDelta::new("s1", 0, 0, 5.0, 10.0, 10.0),
        ClaimDelta::new("s1", 1, 0, 7.0, 10.0, 10.0),
    ];
    let result = cell_state.commit(deltas, true, &ctx);
    assert_eq!(result.committed.len(), 2);
    assert_eq!(sim.event_count(), 2);
}
