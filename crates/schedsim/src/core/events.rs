//! Event payloads exchanged between schedulers, the allocator and the cell.

use serde::Serialize;

use crate::core::claim_delta::ClaimDelta;
use crate::core::job::Job;
use crate::scheduler::allocator::Offer;

// JOB LIFECYCLE ///////////////////////////////////////////////////////////////////////////////////

/// A job entering (or re-entering, on retry) a scheduler's pending queue.
#[derive(Clone, Serialize)]
pub struct JobArrived {
    pub job: Job,
}

/// Fires when a scheduler has spent the simulated think time for a job and
/// is ready to claim resources.
#[derive(Clone, Serialize)]
pub struct ThinkTimeExpired {
    pub job: Job,
}

/// Fires when a committed task reaches the end of its duration; the
/// receiver frees the task's resources.
#[derive(Clone, Serialize)]
pub struct TaskFinished {
    pub delta: ClaimDelta,
}

// OFFER PROTOCOL //////////////////////////////////////////////////////////////////////////////////

/// A scheduler asking the allocator to be included in the next offer round.
#[derive(Clone, Serialize)]
pub struct OfferRequested {
    pub scheduler: String,
}

/// A scheduler withdrawing from future offer rounds.
#[derive(Clone, Serialize)]
pub struct OfferRequestCancelled {
    pub scheduler: String,
}

/// The allocator's batched offer-construction timer.
#[derive(Clone, Serialize)]
pub struct BuildOffer {}

/// Delivery of a resource offer to the chosen scheduler.
#[derive(Clone, Serialize)]
pub struct ResourceOffered {
    pub offer: Offer,
}

/// A scheduler's response to an offer: the deltas it chose to claim out of
/// the offered snapshot (possibly none).
#[derive(Clone, Serialize)]
pub struct OfferResponded {
    pub offer_id: u64,
    pub scheduler: String,
    pub claim_deltas: Vec<ClaimDelta>,
}
