//! Simulation events.

use std::cmp::Ordering;

use downcast_rs::{impl_downcast, Downcast};
use dyn_clone::{clone_trait_object, DynClone};
use serde::ser::Serialize;

use crate::component::Id;

/// Event identifier.
pub type EventId = u64;

/// Trait implemented by event payloads.
///
/// Any `Clone + Serialize` struct qualifies via the blanket impl below.
pub trait EventData: Downcast + DynClone + erased_serde::Serialize {}

impl_downcast!(EventData);

clone_trait_object!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + DynClone + 'static> EventData for T {}

/// A scheduled occurrence delivered to a component at a point of virtual time.
#[derive(Clone)]
pub struct Event {
    /// Unique identifier, assigned sequentially starting from 0.
    pub id: EventId,
    /// Virtual time of occurrence.
    pub time: f64,
    /// Identifier of the component that emitted the event.
    pub src: Id,
    /// Identifier of the component the event is delivered to.
    pub dst: Id,
    /// Event payload.
    pub data: Box<dyn EventData>,
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Reversed comparison turns the std max-heap into a min-heap on time.
// The id tie-break makes equal-time events fire in emission order.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
