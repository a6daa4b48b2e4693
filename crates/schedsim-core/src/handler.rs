//! Event handling.

use crate::event::Event;

/// Trait for consuming events in simulation components.
pub trait EventHandler {
    /// Processes an event destined to this component.
    fn on(&mut self, event: Event);
}

/// Enables pattern-matching syntax for processing different types of events
/// by downcasting the event payload from [`EventData`](crate::event::EventData)
/// to user-defined types.
///
/// Match arms need not be exhaustive: payloads matching none of the arms
/// are logged as unhandled under the `ERROR` level.
///
/// # Examples
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use serde::Serialize;
/// use schedsim_core::{cast, Event, EventHandler, Simulation, SimulationContext};
///
/// #[derive(Clone, Serialize)]
/// pub struct TaskCompleted {
///     task_id: u64,
/// }
///
/// pub struct Worker {
///     ctx: SimulationContext,
/// }
///
/// impl EventHandler for Worker {
///     fn on(&mut self, event: Event) {
///         cast!(match event.data {
///             TaskCompleted { task_id } => {
///                 assert_eq!(task_id, 16);
///             }
///         })
///     }
/// }
///
/// let mut sim = Simulation::new(123);
/// let worker_ctx = sim.create_context("worker");
/// let worker_id = sim.add_handler("worker", Rc::new(RefCell::new(Worker { ctx: worker_ctx })));
/// let client_ctx = sim.create_context("client");
/// client_ctx.emit(TaskCompleted { task_id: 16 }, worker_id, 1.2);
/// sim.step_until_no_events();
/// ```
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        $(
            if $event.data.is::<$type>() {
                if let Ok(__value) = $event.data.downcast::<$type>() {
                    let $type { $($tt)* } = *__value;
                    $($expr)*
                }
            } else
        )*
        {
            $crate::log::log_unhandled_event($event);
        }
    }
}
