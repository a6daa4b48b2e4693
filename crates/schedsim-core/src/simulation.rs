//! Simulation configuration and execution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use log::Level::Trace;
use log::log_enabled;
use log::trace;
use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;
use serde_json::json;
use serde_type_name::type_name;

use crate::component::Id;
use crate::context::SimulationContext;
use crate::handler::EventHandler;
use crate::log::log_undelivered_event;
use crate::state::SimulationState;

/// Outcome of [`Simulation::run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// The event queue drained or the virtual-time limit was reached.
    Completed,
    /// The wall-clock timeout expired before the simulation finished.
    TimedOut,
}

/// Represents a simulation, provides methods for its configuration and execution.
///
/// Virtual time advances only by dequeuing events; every handler runs to
/// completion before the next event fires, so component state is never
/// observed mid-update.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    name_to_id: HashMap<String, Id>,
    names: Vec<String>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
}

impl Simulation {
    /// Creates a new simulation with the specified random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed))),
            name_to_id: HashMap::new(),
            names: Vec::new(),
            handlers: Vec::new(),
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.name_to_id.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        self.handlers.push(None);
        id
    }

    /// Returns the identifier of the component with the specified name.
    ///
    /// Panics if such component does not exist.
    pub fn lookup_id(&self, name: &str) -> Id {
        *self.name_to_id.get(name).unwrap()
    }

    /// Returns the name of the component with the specified identifier.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names[id as usize].clone()
    }

    /// Creates a new simulation context for the component with the specified name.
    ///
    /// Component ids are assigned sequentially starting from 0.
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        SimulationContext::new(self.register(name.as_ref()), name.as_ref(), self.sim_state.clone())
    }

    /// Registers the event handler for the component with the specified name,
    /// returns the component id.
    ///
    /// If a context was already created for this name, the id assigned there
    /// is reused.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        id
    }

    /// Returns the current virtual time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Performs a single step through the simulation.
    ///
    /// Dequeues the earliest pending event, advances the clock to its time
    /// and delivers it to the handler of the destination component. Events
    /// destined to components without a handler are logged and discarded.
    ///
    /// Returns `true` if some pending event was found (whether or not it was
    /// delivered) and `false` otherwise.
    pub fn step(&mut self) -> bool {
        let next = self.sim_state.borrow_mut().next_event();
        if let Some(event) = next {
            if log_enabled!(Trace) {
                let src_name = self.lookup_name(event.src);
                let dst_name = self.lookup_name(event.dst);
                trace!(
                    target: &dst_name,
                    "[{:.3} {} {}] {}",
                    event.time,
                    crate::log::get_colored("EVENT", colored::Color::BrightBlack),
                    dst_name,
                    json!({"type": type_name(&event.data).unwrap(), "data": event.data, "src": src_name})
                );
            }
            match self.handlers.get(event.dst as usize) {
                Some(Some(handler)) => handler.borrow_mut().on(event),
                _ => log_undelivered_event(event),
            }
            true
        } else {
            false
        }
    }

    /// Performs the specified number of steps, stopping early if the queue drains.
    ///
    /// Returns `true` if there could be more pending events and `false` otherwise.
    pub fn steps(&mut self, step_count: u64) -> bool {
        for _ in 0..step_count {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Runs the simulation subject to optional limits.
    ///
    /// Stops when the event queue drains, or once the clock exceeds
    /// `run_time` (the event that advances the clock past the limit still
    /// executes), or once `wall_clock_timeout` seconds of real time elapse.
    /// Only the last case yields [`RunStatus::TimedOut`].
    pub fn run(&mut self, run_time: Option<f64>, wall_clock_timeout: Option<f64>) -> RunStatus {
        let start = Instant::now();
        while self.sim_state.borrow().peek_event().is_some() {
            if let Some(limit) = run_time {
                if self.time() > limit {
                    break;
                }
            }
            if let Some(timeout) = wall_clock_timeout {
                if start.elapsed().as_secs_f64() > timeout {
                    return RunStatus::TimedOut;
                }
            }
            self.step();
        }
        RunStatus::Completed
    }

    /// Returns a random float in the range _[0, 1)_
    /// using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range
    /// using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from the specified distribution
    /// using the simulation-wide random number generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        self.sim_state.borrow_mut().sample_from_distribution(dist)
    }

    /// Returns the total number of created events.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }
}
