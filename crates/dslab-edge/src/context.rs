//! Accessing simulation clock from components.

use std::cell::Cell;
use std::rc::Rc;

/// A named handle used by simulation components to read the current tick.
///
/// All contexts created by the same [`Model`](crate::model::Model) share its clock, so the tick observed through a
/// context always matches the tick of the model, including after the model is reset.
#[derive(Clone)]
pub struct SimulationContext {
    name: String,
    clock: Rc<Cell<u64>>,
}

impl SimulationContext {
    pub(crate) fn new(name: &str, clock: Rc<Cell<u64>>) -> Self {
        Self {
            name: name.to_string(),
            clock,
        }
    }

    /// Returns the name of the component owning the context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation tick.
    pub fn tick(&self) -> u64 {
        self.clock.get()
    }
}
