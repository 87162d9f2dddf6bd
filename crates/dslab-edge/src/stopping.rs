//! Stopping criteria.

use crate::error::HookResult;
use crate::model::Model;

/// Predicate checked once per tick, after metrics are collected, to decide whether to halt the run.
///
/// Closures taking `&Model` and returning `HookResult<bool>` implement this trait.
pub trait StoppingCriterion {
    fn should_stop(&mut self, model: &Model) -> HookResult<bool>;
}

impl<F> StoppingCriterion for F
where
    F: FnMut(&Model) -> HookResult<bool>,
{
    fn should_stop(&mut self, model: &Model) -> HookResult<bool> {
        self(model)
    }
}

/// Stops once the specified number of ticks has been simulated.
pub struct TickLimit {
    ticks: u64,
}

impl TickLimit {
    pub fn new(ticks: u64) -> Self {
        Self { ticks }
    }
}

impl StoppingCriterion for TickLimit {
    fn should_stop(&mut self, model: &Model) -> HookResult<bool> {
        Ok(model.tick() >= self.ticks)
    }
}

/// Stops once every service is placed on some server.
#[derive(Default)]
pub struct AllServicesPlaced;

impl StoppingCriterion for AllServicesPlaced {
    fn should_stop(&mut self, model: &Model) -> HookResult<bool> {
        Ok(model.pool().unplaced_services().is_empty())
    }
}
