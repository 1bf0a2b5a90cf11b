//! Per-event evaluation context and compiled evaluation plans.
//!
//! An [`EvalContext`] lives for exactly one save event. It memoises leaf
//! queries by path, so two structurally identical leaves in the same
//! event observe the same values and cost one simulation query.
//!
//! An [`EvalPlan`] is compiled once per optimisation group (the selectors
//! registered together) and lists the distinct leaf paths of the group.
//! Executing it fills the context with every distinct path, then
//! evaluates each selector from the warm cache.

use std::collections::HashMap;

use indexmap::IndexMap;
use recap_core::{SimPath, Simulation, StateHint};
use tracing::debug;

use crate::error::SelectorError;
use crate::selector::Selector;

/// Evaluation state of one save event.
pub struct EvalContext<'a> {
    sim: &'a dyn Simulation,
    hint: StateHint,
    cache: HashMap<String, Vec<f64>>,
    queries: usize,
}

impl<'a> EvalContext<'a> {
    /// Start an event on `sim`.
    pub fn new(sim: &'a dyn Simulation, hint: StateHint) -> Self {
        Self {
            sim,
            hint,
            cache: HashMap::new(),
            queries: 0,
        }
    }

    /// Simulation being evaluated.
    pub fn sim(&self) -> &'a dyn Simulation {
        self.sim
    }

    /// Event token.
    pub fn hint(&self) -> StateHint {
        self.hint
    }

    /// Number of simulation queries issued so far.
    pub fn queries(&self) -> usize {
        self.queries
    }

    /// Values of `path`, queried at most once per event.
    pub fn query(&mut self, path: &SimPath) -> Result<Vec<f64>, SelectorError> {
        let key = path.key();
        if let Some(v) = self.cache.get(&key) {
            return Ok(v.clone());
        }
        let vals = self.sim.query(path, self.hint)?;
        self.queries += 1;
        self.cache.insert(key, vals.clone());
        Ok(vals)
    }
}

/// Distinct leaf paths of an optimisation group.
#[derive(Clone, Debug, Default)]
pub struct EvalPlan {
    paths: IndexMap<String, SimPath>,
}

impl EvalPlan {
    /// Compile a plan over `selectors`.
    pub fn compile<'s, I>(selectors: I) -> Self
    where
        I: IntoIterator<Item = &'s Selector>,
    {
        let mut paths = IndexMap::new();
        let mut leaves = 0usize;
        for sel in selectors {
            for p in sel.leaf_paths() {
                leaves += 1;
                paths.entry(p.key()).or_insert_with(|| p.clone());
            }
        }
        debug!(leaves, distinct = paths.len(), "evaluation plan compiled");
        Self { paths }
    }

    /// Number of distinct paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the plan has no path.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Query every distinct path, then evaluate `selectors`.
    pub fn execute<'s, I>(
        &self,
        ctx: &mut EvalContext<'_>,
        selectors: I,
    ) -> Result<Vec<Vec<f64>>, SelectorError>
    where
        I: IntoIterator<Item = &'s Selector>,
    {
        for p in self.paths.values() {
            ctx.query(p)?;
        }
        selectors.into_iter().map(|s| s.evaluate(ctx)).collect()
    }
}
