//! Driving a simulation through its save schedule.
//!
//! A [`Recorder`] owns the [`Schedule`] and one [`Backend`] per saved
//! source. Sources and sinks are fixed when the first run starts: headers
//! are frozen, partitioned selectors are reconciled across ranks, and only
//! then are backends opened.
//!
//! ```ignore
//! let mut rec = Recorder::new(ProcessContext::single());
//! let ids = rec.add(vec![count.into()], Timing::Interval(0.1))?;
//! rec.attach_store(Box::new(store), Some("g".into()), Params::new())?;
//! rec.new_run(&mut sim)?;
//! rec.run(&mut sim, 1.0)?;
//! rec.finalize()?;
//! ```

use std::collections::BTreeMap;

use recap_core::{ProcessContext, RunId, Schema, SelectorId, Simulation, StateHint, Value};
use recap_dist::{reconcile, Reconciliation};
use recap_selector::{EvalContext, Schedule, Source, Timing};
use recap_store::{Backend, GroupLayout, GroupRequest, MemoryBackend, Params, RunGroupStore, Slice};
use tracing::debug;

use crate::error::RecordError;

/// Relative tolerance on save times.
const TIME_EPS: f64 = 1e-10;

/// A run-group store attached before the first run.
struct GroupSink {
    store: Box<dyn RunGroupStore>,
    uid: Option<String>,
    params: Params,
}

// ── Recorder ────────────────────────────────────────────────────

/// Evaluates scheduled sources and saves their rows.
///
/// Sources without an explicitly attached backend are saved to the
/// attached run-group store, or kept in memory when there is none.
pub struct Recorder {
    ctx: ProcessContext,
    schedule: Schedule,
    attached: BTreeMap<SelectorId, Box<dyn Backend>>,
    group: Option<GroupSink>,
    backends: BTreeMap<SelectorId, Box<dyn Backend>>,
    started: bool,
    uid: Option<String>,
    reconciliation: Option<Reconciliation>,
    run: Option<RunId>,
    runs: u64,
    events: u64,
}

impl Recorder {
    /// Empty recorder for the process described by `ctx`.
    pub fn new(ctx: ProcessContext) -> Self {
        Self {
            ctx,
            schedule: Schedule::new(),
            attached: BTreeMap::new(),
            group: None,
            backends: BTreeMap::new(),
            started: false,
            uid: None,
            reconciliation: None,
            run: None,
            runs: 0,
            events: 0,
        }
    }

    /// Register `sources` as one optimisation group saved with `timing`.
    pub fn add(
        &mut self,
        sources: Vec<Source>,
        timing: Timing,
    ) -> Result<Vec<SelectorId>, RecordError> {
        if self.started {
            return Err(RecordError::Started);
        }
        Ok(self.schedule.add_group(sources, timing)?)
    }

    /// The save schedule.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Save source `id` to `backend` instead of the default sink.
    pub fn attach_backend(
        &mut self,
        id: SelectorId,
        backend: Box<dyn Backend>,
    ) -> Result<(), RecordError> {
        if self.started {
            return Err(RecordError::Started);
        }
        if self.schedule.entry(id).is_none() {
            return Err(RecordError::UnknownSelector { id });
        }
        self.attached.insert(id, backend);
        Ok(())
    }

    /// Save every source without its own backend to a new or reopened
    /// run group of `store`.
    pub fn attach_store(
        &mut self,
        store: Box<dyn RunGroupStore>,
        uid: Option<String>,
        params: Params,
    ) -> Result<(), RecordError> {
        if self.started {
            return Err(RecordError::Started);
        }
        self.group = Some(GroupSink { store, uid, params });
        Ok(())
    }

    /// Unique id of the run group saved to, once opened.
    pub fn group_uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Column ownership computed when the simulation is partitioned.
    pub fn reconciliation(&self) -> Option<&Reconciliation> {
        self.reconciliation.as_ref()
    }

    /// Current run.
    pub fn current_run(&self) -> Option<RunId> {
        self.run
    }

    /// Whether the first run was started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Open every backend. Called by the first [`new_run`](Self::new_run).
    fn start(&mut self, sim: &dyn Simulation) -> Result<(), RecordError> {
        let layout = if self.ctx.is_group() && sim.is_distributed() {
            let rec = reconcile(&mut self.schedule, sim, &self.ctx)?;
            let layout = rec.group_layout(self.ctx.size());
            self.reconciliation = Some(rec);
            layout
        } else {
            GroupLayout::Shared
        };
        self.schedule.freeze();

        let schemas: BTreeMap<SelectorId, Schema> = self
            .schedule
            .entries()
            .iter()
            .filter(|e| e.present)
            .map(|e| (e.id, e.source.header().schema(e.id)))
            .collect();
        let mut attached = std::mem::take(&mut self.attached);
        if let Some(sink) = &mut self.group {
            let request = GroupRequest {
                uid: sink.uid.clone(),
                params: sink.params.clone(),
                schemas: schemas
                    .iter()
                    .filter(|(id, _)| !attached.contains_key(*id))
                    .map(|(_, s)| s.clone())
                    .collect(),
                rank: self.ctx.rank(),
                layout,
            };
            let uid = sink.store.open_group(&request)?;
            debug!(
                %uid,
                rank = %self.ctx.rank(),
                selectors = request.schemas.len(),
                "run group opened"
            );
            for s in &request.schemas {
                self.backends.insert(s.index, sink.store.backend_for(s.index)?);
            }
            self.uid = Some(uid);
        }
        for (id, schema) in schemas {
            if let Some(b) = attached.remove(&id) {
                self.backends.insert(id, b);
            } else if !self.backends.contains_key(&id) {
                self.backends.insert(id, Box::new(MemoryBackend::new(schema)));
            }
        }
        self.started = true;
        Ok(())
    }

    /// Start a new run of `sim` and of every backend.
    ///
    /// Returns the id of the new run.
    pub fn new_run(&mut self, sim: &mut dyn Simulation) -> Result<RunId, RecordError> {
        if !self.started {
            self.start(&*sim)?;
        }
        sim.new_run()?;
        self.schedule.reset();
        let mut run = None;
        for b in self.backends.values_mut() {
            let id = b.new_run()?;
            run.get_or_insert(id);
        }
        let run = run.unwrap_or(RunId(self.runs));
        self.runs = run.0 + 1;
        self.events = 0;
        self.run = Some(run);
        debug!(%run, "run started");
        Ok(run)
    }

    /// Advance `sim` to `end`, saving every scheduled event on the way.
    ///
    /// Events within a relative tolerance of `end` are saved.
    pub fn run(&mut self, sim: &mut dyn Simulation, end: f64) -> Result<(), RecordError> {
        if self.run.is_none() {
            return Err(RecordError::NoRun);
        }
        let eps = TIME_EPS * end.abs().max(1.0);
        loop {
            let t = self.schedule.next_time();
            if t > end + eps {
                break;
            }
            if t > sim.time() {
                sim.advance_to(t)?;
            }
            self.save_due(&*sim, t, eps)?;
        }
        if end > sim.time() {
            sim.advance_to(end)?;
        }
        Ok(())
    }

    fn hint(&mut self) -> Result<StateHint, RecordError> {
        let run = self.run.ok_or(RecordError::NoRun)?;
        let hint = StateHint::new(run, self.events);
        self.events += 1;
        Ok(hint)
    }

    fn save_due(&mut self, sim: &dyn Simulation, t: f64, eps: f64) -> Result<(), RecordError> {
        let mut ctx = EvalContext::new(sim, self.hint()?);
        let rows = self.schedule.collect_due(&mut ctx, t, eps)?;
        self.write(sim.time(), rows)
    }

    /// Evaluate and save the selectors `ids` now, whatever their timing.
    pub fn save_now(
        &mut self,
        sim: &dyn Simulation,
        ids: &[SelectorId],
    ) -> Result<(), RecordError> {
        let mut ctx = EvalContext::new(sim, self.hint()?);
        let rows = self.schedule.evaluate(&mut ctx, ids)?;
        self.write(sim.time(), rows)
    }

    fn write(&mut self, time: f64, rows: Vec<(SelectorId, Vec<f64>)>) -> Result<(), RecordError> {
        for (id, values) in rows {
            let row: Vec<Value> = values.into_iter().map(Value::Float).collect();
            self.backend(id)?.save(time, &row)?;
        }
        Ok(())
    }

    /// Save a row of custom results `id` at the current time of `sim`.
    pub fn save_custom(
        &mut self,
        sim: &dyn Simulation,
        id: SelectorId,
        row: &[Value],
    ) -> Result<(), RecordError> {
        if self.run.is_none() {
            return Err(RecordError::NoRun);
        }
        let entry = self
            .schedule
            .entry(id)
            .ok_or(RecordError::UnknownSelector { id })?;
        let Source::Custom(custom) = &entry.source else {
            return Err(RecordError::NotCustom { id });
        };
        custom.check_row(row)?;
        self.backend(id)?.save(sim.time(), row)?;
        Ok(())
    }

    fn backend(&mut self, id: SelectorId) -> Result<&mut Box<dyn Backend>, RecordError> {
        if self.schedule.entry(id).is_none() {
            return Err(RecordError::UnknownSelector { id });
        }
        if !self.started {
            return Err(RecordError::NoRun);
        }
        self.backends
            .get_mut(&id)
            .ok_or(RecordError::NotSaved { id })
    }

    /// Backend holding the results of source `id`.
    pub fn results(&mut self, id: SelectorId) -> Result<&mut dyn Backend, RecordError> {
        Ok(self.backend(id)?.as_mut())
    }

    /// Save times of source `id`, run × row.
    pub fn time(
        &mut self,
        id: SelectorId,
        runs: &Slice,
        rows: &Slice,
    ) -> Result<Vec<Vec<f64>>, RecordError> {
        Ok(self.backend(id)?.time(runs, rows)?)
    }

    /// Saved values of source `id`, run × row × column.
    pub fn data(
        &mut self,
        id: SelectorId,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, RecordError> {
        Ok(self.backend(id)?.data(runs, rows, cols)?)
    }

    /// Flush every backend and the run-group store.
    pub fn finalize(&mut self) -> Result<(), RecordError> {
        for b in self.backends.values_mut() {
            b.finalize()?;
        }
        if let Some(sink) = &mut self.group {
            sink.store.finalize()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_core::path;
    use recap_selector::{ColumnType, CustomResults, Selector};
    use recap_test_utils::MockSimulation;

    fn count(sim: &MockSimulation, species: &str) -> Selector {
        Selector::leaf(sim, path().member("comp1").member(species).terminal("Count")).unwrap()
    }

    #[test]
    fn schedule_is_fixed_after_first_run() {
        let mut sim = MockSimulation::new();
        let mut rec = Recorder::new(ProcessContext::single());
        let ids = rec.add(vec![count(&sim, "A").into()], Timing::Interval(1.0)).unwrap();
        assert!(matches!(
            rec.data(ids[0], &Slice::All, &Slice::All, &Slice::All),
            Err(RecordError::NoRun)
        ));
        assert!(matches!(rec.run(&mut sim, 1.0), Err(RecordError::NoRun)));
        assert_eq!(rec.new_run(&mut sim).unwrap(), RunId(0));
        assert!(rec.schedule().entries()[0].source.header().is_frozen());
        assert!(matches!(
            rec.add(vec![count(&sim, "B").into()], Timing::Manual),
            Err(RecordError::Started)
        ));
        assert!(matches!(
            rec.results(SelectorId(5)),
            Err(RecordError::UnknownSelector { .. })
        ));
    }

    #[test]
    fn runs_restart_the_schedule() {
        let mut sim = MockSimulation::new();
        let mut rec = Recorder::new(ProcessContext::single());
        let ids = rec
            .add(vec![count(&sim, "B").into()], Timing::Timepoints(vec![0.5, 2.0]))
            .unwrap();
        for expected in 0..2 {
            assert_eq!(rec.new_run(&mut sim).unwrap(), RunId(expected));
            rec.run(&mut sim, 1.0).unwrap();
            assert_eq!(sim.time(), 1.0);
        }
        // Only the first time point falls within each run: B(0.5) = 2.
        assert_eq!(
            rec.data(ids[0], &Slice::All, &Slice::All, &Slice::All).unwrap(),
            vec![vec![vec![Value::Float(2.0)]]; 2]
        );
        assert_eq!(rec.results(ids[0]).unwrap().run_count().unwrap(), 2);
    }

    #[test]
    fn manual_and_custom_rows() {
        let mut sim = MockSimulation::new();
        let mut rec = Recorder::new(ProcessContext::single());
        let a = rec.add(vec![count(&sim, "C").into()], Timing::Manual).unwrap()[0];
        let custom = CustomResults::new(&sim, vec![ColumnType::Int, ColumnType::Str]);
        let c = rec.add(vec![custom.into()], Timing::Manual).unwrap()[0];
        rec.new_run(&mut sim).unwrap();
        rec.run(&mut sim, 3.0).unwrap();
        rec.save_now(&sim, &[a]).unwrap();
        rec.save_custom(&sim, c, &[Value::Int(7), Value::from("x")]).unwrap();
        assert!(rec.save_custom(&sim, c, &[Value::Int(7)]).is_err());
        assert!(matches!(
            rec.save_custom(&sim, a, &[Value::Float(1.0)]),
            Err(RecordError::NotCustom { .. })
        ));
        assert_eq!(rec.time(a, &Slice::All, &Slice::All).unwrap(), vec![vec![3.0]]);
        assert_eq!(
            rec.data(c, &Slice::Index(0), &Slice::All, &Slice::All).unwrap()[0][0],
            vec![Value::Int(7), Value::from("x")]
        );
    }
}
