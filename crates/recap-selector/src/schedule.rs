//! Save schedule: when each registered source is evaluated.
//!
//! Sources are registered in groups sharing one [`Timing`]. Each group is
//! also an optimisation group: its selectors share one compiled
//! [`EvalPlan`], so a leaf path used by several of them is queried once per
//! save event.

use recap_core::{ProcessContext, SelectorId, Simulation};
use tracing::debug;

use crate::custom::CustomResults;
use crate::distribute::LocalLayout;
use crate::error::SelectorError;
use crate::header::Header;
use crate::plan::{EvalContext, EvalPlan};
use crate::selector::Selector;

/// When a source is saved.
#[derive(Clone, Debug, PartialEq)]
pub enum Timing {
    /// Every `dt`, starting at time 0.
    Interval(f64),
    /// At each of the given, sorted, time points.
    Timepoints(Vec<f64>),
    /// Only on explicit request.
    Manual,
}

impl Timing {
    fn check(&self) -> Result<(), SelectorError> {
        match self {
            Timing::Interval(dt) if !(*dt > 0.0) => Err(SelectorError::InvalidTiming {
                reason: format!("interval must be strictly positive, got {dt}"),
            }),
            Timing::Timepoints(tp) if tp.windows(2).any(|w| w[0] > w[1]) => {
                Err(SelectorError::InvalidTiming {
                    reason: "timepoints must be sorted".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn time_at(&self, index: usize) -> f64 {
        match self {
            Timing::Interval(dt) => index as f64 * dt,
            Timing::Timepoints(tp) => tp.get(index).copied().unwrap_or(f64::INFINITY),
            Timing::Manual => f64::INFINITY,
        }
    }
}

/// Position of one entry within its timing, reset at every run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cursor {
    /// Number of events already saved in the current run.
    pub index: usize,
    /// Time of the next event, infinite when none is left.
    pub next: f64,
}

impl Cursor {
    fn start(timing: &Timing) -> Self {
        Self {
            index: 0,
            next: timing.time_at(0),
        }
    }

    fn advance(&mut self, timing: &Timing) {
        self.index += 1;
        self.next = timing.time_at(self.index);
    }
}

/// A registered source of rows.
#[derive(Clone, Debug)]
pub enum Source {
    /// Values evaluated from the simulation.
    Selector(Selector),
    /// Rows supplied by the caller.
    Custom(CustomResults),
}

impl Source {
    /// Labels, metadata and description.
    pub fn header(&self) -> &Header {
        match self {
            Source::Selector(s) => s.header(),
            Source::Custom(c) => c.header(),
        }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.header().len()
    }

    /// Whether the source has no column.
    pub fn is_empty(&self) -> bool {
        self.header().is_empty()
    }

    fn freeze(&mut self) {
        match self {
            Source::Selector(s) => s.freeze(),
            Source::Custom(c) => c.header_mut().freeze(),
        }
    }
}

impl From<Selector> for Source {
    fn from(s: Selector) -> Self {
        Source::Selector(s)
    }
}

impl From<CustomResults> for Source {
    fn from(c: CustomResults) -> Self {
        Source::Custom(c)
    }
}

/// One registered source with its timing.
#[derive(Clone, Debug)]
pub struct ScheduleEntry {
    /// Ordinal of the source, in registration order.
    pub id: SelectorId,
    /// Optimisation group the source was registered with.
    pub group: usize,
    /// When to save.
    pub timing: Timing,
    /// Progress in the current run.
    pub cursor: Cursor,
    /// What to save.
    pub source: Source,
    /// False when distribution left nothing of the source on this rank.
    pub present: bool,
}

/// Every registered source and the compiled plan of each group.
#[derive(Clone, Debug, Default)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
    plans: Vec<EvalPlan>,
}

impl Schedule {
    /// Empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sources` as one group saved with `timing`.
    ///
    /// Custom sources only accept [`Timing::Manual`].
    pub fn add_group(
        &mut self,
        sources: Vec<Source>,
        timing: Timing,
    ) -> Result<Vec<SelectorId>, SelectorError> {
        timing.check()?;
        if timing != Timing::Manual && sources.iter().any(|s| matches!(s, Source::Custom(_))) {
            return Err(SelectorError::InvalidTiming {
                reason: "custom results can only be saved manually".to_string(),
            });
        }
        let group = self.plans.len();
        let mut ids = Vec::with_capacity(sources.len());
        for source in sources {
            let id = SelectorId(self.entries.len() as u32);
            ids.push(id);
            self.entries.push(ScheduleEntry {
                id,
                group,
                cursor: Cursor::start(&timing),
                timing: timing.clone(),
                source,
                present: true,
            });
        }
        self.plans.push(self.compile_group(group));
        Ok(ids)
    }

    fn compile_group(&self, group: usize) -> EvalPlan {
        EvalPlan::compile(self.group_selectors(group).map(|(_, s)| s))
    }

    fn group_selectors(&self, group: usize) -> impl Iterator<Item = (SelectorId, &Selector)> {
        self.entries.iter().filter_map(move |e| match &e.source {
            Source::Selector(s) if e.group == group && e.present => Some((e.id, s)),
            _ => None,
        })
    }

    /// Registered entries in id order.
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Entry registered under `id`.
    pub fn entry(&self, id: SelectorId) -> Option<&ScheduleEntry> {
        self.entries.get(id.0 as usize)
    }

    /// Mutable entry registered under `id`.
    pub fn entry_mut(&mut self, id: SelectorId) -> Option<&mut ScheduleEntry> {
        self.entries.get_mut(id.0 as usize)
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of optimisation groups.
    pub fn group_count(&self) -> usize {
        self.plans.len()
    }

    /// Freeze every header. Called when the first run starts.
    pub fn freeze(&mut self) {
        for e in &mut self.entries {
            e.source.freeze();
        }
    }

    /// Rewind every cursor for a new run.
    pub fn reset(&mut self) {
        for e in &mut self.entries {
            e.cursor = Cursor::start(&e.timing);
        }
    }

    /// Earliest pending save time, infinite when nothing is scheduled.
    pub fn next_time(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.cursor.next)
            .fold(f64::INFINITY, f64::min)
    }

    /// Evaluate every entry due at `t` (within `eps`) and advance its cursor.
    ///
    /// Rows are returned in id order. Entries not present on this rank
    /// advance without producing a row.
    pub fn collect_due(
        &mut self,
        ctx: &mut EvalContext<'_>,
        t: f64,
        eps: f64,
    ) -> Result<Vec<(SelectorId, Vec<f64>)>, SelectorError> {
        let due: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.cursor.next <= t + eps)
            .map(|(i, _)| i)
            .collect();
        let mut groups: Vec<usize> = due.iter().map(|&i| self.entries[i].group).collect();
        groups.dedup();
        let mut rows = Vec::with_capacity(due.len());
        for g in groups {
            let (ids, sels): (Vec<SelectorId>, Vec<&Selector>) = self
                .group_selectors(g)
                .filter(|(id, _)| due.contains(&(id.0 as usize)))
                .unzip();
            let values = self.plans[g].execute(ctx, sels)?;
            rows.extend(ids.into_iter().zip(values));
        }
        rows.sort_by_key(|(id, _)| *id);
        for i in due {
            let e = &mut self.entries[i];
            e.cursor.advance(&e.timing);
        }
        Ok(rows)
    }

    /// Evaluate the given selectors now, regardless of their timing.
    pub fn evaluate(
        &self,
        ctx: &mut EvalContext<'_>,
        ids: &[SelectorId],
    ) -> Result<Vec<(SelectorId, Vec<f64>)>, SelectorError> {
        let mut rows = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(ScheduleEntry {
                source: Source::Selector(s),
                present: true,
                ..
            }) = self.entry(id)
            {
                rows.push((id, s.evaluate(ctx)?));
            }
        }
        Ok(rows)
    }

    /// Restrict every selector to the columns owned by this rank.
    ///
    /// Plans of groups whose selectors changed are recompiled. Returns the
    /// layout of every selector still present, for the coordinator to
    /// gather.
    pub fn redistribute(
        &mut self,
        sim: &dyn Simulation,
        ctx: &ProcessContext,
    ) -> Result<Vec<LocalLayout>, SelectorError> {
        let mut changed_groups = Vec::new();
        for e in &mut self.entries {
            let Source::Selector(sel) = &e.source else {
                continue;
            };
            if !e.present {
                continue;
            }
            let (dist, changed) = sel.distribute(sim, ctx)?;
            match dist {
                Some(d) => e.source = Source::Selector(d),
                None => e.present = false,
            }
            if changed && !changed_groups.contains(&e.group) {
                changed_groups.push(e.group);
            }
        }
        for g in changed_groups {
            debug!(group = g, "recompiling evaluation plan after distribution");
            self.plans[g] = self.compile_group(g);
        }
        Ok(self
            .entries
            .iter()
            .filter_map(|e| match &e.source {
                Source::Selector(s) if e.present => Some(s.local_layout(e.id)),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_core::{path, RunId, StateHint};
    use recap_test_utils::MockSimulation;

    use crate::custom::ColumnType;

    fn count(sim: &MockSimulation, species: &str) -> Selector {
        Selector::leaf(sim, path().member("comp1").member(species).terminal("Count")).unwrap()
    }

    #[test]
    fn interval_cursor() {
        let sim = MockSimulation::new();
        let mut s = Schedule::new();
        s.add_group(vec![count(&sim, "A").into()], Timing::Interval(0.5))
            .unwrap();
        assert_eq!(s.next_time(), 0.0);
        let mut ctx = EvalContext::new(&sim, StateHint::new(RunId(0), 0));
        let rows = s.collect_due(&mut ctx, 0.0, 1e-10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(s.next_time(), 0.5);
        s.reset();
        assert_eq!(s.entries()[0].cursor.index, 0);
    }

    #[test]
    fn timepoints_then_exhausted() {
        let sim = MockSimulation::new();
        let mut s = Schedule::new();
        s.add_group(vec![count(&sim, "A").into()], Timing::Timepoints(vec![1.0, 2.0]))
            .unwrap();
        let mut ctx = EvalContext::new(&sim, StateHint::new(RunId(0), 0));
        assert!(s.collect_due(&mut ctx, 0.5, 1e-10).unwrap().is_empty());
        s.collect_due(&mut ctx, 1.0, 1e-10).unwrap();
        s.collect_due(&mut ctx, 2.0, 1e-10).unwrap();
        assert_eq!(s.next_time(), f64::INFINITY);
    }

    #[test]
    fn group_shares_queries() {
        let sim = MockSimulation::new();
        let a = count(&sim, "A");
        let twice = a.mul(2.0).unwrap();
        let mut s = Schedule::new();
        let ids = s
            .add_group(vec![a.into(), twice.into()], Timing::Interval(1.0))
            .unwrap();
        assert_eq!(ids, vec![SelectorId(0), SelectorId(1)]);
        let mut ctx = EvalContext::new(&sim, StateHint::new(RunId(0), 0));
        let rows = s.collect_due(&mut ctx, 0.0, 1e-10).unwrap();
        assert_eq!(ctx.queries(), 1);
        assert_eq!(rows[1].1[0], 2.0 * rows[0].1[0]);
    }

    #[test]
    fn invalid_timings() {
        let sim = MockSimulation::new();
        let mut s = Schedule::new();
        assert!(s.add_group(vec![count(&sim, "A").into()], Timing::Interval(0.0)).is_err());
        assert!(s
            .add_group(vec![count(&sim, "A").into()], Timing::Timepoints(vec![2.0, 1.0]))
            .is_err());
        let custom = CustomResults::new(&sim, vec![ColumnType::Int]);
        assert!(matches!(
            s.add_group(vec![custom.clone().into()], Timing::Interval(1.0)),
            Err(SelectorError::InvalidTiming { .. })
        ));
        assert!(s.add_group(vec![custom.into()], Timing::Manual).is_ok());
        assert_eq!(s.next_time(), f64::INFINITY);
    }

    #[test]
    fn freeze_reaches_sources() {
        let sim = MockSimulation::new();
        let mut s = Schedule::new();
        s.add_group(vec![count(&sim, "A").into()], Timing::Manual).unwrap();
        s.freeze();
        assert!(s.entries()[0].source.header().is_frozen());
    }
}
