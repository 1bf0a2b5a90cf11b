//! Building the global column maps of distributed selectors.
//!
//! Every rank restricts its schedule to the columns it owns, then the
//! coordinator gathers the local layouts and assigns each global column to
//! the first rank claiming it. The coordinator's verdict is broadcast so
//! that every rank fails or proceeds together.

use indexmap::IndexMap;
use recap_core::{ColumnMap, ProcessContext, Rank, Schema, SelectorId, Simulation};
use recap_selector::{LocalLayout, Schedule, Source};
use recap_store::GroupLayout;
use tracing::debug;

use crate::error::DistError;

/// Outcome of [`reconcile`] on one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    /// Columns kept by this rank, one entry per selector still present.
    pub layouts: Vec<LocalLayout>,
    /// Schemas of every scheduled source before distribution, in id order.
    pub full_schemas: Vec<Schema>,
    /// Column map of every source, aligned with `full_schemas`. Only the
    /// coordinator holds them.
    pub maps: Option<Vec<ColumnMap>>,
}

impl Reconciliation {
    /// Run-group layout describing this reconciliation.
    pub fn group_layout(&self, nb_ranks: usize) -> GroupLayout {
        GroupLayout::Distributed {
            nb_ranks,
            full_schemas: self.full_schemas.clone(),
            column_maps: self.maps.clone().unwrap_or_default(),
        }
    }

    /// Map of selector `id`, on the coordinator.
    pub fn map(&self, id: SelectorId) -> Option<&ColumnMap> {
        let i = self.full_schemas.iter().position(|s| s.index == id)?;
        self.maps.as_ref()?.get(i)
    }
}

/// Build the map of selector `id` from the layouts reported by each rank.
///
/// A column claimed by several ranks belongs to the lowest-numbered
/// claimant, whatever the order of `layouts`; the other claims are
/// ignored. A column that no rank claims is never left without an owner:
/// it fails with [`DistError::Unclaimed`]. Every rank must agree on
/// `full_len`.
pub fn build_map(
    id: SelectorId,
    full_len: usize,
    layouts: &[(Rank, &LocalLayout)],
) -> Result<ColumnMap, DistError> {
    let mut map = ColumnMap::unassigned(full_len);
    let mut ordered: Vec<&(Rank, &LocalLayout)> = layouts.iter().collect();
    ordered.sort_by_key(|(rank, _)| *rank);
    for (rank, layout) in ordered {
        if layout.full_len != full_len {
            return Err(DistError::Layout {
                selector: id,
                detail: format!(
                    "rank {rank} reports {} columns, expected {full_len}",
                    layout.full_len
                ),
            });
        }
        for (local, &global) in layout.local.iter().enumerate() {
            if global >= full_len {
                return Err(DistError::Layout {
                    selector: id,
                    detail: format!("rank {rank} claims column {global} of {full_len}"),
                });
            }
            match map.owner(global) {
                None => map.assign(global, *rank, local),
                Some((owner, _)) => {
                    debug!(selector = %id, global, %owner, claimant = %rank, "column already owned")
                }
            }
        }
    }
    if let Some(column) = (0..full_len).find(|&g| map.owner(g).is_none()) {
        return Err(DistError::Unclaimed {
            selector: id,
            column,
        });
    }
    Ok(map)
}

fn maps_from(
    full_schemas: &[Schema],
    gathered: &[Vec<LocalLayout>],
) -> Result<Vec<ColumnMap>, DistError> {
    let mut by_id: IndexMap<SelectorId, Vec<(Rank, &LocalLayout)>> = IndexMap::new();
    for (rank, layouts) in gathered.iter().enumerate() {
        for layout in layouts {
            by_id
                .entry(layout.id)
                .or_default()
                .push((Rank(rank as u32), layout));
        }
    }
    full_schemas
        .iter()
        .map(|s| {
            let claims = by_id.get(&s.index).map(Vec::as_slice).unwrap_or_default();
            build_map(s.index, s.len(), claims)
        })
        .collect()
}

/// Distribute the selectors of `schedule` and reconcile their layouts.
///
/// Collective: every rank must call it at the same point. Custom sources
/// are kept whole on the coordinator.
pub fn reconcile(
    schedule: &mut Schedule,
    sim: &dyn Simulation,
    ctx: &ProcessContext,
) -> Result<Reconciliation, DistError> {
    let full_schemas: Vec<Schema> = schedule
        .entries()
        .iter()
        .map(|e| e.source.header().schema(e.id))
        .collect();
    let mut layouts = schedule.redistribute(sim, ctx)?;

    let custom: Vec<(SelectorId, usize)> = schedule
        .entries()
        .iter()
        .filter(|e| matches!(e.source, Source::Custom(_)))
        .map(|e| (e.id, e.source.len()))
        .collect();
    for (id, len) in custom {
        if ctx.is_coordinator() {
            layouts.push(LocalLayout {
                id,
                full_len: len,
                local: (0..len).collect(),
            });
        } else if let Some(e) = schedule.entry_mut(id) {
            e.present = false;
        }
    }

    let gathered = ctx.gather(&layouts)?;
    let maps = gathered.map(|g| maps_from(&full_schemas, &g));
    let verdict = ctx.on_coordinator(|| match &maps {
        Some(Err(e)) => Err(e.to_string()),
        _ => Ok(()),
    })?;
    let maps = match maps {
        Some(Err(e)) => return Err(e),
        Some(Ok(m)) => Some(m),
        None => {
            verdict.map_err(|reason| DistError::Remote { reason })?;
            None
        }
    };
    debug!(
        rank = %ctx.rank(),
        local = layouts.len(),
        selectors = full_schemas.len(),
        "distribution reconciled"
    );
    Ok(Reconciliation {
        layouts,
        full_schemas,
        maps,
    })
}
