//! Global-to-local column map of a distributed selector.

use crate::id::Rank;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker for a column no process reported owning.
pub const UNASSIGNED: i64 = -1;

/// Maps each global column of a selector to its owning rank and its
/// position in that rank's local columns.
///
/// Stored as two rows of equal length, matching the persisted `2 x N`
/// layout: row 0 holds ranks, row 1 local positions, [`UNASSIGNED`] where
/// no owner is known.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    ranks: Vec<i64>,
    locals: Vec<i64>,
}

impl ColumnMap {
    /// A map of `len` columns, all unassigned.
    pub fn unassigned(len: usize) -> Self {
        Self {
            ranks: vec![UNASSIGNED; len],
            locals: vec![UNASSIGNED; len],
        }
    }

    /// Rebuild a map from its two persisted rows.
    ///
    /// Returns `None` if the rows differ in length.
    pub fn from_rows(ranks: Vec<i64>, locals: Vec<i64>) -> Option<Self> {
        (ranks.len() == locals.len()).then_some(Self { ranks, locals })
    }

    /// Number of global columns.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// Whether the map has no columns.
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Record that `global` lives on `rank` at local position `local`.
    ///
    /// Out-of-range global columns are ignored.
    pub fn assign(&mut self, global: usize, rank: Rank, local: usize) {
        if global < self.len() {
            self.ranks[global] = rank.0 as i64;
            self.locals[global] = local as i64;
        }
    }

    /// Owner of a global column, if assigned.
    pub fn owner(&self, global: usize) -> Option<(Rank, usize)> {
        let r = *self.ranks.get(global)?;
        let l = *self.locals.get(global)?;
        (r >= 0 && l >= 0).then_some((Rank(r as u32), l as usize))
    }

    /// Whether every column has an owner.
    pub fn is_complete(&self) -> bool {
        self.ranks.iter().all(|&r| r != UNASSIGNED) && self.locals.iter().all(|&l| l != UNASSIGNED)
    }

    /// Row 0: owning ranks.
    pub fn ranks(&self) -> &[i64] {
        &self.ranks
    }

    /// Row 1: local positions.
    pub fn locals(&self) -> &[i64] {
        &self.locals
    }

    /// Group requested global columns by owning rank.
    ///
    /// Each entry pairs the position within `cols` with the local column
    /// on that rank. Unassigned columns are left out.
    pub fn group_by_rank(&self, cols: &[usize]) -> BTreeMap<Rank, Vec<(usize, usize)>> {
        let mut out: BTreeMap<Rank, Vec<(usize, usize)>> = BTreeMap::new();
        for (pos, &g) in cols.iter().enumerate() {
            if let Some((rank, local)) = self.owner(g) {
                out.entry(rank).or_default().push((pos, local));
            }
        }
        out
    }

    /// First global column at which `self` and `other` disagree.
    pub fn first_mismatch(&self, other: &ColumnMap) -> Option<usize> {
        if self.len() != other.len() {
            return Some(self.len().min(other.len()));
        }
        (0..self.len())
            .find(|&i| self.ranks[i] != other.ranks[i] || self.locals[i] != other.locals[i])
    }
}
