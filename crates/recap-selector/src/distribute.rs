//! Restricting selectors to the columns owned by the local rank.
//!
//! Leaves ask the simulation which of their columns are resident;
//! concatenations offset their children's columns; combinators follow their
//! operands when every column is tagged with a `loc_id`, and otherwise stay
//! whole on the coordinator while other ranks keep an empty placeholder.

use recap_core::{ProcessContext, SelectorId, Simulation, Value};
use serde::{Deserialize, Serialize};

use crate::error::SelectorError;
use crate::metadata::LOC_ID_KEY;
use crate::ops::Shape;
use crate::selector::{Distribution, Node, Selector};

/// Columns of one selector kept by one rank, as gathered on the
/// coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalLayout {
    /// Selector the layout belongs to.
    pub id: SelectorId,
    /// Length of the undistributed selector.
    pub full_len: usize,
    /// Global column of every local column.
    pub local: Vec<usize>,
}

fn identity(len: usize) -> Vec<usize> {
    (0..len).collect()
}

impl Selector {
    /// Restrict to the columns owned by the calling rank.
    ///
    /// Returns the distributed selector and whether its shape changed.
    /// `None` means nothing of it lives on this rank. Distributing an
    /// already distributed selector is a no-op.
    pub fn distribute(
        &self,
        sim: &dyn Simulation,
        ctx: &ProcessContext,
    ) -> Result<(Option<Selector>, bool), SelectorError> {
        if self.distribution.is_some() {
            return Ok((Some(self.clone()), false));
        }
        let (sel, changed) = self.distribute_node(sim, ctx)?;
        if changed && sel.is_empty() {
            return Ok((None, true));
        }
        Ok((Some(sel), changed))
    }

    /// Layout to send to the coordinator.
    pub fn local_layout(&self, id: SelectorId) -> LocalLayout {
        match &self.distribution {
            Some(d) => LocalLayout {
                id,
                full_len: d.full_len,
                local: d.local_indices.clone(),
            },
            None => LocalLayout {
                id,
                full_len: self.len(),
                local: identity(self.len()),
            },
        }
    }

    fn with_distribution(mut self, full_len: usize, local_indices: Vec<usize>) -> Selector {
        self.distribution = Some(Distribution {
            full_len,
            local_indices,
        });
        self
    }

    fn unchanged(&self) -> (Selector, bool) {
        (
            self.clone().with_distribution(self.len(), identity(self.len())),
            false,
        )
    }

    fn loc_ids_defined(&self) -> bool {
        self.metadata()
            .get(LOC_ID_KEY)
            .is_some_and(|ids| ids.iter().all(|v| !matches!(v, Value::None)))
    }

    fn distribute_node(
        &self,
        sim: &dyn Simulation,
        ctx: &ProcessContext,
    ) -> Result<(Selector, bool), SelectorError> {
        let full_len = self.len();
        match &self.node {
            Node::Leaf { path, info } => {
                let Some(owned) = sim.distribute(&path.unrestricted())? else {
                    return Ok(self.unchanged());
                };
                let local: Vec<usize> = match path.subset() {
                    Some(subset) => subset
                        .iter()
                        .enumerate()
                        .filter(|(_, g)| owned.contains(*g))
                        .map(|(i, _)| i)
                        .collect(),
                    None => owned.into_iter().filter(|&i| i < full_len).collect(),
                };
                if local.len() == full_len {
                    return Ok(self.unchanged());
                }
                let sel = self.restricted(&local, |_| Node::Leaf {
                    path: path.restricted(&local),
                    info: info.clone(),
                });
                Ok((sel.with_distribution(full_len, local), true))
            }
            Node::Concat(children) => {
                let mut new_children = Vec::with_capacity(children.len());
                let mut local = Vec::new();
                let mut offset = 0;
                let mut changed = false;
                for c in children {
                    let (nc, c_changed) = c.distribute_node(sim, ctx)?;
                    if let Some(d) = &nc.distribution {
                        local.extend(d.local_indices.iter().map(|i| offset + i));
                    }
                    offset += c.len();
                    changed |= c_changed;
                    new_children.push(nc);
                }
                let sel = self.restricted(&local, |_| Node::Concat(new_children));
                Ok((sel.with_distribution(full_len, local), changed))
            }
            Node::Scalar { .. } | Node::Binary { .. } | Node::Aggregate { .. }
                if self.loc_ids_defined() =>
            {
                match self.distribute_combine(sim, ctx)? {
                    Some(result) => Ok(result),
                    None => Ok(self.kept_on_coordinator(ctx)),
                }
            }
            Node::Scalar { .. } | Node::Binary { .. } | Node::Aggregate { .. } => {
                Ok(self.kept_on_coordinator(ctx))
            }
            Node::Remote => Ok(self.unchanged()),
        }
    }

    fn kept_on_coordinator(&self, ctx: &ProcessContext) -> (Selector, bool) {
        if ctx.is_coordinator() {
            self.unchanged()
        } else {
            let sel = self.restricted(&[], |_| Node::Remote);
            (sel.with_distribution(self.len(), Vec::new()), true)
        }
    }

    /// Distribute the operands of a combinator, or `None` when the operation
    /// cannot follow its operands (broadcasts).
    fn distribute_combine(
        &self,
        sim: &dyn Simulation,
        ctx: &ProcessContext,
    ) -> Result<Option<(Selector, bool)>, SelectorError> {
        let full_len = self.len();
        let (node, local, changed) = match &self.node {
            Node::Scalar {
                op,
                num,
                num_left,
                child,
            } => {
                let (c, changed) = child.distribute_node(sim, ctx)?;
                let local = c.local_indices();
                let node = Node::Scalar {
                    op: *op,
                    num: *num,
                    num_left: *num_left,
                    child: Box::new(c),
                };
                (node, local, changed)
            }
            Node::Binary {
                op,
                shape: Shape::Elementwise,
                left,
                right,
            } => {
                let (l, l_changed) = left.distribute_node(sim, ctx)?;
                let (r, r_changed) = right.distribute_node(sim, ctx)?;
                if l.len() != r.len() {
                    return Err(SelectorError::Shape {
                        op: op.symbol().to_string(),
                        left: l.len(),
                        right: r.len(),
                    });
                }
                let local = l.local_indices();
                let node = Node::Binary {
                    op: *op,
                    shape: Shape::Elementwise,
                    left: Box::new(l),
                    right: Box::new(r),
                };
                (node, local, l_changed || r_changed)
            }
            Node::Aggregate { agg, child } => {
                let (c, changed) = child.distribute_node(sim, ctx)?;
                let local = if c.is_empty() { Vec::new() } else { vec![0] };
                let node = Node::Aggregate {
                    agg: *agg,
                    child: Box::new(c),
                };
                (node, local, changed)
            }
            _ => return Ok(None),
        };
        if !changed {
            return Ok(Some(self.unchanged()));
        }
        let sel = self.restricted(&local, |_| node);
        Ok(Some((sel.with_distribution(full_len, local), true)))
    }

    fn local_indices(&self) -> Vec<usize> {
        match &self.distribution {
            Some(d) => d.local_indices.clone(),
            None => identity(self.len()),
        }
    }
}
