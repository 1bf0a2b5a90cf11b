//! The selector expression tree.

use recap_core::{IntoSimPath, MetaData, PathInfo, Schema, SelectorId, SimInstanceId, SimPath,
    Simulation, Value};

use crate::error::SelectorError;
use crate::header::Header;
use crate::metadata::{self, PROPERTY_KEY};
use crate::ops::{Agg, BinOp, Operand, Shape};
use crate::plan::EvalContext;

/// Columns kept by a distributed selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Distribution {
    /// Length before distribution.
    pub full_len: usize,
    /// Global columns kept locally, in local order.
    pub local_indices: Vec<usize>,
}

#[derive(Clone, Debug)]
pub(crate) enum Node {
    Leaf {
        path: SimPath,
        info: PathInfo,
    },
    Scalar {
        op: BinOp,
        num: f64,
        num_left: bool,
        child: Box<Selector>,
    },
    Binary {
        op: BinOp,
        shape: Shape,
        left: Box<Selector>,
        right: Box<Selector>,
    },
    Aggregate {
        agg: Agg,
        child: Box<Selector>,
    },
    Concat(Vec<Selector>),
    /// Values live on another rank; evaluates to nothing here.
    Remote,
}

/// A derived quantity captured at every save event.
///
/// Built from leaves ([`Selector::leaf`]) with arithmetic
/// ([`add`](Self::add), [`sub`](Self::sub), ...), aggregates
/// ([`Selector::sum`], [`Selector::min`], [`Selector::max`]) and
/// concatenation ([`Selector::join`], [`concat`](Self::concat)). A selector
/// is complete by construction; its length, labels and metadata are fixed
/// when it is built and frozen once saving starts.
#[derive(Clone, Debug)]
pub struct Selector {
    sim: SimInstanceId,
    pub(crate) node: Node,
    pub(crate) header: Header,
    pub(crate) distribution: Option<Distribution>,
}

fn num_str(x: f64) -> String {
    x.to_string()
}

fn leaf_value_name(label: &str) -> Option<String> {
    match label.split_once('.') {
        Some((_, rest)) => Some(rest.to_string()),
        None => Some(label.to_string()),
    }
}

impl Selector {
    /// Bind a path to `sim`.
    ///
    /// Labels and automatic metadata come from
    /// [`Simulation::describe`]; every column also gets a `property`
    /// metadata entry naming the terminal property.
    pub fn leaf(sim: &dyn Simulation, path: impl IntoSimPath) -> Result<Selector, SelectorError> {
        let path = path
            .into_sim_path()
            .map_err(|b| SelectorError::Incomplete {
                path: b.to_string(),
            })?;
        let full = path.unrestricted();
        let info = sim.describe(&full)?;
        let sel = Self::leaf_from_info(sim.instance_id(), full, info);
        let subset = path.subset().map(<[usize]>::to_vec);
        Ok(match subset {
            Some(subset) => sel.restricted(&subset, |s| Node::Leaf {
                path,
                info: s.leaf_info().cloned().unwrap_or_default(),
            }),
            None => sel,
        })
    }

    fn leaf_from_info(sim: SimInstanceId, path: SimPath, info: PathInfo) -> Selector {
        let len = info.labels.len();
        let mut metadata = info.metadata.clone();
        metadata.insert(
            PROPERTY_KEY.to_string(),
            vec![Value::from(path.property()); len],
        );
        let value_names = info.labels.iter().map(|l| leaf_value_name(l)).collect();
        let header = Header::new(info.labels.clone(), metadata, path.to_string(), value_names);
        Selector {
            sim,
            node: Node::Leaf { path, info },
            header,
            distribution: None,
        }
    }

    fn leaf_info(&self) -> Option<&PathInfo> {
        match &self.node {
            Node::Leaf { info, .. } => Some(info),
            _ => None,
        }
    }

    /// Simulation instance this selector belongs to.
    pub fn sim_id(&self) -> SimInstanceId {
        self.sim
    }

    /// Number of values produced per event.
    pub fn len(&self) -> usize {
        self.header.len()
    }

    /// Whether the selector produces no value (e.g. a remote-only part).
    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    /// One label per column.
    pub fn labels(&self) -> &[String] {
        self.header.labels()
    }

    /// Per-column metadata.
    pub fn metadata(&self) -> &MetaData {
        self.header.metadata()
    }

    /// Description.
    pub fn description(&self) -> &str {
        self.header.description()
    }

    /// Short per-column value names, `None` where no name applies.
    pub fn value_names(&self) -> &[Option<String>] {
        self.header.value_names()
    }

    /// Header with labels, metadata and description.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Distribution info, once distributed.
    pub fn distribution(&self) -> Option<&Distribution> {
        self.distribution.as_ref()
    }

    /// Whether this selector is a plain concatenation.
    pub fn is_concat(&self) -> bool {
        matches!(self.node, Node::Concat(_))
    }

    /// Replace the labels. Fails once saving started.
    pub fn set_labels(&mut self, labels: Vec<String>) -> Result<(), SelectorError> {
        self.header.set_labels(labels)?;
        if matches!(self.node, Node::Leaf { .. }) {
            self.header.value_names = self.header.labels.iter().map(|l| leaf_value_name(l)).collect();
        }
        Ok(())
    }

    /// Replace the description. Fails once saving started.
    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), SelectorError> {
        self.header.set_description(description)
    }

    /// Set a user metadata key. Fails once saving started.
    pub fn set_metadata(
        &mut self,
        key: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<(), SelectorError> {
        self.header.set_metadata(key, values)
    }

    /// Forbid further changes to labels, metadata and description.
    pub fn freeze(&mut self) {
        self.header.freeze();
    }

    /// Schema handed to backends.
    pub fn schema(&self, index: SelectorId) -> Schema {
        self.header.schema(index)
    }

    fn check_compatible(&self, other: &Selector) -> Result<(), SelectorError> {
        if self.sim != other.sim {
            return Err(SelectorError::Incompatible);
        }
        Ok(())
    }

    // ── Arithmetic ──────────────────────────────────────────────

    fn scalar_op(&self, op: BinOp, num: f64, num_left: bool) -> Selector {
        let n = num_str(num);
        let fmt = |s: &str| {
            if num_left {
                op.format(&n, s)
            } else {
                op.format(s, &n)
            }
        };
        let labels = self.labels().iter().map(|l| fmt(l)).collect();
        let value_names = self
            .value_names()
            .iter()
            .map(|v| v.as_deref().map(|s| fmt(s)))
            .collect();
        let header = Header::new(
            labels,
            self.metadata().clone(),
            fmt(self.description()),
            value_names,
        );
        Selector {
            sim: self.sim,
            node: Node::Scalar {
                op,
                num,
                num_left,
                child: Box::new(self.clone()),
            },
            header,
            distribution: None,
        }
    }

    fn binary_op(&self, op: BinOp, other: &Selector) -> Result<Selector, SelectorError> {
        self.check_compatible(other)?;
        let (l, r) = (self.len(), other.len());
        let shape = Shape::of(l, r).ok_or_else(|| SelectorError::Shape {
            op: op.symbol().to_string(),
            left: l,
            right: r,
        })?;
        let pairs = shape.pairs(l, r);
        let labels = pairs
            .iter()
            .map(|&(i, j)| op.format(&self.labels()[i], &other.labels()[j]))
            .collect();
        let value_names = pairs
            .iter()
            .map(|&(i, j)| match (&self.value_names()[i], &other.value_names()[j]) {
                (Some(a), Some(b)) => Some(op.format(a, b)),
                _ => None,
            })
            .collect();
        let metadata = metadata::aligned(self.metadata(), l, other.metadata(), r, &pairs);
        let header = Header::new(
            labels,
            metadata,
            op.format(self.description(), other.description()),
            value_names,
        );
        Ok(Selector {
            sim: self.sim,
            node: Node::Binary {
                op,
                shape,
                left: Box::new(self.clone()),
                right: Box::new(other.clone()),
            },
            header,
            distribution: None,
        })
    }

    fn apply(&self, op: BinOp, rhs: Operand<'_>, reflected: bool) -> Result<Selector, SelectorError> {
        match (rhs, reflected) {
            (Operand::Num(x), _) => Ok(self.scalar_op(op, x, reflected)),
            (Operand::Sel(other), false) => self.binary_op(op, other),
            (Operand::Sel(other), true) => other.binary_op(op, self),
        }
    }

    /// `self + rhs`.
    pub fn add<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Add, rhs.into(), false)
    }

    /// `self - rhs`.
    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Sub, rhs.into(), false)
    }

    /// `self * rhs`.
    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Mul, rhs.into(), false)
    }

    /// `self / rhs`.
    pub fn div<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Div, rhs.into(), false)
    }

    /// `self ** rhs`.
    pub fn pow<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Pow, rhs.into(), false)
    }

    /// `lhs + self`.
    pub fn radd<'a>(&self, lhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Add, lhs.into(), true)
    }

    /// `lhs - self`.
    pub fn rsub<'a>(&self, lhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Sub, lhs.into(), true)
    }

    /// `lhs * self`.
    pub fn rmul<'a>(&self, lhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Mul, lhs.into(), true)
    }

    /// `lhs / self`.
    pub fn rdiv<'a>(&self, lhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Div, lhs.into(), true)
    }

    /// `lhs ** self`.
    pub fn rpow<'a>(&self, lhs: impl Into<Operand<'a>>) -> Result<Selector, SelectorError> {
        self.apply(BinOp::Pow, lhs.into(), true)
    }

    // ── Aggregates and concatenation ────────────────────────────

    fn aggregate(agg: Agg, sel: &Selector) -> Selector {
        let label = agg.format(&[sel.description()]);
        let header = Header::new(
            vec![label.clone()],
            metadata::identical(sel.metadata()),
            label,
            vec![None],
        );
        Selector {
            sim: sel.sim,
            node: Node::Aggregate {
                agg,
                child: Box::new(sel.clone()),
            },
            header,
            distribution: None,
        }
    }

    /// Sum of every value of `sel`.
    pub fn sum(sel: &Selector) -> Selector {
        Self::aggregate(Agg::Sum, sel)
    }

    /// Smallest value of `sel`.
    pub fn min(sel: &Selector) -> Selector {
        Self::aggregate(Agg::Min, sel)
    }

    /// Largest value of `sel`.
    pub fn max(sel: &Selector) -> Selector {
        Self::aggregate(Agg::Max, sel)
    }

    pub(crate) fn from_children(sim: SimInstanceId, children: Vec<Selector>) -> Selector {
        let labels = children
            .iter()
            .flat_map(|c| c.labels().iter().cloned())
            .collect();
        let value_names = children
            .iter()
            .flat_map(|c| c.value_names().iter().cloned())
            .collect();
        let metadata = metadata::concat(children.iter().map(|c| (c.metadata(), c.len())));
        let description = children
            .iter()
            .map(|c| c.description())
            .collect::<Vec<_>>()
            .join(", ");
        Selector {
            sim,
            header: Header::new(labels, metadata, description, value_names),
            node: Node::Concat(children),
            distribution: None,
        }
    }

    /// Concatenate any number of compatible selectors.
    pub fn join(selectors: &[Selector]) -> Result<Selector, SelectorError> {
        let first = selectors.first().ok_or(SelectorError::EmptyJoin)?;
        for s in &selectors[1..] {
            first.check_compatible(s)?;
        }
        Ok(Self::from_children(first.sim, selectors.to_vec()))
    }

    /// `self << other`: two-selector concatenation.
    ///
    /// Flattens when `self` is already a plain concatenation, and when
    /// `other` is one as well.
    pub fn concat(&self, other: &Selector) -> Result<Selector, SelectorError> {
        self.check_compatible(other)?;
        let mut children = match &self.node {
            Node::Concat(c) => c.clone(),
            _ => vec![self.clone()],
        };
        match &other.node {
            Node::Concat(c) if self.is_concat() => children.extend(c.iter().cloned()),
            _ => children.push(other.clone()),
        }
        Ok(Self::from_children(self.sim, children))
    }

    // ── Evaluation ──────────────────────────────────────────────

    /// Values of this selector for the event of `ctx`.
    pub fn evaluate(&self, ctx: &mut EvalContext<'_>) -> Result<Vec<f64>, SelectorError> {
        if ctx.sim().instance_id() != self.sim {
            return Err(SelectorError::Incompatible);
        }
        match &self.node {
            Node::Leaf { path, .. } => ctx.query(path),
            Node::Scalar {
                op,
                num,
                num_left,
                child,
            } => {
                let vals = child.evaluate(ctx)?;
                Ok(vals
                    .into_iter()
                    .map(|v| {
                        if *num_left {
                            op.apply(*num, v)
                        } else {
                            op.apply(v, *num)
                        }
                    })
                    .collect())
            }
            Node::Binary {
                op,
                shape,
                left,
                right,
            } => {
                let l = left.evaluate(ctx)?;
                let r = right.evaluate(ctx)?;
                shape
                    .pairs(l.len(), r.len())
                    .into_iter()
                    .map(|(i, j)| match (l.get(i), r.get(j)) {
                        (Some(a), Some(b)) => Ok(op.apply(*a, *b)),
                        _ => Err(SelectorError::Shape {
                            op: op.symbol().to_string(),
                            left: l.len(),
                            right: r.len(),
                        }),
                    })
                    .collect()
            }
            Node::Aggregate { agg, child } => {
                let vals = child.evaluate(ctx)?;
                Ok(vec![agg.fold(&vals)])
            }
            Node::Concat(children) => {
                let mut out = Vec::with_capacity(self.len());
                for c in children {
                    out.extend(c.evaluate(ctx)?);
                }
                Ok(out)
            }
            Node::Remote => Ok(Vec::new()),
        }
    }

    /// Leaf paths reachable from this selector, in evaluation order.
    pub fn leaf_paths(&self) -> Vec<&SimPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'s>(&'s self, out: &mut Vec<&'s SimPath>) {
        match &self.node {
            Node::Leaf { path, .. } => out.push(path),
            Node::Scalar { child, .. } | Node::Aggregate { child, .. } => {
                child.collect_paths(out)
            }
            Node::Binary { left, right, .. } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
            Node::Concat(children) => children.iter().for_each(|c| c.collect_paths(out)),
            Node::Remote => {}
        }
    }

    /// Copy with a new node, keeping only `indices` of the current columns.
    pub(crate) fn restricted<F>(&self, indices: &[usize], node: F) -> Selector
    where
        F: FnOnce(&Selector) -> Node,
    {
        let pick = |i: usize| self.header.labels.get(i).cloned().unwrap_or_default();
        let mut header = Header::new(
            indices.iter().map(|&i| pick(i)).collect(),
            metadata::restrict(&self.header.metadata, indices),
            self.header.description.clone(),
            indices
                .iter()
                .map(|&i| self.header.value_names.get(i).cloned().flatten())
                .collect(),
        );
        header.frozen = self.header.frozen;
        Selector {
            sim: self.sim,
            node: node(self),
            header,
            distribution: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::EvalContext;
    use recap_core::{path, RunId, StateHint};
    use recap_test_utils::MockSimulation;

    fn ctx(sim: &MockSimulation) -> EvalContext<'_> {
        EvalContext::new(sim, StateHint::new(RunId(0), 0))
    }

    #[test]
    fn leaf_labels_and_property() {
        let sim = MockSimulation::new();
        let s = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count")).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.labels(), ["comp1.A.Count"]);
        assert_eq!(s.description(), "comp1.A.Count");
        assert_eq!(s.metadata()["property"], vec![Value::from("Count")]);
        assert_eq!(s.value_names(), [Some("A.Count".to_string())]);
    }

    #[test]
    fn incomplete_leaf_is_rejected() {
        let sim = MockSimulation::new();
        let err = Selector::leaf(&sim, path().member("comp1").member("A")).unwrap_err();
        assert_eq!(
            err,
            SelectorError::Incomplete {
                path: "comp1.A".into()
            }
        );
    }

    #[test]
    fn scalar_scalar_ops() {
        let sim = MockSimulation::new();
        let a = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count")).unwrap();
        let b = Selector::leaf(&sim, path().member("comp1").member("B").terminal("Count")).unwrap();
        let mut c = ctx(&sim);
        let av = a.evaluate(&mut c).unwrap()[0];
        let bv = b.evaluate(&mut c).unwrap()[0];

        let cases: [(Selector, f64); 10] = [
            (a.add(&b).unwrap(), av + bv),
            (a.sub(&b).unwrap(), av - bv),
            (a.mul(&b).unwrap(), av * bv),
            (a.div(&b).unwrap(), av / bv),
            (a.pow(&b).unwrap(), av.powf(bv)),
            (a.radd(&b).unwrap(), bv + av),
            (a.rsub(&b).unwrap(), bv - av),
            (a.rmul(&b).unwrap(), bv * av),
            (a.rdiv(&b).unwrap(), bv / av),
            (a.rpow(&b).unwrap(), bv.powf(av)),
        ];
        for (sel, expected) in cases {
            assert_eq!(sel.len(), 1);
            assert_eq!(sel.evaluate(&mut c).unwrap(), vec![expected]);
        }
        assert_eq!(a.sub(&b).unwrap().labels(), ["(comp1.A.Count - comp1.B.Count)"]);
        assert_eq!(a.rsub(&b).unwrap().labels(), ["(comp1.B.Count - comp1.A.Count)"]);
    }

    #[test]
    fn number_operands() {
        let sim = MockSimulation::new();
        let a = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count")).unwrap();
        let mut c = ctx(&sim);
        let av = a.evaluate(&mut c).unwrap()[0];
        let s = a.rsub(10.0).unwrap();
        assert_eq!(s.labels(), ["(10 - comp1.A.Count)"]);
        assert_eq!(s.evaluate(&mut c).unwrap(), vec![10.0 - av]);
        assert_eq!(s.metadata(), a.metadata());
        let p = a.pow(2).unwrap();
        assert_eq!(p.description(), "(comp1.A.Count ** 2)");
        assert_eq!(p.evaluate(&mut c).unwrap(), vec![av * av]);
    }

    #[test]
    fn broadcast_either_side() {
        let sim = MockSimulation::new();
        let tets = Selector::leaf(
            &sim,
            path().call("TETS", vec![0.into(), 1.into(), 2.into()]).member("A").terminal("Count"),
        )
        .unwrap();
        let one = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count")).unwrap();
        let mut c = ctx(&sim);
        let tv = tets.evaluate(&mut c).unwrap();
        let ov = one.evaluate(&mut c).unwrap()[0];

        let right = tets.mul(&one).unwrap();
        assert_eq!(right.len(), 3);
        assert_eq!(
            right.evaluate(&mut c).unwrap(),
            tv.iter().map(|v| v * ov).collect::<Vec<_>>()
        );

        let left = one.sub(&tets).unwrap();
        assert_eq!(left.len(), 3);
        assert_eq!(
            left.evaluate(&mut c).unwrap(),
            tv.iter().map(|v| ov - v).collect::<Vec<_>>()
        );
        assert_eq!(left.labels()[0], format!("(comp1.A.Count - {})", tets.labels()[0]));
    }

    #[test]
    fn incompatible_lengths() {
        let sim = MockSimulation::new();
        let two = Selector::leaf(
            &sim,
            path().call("TETS", vec![0.into(), 1.into()]).member("A").terminal("Count"),
        )
        .unwrap();
        let three = Selector::leaf(
            &sim,
            path().call("TETS", vec![0.into(), 1.into(), 2.into()]).member("A").terminal("Count"),
        )
        .unwrap();
        assert_eq!(
            two.add(&three).unwrap_err(),
            SelectorError::Shape {
                op: "+".into(),
                left: 2,
                right: 3
            }
        );
    }

    #[test]
    fn short_operand_at_evaluation_is_a_shape_error() {
        let sim = MockSimulation::new();
        let three = Selector::leaf(
            &sim,
            path().call("TETS", vec![0.into(), 1.into(), 2.into()]).member("A").terminal("Count"),
        )
        .unwrap();
        let one = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count")).unwrap();
        // Declared as three columns but the simulation answers with one value.
        let mut short = three.clone();
        short.node = one.node.clone();
        let sum = three.add(&three).unwrap();
        let mut broken = sum.clone();
        broken.node = Node::Binary {
            op: BinOp::Add,
            shape: Shape::Elementwise,
            left: Box::new(three.clone()),
            right: Box::new(short),
        };
        let mut c = ctx(&sim);
        assert_eq!(sum.evaluate(&mut c).unwrap().len(), 3);
        assert_eq!(
            broken.evaluate(&mut c).unwrap_err(),
            SelectorError::Shape {
                op: "+".into(),
                left: 3,
                right: 1
            }
        );
    }

    #[test]
    fn different_simulations_do_not_mix() {
        let sim1 = MockSimulation::new();
        let sim2 = MockSimulation::new();
        let a = Selector::leaf(&sim1, path().member("comp1").member("A").terminal("Count")).unwrap();
        let b = Selector::leaf(&sim2, path().member("comp1").member("A").terminal("Count")).unwrap();
        assert_eq!(a.add(&b).unwrap_err(), SelectorError::Incompatible);
        assert_eq!(a.concat(&b).unwrap_err(), SelectorError::Incompatible);
        assert_eq!(
            Selector::join(&[a.clone(), b]).unwrap_err(),
            SelectorError::Incompatible
        );
        let mut c = ctx(&sim2);
        assert_eq!(a.evaluate(&mut c).unwrap_err(), SelectorError::Incompatible);
    }

    #[test]
    fn aggregates() {
        let sim = MockSimulation::new();
        let tets = Selector::leaf(
            &sim,
            path().call("TETS", vec![0.into(), 1.into(), 2.into()]).member("A").terminal("Count"),
        )
        .unwrap();
        let mut c = ctx(&sim);
        let tv = tets.evaluate(&mut c).unwrap();
        let s = Selector::sum(&tets);
        assert_eq!(s.len(), 1);
        assert_eq!(s.labels(), [format!("SUM({})", tets.description())]);
        assert_eq!(s.evaluate(&mut c).unwrap(), vec![tv.iter().sum::<f64>()]);
        assert_eq!(s.metadata()["property"], vec![Value::from("Count")]);
        assert!(!s.metadata().contains_key("loc_id"));
        assert_eq!(s.value_names(), [None]);

        let mn = Selector::min(&tets).evaluate(&mut c).unwrap()[0];
        let mx = Selector::max(&tets).evaluate(&mut c).unwrap()[0];
        assert!(mn <= mx);
        assert_eq!(Selector::max(&tets).description(), format!("MAX({})", tets.description()));
    }

    #[test]
    fn join_and_concat() {
        let sim = MockSimulation::new();
        let a = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count")).unwrap();
        let b = Selector::leaf(&sim, path().member("comp1").member("B").terminal("Count")).unwrap();
        let t = Selector::leaf(
            &sim,
            path().call("TETS", vec![0.into(), 1.into()]).member("A").terminal("Count"),
        )
        .unwrap();
        let mut c = ctx(&sim);

        let j = Selector::join(&[a.clone(), t.clone()]).unwrap();
        assert_eq!(j.len(), a.len() + t.len());
        let mut expected = a.evaluate(&mut c).unwrap();
        expected.extend(t.evaluate(&mut c).unwrap());
        assert_eq!(j.evaluate(&mut c).unwrap(), expected);
        assert_eq!(j.description(), format!("{}, {}", a.description(), t.description()));

        let chained = a.concat(&b).unwrap().concat(&t).unwrap();
        assert_eq!(chained.len(), 4);
        match &chained.node {
            Node::Concat(children) => assert_eq!(children.len(), 3),
            other => panic!("expected a flat concat, got {other:?}"),
        }
        assert_eq!(Selector::join(&[]).unwrap_err(), SelectorError::EmptyJoin);
    }

    #[test]
    fn concat_fills_missing_metadata() {
        let sim = MockSimulation::new();
        let mut a = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count")).unwrap();
        let b = Selector::leaf(&sim, path().member("comp1").member("B").terminal("Count")).unwrap();
        a.set_metadata("unit", vec!["mol".into()]).unwrap();
        let j = a.concat(&b).unwrap();
        assert_eq!(j.metadata()["unit"], vec![Value::from("mol"), Value::None]);
    }

    #[test]
    fn frozen_selector_rejects_labels() {
        let sim = MockSimulation::new();
        let mut a = Selector::leaf(&sim, path().member("comp1").member("A").terminal("Count")).unwrap();
        a.set_labels(vec!["A".into()]).unwrap();
        a.freeze();
        assert_eq!(
            a.set_labels(vec!["B".into()]),
            Err(SelectorError::Frozen { what: "labels" })
        );
    }
}
