//! Arithmetic operators and aggregate reducers.

use crate::selector::Selector;

/// Binary arithmetic operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `**`
    Pow,
}

impl BinOp {
    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "**",
        }
    }

    /// Apply to a left and a right operand.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Pow => a.powf(b),
        }
    }

    /// Render `({l} op {r})`.
    pub fn format(self, l: &str, r: &str) -> String {
        format!("({l} {} {r})", self.symbol())
    }
}

/// Reducer folding every value of a selector into one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Agg {
    /// Sum of all values.
    Sum,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
}

impl Agg {
    /// Upper-case name used in labels.
    pub fn name(self) -> &'static str {
        match self {
            Agg::Sum => "SUM",
            Agg::Min => "MIN",
            Agg::Max => "MAX",
        }
    }

    /// Separator between argument descriptions in labels.
    pub fn separator(self) -> &'static str {
        match self {
            Agg::Sum => " + ",
            Agg::Min | Agg::Max => ", ",
        }
    }

    /// Fold `values`.
    pub fn fold(self, values: &[f64]) -> f64 {
        match self {
            Agg::Sum => values.iter().sum(),
            Agg::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Agg::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Render `NAME(a, b)` over argument descriptions.
    pub fn format<S: AsRef<str>>(self, args: &[S]) -> String {
        let joined = args
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(self.separator());
        format!("{}({joined})", self.name())
    }
}

/// Right-hand side of a binary operation: another selector or a number.
#[derive(Clone, Copy, Debug)]
pub enum Operand<'a> {
    /// Another selector.
    Sel(&'a Selector),
    /// A constant.
    Num(f64),
}

impl<'a> From<&'a Selector> for Operand<'a> {
    fn from(s: &'a Selector) -> Self {
        Operand::Sel(s)
    }
}

impl From<f64> for Operand<'_> {
    fn from(x: f64) -> Self {
        Operand::Num(x)
    }
}

impl From<i32> for Operand<'_> {
    fn from(x: i32) -> Self {
        Operand::Num(x as f64)
    }
}

/// How the two operands of a selector-selector operation line up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// Equal lengths, column by column.
    Elementwise,
    /// Left operand has one column, repeated against every right column.
    BroadcastLeft,
    /// Right operand has one column, repeated against every left column.
    BroadcastRight,
}

impl Shape {
    /// Pick the shape for operand lengths, or `None` if they don't fit.
    ///
    /// A length-1 right operand always broadcasts, so `1 op 1` is a plain
    /// scalar operation in operand order.
    pub fn of(left: usize, right: usize) -> Option<Shape> {
        if right == 1 {
            Some(Shape::BroadcastRight)
        } else if left == 1 {
            Some(Shape::BroadcastLeft)
        } else if left == right {
            Some(Shape::Elementwise)
        } else {
            None
        }
    }

    /// Output length for operand lengths.
    pub fn output_len(self, left: usize, right: usize) -> usize {
        match self {
            Shape::Elementwise | Shape::BroadcastRight => left,
            Shape::BroadcastLeft => right,
        }
    }

    /// Aligned `(left, right)` column per output column.
    pub fn pairs(self, left: usize, right: usize) -> Vec<(usize, usize)> {
        match self {
            Shape::Elementwise => (0..left).map(|i| (i, i)).collect(),
            Shape::BroadcastRight => (0..left).map(|i| (i, 0)).collect(),
            Shape::BroadcastLeft => (0..right).map(|i| (0, i)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates() {
        assert_eq!(BinOp::Pow.format("a", "2"), "(a ** 2)");
        assert_eq!(Agg::Sum.format(&["a", "b"]), "SUM(a + b)");
        assert_eq!(Agg::Max.format(&["a", "b"]), "MAX(a, b)");
    }

    #[test]
    fn folds() {
        assert_eq!(Agg::Sum.fold(&[1.0, 2.0, 3.5]), 6.5);
        assert_eq!(Agg::Min.fold(&[3.0, -1.0]), -1.0);
        assert_eq!(Agg::Max.fold(&[3.0, -1.0]), 3.0);
        assert_eq!(BinOp::Pow.apply(2.0, 3.0), 8.0);
    }

    #[test]
    fn shape_selection() {
        assert_eq!(Shape::of(1, 1), Some(Shape::BroadcastRight));
        assert_eq!(Shape::of(1, 4), Some(Shape::BroadcastLeft));
        assert_eq!(Shape::of(4, 1), Some(Shape::BroadcastRight));
        assert_eq!(Shape::of(3, 3), Some(Shape::Elementwise));
        assert_eq!(Shape::of(2, 3), None);
        assert_eq!(Shape::BroadcastLeft.output_len(1, 4), 4);
        assert_eq!(Shape::BroadcastLeft.pairs(1, 2), vec![(0, 0), (0, 1)]);
    }
}
