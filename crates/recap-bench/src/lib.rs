//! Benchmark fixtures for the recap result-capture engine.
//!
//! - [`nested_value`]: deterministic compound value of a given depth
//! - [`reference_selectors`]: selectors over the mock mesh sharing leaf
//!   queries, as a typical save schedule does

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use indexmap::IndexMap;
use recap_core::{path, Value};
use recap_selector::{Selector, SelectorError};
use recap_test_utils::MockSimulation;

/// Build a nested value: a mapping of `width` entries per level, alternating
/// numeric lists, strings and deeper mappings down to `depth` levels.
pub fn nested_value(depth: usize, width: usize) -> Value {
    if depth == 0 {
        return Value::List((0..width as i64).map(Value::Int).collect());
    }
    let mut map = IndexMap::with_capacity(width);
    for i in 0..width {
        let v = match i % 3 {
            0 => Value::List((0..8).map(|k| Value::Float(k as f64 * 0.5)).collect()),
            1 => Value::Str(format!("level{depth}_item{i}")),
            _ => nested_value(depth - 1, width),
        };
        map.insert(format!("k{i}"), v);
    }
    Value::Map(map)
}

/// Selectors over every tet of the mock mesh.
///
/// Returns the per-tet counts of `A` and `B`, their elementwise ratio, the
/// total of `A` and the concatenation of both counts: five selectors built
/// from two distinct leaf paths.
pub fn reference_selectors(sim: &MockSimulation) -> Result<Vec<Selector>, SelectorError> {
    let ids: Vec<Value> = (0..6i64).map(Value::from).collect();
    let a = Selector::leaf(
        sim,
        path().call("TETS", ids.clone()).member("A").terminal("Count"),
    )?;
    let b = Selector::leaf(sim, path().call("TETS", ids).member("B").terminal("Count"))?;
    let ratio = a.div(&b)?;
    let total = Selector::sum(&a);
    let both = a.concat(&b)?;
    Ok(vec![a, b, ratio, total, both])
}
