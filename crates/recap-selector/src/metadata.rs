//! Metadata derivation rules for combined selectors.

use recap_core::{MetaData, Value};

/// Prefix of metadata keys reserved for backend bookkeeping.
pub const RESERVED_PREFIX: &str = "__recap";

/// Key added by every leaf: the terminal property of each column.
pub const PROPERTY_KEY: &str = "property";

/// Key naming the mesh location kind of a column.
pub const LOC_TYPE_KEY: &str = "loc_type";

/// Key naming the mesh location of a column.
pub const LOC_ID_KEY: &str = "loc_id";

/// Whether `key` is reserved.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Keep only the columns in `indices`, in that order.
pub fn restrict(meta: &MetaData, indices: &[usize]) -> MetaData {
    meta.iter()
        .map(|(k, vals)| {
            let picked = indices
                .iter()
                .map(|&i| vals.get(i).cloned().unwrap_or_default())
                .collect();
            (k.clone(), picked)
        })
        .collect()
}

/// Concatenate child metadata. Keys missing in a child are None-filled.
pub fn concat<'a, I>(children: I) -> MetaData
where
    I: IntoIterator<Item = (&'a MetaData, usize)> + Clone,
{
    let mut keys: Vec<&String> = Vec::new();
    for (meta, _) in children.clone() {
        for k in meta.keys() {
            if !keys.contains(&k) {
                keys.push(k);
            }
        }
    }
    keys.into_iter()
        .map(|k| {
            let mut vals = Vec::new();
            for (meta, len) in children.clone() {
                match meta.get(k) {
                    Some(v) => vals.extend(v.iter().cloned()),
                    None => vals.extend(std::iter::repeat(Value::None).take(len)),
                }
            }
            (k.clone(), vals)
        })
        .collect()
}

/// Metadata of a binary operation.
///
/// `pairs` lists, per output column, the aligned column in the left and
/// right operand. A position keeps its value only if both sides agree; a
/// key with no surviving value is dropped.
pub fn aligned(
    left: &MetaData,
    left_len: usize,
    right: &MetaData,
    right_len: usize,
    pairs: &[(usize, usize)],
) -> MetaData {
    let merged = concat([(left, left_len), (right, right_len)]);
    merged
        .into_iter()
        .filter_map(|(k, vals)| {
            let (l, r) = vals.split_at(left_len.min(vals.len()));
            let out: Vec<Value> = pairs
                .iter()
                .map(|&(i, j)| match (l.get(i), r.get(j)) {
                    (Some(a), Some(b)) if a == b => a.clone(),
                    _ => Value::None,
                })
                .collect();
            out.iter().any(|v| !v.is_none()).then_some((k, out))
        })
        .collect()
}

/// Metadata of an aggregate: a key survives only when every value is
/// identical and defined.
pub fn identical(meta: &MetaData) -> MetaData {
    meta.iter()
        .filter_map(|(k, vals)| {
            let first = vals.first()?;
            (!first.is_none() && vals.iter().all(|v| v == first))
                .then(|| (k.clone(), vec![first.clone()]))
        })
        .collect()
}

/// Whether a user-supplied metadata list contains only scalars.
pub fn is_scalar_list(vals: &[Value]) -> bool {
    vals.iter()
        .all(|v| matches!(v, Value::None | Value::Int(_) | Value::Float(_) | Value::Str(_)))
}
