//! Canonical deduplication keys.

use recap_core::Value;

/// Hashable structural key of a value.
///
/// Numeric lists containing any float are keyed as all-float, matching
/// how they are stored, so a key computed before writing equals the key
/// of the value read back.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    Nil,
    Int(i64),
    Float(u64),
    Str(String),
    Seq(Vec<CacheKey>),
    Map(Box<CacheKey>, Box<CacheKey>),
}

/// Whether a list is stored as one contiguous numeric range.
pub(crate) fn numeric_list(items: &[Value]) -> Option<bool> {
    if items.iter().all(Value::is_number) {
        Some(items.iter().any(|v| matches!(v, Value::Float(_))))
    } else {
        None
    }
}

pub(crate) fn key_of(v: &Value) -> CacheKey {
    match v {
        Value::None => CacheKey::Nil,
        Value::Int(i) => CacheKey::Int(*i),
        Value::Float(x) => CacheKey::Float(x.to_bits()),
        Value::Str(s) => CacheKey::Str(s.clone()),
        Value::List(items) => match numeric_list(items) {
            Some(true) => CacheKey::Seq(
                items
                    .iter()
                    .map(|x| CacheKey::Float(x.as_f64().unwrap_or_default().to_bits()))
                    .collect(),
            ),
            _ => CacheKey::Seq(items.iter().map(key_of).collect()),
        },
        Value::Map(m) => {
            let keys = m.keys().map(|k| CacheKey::Str(k.clone())).collect();
            let values = Value::List(m.values().cloned().collect());
            CacheKey::Map(Box::new(CacheKey::Seq(keys)), Box::new(key_of(&values)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_numeric_lists_key_as_floats() {
        let a = Value::List(vec![Value::Int(1), Value::Float(2.5)]);
        let b = Value::List(vec![Value::Float(1.0), Value::Float(2.5)]);
        assert_eq!(key_of(&a), key_of(&b));
        let ints = Value::List(vec![Value::Int(1)]);
        assert_ne!(key_of(&ints), key_of(&Value::List(vec![Value::Float(1.0)])));
    }
}
