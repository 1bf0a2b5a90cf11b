//! Property tests: any nested value up to depth 5 survives an encode and
//! decode, and re-encoding a cached value never grows the storage.

use indexmap::IndexMap;
use proptest::prelude::*;
use recap_core::Value;
use recap_encode::{CompoundStorage, Encoder, EncoderConfig, VecStorage};

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<i64>().prop_map(Value::Int),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-zA-Z0-9 éß]{0,8}".prop_map(Value::Str),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(5, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::vec(("[a-z]{0,4}", inner), 0..5)
                .prop_map(|kv| Value::Map(kv.into_iter().collect::<IndexMap<_, _>>())),
        ]
    })
}

/// Numeric lists with any float come back as all-float lists.
fn normalize(v: &Value) -> Value {
    match v {
        Value::List(items) => {
            let all_num = items.iter().all(Value::is_number);
            let any_float = items.iter().any(|x| matches!(x, Value::Float(_)));
            if all_num && any_float {
                Value::List(
                    items
                        .iter()
                        .map(|x| Value::Float(x.as_f64().unwrap_or_default()))
                        .collect(),
                )
            } else {
                Value::List(items.iter().map(normalize).collect())
            }
        }
        Value::Map(m) => {
            let values = normalize(&Value::List(m.values().cloned().collect()));
            let Value::List(values) = values else {
                unreachable!()
            };
            Value::Map(m.keys().cloned().zip(values).collect())
        }
        other => other.clone(),
    }
}

proptest! {
    #[test]
    fn read_after_write_is_identity(v in arb_value()) {
        let mut enc = Encoder::open(VecStorage::new(), EncoderConfig::new());
        let h = enc.write(&v).unwrap();
        prop_assert_eq!(enc.read(h), normalize(&v));
    }

    #[test]
    fn uncached_roundtrip(v in arb_value()) {
        let mut enc = Encoder::open(VecStorage::new(), EncoderConfig::uncached());
        let h = enc.write(&v).unwrap();
        prop_assert_eq!(enc.read(h), normalize(&v));
    }

    #[test]
    fn rewriting_compound_values_is_free(
        v in prop::collection::vec(arb_value(), 1..4).prop_map(|mut items| {
            // A string head keeps the value a heterogeneous list.
            items.insert(0, Value::from("head"));
            Value::List(items)
        })
    ) {
        let mut enc = Encoder::open(VecStorage::new(), EncoderConfig::new());
        let first = enc.write(&v).unwrap();
        let size = enc.storage().stored_len();
        let second = enc.write(&v).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(enc.storage().stored_len(), size);
    }
}
