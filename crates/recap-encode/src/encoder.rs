//! Writing and reading nested values.

use std::collections::HashMap;

use indexmap::IndexMap;
use recap_core::Value;
use tracing::{debug, warn};

use crate::config::EncoderConfig;
use crate::error::EncodeError;
use crate::key::{key_of, numeric_list, CacheKey};
use crate::record::{Kind, Record};
use crate::storage::CompoundStorage;
use crate::NONE_HANDLE;

/// Encoder over a [`CompoundStorage`].
///
/// The deduplication cache is rebuilt when the encoder is opened by
/// replaying every existing record of a cached kind, so reopening a
/// populated store behaves exactly like continuing the original session.
pub struct Encoder<S: CompoundStorage> {
    storage: S,
    config: EncoderConfig,
    cache: HashMap<(Kind, CacheKey), i64>,
}

impl<S: CompoundStorage> Encoder<S> {
    /// Open an encoder over `storage`, indexing its existing records.
    pub fn open(storage: S, config: EncoderConfig) -> Self {
        let mut enc = Self {
            storage,
            config,
            cache: HashMap::new(),
        };
        enc.rebuild_cache();
        enc
    }

    fn rebuild_cache(&mut self) {
        if self.config.cached_kinds.is_empty() {
            return;
        }
        let n = self.storage.record_count();
        for i in 0..n {
            let Some(rec) = self.storage.record(i) else {
                continue;
            };
            if rec.is_scalar() || !self.config.caches(rec.kind) {
                continue;
            }
            let key = key_of(&self.read(i as i64));
            self.cache.entry((rec.kind, key)).or_insert(i as i64);
        }
        debug!(records = n, cached = self.cache.len(), "compound cache rebuilt");
    }

    /// Borrow the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutably borrow the underlying storage.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Consume the encoder, returning its storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Encode `value` and return its handle.
    ///
    /// The absent value maps to [`NONE_HANDLE`] without touching storage.
    pub fn write(&mut self, value: &Value) -> Result<i64, EncodeError> {
        match value {
            Value::None => Ok(NONE_HANDLE),
            Value::Int(i) => {
                let (start, _) = self.storage.push_ints(&[*i])?;
                self.push_scalar(Kind::Int, start)
            }
            Value::Float(x) => {
                let (start, _) = self.storage.push_floats(&[*x])?;
                self.push_scalar(Kind::Float, start)
            }
            Value::Str(s) => self.cached(Kind::Str, value, |st| st.push_bytes(s.as_bytes())),
            Value::List(items) => match numeric_list(items) {
                Some(true) => {
                    let data: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
                    self.cached(Kind::Float, value, |st| st.push_floats(&data))
                }
                Some(false) => {
                    let data: Vec<i64> = items
                        .iter()
                        .filter_map(|v| match v {
                            Value::Int(i) => Some(*i),
                            _ => None,
                        })
                        .collect();
                    self.cached(Kind::Int, value, |st| st.push_ints(&data))
                }
                None => {
                    if let Some(h) = self.lookup(Kind::List, value) {
                        return Ok(h);
                    }
                    let handles = items
                        .iter()
                        .map(|v| self.write(v))
                        .collect::<Result<Vec<_>, _>>()?;
                    let (start, end) = self.storage.push_handles(&handles)?;
                    self.push_cached(Kind::List, value, start, end)
                }
            },
            Value::Map(map) => {
                if let Some(h) = self.lookup(Kind::Dict, value) {
                    return Ok(h);
                }
                let keys = Value::List(map.keys().map(|k| Value::Str(k.clone())).collect());
                let values = Value::List(map.values().cloned().collect());
                let kh = self.write(&keys)?;
                let vh = self.write(&values)?;
                let (start, end) = self.storage.push_handles(&[kh, vh])?;
                self.push_cached(Kind::Dict, value, start, end)
            }
        }
    }

    fn push_scalar(&mut self, kind: Kind, start: i64) -> Result<i64, EncodeError> {
        self.storage.push_record(Record {
            kind,
            start,
            end: -1,
        })
    }

    fn lookup(&self, kind: Kind, value: &Value) -> Option<i64> {
        if !self.config.caches(kind) {
            return None;
        }
        self.cache.get(&(kind, key_of(value))).copied()
    }

    fn cached<F>(&mut self, kind: Kind, value: &Value, push: F) -> Result<i64, EncodeError>
    where
        F: FnOnce(&mut S) -> Result<(i64, i64), EncodeError>,
    {
        if let Some(h) = self.lookup(kind, value) {
            return Ok(h);
        }
        let (start, end) = push(&mut self.storage)?;
        self.push_cached(kind, value, start, end)
    }

    fn push_cached(
        &mut self,
        kind: Kind,
        value: &Value,
        start: i64,
        end: i64,
    ) -> Result<i64, EncodeError> {
        let handle = self.storage.push_record(Record { kind, start, end })?;
        if self.config.caches(kind) {
            self.cache.insert((kind, key_of(value)), handle);
        }
        Ok(handle)
    }

    /// Decode the value behind `handle`.
    ///
    /// Negative handles decode to [`Value::None`]. A handle whose record
    /// or data is missing is reported with a warning and also decodes to
    /// [`Value::None`]: compound values are auxiliary to the time series
    /// and must not make a read fail.
    pub fn read(&self, handle: i64) -> Value {
        if handle < 0 {
            return Value::None;
        }
        match self.try_read(handle as usize) {
            Some(v) => v,
            None => {
                warn!(handle, "could not read compound object, returning None instead");
                Value::None
            }
        }
    }

    fn try_read(&self, index: usize) -> Option<Value> {
        let rec = self.storage.record(index)?;
        let start = usize::try_from(rec.start).ok()?;
        if rec.is_scalar() {
            return match rec.kind {
                Kind::Int => self
                    .storage
                    .ints(start, start + 1)
                    .map(|v| Value::Int(v[0])),
                Kind::Float => self
                    .storage
                    .floats(start, start + 1)
                    .map(|v| Value::Float(v[0])),
                _ => None,
            };
        }
        let end = usize::try_from(rec.end).ok()?;
        match rec.kind {
            Kind::Int => {
                let data = self.storage.ints(start, end)?;
                Some(Value::List(data.into_iter().map(Value::Int).collect()))
            }
            Kind::Float => {
                let data = self.storage.floats(start, end)?;
                Some(Value::List(data.into_iter().map(Value::Float).collect()))
            }
            Kind::Str => {
                let bytes = self.storage.bytes(start, end)?;
                Some(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Kind::List => {
                let handles = self.storage.handles(start, end)?;
                Some(Value::List(handles.into_iter().map(|h| self.read(h)).collect()))
            }
            Kind::Dict => {
                let handles = self.storage.handles(start, end)?;
                let (Value::List(keys), Value::List(values)) =
                    (self.read(*handles.first()?), self.read(*handles.get(1)?))
                else {
                    return None;
                };
                let map: IndexMap<String, Value> = keys
                    .into_iter()
                    .map(|k| match k {
                        Value::Str(s) => s,
                        other => other.to_string(),
                    })
                    .zip(values)
                    .collect();
                Some(Value::Map(map))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VecStorage;

    fn encoder() -> Encoder<VecStorage> {
        Encoder::open(VecStorage::new(), EncoderConfig::new())
    }

    fn map(pairs: &[(&str, Value)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn none_is_reserved_handle() {
        let mut enc = encoder();
        assert_eq!(enc.write(&Value::None).unwrap(), NONE_HANDLE);
        assert_eq!(enc.storage().stored_len(), 0);
        assert_eq!(enc.read(NONE_HANDLE), Value::None);
    }

    #[test]
    fn scalars_use_sentinel_end() {
        let mut enc = encoder();
        let h = enc.write(&Value::Int(7)).unwrap();
        let rec = enc.storage().record(h as usize).unwrap();
        assert_eq!(rec.end, -1);
        assert_eq!(enc.read(h), Value::Int(7));
        let f = enc.write(&Value::Float(0.5)).unwrap();
        assert_eq!(enc.read(f), Value::Float(0.5));
    }

    #[test]
    fn numeric_list_kinds() {
        let mut enc = encoder();
        let ints = enc.write(&Value::List(vec![1.into(), 2.into()])).unwrap();
        let mixed = enc.write(&Value::List(vec![1.into(), 2.5.into()])).unwrap();
        let empty = enc.write(&Value::List(vec![])).unwrap();
        let s = enc.storage();
        assert_eq!(s.record(ints as usize).unwrap().kind, Kind::Int);
        assert_eq!(s.record(mixed as usize).unwrap().kind, Kind::Float);
        assert_eq!(s.record(empty as usize).unwrap().kind, Kind::Int);
        assert_eq!(
            enc.read(mixed),
            Value::List(vec![Value::Float(1.0), Value::Float(2.5)])
        );
        assert_eq!(enc.read(empty), Value::List(vec![]));
    }

    #[test]
    fn nested_roundtrip() {
        let mut enc = encoder();
        let v = map(&[
            ("name", "tet".into()),
            ("ids", Value::List(vec![1.into(), 2.into(), 3.into()])),
            (
                "mixed",
                Value::List(vec![Value::None, "a".into(), Value::List(vec![])]),
            ),
            ("inner", map(&[("x", 1.5.into())])),
        ]);
        let h = enc.write(&v).unwrap();
        assert_eq!(enc.read(h), v);
    }

    #[test]
    fn structurally_equal_values_share_handle() {
        let mut enc = encoder();
        let v = map(&[
            ("a", Value::List(vec![1.into(), 2.into()])),
            ("b", Value::List(vec!["x".into(), 3.into()])),
        ]);
        let h1 = enc.write(&v).unwrap();
        let size = enc.storage().stored_len();
        let h2 = enc.write(&v).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(enc.storage().stored_len(), size);
    }

    #[test]
    fn uncached_kinds_append_again() {
        let mut enc = Encoder::open(VecStorage::new(), EncoderConfig::uncached());
        let v = Value::from("abc");
        let h1 = enc.write(&v).unwrap();
        let h2 = enc.write(&v).unwrap();
        assert_ne!(h1, h2);
        assert_eq!(enc.read(h1), enc.read(h2));
    }

    #[test]
    fn cache_rebuilt_on_open() {
        let mut enc = encoder();
        let v = Value::List(vec!["a".into(), Value::List(vec![1.into()])]);
        let h = enc.write(&v).unwrap();
        let storage = enc.into_storage();

        let mut reopened = Encoder::open(storage, EncoderConfig::new());
        let size = reopened.storage().stored_len();
        assert_eq!(reopened.write(&v).unwrap(), h);
        assert_eq!(reopened.storage().stored_len(), size);
    }

    #[test]
    fn out_of_range_handle_reads_none() {
        let enc = encoder();
        assert_eq!(enc.read(42), Value::None);
    }

    #[test]
    fn read_only_write_fails() {
        let mut enc = Encoder::open(VecStorage::new().into_read_only(), EncoderConfig::new());
        assert_eq!(enc.write(&Value::Int(1)), Err(EncodeError::ReadOnly));
        assert_eq!(enc.write(&Value::None), Ok(NONE_HANDLE));
    }
}
