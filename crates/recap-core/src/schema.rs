//! Selector schema handed to backends when saving begins.

use crate::id::SelectorId;
use crate::value::{MetaData, Value};

/// Metadata key naming the value type of custom result columns.
pub const VALUE_TYPE_KEY: &str = "value_type";

/// Shape and description of a saved selector.
///
/// Backends persist the schema once, on the first row of the first run,
/// and treat it as frozen afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    /// Ordinal of the selector.
    pub index: SelectorId,
    /// Human-readable description.
    pub description: String,
    /// One label per column.
    pub labels: Vec<String>,
    /// Per-column metadata.
    pub metadata: MetaData,
    /// Short value name per column, used by mesh-aware exporters.
    pub value_names: Vec<Option<String>>,
}

impl Schema {
    /// Number of columns.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the selector has no column.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Columns holding compound values, per the `value_type` metadata.
    pub fn compound_columns(&self) -> Vec<usize> {
        match self.metadata.get(VALUE_TYPE_KEY) {
            Some(types) => types
                .iter()
                .enumerate()
                .filter(|(_, t)| matches!(t.as_str(), Some("dict" | "list" | "str")))
                .map(|(i, _)| i)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether any column holds compound values.
    pub fn has_compound(&self) -> bool {
        !self.compound_columns().is_empty()
    }

    /// Metadata value of `key` at column `col`, or [`Value::None`].
    pub fn meta_at(&self, key: &str, col: usize) -> &Value {
        static NONE: Value = Value::None;
        self.metadata
            .get(key)
            .and_then(|v| v.get(col))
            .unwrap_or(&NONE)
    }
}
