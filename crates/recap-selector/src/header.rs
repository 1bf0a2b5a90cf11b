//! User-visible description of a saved source: labels, metadata and
//! description, writable until saving starts.

use recap_core::{MetaData, Schema, SelectorId, Value};

use crate::error::SelectorError;
use crate::metadata::{is_reserved, is_scalar_list};

/// Labels, metadata and description of a selector or custom source.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub(crate) labels: Vec<String>,
    pub(crate) metadata: MetaData,
    pub(crate) description: String,
    pub(crate) value_names: Vec<Option<String>>,
    pub(crate) frozen: bool,
}

impl Header {
    pub(crate) fn new(
        labels: Vec<String>,
        metadata: MetaData,
        description: String,
        value_names: Vec<Option<String>>,
    ) -> Self {
        Self {
            labels,
            metadata,
            description,
            value_names,
            frozen: false,
        }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there are no columns.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// One label per column.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Per-column metadata.
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Short value names used by mesh-aware exporters.
    pub fn value_names(&self) -> &[Option<String>] {
        &self.value_names
    }

    /// Whether saving has started.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Forbid any later change. Called when the first run starts.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn check_frozen(&self, what: &'static str) -> Result<(), SelectorError> {
        if self.frozen {
            Err(SelectorError::Frozen { what })
        } else {
            Ok(())
        }
    }

    /// Replace the labels.
    pub fn set_labels(&mut self, labels: Vec<String>) -> Result<(), SelectorError> {
        self.check_frozen("labels")?;
        if labels.len() != self.len() {
            return Err(SelectorError::Length {
                expected: self.len(),
                got: labels.len(),
            });
        }
        self.labels = labels;
        Ok(())
    }

    /// Replace the description.
    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), SelectorError> {
        self.check_frozen("description")?;
        self.description = description.into();
        Ok(())
    }

    /// Set one metadata key, one value per column.
    pub fn set_metadata(
        &mut self,
        key: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<(), SelectorError> {
        let key = key.into();
        self.check_frozen("metadata")?;
        if is_reserved(&key) {
            return Err(SelectorError::ReservedKey { key });
        }
        if values.len() != self.len() {
            return Err(SelectorError::Length {
                expected: self.len(),
                got: values.len(),
            });
        }
        if !is_scalar_list(&values) {
            return Err(SelectorError::InvalidMetadata { key });
        }
        if self.metadata.get(&key).is_some_and(|old| *old != values) {
            tracing::warn!(key = %key, "metadata key already set, replacing with new values");
        }
        self.metadata.insert(key, values);
        Ok(())
    }

    /// Schema handed to backends.
    pub fn schema(&self, index: SelectorId) -> Schema {
        Schema {
            index,
            description: self.description.clone(),
            labels: self.labels.clone(),
            metadata: self.metadata.clone(),
            value_names: self.value_names.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header::new(
            vec!["a".into(), "b".into()],
            MetaData::new(),
            "a, b".into(),
            vec![None, None],
        )
    }

    #[test]
    fn setters_validate_lengths() {
        let mut h = header();
        assert_eq!(
            h.set_labels(vec!["x".into()]),
            Err(SelectorError::Length {
                expected: 2,
                got: 1
            })
        );
        h.set_labels(vec!["x".into(), "y".into()]).unwrap();
        assert_eq!(h.labels(), ["x", "y"]);
    }

    #[test]
    fn metadata_rejects_reserved_and_nested() {
        let mut h = header();
        assert!(matches!(
            h.set_metadata("__recap_version__", vec![1.into(), 2.into()]),
            Err(SelectorError::ReservedKey { .. })
        ));
        assert!(matches!(
            h.set_metadata("k", vec![Value::List(vec![]), 2.into()]),
            Err(SelectorError::InvalidMetadata { .. })
        ));
        h.set_metadata("k", vec!["u".into(), Value::None]).unwrap();
        assert_eq!(h.metadata()["k"].len(), 2);
    }

    #[test]
    fn frozen_header_rejects_changes() {
        let mut h = header();
        h.freeze();
        assert_eq!(
            h.set_description("new"),
            Err(SelectorError::Frozen {
                what: "description"
            })
        );
        assert!(h.set_metadata("k", vec![1.into(), 1.into()]).is_err());
    }
}
