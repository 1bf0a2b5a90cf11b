//! Manually supplied result rows.

use recap_core::{MetaData, Schema, SelectorId, SimInstanceId, Simulation, Value, VALUE_TYPE_KEY};

use crate::error::SelectorError;
use crate::header::Header;

/// Declared type of one custom column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// Integer number.
    Int,
    /// Floating point number.
    Float,
    /// String, stored as a compound value.
    Str,
    /// List, stored as a compound value.
    List,
    /// Mapping, stored as a compound value.
    Dict,
}

impl ColumnType {
    /// Lower-case name used in default labels.
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Str => "str",
            ColumnType::List => "list",
            ColumnType::Dict => "dict",
        }
    }

    /// Value of the `value_type` metadata key, `None` for numbers.
    pub fn value_type(self) -> Value {
        match self {
            ColumnType::Int | ColumnType::Float => Value::None,
            ColumnType::Str => Value::from("str"),
            ColumnType::List => Value::from("list"),
            ColumnType::Dict => Value::from("dict"),
        }
    }

    /// Whether `v` fits this column. `None` fits every column.
    pub fn accepts(self, v: &Value) -> bool {
        matches!(
            (self, v),
            (_, Value::None)
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Int(_) | Value::Float(_))
                | (ColumnType::Str, Value::Str(_))
                | (ColumnType::List, Value::List(_))
                | (ColumnType::Dict, Value::Map(_))
        )
    }
}

/// A source whose rows are supplied by the caller rather than queried from
/// the simulation.
///
/// Custom results can only be saved manually; they cannot be combined with
/// selectors nor scheduled with an interval or timepoints.
#[derive(Clone, Debug)]
pub struct CustomResults {
    sim: SimInstanceId,
    types: Vec<ColumnType>,
    header: Header,
}

impl CustomResults {
    /// Declare columns of the given types for `sim`.
    pub fn new(sim: &dyn Simulation, types: Vec<ColumnType>) -> Self {
        let labels = types
            .iter()
            .enumerate()
            .map(|(i, t)| format!("col{i}_{}", t.name()))
            .collect();
        let mut metadata = MetaData::new();
        metadata.insert(
            VALUE_TYPE_KEY.to_string(),
            types.iter().map(|t| t.value_type()).collect(),
        );
        let value_names = vec![None; types.len()];
        Self {
            sim: sim.instance_id(),
            header: Header::new(labels, metadata, "CustomResults".to_string(), value_names),
            types,
        }
    }

    /// Simulation the rows belong to.
    pub fn sim_id(&self) -> SimInstanceId {
        self.sim
    }

    /// Declared column types.
    pub fn types(&self) -> &[ColumnType] {
        &self.types
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no column is declared.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Labels, metadata and description.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Mutable header, for custom labels and metadata before saving.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Schema handed to backends.
    pub fn schema(&self, index: SelectorId) -> Schema {
        self.header.schema(index)
    }

    /// Check a row against the declared columns.
    pub fn check_row(&self, row: &[Value]) -> Result<(), SelectorError> {
        if row.len() != self.len() {
            return Err(SelectorError::Length {
                expected: self.len(),
                got: row.len(),
            });
        }
        if let Some(i) = row
            .iter()
            .zip(&self.types)
            .position(|(v, t)| !t.accepts(v))
        {
            return Err(SelectorError::InvalidValue {
                column: self.header.labels()[i].clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_test_utils::MockSimulation;

    #[test]
    fn labels_and_value_types() {
        let sim = MockSimulation::new();
        let c = CustomResults::new(&sim, vec![ColumnType::Int, ColumnType::Dict, ColumnType::Str]);
        assert_eq!(c.header().labels(), ["col0_int", "col1_dict", "col2_str"]);
        assert_eq!(c.header().description(), "CustomResults");
        assert_eq!(
            c.header().metadata()[VALUE_TYPE_KEY],
            vec![Value::None, Value::from("dict"), Value::from("str")]
        );
        assert_eq!(c.schema(SelectorId(0)).compound_columns(), vec![1, 2]);
    }

    #[test]
    fn rows_are_checked() {
        let sim = MockSimulation::new();
        let c = CustomResults::new(&sim, vec![ColumnType::Float, ColumnType::List]);
        assert!(c.check_row(&[Value::Int(1), Value::List(vec![])]).is_ok());
        assert!(c.check_row(&[Value::None, Value::None]).is_ok());
        assert_eq!(
            c.check_row(&[Value::Float(1.0)]),
            Err(SelectorError::Length {
                expected: 2,
                got: 1
            })
        );
        assert!(c.check_row(&[Value::Float(1.0), Value::from("x")]).is_err());
    }
}
