//! In-memory backend.

use recap_core::{MetaData, RunId, Schema, Value};

use crate::backend::{pick, Backend};
use crate::error::StoreError;
use crate::slice::Slice;

#[derive(Clone, Debug, Default)]
struct Run {
    time: Vec<f64>,
    rows: Vec<Vec<Value>>,
}

/// Keeps every run in memory. Discarded with the process.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    schema: Schema,
    runs: Vec<Run>,
}

impl MemoryBackend {
    /// An empty store for `schema`.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            runs: Vec::new(),
        }
    }

    /// Schema this backend stores.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl Backend for MemoryBackend {
    fn new_run(&mut self) -> Result<RunId, StoreError> {
        self.runs.push(Run::default());
        Ok(RunId(self.runs.len() as u64 - 1))
    }

    fn save(&mut self, time: f64, row: &[Value]) -> Result<(), StoreError> {
        let run = self.runs.last_mut().ok_or(StoreError::NoRun)?;
        run.time.push(time);
        run.rows.push(row.to_vec());
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.runs.clear();
        Ok(())
    }

    fn saving_started(&self) -> bool {
        !self.runs.is_empty()
    }

    fn run_count(&mut self) -> Result<usize, StoreError> {
        Ok(self.runs.len())
    }

    fn time(&mut self, runs: &Slice, rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError> {
        runs.resolve(self.runs.len(), "run")?
            .into_iter()
            .map(|r| {
                let run = &self.runs[r];
                Ok(rows
                    .resolve(run.time.len(), "row")?
                    .into_iter()
                    .map(|i| run.time[i])
                    .collect())
            })
            .collect()
    }

    fn data(
        &mut self,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError> {
        let cols = cols.resolve(self.schema.len(), "column")?;
        runs.resolve(self.runs.len(), "run")?
            .into_iter()
            .map(|r| {
                let run = &self.runs[r];
                Ok(rows
                    .resolve(run.rows.len(), "row")?
                    .into_iter()
                    .map(|i| pick(&run.rows[i], &cols))
                    .collect())
            })
            .collect()
    }

    fn labels(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.schema.labels.clone())
    }

    fn metadata(&self) -> Result<MetaData, StoreError> {
        Ok(self.schema.metadata.clone())
    }

    fn description(&self) -> Result<String, StoreError> {
        Ok(self.schema.description.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_core::SelectorId;

    fn schema() -> Schema {
        Schema {
            index: SelectorId(0),
            description: "A".into(),
            labels: vec!["a".into(), "b".into()],
            metadata: MetaData::new(),
            value_names: vec![None, None],
        }
    }

    #[test]
    fn runs_and_slices() {
        let mut b = MemoryBackend::new(schema());
        assert!(matches!(b.save(0.0, &[]), Err(StoreError::NoRun)));
        for run in 0..2 {
            assert_eq!(b.new_run().unwrap(), RunId(run));
            for i in 0..3 {
                let v = (run * 10 + i) as f64;
                b.save(i as f64, &[Value::Float(v), Value::Float(-v)]).unwrap();
            }
        }
        assert_eq!(b.run_count().unwrap(), 2);
        assert_eq!(
            b.time(&Slice::All, &Slice::Index(-1)).unwrap(),
            vec![vec![2.0], vec![2.0]]
        );
        assert_eq!(
            b.data(&Slice::Index(1), &Slice::range(0, 2), &Slice::Index(1))
                .unwrap(),
            vec![vec![vec![Value::Float(-10.0)], vec![Value::Float(-11.0)]]]
        );
        assert!(b.data(&Slice::Index(2), &Slice::All, &Slice::All).is_err());
    }

    #[test]
    fn clear_discards_runs() {
        let mut b = MemoryBackend::new(schema());
        b.new_run().unwrap();
        b.save(0.0, &[Value::Int(1), Value::Int(2)]).unwrap();
        b.clear().unwrap();
        assert_eq!(b.run_count().unwrap(), 0);
        assert!(!b.saving_started());
    }
}
