//! Append-only binary result files, one per selector.

pub mod codec;
pub mod reader;
pub mod writer;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use recap_core::{MetaData, RunId, Schema, Value};

use crate::backend::{pick, Backend};
use crate::config::FileConfig;
use crate::error::StoreError;
use crate::slice::Slice;

pub use reader::{FileReader, RunInfo};
pub use writer::{check_reserved, FileWriter};

/// Saves a selector to a binary file.
///
/// The file is created, replacing any previous content, when the first run
/// starts. Reads flush the writer first and then go through a reader on
/// the same path; rows of the current run that are still in the
/// recent-rows buffer are served from memory.
pub struct FileBackend {
    path: PathBuf,
    schema: Option<Schema>,
    config: FileConfig,
    writer: Option<FileWriter<BufWriter<File>>>,
    reader: Option<FileReader<BufReader<File>>>,
    recent: VecDeque<(f64, Vec<Value>)>,
    recent_capacity: usize,
}

impl FileBackend {
    /// A backend writing `schema` to `path`.
    ///
    /// Fails if the schema metadata uses a reserved key.
    pub fn create(
        path: impl AsRef<Path>,
        schema: Schema,
        config: FileConfig,
    ) -> Result<Self, StoreError> {
        check_reserved(&schema)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            recent_capacity: config.buffered_rows(schema.len()),
            schema: Some(schema),
            config,
            writer: None,
            reader: None,
            recent: VecDeque::new(),
        })
    }

    /// Open an existing file for reading only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let reader = FileReader::open(BufReader::new(File::open(&path)?))?;
        Ok(Self {
            path,
            schema: None,
            config: FileConfig::new(),
            writer: None,
            reader: Some(reader),
            recent: VecDeque::new(),
            recent_capacity: 0,
        })
    }

    /// Path of the result file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backend was opened for reading only.
    pub fn is_read_only(&self) -> bool {
        self.schema.is_none()
    }

    fn len(&self) -> usize {
        match (&self.schema, &self.reader) {
            (Some(s), _) => s.len(),
            (None, Some(r)) => r.len(),
            (None, None) => 0,
        }
    }

    /// Flush pending rows and make sure a reader is open.
    fn sync_reader(&mut self) -> Result<Option<&mut FileReader<BufReader<File>>>, StoreError> {
        if let Some(w) = self.writer.as_mut() {
            w.finalize()?;
        }
        if self.reader.is_none() && self.writer.is_some() {
            self.reader = Some(FileReader::open(BufReader::new(File::open(&self.path)?))?);
        }
        Ok(self.reader.as_mut())
    }

    /// Rows `indices` of the current run, if all of them are still buffered.
    fn from_recent(&self, indices: &[usize]) -> Option<Vec<(f64, Vec<Value>)>> {
        let rows = self.writer.as_ref()?.current_rows() as usize;
        let first = rows - self.recent.len();
        indices
            .iter()
            .map(|&i| {
                i.checked_sub(first)
                    .and_then(|j| self.recent.get(j))
                    .cloned()
            })
            .collect()
    }

    /// Resolve `runs` and `rows`, then fetch the selected rows of each run.
    fn rows(
        &mut self,
        runs: &Slice,
        rows: &Slice,
    ) -> Result<Vec<Vec<(f64, Vec<Value>)>>, StoreError> {
        let writing = self.writer.is_some();
        let Some(reader) = self.sync_reader()? else {
            return runs.resolve(0, "run").map(|_| Vec::new());
        };
        let infos = reader.runs()?;
        let last = infos.len().checked_sub(1);
        let mut plan = Vec::new();
        for r in runs.resolve(infos.len(), "run")? {
            let info = infos[r];
            if info.is_partial() && rows.has_negative() {
                return Err(StoreError::Unsupported {
                    op: format!(
                        "negative row index into run {}, which was not closed properly",
                        info.run_id
                    ),
                });
            }
            let count = reader.row_count(&info)? as usize;
            plan.push((r, info, rows.resolve(count, "row")?));
        }
        let mut out = Vec::with_capacity(plan.len());
        for (r, info, indices) in plan {
            let cached = if writing && Some(r) == last {
                self.from_recent(&indices)
            } else {
                None
            };
            match cached {
                Some(rows) => out.push(rows),
                None => {
                    let reader = self.reader.as_mut().ok_or(StoreError::NoRun)?;
                    out.push(reader.read_rows(&info, &indices)?);
                }
            }
        }
        Ok(out)
    }
}

impl Backend for FileBackend {
    fn new_run(&mut self) -> Result<RunId, StoreError> {
        let schema = self.schema.as_ref().ok_or(StoreError::ReadOnly)?;
        if self.writer.is_none() {
            let out = BufWriter::with_capacity(
                self.config.buffer_size * 8,
                File::create(&self.path)?,
            );
            self.writer = Some(FileWriter::new(out, schema, self.config.format)?);
            self.reader = None;
        }
        self.recent.clear();
        let writer = self.writer.as_mut().ok_or(StoreError::NoRun)?;
        Ok(RunId(writer.new_run()?))
    }

    fn save(&mut self, time: f64, row: &[Value]) -> Result<(), StoreError> {
        let writer = self.writer.as_mut().ok_or(StoreError::NoRun)?;
        writer.write_row(time, row)?;
        if self.recent.len() == self.recent_capacity {
            self.recent.pop_front();
        }
        self.recent.push_back((time, row.to_vec()));
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        match self.writer.as_mut() {
            Some(w) => w.finalize(),
            None => Ok(()),
        }
    }

    fn saving_started(&self) -> bool {
        self.writer.is_some() || self.reader.is_some()
    }

    fn run_count(&mut self) -> Result<usize, StoreError> {
        match self.sync_reader()? {
            Some(r) => Ok(r.runs()?.len()),
            None => Ok(0),
        }
    }

    fn time(&mut self, runs: &Slice, rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError> {
        Ok(self
            .rows(runs, rows)?
            .into_iter()
            .map(|run| run.into_iter().map(|(t, _)| t).collect())
            .collect())
    }

    fn data(
        &mut self,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError> {
        let cols = cols.resolve(self.len(), "column")?;
        Ok(self
            .rows(runs, rows)?
            .into_iter()
            .map(|run| run.into_iter().map(|(_, row)| pick(&row, &cols)).collect())
            .collect())
    }

    fn labels(&self) -> Result<Vec<String>, StoreError> {
        match (&self.schema, &self.reader) {
            (Some(s), _) => Ok(s.labels.clone()),
            (None, Some(r)) => Ok(r.labels().to_vec()),
            (None, None) => Ok(Vec::new()),
        }
    }

    fn metadata(&self) -> Result<MetaData, StoreError> {
        match (&self.schema, &self.reader) {
            (Some(s), _) => Ok(s.metadata.clone()),
            (None, Some(r)) => Ok(r.metadata().clone()),
            (None, None) => Ok(MetaData::new()),
        }
    }

    fn description(&self) -> Result<String, StoreError> {
        match (&self.schema, &self.reader) {
            (Some(s), _) => Ok(s.description.clone()),
            (None, Some(r)) => Ok(r.description().to_string()),
            (None, None) => Ok(String::new()),
        }
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            if let Err(e) = w.finalize() {
                tracing::warn!(path = %self.path.display(), "failed to close result file: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_core::SelectorId;

    fn schema() -> Schema {
        Schema {
            index: SelectorId(0),
            description: "A.Count".into(),
            labels: vec!["A.Count".into()],
            metadata: MetaData::new(),
            value_names: vec![None],
        }
    }

    #[test]
    fn recent_rows_match_file_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            buffer_size: 2,
            ..FileConfig::new()
        };
        let mut b = FileBackend::create(dir.path().join("a.dat"), schema(), config).unwrap();
        b.new_run().unwrap();
        for i in 0..5 {
            b.save(i as f64, &[Value::Float(i as f64)]).unwrap();
        }
        assert_eq!(b.recent.len(), 2);
        assert!(b.from_recent(&[3, 4]).is_some());
        assert!(b.from_recent(&[2]).is_none());
        let all = b.data(&Slice::All, &Slice::All, &Slice::All).unwrap();
        assert_eq!(all[0].len(), 5);
        assert_eq!(
            b.data(&Slice::Index(-1), &Slice::Index(-1), &Slice::All).unwrap(),
            vec![vec![vec![Value::Float(4.0)]]]
        );
    }

    #[test]
    fn read_only_cannot_start_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.dat");
        {
            let mut b = FileBackend::create(&path, schema(), FileConfig::new()).unwrap();
            b.new_run().unwrap();
            b.save(0.0, &[Value::Float(1.0)]).unwrap();
        }
        let mut r = FileBackend::open_read_only(&path).unwrap();
        assert!(r.is_read_only());
        assert!(matches!(r.new_run(), Err(StoreError::ReadOnly)));
        assert_eq!(r.labels().unwrap(), ["A.Count"]);
        assert_eq!(r.time(&Slice::All, &Slice::All).unwrap(), vec![vec![0.0]]);
    }
}
