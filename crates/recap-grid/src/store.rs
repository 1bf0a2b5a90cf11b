//! A hierarchical store that also describes its runs in XDMF.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use recap_core::{ElemKind, MetaData, Mesh, ProcessContext, Rank, RunId, SelectorId, Value};
use recap_store::{
    Backend, GroupLayout, GroupRequest, HierStore, ReadOnlySelector, RunGroupInfo, RunGroupStore,
    Slice, StoreError,
};
use tracing::debug;

use crate::config::XdmfConfig;
use crate::error::GridError;
use crate::geometry::GridGeometry;
use crate::partition::Partition;
use crate::xdmf::{grid_entries, GridEntry, Location, XdmfWriter, MESH_GROUP};

/// [`HierStore`] wrapper writing grid geometry and `.xmf` descriptors.
///
/// Opening a run group partitions the mesh among the selectors' tagged
/// columns, stores the column order each selector needs and the geometry
/// of every grid. Backends then describe every saved row in the
/// descriptor of the current run.
pub struct XdmfStore {
    inner: HierStore,
    config: XdmfConfig,
    mesh: Rc<dyn Mesh>,
    ctx: ProcessContext,
    partition: Option<Partition>,
    writer: Option<Rc<RefCell<XdmfWriter>>>,
}

impl XdmfStore {
    /// Wrap `inner`, describing grids of `mesh`.
    pub fn new(inner: HierStore, config: XdmfConfig, mesh: Rc<dyn Mesh>) -> Self {
        Self {
            inner,
            config,
            mesh,
            ctx: ProcessContext::single(),
            partition: None,
            writer: None,
        }
    }

    /// Use `ctx` to exchange grid locations when ranks save separately.
    pub fn with_context(mut self, ctx: ProcessContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// The wrapped store.
    pub fn hier(&self) -> &HierStore {
        &self.inner
    }

    /// Mutable access to the wrapped store, for static data.
    pub fn hier_mut(&mut self) -> &mut HierStore {
        &mut self.inner
    }

    /// Grid partition of the open run group.
    pub fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    /// Descriptor files written so far for the open run group.
    pub fn descriptor_files(&self) -> Vec<PathBuf> {
        self.writer
            .as_ref()
            .map(|w| w.borrow().written().to_vec())
            .unwrap_or_default()
    }

    /// Store the geometry of every grid, or check it against what a
    /// previous run stored.
    fn write_geometry(
        &mut self,
        uid: &str,
        partition: &Partition,
        rank_suffix: Option<Rank>,
    ) -> Result<Vec<(usize, usize)>, GridError> {
        let entries = grid_entries(partition, &[], rank_suffix);
        let mut sizes = Vec::with_capacity(entries.len());
        let grids = ElemKind::ALL
            .iter()
            .flat_map(|&k| partition.grids(k).iter().map(move |g| (k, g)));
        for (entry, (kind, grid)) in entries.iter().zip(grids) {
            let group = format!("{uid}/{MESH_GROUP}/{}", entry.name);
            let geometry = GridGeometry::build(&*self.mesh, kind, &grid.elems);
            if let Some(stored) = self.inner.dataset(&format!("{group}/elemInds"))? {
                if stored.data.len() != geometry.nb_elems() {
                    return Err(GridError::Splitting {
                        grid: entry.name.clone(),
                        stored: stored.data.len(),
                        expected: geometry.nb_elems(),
                    });
                }
            } else {
                for (name, dataset) in geometry.datasets(kind) {
                    self.inner.put_dataset(&format!("{group}/{name}"), dataset)?;
                }
                if let Some(region) = &grid.path.region {
                    self.inner
                        .set_attr(&group, "loc_id", Value::from(region.as_str()))?;
                }
            }
            sizes.push((geometry.nb_verts(), geometry.nb_elems()));
        }
        Ok(sizes)
    }

    fn open_descriptors(&mut self, uid: &str, request: &GroupRequest) -> Result<(), GridError> {
        let partition = Partition::build(&*self.mesh, &request.schemas)?;
        for s in &request.schemas {
            if let Some(remap) = partition.column_remap(s.index, s.len()) {
                self.inner.set_column_remapping(uid, s.index, &remap)?;
            }
        }
        let distributed = matches!(request.layout, GroupLayout::Distributed { .. });
        let suffix = distributed.then_some(request.rank);
        let sizes = self.write_geometry(uid, &partition, suffix)?;
        self.inner.finalize()?;

        let grids = grid_entries(&partition, &sizes, suffix);
        let lens: BTreeMap<SelectorId, usize> =
            request.schemas.iter().map(|s| (s.index, s.len())).collect();
        let data_file = self
            .inner
            .file_path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let peers = if distributed {
            let locations: Vec<Location> = grids.iter().map(GridEntry::location).collect();
            self.ctx.gather(&locations)?
        } else {
            None
        };
        let folder = self.config.folder_for(self.inner.prefix());
        let writer = XdmfWriter::new(folder, uid, &data_file, request.rank, grids, lens, peers);
        debug!(%uid, grids = partition.len(), distributed, "xdmf grids prepared");
        self.partition = Some(partition);
        self.writer = Some(Rc::new(RefCell::new(writer)));
        Ok(())
    }
}

impl RunGroupStore for XdmfStore {
    fn open_group(&mut self, request: &GroupRequest) -> Result<String, StoreError> {
        if let Some(w) = self.writer.take() {
            w.borrow_mut().flush()?;
        }
        self.partition = None;
        let uid = self.inner.open_group(request)?;
        if request.writes() {
            self.open_descriptors(&uid, request)?;
        }
        Ok(uid)
    }

    fn backend_for(&mut self, index: SelectorId) -> Result<Box<dyn Backend>, StoreError> {
        let inner = self.inner.backend_for(index)?;
        let Some(w) = &self.writer else {
            return Ok(inner);
        };
        Ok(Box::new(XdmfBackend {
            inner,
            index,
            writer: Rc::clone(w),
            rows: 0,
        }))
    }

    fn groups(&self) -> Result<Vec<RunGroupInfo>, StoreError> {
        self.inner.groups()
    }

    fn results(&self, uid: &str) -> Result<Vec<ReadOnlySelector>, StoreError> {
        self.inner.results(uid)
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        self.inner.finalize()?;
        if let Some(w) = &self.writer {
            w.borrow_mut().flush()?;
        }
        Ok(())
    }
}

/// Saves through a hierarchical backend and records every row in the
/// run's descriptor.
struct XdmfBackend {
    inner: Box<dyn Backend>,
    index: SelectorId,
    writer: Rc<RefCell<XdmfWriter>>,
    rows: usize,
}

impl Backend for XdmfBackend {
    fn new_run(&mut self) -> Result<RunId, StoreError> {
        let id = self.inner.new_run()?;
        self.writer.borrow_mut().start_run(id)?;
        self.rows = 0;
        Ok(id)
    }

    fn save(&mut self, time: f64, row: &[Value]) -> Result<(), StoreError> {
        self.inner.save(time, row)?;
        self.writer
            .borrow_mut()
            .time_step(self.index, time, self.rows, row)?;
        self.rows += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        self.inner.finalize()?;
        self.writer.borrow_mut().flush()?;
        Ok(())
    }

    fn saving_started(&self) -> bool {
        self.inner.saving_started()
    }

    fn run_count(&mut self) -> Result<usize, StoreError> {
        self.inner.run_count()
    }

    fn time(&mut self, runs: &Slice, rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError> {
        self.inner.time(runs, rows)
    }

    fn data(
        &mut self,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError> {
        self.inner.data(runs, rows, cols)
    }

    fn labels(&self) -> Result<Vec<String>, StoreError> {
        self.inner.labels()
    }

    fn metadata(&self) -> Result<MetaData, StoreError> {
        self.inner.metadata()
    }

    fn description(&self) -> Result<String, StoreError> {
        self.inner.description()
    }
}
