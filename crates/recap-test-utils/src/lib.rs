//! Test utilities and mock types for recap development.
//!
//! [`MockSimulation`] is a deterministic [`Simulation`] over the strip mesh
//! of [`MockMesh`]. It answers paths of the forms
//!
//! - `A.Count`: whole-model quantity,
//! - `comp1.A.Count`: region quantity (`comp1`, `comp2`, `patch1`, `roi1`),
//! - `TETS(0, 1).A.Count` / `TRIS(..).A.Count`: one column per element,
//! - `VERTS(..).V`: one column per vertex,
//!
//! with species `A` (`100 - 10t`), `B` (`2t + 1`) and `C` (constant 5).
//! `Conc` is a tenth of `Count`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod mesh;

use std::cell::Cell;

use recap_core::{
    LocationKind, MetaData, Mesh, PathElem, PathInfo, RunId, SimError, SimInstanceId, SimPath,
    Simulation, StateHint, Value,
};

pub use mesh::MockMesh;

/// Species known to the mock and their value at time `t`.
pub fn species_value(species: &str, t: f64) -> Option<f64> {
    match species {
        "A" => Some(100.0 - 10.0 * t),
        "B" => Some(2.0 * t + 1.0),
        "C" => Some(5.0),
        _ => None,
    }
}

fn region_factor(name: &str) -> f64 {
    match name {
        "comp1" => 1.0,
        "comp2" => 2.0,
        "patch1" => 3.0,
        _ => 0.5,
    }
}

enum Target {
    Whole(String),
    Region(String, LocationKind, String),
    Elems(LocationKind, Vec<u32>, Option<String>),
}

/// Deterministic simulation with query counting.
#[derive(Debug)]
pub struct MockSimulation {
    id: SimInstanceId,
    time: f64,
    runs: u64,
    mesh: MockMesh,
    distributed: bool,
    queries: Cell<usize>,
}

impl MockSimulation {
    pub fn new() -> Self {
        Self {
            id: SimInstanceId::next(),
            time: 0.0,
            runs: 0,
            mesh: MockMesh::new(),
            distributed: false,
            queries: Cell::new(0),
        }
    }

    /// Partition elements across `size` ranks, this instance being `rank`.
    pub fn with_partition(mut self, rank: u32, size: u32) -> Self {
        self.mesh = MockMesh::partitioned(rank, size);
        self.distributed = size > 1;
        self
    }

    /// Number of `query` calls so far.
    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    pub fn mock_mesh(&self) -> &MockMesh {
        &self.mesh
    }

    fn not_found(path: &SimPath) -> SimError {
        SimError::PathNotFound {
            path: path.to_string(),
        }
    }

    fn target(path: &SimPath) -> Result<Target, SimError> {
        let member = |e: &PathElem| match e {
            PathElem::Member(m) => Some(m.clone()),
            _ => None,
        };
        match path.elems() {
            [PathElem::Call(name, args), rest @ ..] => {
                let kind = match name.as_str() {
                    "TETS" => LocationKind::Tet,
                    "TRIS" => LocationKind::Tri,
                    "VERTS" => LocationKind::Vert,
                    _ => return Err(Self::not_found(path)),
                };
                let ids = args
                    .iter()
                    .map(|a| match a {
                        Value::Int(i) if *i >= 0 => Ok(*i as u32),
                        _ => Err(Self::not_found(path)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let species = match rest {
                    [] if kind == LocationKind::Vert => None,
                    [e] if kind != LocationKind::Vert => {
                        Some(member(e).ok_or_else(|| Self::not_found(path))?)
                    }
                    _ => return Err(Self::not_found(path)),
                };
                Ok(Target::Elems(kind, ids, species))
            }
            [PathElem::Member(species)] => Ok(Target::Whole(species.clone())),
            [PathElem::Member(region), PathElem::Member(species)] => {
                let kind = MockMesh::region_kind(region).ok_or_else(|| Self::not_found(path))?;
                Ok(Target::Region(region.clone(), kind, species.clone()))
            }
            _ => Err(Self::not_found(path)),
        }
    }

    fn check_property(path: &SimPath, target: &Target) -> Result<(), SimError> {
        let ok = match target {
            Target::Elems(LocationKind::Vert, ..) => path.property() == "V",
            _ => matches!(path.property(), "Count" | "Conc"),
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::UnknownProperty {
                path: path.to_string(),
                property: path.property().to_string(),
            })
        }
    }

    fn full_values(&self, path: &SimPath) -> Result<Vec<f64>, SimError> {
        let target = Self::target(path)?;
        Self::check_property(path, &target)?;
        let t = self.time;
        let scale = if path.property() == "Conc" { 0.1 } else { 1.0 };
        let value = |species: &str, factor: f64, offset: f64| {
            species_value(species, t)
                .map(|v| (v * factor + offset) * scale)
                .ok_or_else(|| Self::not_found(path))
        };
        match &target {
            Target::Whole(species) => Ok(vec![value(species, 1.0, 0.0)?]),
            Target::Region(region, _, species) => {
                Ok(vec![value(species, region_factor(region), 0.0)?])
            }
            Target::Elems(_, ids, Some(species)) => ids
                .iter()
                .map(|&id| value(species, 1.0, id as f64))
                .collect(),
            Target::Elems(_, ids, None) => Ok(ids.iter().map(|&id| id as f64 + t).collect()),
        }
    }
}

impl Default for MockSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation for MockSimulation {
    fn instance_id(&self) -> SimInstanceId {
        self.id
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn run_id(&self) -> RunId {
        RunId(self.runs.saturating_sub(1))
    }

    fn new_run(&mut self) -> Result<(), SimError> {
        self.runs += 1;
        self.time = 0.0;
        Ok(())
    }

    fn advance_to(&mut self, t: f64) -> Result<(), SimError> {
        if t < self.time {
            return Err(SimError::Failed {
                reason: format!("cannot go back in time from {} to {t}", self.time),
            });
        }
        self.time = t;
        Ok(())
    }

    fn describe(&self, path: &SimPath) -> Result<PathInfo, SimError> {
        let target = Self::target(path)?;
        Self::check_property(path, &target)?;
        let prop = path.property();
        let mut metadata = MetaData::new();
        let labels = match &target {
            Target::Whole(species) => {
                species_value(species, 0.0).ok_or_else(|| Self::not_found(path))?;
                vec![format!("{species}.{prop}")]
            }
            Target::Region(region, kind, species) => {
                species_value(species, 0.0).ok_or_else(|| Self::not_found(path))?;
                metadata.insert("loc_type".into(), vec![Value::from(kind.as_str())]);
                metadata.insert("loc_id".into(), vec![Value::from(region.as_str())]);
                vec![format!("{region}.{species}.{prop}")]
            }
            Target::Elems(kind, ids, species) => {
                let tag = kind.as_str().to_uppercase();
                metadata.insert(
                    "loc_type".into(),
                    vec![Value::from(kind.as_str()); ids.len()],
                );
                metadata.insert(
                    "loc_id".into(),
                    ids.iter().map(|&i| Value::Int(i as i64)).collect(),
                );
                ids.iter()
                    .map(|id| match species {
                        Some(s) => format!("{tag}{id}.{s}.{prop}"),
                        None => format!("{tag}{id}.{prop}"),
                    })
                    .collect()
            }
        };
        Ok(PathInfo { labels, metadata })
    }

    fn query(&self, path: &SimPath, _hint: StateHint) -> Result<Vec<f64>, SimError> {
        self.queries.set(self.queries.get() + 1);
        let full = self.full_values(&path.unrestricted())?;
        Ok(match path.subset() {
            Some(subset) => subset.iter().filter_map(|&i| full.get(i).copied()).collect(),
            None => full,
        })
    }

    fn distribute(&self, path: &SimPath) -> Result<Option<Vec<usize>>, SimError> {
        if !self.distributed {
            return Ok(None);
        }
        match Self::target(path)? {
            Target::Elems(_, ids, _) => Ok(Some(
                ids.iter()
                    .enumerate()
                    .filter(|&(_, &id)| self.mesh.owns(id))
                    .map(|(i, _)| i)
                    .collect(),
            )),
            _ => Ok(None),
        }
    }

    fn is_distributed(&self) -> bool {
        self.distributed
    }

    fn mesh(&self) -> Option<&dyn Mesh> {
        Some(&self.mesh)
    }
}
