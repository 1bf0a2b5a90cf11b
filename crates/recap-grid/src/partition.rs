//! Splitting the mesh into disjoint grids of identically tagged elements.
//!
//! Region grids come first: compartments seed the tet grids and patches
//! the tri grids, then every region-tagged value splits them further by
//! intersection and difference. Element-tagged values are grouped by the
//! set of `(value name, selector)` pairs saved on each element and cut
//! against the region grids. Whatever tets remain untouched form one last
//! grid.
//!
//! Columns of element-tagged values are renumbered so that the elements of
//! one grid read a contiguous block of the saved row.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use recap_core::{ElemKind, LocationKind, Mesh, Schema, SelectorId, Value};
use tracing::debug;

use crate::error::GridError;

/// Element indices of one grid.
pub type ElemSet = BTreeSet<u32>;

/// Where an attribute lives on its grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Center {
    /// One value per tet or tri.
    Cell,
    /// One value per vertex.
    Node,
    /// One value for the whole grid.
    Grid,
}

impl Center {
    /// XDMF name of the centering.
    pub fn as_str(self) -> &'static str {
        match self {
            Center::Cell => "Cell",
            Center::Node => "Node",
            Center::Grid => "Grid",
        }
    }

    fn of(kind: ElemKind) -> Self {
        match kind {
            ElemKind::Vert => Center::Node,
            ElemKind::Tet | ElemKind::Tri => Center::Cell,
        }
    }
}

/// A selector value attached uniformly to the elements of a grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridValue {
    /// Value name, e.g. `A.Count`.
    pub name: String,
    /// Region kind for region-level values.
    pub region: Option<LocationKind>,
    /// Selector holding the value.
    pub selector: SelectorId,
    /// First column. Stored position for element values, selector column
    /// for region values.
    pub start: usize,
    /// Column stride.
    pub step: usize,
    /// Number of columns.
    pub count: usize,
    /// Centering of the attribute.
    pub center: Center,
}

impl GridValue {
    /// Attribute name shown by visualization tools.
    pub fn attribute_name(&self) -> String {
        match self.region {
            Some(kind) => format!("{} ({kind})", self.name),
            None => self.name.clone(),
        }
    }
}

/// Position of a grid in the spatial hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GridPath {
    /// Element kind of the grid.
    pub kind: ElemKind,
    /// Enclosing compartment or patch.
    pub region: Option<String>,
}

impl GridPath {
    fn root(kind: ElemKind) -> Self {
        Self { kind, region: None }
    }

    fn region(kind: ElemKind, name: &str) -> Self {
        Self {
            kind,
            region: Some(name.to_string()),
        }
    }

    /// Names of the nested collections holding the grid.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![format!("{}Grids", self.kind)];
        names.extend(self.region.clone());
        names
    }
}

/// A set of elements sharing the same attached values.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    /// Element indices.
    pub elems: ElemSet,
    /// Values attached to every element.
    pub values: Vec<GridValue>,
    /// Position in the hierarchy.
    pub path: GridPath,
}

impl Grid {
    fn new(elems: ElemSet, values: Vec<GridValue>, path: GridPath) -> Self {
        Self {
            elems,
            values,
            path,
        }
    }
}

/// Value saved on one location: `(value name, selector, column)`.
type Info = (String, SelectorId, usize);

fn slot(kind: ElemKind) -> usize {
    match kind {
        ElemKind::Tet => 0,
        ElemKind::Tri => 1,
        ElemKind::Vert => 2,
    }
}

/// The grids of every element kind and the column order they need.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Partition {
    grids: [Vec<Grid>; 3],
    remaps: BTreeMap<SelectorId, Vec<usize>>,
}

/// Tagged columns of the saved selectors.
#[derive(Default)]
struct Tags {
    elems: [BTreeMap<u32, Vec<Info>>; 3],
    regions: IndexMap<(LocationKind, String), Vec<Info>>,
}

impl Tags {
    fn collect(schemas: &[Schema], owned: &[ElemSet]) -> Result<Self, GridError> {
        let mut tags = Tags::default();
        for schema in schemas {
            for col in 0..schema.len() {
                let id = schema.meta_at("loc_id", col);
                let Some(tpe) = schema.meta_at("loc_type", col).as_str() else {
                    continue;
                };
                if id.is_none() {
                    continue;
                }
                let Some(Some(name)) = schema.value_names.get(col) else {
                    continue;
                };
                let bad = |detail: String| GridError::Location {
                    selector: schema.index,
                    column: col,
                    detail,
                };
                let kind: LocationKind = tpe.parse().map_err(bad)?;
                let info = (name.clone(), schema.index, col);
                match kind.elem_kind() {
                    Some(elem_kind) => {
                        let idx = match id {
                            Value::Int(i) if *i >= 0 => *i as u32,
                            other => return Err(bad(format!("element index {other}"))),
                        };
                        // Elements of other ranks are described in their own files.
                        if owned[slot(elem_kind)].contains(&idx) {
                            tags.elems[slot(elem_kind)].entry(idx).or_default().push(info);
                        }
                    }
                    None => {
                        let region = id
                            .as_str()
                            .ok_or_else(|| bad(format!("region name {id}")))?;
                        tags.regions
                            .entry((kind, region.to_string()))
                            .or_default()
                            .push(info);
                    }
                }
            }
        }
        Ok(tags)
    }
}

impl Partition {
    /// Partition the elements of `mesh` owned by this rank among the
    /// values saved by `schemas`.
    pub fn build(mesh: &dyn Mesh, schemas: &[Schema]) -> Result<Self, GridError> {
        let owned: Vec<ElemSet> = ElemKind::ALL
            .iter()
            .map(|&k| mesh.elems(k).into_iter().collect())
            .collect();
        let tags = Tags::collect(schemas, &owned)?;
        let mut part = Partition::default();
        let mut regions = region_grids(mesh, &tags, &owned)?;

        for kind in ElemKind::ALL {
            let seeded = std::mem::take(&mut regions[slot(kind)]);
            part.add_element_grids(kind, &tags.elems[slot(kind)], seeded);
            if kind == ElemKind::Tet {
                let mut rest = owned[slot(kind)].clone();
                for g in &part.grids[slot(kind)] {
                    rest.retain(|e| !g.elems.contains(e));
                }
                if !rest.is_empty() {
                    part.grids[slot(kind)].push(Grid::new(rest, Vec::new(), GridPath::root(kind)));
                }
            }
        }
        debug!(
            tets = part.grids[0].len(),
            tris = part.grids[1].len(),
            verts = part.grids[2].len(),
            "mesh partitioned into grids"
        );
        Ok(part)
    }

    /// Grids of element kind `kind`, in export order.
    pub fn grids(&self, kind: ElemKind) -> &[Grid] {
        &self.grids[slot(kind)]
    }

    /// Total number of grids.
    pub fn len(&self) -> usize {
        self.grids.iter().map(Vec::len).sum()
    }

    /// Whether the partition has no grid.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every value of selector `id` with the grid it is attached to.
    pub fn values_of(&self, id: SelectorId) -> Vec<(ElemKind, usize, &GridValue)> {
        ElemKind::ALL
            .iter()
            .flat_map(move |&kind| {
                self.grids[slot(kind)]
                    .iter()
                    .enumerate()
                    .flat_map(move |(i, g)| g.values.iter().map(move |v| (kind, i, v)))
            })
            .filter(|(_, _, v)| v.selector == id)
            .collect()
    }

    /// Column order selector `id` of `len` columns must be saved in, or
    /// `None` when it is already the natural one.
    ///
    /// Columns no grid claims keep their relative order after the claimed
    /// ones.
    pub fn column_remap(&self, id: SelectorId, len: usize) -> Option<Vec<usize>> {
        let mut remap = self.remaps.get(&id)?.clone();
        let claimed: BTreeSet<usize> = remap.iter().copied().collect();
        remap.extend((0..len).filter(|c| !claimed.contains(c)));
        if remap.iter().enumerate().all(|(j, &c)| j == c) {
            None
        } else {
            Some(remap)
        }
    }

    fn add_element_grids(
        &mut self,
        kind: ElemKind,
        elem_infos: &BTreeMap<u32, Vec<Info>>,
        region_grids: Vec<Grid>,
    ) {
        let mut by_key: IndexMap<BTreeSet<(String, SelectorId)>, Vec<(u32, Info)>> =
            IndexMap::new();
        for (&elem, infos) in elem_infos {
            let key = infos.iter().map(|(n, s, _)| (n.clone(), *s)).collect();
            let entry = by_key.entry(key).or_default();
            entry.extend(infos.iter().map(|i| (elem, i.clone())));
        }

        let mut covered = ElemSet::new();
        for infos in by_key.values() {
            // The same value saved by two selectors is read from the last one.
            let mut saved: IndexMap<(u32, String), (SelectorId, usize)> = IndexMap::new();
            for (elem, (name, sel, col)) in infos {
                saved.insert((*elem, name.clone()), (*sel, *col));
            }
            let mut by_selector: IndexMap<SelectorId, ElemSet> = IndexMap::new();
            for ((elem, _), (sel, _)) in &saved {
                by_selector.entry(*sel).or_default().insert(*elem);
            }

            let mut grids: Vec<Grid> = Vec::new();
            for elems in by_selector.values() {
                let mut elems = elems.clone();
                for rg in &region_grids {
                    let inter: ElemSet = rg
                        .elems
                        .intersection(&elems)
                        .filter(|e| !covered.contains(e))
                        .copied()
                        .collect();
                    if !inter.is_empty() {
                        covered.extend(&inter);
                        grids.push(Grid::new(inter, rg.values.clone(), rg.path.clone()));
                    }
                }
                let mut split = Vec::with_capacity(grids.len() + 1);
                for mut g in grids {
                    if !elems.is_empty() {
                        let inter: ElemSet = g.elems.intersection(&elems).copied().collect();
                        if !inter.is_empty() {
                            g.elems.retain(|e| !inter.contains(e));
                            elems.retain(|e| !inter.contains(e));
                            split.push(Grid::new(inter, g.values.clone(), g.path.clone()));
                        }
                    }
                    if !g.elems.is_empty() {
                        split.push(g);
                    }
                }
                if !elems.is_empty() {
                    covered.extend(&elems);
                    split.push(Grid::new(elems, Vec::new(), GridPath::root(kind)));
                }
                grids = split;
            }

            let first = self.grids[slot(kind)].len();
            let mut elem_grid: BTreeMap<u32, usize> = BTreeMap::new();
            for (i, g) in grids.iter().enumerate() {
                for &e in &g.elems {
                    elem_grid.insert(e, first + i);
                }
            }
            self.grids[slot(kind)].extend(grids);

            let mut by_grid: IndexMap<(SelectorId, usize), IndexMap<String, Vec<(u32, usize)>>> =
                IndexMap::new();
            for ((elem, name), (sel, col)) in saved {
                let Some(&g) = elem_grid.get(&elem) else {
                    continue;
                };
                by_grid
                    .entry((sel, g))
                    .or_default()
                    .entry(name)
                    .or_default()
                    .push((elem, col));
            }
            for ((sel, g), values) in by_grid {
                for (name, mut cols) in values {
                    cols.sort_unstable();
                    let remap = self.remaps.entry(sel).or_default();
                    let value = GridValue {
                        name,
                        region: None,
                        selector: sel,
                        start: remap.len(),
                        step: 1,
                        count: cols.len(),
                        center: Center::of(kind),
                    };
                    remap.extend(cols.iter().map(|&(_, c)| c));
                    self.grids[slot(kind)][g].values.push(value);
                }
            }
        }

        for rg in region_grids {
            let rest: ElemSet = rg.elems.difference(&covered).copied().collect();
            if !rest.is_empty() {
                self.grids[slot(kind)].push(Grid::new(rest, rg.values, rg.path));
            }
        }
    }
}

/// Compartment and patch grids, split by region-tagged values.
fn region_grids(
    mesh: &dyn Mesh,
    tags: &Tags,
    owned: &[ElemSet],
) -> Result<[Vec<Grid>; 3], GridError> {
    let local = |kind: ElemKind, elems: &[u32]| -> ElemSet {
        elems
            .iter()
            .filter(|e| owned[slot(kind)].contains(e))
            .copied()
            .collect()
    };
    let mut grids: [Vec<Grid>; 3] = Default::default();
    for region in mesh.compartments().into_iter().chain(mesh.patches()) {
        let elems = local(region.kind, &region.elems);
        if !elems.is_empty() {
            let path = GridPath::region(region.kind, &region.name);
            grids[slot(region.kind)].push(Grid::new(elems, Vec::new(), path));
        }
    }

    for kind in [LocationKind::Roi, LocationKind::Comp, LocationKind::Patch] {
        for ((_, name), infos) in tags.regions.iter().filter(|((k, _), _)| *k == kind) {
            let region = mesh
                .region(kind, name)
                .ok_or_else(|| GridError::UnknownRegion {
                    kind,
                    name: name.clone(),
                })?;
            let mut elems = local(region.kind, &region.elems);
            let values: Vec<GridValue> = infos
                .iter()
                .map(|(n, sel, col)| GridValue {
                    name: n.clone(),
                    region: Some(kind),
                    selector: *sel,
                    start: *col,
                    step: 1,
                    count: 1,
                    center: Center::Grid,
                })
                .collect();
            let previous = std::mem::take(&mut grids[slot(region.kind)]);
            let mut split = Vec::with_capacity(previous.len() + 1);
            for mut g in previous {
                let inter: ElemSet = elems.intersection(&g.elems).copied().collect();
                elems.retain(|e| !inter.contains(e));
                g.elems.retain(|e| !inter.contains(e));
                if !inter.is_empty() {
                    let mut vals = values.clone();
                    vals.extend(g.values.iter().cloned());
                    split.push(Grid::new(inter, vals, g.path.clone()));
                }
                if !g.elems.is_empty() {
                    split.push(g);
                }
            }
            if !elems.is_empty() {
                split.push(Grid::new(elems, values, GridPath::root(region.kind)));
            }
            grids[slot(region.kind)] = split;
        }
    }
    Ok(grids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_core::{MetaData, Value};
    use recap_test_utils::MockMesh;

    /// Schema with one column per `(loc_type, loc_id, value name)`.
    fn schema(index: u32, cols: &[(&str, Value, &str)]) -> Schema {
        let mut metadata = MetaData::new();
        metadata.insert(
            "loc_type".into(),
            cols.iter().map(|(t, _, _)| Value::from(*t)).collect(),
        );
        metadata.insert(
            "loc_id".into(),
            cols.iter().map(|(_, id, _)| id.clone()).collect(),
        );
        Schema {
            index: SelectorId(index),
            description: format!("sel{index}"),
            labels: (0..cols.len()).map(|i| format!("c{i}")).collect(),
            metadata,
            value_names: cols.iter().map(|(_, _, n)| Some(n.to_string())).collect(),
        }
    }

    fn elems(v: &[u32]) -> ElemSet {
        v.iter().copied().collect()
    }

    #[test]
    fn element_values_split_compartments() {
        let s = schema(
            0,
            &[("tet", Value::Int(4), "A.Count"), ("tet", Value::Int(1), "A.Count")],
        );
        let part = Partition::build(&MockMesh::new(), &[s]).unwrap();
        let tets = part.grids(ElemKind::Tet);
        let sets: Vec<ElemSet> = tets.iter().map(|g| g.elems.clone()).collect();
        assert_eq!(sets, vec![elems(&[1]), elems(&[4]), elems(&[0, 2]), elems(&[3, 5])]);
        assert_eq!(tets[0].path.names(), vec!["tetGrids", "comp1"]);
        assert_eq!(tets[1].path.region.as_deref(), Some("comp2"));

        // Tet 1 is read first, from column 1.
        assert_eq!(tets[0].values[0].start, 0);
        assert_eq!(tets[1].values[0].start, 1);
        assert_eq!(tets[0].values[0].center, Center::Cell);
        assert!(tets[2].values.is_empty());
        assert_eq!(part.column_remap(SelectorId(0), 2), Some(vec![1, 0]));

        assert_eq!(part.grids(ElemKind::Tri).len(), 1);
        assert!(part.grids(ElemKind::Vert).is_empty());
        assert_eq!(part.values_of(SelectorId(0)).len(), 2);
    }

    #[test]
    fn region_values_attach_to_whole_grids() {
        let comp = schema(0, &[("comp", Value::from("comp1"), "A.Count")]);
        let roi = schema(1, &[("roi", Value::from("roi1"), "B.Count")]);
        let part = Partition::build(&MockMesh::new(), &[comp, roi]).unwrap();
        let tets = part.grids(ElemKind::Tet);
        assert_eq!(tets.len(), 3);
        assert_eq!(tets[0].elems, elems(&[1, 2]));
        let names: Vec<String> = tets[0].values.iter().map(|v| v.attribute_name()).collect();
        assert_eq!(names, vec!["A.Count (comp)", "B.Count (roi)"]);
        assert_eq!(tets[1].elems, elems(&[0]));
        assert_eq!(tets[1].values.len(), 1);
        assert_eq!(tets[1].values[0].center, Center::Grid);
        assert!(tets[2].values.is_empty());
        assert_eq!(part.column_remap(SelectorId(0), 1), None);
    }

    #[test]
    fn untagged_tets_and_identity_remaps() {
        let s = schema(
            0,
            &[("tet", Value::Int(0), "A.Count"), ("tet", Value::Int(1), "A.Count")],
        );
        let part = Partition::build(&MockMesh::new(), &[s]).unwrap();
        let covered: usize = part.grids(ElemKind::Tet).iter().map(|g| g.elems.len()).sum();
        assert_eq!(covered, 6);
        assert_eq!(part.column_remap(SelectorId(0), 3), None);
        assert_eq!(part.column_remap(SelectorId(7), 3), None);
    }

    #[test]
    fn only_owned_elements_are_partitioned() {
        let s = schema(
            0,
            &[("tet", Value::Int(0), "A.Count"), ("tet", Value::Int(3), "A.Count")],
        );
        let part = Partition::build(&MockMesh::partitioned(1, 2), &[s]).unwrap();
        let all: ElemSet = part
            .grids(ElemKind::Tet)
            .iter()
            .flat_map(|g| g.elems.iter().copied())
            .collect();
        assert_eq!(all, elems(&[1, 3, 5]));
        assert_eq!(part.values_of(SelectorId(0)).len(), 1);
        assert_eq!(part.values_of(SelectorId(0))[0].2.count, 1);
    }

    #[test]
    fn bad_locations_are_reported() {
        let s = schema(0, &[("comp", Value::from("nowhere"), "A.Count")]);
        assert!(matches!(
            Partition::build(&MockMesh::new(), &[s]),
            Err(GridError::UnknownRegion { .. })
        ));
        let s = schema(0, &[("cube", Value::Int(0), "A.Count")]);
        assert!(matches!(
            Partition::build(&MockMesh::new(), &[s]),
            Err(GridError::Location { column: 0, .. })
        ));
    }
}
