//! XDMF descriptors of saved runs.
//!
//! One document per run and rank:
//!
//! ```text
//! Xdmf/Domain/Grid "SpatialGrids"               spatial collection
//!   Grid "tetGrids"                             spatial collection
//!     Grid "comp1"                              spatial collection
//!       Grid "tetGrid0"                         temporal collection
//!         Grid "tetGrid0_0"  Time, Topology, Geometry, Attribute...
//!         Grid "tetGrid0_1"  Time, references to the first grid, ...
//! ```
//!
//! Element values are hyperslabs of the saved `data` dataset; region values
//! are written inline. When ranks save separately, the coordinator also
//! writes a document including every rank's temporal collections.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use recap_core::{ElemKind, Rank, RunId, SelectorId, Value};
use recap_store::hier::selector_path;
use tracing::{debug, warn};

use crate::error::GridError;
use crate::geometry::topology_code;
use crate::partition::{Center, GridValue, Partition};

/// Name of the group holding grid geometry inside a run group.
pub const MESH_GROUP: &str = "mesh";

/// Extension of descriptor files.
pub const EXTENSION: &str = "xmf";

/// Descriptor of run `run` written by `rank`.
pub fn file_name(uid: &str, run: RunId, rank: Rank) -> String {
    format!("{uid}_Run{}_rank{}.{EXTENSION}", run.0, rank.0)
}

/// Descriptor of run `run` including every rank.
pub fn full_file_name(uid: &str, run: RunId) -> String {
    format!("{uid}_Run{}_Full.{EXTENSION}", run.0)
}

// ── XML tree ────────────────────────────────────────────────────

#[derive(Debug)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<usize>,
}

/// An XML document built incrementally, nodes addressed by index.
#[derive(Debug)]
struct XmlDoc {
    nodes: Vec<XmlNode>,
}

impl XmlDoc {
    const ROOT: usize = 0;

    fn new(root: &str, attrs: &[(&str, &str)]) -> Self {
        let mut doc = Self { nodes: Vec::new() };
        doc.push(root, attrs);
        doc
    }

    fn push(&mut self, name: &str, attrs: &[(&str, &str)]) -> usize {
        self.nodes.push(XmlNode {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn add(&mut self, parent: usize, name: &str, attrs: &[(&str, &str)]) -> usize {
        let id = self.push(name, attrs);
        self.nodes[parent].children.push(id);
        id
    }

    fn add_text(
        &mut self,
        parent: usize,
        name: &str,
        attrs: &[(&str, &str)],
        text: String,
    ) -> usize {
        let id = self.add(parent, name, attrs);
        self.nodes[id].text = Some(text);
        id
    }

    fn to_bytes(&self) -> Result<Vec<u8>, GridError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
        self.write_node(&mut writer, Self::ROOT)?;
        Ok(writer.into_inner())
    }

    fn write_node(
        &self,
        writer: &mut Writer<Vec<u8>>,
        id: usize,
    ) -> Result<(), quick_xml::Error> {
        let node = &self.nodes[id];
        let mut start = BytesStart::new(node.name.as_str());
        for (k, v) in &node.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if node.text.is_none() && node.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        if let Some(text) = &node.text {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for &c in &node.children {
            self.write_node(writer, c)?;
        }
        writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
        Ok(())
    }
}

/// A descriptor with its nested spatial collections.
#[derive(Debug)]
struct Descriptor {
    doc: XmlDoc,
    root: usize,
    collections: HashMap<Vec<String>, usize>,
}

impl Descriptor {
    fn new() -> Self {
        let mut doc = XmlDoc::new(
            "Xdmf",
            &[("Version", "2.0"), ("xmlns:xi", "http://www.w3.org/2001/XInclude")],
        );
        let domain = doc.add(XmlDoc::ROOT, "Domain", &[]);
        let root = doc.add(domain, "Grid", &spatial("SpatialGrids"));
        Self {
            doc,
            root,
            collections: HashMap::new(),
        }
    }

    /// Spatial collection at `names`, created with its ancestors.
    fn collection(&mut self, names: &[String]) -> usize {
        let mut parent = self.root;
        for depth in 1..=names.len() {
            let key = names[..depth].to_vec();
            parent = match self.collections.get(&key) {
                Some(&id) => id,
                None => {
                    let id = self.doc.add(parent, "Grid", &spatial(&names[depth - 1]));
                    self.collections.insert(key, id);
                    id
                }
            };
        }
        parent
    }
}

fn spatial(name: &str) -> [(&str, &str); 3] {
    [("Name", name), ("GridType", "Collection"), ("CollectionType", "Spatial")]
}

/// XPath of the temporal collection `grid` nested in `names`.
fn xml_path(names: &[String], grid: &str) -> String {
    let mut path = String::from("/Xdmf/Domain/Grid");
    for n in names.iter().map(String::as_str).chain([grid]) {
        path.push_str(&format!("/Grid[@Name='{n}']"));
    }
    path
}

// ── Writer ──────────────────────────────────────────────────────

/// Placement of one grid, shared by every run.
#[derive(Clone, Debug)]
pub struct GridEntry {
    /// Element kind.
    pub kind: ElemKind,
    /// Temporal collection name.
    pub name: String,
    /// Enclosing spatial collections.
    pub names: Vec<String>,
    /// Number of vertices.
    pub nb_verts: usize,
    /// Number of elements.
    pub nb_elems: usize,
    /// Values attached to the grid.
    pub values: Vec<GridValue>,
}

impl GridEntry {
    fn xml_path(&self) -> String {
        xml_path(&self.names, &self.name)
    }

    /// Where the grid's temporal collection sits in a descriptor.
    pub fn location(&self) -> Location {
        (self.names.clone(), self.xml_path())
    }
}

/// Temporal collection location reported to the coordinator:
/// `(spatial collection names, xpath)`.
pub type Location = (Vec<String>, String);

/// Grid names for the grids of `partition`, with their geometry sizes.
///
/// `sizes` gives `(vertices, elements)` per grid in partition order.
pub fn grid_entries(
    partition: &Partition,
    sizes: &[(usize, usize)],
    rank: Option<Rank>,
) -> Vec<GridEntry> {
    let mut out = Vec::new();
    let mut sizes = sizes.iter();
    for kind in ElemKind::ALL {
        for (i, g) in partition.grids(kind).iter().enumerate() {
            let &(nb_verts, nb_elems) = sizes.next().unwrap_or(&(0, 0));
            let name = match rank {
                Some(r) => format!("{kind}Grid{i}_rank{}", r.0),
                None => format!("{kind}Grid{i}"),
            };
            out.push(GridEntry {
                kind,
                name,
                names: g.path.names(),
                nb_verts,
                nb_elems,
                values: g.values.clone(),
            });
        }
    }
    out
}

#[derive(Debug)]
struct Temporal {
    node: usize,
    time: Option<f64>,
    current: Option<usize>,
}

#[derive(Debug)]
struct RunDoc {
    id: RunId,
    desc: Descriptor,
    temporal: Vec<Temporal>,
    full: Option<Descriptor>,
}

/// Writes the descriptors of one run group on one rank.
#[derive(Debug)]
pub struct XdmfWriter {
    folder: PathBuf,
    uid: String,
    data_file: String,
    rank: Rank,
    grids: Vec<GridEntry>,
    by_selector: BTreeMap<SelectorId, Vec<(usize, GridValue)>>,
    lens: BTreeMap<SelectorId, usize>,
    peers: Option<Vec<Vec<Location>>>,
    run: Option<RunDoc>,
    dirty: bool,
    written: Vec<PathBuf>,
}

impl XdmfWriter {
    /// Writer for run group `uid` whose results live in `data_file`.
    ///
    /// `lens` gives the saved row length of every selector. `peers`, on the
    /// coordinator of a distributed group, holds the locations reported by
    /// every rank.
    pub fn new(
        folder: impl AsRef<Path>,
        uid: &str,
        data_file: &str,
        rank: Rank,
        grids: Vec<GridEntry>,
        lens: BTreeMap<SelectorId, usize>,
        peers: Option<Vec<Vec<Location>>>,
    ) -> Self {
        let mut by_selector: BTreeMap<SelectorId, Vec<(usize, GridValue)>> = BTreeMap::new();
        for (i, g) in grids.iter().enumerate() {
            for v in &g.values {
                by_selector.entry(v.selector).or_default().push((i, v.clone()));
            }
        }
        Self {
            folder: folder.as_ref().to_path_buf(),
            uid: uid.to_string(),
            data_file: data_file.to_string(),
            rank,
            grids,
            by_selector,
            lens,
            peers,
            run: None,
            dirty: false,
            written: Vec::new(),
        }
    }

    /// Locations of this rank's temporal collections.
    pub fn locations(&self) -> Vec<Location> {
        self.grids.iter().map(GridEntry::location).collect()
    }

    /// Descriptor files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Begin the descriptor of run `id`, writing out the previous one.
    ///
    /// Every grid gets a first time step at `t = 0`. Calling it again for
    /// the current run does nothing.
    pub fn start_run(&mut self, id: RunId) -> Result<(), GridError> {
        if self.run.as_ref().is_some_and(|r| r.id == id) {
            return Ok(());
        }
        self.flush()?;
        let mut desc = Descriptor::new();
        let mut temporal = Vec::with_capacity(self.grids.len());
        for g in &self.grids {
            let parent = desc.collection(&g.names);
            let node = desc.doc.add(
                parent,
                "Grid",
                &[
                    ("Name", g.name.as_str()),
                    ("GridType", "Collection"),
                    ("CollectionType", "Temporal"),
                ],
            );
            temporal.push(Temporal {
                node,
                time: None,
                current: None,
            });
        }
        let full = self.peers.as_ref().map(|peers| {
            let mut full = Descriptor::new();
            for (r, locations) in peers.iter().enumerate() {
                let href = file_name(&self.uid, id, Rank(r as u32));
                for (names, path) in locations {
                    let parent = full.collection(names);
                    let pointer = format!("xpointer({path})");
                    full.doc.add(
                        parent,
                        "xi:include",
                        &[("href", href.as_str()), ("xpointer", pointer.as_str())],
                    );
                }
            }
            full
        });
        let mut run = RunDoc {
            id,
            desc,
            temporal,
            full,
        };
        for i in 0..self.grids.len() {
            self.add_time_step(&mut run, i, 0.0, 0);
        }
        debug!(uid = %self.uid, run = id.0, grids = self.grids.len(), "xdmf run started");
        self.run = Some(run);
        self.dirty = true;
        Ok(())
    }

    /// Describe row `tind` of selector `id`, saved at time `t`.
    pub fn time_step(
        &mut self,
        id: SelectorId,
        t: f64,
        tind: usize,
        row: &[Value],
    ) -> Result<(), GridError> {
        let Some(mut run) = self.run.take() else {
            return Ok(());
        };
        let values = self.by_selector.get(&id).cloned().unwrap_or_default();
        let len = self.lens.get(&id).copied().unwrap_or(row.len());
        for (gi, value) in values {
            if run.temporal[gi].time != Some(t) {
                self.add_time_step(&mut run, gi, t, tind);
            }
            let Some(grid) = run.temporal[gi].current else {
                continue;
            };
            let attr = run.desc.doc.add(
                grid,
                "Attribute",
                &[
                    ("Name", value.attribute_name().as_str()),
                    ("AttributeType", "Scalar"),
                    ("Center", value.center.as_str()),
                ],
            );
            if value.center == Center::Grid {
                let x = row.get(value.start).and_then(Value::as_f64).unwrap_or(f64::NAN);
                run.desc.doc.add_text(
                    attr,
                    "DataItem",
                    &[("DataType", "Float"), ("Dimensions", "1"), ("Format", "XML")],
                    format!("{x}"),
                );
            } else {
                self.hyperslab(&mut run, attr, &value, len, tind);
            }
        }
        self.run = Some(run);
        self.dirty = true;
        Ok(())
    }

    fn hyperslab(
        &self,
        run: &mut RunDoc,
        parent: usize,
        value: &GridValue,
        len: usize,
        tind: usize,
    ) {
        let doc = &mut run.desc.doc;
        let count = value.count.to_string();
        let dims = format!("{} {len}", tind + 1);
        let slab = doc.add(
            parent,
            "DataItem",
            &[("ItemType", "HyperSlab"), ("Dimensions", count.as_str())],
        );
        doc.add_text(
            slab,
            "DataItem",
            &[("Dimensions", "3 2"), ("NumberType", "Int"), ("Format", "XML")],
            format!("{tind} {} 1 {} 1 {}", value.start, value.step, value.count),
        );
        doc.add_text(
            slab,
            "DataItem",
            &[
                ("DataType", "Float"),
                ("Dimensions", dims.as_str()),
                ("Format", "HDF"),
                ("Precision", "8"),
            ],
            format!(
                "{}:/{}/runs/Run_{}/data",
                self.data_file,
                selector_path(&self.uid, value.selector),
                run.id.0
            ),
        );
    }

    /// Open a new uniform grid in temporal collection `gi`.
    fn add_time_step(&self, run: &mut RunDoc, gi: usize, t: f64, tind: usize) {
        let g = &self.grids[gi];
        let temporal = &run.temporal[gi];
        let doc = &mut run.desc.doc;
        let name = format!("{}_{tind}", g.name);
        let time = format!("{t}");
        let elems = g.nb_elems.to_string();
        let grid = doc.add(
            temporal.node,
            "Grid",
            &[("Name", name.as_str()), ("GridType", "Uniform")],
        );
        doc.add(grid, "Time", &[("Value", time.as_str())]);
        let mesh = format!("{}:/{}/{MESH_GROUP}/{}", self.data_file, self.uid, g.name);
        if temporal.current.is_none() {
            match topology_code(g.kind) {
                None => {
                    doc.add(
                        grid,
                        "Topology",
                        &[
                            ("TopologyType", "PolyVertex"),
                            ("NumberOfElements", elems.as_str()),
                        ],
                    );
                }
                Some((_, cols)) => {
                    let values = (g.nb_elems * cols).to_string();
                    let topo = doc.add(
                        grid,
                        "Topology",
                        &[("TopologyType", "Mixed"), ("Dimensions", elems.as_str())],
                    );
                    doc.add_text(
                        topo,
                        "DataItem",
                        &[
                            ("DataType", "Int"),
                            ("Dimensions", values.as_str()),
                            ("Format", "HDF"),
                            ("Precision", "8"),
                        ],
                        format!("{mesh}/topology"),
                    );
                }
            }
            let coords = format!("{} 3", g.nb_verts);
            let geo = doc.add(grid, "Geometry", &[("GeometryType", "XYZ")]);
            doc.add_text(
                geo,
                "DataItem",
                &[
                    ("DataType", "Float"),
                    ("Dimensions", coords.as_str()),
                    ("Format", "HDF"),
                    ("Precision", "8"),
                ],
                format!("{mesh}/XYZ"),
            );
        } else {
            let path = g.xml_path();
            for part in ["Topology", "Geometry"] {
                doc.add_text(
                    grid,
                    part,
                    &[("Reference", "XML")],
                    format!("{path}/Grid/{part}"),
                );
            }
        }
        let temporal = &mut run.temporal[gi];
        temporal.time = Some(t);
        temporal.current = Some(grid);
    }

    /// Write the descriptors of the current run.
    pub fn flush(&mut self) -> Result<(), GridError> {
        let Some(run) = self.run.as_ref().filter(|_| self.dirty) else {
            return Ok(());
        };
        fs::create_dir_all(&self.folder)?;
        let mut files = vec![(file_name(&self.uid, run.id, self.rank), &run.desc)];
        if let Some(full) = &run.full {
            files.push((full_file_name(&self.uid, run.id), full));
        }
        let mut written = Vec::new();
        for (name, desc) in files {
            let path = self.folder.join(name);
            fs::write(&path, desc.doc.to_bytes()?)?;
            written.push(path);
        }
        for p in written {
            if !self.written.contains(&p) {
                self.written.push(p);
            }
        }
        self.dirty = false;
        Ok(())
    }
}

impl Drop for XdmfWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(uid = %self.uid, error = %e, "could not write xdmf descriptor");
        }
    }
}
