//! Mesh collaborator consumed by the grid partitioner and distribution.

use std::fmt;
use std::str::FromStr;

/// Kind of mesh element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElemKind {
    /// Tetrahedron (volume element).
    Tet,
    /// Triangle (surface element).
    Tri,
    /// Vertex.
    Vert,
}

impl ElemKind {
    /// All kinds in export order.
    pub const ALL: [ElemKind; 3] = [ElemKind::Tet, ElemKind::Tri, ElemKind::Vert];

    /// Short lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ElemKind::Tet => "tet",
            ElemKind::Tri => "tri",
            ElemKind::Vert => "vert",
        }
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a selector column's `loc_type` metadata refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationKind {
    /// Single tetrahedron.
    Tet,
    /// Single triangle.
    Tri,
    /// Single vertex.
    Vert,
    /// Named region of interest.
    Roi,
    /// Named compartment (a set of tets).
    Comp,
    /// Named patch (a set of tris).
    Patch,
}

impl LocationKind {
    /// Metadata string form.
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Tet => "tet",
            LocationKind::Tri => "tri",
            LocationKind::Vert => "vert",
            LocationKind::Roi => "roi",
            LocationKind::Comp => "comp",
            LocationKind::Patch => "patch",
        }
    }

    /// Element kind for single-element locations.
    pub fn elem_kind(self) -> Option<ElemKind> {
        match self {
            LocationKind::Tet => Some(ElemKind::Tet),
            LocationKind::Tri => Some(ElemKind::Tri),
            LocationKind::Vert => Some(ElemKind::Vert),
            _ => None,
        }
    }

    /// Whether the location names a region rather than one element.
    pub fn is_region(self) -> bool {
        self.elem_kind().is_none()
    }
}

impl FromStr for LocationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tet" => Ok(LocationKind::Tet),
            "tri" => Ok(LocationKind::Tri),
            "vert" => Ok(LocationKind::Vert),
            "roi" => Ok(LocationKind::Roi),
            "comp" => Ok(LocationKind::Comp),
            "patch" => Ok(LocationKind::Patch),
            other => Err(format!("unknown location type '{other}'")),
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named set of elements of one kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    /// Region name.
    pub name: String,
    /// Element kind of the members.
    pub kind: ElemKind,
    /// Global element indices.
    pub elems: Vec<u32>,
}

/// Read-only view of the simulation mesh.
///
/// All element indices are global. A distributed mesh reports only the
/// elements owned by the calling rank from [`elems`](Self::elems), while
/// regions always list their full membership.
pub trait Mesh {
    /// Elements of `kind` owned by this rank.
    fn elems(&self, kind: ElemKind) -> Vec<u32>;

    /// Compartments (tet regions).
    fn compartments(&self) -> Vec<Region>;

    /// Patches (tri regions).
    fn patches(&self) -> Vec<Region>;

    /// Look up a named region of the given location kind.
    fn region(&self, kind: LocationKind, name: &str) -> Option<Region>;

    /// Vertex indices of an element.
    fn verts_of(&self, kind: ElemKind, elem: u32) -> Vec<u32>;

    /// Position of a vertex.
    fn vert_position(&self, vert: u32) -> [f64; 3];
}
