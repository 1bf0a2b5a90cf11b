//! Vertex positions and connectivity of one grid.

use recap_core::{ElemKind, Mesh};
use recap_store::{Data, Dataset};

use crate::partition::ElemSet;

/// XDMF `Mixed` topology code and row width of each element kind.
pub fn topology_code(kind: ElemKind) -> Option<(i64, usize)> {
    match kind {
        ElemKind::Tet => Some((6, 5)),
        ElemKind::Tri => Some((4, 4)),
        ElemKind::Vert => None,
    }
}

/// Geometry of a grid with grid-local vertex numbering.
#[derive(Clone, Debug, PartialEq)]
pub struct GridGeometry {
    /// Global index of every grid vertex.
    pub vert_inds: Vec<u32>,
    /// Global index of every element.
    pub elem_inds: Vec<u32>,
    /// Vertex positions, three per vertex.
    pub xyz: Vec<f64>,
    /// Topology rows `[code, v0, v1, ...]` of tets and tris.
    pub topology: Option<Vec<i64>>,
}

impl GridGeometry {
    /// Geometry of the `kind` elements in `elems`.
    ///
    /// Vertices are numbered in order of first use.
    pub fn build(mesh: &dyn Mesh, kind: ElemKind, elems: &ElemSet) -> Self {
        let elem_inds: Vec<u32> = elems.iter().copied().collect();
        let Some((code, _)) = topology_code(kind) else {
            return Self {
                xyz: elem_inds.iter().flat_map(|&v| mesh.vert_position(v)).collect(),
                vert_inds: elem_inds.clone(),
                elem_inds,
                topology: None,
            };
        };
        let mut vert_inds = Vec::new();
        let mut topology = Vec::new();
        for &e in &elem_inds {
            topology.push(code);
            for v in mesh.verts_of(kind, e) {
                let local = match vert_inds.iter().position(|&x| x == v) {
                    Some(i) => i,
                    None => {
                        vert_inds.push(v);
                        vert_inds.len() - 1
                    }
                };
                topology.push(local as i64);
            }
        }
        Self {
            xyz: vert_inds.iter().flat_map(|&v| mesh.vert_position(v)).collect(),
            vert_inds,
            elem_inds,
            topology: Some(topology),
        }
    }

    /// Number of grid vertices.
    pub fn nb_verts(&self) -> usize {
        self.vert_inds.len()
    }

    /// Number of elements.
    pub fn nb_elems(&self) -> usize {
        self.elem_inds.len()
    }

    /// Datasets to store under the grid's mesh group, by name.
    pub fn datasets(&self, kind: ElemKind) -> Vec<(&'static str, Dataset)> {
        let ints = |v: &[u32]| Dataset::vector(Data::I64(v.iter().map(|&i| i as i64).collect()));
        let mut out = vec![
            ("vertInds", ints(&self.vert_inds)),
            ("elemInds", ints(&self.elem_inds)),
            (
                "XYZ",
                Dataset {
                    shape: vec![self.nb_verts(), 3],
                    data: Data::F64(self.xyz.clone()),
                },
            ),
        ];
        if let (Some(topo), Some(_)) = (&self.topology, topology_code(kind)) {
            out.push(("topology", Dataset::vector(Data::I64(topo.clone()))));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_test_utils::MockMesh;

    #[test]
    fn tets_share_vertices() {
        let elems: ElemSet = [0, 1].into_iter().collect();
        let g = GridGeometry::build(&MockMesh::new(), ElemKind::Tet, &elems);
        // Tet 0 spans vertices 0..4 and tet 1 spans 1..5.
        assert_eq!(g.vert_inds, vec![0, 1, 2, 3, 4]);
        assert_eq!(g.topology, Some(vec![6, 0, 1, 2, 3, 6, 1, 2, 3, 4]));
        assert_eq!(g.xyz.len(), 15);
        assert_eq!(&g.xyz[3..6], &[1.0, 1.0, 1.0]);
        let names: Vec<&str> = g.datasets(ElemKind::Tet).iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["vertInds", "elemInds", "XYZ", "topology"]);
    }

    #[test]
    fn vertices_have_no_topology() {
        let elems: ElemSet = [2, 5].into_iter().collect();
        let g = GridGeometry::build(&MockMesh::new(), ElemKind::Vert, &elems);
        assert_eq!(g.vert_inds, vec![2, 5]);
        assert_eq!(g.nb_elems(), 2);
        assert!(g.topology.is_none());
        assert_eq!(g.datasets(ElemKind::Vert).len(), 3);
    }
}
