//! A small strip mesh.
//!
//! `TETS` tetrahedra laid along the x axis, tet `i` spanning vertices
//! `i..i + 4`. Triangles `i` span vertices `i..i + 3`. Two compartments
//! split the tets in half, one patch covers every triangle and one ROI
//! holds tets 1 and 2.

use recap_core::{ElemKind, LocationKind, Mesh, Region};

pub const TETS: u32 = 6;
pub const TRIS: u32 = 4;
pub const VERTS: u32 = TETS + 3;

/// Strip mesh, optionally partitioned by `elem % size == rank`.
#[derive(Clone, Debug)]
pub struct MockMesh {
    rank: u32,
    size: u32,
}

impl MockMesh {
    pub fn new() -> Self {
        Self { rank: 0, size: 1 }
    }

    /// Same mesh as seen from `rank` of `size`.
    pub fn partitioned(rank: u32, size: u32) -> Self {
        Self {
            rank,
            size: size.max(1),
        }
    }

    pub fn owns(&self, elem: u32) -> bool {
        elem % self.size == self.rank
    }

    pub fn count(kind: ElemKind) -> u32 {
        match kind {
            ElemKind::Tet => TETS,
            ElemKind::Tri => TRIS,
            ElemKind::Vert => VERTS,
        }
    }

    pub fn compartment_names() -> [&'static str; 2] {
        ["comp1", "comp2"]
    }

    fn all_regions() -> Vec<(LocationKind, Region)> {
        vec![
            (
                LocationKind::Comp,
                Region {
                    name: "comp1".into(),
                    kind: ElemKind::Tet,
                    elems: (0..TETS / 2).collect(),
                },
            ),
            (
                LocationKind::Comp,
                Region {
                    name: "comp2".into(),
                    kind: ElemKind::Tet,
                    elems: (TETS / 2..TETS).collect(),
                },
            ),
            (
                LocationKind::Patch,
                Region {
                    name: "patch1".into(),
                    kind: ElemKind::Tri,
                    elems: (0..TRIS).collect(),
                },
            ),
            (
                LocationKind::Roi,
                Region {
                    name: "roi1".into(),
                    kind: ElemKind::Tet,
                    elems: vec![1, 2],
                },
            ),
        ]
    }

    /// Kind of the named region, if any.
    pub fn region_kind(name: &str) -> Option<LocationKind> {
        Self::all_regions()
            .into_iter()
            .find(|(_, r)| r.name == name)
            .map(|(k, _)| k)
    }
}

impl Default for MockMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh for MockMesh {
    fn elems(&self, kind: ElemKind) -> Vec<u32> {
        (0..Self::count(kind)).filter(|&e| self.owns(e)).collect()
    }

    fn compartments(&self) -> Vec<Region> {
        Self::all_regions()
            .into_iter()
            .filter(|(k, _)| *k == LocationKind::Comp)
            .map(|(_, r)| r)
            .collect()
    }

    fn patches(&self) -> Vec<Region> {
        Self::all_regions()
            .into_iter()
            .filter(|(k, _)| *k == LocationKind::Patch)
            .map(|(_, r)| r)
            .collect()
    }

    fn region(&self, kind: LocationKind, name: &str) -> Option<Region> {
        Self::all_regions()
            .into_iter()
            .find(|(k, r)| *k == kind && r.name == name)
            .map(|(_, r)| r)
    }

    fn verts_of(&self, kind: ElemKind, elem: u32) -> Vec<u32> {
        match kind {
            ElemKind::Tet => (elem..elem + 4).collect(),
            ElemKind::Tri => (elem..elem + 3).collect(),
            ElemKind::Vert => vec![elem],
        }
    }

    fn vert_position(&self, vert: u32) -> [f64; 3] {
        [vert as f64, (vert % 2) as f64, (vert % 3) as f64]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_every_tet_once() {
        let parts: Vec<Vec<u32>> = (0..3)
            .map(|r| MockMesh::partitioned(r, 3).elems(ElemKind::Tet))
            .collect();
        let mut all: Vec<u32> = parts.concat();
        all.sort_unstable();
        assert_eq!(all, (0..TETS).collect::<Vec<_>>());
    }

    #[test]
    fn regions() {
        let m = MockMesh::new();
        assert_eq!(m.compartments().len(), 2);
        assert_eq!(m.region(LocationKind::Roi, "roi1").unwrap().elems, vec![1, 2]);
        assert!(m.region(LocationKind::Comp, "roi1").is_none());
        assert_eq!(MockMesh::region_kind("patch1"), Some(LocationKind::Patch));
    }
}
