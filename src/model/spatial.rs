//! Per-mode spatial indices over the fused vertex set.
//!
//! One R*-tree per street mode, holding the vertices reachable by that
//! mode (the target of at least one arc with a positive cost). The trees
//! are not persisted with the dataset; they are rebuilt from `vertices` +
//! `street_graph` on load.
//!
//! Tree lookups use Euclidean distance on raw (lon, lat) pairs. That is a
//! deliberate approximation: candidates are ranked by proximity only, and
//! callers applying hard distance caps re-measure with the great-circle
//! distance.

use rstar::{primitives::GeomWithData, RTree};

use super::types::{Mode, StreetArc, Vertex};
use crate::VertexId;

type IndexedVertex = GeomWithData<[f64; 2], VertexId>;

#[derive(Clone, Default)]
pub struct VertexTrees {
    walk: RTree<IndexedVertex>,
    cycle: RTree<IndexedVertex>,
    car: RTree<IndexedVertex>,
}

impl std::fmt::Debug for VertexTrees {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexTrees")
            .field("walk", &self.walk.size())
            .field("cycle", &self.cycle.size())
            .field("car", &self.car.size())
            .finish()
    }
}

impl VertexTrees {
    /// Rebuilds all three trees from the graph. Deterministic in the
    /// input; runs in O(n log n) per mode.
    pub fn build(vertices: &[Vertex], street_graph: &[Vec<StreetArc>]) -> Self {
        let mut walkable = vec![false; vertices.len()];
        let mut cyclable = vec![false; vertices.len()];
        let mut drivable = vec![false; vertices.len()];

        for arcs in street_graph {
            for arc in arcs {
                let t = arc.target as usize;
                walkable[t] |= arc.walk_ms > 0;
                cyclable[t] |= arc.cycle_ms > 0;
                drivable[t] |= arc.car_ms > 0;
            }
        }

        let collect = |reachable: &[bool]| {
            let points: Vec<IndexedVertex> = vertices
                .iter()
                .enumerate()
                .filter(|&(i, _)| reachable[i])
                .map(|(i, v)| GeomWithData::new([v.longitude, v.latitude], i as VertexId))
                .collect();
            RTree::bulk_load(points)
        };

        VertexTrees {
            walk: collect(&walkable),
            cycle: collect(&cyclable),
            car: collect(&drivable),
        }
    }

    fn tree(&self, mode: Mode) -> &RTree<IndexedVertex> {
        match mode {
            Mode::Foot => &self.walk,
            Mode::Bike => &self.cycle,
            Mode::Car => &self.car,
        }
    }

    /// The `k` mode-reachable vertices closest to the coordinate, nearest
    /// first.
    pub fn nearest(&self, mode: Mode, latitude: f64, longitude: f64, k: usize) -> Vec<VertexId> {
        self.tree(mode)
            .nearest_neighbor_iter(&[longitude, latitude])
            .take(k)
            .map(|p| p.data)
            .collect()
    }
}
