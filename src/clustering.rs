//! Destination clustering by proximity.
//!
//! Two destinations are linked when their haversine distance is within the
//! radius; clusters are the connected components of that graph. Every point
//! belongs to a cluster, singletons included, so members of one cluster are
//! only chain-connected, not pairwise close.

use rayon::prelude::*;

use crate::geodesy::haversine_m;
use crate::trip::Coordinate;

/// Default proximity radius for destinations, in meters.
pub const DEFAULT_CLUSTER_RADIUS_M: f64 = 100.0;

/// Disjoint-set forest over `0..n` with path compression and union by size.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let (big, small) = if self.size[root_a] >= self.size[root_b] {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

/// Assigns a cluster id to every destination.
///
/// Ids are dense and numbered by first appearance in `points`, so identical
/// input order yields identical labels. O(n²) distance evaluations.
pub fn cluster_destinations(points: &[Coordinate], radius_m: f64) -> Vec<usize> {
    let n = points.len();

    let edges: Vec<(usize, usize)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            ((i + 1)..n)
                .filter(move |&j| haversine_m(points[i], points[j]) <= radius_m)
                .map(move |j| (i, j))
        })
        .collect();

    let mut forest = UnionFind::new(n);
    for (a, b) in edges {
        forest.union(a, b);
    }

    let mut root_labels: Vec<Option<usize>> = vec![None; n];
    let mut next_label = 0;
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let root = forest.find(i);
        let label = *root_labels[root].get_or_insert_with(|| {
            next_label += 1;
            next_label - 1
        });
        labels.push(label);
    }

    labels
}
