use std::collections::HashMap;
use std::time::Instant;

use log::info;
use s2::latlng::LatLng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Node, Way};

/// Mean Earth radius used for edge weights, in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphBuildError {
    #[error("way {way} references node id {node_id} with no valid node index")]
    MissingNodeReference { way: usize, node_id: i64 },

    #[error("way {way} has {len} nodes, at least two are required")]
    InvalidWay { way: usize, len: usize },

    #[error("edge {from} -> {to} leaves a graph over {node_count} nodes")]
    EdgeOutOfRange { from: usize, to: usize, node_count: usize },
}

pub type StatusOr<T> = Result<T, GraphBuildError>;

/// Directed weighted adjacency over node indices.
///
/// Weights are great-circle distances in meters. The node count is the length
/// of the node list the graph was built against, which bounds every valid index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    adjacency: HashMap<usize, HashMap<usize, f64>>,
    node_count: usize,
}

impl Graph {
    pub fn new(node_count: usize) -> Self {
        Self {
            adjacency: HashMap::new(),
            node_count,
        }
    }

    /// Insert or overwrite the edge `from -> to`; both ends get an adjacency entry.
    /// Both ends must be below the node count.
    pub fn add_edge(&mut self, from: usize, to: usize, weight: f64) -> StatusOr<()> {
        if from >= self.node_count || to >= self.node_count {
            return Err(GraphBuildError::EdgeOutOfRange {
                from,
                to,
                node_count: self.node_count,
            });
        }

        self.adjacency.entry(to).or_default();
        self.adjacency.entry(from).or_default().insert(to, weight);
        Ok(())
    }

    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flat_map(|edges| edges.iter().map(|(&to, &weight)| (to, weight)))
    }

    pub fn weight(&self, from: usize, to: usize) -> Option<f64> {
        self.adjacency.get(&from)?.get(&to).copied()
    }

    /// Node indices that appear as the end of at least one edge
    pub fn nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn contains(&self, node: usize) -> bool {
        self.adjacency.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of nodes that carry an adjacency entry
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(HashMap::len).sum()
    }
}

/// Great-circle distance between two nodes in meters
pub fn haversine(a: &Node, b: &Node) -> f64 {
    let start = LatLng::from_degrees(a.lat, a.lon);
    let end = LatLng::from_degrees(b.lat, b.lon);
    start.distance(&end).rad() * EARTH_RADIUS_METERS
}

/// Build the routing graph from `ways`.
///
/// Consecutive node pairs of each way become edges. Ways tagged `oneway=yes` or
/// `junction=roundabout` only get forward edges. Any unresolvable node id
/// aborts the build.
pub fn build_graph(
    ways: &[Way],
    nodes: &[Node],
    node_id_to_index: &HashMap<i64, usize>,
) -> StatusOr<Graph> {
    let start_time = Instant::now();
    let mut graph = Graph::new(nodes.len());
    let mut oneway_count = 0;

    for (way_idx, way) in ways.iter().enumerate() {
        if !way.is_valid() {
            return Err(GraphBuildError::InvalidWay {
                way: way_idx,
                len: way.node_ids.len(),
            });
        }

        // Resolve the whole way first so a bad reference leaves nothing behind
        let indices = way
            .node_ids
            .iter()
            .map(|node_id| {
                node_id_to_index
                    .get(node_id)
                    .copied()
                    .filter(|&idx| idx < nodes.len())
                    .ok_or(GraphBuildError::MissingNodeReference {
                        way: way_idx,
                        node_id: *node_id,
                    })
            })
            .collect::<StatusOr<Vec<usize>>>()?;

        let is_oneway = way.is_oneway();
        if is_oneway {
            oneway_count += 1;
        }

        for pair in indices.windows(2) {
            let (start_idx, end_idx) = (pair[0], pair[1]);
            let distance = haversine(&nodes[start_idx], &nodes[end_idx]);

            graph.add_edge(start_idx, end_idx, distance)?;
            if !is_oneway {
                graph.add_edge(end_idx, start_idx, distance)?;
            }
        }
    }

    info!(
        "Built graph with {} nodes and {} edges from {} ways ({} one-way), took {:?}",
        graph.len(),
        graph.edge_count(),
        ways.len(),
        oneway_count,
        start_time.elapsed()
    );

    Ok(graph)
}
