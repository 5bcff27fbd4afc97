use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::Graph;

/// Examined edges are reported in batches of this size unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouteError {
    #[error("node index {index} is out of range for a graph over {node_count} nodes")]
    NodeIndexOutOfRange { index: usize, node_count: usize },

    #[error("node {target} was not reached from {start}")]
    TargetUnreachable { start: usize, target: usize },

    #[error("predecessor chain from {target} does not lead back to {start}")]
    BrokenChain { start: usize, target: usize },
}

pub type StatusOr<T> = Result<T, RouteError>;

/// An edge looked at while expanding a settled node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitedEdge {
    pub from: usize,
    pub to: usize,
}

/// Receives examined edges as the search runs
pub trait ProgressSink {
    fn flush(&mut self, batch: &[VisitedEdge]);
}

impl<F> ProgressSink for F
where
    F: FnMut(&[VisitedEdge]),
{
    fn flush(&mut self, batch: &[VisitedEdge]) {
        (*self)(batch)
    }
}

/// How a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Every node of the graph was settled
    Completed,
    /// The frontier emptied with nodes left unsettled
    Unreachable,
}

/// Shortest-path tree rooted at `source`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub source: usize,
    pub node_count: usize,

    /// Predecessor of every reached node except the source
    pub previous: HashMap<usize, usize>,

    /// Final distance in meters of every settled node
    pub distances: HashMap<usize, f64>,

    /// Nodes in the order they were settled
    pub settle_order: Vec<usize>,

    pub outcome: Outcome,
}

impl PathResult {
    fn unreached(source: usize, node_count: usize) -> Self {
        Self {
            source,
            node_count,
            previous: HashMap::new(),
            distances: HashMap::new(),
            settle_order: Vec::new(),
            outcome: Outcome::Unreachable,
        }
    }

    pub fn distance_to(&self, target: usize) -> Option<f64> {
        self.distances.get(&target).copied()
    }

    pub fn path_to(&self, target: usize) -> StatusOr<Vec<usize>> {
        find_path(self, target)
    }
}

// Min-heap entry; BinaryHeap is a max-heap so the ordering is reversed
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    distance: f64,
    node: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance.total_cmp(&self.distance)
    }
}

/// Single-source Dijkstra over `graph`.
///
/// The heap uses lazy deletion: a node may sit in it several times with
/// outdated distances, and those entries are dropped when popped after the
/// node has been settled. The heap can therefore grow past the node count.
///
/// Every examined edge goes to `progress` in batches of `batch_size`, with one
/// final flush when the search stops.
pub fn dijkstra<P: ProgressSink>(
    graph: &Graph,
    source: usize,
    batch_size: usize,
    progress: &mut P,
) -> StatusOr<PathResult> {
    let node_count = graph.node_count();

    if graph.is_empty() {
        debug!("Empty graph, nothing reachable from {}", source);
        return Ok(PathResult::unreached(source, node_count));
    }

    if source >= node_count {
        return Err(RouteError::NodeIndexOutOfRange { index: source, node_count });
    }

    let start_time = Instant::now();
    let batch_size = batch_size.max(1);

    let mut distance = vec![f64::INFINITY; node_count];
    let mut settled = vec![false; node_count];
    let mut previous = HashMap::new();
    let mut settle_order = Vec::new();
    let mut batch = Vec::with_capacity(batch_size);
    let mut heap = BinaryHeap::new();

    distance[source] = 0.0;
    heap.push(HeapEntry { distance: 0.0, node: source });

    while let Some(HeapEntry { node: u, .. }) = heap.pop() {
        if settled[u] {
            continue;
        }
        // Nothing closer can remain once an unreached node surfaces
        if distance[u] == f64::INFINITY {
            break;
        }

        settled[u] = true;
        settle_order.push(u);

        for (v, weight) in graph.neighbors(u) {
            batch.push(VisitedEdge { from: u, to: v });
            if batch.len() >= batch_size {
                progress.flush(&batch);
                batch.clear();
            }

            if settled[v] {
                continue;
            }

            let candidate = distance[u] + weight;
            if candidate < distance[v] {
                distance[v] = candidate;
                previous.insert(v, u);
                heap.push(HeapEntry { distance: candidate, node: v });
            }
        }
    }

    progress.flush(&batch);

    let outcome = if graph.nodes().all(|node| settled[node]) {
        Outcome::Completed
    } else {
        Outcome::Unreachable
    };

    let distances = settle_order
        .iter()
        .map(|&node| (node, distance[node]))
        .collect::<HashMap<_, _>>();

    info!(
        "Dijkstra from {} settled {} of {} nodes ({:?}), took {:?}",
        source,
        settle_order.len(),
        graph.len(),
        outcome,
        start_time.elapsed()
    );

    Ok(PathResult {
        source,
        node_count,
        previous,
        distances,
        settle_order,
        outcome,
    })
}

/// Walk the predecessor chain back from `target`, returning `[source, .., target]`.
///
/// The source itself resolves to the one-node path `[source]`.
pub fn find_path(result: &PathResult, target: usize) -> StatusOr<Vec<usize>> {
    if target >= result.node_count {
        return Err(RouteError::NodeIndexOutOfRange {
            index: target,
            node_count: result.node_count,
        });
    }

    if target == result.source {
        return Ok(vec![target]);
    }

    if !result.previous.contains_key(&target) {
        return Err(RouteError::TargetUnreachable {
            start: result.source,
            target,
        });
    }

    let mut path = vec![target];
    let mut current = target;
    while let Some(&prev) = result.previous.get(&current) {
        path.push(prev);
        current = prev;

        // A chain longer than the map itself has a cycle in it
        if path.len() > result.previous.len() + 1 {
            return Err(RouteError::BrokenChain {
                start: result.source,
                target,
            });
        }
    }

    if current != result.source {
        return Err(RouteError::BrokenChain {
            start: result.source,
            target,
        });
    }

    path.reverse();
    Ok(path)
}

/// Sum of edge weights along `path`, or None if a hop is not an edge
pub fn path_length(graph: &Graph, path: &[usize]) -> Option<f64> {
    path.windows(2)
        .map(|hop| graph.weight(hop[0], hop[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const A: usize = 0;
    const B: usize = 1;
    const C: usize = 2;
    const D: usize = 3;

    fn one_way_square() -> Graph {
        let mut graph = Graph::new(4);
        graph.add_edge(A, B, 1.0).unwrap();
        graph.add_edge(B, C, 1.0).unwrap();
        graph.add_edge(C, D, 1.0).unwrap();
        graph.add_edge(D, A, 1.0).unwrap();
        graph
    }

    fn run(graph: &Graph, source: usize) -> PathResult {
        dijkstra(graph, source, DEFAULT_BATCH_SIZE, &mut |_: &[VisitedEdge]| {}).unwrap()
    }

    #[test]
    fn test_one_way_square_forward() {
        let result = run(&one_way_square(), A);
        assert_eq!(result.distance_to(C), Some(2.0));
        assert_eq!(find_path(&result, C).unwrap(), vec![A, B, C]);
        assert_eq!(result.outcome, Outcome::Completed);
    }

    #[test]
    fn test_one_way_square_goes_around() {
        let result = run(&one_way_square(), C);
        assert_eq!(result.distance_to(A), Some(2.0));
        assert_eq!(find_path(&result, A).unwrap(), vec![C, D, A]);
        assert_eq!(result.distance_to(B), Some(3.0));
    }

    #[test]
    fn test_source_is_zero_length_path() {
        let result = run(&one_way_square(), B);
        assert_eq!(find_path(&result, B).unwrap(), vec![B]);
        assert_eq!(result.distance_to(B), Some(0.0));
    }

    #[test]
    fn test_unreachable_target() {
        let mut graph = Graph::new(4);
        graph.add_edge(A, B, 1.0).unwrap();
        graph.add_edge(C, D, 1.0).unwrap();

        let result = run(&graph, A);
        assert_eq!(result.outcome, Outcome::Unreachable);
        assert_eq!(
            find_path(&result, D).unwrap_err(),
            RouteError::TargetUnreachable { start: A, target: D }
        );
    }

    #[test]
    fn test_out_of_range_indices() {
        let graph = one_way_square();
        let err = dijkstra(&graph, 9, 10, &mut |_: &[VisitedEdge]| {}).unwrap_err();
        assert_eq!(err, RouteError::NodeIndexOutOfRange { index: 9, node_count: 4 });

        let result = run(&graph, A);
        assert!(matches!(
            find_path(&result, 4),
            Err(RouteError::NodeIndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn test_graph_rejecting_stray_edge_stays_searchable() {
        let mut graph = Graph::new(2);
        assert!(graph.add_edge(0, 5, 1.0).is_err());
        graph.add_edge(0, 1, 1.0).unwrap();

        let result = run(&graph, 0);
        assert_eq!(result.settle_order, vec![0, 1]);
        assert_eq!(result.outcome, Outcome::Completed);
    }

    #[test]
    fn test_empty_graph_is_not_an_error() {
        let result = run(&Graph::new(0), 0);
        assert!(result.previous.is_empty());
        assert_eq!(result.outcome, Outcome::Unreachable);
    }

    #[test]
    fn test_cyclic_previous_is_rejected() {
        let mut result = run(&one_way_square(), A);
        result.previous.insert(B, C);
        result.previous.insert(C, B);
        assert!(matches!(find_path(&result, C), Err(RouteError::BrokenChain { .. })));
    }

    #[test]
    fn test_progress_batches_cover_every_examined_edge() {
        let mut graph = Graph::new(5);
        for from in 0..5 {
            for to in 0..5 {
                if from != to {
                    graph.add_edge(from, to, (from + to) as f64).unwrap();
                }
            }
        }

        let mut batches: Vec<Vec<VisitedEdge>> = Vec::new();
        let mut sink = |batch: &[VisitedEdge]| batches.push(batch.to_vec());
        dijkstra(&graph, 0, 3, &mut sink).unwrap();

        // Every settled node examines all 4 outgoing edges
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, 20);
        let (last, full) = batches.split_last().unwrap();
        assert!(full.iter().all(|b| b.len() == 3));
        assert_eq!(last.len(), 20 % 3);
        assert_eq!(batches[0][0].from, 0);
    }

    #[test]
    fn test_final_flush_happens_even_when_empty() {
        let mut flushes = 0;
        let mut sink = |_: &[VisitedEdge]| flushes += 1;
        // 4 edges examined, batch of 2 -> two full flushes plus the final one
        dijkstra(&one_way_square(), A, 2, &mut sink).unwrap();
        assert_eq!(flushes, 3);
    }

    fn random_graph(rng: &mut StdRng, nodes: usize, edges: usize) -> Graph {
        let mut graph = Graph::new(nodes);
        for _ in 0..edges {
            let from = rng.gen_range(0..nodes);
            let to = rng.gen_range(0..nodes);
            if from != to {
                graph.add_edge(from, to, rng.gen_range(1..20) as f64).unwrap();
            }
        }
        graph
    }

    // Exhaustive search over simple paths
    fn brute_force(graph: &Graph, current: usize, target: usize, seen: &mut Vec<bool>) -> Option<f64> {
        if current == target {
            return Some(0.0);
        }
        seen[current] = true;
        let mut best: Option<f64> = None;
        for (next, weight) in graph.neighbors(current) {
            if seen[next] {
                continue;
            }
            if let Some(rest) = brute_force(graph, next, target, seen) {
                let total = weight + rest;
                best = Some(best.map_or(total, |b| b.min(total)));
            }
        }
        seen[current] = false;
        best
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..30 {
            let graph = random_graph(&mut rng, 7, 16);
            let result = run(&graph, 0);
            for target in 0..7 {
                let expected = brute_force(&graph, 0, target, &mut vec![false; 7]);
                match (find_path(&result, target), expected) {
                    (Ok(path), Some(best)) => {
                        let length = path_length(&graph, &path).unwrap();
                        assert!((length - best).abs() < 1e-9, "{length} vs {best}");
                        assert_eq!(result.distance_to(target), Some(length));
                    }
                    (Err(_), None) => {}
                    (got, want) => panic!("target {target}: {got:?} vs {want:?}"),
                }
            }
        }
    }

    #[test]
    fn test_settled_distances_never_decrease() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let graph = random_graph(&mut rng, 40, 160);
            let result = run(&graph, 0);
            let settled: Vec<f64> = result.settle_order.iter().map(|n| result.distances[n]).collect();
            assert!(settled.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
