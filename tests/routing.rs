use wayfinder::channel::ComputeClient;
use wayfinder::graph::haversine;
use wayfinder::model::projection::{WorldNode, project_to_world};
use wayfinder::model::{MapData, Node, Way};
use wayfinder::route::Outcome;
use wayfinder::spatial::{BucketGrid, QuadTree, SpatialIndex};

// 1 -- 2
// |    |
// 4 -> 3   plus building node 5 in the middle
fn town() -> MapData {
    let nodes = vec![
        Node::new(1, 0.0, 0.0),
        Node::new(2, 0.01, 0.0),
        Node::new(3, 0.01, 0.01),
        Node::new(4, 0.0, 0.005),
        Node::new(5, 0.005, 0.005),
    ];
    let ways = vec![
        Way::new(vec![1, 2, 3]).with_tag("highway", "residential"),
        Way::new(vec![1, 4]).with_tag("highway", "residential"),
        Way::new(vec![4, 3]).with_tag("highway", "service").with_tag("oneway", "yes"),
        Way::new(vec![5, 1]).with_tag("building", "yes"),
        Way::new(vec![2]).with_tag("highway", "residential"),
    ];
    MapData::new(nodes, ways)
}

fn routable_indices(map: &MapData) -> Vec<usize> {
    let subgraph = map.subgraph_with_tag("highway", &["*"]).unwrap();
    let mut indices = subgraph.node_indices;
    indices.sort_unstable();
    indices.dedup();
    indices
}

#[tokio::test]
async fn test_route_across_town() {
    let map = town();
    assert_eq!(map.ways.len(), 4);

    let subgraph = map.subgraph_with_tag("highway", &["*"]).unwrap();
    assert_eq!(subgraph.ways.len(), 3);

    let client = ComputeClient::connect(2).await.unwrap();
    let summary = client
        .build_graph(subgraph.ways, map.nodes.clone(), map.node_id_to_index.clone())
        .await
        .unwrap();
    assert_eq!(summary.nodes, 4);
    assert_eq!(summary.edges, 7);

    let mut grid = BucketGrid::new(map.metadata, 4, 4);
    for idx in routable_indices(&map) {
        grid.insert(map.nodes[idx], idx).unwrap();
    }
    let source = grid.nearest_node(0.0001, 0.0001).unwrap();
    let target = grid.nearest_node(0.0099, 0.0099).unwrap();
    assert_eq!((source, target), (0, 2));

    let mut progress = client.subscribe();
    let result = client.dijkstra(source).await.unwrap();
    assert_eq!(result.outcome, Outcome::Completed);

    let mut batches = Vec::new();
    while let Ok(batch) = progress.try_recv() {
        batches.push(batch);
    }
    let examined: usize = batches.iter().map(|b| b.len() / 2).sum();
    assert_eq!(examined, 7);
    assert!(batches.iter().all(|b| b.len() <= 4));
    assert_eq!(batches[0][0], 0);

    let distance = result.distance_to(target).unwrap();
    let path = client.find_path(result, target).await.unwrap();
    assert_eq!(path, vec![0, 3, 2]);

    let expected = haversine(&map.nodes[0], &map.nodes[3]) + haversine(&map.nodes[3], &map.nodes[2]);
    assert!((distance - expected).abs() < 1e-6);
}

#[tokio::test]
async fn test_one_way_street_forces_detour_back() {
    let map = town();
    let subgraph = map.subgraph_with_tag("highway", &["*"]).unwrap();

    let client = ComputeClient::connect(100).await.unwrap();
    client
        .build_graph(subgraph.ways, map.nodes.clone(), map.node_id_to_index.clone())
        .await
        .unwrap();

    let result = client.dijkstra(2).await.unwrap();
    let path = client.find_path(result, 0).await.unwrap();
    assert_eq!(path, vec![2, 1, 0]);
}

#[tokio::test]
async fn test_quadtree_and_grid_snap_to_same_nodes() {
    let map = town();
    let indices = routable_indices(&map);

    let mut grid = BucketGrid::new(map.metadata, 4, 4);
    let mut tree = QuadTree::for_world(1000.0, 1000.0, 2);
    let world_nodes: Vec<WorldNode> = indices
        .iter()
        .map(|&idx| WorldNode {
            index: idx,
            position: project_to_world(&map.nodes[idx], 1000.0, 1000.0).unwrap(),
        })
        .collect();
    tree.populate(&world_nodes).unwrap();
    for &idx in &indices {
        grid.insert(map.nodes[idx], idx).unwrap();
    }

    let indexes: Vec<Box<dyn SpatialIndex>> = vec![Box::new(grid), Box::new(tree)];
    for index in &indexes {
        assert_eq!(index.nearest_node(0.0001, 0.0001), Some(0));
        assert_eq!(index.nearest_node(0.0099, 0.0099), Some(2));
        assert_eq!(index.nearest_node(0.0099, 0.0001), Some(1));
    }

    // The grid only looks at the query's own cell, which is empty in the middle of town
    assert_eq!(indexes[0].nearest_node(0.005, 0.005), None);
    assert_eq!(indexes[1].nearest_node(0.005, 0.005), Some(3));
}
