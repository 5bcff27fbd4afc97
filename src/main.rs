use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Deserialize;
use serde_json::json;

use wayfinder::channel::ComputeClient;
use wayfinder::config::Config;
use wayfinder::model::projection::{WorldNode, project_all, project_to_world};
use wayfinder::model::{MapData, Node, Way};
use wayfinder::spatial::{BucketGrid, QuadTree, SpatialIndex};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the shortest route between two positions
    Route {
        /// Path to the parsed map dump (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Start position as LON,LAT
        #[arg(long)]
        from: LonLat,

        /// End position as LON,LAT
        #[arg(long)]
        to: LonLat,

        /// Spatial index used to snap positions to nodes
        #[arg(long, value_enum, default_value_t = IndexKind::Grid)]
        index: IndexKind,

        /// Only ways carrying this tag are routable
        #[arg(long, default_value = "highway")]
        tag: String,
    },

    /// Print graph and index statistics for a map dump
    Stats {
        /// Path to the parsed map dump (JSON)
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum IndexKind {
    Grid,
    Quadtree,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct LonLat {
    lon: f64,
    lat: f64,
}

impl FromStr for LonLat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (lon, lat) = s
            .split_once(',')
            .ok_or_else(|| format!("expected LON,LAT, got {:?}", s))?;
        let parse = |v: &str| v.trim().parse::<f64>().map_err(|e| format!("{:?}: {}", v, e));
        Ok(Self {
            lon: parse(lon)?,
            lat: parse(lat)?,
        })
    }
}

/// Node and way lists as written by the parser
#[derive(Deserialize)]
struct MapDump {
    nodes: Vec<Node>,
    ways: Vec<Way>,
}

fn load_map(path: &Path) -> Result<MapData> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let dump: MapDump =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse map dump {}", path.display()))?;
    Ok(MapData::new(dump.nodes, dump.ways))
}

fn build_index(map: &MapData, indices: &BTreeSet<usize>, kind: IndexKind, config: &Config) -> Result<Box<dyn SpatialIndex>> {
    match kind {
        IndexKind::Grid => {
            let mut grid = BucketGrid::new(map.metadata, config.grid_rows, config.grid_cols);
            for &idx in indices {
                grid.insert(map.nodes[idx], idx)
                    .context("Failed to insert node into bucket grid")?;
            }
            info!("Bucket grid uses {} of {} cells", grid.occupied_cells(), grid.rows() * grid.cols());
            Ok(Box::new(grid))
        }
        IndexKind::Quadtree => {
            let mut tree = QuadTree::for_world(config.world_width, config.world_height, config.quadtree_capacity);
            let world_nodes = indices
                .iter()
                .map(|&idx| {
                    project_to_world(&map.nodes[idx], config.world_width, config.world_height)
                        .map(|position| WorldNode { index: idx, position })
                })
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to project nodes")?;
            tree.populate(&world_nodes).context("Failed to populate quadtree")?;
            Ok(Box::new(tree))
        }
    }
}

async fn route(config: &Config, input: &Path, from: LonLat, to: LonLat, index: IndexKind, tag: &str) -> Result<()> {
    let map = load_map(input)?;
    let subgraph = map
        .subgraph_with_tag(tag, &["*"])
        .with_context(|| format!("Failed to extract {} ways", tag))?;
    let routable: BTreeSet<usize> = subgraph.node_indices.iter().copied().collect();

    let client = ComputeClient::connect(config.progress_batch_size)
        .await
        .context("Failed to start compute worker")?;
    let summary = client
        .build_graph(subgraph.ways, map.nodes.clone(), map.node_id_to_index.clone())
        .await
        .context("Failed to build graph")?;
    info!("Graph has {} nodes and {} edges", summary.nodes, summary.edges);

    let spatial = build_index(&map, &routable, index, config)?;
    let source = spatial
        .nearest_node(from.lon, from.lat)
        .ok_or_else(|| anyhow!("No {} node near {},{}", tag, from.lon, from.lat))?;
    let target = spatial
        .nearest_node(to.lon, to.lat)
        .ok_or_else(|| anyhow!("No {} node near {},{}", tag, to.lon, to.lat))?;
    info!("Routing from node {} to node {}", map.nodes[source].id, map.nodes[target].id);

    let mut progress = client.subscribe();
    let result = client.dijkstra(source).await.context("Shortest path search failed")?;

    // Progress for a call is always delivered before its result
    let mut examined = 0;
    while let Ok(batch) = progress.try_recv() {
        examined += batch.len() / 2;
    }

    let distance = result.distance_to(target);
    let path = client
        .find_path(result, target)
        .await
        .context("Failed to reconstruct path")?;

    let coordinates: Vec<[f64; 2]> = path.iter().map(|&idx| [map.nodes[idx].lon, map.nodes[idx].lat]).collect();
    let output = json!({
        "from": map.nodes[source].id,
        "to": map.nodes[target].id,
        "distance_meters": distance,
        "examined_edges": examined,
        "path": path.iter().map(|&idx| map.nodes[idx].id).collect::<Vec<_>>(),
        "coordinates": coordinates,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn stats(config: &Config, input: &Path) -> Result<()> {
    let map = load_map(input)?;

    let client = ComputeClient::connect(config.progress_batch_size)
        .await
        .context("Failed to start compute worker")?;
    let summary = client
        .build_graph(map.ways.clone(), map.nodes.clone(), map.node_id_to_index.clone())
        .await
        .context("Failed to build graph")?;

    let mut grid = BucketGrid::new(map.metadata, config.grid_rows, config.grid_cols);
    grid.populate(&map.nodes, &map.node_id_to_index)
        .context("Failed to populate bucket grid")?;

    let world_nodes =
        project_all(&map.nodes, config.world_width, config.world_height).context("Failed to project nodes")?;
    let mut tree = QuadTree::for_world(config.world_width, config.world_height, config.quadtree_capacity);
    tree.populate(&world_nodes).context("Failed to populate quadtree")?;
    let tree_stats = tree.stats();

    let output = json!({
        "nodes": map.nodes.len(),
        "ways": map.ways.len(),
        "metadata": map.metadata,
        "graph": { "nodes": summary.nodes, "edges": summary.edges },
        "grid": {
            "rows": grid.rows(),
            "cols": grid.cols(),
            "occupied_cells": grid.occupied_cells(),
        },
        "quadtree": {
            "quads": tree_stats.quads,
            "points": tree_stats.points,
            "max_depth": tree_stats.max_depth,
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Route {
            input,
            from,
            to,
            index,
            tag,
        } => route(&cli.config, input, *from, *to, *index, tag).await?,
        Commands::Stats { input } => stats(&cli.config, input).await?,
    }

    Ok(())
}
