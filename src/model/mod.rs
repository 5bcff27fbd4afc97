use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod projection;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("way {way} references node id {node_id} which is not in the node list")]
    MissingNodeReference { way: usize, node_id: i64 },

    #[error("cannot project lon {lon}, lat {lat} into world space")]
    InvalidProjection { lon: f64, lat: f64 },
}

pub type StatusOr<T> = Result<T, ModelError>;

/// A map node as produced by the parsing collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable OpenStreetMap identifier
    pub id: i64,

    /// Latitude and longitude in degrees
    pub lat: f64,
    pub lon: f64,
}

impl Node {
    pub fn new(id: i64, lon: f64, lat: f64) -> Self {
        Self { id, lat, lon }
    }
}

/// An ordered run of node ids with its OpenStreetMap tags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub node_ids: Vec<i64>,

    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Way {
    pub fn new(node_ids: Vec<i64>) -> Self {
        Self {
            node_ids,
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Ways with zero or one node exist in the wild but describe nothing
    pub fn is_valid(&self) -> bool {
        self.node_ids.len() > 1
    }

    /// True if traffic may only follow the way in node order
    pub fn is_oneway(&self) -> bool {
        self.tags.get("oneway").is_some_and(|v| v == "yes")
            || self.tags.get("junction").is_some_and(|v| v == "roundabout")
    }

    /// Tag match where a `*` in `values` accepts any value for `key`
    pub fn has_tag(&self, key: &str, values: &[&str]) -> bool {
        match self.tags.get(key) {
            Some(value) => values.iter().any(|v| *v == "*" || v == value),
            None => false,
        }
    }
}

/// Geographic bounds of the loaded node set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub node_count: usize,
}

impl Metadata {
    /// Compute the bounding box of `nodes`. An empty slice gives a zero box at the origin.
    pub fn from_nodes(nodes: &[Node]) -> Self {
        if nodes.is_empty() {
            return Self {
                min_lat: 0.0,
                max_lat: 0.0,
                min_lon: 0.0,
                max_lon: 0.0,
                node_count: 0,
            };
        }

        let mut metadata = Self {
            min_lat: f64::MAX,
            max_lat: f64::MIN,
            min_lon: f64::MAX,
            max_lon: f64::MIN,
            node_count: nodes.len(),
        };

        for node in nodes {
            metadata.min_lat = metadata.min_lat.min(node.lat);
            metadata.max_lat = metadata.max_lat.max(node.lat);
            metadata.min_lon = metadata.min_lon.min(node.lon);
            metadata.max_lon = metadata.max_lon.max(node.lon);
        }

        metadata
    }

    pub fn lon_range(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn lat_range(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Map a lon/lat into the unit square spanned by the bounds.
    /// A degenerate axis collapses to 0.
    pub fn normalize(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = if self.lon_range() > 0.0 {
            (lon - self.min_lon) / self.lon_range()
        } else {
            0.0
        };
        let y = if self.lat_range() > 0.0 {
            (lat - self.min_lat) / self.lat_range()
        } else {
            0.0
        };
        (x, y)
    }
}

/// Ways restricted to one tag family, with the node indices they touch
#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    pub ways: Vec<Way>,

    /// Indices into the full node list, in way order (may repeat)
    pub node_indices: Vec<usize>,
}

/// Everything the parsing collaborator hands over, plus the derived lookups
#[derive(Debug, Clone)]
pub struct MapData {
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub node_id_to_index: HashMap<i64, usize>,
    pub metadata: Metadata,
}

impl MapData {
    /// Index the nodes by id and drop ways that cannot form an edge
    pub fn new(nodes: Vec<Node>, ways: Vec<Way>) -> Self {
        let node_id_to_index = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id, idx))
            .collect::<HashMap<_, _>>();

        let total_ways = ways.len();
        let ways: Vec<Way> = ways.into_iter().filter(Way::is_valid).collect();
        if ways.len() < total_ways {
            warn!("Discarded {} ways with fewer than two nodes", total_ways - ways.len());
        }

        let metadata = Metadata::from_nodes(&nodes);
        info!("Loaded {} nodes and {} ways", nodes.len(), ways.len());

        Self {
            nodes,
            ways,
            node_id_to_index,
            metadata,
        }
    }

    pub fn node_index(&self, node_id: i64) -> Option<usize> {
        self.node_id_to_index.get(&node_id).copied()
    }

    /// Keep only the ways tagged `key` with one of `values` (`*` for any)
    pub fn subgraph_with_tag(&self, key: &str, values: &[&str]) -> StatusOr<Subgraph> {
        let mut subgraph = Subgraph::default();

        for (way_idx, way) in self.ways.iter().enumerate() {
            if !way.has_tag(key, values) {
                continue;
            }

            for &node_id in &way.node_ids {
                let idx = self
                    .node_index(node_id)
                    .ok_or(ModelError::MissingNodeReference { way: way_idx, node_id })?;
                subgraph.node_indices.push(idx);
            }
            subgraph.ways.push(way.clone());
        }

        info!(
            "Subgraph {}={:?} has {} of {} ways",
            key,
            values,
            subgraph.ways.len(),
            self.ways.len()
        );

        Ok(subgraph)
    }
}
