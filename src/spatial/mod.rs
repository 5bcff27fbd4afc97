use thiserror::Error;

use crate::model::ModelError;

pub mod bucket;
pub mod quadtree;

pub use bucket::{BucketEntry, BucketGrid};
pub use quadtree::{QuadTree, QuadTreeStats};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpatialError {
    #[error("coordinate lon {lon}, lat {lat} lies outside the grid bounds")]
    OutOfBoundsCoordinate { lon: f64, lat: f64 },

    #[error("point ({x}, {y}) lies outside the quadtree boundary")]
    OutOfBounds { x: f64, y: f64 },

    #[error("node id {node_id} has no index")]
    MissingNodeReference { node_id: i64 },

    #[error(transparent)]
    Projection(#[from] ModelError),
}

pub type StatusOr<T> = Result<T, SpatialError>;

/// Resolve a geographic position to the index of a nearby node
pub trait SpatialIndex {
    fn nearest_node(&self, lon: f64, lat: f64) -> Option<usize>;
}
