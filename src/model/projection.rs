use std::f64::consts::PI;

use geo::{Coord, Rect, coord};

use super::{ModelError, Node, StatusOr};

pub const WORLD_WIDTH: f64 = 1000.0;
pub const WORLD_HEIGHT: f64 = 1000.0;

/// A node placed in world space, keyed by its index in the node list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldNode {
    pub index: usize,
    pub position: Coord<f64>,
}

impl WorldNode {
    pub fn new(index: usize, x: f64, y: f64) -> Self {
        Self {
            index,
            position: coord! { x: x, y: y },
        }
    }
}

/// The rectangle every projected node falls in
pub fn world_bounds(width: f64, height: f64) -> Rect<f64> {
    Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: width, y: height })
}

/// Web Mercator at zoom 0, flipped so the origin sits bottom-left, then
/// scaled to `width` x `height`.
pub fn project_to_world(node: &Node, width: f64, height: f64) -> StatusOr<Coord<f64>> {
    let lon_rad = node.lon.to_radians();
    let lat_rad = node.lat.to_radians();

    let x = (PI + lon_rad) / (2.0 * PI);
    let y = (PI - (PI / 4.0 + lat_rad / 2.0).tan().ln()) / (2.0 * PI);

    if !x.is_finite() || !y.is_finite() || !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
        return Err(ModelError::InvalidProjection {
            lon: node.lon,
            lat: node.lat,
        });
    }

    Ok(coord! { x: x * width, y: (1.0 - y) * height })
}

/// Project every node, keeping list order so `WorldNode::index` matches
pub fn project_all(nodes: &[Node], width: f64, height: f64) -> StatusOr<Vec<WorldNode>> {
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            project_to_world(node, width, height).map(|position| WorldNode { index, position })
        })
        .collect()
}
