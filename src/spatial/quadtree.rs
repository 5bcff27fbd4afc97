use geo::{Coord, Rect, coord};
use log::info;

use super::{SpatialError, SpatialIndex, StatusOr};
use crate::model::Node;
use crate::model::projection::{WorldNode, project_to_world, world_bounds};

pub const DEFAULT_CAPACITY: usize = 4;

const ROOT: usize = 0;

/// Summary of the tree shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadTreeStats {
    pub quads: usize,
    pub points: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone)]
struct Quad {
    boundary: Rect<f64>,
    points: Vec<WorldNode>,
    /// NE, NW, SE, SW once subdivided
    children: Option<[usize; 4]>,
    parent: Option<usize>,
}

impl Quad {
    fn new(boundary: Rect<f64>, parent: Option<usize>) -> Self {
        Self {
            boundary,
            points: Vec::new(),
            children: None,
            parent,
        }
    }
}

/// Point quadtree over world space, stored as a flat arena.
///
/// Each quad keeps up to `capacity` points. The first insert past that splits
/// it into four equal children and later points move down into whichever
/// child contains them. Quads never merge back.
#[derive(Debug, Clone)]
pub struct QuadTree {
    quads: Vec<Quad>,
    capacity: usize,
    len: usize,
    max_depth: usize,
}

/// Closed rectangle test, so points on an edge belong to it
fn rect_contains(rect: &Rect<f64>, point: Coord<f64>) -> bool {
    point.x >= rect.min().x && point.x <= rect.max().x && point.y >= rect.min().y && point.y <= rect.max().y
}

fn rect_intersects(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && a.max().x >= b.min().x && a.min().y <= b.max().y && a.max().y >= b.min().y
}

/// Distance from `point` to the closest point of `rect`, zero inside
fn rect_distance(rect: &Rect<f64>, point: Coord<f64>) -> f64 {
    let dx = (rect.min().x - point.x).max(0.0).max(point.x - rect.max().x);
    let dy = (rect.min().y - point.y).max(0.0).max(point.y - rect.max().y);
    (dx * dx + dy * dy).sqrt()
}

fn point_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

impl QuadTree {
    pub fn new(boundary: Rect<f64>, capacity: usize) -> Self {
        Self {
            quads: vec![Quad::new(boundary, None)],
            capacity: capacity.max(1),
            len: 0,
            max_depth: 0,
        }
    }

    /// Tree over the `[0, width] x [0, height]` world box
    pub fn for_world(width: f64, height: f64, capacity: usize) -> Self {
        Self::new(world_bounds(width, height), capacity)
    }

    pub fn boundary(&self) -> Rect<f64> {
        self.quads[ROOT].boundary
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stats(&self) -> QuadTreeStats {
        QuadTreeStats {
            quads: self.quads.len(),
            points: self.len,
            max_depth: self.max_depth,
        }
    }

    /// Insert all nodes; the first one outside the boundary aborts
    pub fn populate(&mut self, nodes: &[WorldNode]) -> StatusOr<()> {
        for node in nodes {
            self.insert(*node)?;
        }

        info!(
            "Quadtree holds {} points in {} quads, max depth {}",
            self.len,
            self.quads.len(),
            self.max_depth
        );
        Ok(())
    }

    /// Store `node`, returning the depth it was stored at
    pub fn insert(&mut self, node: WorldNode) -> StatusOr<usize> {
        let out_of_bounds = SpatialError::OutOfBounds {
            x: node.position.x,
            y: node.position.y,
        };

        if !rect_contains(&self.quads[ROOT].boundary, node.position) {
            return Err(out_of_bounds);
        }

        let mut current = ROOT;
        loop {
            if self.quads[current].points.len() < self.capacity {
                self.quads[current].points.push(node);
                self.len += 1;

                let depth = self.depth(current);
                self.max_depth = self.max_depth.max(depth);
                return Ok(depth);
            }

            let children = match self.quads[current].children {
                Some(children) => children,
                None => self.subdivide(current),
            };

            // The children tile the parent, so one of them must match
            current = children
                .into_iter()
                .find(|&child| rect_contains(&self.quads[child].boundary, node.position))
                .ok_or(out_of_bounds.clone())?;
        }
    }

    fn subdivide(&mut self, index: usize) -> [usize; 4] {
        let boundary = self.quads[index].boundary;
        let (min, max, center) = (boundary.min(), boundary.max(), boundary.center());

        let quadrants = [
            Rect::new(center, max),
            Rect::new(coord! { x: min.x, y: center.y }, coord! { x: center.x, y: max.y }),
            Rect::new(coord! { x: center.x, y: min.y }, coord! { x: max.x, y: center.y }),
            Rect::new(min, center),
        ];

        let first = self.quads.len();
        for quadrant in quadrants {
            self.quads.push(Quad::new(quadrant, Some(index)));
        }

        let children = [first, first + 1, first + 2, first + 3];
        self.quads[index].children = Some(children);
        children
    }

    /// Number of ancestors between a quad and the root
    fn depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut current = self.quads[index].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.quads[parent].parent;
        }
        depth
    }

    /// Every stored point inside `range`
    pub fn query(&self, range: &Rect<f64>) -> Vec<WorldNode> {
        let mut found = Vec::new();
        let mut stack = vec![ROOT];

        while let Some(index) = stack.pop() {
            let quad = &self.quads[index];
            if !rect_intersects(&quad.boundary, range) {
                continue;
            }

            found.extend(quad.points.iter().filter(|p| rect_contains(range, p.position)));

            if let Some(children) = quad.children {
                stack.extend(children);
            }
        }

        found
    }

    /// Closest stored point to `point`, or None for an empty tree
    pub fn nearest(&self, point: Coord<f64>) -> Option<WorldNode> {
        let mut best = None;
        self.nearest_in(ROOT, point, &mut best);
        best.map(|(node, _)| node)
    }

    fn nearest_in(&self, index: usize, point: Coord<f64>, best: &mut Option<(WorldNode, f64)>) {
        let quad = &self.quads[index];

        for node in &quad.points {
            let distance = point_distance(node.position, point);
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                *best = Some((*node, distance));
            }
        }

        let Some(children) = quad.children else {
            return;
        };

        // Closest quadrant first so the bound tightens early
        let mut ordered = children.map(|child| (child, rect_distance(&self.quads[child].boundary, point)));
        ordered.sort_by(|a, b| a.1.total_cmp(&b.1));

        for (child, bound) in ordered {
            if best.is_some_and(|(_, best_distance)| bound >= best_distance) {
                continue;
            }
            self.nearest_in(child, point, best);
        }
    }
}

impl SpatialIndex for QuadTree {
    /// Projects the lon/lat into the root box, which need not start at the origin
    fn nearest_node(&self, lon: f64, lat: f64) -> Option<usize> {
        let boundary = self.boundary();
        let position = project_to_world(&Node::new(0, lon, lat), boundary.width(), boundary.height()).ok()?;
        self.nearest(position + boundary.min()).map(|node| node.index)
    }
}
