use std::collections::HashMap;

use log::info;

use super::{SpatialError, SpatialIndex, StatusOr};
use crate::model::{Metadata, Node};

pub const DEFAULT_ROWS: usize = 100;
pub const DEFAULT_COLS: usize = 100;

/// A node stored in a grid cell together with its index in the node list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketEntry {
    pub node: Node,
    pub index: usize,
}

/// Fixed `rows x cols` hash over the bounding box of the map.
///
/// Cells are addressed as `(x, y)` = `(column, row)`, with columns following
/// longitude and rows following latitude.
#[derive(Debug, Clone)]
pub struct BucketGrid {
    rows: usize,
    cols: usize,
    metadata: Metadata,
    cells: HashMap<(usize, usize), Vec<BucketEntry>>,
}

impl BucketGrid {
    pub fn new(metadata: Metadata, rows: usize, cols: usize) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
            metadata,
            cells: HashMap::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of cells holding at least one entry
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Insert every node, looking its index up by id
    pub fn populate(&mut self, nodes: &[Node], node_id_to_index: &HashMap<i64, usize>) -> StatusOr<()> {
        for node in nodes {
            let index = node_id_to_index
                .get(&node.id)
                .copied()
                .ok_or(SpatialError::MissingNodeReference { node_id: node.id })?;
            self.insert(*node, index)?;
        }

        info!(
            "Bucket grid {}x{} holds {} nodes in {} cells",
            self.cols,
            self.rows,
            nodes.len(),
            self.cells.len()
        );
        Ok(())
    }

    /// Position of a lon/lat in scaled grid units, before truncation
    fn location_for(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, y) = self.metadata.normalize(lon, lat);
        (x * self.cols as f64, y * self.rows as f64)
    }

    /// Cell holding a lon/lat. Anything past the top or right edge lands in the last cell.
    pub fn index_for(&self, lon: f64, lat: f64) -> StatusOr<(usize, usize)> {
        let (x, y) = self.location_for(lon, lat);
        let (x, y) = (x.trunc(), y.trunc());

        if x.is_nan() || y.is_nan() || x < 0.0 || y < 0.0 {
            return Err(SpatialError::OutOfBoundsCoordinate { lon, lat });
        }

        Ok((
            (x as usize).min(self.cols - 1),
            (y as usize).min(self.rows - 1),
        ))
    }

    pub fn insert(&mut self, node: Node, index: usize) -> StatusOr<()> {
        let cell = self.index_for(node.lon, node.lat)?;
        self.cells.entry(cell).or_default().push(BucketEntry { node, index });
        Ok(())
    }

    pub fn query(&self, cell_x: usize, cell_y: usize) -> &[BucketEntry] {
        self.cells
            .get(&(cell_x, cell_y))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // Cell under a normalized position, None outside the unit square or for NaN.
    // Exactly 1.0 still belongs to the last row or column.
    fn cell_for_normalized(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return None;
        }
        let (cx, cy) = ((x * self.cols as f64) as usize, (y * self.rows as f64) as usize);
        Some((cx.min(self.cols - 1), cy.min(self.rows - 1)))
    }

    /// Entries of the cell under a position normalized to the unit square
    pub fn query_normalized(&self, x: f64, y: f64) -> &[BucketEntry] {
        match self.cell_for_normalized(x, y) {
            Some((cx, cy)) => self.query(cx, cy),
            None => &[],
        }
    }

    /// Closest entry to a normalized position, looking only at the cell the
    /// position falls in. A closer node just across a cell border is missed.
    pub fn nearest(&self, x: f64, y: f64) -> Option<&BucketEntry> {
        self.nearest_within(x, y, 0)
    }

    /// Like [`BucketGrid::nearest`] but also searches `ring` cells in every
    /// direction around the query cell.
    pub fn nearest_within(&self, x: f64, y: f64, ring: usize) -> Option<&BucketEntry> {
        let (cx, cy) = self.cell_for_normalized(x, y)?;
        let target = (x * self.cols as f64, y * self.rows as f64);

        let mut closest: Option<(&BucketEntry, f64)> = None;
        for cell_y in cy.saturating_sub(ring)..=(cy + ring).min(self.rows - 1) {
            for cell_x in cx.saturating_sub(ring)..=(cx + ring).min(self.cols - 1) {
                for entry in self.query(cell_x, cell_y) {
                    let (ex, ey) = self.location_for(entry.node.lon, entry.node.lat);
                    let distance = ((ex - target.0).powi(2) + (ey - target.1).powi(2)).sqrt();

                    // Ties go to the later entry
                    match closest {
                        Some((_, best)) if distance > best => {}
                        _ => closest = Some((entry, distance)),
                    }
                }
            }
        }

        closest.map(|(entry, _)| entry)
    }
}

impl SpatialIndex for BucketGrid {
    fn nearest_node(&self, lon: f64, lat: f64) -> Option<usize> {
        let (x, y) = self.metadata.normalize(lon, lat);
        self.nearest(x, y).map(|entry| entry.index)
    }
}
