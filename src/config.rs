use clap::Args;
use serde::{Deserialize, Serialize};

use crate::model::projection::{WORLD_HEIGHT, WORLD_WIDTH};
use crate::route::DEFAULT_BATCH_SIZE;
use crate::spatial::bucket::{DEFAULT_COLS, DEFAULT_ROWS};
use crate::spatial::quadtree::DEFAULT_CAPACITY;

/// Tunables for the indexes and the compute worker
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct Config {
    /// Rows of the bucket grid
    #[arg(long, default_value_t = DEFAULT_ROWS)]
    pub grid_rows: usize,

    /// Columns of the bucket grid
    #[arg(long, default_value_t = DEFAULT_COLS)]
    pub grid_cols: usize,

    /// Points a quadtree node holds before it splits
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub quadtree_capacity: usize,

    /// Examined edges per progress event
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub progress_batch_size: usize,

    /// Width of the projected world box
    #[arg(long, default_value_t = WORLD_WIDTH)]
    pub world_width: f64,

    /// Height of the projected world box
    #[arg(long, default_value_t = WORLD_HEIGHT)]
    pub world_height: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_rows: DEFAULT_ROWS,
            grid_cols: DEFAULT_COLS,
            quadtree_capacity: DEFAULT_CAPACITY,
            progress_batch_size: DEFAULT_BATCH_SIZE,
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
        }
    }
}
