pub mod channel;
pub mod config;
pub mod graph;
pub mod model;
pub mod route;
pub mod spatial;
