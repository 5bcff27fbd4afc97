use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::GraphBuildError;
use crate::model::{Node, Way};
use crate::route::{PathResult, RouteError};

/// Operations the compute worker offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    BuildGraph,
    Dijkstra,
    FindPath,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::BuildGraph, Method::Dijkstra, Method::FindPath];

    pub fn name(&self) -> &'static str {
        match self {
            Method::BuildGraph => "buildGraph",
            Method::Dijkstra => "dijkstra",
            Method::FindPath => "findPath",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A call and its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "arguments", rename_all = "camelCase")]
pub enum Request {
    BuildGraph {
        ways: Vec<Way>,
        nodes: Vec<Node>,
        node_id_to_index: HashMap<i64, usize>,
    },
    Dijkstra {
        source: usize,
    },
    FindPath {
        result: PathResult,
        target: usize,
    },
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::BuildGraph { .. } => Method::BuildGraph,
            Request::Dijkstra { .. } => Method::Dijkstra,
            Request::FindPath { .. } => Method::FindPath,
        }
    }
}

/// Size of the graph the worker now holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Response {
    GraphBuilt(GraphSummary),
    ShortestPaths(PathResult),
    Path(Vec<usize>),
}

/// Why a call failed on the worker side
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallError {
    #[error(transparent)]
    GraphBuild(#[from] GraphBuildError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("worker panicked: {0}")]
    Panic(String),
}

/// Messages flowing from the caller to the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Initialise,
    Call { id: u64, request: Request },
}

/// Messages flowing from the worker back to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Initialised { methods: Vec<Method> },
    Result { id: u64, response: Response },
    Error { id: u64, error: CallError },
    /// Examined edges flattened as `[from, to, from, to, ..]`
    VisitedBulk { node_indices: Vec<usize> },
}
