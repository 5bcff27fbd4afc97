//! Request/response channel between a caller and the compute worker.
//!
//! The worker runs on a dedicated thread and owns the graph. Callers talk to it
//! through [`ComputeClient`], which tags each call with an id, matches answers
//! back to their callers and fans out progress events to subscribers.

use thiserror::Error;

pub mod client;
pub mod message;
pub mod wire;
pub mod worker;

pub use client::ComputeClient;
pub use message::{CallError, Event, GraphSummary, Method, Request, Response, WorkerMessage};
pub use wire::{EventType, WireMessage};
pub use worker::{WorkerHandle, spawn_worker};

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("compute channel closed")]
    ChannelClosed,

    #[error("remote call failed: {0}")]
    Remote(#[from] CallError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("worker does not offer method {0}")]
    UnknownMethod(Method),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("failed to start worker: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type StatusOr<T> = Result<T, ChannelError>;
