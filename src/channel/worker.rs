use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::StatusOr;
use super::message::{CallError, Event, GraphSummary, Method, Request, Response, WorkerMessage};
use crate::graph::{Graph, build_graph};
use crate::route::{VisitedEdge, dijkstra, find_path};

/// Both ends of a running worker, as seen from the caller
pub struct WorkerHandle {
    pub requests: UnboundedSender<WorkerMessage>,
    pub events: UnboundedReceiver<Event>,
    pub thread: JoinHandle<()>,
}

/// Start the compute worker on its own thread.
///
/// The worker owns the current graph and answers one call at a time. It exits
/// once every sender for `requests` has been dropped.
pub fn spawn_worker(batch_size: usize) -> StatusOr<WorkerHandle> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let thread = thread::Builder::new()
        .name("compute-worker".to_string())
        .spawn(move || {
            let mut graph = Graph::default();
            serve(request_rx, event_tx, |request, events| {
                handle_call(&mut graph, request, batch_size, events)
            });
        })?;

    Ok(WorkerHandle {
        requests: request_tx,
        events: event_rx,
        thread,
    })
}

/// Answer messages until the request channel closes, passing each call to `handler`.
/// A panicking handler is reported as a failed call.
fn serve<H>(mut requests: UnboundedReceiver<WorkerMessage>, events: UnboundedSender<Event>, mut handler: H)
where
    H: FnMut(Request, &UnboundedSender<Event>) -> Result<Response, CallError>,
{
    while let Some(message) = requests.blocking_recv() {
        let event = match message {
            WorkerMessage::Initialise => Event::Initialised {
                methods: Method::ALL.to_vec(),
            },
            WorkerMessage::Call { id, request } => {
                let method = request.method();
                debug!("Worker handling call {} ({})", id, method);

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(request, &events)));

                match outcome {
                    Ok(Ok(response)) => Event::Result { id, response },
                    Ok(Err(error)) => {
                        warn!("Call {} ({}) failed: {}", id, method, error);
                        Event::Error { id, error }
                    }
                    Err(payload) => Event::Error {
                        id,
                        error: CallError::Panic(panic_message(payload)),
                    },
                }
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }

    info!("Compute worker shutting down");
}

fn handle_call(
    graph: &mut Graph,
    request: Request,
    batch_size: usize,
    events: &UnboundedSender<Event>,
) -> Result<Response, CallError> {
    match request {
        Request::BuildGraph {
            ways,
            nodes,
            node_id_to_index,
        } => {
            // A failed build keeps the previous graph
            *graph = build_graph(&ways, &nodes, &node_id_to_index)?;
            Ok(Response::GraphBuilt(GraphSummary {
                nodes: graph.len(),
                edges: graph.edge_count(),
            }))
        }
        Request::Dijkstra { source } => {
            let mut progress = |batch: &[VisitedEdge]| {
                let node_indices = batch.iter().flat_map(|edge| [edge.from, edge.to]).collect();
                // A gone caller is noticed when the result is sent
                let _ = events.send(Event::VisitedBulk { node_indices });
            };
            let result = dijkstra(graph, source, batch_size, &mut progress)?;
            Ok(Response::ShortestPaths(result))
        }
        Request::FindPath { result, target } => Ok(Response::Path(find_path(&result, target)?)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
