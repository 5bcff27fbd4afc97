use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use super::message::{Event, GraphSummary, Method, Request, Response, WorkerMessage};
use super::worker::spawn_worker;
use super::{ChannelError, StatusOr};
use crate::model::{Node, Way};
use crate::route::PathResult;

type Reply = oneshot::Sender<StatusOr<Response>>;

enum Command {
    Call { request: Request, reply: Reply },
    Subscribe(UnboundedSender<Vec<usize>>),
}

/// Caller-side handle to the compute worker.
///
/// Clones share one dispatcher task, which owns the pending-call table and the
/// progress subscribers. The worker shuts down once every clone is dropped.
#[derive(Clone)]
pub struct ComputeClient {
    commands: UnboundedSender<Command>,
    methods: Arc<Vec<Method>>,
}

impl ComputeClient {
    /// Start a worker thread and complete the handshake with it
    pub async fn connect(batch_size: usize) -> StatusOr<Self> {
        let worker = spawn_worker(batch_size)?;
        Self::with_transport(worker.requests, worker.events).await
    }

    /// Handshake over an existing pair of channels.
    ///
    /// The first event back must be `Initialised`; the client only exists once
    /// it has arrived.
    pub async fn with_transport(
        requests: UnboundedSender<WorkerMessage>,
        mut events: UnboundedReceiver<Event>,
    ) -> StatusOr<Self> {
        requests
            .send(WorkerMessage::Initialise)
            .map_err(|_| ChannelError::ChannelClosed)?;

        let methods = match events.recv().await {
            Some(Event::Initialised { methods }) => methods,
            Some(other) => {
                return Err(ChannelError::Protocol(format!(
                    "expected Initialised, got {:?}",
                    other
                )));
            }
            None => return Err(ChannelError::ChannelClosed),
        };
        info!("Compute worker ready, offers {:?}", methods);

        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(requests, events, command_rx));

        Ok(Self {
            commands,
            methods: Arc::new(methods),
        })
    }

    /// Methods the worker announced during the handshake
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Receive every progress batch emitted from now on
    pub fn subscribe(&self) -> UnboundedReceiver<Vec<usize>> {
        let (tx, rx) = mpsc::unbounded_channel();
        // If the dispatcher is gone the receiver simply never yields
        let _ = self.commands.send(Command::Subscribe(tx));
        rx
    }

    pub async fn call(&self, request: Request) -> StatusOr<Response> {
        let method = request.method();
        if !self.methods.contains(&method) {
            return Err(ChannelError::UnknownMethod(method));
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Call { request, reply })
            .map_err(|_| ChannelError::ChannelClosed)?;

        response.await.map_err(|_| ChannelError::ChannelClosed)?
    }

    pub async fn build_graph(
        &self,
        ways: Vec<Way>,
        nodes: Vec<Node>,
        node_id_to_index: HashMap<i64, usize>,
    ) -> StatusOr<GraphSummary> {
        let request = Request::BuildGraph {
            ways,
            nodes,
            node_id_to_index,
        };
        match self.call(request).await? {
            Response::GraphBuilt(summary) => Ok(summary),
            other => Err(mismatch(Method::BuildGraph, &other)),
        }
    }

    pub async fn dijkstra(&self, source: usize) -> StatusOr<PathResult> {
        match self.call(Request::Dijkstra { source }).await? {
            Response::ShortestPaths(result) => Ok(result),
            other => Err(mismatch(Method::Dijkstra, &other)),
        }
    }

    pub async fn find_path(&self, result: PathResult, target: usize) -> StatusOr<Vec<usize>> {
        match self.call(Request::FindPath { result, target }).await? {
            Response::Path(path) => Ok(path),
            other => Err(mismatch(Method::FindPath, &other)),
        }
    }
}

fn mismatch(method: Method, response: &Response) -> ChannelError {
    let kind = match response {
        Response::GraphBuilt(_) => "graphBuilt",
        Response::ShortestPaths(_) => "shortestPaths",
        Response::Path(_) => "path",
    };
    ChannelError::Protocol(format!("{} answered with {}", method, kind))
}

async fn dispatch(
    requests: UnboundedSender<WorkerMessage>,
    mut events: UnboundedReceiver<Event>,
    mut commands: UnboundedReceiver<Command>,
) {
    let mut next_id: u64 = 0;
    let mut pending: HashMap<u64, Reply> = HashMap::new();
    let mut observers: Vec<UnboundedSender<Vec<usize>>> = Vec::new();

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(Command::Call { request, reply }) => {
                        let id = next_id;
                        next_id += 1;
                        debug!("Sending call {} ({})", id, request.method());

                        if requests.send(WorkerMessage::Call { id, request }).is_err() {
                            let _ = reply.send(Err(ChannelError::ChannelClosed));
                        } else {
                            pending.insert(id, reply);
                        }
                    }
                    Some(Command::Subscribe(observer)) => observers.push(observer),
                    // Every client is gone; dropping `requests` stops the worker
                    None => break,
                }
            }
            event = events.recv() => {
                match event {
                    Some(Event::Result { id, response }) => resolve(&mut pending, id, Ok(response)),
                    Some(Event::Error { id, error }) => resolve(&mut pending, id, Err(ChannelError::Remote(error))),
                    Some(Event::VisitedBulk { node_indices }) => {
                        observers.retain(|observer| observer.send(node_indices.clone()).is_ok());
                    }
                    Some(Event::Initialised { .. }) => warn!("Ignoring repeated Initialised from worker"),
                    None => {
                        if !pending.is_empty() {
                            warn!("Worker went away with {} calls outstanding", pending.len());
                        }
                        break;
                    }
                }
            }
        }
    }

    debug!("Compute dispatcher stopped after {} calls", next_id);
}

fn resolve(pending: &mut HashMap<u64, Reply>, id: u64, outcome: StatusOr<Response>) {
    match pending.remove(&id) {
        // The caller may have stopped waiting
        Some(reply) => {
            let _ = reply.send(outcome);
        }
        None => debug!("Dropping answer for unknown call {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::message::CallError;
    use crate::route::RouteError;

    #[tokio::test]
    async fn test_handshake_requires_initialised() {
        let (requests, _worker_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        events_tx.send(Event::VisitedBulk { node_indices: vec![] }).unwrap();

        let err = ComputeClient::with_transport(requests, events).await.err().unwrap();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_handshake_fails_when_worker_is_gone() {
        let (requests, worker_rx) = mpsc::unbounded_channel();
        let (_events_tx, events) = mpsc::unbounded_channel::<Event>();
        drop(worker_rx);

        let err = ComputeClient::with_transport(requests, events).await.err().unwrap();
        assert!(matches!(err, ChannelError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_unannounced_method_is_refused_locally() {
        let (requests, mut worker_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        events_tx
            .send(Event::Initialised { methods: vec![Method::BuildGraph] })
            .unwrap();

        let client = ComputeClient::with_transport(requests, events).await.unwrap();
        assert_eq!(client.methods(), &[Method::BuildGraph]);
        assert_eq!(worker_rx.recv().await, Some(WorkerMessage::Initialise));

        let err = client.dijkstra(0).await.unwrap_err();
        assert!(matches!(err, ChannelError::UnknownMethod(Method::Dijkstra)));
    }

    #[tokio::test]
    async fn test_ids_increase_and_answers_match_by_id() {
        let (requests, mut worker_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        events_tx
            .send(Event::Initialised { methods: Method::ALL.to_vec() })
            .unwrap();
        let client = ComputeClient::with_transport(requests, events).await.unwrap();

        // Scripted worker that answers the two calls in reverse order
        let worker = tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Some(message) = worker_rx.recv().await {
                if let WorkerMessage::Call { id, .. } = message {
                    ids.push(id);
                }
                if ids.len() == 2 {
                    break;
                }
            }
            events_tx.send(Event::Result { id: 99, response: Response::Path(vec![]) }).unwrap();
            events_tx
                .send(Event::Error {
                    id: ids[1],
                    error: CallError::Route(RouteError::TargetUnreachable { start: 0, target: 5 }),
                })
                .unwrap();
            events_tx.send(Event::Result { id: ids[0], response: Response::Path(vec![0, 5]) }).unwrap();
            ids
        });

        let first = client.call(Request::Dijkstra { source: 0 });
        let second = client.call(Request::Dijkstra { source: 1 });
        let (first, second) = tokio::join!(first, second);

        assert_eq!(worker.await.unwrap(), vec![0, 1]);
        assert_eq!(first.unwrap(), Response::Path(vec![0, 5]));
        assert!(matches!(
            second,
            Err(ChannelError::Remote(CallError::Route(RouteError::TargetUnreachable { .. })))
        ));
    }

    #[tokio::test]
    async fn test_wrong_response_kind_is_a_protocol_error() {
        let (requests, mut worker_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        events_tx
            .send(Event::Initialised { methods: Method::ALL.to_vec() })
            .unwrap();
        let client = ComputeClient::with_transport(requests, events).await.unwrap();

        tokio::spawn(async move {
            while let Some(message) = worker_rx.recv().await {
                if let WorkerMessage::Call { id, .. } = message {
                    let _ = events_tx.send(Event::Result { id, response: Response::Path(vec![1]) });
                }
            }
        });

        let err = client.dijkstra(1).await.unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }
}
