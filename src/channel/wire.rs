//! JSON envelope for carrying channel messages over any transport.
//!
//! Every message is `{"eventType": .., "eventId": .., "eventData": ..}` with
//! `eventId` present only on calls and their answers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{CallError, Event, Method, Request, Response, WorkerMessage};
use super::{ChannelError, StatusOr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Initialise,
    Initialised,
    Call,
    Result,
    Error,
    GraphVisitedUpdateBulk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub event_type: EventType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,

    #[serde(default)]
    pub event_data: Value,
}

impl WireMessage {
    fn new(event_type: EventType, event_id: Option<u64>, event_data: Value) -> Self {
        Self {
            event_type,
            event_id,
            event_data,
        }
    }

    pub fn to_json(&self) -> StatusOr<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> StatusOr<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn require_id(&self) -> StatusOr<u64> {
        self.event_id
            .ok_or_else(|| ChannelError::Protocol(format!("{:?} without an eventId", self.event_type)))
    }

    fn unexpected(&self, side: &str) -> ChannelError {
        ChannelError::Protocol(format!("{:?} is not a {} message", self.event_type, side))
    }
}

impl WorkerMessage {
    pub fn to_wire(&self) -> StatusOr<WireMessage> {
        Ok(match self {
            WorkerMessage::Initialise => WireMessage::new(EventType::Initialise, None, Value::Null),
            WorkerMessage::Call { id, request } => {
                WireMessage::new(EventType::Call, Some(*id), serde_json::to_value(request)?)
            }
        })
    }

    pub fn from_wire(wire: WireMessage) -> StatusOr<Self> {
        match wire.event_type {
            EventType::Initialise => Ok(WorkerMessage::Initialise),
            EventType::Call => {
                let id = wire.require_id()?;
                let request: Request = serde_json::from_value(wire.event_data)?;
                Ok(WorkerMessage::Call { id, request })
            }
            _ => Err(wire.unexpected("worker-bound")),
        }
    }
}

impl Event {
    pub fn to_wire(&self) -> StatusOr<WireMessage> {
        Ok(match self {
            Event::Initialised { methods } => {
                WireMessage::new(EventType::Initialised, None, serde_json::to_value(methods)?)
            }
            Event::Result { id, response } => {
                WireMessage::new(EventType::Result, Some(*id), serde_json::to_value(response)?)
            }
            Event::Error { id, error } => {
                WireMessage::new(EventType::Error, Some(*id), serde_json::to_value(error)?)
            }
            Event::VisitedBulk { node_indices } => WireMessage::new(
                EventType::GraphVisitedUpdateBulk,
                None,
                serde_json::to_value(node_indices)?,
            ),
        })
    }

    pub fn from_wire(wire: WireMessage) -> StatusOr<Self> {
        match wire.event_type {
            EventType::Initialised => {
                let methods: Vec<Method> = serde_json::from_value(wire.event_data)?;
                Ok(Event::Initialised { methods })
            }
            EventType::Result => {
                let id = wire.require_id()?;
                let response: Response = serde_json::from_value(wire.event_data)?;
                Ok(Event::Result { id, response })
            }
            EventType::Error => {
                let id = wire.require_id()?;
                let error: CallError = serde_json::from_value(wire.event_data)?;
                Ok(Event::Error { id, error })
            }
            EventType::GraphVisitedUpdateBulk => {
                let node_indices: Vec<usize> = serde_json::from_value(wire.event_data)?;
                Ok(Event::VisitedBulk { node_indices })
            }
            _ => Err(wire.unexpected("caller-bound")),
        }
    }
}
