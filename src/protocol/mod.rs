//! Wire envelopes exchanged between game clients and the game server.
//!
//! Every payload is a JSON object tagged by `kind`. Inbound payloads go
//! through [`parse_client_message`] / [`parse_server_message`] before any
//! routing: a payload that fails is answered with a [`ValidationFailure`]
//! and never reaches a state machine.

pub mod channel;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fst::{EntityId, IndexedEvent, Snapshot};
use crate::room::collection::{
    RoomCollectionCommand, RoomCollectionError, RoomCollectionEvent, ROOM_ENTITY_TYPE,
};
use crate::room::projection::RoomsProjection;
use crate::room::{RoomCommand, RoomEvent, RoomState};

pub use channel::{in_memory_channel, InMemoryChannel, Inbox, JsonMessageChannel, Outgoing};

/// Server-assigned connection identifier.
pub type ClientId = String;

/// Client-generated correlation identifier.
pub type RequestId = String;

/// Client to server envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEnvelope {
    pub client_id: ClientId,

    #[serde(flatten)]
    pub message: ClientMessage,
}

impl ClientEnvelope {
    pub fn new(client_id: impl Into<ClientId>, message: ClientMessage) -> Self {
        Self {
            client_id: client_id.into(),
            message,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Client to server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    AddEntity {
        request_id: RequestId,
        entity_type: String,
        id: EntityId,
        initial_state: RoomState,
    },

    #[serde(rename_all = "camelCase")]
    RemoveEntity {
        request_id: RequestId,
        entity_type: String,
        id: EntityId,
    },

    #[serde(rename_all = "camelCase")]
    UpdateEntity {
        request_id: RequestId,
        entity_type: String,
        id: EntityId,
        command: RoomCommand,
    },

    SubscribeRooms,

    UnsubscribeRooms,

    #[serde(rename_all = "camelCase")]
    SubscribeRoom { room_id: EntityId },

    #[serde(rename_all = "camelCase")]
    UnsubscribeRoom { room_id: EntityId },

    /// Look up a room's public details.
    #[serde(rename_all = "camelCase")]
    GetRoomDoor {
        request_id: RequestId,
        room_id: EntityId,
    },
}

impl ClientMessage {
    /// Wrap a collection command for the wire.
    pub fn command(request_id: impl Into<RequestId>, command: RoomCollectionCommand) -> Self {
        let request_id = request_id.into();
        let entity_type = ROOM_ENTITY_TYPE.to_string();
        match command {
            RoomCollectionCommand::AddEntity { id, initial_state } => Self::AddEntity {
                request_id,
                entity_type,
                id,
                initial_state,
            },
            RoomCollectionCommand::RemoveEntity { id } => Self::RemoveEntity {
                request_id,
                entity_type,
                id,
            },
            RoomCollectionCommand::UpdateEntity { id, command } => Self::UpdateEntity {
                request_id,
                entity_type,
                id,
                command,
            },
        }
    }

    /// Split a command message into its request ID and collection command.
    pub fn into_command(self) -> Result<(RequestId, RoomCollectionCommand), Self> {
        match self {
            Self::AddEntity {
                request_id,
                id,
                initial_state,
                ..
            } => Ok((request_id, RoomCollectionCommand::AddEntity { id, initial_state })),
            Self::RemoveEntity { request_id, id, .. } => {
                Ok((request_id, RoomCollectionCommand::RemoveEntity { id }))
            }
            Self::UpdateEntity {
                request_id,
                id,
                command,
                ..
            } => Ok((request_id, RoomCollectionCommand::UpdateEntity { id, command })),
            other => Err(other),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::AddEntity { request_id, .. }
            | Self::RemoveEntity { request_id, .. }
            | Self::UpdateEntity { request_id, .. }
            | Self::GetRoomDoor { request_id, .. } => Some(request_id),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddEntity { .. } => "AddEntity",
            Self::RemoveEntity { .. } => "RemoveEntity",
            Self::UpdateEntity { .. } => "UpdateEntity",
            Self::SubscribeRooms => "SubscribeRooms",
            Self::UnsubscribeRooms => "UnsubscribeRooms",
            Self::SubscribeRoom { .. } => "SubscribeRoom",
            Self::UnsubscribeRoom { .. } => "UnsubscribeRoom",
            Self::GetRoomDoor { .. } => "GetRoomDoor",
        }
    }
}

/// Public details of a room, as answered to `GetRoomDoor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDoor {
    pub room_id: EntityId,
    pub owner: String,
}

/// Outcome of a collection command, sent to its issuer only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CommandResult {
    Ok { event: IndexedEvent<RoomCollectionEvent> },
    Err { error: RoomCollectionError },
}

impl CommandResult {
    pub fn into_result(self) -> Result<IndexedEvent<RoomCollectionEvent>, RoomCollectionError> {
        match self {
            Self::Ok { event } => Ok(event),
            Self::Err { error } => Err(error),
        }
    }
}

impl From<Result<IndexedEvent<RoomCollectionEvent>, RoomCollectionError>> for CommandResult {
    fn from(result: Result<IndexedEvent<RoomCollectionEvent>, RoomCollectionError>) -> Self {
        match result {
            Ok(event) => Self::Ok { event },
            Err(error) => Self::Err { error },
        }
    }
}

/// Event payload of a sync message. The envelope does not say which stream
/// it belongs to, so the shape decides: rooms list first, then a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncEvent {
    Rooms(RoomCollectionEvent),
    Room(RoomEvent),
}

/// Snapshot payload of a sync message, resolved the same way as [`SyncEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncState {
    Rooms(RoomsProjection),
    Room(RoomState),
}

/// Server to client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ServerMessage {
    /// Handshake: the connection's ID, required on every client envelope
    #[serde(rename_all = "camelCase")]
    ClientConnected { client_id: ClientId },

    #[serde(rename_all = "camelCase")]
    CommandResponse {
        request_id: RequestId,
        result: CommandResult,
    },

    #[serde(rename_all = "camelCase")]
    GetRoomDoorResponse {
        request_id: RequestId,
        room_id: EntityId,
        door: Option<RoomDoor>,
    },

    SubscribeRoomsAccepted,

    SubscribeRoomsRejected { message: String },

    #[serde(rename_all = "camelCase")]
    SubscribeRoomAccepted { room_id: EntityId },

    #[serde(rename_all = "camelCase")]
    SubscribeRoomRejected { room_id: EntityId, message: String },

    /// The watched room is gone; no further room payloads follow.
    #[serde(rename_all = "camelCase")]
    RoomRemoved { room_id: EntityId },

    IndexedEvent { index: u64, event: SyncEvent },

    #[serde(rename_all = "camelCase")]
    Snapshot {
        state: SyncState,
        last_applied_index: u64,
    },

    /// Carries the request ID when the rejected message had one.
    #[serde(rename_all = "camelCase")]
    ValidationFailure {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },
}

impl ServerMessage {
    pub fn rooms_event(event: IndexedEvent<RoomCollectionEvent>) -> Self {
        Self::IndexedEvent {
            index: event.index,
            event: SyncEvent::Rooms(event.event),
        }
    }

    pub fn room_event(event: IndexedEvent<RoomEvent>) -> Self {
        Self::IndexedEvent {
            index: event.index,
            event: SyncEvent::Room(event.event),
        }
    }

    pub fn rooms_snapshot(snapshot: Snapshot<RoomsProjection>) -> Self {
        Self::Snapshot {
            state: SyncState::Rooms(snapshot.state),
            last_applied_index: snapshot.last_applied_index,
        }
    }

    pub fn room_snapshot(snapshot: Snapshot<RoomState>) -> Self {
        Self::Snapshot {
            state: SyncState::Room(snapshot.state),
            last_applied_index: snapshot.last_applied_index,
        }
    }

    pub fn validation_failure(failure: ValidationFailure, request_id: Option<RequestId>) -> Self {
        Self::ValidationFailure {
            message: failure.message,
            request_id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A payload that did not pass parse-and-validate.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationFailure {
    pub message: String,
}

impl ValidationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Decode and validate a client payload.
pub fn parse_client_message(payload: &str) -> Result<ClientEnvelope, ValidationFailure> {
    let envelope: ClientEnvelope = serde_json::from_str(payload)
        .map_err(|e| ValidationFailure::new(format!("Malformed client message: {}", e)))?;
    validate_client_envelope(&envelope)?;
    Ok(envelope)
}

/// Decode a server payload.
pub fn parse_server_message(payload: &str) -> Result<ServerMessage, ValidationFailure> {
    serde_json::from_str(payload)
        .map_err(|e| ValidationFailure::new(format!("Malformed server message: {}", e)))
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationFailure> {
    if value.trim().is_empty() {
        Err(ValidationFailure::new(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

fn require_room_type(entity_type: &str) -> Result<(), ValidationFailure> {
    if entity_type == ROOM_ENTITY_TYPE {
        Ok(())
    } else {
        Err(ValidationFailure::new(format!(
            "Unsupported entity type {:?}",
            entity_type
        )))
    }
}

fn validate_room_state(state: &RoomState) -> Result<(), ValidationFailure> {
    require_non_empty("initialState.owner", &state.owner)?;
    require_non_empty("initialState.code", &state.code)?;

    let mut seen = HashSet::new();
    for guest in &state.guests {
        require_non_empty("initialState.guests[]", guest)?;
        if *guest == state.owner {
            return Err(ValidationFailure::new("Room owner cannot be listed as a guest"));
        }
        if !seen.insert(guest.as_str()) {
            return Err(ValidationFailure::new(format!("Duplicate guest {:?}", guest)));
        }
    }
    Ok(())
}

fn validate_room_command(command: &RoomCommand) -> Result<(), ValidationFailure> {
    match command {
        RoomCommand::JoinRoom { user_id, .. } | RoomCommand::LeaveRoom { user_id } => {
            require_non_empty("command.userId", user_id)
        }
        RoomCommand::RemoveGuest {
            requester_id,
            guest_id,
        } => {
            require_non_empty("command.requesterId", requester_id)?;
            require_non_empty("command.guestId", guest_id)
        }
        RoomCommand::StartGameSession {
            requester_id,
            session_id,
            game_id,
        } => {
            require_non_empty("command.requesterId", requester_id)?;
            require_non_empty("command.sessionId", session_id)?;
            require_non_empty("command.gameId", game_id)
        }
        RoomCommand::StartGameSessionBuilder {
            requester_id,
            builder_id,
            game_id,
        } => {
            require_non_empty("command.requesterId", requester_id)?;
            require_non_empty("command.builderId", builder_id)?;
            require_non_empty("command.gameId", game_id)
        }
        RoomCommand::ClearRoomSession { requester_id } => {
            require_non_empty("command.requesterId", requester_id)
        }
        RoomCommand::ChangeRoomCode { requester_id, code } => {
            require_non_empty("command.requesterId", requester_id)?;
            require_non_empty("command.code", code)
        }
    }
}

fn validate_client_envelope(envelope: &ClientEnvelope) -> Result<(), ValidationFailure> {
    require_non_empty("clientId", &envelope.client_id)?;

    if let Some(request_id) = envelope.message.request_id() {
        require_non_empty("requestId", request_id)?;
    }

    match &envelope.message {
        ClientMessage::AddEntity {
            entity_type,
            id,
            initial_state,
            ..
        } => {
            require_room_type(entity_type)?;
            require_non_empty("id", id)?;
            validate_room_state(initial_state)
        }
        ClientMessage::RemoveEntity { entity_type, id, .. } => {
            require_room_type(entity_type)?;
            require_non_empty("id", id)
        }
        ClientMessage::UpdateEntity {
            entity_type,
            id,
            command,
            ..
        } => {
            require_room_type(entity_type)?;
            require_non_empty("id", id)?;
            validate_room_command(command)
        }
        ClientMessage::SubscribeRoom { room_id }
        | ClientMessage::UnsubscribeRoom { room_id }
        | ClientMessage::GetRoomDoor { room_id, .. } => require_non_empty("roomId", room_id),
        ClientMessage::SubscribeRooms | ClientMessage::UnsubscribeRooms => Ok(()),
    }
}
