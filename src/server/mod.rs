//! Game server.
//!
//! Owns the room collection leader and routes its events to two independent
//! audiences:
//!
//! - **rooms-list subscribers** get every collection-level event
//!   (`EntityAdded`, `EntityRemoved`, `EntityUpdated`), indexed in the
//!   collection's stream.
//! - **room subscribers** of a given room get only that room's own events,
//!   unwrapped from `EntityUpdated` and indexed in the room's stream.

pub mod registry;

use std::collections::HashMap;

use crate::config::ServerConfig;
use crate::fst::{CollectionEvent, EntityId, Follower, Leader};
use crate::protocol::{
    parse_client_message, ClientId, ClientMessage, CommandResult, RequestId, RoomDoor,
    ServerMessage, ValidationFailure,
};
use crate::room::collection::{
    nested_room_event, room_collection, RoomCollection, RoomCollectionCommand,
};
use crate::room::projection::{
    rooms_projection_follower, RoomsProjection, RoomsProjectionFollower,
};
use crate::room::Room;

pub use registry::{
    ClientConnection, ClientRegistry, SubscribeOutcome, SubscriberLimitReached, SubscriberSet,
};

/// Outbound delivery to a single connected client.
pub trait Broadcaster {
    fn deliver(&mut self, client_id: &str, message: &ServerMessage);
}

impl<F> Broadcaster for F
where
    F: FnMut(&str, &ServerMessage),
{
    fn deliver(&mut self, client_id: &str, message: &ServerMessage) {
        self(client_id, message)
    }
}

/// Authoritative room server.
pub struct GameServer<B: Broadcaster> {
    config: ServerConfig,

    /// All rooms
    rooms: RoomCollection,

    /// Rooms list, fed by every accepted collection event
    rooms_projection: RoomsProjectionFollower,

    clients: ClientRegistry,

    rooms_subscribers: SubscriberSet,

    /// Subscriber sets by room ID
    room_subscribers: HashMap<EntityId, SubscriberSet>,

    broadcaster: B,
}

impl<B: Broadcaster> GameServer<B> {
    pub fn new(config: ServerConfig, broadcaster: B) -> Self {
        let rooms_subscribers = SubscriberSet::new(config.max_subscribers);
        Self {
            config,
            rooms: room_collection(),
            rooms_projection: rooms_projection_follower(),
            clients: ClientRegistry::new(),
            rooms_subscribers,
            room_subscribers: HashMap::new(),
            broadcaster,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register a new client and send it the handshake.
    pub fn connect_client(&mut self) -> ClientId {
        let client_id = self.clients.connect();
        log::info!("Client {} connected", client_id);
        self.send(
            &client_id,
            ServerMessage::ClientConnected {
                client_id: client_id.clone(),
            },
        );
        client_id
    }

    /// Forget a client and all of its subscriptions.
    pub fn disconnect_client(&mut self, client_id: &str) {
        if self.clients.remove(client_id).is_none() {
            return;
        }
        self.rooms_subscribers.remove(client_id);
        self.room_subscribers.retain(|_, set| {
            set.remove(client_id);
            !set.is_empty()
        });
        log::info!("Client {} disconnected", client_id);
    }

    /// Handle one inbound payload.
    ///
    /// A payload that fails validation is answered with `ValidationFailure`
    /// (keyed by its `requestId`, if it had one) when the sender is a known
    /// client, and the failure is returned either way so the transport can
    /// answer unknown senders itself.
    pub fn handle_message(&mut self, payload: &str) -> Result<(), ValidationFailure> {
        let envelope = match parse_client_message(payload) {
            Ok(envelope) => envelope,
            Err(failure) => {
                log::warn!("Rejected client message: {}", failure);
                if let Some((client_id, request_id)) = self.reply_target(payload) {
                    let reply = ServerMessage::validation_failure(failure.clone(), request_id);
                    self.send(&client_id, reply);
                }
                return Err(failure);
            }
        };

        let client_id = envelope.client_id;
        if !self.clients.touch(&client_id) {
            let failure = ValidationFailure::new(format!("Unknown client {}", client_id));
            log::warn!("Rejected client message: {}", failure);
            return Err(failure);
        }

        log::debug!("{} from client {}", envelope.message.kind(), client_id);

        match envelope.message {
            ClientMessage::SubscribeRooms => self.subscribe_rooms(&client_id),
            ClientMessage::UnsubscribeRooms => {
                self.rooms_subscribers.remove(&client_id);
            }
            ClientMessage::SubscribeRoom { room_id } => self.subscribe_room(&client_id, room_id),
            ClientMessage::UnsubscribeRoom { room_id } => {
                self.unsubscribe_room(&client_id, &room_id)
            }
            ClientMessage::GetRoomDoor { request_id, room_id } => {
                let door = self.room_door(&room_id);
                self.send(
                    &client_id,
                    ServerMessage::GetRoomDoorResponse {
                        request_id,
                        room_id,
                        door,
                    },
                );
            }
            command => {
                if let Ok((request_id, command)) = command.into_command() {
                    self.handle_command(&client_id, request_id, command);
                }
            }
        }
        Ok(())
    }

    /// Current rooms list.
    pub fn rooms(&self) -> &RoomsProjection {
        self.rooms_projection.state()
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn collection(&self) -> &RoomCollection {
        &self.rooms
    }

    pub fn client_count(&self) -> usize {
        self.clients.count()
    }

    pub fn rooms_subscriber_count(&self) -> usize {
        self.rooms_subscribers.len()
    }

    pub fn room_subscriber_count(&self, room_id: &str) -> usize {
        self.room_subscribers.get(room_id).map_or(0, |set| set.len())
    }

    /// Known sender and request ID of a payload that failed validation.
    fn reply_target(&self, payload: &str) -> Option<(ClientId, Option<RequestId>)> {
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;
        let client_id = value.get("clientId")?.as_str()?;
        if !self.clients.contains(client_id) {
            return None;
        }
        let request_id = value
            .get("requestId")
            .and_then(|id| id.as_str())
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string);
        Some((client_id.to_string(), request_id))
    }

    fn send(&mut self, client_id: &str, message: ServerMessage) {
        self.broadcaster.deliver(client_id, &message);
    }

    fn send_all(&mut self, client_ids: &[ClientId], message: ServerMessage) {
        for client_id in client_ids {
            self.broadcaster.deliver(client_id, &message);
        }
    }

    fn subscribe_rooms(&mut self, client_id: &str) {
        match self.rooms_subscribers.add(client_id) {
            Ok(_) => {
                self.send(client_id, ServerMessage::SubscribeRoomsAccepted);
                // Nothing to catch up on before the first event
                if self.rooms.current_index() > 0 {
                    let snapshot = self.rooms_projection.snapshot();
                    self.send(client_id, ServerMessage::rooms_snapshot(snapshot));
                }
            }
            Err(limit) => {
                log::warn!("Rooms subscription from {} rejected: {}", client_id, limit);
                self.send(
                    client_id,
                    ServerMessage::SubscribeRoomsRejected {
                        message: limit.to_string(),
                    },
                );
            }
        }
    }

    fn subscribe_room(&mut self, client_id: &str, room_id: EntityId) {
        let Some(snapshot) = self.rooms.get(&room_id).map(|room| room.snapshot()) else {
            self.send(
                client_id,
                ServerMessage::SubscribeRoomRejected {
                    message: format!("Room {} not found", room_id),
                    room_id,
                },
            );
            return;
        };

        let max_subscribers = self.config.max_subscribers;
        let result = self
            .room_subscribers
            .entry(room_id.clone())
            .or_insert_with(|| SubscriberSet::new(max_subscribers))
            .add(client_id);

        match result {
            Ok(_) => {
                self.send(
                    client_id,
                    ServerMessage::SubscribeRoomAccepted {
                        room_id: room_id.clone(),
                    },
                );
                self.send(client_id, ServerMessage::room_snapshot(snapshot));
            }
            Err(limit) => {
                log::warn!(
                    "Room {} subscription from {} rejected: {}",
                    room_id,
                    client_id,
                    limit
                );
                self.send(
                    client_id,
                    ServerMessage::SubscribeRoomRejected {
                        room_id,
                        message: limit.to_string(),
                    },
                );
            }
        }
    }

    fn unsubscribe_room(&mut self, client_id: &str, room_id: &str) {
        if let Some(set) = self.room_subscribers.get_mut(room_id) {
            set.remove(client_id);
            if set.is_empty() {
                self.room_subscribers.remove(room_id);
            }
        }
    }

    fn room_door(&self, room_id: &str) -> Option<RoomDoor> {
        self.rooms.get(room_id).map(|room| RoomDoor {
            room_id: room_id.to_string(),
            owner: room.state().owner.clone(),
        })
    }

    fn handle_command(
        &mut self,
        client_id: &str,
        request_id: RequestId,
        command: RoomCollectionCommand,
    ) {
        let room_id = command.id().to_string();
        let result = self.rooms.handle_command(command);

        let event = match result {
            Ok(event) => event,
            Err(error) => {
                log::warn!("Command {} from {} rejected: {}", request_id, client_id, error);
                self.send(
                    client_id,
                    ServerMessage::CommandResponse {
                        request_id,
                        result: CommandResult::Err { error },
                    },
                );
                return;
            }
        };

        if let Err(e) = self.rooms_projection.apply_event(event.clone()) {
            log::error!("Rooms projection out of step with collection: {}", e);
        }

        self.send(
            client_id,
            ServerMessage::CommandResponse {
                request_id,
                result: CommandResult::Ok {
                    event: event.clone(),
                },
            },
        );

        // Room-level audience: the room's own stream, never the collection's
        if let Some((_, nested)) = nested_room_event(&event) {
            let nested = nested.clone();
            let subscribers = self
                .room_subscribers
                .get(&room_id)
                .map(|set| set.client_ids())
                .unwrap_or_default();
            self.send_all(&subscribers, ServerMessage::room_event(nested));
        }

        if let CollectionEvent::EntityRemoved { .. } = event.event {
            if let Some(set) = self.room_subscribers.remove(&room_id) {
                let watchers = set.client_ids();
                self.send_all(&watchers, ServerMessage::RoomRemoved { room_id });
            }
        }

        let subscribers = self.rooms_subscribers.client_ids();
        self.send_all(&subscribers, ServerMessage::rooms_event(event));
    }
}
