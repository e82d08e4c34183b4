//! Client-side proxy for a game server.
//!
//! The proxy keeps read replicas of what the client subscribed to: the
//! rooms list, and at most one room. Nothing leaves the proxy until the
//! server's `ClientConnected` handshake has arrived; earlier submissions are
//! queued and flushed in order.
//!
//! Sync payloads do not say which stream they belong to, so they are told
//! apart by shape: a payload that reads as a rooms-list event or snapshot
//! goes to the rooms replica, anything else to the subscribed room.

pub mod pending;

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;

use crate::config::ProxyConfig;
use crate::fst::{EntityId, Follower, IndexedEvent, ProjectionStore, Snapshot, Subscription};
use crate::protocol::{
    parse_server_message, ClientEnvelope, ClientId, ClientMessage, JsonMessageChannel, RoomDoor,
    ServerMessage, SyncEvent, SyncState, ValidationFailure,
};
use crate::room::collection::{RoomCollectionCommand, RoomCollectionError, RoomCollectionEvent};
use crate::room::projection::{rooms_projection_store, RoomsProjection, RoomsProjectionStore};
use crate::room::{room_follower, RoomCommand, RoomEvent, RoomState};

pub use pending::{PendingRequests, PendingResponse};

/// Observable replica of a single room.
pub type RoomStore = ProjectionStore<RoomState, RoomEvent>;

type RoomCallback = Box<dyn FnMut(&RoomState)>;

/// Proxy errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Command rejected: {0}")]
    Rejected(RoomCollectionError),

    #[error("Server refused the request: {0}")]
    Invalid(String),

    #[error("Proxy dropped before the response arrived")]
    Dropped,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The one room the client is watching.
struct RoomWatch {
    room_id: EntityId,

    /// Created from the first snapshot
    store: Option<RoomStore>,

    /// Handed to the store once it exists
    callback: Option<RoomCallback>,

    subscription: Option<Subscription>,
}

impl RoomWatch {
    fn new(room_id: EntityId, callback: RoomCallback) -> Self {
        Self {
            room_id,
            store: None,
            callback: Some(callback),
            subscription: None,
        }
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot<RoomState>) {
        if let Some(store) = &mut self.store {
            if let Err(e) = store.apply_snapshot(snapshot) {
                log::warn!("Room {} snapshot rejected: {}", self.room_id, e);
            }
            return;
        }

        let store = ProjectionStore::new(room_follower(snapshot));
        if let Some(callback) = self.callback.take() {
            self.subscription = Some(store.subscribe(callback));
        }
        self.store = Some(store);
    }

    fn apply_event(&mut self, event: IndexedEvent<RoomEvent>) {
        match &mut self.store {
            Some(store) => {
                if let Err(e) = store.apply_event(event) {
                    log::warn!("Room {} event rejected: {}", self.room_id, e);
                }
            }
            None => log::debug!(
                "Room {} event {} before its snapshot, ignored",
                self.room_id,
                event.index
            ),
        }
    }
}

impl Drop for RoomWatch {
    fn drop(&mut self) {
        if let Some(subscription) = &self.subscription {
            subscription.unsubscribe();
        }
    }
}

/// Talks to a game server over a [`JsonMessageChannel`].
pub struct GameServerProxy<C: JsonMessageChannel> {
    channel: C,
    config: ProxyConfig,

    /// Set by the handshake
    client_id: Option<ClientId>,

    /// Submitted before the handshake, in order
    queued: VecDeque<ClientMessage>,

    pending: PendingRequests,

    rooms: RoomsProjectionStore,

    /// Whether `SubscribeRooms` has been sent (or queued)
    rooms_requested: bool,

    room: Option<RoomWatch>,

    /// `SubscribeRoom` messages the server has not answered yet
    room_subscribes_outstanding: usize,
}

impl<C: JsonMessageChannel> GameServerProxy<C> {
    pub fn new(channel: C, config: ProxyConfig) -> Self {
        Self {
            channel,
            config,
            client_id: None,
            queued: VecDeque::new(),
            pending: PendingRequests::new(),
            rooms: rooms_projection_store(),
            rooms_requested: false,
            room: None,
            room_subscribes_outstanding: 0,
        }
    }

    /// ID assigned by the server, once connected.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.client_id.is_some()
    }

    /// Current rooms list replica.
    pub fn rooms(&self) -> &RoomsProjection {
        self.rooms.state()
    }

    /// Watched room ID, if any.
    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(|watch| watch.room_id.as_str())
    }

    /// Watched room state, once its snapshot has arrived.
    pub fn room_state(&self) -> Option<&RoomState> {
        self.room
            .as_ref()
            .and_then(|watch| watch.store.as_ref())
            .map(|store| store.state())
    }

    /// Outstanding commands and queries.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Watch the rooms list. The callback fires right away with the current
    /// replica and again after every update.
    pub fn subscribe_to_rooms(
        &mut self,
        callback: impl FnMut(&RoomsProjection) + 'static,
    ) -> Subscription {
        if !self.rooms_requested {
            self.rooms_requested = true;
            self.submit(ClientMessage::SubscribeRooms);
        }
        self.rooms.subscribe(callback)
    }

    /// Stop rooms-list updates from the server. Local callbacks stay
    /// registered and fire again if the client re-subscribes.
    pub fn unsubscribe_rooms(&mut self) {
        if self.rooms_requested {
            self.rooms_requested = false;
            self.submit(ClientMessage::UnsubscribeRooms);
        }
    }

    /// Watch a single room, replacing any room watched before. The callback
    /// first fires when the room's snapshot arrives.
    pub fn subscribe_to_room(
        &mut self,
        room_id: impl Into<EntityId>,
        callback: impl FnMut(&RoomState) + 'static,
    ) {
        let room_id = room_id.into();
        if room_id.trim().is_empty() {
            log::warn!("Refusing to watch a room with an empty ID");
            return;
        }
        self.unsubscribe_room();
        self.room = Some(RoomWatch::new(room_id.clone(), Box::new(callback)));
        self.room_subscribes_outstanding += 1;
        self.submit(ClientMessage::SubscribeRoom { room_id });
    }

    /// Stop watching the current room, if any.
    pub fn unsubscribe_room(&mut self) {
        if let Some(watch) = self.room.take() {
            self.submit(ClientMessage::UnsubscribeRoom {
                room_id: watch.room_id.clone(),
            });
        }
    }

    /// Send a collection command; resolves with the accepted event.
    pub fn offer_rooms_command(
        &mut self,
        command: RoomCollectionCommand,
    ) -> PendingResponse<IndexedEvent<RoomCollectionEvent>> {
        let (request_id, response) = self.pending.register_command();
        self.submit(ClientMessage::command(request_id, command));
        response
    }

    /// Send a command to one room.
    pub fn offer_room_command(
        &mut self,
        room_id: impl Into<EntityId>,
        command: RoomCommand,
    ) -> PendingResponse<IndexedEvent<RoomCollectionEvent>> {
        self.offer_rooms_command(RoomCollectionCommand::UpdateEntity {
            id: room_id.into(),
            command,
        })
    }

    /// Look up a room's owner. Resolves to `None` for unknown rooms.
    pub fn get_room_door(
        &mut self,
        room_id: impl Into<EntityId>,
    ) -> PendingResponse<Option<RoomDoor>> {
        let (request_id, response) = self.pending.register_room_door();
        self.submit(ClientMessage::GetRoomDoor {
            request_id,
            room_id: room_id.into(),
        });
        response
    }

    /// Handle one payload from the server.
    pub fn handle_message(&mut self, payload: &str) -> Result<(), ValidationFailure> {
        let message = parse_server_message(payload).map_err(|failure| {
            log::warn!("Rejected server message: {}", failure);
            failure
        })?;

        match message {
            ServerMessage::ClientConnected { client_id } => self.on_connected(client_id),

            ServerMessage::CommandResponse { request_id, result } => {
                if !self.pending.resolve_command(&request_id, result) {
                    log::debug!("No command waiting for response {}", request_id);
                }
            }

            ServerMessage::GetRoomDoorResponse { request_id, door, .. } => {
                if !self.pending.resolve_room_door(&request_id, door) {
                    log::debug!("No query waiting for response {}", request_id);
                }
            }

            ServerMessage::SubscribeRoomsAccepted => log::debug!("Rooms subscription accepted"),

            ServerMessage::SubscribeRoomsRejected { message } => {
                log::warn!("Rooms subscription rejected: {}", message);
                self.rooms_requested = false;
            }

            ServerMessage::SubscribeRoomAccepted { room_id } => {
                self.room_subscribe_answered();
                log::debug!("Room {} subscription accepted", room_id);
            }

            ServerMessage::SubscribeRoomRejected { room_id, message } => {
                self.room_subscribe_answered();
                log::warn!("Room {} subscription rejected: {}", room_id, message);
                if self.current_room(&room_id) {
                    self.room = None;
                }
            }

            ServerMessage::RoomRemoved { room_id } => {
                if self.current_room(&room_id) {
                    log::info!("Watched room {} was removed", room_id);
                    self.room = None;
                }
            }

            ServerMessage::IndexedEvent { index, event } => match event {
                SyncEvent::Rooms(event) => {
                    if let Err(e) = self.rooms.apply_event(IndexedEvent::new(index, event)) {
                        log::warn!("Rooms event rejected: {}", e);
                    }
                }
                SyncEvent::Room(event) => match self.accepted_room() {
                    Some(watch) => watch.apply_event(IndexedEvent::new(index, event)),
                    None => log::debug!("Room event {} with no room watched, ignored", index),
                },
            },

            ServerMessage::Snapshot {
                state,
                last_applied_index,
            } => match state {
                SyncState::Rooms(state) => {
                    let snapshot = Snapshot::new(state, last_applied_index);
                    if let Err(e) = self.rooms.apply_snapshot(snapshot) {
                        log::warn!("Rooms snapshot rejected: {}", e);
                    }
                }
                SyncState::Room(state) => match self.accepted_room() {
                    Some(watch) => watch.apply_snapshot(Snapshot::new(state, last_applied_index)),
                    None => log::debug!("Room snapshot with no room watched, ignored"),
                },
            },

            ServerMessage::ValidationFailure { message, request_id } => {
                log::warn!("Server rejected a message: {}", message);
                if let Some(request_id) = request_id {
                    if !self.pending.fail(&request_id, ProxyError::Invalid(message)) {
                        log::debug!("No request waiting under {}", request_id);
                    }
                }
            }
        }
        Ok(())
    }

    // The server answers subscriptions in order, so room payloads belong to
    // the current watch only once every earlier `SubscribeRoom` is answered.
    fn accepted_room(&mut self) -> Option<&mut RoomWatch> {
        if self.room_subscribes_outstanding > 0 {
            return None;
        }
        self.room.as_mut()
    }

    fn room_subscribe_answered(&mut self) {
        self.room_subscribes_outstanding = self.room_subscribes_outstanding.saturating_sub(1);
    }

    fn current_room(&self, room_id: &str) -> bool {
        self.room_subscribes_outstanding == 0 && self.room_id() == Some(room_id)
    }

    fn on_connected(&mut self, client_id: ClientId) {
        log::info!("Connected as {}", client_id);
        self.client_id = Some(client_id);
        while let Some(message) = self.queued.pop_front() {
            self.transmit(message);
        }
    }

    fn submit(&mut self, message: ClientMessage) {
        if self.client_id.is_some() {
            self.transmit(message);
        } else {
            log::debug!("{} queued until connected", message.kind());
            self.queued.push_back(message);
        }
    }

    fn transmit(&mut self, message: ClientMessage) {
        let Some(client_id) = self.client_id.clone() else {
            self.queued.push_back(message);
            return;
        };
        match ClientEnvelope::new(client_id, message).to_json() {
            Ok(payload) => self.channel.send(payload, &self.config.auth_token),
            Err(e) => log::error!("{}", ProxyError::from(e)),
        }
    }
}

impl<C: JsonMessageChannel> fmt::Debug for GameServerProxy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameServerProxy")
            .field("client_id", &self.client_id)
            .field("queued", &self.queued.len())
            .field("pending", &self.pending)
            .field("rooms", self.rooms.state())
            .field("room_id", &self.room_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::CollectionEvent;
    use crate::protocol::{in_memory_channel, CommandResult, InMemoryChannel, Inbox};
    use crate::room::projection::RoomEntry;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn make_proxy() -> (GameServerProxy<InMemoryChannel>, Inbox) {
        let (channel, inbox) = in_memory_channel();
        (GameServerProxy::new(channel, ProxyConfig::new("token")), inbox)
    }

    fn deliver(proxy: &mut GameServerProxy<InMemoryChannel>, message: ServerMessage) {
        proxy.handle_message(&message.to_json().unwrap()).unwrap();
    }

    fn connect(proxy: &mut GameServerProxy<InMemoryChannel>) {
        deliver(
            proxy,
            ServerMessage::ClientConnected {
                client_id: "c1".to_string(),
            },
        );
    }

    fn sent(inbox: &mut Inbox) -> Vec<Value> {
        inbox
            .drain()
            .into_iter()
            .map(|o| serde_json::from_str(&o.payload).unwrap())
            .collect()
    }

    fn room_added(index: u64, id: &str, owner: &str) -> ServerMessage {
        ServerMessage::rooms_event(IndexedEvent::new(
            index,
            CollectionEvent::EntityAdded {
                id: id.to_string(),
                initial_state: RoomState::new(owner, "ABC123"),
            },
        ))
    }

    #[test]
    fn test_queued_until_handshake() {
        let (mut proxy, mut inbox) = make_proxy();

        proxy.subscribe_to_rooms(|_| {});
        proxy.subscribe_to_room("room1", |_| {});
        assert!(inbox.drain().is_empty());
        assert!(!proxy.is_connected());

        connect(&mut proxy);
        let out = inbox.drain();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].auth_token, "token");

        let first: Value = serde_json::from_str(&out[0].payload).unwrap();
        let second: Value = serde_json::from_str(&out[1].payload).unwrap();
        assert_eq!(first, json!({"clientId": "c1", "kind": "SubscribeRooms"}));
        assert_eq!(
            second,
            json!({"clientId": "c1", "kind": "SubscribeRoom", "roomId": "room1"})
        );
        assert_eq!(proxy.client_id(), Some("c1"));
    }

    #[test]
    fn test_rooms_replica_and_callback() {
        let (mut proxy, _inbox) = make_proxy();
        connect(&mut proxy);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        proxy.subscribe_to_rooms(move |rooms| log.borrow_mut().push(rooms.len()));

        deliver(
            &mut proxy,
            ServerMessage::rooms_snapshot(Snapshot::new(
                RoomsProjection {
                    rooms: vec![RoomEntry {
                        entity_id: "room1".to_string(),
                        room_owner: "alice".to_string(),
                    }],
                },
                4,
            )),
        );
        deliver(&mut proxy, room_added(5, "room2", "bob"));
        // Gap: dropped and logged
        deliver(&mut proxy, room_added(9, "room3", "carol"));

        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
        assert_eq!(proxy.rooms().owner_of("room2"), Some("bob"));
    }

    #[test]
    fn test_room_watch_switch() {
        let (mut proxy, mut inbox) = make_proxy();
        connect(&mut proxy);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        proxy.subscribe_to_room("room1", move |room: &RoomState| {
            log.borrow_mut().push(room.guests.clone())
        });
        proxy.subscribe_to_room("room2", |_| {});

        let out = sent(&mut inbox);
        assert_eq!(
            out[1],
            json!({"clientId": "c1", "kind": "UnsubscribeRoom", "roomId": "room1"})
        );
        assert_eq!(
            out[2],
            json!({"clientId": "c1", "kind": "SubscribeRoom", "roomId": "room2"})
        );
        assert_eq!(proxy.room_id(), Some("room2"));

        // Still-in-flight room1 payloads are dropped
        deliver(
            &mut proxy,
            ServerMessage::room_snapshot(Snapshot::new(RoomState::new("alice", "ABC123"), 2)),
        );
        assert!(proxy.room_state().is_none());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_room_created_from_first_snapshot() {
        let (mut proxy, _inbox) = make_proxy();
        connect(&mut proxy);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        proxy.subscribe_to_room("room1", move |room: &RoomState| {
            log.borrow_mut().push(room.guests.clone())
        });

        deliver(
            &mut proxy,
            ServerMessage::SubscribeRoomAccepted {
                room_id: "room1".to_string(),
            },
        );
        let mut state = RoomState::new("alice", "ABC123");
        state.guests.push("bob".to_string());
        deliver(&mut proxy, ServerMessage::room_snapshot(Snapshot::new(state, 1)));
        deliver(
            &mut proxy,
            ServerMessage::room_event(IndexedEvent::new(
                2,
                RoomEvent::GuestJoined {
                    user_id: "carol".to_string(),
                },
            )),
        );

        assert_eq!(
            *seen.borrow(),
            vec![vec!["bob".to_string()], vec!["bob".to_string(), "carol".to_string()]]
        );
        assert_eq!(proxy.room_state().unwrap().guest_count(), 2);

        proxy.unsubscribe_room();
        assert!(proxy.room_state().is_none());
    }

    #[test]
    fn test_room_rejection_clears_watch() {
        let (mut proxy, _inbox) = make_proxy();
        connect(&mut proxy);

        proxy.subscribe_to_room("ghost", |_| {});
        deliver(
            &mut proxy,
            ServerMessage::SubscribeRoomRejected {
                room_id: "ghost".to_string(),
                message: "Room ghost not found".to_string(),
            },
        );
        assert_eq!(proxy.room_id(), None);
    }

    fn accepted(room_id: &str) -> ServerMessage {
        ServerMessage::SubscribeRoomAccepted {
            room_id: room_id.to_string(),
        }
    }

    fn room_snapshot(owner: &str, index: u64) -> ServerMessage {
        ServerMessage::room_snapshot(Snapshot::new(RoomState::new(owner, "ABC123"), index))
    }

    #[test]
    fn test_switch_back_ignores_stale_acceptance() {
        let (mut proxy, _inbox) = make_proxy();
        connect(&mut proxy);

        let owners = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&owners);
        proxy.subscribe_to_room("roomA", |_| {});
        proxy.subscribe_to_room("roomB", |_| {});
        proxy.subscribe_to_room("roomA", move |room: &RoomState| {
            log.borrow_mut().push(room.owner.clone())
        });

        // Answers to the first two subscriptions are all stale
        deliver(&mut proxy, accepted("roomA"));
        deliver(&mut proxy, room_snapshot("alice", 1));
        deliver(&mut proxy, accepted("roomB"));
        deliver(&mut proxy, room_snapshot("bob", 5));
        assert!(proxy.room_state().is_none());

        deliver(&mut proxy, accepted("roomA"));
        deliver(&mut proxy, room_snapshot("alice", 1));

        assert_eq!(proxy.room_id(), Some("roomA"));
        assert_eq!(proxy.room_state().unwrap().owner, "alice");
        assert_eq!(*owners.borrow(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_stale_rejection_keeps_current_watch() {
        let (mut proxy, _inbox) = make_proxy();
        connect(&mut proxy);

        proxy.subscribe_to_room("roomA", |_| {});
        proxy.subscribe_to_room("roomB", |_| {});
        proxy.subscribe_to_room("roomA", |_| {});

        deliver(
            &mut proxy,
            ServerMessage::SubscribeRoomRejected {
                room_id: "roomA".to_string(),
                message: "Maximum number of subscribers (1) reached".to_string(),
            },
        );
        assert_eq!(proxy.room_id(), Some("roomA"));
    }

    #[test]
    fn test_room_removed_clears_watch() {
        let (mut proxy, mut inbox) = make_proxy();
        connect(&mut proxy);

        proxy.subscribe_to_room("room1", |_| {});
        deliver(&mut proxy, accepted("room1"));
        deliver(&mut proxy, room_snapshot("alice", 0));

        // Some other room going away is not our concern
        let removed = |id: &str| ServerMessage::RoomRemoved {
            room_id: id.to_string(),
        };
        deliver(&mut proxy, removed("room2"));
        assert!(proxy.room_state().is_some());

        deliver(&mut proxy, removed("room1"));
        assert_eq!(proxy.room_id(), None);
        assert!(proxy.room_state().is_none());

        // The server already dropped the subscription
        let kinds: Vec<Value> = sent(&mut inbox).into_iter().map(|v| v["kind"].clone()).collect();
        assert_eq!(kinds, vec![json!("SubscribeRoom")]);
    }

    #[test]
    fn test_empty_room_id_not_watched() {
        let (mut proxy, mut inbox) = make_proxy();
        connect(&mut proxy);

        proxy.subscribe_to_room("  ", |_| {});
        assert_eq!(proxy.room_id(), None);
        assert!(inbox.drain().is_empty());
    }

    #[tokio::test]
    async fn test_command_round_trip() {
        let (mut proxy, mut inbox) = make_proxy();
        let response = proxy.offer_room_command(
            "room1",
            RoomCommand::LeaveRoom {
                user_id: "bob".to_string(),
            },
        );
        connect(&mut proxy);

        let out = sent(&mut inbox);
        assert_eq!(out[0]["kind"], "UpdateEntity");
        assert_eq!(out[0]["entityType"], "Room");
        let request_id = out[0]["requestId"].as_str().unwrap().to_string();

        let event = IndexedEvent::new(
            7,
            CollectionEvent::EntityUpdated {
                id: "room1".to_string(),
                event: IndexedEvent::new(
                    2,
                    RoomEvent::GuestLeft {
                        user_id: "bob".to_string(),
                    },
                ),
            },
        );
        deliver(
            &mut proxy,
            ServerMessage::CommandResponse {
                request_id,
                result: CommandResult::Ok { event: event.clone() },
            },
        );

        assert_eq!(response.await.unwrap(), event);
        assert_eq!(proxy.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_room_door_query() {
        let (mut proxy, mut inbox) = make_proxy();
        connect(&mut proxy);

        let response = proxy.get_room_door("room1");
        let out = sent(&mut inbox);
        let request_id = out[0]["requestId"].as_str().unwrap().to_string();

        deliver(
            &mut proxy,
            ServerMessage::GetRoomDoorResponse {
                request_id,
                room_id: "room1".to_string(),
                door: None,
            },
        );
        assert_eq!(response.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_validation_failure_fails_request() {
        let (mut proxy, mut inbox) = make_proxy();
        connect(&mut proxy);

        let response = proxy.offer_room_command(
            "room1",
            RoomCommand::ChangeRoomCode {
                requester_id: "alice".to_string(),
                code: String::new(),
            },
        );
        let door = proxy.get_room_door("room1");
        let out = sent(&mut inbox);
        let request_id = out[0]["requestId"].as_str().unwrap().to_string();

        deliver(
            &mut proxy,
            ServerMessage::ValidationFailure {
                message: "command.code must not be empty".to_string(),
                request_id: Some(request_id),
            },
        );

        match response.await {
            Err(ProxyError::Invalid(message)) => {
                assert_eq!(message, "command.code must not be empty")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(proxy.pending_count(), 1);
        drop(proxy);
        assert!(matches!(door.await, Err(ProxyError::Dropped)));
    }

    #[tokio::test]
    async fn test_dropped_proxy_fails_pending() {
        let (mut proxy, _inbox) = make_proxy();
        let response = proxy.get_room_door("room1");
        drop(proxy);

        assert!(matches!(response.await, Err(ProxyError::Dropped)));
    }

    #[test]
    fn test_malformed_server_message() {
        let (mut proxy, _inbox) = make_proxy();
        assert!(proxy.handle_message("{\"kind\": \"Bogus\"}").is_err());
        assert!(proxy.handle_message("not json").is_err());
    }

    #[test]
    fn test_unsubscribe_rooms() {
        let (mut proxy, mut inbox) = make_proxy();
        connect(&mut proxy);

        let subscription = proxy.subscribe_to_rooms(|_| {});
        proxy.unsubscribe_rooms();
        proxy.unsubscribe_rooms();
        subscription.unsubscribe();

        let kinds: Vec<Value> = sent(&mut inbox).into_iter().map(|v| v["kind"].clone()).collect();
        assert_eq!(kinds, vec![json!("SubscribeRooms"), json!("UnsubscribeRooms")]);
    }
}
