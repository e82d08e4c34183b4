//! GameRoom Sync Library
//!
//! This crate replicates game rooms from one authoritative server to many
//! clients over an unreliable JSON message channel.
//!
//! # Overview
//!
//! - **Fst** - Single-writer state machines. A leader turns commands into
//!   indexed events; followers replay them and reject gaps, duplicates and
//!   stale snapshots.
//!
//! - **Collections** - A keyed set of entities that is itself an Fst, with
//!   its own index alongside each entity's.
//!
//! - **Rooms** - The room entity (owner, code, guests, active session), the
//!   room collection, and the rooms-list projection.
//!
//! - **Game Server** - Holds the room collection and routes collection-level
//!   and room-level events to their own subscribers.
//!
//! - **Server Proxy** - Client side: handshake, queued submissions, replicas
//!   of the rooms list and one room, request/response correlation.
//!
//! # Design Principles
//!
//! 1. **Pure transitions** - Command handlers and reducers are plain
//!    functions; domain errors are values and leave state untouched.
//!
//! 2. **Validate before routing** - Every inbound payload is parsed and
//!    checked before it can reach a state machine.
//!
//! 3. **Transport agnostic** - The server delivers through a
//!    [`Broadcaster`], the proxy sends through a [`JsonMessageChannel`].
//!
//! 4. **Serialization-ready** - Every wire type is `kind`-tagged JSON.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use gameroom_sync::{
//!     in_memory_channel, GameServer, GameServerProxy, ProxyConfig, RoomCollectionCommand,
//!     RoomState, ServerConfig, ServerMessage,
//! };
//!
//! // Everything the server sends goes to our single client
//! let outbox = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&outbox);
//! let mut server = GameServer::new(ServerConfig::default(), move |_: &str, msg: &ServerMessage| {
//!     sink.borrow_mut().push(msg.to_json().unwrap());
//! });
//!
//! let (channel, mut inbox) = in_memory_channel();
//! let mut proxy = GameServerProxy::new(channel, ProxyConfig::new("token"));
//!
//! // Queued until the handshake arrives
//! proxy.subscribe_to_rooms(|rooms| println!("{} rooms", rooms.len()));
//! let _created = proxy.offer_rooms_command(RoomCollectionCommand::AddEntity {
//!     id: "room1".to_string(),
//!     initial_state: RoomState::new("alice", "ABC123"),
//! });
//!
//! server.connect_client();
//! loop {
//!     let to_client: Vec<String> = outbox.borrow_mut().drain(..).collect();
//!     for payload in &to_client {
//!         proxy.handle_message(payload).unwrap();
//!     }
//!     let to_server = inbox.drain();
//!     for outgoing in &to_server {
//!         server.handle_message(&outgoing.payload).unwrap();
//!     }
//!     if to_client.is_empty() && to_server.is_empty() {
//!         break;
//!     }
//! }
//!
//! assert_eq!(proxy.rooms().owner_of("room1"), Some("alice"));
//! ```

pub mod client;
pub mod config;
pub mod fst;
pub mod protocol;
pub mod room;
pub mod server;

// Re-export the common surface at crate root
pub use client::{GameServerProxy, PendingResponse, ProxyError, RoomStore};
pub use config::{ConfigError, ProxyConfig, ServerConfig};
pub use fst::{
    CollectionCommand, CollectionError, CollectionEvent, CollectionFollower, CollectionLeader,
    EntityId, Follower, FstFollower, FstLeader, IndexedEvent, Leader, ProjectionStore, Snapshot,
    Subscription, SyncError,
};
pub use protocol::{
    in_memory_channel, parse_client_message, parse_server_message, ClientEnvelope, ClientId,
    ClientMessage, CommandResult, InMemoryChannel, Inbox, JsonMessageChannel, RoomDoor,
    ServerMessage, SyncEvent, SyncState, ValidationFailure,
};
pub use room::collection::{
    RoomCollection, RoomCollectionCommand, RoomCollectionError, RoomCollectionEvent,
    RoomCollectionFollower,
};
pub use room::projection::{RoomEntry, RoomsProjection};
pub use room::{ActiveSession, Room, RoomCommand, RoomError, RoomEvent, RoomFollower, RoomState};
pub use server::{Broadcaster, GameServer};
