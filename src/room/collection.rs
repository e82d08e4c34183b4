//! All rooms on a server, as one collection Fst.

use crate::fst::{
    CollectionCommand, CollectionError, CollectionEvent, CollectionFollower, CollectionLeader,
    IndexedEvent,
};

use super::{
    room_follower, room_leader, Room, RoomCommand, RoomError, RoomEvent, RoomFollower, RoomState,
};

/// Entity type tag used in messages and logs.
pub const ROOM_ENTITY_TYPE: &str = "Room";

pub type RoomCollectionCommand = CollectionCommand<RoomState, RoomCommand>;
pub type RoomCollectionEvent = CollectionEvent<RoomState, RoomEvent>;
pub type RoomCollectionError = CollectionError<RoomError>;

/// Server-side room collection.
pub type RoomCollection = CollectionLeader<Room>;

/// Client-side replica of every room.
pub type RoomCollectionFollower = CollectionFollower<RoomFollower>;

pub fn room_collection() -> RoomCollection {
    CollectionLeader::new(ROOM_ENTITY_TYPE, room_leader)
}

pub fn room_collection_follower() -> RoomCollectionFollower {
    CollectionFollower::new(ROOM_ENTITY_TYPE, room_follower)
}

/// Entity-level event nested in a collection event, if any.
pub fn nested_room_event(
    event: &IndexedEvent<RoomCollectionEvent>,
) -> Option<(&str, &IndexedEvent<RoomEvent>)> {
    match &event.event {
        CollectionEvent::EntityUpdated { id, event } => Some((id.as_str(), event)),
        _ => None,
    }
}
