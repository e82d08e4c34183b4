//! Ownership-only view of the room collection.
//!
//! Built by folding room collection events; updates inside a room never
//! change it since ownership is fixed at creation.

use serde::{Deserialize, Serialize};

use crate::fst::{CollectionEvent, EntityId, FstFollower, IndexedEvent, ProjectionStore};

use super::collection::RoomCollectionEvent;
use super::UserId;

/// One row of the rooms list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntry {
    pub entity_id: EntityId,
    pub room_owner: UserId,
}

/// Rooms list, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename = "RoomsProjection")]
pub struct RoomsProjection {
    pub rooms: Vec<RoomEntry>,
}

impl RoomsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner of a room, if listed.
    pub fn owner_of(&self, entity_id: &str) -> Option<&str> {
        self.rooms
            .iter()
            .find(|r| r.entity_id == entity_id)
            .map(|r| r.room_owner.as_str())
    }

    /// Rooms owned by a user.
    pub fn owned_by<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a RoomEntry> + 'a {
        self.rooms.iter().filter(move |r| r.room_owner == user_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Fold one collection event into the projection.
pub fn apply_rooms_event(state: &RoomsProjection, event: &RoomCollectionEvent) -> RoomsProjection {
    match event {
        CollectionEvent::EntityAdded { id, initial_state } => {
            let mut next = state.clone();
            next.rooms.push(RoomEntry {
                entity_id: id.clone(),
                room_owner: initial_state.owner.clone(),
            });
            next
        }
        CollectionEvent::EntityRemoved { id } => RoomsProjection {
            rooms: state
                .rooms
                .iter()
                .filter(|r| r.entity_id != *id)
                .cloned()
                .collect(),
        },
        CollectionEvent::EntityUpdated { .. } => state.clone(),
    }
}

pub type RoomsProjectionFollower = FstFollower<RoomsProjection, RoomCollectionEvent>;

pub type RoomsProjectionStore = ProjectionStore<RoomsProjection, RoomCollectionEvent>;

pub fn rooms_projection_follower() -> RoomsProjectionFollower {
    FstFollower::from_state(apply_rooms_event, RoomsProjection::new())
}

pub fn rooms_projection_store() -> RoomsProjectionStore {
    ProjectionStore::new(rooms_projection_follower())
}

/// Apply a stream of collection events to a fresh projection.
pub fn fold_rooms<'a>(
    events: impl IntoIterator<Item = &'a IndexedEvent<RoomCollectionEvent>>,
) -> RoomsProjection {
    events
        .into_iter()
        .fold(RoomsProjection::new(), |state, e| apply_rooms_event(&state, &e.event))
}
