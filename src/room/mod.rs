//! Room state machine.
//!
//! A room is owned by one user, guarded by a join code, and hosts at most
//! one game session (or session builder) at a time. Guests are kept in join
//! order.

pub mod collection;
pub mod projection;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fst::{FstFollower, FstLeader, Snapshot};

/// User identifier as carried in room commands.
pub type UserId = String;

/// What the room is currently running.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ActiveSession {
    #[default]
    NoSession,

    /// A session being configured before it starts
    #[serde(rename_all = "camelCase")]
    SessionBuilder { builder_id: String, game_id: String },

    #[serde(rename_all = "camelCase")]
    Session { session_id: String, game_id: String },
}

impl ActiveSession {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::NoSession)
    }

    pub fn game_id(&self) -> Option<&str> {
        match self {
            Self::NoSession => None,
            Self::SessionBuilder { game_id, .. } | Self::Session { game_id, .. } => Some(game_id),
        }
    }
}

/// Room state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    /// Owner user ID, fixed at creation
    pub owner: UserId,

    /// Join secret
    pub code: String,

    /// Guests in join order, no duplicates
    pub guests: Vec<UserId>,

    pub active_session: ActiveSession,
}

impl RoomState {
    /// A fresh room with no guests and no session.
    pub fn new(owner: impl Into<UserId>, code: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            code: code.into(),
            guests: Vec::new(),
            active_session: ActiveSession::NoSession,
        }
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner == user_id
    }

    pub fn has_guest(&self, user_id: &str) -> bool {
        self.guests.iter().any(|g| g == user_id)
    }

    /// Owner or guest.
    pub fn is_member(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.has_guest(user_id)
    }

    pub fn guest_count(&self) -> usize {
        self.guests.len()
    }
}

/// Room commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RoomCommand {
    #[serde(rename_all = "camelCase")]
    JoinRoom { user_id: UserId, code: String },

    #[serde(rename_all = "camelCase")]
    LeaveRoom { user_id: UserId },

    #[serde(rename_all = "camelCase")]
    RemoveGuest { requester_id: UserId, guest_id: UserId },

    #[serde(rename_all = "camelCase")]
    StartGameSession {
        requester_id: UserId,
        session_id: String,
        game_id: String,
    },

    #[serde(rename_all = "camelCase")]
    StartGameSessionBuilder {
        requester_id: UserId,
        builder_id: String,
        game_id: String,
    },

    #[serde(rename_all = "camelCase")]
    ClearRoomSession { requester_id: UserId },

    #[serde(rename_all = "camelCase")]
    ChangeRoomCode { requester_id: UserId, code: String },
}

/// Room events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RoomEvent {
    #[serde(rename_all = "camelCase")]
    GuestJoined { user_id: UserId },

    #[serde(rename_all = "camelCase")]
    GuestLeft { user_id: UserId },

    #[serde(rename_all = "camelCase")]
    GuestRemoved { guest_id: UserId },

    #[serde(rename_all = "camelCase")]
    GameSessionStarted { session_id: String, game_id: String },

    #[serde(rename_all = "camelCase")]
    GameSessionBuilderStarted { builder_id: String, game_id: String },

    RoomSessionCleared,

    RoomCodeChanged { code: String },
}

/// Room errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RoomError {
    #[error("User {user_id} is not the room owner")]
    #[serde(rename_all = "camelCase")]
    NotOwner { user_id: UserId },

    #[error("Invalid room code")]
    InvalidRoomCode,

    #[error("User {user_id} is already in the room")]
    #[serde(rename_all = "camelCase")]
    GuestAlreadyInRoom { user_id: UserId },

    #[error("User {user_id} is not in the room")]
    #[serde(rename_all = "camelCase")]
    GuestNotInRoom { user_id: UserId },

    #[error("The owner cannot leave the room")]
    OwnerCannotLeave,

    #[error("A session is already active")]
    SessionAlreadyActive,
}

/// Room leader.
pub type Room = FstLeader<RoomState, RoomCommand, RoomEvent, RoomError>;

/// Room read replica.
pub type RoomFollower = FstFollower<RoomState, RoomEvent>;

pub fn room_leader(initial: Snapshot<RoomState>) -> Room {
    FstLeader::new(handle_room_command, apply_room_event, (), initial)
}

pub fn room_follower(initial: Snapshot<RoomState>) -> RoomFollower {
    FstFollower::new(apply_room_event, initial)
}

fn require_owner(state: &RoomState, requester_id: &str) -> Result<(), RoomError> {
    if state.is_owner(requester_id) {
        Ok(())
    } else {
        Err(RoomError::NotOwner {
            user_id: requester_id.to_string(),
        })
    }
}

/// Decide the event for a room command.
pub fn handle_room_command(
    state: &RoomState,
    command: &RoomCommand,
    _ctx: &(),
) -> Result<RoomEvent, RoomError> {
    match command {
        RoomCommand::JoinRoom { user_id, code } => {
            if *code != state.code {
                return Err(RoomError::InvalidRoomCode);
            }
            if state.is_member(user_id) {
                return Err(RoomError::GuestAlreadyInRoom {
                    user_id: user_id.clone(),
                });
            }
            Ok(RoomEvent::GuestJoined {
                user_id: user_id.clone(),
            })
        }

        RoomCommand::LeaveRoom { user_id } => {
            if state.is_owner(user_id) {
                return Err(RoomError::OwnerCannotLeave);
            }
            if !state.has_guest(user_id) {
                return Err(RoomError::GuestNotInRoom {
                    user_id: user_id.clone(),
                });
            }
            Ok(RoomEvent::GuestLeft {
                user_id: user_id.clone(),
            })
        }

        RoomCommand::RemoveGuest {
            requester_id,
            guest_id,
        } => {
            require_owner(state, requester_id)?;
            if !state.has_guest(guest_id) {
                return Err(RoomError::GuestNotInRoom {
                    user_id: guest_id.clone(),
                });
            }
            Ok(RoomEvent::GuestRemoved {
                guest_id: guest_id.clone(),
            })
        }

        RoomCommand::StartGameSession {
            requester_id,
            session_id,
            game_id,
        } => {
            require_owner(state, requester_id)?;
            if !state.active_session.is_none() {
                return Err(RoomError::SessionAlreadyActive);
            }
            Ok(RoomEvent::GameSessionStarted {
                session_id: session_id.clone(),
                game_id: game_id.clone(),
            })
        }

        RoomCommand::StartGameSessionBuilder {
            requester_id,
            builder_id,
            game_id,
        } => {
            require_owner(state, requester_id)?;
            if !state.active_session.is_none() {
                return Err(RoomError::SessionAlreadyActive);
            }
            Ok(RoomEvent::GameSessionBuilderStarted {
                builder_id: builder_id.clone(),
                game_id: game_id.clone(),
            })
        }

        RoomCommand::ClearRoomSession { requester_id } => {
            require_owner(state, requester_id)?;
            Ok(RoomEvent::RoomSessionCleared)
        }

        RoomCommand::ChangeRoomCode { requester_id, code } => {
            require_owner(state, requester_id)?;
            Ok(RoomEvent::RoomCodeChanged { code: code.clone() })
        }
    }
}

/// Fold a room event into a new state.
pub fn apply_room_event(state: &RoomState, event: &RoomEvent) -> RoomState {
    let mut next = state.clone();
    match event {
        RoomEvent::GuestJoined { user_id } => {
            if !next.has_guest(user_id) {
                next.guests.push(user_id.clone());
            }
        }
        RoomEvent::GuestLeft { user_id } => next.guests.retain(|g| g != user_id),
        RoomEvent::GuestRemoved { guest_id } => next.guests.retain(|g| g != guest_id),
        RoomEvent::GameSessionStarted {
            session_id,
            game_id,
        } => {
            next.active_session = ActiveSession::Session {
                session_id: session_id.clone(),
                game_id: game_id.clone(),
            };
        }
        RoomEvent::GameSessionBuilderStarted {
            builder_id,
            game_id,
        } => {
            next.active_session = ActiveSession::SessionBuilder {
                builder_id: builder_id.clone(),
                game_id: game_id.clone(),
            };
        }
        RoomEvent::RoomSessionCleared => next.active_session = ActiveSession::NoSession,
        RoomEvent::RoomCodeChanged { code } => next.code = code.clone(),
    }
    next
}
