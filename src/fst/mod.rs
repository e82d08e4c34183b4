//! Single-writer state machines.
//!
//! An Fst is driven either as a **leader**, which owns the state and turns
//! commands into indexed events, or as a **follower**, which replays those
//! events (or a snapshot) into a read replica.
//!
//! ```text
//!   command ──▶ Leader ──▶ IndexedEvent { index, event } ──▶ Follower
//!                 │                                              ▲
//!                 └────────── Snapshot { state, index } ─────────┘
//! ```
//!
//! Indices are per stream: a leader advances by exactly one per accepted
//! command, and a follower only accepts `last_applied_index + 1`.

pub mod collection;
pub mod collection_follower;
pub mod projection_store;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use collection::{
    CollectionCommand, CollectionError, CollectionEvent, CollectionLeader, EntityId,
};
pub use collection_follower::CollectionFollower;
pub use projection_store::{ProjectionStore, Subscription};

/// An event tagged with its position in the leader's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEvent<E> {
    pub index: u64,
    pub event: E,
}

impl<E> IndexedEvent<E> {
    pub fn new(index: u64, event: E) -> Self {
        Self { index, event }
    }
}

/// State resulting from applying events `1..=last_applied_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<S> {
    pub state: S,
    pub last_applied_index: u64,
}

impl<S> Snapshot<S> {
    pub fn new(state: S, last_applied_index: u64) -> Self {
        Self {
            state,
            last_applied_index,
        }
    }

    /// Snapshot of a state no event has been applied to yet.
    pub fn initial(state: S) -> Self {
        Self::new(state, 0)
    }
}

/// Follower-side rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SyncError {
    #[error("duplicate event {received_index} (already applied up to {last_applied_index})")]
    #[serde(rename_all = "camelCase")]
    DuplicateEvent {
        received_index: u64,
        last_applied_index: u64,
    },

    #[error("event gap: received {received_index}, expected {expected_index}")]
    #[serde(rename_all = "camelCase")]
    EventGap {
        received_index: u64,
        expected_index: u64,
    },

    #[error("stale snapshot at {snapshot_index} (already applied up to {last_applied_index})")]
    #[serde(rename_all = "camelCase")]
    StaleSnapshot {
        snapshot_index: u64,
        last_applied_index: u64,
    },
}

impl SyncError {
    /// Check that `received` is the next index after `last_applied`.
    pub fn check_event(received: u64, last_applied: u64) -> Result<(), SyncError> {
        if received <= last_applied {
            Err(SyncError::DuplicateEvent {
                received_index: received,
                last_applied_index: last_applied,
            })
        } else if received > last_applied + 1 {
            Err(SyncError::EventGap {
                received_index: received,
                expected_index: last_applied + 1,
            })
        } else {
            Ok(())
        }
    }

    /// Check that a snapshot is strictly newer than what has been applied.
    pub fn check_snapshot(snapshot_index: u64, last_applied: u64) -> Result<(), SyncError> {
        if snapshot_index <= last_applied {
            Err(SyncError::StaleSnapshot {
                snapshot_index,
                last_applied_index: last_applied,
            })
        } else {
            Ok(())
        }
    }
}

/// Pure function turning a command into an event or a domain error.
pub type CommandHandler<S, C, E, Err, Ctx> = fn(&S, &C, &Ctx) -> Result<E, Err>;

/// Pure function folding an event into a new state.
pub type Reducer<S, E> = fn(&S, &E) -> S;

/// The authority for a state machine.
pub trait Leader {
    /// Snapshot payload type.
    type State;
    type Command;
    type Event;
    type Error;

    fn current_index(&self) -> u64;

    fn snapshot(&self) -> Snapshot<Self::State>;

    /// Handle a command. On success the event has already been applied and
    /// the index advanced; on failure nothing changed.
    fn handle_command(
        &mut self,
        command: Self::Command,
    ) -> Result<IndexedEvent<Self::Event>, Self::Error>;
}

/// A read replica fed by a leader's events and snapshots.
pub trait Follower {
    /// Snapshot payload type.
    type State;
    type Event;

    fn last_applied_index(&self) -> u64;

    fn snapshot(&self) -> Snapshot<Self::State>;

    /// Apply the next event. On error state and index are untouched.
    fn apply_event(&mut self, event: IndexedEvent<Self::Event>) -> Result<(), SyncError>;

    /// Fast-forward to a newer snapshot. On error state and index are untouched.
    fn apply_snapshot(&mut self, snapshot: Snapshot<Self::State>) -> Result<(), SyncError>;
}

/// Generic leader built from a command handler and a reducer.
pub struct FstLeader<S, C, E, Err, Ctx = ()> {
    state: S,
    index: u64,
    handler: CommandHandler<S, C, E, Err, Ctx>,
    reducer: Reducer<S, E>,
    ctx: Ctx,
}

impl<S, C, E, Err, Ctx> FstLeader<S, C, E, Err, Ctx> {
    pub fn new(
        handler: CommandHandler<S, C, E, Err, Ctx>,
        reducer: Reducer<S, E>,
        ctx: Ctx,
        initial: Snapshot<S>,
    ) -> Self {
        Self {
            state: initial.state,
            index: initial.last_applied_index,
            handler,
            reducer,
            ctx,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S: Clone, C, E, Err, Ctx> Leader for FstLeader<S, C, E, Err, Ctx> {
    type State = S;
    type Command = C;
    type Event = E;
    type Error = Err;

    fn current_index(&self) -> u64 {
        self.index
    }

    fn snapshot(&self) -> Snapshot<S> {
        Snapshot::new(self.state.clone(), self.index)
    }

    fn handle_command(&mut self, command: C) -> Result<IndexedEvent<E>, Err> {
        let event = (self.handler)(&self.state, &command, &self.ctx)?;
        self.state = (self.reducer)(&self.state, &event);
        self.index += 1;
        Ok(IndexedEvent::new(self.index, event))
    }
}

impl<S: std::fmt::Debug, C, E, Err, Ctx> std::fmt::Debug for FstLeader<S, C, E, Err, Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FstLeader")
            .field("state", &self.state)
            .field("index", &self.index)
            .finish()
    }
}

/// Generic follower built from a reducer.
pub struct FstFollower<S, E> {
    state: S,
    last_applied_index: u64,
    reducer: Reducer<S, E>,
}

impl<S, E> FstFollower<S, E> {
    pub fn new(reducer: Reducer<S, E>, initial: Snapshot<S>) -> Self {
        Self {
            state: initial.state,
            last_applied_index: initial.last_applied_index,
            reducer,
        }
    }

    /// Follower starting from a state at index 0.
    pub fn from_state(reducer: Reducer<S, E>, state: S) -> Self {
        Self::new(reducer, Snapshot::initial(state))
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S: Clone, E> Clone for FstFollower<S, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            last_applied_index: self.last_applied_index,
            reducer: self.reducer,
        }
    }
}

impl<S: std::fmt::Debug, E> std::fmt::Debug for FstFollower<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FstFollower")
            .field("state", &self.state)
            .field("last_applied_index", &self.last_applied_index)
            .finish()
    }
}

impl<S: Clone, E> Follower for FstFollower<S, E> {
    type State = S;
    type Event = E;

    fn last_applied_index(&self) -> u64 {
        self.last_applied_index
    }

    fn snapshot(&self) -> Snapshot<S> {
        Snapshot::new(self.state.clone(), self.last_applied_index)
    }

    fn apply_event(&mut self, event: IndexedEvent<E>) -> Result<(), SyncError> {
        SyncError::check_event(event.index, self.last_applied_index)?;
        self.state = (self.reducer)(&self.state, &event.event);
        self.last_applied_index = event.index;
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot<S>) -> Result<(), SyncError> {
        SyncError::check_snapshot(snapshot.last_applied_index, self.last_applied_index)?;
        self.state = snapshot.state;
        self.last_applied_index = snapshot.last_applied_index;
        Ok(())
    }
}
