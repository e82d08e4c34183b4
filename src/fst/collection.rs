//! Keyed collection of independently-versioned entities.
//!
//! The collection is itself an Fst: adding, removing and updating entities
//! are commands that produce collection-level indexed events. Two index
//! spaces exist side by side:
//!
//! ```text
//! IndexedEvent { index: 7,                 <- collection stream
//!   event: EntityUpdated { id: "room1",
//!     event: IndexedEvent { index: 3,      <- room1's own stream
//!       event: GuestJoined { .. } } } }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{IndexedEvent, Leader, Snapshot};

/// Entity key within a collection.
pub type EntityId = String;

/// Snapshot payload of a whole collection: one snapshot per entity.
pub type EntitySnapshots<S> = BTreeMap<EntityId, Snapshot<S>>;

/// Collection commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CollectionCommand<S, C> {
    #[serde(rename_all = "camelCase")]
    AddEntity { id: EntityId, initial_state: S },

    RemoveEntity { id: EntityId },

    UpdateEntity { id: EntityId, command: C },
}

impl<S, C> CollectionCommand<S, C> {
    /// Target entity ID.
    pub fn id(&self) -> &str {
        match self {
            Self::AddEntity { id, .. }
            | Self::RemoveEntity { id }
            | Self::UpdateEntity { id, .. } => id,
        }
    }
}

/// Collection events, one per command kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CollectionEvent<S, E> {
    #[serde(rename_all = "camelCase")]
    EntityAdded { id: EntityId, initial_state: S },

    EntityRemoved { id: EntityId },

    /// Carries the entity's own indexed event.
    EntityUpdated { id: EntityId, event: IndexedEvent<E> },
}

impl<S, E> CollectionEvent<S, E> {
    pub fn id(&self) -> &str {
        match self {
            Self::EntityAdded { id, .. }
            | Self::EntityRemoved { id }
            | Self::EntityUpdated { id, .. } => id,
        }
    }
}

/// Collection errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CollectionError<Err> {
    EntityNotFound { id: EntityId },

    EntityAlreadyExists { id: EntityId },

    /// The entity rejected the wrapped command.
    EntityError { id: EntityId, error: Err },
}

impl<Err: fmt::Display> fmt::Display for CollectionError<Err> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntityNotFound { id } => write!(f, "Entity {} not found", id),
            Self::EntityAlreadyExists { id } => write!(f, "Entity {} already exists", id),
            Self::EntityError { id, error } => write!(f, "Entity {}: {}", id, error),
        }
    }
}

impl<Err: fmt::Debug + fmt::Display> std::error::Error for CollectionError<Err> {}

/// Builds an entity from its snapshot.
pub type EntityFactory<T, S> = fn(Snapshot<S>) -> T;

/// Leader over a keyed set of entity leaders.
pub struct CollectionLeader<L: Leader> {
    entity_type: &'static str,
    entities: BTreeMap<EntityId, L>,
    index: u64,
    factory: EntityFactory<L, L::State>,
}

impl<L: Leader> CollectionLeader<L> {
    /// Create an empty collection.
    pub fn new(entity_type: &'static str, factory: EntityFactory<L, L::State>) -> Self {
        Self {
            entity_type,
            entities: BTreeMap::new(),
            index: 0,
            factory,
        }
    }

    /// Restore a collection from a snapshot.
    pub fn from_snapshot(
        entity_type: &'static str,
        factory: EntityFactory<L, L::State>,
        snapshot: Snapshot<EntitySnapshots<L::State>>,
    ) -> Self {
        let entities = snapshot
            .state
            .into_iter()
            .map(|(id, s)| (id, factory(s)))
            .collect();
        Self {
            entity_type,
            entities,
            index: snapshot.last_applied_index,
            factory,
        }
    }

    /// Diagnostic tag for the entity kind.
    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    pub fn get(&self, id: &str) -> Option<&L> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&EntityId, &L)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<L> Leader for CollectionLeader<L>
where
    L: Leader,
    L::State: Clone,
{
    type State = EntitySnapshots<L::State>;
    type Command = CollectionCommand<L::State, L::Command>;
    type Event = CollectionEvent<L::State, L::Event>;
    type Error = CollectionError<L::Error>;

    fn current_index(&self) -> u64 {
        self.index
    }

    fn snapshot(&self) -> Snapshot<Self::State> {
        let entities = self
            .entities
            .iter()
            .map(|(id, entity)| (id.clone(), entity.snapshot()))
            .collect();
        Snapshot::new(entities, self.index)
    }

    fn handle_command(
        &mut self,
        command: Self::Command,
    ) -> Result<IndexedEvent<Self::Event>, Self::Error> {
        let event = match command {
            CollectionCommand::AddEntity { id, initial_state } => {
                if self.entities.contains_key(&id) {
                    return Err(CollectionError::EntityAlreadyExists { id });
                }
                let entity = (self.factory)(Snapshot::initial(initial_state.clone()));
                self.entities.insert(id.clone(), entity);
                CollectionEvent::EntityAdded { id, initial_state }
            }

            CollectionCommand::RemoveEntity { id } => {
                if self.entities.remove(&id).is_none() {
                    return Err(CollectionError::EntityNotFound { id });
                }
                CollectionEvent::EntityRemoved { id }
            }

            CollectionCommand::UpdateEntity { id, command } => {
                let Some(entity) = self.entities.get_mut(&id) else {
                    return Err(CollectionError::EntityNotFound { id });
                };
                match entity.handle_command(command) {
                    Ok(event) => CollectionEvent::EntityUpdated { id, event },
                    Err(error) => return Err(CollectionError::EntityError { id, error }),
                }
            }
        };

        self.index += 1;
        log::debug!(
            "{} collection: event {} for entity {}",
            self.entity_type,
            self.index,
            event.id()
        );
        Ok(IndexedEvent::new(self.index, event))
    }
}

impl<L: Leader + fmt::Debug> fmt::Debug for CollectionLeader<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionLeader")
            .field("entity_type", &self.entity_type)
            .field("entities", &self.entities)
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::FstLeader;
    use pretty_assertions::assert_eq;

    type Tally = FstLeader<u32, u32, u32, String>;

    fn handle(_: &u32, n: &u32, _: &()) -> Result<u32, String> {
        if *n == 0 {
            Err("zero".to_string())
        } else {
            Ok(*n)
        }
    }

    fn reduce(state: &u32, n: &u32) -> u32 {
        state + n
    }

    fn tally(snapshot: Snapshot<u32>) -> Tally {
        FstLeader::new(handle, reduce, (), snapshot)
    }

    fn collection() -> CollectionLeader<Tally> {
        CollectionLeader::new("Tally", tally)
    }

    fn add(id: &str, initial_state: u32) -> CollectionCommand<u32, u32> {
        CollectionCommand::AddEntity {
            id: id.to_string(),
            initial_state,
        }
    }

    fn update(id: &str, command: u32) -> CollectionCommand<u32, u32> {
        CollectionCommand::UpdateEntity {
            id: id.to_string(),
            command,
        }
    }

    #[test]
    fn test_add_entity() {
        let mut tallies = collection();

        let event = tallies.handle_command(add("a", 5)).unwrap();
        assert_eq!(event.index, 1);
        assert_eq!(
            event.event,
            CollectionEvent::EntityAdded {
                id: "a".to_string(),
                initial_state: 5
            }
        );
        assert_eq!(*tallies.get("a").unwrap().state(), 5);
    }

    #[test]
    fn test_add_existing_fails() {
        let mut tallies = collection();
        tallies.handle_command(add("a", 5)).unwrap();

        let result = tallies.handle_command(add("a", 9));
        assert_eq!(
            result,
            Err(CollectionError::EntityAlreadyExists { id: "a".to_string() })
        );
        assert_eq!(tallies.current_index(), 1);
        assert_eq!(*tallies.get("a").unwrap().state(), 5);
    }

    #[test]
    fn test_missing_entity() {
        let mut tallies = collection();

        let result = tallies.handle_command(CollectionCommand::RemoveEntity {
            id: "x".to_string(),
        });
        assert_eq!(result, Err(CollectionError::EntityNotFound { id: "x".to_string() }));

        let result = tallies.handle_command(update("x", 1));
        assert_eq!(result, Err(CollectionError::EntityNotFound { id: "x".to_string() }));
        assert_eq!(tallies.current_index(), 0);
    }

    #[test]
    fn test_two_level_indexing() {
        let mut tallies = collection();
        tallies.handle_command(add("a", 0)).unwrap();
        tallies.handle_command(add("b", 0)).unwrap();

        let event = tallies.handle_command(update("b", 3)).unwrap();
        assert_eq!(event.index, 3);
        match event.event {
            CollectionEvent::EntityUpdated { id, event } => {
                assert_eq!(id, "b");
                assert_eq!(event, IndexedEvent::new(1, 3));
            }
            other => panic!("unexpected event {:?}", other),
        }

        tallies.handle_command(update("b", 2)).unwrap();
        assert_eq!(tallies.current_index(), 4);
        assert_eq!(tallies.get("b").unwrap().current_index(), 2);
        assert_eq!(tallies.get("a").unwrap().current_index(), 0);
    }

    #[test]
    fn test_entity_error_does_not_advance() {
        let mut tallies = collection();
        tallies.handle_command(add("a", 1)).unwrap();

        let result = tallies.handle_command(update("a", 0));
        assert_eq!(
            result,
            Err(CollectionError::EntityError {
                id: "a".to_string(),
                error: "zero".to_string()
            })
        );
        assert_eq!(tallies.current_index(), 1);
        assert_eq!(tallies.get("a").unwrap().current_index(), 0);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut tallies = collection();
        tallies.handle_command(add("a", 1)).unwrap();
        tallies.handle_command(update("a", 4)).unwrap();
        tallies.handle_command(add("b", 2)).unwrap();

        let snapshot = tallies.snapshot();
        assert_eq!(snapshot.last_applied_index, 3);
        assert_eq!(snapshot.state["a"], Snapshot::new(5, 1));

        let mut restored = CollectionLeader::from_snapshot("Tally", tally, snapshot);
        let event = restored.handle_command(update("a", 1)).unwrap();
        assert_eq!(event.index, 4);
        assert_eq!(restored.get("a").unwrap().current_index(), 2);
    }

    #[test]
    fn test_wire_shape() {
        let event: CollectionEvent<u32, u32> = CollectionEvent::EntityAdded {
            id: "a".to_string(),
            initial_state: 1,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"kind": "EntityAdded", "id": "a", "initialState": 1})
        );
    }
}
