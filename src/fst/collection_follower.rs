//! Follower side of an entity collection.

use std::collections::BTreeMap;
use std::fmt;

use super::collection::{CollectionEvent, EntityFactory, EntityId, EntitySnapshots};
use super::{Follower, IndexedEvent, Snapshot, SyncError};

/// Read replica of a collection: one entity follower per key.
///
/// `EntityUpdated` events are replayed into the matching entity follower, so
/// both the collection index and the entity's own index are checked.
pub struct CollectionFollower<F: Follower> {
    entity_type: &'static str,
    entities: BTreeMap<EntityId, F>,
    last_applied_index: u64,
    factory: EntityFactory<F, F::State>,
}

impl<F: Follower> CollectionFollower<F> {
    /// Create an empty follower at index 0.
    pub fn new(entity_type: &'static str, factory: EntityFactory<F, F::State>) -> Self {
        Self {
            entity_type,
            entities: BTreeMap::new(),
            last_applied_index: 0,
            factory,
        }
    }

    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    pub fn get(&self, id: &str) -> Option<&F> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&EntityId, &F)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<F: Follower> Follower for CollectionFollower<F> {
    type State = EntitySnapshots<F::State>;
    type Event = CollectionEvent<F::State, F::Event>;

    fn last_applied_index(&self) -> u64 {
        self.last_applied_index
    }

    fn snapshot(&self) -> Snapshot<Self::State> {
        let entities = self
            .entities
            .iter()
            .map(|(id, entity)| (id.clone(), entity.snapshot()))
            .collect();
        Snapshot::new(entities, self.last_applied_index)
    }

    fn apply_event(&mut self, event: IndexedEvent<Self::Event>) -> Result<(), SyncError> {
        SyncError::check_event(event.index, self.last_applied_index)?;

        match event.event {
            CollectionEvent::EntityAdded { id, initial_state } => {
                let entity = (self.factory)(Snapshot::initial(initial_state));
                self.entities.insert(id, entity);
            }

            CollectionEvent::EntityRemoved { id } => {
                self.entities.remove(&id);
            }

            CollectionEvent::EntityUpdated { id, event: nested } => {
                match self.entities.get_mut(&id) {
                    // Entity rejects first: nothing advances on a nested sync error
                    Some(entity) => entity.apply_event(nested)?,
                    None => log::warn!(
                        "{} follower: update {} for unknown entity {} ignored",
                        self.entity_type,
                        event.index,
                        id
                    ),
                }
            }
        }

        self.last_applied_index = event.index;
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot<Self::State>) -> Result<(), SyncError> {
        SyncError::check_snapshot(snapshot.last_applied_index, self.last_applied_index)?;

        self.entities = snapshot
            .state
            .into_iter()
            .map(|(id, s)| (id, (self.factory)(s)))
            .collect();
        self.last_applied_index = snapshot.last_applied_index;
        Ok(())
    }
}

impl<F: Follower + fmt::Debug> fmt::Debug for CollectionFollower<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionFollower")
            .field("entity_type", &self.entity_type)
            .field("entities", &self.entities)
            .field("last_applied_index", &self.last_applied_index)
            .finish()
    }
}
