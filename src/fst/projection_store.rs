//! Observable follower.
//!
//! Wraps an [`FstFollower`] and notifies subscribers with the new state after
//! every successful apply. Delivery is synchronous and in subscription order.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{Follower, FstFollower, IndexedEvent, Snapshot, SyncError};

type Callback<S> = Rc<RefCell<dyn FnMut(&S)>>;

struct Registry<S> {
    next_id: u64,
    subscribers: Vec<(u64, Callback<S>)>,
}

impl<S> Registry<S> {
    fn contains(&self, id: u64) -> bool {
        self.subscribers.iter().any(|(sid, _)| *sid == id)
    }
}

trait Unsubscribe {
    fn remove(&mut self, id: u64);
}

impl<S> Unsubscribe for Registry<S> {
    fn remove(&mut self, id: u64) {
        self.subscribers.retain(|(sid, _)| *sid != id);
    }
}

/// Handle returned by [`ProjectionStore::subscribe`].
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<dyn Unsubscribe>>,
}

impl Subscription {
    /// Stop delivery to this subscriber. Safe to call repeatedly, from
    /// inside a callback, or after the store is gone.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Follower with a publish/subscribe layer.
pub struct ProjectionStore<S, E> {
    follower: FstFollower<S, E>,
    registry: Rc<RefCell<Registry<S>>>,
}

impl<S: 'static, E> ProjectionStore<S, E> {
    pub fn new(follower: FstFollower<S, E>) -> Self {
        Self {
            follower,
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> &S {
        self.follower.state()
    }

    /// Register a callback. It fires once right away with the current state.
    pub fn subscribe(&self, callback: impl FnMut(&S) + 'static) -> Subscription {
        let callback: Callback<S> = Rc::new(RefCell::new(callback));
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.subscribers.push((id, Rc::clone(&callback)));
            id
        };

        (&mut *callback.borrow_mut())(self.follower.state());

        let registry: Rc<RefCell<dyn Unsubscribe>> = self.registry.clone();
        Subscription {
            id,
            registry: Rc::downgrade(&registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.borrow().subscribers.len()
    }

    fn notify(&self) {
        // Registry is not borrowed while callbacks run, so they may unsubscribe
        let subscribers = self.registry.borrow().subscribers.clone();
        let state = self.follower.state();

        for (id, callback) in subscribers {
            if !self.registry.borrow().contains(id) {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut callback) => (&mut *callback)(state),
                Err(_) => log::warn!(
                    "projection store: re-entrant delivery to subscriber {} skipped",
                    id
                ),
            }
        }
    }
}

impl<S: Clone + 'static, E> Follower for ProjectionStore<S, E> {
    type State = S;
    type Event = E;

    fn last_applied_index(&self) -> u64 {
        self.follower.last_applied_index()
    }

    fn snapshot(&self) -> Snapshot<S> {
        self.follower.snapshot()
    }

    fn apply_event(&mut self, event: IndexedEvent<E>) -> Result<(), SyncError> {
        self.follower.apply_event(event)?;
        self.notify();
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot<S>) -> Result<(), SyncError> {
        self.follower.apply_snapshot(snapshot)?;
        self.notify();
        Ok(())
    }
}

impl<S: fmt::Debug, E> fmt::Debug for ProjectionStore<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionStore")
            .field("follower", &self.follower)
            .finish_non_exhaustive()
    }
}
