//! Request/response correlation.
//!
//! Each outgoing command or query gets a fresh request ID and a oneshot
//! channel; the matching response message completes it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use uuid::Uuid;

use super::ProxyError;
use crate::fst::IndexedEvent;
use crate::protocol::{CommandResult, RequestId, RoomDoor};
use crate::room::collection::RoomCollectionEvent;

/// Resolves once the server answers, or with [`ProxyError::Dropped`] if the
/// proxy goes away first.
#[derive(Debug)]
pub struct PendingResponse<T> {
    rx: oneshot::Receiver<Result<T, ProxyError>>,
}

impl<T> Future for PendingResponse<T> {
    type Output = Result<T, ProxyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ProxyError::Dropped)))
    }
}

enum Waiter {
    Command(oneshot::Sender<Result<IndexedEvent<RoomCollectionEvent>, ProxyError>>),
    RoomDoor(oneshot::Sender<Result<Option<RoomDoor>, ProxyError>>),
}

impl Waiter {
    fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::RoomDoor(_) => "room door query",
        }
    }
}

/// Outstanding requests by ID.
#[derive(Default)]
pub struct PendingRequests {
    waiters: HashMap<RequestId, Waiter>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id() -> RequestId {
        Uuid::new_v4().to_string()
    }

    pub fn register_command(
        &mut self,
    ) -> (RequestId, PendingResponse<IndexedEvent<RoomCollectionEvent>>) {
        let (tx, rx) = oneshot::channel();
        let request_id = Self::next_id();
        self.waiters.insert(request_id.clone(), Waiter::Command(tx));
        (request_id, PendingResponse { rx })
    }

    pub fn register_room_door(&mut self) -> (RequestId, PendingResponse<Option<RoomDoor>>) {
        let (tx, rx) = oneshot::channel();
        let request_id = Self::next_id();
        self.waiters.insert(request_id.clone(), Waiter::RoomDoor(tx));
        (request_id, PendingResponse { rx })
    }

    /// Complete a command. Returns false if no command is waiting under
    /// this ID.
    pub fn resolve_command(&mut self, request_id: &str, result: CommandResult) -> bool {
        match self.waiters.remove(request_id) {
            Some(Waiter::Command(tx)) => {
                let _ = tx.send(result.into_result().map_err(ProxyError::Rejected));
                true
            }
            Some(other) => {
                log::warn!("Command response for {} request {}", other.kind(), request_id);
                self.waiters.insert(request_id.to_string(), other);
                false
            }
            None => false,
        }
    }

    /// Complete a room door query. Returns false if no query is waiting
    /// under this ID.
    pub fn resolve_room_door(&mut self, request_id: &str, door: Option<RoomDoor>) -> bool {
        match self.waiters.remove(request_id) {
            Some(Waiter::RoomDoor(tx)) => {
                let _ = tx.send(Ok(door));
                true
            }
            Some(other) => {
                log::warn!("Room door response for {} request {}", other.kind(), request_id);
                self.waiters.insert(request_id.to_string(), other);
                false
            }
            None => false,
        }
    }

    /// Fail whatever is waiting under this ID, command or query.
    pub fn fail(&mut self, request_id: &str, error: ProxyError) -> bool {
        match self.waiters.remove(request_id) {
            Some(Waiter::Command(tx)) => {
                let _ = tx.send(Err(error));
                true
            }
            Some(Waiter::RoomDoor(tx)) => {
                let _ = tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("waiting", &self.waiters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::CollectionError;

    fn removed(index: u64) -> IndexedEvent<RoomCollectionEvent> {
        IndexedEvent::new(
            index,
            crate::fst::CollectionEvent::EntityRemoved {
                id: "room1".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_command_resolves() {
        let mut pending = PendingRequests::new();
        let (request_id, response) = pending.register_command();

        assert!(pending.resolve_command(&request_id, CommandResult::Ok { event: removed(3) }));
        assert!(pending.is_empty());
        assert_eq!(response.await.unwrap(), removed(3));
    }

    #[tokio::test]
    async fn test_command_rejected() {
        let mut pending = PendingRequests::new();
        let (request_id, response) = pending.register_command();

        let error = CollectionError::EntityNotFound {
            id: "room1".to_string(),
        };
        pending.resolve_command(&request_id, CommandResult::Err { error: error.clone() });

        match response.await {
            Err(ProxyError::Rejected(e)) => assert_eq!(e, error),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_table_fails_waiters() {
        let mut pending = PendingRequests::new();
        let (_, response) = pending.register_room_door();
        drop(pending);

        assert!(matches!(response.await, Err(ProxyError::Dropped)));
    }

    #[test]
    fn test_unknown_or_mismatched_id() {
        let mut pending = PendingRequests::new();
        let (request_id, _response) = pending.register_room_door();

        assert!(!pending.resolve_command("nope", CommandResult::Ok { event: removed(1) }));
        assert!(!pending.resolve_command(&request_id, CommandResult::Ok { event: removed(1) }));
        assert_eq!(pending.len(), 1);

        assert!(pending.resolve_room_door(&request_id, None));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_request_ids_unique() {
        let mut pending = PendingRequests::new();
        let (a, _ra) = pending.register_command();
        let (b, _rb) = pending.register_command();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_fail_either_kind() {
        let mut pending = PendingRequests::new();
        let (command_id, command) = pending.register_command();
        let (door_id, door) = pending.register_room_door();

        let invalid = ProxyError::Invalid("roomId must not be empty".to_string());
        assert!(pending.fail(&door_id, invalid));
        assert!(!pending.fail(&door_id, ProxyError::Dropped));
        assert!(pending.fail(&command_id, ProxyError::Invalid("bad".into())));
        assert!(pending.is_empty());

        match door.await {
            Err(ProxyError::Invalid(message)) => assert_eq!(message, "roomId must not be empty"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(command.await, Err(ProxyError::Invalid(m)) if m == "bad"));
    }
}
