//! Outbound JSON transport used by the client proxy.

use tokio::sync::mpsc;

/// Delivers serialized payloads to the server. Delivery failures are the
/// transport's concern; the proxy never waits on `send`.
pub trait JsonMessageChannel {
    fn send(&self, payload: String, auth_token: &str);
}

/// A payload as it left the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub payload: String,
    pub auth_token: String,
}

/// Sending half of an in-process channel.
#[derive(Debug, Clone)]
pub struct InMemoryChannel {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl JsonMessageChannel for InMemoryChannel {
    fn send(&self, payload: String, auth_token: &str) {
        let outgoing = Outgoing {
            payload,
            auth_token: auth_token.to_string(),
        };
        if self.tx.send(outgoing).is_err() {
            log::debug!("In-memory channel closed, dropping payload");
        }
    }
}

/// Receiving half of an in-process channel.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl Inbox {
    /// Take everything sent so far, in send order.
    pub fn drain(&mut self) -> Vec<Outgoing> {
        let mut drained = Vec::new();
        while let Ok(outgoing) = self.rx.try_recv() {
            drained.push(outgoing);
        }
        drained
    }

    /// Wait for the next payload; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.rx.recv().await
    }
}

/// Create a connected channel/inbox pair.
pub fn in_memory_channel() -> (InMemoryChannel, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InMemoryChannel { tx }, Inbox { rx })
}
