//! ABOUTME: Cross-cell message bus: vertical, lateral and broadcast channels
//! ABOUTME: Per-(sender,receiver) FIFO via per-receiver mpsc mailboxes; no global ordering

use dashmap::DashMap;
use noetic_core::CellId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Vertical: command-chain traffic, parent↔child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalKind {
    Delegate,
    Redirect,
    Feedback,
    Cancel,
    Resource,
    Clarify,
    Progress,
    Escalate,
    Partial,
    Blocked,
}

/// Lateral: peer-to-peer traffic. Kept intentionally minimal: plain
/// send/receive only, no coordination protocol on top (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateralKind {
    Share,
    Consult,
    Coordinate,
    Handoff,
    Conflict,
}

/// Broadcast: one-to-many traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    Announce,
    Alert,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum MessageKind {
    Vertical(VerticalKind),
    Lateral(LateralKind),
    Broadcast(BroadcastKind),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from: CellId,
    pub to: CellId,
    pub kind: MessageKind,
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("no mailbox registered for cell {0}")]
    UnknownRecipient(CellId),
}

/// Process-wide (or test-local) singleton:
/// an explicit service with its own lifecycle, substitutable in tests.
#[derive(Clone, Default)]
pub struct MessageBus {
    mailboxes: Arc<DashMap<CellId, mpsc::UnboundedSender<Message>>>,
}

pub struct Mailbox {
    pub cell_id: CellId,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Mailbox {
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cell and obtain its mailbox. Registering the same id
    /// twice replaces the old mailbox (the old one is simply dropped along
    /// with its receiver).
    pub fn register(&self, cell_id: CellId) -> Mailbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(cell_id.clone(), tx);
        Mailbox { cell_id, receiver: rx }
    }

    pub fn unregister(&self, cell_id: &CellId) {
        self.mailboxes.remove(cell_id);
    }

    pub fn is_registered(&self, cell_id: &CellId) -> bool {
        self.mailboxes.contains_key(cell_id)
    }

    /// Send a point-to-point message (vertical or lateral). FIFO is
    /// guaranteed between a single (from, to) pair because each sender's
    /// calls enqueue onto the recipient's channel in call order; no
    /// ordering is guaranteed across distinct senders.
    pub fn send(&self, from: CellId, to: CellId, kind: MessageKind, payload: Value) -> Result<(), MessagingError> {
        let tx = self
            .mailboxes
            .get(&to)
            .ok_or_else(|| MessagingError::UnknownRecipient(to.clone()))?;
        let msg = Message { from, to, kind, payload };
        tx.send(msg).map_err(|_| MessagingError::UnknownRecipient(msg_to_cell()))
    }

    /// Deliver a broadcast message to every currently registered cell
    /// except the sender itself.
    pub fn broadcast(&self, from: CellId, kind: BroadcastKind, payload: Value) {
        for entry in self.mailboxes.iter() {
            if entry.key() == &from {
                continue;
            }
            let msg = Message {
                from: from.clone(),
                to: entry.key().clone(),
                kind: MessageKind::Broadcast(kind),
                payload: payload.clone(),
            };
            // A dropped receiver (cell already terminated) is not an error
            // for a broadcast — other recipients should still get it.
            let _ = entry.value().send(msg);
        }
    }

    pub fn registered_count(&self) -> usize {
        self.mailboxes.len()
    }
}

fn msg_to_cell() -> CellId {
    CellId::from("<dropped-receiver>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn point_to_point_delivers_in_fifo_order_per_pair() {
        let bus = MessageBus::new();
        let parent = CellId::from("parent");
        let child = CellId::from("child");
        let mut child_mailbox = bus.register(child.clone());
        bus.register(parent.clone());

        for i in 0..5 {
            bus.send(
                parent.clone(),
                child.clone(),
                MessageKind::Vertical(VerticalKind::Delegate),
                serde_json::json!({ "seq": i }),
            )
            .unwrap();
        }

        for i in 0..5 {
            let msg = child_mailbox.recv().await.unwrap();
            assert_eq!(msg.payload["seq"], i);
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_all_but_sender() {
        let bus = MessageBus::new();
        let a = CellId::from("a");
        let b = CellId::from("b");
        let c = CellId::from("c");
        bus.register(a.clone());
        let mut mb_b = bus.register(b.clone());
        let mut mb_c = bus.register(c.clone());

        bus.broadcast(a.clone(), BroadcastKind::Alert, serde_json::json!({"reason": "cpu"}));

        assert_eq!(mb_b.recv().await.unwrap().from, a);
        assert_eq!(mb_c.recv().await.unwrap().from, a);
    }

    #[test]
    fn sending_to_unknown_recipient_errors() {
        let bus = MessageBus::new();
        let result = bus.send(
            CellId::from("a"),
            CellId::from("ghost"),
            MessageKind::Lateral(LateralKind::Share),
            Value::Null,
        );
        assert!(matches!(result, Err(MessagingError::UnknownRecipient(_))));
    }

    #[tokio::test]
    async fn unregister_removes_mailbox() {
        let bus = MessageBus::new();
        let cell = CellId::from("x");
        bus.register(cell.clone());
        assert!(bus.is_registered(&cell));
        bus.unregister(&cell);
        assert!(!bus.is_registered(&cell));
    }
}
