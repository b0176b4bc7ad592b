use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Domain events emitted after a database transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    DocumentCreated {
        document_id: Uuid,
        doc_type: String,
        doc_num: String,
    },
    DocumentStatusChanged {
        document_id: Uuid,
        old_status: String,
        new_status: String,
    },
    DocumentCancelled {
        document_id: Uuid,
        reversed_transactions: usize,
    },
    BatchCreated {
        batch_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i64,
    },
    StockReserved {
        product_id: Uuid,
        quantity: i64,
    },
    StockAdjusted {
        batch_id: Uuid,
        warehouse_id: Uuid,
        change_quantity: i64,
    },
    OrderFulfillmentProgressed {
        order_id: Uuid,
        status: String,
        generated_documents: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a channel pair and spawns the processing loop.
pub fn spawn_event_processor(capacity: usize) -> (EventSender, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(process_events(rx));
    (EventSender::new(tx), handle)
}

/// Drains the event channel, logging each event. Downstream consumers
/// (webhooks, analytics) would hook in here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::DocumentCreated {
                document_id,
                doc_type,
                doc_num,
            } => {
                info!(document_id = %document_id, doc_type = %doc_type, doc_num = %doc_num, "document created");
            }
            Event::DocumentStatusChanged {
                document_id,
                old_status,
                new_status,
            } => {
                info!(document_id = %document_id, from = %old_status, to = %new_status, "document status changed");
            }
            Event::DocumentCancelled {
                document_id,
                reversed_transactions,
            } => {
                info!(document_id = %document_id, reversed = reversed_transactions, "document cancelled");
            }
            other => debug!(event = ?other, "event processed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::StockReserved {
                product_id: Uuid::new_v4(),
                quantity: 5,
            })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Event::StockReserved { quantity, .. }) => assert_eq!(quantity, 5),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender
            .send(Event::StockAdjusted {
                batch_id: Uuid::new_v4(),
                warehouse_id: Uuid::new_v4(),
                change_quantity: -1,
            })
            .await;
        assert!(result.is_err());
    }
}
