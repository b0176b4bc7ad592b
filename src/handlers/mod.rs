pub mod documents;
pub mod inventory;
pub mod orders;
pub mod transactions;

use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        AllocationService, DocumentStatusService, FulfillmentService, InventoryService,
        TransactionLogService,
    },
};

/// Service handles shared by the handler layer.
#[derive(Clone)]
pub struct AppServices {
    pub fulfillment: Arc<FulfillmentService>,
    pub inventory: Arc<InventoryService>,
    pub allocation: Arc<AllocationService>,
    pub transactions: Arc<TransactionLogService>,
    pub document_status: Arc<DocumentStatusService>,
}

impl AppServices {
    pub fn build(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            fulfillment: Arc::new(FulfillmentService::new(db.clone(), event_sender.clone())),
            inventory: Arc::new(InventoryService::new(db.clone(), event_sender.clone())),
            allocation: Arc::new(AllocationService::new(db.clone())),
            transactions: Arc::new(TransactionLogService::new(db.clone())),
            document_status: Arc::new(DocumentStatusService::new(db, event_sender)),
        }
    }
}
