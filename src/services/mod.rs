pub mod allocation;
pub mod batches;
pub mod document_status;
pub mod fulfillment;
pub mod inventory;
pub mod transaction_log;

pub use allocation::{Allocation, AllocationService, WarehouseScope};
pub use document_status::{DocumentStatusService, StatusOutcome};
pub use fulfillment::{
    DocumentWithItems, FulfillmentOutcome, FulfillmentService, NewDocument, NewDocumentItem,
};
pub use inventory::{InventoryService, StockLevel};
pub use transaction_log::{MovementEntry, NewEntry, TransactionLogService};
