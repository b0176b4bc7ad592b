pub mod batch;
pub mod document;
pub mod document_counter;
pub mod document_item;
pub mod inventory_record;
pub mod stock_transaction;

pub use batch::Entity as Batch;
pub use document::Entity as Document;
pub use document_counter::Entity as DocumentCounter;
pub use document_item::Entity as DocumentItem;
pub use inventory_record::Entity as InventoryRecord;
pub use stock_transaction::Entity as StockTransaction;
