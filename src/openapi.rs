use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockroom API",
        description = r#"
Batch-level inventory and document fulfillment engine.

Stock is tracked per (batch, warehouse) pair with separate available and
reserved counters. Every physical movement is paired with an append-only
ledger entry in the same database transaction, and all movements are driven
by business documents (incoming, outgoing, transfer, order) with per-type
status state machines.

Authentication happens upstream; requests carry the verified user id in the
`x-user-id` header.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "documents", description = "Document creation, status and fulfillment"),
        (name = "inventory", description = "Stock counters and corrections"),
        (name = "transactions", description = "Movement ledger")
    ),
    paths(
        crate::handlers::orders::create_document,
        crate::handlers::orders::get_document,
        crate::handlers::orders::fulfill_order,
        crate::handlers::documents::update_status,
        crate::handlers::documents::cancel_document,
        crate::handlers::inventory::adjust_stock,
        crate::handlers::inventory::get_stock_level,
        crate::handlers::transactions::create_transaction,
        crate::handlers::transactions::movement_history,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::handlers::orders::CreateDocumentRequest,
            crate::handlers::orders::CreateDocumentItemRequest,
            crate::handlers::documents::UpdateStatusRequest,
            crate::handlers::documents::StatusResponse,
            crate::handlers::inventory::AdjustStockRequest,
            crate::handlers::transactions::CreateTransactionRequest,
            crate::services::fulfillment::DocumentWithItems,
            crate::services::fulfillment::FulfillmentOutcome,
            crate::services::inventory::StockLevel,
            crate::services::transaction_log::MovementEntry,
            crate::entities::document::Model,
            crate::entities::document_item::Model,
            crate::entities::stock_transaction::Model,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
