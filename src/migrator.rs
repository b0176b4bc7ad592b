use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_stock_batches_table::Migration),
            Box::new(m20240101_000002_create_inventory_records_table::Migration),
            Box::new(m20240101_000003_create_stock_transactions_table::Migration),
            Box::new(m20240101_000004_create_documents_table::Migration),
            Box::new(m20240101_000005_create_document_items_table::Migration),
            Box::new(m20240101_000006_create_document_counters_table::Migration),
        ]
    }
}

mod m20240101_000001_create_stock_batches_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_stock_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockBatches::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockBatches::SupplierId).uuid().null())
                        .col(ColumnDef::new(StockBatches::WarehouseId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockBatches::QuantityReceived)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::PurchasePrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockBatches::ReceiptDate).date().not_null())
                        .col(ColumnDef::new(StockBatches::ExpirationDate).date().null())
                        .col(
                            ColumnDef::new(StockBatches::Status)
                                .string()
                                .not_null()
                                .default("active"),
                        )
                        .col(
                            ColumnDef::new(StockBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_batches_product_id")
                        .table(StockBatches::Table)
                        .col(StockBatches::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_batches_warehouse_id")
                        .table(StockBatches::Table)
                        .col(StockBatches::WarehouseId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockBatches {
        Table,
        Id,
        ProductId,
        SupplierId,
        WarehouseId,
        QuantityReceived,
        PurchasePrice,
        ReceiptDate,
        ExpirationDate,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_inventory_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_inventory_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryRecords::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryRecords::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryRecords::QuantityAvailable)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryRecords::QuantityReserved)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryRecords::LastUpdate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One live counter row per (batch, warehouse) pair
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_inventory_records_batch_warehouse")
                        .table(InventoryRecords::Table)
                        .col(InventoryRecords::BatchId)
                        .col(InventoryRecords::WarehouseId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryRecords {
        Table,
        Id,
        BatchId,
        WarehouseId,
        QuantityAvailable,
        QuantityReserved,
        LastUpdate,
    }
}

mod m20240101_000003_create_stock_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::TransactionType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransactions::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockTransactions::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::PreviousQuantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::ChangeQuantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransactions::DocumentId).uuid().null())
                        .col(ColumnDef::new(StockTransactions::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_product_id")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_batch_id")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::BatchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_document_id")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::DocumentId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_created_at")
                        .table(StockTransactions::Table)
                        .col((StockTransactions::CreatedAt, IndexOrder::Desc))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockTransactions {
        Table,
        Id,
        TransactionType,
        ProductId,
        BatchId,
        WarehouseId,
        PreviousQuantity,
        ChangeQuantity,
        DocumentId,
        UserId,
        CreatedAt,
    }
}

mod m20240101_000004_create_documents_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_documents_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Documents::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Documents::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Documents::DocNum).string().not_null())
                        .col(ColumnDef::new(Documents::OrderNum).string().null())
                        .col(
                            ColumnDef::new(Documents::DocDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Documents::DocType).string().not_null())
                        .col(ColumnDef::new(Documents::DocStatus).string().not_null())
                        .col(ColumnDef::new(Documents::WarehouseId).uuid().not_null())
                        .col(ColumnDef::new(Documents::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Documents::Sum)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Documents::CustomerId).uuid().null())
                        .col(ColumnDef::new(Documents::SupplierId).uuid().null())
                        .col(ColumnDef::new(Documents::FromWarehouseId).uuid().null())
                        .col(ColumnDef::new(Documents::ToWarehouseId).uuid().null())
                        .col(
                            ColumnDef::new(Documents::ExchangeRate)
                                .decimal_len(16, 6)
                                .null(),
                        )
                        .col(ColumnDef::new(Documents::Expenses).decimal_len(16, 4).null())
                        .col(ColumnDef::new(Documents::VendorCode).string().null())
                        .col(ColumnDef::new(Documents::Priority).integer().null())
                        .col(
                            ColumnDef::new(Documents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Documents::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_documents_doc_num")
                        .table(Documents::Table)
                        .col(Documents::DocNum)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_documents_type_status")
                        .table(Documents::Table)
                        .col(Documents::DocType)
                        .col(Documents::DocStatus)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Documents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Documents {
        Table,
        Id,
        DocNum,
        OrderNum,
        DocDate,
        DocType,
        DocStatus,
        WarehouseId,
        UserId,
        Sum,
        CustomerId,
        SupplierId,
        FromWarehouseId,
        ToWarehouseId,
        ExchangeRate,
        Expenses,
        VendorCode,
        Priority,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_document_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_document_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DocumentItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DocumentItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DocumentItems::DocumentId).uuid().not_null())
                        .col(ColumnDef::new(DocumentItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(DocumentItems::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DocumentItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DocumentItems::BonusStock)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(DocumentItems::ExpirationDate).date().null())
                        .col(ColumnDef::new(DocumentItems::BatchId).uuid().null())
                        .col(
                            ColumnDef::new(DocumentItems::QuantityFulfilled)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DocumentItems::PreferredWarehouseId)
                                .uuid()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_document_items_document_id")
                                .from(DocumentItems::Table, DocumentItems::DocumentId)
                                .to(Documents::Table, Documents::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_document_items_document_id")
                        .table(DocumentItems::Table)
                        .col(DocumentItems::DocumentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DocumentItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DocumentItems {
        Table,
        Id,
        DocumentId,
        ProductId,
        Quantity,
        UnitPrice,
        BonusStock,
        ExpirationDate,
        BatchId,
        QuantityFulfilled,
        PreferredWarehouseId,
    }

    #[derive(DeriveIden)]
    enum Documents {
        Table,
        Id,
    }
}

mod m20240101_000006_create_document_counters_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_document_counters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DocumentCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DocumentCounters::Prefix)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DocumentCounters::Value)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DocumentCounters::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DocumentCounters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DocumentCounters {
        Table,
        Prefix,
        Value,
        UpdatedAt,
    }
}
