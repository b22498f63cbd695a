use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_customers_table::Migration),
            Box::new(m20240101_000003_create_transactions_tables::Migration),
            Box::new(m20240101_000004_create_stock_movements_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_catalog_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Category).string().null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Sizes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sizes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Sizes::Name).string().not_null())
                        .col(
                            ColumnDef::new(Sizes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Colors::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Colors::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Colors::Name).string().not_null())
                        .col(
                            ColumnDef::new(Colors::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductVariants::SizeId).uuid().not_null())
                        .col(ColumnDef::new(ProductVariants::ColorId).uuid().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::MinStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::Price)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(ProductVariants::Barcode).string().null())
                        .col(
                            ColumnDef::new(ProductVariants::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::UpdatedAt)
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
                        .name("idx_product_variants_product_id")
                        .table(ProductVariants::Table)
                        .col(ProductVariants::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_variants_barcode")
                        .table(ProductVariants::Table)
                        .col(ProductVariants::Barcode)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Colors::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sizes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Category,
        Description,
        Price,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Sizes {
        Table,
        Id,
        Name,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Colors {
        Table,
        Id,
        Name,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ProductVariants {
        Table,
        Id,
        ProductId,
        SizeId,
        ColorId,
        Stock,
        MinStock,
        Price,
        Barcode,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_customers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_customers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Phone).string().null())
                        .col(ColumnDef::new(Customers::Email).string().null())
                        .col(ColumnDef::new(Customers::Address).text().null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::UpdatedAt)
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
                        .name("idx_customers_phone")
                        .table(Customers::Table)
                        .col(Customers::Phone)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Customers {
        Table,
        Id,
        Name,
        Phone,
        Email,
        Address,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_transactions_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_transactions_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Transactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::TransactionType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::InvoiceNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::DiscountAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::TaxAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transactions::SupplierId).uuid().null())
                        .col(ColumnDef::new(Transactions::UserId).uuid().not_null())
                        .col(ColumnDef::new(Transactions::Notes).text().null())
                        .col(
                            ColumnDef::new(Transactions::TransactionDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::UpdatedAt)
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
                        .name("idx_transactions_invoice_number")
                        .table(Transactions::Table)
                        .col(Transactions::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_type_status")
                        .table(Transactions::Table)
                        .col(Transactions::TransactionType)
                        .col(Transactions::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_transaction_date")
                        .table(Transactions::Table)
                        .col(Transactions::TransactionDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TransactionItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransactionItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionItems::TransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransactionItems::VariantId).uuid().null())
                        .col(
                            ColumnDef::new(TransactionItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionItems::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionItems::TotalPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transaction_items_transaction_id")
                        .table(TransactionItems::Table)
                        .col(TransactionItems::TransactionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransactionItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Transactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Transactions {
        Table,
        Id,
        TransactionType,
        InvoiceNumber,
        TotalAmount,
        DiscountAmount,
        TaxAmount,
        Status,
        SupplierId,
        UserId,
        Notes,
        TransactionDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum TransactionItems {
        Table,
        Id,
        TransactionId,
        ProductId,
        VariantId,
        Quantity,
        UnitPrice,
        TotalPrice,
    }
}

mod m20240101_000004_create_stock_movements_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::VariantId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Reason).text().not_null())
                        .col(ColumnDef::new(StockMovements::Reference).string().null())
                        .col(
                            ColumnDef::new(StockMovements::PreviousStock)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::NewStock)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
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
                        .name("idx_stock_movements_variant_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::VariantId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_variant_created")
                        .table(StockMovements::Table)
                        .col(StockMovements::VariantId)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockMovements {
        Table,
        Id,
        VariantId,
        MovementType,
        Quantity,
        Reason,
        Reference,
        PreviousStock,
        NewStock,
        CreatedBy,
        CreatedAt,
    }
}
