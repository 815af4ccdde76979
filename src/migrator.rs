use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_orders_table::Migration),
            Box::new(m20240101_000003_create_order_items_table::Migration),
            Box::new(m20240101_000004_create_promo_codes_table::Migration),
            Box::new(m20240101_000005_create_promo_code_usages_table::Migration),
            Box::new(m20240101_000006_create_payment_events_table::Migration),
        ]
    }
}

mod m20240101_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
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
                        .col(ColumnDef::new(Products::Sku).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Price).big_integer().not_null())
                        .col(ColumnDef::new(Products::Currency).string().not_null())
                        .col(
                            ColumnDef::new(Products::StockOnHand)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::StockReserved)
                                .integer()
                                .not_null()
                                .default(0),
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
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
        Sku,
        Name,
        Price,
        Currency,
        StockOnHand,
        StockReserved,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentGateway).string())
                        .col(ColumnDef::new(Orders::PaymentReference).string())
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::Subtotal).big_integer().not_null())
                        .col(ColumnDef::new(Orders::TaxAmount).big_integer().not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingAmount)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountAmount)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Total).big_integer().not_null())
                        .col(ColumnDef::new(Orders::PromoCode).string())
                        .col(ColumnDef::new(Orders::ShippingAddress).text().not_null())
                        .col(ColumnDef::new(Orders::BillingAddress).text())
                        .col(
                            ColumnDef::new(Orders::ReservationExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Notes).text())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Orders::Version).integer().not_null().default(1))
                        .to_owned(),
                )
                .await?;

            // Webhooks correlate by provider reference; the sweep scans by status+expiry.
            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_payment_reference")
                        .table(Orders::Table)
                        .col(Orders::PaymentReference)
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_status_reservation_expiry")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .col(Orders::ReservationExpiresAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Status,
        PaymentStatus,
        PaymentGateway,
        PaymentReference,
        Currency,
        Subtotal,
        TaxAmount,
        ShippingAmount,
        DiscountAmount,
        Total,
        PromoCode,
        ShippingAddress,
        BillingAddress,
        ReservationExpiresAt,
        Notes,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000003_create_order_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).uuid())
                        .col(ColumnDef::new(OrderItems::Sku).string().not_null())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::LineTotal)
                                .big_integer()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        VariantId,
        Sku,
        ProductName,
        UnitPrice,
        Quantity,
        LineTotal,
    }
}

mod m20240101_000004_create_promo_codes_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_promo_codes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PromoCodes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PromoCodes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PromoCodes::DiscountType).string().not_null())
                        .col(
                            ColumnDef::new(PromoCodes::DiscountValue)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::MaxDiscountAmount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::MinOrderValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PromoCodes::MaxUsage).integer().not_null())
                        .col(
                            ColumnDef::new(PromoCodes::MaxUsagePerUser)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::StartsAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::EndsAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PromoCodes::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PromoCodes::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum PromoCodes {
        Table,
        Id,
        Code,
        DiscountType,
        DiscountValue,
        MaxDiscountAmount,
        MinOrderValue,
        MaxUsage,
        MaxUsagePerUser,
        UsageCount,
        StartsAt,
        EndsAt,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_promo_code_usages_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_promo_code_usages_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PromoCodeUsages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PromoCodeUsages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodeUsages::PromoCodeId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PromoCodeUsages::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(PromoCodeUsages::CustomerId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodeUsages::UsageOrdinal)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodeUsages::DiscountAmount)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodeUsages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One application of a given code per order.
            manager
                .create_index(
                    Index::create()
                        .name("uq_promo_code_usages_code_order")
                        .table(PromoCodeUsages::Table)
                        .col(PromoCodeUsages::PromoCodeId)
                        .col(PromoCodeUsages::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_promo_code_usages_code_customer")
                        .table(PromoCodeUsages::Table)
                        .col(PromoCodeUsages::PromoCodeId)
                        .col(PromoCodeUsages::CustomerId)
                        .to_owned(),
                )
                .await?;

            // Backstop for the per-user cap: concurrent transactions that
            // counted the same prior usages collide on the ordinal here.
            manager
                .create_index(
                    Index::create()
                        .name("uq_promo_code_usages_user_ordinal")
                        .table(PromoCodeUsages::Table)
                        .col(PromoCodeUsages::PromoCodeId)
                        .col(PromoCodeUsages::CustomerId)
                        .col(PromoCodeUsages::UsageOrdinal)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PromoCodeUsages::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum PromoCodeUsages {
        Table,
        Id,
        PromoCodeId,
        OrderId,
        CustomerId,
        UsageOrdinal,
        DiscountAmount,
        CreatedAt,
    }
}

mod m20240101_000006_create_payment_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_payment_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentEvents::Provider).string().not_null())
                        .col(ColumnDef::new(PaymentEvents::EventId).string().not_null())
                        .col(
                            ColumnDef::new(PaymentEvents::OrderReference)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentEvents::Amount).big_integer().not_null())
                        .col(ColumnDef::new(PaymentEvents::Currency).string().not_null())
                        .col(ColumnDef::new(PaymentEvents::Outcome).string().not_null())
                        .col(
                            ColumnDef::new(PaymentEvents::SignatureVerified)
                                .boolean()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentEvents::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Duplicate deliveries collide here; this index IS the idempotency guarantee.
            manager
                .create_index(
                    Index::create()
                        .name("uq_payment_events_provider_event_id")
                        .table(PaymentEvents::Table)
                        .col(PaymentEvents::Provider)
                        .col(PaymentEvents::EventId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentEvents::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum PaymentEvents {
        Table,
        Id,
        Provider,
        EventId,
        OrderReference,
        Amount,
        Currency,
        Outcome,
        SignatureVerified,
        ReceivedAt,
    }
}
