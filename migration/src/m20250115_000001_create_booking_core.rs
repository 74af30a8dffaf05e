use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create batch_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(BatchStatus::Type)
                    .values([
                        BatchStatus::Valid,
                        BatchStatus::Used,
                        BatchStatus::Expired,
                        BatchStatus::Cancelled,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create batch_origin enum
        manager
            .create_type(
                Type::create()
                    .as_enum(BatchOrigin::Type)
                    .values([BatchOrigin::Purchase, BatchOrigin::Bonus, BatchOrigin::Manual])
                    .to_owned(),
            )
            .await?;

        // Create booking_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(BookingStatus::Type)
                    .values([BookingStatus::Active, BookingStatus::Cancelled])
                    .to_owned(),
            )
            .await?;

        // Create seat_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(SeatStatus::Type)
                    .values([SeatStatus::Available, SeatStatus::InUse])
                    .to_owned(),
            )
            .await?;

        // Create credit_batches table (FIRST - bookings reference it)
        manager
            .create_table(
                Table::create()
                    .table(CreditBatches::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditBatches::Id))
                    .col(uuid(CreditBatches::CustomerId).not_null())
                    .col(uuid(CreditBatches::CategoryId).not_null())
                    .col(
                        string(CreditBatches::SourceTransactionId)
                            .unique_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditBatches::Origin)
                            .custom(BatchOrigin::Type)
                            .not_null(),
                    )
                    .col(integer(CreditBatches::Quantity).not_null())
                    .col(integer(CreditBatches::AvailableCredits).not_null())
                    .col(integer(CreditBatches::UsedCredits).default(0).not_null())
                    .col(
                        ColumnDef::new(CreditBatches::Status)
                            .custom(BatchStatus::Type)
                            .not_null()
                            .default(SimpleExpr::Custom("'valid'::batch_status".to_string())),
                    )
                    .col(timestamp_with_time_zone(CreditBatches::ExpiresAt).not_null())
                    .col(
                        timestamp_with_time_zone(CreditBatches::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Balance arithmetic is CHECK-enforced: a bug that would corrupt
        // a batch fails the statement instead of the ledger.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE credit_batches
                    ADD CONSTRAINT chk_credit_batches_available_non_negative
                        CHECK (available_credits >= 0),
                    ADD CONSTRAINT chk_credit_batches_used_non_negative
                        CHECK (used_credits >= 0),
                    ADD CONSTRAINT chk_credit_batches_conservation
                        CHECK (available_credits + used_credits = quantity);
                "#,
            )
            .await?;

        // Create indexes on credit_batches
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_batches_customer")
                    .table(CreditBatches::Table)
                    .col(CreditBatches::CustomerId)
                    .to_owned(),
            )
            .await?;

        // Covers the FEFO candidate scan (customer, category, status, expiry order)
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_batches_fefo_scan")
                    .table(CreditBatches::Table)
                    .col(CreditBatches::CustomerId)
                    .col(CreditBatches::CategoryId)
                    .col(CreditBatches::Status)
                    .col(CreditBatches::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // Covers the expiry sweep selection
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_batches_status_expiry")
                    .table(CreditBatches::Table)
                    .col(CreditBatches::Status)
                    .col(CreditBatches::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // Create bookings table
        manager
            .create_table(
                Table::create()
                    .table(Bookings::Table)
                    .if_not_exists()
                    .col(pk_uuid(Bookings::Id))
                    .col(uuid(Bookings::SessionId).not_null())
                    .col(uuid(Bookings::CustomerId).not_null())
                    .col(integer(Bookings::SeatNumber).not_null())
                    .col(uuid(Bookings::BatchId).not_null())
                    .col(
                        ColumnDef::new(Bookings::Status)
                            .custom(BookingStatus::Type)
                            .not_null()
                            .default(SimpleExpr::Custom("'active'::booking_status".to_string())),
                    )
                    .col(
                        timestamp_with_time_zone(Bookings::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(Bookings::CancelledAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bookings_batch_id")
                            .from(Bookings::Table, Bookings::BatchId)
                            .to(CreditBatches::Table, CreditBatches::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Partial unique indexes backstop the in-transaction re-checks:
        // at most one ACTIVE booking per (session, customer) and per
        // (session, seat). sea-query cannot express partial indexes.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE UNIQUE INDEX idx_bookings_active_session_customer
                    ON bookings (session_id, customer_id)
                    WHERE status = 'active';
                CREATE UNIQUE INDEX idx_bookings_active_session_seat
                    ON bookings (session_id, seat_number)
                    WHERE status = 'active';
                "#,
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bookings_customer")
                    .table(Bookings::Table)
                    .col(Bookings::CustomerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bookings_batch")
                    .table(Bookings::Table)
                    .col(Bookings::BatchId)
                    .to_owned(),
            )
            .await?;

        // Create waiting_entries table
        manager
            .create_table(
                Table::create()
                    .table(WaitingEntries::Table)
                    .if_not_exists()
                    .col(pk_uuid(WaitingEntries::Id))
                    .col(uuid(WaitingEntries::SessionId).not_null())
                    .col(uuid(WaitingEntries::CustomerId).not_null())
                    .col(integer(WaitingEntries::Position).not_null())
                    .col(
                        timestamp_with_time_zone(WaitingEntries::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE waiting_entries
                    ADD CONSTRAINT chk_waiting_entries_position_positive
                        CHECK ("position" >= 1);
                "#,
            )
            .await?;

        // One queue entry per customer per session
        manager
            .create_index(
                Index::create()
                    .name("idx_waiting_entries_session_customer")
                    .table(WaitingEntries::Table)
                    .col(WaitingEntries::SessionId)
                    .col(WaitingEntries::CustomerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Position is unique per session; the dequeue renumber updates
        // tail rows in ascending order so the index never sees a clash.
        manager
            .create_index(
                Index::create()
                    .name("idx_waiting_entries_session_position")
                    .table(WaitingEntries::Table)
                    .col(WaitingEntries::SessionId)
                    .col(WaitingEntries::Position)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create seat_resources table
        manager
            .create_table(
                Table::create()
                    .table(SeatResources::Table)
                    .if_not_exists()
                    .col(pk_uuid(SeatResources::Id))
                    .col(uuid(SeatResources::SessionId).not_null())
                    .col(integer(SeatResources::SeatNumber).not_null())
                    .col(
                        ColumnDef::new(SeatResources::Status)
                            .custom(SeatStatus::Type)
                            .not_null()
                            .default(SimpleExpr::Custom("'available'::seat_status".to_string())),
                    )
                    .col(uuid_null(SeatResources::CustomerId))
                    .col(
                        timestamp_with_time_zone(SeatResources::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_seat_resources_session_seat")
                    .table(SeatResources::Table)
                    .col(SeatResources::SessionId)
                    .col(SeatResources::SeatNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order (due to foreign keys)
        manager
            .drop_table(Table::drop().table(SeatResources::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(WaitingEntries::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Bookings::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(CreditBatches::Table).to_owned())
            .await?;

        // Drop enums
        manager
            .drop_type(Type::drop().name(SeatStatus::Type).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(BookingStatus::Type).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(BatchOrigin::Type).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(BatchStatus::Type).to_owned())
            .await?;

        Ok(())
    }
}

// Enum definitions
#[derive(DeriveIden)]
enum BatchStatus {
    #[sea_orm(iden = "batch_status")]
    Type,
    Valid,
    Used,
    Expired,
    Cancelled,
}

#[derive(DeriveIden)]
enum BatchOrigin {
    #[sea_orm(iden = "batch_origin")]
    Type,
    Purchase,
    Bonus,
    Manual,
}

#[derive(DeriveIden)]
enum BookingStatus {
    #[sea_orm(iden = "booking_status")]
    Type,
    Active,
    Cancelled,
}

#[derive(DeriveIden)]
enum SeatStatus {
    #[sea_orm(iden = "seat_status")]
    Type,
    Available,
    InUse,
}

// Table definitions
#[derive(DeriveIden)]
enum CreditBatches {
    Table,
    Id,
    CustomerId,
    CategoryId,
    SourceTransactionId,
    Origin,
    Quantity,
    AvailableCredits,
    UsedCredits,
    Status,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Bookings {
    Table,
    Id,
    SessionId,
    CustomerId,
    SeatNumber,
    BatchId,
    Status,
    CreatedAt,
    CancelledAt,
}

#[derive(DeriveIden)]
enum WaitingEntries {
    Table,
    Id,
    SessionId,
    CustomerId,
    Position,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SeatResources {
    Table,
    Id,
    SessionId,
    SeatNumber,
    Status,
    CustomerId,
    UpdatedAt,
}
