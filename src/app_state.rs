use crate::{
    config::Config,
    models::sessions::SessionDirectory,
    services::{AllocationService, BookingService, LedgerService, SeatService, WaitlistService},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub ledger_service: Arc<LedgerService>,
    pub allocation_service: Arc<AllocationService>,
    pub seat_service: Arc<SeatService>,
    pub waitlist_service: Arc<WaitlistService>,
    pub booking_service: Arc<BookingService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(
        config: Config,
        sessions: Arc<dyn SessionDirectory>,
    ) -> Result<Self, anyhow::Error> {
        // Connect to database
        let db = sea_orm::Database::connect(&config.database.url).await?;

        // Initialize services
        let ledger_service = Arc::new(LedgerService::new(db.clone()));
        let allocation_service = Arc::new(AllocationService::new(db.clone()));
        let seat_service = Arc::new(SeatService::new(db.clone()));
        let waitlist_service = Arc::new(WaitlistService::new(db.clone()));
        let booking_service = Arc::new(BookingService::new(
            db.clone(),
            sessions,
            &config.booking,
        ));

        Ok(Self {
            db,
            ledger_service,
            allocation_service,
            seat_service,
            waitlist_service,
            booking_service,
            config: Arc::new(config),
        })
    }
}
