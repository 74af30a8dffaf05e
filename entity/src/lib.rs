pub mod prelude;

pub mod bookings;
pub mod credit_batches;
pub mod sea_orm_active_enums;
pub mod seat_resources;
pub mod waiting_entries;
