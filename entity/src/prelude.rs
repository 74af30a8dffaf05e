pub use super::bookings::Entity as Bookings;
pub use super::credit_batches::Entity as CreditBatches;
pub use super::seat_resources::Entity as SeatResources;
pub use super::waiting_entries::Entity as WaitingEntries;
