// Domain DTOs and entity extensions
pub mod batches;
pub mod bookings;
pub mod credit_batch_ext; // Extension methods for entity::credit_batches
pub mod sessions;
