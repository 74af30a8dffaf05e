// Service modules
pub mod allocation_service;
pub mod booking_service;
pub mod ledger_service;
pub mod seat_service;
pub mod waitlist_service;

pub use allocation_service::AllocationService;
pub use booking_service::BookingService;
pub use ledger_service::LedgerService;
pub use seat_service::SeatService;
pub use waitlist_service::WaitlistService;
