//! Domain services over the repositories.

pub mod appointments;
pub mod customers;
pub mod messages;
pub mod payments;

pub use appointments::{AppointmentService, BookingOutcome, BookingRequest};
pub use customers::{CustomerProfile, CustomerService};
pub use messages::{ContactSubmission, MessageService};
pub use payments::PaymentService;
