pub mod catalog;
pub mod event;
pub mod purchase;
pub mod ticket;
pub mod user;

pub use catalog::{Category, TicketSector};
pub use event::{Batch, CreatorRole, Event, EventDay, EventMode, EventStatus, ProducerEvent};
pub use purchase::{PaymentStatus, TicketPurchase};
pub use ticket::{Ticket, TicketGender, TicketStatus};
pub use user::{User, UserRole};
