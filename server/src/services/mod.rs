pub mod blobs;
pub mod checkout;
pub mod events;
pub mod slug;
pub mod sweeper;
pub mod users;

pub use checkout::CheckoutService;
pub use events::EventService;
pub use users::UserService;
