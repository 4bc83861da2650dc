pub mod event;
pub mod host;
pub mod payout;
pub mod ticket;
pub mod transaction;
pub mod user;

pub use event::Event;
pub use host::{BankDetails, Host};
pub use payout::{Payout, PayoutStatus};
pub use ticket::{GroupSize, Ticket, TicketStatus, TicketTier, TierKind};
pub use transaction::{Transaction, TransactionStatus};
pub use user::User;
