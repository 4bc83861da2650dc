pub mod ticketing;
pub mod wallet;

pub use ticketing::TicketingService;
pub use wallet::WalletService;

/// Currencies a tier may be priced in.
pub const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "USD", "GBP", "EUR", "GHS", "KES", "ZAR"];
