use std::env;

use rust_decimal::Decimal;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

/// Fixed fee charged on every host withdrawal, in the base currency.
const DEFAULT_PAYOUT_FEE: &str = "100";

pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub payout_fee: Decimal,
}

impl Config {
    pub fn from_env() -> Self {
        let payout_fee = env::var("PAYOUT_FEE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(|| {
                DEFAULT_PAYOUT_FEE
                    .parse()
                    .unwrap_or(Decimal::ONE_HUNDRED)
            });
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/gatepass".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(3001),
            payout_fee,
        }
    }
}
