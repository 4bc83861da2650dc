pub mod config;
pub mod external;
pub mod fees;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;
