use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use gatepass_server::config::Config;
use gatepass_server::external::{TracingNotifier, TracingStorage};
use gatepass_server::handlers::AppState;
use gatepass_server::routes::create_routes;
use gatepass_server::services::{TicketingService, WalletService};
use gatepass_server::store::{PgStore, Store};

/// Reservations older than this are orphans from a crashed purchase request.
const RESERVATION_TTL_MINUTES: i64 = 15;
const RESERVATION_SWEEP_SECS: u64 = 300;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store = Arc::new(PgStore::new(pool));

    // Background sweep returning stock held by orphaned reservations. The
    // first tick fires immediately, which also cleans up after a crash.
    let sweeper = Arc::clone(&store);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(RESERVATION_SWEEP_SECS));
        loop {
            ticker.tick().await;
            match sweeper
                .reclaim_stale_reservations(chrono::Duration::minutes(RESERVATION_TTL_MINUTES))
                .await
            {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "Reclaimed stale stock reservations"),
                Err(err) => tracing::error!(error = ?err, "Reservation sweep failed"),
            }
        }
    });

    let notifier = Arc::new(TracingNotifier);
    let storage = Arc::new(TracingStorage);
    let state = AppState {
        ticketing: Arc::new(TicketingService::new(
            store.clone(),
            notifier.clone(),
            storage.clone(),
        )),
        wallet: Arc::new(WalletService::new(
            store,
            notifier,
            storage,
            config.payout_fee,
        )),
    };

    let app: Router = create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
