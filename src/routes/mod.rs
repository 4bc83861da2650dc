use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{apply_security_headers, create_cors_layer};
use crate::handlers::{self, AppState};

pub fn create_routes(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/events",
            post(handlers::events::create_event).get(handlers::events::list_events),
        )
        .route(
            "/events/:event_id/tiers",
            post(handlers::tiers::create_tier).get(handlers::tiers::list_tiers),
        )
        .route(
            "/events/:event_id/tiers/:tier_id",
            put(handlers::tiers::update_tier).delete(handlers::tiers::delete_tier),
        )
        .route("/events/:event_id/purchase", post(handlers::tickets::purchase))
        .route("/events/:event_id/check-in", post(handlers::tickets::check_in))
        .route(
            "/events/:event_id/tickets/search",
            get(handlers::tickets::search),
        )
        .route("/wallet", get(handlers::wallet::get_wallet))
        .route("/wallet/bank-details", put(handlers::wallet::set_bank_details))
        .route(
            "/wallet/withdrawals",
            post(handlers::wallet::request_withdrawal),
        )
        .route("/admin/payouts", get(handlers::payouts::list_payouts))
        .route(
            "/admin/payouts/:payout_id/approve",
            post(handlers::payouts::approve_payout),
        )
        .route(
            "/admin/payouts/:payout_id/reject",
            post(handlers::payouts::reject_payout),
        )
        .route("/admin/revenue/daily", get(handlers::payouts::revenue_summary))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer())
        .with_state(state);

    apply_security_headers(router)
}
