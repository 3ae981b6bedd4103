//! Route definitions for the Waste Collection Management Platform

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Auth routes (public)
        .nest("/auth", auth_routes())
        // Prospecting requests (public create)
        .route("/prospects", post(handlers::create_prospect_request))
        .merge(protected_routes().route_layer(middleware::from_fn_with_state(state, auth_middleware)))
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/token", post(handlers::issue_token))
        .route("/token/refresh", post(handlers::refresh_token))
        .route("/token/verify", post(handlers::verify_token))
}

/// Every route behind the bearer token
fn protected_routes() -> Router<AppState> {
    Router::new()
        // Accounts
        .nest("/users", user_routes())
        .nest("/me", me_routes())
        // Field sessions
        .nest("/sessions", session_routes())
        // Party registry
        .nest("/clients", client_routes())
        .nest("/zones", zone_routes())
        .nest("/contracts", contract_routes())
        .nest("/bins", bin_routes())
        .nest("/prospects", prospect_routes())
        // Fleet registry
        .nest("/agents", agent_routes())
        .nest("/vehicles", vehicle_routes())
        .nest("/teams", team_routes())
        // Operations
        .nest("/rounds", round_routes())
        .nest("/stops", stop_routes())
        .nest("/complaints", complaint_routes())
        // Billing
        .nest("/invoices", invoice_routes())
        .nest("/payments", payment_routes())
        .nest("/receipts", receipt_routes())
        .nest("/collection-reports", collection_report_routes())
        // Reporting
        .nest("/reports", reporting_routes())
}

/// User administration routes
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/:user_id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::deactivate_user),
        )
}

/// Own account routes
fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_me))
        .route("/profile", get(handlers::get_me).put(handlers::update_my_profile))
        .route("/qr-code", get(handlers::get_my_qr_code))
}

/// Agent session routes
fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sessions).post(handlers::start_session))
        .route("/active-agents", get(handlers::active_agents))
        .route("/:session_id", get(handlers::get_session))
        .route("/:session_id/end", post(handlers::end_session))
}

/// Client registry routes
fn client_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_clients).post(handlers::create_client))
        .route("/inactive", get(handlers::inactive_clients))
        .route("/statistics", get(handlers::client_statistics))
        .route(
            "/:client_id",
            get(handlers::get_client)
                .put(handlers::update_client)
                .delete(handlers::delete_client),
        )
        .route("/:client_id/history", get(handlers::client_history))
        .route("/:client_id/mark-inactive", post(handlers::mark_client_inactive))
}

/// Zone routes
fn zone_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_zones).post(handlers::create_zone))
        .route(
            "/:zone_id",
            get(handlers::get_zone)
                .put(handlers::update_zone)
                .delete(handlers::delete_zone),
        )
        .route("/:zone_id/clients", get(handlers::zone_clients))
        .route("/:zone_id/statistics", get(handlers::zone_statistics))
}

/// Contract routes
fn contract_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_contracts).post(handlers::create_contract))
        .route(
            "/:contract_id",
            get(handlers::get_contract)
                .put(handlers::update_contract)
                .delete(handlers::delete_contract),
        )
}

/// Bin routes
fn bin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_bins).post(handlers::create_bin))
        .route(
            "/:bin_id",
            get(handlers::get_bin)
                .put(handlers::update_bin)
                .delete(handlers::delete_bin),
        )
}

/// Prospecting request routes (the public create lives in `api_routes`)
fn prospect_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_prospect_requests))
        .route("/:request_id", get(handlers::get_prospect_request))
        .route("/:request_id/assign", post(handlers::assign_prospect_request))
        .route("/:request_id/visit", post(handlers::visit_prospect_request))
        .route("/:request_id/convert", post(handlers::convert_prospect_request))
        .route("/:request_id/reject", post(handlers::reject_prospect_request))
}

/// Agent routes
fn agent_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_agents).post(handlers::create_agent))
        .route("/available", get(handlers::available_agents))
        .route("/statistics", get(handlers::agent_statistics))
        .route(
            "/:agent_id",
            get(handlers::get_agent)
                .put(handlers::update_agent)
                .delete(handlers::delete_agent),
        )
        .route("/:agent_id/performance", get(handlers::agent_performance))
        .route("/:agent_id/zones", post(handlers::assign_agent_zone))
}

/// Vehicle routes
fn vehicle_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_vehicles).post(handlers::create_vehicle))
        .route("/operational", get(handlers::operational_vehicles))
        .route("/maintenance-due", get(handlers::maintenance_due_vehicles))
        .route(
            "/:vehicle_id",
            get(handlers::get_vehicle)
                .put(handlers::update_vehicle)
                .delete(handlers::delete_vehicle),
        )
        .route(
            "/:vehicle_id/maintenance",
            get(handlers::maintenance_history).post(handlers::register_maintenance),
        )
}

/// Team routes
fn team_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_teams).post(handlers::create_team))
        .route("/statistics", get(handlers::team_statistics))
        .route(
            "/:team_id",
            get(handlers::get_team)
                .put(handlers::update_team)
                .delete(handlers::delete_team),
        )
        .route("/:team_id/planning", get(handlers::team_planning))
        .route("/:team_id/members", post(handlers::add_team_member))
        .route("/:team_id/members/:agent_id", delete(handlers::remove_team_member))
}

/// Collection round routes
fn round_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_rounds).post(handlers::create_round))
        .route("/:round_id", get(handlers::get_round).put(handlers::update_round))
        .route("/:round_id/start", post(handlers::start_round))
        .route("/:round_id/end", post(handlers::end_round))
        .route("/:round_id/cancel", post(handlers::cancel_round))
        .route("/:round_id/postpone", post(handlers::postpone_round))
        .route(
            "/:round_id/stops",
            get(handlers::round_stops).post(handlers::create_stop),
        )
}

/// Stop routes
fn stop_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_stops))
        .route("/:stop_id", get(handlers::get_stop))
        .route("/:stop_id/arrive", post(handlers::arrive_at_stop))
        .route("/:stop_id/complete", post(handlers::complete_stop))
        .route("/:stop_id/fail", post(handlers::fail_stop))
        .route("/:stop_id/postpone", post(handlers::postpone_stop))
}

/// Complaint routes
fn complaint_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_complaints).post(handlers::create_complaint))
        .route(
            "/:complaint_id",
            get(handlers::get_complaint).put(handlers::update_complaint),
        )
        .route("/:complaint_id/assign", post(handlers::assign_complaint))
        .route("/:complaint_id/resolve", post(handlers::resolve_complaint))
        .route("/:complaint_id/close", post(handlers::close_complaint))
}

/// Invoice routes
fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_invoices).post(handlers::create_invoice))
        .route("/generate", post(handlers::generate_invoice))
        .route(
            "/:invoice_id",
            get(handlers::get_invoice)
                .put(handlers::update_invoice)
                .delete(handlers::delete_invoice),
        )
        .route("/:invoice_id/issue", post(handlers::issue_invoice))
        .route("/:invoice_id/cancel", post(handlers::cancel_invoice))
}

/// Payment routes
fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_payments).post(handlers::create_payment))
        .route("/:payment_id", get(handlers::get_payment))
        .route("/:payment_id/verify", post(handlers::verify_payment))
        .route("/:payment_id/validate", post(handlers::validate_payment))
        .route("/:payment_id/refuse", post(handlers::refuse_payment))
        .route("/:payment_id/cancel", post(handlers::cancel_payment))
        .route("/:payment_id/confirm", post(handlers::confirm_payment))
        .route("/:payment_id/contest", post(handlers::contest_payment))
        .route("/:payment_id/receipt", get(handlers::payment_receipt))
}

/// Receipt routes
fn receipt_routes() -> Router<AppState> {
    Router::new()
        .route("/:receipt_id", get(handlers::get_receipt))
        .route("/:receipt_id/verify", get(handlers::verify_receipt))
}

/// Agent collection report routes
fn collection_report_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_collection_reports))
        .route("/generate", post(handlers::generate_collection_report))
        .route("/:report_id", get(handlers::get_collection_report))
        .route("/:report_id/transmit", post(handlers::transmit_collection_report))
        .route("/:report_id/validate", post(handlers::validate_collection_report))
}

/// Reporting routes
fn reporting_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/payments/export", get(handlers::export_payments))
}
