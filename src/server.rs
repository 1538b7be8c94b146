use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::models::methods::{DepositMethod, WithdrawalMethod};
use crate::models::users::Role;
use crate::services::ServiceManager;

mod auth;
mod catalog;
mod extract;
mod funds;
pub mod guards;
mod methods;
mod platform;
pub mod response;
mod users;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<ServiceManager>,
}

impl AppState {
    pub fn new(services: ServiceManager) -> Self {
        AppState {
            services: Arc::new(services),
        }
    }
}

/// Routes reachable without a token.
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/csrf-token", get(auth::csrf_token))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/assets", get(catalog::list_assets))
        .route("/assets/{id}", get(catalog::get_asset))
        .route("/currencies", get(catalog::list_currencies))
        .route("/currencies/{id}", get(catalog::get_currency))
        .route("/pairs", get(catalog::list_pairs))
        .route("/pairs/{id}", get(catalog::get_pair))
        .route("/plans", get(catalog::list_active_plans))
        .route("/plans/{id}", get(catalog::get_plan))
        .route(
            "/deposit-methods",
            get(methods::list_enabled::<DepositMethod>),
        )
        .route("/deposit-methods/{id}", get(methods::get::<DepositMethod>))
        .route(
            "/withdrawal-methods",
            get(methods::list_enabled::<WithdrawalMethod>),
        )
        .route(
            "/withdrawal-methods/{id}",
            get(methods::get::<WithdrawalMethod>),
        )
}

fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/resend-verification", post(auth::resend_verification))
        .route("/users/me", get(auth::me).put(auth::update_profile))
        .route("/users/me/password", put(auth::change_password))
        .route(
            "/deposits",
            get(funds::list_deposits).post(funds::create_deposit),
        )
        .route("/deposits/{id}", get(funds::get_deposit))
        .route(
            "/withdrawals",
            get(funds::list_withdrawals).post(funds::create_withdrawal),
        )
        .route("/withdrawals/{id}", get(funds::get_withdrawal))
        .route(
            "/transfers",
            get(funds::list_transfers).post(funds::create_transfer),
        )
        .route("/transfers/{id}", get(funds::get_transfer))
        .route(
            "/investments",
            get(funds::list_investments).post(funds::create_investment),
        )
        .route("/investments/{id}", get(funds::get_investment))
        .route("/notifications", get(platform::list_notifications))
        .route(
            "/notifications/{id}/read",
            put(platform::read_notification),
        )
        .route("/settings/transfer", get(platform::transfer_settings))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/master/users", get(users::list))
        .route("/master/users/{id}", get(users::get).delete(users::delete))
        .route("/master/users/{id}/status", put(users::set_status))
        .route("/master/users/{id}/balance", put(users::adjust_balance))
        .route("/master/assets", post(catalog::create_asset))
        .route(
            "/master/assets/{id}",
            put(catalog::update_asset).delete(catalog::delete_asset),
        )
        .route("/master/currencies", post(catalog::create_currency))
        .route(
            "/master/currencies/{id}",
            put(catalog::update_currency).delete(catalog::delete_currency),
        )
        .route("/master/pairs", post(catalog::create_pair))
        .route(
            "/master/pairs/{id}",
            put(catalog::update_pair).delete(catalog::delete_pair),
        )
        .route(
            "/master/plans",
            get(catalog::list_plans).post(catalog::create_plan),
        )
        .route(
            "/master/plans/{id}",
            put(catalog::update_plan).delete(catalog::delete_plan),
        )
        .route(
            "/master/deposit-methods",
            get(methods::list::<DepositMethod>).post(methods::create::<DepositMethod>),
        )
        .route(
            "/master/deposit-methods/{id}",
            put(methods::update::<DepositMethod>).delete(methods::delete::<DepositMethod>),
        )
        .route(
            "/master/withdrawal-methods",
            get(methods::list::<WithdrawalMethod>).post(methods::create::<WithdrawalMethod>),
        )
        .route(
            "/master/withdrawal-methods/{id}",
            put(methods::update::<WithdrawalMethod>)
                .delete(methods::delete::<WithdrawalMethod>),
        )
        .route("/master/deposits/{id}/status", put(funds::update_deposit))
        .route(
            "/master/withdrawals/{id}/status",
            put(funds::update_withdrawal),
        )
        .route("/master/transfers/{id}/status", put(funds::update_transfer))
        .route(
            "/master/investments/{id}/status",
            put(funds::update_investment),
        )
        .route("/master/notifications", post(platform::create_notification))
        .route(
            "/master/notifications/{id}",
            delete(platform::delete_notification),
        )
        .route(
            "/master/settings/referral",
            get(platform::referral_settings).put(platform::update_referral_settings),
        )
        .route(
            "/master/settings/transfer",
            put(platform::update_transfer_settings),
        )
}

fn super_admin_routes() -> Router<AppState> {
    Router::new().route("/master/users/{id}/role", put(users::set_role))
}

fn guarded(state: &AppState, required: Role, routes: Router<AppState>) -> Router<AppState> {
    let guard = guards::RoleGuard {
        state: state.clone(),
        required,
    };
    routes.route_layer(middleware::from_fn_with_state(guard, guards::authorize))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(public_routes())
        .merge(guarded(&state, Role::User, member_routes()))
        .merge(guarded(&state, Role::Admin, admin_routes()))
        .merge(guarded(&state, Role::SuperAdmin, super_admin_routes()))
        .layer(middleware::from_fn_with_state(state.clone(), guards::csrf))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guards::report_failures,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_http_server(state: AppState, listen: &str) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
