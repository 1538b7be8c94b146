use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use super::extract::{CurrentUser, ValidatedJson};
use super::response::{ok, page};
use super::AppState;
use crate::models::users::{BalanceAdjustment, UpdateRole, UpdateUserStatus, UserFilter};
use crate::services::ServiceError;

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> Result<Response, ServiceError> {
    let users = state.services.users.fetch_all(&filter).await?;
    let total = state.services.users.count(&filter).await?;
    Ok(page("Users fetched", users, total))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let user = state.services.users.get(&id).await?;
    Ok(ok("User fetched", user))
}

pub async fn set_status(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateUserStatus>,
) -> Result<Response, ServiceError> {
    let user = state
        .services
        .users
        .set_status(&actor, &id, update.status)
        .await?;
    Ok(ok("User status updated", user))
}

pub async fn set_role(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateRole>,
) -> Result<Response, ServiceError> {
    let user = state.services.users.set_role(&actor, &id, update.role).await?;
    Ok(ok("User role updated", user))
}

pub async fn adjust_balance(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(adjustment): ValidatedJson<BalanceAdjustment>,
) -> Result<Response, ServiceError> {
    let user = state
        .services
        .users
        .adjust_balance(&actor, &id, adjustment)
        .await?;
    Ok(ok("Balance adjusted", user))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    state.services.users.delete(&actor, &id).await?;
    Ok(ok("User deleted", ()))
}
