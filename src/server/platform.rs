use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use super::extract::{CurrentUser, ValidatedJson};
use super::response::{created, ok, page};
use super::AppState;
use crate::models::{
    notifications::NewNotification,
    platform::{UpdateReferralSettings, UpdateTransferSettings},
    ListParams,
};
use crate::services::ServiceError;

pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let notifications = &state.services.notifications;
    let items = notifications.fetch_all(&user, &params).await?;
    let total = notifications.count(&user, &params).await?;
    Ok(page("Notifications fetched", items, total))
}

pub async fn read_notification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let notification = state.services.notifications.read(&id, &user).await?;
    Ok(ok("Notification updated", notification))
}

pub async fn create_notification(
    State(state): State<AppState>,
    ValidatedJson(new): ValidatedJson<NewNotification>,
) -> Result<Response, ServiceError> {
    let notification = state.services.notifications.create(new).await?;
    Ok(created("Notification created", notification))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    state.services.notifications.delete(&id).await?;
    Ok(ok("Notification deleted", ()))
}

pub async fn referral_settings(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let settings = state.services.platform.referral_settings().await?;
    Ok(ok("Referral settings fetched", settings))
}

pub async fn update_referral_settings(
    State(state): State<AppState>,
    ValidatedJson(update): ValidatedJson<UpdateReferralSettings>,
) -> Result<Response, ServiceError> {
    let settings = state.services.platform.update_referral_settings(update).await?;
    Ok(ok("Referral settings updated", settings))
}

pub async fn transfer_settings(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let settings = state.services.platform.transfer_settings().await?;
    Ok(ok("Transfer settings fetched", settings))
}

pub async fn update_transfer_settings(
    State(state): State<AppState>,
    ValidatedJson(update): ValidatedJson<UpdateTransferSettings>,
) -> Result<Response, ServiceError> {
    let settings = state.services.platform.update_transfer_settings(update).await?;
    Ok(ok("Transfer settings updated", settings))
}
