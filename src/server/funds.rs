use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use super::extract::{CurrentUser, ValidatedJson};
use super::response::{created, ok, page};
use super::AppState;
use crate::models::{
    deposits::{NewDeposit, UpdateDepositStatus},
    investments::{NewInvestment, UpdateInvestmentStatus},
    transfers::{NewTransfer, UpdateTransferStatus},
    withdrawals::{NewWithdrawal, UpdateWithdrawalStatus},
    ListParams,
};
use crate::services::ServiceError;

// Members see their own records; staff see everyone's.

pub async fn list_deposits(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let deposits = &state.services.deposits;
    let items = deposits.fetch_all(&user, &params).await?;
    let total = deposits.count(&user).await?;
    Ok(page("Deposits fetched", items, total))
}

pub async fn get_deposit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let deposit = state.services.deposits.get(&user, &id).await?;
    Ok(ok("Deposit fetched", deposit))
}

pub async fn create_deposit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(new): ValidatedJson<NewDeposit>,
) -> Result<Response, ServiceError> {
    let deposit = state.services.deposits.create(&user, new).await?;
    Ok(created("Deposit requested", deposit))
}

pub async fn update_deposit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateDepositStatus>,
) -> Result<Response, ServiceError> {
    let deposit = state
        .services
        .deposits
        .update_status(&user, &id, update.status)
        .await?;
    Ok(ok("Deposit updated", deposit))
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let withdrawals = &state.services.withdrawals;
    let items = withdrawals.fetch_all(&user, &params).await?;
    let total = withdrawals.count(&user).await?;
    Ok(page("Withdrawals fetched", items, total))
}

pub async fn get_withdrawal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let withdrawal = state.services.withdrawals.get(&user, &id).await?;
    Ok(ok("Withdrawal fetched", withdrawal))
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(new): ValidatedJson<NewWithdrawal>,
) -> Result<Response, ServiceError> {
    let withdrawal = state.services.withdrawals.create(&user, new).await?;
    Ok(created("Withdrawal requested", withdrawal))
}

pub async fn update_withdrawal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateWithdrawalStatus>,
) -> Result<Response, ServiceError> {
    let withdrawal = state
        .services
        .withdrawals
        .update_status(&user, &id, update.status)
        .await?;
    Ok(ok("Withdrawal updated", withdrawal))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let transfers = &state.services.transfers;
    let items = transfers.fetch_all(&user, &params).await?;
    let total = transfers.count(&user).await?;
    Ok(page("Transfers fetched", items, total))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let transfer = state.services.transfers.get(&user, &id).await?;
    Ok(ok("Transfer fetched", transfer))
}

pub async fn create_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(new): ValidatedJson<NewTransfer>,
) -> Result<Response, ServiceError> {
    let transfer = state.services.transfers.create(&user, new).await?;
    Ok(created("Transfer submitted", transfer))
}

pub async fn update_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateTransferStatus>,
) -> Result<Response, ServiceError> {
    let transfer = state
        .services
        .transfers
        .update_status(&user, &id, update.status)
        .await?;
    Ok(ok("Transfer updated", transfer))
}

pub async fn list_investments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let investments = &state.services.investments;
    let items = investments.fetch_all(&user, &params).await?;
    let total = investments.count(&user, &params).await?;
    Ok(page("Investments fetched", items, total))
}

pub async fn get_investment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let investment = state.services.investments.get(&user, &id).await?;
    Ok(ok("Investment fetched", investment))
}

pub async fn create_investment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(new): ValidatedJson<NewInvestment>,
) -> Result<Response, ServiceError> {
    let investment = state.services.investments.create(&user, new).await?;
    Ok(created("Investment placed", investment))
}

pub async fn update_investment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateInvestmentStatus>,
) -> Result<Response, ServiceError> {
    let investment = state
        .services
        .investments
        .update_status(&user, &id, update)
        .await?;
    Ok(ok("Investment updated", investment))
}
