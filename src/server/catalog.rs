use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use super::extract::ValidatedJson;
use super::response::{created, ok, page};
use super::AppState;
use crate::models::{
    assets::{NewAsset, UpdateAsset},
    currencies::{NewCurrency, UpdateCurrency},
    pairs::{NewPair, UpdatePair},
    plans::{NewPlan, UpdatePlan},
    ListParams,
};
use crate::repositories::Filter;
use crate::services::ServiceError;

pub async fn list_assets(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let assets = &state.services.assets;
    let items = assets.fetch_all(Filter::All, params.skip, params.limit).await?;
    let total = assets.count(Filter::All).await?;
    Ok(page("Assets fetched", items, total))
}

pub async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(ok("Asset fetched", state.services.assets.get(&id).await?))
}

pub async fn create_asset(
    State(state): State<AppState>,
    ValidatedJson(new): ValidatedJson<NewAsset>,
) -> Result<Response, ServiceError> {
    let asset = state.services.assets.create(new.into_asset()).await?;
    Ok(created("Asset created", asset))
}

pub async fn update_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateAsset>,
) -> Result<Response, ServiceError> {
    let asset = state
        .services
        .assets
        .update(&id, |asset| {
            update.apply(asset);
            Ok(())
        })
        .await?;
    Ok(ok("Asset updated", asset))
}

pub async fn delete_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    state.services.assets.delete(&id).await?;
    Ok(ok("Asset deleted", ()))
}

pub async fn list_currencies(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let currencies = &state.services.currencies;
    let items = currencies
        .fetch_all(Filter::All, params.skip, params.limit)
        .await?;
    let total = currencies.count(Filter::All).await?;
    Ok(page("Currencies fetched", items, total))
}

pub async fn get_currency(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(ok("Currency fetched", state.services.currencies.get(&id).await?))
}

pub async fn create_currency(
    State(state): State<AppState>,
    ValidatedJson(new): ValidatedJson<NewCurrency>,
) -> Result<Response, ServiceError> {
    let currency = state.services.currencies.create(new.into_currency()).await?;
    Ok(created("Currency created", currency))
}

pub async fn update_currency(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateCurrency>,
) -> Result<Response, ServiceError> {
    let currency = state
        .services
        .currencies
        .update(&id, |currency| {
            update.apply(currency);
            Ok(())
        })
        .await?;
    Ok(ok("Currency updated", currency))
}

pub async fn delete_currency(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    state.services.currencies.delete(&id).await?;
    Ok(ok("Currency deleted", ()))
}

pub async fn list_pairs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let pairs = &state.services.pairs;
    let items = pairs.fetch_all(params.skip, params.limit).await?;
    let total = pairs.count().await?;
    Ok(page("Pairs fetched", items, total))
}

pub async fn get_pair(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(ok("Pair fetched", state.services.pairs.get(&id).await?))
}

pub async fn create_pair(
    State(state): State<AppState>,
    ValidatedJson(new): ValidatedJson<NewPair>,
) -> Result<Response, ServiceError> {
    Ok(created("Pair created", state.services.pairs.create(new).await?))
}

pub async fn update_pair(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdatePair>,
) -> Result<Response, ServiceError> {
    Ok(ok("Pair updated", state.services.pairs.update(&id, update).await?))
}

pub async fn delete_pair(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    state.services.pairs.delete(&id).await?;
    Ok(ok("Pair deleted", ()))
}

/// Plans open for investment.
pub async fn list_active_plans(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    list_plans_where(&state, true, &params).await
}

pub async fn list_plans(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    list_plans_where(&state, false, &params).await
}

async fn list_plans_where(
    state: &AppState,
    active_only: bool,
    params: &ListParams,
) -> Result<Response, ServiceError> {
    let plans = &state.services.plans;
    let items = plans
        .fetch_all(active_only, params.skip, params.limit)
        .await?;
    let total = plans.count(active_only).await?;
    Ok(page("Plans fetched", items, total))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(ok("Plan fetched", state.services.plans.get(&id).await?))
}

pub async fn create_plan(
    State(state): State<AppState>,
    ValidatedJson(new): ValidatedJson<NewPlan>,
) -> Result<Response, ServiceError> {
    Ok(created("Plan created", state.services.plans.create(new).await?))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdatePlan>,
) -> Result<Response, ServiceError> {
    Ok(ok("Plan updated", state.services.plans.update(&id, update).await?))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    state.services.plans.delete(&id).await?;
    Ok(ok("Plan deleted", ()))
}
