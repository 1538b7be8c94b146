use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use super::extract::ValidatedJson;
use super::response::{created, ok, page};
use super::AppState;
use crate::models::methods::{DepositMethod, NewMethod, PaymentMethod, UpdateMethod, WithdrawalMethod};
use crate::models::ListParams;
use crate::services::{methods::MethodService, ServiceError, ServiceManager};

/// Ties a method type to its service and request shapes so both method
/// families share one set of handlers.
pub trait MethodEndpoint: PaymentMethod {
    const PLURAL: &'static str;

    fn service(services: &ServiceManager) -> &MethodService<Self>;
    fn from_request(new: NewMethod) -> Self;

    fn apply(&mut self, update: UpdateMethod) {
        update.apply(self.details_mut());
    }
}

impl MethodEndpoint for DepositMethod {
    const PLURAL: &'static str = "Deposit methods";

    fn service(services: &ServiceManager) -> &MethodService<Self> {
        &services.deposit_methods
    }

    fn from_request(new: NewMethod) -> Self {
        new.into_deposit_method()
    }

    fn apply(&mut self, update: UpdateMethod) {
        update.apply(&mut self.details);
        if let Some(address) = update.address {
            self.address = Some(address.trim().to_string());
        }
    }
}

impl MethodEndpoint for WithdrawalMethod {
    const PLURAL: &'static str = "Withdrawal methods";

    fn service(services: &ServiceManager) -> &MethodService<Self> {
        &services.withdrawal_methods
    }

    fn from_request(new: NewMethod) -> Self {
        new.into_withdrawal_method()
    }
}

async fn list_where<M: MethodEndpoint>(
    state: &AppState,
    enabled_only: bool,
    params: &ListParams,
) -> Result<Response, ServiceError> {
    let service = M::service(&state.services);
    let items = service
        .fetch_all(enabled_only, params.skip, params.limit)
        .await?;
    let total = service.count(enabled_only).await?;
    Ok(page(&format!("{} fetched", M::PLURAL), items, total))
}

/// Methods users can currently pick.
pub async fn list_enabled<M: MethodEndpoint>(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    list_where::<M>(&state, true, &params).await
}

pub async fn list<M: MethodEndpoint>(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    list_where::<M>(&state, false, &params).await
}

pub async fn get<M: MethodEndpoint>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let method = M::service(&state.services).get(&id).await?;
    Ok(ok(&format!("{} fetched", M::LABEL), method))
}

pub async fn create<M: MethodEndpoint>(
    State(state): State<AppState>,
    ValidatedJson(new): ValidatedJson<NewMethod>,
) -> Result<Response, ServiceError> {
    let method = M::service(&state.services)
        .create(M::from_request(new))
        .await?;
    Ok(created(&format!("{} created", M::LABEL), method))
}

pub async fn update<M: MethodEndpoint>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(update): ValidatedJson<UpdateMethod>,
) -> Result<Response, ServiceError> {
    let method = M::service(&state.services)
        .update(&id, |method| {
            method.apply(update);
            Ok(())
        })
        .await?;
    Ok(ok(&format!("{} updated", M::LABEL), method))
}

pub async fn delete<M: MethodEndpoint>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    M::service(&state.services).delete(&id).await?;
    Ok(ok(&format!("{} deleted", M::LABEL), ()))
}
