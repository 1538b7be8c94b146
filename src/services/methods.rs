use std::{collections::HashMap, sync::Arc};

use uuid::Uuid;

use super::{catalog::CatalogService, ServiceError};
use crate::models::{
    currencies::Currency,
    methods::{MethodStatus, MethodView, PaymentMethod},
};
use crate::repositories::{Filter, Repository, Store};

/// Deposit or withdrawal methods, each tied to an existing currency.
pub struct MethodService<M> {
    methods: CatalogService<M>,
    currencies: Repository<Currency>,
}

impl<M: PaymentMethod> MethodService<M> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        MethodService {
            methods: CatalogService::new(store.clone()),
            currencies: Repository::new(store),
        }
    }

    async fn ensure_currency(&self, method: &M) -> Result<(), ServiceError> {
        self.currencies
            .get(method.details().currency_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound("Currency not found".to_string()))
    }

    fn filter(enabled_only: bool) -> Filter {
        if enabled_only {
            Filter::eq("status", MethodStatus::Enabled)
        } else {
            Filter::All
        }
    }

    async fn views(&self, methods: Vec<M>) -> Result<Vec<MethodView<M>>, ServiceError> {
        let currencies = self
            .currencies
            .populate(methods.iter().map(|m| m.details().currency_id))
            .await?;

        Ok(methods
            .into_iter()
            .map(|method| MethodView {
                currency: currencies.get(&method.details().currency_id).cloned(),
                method,
            })
            .collect())
    }

    async fn view(&self, method: M) -> Result<MethodView<M>, ServiceError> {
        self.views(vec![method])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("{} not found", M::LABEL)))
    }

    pub async fn create(&self, method: M) -> Result<MethodView<M>, ServiceError> {
        self.ensure_currency(&method).await?;
        let method = self.methods.create(method).await?;
        self.view(method).await
    }

    pub async fn update<F>(&self, id: &str, apply: F) -> Result<MethodView<M>, ServiceError>
    where
        F: FnOnce(&mut M) -> Result<(), ServiceError>,
    {
        let mut method = self.methods.get(id).await?;
        apply(&mut method)?;
        self.ensure_currency(&method).await?;
        let method = self.methods.replace(&method).await?;
        self.view(method).await
    }

    pub async fn get(&self, id: &str) -> Result<MethodView<M>, ServiceError> {
        let method = self.methods.get(id).await?;
        self.view(method).await
    }

    /// The method a user picked, which must be enabled.
    pub async fn usable(&self, id: Uuid) -> Result<M, ServiceError> {
        let method = self.methods.get_by_uuid(id).await?;
        if method.details().status != MethodStatus::Enabled {
            return Err(ServiceError::BadRequest(format!(
                "{} is disabled",
                M::LABEL
            )));
        }
        Ok(method)
    }

    /// Resolves references from deposits or withdrawals, deleted methods included.
    pub async fn fetch_by_ids(
        &self,
        ids: impl IntoIterator<Item = Uuid>,
    ) -> Result<HashMap<Uuid, M>, ServiceError> {
        Ok(self.methods.repository().populate(ids).await?)
    }

    pub async fn fetch_all(
        &self,
        enabled_only: bool,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<MethodView<M>>, ServiceError> {
        let methods = self
            .methods
            .fetch_all(Self::filter(enabled_only), skip, limit)
            .await?;
        self.views(methods).await
    }

    pub async fn count(&self, enabled_only: bool) -> Result<u64, ServiceError> {
        self.methods.count(Self::filter(enabled_only)).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.methods.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::currencies::NewCurrency;
    use crate::models::methods::{NewMethod, UpdateMethod};
    use crate::services::testing;
    use rust_decimal_macros::dec;

    fn new_method(currency_id: Uuid, network: &str) -> NewMethod {
        NewMethod {
            currency_id,
            network: network.to_string(),
            fee: dec!(1),
            min_amount: dec!(10),
            status: None,
            price: None,
            auto_update: false,
            address: Some("bc1qexample".to_string()),
        }
    }

    #[tokio::test]
    async fn methods_are_unique_per_currency_and_network() {
        let (services, _, _mail) = testing::services();
        let usdt = services
            .currencies
            .create(
                NewCurrency {
                    name: "tether".to_string(),
                    symbol: "USDT".to_string(),
                    logo: None,
                }
                .into_currency(),
            )
            .await
            .unwrap();

        let trc20 = services
            .deposit_methods
            .create(new_method(usdt.id, "TRC20").into_deposit_method())
            .await
            .unwrap();
        assert_eq!(trc20.currency.unwrap().symbol, "USDT");

        let duplicate = services
            .deposit_methods
            .create(new_method(usdt.id, "TRC20").into_deposit_method())
            .await;
        assert!(matches!(duplicate, Err(ServiceError::Conflict(_))));

        services
            .deposit_methods
            .create(new_method(usdt.id, "ERC20").into_deposit_method())
            .await
            .unwrap();

        // Same key is free for the other method kind.
        services
            .withdrawal_methods
            .create(new_method(usdt.id, "TRC20").into_withdrawal_method())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disabled_methods_are_hidden_and_unusable() {
        let (services, _, _mail) = testing::services();
        let btc = services
            .currencies
            .create(
                NewCurrency {
                    name: "bitcoin".to_string(),
                    symbol: "BTC".to_string(),
                    logo: None,
                }
                .into_currency(),
            )
            .await
            .unwrap();
        let view = services
            .deposit_methods
            .create(new_method(btc.id, "bitcoin").into_deposit_method())
            .await
            .unwrap();

        let disable = UpdateMethod {
            status: Some(MethodStatus::Disabled),
            ..Default::default()
        };
        services
            .deposit_methods
            .update(&view.method.id.to_string(), |m| {
                disable.apply(&mut m.details);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(services.deposit_methods.count(true).await.unwrap(), 0);
        assert_eq!(services.deposit_methods.count(false).await.unwrap(), 1);
        assert!(matches!(
            services.deposit_methods.usable(view.method.id).await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn unknown_currency_is_rejected() {
        let (services, _, _mail) = testing::services();
        let result = services
            .withdrawal_methods
            .create(new_method(Uuid::new_v4(), "bitcoin").into_withdrawal_method())
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
