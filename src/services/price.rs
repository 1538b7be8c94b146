use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{
    currencies::Currency,
    methods::{DepositMethod, PaymentMethod, WithdrawalMethod},
};
use crate::repositories::{Filter, Repository, Store};

/// Keeps the USD price of auto-updating payment methods in line with a
/// CoinGecko-compatible `simple/price` endpoint. Currencies are looked up
/// by name.
#[derive(Clone)]
pub struct PriceFetcher {
    client: reqwest::Client,
    provider_url: String,
    currencies: Repository<Currency>,
    deposit_methods: Repository<DepositMethod>,
    withdrawal_methods: Repository<WithdrawalMethod>,
}

/// Extracts `{ "<id>": { "usd": <price> } }` entries, skipping anything
/// that is not a positive number.
pub fn parse_prices(body: &Value) -> HashMap<String, Decimal> {
    let mut prices = HashMap::new();

    if let Value::Object(entries) = body {
        for (id, entry) in entries {
            let price = match &entry["usd"] {
                Value::Number(n) => Decimal::from_str(&n.to_string())
                    .or_else(|_| Decimal::from_scientific(&n.to_string())),
                _ => continue,
            };

            match price {
                Ok(price) if price > Decimal::ZERO => {
                    prices.insert(id.to_lowercase(), price);
                }
                _ => log::warn!("Ignoring unusable price for {}: {}", id, entry),
            }
        }
    }

    prices
}

async fn apply_prices<M: PaymentMethod>(
    records: &Repository<M>,
    methods: Vec<M>,
    currencies: &HashMap<Uuid, Currency>,
    prices: &HashMap<String, Decimal>,
) -> Result<usize, anyhow::Error> {
    let mut updated = 0;

    for method in methods {
        let details = method.details();
        let price = currencies
            .get(&details.currency_id)
            .and_then(|c| prices.get(&c.name.to_lowercase()));

        match price {
            Some(price) if *price != details.price => {
                let changed = records
                    .transition(
                        method.id(),
                        Filter::eq("autoUpdate", true),
                        json!({ "price": price }),
                    )
                    .await?;
                if changed.is_some() {
                    updated += 1;
                }
            }
            Some(_) => {}
            None => log::debug!("No price for method {}", method.id()),
        }
    }

    Ok(updated)
}

impl PriceFetcher {
    pub fn new(store: Arc<dyn Store>, provider_url: &str) -> Self {
        PriceFetcher {
            client: reqwest::Client::new(),
            provider_url: provider_url.trim_end_matches('/').to_string(),
            currencies: Repository::new(store.clone()),
            deposit_methods: Repository::new(store.clone()),
            withdrawal_methods: Repository::new(store),
        }
    }

    pub async fn start_price_fetch_task(&self, period: Duration) {
        let fetcher = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                match fetcher.refresh_prices().await {
                    Ok(updated) => {
                        log::info!("Refreshed prices, {} methods updated.", updated)
                    }
                    Err(e) => {
                        log::error!("Error refreshing method prices: {}", e);
                    }
                }
            }
        });

        log::info!("Price fetch task started");
    }

    async fn fetch_prices(&self, ids: &[String]) -> Result<HashMap<String, Decimal>, anyhow::Error> {
        let body: Value = self
            .client
            .get(format!("{}/api/v3/simple/price", self.provider_url))
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        log::debug!("Fetched prices: {:?}", body);
        Ok(parse_prices(&body))
    }

    pub async fn refresh_prices(&self) -> Result<usize, anyhow::Error> {
        let auto = Filter::eq("autoUpdate", true);
        let deposit_methods = self.deposit_methods.query(auto.clone()).all().await?;
        let withdrawal_methods = self.withdrawal_methods.query(auto).all().await?;

        let currency_ids = deposit_methods
            .iter()
            .map(|m| m.details.currency_id)
            .chain(withdrawal_methods.iter().map(|m| m.details.currency_id));
        let currencies = self.currencies.populate(currency_ids).await?;

        let mut names: Vec<String> = currencies
            .values()
            .filter(|c| !c.is_deleted)
            .map(|c| c.name.to_lowercase())
            .collect();
        names.sort();
        names.dedup();
        if names.is_empty() {
            return Ok(0);
        }

        let prices = self.fetch_prices(&names).await?;

        let updated = apply_prices(&self.deposit_methods, deposit_methods, &currencies, &prices)
            .await?
            + apply_prices(
                &self.withdrawal_methods,
                withdrawal_methods,
                &currencies,
                &prices,
            )
            .await?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{currencies::NewCurrency, methods::NewMethod};
    use crate::repositories::memory::MemoryStore;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_provider_response() {
        let body = json!({
            "bitcoin": { "usd": 64250.5 },
            "Tether": { "usd": 1 },
            "dead-coin": { "usd": 0 },
            "broken": { "eur": 3 }
        });

        let prices = parse_prices(&body);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["bitcoin"], dec!(64250.5));
        assert_eq!(prices["tether"], dec!(1));
    }

    #[tokio::test]
    async fn applies_prices_only_to_auto_updating_methods() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let currency = NewCurrency {
            name: "Bitcoin".to_string(),
            symbol: "BTC".to_string(),
            logo: None,
        }
        .into_currency();
        Repository::<Currency>::new(store.clone())
            .insert(&currency)
            .await
            .unwrap();

        let methods = Repository::<DepositMethod>::new(store);
        let method = |auto_update| {
            NewMethod {
                currency_id: currency.id,
                network: "bitcoin".to_string(),
                fee: dec!(0),
                min_amount: dec!(0),
                status: None,
                price: None,
                auto_update,
                address: None,
            }
            .into_deposit_method()
        };
        let (auto, manual) = (method(true), method(false));
        methods.insert(&auto).await.unwrap();
        methods.insert(&manual).await.unwrap();

        let currencies = HashMap::from([(currency.id, currency.clone())]);
        let prices = HashMap::from([("bitcoin".to_string(), dec!(60000))]);
        let updated = apply_prices(&methods, vec![auto.clone(), manual.clone()], &currencies, &prices)
            .await
            .unwrap();

        assert_eq!(updated, 1);
        let stored = methods.get(auto.id).await.unwrap().unwrap();
        assert_eq!(stored.details.price, dec!(60000));
        let untouched = methods.get(manual.id).await.unwrap().unwrap();
        assert_eq!(untouched.details.price, dec!(1));
    }
}
