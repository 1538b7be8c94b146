use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::currencies::Currency;
use crate::repositories::{Document, Filter};
use crate::services::{catalog::Catalogued, ServiceError};
use crate::validation::{Checks, Validate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MethodStatus {
    Enabled,
    Disabled,
}

/// Fields shared by deposit and withdrawal methods.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDetails {
    pub currency_id: Uuid,
    pub network: String,
    pub fee: Decimal,
    pub min_amount: Decimal,
    pub status: MethodStatus,
    /// Unit price in USD, refreshed by the price task when `auto_update` is set.
    pub price: Decimal,
    pub auto_update: bool,
}

pub trait PaymentMethod: Catalogued {
    fn details(&self) -> &MethodDetails;
    fn details_mut(&mut self) -> &mut MethodDetails;
}

fn method_filter(details: &MethodDetails) -> Filter {
    Filter::eq("currencyId", details.currency_id).and(Filter::eq("network", &details.network))
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositMethod {
    pub id: Uuid,
    #[serde(flatten)]
    pub details: MethodDetails,
    /// Where users send funds.
    pub address: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for DepositMethod {
    const COLLECTION: &'static str = "deposit_methods";
    const SOFT_DELETE: bool = true;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Catalogued for DepositMethod {
    const LABEL: &'static str = "Deposit method";

    fn unique_filter(&self) -> Filter {
        method_filter(&self.details)
    }
}

impl PaymentMethod for DepositMethod {
    fn details(&self) -> &MethodDetails {
        &self.details
    }

    fn details_mut(&mut self) -> &mut MethodDetails {
        &mut self.details
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalMethod {
    pub id: Uuid,
    #[serde(flatten)]
    pub details: MethodDetails,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for WithdrawalMethod {
    const COLLECTION: &'static str = "withdrawal_methods";
    const SOFT_DELETE: bool = true;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Catalogued for WithdrawalMethod {
    const LABEL: &'static str = "Withdrawal method";

    fn unique_filter(&self) -> Filter {
        method_filter(&self.details)
    }
}

impl PaymentMethod for WithdrawalMethod {
    fn details(&self) -> &MethodDetails {
        &self.details
    }

    fn details_mut(&mut self) -> &mut MethodDetails {
        &mut self.details
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodView<M> {
    #[serde(flatten)]
    pub method: M,
    pub currency: Option<Currency>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMethod {
    pub currency_id: Uuid,
    pub network: String,
    pub fee: Decimal,
    pub min_amount: Decimal,
    pub status: Option<MethodStatus>,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub auto_update: bool,
    pub address: Option<String>,
}

impl NewMethod {
    fn details(&self) -> MethodDetails {
        MethodDetails {
            currency_id: self.currency_id,
            network: self.network.trim().to_string(),
            fee: self.fee,
            min_amount: self.min_amount,
            status: self.status.unwrap_or(MethodStatus::Enabled),
            price: self.price.unwrap_or(Decimal::ONE),
            auto_update: self.auto_update,
        }
    }

    pub fn into_deposit_method(self) -> DepositMethod {
        let now = Utc::now();
        DepositMethod {
            id: Uuid::new_v4(),
            details: self.details(),
            address: self.address,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn into_withdrawal_method(self) -> WithdrawalMethod {
        let now = Utc::now();
        WithdrawalMethod {
            id: Uuid::new_v4(),
            details: self.details(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Validate for NewMethod {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("network", &self.network)
            .non_negative("fee", self.fee)
            .non_negative("minAmount", self.min_amount)
            .check(
                self.price.map_or(true, |p| p > Decimal::ZERO),
                "price",
                "price must be greater than zero",
            )
            .finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMethod {
    pub currency_id: Option<Uuid>,
    pub network: Option<String>,
    pub fee: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub status: Option<MethodStatus>,
    pub price: Option<Decimal>,
    pub auto_update: Option<bool>,
    pub address: Option<String>,
}

impl UpdateMethod {
    pub fn apply(&self, details: &mut MethodDetails) {
        if let Some(currency_id) = self.currency_id {
            details.currency_id = currency_id;
        }
        if let Some(network) = &self.network {
            details.network = network.trim().to_string();
        }
        if let Some(fee) = self.fee {
            details.fee = fee;
        }
        if let Some(min_amount) = self.min_amount {
            details.min_amount = min_amount;
        }
        if let Some(status) = self.status {
            details.status = status;
        }
        if let Some(price) = self.price {
            details.price = price;
        }
        if let Some(auto_update) = self.auto_update {
            details.auto_update = auto_update;
        }
    }
}

impl Validate for UpdateMethod {
    fn validate(&self) -> Result<(), ServiceError> {
        let mut checks = Checks::new();
        if let Some(network) = &self.network {
            checks = checks.required("network", network);
        }
        if let Some(fee) = self.fee {
            checks = checks.non_negative("fee", fee);
        }
        if let Some(min_amount) = self.min_amount {
            checks = checks.non_negative("minAmount", min_amount);
        }
        if let Some(price) = self.price {
            checks = checks.positive("price", price);
        }
        checks.finish()
    }
}
