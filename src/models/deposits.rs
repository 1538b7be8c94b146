use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{methods::DepositMethod, users::UserSummary, AccountType};
use crate::repositories::Document;
use crate::services::ServiceError;
use crate::validation::{Checks, Validate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DepositStatus {
    Pending,
    Approved,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub method_id: Uuid,
    pub amount: Decimal,
    pub fee: Decimal,
    pub account: AccountType,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deposit {
    /// What lands in the user's balance once approved.
    pub fn net_amount(&self) -> Decimal {
        self.amount - self.fee
    }
}

impl Document for Deposit {
    const COLLECTION: &'static str = "deposits";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositView {
    #[serde(flatten)]
    pub deposit: Deposit,
    pub user: Option<UserSummary>,
    pub method: Option<DepositMethod>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeposit {
    pub method_id: Uuid,
    pub amount: Decimal,
}

impl Validate for NewDeposit {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new().positive("amount", self.amount).finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateDepositStatus {
    pub status: DepositStatus,
}

impl Validate for UpdateDepositStatus {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .check(
                self.status != DepositStatus::Pending,
                "status",
                "status must be APPROVED or CANCELLED",
            )
            .finish()
    }
}
