use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{methods::WithdrawalMethod, users::UserSummary, AccountType};
use crate::repositories::Document;
use crate::services::ServiceError;
use crate::validation::{Checks, Validate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub method_id: Uuid,
    pub amount: Decimal,
    pub fee: Decimal,
    /// Destination wallet address.
    pub address: String,
    pub account: AccountType,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Total taken from the user's balance once approved.
    pub fn total(&self) -> Decimal {
        self.amount + self.fee
    }
}

impl Document for Withdrawal {
    const COLLECTION: &'static str = "withdrawals";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalView {
    #[serde(flatten)]
    pub withdrawal: Withdrawal,
    pub user: Option<UserSummary>,
    pub method: Option<WithdrawalMethod>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWithdrawal {
    pub method_id: Uuid,
    pub amount: Decimal,
    pub address: String,
    #[serde(default)]
    pub account: AccountType,
}

impl Validate for NewWithdrawal {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .positive("amount", self.amount)
            .required("address", &self.address)
            .check(
                matches!(self.account, AccountType::Main | AccountType::Referral),
                "account",
                "withdrawals are only possible from the main or referral account",
            )
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateWithdrawalStatus {
    pub status: WithdrawalStatus,
}

impl Validate for UpdateWithdrawalStatus {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .check(
                self.status != WithdrawalStatus::Pending,
                "status",
                "status must be APPROVED or CANCELLED",
            )
            .finish()
    }
}
