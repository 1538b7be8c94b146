use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{users::UserSummary, AccountType};
use crate::repositories::Document;
use crate::services::ServiceError;
use crate::validation::{Checks, Validate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferStatus {
    Pending,
    Successful,
    Reversed,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub amount: Decimal,
    pub fee: Decimal,
    /// Sender's account debited; the recipient is always credited on main.
    pub account: AccountType,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    pub fn total(&self) -> Decimal {
        self.amount + self.fee
    }
}

impl Document for Transfer {
    const COLLECTION: &'static str = "transfers";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferView {
    #[serde(flatten)]
    pub transfer: Transfer,
    pub sender: Option<UserSummary>,
    pub recipient: Option<UserSummary>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewTransfer {
    /// Recipient's username.
    pub username: String,
    pub amount: Decimal,
    #[serde(default)]
    pub account: AccountType,
}

impl Validate for NewTransfer {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("username", &self.username)
            .positive("amount", self.amount)
            .check(
                matches!(self.account, AccountType::Main | AccountType::Referral),
                "account",
                "transfers are only possible from the main or referral account",
            )
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateTransferStatus {
    pub status: TransferStatus,
}

impl Validate for UpdateTransferStatus {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .check(
                self.status != TransferStatus::Pending,
                "status",
                "status must be SUCCESSFUL or REVERSED",
            )
            .finish()
    }
}
