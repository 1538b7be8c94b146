use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repositories::Document;
use crate::services::ServiceError;
use crate::validation::{Checks, Validate};

/// Configuration document that exists exactly once under a well-known id.
pub trait Singleton: Document + Default {
    const ID: Uuid;
}

/// Percentages paid to a referrer when a referred user acts.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSettings {
    pub id: Uuid,
    pub deposit: Decimal,
    pub stake: Decimal,
    pub investment: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ReferralSettings {
    fn default() -> Self {
        let now = Utc::now();
        ReferralSettings {
            id: Self::ID,
            deposit: Decimal::ZERO,
            stake: Decimal::ZERO,
            investment: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Document for ReferralSettings {
    const COLLECTION: &'static str = "referral_settings";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Singleton for ReferralSettings {
    const ID: Uuid = Uuid::from_u128(0x5e77_1a65_0000_4000_8000_0000_0000_0001);
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSettings {
    pub id: Uuid,
    /// Percentage of the transferred amount charged to the sender.
    pub fee: Decimal,
    pub approval_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        let now = Utc::now();
        TransferSettings {
            id: Self::ID,
            fee: Decimal::ZERO,
            approval_required: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Document for TransferSettings {
    const COLLECTION: &'static str = "transfer_settings";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Singleton for TransferSettings {
    const ID: Uuid = Uuid::from_u128(0x5e77_1a65_0000_4000_8000_0000_0000_0002);
}

fn percentage(checks: Checks, field: &str, value: Option<Decimal>) -> Checks {
    match value {
        Some(value) => checks.check(
            value >= Decimal::ZERO && value <= Decimal::ONE_HUNDRED,
            field,
            &format!("{} must be between 0 and 100", field),
        ),
        None => checks,
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateReferralSettings {
    pub deposit: Option<Decimal>,
    pub stake: Option<Decimal>,
    pub investment: Option<Decimal>,
}

impl UpdateReferralSettings {
    pub fn apply(self, settings: &mut ReferralSettings) {
        if let Some(deposit) = self.deposit {
            settings.deposit = deposit;
        }
        if let Some(stake) = self.stake {
            settings.stake = stake;
        }
        if let Some(investment) = self.investment {
            settings.investment = investment;
        }
    }
}

impl Validate for UpdateReferralSettings {
    fn validate(&self) -> Result<(), ServiceError> {
        let checks = percentage(Checks::new(), "deposit", self.deposit);
        let checks = percentage(checks, "stake", self.stake);
        percentage(checks, "investment", self.investment).finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransferSettings {
    pub fee: Option<Decimal>,
    pub approval_required: Option<bool>,
}

impl UpdateTransferSettings {
    pub fn apply(self, settings: &mut TransferSettings) {
        if let Some(fee) = self.fee {
            settings.fee = fee;
        }
        if let Some(approval_required) = self.approval_required {
            settings.approval_required = approval_required;
        }
    }
}

impl Validate for UpdateTransferSettings {
    fn validate(&self) -> Result<(), ServiceError> {
        percentage(Checks::new(), "fee", self.fee).finish()
    }
}
