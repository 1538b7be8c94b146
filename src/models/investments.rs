use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{plans::Plan, users::UserSummary, AccountType, Environment};
use crate::repositories::Document;
use crate::services::ServiceError;
use crate::validation::{Checks, Validate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvestmentStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount: Decimal,
    pub account: AccountType,
    pub environment: Environment,
    pub status: InvestmentStatus,
    pub profit: Decimal,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Investment {
    const COLLECTION: &'static str = "investments";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentView {
    #[serde(flatten)]
    pub investment: Investment,
    pub user: Option<UserSummary>,
    pub plan: Option<Plan>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvestment {
    pub plan_id: Uuid,
    pub amount: Decimal,
    pub account: Option<AccountType>,
    #[serde(default)]
    pub environment: Environment,
}

impl NewInvestment {
    /// Demo investments always draw from the demo balance.
    pub fn resolved_account(&self) -> AccountType {
        match self.environment {
            Environment::Demo => AccountType::Demo,
            Environment::Live => self.account.unwrap_or(AccountType::Main),
        }
    }
}

impl Validate for NewInvestment {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .positive("amount", self.amount)
            .check(
                self.environment == Environment::Demo || self.account != Some(AccountType::Demo),
                "account",
                "live investments cannot use the demo account",
            )
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvestmentStatus {
    pub status: InvestmentStatus,
    /// Profit percentage applied on completion; defaults to the plan minimum.
    pub profit_rate: Option<Decimal>,
}

impl Validate for UpdateInvestmentStatus {
    fn validate(&self) -> Result<(), ServiceError> {
        let mut checks = Checks::new().check(
            self.status != InvestmentStatus::Pending,
            "status",
            "status must be RUNNING, COMPLETED or CANCELLED",
        );
        if let Some(rate) = self.profit_rate {
            checks = checks.non_negative("profitRate", rate);
        }
        checks.finish()
    }
}
