use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repositories::{Document, Filter};
use crate::services::{catalog::Catalogued, ServiceError};
use crate::validation::{Checks, Validate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Active,
    Suspended,
    OnMaintenance,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    /// Identifier of the trading engine that runs the plan.
    pub engine: String,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Percentages of the invested amount.
    pub min_profit_rate: Decimal,
    pub max_profit_rate: Decimal,
    pub duration_hours: u32,
    pub assets: Vec<Uuid>,
    pub status: PlanStatus,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn accepts(&self, amount: Decimal) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }
}

impl Document for Plan {
    const COLLECTION: &'static str = "plans";
    const SOFT_DELETE: bool = true;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Catalogued for Plan {
    const LABEL: &'static str = "Plan";

    fn unique_filter(&self) -> Filter {
        Filter::eq("name", &self.name)
    }
}

fn check_bounds(checks: Checks, plan: &Plan) -> Checks {
    checks
        .positive("minAmount", plan.min_amount)
        .check(
            plan.min_amount <= plan.max_amount,
            "maxAmount",
            "maxAmount must not be below minAmount",
        )
        .non_negative("minProfitRate", plan.min_profit_rate)
        .check(
            plan.min_profit_rate <= plan.max_profit_rate,
            "maxProfitRate",
            "maxProfitRate must not be below minProfitRate",
        )
        .check(plan.duration_hours > 0, "durationHours", "durationHours must be greater than zero")
}

/// Re-checks amount and rate bounds after an update has been applied.
pub fn validate_plan(plan: &Plan) -> Result<(), ServiceError> {
    check_bounds(Checks::new(), plan).finish()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    pub name: String,
    pub engine: String,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub min_profit_rate: Decimal,
    pub max_profit_rate: Decimal,
    pub duration_hours: u32,
    #[serde(default)]
    pub assets: Vec<Uuid>,
    pub status: Option<PlanStatus>,
}

impl NewPlan {
    pub fn into_plan(self) -> Plan {
        let now = Utc::now();
        Plan {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            engine: self.engine.trim().to_string(),
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            min_profit_rate: self.min_profit_rate,
            max_profit_rate: self.max_profit_rate,
            duration_hours: self.duration_hours,
            assets: self.assets,
            status: self.status.unwrap_or(PlanStatus::Active),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Validate for NewPlan {
    fn validate(&self) -> Result<(), ServiceError> {
        let preview = self.clone().into_plan();
        let checks = Checks::new()
            .required("name", &self.name)
            .required("engine", &self.engine);
        check_bounds(checks, &preview).finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlan {
    pub name: Option<String>,
    pub engine: Option<String>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub min_profit_rate: Option<Decimal>,
    pub max_profit_rate: Option<Decimal>,
    pub duration_hours: Option<u32>,
    pub assets: Option<Vec<Uuid>>,
    pub status: Option<PlanStatus>,
}

impl UpdatePlan {
    pub fn apply(self, plan: &mut Plan) {
        if let Some(name) = self.name {
            plan.name = name.trim().to_string();
        }
        if let Some(engine) = self.engine {
            plan.engine = engine.trim().to_string();
        }
        if let Some(min_amount) = self.min_amount {
            plan.min_amount = min_amount;
        }
        if let Some(max_amount) = self.max_amount {
            plan.max_amount = max_amount;
        }
        if let Some(rate) = self.min_profit_rate {
            plan.min_profit_rate = rate;
        }
        if let Some(rate) = self.max_profit_rate {
            plan.max_profit_rate = rate;
        }
        if let Some(hours) = self.duration_hours {
            plan.duration_hours = hours;
        }
        if let Some(assets) = self.assets {
            plan.assets = assets;
        }
        if let Some(status) = self.status {
            plan.status = status;
        }
    }
}

impl Validate for UpdatePlan {
    fn validate(&self) -> Result<(), ServiceError> {
        let mut checks = Checks::new();
        if let Some(name) = &self.name {
            checks = checks.required("name", name);
        }
        if let Some(engine) = &self.engine {
            checks = checks.required("engine", engine);
        }
        checks.finish()
    }
}
