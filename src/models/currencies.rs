use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repositories::{Document, Filter};
use crate::services::{catalog::Catalogued, ServiceError};
use crate::validation::{Checks, Validate};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub id: Uuid,
    /// Also the price provider's coin id, e.g. `bitcoin`.
    pub name: String,
    pub symbol: String,
    pub logo: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Currency {
    const COLLECTION: &'static str = "currencies";
    const SOFT_DELETE: bool = true;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Catalogued for Currency {
    const LABEL: &'static str = "Currency";

    fn unique_filter(&self) -> Filter {
        Filter::any(vec![
            Filter::eq("name", &self.name),
            Filter::eq("symbol", &self.symbol),
        ])
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewCurrency {
    pub name: String,
    pub symbol: String,
    pub logo: Option<String>,
}

impl NewCurrency {
    pub fn into_currency(self) -> Currency {
        let now = Utc::now();
        Currency {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            symbol: self.symbol.trim().to_string(),
            logo: self.logo,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Validate for NewCurrency {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("name", &self.name)
            .length("symbol", &self.symbol, 1, 16)
            .finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateCurrency {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub logo: Option<String>,
}

impl UpdateCurrency {
    pub fn apply(self, currency: &mut Currency) {
        if let Some(name) = self.name {
            currency.name = name.trim().to_string();
        }
        if let Some(symbol) = self.symbol {
            currency.symbol = symbol.trim().to_string();
        }
        if let Some(logo) = self.logo {
            currency.logo = Some(logo);
        }
    }
}

impl Validate for UpdateCurrency {
    fn validate(&self) -> Result<(), ServiceError> {
        let mut checks = Checks::new();
        if let Some(name) = &self.name {
            checks = checks.required("name", name);
        }
        if let Some(symbol) = &self.symbol {
            checks = checks.length("symbol", symbol, 1, 16);
        }
        checks.finish()
    }
}
