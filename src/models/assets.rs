use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repositories::{Document, Filter};
use crate::services::{catalog::Catalogued, ServiceError};
use crate::validation::{Checks, Validate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Crypto,
    Forex,
    Stock,
    Commodity,
    Index,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub name: String,
    pub symbol: String,
    pub logo: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Asset {
    const COLLECTION: &'static str = "assets";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Catalogued for Asset {
    const LABEL: &'static str = "Asset";

    fn unique_filter(&self) -> Filter {
        Filter::any(vec![
            Filter::eq("name", &self.name),
            Filter::eq("symbol", &self.symbol),
        ])
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewAsset {
    pub name: String,
    pub symbol: String,
    pub logo: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
}

impl NewAsset {
    pub fn into_asset(self) -> Asset {
        let now = Utc::now();
        Asset {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            symbol: self.symbol.trim().to_string(),
            logo: self.logo,
            asset_type: self.asset_type,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Validate for NewAsset {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("name", &self.name)
            .length("symbol", &self.symbol, 1, 16)
            .finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateAsset {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub logo: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
}

impl UpdateAsset {
    pub fn apply(self, asset: &mut Asset) {
        if let Some(name) = self.name {
            asset.name = name.trim().to_string();
        }
        if let Some(symbol) = self.symbol {
            asset.symbol = symbol.trim().to_string();
        }
        if let Some(logo) = self.logo {
            asset.logo = Some(logo);
        }
        if let Some(asset_type) = self.asset_type {
            asset.asset_type = asset_type;
        }
    }
}

impl Validate for UpdateAsset {
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
