use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::assets::Asset;
use crate::repositories::{Document, Filter};
use crate::services::{catalog::Catalogued, ServiceError};
use crate::validation::{Checks, Validate};

/// Tradable combination of two assets.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub id: Uuid,
    pub base_asset_id: Uuid,
    pub quote_asset_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Pair {
    const COLLECTION: &'static str = "pairs";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Catalogued for Pair {
    const LABEL: &'static str = "Pair";

    fn unique_filter(&self) -> Filter {
        Filter::eq("baseAssetId", self.base_asset_id)
            .and(Filter::eq("quoteAssetId", self.quote_asset_id))
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairView {
    #[serde(flatten)]
    pub pair: Pair,
    pub base_asset: Option<Asset>,
    pub quote_asset: Option<Asset>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPair {
    pub base_asset_id: Uuid,
    pub quote_asset_id: Uuid,
}

impl NewPair {
    pub fn into_pair(self) -> Pair {
        let now = Utc::now();
        Pair {
            id: Uuid::new_v4(),
            base_asset_id: self.base_asset_id,
            quote_asset_id: self.quote_asset_id,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Validate for NewPair {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .check(
                self.base_asset_id != self.quote_asset_id,
                "quoteAssetId",
                "base and quote assets must differ",
            )
            .finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePair {
    pub base_asset_id: Option<Uuid>,
    pub quote_asset_id: Option<Uuid>,
}

impl UpdatePair {
    pub fn apply(self, pair: &mut Pair) {
        if let Some(base) = self.base_asset_id {
            pair.base_asset_id = base;
        }
        if let Some(quote) = self.quote_asset_id {
            pair.quote_asset_id = quote;
        }
    }
}

impl Validate for UpdatePair {
    fn validate(&self) -> Result<(), ServiceError> {
        let same = matches!(
            (self.base_asset_id, self.quote_asset_id),
            (Some(base), Some(quote)) if base == quote
        );
        Checks::new()
            .check(!same, "quoteAssetId", "base and quote assets must differ")
            .finish()
    }
}
