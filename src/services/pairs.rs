use std::sync::Arc;

use super::{catalog::CatalogService, ServiceError};
use crate::models::{
    assets::Asset,
    pairs::{NewPair, Pair, PairView, UpdatePair},
};
use crate::repositories::{Filter, Repository, Store};

pub struct PairService {
    pairs: CatalogService<Pair>,
    assets: Repository<Asset>,
}

impl PairService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        PairService {
            pairs: CatalogService::new(store.clone()),
            assets: Repository::new(store),
        }
    }

    async fn ensure_assets(&self, pair: &Pair) -> Result<(), ServiceError> {
        if pair.base_asset_id == pair.quote_asset_id {
            return Err(ServiceError::BadRequest(
                "base and quote assets must differ".to_string(),
            ));
        }

        let found = self
            .assets
            .query(Filter::is_in("id", [pair.base_asset_id, pair.quote_asset_id]))
            .count()
            .await?;
        if found < 2 {
            return Err(ServiceError::NotFound("Asset not found".to_string()));
        }
        Ok(())
    }

    async fn views(&self, pairs: Vec<Pair>) -> Result<Vec<PairView>, ServiceError> {
        let assets = self
            .assets
            .populate(
                pairs
                    .iter()
                    .flat_map(|p| [p.base_asset_id, p.quote_asset_id]),
            )
            .await?;

        Ok(pairs
            .into_iter()
            .map(|pair| PairView {
                base_asset: assets.get(&pair.base_asset_id).cloned(),
                quote_asset: assets.get(&pair.quote_asset_id).cloned(),
                pair,
            })
            .collect())
    }

    async fn view(&self, pair: Pair) -> Result<PairView, ServiceError> {
        self.views(vec![pair])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Pair not found".to_string()))
    }

    pub async fn create(&self, new: NewPair) -> Result<PairView, ServiceError> {
        let pair = new.into_pair();
        self.ensure_assets(&pair).await?;
        let pair = self.pairs.create(pair).await?;
        self.view(pair).await
    }

    pub async fn update(&self, id: &str, update: UpdatePair) -> Result<PairView, ServiceError> {
        let mut pair = self.pairs.get(id).await?;
        update.apply(&mut pair);
        self.ensure_assets(&pair).await?;
        let pair = self.pairs.replace(&pair).await?;
        self.view(pair).await
    }

    pub async fn get(&self, id: &str) -> Result<PairView, ServiceError> {
        let pair = self.pairs.get(id).await?;
        self.view(pair).await
    }

    pub async fn fetch_all(
        &self,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<PairView>, ServiceError> {
        let pairs = self.pairs.fetch_all(Filter::All, skip, limit).await?;
        self.views(pairs).await
    }

    pub async fn count(&self) -> Result<u64, ServiceError> {
        self.pairs.count(Filter::All).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.pairs.delete(id).await
    }
}
