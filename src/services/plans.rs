use std::sync::Arc;

use uuid::Uuid;

use super::{catalog::CatalogService, ServiceError};
use crate::models::{
    assets::Asset,
    plans::{validate_plan, NewPlan, Plan, PlanStatus, UpdatePlan},
};
use crate::repositories::{Filter, Repository, Store};

pub struct PlanService {
    plans: CatalogService<Plan>,
    assets: Repository<Asset>,
}

impl PlanService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        PlanService {
            plans: CatalogService::new(store.clone()),
            assets: Repository::new(store),
        }
    }

    async fn ensure_assets(&self, plan: &Plan) -> Result<(), ServiceError> {
        let mut wanted = plan.assets.clone();
        wanted.sort();
        wanted.dedup();
        if wanted.is_empty() {
            return Ok(());
        }

        let found = self
            .assets
            .query(Filter::is_in("id", wanted.iter().copied()))
            .count()
            .await?;
        if found < wanted.len() as u64 {
            return Err(ServiceError::NotFound("Asset not found".to_string()));
        }
        Ok(())
    }

    fn filter(active_only: bool) -> Filter {
        if active_only {
            Filter::eq("status", PlanStatus::Active)
        } else {
            Filter::All
        }
    }

    pub async fn create(&self, new: NewPlan) -> Result<Plan, ServiceError> {
        let plan = new.into_plan();
        self.ensure_assets(&plan).await?;
        self.plans.create(plan).await
    }

    pub async fn update(&self, id: &str, update: UpdatePlan) -> Result<Plan, ServiceError> {
        let mut plan = self.plans.get(id).await?;
        update.apply(&mut plan);
        validate_plan(&plan)?;
        self.ensure_assets(&plan).await?;
        self.plans.replace(&plan).await
    }

    pub async fn get(&self, id: &str) -> Result<Plan, ServiceError> {
        self.plans.get(id).await
    }

    /// The plan an investment is being placed in, which must be open.
    pub async fn investable(&self, id: Uuid) -> Result<Plan, ServiceError> {
        let plan = self.plans.get_by_uuid(id).await?;
        if plan.status != PlanStatus::Active {
            return Err(ServiceError::BadRequest(
                "Plan is not accepting investments".to_string(),
            ));
        }
        Ok(plan)
    }

    pub async fn fetch_all(
        &self,
        active_only: bool,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<Plan>, ServiceError> {
        self.plans
            .fetch_all(Self::filter(active_only), skip, limit)
            .await
    }

    pub async fn count(&self, active_only: bool) -> Result<u64, ServiceError> {
        self.plans.count(Self::filter(active_only)).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.plans.delete(id).await
    }
}
