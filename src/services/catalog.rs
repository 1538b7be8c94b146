use std::sync::Arc;

use uuid::Uuid;

use super::ServiceError;
use crate::repositories::{Document, Filter, Repository, Store};

/// Administrator-managed reference data with a uniqueness key.
pub trait Catalogued: Document {
    const LABEL: &'static str;

    /// Matches any other record that would collide with this one.
    fn unique_filter(&self) -> Filter;
}

pub struct CatalogService<T> {
    records: Repository<T>,
}

impl<T: Catalogued> CatalogService<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        CatalogService {
            records: Repository::new(store),
        }
    }

    pub fn repository(&self) -> &Repository<T> {
        &self.records
    }

    /// Fails with `Conflict` when another record shares the key.
    pub async fn ensure_unique(&self, record: &T) -> Result<(), ServiceError> {
        let clash = record
            .unique_filter()
            .and(Filter::ne("id", record.id()));

        if self.records.query(clash).count().await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "{} already exists",
                T::LABEL
            )));
        }
        Ok(())
    }

    pub async fn create(&self, record: T) -> Result<T, ServiceError> {
        self.ensure_unique(&record).await?;
        self.records.insert(&record).await?;
        log::info!("Created {} {}", T::LABEL.to_lowercase(), record.id());
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<T, ServiceError> {
        self.records
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("{} not found", T::LABEL)))
    }

    pub async fn get_by_uuid(&self, id: Uuid) -> Result<T, ServiceError> {
        self.records
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("{} not found", T::LABEL)))
    }

    /// Loads the record, lets `apply` mutate it, re-checks uniqueness
    /// against every other record and persists the result.
    pub async fn update<F>(&self, id: &str, apply: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut T) -> Result<(), ServiceError>,
    {
        let mut record = self.get(id).await?;
        apply(&mut record)?;
        self.replace(&record).await
    }

    /// Persists an already modified record after re-checking uniqueness.
    pub async fn replace(&self, record: &T) -> Result<T, ServiceError> {
        self.ensure_unique(record).await?;
        Ok(self.records.save(record).await?)
    }

    pub async fn fetch_all(
        &self,
        filter: Filter,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<T>, ServiceError> {
        Ok(self
            .records
            .query(filter)
            .newest_first()
            .skip(skip)
            .limit(limit)
            .all()
            .await?)
    }

    pub async fn count(&self, filter: Filter) -> Result<u64, ServiceError> {
        Ok(self.records.query(filter).count().await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let record = self.get(id).await?;
        if !self.records.delete(record.id()).await? {
            return Err(ServiceError::NotFound(format!("{} not found", T::LABEL)));
        }
        log::info!("Deleted {} {}", T::LABEL.to_lowercase(), record.id());
        Ok(())
    }
}
