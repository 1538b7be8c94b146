use std::sync::Arc;

use super::ServiceError;
use crate::models::platform::{
    ReferralSettings, Singleton, TransferSettings, UpdateReferralSettings, UpdateTransferSettings,
};
use crate::repositories::{Repository, Store};

/// Platform-wide settings documents.
pub struct PlatformService {
    referral: Repository<ReferralSettings>,
    transfer: Repository<TransferSettings>,
}

async fn get_or_create<S: Singleton>(records: &Repository<S>) -> Result<S, ServiceError> {
    if let Some(settings) = records.get(S::ID).await? {
        return Ok(settings);
    }

    let defaults = S::default();
    match records.insert(&defaults).await {
        Ok(()) => {
            log::info!("Created default {}", S::COLLECTION);
            Ok(defaults)
        }
        // Lost a race against another first reader.
        Err(e) => records
            .get(S::ID)
            .await?
            .ok_or_else(|| ServiceError::from(e)),
    }
}

impl PlatformService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        PlatformService {
            referral: Repository::new(store.clone()),
            transfer: Repository::new(store),
        }
    }

    pub async fn referral_settings(&self) -> Result<ReferralSettings, ServiceError> {
        get_or_create(&self.referral).await
    }

    pub async fn transfer_settings(&self) -> Result<TransferSettings, ServiceError> {
        get_or_create(&self.transfer).await
    }

    pub async fn update_referral_settings(
        &self,
        update: UpdateReferralSettings,
    ) -> Result<ReferralSettings, ServiceError> {
        let mut settings = self.referral_settings().await?;
        update.apply(&mut settings);
        Ok(self.referral.save(&settings).await?)
    }

    pub async fn update_transfer_settings(
        &self,
        update: UpdateTransferSettings,
    ) -> Result<TransferSettings, ServiceError> {
        let mut settings = self.transfer_settings().await?;
        update.apply(&mut settings);
        Ok(self.transfer.save(&settings).await?)
    }
}
