use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::{
    assets::Asset,
    currencies::Currency,
    methods::{DepositMethod, WithdrawalMethod},
    tokens::{EmailVerification, ResetPassword},
};
use crate::repositories::Store;
use crate::settings::Settings;

pub mod auth;
pub mod catalog;
pub mod deposits;
pub mod investments;
pub mod ledger;
pub mod mail;
pub mod methods;
pub mod notifications;
pub mod pairs;
pub mod plans;
pub mod platform;
pub mod price;
pub mod tokens;
pub mod transfers;
pub mod users;
pub mod withdrawals;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn first_message(errors: &[FieldError]) -> &str {
    errors
        .first()
        .map(|e| e.message.as_str())
        .unwrap_or("Invalid request")
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
    #[error("{}", first_message(.0))]
    Validation(Vec<FieldError>),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl ServiceError {
    /// Failures nobody anticipated; their details never reach the client.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            ServiceError::Database(_) | ServiceError::Communication(_, _)
        )
    }
}

/// Parses a record id taken from a path; malformed ids are simply unknown.
pub fn parse_id(id: &str, label: &str) -> Result<uuid::Uuid, ServiceError> {
    uuid::Uuid::parse_str(id).map_err(|_| ServiceError::NotFound(format!("{} not found", label)))
}

impl From<anyhow::Error> for ServiceError {
    fn from(error: anyhow::Error) -> Self {
        ServiceError::Database(error.to_string())
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Every domain service, wired against one store.
pub struct ServiceManager {
    pub auth: Arc<auth::AuthService>,
    pub users: Arc<users::UserService>,
    pub assets: Arc<catalog::CatalogService<Asset>>,
    pub currencies: Arc<catalog::CatalogService<Currency>>,
    pub pairs: Arc<pairs::PairService>,
    pub deposit_methods: Arc<methods::MethodService<DepositMethod>>,
    pub withdrawal_methods: Arc<methods::MethodService<WithdrawalMethod>>,
    pub plans: Arc<plans::PlanService>,
    pub deposits: Arc<deposits::DepositService>,
    pub withdrawals: Arc<withdrawals::WithdrawalService>,
    pub transfers: Arc<transfers::TransferService>,
    pub investments: Arc<investments::InvestmentService>,
    pub notifications: Arc<notifications::NotificationService>,
    pub platform: Arc<platform::PlatformService>,
    pub mailer: mail::Mailer,
}

impl ServiceManager {
    pub fn new(store: Arc<dyn Store>, settings: &Settings, mailer: mail::Mailer) -> Self {
        let auth = Arc::new(auth::AuthService::new(store.clone(), &settings.auth));
        let notifications = Arc::new(notifications::NotificationService::new(store.clone()));
        let platform = Arc::new(platform::PlatformService::new(store.clone()));
        let ledger = ledger::BalanceLedger::new(store.clone());
        let assets = Arc::new(catalog::CatalogService::new(store.clone()));
        let currencies = Arc::new(catalog::CatalogService::new(store.clone()));

        let verifications = tokens::TokenService::<EmailVerification>::new(
            store.clone(),
            chrono::Duration::minutes(settings.tokens.verification_ttl_minutes),
            &settings.frontend.link,
        );
        let resets = tokens::TokenService::<ResetPassword>::new(
            store.clone(),
            chrono::Duration::minutes(settings.tokens.reset_ttl_minutes),
            &settings.frontend.link,
        );

        let users = Arc::new(users::UserService::new(
            store.clone(),
            auth.clone(),
            verifications,
            resets,
            ledger.clone(),
            mailer.clone(),
            settings.accounts.demo_balance,
        ));

        let deposits = Arc::new(deposits::DepositService::new(
            store.clone(),
            ledger.clone(),
            platform.clone(),
            notifications.clone(),
            mailer.clone(),
        ));
        let withdrawals = Arc::new(withdrawals::WithdrawalService::new(
            store.clone(),
            ledger.clone(),
            notifications.clone(),
            mailer.clone(),
        ));
        let transfers = Arc::new(transfers::TransferService::new(
            store.clone(),
            ledger.clone(),
            platform.clone(),
            notifications.clone(),
            mailer.clone(),
        ));
        let investments = Arc::new(investments::InvestmentService::new(
            store.clone(),
            ledger,
            platform.clone(),
            notifications.clone(),
            mailer.clone(),
        ));

        ServiceManager {
            auth,
            users,
            assets,
            currencies,
            pairs: Arc::new(pairs::PairService::new(store.clone())),
            deposit_methods: Arc::new(methods::MethodService::new(store.clone())),
            withdrawal_methods: Arc::new(methods::MethodService::new(store.clone())),
            plans: Arc::new(plans::PlanService::new(store)),
            deposits,
            withdrawals,
            transfers,
            investments,
            notifications,
            platform,
            mailer,
        }
    }
}

/// Spawns the background services (mail delivery, price refresh).
pub async fn start_services(
    store: Arc<dyn Store>,
    settings: &Settings,
    mail_rx: mpsc::Receiver<mail::MailRequest>,
) -> Result<(), anyhow::Error> {
    log::info!("Starting mail service.");
    let handler = mail::MailRequestHandler::from_settings(&settings.mail)?;
    let mut mail_service = mail::MailService::new();
    let mut mail_rx = mail_rx;
    tokio::spawn(async move {
        mail_service.run(handler, &mut mail_rx).await;
    });

    if settings.prices.enabled {
        log::info!("Starting price service.");
        let fetcher = price::PriceFetcher::new(store, &settings.prices.provider_url);
        fetcher
            .start_price_fetch_task(std::time::Duration::from_secs(settings.prices.interval_secs))
            .await;
    }

    Ok(())
}
