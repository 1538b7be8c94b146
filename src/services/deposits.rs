use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::ledger::{BalanceLedger, Movement};
use super::mail::Mailer;
use super::methods::MethodService;
use super::notifications::NotificationService;
use super::platform::PlatformService;
use super::{parse_id, ServiceError};
use crate::models::deposits::{Deposit, DepositStatus, DepositView, NewDeposit};
use crate::models::methods::DepositMethod;
use crate::models::notifications::NewNotification;
use crate::models::users::{User, UserSummary};
use crate::models::{AccountType, ListParams};
use crate::repositories::{Filter, Repository, Store};

pub struct DepositService {
    deposits: Repository<Deposit>,
    users: Repository<User>,
    methods: MethodService<DepositMethod>,
    ledger: BalanceLedger,
    platform: Arc<PlatformService>,
    notifications: Arc<NotificationService>,
    mailer: Mailer,
}

impl DepositService {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: BalanceLedger,
        platform: Arc<PlatformService>,
        notifications: Arc<NotificationService>,
        mailer: Mailer,
    ) -> Self {
        DepositService {
            deposits: Repository::new(store.clone()),
            users: Repository::new(store.clone()),
            methods: MethodService::new(store),
            ledger,
            platform,
            notifications,
            mailer,
        }
    }

    async fn views(&self, deposits: Vec<Deposit>) -> Result<Vec<DepositView>, ServiceError> {
        let users = self
            .users
            .populate(deposits.iter().map(|d| d.user_id))
            .await?;
        let methods = self
            .methods
            .fetch_by_ids(deposits.iter().map(|d| d.method_id))
            .await?;

        Ok(deposits
            .into_iter()
            .map(|deposit| DepositView {
                user: users.get(&deposit.user_id).map(UserSummary::from),
                method: methods.get(&deposit.method_id).cloned(),
                deposit,
            })
            .collect())
    }

    async fn view(&self, deposit: Deposit) -> Result<DepositView, ServiceError> {
        self.views(vec![deposit])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Deposit not found".to_string()))
    }

    pub async fn create(&self, actor: &User, new: NewDeposit) -> Result<DepositView, ServiceError> {
        let method = self.methods.usable(new.method_id).await?;
        let details = &method.details;

        if new.amount < details.min_amount {
            return Err(ServiceError::BadRequest(format!(
                "Minimum deposit is {}",
                details.min_amount
            )));
        }
        if new.amount <= details.fee {
            return Err(ServiceError::BadRequest(
                "Amount must exceed the deposit fee".to_string(),
            ));
        }

        let now = Utc::now();
        let deposit = Deposit {
            id: Uuid::new_v4(),
            user_id: actor.id,
            method_id: method.id,
            amount: new.amount,
            fee: details.fee,
            account: AccountType::Main,
            status: DepositStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.deposits.insert(&deposit).await?;
        log::info!("User {} requested deposit {} of {}", actor.id, deposit.id, deposit.amount);

        self.notifications
            .notify(NewNotification::for_admins(
                "New deposit",
                format!("{} requested a deposit of {}", actor.username, deposit.amount),
                deposit.id,
            ))
            .await;

        self.view(deposit).await
    }

    fn owned_by(actor: &User) -> Filter {
        Filter::eq("userId", actor.id)
    }

    pub async fn fetch_all(
        &self,
        actor: &User,
        params: &ListParams,
    ) -> Result<Vec<DepositView>, ServiceError> {
        let deposits = self
            .deposits
            .query(Filter::All)
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .newest_first()
            .skip(params.skip)
            .limit(params.limit)
            .all()
            .await?;
        self.views(deposits).await
    }

    pub async fn count(&self, actor: &User) -> Result<u64, ServiceError> {
        Ok(self
            .deposits
            .query(Filter::All)
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .count()
            .await?)
    }

    async fn find(&self, actor: &User, id: &str) -> Result<Deposit, ServiceError> {
        let id = parse_id(id, "Deposit")?;
        self.deposits
            .query(Filter::eq("id", id))
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .one()
            .await?
            .ok_or_else(|| ServiceError::NotFound("Deposit not found".to_string()))
    }

    pub async fn get(&self, actor: &User, id: &str) -> Result<DepositView, ServiceError> {
        let deposit = self.find(actor, id).await?;
        self.view(deposit).await
    }

    /// Approves or cancels a pending deposit. Approval credits the net
    /// amount to the main balance and pays the referrer's share.
    pub async fn update_status(
        &self,
        actor: &User,
        id: &str,
        status: DepositStatus,
    ) -> Result<DepositView, ServiceError> {
        let deposit = self.find(actor, id).await?;

        let movements = match status {
            DepositStatus::Approved => vec![Movement::credit(
                deposit.user_id,
                deposit.account,
                deposit.net_amount(),
            )],
            DepositStatus::Cancelled => vec![],
            DepositStatus::Pending => {
                return Err(ServiceError::BadRequest(
                    "status must be APPROVED or CANCELLED".to_string(),
                ))
            }
        };

        let updated = self
            .ledger
            .settle(
                &self.deposits,
                deposit.id,
                DepositStatus::Pending,
                json!({ "status": status }),
                &movements,
            )
            .await?;
        log::info!("{} set deposit {} to {:?}", actor.id, deposit.id, status);

        if let Some(owner) = self.users.populate([deposit.user_id]).await?.remove(&deposit.user_id) {
            if status == DepositStatus::Approved {
                let rates = self.platform.referral_settings().await?;
                self.ledger
                    .pay_referral(&owner, rates.deposit, deposit.amount)
                    .await;
            }

            let (title, message) = match status {
                DepositStatus::Approved => (
                    "Deposit approved",
                    format!("Your deposit of {} has been approved", deposit.amount),
                ),
                _ => (
                    "Deposit cancelled",
                    format!("Your deposit of {} has been cancelled", deposit.amount),
                ),
            };
            self.notifications
                .notify(NewNotification::for_user(owner.id, title, message.clone(), deposit.id))
                .await;
            self.mailer.send(&owner.email, title, message);
        }

        self.view(updated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::currencies::NewCurrency;
    use crate::models::methods::NewMethod;
    use crate::models::platform::UpdateReferralSettings;
    use crate::services::{testing, ServiceManager};
    use rust_decimal_macros::dec;

    async fn setup() -> (ServiceManager, Repository<User>, DepositMethod) {
        let (services, store, _) = testing::services();
        let currency = services
            .currencies
            .create(
                NewCurrency {
                    name: "tether".to_string(),
                    symbol: "USDT".to_string(),
                    logo: None,
                }
                .into_currency(),
            )
            .await
            .unwrap();
        let method = services
            .deposit_methods
            .create(
                NewMethod {
                    currency_id: currency.id,
                    network: "TRC20".to_string(),
                    fee: dec!(2),
                    min_amount: dec!(10),
                    status: None,
                    price: None,
                    auto_update: false,
                    address: Some("TXYZ".to_string()),
                }
                .into_deposit_method(),
            )
            .await
            .unwrap()
            .method;

        (services, Repository::new(store), method)
    }

    async fn member(users: &Repository<User>, name: &str, referred_by: Option<Uuid>) -> User {
        let mut user = testing::user(name);
        user.referred_by = referred_by;
        users.insert(&user).await.unwrap();
        user
    }

    fn admin() -> User {
        let mut admin = testing::user("admin");
        admin.role = crate::models::users::Role::Admin;
        admin
    }

    #[tokio::test]
    async fn approval_credits_once_and_pays_referrer() {
        let (services, users, method) = setup().await;
        let referrer = member(&users, "referrer", None).await;
        let alice = member(&users, "alice", Some(referrer.id)).await;
        services
            .platform
            .update_referral_settings(UpdateReferralSettings {
                deposit: Some(dec!(10)),
                ..Default::default()
            })
            .await
            .unwrap();

        let deposit = services
            .deposits
            .create(
                &alice,
                NewDeposit {
                    method_id: method.id,
                    amount: dec!(100),
                },
            )
            .await
            .unwrap();
        assert_eq!(deposit.deposit.status, DepositStatus::Pending);
        assert_eq!(deposit.deposit.fee, dec!(2));
        let id = deposit.deposit.id.to_string();

        let approved = services
            .deposits
            .update_status(&admin(), &id, DepositStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.deposit.status, DepositStatus::Approved);

        let again = services
            .deposits
            .update_status(&admin(), &id, DepositStatus::Approved)
            .await;
        assert!(matches!(again, Err(ServiceError::BadRequest(_))));

        let alice = users.get(alice.id).await.unwrap().unwrap();
        assert_eq!(alice.balances.main, dec!(98));
        let referrer = users.get(referrer.id).await.unwrap().unwrap();
        assert_eq!(referrer.balances.referral, dec!(10));
    }

    #[tokio::test]
    async fn cancellation_moves_no_funds() {
        let (services, users, method) = setup().await;
        let alice = member(&users, "alice", None).await;
        let deposit = services
            .deposits
            .create(
                &alice,
                NewDeposit {
                    method_id: method.id,
                    amount: dec!(50),
                },
            )
            .await
            .unwrap();

        services
            .deposits
            .update_status(&admin(), &deposit.deposit.id.to_string(), DepositStatus::Cancelled)
            .await
            .unwrap();

        let alice = users.get(alice.id).await.unwrap().unwrap();
        assert_eq!(alice.balances.main, dec!(0));
    }

    #[tokio::test]
    async fn amount_below_minimum_is_rejected() {
        let (services, users, method) = setup().await;
        let alice = member(&users, "alice", None).await;

        let result = services
            .deposits
            .create(
                &alice,
                NewDeposit {
                    method_id: method.id,
                    amount: dec!(5),
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn users_only_see_their_own_deposits() {
        let (services, users, method) = setup().await;
        let alice = member(&users, "alice", None).await;
        let bob = member(&users, "bob", None).await;
        let deposit = services
            .deposits
            .create(
                &alice,
                NewDeposit {
                    method_id: method.id,
                    amount: dec!(50),
                },
            )
            .await
            .unwrap();

        assert_eq!(services.deposits.count(&alice).await.unwrap(), 1);
        assert_eq!(services.deposits.count(&bob).await.unwrap(), 0);
        assert_eq!(services.deposits.count(&admin()).await.unwrap(), 1);
        assert!(matches!(
            services
                .deposits
                .get(&bob, &deposit.deposit.id.to_string())
                .await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
