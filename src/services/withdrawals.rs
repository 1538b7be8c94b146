use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::ledger::{BalanceLedger, Movement};
use super::mail::Mailer;
use super::methods::MethodService;
use super::notifications::NotificationService;
use super::{parse_id, ServiceError};
use crate::models::methods::WithdrawalMethod;
use crate::models::notifications::NewNotification;
use crate::models::users::{User, UserSummary};
use crate::models::withdrawals::{NewWithdrawal, Withdrawal, WithdrawalStatus, WithdrawalView};
use crate::models::ListParams;
use crate::repositories::{Filter, Repository, Store};

pub struct WithdrawalService {
    withdrawals: Repository<Withdrawal>,
    users: Repository<User>,
    methods: MethodService<WithdrawalMethod>,
    ledger: BalanceLedger,
    notifications: Arc<NotificationService>,
    mailer: Mailer,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: BalanceLedger,
        notifications: Arc<NotificationService>,
        mailer: Mailer,
    ) -> Self {
        WithdrawalService {
            withdrawals: Repository::new(store.clone()),
            users: Repository::new(store.clone()),
            methods: MethodService::new(store),
            ledger,
            notifications,
            mailer,
        }
    }

    async fn views(&self, withdrawals: Vec<Withdrawal>) -> Result<Vec<WithdrawalView>, ServiceError> {
        let users = self
            .users
            .populate(withdrawals.iter().map(|w| w.user_id))
            .await?;
        let methods = self
            .methods
            .fetch_by_ids(withdrawals.iter().map(|w| w.method_id))
            .await?;

        Ok(withdrawals
            .into_iter()
            .map(|withdrawal| WithdrawalView {
                user: users.get(&withdrawal.user_id).map(UserSummary::from),
                method: methods.get(&withdrawal.method_id).cloned(),
                withdrawal,
            })
            .collect())
    }

    async fn view(&self, withdrawal: Withdrawal) -> Result<WithdrawalView, ServiceError> {
        self.views(vec![withdrawal])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Withdrawal not found".to_string()))
    }

    pub async fn create(
        &self,
        actor: &User,
        new: NewWithdrawal,
    ) -> Result<WithdrawalView, ServiceError> {
        let method = self.methods.usable(new.method_id).await?;
        if new.amount < method.details.min_amount {
            return Err(ServiceError::BadRequest(format!(
                "Minimum withdrawal is {}",
                method.details.min_amount
            )));
        }

        let now = Utc::now();
        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            user_id: actor.id,
            method_id: method.id,
            amount: new.amount,
            fee: method.details.fee,
            address: new.address.trim().to_string(),
            account: new.account,
            status: WithdrawalStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        // Checked again, atomically, when the withdrawal is approved.
        if actor.balances.get(withdrawal.account) < withdrawal.total() {
            return Err(ServiceError::BadRequest("Insufficient balance".to_string()));
        }

        self.withdrawals.insert(&withdrawal).await?;
        log::info!(
            "User {} requested withdrawal {} of {}",
            actor.id,
            withdrawal.id,
            withdrawal.amount
        );

        self.notifications
            .notify(NewNotification::for_admins(
                "New withdrawal",
                format!(
                    "{} requested a withdrawal of {}",
                    actor.username, withdrawal.amount
                ),
                withdrawal.id,
            ))
            .await;

        self.view(withdrawal).await
    }

    fn owned_by(actor: &User) -> Filter {
        Filter::eq("userId", actor.id)
    }

    pub async fn fetch_all(
        &self,
        actor: &User,
        params: &ListParams,
    ) -> Result<Vec<WithdrawalView>, ServiceError> {
        let withdrawals = self
            .withdrawals
            .query(Filter::All)
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .newest_first()
            .skip(params.skip)
            .limit(params.limit)
            .all()
            .await?;
        self.views(withdrawals).await
    }

    pub async fn count(&self, actor: &User) -> Result<u64, ServiceError> {
        Ok(self
            .withdrawals
            .query(Filter::All)
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .count()
            .await?)
    }

    async fn find(&self, actor: &User, id: &str) -> Result<Withdrawal, ServiceError> {
        let id = parse_id(id, "Withdrawal")?;
        self.withdrawals
            .query(Filter::eq("id", id))
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .one()
            .await?
            .ok_or_else(|| ServiceError::NotFound("Withdrawal not found".to_string()))
    }

    pub async fn get(&self, actor: &User, id: &str) -> Result<WithdrawalView, ServiceError> {
        let withdrawal = self.find(actor, id).await?;
        self.view(withdrawal).await
    }

    pub async fn update_status(
        &self,
        actor: &User,
        id: &str,
        status: WithdrawalStatus,
    ) -> Result<WithdrawalView, ServiceError> {
        let withdrawal = self.find(actor, id).await?;

        let movements = match status {
            WithdrawalStatus::Approved => vec![Movement::debit(
                withdrawal.user_id,
                withdrawal.account,
                withdrawal.total(),
            )],
            WithdrawalStatus::Cancelled => vec![],
            WithdrawalStatus::Pending => {
                return Err(ServiceError::BadRequest(
                    "status must be APPROVED or CANCELLED".to_string(),
                ))
            }
        };

        let updated = self
            .ledger
            .settle(
                &self.withdrawals,
                withdrawal.id,
                WithdrawalStatus::Pending,
                json!({ "status": status }),
                &movements,
            )
            .await?;
        log::info!("{} set withdrawal {} to {:?}", actor.id, withdrawal.id, status);

        if let Some(owner) = self
            .users
            .populate([withdrawal.user_id])
            .await?
            .remove(&withdrawal.user_id)
        {
            let (title, message) = match status {
                WithdrawalStatus::Approved => (
                    "Withdrawal approved",
                    format!(
                        "Your withdrawal of {} to {} has been approved",
                        withdrawal.amount, withdrawal.address
                    ),
                ),
                _ => (
                    "Withdrawal cancelled",
                    format!("Your withdrawal of {} has been cancelled", withdrawal.amount),
                ),
            };
            self.notifications
                .notify(NewNotification::for_user(
                    owner.id,
                    title,
                    message.clone(),
                    withdrawal.id,
                ))
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
    use crate::models::users::Role;
    use crate::models::AccountType;
    use crate::services::{testing, ServiceManager};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn setup() -> (ServiceManager, Repository<User>, WithdrawalMethod) {
        let (services, store, _) = testing::services();
        let currency = services
            .currencies
            .create(
                NewCurrency {
                    name: "bitcoin".to_string(),
                    symbol: "BTC".to_string(),
                    logo: None,
                }
                .into_currency(),
            )
            .await
            .unwrap();
        let method = services
            .withdrawal_methods
            .create(
                NewMethod {
                    currency_id: currency.id,
                    network: "bitcoin".to_string(),
                    fee: dec!(1),
                    min_amount: dec!(10),
                    status: None,
                    price: None,
                    auto_update: false,
                    address: None,
                }
                .into_withdrawal_method(),
            )
            .await
            .unwrap()
            .method;

        (services, Repository::new(store), method)
    }

    async fn member(users: &Repository<User>, main: Decimal) -> User {
        let mut user = testing::user("alice");
        user.balances.main = main;
        users.insert(&user).await.unwrap();
        user
    }

    fn admin() -> User {
        let mut admin = testing::user("admin");
        admin.role = Role::Admin;
        admin
    }

    fn request(method: &WithdrawalMethod, amount: Decimal) -> NewWithdrawal {
        NewWithdrawal {
            method_id: method.id,
            amount,
            address: "bc1qdestination".to_string(),
            account: AccountType::Main,
        }
    }

    #[tokio::test]
    async fn approval_debits_amount_and_fee_once() {
        let (services, users, method) = setup().await;
        let alice = member(&users, dec!(100)).await;

        let withdrawal = services
            .withdrawals
            .create(&alice, request(&method, dec!(50)))
            .await
            .unwrap();
        let id = withdrawal.withdrawal.id.to_string();

        services
            .withdrawals
            .update_status(&admin(), &id, WithdrawalStatus::Approved)
            .await
            .unwrap();
        let again = services
            .withdrawals
            .update_status(&admin(), &id, WithdrawalStatus::Cancelled)
            .await;
        assert!(matches!(again, Err(ServiceError::BadRequest(_))));

        let alice = users.get(alice.id).await.unwrap().unwrap();
        assert_eq!(alice.balances.main, dec!(49));
    }

    #[tokio::test]
    async fn request_beyond_balance_is_rejected() {
        let (services, users, method) = setup().await;
        let alice = member(&users, dec!(50)).await;

        let result = services
            .withdrawals
            .create(&alice, request(&method, dec!(50)))
            .await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn approval_fails_if_funds_were_spent_meanwhile() {
        let (services, users, method) = setup().await;
        let alice = member(&users, dec!(100)).await;

        let first = services
            .withdrawals
            .create(&alice, request(&method, dec!(60)))
            .await
            .unwrap();
        let second = services
            .withdrawals
            .create(&alice, request(&method, dec!(60)))
            .await
            .unwrap();

        services
            .withdrawals
            .update_status(&admin(), &first.withdrawal.id.to_string(), WithdrawalStatus::Approved)
            .await
            .unwrap();
        let result = services
            .withdrawals
            .update_status(&admin(), &second.withdrawal.id.to_string(), WithdrawalStatus::Approved)
            .await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));

        let second = services
            .withdrawals
            .get(&admin(), &second.withdrawal.id.to_string())
            .await
            .unwrap();
        assert_eq!(second.withdrawal.status, WithdrawalStatus::Pending);
        let alice = users.get(alice.id).await.unwrap().unwrap();
        assert_eq!(alice.balances.main, dec!(39));
    }
}
