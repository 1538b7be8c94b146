use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::ServiceError;
use crate::models::{users::User, AccountType};
use crate::repositories::{Document, Filter, Repository, Store};

/// Signed change to one balance bucket of one user.
#[derive(Clone, Debug, PartialEq)]
pub struct Movement {
    pub user_id: Uuid,
    pub account: AccountType,
    pub amount: Decimal,
}

impl Movement {
    pub fn credit(user_id: Uuid, account: AccountType, amount: Decimal) -> Self {
        Movement {
            user_id,
            account,
            amount,
        }
    }

    pub fn debit(user_id: Uuid, account: AccountType, amount: Decimal) -> Self {
        Movement {
            user_id,
            account,
            amount: -amount,
        }
    }
}

/// Applies balance movements as atomic per-user increments. A batch either
/// lands completely or is rolled back by replaying the inverse of the
/// movements that already went through.
#[derive(Clone)]
pub struct BalanceLedger {
    users: Repository<User>,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        BalanceLedger {
            users: Repository::new(store),
        }
    }

    pub async fn apply(&self, movements: &[Movement]) -> Result<(), ServiceError> {
        let mut applied: Vec<&Movement> = Vec::with_capacity(movements.len());

        for movement in movements {
            match self.apply_one(movement).await {
                Ok(()) => applied.push(movement),
                Err(e) => {
                    self.compensate(&applied).await;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    async fn apply_one(&self, movement: &Movement) -> Result<(), ServiceError> {
        if movement.amount.is_zero() {
            return Ok(());
        }

        let updated = self
            .users
            .increment(
                movement.user_id,
                movement.account.balance_field(),
                movement.amount,
                false,
            )
            .await?;

        if updated.is_some() {
            return Ok(());
        }

        let exists = self
            .users
            .query(Filter::eq("id", movement.user_id))
            .with_deleted()
            .count()
            .await?;

        if exists == 0 {
            Err(ServiceError::NotFound("User not found".to_string()))
        } else {
            Err(ServiceError::BadRequest("Insufficient balance".to_string()))
        }
    }

    async fn compensate(&self, applied: &[&Movement]) {
        for movement in applied.iter().rev() {
            log::warn!(
                "Reverting {:?} movement of {} for user {}",
                movement.account,
                movement.amount,
                movement.user_id
            );
            let reverted = self
                .users
                .increment(
                    movement.user_id,
                    movement.account.balance_field(),
                    -movement.amount,
                    true,
                )
                .await;

            if let Err(e) = reverted {
                log::error!(
                    "Could not revert movement {:?}, balance needs manual repair: {}",
                    movement,
                    e
                );
            }
        }
    }

    /// Credits the referrer of `user`, if any, with `rate` percent of `amount`.
    /// Best effort: a failure is logged and never fails the caller.
    pub async fn pay_referral(&self, user: &User, rate: Decimal, amount: Decimal) -> Option<Decimal> {
        let referrer = user.referred_by?;
        let bonus = amount * rate / Decimal::ONE_HUNDRED;
        if bonus <= Decimal::ZERO {
            return None;
        }

        let credit = Movement::credit(referrer, AccountType::Referral, bonus);
        match self.apply(&[credit]).await {
            Ok(()) => {
                log::info!("Paid referral bonus of {} to {} for {}", bonus, referrer, user.id);
                Some(bonus)
            }
            Err(e) => {
                log::warn!("Referral bonus for {} could not be paid: {}", referrer, e);
                None
            }
        }
    }

    /// Moves `id` out of status `from` exactly once, then applies the
    /// movements. If the movements fail, the previous status is restored
    /// and the ledger error is returned.
    pub async fn settle<T, S>(
        &self,
        records: &Repository<T>,
        id: Uuid,
        from: S,
        patch: Value,
        movements: &[Movement],
    ) -> Result<T, ServiceError>
    where
        T: Document,
        S: Serialize,
    {
        let from = serde_json::to_value(from)
            .map_err(|e| ServiceError::Internal(format!("Unserializable status: {}", e)))?;
        let target = patch.get("status").cloned().unwrap_or(Value::Null);

        let updated = records
            .transition(id, Filter::Eq("status".to_string(), from.clone()), patch)
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest(format!(
                    "Only {} records can be updated",
                    from.as_str().unwrap_or("pending").to_lowercase()
                ))
            })?;

        if let Err(e) = self.apply(movements).await {
            let restored = records
                .transition(
                    id,
                    Filter::Eq("status".to_string(), target),
                    json!({ "status": from }),
                )
                .await;
            if !matches!(restored, Ok(Some(_))) {
                log::error!("Could not restore status of {} {}", T::COLLECTION, id);
            }
            return Err(e);
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deposits::{Deposit, DepositStatus};
    use crate::services::testing;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn funded(store: &Arc<dyn Store>, name: &str, main: Decimal) -> User {
        let mut user = testing::user(name);
        user.balances.main = main;
        Repository::<User>::new(store.clone())
            .insert(&user)
            .await
            .unwrap();
        user
    }

    async fn balance(store: &Arc<dyn Store>, id: Uuid) -> Decimal {
        Repository::<User>::new(store.clone())
            .get(id)
            .await
            .unwrap()
            .unwrap()
            .balances
            .main
    }

    #[tokio::test]
    async fn moves_funds_between_users() {
        let (_, store, _mail) = testing::services();
        let ledger = BalanceLedger::new(store.clone());
        let alice = funded(&store, "alice", dec!(100)).await;
        let bob = funded(&store, "bob", dec!(0)).await;

        ledger
            .apply(&[
                Movement::debit(alice.id, AccountType::Main, dec!(40)),
                Movement::credit(bob.id, AccountType::Main, dec!(40)),
            ])
            .await
            .unwrap();

        assert_eq!(balance(&store, alice.id).await, dec!(60));
        assert_eq!(balance(&store, bob.id).await, dec!(40));
    }

    #[tokio::test]
    async fn failed_batch_is_compensated() {
        let (_, store, _mail) = testing::services();
        let ledger = BalanceLedger::new(store.clone());
        let alice = funded(&store, "alice", dec!(100)).await;
        let bob = funded(&store, "bob", dec!(5)).await;

        let result = ledger
            .apply(&[
                Movement::credit(alice.id, AccountType::Main, dec!(10)),
                Movement::debit(bob.id, AccountType::Main, dec!(10)),
            ])
            .await;

        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        assert_eq!(balance(&store, alice.id).await, dec!(100));
        assert_eq!(balance(&store, bob.id).await, dec!(5));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_, store, _mail) = testing::services();
        let ledger = BalanceLedger::new(store);

        let result = ledger
            .apply(&[Movement::credit(Uuid::new_v4(), AccountType::Main, dec!(1))])
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn referral_bonus_goes_to_referrer() {
        let (_, store, _mail) = testing::services();
        let ledger = BalanceLedger::new(store.clone());
        let referrer = funded(&store, "referrer", dec!(0)).await;
        let mut user = testing::user("newcomer");
        user.referred_by = Some(referrer.id);

        assert_eq!(ledger.pay_referral(&user, dec!(5), dec!(200)).await, Some(dec!(10)));
        assert_eq!(ledger.pay_referral(&referrer, dec!(5), dec!(200)).await, None);

        let stored = Repository::<User>::new(store).get(referrer.id).await.unwrap().unwrap();
        assert_eq!(stored.balances.referral, dec!(10));
    }

    #[tokio::test]
    async fn settle_restores_status_when_movements_fail() {
        let (_, store, _mail) = testing::services();
        let ledger = BalanceLedger::new(store.clone());
        let deposits = Repository::<Deposit>::new(store.clone());
        let user = funded(&store, "alice", dec!(0)).await;
        let deposit = Deposit {
            id: Uuid::new_v4(),
            user_id: user.id,
            method_id: Uuid::new_v4(),
            amount: dec!(50),
            fee: dec!(0),
            account: AccountType::Main,
            status: DepositStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        deposits.insert(&deposit).await.unwrap();

        let result = ledger
            .settle(
                &deposits,
                deposit.id,
                DepositStatus::Pending,
                json!({ "status": DepositStatus::Approved }),
                &[Movement::debit(user.id, AccountType::Main, dec!(50))],
            )
            .await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));

        let stored = deposits.get(deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Pending);
    }
}
