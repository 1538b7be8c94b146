use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use super::ledger::{BalanceLedger, Movement};
use super::mail::Mailer;
use super::notifications::NotificationService;
use super::plans::PlanService;
use super::platform::PlatformService;
use super::{parse_id, ServiceError};
use crate::models::investments::{
    Investment, InvestmentStatus, InvestmentView, NewInvestment, UpdateInvestmentStatus,
};
use crate::models::notifications::NewNotification;
use crate::models::plans::Plan;
use crate::models::users::{User, UserSummary};
use crate::models::{Environment, ListParams};
use crate::repositories::{Filter, Repository, Store};

pub struct InvestmentService {
    investments: Repository<Investment>,
    users: Repository<User>,
    plans: Repository<Plan>,
    open_plans: PlanService,
    ledger: BalanceLedger,
    platform: Arc<PlatformService>,
    notifications: Arc<NotificationService>,
    mailer: Mailer,
}

impl InvestmentService {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: BalanceLedger,
        platform: Arc<PlatformService>,
        notifications: Arc<NotificationService>,
        mailer: Mailer,
    ) -> Self {
        InvestmentService {
            investments: Repository::new(store.clone()),
            users: Repository::new(store.clone()),
            plans: Repository::new(store.clone()),
            open_plans: PlanService::new(store),
            ledger,
            platform,
            notifications,
            mailer,
        }
    }

    async fn views(&self, investments: Vec<Investment>) -> Result<Vec<InvestmentView>, ServiceError> {
        let users = self
            .users
            .populate(investments.iter().map(|i| i.user_id))
            .await?;
        let plans = self
            .plans
            .populate(investments.iter().map(|i| i.plan_id))
            .await?;

        Ok(investments
            .into_iter()
            .map(|investment| InvestmentView {
                user: users.get(&investment.user_id).map(UserSummary::from),
                plan: plans.get(&investment.plan_id).cloned(),
                investment,
            })
            .collect())
    }

    async fn view(&self, investment: Investment) -> Result<InvestmentView, ServiceError> {
        self.views(vec![investment])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Investment not found".to_string()))
    }

    pub async fn create(
        &self,
        actor: &User,
        new: NewInvestment,
    ) -> Result<InvestmentView, ServiceError> {
        let plan = self.open_plans.investable(new.plan_id).await?;
        if !plan.accepts(new.amount) {
            return Err(ServiceError::BadRequest(format!(
                "{} accepts between {} and {}",
                plan.name, plan.min_amount, plan.max_amount
            )));
        }

        let account = new.resolved_account();
        if actor.balances.get(account) < new.amount {
            return Err(ServiceError::BadRequest("Insufficient balance".to_string()));
        }

        let now = Utc::now();
        let investment = Investment {
            id: Uuid::new_v4(),
            user_id: actor.id,
            plan_id: plan.id,
            amount: new.amount,
            account,
            environment: new.environment,
            status: InvestmentStatus::Pending,
            profit: Decimal::ZERO,
            started_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        self.investments.insert(&investment).await?;
        log::info!(
            "User {} placed {:?} investment {} of {} in {}",
            actor.id,
            investment.environment,
            investment.id,
            investment.amount,
            plan.name
        );

        self.notifications
            .notify(
                NewNotification::for_admins(
                    "New investment",
                    format!(
                        "{} invested {} in {}",
                        actor.username, investment.amount, plan.name
                    ),
                    investment.id,
                )
                .in_environment(investment.environment),
            )
            .await;

        self.view(investment).await
    }

    fn list_filter(params: &ListParams) -> Filter {
        match params.environment {
            Some(environment) => Filter::eq("environment", environment),
            None => Filter::All,
        }
    }

    fn owned_by(actor: &User) -> Filter {
        Filter::eq("userId", actor.id)
    }

    pub async fn fetch_all(
        &self,
        actor: &User,
        params: &ListParams,
    ) -> Result<Vec<InvestmentView>, ServiceError> {
        let investments = self
            .investments
            .query(Self::list_filter(params))
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .newest_first()
            .skip(params.skip)
            .limit(params.limit)
            .all()
            .await?;
        self.views(investments).await
    }

    pub async fn count(&self, actor: &User, params: &ListParams) -> Result<u64, ServiceError> {
        Ok(self
            .investments
            .query(Self::list_filter(params))
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .count()
            .await?)
    }

    async fn find(&self, actor: &User, id: &str) -> Result<Investment, ServiceError> {
        let id = parse_id(id, "Investment")?;
        self.investments
            .query(Filter::eq("id", id))
            .scoped(actor.is_staff(), Self::owned_by(actor))
            .one()
            .await?
            .ok_or_else(|| ServiceError::NotFound("Investment not found".to_string()))
    }

    pub async fn get(&self, actor: &User, id: &str) -> Result<InvestmentView, ServiceError> {
        let investment = self.find(actor, id).await?;
        self.view(investment).await
    }

    async fn plan_of(&self, investment: &Investment) -> Result<Plan, ServiceError> {
        self.plans
            .populate([investment.plan_id])
            .await?
            .remove(&investment.plan_id)
            .ok_or_else(|| ServiceError::NotFound("Plan not found".to_string()))
    }

    /// PENDING => RUNNING takes the stake, RUNNING => COMPLETED pays it back
    /// with profit, PENDING => CANCELLED moves nothing.
    pub async fn update_status(
        &self,
        actor: &User,
        id: &str,
        update: UpdateInvestmentStatus,
    ) -> Result<InvestmentView, ServiceError> {
        let investment = self.find(actor, id).await?;
        let owner = investment.user_id;

        let (from, patch, movements) = match update.status {
            InvestmentStatus::Running => {
                let plan = self.plan_of(&investment).await?;
                let started_at = Utc::now();
                let expires_at = started_at + Duration::hours(i64::from(plan.duration_hours));
                (
                    InvestmentStatus::Pending,
                    json!({
                        "status": InvestmentStatus::Running,
                        "startedAt": started_at,
                        "expiresAt": expires_at,
                    }),
                    vec![Movement::debit(owner, investment.account, investment.amount)],
                )
            }
            InvestmentStatus::Completed => {
                let plan = self.plan_of(&investment).await?;
                let rate = update.profit_rate.unwrap_or(plan.min_profit_rate);
                if rate < plan.min_profit_rate || rate > plan.max_profit_rate {
                    return Err(ServiceError::BadRequest(format!(
                        "profitRate must be between {} and {}",
                        plan.min_profit_rate, plan.max_profit_rate
                    )));
                }
                let profit = investment.amount * rate / Decimal::ONE_HUNDRED;
                (
                    InvestmentStatus::Running,
                    json!({ "status": InvestmentStatus::Completed, "profit": profit }),
                    vec![Movement::credit(
                        owner,
                        investment.account,
                        investment.amount + profit,
                    )],
                )
            }
            InvestmentStatus::Cancelled => (
                InvestmentStatus::Pending,
                json!({ "status": InvestmentStatus::Cancelled }),
                vec![],
            ),
            InvestmentStatus::Pending => {
                return Err(ServiceError::BadRequest(
                    "status must be RUNNING, COMPLETED or CANCELLED".to_string(),
                ))
            }
        };

        let updated = self
            .ledger
            .settle(&self.investments, investment.id, from, patch, &movements)
            .await?;
        log::info!(
            "{} set investment {} to {:?}",
            actor.id,
            investment.id,
            update.status
        );

        if let Some(user) = self.users.populate([owner]).await?.remove(&owner) {
            if update.status == InvestmentStatus::Running
                && investment.environment == Environment::Live
            {
                let rates = self.platform.referral_settings().await?;
                self.ledger
                    .pay_referral(&user, rates.investment, investment.amount)
                    .await;
            }

            let (title, message) = match update.status {
                InvestmentStatus::Running => (
                    "Investment started",
                    format!("Your investment of {} is now running", investment.amount),
                ),
                InvestmentStatus::Completed => (
                    "Investment completed",
                    format!(
                        "Your investment of {} completed with a profit of {}",
                        investment.amount, updated.profit
                    ),
                ),
                _ => (
                    "Investment cancelled",
                    format!("Your investment of {} was cancelled", investment.amount),
                ),
            };
            self.notifications
                .notify(
                    NewNotification::for_user(user.id, title, message.clone(), investment.id)
                        .in_environment(investment.environment),
                )
                .await;
            self.mailer.send(&user.email, title, message);
        }

        self.view(updated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::platform::UpdateReferralSettings;
    use crate::models::plans::NewPlan;
    use crate::models::users::Role;
    use crate::models::AccountType;
    use crate::services::{testing, ServiceManager};
    use rust_decimal_macros::dec;

    struct Fixture {
        services: ServiceManager,
        users: Repository<User>,
        plan: Plan,
        admin: User,
    }

    async fn setup() -> Fixture {
        let (services, store, _) = testing::services();
        let plan = services
            .plans
            .create(NewPlan {
                name: "Growth".to_string(),
                engine: "momentum".to_string(),
                min_amount: dec!(100),
                max_amount: dec!(500),
                min_profit_rate: dec!(5),
                max_profit_rate: dec!(10),
                duration_hours: 48,
                assets: vec![],
                status: None,
            })
            .await
            .unwrap();
        let mut admin = testing::user("admin");
        admin.role = Role::Admin;

        Fixture {
            services,
            users: Repository::new(store),
            plan,
            admin,
        }
    }

    async fn investor(users: &Repository<User>, referred_by: Option<Uuid>) -> User {
        let mut user = testing::user("investor");
        user.balances.main = dec!(300);
        user.balances.demo = dec!(1000);
        user.referred_by = referred_by;
        users.insert(&user).await.unwrap();
        user
    }

    fn status(status: InvestmentStatus, profit_rate: Option<Decimal>) -> UpdateInvestmentStatus {
        UpdateInvestmentStatus {
            status,
            profit_rate,
        }
    }

    #[tokio::test]
    async fn full_lifecycle_with_profit_and_referral() {
        let f = setup().await;
        let mut referrer = testing::user("referrer");
        referrer.referral_code = "REF".to_string();
        f.users.insert(&referrer).await.unwrap();
        let user = investor(&f.users, Some(referrer.id)).await;
        f.services
            .platform
            .update_referral_settings(UpdateReferralSettings {
                investment: Some(dec!(1)),
                ..Default::default()
            })
            .await
            .unwrap();

        let created = f
            .services
            .investments
            .create(
                &user,
                NewInvestment {
                    plan_id: f.plan.id,
                    amount: dec!(200),
                    account: None,
                    environment: Environment::Live,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.investment.account, AccountType::Main);
        let id = created.investment.id.to_string();

        let running = f
            .services
            .investments
            .update_status(&f.admin, &id, status(InvestmentStatus::Running, None))
            .await
            .unwrap();
        let started = running.investment.started_at.unwrap();
        assert_eq!(running.investment.expires_at.unwrap() - started, Duration::hours(48));
        assert_eq!(f.users.get(user.id).await.unwrap().unwrap().balances.main, dec!(100));
        assert_eq!(
            f.users.get(referrer.id).await.unwrap().unwrap().balances.referral,
            dec!(2)
        );

        let completed = f
            .services
            .investments
            .update_status(&f.admin, &id, status(InvestmentStatus::Completed, Some(dec!(7.5))))
            .await
            .unwrap();
        assert_eq!(completed.investment.profit, dec!(15));
        assert_eq!(f.users.get(user.id).await.unwrap().unwrap().balances.main, dec!(315));

        let again = f
            .services
            .investments
            .update_status(&f.admin, &id, status(InvestmentStatus::Completed, None))
            .await;
        assert!(matches!(again, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn demo_investments_use_the_demo_balance() {
        let f = setup().await;
        let user = investor(&f.users, None).await;

        let created = f
            .services
            .investments
            .create(
                &user,
                NewInvestment {
                    plan_id: f.plan.id,
                    amount: dec!(500),
                    account: None,
                    environment: Environment::Demo,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.investment.account, AccountType::Demo);

        f.services
            .investments
            .update_status(
                &f.admin,
                &created.investment.id.to_string(),
                status(InvestmentStatus::Running, None),
            )
            .await
            .unwrap();

        let stored = f.users.get(user.id).await.unwrap().unwrap();
        assert_eq!(stored.balances.demo, dec!(500));
        assert_eq!(stored.balances.main, dec!(300));

        let live_only = ListParams {
            environment: Some(Environment::Live),
            ..Default::default()
        };
        assert_eq!(f.services.investments.count(&user, &live_only).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn amount_outside_plan_bounds_is_rejected() {
        let f = setup().await;
        let user = investor(&f.users, None).await;

        let result = f
            .services
            .investments
            .create(
                &user,
                NewInvestment {
                    plan_id: f.plan.id,
                    amount: dec!(50),
                    account: None,
                    environment: Environment::Live,
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn profit_rate_must_respect_plan_bounds() {
        let f = setup().await;
        let user = investor(&f.users, None).await;
        let created = f
            .services
            .investments
            .create(
                &user,
                NewInvestment {
                    plan_id: f.plan.id,
                    amount: dec!(100),
                    account: None,
                    environment: Environment::Live,
                },
            )
            .await
            .unwrap();
        let id = created.investment.id.to_string();

        let early = f
            .services
            .investments
            .update_status(&f.admin, &id, status(InvestmentStatus::Completed, None))
            .await;
        assert!(matches!(early, Err(ServiceError::BadRequest(_))));

        f.services
            .investments
            .update_status(&f.admin, &id, status(InvestmentStatus::Running, None))
            .await
            .unwrap();
        let greedy = f
            .services
            .investments
            .update_status(&f.admin, &id, status(InvestmentStatus::Completed, Some(dec!(50))))
            .await;
        assert!(matches!(greedy, Err(ServiceError::BadRequest(_))));
    }
}
