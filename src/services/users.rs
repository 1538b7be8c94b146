use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::auth::{random_string, AuthService};
use super::ledger::{BalanceLedger, Movement};
use super::mail::Mailer;
use super::tokens::TokenService;
use super::ServiceError;
use crate::models::tokens::{EmailVerification, ResetPassword};
use crate::models::users::{
    Balances, BalanceAdjustment, ChangePassword, ForgotPassword, LoginRequest, NewUser,
    ResetPasswordRequest, Role, UpdateProfile, User, UserFilter, UserProfile, UserStatus,
    VerifyEmail,
};
use crate::repositories::{Filter, Repository, Store};

const REFERRAL_CODE_LENGTH: usize = 8;

/// Profile plus bearer token, returned on registration and login.
#[derive(Debug, Serialize)]
pub struct Session {
    pub user: UserProfile,
    pub token: String,
}

pub struct UserService {
    users: Repository<User>,
    auth: Arc<AuthService>,
    verifications: TokenService<EmailVerification>,
    resets: TokenService<ResetPassword>,
    ledger: BalanceLedger,
    mailer: Mailer,
    demo_balance: Decimal,
}

impl UserService {
    pub fn new(
        store: Arc<dyn Store>,
        auth: Arc<AuthService>,
        verifications: TokenService<EmailVerification>,
        resets: TokenService<ResetPassword>,
        ledger: BalanceLedger,
        mailer: Mailer,
        demo_balance: Decimal,
    ) -> Self {
        UserService {
            users: Repository::new(store),
            auth,
            verifications,
            resets,
            ledger,
            mailer,
            demo_balance,
        }
    }

    fn not_found() -> ServiceError {
        ServiceError::NotFound("User not found".to_string())
    }

    async fn find(&self, id: &str) -> Result<User, ServiceError> {
        self.users.find_by_id(id).await?.ok_or_else(Self::not_found)
    }

    async fn find_by_key(&self, key: &str) -> Result<User, ServiceError> {
        self.users
            .query(Filter::eq("key", key))
            .one()
            .await?
            .ok_or_else(|| ServiceError::BadRequest("Invalid or expired link".to_string()))
    }

    async fn unused_referral_code(&self) -> Result<String, ServiceError> {
        for _ in 0..5 {
            let code = random_string(REFERRAL_CODE_LENGTH).to_uppercase();
            let taken = self
                .users
                .query(Filter::eq("referralCode", &code))
                .with_deleted()
                .count()
                .await?;
            if taken == 0 {
                return Ok(code);
            }
        }

        Err(ServiceError::Internal(
            "Could not allocate a referral code".to_string(),
        ))
    }

    async fn send_verification(&self, user: &User) -> Result<(), ServiceError> {
        let link = self.verifications.create(&user.key).await?;
        self.mailer.send(
            &user.email,
            "Verify your email address",
            format!(
                "Hi {},\n\nConfirm your email address by opening the link below:\n\n{}\n",
                user.username, link
            ),
        );
        Ok(())
    }

    pub async fn register(&self, new: NewUser) -> Result<Session, ServiceError> {
        let email = new.email.trim().to_lowercase();
        let username = new.username.trim().to_string();

        let taken = self
            .users
            .query(Filter::any(vec![
                Filter::eq("email", &email),
                Filter::eq("username", &username),
            ]))
            .with_deleted()
            .count()
            .await?;
        if taken > 0 {
            return Err(ServiceError::Conflict(
                "Email or username already in use".to_string(),
            ));
        }

        let referred_by = match new.referral_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let referrer = self
                    .users
                    .query(Filter::eq("referralCode", code.to_uppercase()))
                    .one()
                    .await?;
                if referrer.is_none() {
                    log::info!("Ignoring unknown referral code {}", code);
                }
                referrer.map(|r| r.id)
            }
            _ => None,
        };

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            key: Uuid::new_v4().simple().to_string(),
            email,
            username,
            country: new.country.trim().to_string(),
            password: self.auth.hash_password(&new.password)?,
            role: Role::User,
            status: UserStatus::Active,
            balances: Balances {
                demo: self.demo_balance,
                ..Default::default()
            },
            referral_code: self.unused_referral_code().await?,
            referred_by,
            verified: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        self.users.insert(&user).await?;
        log::info!("Registered user {} ({})", user.username, user.id);

        if let Err(e) = self.send_verification(&user).await {
            log::error!("Could not issue verification for {}: {}", user.id, e);
        }

        Ok(Session {
            token: self.auth.issue_token(&user)?,
            user: UserProfile::from(&user),
        })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<Session, ServiceError> {
        let login = request.login.trim();
        let filter = if login.contains('@') {
            Filter::eq("email", login.to_lowercase())
        } else {
            Filter::eq("username", login)
        };
        let user = self.users.query(filter).one().await?;

        let user = match user {
            Some(user) if self.auth.verify_password(&request.password, &user.password) => user,
            _ => {
                return Err(ServiceError::Unauthorized(
                    "Invalid credentials".to_string(),
                ))
            }
        };

        if user.status != UserStatus::Active {
            return Err(ServiceError::Unauthorized(
                "Account is suspended".to_string(),
            ));
        }

        Ok(Session {
            token: self.auth.issue_token(&user)?,
            user: UserProfile::from(&user),
        })
    }

    pub async fn update_profile(
        &self,
        actor: &User,
        update: UpdateProfile,
    ) -> Result<UserProfile, ServiceError> {
        let mut user = self.find(&actor.id.to_string()).await?;

        if let Some(username) = update.username {
            let username = username.trim().to_string();
            let taken = self
                .users
                .query(Filter::eq("username", &username).and(Filter::ne("id", user.id)))
                .with_deleted()
                .count()
                .await?;
            if taken > 0 {
                return Err(ServiceError::Conflict("Username already in use".to_string()));
            }
            user.username = username;
        }
        if let Some(country) = update.country {
            user.country = country.trim().to_string();
        }

        let saved = self.users.save(&user).await?;
        Ok(UserProfile::from(&saved))
    }

    pub async fn change_password(
        &self,
        actor: &User,
        request: ChangePassword,
    ) -> Result<(), ServiceError> {
        if !self
            .auth
            .verify_password(&request.current_password, &actor.password)
        {
            return Err(ServiceError::BadRequest(
                "Current password is incorrect".to_string(),
            ));
        }

        let hash = self.auth.hash_password(&request.new_password)?;
        self.users
            .transition(actor.id, Filter::All, json!({ "password": hash }))
            .await?
            .ok_or_else(Self::not_found)?;
        Ok(())
    }

    pub async fn verify_email(&self, request: VerifyEmail) -> Result<UserProfile, ServiceError> {
        let user = self.find_by_key(&request.key).await?;
        self.verifications
            .verify(&request.key, &request.token)
            .await?;

        let user = self
            .users
            .transition(user.id, Filter::All, json!({ "verified": true }))
            .await?
            .ok_or_else(Self::not_found)?;
        log::info!("User {} verified their email", user.id);
        Ok(UserProfile::from(&user))
    }

    pub async fn resend_verification(&self, actor: &User) -> Result<(), ServiceError> {
        if actor.verified {
            return Err(ServiceError::BadRequest(
                "Email is already verified".to_string(),
            ));
        }
        self.send_verification(actor).await
    }

    /// Always succeeds so that callers cannot probe for registered emails.
    pub async fn forgot_password(&self, request: ForgotPassword) -> Result<(), ServiceError> {
        let email = request.email.trim().to_lowercase();
        let user = match self.users.query(Filter::eq("email", &email)).one().await? {
            Some(user) => user,
            None => return Ok(()),
        };

        let link = self.resets.create(&user.key).await?;
        self.mailer.send(
            &user.email,
            "Reset your password",
            format!(
                "Hi {},\n\nA password reset was requested for your account. \
                 Open the link below to choose a new password:\n\n{}\n\n\
                 If this was not you, ignore this email.\n",
                user.username, link
            ),
        );
        Ok(())
    }

    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<(), ServiceError> {
        let user = self.find_by_key(&request.key).await?;
        self.resets.verify(&request.key, &request.token).await?;

        let hash = self.auth.hash_password(&request.password)?;
        self.users
            .transition(user.id, Filter::All, json!({ "password": hash }))
            .await?
            .ok_or_else(Self::not_found)?;

        self.mailer.send(
            &user.email,
            "Your password was changed",
            format!("Hi {},\n\nYour password has been reset.\n", user.username),
        );
        Ok(())
    }

    fn list_filter(filter: &UserFilter) -> Filter {
        let mut query = Filter::All;
        if let Some(role) = filter.role {
            query = query.and(Filter::eq("role", role));
        }
        if let Some(status) = filter.status {
            query = query.and(Filter::eq("status", status));
        }
        query
    }

    pub async fn fetch_all(&self, filter: &UserFilter) -> Result<Vec<UserProfile>, ServiceError> {
        let users = self
            .users
            .query(Self::list_filter(filter))
            .newest_first()
            .skip(filter.skip)
            .limit(filter.limit)
            .all()
            .await?;

        Ok(users.iter().map(UserProfile::from).collect())
    }

    pub async fn count(&self, filter: &UserFilter) -> Result<u64, ServiceError> {
        Ok(self.users.query(Self::list_filter(filter)).count().await?)
    }

    pub async fn get(&self, id: &str) -> Result<UserProfile, ServiceError> {
        Ok(UserProfile::from(&self.find(id).await?))
    }

    /// Loads a user an administrator wants to act upon. Nobody manages
    /// their own account through these operations, and only a super admin
    /// may act on peers or superiors.
    async fn managed(&self, actor: &User, id: &str) -> Result<User, ServiceError> {
        let target = self.find(id).await?;
        if target.id == actor.id {
            return Err(ServiceError::BadRequest(
                "You cannot manage your own account".to_string(),
            ));
        }
        if target.role >= actor.role && actor.role != Role::SuperAdmin {
            return Err(ServiceError::Unauthorized(
                "Insufficient permissions".to_string(),
            ));
        }
        Ok(target)
    }

    pub async fn set_status(
        &self,
        actor: &User,
        id: &str,
        status: UserStatus,
    ) -> Result<UserProfile, ServiceError> {
        let target = self.managed(actor, id).await?;
        let user = self
            .users
            .transition(target.id, Filter::All, json!({ "status": status }))
            .await?
            .ok_or_else(Self::not_found)?;

        log::info!("{} set status of {} to {:?}", actor.id, user.id, status);
        Ok(UserProfile::from(&user))
    }

    pub async fn set_role(
        &self,
        actor: &User,
        id: &str,
        role: Role,
    ) -> Result<UserProfile, ServiceError> {
        if actor.role != Role::SuperAdmin {
            return Err(ServiceError::Unauthorized(
                "Insufficient permissions".to_string(),
            ));
        }

        let target = self.managed(actor, id).await?;
        let user = self
            .users
            .transition(target.id, Filter::All, json!({ "role": role }))
            .await?
            .ok_or_else(Self::not_found)?;

        log::info!("{} set role of {} to {:?}", actor.id, user.id, role);
        Ok(UserProfile::from(&user))
    }

    pub async fn adjust_balance(
        &self,
        actor: &User,
        id: &str,
        adjustment: BalanceAdjustment,
    ) -> Result<UserProfile, ServiceError> {
        let target = self.managed(actor, id).await?;
        self.ledger
            .apply(&[Movement::credit(
                target.id,
                adjustment.account,
                adjustment.amount,
            )])
            .await?;

        log::info!(
            "{} adjusted {:?} balance of {} by {}",
            actor.id,
            adjustment.account,
            target.id,
            adjustment.amount
        );
        self.get(id).await
    }

    pub async fn delete(&self, actor: &User, id: &str) -> Result<(), ServiceError> {
        let target = self.managed(actor, id).await?;
        if !self.users.delete(target.id).await? {
            return Err(Self::not_found());
        }

        log::info!("{} deleted user {}", actor.id, target.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountType;
    use crate::services::{mail::MailRequest, testing};
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn new_user(username: &str, referral_code: Option<String>) -> NewUser {
        NewUser {
            email: format!("{}@Example.com", username),
            username: username.to_string(),
            country: "NG".to_string(),
            password: "correct horse".to_string(),
            referral_code,
        }
    }

    /// Pulls the link out of the next queued mail.
    fn mailed_link(mail: &mut mpsc::Receiver<MailRequest>) -> String {
        match mail.try_recv() {
            Ok(MailRequest::Send { body, .. }) => body
                .split_whitespace()
                .find(|word| word.starts_with("https://"))
                .unwrap()
                .to_string(),
            _ => panic!("expected a queued mail"),
        }
    }

    fn parts(link: &str) -> (String, String) {
        let mut segments = link.rsplit('/');
        let token = segments.next().unwrap().to_string();
        let key = segments.next().unwrap().to_string();
        (key, token)
    }

    #[tokio::test]
    async fn registration_sets_up_the_account() {
        let (services, _, mut mail) = testing::services();
        let referrer = services.users.register(new_user("ada", None)).await.unwrap();
        mail.try_recv().unwrap();

        let session = services
            .users
            .register(new_user(
                "grace",
                Some(referrer.user.referral_code.to_lowercase()),
            ))
            .await
            .unwrap();

        let user = &session.user;
        assert_eq!(user.email, "grace@example.com");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.balances.demo, dec!(1000));
        assert_eq!(user.referred_by, Some(referrer.user.id));
        assert!(!user.verified);
        assert!(!session.token.is_empty());
        assert!(mailed_link(&mut mail).contains("/verify-email/"));
    }

    #[tokio::test]
    async fn duplicate_email_or_username_conflicts() {
        let (services, _, _mail) = testing::services();
        services.users.register(new_user("ada", None)).await.unwrap();

        let mut same_email = new_user("other", None);
        same_email.email = "ADA@example.com".to_string();
        assert!(matches!(
            services.users.register(same_email).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            services.users.register(new_user("ada", None)).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn unknown_referral_codes_are_ignored() {
        let (services, _, _mail) = testing::services();
        let session = services
            .users
            .register(new_user("ada", Some("NOPE".to_string())))
            .await
            .unwrap();
        assert_eq!(session.user.referred_by, None);
    }

    #[tokio::test]
    async fn login_by_email_or_username() {
        let (services, _, _mail) = testing::services();
        services.users.register(new_user("ada", None)).await.unwrap();

        for login in ["ada", "ada@example.com"] {
            let session = services
                .users
                .login(LoginRequest {
                    login: login.to_string(),
                    password: "correct horse".to_string(),
                })
                .await
                .unwrap();
            assert_eq!(session.user.username, "ada");
        }

        let wrong = services
            .users
            .login(LoginRequest {
                login: "ada".to_string(),
                password: "wrong password".to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn email_logins_only_match_emails() {
        let (services, _, _mail) = testing::services();
        let mallory = services.users.register(new_user("mallory", None)).await.unwrap();
        services.users.register(new_user("victim", None)).await.unwrap();

        // Stored usernames predating the character rule may still hold an '@'.
        let actor = services.users.find(&mallory.user.id.to_string()).await.unwrap();
        services
            .users
            .update_profile(
                &actor,
                UpdateProfile {
                    username: Some("victim@example.com".to_string()),
                    country: None,
                },
            )
            .await
            .unwrap();

        let session = services
            .users
            .login(LoginRequest {
                login: "Victim@example.com".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(session.user.username, "victim");
    }

    #[tokio::test]
    async fn email_verification_flow() {
        let (services, _, mut mail) = testing::services();
        services.users.register(new_user("ada", None)).await.unwrap();
        let (key, token) = parts(&mailed_link(&mut mail));

        let profile = services
            .users
            .verify_email(VerifyEmail {
                key: key.clone(),
                token: token.clone(),
            })
            .await
            .unwrap();
        assert!(profile.verified);

        let replay = services.users.verify_email(VerifyEmail { key, token }).await;
        assert!(matches!(replay, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let (services, _, mut mail) = testing::services();
        services.users.register(new_user("ada", None)).await.unwrap();
        mail.try_recv().unwrap();

        services
            .users
            .forgot_password(ForgotPassword {
                email: "nobody@example.com".to_string(),
            })
            .await
            .unwrap();
        assert!(mail.try_recv().is_err());

        services
            .users
            .forgot_password(ForgotPassword {
                email: "ada@example.com".to_string(),
            })
            .await
            .unwrap();
        let (key, token) = parts(&mailed_link(&mut mail));

        services
            .users
            .reset_password(ResetPasswordRequest {
                key,
                token,
                password: "battery staple".to_string(),
            })
            .await
            .unwrap();

        let session = services
            .users
            .login(LoginRequest {
                login: "ada".to_string(),
                password: "battery staple".to_string(),
            })
            .await;
        assert!(session.is_ok());
    }

    #[tokio::test]
    async fn suspended_users_cannot_log_in() {
        let (services, store, _mail) = testing::services();
        let session = services.users.register(new_user("ada", None)).await.unwrap();
        let mut admin = testing::user("admin");
        admin.role = Role::Admin;
        Repository::<User>::new(store).insert(&admin).await.unwrap();

        services
            .users
            .set_status(&admin, &session.user.id.to_string(), UserStatus::Suspended)
            .await
            .unwrap();

        let result = services
            .users
            .login(LoginRequest {
                login: "ada".to_string(),
                password: "correct horse".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn admins_cannot_manage_peers_or_themselves() {
        let (services, store, _mail) = testing::services();
        let users = Repository::<User>::new(store);
        let mut admin = testing::user("admin");
        admin.role = Role::Admin;
        let mut peer = testing::user("peer");
        peer.role = Role::Admin;
        users.insert(&admin).await.unwrap();
        users.insert(&peer).await.unwrap();

        let on_peer = services
            .users
            .set_status(&admin, &peer.id.to_string(), UserStatus::Suspended)
            .await;
        assert!(matches!(on_peer, Err(ServiceError::Unauthorized(_))));

        let on_self = services.users.delete(&admin, &admin.id.to_string()).await;
        assert!(matches!(on_self, Err(ServiceError::BadRequest(_))));

        let promote = services
            .users
            .set_role(&admin, &peer.id.to_string(), Role::SuperAdmin)
            .await;
        assert!(matches!(promote, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn balance_adjustments_never_go_negative() {
        let (services, store, _mail) = testing::services();
        let users = Repository::<User>::new(store);
        let mut admin = testing::user("admin");
        admin.role = Role::Admin;
        let customer = testing::user("customer");
        users.insert(&admin).await.unwrap();
        users.insert(&customer).await.unwrap();
        let id = customer.id.to_string();

        let credited = services
            .users
            .adjust_balance(
                &admin,
                &id,
                BalanceAdjustment {
                    account: AccountType::Bonus,
                    amount: dec!(25),
                },
            )
            .await
            .unwrap();
        assert_eq!(credited.balances.bonus, dec!(25));

        let overdrawn = services
            .users
            .adjust_balance(
                &admin,
                &id,
                BalanceAdjustment {
                    account: AccountType::Bonus,
                    amount: dec!(-30),
                },
            )
            .await;
        assert!(matches!(overdrawn, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn admins_cannot_adjust_their_own_or_peer_balances() {
        let (services, store, _mail) = testing::services();
        let users = Repository::<User>::new(store);
        let mut admin = testing::user("admin");
        admin.role = Role::Admin;
        let mut peer = testing::user("peer");
        peer.role = Role::Admin;
        users.insert(&admin).await.unwrap();
        users.insert(&peer).await.unwrap();

        let credit = || BalanceAdjustment {
            account: AccountType::Main,
            amount: dec!(1000000),
        };

        let on_self = services
            .users
            .adjust_balance(&admin, &admin.id.to_string(), credit())
            .await;
        assert!(matches!(on_self, Err(ServiceError::BadRequest(_))));

        let on_peer = services
            .users
            .adjust_balance(&admin, &peer.id.to_string(), credit())
            .await;
        assert!(matches!(on_peer, Err(ServiceError::Unauthorized(_))));

        for id in [admin.id, peer.id] {
            let profile = services.users.get(&id.to_string()).await.unwrap();
            assert_eq!(profile.balances.main, Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn deleted_users_disappear_from_listings() {
        let (services, store, _mail) = testing::services();
        let users = Repository::<User>::new(store);
        let mut admin = testing::user("admin");
        admin.role = Role::SuperAdmin;
        let customer = testing::user("customer");
        users.insert(&admin).await.unwrap();
        users.insert(&customer).await.unwrap();

        services
            .users
            .delete(&admin, &customer.id.to_string())
            .await
            .unwrap();

        let filter = UserFilter::default();
        assert_eq!(services.users.count(&filter).await.unwrap(), 1);
        assert!(matches!(
            services.users.get(&customer.id.to_string()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
