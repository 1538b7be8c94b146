use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccountType;
use crate::repositories::Document;
use crate::services::ServiceError;
use crate::validation::{Checks, Validate};

/// Privilege rank. Declaration order is the ranking: a caller satisfies a
/// route when its role compares greater than or equal to the required one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Suspended,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Balances {
    pub main: Decimal,
    pub bonus: Decimal,
    pub referral: Decimal,
    pub demo: Decimal,
}

impl Balances {
    pub fn get(&self, account: AccountType) -> Decimal {
        match account {
            AccountType::Main => self.main,
            AccountType::Bonus => self.bonus,
            AccountType::Referral => self.referral,
            AccountType::Demo => self.demo,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Stable public identifier used to key one-time tokens.
    pub key: String,
    pub email: String,
    pub username: String,
    pub country: String,
    pub password: String,
    pub role: Role,
    pub status: UserStatus,
    pub balances: Balances,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub verified: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Staff read and settle every account's records.
    pub fn is_staff(&self) -> bool {
        self.role >= Role::Admin
    }
}

impl Document for User {
    const COLLECTION: &'static str = "users";
    const SOFT_DELETE: bool = true;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// What clients get to see of a user.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub key: String,
    pub email: String,
    pub username: String,
    pub country: String,
    pub role: Role,
    pub status: UserStatus,
    pub balances: Balances,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub verified: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            id: user.id,
            key: user.key.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            country: user.country.clone(),
            role: user.role,
            status: user.status,
            balances: user.balances.clone(),
            referral_code: user.referral_code.clone(),
            referred_by: user.referred_by,
            verified: user.verified,
            is_deleted: user.is_deleted,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Reduced view attached to records that reference a user.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_deleted: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_deleted: user.is_deleted,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub country: String,
    pub password: String,
    pub referral_code: Option<String>,
}

// Usernames never contain '@', so they cannot collide with an email login.
fn check_username(checks: Checks, username: &str) -> Checks {
    checks.length("username", username, 3, 32).check(
        username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "username",
        "username may only contain letters, digits and underscores",
    )
}

impl Validate for NewUser {
    fn validate(&self) -> Result<(), ServiceError> {
        check_username(Checks::new().email("email", &self.email), &self.username)
            .required("country", &self.country)
            .length("password", &self.password, 8, 128)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email address or username.
    pub login: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("login", &self.login)
            .required("password", &self.password)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub username: Option<String>,
    pub country: Option<String>,
}

impl Validate for UpdateProfile {
    fn validate(&self) -> Result<(), ServiceError> {
        let mut checks = Checks::new();
        if let Some(username) = &self.username {
            checks = check_username(checks, username);
        }
        if let Some(country) = &self.country {
            checks = checks.required("country", country);
        }
        checks.finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

impl Validate for ChangePassword {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("currentPassword", &self.current_password)
            .length("newPassword", &self.new_password, 8, 128)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmail {
    pub key: String,
    pub token: String,
}

impl Validate for VerifyEmail {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("key", &self.key)
            .required("token", &self.token)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ForgotPassword {
    pub email: String,
}

impl Validate for ForgotPassword {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new().email("email", &self.email).finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub key: String,
    pub token: String,
    pub password: String,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("key", &self.key)
            .required("token", &self.token)
            .length("password", &self.password, 8, 128)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateUserStatus {
    pub status: UserStatus,
}

impl Validate for UpdateUserStatus {
    fn validate(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateRole {
    pub role: Role,
}

impl Validate for UpdateRole {
    fn validate(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Manual credit (positive) or debit (negative) made by an administrator.
#[derive(Clone, Debug, Deserialize)]
pub struct BalanceAdjustment {
    pub account: AccountType,
    pub amount: Decimal,
}

impl Validate for BalanceAdjustment {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .check(!self.amount.is_zero(), "amount", "amount must not be zero")
            .finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ranked() {
        assert!(Role::User < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
        assert_eq!(serde_json::to_value(Role::SuperAdmin).unwrap(), "SUPER_ADMIN");
    }

    #[test]
    fn new_user_rejects_bad_usernames() {
        let user = NewUser {
            email: "jane@example.com".to_string(),
            username: "jane doe".to_string(),
            country: "NG".to_string(),
            password: "correct horse".to_string(),
            referral_code: None,
        };
        assert!(user.validate().is_err());
    }

    #[test]
    fn profile_update_rejects_email_shaped_usernames() {
        let update = UpdateProfile {
            username: Some("victim@example.com".to_string()),
            country: None,
        };
        assert!(update.validate().is_err());

        let update = UpdateProfile {
            username: Some("jane_doe2".to_string()),
            country: Some("NG".to_string()),
        };
        assert!(update.validate().is_ok());
    }
}
