use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ServiceError;
use crate::models::users::{Role, User, UserStatus};
use crate::repositories::{Repository, Store};
use crate::settings;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

pub fn random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Credentials, bearer tokens and CSRF tokens.
pub struct AuthService {
    users: Repository<User>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: chrono::Duration,
    csrf_secret: String,
    argon2: Argon2<'static>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, settings: &settings::Auth) -> Self {
        let params = Params::new(
            settings.argon2_memory_kib,
            settings.argon2_iterations,
            1,
            None,
        )
        .unwrap_or_else(|e| {
            log::warn!("Invalid argon2 parameters ({}), using defaults.", e);
            Params::default()
        });

        AuthService {
            users: Repository::new(store),
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            token_ttl: chrono::Duration::hours(settings.token_ttl_hours),
            csrf_secret: settings.csrf_secret.clone(),
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, ServiceError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ServiceError::Internal(format!("Could not hash password: {}", e)))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                log::warn!("Stored password hash is unreadable: {}", e);
                false
            }
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.token_ttl).timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(format!("Could not sign token: {}", e)))
    }

    /// Resolves the acting user from an `Authorization` header value and
    /// checks it may reach a route that requires `required`.
    pub async fn authorize(
        &self,
        header: Option<&str>,
        required: Role,
    ) -> Result<User, ServiceError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("Authentication token missing".to_string()))?;

        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| ServiceError::Unauthorized("Invalid or expired token".to_string()))?
            .claims;

        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("User not found".to_string()))?;

        if user.status != UserStatus::Active {
            return Err(ServiceError::Unauthorized(
                "Account is suspended".to_string(),
            ));
        }

        if user.role < required {
            log::warn!(
                "User {} with role {:?} denied access to a {:?} route",
                user.id,
                user.role,
                required
            );
            return Err(ServiceError::Unauthorized(
                "Insufficient permissions".to_string(),
            ));
        }

        Ok(user)
    }

    pub fn new_csrf_secret(&self) -> String {
        random_string(32)
    }

    pub fn csrf_token(&self, secret: &str) -> String {
        sha256_hex(&format!("{}:{}", self.csrf_secret, secret))
    }

    pub fn verify_csrf(&self, secret: Option<&str>, token: Option<&str>) -> bool {
        match (secret, token) {
            (Some(secret), Some(token)) if !secret.is_empty() => self.csrf_token(secret) == token,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    async fn setup(role: Role, status: UserStatus) -> (Arc<AuthService>, User) {
        let (services, store, _mail) = testing::services();
        let mut user = testing::user("alice");
        user.role = role;
        user.status = status;
        Repository::<User>::new(store).insert(&user).await.unwrap();
        (services.auth.clone(), user)
    }

    #[tokio::test]
    async fn valid_token_resolves_user() {
        let (auth, user) = setup(Role::Admin, UserStatus::Active).await;
        let header = format!("Bearer {}", auth.issue_token(&user).unwrap());

        let resolved = auth.authorize(Some(&header), Role::Admin).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn lower_role_is_rejected() {
        let (auth, user) = setup(Role::User, UserStatus::Active).await;
        let header = format!("Bearer {}", auth.issue_token(&user).unwrap());

        let result = auth.authorize(Some(&header), Role::Admin).await;
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn suspended_user_is_rejected() {
        let (auth, user) = setup(Role::SuperAdmin, UserStatus::Suspended).await;
        let header = format!("Bearer {}", auth.issue_token(&user).unwrap());

        let result = auth.authorize(Some(&header), Role::User).await;
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn missing_or_malformed_tokens_are_rejected() {
        let (auth, _) = setup(Role::User, UserStatus::Active).await;

        for header in [None, Some("Token abc"), Some("Bearer "), Some("Bearer not.a.jwt")] {
            let result = auth.authorize(header, Role::User).await;
            assert!(matches!(result, Err(ServiceError::Unauthorized(_))), "{:?}", header);
        }
    }

    #[tokio::test]
    async fn passwords_round_trip() {
        let (auth, _) = setup(Role::User, UserStatus::Active).await;
        let hash = auth.hash_password("correct horse").unwrap();

        assert!(auth.verify_password("correct horse", &hash));
        assert!(!auth.verify_password("battery staple", &hash));
        assert!(!auth.verify_password("correct horse", "garbage"));
    }

    #[tokio::test]
    async fn csrf_tokens_are_bound_to_the_cookie_secret() {
        let (auth, _) = setup(Role::User, UserStatus::Active).await;
        let secret = auth.new_csrf_secret();
        let token = auth.csrf_token(&secret);

        assert!(auth.verify_csrf(Some(&secret), Some(&token)));
        assert!(!auth.verify_csrf(Some("other"), Some(&token)));
        assert!(!auth.verify_csrf(None, Some(&token)));
        assert!(!auth.verify_csrf(Some(&secret), None));
    }
}
