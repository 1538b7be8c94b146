use std::sync::Arc;

use chrono::Utc;

use super::auth::{random_string, sha256_hex};
use super::ServiceError;
use crate::models::tokens::OneTimeToken;
use crate::repositories::{Filter, Repository, Store};

const TOKEN_LENGTH: usize = 48;

/// Issues and redeems single-use links of kind `T`.
pub struct TokenService<T> {
    tokens: Repository<T>,
    ttl: chrono::Duration,
    frontend_link: String,
}

impl<T: OneTimeToken> TokenService<T> {
    pub fn new(store: Arc<dyn Store>, ttl: chrono::Duration, frontend_link: &str) -> Self {
        TokenService {
            tokens: Repository::new(store),
            ttl,
            frontend_link: frontend_link.trim_end_matches('/').to_string(),
        }
    }

    /// Replaces any outstanding token for `key` and returns the link to mail.
    pub async fn create(&self, key: &str) -> Result<String, ServiceError> {
        self.tokens.delete_where(Filter::eq("key", key)).await?;

        let token = random_string(TOKEN_LENGTH);
        let row = T::issue(key.to_string(), sha256_hex(&token), Utc::now() + self.ttl);
        self.tokens.insert(&row).await?;

        Ok(format!(
            "{}/{}/{}/{}",
            self.frontend_link,
            T::VERB,
            key,
            token
        ))
    }

    pub async fn verify(&self, key: &str, token: &str) -> Result<(), ServiceError> {
        let row = self
            .tokens
            .query(Filter::eq("key", key))
            .one()
            .await?
            .ok_or_else(|| ServiceError::BadRequest("Invalid or expired link".to_string()))?;

        if row.expires_at() < Utc::now() {
            self.tokens.delete(row.id()).await?;
            return Err(ServiceError::BadRequest("Link has expired".to_string()));
        }

        if row.token_hash() != sha256_hex(token) {
            return Err(ServiceError::BadRequest("Invalid or expired link".to_string()));
        }

        // Whoever removes the row redeems it.
        if !self.tokens.delete(row.id()).await? {
            return Err(ServiceError::BadRequest("Invalid or expired link".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tokens::{EmailVerification, ResetPassword};
    use crate::repositories::memory::MemoryStore;

    fn service<T: OneTimeToken>(ttl: chrono::Duration) -> (TokenService<T>, Repository<T>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        (
            TokenService::new(store.clone(), ttl, "https://app.coinvest.test/"),
            Repository::new(store),
        )
    }

    fn token_of(link: &str) -> &str {
        link.rsplit('/').next().unwrap()
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let (tokens, rows) = service::<EmailVerification>(chrono::Duration::minutes(10));
        let link = tokens.create("user-key").await.unwrap();

        assert!(link.starts_with("https://app.coinvest.test/verify-email/user-key/"));
        tokens.verify("user-key", token_of(&link)).await.unwrap();
        assert_eq!(rows.query(Filter::All).count().await.unwrap(), 0);

        let again = tokens.verify("user-key", token_of(&link)).await;
        assert!(matches!(again, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn expired_token_fails_and_is_removed() {
        let (tokens, rows) = service::<ResetPassword>(chrono::Duration::minutes(-1));
        let link = tokens.create("user-key").await.unwrap();

        let result = tokens.verify("user-key", token_of(&link)).await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        assert_eq!(rows.query(Filter::All).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let (tokens, rows) = service::<EmailVerification>(chrono::Duration::minutes(10));
        tokens.create("user-key").await.unwrap();

        let result = tokens.verify("user-key", "guess").await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        assert_eq!(rows.query(Filter::All).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn new_token_invalidates_the_previous_one() {
        let (tokens, _) = service::<EmailVerification>(chrono::Duration::minutes(10));
        let first = tokens.create("user-key").await.unwrap();
        let second = tokens.create("user-key").await.unwrap();

        assert!(tokens.verify("user-key", token_of(&first)).await.is_err());
        tokens.verify("user-key", token_of(&second)).await.unwrap();
    }
}
