use crate::errors::{AppError, AppResult};
use crate::models::{AuthSession, UserCredential};
use crate::policy::validate_user_id;
use chrono::{Duration, Utc};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

pub type AuthFuture<'a> = Pin<Box<dyn Future<Output = AppResult<AuthSession>> + Send + 'a>>;

pub trait Authenticator: Send + Sync {
    fn validate(&self, username: &str, password: &str) -> AppResult<()> {
        if username.trim().is_empty() {
            return Err(AppError::Auth("Username cannot be empty".to_string()));
        }
        if password.is_empty() {
            return Err(AppError::Auth("Password cannot be empty".to_string()));
        }
        Ok(())
    }

    fn authenticate<'a>(&'a self, username: &'a str, password: &'a str) -> AuthFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    users: Vec<UserCredential>,
    token_ttl: Duration,
}

impl StaticAuthenticator {
    pub fn new(users: Vec<UserCredential>, token_ttl_minutes: i64) -> Self {
        Self {
            users,
            token_ttl: Duration::minutes(token_ttl_minutes),
        }
    }

    fn lookup(&self, username: &str, password: &str) -> AppResult<&UserCredential> {
        let user = self
            .users
            .iter()
            .find(|user| user.username.eq_ignore_ascii_case(username.trim()))
            .ok_or_else(|| AppError::Auth("Incorrect username or password".to_string()))?;
        if !constant_time_eq(user.password.as_bytes(), password.as_bytes()) {
            return Err(AppError::Auth("Incorrect username or password".to_string()));
        }
        Ok(user)
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate<'a>(&'a self, username: &'a str, password: &'a str) -> AuthFuture<'a> {
        Box::pin(async move {
            self.validate(username, password)?;
            let user = self.lookup(username, password)?;
            validate_user_id(&user.user_id).map_err(|error| AppError::Auth(error.to_string()))?;
            Ok(AuthSession {
                user_id: user.user_id.clone(),
                access_token: Uuid::new_v4().simple().to_string(),
                expires_at: Utc::now() + self.token_ttl,
            })
        })
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> StaticAuthenticator {
        StaticAuthenticator::new(
            vec![UserCredential {
                username: "user@example.com".to_string(),
                password: "user-password".to_string(),
                user_id: "7d9f1c2a-0b4e-4c55-9a1e-3f2b6c8d0e11".to_string(),
            }],
            30,
        )
    }

    #[tokio::test]
    async fn returns_stable_user_id_and_fresh_token() {
        let auth = authenticator();
        let first = auth
            .authenticate("User@Example.com", "user-password")
            .await
            .expect("sign in");
        let second = auth
            .authenticate("user@example.com", "user-password")
            .await
            .expect("sign in again");

        assert_eq!(first.user_id, "7d9f1c2a-0b4e-4c55-9a1e-3f2b6c8d0e11");
        assert_eq!(first.user_id, second.user_id);
        assert_ne!(first.access_token, second.access_token);
        assert!(first.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_identical() {
        let auth = authenticator();
        let wrong = auth
            .authenticate("user@example.com", "nope")
            .await
            .expect_err("wrong password");
        let unknown = auth
            .authenticate("ghost@example.com", "nope")
            .await
            .expect_err("unknown user");
        assert!(matches!(wrong, AppError::Auth(_)));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn blank_credentials_are_rejected_before_lookup() {
        let error = authenticator()
            .authenticate("  ", "pw")
            .await
            .expect_err("blank username");
        assert!(error.to_string().contains("Username cannot be empty"));
    }
}
