use argon2::password_hash::{rand_core, SaltString};
use argon2::{password_hash, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use crate::db::models::UserAccount;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Password must be at least 6 characters long")]
    PasswordTooShort,
    #[error("Email already exists")]
    EmailExists,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hash(password_hash::Error),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
    hasher: Argon2<'static>,
}

impl UserService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            hasher: Argon2::default(),
        }
    }

    /// Create an account with a salted argon2 hash of the password.
    ///
    /// Uniqueness is check-then-insert; the UNIQUE constraint on `user_email`
    /// backs up the race window between the two statements.
    pub async fn register(&self, email: &str, password: &str) -> Result<UserAccount, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT user_id FROM user_accounts WHERE user_email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(AuthError::EmailExists);
        }

        let password_hash = self.hash_password(password)?;
        let account: UserAccount = sqlx::query_as(
            "INSERT INTO user_accounts (user_email, password_hash, registered_at) \
             VALUES (?, ?, ?) \
             RETURNING *",
        )
        .bind(email)
        .bind(&password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AuthError::EmailExists;
                }
            }
            AuthError::Store(e)
        })?;

        info!(user_id = account.user_id, "user registered");
        Ok(account)
    }

    /// Look up by email and verify the password against the stored hash.
    /// Unknown email and wrong password are deliberately indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserAccount, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail);
        }

        let account: Option<UserAccount> =
            sqlx::query_as("SELECT * FROM user_accounts WHERE user_email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        let Some(account) = account else {
            return Err(AuthError::InvalidCredentials);
        };

        let parsed = PasswordHash::new(&account.password_hash).map_err(AuthError::Hash)?;
        if self
            .hasher
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(account)
    }

    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        let hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(AuthError::Hash)?;
        Ok(hash.to_string())
    }
}

/// Lightweight RFC-shaped address check: one `@`, a non-empty local part and
/// a dotted domain, no whitespace.
pub fn is_valid_email(s: &str) -> bool {
    if s.len() > 254 || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_normal_addresses() {
        for ok in ["user@example.com", "a.b+c@sub.domain.org", "x@y.co"] {
            assert!(is_valid_email(ok), "{ok}");
        }
    }

    #[test]
    fn email_validation_rejects_malformed_addresses() {
        for bad in [
            "",
            "plain",
            "@example.com",
            "user@",
            "user@nodot",
            "user@@example.com",
            "user@.com",
            "user@example.",
            "user@a..b",
            "user name@example.com",
        ] {
            assert!(!is_valid_email(bad), "{bad}");
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn register_stores_argon2_hash(pool: SqlitePool) {
        let service = UserService::new(pool.clone());
        let account = service.register("user@example.com", "secret1").await.unwrap();

        assert_eq!(account.user_email, "user@example.com");
        assert!(account.password_hash.starts_with("$argon2"));
        assert_ne!(account.password_hash, "secret1");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn register_then_login_roundtrip(pool: SqlitePool) {
        let service = UserService::new(pool);
        let created = service.register("user@example.com", "secret1").await.unwrap();

        let logged_in = service.login("user@example.com", "secret1").await.unwrap();
        assert_eq!(logged_in.user_id, created.user_id);

        let err = service.login("user@example.com", "wrong-pass").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = service.login("other@example.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_email_is_rejected_without_insert(pool: SqlitePool) {
        let service = UserService::new(pool.clone());
        service.register("user@example.com", "secret1").await.unwrap();

        let err = service.register("user@example.com", "another1").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));
        assert!(err.to_string().contains("already exists"));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_accounts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn invalid_inputs_never_insert(pool: SqlitePool) {
        let service = UserService::new(pool.clone());

        let err = service.register("", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));

        let err = service.register("user@example.com", "").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));

        let err = service.register("not-an-email", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail));

        let err = service.register("user@example.com", "short").await.unwrap_err();
        assert!(matches!(err, AuthError::PasswordTooShort));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_accounts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }
}
