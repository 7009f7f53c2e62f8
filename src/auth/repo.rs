use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    postgres::PgArguments,
    query::QueryAs,
    PgPool, Postgres,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        model::{User, EMAIL_TAKEN},
        repo_types::UserRow,
    },
    error::AuthError,
};

/// Storage for user records. Implementations enforce email uniqueness.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: User) -> Result<User, AuthError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;
    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, AuthError>;
    async fn email_taken(&self, email: &str) -> Result<bool, AuthError>;
    async fn save(&self, user: &User) -> Result<(), AuthError>;
    /// Writes the user's new password hash and clears the pending reset, but
    /// only while the stored reset still carries `token_hash`. Otherwise
    /// `AuthError::ResetToken` and nothing is written.
    async fn complete_reset(&self, user: &User, token_hash: &str) -> Result<(), AuthError>;
    /// Returns `false` when no such user existed.
    async fn delete(&self, id: Uuid) -> Result<bool, AuthError>;
}

const USER_COLUMNS: &str = "id, name, email, role, password_hash, \
                            reset_token_hash, reset_token_expires_at, created_at";

fn map_write_error(e: sqlx::Error, what: &'static str) -> AuthError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return AuthError::Duplicate(EMAIL_TAKEN.to_string());
        }
    }
    AuthError::Internal(anyhow::Error::new(e).context(what))
}

type UserQuery<'q> = QueryAs<'q, Postgres, UserRow, PgArguments>;

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_optional(&self, query: UserQuery<'_>) -> Result<Option<User>, AuthError> {
        let row = query
            .fetch_optional(&self.db)
            .await
            .context("select user")?;
        row.map(User::try_from).transpose()
    }
}

fn select_where(clause: &str) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}")
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: User) -> Result<User, AuthError> {
        let (reset_hash, reset_expires) = match &user.reset {
            Some(r) => (Some(r.token_hash.clone()), Some(r.expires_at)),
            None => (None, None),
        };
        let sql = format!(
            r#"
            INSERT INTO users ({USER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.role.as_str())
            .bind(&user.password_hash)
            .bind(reset_hash)
            .bind(reset_expires)
            .bind(user.created_at)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_write_error(e, "insert user"))?;
        User::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let sql = select_where("id = $1");
        self.fetch_optional(sqlx::query_as(&sql).bind(id)).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let sql = select_where("email = $1");
        self.fetch_optional(sqlx::query_as(&sql).bind(email)).await
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, AuthError> {
        let sql = select_where("reset_token_hash = $1");
        self.fetch_optional(sqlx::query_as(&sql).bind(token_hash))
            .await
    }

    async fn email_taken(&self, email: &str) -> Result<bool, AuthError> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.db)
            .await
            .context("check email")?;
        Ok(taken)
    }

    async fn save(&self, user: &User) -> Result<(), AuthError> {
        let (reset_hash, reset_expires) = match &user.reset {
            Some(r) => (Some(r.token_hash.as_str()), Some(r.expires_at)),
            None => (None, None),
        };
        let result = sqlx::query(
            r#"
            UPDATE users
               SET name = $2,
                   email = $3,
                   role = $4,
                   password_hash = $5,
                   reset_token_hash = $6,
                   reset_token_expires_at = $7
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(reset_hash)
        .bind(reset_expires)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, "update user"))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("User"));
        }
        Ok(())
    }

    async fn complete_reset(&self, user: &User, token_hash: &str) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2,
                   reset_token_hash = NULL,
                   reset_token_expires_at = NULL
             WHERE id = $1
               AND reset_token_hash = $3
            "#,
        )
        .bind(user.id)
        .bind(&user.password_hash)
        .bind(token_hash)
        .execute(&self.db)
        .await
        .context("complete reset")?;

        if result.rows_affected() == 0 {
            return Err(AuthError::ResetToken);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(result.rows_affected() > 0)
    }
}

/// Keeps users in a map. Used for local runs without `DATABASE_URL` and in tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: User) -> Result<User, AuthError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(AuthError::Duplicate(EMAIL_TAKEN.to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| matches!(&u.reset, Some(r) if r.token_hash == token_hash))
            .cloned())
    }

    async fn email_taken(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.users.read().await.values().any(|u| u.email == email))
    }

    async fn save(&self, user: &User) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(AuthError::Duplicate(EMAIL_TAKEN.to_string()));
        }
        match users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(AuthError::NotFound("User")),
        }
    }

    async fn complete_reset(&self, user: &User, token_hash: &str) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let slot = users
            .get_mut(&user.id)
            .filter(|stored| matches!(&stored.reset, Some(r) if r.token_hash == token_hash))
            .ok_or(AuthError::ResetToken)?;
        slot.password_hash = user.password_hash.clone();
        slot.reset = None;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AuthError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}
