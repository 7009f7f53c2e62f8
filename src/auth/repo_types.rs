use anyhow::anyhow;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::model::{PendingReset, Role, User},
    error::AuthError,
};

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub password_hash: String,                          // argon2 PHC string
    pub reset_token_hash: Option<String>,               // sha256 hex of the emailed token
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = AuthError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| AuthError::Internal(anyhow!("unknown role `{}` for user {}", row.role, row.id)))?;
        let reset = match (row.reset_token_hash, row.reset_token_expires_at) {
            (Some(token_hash), Some(expires_at)) => Some(PendingReset {
                token_hash,
                expires_at,
            }),
            _ => None,
        };
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role,
            password_hash: row.password_hash,
            reset,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            name: "Ann".into(),
            email: "ann@x.com".into(),
            role: "user".into(),
            password_hash: "$argon2id$v=19$...".into(),
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn half_set_reset_columns_mean_no_pending_reset() {
        let mut r = row();
        r.reset_token_hash = Some("abc".into());
        let user = User::try_from(r).unwrap();
        assert!(user.reset.is_none());
    }

    #[test]
    fn full_reset_columns_are_kept() {
        let mut r = row();
        let expires_at = OffsetDateTime::now_utc();
        r.reset_token_hash = Some("abc".into());
        r.reset_token_expires_at = Some(expires_at);
        let user = User::try_from(r).unwrap();
        assert_eq!(
            user.reset,
            Some(PendingReset {
                token_hash: "abc".into(),
                expires_at
            })
        );
    }

    #[test]
    fn unknown_role_is_internal() {
        let mut r = row();
        r.role = "admin".into();
        assert!(matches!(User::try_from(r), Err(AuthError::Internal(_))));
    }
}
