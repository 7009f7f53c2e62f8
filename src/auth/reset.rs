use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::model::{check_password_len, PasswordUpdate, PendingReset, Plaintext, User},
    error::AuthError,
};

pub const RESET_TOKEN_BYTES: usize = 20;
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

/// Plaintext reset token handed to the delivery channel. Never persisted.
pub struct IssuedResetToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

impl std::fmt::Debug for IssuedResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedResetToken")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn issue_reset_token(user: &mut User) -> IssuedResetToken {
    issue_reset_token_at(user, OffsetDateTime::now_utc())
}

/// Replaces any pending reset; only the newest token can ever validate.
pub fn issue_reset_token_at(user: &mut User, now: OffsetDateTime) -> IssuedResetToken {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let expires_at = now + RESET_TOKEN_TTL;

    user.reset = Some(PendingReset {
        token_hash: hash_token(&token),
        expires_at,
    });
    debug!(user_id = %user.id, %expires_at, "reset token issued");

    IssuedResetToken { token, expires_at }
}

/// Checks a presented token against the pending reset without changing anything.
pub fn check_reset_token(user: &User, presented: &str, now: OffsetDateTime) -> Result<(), AuthError> {
    let pending = user.reset.as_ref().ok_or(AuthError::ResetToken)?;
    let presented_hash = hash_token(presented.trim());
    let matches: bool = presented_hash
        .as_bytes()
        .ct_eq(pending.token_hash.as_bytes())
        .into();
    if !matches {
        return Err(AuthError::ResetToken);
    }
    if pending.expires_at < now {
        debug!(user_id = %user.id, "reset token expired");
        return Err(AuthError::ResetToken);
    }
    Ok(())
}

pub async fn consume_reset_token(
    user: &mut User,
    presented: &str,
    new_password: Plaintext,
) -> Result<(), AuthError> {
    consume_reset_token_at(user, presented, new_password, OffsetDateTime::now_utc()).await
}

/// On success the password is rehashed and the pending reset cleared together.
/// On failure the user is left exactly as it was.
pub async fn consume_reset_token_at(
    user: &mut User,
    presented: &str,
    new_password: Plaintext,
    now: OffsetDateTime,
) -> Result<(), AuthError> {
    check_reset_token(user, presented, now)?;
    check_password_len(&new_password)?;

    user.apply_password(PasswordUpdate::Set(new_password)).await?;
    user.reset = None;
    debug!(user_id = %user.id, "reset token consumed");
    Ok(())
}
