use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::info;

use crate::auth::model::User;

/// Gets a plaintext reset token to its owner, e.g. by email.
#[async_trait]
pub trait ResetTokenSender: Send + Sync {
    async fn send_reset_token(
        &self,
        user: &User,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()>;
}

/// Records that a reset was requested. The token itself is not written anywhere.
#[derive(Clone, Default)]
pub struct LogSender;

#[async_trait]
impl ResetTokenSender for LogSender {
    async fn send_reset_token(
        &self,
        user: &User,
        _token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        info!(user_id = %user.id, email = %user.email, %expires_at, "password reset requested");
        Ok(())
    }
}
