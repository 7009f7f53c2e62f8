use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    auth::{
        delivery::{LogSender, ResetTokenSender},
        repo::{MemoryUserStore, PgUserStore, UserStore},
    },
    config::AppConfig,
};

/// The user store relies on the schema, so a failed migration stops startup.
pub async fn run_migrations(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub reset_sender: Arc<dyn ResetTokenSender>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                run_migrations(&db).await?;
                Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory");
                Arc::new(MemoryUserStore::default()) as Arc<dyn UserStore>
            }
        };

        Ok(Self::from_parts(users, config, Arc::new(LogSender)))
    }

    pub fn from_parts(
        users: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        reset_sender: Arc<dyn ResetTokenSender>,
    ) -> Self {
        Self {
            users,
            config,
            reset_sender,
        }
    }

    /// In-memory state for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_sender(Arc::new(LogSender))
    }

    #[cfg(test)]
    pub fn fake_with_sender(reset_sender: Arc<dyn ResetTokenSender>) -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
        });
        Self::from_parts(Arc::new(MemoryUserStore::default()), config, reset_sender)
    }
}
