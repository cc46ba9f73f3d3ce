//! Long-lived state shared by every handler.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

use stockadoodle_activity::ActivityEntry;
use stockadoodle_auth::{CodeDelivery, Hs256Jwt, LogDelivery, MfaService};
use stockadoodle_infra::{AppConfig, DynStore, InMemoryStore, SqliteStore, seed_defaults};

pub struct AppServices {
    pub config: AppConfig,
    pub store: DynStore,
    pub jwt: Hs256Jwt,
    pub mfa: MfaService,
    pub delivery: Arc<dyn CodeDelivery>,
}

impl AppServices {
    pub fn new(config: AppConfig, store: DynStore, delivery: Arc<dyn CodeDelivery>) -> Self {
        let jwt = Hs256Jwt::new(config.jwt_secret.as_bytes(), config.token_ttl);
        let mfa = MfaService::new(config.mfa.clone());
        Self {
            config,
            store,
            jwt,
            mfa,
            delivery,
        }
    }

    /// Open the configured store, seed it when asked to, and deliver MFA
    /// codes through the tracing log.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store: DynStore = if config.use_persistent_stores {
            let sqlite = SqliteStore::connect(&config.database_url)
                .await
                .with_context(|| format!("opening {}", config.database_url))?;
            tracing::info!(url = %config.database_url, "using sqlite store");
            Arc::new(sqlite)
        } else {
            tracing::info!("using in-memory store");
            Arc::new(InMemoryStore::new())
        };

        if config.seed_defaults {
            seed_defaults(store.as_ref(), &config.seed_admin_password, Utc::now()).await?;
        }

        Ok(Self::new(config, store, Arc::new(LogDelivery)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Append an entry; a failure is logged and otherwise ignored.
    pub async fn record(&self, entry: ActivityEntry) {
        tracing::debug!(action = %entry.action, source = %entry.source, "activity");
        if let Err(e) = self.store.append_activity(entry).await {
            tracing::error!(error = %e, "failed to record activity");
        }
    }
}
