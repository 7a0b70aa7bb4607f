//! Process wiring shared by the binaries.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use crate::adapters::memory::{InMemoryBillingStore, InMemorySubscriberDirectory};
use crate::adapters::portone::PortOneGateway;
use crate::adapters::postgres::PostgresBillingStore;
use crate::application::BillingServices;
use crate::config::{AppConfig, ServerConfig};
use crate::ports::BillingStore;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `server.log_level`. Outside development the output is JSON.
pub fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if server.json_logs() {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Builds the billing services from configuration.
///
/// Uses PostgreSQL when `database.url` is set, the in-memory store otherwise.
pub async fn build_services(
    config: &AppConfig,
) -> Result<BillingServices, Box<dyn std::error::Error + Send + Sync>> {
    let store: Arc<dyn BillingStore> = match config.database.url() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .min_connections(config.database.min_connections)
                .max_connections(config.database.max_connections)
                .acquire_timeout(config.database.acquire_timeout())
                .connect(url)
                .await?;
            let store = PostgresBillingStore::new(pool);
            if config.database.run_migrations {
                store.migrate().await?;
                tracing::info!("Database migrations applied");
            }
            tracing::info!("Using PostgreSQL billing store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("No database URL configured, using in-memory billing store");
            Arc::new(InMemoryBillingStore::new())
        }
    };

    let gateway = Arc::new(PortOneGateway::new(config.gateway.portone())?);

    // contact details are owned by the user service; none are known here
    let directory = Arc::new(InMemorySubscriberDirectory::new());

    Ok(BillingServices::new(
        store,
        gateway,
        directory,
        config.billing.policy(),
    ))
}
