use std::sync::Arc;

use academy_config::{DatabaseConfig, EmailConfig, PolicyConfig};
use academy_db::init_db_pool;
use tracing::info;

use crate::events::{EventSink, MailEventSink, TracingEventSink};
use crate::store::{PgStore, Store};

/// Everything a service call needs besides the caller's context.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: Arc<dyn EventSink>,
    pub policy: PolicyConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventSink>, policy: PolicyConfig) -> Self {
        Self {
            store,
            events,
            policy,
        }
    }
}

/// Builds the production state: PostgreSQL store, mail or log event sink,
/// and policies from the environment.
pub async fn init_app_state() -> anyhow::Result<AppState> {
    let database = DatabaseConfig::from_env()?;
    let pool = init_db_pool(&database).await?;
    let store = PgStore::new(pool, database.lock_timeout);

    let email = EmailConfig::from_env();
    let events: Arc<dyn EventSink> = if email.enabled {
        info!(notify = %email.notify_email, "mailing domain events");
        Arc::new(MailEventSink::new(&email)?)
    } else {
        Arc::new(TracingEventSink)
    };

    Ok(AppState::new(Arc::new(store), events, PolicyConfig::from_env()?))
}
