mod from_row;
pub mod queries;
mod schema;

pub use from_row::FromRow;
pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::payments::PaymentClients;
use crate::risk::{BotChecker, IpReputationClient};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    /// Provider API clients (checkout metadata, webhook verification, refunds).
    pub payments: Arc<PaymentClients>,
    /// Server-side challenge verification for bot scoring.
    pub bot_checker: BotChecker,
    /// IP reputation lookups, cached per IP.
    pub ip_reputation: IpReputationClient,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            payments: Arc::new(PaymentClients::from_config(&config)),
            bot_checker: BotChecker::from_config(&config),
            ip_reputation: IpReputationClient::from_config(&config),
            db,
            config,
        }
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
