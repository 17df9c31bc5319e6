pub mod api;
pub mod config;
pub mod db;
pub mod notifications;

pub use db::DbPool;

use config::Config;
use notifications::EmailService;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub email: EmailService,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let email = EmailService::new(config.email.clone());
        Self { config, db, email }
    }
}
