//! Application state shared across request handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::mailer::{self, Mailer};
use crate::otp::OtpStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub otps: Arc<OtpStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let mailer: Arc<dyn Mailer> = Arc::from(mailer::from_config(&config));
        Self::with_mailer(config, mailer)
    }

    pub fn with_mailer(config: ServerConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            otps: Arc::new(OtpStore::new(config.otp_ttl)),
            config: Arc::new(config),
            mailer,
        }
    }
}
