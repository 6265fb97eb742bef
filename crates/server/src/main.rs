//! Luci OTP Server
//!
//! A small Axum service that mails one-time verification codes and checks
//! them on the way back.

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod mailer;
mod otp;
mod routes;
mod state;

use config::{MailTransport, ServerConfig};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "luci_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    match &config.mail {
        MailTransport::Log => tracing::warn!("LUCI_MAIL_RELAY_URL not set; codes are logged, not mailed"),
        MailTransport::Relay { url, .. } => tracing::info!("Mail relay: {} as {}", url, config.sender),
    }
    let addr = config.addr;
    let state = AppState::new(config);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("OTP Email Service listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
