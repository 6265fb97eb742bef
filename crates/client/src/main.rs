//! Luci client - headless entry point
//!
//! `luci-client listen`           connect and log booking lifecycle pushes
//! `luci-client recommendations`  print the current recommendation cards
//! `luci-client inbox`            print conversations and the current booking
//! `luci-client logout`           forget the saved session

use anyhow::Context;
use luci_client::{
    inbox, recommendations, ApiClient, BookingEventRouter, BookingHandlers, ClientConfig,
    OutcomeLedger, SessionStore, Storage, TransportManager,
};
use luci_shared::{BookingOutcome, SessionIdentity};
use tracing_subscriber::EnvFilter;

fn resolve_identity(sessions: &SessionStore) -> anyhow::Result<SessionIdentity> {
    if let Ok(user_id) = std::env::var("LUCI_USER_ID") {
        let identity = SessionIdentity {
            user_id,
            display_name: std::env::var("LUCI_USER_NAME").ok(),
            email: std::env::var("LUCI_USER_EMAIL").ok(),
        };
        sessions.save(&identity).context("saving session")?;
        return Ok(identity);
    }
    sessions
        .load()
        .context("no saved session; set LUCI_USER_ID to sign in")
}

fn log_outcome(ledger: &OutcomeLedger, outcome: BookingOutcome) {
    if !ledger.first_time(&outcome) {
        tracing::debug!(booking_id = outcome.booking_id().unwrap_or("?"), "repeat push ignored");
        return;
    }
    match outcome {
        BookingOutcome::Accepted { booking_id, conversation_id, salon_owner_id, .. } => tracing::info!(
            booking_id,
            conversation_id,
            salon_owner_id = salon_owner_id.as_deref().unwrap_or("?"),
            "booking accepted"
        ),
        BookingOutcome::Rejected { booking_id, .. } => tracing::info!(booking_id, "booking rejected"),
        BookingOutcome::ChatRoomCreated { conversation_id, salon_owner_name, .. } => tracing::info!(
            conversation_id,
            salon = salon_owner_name.as_deref().unwrap_or("?"),
            "chat room created"
        ),
        BookingOutcome::StatusUpdate { booking_id, status, .. } => {
            tracing::info!(booking_id, status, "booking status changed")
        }
    }
}

async fn listen(config: &ClientConfig, identity: &SessionIdentity) -> anyhow::Result<()> {
    let transport = TransportManager::from_config(config);
    let ledger = OutcomeLedger::new();

    let handlers = {
        let (a, r, c, s) = (ledger.clone(), ledger.clone(), ledger.clone(), ledger);
        BookingHandlers::new()
            .on_accepted(move |o| log_outcome(&a, o))
            .on_rejected(move |o| log_outcome(&r, o))
            .on_chat_room_created(move |o| log_outcome(&c, o))
            .on_status_update(move |o| log_outcome(&s, o))
    };
    let subscription = BookingEventRouter::new(transport.clone()).subscribe(&identity.user_id, handlers);

    let mut states = transport.watch_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow().clone();
                tracing::info!("connection state: {:?}", state);
                if state.is_failed() {
                    anyhow::bail!("realtime connection failed: {:?}", state);
                }
            }
        }
    }

    subscription.unsubscribe();
    transport.disconnect();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("luci_client=debug")),
        )
        .init();

    let config = ClientConfig::from_env();
    let storage = Storage::platform_default().context("no platform config directory")?;
    let sessions = SessionStore::new(storage);
    let command = std::env::args().nth(1).unwrap_or_else(|| "listen".to_string());

    match command.as_str() {
        "logout" => {
            sessions.clear().context("clearing session")?;
            tracing::info!("session cleared");
        }
        "recommendations" => {
            let identity = resolve_identity(&sessions)?;
            let api = ApiClient::from_config(&config);
            for studio in recommendations::fetch_studios(&api, &identity.user_id, None).await? {
                println!(
                    "{:<24} {:>5} {:.1}★  {}",
                    studio.name, studio.price, studio.rating, studio.location
                );
            }
        }
        "inbox" => {
            let identity = resolve_identity(&sessions)?;
            let api = ApiClient::from_config(&config);
            let inbox = inbox::fetch_inbox(&api, &identity.user_id).await?;
            if let Some(current) = &inbox.current_booking {
                println!("current booking: {}", current.name.as_deref().unwrap_or(&current.id));
            }
            for conversation in &inbox.conversations {
                println!(
                    "{:<24} {}",
                    conversation.name.as_deref().unwrap_or(&conversation.id),
                    conversation.status.as_deref().unwrap_or("-")
                );
            }
        }
        "listen" => {
            let identity = resolve_identity(&sessions)?;
            listen(&config, &identity).await?;
        }
        other => anyhow::bail!("unknown command {other:?}; expected listen, recommendations, inbox or logout"),
    }
    Ok(())
}
