//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_OTP_TTL_SECS: u64 = 600;
const DEFAULT_APP_NAME: &str = "Luci";
const DEFAULT_SENDER: &str = "no-reply@localhost";

/// Where outgoing mail is handed off.
#[derive(Debug, Clone, PartialEq)]
pub enum MailTransport {
    /// Log the message instead of sending it.
    Log,
    /// POST the message to an HTTP mail relay.
    Relay {
        url: String,
        password: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub otp_ttl: Duration,
    pub app_name: String,
    /// Sender address, also the relay user name.
    pub sender: String,
    pub mail: MailTransport,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// Environment variables:
    /// - `LUCI_OTP_ADDR` (default: "0.0.0.0:3000")
    /// - `LUCI_OTP_TTL_SECS` (default: 600)
    /// - `LUCI_APP_NAME` (default: "Luci")
    /// - `EMAIL_USER`: sender address
    /// - `EMAIL_PASSWORD`: relay credential
    /// - `LUCI_MAIL_RELAY_URL`: when unset, mail is only logged
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_blank = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let addr = non_blank("LUCI_OTP_ADDR")
            .unwrap_or_else(|| DEFAULT_ADDR.to_string())
            .parse()
            .context("LUCI_OTP_ADDR is not a socket address")?;

        let otp_ttl = match non_blank("LUCI_OTP_TTL_SECS") {
            Some(v) => Duration::from_secs(v.parse().context("LUCI_OTP_TTL_SECS is not a number")?),
            None => Duration::from_secs(DEFAULT_OTP_TTL_SECS),
        };

        let mail = match non_blank("LUCI_MAIL_RELAY_URL") {
            Some(url) => MailTransport::Relay {
                url,
                password: non_blank("EMAIL_PASSWORD"),
            },
            None => MailTransport::Log,
        };

        Ok(Self {
            addr,
            otp_ttl,
            app_name: non_blank("LUCI_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            sender: non_blank("EMAIL_USER").unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            mail,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            otp_ttl: Duration::from_secs(DEFAULT_OTP_TTL_SECS),
            app_name: DEFAULT_APP_NAME.to_string(),
            sender: DEFAULT_SENDER.to_string(),
            mail: MailTransport::Log,
        }
    }
}
