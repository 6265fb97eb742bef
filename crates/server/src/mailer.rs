//! Outgoing verification mail.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{MailTransport, ServerConfig};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Email authentication failed. Check credentials.")]
    Auth,
    #[error("Could not connect to email server.")]
    Connection,
    #[error("Invalid recipient email address.")]
    RecipientRejected,
    #[error("Failed to send email")]
    Other(String),
}

/// Delivers a message and returns the provider's message id.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<String, MailError>;
}

/// Writes the message to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<String, MailError> {
        let message_id = format!("<{}@luci.local>", uuid::Uuid::new_v4());
        tracing::info!(to = %mail.to, subject = %mail.subject, %message_id, "mail (not sent)\n{}", mail.text);
        Ok(message_id)
    }
}

/// POSTs the message as JSON to an HTTP relay.
pub struct RelayMailer {
    client: reqwest::Client,
    url: String,
    user: String,
    password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayReply {
    message_id: Option<String>,
}

impl RelayMailer {
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            user: user.into(),
            password,
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<String, MailError> {
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, self.password.as_deref())
            .timeout(Duration::from_secs(15))
            .json(mail)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    MailError::Connection
                } else {
                    MailError::Other(e.to_string())
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => return Err(MailError::Auth),
            422 | 550 => return Err(MailError::RecipientRejected),
            _ if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(MailError::Other(format!("relay returned {status}: {body}")));
            }
            _ => {}
        }

        let reply: RelayReply = response
            .json()
            .await
            .map_err(|e| MailError::Other(format!("unreadable relay reply: {e}")))?;
        Ok(reply
            .message_id
            .unwrap_or_else(|| format!("<{}@relay>", uuid::Uuid::new_v4())))
    }
}

pub fn from_config(config: &ServerConfig) -> Box<dyn Mailer> {
    match &config.mail {
        MailTransport::Log => Box::new(LogMailer),
        MailTransport::Relay { url, password } => {
            Box::new(RelayMailer::new(url, &config.sender, password.clone()))
        }
    }
}

/// Build the verification message for `otp`.
pub fn verification_mail(config: &ServerConfig, to: &str, otp: &str) -> OutgoingMail {
    let app = &config.app_name;
    let minutes = (config.otp_ttl.as_secs() / 60).max(1);
    let year = chrono::Utc::now().year();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><meta name="viewport" content="width=device-width, initial-scale=1.0"></head>
<body style="font-family:'Segoe UI',Tahoma,Geneva,Verdana,sans-serif;background-color:#f4f4f4;margin:0;padding:0">
  <div style="max-width:600px;margin:40px auto;background-color:#ffffff;border-radius:12px;overflow:hidden">
    <div style="background:linear-gradient(135deg,#D96073 0%,#C54D61 100%);padding:40px 30px;text-align:center">
      <h1 style="color:#ffffff;margin:0;font-size:28px">Email Verification</h1>
    </div>
    <div style="padding:40px 30px;color:#7A6B7A;line-height:1.8;font-size:16px">
      <p style="font-size:18px;color:#2D1B47;font-weight:600">Hello!</p>
      <p>Thank you for signing up with <strong style="color:#D96073">{app}</strong>! To complete your registration, please verify your email address using the code below:</p>
      <div style="background:#EDE2E0;padding:30px;text-align:center;border-radius:12px;border:2px dashed #D96073">
        <div style="font-size:14px;text-transform:uppercase;letter-spacing:1px">Your Verification Code</div>
        <div style="font-size:42px;font-weight:bold;color:#D96073;letter-spacing:12px;font-family:'Courier New',monospace">{otp}</div>
      </div>
      <p style="color:#E65100;font-weight:600">This code will expire in {minutes} minutes</p>
      <p>If you didn't request this code, please ignore this email.</p>
    </div>
    <div style="background-color:#F8F8F8;padding:30px;text-align:center;font-size:13px;color:#8B7B8B">
      <p>This is an automated email. Please do not reply.</p>
      <p>&copy; {year} {app}. All rights reserved.</p>
    </div>
  </div>
</body>
</html>"#
    );

    let text = format!(
        "Email Verification\n\n\
         Hello!\n\n\
         Thank you for signing up with {app}!\n\n\
         Your verification code is: {otp}\n\n\
         This code will expire in {minutes} minutes.\n\n\
         If you didn't request this code, please ignore this email.\n\n\
         \u{a9} {year} {app}. All rights reserved.\n"
    );

    OutgoingMail {
        from: format!("\"{app}\" <{}>", config.sender),
        to: to.to_string(),
        subject: "Email Verification - Your OTP Code".to_string(),
        html,
        text,
    }
}
