//! One-time-password issue and verification.

use axum::{extract::State, http::StatusCode, Json};
use luci_shared::shape::scalar_to_string;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiFailure;
use crate::mailer::verification_mail;
use crate::otp::VerifyError;
use crate::state::AppState;

static EMAIL_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// `{email, otp}`; the code may arrive as a string or a number.
#[derive(Debug, Default, Deserialize)]
pub struct OtpRequest {
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub otp: Option<Value>,
}

impl OtpRequest {
    fn fields(&self) -> Result<(String, String), ApiFailure> {
        let email = self.email.as_ref().and_then(scalar_to_string);
        let otp = self.otp.as_ref().and_then(scalar_to_string);
        match (email, otp) {
            (Some(email), Some(otp)) => Ok((email, otp)),
            _ => Err(ApiFailure::bad_request("Email and OTP are required")),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpReply {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Mail a code to the address and remember it for verification.
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpRequest>,
) -> Result<Json<OtpReply>, ApiFailure> {
    let (email, otp) = payload.fields()?;
    if !EMAIL_FORMAT.is_match(&email) {
        return Err(ApiFailure::bad_request("Invalid email format"));
    }

    tracing::info!("Sending OTP to: {}", email);
    let mail = verification_mail(&state.config, &email, &otp);
    let message_id = state.mailer.send(&mail).await.map_err(|e| {
        tracing::error!("Error sending email to {}: {:?}", email, e);
        ApiFailure::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    state.otps.issue(&email, &otp, chrono::Utc::now());
    tracing::info!("Email sent successfully: {}", message_id);

    Ok(Json(OtpReply {
        success: true,
        message: "OTP sent successfully".to_string(),
        message_id: Some(message_id),
    }))
}

/// Check a code previously sent with [`send_otp`].
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpRequest>,
) -> Result<Json<OtpReply>, ApiFailure> {
    let (email, otp) = payload.fields()?;

    state
        .otps
        .verify(&email, &otp, chrono::Utc::now())
        .map_err(|e| {
            tracing::debug!("OTP verification for {} failed: {}", email, e);
            let status = match e {
                VerifyError::NotFound => StatusCode::NOT_FOUND,
                VerifyError::Expired | VerifyError::AlreadyUsed | VerifyError::Mismatch => {
                    StatusCode::BAD_REQUEST
                }
            };
            ApiFailure::new(status, e.to_string())
        })?;

    Ok(Json(OtpReply {
        success: true,
        message: "OTP verified successfully".to_string(),
        message_id: None,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::mailer::{MailError, Mailer, OutgoingMail};
    use crate::otp::OtpRecord;
    use crate::routes::router;
    use crate::state::AppState;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: &OutgoingMail) -> Result<String, MailError> {
            self.sent.lock().push(mail.clone());
            Ok("<m1@test>".to_string())
        }
    }

    struct BrokenMailer;

    #[async_trait]
    impl Mailer for BrokenMailer {
        async fn send(&self, _: &OutgoingMail) -> Result<String, MailError> {
            Err(MailError::Auth)
        }
    }

    fn app(mailer: Arc<dyn Mailer>) -> (AppState, Router) {
        let state = AppState::with_mailer(ServerConfig::default(), mailer);
        (state.clone(), router(state))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_, app) = app(Arc::new(RecordingMailer::default()));
        let (status, body) = call(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
        assert_eq!(body["message"], "OTP Email Service is running");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn send_then_verify() {
        let mailer = Arc::new(RecordingMailer::default());
        let (_, app) = app(mailer.clone());

        let (status, body) = call(
            &app,
            "POST",
            "/send-otp",
            Some(json!({"email": "ann@example.com", "otp": "482913"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"success": true, "message": "OTP sent successfully", "messageId": "<m1@test>"})
        );
        assert_eq!(mailer.sent.lock()[0].to, "ann@example.com");

        let (status, body) = call(
            &app,
            "POST",
            "/verify-otp",
            Some(json!({"email": "ann@example.com", "otp": 482913})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "message": "OTP verified successfully"}));

        let (status, body) = call(
            &app,
            "POST",
            "/verify-otp",
            Some(json!({"email": "ann@example.com", "otp": "482913"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "OTP already used");
    }

    #[tokio::test]
    async fn send_validates_input() {
        let mailer = Arc::new(RecordingMailer::default());
        let (_, app) = app(mailer.clone());

        let (status, body) = call(&app, "POST", "/send-otp", Some(json!({"email": "ann@example.com"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "Email and OTP are required"}));

        let (status, body) = call(
            &app,
            "POST",
            "/send-otp",
            Some(json!({"email": "not an email", "otp": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid email format");
        assert!(mailer.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn mail_failure_is_500_and_stores_nothing() {
        let (state, app) = app(Arc::new(BrokenMailer));
        let (status, body) = call(
            &app,
            "POST",
            "/send-otp",
            Some(json!({"email": "ann@example.com", "otp": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Email authentication failed. Check credentials.");
        assert_eq!(state.otps.get("ann@example.com"), None);
    }

    #[tokio::test]
    async fn verify_failure_branches() {
        let (state, app) = app(Arc::new(RecordingMailer::default()));
        let verify = |otp: &'static str| {
            let app = app.clone();
            async move {
                call(&app, "POST", "/verify-otp", Some(json!({"email": "a@b.co", "otp": otp}))).await
            }
        };

        let (status, body) = call(&app, "POST", "/verify-otp", Some(json!({"otp": "1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email and OTP are required");

        let (status, body) = verify("1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "OTP not found");

        state.otps.issue("a@b.co", "111111", chrono::Utc::now());
        let (status, body) = verify("999999").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid OTP");
        assert_eq!(state.otps.get("a@b.co").unwrap().attempts, 1);

        state.otps.insert(
            "a@b.co",
            OtpRecord {
                otp: "111111".into(),
                expires_at: chrono::Utc::now() - chrono::Duration::minutes(1),
                verified: false,
                verified_at: None,
                attempts: 0,
            },
        );
        let (status, body) = verify("111111").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "OTP has expired");
        assert_eq!(state.otps.get("a@b.co"), None);
    }
}
