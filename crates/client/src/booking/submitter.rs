//! Turns a swiped recommendation into a submitted booking request.

use std::sync::Arc;

use chrono::Utc;
use luci_shared::shape::{first_id, SALON_DETAIL_OWNER};
use luci_shared::{
    default_requested_time, BookingAck, BookingError, BookingRequest, SalonSelection,
    SessionIdentity, DEFAULT_DURATION_MINUTES,
};

use crate::api_client::ApiClient;
use crate::identity::IdentityStore;

/// Name sent when neither the profile nor the session carries one.
const FALLBACK_NAME: &str = "User";

/// Salon-detail endpoints tried, in order, when the selection has no owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnerLookup {
    /// `/salons/{id}/with-owner`, which populates the owner document
    WithOwner,
    /// `/salons/{id}`
    Plain,
}

const OWNER_LOOKUPS: [OwnerLookup; 2] = [OwnerLookup::WithOwner, OwnerLookup::Plain];

pub struct BookingSubmitter {
    api: ApiClient,
    identity: Arc<dyn IdentityStore>,
}

impl BookingSubmitter {
    pub fn new(api: ApiClient, identity: Arc<dyn IdentityStore>) -> Self {
        Self { api, identity }
    }

    /// Submit a booking for `selection`.
    ///
    /// Identity and validation failures are returned before any network call.
    /// A booking is never posted without a resolved salon owner. Local
    /// conversation and booking state is left to the caller.
    pub async fn submit(&self, selection: &SalonSelection) -> Result<BookingAck, BookingError> {
        let identity = self
            .identity
            .current_identity()
            .await
            .ok_or(BookingError::Unauthenticated)?;

        let salon_id = selection
            .salon_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(BookingError::MissingSalonId)?;

        let (name, email) = self.resolve_contact(&identity).await?;
        let salon_owner_id = self
            .resolve_owner(selection, salon_id)
            .await
            .ok_or(BookingError::MissingOwnerInfo)?;

        let request = BookingRequest {
            salon_id: salon_id.to_string(),
            salon_owner_id,
            firebase_uid: identity.user_id.clone(),
            name,
            email,
            requested_date_time: default_requested_time(Utc::now()),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            age: 0,
            weight_kg: 0,
        };

        let body = self.api.create_booking(&request).await.map_err(|e| {
            tracing::warn!(salon_id, "booking request failed: {}", e);
            BookingError::from(e)
        })?;
        let ack = BookingAck::from_body(body);
        tracing::info!(
            salon_id,
            booking_id = ack.booking_id.as_deref().unwrap_or("?"),
            "booking request sent"
        );
        Ok(ack)
    }

    /// Name and email of the requester: the profile document first, then
    /// whatever the session carries.
    async fn resolve_contact(&self, identity: &SessionIdentity) -> Result<(String, String), BookingError> {
        let profile = match self.identity.profile(&identity.user_id).await {
            Ok(profile) => profile.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(user_id = %identity.user_id, "profile lookup failed, using session data: {:#}", e);
                Default::default()
            }
        };

        let pick = |a: Option<&String>, b: Option<&String>| {
            [a, b]
                .into_iter()
                .flatten()
                .map(|s| s.trim())
                .find(|s| !s.is_empty())
                .map(str::to_string)
        };

        let email = pick(profile.email.as_ref(), identity.email.as_ref())
            .ok_or(BookingError::MissingContactInfo)?;
        let name = pick(profile.name.as_ref(), identity.display_name.as_ref())
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        Ok((name, email))
    }

    async fn resolve_owner(&self, selection: &SalonSelection, salon_id: &str) -> Option<String> {
        if let Some(owner) = selection.known_owner() {
            return Some(owner.to_string());
        }

        for lookup in OWNER_LOOKUPS {
            let result = match lookup {
                OwnerLookup::WithOwner => self.api.salon_with_owner(salon_id).await,
                OwnerLookup::Plain => self.api.salon(salon_id).await,
            };
            match result {
                Ok(body) => {
                    if let Some(owner) = first_id(&body, SALON_DETAIL_OWNER) {
                        tracing::debug!(salon_id, ?lookup, "resolved salon owner");
                        return Some(owner);
                    }
                    tracing::debug!(salon_id, ?lookup, "salon detail has no owner");
                }
                Err(e) => tracing::warn!(salon_id, ?lookup, "salon lookup failed: {}", e),
            }
        }

        tracing::error!(salon_id, "no salon owner after all lookups");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentityStore;
    use luci_shared::{ServerDiagnostic, UserProfile};
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CREATE: &str = "/api/v1/bookings/create-booking";

    fn session() -> SessionIdentity {
        SessionIdentity {
            user_id: "U1".into(),
            display_name: Some("Session Ann".into()),
            email: Some("session@example.com".into()),
        }
    }

    fn submitter(server: &MockServer, identity: StaticIdentityStore) -> BookingSubmitter {
        BookingSubmitter::new(
            ApiClient::new(server.uri(), Duration::from_secs(2)),
            Arc::new(identity),
        )
    }

    async fn mount_created(server: &MockServer, expected: u64) {
        Mock::given(method("POST"))
            .and(path(CREATE))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"success": true, "data": {"_id": "B1", "status": "pending"}})),
            )
            .expect(expected)
            .mount(server)
            .await;
    }

    async fn posted_booking(server: &MockServer) -> Value {
        let requests = server.received_requests().await.unwrap();
        let post = requests
            .iter()
            .find(|r| r.url.path() == CREATE)
            .expect("create-booking was called");
        post.body_json().unwrap()
    }

    #[tokio::test]
    async fn owner_is_resolved_through_with_owner_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/salons/S1/with-owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"ownerId": {"_id": "O1"}}})))
            .expect(1)
            .mount(&server)
            .await;
        mount_created(&server, 1).await;

        let ack = submitter(&server, StaticIdentityStore::new(Some(session())))
            .submit(&SalonSelection::new("S1"))
            .await
            .unwrap();

        assert_eq!(ack.booking_id.as_deref(), Some("B1"));
        let body = posted_booking(&server).await;
        assert_eq!(body["salonOwnerId"], "O1");
        assert_eq!(body["salonId"], "S1");
        assert_eq!(body["firebaseUID"], "U1");
        assert_eq!(body["durationMinutes"], 60);
        assert_eq!(body["email"], "session@example.com");
    }

    #[tokio::test]
    async fn unresolvable_owner_never_posts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/salons/S1/with-owner"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/salons/S1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"name": "No Owner"}})))
            .expect(1)
            .mount(&server)
            .await;
        mount_created(&server, 0).await;

        let err = submitter(&server, StaticIdentityStore::new(Some(session())))
            .submit(&SalonSelection::new("S1"))
            .await
            .unwrap_err();
        assert_eq!(err, BookingError::MissingOwnerInfo);
        assert!(err.is_local());
    }

    #[tokio::test]
    async fn plain_lookup_is_the_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/salons/S1/with-owner"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/salons/S1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ownerId": "O2"})))
            .mount(&server)
            .await;
        mount_created(&server, 1).await;

        submitter(&server, StaticIdentityStore::new(Some(session())))
            .submit(&SalonSelection::new("S1"))
            .await
            .unwrap();
        assert_eq!(posted_booking(&server).await["salonOwnerId"], "O2");
    }

    #[tokio::test]
    async fn top_level_owner_skips_lookups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_created(&server, 1).await;

        let mut selection = SalonSelection::new("S1").with_owner("TOP");
        selection.nested_owner_id = Some("NESTED".into());
        submitter(&server, StaticIdentityStore::new(Some(session())))
            .submit(&selection)
            .await
            .unwrap();
        assert_eq!(posted_booking(&server).await["salonOwnerId"], "TOP");
    }

    #[tokio::test]
    async fn profile_wins_over_session() {
        let server = MockServer::start().await;
        mount_created(&server, 1).await;

        let store = StaticIdentityStore::new(Some(session())).with_profile(
            "U1",
            UserProfile {
                name: Some("Profile Ann".into()),
                email: Some("profile@example.com".into()),
            },
        );
        submitter(&server, store)
            .submit(&SalonSelection::new("S1").with_owner("O1"))
            .await
            .unwrap();
        let body = posted_booking(&server).await;
        assert_eq!(body["name"], "Profile Ann");
        assert_eq!(body["email"], "profile@example.com");
    }

    #[tokio::test]
    async fn unavailable_profile_falls_back_to_session() {
        let server = MockServer::start().await;
        mount_created(&server, 1).await;

        let store = StaticIdentityStore::new(Some(session()));
        store.set_unavailable(true);
        submitter(&server, store)
            .submit(&SalonSelection::new("S1").with_owner("O1"))
            .await
            .unwrap();
        assert_eq!(posted_booking(&server).await["name"], "Session Ann");
    }

    #[tokio::test]
    async fn local_failures_precede_network() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let signed_out = submitter(&server, StaticIdentityStore::new(None));
        assert_eq!(
            signed_out.submit(&SalonSelection::new("S1")).await,
            Err(BookingError::Unauthenticated)
        );

        let no_email = submitter(
            &server,
            StaticIdentityStore::new(Some(SessionIdentity::new("U1"))),
        );
        assert_eq!(
            no_email.submit(&SalonSelection::default()).await,
            Err(BookingError::MissingSalonId)
        );
        assert_eq!(
            no_email.submit(&SalonSelection::new("S1").with_owner("O1")).await,
            Err(BookingError::MissingContactInfo)
        );
    }

    #[tokio::test]
    async fn rejection_carries_diagnostic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": "Salon owner not found", "message": "Invalid salonOwnerId"})),
            )
            .mount(&server)
            .await;

        let err = submitter(&server, StaticIdentityStore::new(Some(session())))
            .submit(&SalonSelection::new("S1").with_owner("O1"))
            .await
            .unwrap_err();
        match &err {
            BookingError::ServerRejected { status, diagnostic } => {
                assert_eq!(*status, 400);
                assert!(matches!(diagnostic, ServerDiagnostic::Json(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.user_message().contains("Salon owner not found"));
    }

    #[tokio::test]
    async fn timeout_is_unreachable_not_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let submitter = BookingSubmitter::new(
            ApiClient::new(server.uri(), Duration::from_millis(200)),
            Arc::new(StaticIdentityStore::new(Some(session()))),
        );
        let err = submitter
            .submit(&SalonSelection::new("S1").with_owner("O1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ServerUnreachable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn plain_text_success_is_an_ack() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE))
            .respond_with(ResponseTemplate::new(201).set_body_string("Booking created"))
            .expect(1)
            .mount(&server)
            .await;

        let ack = submitter(&server, StaticIdentityStore::new(Some(session())))
            .submit(&SalonSelection::new("S1").with_owner("O1"))
            .await
            .unwrap();
        assert_eq!(ack.booking_id, None);
        assert_eq!(ack.raw, Value::String("Booking created".into()));
    }
}
