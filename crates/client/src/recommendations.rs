//! Recommendation feed: fetch and normalise into [`Studio`] cards.

use luci_shared::shape::{first_array, first_bool, first_id, first_present, first_string, RECOMMENDATION_LIST};
use luci_shared::{ApiError, Studio};
use serde_json::Value;

use crate::api_client::ApiClient;

pub const DEFAULT_LIMIT: u32 = 20;
const UNKNOWN_NAME: &str = "Unknown Studio";
const NO_LOCATION: &str = "Location unavailable";

/// Owner id locations, most recently enriched first.
const OWNER_SOURCES: &[&str] = &["/ownerId", "/salon/ownerId", "/salon/owner/_id", "/owner/_id"];

/// Map a match score (0..1 or 0..100) onto a 0..5 star rating.
pub fn score_to_rating(score: f64) -> f64 {
    if !score.is_finite() || score <= 0.0 {
        0.0
    } else if score <= 1.0 {
        score * 5.0
    } else {
        (score / 100.0 * 5.0).min(5.0)
    }
}

/// Digits of a price range like "฿450-600" or a plain number.
fn parse_price(salon: &Value) -> u32 {
    match salon.get("priceRange") {
        Some(Value::String(s)) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        }
        Some(Value::Number(n)) => n.as_f64().map(|f| f.max(0.0) as u32).unwrap_or(0),
        _ => salon
            .get("price")
            .and_then(|p| match p {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .map(|f| f.max(0.0) as u32)
            .unwrap_or(0),
    }
}

fn format_location(location: Option<&Value>) -> String {
    match location {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(obj @ Value::Object(_)) => {
            let parts: Vec<&str> = ["streetAddress", "city", "province"]
                .iter()
                .filter_map(|k| obj.get(*k).and_then(Value::as_str))
                .filter(|s| !s.trim().is_empty())
                .collect();
            if parts.is_empty() {
                NO_LOCATION.to_string()
            } else {
                parts.join(", ")
            }
        }
        _ => NO_LOCATION.to_string(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Normalise one recommendation item. The item is either salon-like itself
/// or wraps the salon under `salon`. Items without an owner are unusable for
/// booking and yield `None`.
pub fn studio_from_wire(rec: &Value, index: usize) -> Option<Studio> {
    let salon = rec.get("salon").filter(|s| s.is_object()).unwrap_or(rec);

    let owner_id = first_id(rec, OWNER_SOURCES).or_else(|| first_id(salon, &["/ownerId", "/owner/_id"]));
    let Some(owner_id) = owner_id else {
        tracing::debug!(index, "skipping recommendation without owner");
        return None;
    };

    let id = first_id(salon, &["/_id", "/salonId", "/id"])
        .or_else(|| first_id(rec, &["/_id"]))
        .unwrap_or_else(|| index.to_string());

    let score = first_present(rec, &["/matchScore", "/score", "/match"])
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    let services = ["typesOfMassages", "typesOfMassage", "types", "services"]
        .iter()
        .find_map(|k| salon.get(*k).filter(|v| v.is_array()))
        .map(|v| string_list(Some(v)))
        .unwrap_or_default();

    Some(Studio {
        id,
        name: first_string(salon, &["/salonName", "/name"]).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        price: parse_price(salon),
        rating: score_to_rating(score),
        location: format_location(salon.get("location").or_else(|| rec.get("location"))),
        services,
        image_url: first_string(salon, &["/salonImage", "/imageUrl", "/salonImageUrl"]),
        score,
        reasons: string_list(rec.get("reasons")),
        is_subscribed: first_bool(salon, &["/isSubscribed"]).unwrap_or(false),
        owner_id: Some(owner_id),
    })
}

/// Normalise a whole recommendations response.
pub fn studios_from_response(body: &Value) -> Result<Vec<Studio>, ApiError> {
    let items = first_array(body, RECOMMENDATION_LIST)
        .ok_or_else(|| ApiError::Deserialize("no recommendation list in response".into()))?;
    Ok(items
        .iter()
        .enumerate()
        .filter_map(|(i, rec)| studio_from_wire(rec, i))
        .collect())
}

/// Fetch the recommendation cards for `user_id`.
pub async fn fetch_studios(
    api: &ApiClient,
    user_id: &str,
    coords: Option<(f64, f64)>,
) -> Result<Vec<Studio>, ApiError> {
    let body = api.recommendations(user_id, DEFAULT_LIMIT, coords).await?;
    let studios = studios_from_response(&body)?;
    tracing::info!(user_id, count = studios.len(), "recommendations loaded");
    Ok(studios)
}
