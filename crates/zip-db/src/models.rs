//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the zip-types API models so the DB layer stays independent
//! of the wire format. Only the shared enums cross the boundary.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use zip_types::models::{OrderStage, PropertyType, UserRole, VerificationTier};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub preferred_language: Option<String>,
    pub university: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: UserRole,
    pub name: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub preferred_language: Option<String>,
    pub university: Option<String>,
}

pub struct PropertyRow {
    pub id: String,
    pub owner_id: String,
    pub owner_name: Option<String>,
    pub title: String,
    pub description: String,
    pub property_type: PropertyType,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub size: f64,
    pub bedrooms: i64,
    pub bathrooms: f64,
    pub max_occupants: i64,
    pub price: f64,
    pub currency: String,
    pub utilities_included: bool,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub virtual_tour: Option<String>,
    pub amenities: Value,
    /// Derived at read time: at least one paid verification order exists.
    pub verified: bool,
    pub saved_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proximity {
    pub university_id: String,
    pub distance_km: f64,
}

pub struct NewProperty {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub property_type: PropertyType,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub size: f64,
    pub bedrooms: i64,
    pub bathrooms: f64,
    pub max_occupants: i64,
    pub price: f64,
    pub currency: String,
    pub utilities_included: bool,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub virtual_tour: Option<String>,
    pub amenities: Value,
    pub nearby: Vec<Proximity>,
}

/// Partial update. `None` leaves the column untouched; `nearby: Some(_)`
/// replaces the proximity set.
#[derive(Debug, Default)]
pub struct PropertyChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_type: Option<PropertyType>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub size: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub max_occupants: Option<i64>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub utilities_included: Option<bool>,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<String>>,
    pub virtual_tour: Option<String>,
    pub amenities: Option<Value>,
    pub nearby: Option<Vec<Proximity>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyFilter<'a> {
    pub city: Option<&'a str>,
    pub property_type: Option<PropertyType>,
    pub verified: Option<bool>,
}

pub struct ProximityRow {
    pub property_id: String,
    pub university_id: String,
    pub university_name: String,
    pub university_short_name: Option<String>,
    pub university_city: String,
    pub distance_km: f64,
}

pub struct UniversityRow {
    pub id: String,
    pub name: String,
    pub short_name: Option<String>,
    pub city: String,
    pub province: String,
    pub latitude: f64,
    pub longitude: f64,
    pub website: Option<String>,
}

pub struct SavedPropertyRow {
    pub property_id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub city: String,
    pub property_type: PropertyType,
    pub price: f64,
    pub bedrooms: i64,
    pub verified: bool,
    pub images: Vec<String>,
}

pub struct NewOrder<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub property_id: &'a str,
    pub stage: OrderStage,
    pub tier: VerificationTier,
    pub amount: i64,
    pub currency: &'a str,
}

pub struct OrderRow {
    pub id: String,
    pub user_id: String,
    pub property_id: String,
    pub property_title: String,
    pub property_city: String,
    pub property_images: Vec<String>,
    pub stage: OrderStage,
    pub tier: VerificationTier,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Parse a stored timestamp. Rows written by this crate use RFC 3339; the
/// plain SQLite `datetime('now')` form is accepted for hand-edited rows.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_forms() {
        let rfc = parse_timestamp("2026-03-01T12:30:00.250Z");
        assert_eq!(rfc.timestamp_millis() % 1000, 250);

        let naive = parse_timestamp("2026-03-01 12:30:00");
        assert_eq!(naive.timestamp(), rfc.timestamp());

        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::default());
    }
}
