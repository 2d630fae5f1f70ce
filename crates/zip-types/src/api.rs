use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{OrderStage, PropertyType, UserRole, VerificationTier};

// -- JWT Claims --

/// Bearer token claims. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Envelope --

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageMeta {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, meta: None }
    }

    pub fn page(data: T, meta: PageMeta) -> Self {
        Self { success: true, data: Some(data), error: None, meta: Some(meta) }
    }
}

impl Envelope<()> {
    pub fn empty() -> Self {
        Self { success: true, data: None, error: None, meta: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()), meta: None }
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserSummary,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse<U> {
    pub user: U,
}

// -- Users --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: UserRole,
    pub university: Option<String>,
    pub phone: Option<String>,
    pub preferred_language: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial profile edit. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub preferred_language: Option<String>,
    pub university: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SavePropertyRequest {
    pub property_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProperty {
    pub property_id: String,
    pub created_at: DateTime<Utc>,
    pub property: SavedPropertySummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPropertySummary {
    pub id: String,
    pub title: String,
    pub city: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub price: f64,
    pub bedrooms: i64,
    pub verified: bool,
    pub images: Vec<String>,
}

// -- Properties --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NearbyUniversityInput {
    pub university_id: String,
    pub distance_km: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreatePropertyRequest {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
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
    pub currency: Option<String>,
    pub utilities_included: Option<bool>,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<String>>,
    pub virtual_tour: Option<String>,
    pub amenities: Option<Value>,
    pub nearby_universities: Option<Vec<NearbyUniversityInput>>,
}

/// Partial property edit. Absent fields are left untouched, never nulled.
/// A present `nearby_universities` list replaces the whole proximity set.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdatePropertyRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
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
    /// `null` reads as absent, so a patch cannot clear an existing tour.
    pub virtual_tour: Option<String>,
    pub amenities: Option<Value>,
    pub nearby_universities: Option<Vec<NearbyUniversityInput>>,
}

#[derive(Debug, Deserialize)]
pub struct PropertyListQuery {
    pub city: Option<String>,
    #[serde(rename = "type")]
    pub property_type: Option<PropertyType>,
    /// Only the literal strings `true` and `false` filter; anything else is unset.
    pub verified: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
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
    pub verified: bool,
    pub owner: OwnerSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyListItem {
    #[serde(flatten)]
    pub property: Property,
    pub saved_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDetail {
    #[serde(flatten)]
    pub property: Property,
    pub nearby_universities: Vec<NearbyUniversity>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyUniversity {
    pub university_id: String,
    pub distance_km: f64,
    pub university: UniversitySummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversitySummary {
    pub id: String,
    pub name: String,
    pub short_name: Option<String>,
    pub city: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadUrlRequest {
    pub filename: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub path: String,
    pub token: String,
    pub public_url: String,
}

// -- Universities --

#[derive(Debug, Deserialize)]
pub struct UniversityQuery {
    pub city: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct University {
    pub id: String,
    pub name: String,
    pub short_name: Option<String>,
    pub city: String,
    pub province: String,
    pub latitude: f64,
    pub longitude: f64,
    pub website: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityDetail {
    #[serde(flatten)]
    pub university: University,
    pub property_count: u64,
}

// -- Verification --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub property_id: String,
    pub package_type: VerificationTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLinkResponse {
    pub checkout_url: String,
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct OrderPropertySummary {
    pub id: String,
    pub title: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// An order as returned right after creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub package_type: VerificationTier,
    pub stage: OrderStage,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub property: OrderPropertySummary,
}

/// A settled order in the purchaser's history.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidOrder {
    pub id: String,
    pub package_type: VerificationTier,
    pub amount: i64,
    pub currency: String,
    pub status: OrderStage,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub property: OrderPropertySummary,
}

// -- Service --

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub health: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
}
