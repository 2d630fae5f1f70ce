use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use zip_db::Database;
use zip_db::models::{NewProperty, PropertyChanges, PropertyFilter, PropertyRow, Proximity, ProximityRow};
use zip_types::api::{
    Claims, CreatePropertyRequest, Envelope, NearbyUniversity, NearbyUniversityInput, OwnerSummary, PageMeta, Property,
    PropertyDetail, PropertyListItem, PropertyListQuery, UniversitySummary, UpdatePropertyRequest, UploadUrlRequest,
    UploadUrlResponse,
};

use crate::auth::parse_uuid;
use crate::error::ApiError;
use crate::state::{AppState, blocking};

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;
const DEFAULT_CURRENCY: &str = "CAD";
const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_FILENAME_LEN: usize = 255;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

// -- Handlers --

pub async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PropertyListQuery>,
) -> Result<Json<Envelope<Vec<PropertyListItem>>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let verified = match query.verified.as_deref() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    };

    let (rows, total) = blocking(&state, move |db| {
        let filter = PropertyFilter {
            city: query.city.as_deref(),
            property_type: query.property_type,
            verified,
        };
        Ok(db.list_properties(&filter, limit, offset)?)
    })
    .await?;

    let items = rows
        .into_iter()
        .map(|row| {
            let saved_count = row.saved_count;
            PropertyListItem { property: property_view(row), saved_count }
        })
        .collect();

    Ok(Json(Envelope::page(items, PageMeta { total, limit, offset })))
}

pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<PropertyDetail>>, ApiError> {
    let detail = blocking(&state, move |db| load_detail(db, &id)).await?;
    Ok(Json(Envelope::ok(detail)))
}

pub async fn my_properties(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Envelope<Vec<PropertyDetail>>>, ApiError> {
    let owner_id = claims.sub.to_string();

    let details = blocking(&state, move |db| {
        let rows = db.list_properties_by_owner(&owner_id)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

        let mut nearby: HashMap<String, Vec<NearbyUniversity>> = HashMap::new();
        for p in db.get_proximities(&ids)? {
            nearby.entry(p.property_id.clone()).or_default().push(nearby_view(p));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let nearby_universities = nearby.remove(&row.id).unwrap_or_default();
                PropertyDetail { property: property_view(row), nearby_universities }
            })
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(Envelope::ok(details)))
}

pub async fn create_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_create(&req)?;
    let nearby = proximities(req.nearby_universities.unwrap_or_default())?;

    let property = NewProperty {
        id: Uuid::new_v4().to_string(),
        owner_id: claims.sub.to_string(),
        title: req.title.trim().to_string(),
        description: req.description,
        property_type: req.property_type,
        address: req.address,
        city: req.city,
        province: req.province,
        postal_code: req.postal_code,
        latitude: req.latitude,
        longitude: req.longitude,
        size: req.size,
        bedrooms: req.bedrooms,
        bathrooms: req.bathrooms,
        max_occupants: req.max_occupants,
        price: req.price,
        currency: normalize_currency(req.currency.as_deref())?.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        utilities_included: req.utilities_included.unwrap_or(false),
        images: req.images.unwrap_or_default(),
        videos: req.videos.unwrap_or_default(),
        virtual_tour: req.virtual_tour,
        amenities: req.amenities.unwrap_or_else(|| Value::Object(Default::default())),
        nearby,
    };

    let detail = blocking(&state, move |db| {
        ensure_universities_exist(db, &property.nearby)?;
        db.create_property(&property)?;
        info!("Property {} created by {}", property.id, property.owner_id);
        load_detail(db, &property.id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(Envelope::ok(detail))))
}

pub async fn update_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePropertyRequest>,
) -> Result<Json<Envelope<PropertyDetail>>, ApiError> {
    let changes = validate_update(req)?;
    let user_id = claims.sub.to_string();

    let detail = blocking(&state, move |db| {
        ensure_owner(db, &id, &user_id)?;
        if let Some(nearby) = &changes.nearby {
            ensure_universities_exist(db, nearby)?;
        }
        if !db.update_property(&id, &user_id, &changes)? {
            return Err(ApiError::NotFound("Property"));
        }
        load_detail(db, &id)
    })
    .await?;

    Ok(Json(Envelope::ok(detail)))
}

pub async fn upload_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UploadUrlRequest>,
) -> Result<Json<Envelope<UploadUrlResponse>>, ApiError> {
    let ext = image_extension(&req.filename)?;

    let user_id = claims.sub.to_string();
    let property_id = id.clone();
    blocking(&state, move |db| ensure_owner(db, &property_id, &user_id)).await?;

    let path = format!("{}/{}.{}", id, Uuid::new_v4(), ext);
    let signed = state.storage.create_signed_upload_url(&path).await?;
    let public_url = state.storage.public_url(&signed.path);

    Ok(Json(Envelope::ok(UploadUrlResponse { path: signed.path, token: signed.token, public_url })))
}

// -- Shared lookups --

fn load_detail(db: &Database, id: &str) -> Result<PropertyDetail, ApiError> {
    let row = db.get_property(id)?.ok_or(ApiError::NotFound("Property"))?;
    let nearby_universities = db
        .get_proximities(&[row.id.clone()])?
        .into_iter()
        .map(nearby_view)
        .collect();

    Ok(PropertyDetail { property: property_view(row), nearby_universities })
}

fn ensure_owner(db: &Database, property_id: &str, user_id: &str) -> Result<(), ApiError> {
    let owner = db.get_property_owner(property_id)?.ok_or(ApiError::NotFound("Property"))?;
    if owner != user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

fn ensure_universities_exist(db: &Database, nearby: &[Proximity]) -> Result<(), ApiError> {
    let ids: Vec<String> = nearby.iter().map(|p| p.university_id.clone()).collect();
    let missing = db.missing_university_ids(&ids)?;
    if !missing.is_empty() {
        return Err(ApiError::validation(format!("Unknown university: {}", missing.join(", "))));
    }
    Ok(())
}

// -- Row to wire --

fn property_view(row: PropertyRow) -> Property {
    Property {
        owner: OwnerSummary { id: parse_uuid(&row.owner_id), name: row.owner_name },
        id: row.id,
        title: row.title,
        description: row.description,
        property_type: row.property_type,
        address: row.address,
        city: row.city,
        province: row.province,
        postal_code: row.postal_code,
        latitude: row.latitude,
        longitude: row.longitude,
        size: row.size,
        bedrooms: row.bedrooms,
        bathrooms: row.bathrooms,
        max_occupants: row.max_occupants,
        price: row.price,
        currency: row.currency,
        utilities_included: row.utilities_included,
        images: row.images,
        videos: row.videos,
        virtual_tour: row.virtual_tour,
        amenities: row.amenities,
        verified: row.verified,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn nearby_view(row: ProximityRow) -> NearbyUniversity {
    NearbyUniversity {
        university: UniversitySummary {
            id: row.university_id.clone(),
            name: row.university_name,
            short_name: row.university_short_name,
            city: row.university_city,
        },
        university_id: row.university_id,
        distance_km: row.distance_km,
    }
}

// -- Validation --

fn validate_create(req: &CreatePropertyRequest) -> Result<(), ApiError> {
    check_title(&req.title)?;
    check_description(&req.description)?;
    check_required("address", &req.address)?;
    check_required("city", &req.city)?;
    check_required("province", &req.province)?;
    check_required("postalCode", &req.postal_code)?;
    check_latitude(req.latitude)?;
    check_longitude(req.longitude)?;
    check_non_negative("size", req.size)?;
    check_non_negative("bedrooms", req.bedrooms as f64)?;
    check_non_negative("bathrooms", req.bathrooms)?;
    check_non_negative("price", req.price)?;
    check_occupants(req.max_occupants)?;
    if let Some(amenities) = &req.amenities {
        check_amenities(amenities)?;
    }
    Ok(())
}

/// Validate each present field and build the partial update.
fn validate_update(req: UpdatePropertyRequest) -> Result<PropertyChanges, ApiError> {
    if let Some(title) = &req.title {
        check_title(title)?;
    }
    if let Some(description) = &req.description {
        check_description(description)?;
    }
    for (field, value) in [
        ("address", &req.address),
        ("city", &req.city),
        ("province", &req.province),
        ("postalCode", &req.postal_code),
    ] {
        if let Some(value) = value {
            check_required(field, value)?;
        }
    }
    if let Some(lat) = req.latitude {
        check_latitude(lat)?;
    }
    if let Some(lng) = req.longitude {
        check_longitude(lng)?;
    }
    for (field, value) in [
        ("size", req.size),
        ("bedrooms", req.bedrooms.map(|b| b as f64)),
        ("bathrooms", req.bathrooms),
        ("price", req.price),
    ] {
        if let Some(value) = value {
            check_non_negative(field, value)?;
        }
    }
    if let Some(max) = req.max_occupants {
        check_occupants(max)?;
    }
    if let Some(amenities) = &req.amenities {
        check_amenities(amenities)?;
    }

    Ok(PropertyChanges {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description,
        property_type: req.property_type,
        address: req.address,
        city: req.city,
        province: req.province,
        postal_code: req.postal_code,
        latitude: req.latitude,
        longitude: req.longitude,
        size: req.size,
        bedrooms: req.bedrooms,
        bathrooms: req.bathrooms,
        max_occupants: req.max_occupants,
        price: req.price,
        currency: normalize_currency(req.currency.as_deref())?,
        utilities_included: req.utilities_included,
        images: req.images,
        videos: req.videos,
        virtual_tour: req.virtual_tour,
        amenities: req.amenities,
        nearby: req.nearby_universities.map(proximities).transpose()?,
    })
}

fn check_title(title: &str) -> Result<(), ApiError> {
    let len = title.trim().chars().count();
    if len == 0 || len > MAX_TITLE_LEN {
        return Err(ApiError::validation("title must be 1-200 characters"));
    }
    Ok(())
}

fn check_description(description: &str) -> Result<(), ApiError> {
    let len = description.trim().chars().count();
    if len == 0 || len > MAX_DESCRIPTION_LEN {
        return Err(ApiError::validation("description must be 1-10000 characters"));
    }
    Ok(())
}

fn check_required(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ApiError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ApiError::validation(format!("{} must be zero or greater", field)));
    }
    Ok(())
}

fn check_occupants(max_occupants: i64) -> Result<(), ApiError> {
    if max_occupants < 1 {
        return Err(ApiError::validation("maxOccupants must be at least 1"));
    }
    Ok(())
}

fn check_latitude(lat: f64) -> Result<(), ApiError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ApiError::validation("latitude must be between -90 and 90"));
    }
    Ok(())
}

fn check_longitude(lng: f64) -> Result<(), ApiError> {
    if !(-180.0..=180.0).contains(&lng) {
        return Err(ApiError::validation("longitude must be between -180 and 180"));
    }
    Ok(())
}

fn check_amenities(amenities: &Value) -> Result<(), ApiError> {
    if !amenities.is_object() {
        return Err(ApiError::validation("amenities must be an object"));
    }
    Ok(())
}

/// ISO-4217 style: three ASCII letters, stored upper-case.
fn normalize_currency(currency: Option<&str>) -> Result<Option<String>, ApiError> {
    match currency.map(str::trim) {
        None => Ok(None),
        Some(c) if c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()) => Ok(Some(c.to_ascii_uppercase())),
        Some(_) => Err(ApiError::validation("currency must be a three-letter code")),
    }
}

fn proximities(input: Vec<NearbyUniversityInput>) -> Result<Vec<Proximity>, ApiError> {
    let mut seen = HashSet::new();
    input
        .into_iter()
        .map(|n| {
            check_non_negative("distanceKm", n.distance_km)?;
            if !seen.insert(n.university_id.clone()) {
                return Err(ApiError::validation(format!("Duplicate university: {}", n.university_id)));
            }
            Ok(Proximity { university_id: n.university_id, distance_km: n.distance_km })
        })
        .collect()
}

/// Accept `[A-Za-z0-9._-]+` ending in an image extension; returns the
/// lower-cased extension.
fn image_extension(filename: &str) -> Result<String, ApiError> {
    let invalid = || ApiError::validation("filename must be a .jpg, .jpeg, .png or .webp name of [A-Za-z0-9._-]");

    if filename.is_empty()
        || filename.len() > MAX_FILENAME_LEN
        || !filename.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid());
    }

    let (stem, ext) = filename.rsplit_once('.').ok_or_else(invalid)?;
    let ext = ext.to_ascii_lowercase();
    if stem.is_empty() || !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(invalid());
    }
    Ok(ext)
}
