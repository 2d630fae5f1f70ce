use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use zip_db::models::{ProfileChanges, SavedPropertyRow, UserRow};
use zip_types::api::{
    Claims, Envelope, SavePropertyRequest, SavedProperty, SavedPropertySummary, UpdateProfileRequest, UserProfile,
};

use crate::auth::parse_uuid;
use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Envelope<UserProfile>>, ApiError> {
    let id = claims.sub.to_string();
    let row = blocking(&state, move |db| db.get_user_by_id(&id)?.ok_or(ApiError::NotFound("User"))).await?;

    Ok(Json(Envelope::ok(user_profile(row))))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Envelope<UserProfile>>, ApiError> {
    let changes = ProfileChanges {
        name: req.name,
        avatar: req.avatar,
        phone: req.phone,
        country: req.country,
        preferred_language: req.preferred_language,
        university: req.university,
    };

    let id = claims.sub.to_string();
    let row = blocking(&state, move |db| {
        db.update_profile(&id, &changes)?.ok_or(ApiError::NotFound("User"))
    })
    .await?;

    Ok(Json(Envelope::ok(user_profile(row))))
}

pub async fn list_saved(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Envelope<Vec<SavedProperty>>>, ApiError> {
    let id = claims.sub.to_string();
    let rows = blocking(&state, move |db| Ok(db.list_saved_properties(&id)?)).await?;

    Ok(Json(Envelope::ok(rows.into_iter().map(saved_property).collect())))
}

pub async fn save_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SavePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let property_id = req.property_id;

    blocking(&state, move |db| {
        if !db.property_exists(&property_id)? {
            return Err(ApiError::NotFound("Property"));
        }
        if !db.save_property(&user_id, &property_id)? {
            debug!("Property {} already saved by {}", property_id, user_id);
        }
        Ok(())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(Envelope::empty())))
}

pub async fn remove_saved(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(property_id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let user_id = claims.sub.to_string();
    blocking(&state, move |db| Ok(db.remove_saved_property(&user_id, &property_id)?)).await?;

    Ok(Json(Envelope::empty()))
}

fn user_profile(row: UserRow) -> UserProfile {
    UserProfile {
        id: parse_uuid(&row.id),
        email: row.email,
        name: row.name,
        avatar: row.avatar,
        role: row.role,
        university: row.university,
        phone: row.phone,
        preferred_language: row.preferred_language,
        country: row.country,
        created_at: row.created_at,
    }
}

fn saved_property(row: SavedPropertyRow) -> SavedProperty {
    SavedProperty {
        property_id: row.property_id.clone(),
        created_at: row.created_at,
        property: SavedPropertySummary {
            id: row.property_id,
            title: row.title,
            city: row.city,
            property_type: row.property_type,
            price: row.price,
            bedrooms: row.bedrooms,
            verified: row.verified,
            images: row.images,
        },
    }
}
