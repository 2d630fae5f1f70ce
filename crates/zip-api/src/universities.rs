use axum::{
    Json,
    extract::{Path, Query, State},
};

use zip_db::models::UniversityRow;
use zip_types::api::{Envelope, University, UniversityDetail, UniversityQuery};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub async fn list_universities(
    State(state): State<AppState>,
    Query(query): Query<UniversityQuery>,
) -> Result<Json<Envelope<Vec<University>>>, ApiError> {
    let rows = blocking(&state, move |db| Ok(db.list_universities(query.city.as_deref())?)).await?;
    Ok(Json(Envelope::ok(rows.into_iter().map(university_view).collect())))
}

pub async fn get_university(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<UniversityDetail>>, ApiError> {
    let (row, property_count) = blocking(&state, move |db| {
        db.get_university(&id)?.ok_or(ApiError::NotFound("University"))
    })
    .await?;

    Ok(Json(Envelope::ok(UniversityDetail { university: university_view(row), property_count })))
}

fn university_view(row: UniversityRow) -> University {
    University {
        id: row.id,
        name: row.name,
        short_name: row.short_name,
        city: row.city,
        province: row.province,
        latitude: row.latitude,
        longitude: row.longitude,
        website: row.website,
    }
}
