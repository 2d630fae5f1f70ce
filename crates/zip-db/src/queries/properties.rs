use anyhow::Result;
use rusqlite::{Connection, Transaction};

use super::{OptionalExt, enum_column, json_column, placeholders, string_list_column};
use crate::Database;
use crate::migrations::NOW;
use crate::models::{
    NewProperty, PropertyChanges, PropertyFilter, PropertyRow, Proximity, ProximityRow,
    parse_timestamp,
};

/// True when the property has at least one paid verification order.
const VERIFIED_EXPR: &str = "EXISTS (SELECT 1 FROM verification_orders o WHERE o.property_id = p.id AND o.stage = 'PAID')";

fn select_properties() -> String {
    format!(
        "SELECT p.id, p.owner_id, u.name, p.title, p.description, p.type, p.address, p.city,
                p.province, p.postal_code, p.latitude, p.longitude, p.size, p.bedrooms, p.bathrooms,
                p.max_occupants, p.price, p.currency, p.utilities_included, p.images, p.videos,
                p.virtual_tour, p.amenities, {VERIFIED_EXPR},
                (SELECT COUNT(*) FROM saved_properties s WHERE s.property_id = p.id),
                p.created_at, p.updated_at
         FROM properties p
         JOIN users u ON u.id = p.owner_id"
    )
}

/// Filter clause over `?1` city, `?2` type, `?3` verified. A NULL parameter
/// disables that filter.
fn filter_clause() -> String {
    format!(
        "WHERE (?1 IS NULL OR p.city = ?1)
           AND (?2 IS NULL OR p.type = ?2)
           AND (?3 IS NULL OR {VERIFIED_EXPR} = ?3)"
    )
}

impl Database {
    /// One page of matching properties, newest first, plus the total number
    /// of matches ignoring the page window.
    pub fn list_properties(
        &self,
        filter: &PropertyFilter<'_>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<PropertyRow>, u64)> {
        self.with_conn(|conn| {
            let property_type = filter.property_type.map(|t| t.as_str());
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM properties p {}", filter_clause()),
                rusqlite::params![filter.city, property_type, filter.verified],
                |row| row.get(0),
            )?;

            let sql = format!(
                "{} {} ORDER BY p.created_at DESC, p.rowid DESC LIMIT ?4 OFFSET ?5",
                select_properties(),
                filter_clause()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![filter.city, property_type, filter.verified, limit, offset],
                    map_property,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }

    pub fn get_property(&self, id: &str) -> Result<Option<PropertyRow>> {
        self.with_conn(|conn| query_property(conn, id))
    }

    pub fn list_properties_by_owner(&self, owner_id: &str) -> Result<Vec<PropertyRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE p.owner_id = ?1 ORDER BY p.created_at DESC, p.rowid DESC",
                select_properties()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], map_property)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_property_owner(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT owner_id FROM properties WHERE id = ?1", [id], |row| row.get(0))
                .optional()
        })
    }

    pub fn property_exists(&self, id: &str) -> Result<bool> {
        Ok(self.get_property_owner(id)?.is_some())
    }

    /// Batch-fetch proximity rows (with university detail) for a set of properties.
    pub fn get_proximities(&self, property_ids: &[String]) -> Result<Vec<ProximityRow>> {
        if property_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT up.property_id, up.university_id, un.name, un.short_name, un.city, up.distance_km
                 FROM university_proximity up
                 JOIN universities un ON un.id = up.university_id
                 WHERE up.property_id IN ({})
                 ORDER BY up.distance_km ASC",
                placeholders(property_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(property_ids.iter()), |row| {
                    Ok(ProximityRow {
                        property_id: row.get(0)?,
                        university_id: row.get(1)?,
                        university_name: row.get(2)?,
                        university_short_name: row.get(3)?,
                        university_city: row.get(4)?,
                        distance_km: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Insert a property and its proximity rows in one transaction.
    pub fn create_property(&self, property: &NewProperty) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO properties (
                    id, owner_id, title, description, type, address, city, province, postal_code,
                    latitude, longitude, size, bedrooms, bathrooms, max_occupants, price, currency,
                    utilities_included, images, videos, virtual_tour, amenities
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                           ?17, ?18, ?19, ?20, ?21, ?22)",
                rusqlite::params![
                    property.id,
                    property.owner_id,
                    property.title,
                    property.description,
                    property.property_type.as_str(),
                    property.address,
                    property.city,
                    property.province,
                    property.postal_code,
                    property.latitude,
                    property.longitude,
                    property.size,
                    property.bedrooms,
                    property.bathrooms,
                    property.max_occupants,
                    property.price,
                    property.currency,
                    property.utilities_included,
                    serde_json::to_string(&property.images)?,
                    serde_json::to_string(&property.videos)?,
                    property.virtual_tour,
                    serde_json::to_string(&property.amenities)?,
                ],
            )?;
            insert_proximities(&tx, &property.id, &property.nearby)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Apply a partial update owned by `owner_id`. Returns `false` when no
    /// property with that id and owner exists. A present `nearby` list
    /// replaces the proximity set in the same transaction.
    pub fn update_property(&self, id: &str, owner_id: &str, changes: &PropertyChanges) -> Result<bool> {
        let images = changes.images.as_ref().map(serde_json::to_string).transpose()?;
        let videos = changes.videos.as_ref().map(serde_json::to_string).transpose()?;
        let amenities = changes.amenities.as_ref().map(serde_json::to_string).transpose()?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                &format!(
                    "UPDATE properties SET
                        title = COALESCE(?3, title),
                        description = COALESCE(?4, description),
                        type = COALESCE(?5, type),
                        address = COALESCE(?6, address),
                        city = COALESCE(?7, city),
                        province = COALESCE(?8, province),
                        postal_code = COALESCE(?9, postal_code),
                        latitude = COALESCE(?10, latitude),
                        longitude = COALESCE(?11, longitude),
                        size = COALESCE(?12, size),
                        bedrooms = COALESCE(?13, bedrooms),
                        bathrooms = COALESCE(?14, bathrooms),
                        max_occupants = COALESCE(?15, max_occupants),
                        price = COALESCE(?16, price),
                        currency = COALESCE(?17, currency),
                        utilities_included = COALESCE(?18, utilities_included),
                        images = COALESCE(?19, images),
                        videos = COALESCE(?20, videos),
                        virtual_tour = COALESCE(?21, virtual_tour),
                        amenities = COALESCE(?22, amenities),
                        updated_at = {NOW}
                     WHERE id = ?1 AND owner_id = ?2"
                ),
                rusqlite::params![
                    id,
                    owner_id,
                    changes.title,
                    changes.description,
                    changes.property_type.map(|t| t.as_str()),
                    changes.address,
                    changes.city,
                    changes.province,
                    changes.postal_code,
                    changes.latitude,
                    changes.longitude,
                    changes.size,
                    changes.bedrooms,
                    changes.bathrooms,
                    changes.max_occupants,
                    changes.price,
                    changes.currency,
                    changes.utilities_included,
                    images,
                    videos,
                    changes.virtual_tour,
                    amenities,
                ],
            )?;

            if updated == 0 {
                return Ok(false);
            }

            if let Some(nearby) = &changes.nearby {
                tx.execute("DELETE FROM university_proximity WHERE property_id = ?1", [id])?;
                insert_proximities(&tx, id, nearby)?;
            }

            tx.commit()?;
            Ok(true)
        })
    }
}

fn insert_proximities(tx: &Transaction<'_>, property_id: &str, nearby: &[Proximity]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO university_proximity (property_id, university_id, distance_km) VALUES (?1, ?2, ?3)",
    )?;
    for near in nearby {
        stmt.execute(rusqlite::params![property_id, near.university_id, near.distance_km])?;
    }
    Ok(())
}

fn query_property(conn: &Connection, id: &str) -> Result<Option<PropertyRow>> {
    let sql = format!("{} WHERE p.id = ?1", select_properties());
    conn.query_row(&sql, [id], map_property).optional()
}

fn map_property(row: &rusqlite::Row<'_>) -> rusqlite::Result<PropertyRow> {
    Ok(PropertyRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_name: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        property_type: enum_column(row, 5)?,
        address: row.get(6)?,
        city: row.get(7)?,
        province: row.get(8)?,
        postal_code: row.get(9)?,
        latitude: row.get(10)?,
        longitude: row.get(11)?,
        size: row.get(12)?,
        bedrooms: row.get(13)?,
        bathrooms: row.get(14)?,
        max_occupants: row.get(15)?,
        price: row.get(16)?,
        currency: row.get(17)?,
        utilities_included: row.get(18)?,
        images: string_list_column(row, 19)?,
        videos: string_list_column(row, 20)?,
        virtual_tour: row.get(21)?,
        amenities: json_column(row, 22)?,
        verified: row.get(23)?,
        saved_count: row.get::<_, i64>(24)? as u64,
        created_at: parse_timestamp(&row.get::<_, String>(25)?),
        updated_at: parse_timestamp(&row.get::<_, String>(26)?),
    })
}
