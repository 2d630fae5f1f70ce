use anyhow::Result;

use super::{enum_column, string_list_column};
use crate::Database;
use crate::models::{SavedPropertyRow, parse_timestamp};

impl Database {
    /// Idempotent: saving an already-saved pair leaves the single row as is.
    /// Returns whether a new row was inserted.
    pub fn save_property(&self, user_id: &str, property_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO saved_properties (user_id, property_id) VALUES (?1, ?2)
                 ON CONFLICT(user_id, property_id) DO NOTHING",
                [user_id, property_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns the number of rows removed; removing an unsaved pair is not an error.
    pub fn remove_saved_property(&self, user_id: &str, property_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM saved_properties WHERE user_id = ?1 AND property_id = ?2",
                [user_id, property_id],
            )?;
            Ok(removed)
        })
    }

    pub fn list_saved_properties(&self, user_id: &str) -> Result<Vec<SavedPropertyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.property_id, s.created_at, p.title, p.city, p.type, p.price, p.bedrooms,
                        EXISTS (SELECT 1 FROM verification_orders o WHERE o.property_id = p.id AND o.stage = 'PAID'),
                        p.images
                 FROM saved_properties s
                 JOIN properties p ON p.id = s.property_id
                 WHERE s.user_id = ?1
                 ORDER BY s.created_at DESC, s.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(SavedPropertyRow {
                        property_id: row.get(0)?,
                        created_at: parse_timestamp(&row.get::<_, String>(1)?),
                        title: row.get(2)?,
                        city: row.get(3)?,
                        property_type: enum_column(row, 4)?,
                        price: row.get(5)?,
                        bedrooms: row.get(6)?,
                        verified: row.get(7)?,
                        images: string_list_column(row, 8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}
