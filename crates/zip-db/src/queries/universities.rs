use anyhow::Result;

use super::{OptionalExt, placeholders};
use crate::Database;
use crate::models::UniversityRow;

const UNIVERSITY_COLUMNS: &str = "id, name, short_name, city, province, latitude, longitude, website";

fn map_university(row: &rusqlite::Row<'_>) -> rusqlite::Result<UniversityRow> {
    Ok(UniversityRow {
        id: row.get(0)?,
        name: row.get(1)?,
        short_name: row.get(2)?,
        city: row.get(3)?,
        province: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        website: row.get(7)?,
    })
}

impl Database {
    pub fn list_universities(&self, city: Option<&str>) -> Result<Vec<UniversityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {UNIVERSITY_COLUMNS} FROM universities
                 WHERE (?1 IS NULL OR city = ?1)
                 ORDER BY name ASC"
            ))?;
            let rows = stmt
                .query_map([city], map_university)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// A university plus the number of properties listing it as nearby.
    pub fn get_university(&self, id: &str) -> Result<Option<(UniversityRow, u64)>> {
        self.with_conn(|conn| {
            let Some(university) = conn
                .query_row(
                    &format!("SELECT {UNIVERSITY_COLUMNS} FROM universities WHERE id = ?1"),
                    [id],
                    map_university,
                )
                .optional()?
            else {
                return Ok(None);
            };

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM university_proximity WHERE university_id = ?1",
                [id],
                |row| row.get(0),
            )?;

            Ok(Some((university, count as u64)))
        })
    }

    /// The ids from `ids` that do not name a known university.
    pub fn missing_university_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!("SELECT id FROM universities WHERE id IN ({})", placeholders(ids.len()));
            let mut stmt = conn.prepare(&sql)?;
            let known = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(ids.iter().filter(|id| !known.contains(id)).cloned().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support;

    #[test]
    fn seeded_universities_are_listed_by_name() {
        let db = Database::open_in_memory().unwrap();
        let all = db.list_universities(None).unwrap();
        let names: Vec<&str> = all.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["University of Toronto", "York University"]);

        assert_eq!(db.list_universities(Some("Toronto")).unwrap().len(), 2);
        assert!(db.list_universities(Some("Ottawa")).unwrap().is_empty());
    }

    #[test]
    fn get_counts_nearby_properties() {
        let db = Database::open_in_memory().unwrap();
        let owner = test_support::user(&db, "owner@example.com");
        test_support::property(&db, &owner, "Toronto");

        let (university, count) = db.get_university("seed-uoft").unwrap().unwrap();
        assert_eq!(university.short_name.as_deref(), Some("UofT"));
        assert_eq!(count, 1);

        let (_, york) = db.get_university("seed-york").unwrap().unwrap();
        assert_eq!(york, 0);

        assert!(db.get_university("missing").unwrap().is_none());
    }

    #[test]
    fn reports_unknown_university_ids() {
        let db = Database::open_in_memory().unwrap();
        let ids = vec!["seed-uoft".to_string(), "seed-mit".to_string()];
        assert_eq!(db.missing_university_ids(&ids).unwrap(), vec!["seed-mit".to_string()]);
    }
}
