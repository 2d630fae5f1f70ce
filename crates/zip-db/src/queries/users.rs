use anyhow::Result;
use rusqlite::Connection;

use super::{OptionalExt, enum_column};
use crate::Database;
use crate::models::{NewUser, ProfileChanges, UserRow, parse_timestamp};

const USER_COLUMNS: &str = "id, email, password_hash, role, name, avatar, phone, country, preferred_language, university, created_at";

impl Database {
    /// Returns `false` when the email is already registered.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password_hash, role, name) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![user.id, user.email, user.password_hash, user.role.as_str(), user.name],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Apply the present fields of `changes`; returns the updated row, or
    /// `None` if the user does not exist.
    pub fn update_profile(&self, id: &str, changes: &ProfileChanges) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    avatar = COALESCE(?3, avatar),
                    phone = COALESCE(?4, phone),
                    country = COALESCE(?5, country),
                    preferred_language = COALESCE(?6, preferred_language),
                    university = COALESCE(?7, university)
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    changes.name,
                    changes.avatar,
                    changes.phone,
                    changes.country,
                    changes.preferred_language,
                    changes.university,
                ],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_user(conn, "id", id)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                role: enum_column(row, 3)?,
                name: row.get(4)?,
                avatar: row.get(5)?,
                phone: row.get(6)?,
                country: row.get(7)?,
                preferred_language: row.get(8)?,
                university: row.get(9)?,
                created_at: parse_timestamp(&row.get::<_, String>(10)?),
            })
        })
        .optional()?;

    Ok(row)
}
