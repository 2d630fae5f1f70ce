use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Millisecond-precision UTC timestamp, sortable as text.
pub(crate) const NOW: &str = "(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(&v1_schema())?;
    }

    if version < 2 {
        info!("Running migration v2 (seed universities)");
        conn.execute_batch(
            "
            INSERT OR IGNORE INTO universities (id, name, short_name, city, province, latitude, longitude, website)
                VALUES ('seed-uoft', 'University of Toronto', 'UofT', 'Toronto', 'ON', 43.6629, -79.3957, 'https://www.utoronto.ca');
            INSERT OR IGNORE INTO universities (id, name, short_name, city, province, latitude, longitude, website)
                VALUES ('seed-york', 'York University', 'York', 'Toronto', 'ON', 43.7735, -79.5019, 'https://www.yorku.ca');

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

fn v1_schema() -> String {
    format!(
        "
        CREATE TABLE users (
            id                  TEXT PRIMARY KEY,
            email               TEXT NOT NULL UNIQUE,
            password_hash       TEXT NOT NULL,
            role                TEXT NOT NULL CHECK (role IN ('RENTER', 'PROPERTY_OWNER')),
            name                TEXT,
            avatar              TEXT,
            phone               TEXT,
            country             TEXT,
            preferred_language  TEXT,
            university          TEXT,
            created_at          TEXT NOT NULL DEFAULT {NOW}
        );

        CREATE TABLE properties (
            id                  TEXT PRIMARY KEY,
            owner_id            TEXT NOT NULL REFERENCES users(id),
            title               TEXT NOT NULL,
            description         TEXT NOT NULL,
            type                TEXT NOT NULL CHECK (type IN ('SHARED', 'STUDIO', 'PRIVATE', 'HOMESTAY', 'HOUSE')),
            address             TEXT NOT NULL,
            city                TEXT NOT NULL,
            province            TEXT NOT NULL,
            postal_code         TEXT NOT NULL,
            latitude            REAL NOT NULL,
            longitude           REAL NOT NULL,
            size                REAL NOT NULL CHECK (size >= 0),
            bedrooms            INTEGER NOT NULL CHECK (bedrooms >= 0),
            bathrooms           REAL NOT NULL CHECK (bathrooms >= 0),
            max_occupants       INTEGER NOT NULL CHECK (max_occupants >= 1),
            price               REAL NOT NULL CHECK (price >= 0),
            currency            TEXT NOT NULL DEFAULT 'CAD',
            utilities_included  INTEGER NOT NULL DEFAULT 0,
            images              TEXT NOT NULL DEFAULT '[]',
            videos              TEXT NOT NULL DEFAULT '[]',
            virtual_tour        TEXT,
            amenities           TEXT NOT NULL DEFAULT '{{}}',
            created_at          TEXT NOT NULL DEFAULT {NOW},
            updated_at          TEXT NOT NULL DEFAULT {NOW}
        );

        CREATE INDEX idx_properties_city ON properties(city, created_at);
        CREATE INDEX idx_properties_owner ON properties(owner_id);

        CREATE TABLE universities (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            short_name  TEXT,
            city        TEXT NOT NULL,
            province    TEXT NOT NULL,
            latitude    REAL NOT NULL,
            longitude   REAL NOT NULL,
            website     TEXT
        );

        CREATE TABLE university_proximity (
            property_id     TEXT NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
            university_id   TEXT NOT NULL REFERENCES universities(id),
            distance_km     REAL NOT NULL CHECK (distance_km >= 0),
            PRIMARY KEY (property_id, university_id)
        );

        CREATE INDEX idx_proximity_university ON university_proximity(university_id);

        CREATE TABLE saved_properties (
            user_id         TEXT NOT NULL REFERENCES users(id),
            property_id     TEXT NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
            created_at      TEXT NOT NULL DEFAULT {NOW},
            PRIMARY KEY (user_id, property_id)
        );

        CREATE INDEX idx_saved_property ON saved_properties(property_id);

        CREATE TABLE verification_orders (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            property_id     TEXT NOT NULL REFERENCES properties(id),
            stage           TEXT NOT NULL CHECK (stage IN ('PENDING_PAYMENT', 'PAID')),
            tier            TEXT NOT NULL CHECK (tier IN ('STANDARD', 'COMPREHENSIVE', 'PREMIUM')),
            amount          INTEGER NOT NULL CHECK (amount >= 0),
            currency        TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT {NOW},
            paid_at         TEXT,
            CHECK ((stage = 'PAID') = (paid_at IS NOT NULL))
        );

        CREATE INDEX idx_orders_user ON verification_orders(user_id, stage);
        CREATE INDEX idx_orders_property ON verification_orders(property_id, stage);

        INSERT INTO schema_version (version) VALUES (1);
        "
    )
}
