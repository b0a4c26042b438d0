//! Booths, keyed by (booth number, assembly id).

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw booth row from the database.
#[derive(Debug, Clone)]
pub struct BoothRow {
    pub id: i64,
    pub number: i64,
    pub assembly_id: i64,
    pub name: Option<String>,
    pub area: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl BoothRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            number: row.get("number")?,
            assembly_id: row.get("assembly_id")?,
            name: row.get("name")?,
            area: row.get("area")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Creates the booth or refreshes its name and area.
///
/// `None` values leave the stored value untouched.
pub fn upsert(
    db: &Database,
    number: i64,
    assembly_id: i64,
    name: Option<&str>,
    area: Option<&str>,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO booths (number, assembly_id, name, area, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(number, assembly_id) DO UPDATE SET
                name = COALESCE(excluded.name, booths.name),
                area = COALESCE(excluded.area, booths.area),
                updated_at = excluded.updated_at",
            params![number, assembly_id, name, area, now],
        )?;
        Ok(())
    })
}

/// Finds a booth by its natural key.
pub fn find(db: &Database, number: i64, assembly_id: i64) -> Result<Option<BoothRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM booths WHERE number = ?1 AND assembly_id = ?2",
                params![number, assembly_id],
                BoothRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}
