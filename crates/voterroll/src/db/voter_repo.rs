//! Bulk voter writes scoped to one import job.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// A raw voter row from the database.
#[derive(Debug, Clone)]
pub struct VoterRow {
    pub id: i64,
    pub assembly_id: i64,
    pub import_job_id: Option<i64>,
    pub epic: Option<String>,
    pub name: String,
    pub relative_name: Option<String>,
    pub relation_type: Option<String>,
    pub house_number: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub booth_number: Option<i64>,
    pub village: Option<String>,
    pub area: Option<String>,
    pub page_number: Option<i64>,
    pub box_index: Option<i64>,
    /// Voters sharing this voter's household, the voter included.
    pub family_size: Option<i64>,
    pub created_at: String,
}

impl VoterRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            assembly_id: row.get("assembly_id")?,
            import_job_id: row.get("import_job_id")?,
            epic: row.get("epic")?,
            name: row.get("name")?,
            relative_name: row.get("relative_name")?,
            relation_type: row.get("relation_type")?,
            house_number: row.get("house_number")?,
            age: row.get("age")?,
            gender: row.get("gender")?,
            booth_number: row.get("booth_number")?,
            village: row.get("village")?,
            area: row.get("area")?,
            page_number: row.get("page_number")?,
            box_index: row.get("box_index")?,
            family_size: row.get("family_size")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A voter about to be inserted.
#[derive(Debug, Clone, Default)]
pub struct NewVoterRow {
    pub assembly_id: i64,
    pub import_job_id: Option<i64>,
    pub epic: Option<String>,
    pub name: String,
    pub relative_name: Option<String>,
    pub relation_type: Option<String>,
    pub house_number: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub booth_number: Option<i64>,
    pub village: Option<String>,
    pub area: Option<String>,
    pub page_number: Option<i64>,
    pub box_index: Option<i64>,
}

/// Voter count for one village within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VillageCount {
    pub village: String,
    pub count: u64,
}

/// Inserts all rows with one prepared statement. Run inside a transaction.
pub fn insert_batch_in(
    conn: &Connection,
    voters: &[NewVoterRow],
    created_at: &str,
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO voters (assembly_id, import_job_id, epic, name, relative_name,
         relation_type, house_number, age, gender, booth_number, village, area,
         page_number, box_index, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )?;

    let mut inserted = 0;
    for voter in voters {
        inserted += stmt.execute(params![
            voter.assembly_id,
            voter.import_job_id,
            voter.epic,
            voter.name,
            voter.relative_name,
            voter.relation_type,
            voter.house_number,
            voter.age,
            voter.gender,
            voter.booth_number,
            voter.village,
            voter.area,
            voter.page_number,
            voter.box_index,
            created_at,
        ])?;
    }
    Ok(inserted)
}

/// Deletes every voter tagged with `job_id`.
pub fn delete_by_job_in(conn: &Connection, job_id: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM voters WHERE import_job_id = ?1",
        params![job_id],
    )?;
    Ok(deleted)
}

/// Rewrites the location of every voter tagged with `job_id`.
pub fn cascade_location_in(
    conn: &Connection,
    job_id: i64,
    booth_number: Option<i64>,
    village: &str,
    area: Option<&str>,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE voters SET booth_number = ?2, village = ?3, area = ?4
         WHERE import_job_id = ?1",
        params![job_id, booth_number, village, area],
    )?;
    Ok(updated)
}

/// Voters of one assembly with the same village, area and house number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HouseholdKey {
    pub assembly_id: i64,
    pub village: Option<String>,
    pub area: Option<String>,
    pub house_number: String,
}

/// Households with at least one voter tagged with `job_id`. Voters
/// without a house number belong to no household.
pub fn households_of_job_in(
    conn: &Connection,
    job_id: i64,
) -> Result<Vec<HouseholdKey>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT assembly_id, village, area, house_number FROM voters
         WHERE import_job_id = ?1 AND house_number IS NOT NULL AND TRIM(house_number) != ''",
    )?;
    let keys = stmt
        .query_map(params![job_id], |r| {
            Ok(HouseholdKey {
                assembly_id: r.get(0)?,
                village: r.get(1)?,
                area: r.get(2)?,
                house_number: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

/// Sets `family_size` on every member of each household to the
/// household's current head count. Returns the number of voters updated.
pub fn refresh_family_sizes_in<'a>(
    conn: &Connection,
    households: impl IntoIterator<Item = &'a HouseholdKey>,
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare(
        "UPDATE voters SET family_size = (
             SELECT COUNT(*) FROM voters AS h
             WHERE h.assembly_id = ?1 AND h.village IS ?2 AND h.area IS ?3
               AND h.house_number = ?4)
         WHERE assembly_id = ?1 AND village IS ?2 AND area IS ?3 AND house_number = ?4",
    )?;

    let mut updated = 0;
    for key in households {
        updated += stmt.execute(params![
            key.assembly_id,
            key.village,
            key.area,
            key.house_number
        ])?;
    }
    Ok(updated)
}

/// Runs `change` against the voters of `job_id`, then recounts every
/// household the job had members in before or after the change.
pub fn sync_households_in<T, F>(conn: &Connection, job_id: i64, change: F) -> Result<T, DatabaseError>
where
    F: FnOnce(&Connection) -> Result<T, DatabaseError>,
{
    let mut touched: BTreeSet<HouseholdKey> =
        households_of_job_in(conn, job_id)?.into_iter().collect();
    let result = change(conn)?;
    touched.extend(households_of_job_in(conn, job_id)?);

    let refreshed = refresh_family_sizes_in(conn, &touched)?;
    log::debug!(
        "Recounted {} household(s) touched by job {} ({} voter(s))",
        touched.len(),
        job_id,
        refreshed
    );
    Ok(result)
}

/// Counts voters tagged with `job_id`.
pub fn count_by_job(db: &Database, job_id: i64) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM voters WHERE import_job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Returns voters tagged with `job_id` in insertion order.
pub fn find_by_job(db: &Database, job_id: i64) -> Result<Vec<VoterRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM voters WHERE import_job_id = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map(params![job_id], VoterRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Distinct villages and their voter counts for one job.
///
/// Empty and `Unknown` villages are OCR placeholders and are left out.
pub fn village_counts(db: &Database, job_id: i64) -> Result<Vec<VillageCount>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT village, COUNT(*) FROM voters
             WHERE import_job_id = ?1 AND village IS NOT NULL
               AND TRIM(village) != '' AND village != 'Unknown'
             GROUP BY village ORDER BY village ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id], |r| {
                Ok(VillageCount {
                    village: r.get(0)?,
                    count: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
