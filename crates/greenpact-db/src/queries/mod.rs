mod chat;
mod complaints;
mod contracts;
mod listings;
mod ratings;
mod users;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use greenpact_types::models::Role;
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use crate::models::{SnapshotRow, UserRow};

/// User columns, aliased `u`, in the order `user_at` reads them.
pub(crate) const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password, u.role, u.created_at";

/// Snapshot columns from a LEFT JOINed `profiles p`.
pub(crate) const SNAPSHOT_COLUMNS: &str = "p.name, p.address, p.phone, p.image, p.is_verified";

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

pub(crate) fn role_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Role> {
    let raw: String = row.get(idx)?;
    raw.parse::<Role>().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn terms_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

/// Reads `USER_COLUMNS` starting at `start`.
pub(crate) fn user_at(row: &Row<'_>, start: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_col(row, start)?,
        username: row.get(start + 1)?,
        email: row.get(start + 2)?,
        password: row.get(start + 3)?,
        role: role_col(row, start + 4)?,
        created_at: time_col(row, start + 5)?,
    })
}

/// Reads `SNAPSHOT_COLUMNS` starting at `start`; `None` when the join found no profile.
pub(crate) fn snapshot_at(row: &Row<'_>, start: usize) -> rusqlite::Result<Option<SnapshotRow>> {
    let Some(name) = row.get::<_, Option<String>>(start)? else {
        return Ok(None);
    };
    Ok(Some(SnapshotRow {
        name,
        address: row.get(start + 1)?,
        phone: row.get(start + 2)?,
        image: row.get(start + 3)?,
        is_verified: row.get(start + 4)?,
    }))
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Column named by a UNIQUE constraint failure, e.g. `phone` for
/// "UNIQUE constraint failed: profiles.phone".
pub fn unique_violation_column(err: &anyhow::Error) -> Option<String> {
    match err.downcast_ref::<rusqlite::Error>()? {
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            let target = msg.rsplit(": ").next()?;
            let first = target.split(',').next()?.trim();
            Some(first.rsplit('.').next().unwrap_or(first).to_string())
        }
        _ => None,
    }
}

pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    unique_violation_column(err).is_some()
}
