pub mod feature_variations;
pub mod gallery;
pub mod ideas;
pub mod mutations;
pub mod personalities;
pub mod refinement_answers;
pub mod sessions;
pub mod swipes;
pub mod syntheses;
pub mod visual_assets;

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;

// ============================================================================
// Column codecs shared by the row mappers
// ============================================================================

/// Read a text column into a string-backed enum.
fn enum_col<T>(row: &Row, col: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(col)?;
    raw.parse::<T>().map_err(|e| conversion_error(row, col, e.into()))
}

/// Read a JSON text column.
fn json_col<T: DeserializeOwned>(row: &Row, col: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(row, col, Box::new(e)))
}

fn bool_col(row: &Row, col: &str) -> rusqlite::Result<bool> {
    Ok(row.get::<_, i32>(col)? != 0)
}

fn conversion_error(
    row: &Row,
    col: &str,
    err: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    let idx = row.as_ref().column_index(col).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string(value)?)
}

/// Escape LIKE metacharacters (%, _) so they are matched literally.
fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Map "no rows" to `NotFound` for single-row lookups.
fn not_found(entity: &str, id: &str) -> impl FnOnce(rusqlite::Error) -> AppError {
    let label = format!("{entity} {id}");
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(label),
        other => AppError::Database(other),
    }
}

/// Fail with `NotFound` when an UPDATE touched nothing.
fn ensure_updated(rows: usize, entity: &str, id: &str) -> Result<(), AppError> {
    if rows == 0 {
        return Err(AppError::NotFound(format!("{entity} {id}")));
    }
    Ok(())
}
