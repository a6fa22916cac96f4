use rusqlite::{params, Row};

use crate::db::models::FeatureVariation;
use crate::db::DbPool;
use crate::error::AppError;

use super::{enum_col, ensure_updated, json_col, not_found, to_json};

fn row_to_variation(row: &Row) -> rusqlite::Result<FeatureVariation> {
    Ok(FeatureVariation {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        mutation_id: row.get("mutation_id")?,
        variation_theme: enum_col(row, "variation_theme")?,
        features: json_col(row, "features")?,
        service_integrations: json_col(row, "service_integrations")?,
        score: row.get("score")?,
        created_at: row.get("created_at")?,
    })
}

/// Persist one mutation's variations together or not at all.
pub fn create_batch(pool: &DbPool, variations: &[FeatureVariation]) -> Result<(), AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction().map_err(AppError::Database)?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO feature_variations
             (id, session_id, mutation_id, variation_theme, features,
              service_integrations, score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for v in variations {
            let result = stmt.execute(params![
                v.id,
                v.session_id,
                v.mutation_id,
                v.variation_theme.as_str(),
                to_json(&v.features)?,
                to_json(&v.service_integrations)?,
                v.score,
                v.created_at,
            ]);
            match result {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation
                        && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    return Err(AppError::Validation(format!(
                        "Mutation {} already has a {} variation",
                        v.mutation_id, v.variation_theme
                    )));
                }
                Err(e) => return Err(AppError::Database(e)),
            }
        }
    }
    tx.commit().map_err(AppError::Database)?;
    Ok(())
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<FeatureVariation, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM feature_variations WHERE id = ?1",
        params![id],
        row_to_variation,
    )
    .map_err(not_found("FeatureVariation", id))
}

pub fn get_by_session(pool: &DbPool, session_id: &str) -> Result<Vec<FeatureVariation>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM feature_variations WHERE session_id = ?1 ORDER BY rowid ASC",
    )?;
    let rows = stmt.query_map(params![session_id], row_to_variation)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn update_score(pool: &DbPool, id: &str, score: f64) -> Result<(), AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE feature_variations SET score = ?1 WHERE id = ?2",
        params![score, id],
    )?;
    ensure_updated(rows, "FeatureVariation", id)
}
