use rusqlite::{params, Row};

use crate::db::models::Swipe;
use crate::db::DbPool;
use crate::error::AppError;

use super::{enum_col, ensure_updated};

fn row_to_swipe(row: &Row) -> rusqlite::Result<Swipe> {
    Ok(Swipe {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        idea_id: row.get("idea_id")?,
        user_id: row.get("user_id")?,
        direction: enum_col(row, "direction")?,
        duration_ms: row.get("duration_ms")?,
        speed_category: enum_col(row, "speed_category")?,
        timestamp: row.get("timestamp")?,
    })
}

/// Append `swipe` and set its idea's score in one transaction, so the log
/// and `ideas.score` never disagree.
pub fn record(pool: &DbPool, swipe: &Swipe, idea_score: f64) -> Result<(), AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction().map_err(AppError::Database)?;

    let rows = tx.execute(
        "UPDATE ideas SET score = ?1 WHERE id = ?2 AND session_id = ?3",
        params![idea_score, swipe.idea_id, swipe.session_id],
    )?;
    ensure_updated(rows, "Idea", &swipe.idea_id)?;

    tx.execute(
        "INSERT INTO swipes
         (id, session_id, idea_id, user_id, direction, duration_ms, speed_category, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            swipe.id,
            swipe.session_id,
            swipe.idea_id,
            swipe.user_id,
            swipe.direction.as_str(),
            swipe.duration_ms,
            swipe.speed_category.as_str(),
            swipe.timestamp,
        ],
    )?;
    tx.commit().map_err(AppError::Database)?;
    Ok(())
}

/// Swipes in submission order.
pub fn get_by_session(pool: &DbPool, session_id: &str) -> Result<Vec<Swipe>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM swipes WHERE session_id = ?1 ORDER BY rowid ASC")?;
    let rows = stmt.query_map(params![session_id], row_to_swipe)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}
