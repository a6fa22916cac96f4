use rusqlite::{params, Row};

use crate::db::models::Idea;
use crate::db::DbPool;
use crate::error::AppError;

use super::{bool_col, json_col, not_found, to_json};

fn row_to_idea(row: &Row) -> rusqlite::Result<Idea> {
    Ok(Idea {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        batch_number: row.get("batch_number")?,
        title: row.get("title")?,
        description: row.get("description")?,
        dna_keywords: json_col(row, "dna_keywords")?,
        score: row.get("score")?,
        is_fallback: bool_col(row, "is_fallback")?,
        created_at: row.get("created_at")?,
    })
}

/// Insert a whole batch in one transaction.
pub fn insert_batch(pool: &DbPool, ideas: &[Idea]) -> Result<(), AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction().map_err(AppError::Database)?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO ideas
             (id, session_id, batch_number, title, description, dna_keywords,
              score, is_fallback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for idea in ideas {
            stmt.execute(params![
                idea.id,
                idea.session_id,
                idea.batch_number,
                idea.title,
                idea.description,
                to_json(&idea.dna_keywords)?,
                idea.score,
                idea.is_fallback as i32,
                idea.created_at,
            ])?;
        }
    }
    tx.commit().map_err(AppError::Database)?;
    Ok(())
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<Idea, AppError> {
    let conn = pool.get()?;
    conn.query_row("SELECT * FROM ideas WHERE id = ?1", params![id], row_to_idea)
        .map_err(not_found("Idea", id))
}

pub fn get_by_session(pool: &DbPool, session_id: &str) -> Result<Vec<Idea>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM ideas WHERE session_id = ?1 ORDER BY batch_number ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![session_id], row_to_idea)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn max_batch_number(pool: &DbPool, session_id: &str) -> Result<i64, AppError> {
    let conn = pool.get()?;
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(batch_number), 0) FROM ideas WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    Ok(max)
}
