use rusqlite::{params, Row};

use crate::db::models::Session;
use crate::db::DbPool;
use crate::error::AppError;

use super::{enum_col, ensure_updated, json_col, not_found, to_json};

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        app_type: row.get("app_type")?,
        complexity_level: row.get("complexity_level")?,
        current_phase: enum_col(row, "current_phase")?,
        status: enum_col(row, "status")?,
        top_idea_ids: json_col(row, "top_idea_ids")?,
        selected_idea_ids: json_col(row, "selected_idea_ids")?,
        selected_variation_id: row.get("selected_variation_id")?,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn create(pool: &DbPool, session: &Session) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO sessions
         (id, user_id, app_type, complexity_level, current_phase, status,
          top_idea_ids, selected_idea_ids, selected_variation_id,
          created_at, completed_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            session.id,
            session.user_id,
            session.app_type,
            session.complexity_level,
            session.current_phase.as_str(),
            session.status.as_str(),
            to_json(&session.top_idea_ids)?,
            to_json(&session.selected_idea_ids)?,
            session.selected_variation_id,
            session.created_at,
            session.completed_at,
            session.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<Session, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM sessions WHERE id = ?1",
        params![id],
        row_to_session,
    )
    .map_err(not_found("Session", id))
}

/// Overwrite every mutable column. `id`, `user_id` and `created_at` never change.
pub fn update(pool: &DbPool, session: &Session) -> Result<(), AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE sessions SET
            app_type = ?2, complexity_level = ?3, current_phase = ?4, status = ?5,
            top_idea_ids = ?6, selected_idea_ids = ?7, selected_variation_id = ?8,
            completed_at = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            session.id,
            session.app_type,
            session.complexity_level,
            session.current_phase.as_str(),
            session.status.as_str(),
            to_json(&session.top_idea_ids)?,
            to_json(&session.selected_idea_ids)?,
            session.selected_variation_id,
            session.completed_at,
            session.updated_at,
        ],
    )?;
    ensure_updated(rows, "Session", &session.id)
}
