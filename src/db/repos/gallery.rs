use rusqlite::{params, OptionalExtension, Row, ToSql};

use crate::db::models::{GalleryEntry, GalleryPage, GalleryQuery};
use crate::db::DbPool;
use crate::error::AppError;

use super::{bool_col, escape_like, json_col, not_found, to_json};

fn row_to_entry(row: &Row) -> rusqlite::Result<GalleryEntry> {
    Ok(GalleryEntry {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        app_type: row.get("app_type")?,
        thumbnail_url: row.get("thumbnail_url")?,
        tags: json_col(row, "tags")?,
        is_published: bool_col(row, "is_published")?,
        published_at: row.get("published_at")?,
    })
}

/// Insert or replace the entry for a session (one entry per session).
pub fn upsert(pool: &DbPool, entry: &GalleryEntry) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO gallery_entries
         (id, session_id, user_id, title, description, app_type, thumbnail_url,
          tags, is_published, published_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            app_type = excluded.app_type,
            thumbnail_url = excluded.thumbnail_url,
            tags = excluded.tags,
            is_published = excluded.is_published,
            published_at = excluded.published_at",
        params![
            entry.id,
            entry.session_id,
            entry.user_id,
            entry.title,
            entry.description,
            entry.app_type,
            entry.thumbnail_url,
            to_json(&entry.tags)?,
            entry.is_published as i32,
            entry.published_at,
        ],
    )?;
    Ok(())
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<GalleryEntry, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM gallery_entries WHERE id = ?1",
        params![id],
        row_to_entry,
    )
    .map_err(not_found("GalleryEntry", id))
}

pub fn find_by_session(pool: &DbPool, session_id: &str) -> Result<Option<GalleryEntry>, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM gallery_entries WHERE session_id = ?1",
        params![session_id],
        row_to_entry,
    )
    .optional()
    .map_err(AppError::Database)
}

/// Published entries matching `query`, newest first.
pub fn query_published(pool: &DbPool, query: &GalleryQuery) -> Result<GalleryPage, AppError> {
    let conn = pool.get()?;

    let mut conditions = vec!["is_published = 1".to_string()];
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
    let mut param_idx = 1;

    if let Some(q) = query.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let like = format!("%{}%", escape_like(q));
        conditions.push(format!(
            "(title LIKE ?{} ESCAPE '\\' OR description LIKE ?{} ESCAPE '\\')",
            param_idx,
            param_idx + 1
        ));
        params_vec.push(Box::new(like.clone()));
        params_vec.push(Box::new(like));
        param_idx += 2;
    }

    if let Some(app_type) = &query.app_type {
        conditions.push(format!("app_type = ?{param_idx}"));
        params_vec.push(Box::new(app_type.clone()));
        param_idx += 1;
    }

    let where_clause = conditions.join(" AND ");
    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM gallery_entries WHERE {where_clause}"),
        params_refs.as_slice(),
        |row| row.get(0),
    )?;

    let page = query.page.max(1);
    let page_size = query.page_size.max(1);
    let offset = i64::from(page - 1) * i64::from(page_size);
    let sql = format!(
        "SELECT * FROM gallery_entries WHERE {where_clause}
         ORDER BY published_at DESC, rowid DESC
         LIMIT ?{} OFFSET ?{}",
        param_idx,
        param_idx + 1
    );
    let limit = i64::from(page_size);
    let mut page_params = params_refs;
    page_params.push(&limit);
    page_params.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(page_params.as_slice(), row_to_entry)?;
    let entries = rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)?;

    Ok(GalleryPage {
        entries,
        total,
        page,
        page_size,
    })
}
