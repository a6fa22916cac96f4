use rusqlite::{params, Row};

use crate::db::models::VisualAsset;
use crate::db::DbPool;
use crate::error::AppError;

use super::{bool_col, json_col, not_found, to_json};

fn row_to_asset(row: &Row) -> rusqlite::Result<VisualAsset> {
    Ok(VisualAsset {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        blob_url: row.get("blob_url")?,
        thumbnail_url: row.get("thumbnail_url")?,
        prompt: row.get("prompt")?,
        style_attributes: json_col(row, "style_attributes")?,
        is_selected: bool_col(row, "is_selected")?,
        created_at: row.get("created_at")?,
    })
}

pub fn create(pool: &DbPool, asset: &VisualAsset) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO visual_assets
         (id, session_id, blob_url, thumbnail_url, prompt, style_attributes, is_selected, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            asset.id,
            asset.session_id,
            asset.blob_url,
            asset.thumbnail_url,
            asset.prompt,
            to_json(&asset.style_attributes)?,
            asset.is_selected as i32,
            asset.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_by_session(pool: &DbPool, session_id: &str) -> Result<Vec<VisualAsset>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM visual_assets WHERE session_id = ?1 ORDER BY rowid ASC")?;
    let rows = stmt.query_map(params![session_id], row_to_asset)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

/// Select `asset_id` and deselect every other asset of the session in one
/// transaction.
pub fn select(pool: &DbPool, session_id: &str, asset_id: &str) -> Result<VisualAsset, AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction().map_err(AppError::Database)?;

    let asset = tx
        .query_row(
            "SELECT * FROM visual_assets WHERE id = ?1 AND session_id = ?2",
            params![asset_id, session_id],
            row_to_asset,
        )
        .map_err(not_found("VisualAsset", asset_id))?;

    tx.execute(
        "UPDATE visual_assets SET is_selected = 0 WHERE session_id = ?1 AND id != ?2",
        params![session_id, asset_id],
    )?;
    tx.execute(
        "UPDATE visual_assets SET is_selected = 1 WHERE id = ?1",
        params![asset_id],
    )?;
    tx.commit().map_err(AppError::Database)?;

    Ok(VisualAsset {
        is_selected: true,
        ..asset
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::StyleAttributes;
    use crate::db::repos::fixtures::seed_session;

    fn asset(id: &str, session_id: &str) -> VisualAsset {
        VisualAsset {
            id: id.into(),
            session_id: session_id.into(),
            blob_url: format!("file:///blobs/{id}.png"),
            thumbnail_url: format!("file:///blobs/{id}.thumb.png"),
            prompt: "mockup".into(),
            style_attributes: StyleAttributes {
                palette: "mono".into(),
                layout: "grid".into(),
                vibe: "calm".into(),
            },
            is_selected: false,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_selecting_deselects_others() {
        let pool = init_test_db().unwrap();
        seed_session(&pool, "s1");
        seed_session(&pool, "s2");
        for id in ["a", "b", "c"] {
            create(&pool, &asset(id, "s1")).unwrap();
        }
        create(&pool, &asset("other", "s2")).unwrap();
        select(&pool, "s2", "other").unwrap();

        select(&pool, "s1", "a").unwrap();
        let picked = select(&pool, "s1", "c").unwrap();
        assert!(picked.is_selected);

        let selected: Vec<String> = get_by_session(&pool, "s1")
            .unwrap()
            .into_iter()
            .filter(|a| a.is_selected)
            .map(|a| a.id)
            .collect();
        assert_eq!(selected, vec!["c"]);
        assert!(get_by_session(&pool, "s2").unwrap()[0].is_selected);
    }

    #[test]
    fn test_selecting_foreign_asset_is_not_found() {
        let pool = init_test_db().unwrap();
        seed_session(&pool, "s1");
        seed_session(&pool, "s2");
        create(&pool, &asset("a", "s1")).unwrap();
        assert!(matches!(select(&pool, "s2", "a"), Err(AppError::NotFound(_))));
    }
}
