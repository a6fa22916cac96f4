use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::Synthesis;
use crate::db::DbPool;
use crate::error::AppError;

use super::{bool_col, json_col, to_json};

fn row_to_synthesis(row: &Row) -> rusqlite::Result<Synthesis> {
    Ok(Synthesis {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        source_idea_ids: json_col(row, "source_idea_ids")?,
        merged_title: row.get("merged_title")?,
        merged_description: row.get("merged_description")?,
        thematic_bridge: row.get("thematic_bridge")?,
        retained_elements: json_col(row, "retained_elements")?,
        is_fallback: bool_col(row, "is_fallback")?,
        created_at: row.get("created_at")?,
    })
}

/// Fails with `Validation` when the session already has a synthesis.
pub fn create(pool: &DbPool, synthesis: &Synthesis) -> Result<(), AppError> {
    let conn = pool.get()?;
    let result = conn.execute(
        "INSERT INTO syntheses
         (id, session_id, source_idea_ids, merged_title, merged_description,
          thematic_bridge, retained_elements, is_fallback, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            synthesis.id,
            synthesis.session_id,
            to_json(&synthesis.source_idea_ids)?,
            synthesis.merged_title,
            synthesis.merged_description,
            synthesis.thematic_bridge,
            to_json(&synthesis.retained_elements)?,
            synthesis.is_fallback as i32,
            synthesis.created_at,
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Err(AppError::Validation(format!(
                "Session {} already has a synthesis",
                synthesis.session_id
            )))
        }
        Err(e) => Err(AppError::Database(e)),
    }
}

pub fn find_by_session(pool: &DbPool, session_id: &str) -> Result<Option<Synthesis>, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM syntheses WHERE session_id = ?1",
        params![session_id],
        row_to_synthesis,
    )
    .optional()
    .map_err(AppError::Database)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::db::init_test_db;
    use crate::db::repos::fixtures::seed_session;

    fn synthesis(id: &str) -> Synthesis {
        let mut retained = BTreeMap::new();
        retained.insert("a".to_string(), vec!["A".to_string(), "core concept".to_string()]);
        retained.insert("b".to_string(), vec!["B".to_string()]);
        Synthesis {
            id: id.into(),
            session_id: "s1".into(),
            source_idea_ids: vec!["a".into(), "b".into()],
            merged_title: "A B".into(),
            merged_description: "Merged".into(),
            thematic_bridge: "Both are about habits".into(),
            retained_elements: retained,
            is_fallback: false,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_one_synthesis_per_session() {
        let pool = init_test_db().unwrap();
        seed_session(&pool, "s1");
        assert!(find_by_session(&pool, "s1").unwrap().is_none());

        create(&pool, &synthesis("x1")).unwrap();
        assert_eq!(find_by_session(&pool, "s1").unwrap(), Some(synthesis("x1")));

        let second = create(&pool, &synthesis("x2"));
        assert!(matches!(second, Err(AppError::Validation(_))));
    }
}
