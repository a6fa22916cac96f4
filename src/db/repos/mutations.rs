use rusqlite::{params, Row};

use crate::db::models::Mutation;
use crate::db::DbPool;
use crate::error::AppError;

use super::{bool_col, enum_col, ensure_updated, json_col, not_found, to_json};

fn row_to_mutation(row: &Row) -> rusqlite::Result<Mutation> {
    Ok(Mutation {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        parent_idea_ids: json_col(row, "parent_idea_ids")?,
        mutation_type: enum_col(row, "mutation_type")?,
        title: row.get("title")?,
        description: row.get("description")?,
        mutation_rationale: row.get("mutation_rationale")?,
        dna_keywords: json_col(row, "dna_keywords")?,
        score: row.get("score")?,
        is_fallback: bool_col(row, "is_fallback")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert_batch(pool: &DbPool, mutations: &[Mutation]) -> Result<(), AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction().map_err(AppError::Database)?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO mutations
             (id, session_id, parent_idea_ids, mutation_type, title, description,
              mutation_rationale, dna_keywords, score, is_fallback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for m in mutations {
            stmt.execute(params![
                m.id,
                m.session_id,
                to_json(&m.parent_idea_ids)?,
                m.mutation_type.as_str(),
                m.title,
                m.description,
                m.mutation_rationale,
                to_json(&m.dna_keywords)?,
                m.score,
                m.is_fallback as i32,
                m.created_at,
            ])?;
        }
    }
    tx.commit().map_err(AppError::Database)?;
    Ok(())
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<Mutation, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM mutations WHERE id = ?1",
        params![id],
        row_to_mutation,
    )
    .map_err(not_found("Mutation", id))
}

pub fn get_by_session(pool: &DbPool, session_id: &str) -> Result<Vec<Mutation>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM mutations WHERE session_id = ?1 ORDER BY rowid ASC")?;
    let rows = stmt.query_map(params![session_id], row_to_mutation)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn update_score(pool: &DbPool, id: &str, score: f64) -> Result<(), AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE mutations SET score = ?1 WHERE id = ?2",
        params![score, id],
    )?;
    ensure_updated(rows, "Mutation", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::repos::fixtures::seed_session;
    use crate::engine::types::MutationType;

    #[test]
    fn test_mutation_roundtrip_and_score() {
        let pool = init_test_db().unwrap();
        seed_session(&pool, "s1");
        let m = Mutation {
            id: "m1".into(),
            session_id: "s1".into(),
            parent_idea_ids: vec!["a".into(), "b".into()],
            mutation_type: MutationType::Crossover,
            title: "Hybrid".into(),
            description: "desc".into(),
            mutation_rationale: "Combines A and B".into(),
            dna_keywords: vec!["x".into()],
            score: 0.0,
            is_fallback: true,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        insert_batch(&pool, std::slice::from_ref(&m)).unwrap();
        assert_eq!(get_by_id(&pool, "m1").unwrap(), m);

        update_score(&pool, "m1", 2.0).unwrap();
        assert_eq!(get_by_session(&pool, "s1").unwrap()[0].score, 2.0);
    }
}
