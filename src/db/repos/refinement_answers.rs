use rusqlite::{params, Row};

use crate::db::models::RefinementAnswer;
use crate::db::DbPool;
use crate::engine::types::RefinementRole;
use crate::error::AppError;

use super::enum_col;

fn row_to_answer(row: &Row) -> rusqlite::Result<RefinementAnswer> {
    Ok(RefinementAnswer {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        role: enum_col(row, "role")?,
        question_index: row.get("question_index")?,
        question: row.get("question")?,
        answer: row.get("answer")?,
        created_at: row.get("created_at")?,
    })
}

pub fn create(pool: &DbPool, answer: &RefinementAnswer) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO refinement_answers
         (id, session_id, role, question_index, question, answer, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            answer.id,
            answer.session_id,
            answer.role.as_str(),
            answer.question_index,
            answer.question,
            answer.answer,
            answer.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_by_session_role(
    pool: &DbPool,
    session_id: &str,
    role: RefinementRole,
) -> Result<Vec<RefinementAnswer>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM refinement_answers
         WHERE session_id = ?1 AND role = ?2
         ORDER BY question_index ASC",
    )?;
    let rows = stmt.query_map(params![session_id, role.as_str()], row_to_answer)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::repos::fixtures::seed_session;

    fn answer(id: &str, role: RefinementRole, index: i64) -> RefinementAnswer {
        RefinementAnswer {
            id: id.into(),
            session_id: "s1".into(),
            role,
            question_index: index,
            question: "Q".into(),
            answer: "A".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_answers_are_scoped_by_role() {
        let pool = init_test_db().unwrap();
        seed_session(&pool, "s1");
        create(&pool, &answer("p2", RefinementRole::ProductManager, 2)).unwrap();
        create(&pool, &answer("p1", RefinementRole::ProductManager, 1)).unwrap();
        create(&pool, &answer("a1", RefinementRole::Architect, 1)).unwrap();

        let pm = get_by_session_role(&pool, "s1", RefinementRole::ProductManager).unwrap();
        let ids: Vec<&str> = pm.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(
            get_by_session_role(&pool, "s1", RefinementRole::Architect).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_duplicate_question_index_is_rejected() {
        let pool = init_test_db().unwrap();
        seed_session(&pool, "s1");
        create(&pool, &answer("p1", RefinementRole::ProductManager, 1)).unwrap();
        assert!(create(&pool, &answer("p1b", RefinementRole::ProductManager, 1)).is_err());
    }
}
