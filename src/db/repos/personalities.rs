use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::ProductPersonality;
use crate::db::DbPool;
use crate::error::AppError;

use super::{json_col, to_json};

fn row_to_personality(row: &Row) -> rusqlite::Result<ProductPersonality> {
    Ok(ProductPersonality {
        user_id: row.get("user_id")?,
        product_biases: json_col(row, "product_biases")?,
        technical_biases: json_col(row, "technical_biases")?,
        disliked_patterns: json_col(row, "disliked_patterns")?,
        swipe_speed_profile: json_col(row, "swipe_speed_profile")?,
        total_sessions: row.get("total_sessions")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_by_user(pool: &DbPool, user_id: &str) -> Result<Option<ProductPersonality>, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM personalities WHERE user_id = ?1",
        params![user_id],
        row_to_personality,
    )
    .optional()
    .map_err(AppError::Database)
}

pub fn upsert(pool: &DbPool, personality: &ProductPersonality) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO personalities
         (user_id, product_biases, technical_biases, disliked_patterns,
          swipe_speed_profile, total_sessions, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
            product_biases = excluded.product_biases,
            technical_biases = excluded.technical_biases,
            disliked_patterns = excluded.disliked_patterns,
            swipe_speed_profile = excluded.swipe_speed_profile,
            total_sessions = excluded.total_sessions,
            updated_at = excluded.updated_at",
        params![
            personality.user_id,
            to_json(&personality.product_biases)?,
            to_json(&personality.technical_biases)?,
            to_json(&personality.disliked_patterns)?,
            to_json(&personality.swipe_speed_profile)?,
            personality.total_sessions,
            personality.updated_at,
        ],
    )?;
    Ok(())
}
