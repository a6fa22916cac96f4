use rusqlite::Connection;

use crate::error::AppError;

/// Run the consolidated, idempotent schema migration.
pub fn run(conn: &Connection) -> Result<(), AppError> {
    tracing::debug!("Running database migrations");

    conn.execute_batch(SCHEMA)?;

    tracing::info!("Database migrations complete");
    Ok(())
}

// List-valued columns (keywords, ids, features, biases) hold JSON text.
const SCHEMA: &str = r#"

-- ============================================================================
-- Sessions
-- ============================================================================

CREATE TABLE IF NOT EXISTS sessions (
    id                      TEXT PRIMARY KEY,
    user_id                 TEXT NOT NULL,
    app_type                TEXT,
    complexity_level        INTEGER CHECK (complexity_level BETWEEN 1 AND 5),
    current_phase           TEXT NOT NULL DEFAULT 'scope',
    status                  TEXT NOT NULL DEFAULT 'in_progress',
    top_idea_ids            TEXT NOT NULL DEFAULT '[]',
    selected_idea_ids       TEXT NOT NULL DEFAULT '[]',
    selected_variation_id   TEXT,
    created_at              TEXT NOT NULL,
    completed_at            TEXT,
    updated_at              TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

-- ============================================================================
-- Ideas
-- ============================================================================

CREATE TABLE IF NOT EXISTS ideas (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    batch_number    INTEGER NOT NULL CHECK (batch_number >= 1),
    title           TEXT NOT NULL,
    description     TEXT NOT NULL,
    dna_keywords    TEXT NOT NULL DEFAULT '[]',
    score           REAL NOT NULL DEFAULT 0 CHECK (score >= 0),
    is_fallback     INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ideas_session_batch ON ideas(session_id, batch_number);

-- ============================================================================
-- Swipes (append-only; rowid keeps submission order)
-- ============================================================================

CREATE TABLE IF NOT EXISTS swipes (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    idea_id         TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    direction       TEXT NOT NULL,
    duration_ms     INTEGER NOT NULL CHECK (duration_ms >= 0),
    speed_category  TEXT NOT NULL,
    timestamp       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_swipes_session ON swipes(session_id);

-- ============================================================================
-- Mutations
-- ============================================================================

CREATE TABLE IF NOT EXISTS mutations (
    id                  TEXT PRIMARY KEY,
    session_id          TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    parent_idea_ids     TEXT NOT NULL,
    mutation_type       TEXT NOT NULL,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL,
    mutation_rationale  TEXT NOT NULL,
    dna_keywords        TEXT NOT NULL DEFAULT '[]',
    score               REAL NOT NULL DEFAULT 0 CHECK (score >= 0),
    is_fallback         INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mutations_session ON mutations(session_id);

-- ============================================================================
-- Syntheses (at most one per session)
-- ============================================================================

CREATE TABLE IF NOT EXISTS syntheses (
    id                  TEXT PRIMARY KEY,
    session_id          TEXT NOT NULL UNIQUE REFERENCES sessions(id) ON DELETE CASCADE,
    source_idea_ids     TEXT NOT NULL,
    merged_title        TEXT NOT NULL,
    merged_description  TEXT NOT NULL,
    thematic_bridge     TEXT NOT NULL,
    retained_elements   TEXT NOT NULL,
    is_fallback         INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);

-- ============================================================================
-- Feature variations
-- ============================================================================

CREATE TABLE IF NOT EXISTS feature_variations (
    id                      TEXT PRIMARY KEY,
    session_id              TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    mutation_id             TEXT NOT NULL REFERENCES mutations(id) ON DELETE CASCADE,
    variation_theme         TEXT NOT NULL,
    features                TEXT NOT NULL,
    service_integrations    TEXT NOT NULL DEFAULT '[]',
    score                   REAL NOT NULL DEFAULT 0,
    created_at              TEXT NOT NULL,
    UNIQUE (mutation_id, variation_theme)
);
CREATE INDEX IF NOT EXISTS idx_feature_variations_session ON feature_variations(session_id);
CREATE INDEX IF NOT EXISTS idx_feature_variations_mutation ON feature_variations(mutation_id);

-- ============================================================================
-- Visual assets
-- ============================================================================

CREATE TABLE IF NOT EXISTS visual_assets (
    id                  TEXT PRIMARY KEY,
    session_id          TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    blob_url            TEXT NOT NULL,
    thumbnail_url       TEXT NOT NULL,
    prompt              TEXT NOT NULL,
    style_attributes    TEXT NOT NULL,
    is_selected         INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_visual_assets_session ON visual_assets(session_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_visual_assets_one_selected
    ON visual_assets(session_id) WHERE is_selected = 1;

-- ============================================================================
-- Refinement answers
-- ============================================================================

CREATE TABLE IF NOT EXISTS refinement_answers (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role            TEXT NOT NULL,
    question_index  INTEGER NOT NULL,
    question        TEXT NOT NULL,
    answer          TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    UNIQUE (session_id, role, question_index)
);

-- ============================================================================
-- Product personalities (cross-session, keyed by user)
-- ============================================================================

CREATE TABLE IF NOT EXISTS personalities (
    user_id                 TEXT PRIMARY KEY,
    product_biases          TEXT NOT NULL DEFAULT '{}',
    technical_biases        TEXT NOT NULL DEFAULT '{}',
    disliked_patterns       TEXT NOT NULL DEFAULT '[]',
    swipe_speed_profile     TEXT NOT NULL,
    total_sessions          INTEGER NOT NULL DEFAULT 0,
    updated_at              TEXT NOT NULL
);

-- ============================================================================
-- Gallery
-- ============================================================================

CREATE TABLE IF NOT EXISTS gallery_entries (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL UNIQUE REFERENCES sessions(id) ON DELETE CASCADE,
    user_id         TEXT NOT NULL,
    title           TEXT NOT NULL,
    description     TEXT NOT NULL,
    app_type        TEXT,
    thumbnail_url   TEXT,
    tags            TEXT NOT NULL DEFAULT '[]',
    is_published    INTEGER NOT NULL DEFAULT 1,
    published_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_gallery_published ON gallery_entries(is_published, published_at);
"#;
