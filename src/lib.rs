//! Idea evolution pipeline: turns a vague app idea into scored, mutated,
//! synthesized and refined product concepts.

pub mod blobs;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod validation;

use std::sync::Arc;

use crate::blobs::LocalBlobStore;
use crate::clock::{Clock, SystemClock};
use crate::config::ForgeConfig;
use crate::db::SqliteStore;
use crate::engine::{IdeaPipeline, PipelineDeps};
use crate::error::AppError;

/// Wire a pipeline from configuration: SQLite store, local blob store,
/// system clock and the configured generator.
pub fn build_pipeline(config: &ForgeConfig) -> Result<IdeaPipeline, AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pool = db::init_db(&config.database)?;
    let store = Arc::new(SqliteStore::new(pool));
    let generator = engine::resolve_generator(config, clock.clone())?;
    let blobs = Arc::new(LocalBlobStore::new(config.blobs.root.clone()));

    Ok(IdeaPipeline::new(PipelineDeps::from_config(
        config, store, generator, blobs, clock,
    )))
}
