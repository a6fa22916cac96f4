use std::path::PathBuf;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use ideaforge::config::ForgeConfig;
use ideaforge::db::models::GalleryQuery;
use ideaforge::engine::types::{MutationType, SwipeDirection};
use ideaforge::engine::IdeaPipeline;
use ideaforge::error::AppError;

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match ForgeConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = ideaforge::logging::init(&config.logging);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    match run(&config, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = e.kind().as_str(), error = %e, "pipeline run failed");
            ExitCode::FAILURE
        }
    }
}

/// Walk one session through every phase and print the resulting gallery page.
async fn run(config: &ForgeConfig, cancel: &CancellationToken) -> Result<(), AppError> {
    let pipeline: IdeaPipeline = ideaforge::build_pipeline(config)?;

    let session = pipeline.create_session("local-user")?;
    let sid = session.id.as_str();
    pipeline.configure_scope(sid, "habit tracking", 2)?;

    let batch = pipeline.generate_ideas(sid, cancel).await?;
    for (i, idea) in batch.ideas.iter().enumerate() {
        let direction = match i % 3 {
            0 => SwipeDirection::Right,
            1 => SwipeDirection::Left,
            _ => SwipeDirection::Up,
        };
        pipeline.record_swipe(sid, &idea.id, "local-user", direction, 800 + 400 * i as i64)?;
    }

    let top = pipeline.get_top_ideas(sid)?;
    let picks: Vec<String> = top.ideas.iter().take(3).map(|r| r.idea.id.clone()).collect();
    pipeline.select_ideas(sid, &picks)?;

    let mutations = pipeline
        .generate_mutations(sid, &[MutationType::Crossover, MutationType::Repurposing], cancel)
        .await?;
    let mutation_ids: Vec<String> = mutations.items.iter().take(2).map(|m| m.id.clone()).collect();

    let variations = pipeline.expand_features(sid, &mutation_ids, 3, cancel).await?;
    for (i, v) in variations.items.iter().enumerate() {
        pipeline.rate_variation(&v.id, 5 - (i as i64 % 5))?;
    }
    let best = pipeline
        .list_proto_app_candidates(sid)?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("no feature variations".into()))?;
    pipeline.select_proto_app(sid, &best.id)?;

    while let Some(question) = pipeline.next_refinement_question(sid)? {
        let answer = format!("Placeholder answer to: {}", question.question);
        let progress = pipeline.submit_refinement_answer(sid, &answer)?;
        if progress.next_question.is_none() {
            break;
        }
    }

    let visuals = pipeline.generate_visuals(sid, 2, None, cancel).await?;
    if let Some(asset) = visuals.assets.first() {
        pipeline.select_visual(sid, &asset.id)?;
    }
    pipeline.mark_completed(sid)?;
    pipeline.update_personality(sid)?;
    pipeline.publish(sid)?;

    let page = pipeline.browse(&GalleryQuery::default())?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
