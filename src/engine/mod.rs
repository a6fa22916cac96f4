pub mod cache;
pub mod features;
pub mod gallery;
pub mod generator;
pub mod ideas;
pub mod json;
pub mod learning;
pub mod mutation;
pub mod phase;
pub mod pipeline;
pub mod queue;
pub mod refinement;
pub mod retry;
pub mod scoring;
pub mod store;
pub mod synthesis;
pub mod types;
pub mod visuals;

pub use generator::{resolve_generator, CandidateGenerator, MockCandidateGenerator};
pub use phase::{Phase, PhaseAction};
pub use pipeline::{BatchOutcome, IdeaPipeline, PipelineDeps};
pub use store::DurableStore;
