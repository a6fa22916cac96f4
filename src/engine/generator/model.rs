use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::db::models::Mutation;
use crate::error::AppError;

use super::super::features::{self, FeatureSetDraft};
use super::super::ideas::{self, IdeaDraft, IdeaRequest};
use super::super::mutation::{self, MutationDraft, MutationRequest};
use super::super::synthesis::{self, SynthesisDraft, SynthesisSource};
use super::super::types::{GenerationOutcome, VariationTheme};
use super::{CandidateGenerator, GenerationGateway};

/// Live generator: every operation builds a prompt, goes through the shared
/// gateway and parses the answer.
pub struct ModelCandidateGenerator {
    gateway: Arc<GenerationGateway>,
}

impl ModelCandidateGenerator {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl CandidateGenerator for ModelCandidateGenerator {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn generate_ideas(
        &self,
        request: &IdeaRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<IdeaDraft>>, AppError> {
        ideas::generate(&self.gateway, request, cancel).await
    }

    async fn generate_mutations(
        &self,
        request: &MutationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<MutationDraft>>, AppError> {
        mutation::generate(&self.gateway, request, cancel).await
    }

    async fn synthesize(
        &self,
        sources: &[SynthesisSource],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<SynthesisDraft>, AppError> {
        synthesis::generate(&self.gateway, sources, cancel).await
    }

    async fn generate_feature_set(
        &self,
        mutation: &Mutation,
        themes: &[VariationTheme],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<FeatureSetDraft>>, AppError> {
        features::generate(&self.gateway, mutation, themes, cancel).await
    }

    async fn generate_image(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, AppError> {
        self.gateway.generate_image(prompt, cancel).await
    }
}
