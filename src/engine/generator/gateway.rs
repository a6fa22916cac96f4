use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;

use super::super::cache::ResponseCache;
use super::super::retry::RetryPolicy;
use super::CompletionClient;

/// The single path from the engines to the model:
/// `ResponseCache -> RetryPolicy -> CompletionClient`.
pub struct GenerationGateway {
    client: Arc<dyn CompletionClient>,
    cache: ResponseCache,
    retry: RetryPolicy,
}

impl GenerationGateway {
    pub fn new(client: Arc<dyn CompletionClient>, cache: ResponseCache, retry: RetryPolicy) -> Self {
        Self {
            client,
            cache,
            retry,
        }
    }

    /// Text completion run through `parse`. Identical (category, prompt)
    /// pairs are served from the cache without another provider call, but
    /// only output that `parse` accepts is cached. `Ok(None)` means the
    /// provider answered with nothing usable.
    pub async fn complete<T, P>(
        &self,
        category: &str,
        prompt: &str,
        cancel: &CancellationToken,
        parse: P,
    ) -> Result<Option<T>, AppError>
    where
        P: Fn(&str) -> Option<T>,
    {
        if let Some(hit) = self.cache.get(category, prompt) {
            if let Some(value) = parse(&hit) {
                return Ok(Some(value));
            }
            self.cache.invalidate(category, prompt);
        }

        let client = &self.client;
        let output = self
            .retry
            .execute(category, cancel, move |_| client.complete(category, prompt))
            .await?;
        match parse(&output) {
            Some(value) => {
                self.cache.insert(category, prompt, output);
                Ok(Some(value))
            }
            None => {
                tracing::warn!(category, output_len = output.len(), "unparsable completion, not cached");
                Ok(None)
            }
        }
    }

    /// Image generation goes through retry but is never cached.
    pub async fn generate_image(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, AppError> {
        let client = &self.client;
        self.retry
            .execute("image", cancel, move |_| client.generate_image(prompt))
            .await
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}
