//! Language model capability
//!
//! The engine only needs one thing from a model: prompt in, text out.
//! [`LanguageModel`] is that seam. Concrete transports live in [`client`].

pub mod client;
pub mod config;

use anyhow::Result;
use async_trait::async_trait;

pub use client::AnthropicClient;
pub use config::{AiClientConfig, AuthHeader};

/// Text completion capability.
///
/// Any non-success (transport failure, bad status, unreadable body) is an
/// `Err`. Callers treat it as recoverable; retries are not the engine's job.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String>;
}

/// A model that is never reachable.
///
/// Used when no credentials are configured so the pipeline still runs with
/// caller-supplied identifiers, or degrades to an empty identifier set.
#[derive(Debug, Clone, Default)]
pub struct UnavailableModel;

#[async_trait]
impl LanguageModel for UnavailableModel {
    async fn complete(&self, _prompt: &str, _max_tokens: usize, _temperature: f32) -> Result<String> {
        anyhow::bail!("no language model configured")
    }
}
