//! Contracts for the external collaborators the pipelines call out to.
//!
//! Concrete providers (hosted embedding APIs, local models) live outside this
//! crate; the pipelines only see these traits.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::ChatMessage;

/// Whether a text is being embedded for storage or as a search query. Some
/// providers encode the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Document,
    Query,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Dimension of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Embed `texts`, one vector per input in the same order. A provider that
    /// cannot serve the request returns an error or an empty list; callers
    /// treat both as upstream failure.
    async fn embed(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Produce an answer for `prompt` given the conversation so far. `None`
    /// means the provider had no answer.
    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> Result<Option<String>>;
}

/// Localized template lookup. `None` when the group or key is unknown in both
/// the active and the fallback locale.
pub trait TemplateProvider: Send + Sync {
    fn render(&self, group: &str, key: &str, vars: &HashMap<&str, String>) -> Option<String>;
}
