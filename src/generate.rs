//! Prompt assembly and answer generation over retrieved documents.

use std::collections::HashMap;
use std::sync::Arc;

use crate::defaults;
use crate::error::{EngineError, Result};
use crate::model::{ChatMessage, ChatRole, RetrievedDocument};
use crate::providers::{GenerationProvider, TemplateProvider};

/// Everything a generation turn produces: the answer, the exact prompt it was
/// generated from, and the conversation history after the turn.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub full_prompt: String,
    pub history: Vec<ChatMessage>,
}

pub struct GenerationOrchestrator {
    generator: Arc<dyn GenerationProvider>,
    templates: Arc<dyn TemplateProvider>,
    input_max_chars: usize,
    history_limit: usize,
}

impl GenerationOrchestrator {
    pub fn new(
        generator: Arc<dyn GenerationProvider>,
        templates: Arc<dyn TemplateProvider>,
    ) -> Self {
        Self {
            generator,
            templates,
            input_max_chars: defaults::DEFAULT_INPUT_MAX_CHARS,
            history_limit: defaults::DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn from_config(
        generator: Arc<dyn GenerationProvider>,
        templates: Arc<dyn TemplateProvider>,
        config: &crate::config::AppConfig,
    ) -> Self {
        Self::new(generator, templates)
            .with_input_max_chars(config.input_max_chars)
            .with_history_limit(config.chat_history_limit)
    }

    pub fn with_input_max_chars(mut self, max_chars: usize) -> Self {
        self.input_max_chars = max_chars.max(1);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Assemble the prompt from `documents` and `question`, generate an
    /// answer, and return it with the prompt and the updated history. A
    /// provider that returns no answer is a hard failure, never an empty
    /// string passed off as success.
    pub async fn answer(
        &self,
        documents: &[RetrievedDocument],
        question: &str,
    ) -> Result<RagAnswer> {
        let system_prompt = self.render("system_prompt", &HashMap::new())?;

        let mut sections = Vec::with_capacity(documents.len());
        for (idx, document) in documents.iter().enumerate() {
            let mut vars = HashMap::new();
            vars.insert("doc_index", (idx + 1).to_string());
            vars.insert(
                "document_text",
                truncate_chars(&document.text, self.input_max_chars),
            );
            sections.push(self.render("document_prompt", &vars)?);
        }

        let mut vars = HashMap::new();
        vars.insert("query", truncate_chars(question, self.input_max_chars));
        let footer = self.render("footer_prompt", &vars)?;

        let full_prompt = [sections.join("\n\n"), footer].join("\n\n");

        let mut history = vec![ChatMessage::system(system_prompt)];
        let answer = self
            .generator
            .generate(&full_prompt, &history)
            .await
            .map_err(|err| EngineError::Upstream(format!("generation request failed: {err}")))?
            .ok_or_else(|| {
                EngineError::Upstream("generation provider returned no answer".to_string())
            })?;

        history.push(ChatMessage::user(full_prompt.clone()));
        history.push(ChatMessage::assistant(answer.clone()));
        self.bound_history(&mut history);

        tracing::debug!(
            "generated answer from {} documents ({} prompt chars)",
            documents.len(),
            full_prompt.len()
        );
        Ok(RagAnswer {
            answer,
            full_prompt,
            history,
        })
    }

    fn render(&self, key: &str, vars: &HashMap<&str, String>) -> Result<String> {
        self.templates
            .render("rag", key, vars)
            .ok_or_else(|| EngineError::Upstream(format!("template rag/{key} is missing")))
    }

    /// Drop the oldest non-system messages until the history fits the cap.
    fn bound_history(&self, history: &mut Vec<ChatMessage>) {
        while history.len() > self.history_limit {
            let Some(pos) = history.iter().position(|m| m.role != ChatRole::System) else {
                break;
            };
            history.remove(pos);
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect::<String>().trim().to_string()
}
