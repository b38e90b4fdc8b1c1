//! Environment-driven configuration with code defaults.

use crate::defaults;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend kind string, resolved by the store factory.
    pub vector_db_backend: String,
    /// Root directory for the self-managed backend's collection files.
    pub vector_db_path: String,
    /// Metric string, resolved when the store or a collection is created.
    pub vector_db_distance_method: String,
    pub index_batch_size: usize,
    pub retrieval_limit: usize,
    pub templates_dir: String,
    pub primary_lang: String,
    pub default_lang: String,
    /// Character budget applied to text before it enters a prompt template.
    pub input_max_chars: usize,
    pub chat_history_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            vector_db_backend: env_or("VECTOR_DB_BACKEND", "flat"),
            vector_db_path: env_or("VECTOR_DB_PATH", "data/vector_db"),
            vector_db_distance_method: env_or("VECTOR_DB_DISTANCE_METHOD", defaults::DEFAULT_METRIC),
            index_batch_size: env_num("INDEX_BATCH_SIZE", defaults::DEFAULT_BATCH_SIZE),
            retrieval_limit: env_num("RETRIEVAL_LIMIT", defaults::DEFAULT_TOP_K),
            templates_dir: env_or("TEMPLATES_DIR", "locales"),
            primary_lang: env_or("PRIMARY_LANG", "en"),
            default_lang: env_or("DEFAULT_LANG", "en"),
            input_max_chars: env_num("INPUT_MAX_CHARS", defaults::DEFAULT_INPUT_MAX_CHARS),
            chat_history_limit: env_num("CHAT_HISTORY_LIMIT", defaults::DEFAULT_HISTORY_LIMIT),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn env_num(key: &str, fallback: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("invalid {}={:?}, using {}", key, raw, fallback);
                fallback
            }
        },
        Err(_) => fallback,
    }
}
