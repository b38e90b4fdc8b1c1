//! Locale-aware prompt templates.
//!
//! Templates live under `<root>/<lang>/<group>.json`, each file a flat map of
//! key to template string. Placeholders use the `$name` form; unknown
//! placeholders are left verbatim so a missing variable degrades the prompt
//! instead of aborting the request.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::providers::TemplateProvider;

static VAR_PATTERN: OnceLock<Regex> = OnceLock::new();

fn var_pattern() -> &'static Regex {
    VAR_PATTERN.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

pub struct TemplateCatalog {
    root: PathBuf,
    language: String,
    default_language: String,
}

impl TemplateCatalog {
    /// Builds a catalog rooted at `root`. Falls back to `default_language`
    /// immediately when the requested language has no locale directory.
    pub fn new(root: impl Into<PathBuf>, language: &str, default_language: &str) -> Self {
        let root = root.into();
        let language = if !language.is_empty() && root.join(language).is_dir() {
            language.to_string()
        } else {
            tracing::warn!(
                "locale '{}' not found under {}, using '{}'",
                language,
                root.display(),
                default_language
            );
            default_language.to_string()
        };
        Self {
            root,
            language,
            default_language: default_language.to_string(),
        }
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self::new(
            config.templates_dir.clone(),
            &config.primary_lang,
            &config.default_lang,
        )
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn group_path(&self, language: &str, group: &str) -> PathBuf {
        self.root.join(language).join(format!("{group}.json"))
    }

    fn load_group(&self, group: &str) -> Option<HashMap<String, String>> {
        let mut path = self.group_path(&self.language, group);
        if !path.is_file() {
            path = self.group_path(&self.default_language, group);
        }
        read_group(&path)
    }
}

fn read_group(path: &Path) -> Option<HashMap<String, String>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return None,
    };
    match serde_json::from_str(&raw) {
        Ok(map) => Some(map),
        Err(err) => {
            tracing::error!("malformed template file {}: {}", path.display(), err);
            None
        }
    }
}

fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    var_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

impl TemplateProvider for TemplateCatalog {
    fn render(&self, group: &str, key: &str, vars: &HashMap<&str, String>) -> Option<String> {
        let templates = self.load_group(group)?;
        templates.get(key).map(|t| substitute(t, vars))
    }
}
