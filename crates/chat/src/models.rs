//! Model catalog: which chat models exist and which ones the user picked
//!
//! The available list comes from the upstream `/models` endpoint, filtered to
//! text models and sorted by display name. When the fetch fails the catalog
//! falls back to a fixed pair of defaults. The selected set is owned by the
//! caller's storage; the catalog only reports when it changed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::OpenAiCompatClient;

/// Model used when nothing is selected.
pub const FALLBACK_MODEL: &str = "gemma2-9b-it";

/// Substrings marking non-text models (matched case-insensitively).
const EXCLUDED_PATTERNS: &[&str] = &[
    "image",
    "vision",
    "tts",
    "audio",
    "whisper",
    "embedding",
    "dall-e",
];

/// Known families whose id glues the version onto the name (`gemma2`).
const FAMILIES: &[&str] = &["gemma", "llama", "mistral", "mixtral", "qwen"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub selected: bool,
    pub available: bool,
    pub category: String,
}

impl ModelInfo {
    fn text(id: &str, selected: bool) -> Self {
        Self {
            id: id.to_string(),
            name: display_name(id),
            selected,
            available: true,
            category: "text".to_string(),
        }
    }
}

/// Where the current available list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Upstream,
    Defaults,
}

/// Whether `id` names a text-generation model.
pub fn is_text_model(id: &str) -> bool {
    let lower = id.to_lowercase();
    !EXCLUDED_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Human-readable name for a model id.
///
/// `llama-3.3-70b-versatile` becomes `Llama 3.3 70B Versatile`,
/// `gemma2-9b-it` becomes `Gemma 2 9B IT`.
pub fn display_name(id: &str) -> String {
    let mut words = Vec::new();
    for token in id.split(['-', '_']).filter(|t| !t.is_empty()) {
        let lower = token.to_lowercase();
        if let Some(family) = FAMILIES.iter().find(|f| {
            lower.len() > f.len()
                && lower.starts_with(**f)
                && lower[f.len()..].starts_with(|c: char| c.is_ascii_digit())
        }) {
            words.push(capitalize(family));
            words.push(lower[family.len()..].to_string());
        } else if is_size_token(&lower) {
            let mut size = lower.clone();
            size.pop();
            words.push(format!("{size}B"));
        } else if lower.len() <= 2 && lower.chars().all(|c| c.is_ascii_alphabetic()) {
            words.push(lower.to_uppercase());
        } else {
            words.push(capitalize(&lower));
        }
    }
    words.join(" ")
}

/// `9b`, `70b`, `8x7b`
fn is_size_token(token: &str) -> bool {
    let Some(digits) = token.strip_suffix('b') else {
        return false;
    };
    !digits.is_empty()
        && digits.starts_with(|c: char| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == 'x' || c == '.')
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn default_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::text("gemma2-9b-it", true),
        ModelInfo::text("llama-3.3-70b-versatile", true),
    ]
}

/// Available models plus the user's selection (insertion-ordered ids).
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    available: Vec<ModelInfo>,
    selected: Vec<String>,
}

impl ModelCatalog {
    pub fn new(available: Vec<ModelInfo>, selected: Vec<String>) -> Self {
        let mut catalog = Self {
            available,
            selected: Vec::new(),
        };
        for id in selected {
            if !catalog.selected.contains(&id) {
                catalog.selected.push(id);
            }
        }
        catalog.sync_flags();
        catalog
    }

    /// Replace the available list with fetched ids.
    ///
    /// Non-text models are dropped. With an empty selection every fetched model
    /// becomes selected. Returns true if the selection changed.
    pub fn apply_fetched(&mut self, ids: Vec<String>) -> bool {
        let first_fetch = self.selected.is_empty();
        let mut models: Vec<ModelInfo> = ids
            .iter()
            .filter(|id| is_text_model(id))
            .map(|id| ModelInfo::text(id, first_fetch || self.selected.contains(id)))
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        self.available = models;

        if first_fetch && !self.available.is_empty() {
            self.selected = self.available.iter().map(|m| m.id.clone()).collect();
            return true;
        }
        false
    }

    /// Fall back to the built-in models. Returns true if the selection changed.
    pub fn use_defaults(&mut self) -> bool {
        self.available = default_models();
        if self.selected.is_empty() {
            self.selected = self.available.iter().map(|m| m.id.clone()).collect();
            return true;
        }
        self.sync_flags();
        false
    }

    /// Fetch the model list with `api_key`, falling back to defaults on error.
    ///
    /// The second element reports whether the selection changed and should
    /// be persisted.
    pub async fn refresh(&mut self, client: &OpenAiCompatClient, api_key: &str) -> (ModelSource, bool) {
        match client.fetch_models(api_key).await {
            Ok(ids) => {
                let changed = self.apply_fetched(ids);
                info!(models = self.available.len(), "loaded models from upstream");
                (ModelSource::Upstream, changed)
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch models, using defaults");
                let changed = self.use_defaults();
                (ModelSource::Defaults, changed)
            }
        }
    }

    pub fn available(&self) -> &[ModelInfo] {
        &self.available
    }

    pub fn selected_ids(&self) -> &[String] {
        &self.selected
    }

    /// Available models the user has selected, in display order.
    pub fn selected_models(&self) -> Vec<ModelInfo> {
        self.available
            .iter()
            .filter(|m| self.selected.contains(&m.id))
            .cloned()
            .collect()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    /// Model used for single-model requests.
    pub fn primary_model(&self) -> String {
        self.selected_models()
            .first()
            .map(|m| m.id.clone())
            .unwrap_or_else(|| FALLBACK_MODEL.to_string())
    }

    /// Flip selection of `id`. Returns the new selected state.
    pub fn toggle(&mut self, id: &str) -> bool {
        let now_selected = if let Some(pos) = self.selected.iter().position(|s| s == id) {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(id.to_string());
            true
        };
        debug!(model = id, selected = now_selected, "toggled model");
        self.sync_flags();
        now_selected
    }

    pub fn select_all(&mut self) {
        for model in &self.available {
            if !self.selected.contains(&model.id) {
                self.selected.push(model.id.clone());
            }
        }
        self.sync_flags();
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
        self.sync_flags();
    }

    fn sync_flags(&mut self) {
        for model in &mut self.available {
            model.selected = self.selected.contains(&model.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn filters_non_text_models_case_insensitively() {
        assert!(is_text_model("llama-3.3-70b-versatile"));
        assert!(!is_text_model("whisper-large-v3"));
        assert!(!is_text_model("llama-3.2-11b-Vision-preview"));
        assert!(!is_text_model("playai-tts"));
        assert!(!is_text_model("nomic-embedding-text"));
    }

    #[test]
    fn display_names() {
        assert_eq!(display_name("gemma2-9b-it"), "Gemma 2 9B IT");
        assert_eq!(
            display_name("llama-3.3-70b-versatile"),
            "Llama 3.3 70B Versatile"
        );
        assert_eq!(display_name("mistral-saba-24b"), "Mistral Saba 24B");
        assert_eq!(display_name("mixtral-8x7b-32768"), "Mixtral 8x7B 32768");
        assert_eq!(display_name("deepseek-r1-distill"), "Deepseek R1 Distill");
    }

    #[test]
    fn first_fetch_selects_everything_and_sorts_by_name() {
        let mut catalog = ModelCatalog::default();
        let changed = catalog.apply_fetched(ids(&[
            "llama-3.3-70b-versatile",
            "whisper-large-v3",
            "gemma2-9b-it",
        ]));
        assert!(changed);
        let names: Vec<_> = catalog.available().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Gemma 2 9B IT", "Llama 3.3 70B Versatile"]);
        assert_eq!(catalog.selected_ids().len(), 2);
        assert!(catalog.available().iter().all(|m| m.selected));
    }

    #[test]
    fn later_fetch_keeps_existing_selection() {
        let mut catalog = ModelCatalog::new(vec![], ids(&["gemma2-9b-it"]));
        let changed = catalog.apply_fetched(ids(&["gemma2-9b-it", "llama-3.3-70b-versatile"]));
        assert!(!changed);
        let selected: Vec<_> = catalog.selected_models().into_iter().map(|m| m.id).collect();
        assert_eq!(selected, vec!["gemma2-9b-it"]);
    }

    #[test]
    fn defaults_fill_empty_selection() {
        let mut catalog = ModelCatalog::default();
        assert!(catalog.use_defaults());
        assert_eq!(catalog.available().len(), 2);
        assert_eq!(catalog.primary_model(), "gemma2-9b-it");
    }

    #[test]
    fn toggle_and_bulk_selection() {
        let mut catalog = ModelCatalog::default();
        catalog.use_defaults();

        assert!(!catalog.toggle("gemma2-9b-it"));
        assert!(!catalog.is_selected("gemma2-9b-it"));
        assert_eq!(catalog.primary_model(), "llama-3.3-70b-versatile");
        assert!(catalog.toggle("gemma2-9b-it"));

        catalog.deselect_all();
        assert!(catalog.selected_models().is_empty());
        assert_eq!(catalog.primary_model(), FALLBACK_MODEL);

        catalog.select_all();
        assert_eq!(catalog.selected_models().len(), 2);
    }

    #[test]
    fn new_deduplicates_selection() {
        let catalog = ModelCatalog::new(vec![], ids(&["a", "a", "b"]));
        assert_eq!(catalog.selected_ids(), &["a".to_string(), "b".to_string()]);
    }
}
