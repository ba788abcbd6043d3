//! Per-step notification templates
//!
//! Each step reads `reminder_msg{step}.json` from the template directory:
//!
//! ```json
//! { "template": "⏰ Nhắc bạn: {{text}}" }
//! ```
//!
//! A missing or unreadable file falls back to the bare `{{text}}` template, so
//! the reminder text is still delivered.

use super::model::Step;
use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::Deserialize;
use std::path::Path;

/// Placeholder replaced by the reminder's text
pub const TEXT_PLACEHOLDER: &str = "{{text}}";

#[derive(Debug, Deserialize)]
struct TemplateFile {
    template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    templates: [String; 3],
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::identity()
    }
}

impl TemplateSet {
    /// Every step renders the reminder text unchanged
    pub fn identity() -> Self {
        Self::with_templates(TEXT_PLACEHOLDER, TEXT_PLACEHOLDER, TEXT_PLACEHOLDER)
    }

    pub fn with_templates(first: &str, second: &str, third: &str) -> Self {
        Self {
            templates: [first.to_string(), second.to_string(), third.to_string()],
        }
    }

    /// Load all three templates from `dir`, falling back per step
    pub async fn load(dir: &Path) -> Self {
        let mut templates: [String; 3] = Default::default();
        for (slot, step) in templates
            .iter_mut()
            .zip([Step::First, Step::Second, Step::Third])
        {
            *slot = match load_template(dir, step).await {
                Ok(template) => template,
                Err(e) => {
                    warn!("Template for step {step}: {e:#}; sending raw text");
                    TEXT_PLACEHOLDER.to_string()
                }
            };
        }

        Self { templates }
    }

    pub fn render(&self, step: Step, text: &str) -> String {
        self.template(step).replace(TEXT_PLACEHOLDER, text)
    }

    pub fn template(&self, step: Step) -> &str {
        &self.templates[usize::from(step.number() - 1)]
    }
}

pub fn template_file_name(step: Step) -> String {
    format!("reminder_msg{}.json", step.number())
}

async fn load_template(dir: &Path, step: Step) -> Result<String> {
    let path = dir.join(template_file_name(step));
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: TemplateFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    file.template
        .ok_or_else(|| anyhow!("{} has no \"template\" field", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_identity_renders_raw_text() {
        let set = TemplateSet::identity();
        assert_eq!(set.render(Step::First, "đi chơi"), "đi chơi");
        assert_eq!(set.render(Step::Third, "đi chơi"), "đi chơi");
    }

    #[test]
    fn test_render_substitutes_every_placeholder() {
        let set = TemplateSet::with_templates("A {{text}}", "B {{text}} {{text}}", "C");
        assert_eq!(set.render(Step::First, "x"), "A x");
        assert_eq!(set.render(Step::Second, "x"), "B x x");
        assert_eq!(set.render(Step::Third, "x"), "C");
    }

    #[tokio::test]
    async fn test_load_falls_back_per_step() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        std::fs::write(
            dir.join("reminder_msg1.json"),
            r#"{"template": "⏰ {{text}}"}"#,
        )
        .unwrap();
        std::fs::write(dir.join("reminder_msg2.json"), "{broken").unwrap();
        // step 3 missing entirely

        let set = TemplateSet::load(dir).await;
        assert_eq!(set.render(Step::First, "đi chơi"), "⏰ đi chơi");
        assert_eq!(set.render(Step::Second, "đi chơi"), "đi chơi");
        assert_eq!(set.render(Step::Third, "đi chơi"), "đi chơi");
    }

    #[tokio::test]
    async fn test_load_picks_up_edits_between_calls() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(template_file_name(Step::Second));

        std::fs::write(&path, r#"{"template": "old {{text}}"}"#).unwrap();
        assert_eq!(TemplateSet::load(temp.path()).await.template(Step::Second), "old {{text}}");

        std::fs::write(&path, r#"{"template": "new {{text}}"}"#).unwrap();
        assert_eq!(TemplateSet::load(temp.path()).await.template(Step::Second), "new {{text}}");
    }

    #[tokio::test]
    async fn test_load_from_missing_directory_is_identity() {
        let set = TemplateSet::load(Path::new("/nonexistent/reminder/templates")).await;
        assert_eq!(set, TemplateSet::identity());
    }
}
