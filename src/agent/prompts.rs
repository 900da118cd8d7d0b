//! Prompt template loading and rendering.
//!
//! Templates live in a directory, one file per agent, with `{placeholder}`
//! substitution. Rendering fails if a placeholder survives substitution;
//! template drift must fail loudly before a paid call goes out.

use crate::models::{QuaestioError, Result};
use std::path::PathBuf;

/// Directory of prompt templates keyed by agent name.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    dir: PathBuf,
}

impl PromptLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the template for an agent from `<dir>/<agent>.md`.
    pub fn load(&self, agent: &str) -> Result<PromptTemplate> {
        let path = self.dir.join(format!("{agent}.md"));
        let text = std::fs::read_to_string(&path)
            .map_err(|e| QuaestioError::io(format!("reading prompt template {}", path.display()), e))?;
        Ok(PromptTemplate {
            name: agent.to_string(),
            text,
        })
    }
}

/// A loaded template with named placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    text: String,
}

impl PromptTemplate {
    /// Build a template directly from text (tests, embedded defaults).
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Substitute `{key}` placeholders with the given values.
    ///
    /// Placeholders are lowercase identifiers; any that remain after
    /// substitution make rendering fail.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String> {
        let mut rendered = self.text.clone();
        for (key, value) in vars {
            rendered = rendered.replace(&format!("{{{key}}}"), value);
        }

        let leftover = regex::Regex::new(r"\{[a-z_]+\}").unwrap();
        if let Some(m) = leftover.find(&rendered) {
            return Err(QuaestioError::InvalidInput(format!(
                "prompt template '{}' has unresolved placeholder {}",
                self.name,
                m.as_str()
            )));
        }

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn render_substitutes_all_placeholders() {
        let template = PromptTemplate::from_text("t", "Generate {count} items on {theme}.");
        let rendered = template
            .render(&[("count", "50"), ("theme", "Cardiology")])
            .unwrap();
        assert_eq!(rendered, "Generate 50 items on Cardiology.");
    }

    #[test]
    fn render_fails_on_unresolved_placeholder() {
        let template = PromptTemplate::from_text("t", "Generate {count} items on {theme}.");
        let err = template.render(&[("count", "50")]).unwrap_err();
        assert!(err.to_string().contains("{theme}"));
    }

    #[test]
    fn library_loads_templates_by_agent_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("creator.md"), "Write about {subtopic}.").unwrap();

        let library = PromptLibrary::new(dir.path());
        let template = library.load("creator").unwrap();
        assert_eq!(template.name(), "creator");
        assert_eq!(
            template.render(&[("subtopic", "liver function")]).unwrap(),
            "Write about liver function."
        );
    }

    #[test]
    fn library_reports_missing_template() {
        let dir = TempDir::new().unwrap();
        let library = PromptLibrary::new(dir.path());
        assert!(library.load("nonexistent").is_err());
    }
}
