//! Template rendering: handlebars over MJML, compiled to HTML, plus a
//! plain-text alternative.

use crate::{MailError, Result, mjml, text};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

/// Template file extension.
pub const TEMPLATE_EXTENSION: &str = "mjml";

/// Output of one render: both bodies of the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub html: String,
    pub text: String,
}

/// Renders named MJML templates.
///
/// Templates are registered up front and never change afterwards, so one
/// renderer can be shared by every worker behind an `Arc`.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// Create an empty renderer. Missing variables are render errors.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        Self { handlebars }
    }

    /// Load every `*.mjml` file in a directory; the file stem is the
    /// template name.
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(MailError::Config(format!(
                "Template directory not found: {}",
                path.display()
            )));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let file = entry?.path();
            if file.is_file()
                && file.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION)
            {
                files.push(file);
            }
        }
        files.sort();

        let mut renderer = Self::new();
        for file in &files {
            let Some(name) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(file)?;
            renderer.register(name, source)?;
            debug!(template = name, "Loaded email template");
        }

        info!(
            dir = %path.display(),
            count = files.len(),
            "Email templates loaded"
        );
        Ok(renderer)
    }

    /// Register a template from a string.
    pub fn register(&mut self, name: &str, source: impl AsRef<str>) -> Result<()> {
        self.handlebars
            .register_template_string(&normalize_name(name), source)?;
        Ok(())
    }

    /// Check if a template exists.
    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(&normalize_name(name))
    }

    /// Registered template names, sorted.
    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlebars.get_templates().keys().cloned().collect();
        names.sort();
        names
    }

    /// Render a template to HTML and plain text.
    ///
    /// Output depends only on the template and the context; nothing is
    /// cached between calls.
    pub fn render(&self, name: &str, context: &Map<String, Value>) -> Result<RenderedMessage> {
        let key = normalize_name(name);
        if !self.handlebars.has_template(&key) {
            return Err(MailError::TemplateNotFound(name.to_string()));
        }

        let markup = self.handlebars.render(&key, context)?;
        let html = mjml::compile(&markup)?;
        let text = text::html_to_text(&html);

        Ok(RenderedMessage { html, text })
    }
}

/// `verify-email`, `verify-email.mjml` and `templates/verify-email.mjml` all
/// name the same template.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim();
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.strip_suffix(".mjml").unwrap_or(base).to_string()
}
