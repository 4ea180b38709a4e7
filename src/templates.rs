//! Runtime template rendering for webhook URLs, headers, and bodies.
//!
//! Templates are Jinja-style and rendered against the event context
//! (`event`, `timestamp`, `model`, `username`, `request_id`, `data`,
//! and `snapshots` when present). Undefined references are strict
//! errors: a template that refers to a missing field fails with
//! [`EventError::Template`] so the task transport knows not to retry.

use minijinja::{Environment, UndefinedBehavior};

use crate::error::{EventError, Result};
use crate::types::Document;

/// Renders webhook templates against an event context.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render one template string. Used independently for the payload
    /// URL, each header block, and the request body.
    pub fn render(&self, template: &str, context: &Document) -> Result<String> {
        self.env.render_str(template, context).map_err(EventError::from)
    }

    /// Render an `additional_headers` block and split it into header
    /// pairs. Each non-empty line must be `Name: value`.
    pub fn render_headers(
        &self,
        template: &str,
        context: &Document,
    ) -> Result<Vec<(String, String)>> {
        let rendered = self.render(template, context)?;

        let mut headers = Vec::new();
        for line in rendered.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(EventError::template(format!(
                    "malformed header line {line:?}: expected 'Name: value'"
                )));
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
        Ok(headers)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}
