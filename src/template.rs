//! Minimal variable-substitution templates.
//!
//! Footnote labels are produced from a caller-supplied template in the
//! `{{.Variable}}` style, e.g. `"{{.BodyNumber}}.{{.NoteNumber}}"`.
//! Only plain variable substitution is supported; whitespace inside the
//! braces is tolerated. Parse and render failures are reported so the
//! labeler can fall back to its default `"b.n"` form.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated '{{{{' at byte {0}")]
    Unterminated(usize),

    #[error("expected '.' to start a variable at byte {0}")]
    MissingDot(usize),

    #[error("empty or malformed variable name at byte {0}")]
    BadName(usize),

    #[error("unknown variable {0:?}")]
    UnknownVariable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Variable(String),
}

/// A parsed label template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    /// Parse template source.
    pub fn parse(source: &str) -> Result<Template, TemplateError> {
        let mut parts = Vec::new();
        let mut rest = source;
        let mut offset = 0usize;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + open))?;
            let inner = after_open[..close].trim();
            let name = inner
                .strip_prefix('.')
                .ok_or(TemplateError::MissingDot(offset + open))?;
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(TemplateError::BadName(offset + open));
            }
            parts.push(Part::Variable(name.to_string()));
            offset += open + 2 + close + 2;
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Template { parts })
    }

    /// Substitute variables from `(name, value)` pairs.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Variable(name) => {
                    let value = vars
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| TemplateError::UnknownVariable(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Parse and render in one go.
pub fn expand(source: &str, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
    Template::parse(source)?.render(vars)
}
