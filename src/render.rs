//! Name templates for generated artifacts.

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::PolicyError;

const TEMPLATE_NAME: &str = "artifact-name";

pub const DEFAULT_NAME_TEMPLATE: &str = "{{name}}-gatus-generated";

/// Variables available to a name template.
#[derive(Debug, Serialize)]
pub struct NameVars<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
}

/// A compiled artifact-name template.
///
/// Strict mode is on: a template referencing an unknown variable fails at
/// render time instead of producing an empty segment.
pub struct NameTemplate {
    registry: Handlebars<'static>,
    source: String,
}

impl NameTemplate {
    pub fn compile(source: &str) -> Result<Self, PolicyError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, source)
            .map_err(|e| PolicyError::Config(format!("invalid name template '{source}': {e}")))?;
        Ok(Self {
            registry,
            source: source.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, vars: &NameVars<'_>) -> Result<String, PolicyError> {
        let rendered = self
            .registry
            .render(TEMPLATE_NAME, vars)
            .map_err(|e| PolicyError::Render {
                name: vars.name.to_string(),
                message: e.to_string(),
            })?;
        let rendered = rendered.trim().to_string();
        if rendered.is_empty() {
            return Err(PolicyError::Render {
                name: vars.name.to_string(),
                message: format!("template '{}' rendered an empty name", self.source),
            });
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_appends_suffix() {
        let template = NameTemplate::compile(DEFAULT_NAME_TEMPLATE).unwrap();
        let name = template
            .render(&NameVars {
                name: "web",
                namespace: "apps",
            })
            .unwrap();
        assert_eq!(name, "web-gatus-generated");
    }

    #[test]
    fn namespace_is_available() {
        let template = NameTemplate::compile("{{namespace}}-{{name}}-status").unwrap();
        let name = template
            .render(&NameVars {
                name: "web",
                namespace: "apps",
            })
            .unwrap();
        assert_eq!(name, "apps-web-status");
    }

    #[test]
    fn malformed_template_is_config_error() {
        let err = NameTemplate::compile("{{#if name}}oops").err().unwrap();
        assert!(matches!(err, PolicyError::Config(_)));
    }

    #[test]
    fn unknown_variable_is_render_error() {
        let template = NameTemplate::compile("{{owner}}-gatus").unwrap();
        let err = template
            .render(&NameVars {
                name: "web",
                namespace: "apps",
            })
            .unwrap_err();
        assert!(matches!(err, PolicyError::Render { .. }));
    }
}
