use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::TemplateError;

/// An SVG template with literal `{{ token }}` placeholders.
pub struct Template {
    name: String,
    text: String,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        Ok(Self::new(path.display().to_string(), text))
    }

    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Substitute every `(token, value)` pair, failing on a token the template lacks.
    ///
    /// All tokens are checked against the template before anything is replaced,
    /// and substitution is a single pass, so values are never rescanned.
    pub fn render(&self, values: &[(&str, String)]) -> Result<String, TemplateError> {
        let placeholders: Vec<(String, &str)> = values
            .iter()
            .map(|(token, value)| (format!("{{{{ {token} }}}}"), value.as_str()))
            .collect();

        for ((placeholder, _), (token, _)) in placeholders.iter().zip(values) {
            if !self.text.contains(placeholder.as_str()) {
                return Err(TemplateError::MissingPlaceholder {
                    template: self.name.clone(),
                    token: token.to_string(),
                });
            }
        }

        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(start) = rest.find("{{ ") {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match placeholders
                .iter()
                .find(|(placeholder, _)| tail.starts_with(placeholder.as_str()))
            {
                Some((placeholder, value)) => {
                    out.push_str(value);
                    rest = &tail[placeholder.len()..];
                }
                None => {
                    out.push_str("{{ ");
                    rest = &tail[3..];
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_all_tokens() {
        let t = Template::new("t", "<text>{{ name }} has {{ stars }}</text>");
        let out = t
            .render(&[("name", "Octo".into()), ("stars", "1,024".into())])
            .unwrap();
        assert_eq!(out, "<text>Octo has 1,024</text>");
    }

    #[test]
    fn missing_token_is_an_error() {
        let t = Template::new("overview.svg", "{{ name }}");
        let err = t.render(&[("forks", "3".into())]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingPlaceholder {
                template: "overview.svg".into(),
                token: "forks".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "template 'overview.svg' has no '{{ forks }}' placeholder"
        );
    }

    #[test]
    fn values_are_not_rescanned() {
        let t = Template::new("t", "{{ name }}/{{ stars }}");
        let out = t
            .render(&[("name", "{{ stars }}".into()), ("stars", "5".into())])
            .unwrap();
        assert_eq!(out, "{{ stars }}/5");
    }

    #[test]
    fn token_supplied_only_by_a_value_is_still_missing() {
        let t = Template::new("t", "{{ name }}");
        let err = t
            .render(&[("name", "{{ stars }}".into()), ("stars", "5".into())])
            .unwrap_err();
        assert!(matches!(err, TemplateError::MissingPlaceholder { token, .. } if token == "stars"));
    }

    #[test]
    fn unknown_placeholders_and_repeats() {
        let t = Template::new("t", "{{ a }} {{ other }} {{ a }}");
        assert_eq!(t.render(&[("a", "x".into())]).unwrap(), "x {{ other }} x");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_xml("A&B <\"x\">"), "A&amp;B &lt;&quot;x&quot;&gt;");
    }
}
