//! Result message shaping: render a named template against a checker-private
//! model, or fall back to raw text. Rendering never fails the check itself —
//! a template bug must not hide the underlying probe failure (spec §4.1).

use std::collections::HashMap;

/// A set of named templates a checker may carry. Each template is a format
/// string using `{field}` placeholders resolved against a flat string model
/// supplied at render time.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: HashMap<String, String>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, template: impl Into<String>) -> &mut Self {
        self.templates.insert(name.into(), template.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Render `template_name` against `model`, or produce the fallback text
/// ourselves if no such template is configured or rendering fails.
///
/// `underlying` is the raw human-readable text the checker would have used
/// had no template been configured; it is always present in the output, per
/// spec: a template failure must never make the underlying error vanish.
pub fn render(
    templates: &TemplateSet,
    template_name: &str,
    model: &HashMap<String, String>,
    underlying: &str,
) -> String {
    let Some(template) = templates.get(template_name) else {
        return underlying.to_string();
    };

    match substitute(template, model) {
        Ok(rendered) => rendered,
        Err(reason) => format!("unable to apply template: {reason}; {underlying}"),
    }
}

fn substitute(template: &str, model: &HashMap<String, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let Some(end) = template[i..].find('}') else {
                return Err(format!("unterminated placeholder at byte {i}"));
            };
            let field = &template[i + 1..i + end];
            let Some(value) = model.get(field) else {
                return Err(format!("unknown field {field:?}"));
            };
            out.push_str(value);
            i += end + 1;
        } else {
            let ch = template[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    Ok(out)
}
