// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template rendering and live-reload script injection.
//!
//! The default [`SimpleRenderer`] substitutes `{{ dotted.key }}` placeholders
//! with HTML-escaped values. Other engines plug in through
//! [`TemplateRenderer`].

use serde_json::Value as JsonValue;

use super::RenderError;

/// Path of the live-reload event stream.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Turns template source plus data into HTML.
pub trait TemplateRenderer: Send + Sync {
    /// Renders `source` with `data`.
    fn render(&self, source: &str, data: &JsonValue) -> Result<String, RenderError>;
}

/// `{{ dotted.key }}` substitution with HTML escaping.
///
/// Missing keys and `null` render as nothing, strings are escaped, other
/// values are written as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleRenderer;

impl TemplateRenderer for SimpleRenderer {
    fn render(&self, source: &str, data: &JsonValue) -> Result<String, RenderError> {
        let mut out = String::with_capacity(source.len());
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(RenderError::Template(format!(
                    "unclosed '{{{{' at byte {}",
                    source.len() - rest.len() + start
                )));
            };

            let expr = after[..end].trim();
            if expr.is_empty() {
                return Err(RenderError::Template("empty '{{ }}' expression".to_string()));
            }
            if let Some(value) = lookup(data, expr) {
                write_value(&mut out, value);
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

fn lookup<'a>(data: &'a JsonValue, expr: &str) -> Option<&'a JsonValue> {
    expr.split('.').try_fold(data, |value, part| match value {
        JsonValue::Object(map) => map.get(part),
        JsonValue::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn write_value(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Null => {}
        JsonValue::String(s) => escape_html(out, s),
        JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        JsonValue::Number(n) => out.push_str(&n.to_string()),
        other => escape_html(out, &other.to_string()),
    }
}

fn escape_html(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

/// Injects the live-reload client before `</body>` (or `</html>`, or at the end).
pub fn inject_livereload_script(html: &str) -> String {
    let script = format!(
        r#"
<script>
(function() {{
    const source = new EventSource('{LIVERELOAD_PATH}');
    source.onmessage = function(event) {{
        if (event.data === 'reload') {{
            console.log('[quire] Reloading...');
            window.location.reload();
        }}
    }};
    source.onerror = function() {{
        console.log('[quire] Connection lost, retrying...');
    }};
}})();
</script>
"#
    );

    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>").or_else(|| lower.rfind("</html>")) {
        Some(pos) => {
            let mut result = html.to_string();
            result.insert_str(pos, &script);
            result
        }
        None => format!("{html}{script}"),
    }
}
