//! Variable substitution for title card templates.

use std::collections::HashMap;

/// The built-in title card.
///
/// Substituted variables: `{number}`, `{title}`, `{description}`, `{width}`
/// and `{height}`.
pub const DEFAULT_TITLE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
  html, body { margin: 0; padding: 0; }
  body {
    width: {width}px;
    height: {height}px;
    display: flex;
    flex-direction: column;
    justify-content: center;
    align-items: center;
    background: linear-gradient(135deg, #141e30 0%, #243b55 100%);
    color: #f5f7fa;
    font-family: "Helvetica Neue", Helvetica, Arial, sans-serif;
    overflow: hidden;
  }
  .number {
    font-size: 48px;
    letter-spacing: 0.3em;
    opacity: 0.6;
    margin-bottom: 24px;
  }
  .title {
    font-size: 96px;
    font-weight: 700;
    text-align: center;
    max-width: 80%;
    line-height: 1.1;
  }
  .description {
    font-size: 40px;
    text-align: center;
    max-width: 70%;
    margin-top: 36px;
    opacity: 0.85;
    line-height: 1.4;
  }
</style>
</head>
<body>
  <div class="number">{number}</div>
  <div class="title">{title}</div>
  <div class="description">{description}</div>
</body>
</html>
"#;

/// Variable substitution context for HTML templates.
///
/// Supports `{varname}` placeholders. Substitution is a single left-to-right
/// pass, so a value containing `{...}` is never expanded again, and braces
/// that do not name a known variable (CSS blocks) are left alone.
///
/// # Example
///
/// ```
/// use reelforge_av::TemplateContext;
///
/// let ctx = TemplateContext::new()
///     .with_var("number", "01")
///     .with_text("title", "Q&A <live>");
///
/// assert_eq!(ctx.substitute("{number}: {title}"), "01: Q&amp;A &lt;live&gt;");
/// assert_eq!(ctx.substitute("body { margin: 0 }"), "body { margin: 0 }");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty template context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables for one title card.
    pub fn title_card(number: &str, title: &str, description: &str, width: u32, height: u32) -> Self {
        Self::new()
            .with_text("number", number)
            .with_text("title", title)
            .with_text("description", description)
            .with_var("width", &width.to_string())
            .with_var("height", &height.to_string())
    }

    /// Add a variable inserted verbatim.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Add a variable whose value is HTML-escaped.
    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.set(key, &html_escape(value));
        self
    }

    /// Set a variable verbatim.
    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Get a variable value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables in a string.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => match self.vars.get(&after[..close]) {
                    Some(value) => {
                        out.push_str(value);
                        rest = &after[close + 1..];
                    }
                    None => {
                        out.push('{');
                        rest = after;
                    }
                },
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_substitutes_all_fields() {
        let ctx = TemplateContext::title_card("02", "Results", "What we found", 1280, 720);
        let html = ctx.substitute(DEFAULT_TITLE_TEMPLATE);
        assert!(html.contains("width: 1280px;"));
        assert!(html.contains("height: 720px;"));
        assert!(html.contains(r#"<div class="title">Results</div>"#));
        assert!(html.contains("What we found"));
        assert!(!html.contains("{title}"));
        // CSS blocks survive.
        assert!(html.contains("html, body { margin: 0; padding: 0; }"));
    }

    #[test]
    fn values_are_not_re_expanded() {
        let ctx = TemplateContext::new()
            .with_var("a", "{b}")
            .with_var("b", "x");
        assert_eq!(ctx.substitute("{a}{b}"), "{b}x");
    }

    #[test]
    fn unknown_and_unclosed_braces_are_literal() {
        let ctx = TemplateContext::new().with_var("t", "T");
        assert_eq!(ctx.substitute("{nope} {t} {"), "{nope} T {");
        assert_eq!(ctx.substitute("{{t}}"), "{T}");
    }

    #[test]
    fn escaping() {
        assert_eq!(
            html_escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(html_escape("line one\nline two"), "line one<br>line two");
    }
}
