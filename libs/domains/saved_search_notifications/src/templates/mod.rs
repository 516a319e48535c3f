//! Email template rendering engine.
//!
//! Handlebars templates for the saved-search match notification and the HTML
//! layout every queued message is wrapped in before sending.

use crate::error::NotificationResult;
use crate::models::SavedSearchMatch;
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const LAYOUT: &str = "layout_html";
const MATCH_SUBJECT: &str = "match_subject";
const MATCH_MESSAGE: &str = "match_message";

/// Rendered subject and message for a match notification.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMatch {
    pub subject: String,
    pub message: String,
}

#[derive(Serialize)]
struct LayoutData<'a> {
    subject: &'a str,
    body: &'a str,
}

/// Template engine for notification emails.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    /// Create a new template engine with the built-in templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        handlebars.register_template_string(LAYOUT, LAYOUT_HTML_TEMPLATE)?;
        handlebars.register_template_string(MATCH_SUBJECT, MATCH_SUBJECT_TEMPLATE)?;
        handlebars.register_template_string(MATCH_MESSAGE, MATCH_MESSAGE_HTML_TEMPLATE)?;

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Replace the match subject and message templates.
    ///
    /// Both are rendered against a [`SavedSearchMatch`], so placeholders look
    /// like `{{saved_search.title}}` or `{{post.url}}`.
    pub fn with_match_templates(self, subject: &str, message: &str) -> NotificationResult<Self> {
        let mut handlebars = Arc::unwrap_or_clone(self.handlebars);
        handlebars.register_template_string(MATCH_SUBJECT, subject)?;
        handlebars.register_template_string(MATCH_MESSAGE, message)?;

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Replace the layout used by [`TemplateEngine::wrap_message`].
    ///
    /// The layout receives `subject` and `body`; use `{{{body}}}` to keep the
    /// message HTML unescaped.
    pub fn with_layout(self, layout: &str) -> NotificationResult<Self> {
        let mut handlebars = Arc::unwrap_or_clone(self.handlebars);
        handlebars.register_template_string(LAYOUT, layout)?;

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Render the subject and message for a match.
    pub fn render_match(&self, event: &SavedSearchMatch) -> NotificationResult<RenderedMatch> {
        debug!(
            saved_search_id = event.saved_search.id,
            post_id = event.post.id,
            "Rendering saved search match"
        );

        let subject = self.handlebars.render(MATCH_SUBJECT, event)?;
        let message = self.handlebars.render(MATCH_MESSAGE, event)?;

        Ok(RenderedMatch {
            subject: subject.trim().to_string(),
            message,
        })
    }

    /// Wrap a stored message body into a complete HTML document.
    pub fn wrap_message(&self, subject: &str, body: &str) -> NotificationResult<String> {
        let html = self
            .handlebars
            .render(LAYOUT, &LayoutData { subject, body })?;
        Ok(html)
    }
}

/// Minimal self-contained HTML envelope used when no layout can be rendered.
pub fn fallback_html(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n</head>\n\
         <body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">\n\
         {body}\n</body>\n</html>\n"
    )
}

// ============================================================================
// Built-in templates
// ============================================================================

const LAYOUT_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{{subject}}</title>
</head>
<body style="margin: 0; padding: 0; background-color: #f4f4f5; font-family: Arial, sans-serif;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0">
    <tr>
      <td align="center" style="padding: 24px;">
        <table role="presentation" width="600" cellspacing="0" cellpadding="0"
               style="background-color: #ffffff; border-radius: 8px;">
          <tr>
            <td style="padding: 32px; color: #333333; line-height: 1.6;">
              {{{body}}}
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>
"#;

const MATCH_SUBJECT_TEMPLATE: &str =
    r#"New {{post.post_type}} matching "{{{saved_search.title}}}": {{{post.title}}}"#;

const MATCH_MESSAGE_HTML_TEMPLATE: &str = r#"<p>Hi {{saved_search.user_name}},</p>
<p>A new {{post.post_type}} matches your saved search <strong>{{saved_search.title}}</strong>:</p>
<p><a href="{{post.url}}">{{post.title}}</a></p>
<p style="font-size: 12px; color: #777777;">
  You are receiving this email because you saved this search.
</p>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchedPost, SavedSearch};

    fn event() -> SavedSearchMatch {
        SavedSearchMatch {
            saved_search: SavedSearch {
                id: 3,
                user_id: 5,
                user_email: "reader@example.com".to_string(),
                user_name: "Ada".to_string(),
                title: "Lofts & studios".to_string(),
            },
            post: MatchedPost {
                id: 10,
                post_type: "places".to_string(),
                title: "Sunny loft".to_string(),
                url: "https://example.com/places/sunny-loft".to_string(),
            },
        }
    }

    #[test]
    fn test_render_match_defaults() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine.render_match(&event()).unwrap();

        assert_eq!(
            rendered.subject,
            r#"New places matching "Lofts & studios": Sunny loft"#
        );
        assert!(rendered.message.contains("Hi Ada,"));
        assert!(rendered.message.contains("Lofts &amp; studios"));
        assert!(rendered.message.contains("https://example.com/places/sunny-loft"));
    }

    #[test]
    fn test_custom_match_templates() {
        let engine = TemplateEngine::new()
            .unwrap()
            .with_match_templates("{{post.title}}", "<p>{{post.url}}</p>")
            .unwrap();
        let rendered = engine.render_match(&event()).unwrap();

        assert_eq!(rendered.subject, "Sunny loft");
        assert_eq!(rendered.message, "<p>https://example.com/places/sunny-loft</p>");
    }

    #[test]
    fn test_strict_mode_rejects_unknown_fields() {
        let engine = TemplateEngine::new()
            .unwrap()
            .with_match_templates("{{post.missing}}", "<p></p>")
            .unwrap();

        assert!(engine.render_match(&event()).is_err());
    }

    #[test]
    fn test_invalid_template_syntax_is_an_error() {
        let result = TemplateEngine::new()
            .unwrap()
            .with_match_templates("{{#if}}", "<p></p>");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrap_message_keeps_body_html() {
        let engine = TemplateEngine::new().unwrap();
        let html = engine.wrap_message("New match", "<p>Y</p>").unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>New match</title>"));
        assert!(html.contains("<p>Y</p>"));
    }

    #[test]
    fn test_fallback_html_envelope() {
        let html = fallback_html("<p>Y</p>");
        assert!(html.contains("<meta charset=\"UTF-8\">"));
        assert!(html.contains("<p>Y</p>"));
        assert!(html.trim_end().ends_with("</html>"));
    }
}
