//! Head fragment and document frame.

use sluice_core::Meta;

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Head content for the document.
#[derive(Debug, Clone, Default)]
pub struct HeadContent {
    /// Page title.
    pub title: Option<String>,
    /// Meta tags.
    pub meta: Vec<(String, String)>,
    /// Link tags (stylesheets, preloads).
    pub links: Vec<String>,
    /// Inline scripts in head.
    pub scripts: Vec<String>,
    /// CSP nonce applied to every script tag.
    pub nonce: Option<String>,
}

impl HeadContent {
    /// Create new head content with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Build head content from page metadata.
    ///
    /// The `title` key becomes the document title; every other key becomes a
    /// named meta tag.
    pub fn from_meta(meta: &Meta) -> Self {
        let mut head = Self::default();
        for (name, content) in meta {
            if name == "title" {
                head.title = Some(content.clone());
            } else {
                head.meta.push((name.clone(), content.clone()));
            }
        }
        head
    }

    /// Add a meta tag.
    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.meta.push((name.to_string(), content.to_string()));
        self
    }

    /// Add a stylesheet link.
    pub fn with_stylesheet(mut self, href: &str) -> Self {
        self.links.push(format!(
            r#"<link rel="stylesheet" href="{}">"#,
            escape_html(href)
        ));
        self
    }

    /// Preload the client bootstrap module.
    pub fn with_module_preload(mut self, src: &str) -> Self {
        self.links.push(format!(
            r#"<link rel="modulepreload" href="{}">"#,
            escape_html(src)
        ));
        self
    }

    /// Add an inline script.
    pub fn with_script(mut self, js: impl Into<String>) -> Self {
        self.scripts.push(js.into());
        self
    }

    /// Set the CSP nonce for script tags.
    pub fn with_nonce(mut self, nonce: Option<&str>) -> Self {
        self.nonce = nonce.map(str::to_string);
        self
    }

    /// Render head content to HTML.
    pub fn render(&self) -> String {
        let mut html = String::new();

        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
        }

        for (name, content) in &self.meta {
            html.push_str(&format!(
                r#"<meta name="{}" content="{}">"#,
                escape_html(name),
                escape_html(content)
            ));
            html.push('\n');
        }

        for link in &self.links {
            html.push_str(link);
            html.push('\n');
        }

        let nonce = nonce_attr(self.nonce.as_deref());
        for script in &self.scripts {
            html.push_str(&format!("<script{}>{}</script>\n", nonce, script));
        }

        html
    }
}

/// Module script tag loading the client bootstrap.
pub fn bootstrap_script(src: &str, nonce: Option<&str>) -> String {
    format!(
        r#"<script type="module" src="{}"{}></script>"#,
        escape_html(src),
        nonce_attr(nonce)
    )
}

fn nonce_attr(nonce: Option<&str>) -> String {
    nonce
        .map(|n| format!(r#" nonce="{}""#, escape_html(n)))
        .unwrap_or_default()
}

/// Document frame wrapped around the streamed application markup.
#[derive(Debug, Clone)]
pub struct DocumentShell {
    /// Document language.
    pub lang: String,
    /// HTML after `<body>` and before the application markup.
    pub body_start: String,
    /// HTML after the application markup.
    pub body_end: String,
}

impl DocumentShell {
    /// Create a shell mounting the app into `<div id="root">`.
    pub fn new() -> Self {
        Self {
            lang: "en".to_string(),
            body_start: "<div id=\"root\">".to_string(),
            body_end: "</div>".to_string(),
        }
    }

    /// Set the document language.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Render everything up to the application markup.
    pub fn render_opening(&self, head: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n{}</head>\n<body>\n{}",
            escape_html(&self.lang),
            head,
            self.body_start
        )
    }

    /// Render everything after the application markup.
    pub fn render_closing(&self) -> String {
        format!("{}\n</body>\n</html>", self.body_end)
    }
}

impl Default for DocumentShell {
    fn default() -> Self {
        Self::new()
    }
}
