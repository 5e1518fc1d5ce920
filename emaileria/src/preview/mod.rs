//! HTML preview gallery of rendered messages
//!
//! Renders the first rows of a table and writes a standalone page where each
//! message sits in a sandboxed iframe. Subjects and recipients are escaped by
//! the gallery template; message bodies have `<script>` blocks and inline
//! `on*=` handlers stripped before they are embedded.

use std::path::{Path, PathBuf};

use chrono::Local;
use minijinja::{context, Environment};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::contacts::ContactTable;
use crate::error::ErrorKind;
use crate::template::{MessageTemplates, RenderGlobals, TemplateError};

/// Length of terminal snippets, in characters
pub const SNIPPET_CHARS: usize = 200;

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?>.*?</script\s*>").expect("valid regex"));
static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const GALLERY_TEMPLATE: &str = r#"<!doctype html>
<html lang="pt-br">
<head>
  <meta charset="utf-8">
  <title>Emaileria - Prévia</title>
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <style>
    :root { --bg:#f6f7fb; --fg:#0f172a; --muted:#475569; --card:#fff; --line:#e2e8f0; }
    body { margin:0; background:var(--bg); color:var(--fg); font:16px/1.4 system-ui, sans-serif; }
    header { padding:16px 24px; background:#fff; border-bottom:1px solid var(--line); position:sticky; top:0; }
    header h1 { margin:0; font-size:18px; }
    .wrap { max-width:1080px; margin:24px auto; padding:0 24px; }
    .grid { display:grid; grid-template-columns:1fr; gap:16px; }
    .card { background:var(--card); border:1px solid var(--line); border-radius:12px; padding:12px; }
    .card .meta { display:flex; justify-content:space-between; gap:12px; margin:4px 4px 10px; color:var(--muted); }
    .card .meta .subject { color:var(--fg); font-weight:600; }
    .card iframe { width:100%; max-width:600px; height:520px; border:1px solid var(--line); border-radius:8px; display:block; background:#fff; margin:8px auto; }
  </style>
</head>
<body>
  <header><h1>Prévia: {{ entries|length }} mensagem(ns)</h1></header>
  <main class="wrap">
    <div class="grid">
    {%- for entry in entries %}
      <section class="card">
        <div class="meta">
          <div><strong>#{{ entry.line }}</strong> {{ entry.recipient }}</div>
          <div class="subject">{{ entry.subject }}</div>
        </div>
        <iframe sandbox="" srcdoc="{{ entry.body }}"></iframe>
      </section>
    {%- endfor %}
    </div>
  </main>
</body>
</html>
"#;

/// Errors raised while building a preview
#[derive(Debug, Error)]
pub enum PreviewError {
    /// The requested number of previews is zero
    #[error("preview limit must be greater than zero")]
    InvalidLimit,

    /// A row could not be rendered
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The gallery could not be written
    #[error("failed to write preview to {path}: {source}")]
    Io {
        /// Target path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The gallery page failed to render
    #[error("failed to render preview page: {0}")]
    Render(#[from] minijinja::Error),
}

impl PreviewError {
    /// Classify the failure
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLimit => ErrorKind::Config,
            Self::Template(e) => e.kind(),
            Self::Io { .. } | Self::Render(_) => ErrorKind::Unexpected,
        }
    }
}

/// One rendered message ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEntry {
    /// 1-based data row number
    pub line: usize,
    /// Recipient address as written in the table
    pub recipient: String,
    /// Rendered subject
    pub subject: String,
    /// Rendered body with scripts and inline handlers removed
    pub body: String,
    /// Plain-text excerpt of the body
    pub snippet: String,
}

/// Render the first `limit` rows of `table`
///
/// Rows with blank required values are skipped and do not count toward the
/// limit.
///
/// # Errors
///
/// Returns [`PreviewError::InvalidLimit`] for a zero limit and
/// [`PreviewError::Template`] for the first row that cannot be rendered.
pub fn render_entries(
    table: &ContactTable,
    templates: &MessageTemplates,
    globals: &RenderGlobals,
    limit: usize,
) -> Result<Vec<PreviewEntry>, PreviewError> {
    if limit == 0 {
        return Err(PreviewError::InvalidLimit);
    }

    table
        .iter()
        .filter(|row| row.missing_required().is_empty())
        .take(limit)
        .map(|row| {
            let rendered = templates.render(row, globals)?;
            Ok(PreviewEntry {
                line: row.line(),
                recipient: row.email(),
                snippet: snippet(&rendered.body, SNIPPET_CHARS),
                body: sanitize(&rendered.body),
                subject: rendered.subject,
            })
        })
        .collect()
}

/// Strip `<script>` blocks and inline `on*=` event handlers
#[must_use]
pub fn sanitize(html: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(html, "");
    EVENT_HANDLER.replace_all(&without_scripts, "").into_owned()
}

/// Plain-text excerpt of an HTML body
///
/// Tags become spaces, runs of whitespace collapse to one, and text longer
/// than `max_chars` is cut and suffixed with `...`.
///
/// ```rust
/// use emaileria::preview::snippet;
///
/// assert_eq!(snippet("<p>Olá\n  <b>Ana</b></p>", 200), "Olá Ana");
/// assert_eq!(snippet("<p>abcdef</p>", 3), "abc...");
/// ```
#[must_use]
pub fn snippet(html: &str, max_chars: usize) -> String {
    let text = TAG.replace_all(&SCRIPT_BLOCK.replace_all(html, " "), " ").into_owned();
    let text = WHITESPACE.replace_all(text.trim(), " ");
    if text.chars().count() <= max_chars {
        return text.into_owned();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Render the gallery page for `entries`
///
/// # Errors
///
/// Returns [`PreviewError::Render`] if the page template fails.
pub fn render_gallery(entries: &[PreviewEntry]) -> Result<String, PreviewError> {
    let mut env = Environment::new();
    env.add_template("gallery.html", GALLERY_TEMPLATE)?;
    let page = env
        .get_template("gallery.html")?
        .render(context! { entries => entries })?;
    Ok(page)
}

/// Write the gallery to `<dir>/<YYYYMMDD-HHMMSS>/index.html`
///
/// Returns the path of the written page.
///
/// # Errors
///
/// Returns [`PreviewError::Io`] if the directory or file cannot be written.
pub fn write_gallery(dir: &Path, entries: &[PreviewEntry]) -> Result<PathBuf, PreviewError> {
    let page = render_gallery(entries)?;
    let out_dir = dir.join(Local::now().format("%Y%m%d-%H%M%S").to_string());
    std::fs::create_dir_all(&out_dir).map_err(|source| PreviewError::Io {
        path: out_dir.clone(),
        source,
    })?;

    let index = out_dir.join("index.html");
    std::fs::write(&index, page).map_err(|source| PreviewError::Io {
        path: index.clone(),
        source,
    })?;

    info!(path = %index.display(), entries = entries.len(), "Preview written");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::CellValue;
    use crate::template::TemplateSpec;
    use tempfile::TempDir;

    fn table() -> ContactTable {
        ContactTable::from_records(
            vec!["email".into(), "tratamento".into(), "nome".into()],
            vec![
                vec![
                    CellValue::from_text("joao@example.com"),
                    CellValue::from_text("Sr."),
                    CellValue::from_text("João"),
                ],
                vec![
                    CellValue::from_text("x@example.com"),
                    CellValue::from_text(""),
                    CellValue::from_text("Sem tratamento"),
                ],
                vec![
                    CellValue::from_text("maria@example.com"),
                    CellValue::from_text("Sra."),
                    CellValue::from_text("Maria <3"),
                ],
            ],
        )
        .unwrap()
    }

    fn templates() -> MessageTemplates {
        TemplateSpec::new(
            "Olá {{ tratamento }} {{ nome }}",
            "<p onclick=\"steal()\">Caro {{ nome }}</p><script>alert(1)</script>",
        )
        .compile()
        .unwrap()
    }

    #[test]
    fn test_render_entries_skips_incomplete_rows() {
        let entries = render_entries(&table(), &templates(), &RenderGlobals::capture(), 5).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].subject, "Olá Sr. João");
        assert_eq!(entries[1].line, 3);
        assert!(!entries[0].body.contains("script"));
        assert!(!entries[0].body.contains("onclick"));
        assert_eq!(entries[0].snippet, "Caro João");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let result = render_entries(&table(), &templates(), &RenderGlobals::capture(), 0);
        assert!(matches!(result, Err(PreviewError::InvalidLimit)));
    }

    #[test]
    fn test_sanitize_handles_quote_styles() {
        let html = r#"<img src="a.png" onerror='x()' onload=y()><SCRIPT type="text/javascript">
            evil()
        </SCRIPT><p>ok</p>"#;
        assert_eq!(sanitize(html), r#"<img src="a.png"><p>ok</p>"#);
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let body = format!("<p>{}</p>", "é".repeat(250));
        let text = snippet(&body, SNIPPET_CHARS);
        assert_eq!(text.chars().count(), SNIPPET_CHARS + 3);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_gallery_escapes_metadata() {
        let entries = render_entries(&table(), &templates(), &RenderGlobals::capture(), 5).unwrap();
        let page = render_gallery(&entries).unwrap();

        assert!(page.contains("Maria &lt;3"));
        assert!(!page.contains("Maria <3"));
        assert!(page.contains("sandbox=\"\""));
        assert!(page.contains("2 mensagem(ns)"));
    }

    #[test]
    fn test_write_gallery() {
        let dir = TempDir::new().unwrap();
        let entries = render_entries(&table(), &templates(), &RenderGlobals::capture(), 1).unwrap();

        let index = write_gallery(dir.path(), &entries).unwrap();

        assert!(index.starts_with(dir.path()));
        assert_eq!(index.file_name().unwrap(), "index.html");
        let page = std::fs::read_to_string(index).unwrap();
        assert!(page.contains("Olá Sr. João"));
        assert!(!page.contains("Maria"));
    }
}
