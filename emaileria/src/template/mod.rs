//! Template rendering for subjects and bodies
//!
//! Templates use Jinja syntax (`{{ nome }}`, `{% if %}`, `{% for %}`) through
//! minijinja. Both templates are compiled once into [`MessageTemplates`] and
//! rendered per row against the row's cells plus [`RenderGlobals`]. Row
//! values take precedence over globals.
//!
//! Undefined values are strict: a placeholder with no value in the row or the
//! globals is reported as [`TemplateError::MissingPlaceholder`]. Names guarded
//! by `| default(..)` or `is defined` are not missing, since the template
//! renders without them. Merged values are not HTML-escaped.
//!
//! # Examples
//!
//! ```rust
//! use emaileria::contacts::{CellValue, ContactTable};
//! use emaileria::template::{RenderGlobals, TemplateSpec};
//!
//! let table = ContactTable::from_records(
//!     vec!["email".into(), "tratamento".into(), "nome".into()],
//!     vec![vec![
//!         CellValue::from_text("ana@example.com"),
//!         CellValue::from_text("Sra."),
//!         CellValue::from_text("Ana"),
//!     ]],
//! )?;
//!
//! let templates = TemplateSpec::new("Olá {{ nome }}", "<p>{{ tratamento }} {{ nome }}</p>")
//!     .compile()?;
//! let rendered = templates.render(&table.rows()[0], &RenderGlobals::capture())?;
//!
//! assert_eq!(rendered.subject, "Olá Ana");
//! assert_eq!(rendered.body, "<p>Sra. Ana</p>");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod filters;
mod globals;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, ErrorKind as JinjaErrorKind, UndefinedBehavior, Value};
use serde::Serialize;
use thiserror::Error;

pub use globals::RenderGlobals;

use crate::contacts::ContactRow;
use crate::error::ErrorKind;

/// Name of the per-row data index available to templates
pub const ROW_NUMBER: &str = "linha";

const BUILTIN_NAMES: [&str; 10] = [
    "range",
    "dict",
    "namespace",
    "debug",
    "loop",
    "self",
    "super",
    "caller",
    "varargs",
    "kwargs",
];

/// Which of the two templates a problem belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateField {
    /// Subject line
    Subject,
    /// HTML body
    Body,
}

impl TemplateField {
    /// Template name inside the environment
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for TemplateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while reading, compiling or rendering templates
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template text does not parse
    #[error("{field} template has invalid syntax: {detail}")]
    Syntax {
        /// Offending template
        field: TemplateField,
        /// Parser message, with position
        detail: String,
    },

    /// A placeholder has no value in the row or the globals
    #[error(
        "placeholder {{{{ {placeholder} }}}} in the {field} template has no value for row {line} ({recipient})"
    )]
    MissingPlaceholder {
        /// Unresolved placeholder name
        placeholder: String,
        /// Template referencing it
        field: TemplateField,
        /// 1-based data row number
        line: usize,
        /// Row's e-mail address
        recipient: String,
    },

    /// Rendering failed for another reason (bad filter argument, type error)
    #[error("failed to render the {field} template: {detail}")]
    Render {
        /// Offending template
        field: TemplateField,
        /// Engine message
        detail: String,
    },

    /// Template file could not be read as UTF-8 text
    #[error("failed to read template file {}: {source}", path.display())]
    Read {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Neither inline text nor a file was supplied
    #[error("no {0} template supplied: pass inline text or a template file")]
    NotSupplied(TemplateField),
}

impl TemplateError {
    /// Classify the failure
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } => ErrorKind::TemplateSyntax,
            Self::MissingPlaceholder { .. } => ErrorKind::MissingPlaceholder,
            Self::Render { .. } => ErrorKind::Unexpected,
            Self::Read { .. } | Self::NotSupplied(_) => ErrorKind::Config,
        }
    }
}

/// Where template text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Text given directly
    Inline(String),
    /// UTF-8 file to read
    File(PathBuf),
}

impl TemplateSource {
    /// Choose between inline text and a file; the file wins when both are set
    #[must_use]
    pub fn pick(inline: Option<String>, file: Option<PathBuf>) -> Option<Self> {
        file.map(Self::File).or_else(|| inline.map(Self::Inline))
    }

    /// Load the template text
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Read`] when the file is missing or not UTF-8.
    pub fn read(&self) -> Result<String, TemplateError> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => read_template_file(path),
        }
    }
}

fn read_template_file(path: &Path) -> Result<String, TemplateError> {
    std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Subject and body template text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSpec {
    /// Subject template
    pub subject: String,
    /// HTML body template
    pub body: String,
}

impl TemplateSpec {
    /// Spec from inline text
    #[must_use]
    pub fn new<S: Into<String>, B: Into<String>>(subject: S, body: B) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Resolve both templates from their sources
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::NotSupplied`] when a template has no source
    /// and [`TemplateError::Read`] when a file cannot be read.
    pub fn from_sources(
        subject: Option<TemplateSource>,
        body: Option<TemplateSource>,
    ) -> Result<Self, TemplateError> {
        let subject = subject
            .ok_or(TemplateError::NotSupplied(TemplateField::Subject))?
            .read()?;
        let body = body
            .ok_or(TemplateError::NotSupplied(TemplateField::Body))?
            .read()?;
        Ok(Self { subject, body })
    }

    /// Compile both templates
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Syntax`] naming the malformed template.
    pub fn compile(&self) -> Result<MessageTemplates, TemplateError> {
        MessageTemplates::compile(self)
    }
}

/// Concrete subject and body for one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    /// Subject, trimmed and on a single line
    pub subject: String,
    /// HTML body
    pub body: String,
}

/// A placeholder with no value for a given row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Unresolved {
    /// Template referencing the placeholder
    pub field: TemplateField,
    /// Placeholder name
    pub placeholder: String,
}

impl Unresolved {
    /// Attach row context, producing the reportable error
    #[must_use]
    pub fn into_error(self, row: &ContactRow) -> TemplateError {
        TemplateError::MissingPlaceholder {
            placeholder: self.placeholder,
            field: self.field,
            line: row.line(),
            recipient: row.email(),
        }
    }
}

/// Compiled subject and body templates
pub struct MessageTemplates {
    env: Environment<'static>,
    subject_names: BTreeSet<String>,
    body_names: BTreeSet<String>,
}

impl fmt::Debug for MessageTemplates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageTemplates")
            .field("subject_names", &self.subject_names)
            .field("body_names", &self.body_names)
            .finish_non_exhaustive()
    }
}

impl MessageTemplates {
    /// Compile a template pair
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Syntax`] naming the malformed template.
    pub fn compile(spec: &TemplateSpec) -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("datefmt", filters::datefmt);

        for (field, source) in [
            (TemplateField::Subject, &spec.subject),
            (TemplateField::Body, &spec.body),
        ] {
            env.add_template_owned(field.as_str(), source.clone())
                .map_err(|e| TemplateError::Syntax {
                    field,
                    detail: e.to_string(),
                })?;
        }

        let subject_names = referenced_names(&env, TemplateField::Subject)?;
        let body_names = referenced_names(&env, TemplateField::Body)?;
        tracing::debug!(
            subject = ?subject_names,
            body = ?body_names,
            "Templates compiled"
        );

        Ok(Self {
            env,
            subject_names,
            body_names,
        })
    }

    /// Every placeholder referenced by either template
    #[must_use]
    pub fn placeholders(&self) -> BTreeSet<&str> {
        self.subject_names
            .iter()
            .chain(&self.body_names)
            .map(String::as_str)
            .collect()
    }

    /// Placeholders with no value for this row
    ///
    /// A referenced name absent from the row and the globals only counts when
    /// the template fails without it; guarded uses render fine and are ignored.
    #[must_use]
    pub fn missing_placeholders(
        &self,
        row: &ContactRow,
        globals: &RenderGlobals,
    ) -> Vec<Unresolved> {
        let context = build_context(row, globals);
        [
            (TemplateField::Subject, &self.subject_names),
            (TemplateField::Body, &self.body_names),
        ]
        .into_iter()
        .flat_map(|(field, names)| self.unresolved_in(field, names, &context))
        .collect()
    }

    fn unresolved_in(
        &self,
        field: TemplateField,
        names: &BTreeSet<String>,
        context: &BTreeMap<String, Value>,
    ) -> Vec<Unresolved> {
        let absent: Vec<&String> = names
            .iter()
            .filter(|name| !context.contains_key(name.as_str()))
            .collect();

        // Try each absent name alone; the others get a blank stand-in.
        absent
            .iter()
            .filter(|name| {
                let mut trial = context.clone();
                for other in absent.iter().filter(|other| *other != *name) {
                    trial.insert((*other).clone(), Value::from(""));
                }
                matches!(
                    self.render_field(field, &trial),
                    Err(e) if e.kind() == JinjaErrorKind::UndefinedError
                )
            })
            .map(|name| Unresolved {
                field,
                placeholder: (*name).clone(),
            })
            .collect()
    }

    /// Merge one row into both templates
    ///
    /// Deterministic for a given row and globals.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingPlaceholder`] for the first placeholder
    /// without a value, or [`TemplateError::Render`] if evaluation fails.
    pub fn render(
        &self,
        row: &ContactRow,
        globals: &RenderGlobals,
    ) -> Result<RenderedMessage, TemplateError> {
        let context = build_context(row, globals);
        let render = |field: TemplateField| {
            self.render_field(field, &context).map_err(|e| {
                let render_error = TemplateError::Render {
                    field,
                    detail: e.to_string(),
                };
                if e.kind() != JinjaErrorKind::UndefinedError {
                    return render_error;
                }
                self.missing_placeholders(row, globals)
                    .into_iter()
                    .find(|unresolved| unresolved.field == field)
                    .map_or(render_error, |unresolved| unresolved.into_error(row))
            })
        };
        let subject = render(TemplateField::Subject)?;
        let body = render(TemplateField::Body)?;

        Ok(RenderedMessage {
            subject: single_line(&subject),
            body,
        })
    }

    fn render_field(
        &self,
        field: TemplateField,
        context: &BTreeMap<String, Value>,
    ) -> Result<String, minijinja::Error> {
        self.env
            .get_template(field.as_str())
            .and_then(|template| template.render(context))
    }
}

fn referenced_names(
    env: &Environment<'static>,
    field: TemplateField,
) -> Result<BTreeSet<String>, TemplateError> {
    let template = env
        .get_template(field.as_str())
        .map_err(|e| TemplateError::Syntax {
            field,
            detail: e.to_string(),
        })?;
    Ok(template
        .undeclared_variables(false)
        .into_iter()
        .filter(|name| !BUILTIN_NAMES.contains(&name.as_str()))
        .collect())
}

fn build_context(row: &ContactRow, globals: &RenderGlobals) -> BTreeMap<String, Value> {
    let mut context: BTreeMap<String, Value> = globals
        .iter()
        .map(|(name, value)| (name.to_string(), Value::from(value)))
        .collect();
    context.insert(ROW_NUMBER.to_string(), Value::from(row.line()));
    for (name, value) in row.template_values() {
        context.insert(name.to_string(), Value::from(value));
    }
    context
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{CellValue, ContactTable};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn table(extra: &[(&str, &str)]) -> ContactTable {
        let mut headers = vec!["email".to_string(), "tratamento".to_string(), "nome".to_string()];
        let mut cells = vec![
            CellValue::from_text("ana@example.com"),
            CellValue::from_text("Sra."),
            CellValue::from_text("Ana"),
        ];
        for (header, value) in extra {
            headers.push((*header).to_string());
            cells.push(CellValue::from_text(value));
        }
        ContactTable::from_records(headers, vec![cells]).unwrap()
    }

    fn globals() -> RenderGlobals {
        RenderGlobals::at(
            NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_render_row_and_globals() {
        let templates = TemplateSpec::new(
            "Olá {{ nome }} - {{ hoje }}",
            "<p>{{ tratamento }} {{ nome }}, enviado às {{ hora_envio }} (linha {{ linha }})</p>",
        )
        .compile()
        .unwrap();

        let rendered = templates.render(&table(&[]).rows()[0], &globals()).unwrap();
        assert_eq!(rendered.subject, "Olá Ana - 01/06/2025");
        assert_eq!(
            rendered.body,
            "<p>Sra. Ana, enviado às 08:30 (linha 1)</p>"
        );
    }

    #[test]
    fn test_row_values_override_globals() {
        let templates = TemplateSpec::new("{{ hoje }}", "x").compile().unwrap();
        let rendered = templates
            .render(&table(&[("hoje", "sempre")]).rows()[0], &globals())
            .unwrap();
        assert_eq!(rendered.subject, "sempre");
    }

    #[test]
    fn test_original_header_alias_resolves() {
        let templates = TemplateSpec::new("{{ Departamento }}/{{ departamento }}", "x")
            .compile()
            .unwrap();
        let rendered = templates
            .render(&table(&[("Departamento", "RH")]).rows()[0], &globals())
            .unwrap();
        assert_eq!(rendered.subject, "RH/RH");
    }

    #[test]
    fn test_values_are_not_escaped() {
        let templates = TemplateSpec::new("s", "{{ extra }}").compile().unwrap();
        let rendered = templates
            .render(&table(&[("extra", "<b>Tom & Jerry</b>")]).rows()[0], &globals())
            .unwrap();
        assert_eq!(rendered.body, "<b>Tom & Jerry</b>");
    }

    #[test]
    fn test_missing_placeholder_is_named() {
        let templates = TemplateSpec::new("Olá {{ nome }}", "<p>{{ cidade }}</p>")
            .compile()
            .unwrap();
        let table = table(&[]);
        let row = &table.rows()[0];

        let missing = templates.missing_placeholders(row, &globals());
        assert_eq!(
            missing,
            vec![Unresolved {
                field: TemplateField::Body,
                placeholder: "cidade".to_string()
            }]
        );

        let err = templates.render(row, &globals()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPlaceholder);
        match err {
            TemplateError::MissingPlaceholder {
                placeholder,
                recipient,
                line,
                ..
            } => {
                assert_eq!(placeholder, "cidade");
                assert_eq!(recipient, "ana@example.com");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_guarded_placeholders_are_not_missing() {
        let templates = TemplateSpec::new(
            "Olá {{ nome }}{% if cidade is defined %} de {{ cidade }}{% endif %}",
            "<p>{{ cidade | default('-') }}</p>",
        )
        .compile()
        .unwrap();
        let table = table(&[]);
        let row = &table.rows()[0];

        assert!(templates.missing_placeholders(row, &globals()).is_empty());
        let rendered = templates.render(row, &globals()).unwrap();
        assert_eq!(rendered.subject, "Olá Ana");
        assert_eq!(rendered.body, "<p>-</p>");
    }

    #[test]
    fn test_only_unguarded_uses_are_reported() {
        let templates = TemplateSpec::new(
            "s",
            "<p>{{ cidade | default('-') }} {{ estado }}</p>",
        )
        .compile()
        .unwrap();
        let table = table(&[]);

        let missing = templates.missing_placeholders(&table.rows()[0], &globals());
        let names: Vec<&str> = missing.iter().map(|u| u.placeholder.as_str()).collect();
        assert_eq!(names, vec!["estado"]);
    }

    #[test]
    fn test_loop_variables_are_not_placeholders() {
        let templates = TemplateSpec::new(
            "s",
            "{% for i in range(2) %}{{ i }}{{ loop.index }}{% endfor %}{% set x = nome %}{{ x }}",
        )
        .compile()
        .unwrap();
        assert_eq!(templates.placeholders(), BTreeSet::from(["nome"]));
        let rendered = templates.render(&table(&[]).rows()[0], &globals()).unwrap();
        assert_eq!(rendered.body, "0112Ana");
    }

    #[test]
    fn test_syntax_error_names_template() {
        let err = TemplateSpec::new("Olá {{ nome", "ok").compile().unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Syntax {
                field: TemplateField::Subject,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::TemplateSyntax);

        let err = TemplateSpec::new("ok", "{% if nome %}").compile().unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Syntax {
                field: TemplateField::Body,
                ..
            }
        ));
    }

    #[test]
    fn test_subject_is_single_line() {
        let templates = TemplateSpec::new("  Olá\n  {{ nome }}  ", "x").compile().unwrap();
        let rendered = templates.render(&table(&[]).rows()[0], &globals()).unwrap();
        assert_eq!(rendered.subject, "Olá Ana");
    }

    #[test]
    fn test_datefmt_filter() {
        let templates = TemplateSpec::new("{{ now | datefmt('%Y/%m') }}", "{{ aniversario | datefmt }}")
            .compile()
            .unwrap();
        let rendered = templates
            .render(&table(&[("aniversario", "1990-12-25")]).rows()[0], &globals())
            .unwrap();
        assert_eq!(rendered.subject, "2025/06");
        assert_eq!(rendered.body, "25/12/1990");
    }

    #[test]
    fn test_file_source_wins() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("corpo.html");
        std::fs::write(&path, "<p>do arquivo</p>").unwrap();

        let source = TemplateSource::pick(Some("inline".to_string()), Some(path)).unwrap();
        assert_eq!(source.read().unwrap(), "<p>do arquivo</p>");

        let spec = TemplateSpec::from_sources(
            TemplateSource::pick(Some("s".to_string()), None),
            Some(source),
        )
        .unwrap();
        assert_eq!(spec.subject, "s");
        assert_eq!(spec.body, "<p>do arquivo</p>");
    }

    #[test]
    fn test_unreadable_template_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("latin1.html");
        std::fs::write(&path, [0x4f, 0x6c, 0xe1]).unwrap();

        let result = TemplateSource::File(path).read();
        assert!(matches!(result, Err(TemplateError::Read { .. })));

        let result = TemplateSpec::from_sources(None, TemplateSource::pick(Some("b".into()), None));
        assert!(matches!(
            result,
            Err(TemplateError::NotSupplied(TemplateField::Subject))
        ));
    }

    proptest! {
        #[test]
        fn test_render_is_deterministic(
            nome in "[A-Za-zÀ-ú ]{1,20}",
            extra in "[a-z0-9<>&\" ]{0,30}",
        ) {
            let templates = TemplateSpec::new(
                "Olá {{ nome }} {{ now }}",
                "<p>{{ extra }}</p>{% if extra %}!{% endif %}",
            )
            .compile()
            .unwrap();

            let headers = vec!["email".into(), "tratamento".into(), "nome".into(), "extra".into()];
            let table = ContactTable::from_records(
                headers,
                vec![vec![
                    CellValue::from_text("a@x.com"),
                    CellValue::from_text("Sr."),
                    CellValue::from_text(&nome),
                    CellValue::from_text(&extra),
                ]],
            );
            prop_assume!(table.is_ok());
            let table = table.unwrap();
            prop_assume!(!table.is_empty());

            let globals = RenderGlobals::capture();
            let first = templates.render(&table.rows()[0], &globals).unwrap();
            let second = templates.render(&table.rows()[0], &globals).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
