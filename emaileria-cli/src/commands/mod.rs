//! CLI command implementations

pub mod check;
pub mod preview;
pub mod send;

use anyhow::Result;
use console::style;
use emaileria::contacts::{load_contacts, ContactTable};
use emaileria::template::MessageTemplates;
use emaileria::EmaileriaError;
use tracing::info;

use crate::args::{SourceArgs, TemplateArgs};

/// Surface a fatal pipeline error as (kind, detail)
pub trait FatalExt<T> {
    /// Convert the error, adding its kind as context
    ///
    /// # Errors
    ///
    /// Returns the converted error.
    fn fatal(self) -> Result<T>;
}

impl<T, E: Into<EmaileriaError>> FatalExt<T> for std::result::Result<T, E> {
    fn fatal(self) -> Result<T> {
        self.map_err(|e| {
            let error: EmaileriaError = e.into();
            let kind = error.kind();
            anyhow::Error::new(error).context(kind.label())
        })
    }
}

/// Load the contact table and apply the row window
///
/// # Errors
///
/// Returns an error if the file cannot be loaded.
pub fn load_table(source: &SourceArgs) -> Result<ContactTable> {
    let table = load_contacts(&source.file, source.sheet.as_deref()).fatal()?;
    let window = table.window(source.offset, source.limit);

    info!(
        path = %source.file.display(),
        rows = table.len(),
        selected = window.len(),
        "Contacts loaded"
    );
    println!(
        "{} {} rows from {} ({} selected)",
        style("Loaded").green().bold(),
        table.len(),
        style(source.file.display()).cyan(),
        window.len()
    );
    Ok(window)
}

/// Read and compile both templates
///
/// # Errors
///
/// Returns an error if a template is missing, unreadable or malformed.
pub fn compile_templates(templates: &TemplateArgs) -> Result<MessageTemplates> {
    templates.spec().fatal()?.compile().fatal()
}
