//! HTML preview gallery

use std::path::PathBuf;

use anyhow::Result;
use console::style;
use emaileria::config::EmaileriaConfig;
use emaileria::preview::{render_entries, write_gallery};
use emaileria::template::RenderGlobals;

use super::{compile_templates, load_table, FatalExt};
use crate::args::PreviewArgs;

/// Render the first rows into a gallery page and return its path
///
/// # Errors
///
/// Returns an error if loading, rendering or writing fails.
pub fn execute(args: &PreviewArgs, settings: &EmaileriaConfig) -> Result<PathBuf> {
    let table = load_table(&args.source)?;
    let templates = compile_templates(&args.templates)?;
    let limit = args.count.unwrap_or(settings.preview.limit);

    let entries = render_entries(&table, &templates, &RenderGlobals::capture(), limit).fatal()?;
    for entry in &entries {
        println!(
            "  #{:<4} {} {}",
            entry.line,
            style(&entry.recipient).cyan(),
            style(&entry.subject).bold()
        );
        println!("        {}", style(&entry.snippet).dim());
    }

    let dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| settings.preview.output_dir.clone());
    let index = write_gallery(&dir, &entries).fatal()?;

    println!();
    println!(
        "{} {} message(s) written to {}",
        style("✓").green().bold(),
        entries.len(),
        style(index.display()).cyan()
    );
    Ok(index)
}
