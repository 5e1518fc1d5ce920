//! Pre-flight validation without sending

use anyhow::Result;
use emaileria::config::EmaileriaConfig;
use emaileria::dispatch::{DispatchConfig, DispatchError, Dispatcher, NullSink, ValidationReport};
use emaileria::template::RenderGlobals;

use super::{compile_templates, load_table, FatalExt};
use crate::args::CheckArgs;
use crate::output::print_validation;

/// Validate contacts, templates and addresses on a sample of rows
///
/// # Errors
///
/// Returns an error if loading fails, a run-wide address is malformed, or
/// placeholders are unresolved.
pub fn execute(args: &CheckArgs, settings: &EmaileriaConfig) -> Result<ValidationReport> {
    let table = load_table(&args.source)?;
    let templates = compile_templates(&args.templates)?;

    let config = DispatchConfig::from_settings(args.addressing.sender.clone(), &settings.dispatch)
        .cc(&args.addressing.cc)
        .bcc(&args.addressing.bcc)
        .reply_to(&args.addressing.reply_to)
        .validation_sample(args.sample.unwrap_or(settings.dispatch.validation_sample))
        .dry_run(true)
        .build()
        .fatal()?;

    let mut dispatcher = Dispatcher::new(config, templates, RenderGlobals::capture());
    match dispatcher.validate(&table, &NullSink) {
        Ok(report) => {
            print_validation(&report);
            Ok(report)
        }
        Err(DispatchError::Validation(report)) => {
            print_validation(&report);
            Err(DispatchError::Validation(report)).fatal()
        }
        Err(e) => Err(e).fatal(),
    }
}
