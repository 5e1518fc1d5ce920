//! emaileria: templated bulk e-mail dispatch from spreadsheet contact lists
//!
//! The pipeline runs leaf-first:
//! - [`contacts`]: load a spreadsheet or delimited file into a [`ContactTable`]
//! - [`template`]: compile subject and body once, render each row
//! - [`email`]: build transport messages and deliver them through an [`EmailSender`]
//! - [`dispatch`]: the rate-limited, cancellable send loop
//!
//! Around it sit [`config`] (layered settings), [`preview`] (HTML gallery),
//! [`observability`] (logging) and [`testing`] (an in-memory transport).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use emaileria::prelude::*;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = EmaileriaConfig::load(None)?;
//!     let table = load_contacts(Path::new("contatos.xlsx"), None)?;
//!     let templates = TemplateSpec::new("Olá {{ nome }}", "<p>{{ tratamento }} {{ nome }}</p>").compile()?;
//!
//!     let config = DispatchConfig::from_settings("Equipe <me@example.com>", &settings.dispatch)
//!         .dry_run(true)
//!         .build()?;
//!     let mut dispatcher = Dispatcher::new(config, templates, RenderGlobals::capture());
//!
//!     dispatcher.validate(&table, &TracingSink)?;
//!     let summary = dispatcher
//!         .run(&table, None, &TracingSink, &CancellationToken::new())
//!         .await?;
//!     println!("{} of {} would be sent", summary.succeeded, summary.total);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod contacts;
pub mod dispatch;
pub mod email;
pub mod error;
pub mod observability;
pub mod preview;
pub mod template;
pub mod testing;

pub use contacts::{load_contacts, ContactRow, ContactTable};
pub use dispatch::{DispatchConfig, DispatchSummary, Dispatcher};
pub use email::{EmailError, EmailSender};
pub use error::{EmaileriaError, ErrorKind, Result};

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! ```rust
    //! use emaileria::prelude::*;
    //! ```

    pub use crate::config::{EmaileriaConfig, SmtpSecurity};
    pub use crate::contacts::{load_contacts, CellValue, ContactRow, ContactTable, LoadError};
    pub use crate::dispatch::{
        CancellationToken, CsvAuditLog, DispatchConfig, DispatchError, DispatchEvent,
        DispatchResult, DispatchStatus, DispatchSummary, Dispatcher, EventSink, RetryPolicy,
        RunState, TracingSink,
    };
    pub use crate::email::{
        ConsoleBackend, Email, EmailError, EmailSender, SmtpBackend, SmtpCredentials,
        TransportMessage,
    };
    pub use crate::error::{EmaileriaError, ErrorKind};
    pub use crate::template::{MessageTemplates, RenderGlobals, TemplateSource, TemplateSpec};
}
