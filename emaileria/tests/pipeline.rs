//! Integration tests for the dispatch pipeline
//!
//! Loader, renderer, builder and dispatcher wired together, with an
//! in-memory transport and paused time for interval assertions.

use std::time::Duration;

use async_trait::async_trait;
use emaileria::contacts::{load_contacts, CellValue, ContactTable, LoadError};
use emaileria::dispatch::{
    CancellationToken, ChannelSink, DispatchConfig, DispatchError, DispatchEvent, DispatchStatus,
    Dispatcher, NullSink, RetryPolicy, RunState,
};
use emaileria::email::{EmailError, EmailSender, SendReceipt, TransportMessage};
use emaileria::template::{RenderGlobals, TemplateSpec};
use emaileria::testing::RecordingSender;
use emaileria::ErrorKind;
use proptest::prelude::*;
use tempfile::TempDir;

mockall::mock! {
    pub Transport {}

    #[async_trait]
    impl EmailSender for Transport {
        async fn send(&self, message: &TransportMessage) -> Result<SendReceipt, EmailError>;
        async fn close(&self) -> Result<(), EmailError>;
    }
}

/// Build a table with the required columns from (email, tratamento, nome)
fn contacts(rows: &[(&str, &str, &str)]) -> ContactTable {
    ContactTable::from_records(
        vec!["Email".into(), "Tratamento".into(), "Nome".into()],
        rows.iter()
            .map(|(email, tratamento, nome)| {
                vec![
                    CellValue::from_text(email),
                    CellValue::from_text(tratamento),
                    CellValue::from_text(nome),
                ]
            })
            .collect(),
    )
    .unwrap()
}

fn numbered(count: usize) -> ContactTable {
    let rows: Vec<(String, String)> = (1..=count)
        .map(|i| (format!("user{i}@example.com"), format!("Pessoa {i}")))
        .collect();
    let borrowed: Vec<(&str, &str, &str)> = rows
        .iter()
        .map(|(email, nome)| (email.as_str(), "Sr.", nome.as_str()))
        .collect();
    contacts(&borrowed)
}

fn dispatcher(config: DispatchConfig, subject: &str, body: &str) -> Dispatcher {
    let templates = TemplateSpec::new(subject, body).compile().unwrap();
    Dispatcher::new(config, templates, RenderGlobals::capture())
}

fn live(interval_seconds: f64) -> DispatchConfig {
    DispatchConfig::builder("Equipe <noreply@example.com>")
        .interval_seconds(interval_seconds)
        .retry(RetryPolicy::never())
        .build()
        .unwrap()
}

#[test]
fn test_load_fails_without_required_columns() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("contatos.csv");
    std::fs::write(&path, "EMAIL;Nome;Cidade\na@x.com;Ana;Recife\n").unwrap();

    let err = load_contacts(&path, None).unwrap_err();
    assert!(matches!(err, LoadError::MissingColumns(columns) if columns == vec!["tratamento"]));
}

proptest! {
    #[test]
    fn prop_missing_any_required_column_fails(
        keep in proptest::sample::subsequence(vec!["email", "tratamento", "nome"], 0..3),
        upper in any::<bool>(),
    ) {
        let mut headers: Vec<String> = keep
            .iter()
            .map(|name| if upper { name.to_uppercase() } else { (*name).to_string() })
            .collect();
        headers.push("cidade".to_string());
        let record = vec![CellValue::from_text("x"); headers.len()];

        let result = ContactTable::from_records(headers, vec![record]);
        prop_assert!(matches!(result, Err(LoadError::MissingColumns(_))));
    }
}

#[tokio::test]
async fn test_dry_run_never_calls_transport() {
    let table = numbered(4);
    let mut transport = MockTransport::new();
    transport.expect_send().never();
    transport.expect_close().never();

    let config = DispatchConfig::builder("noreply@example.com")
        .dry_run(true)
        .build()
        .unwrap();
    let mut dispatcher = dispatcher(config, "Olá {{ nome }}", "<p>{{ tratamento }}</p>");
    dispatcher.validate(&table, &NullSink).unwrap();

    let summary = dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.succeeded, 4);
    assert!(summary.dry_run);
}

#[tokio::test]
async fn test_dry_run_previews_every_row_including_malformed_address() {
    let table = contacts(&[("a@x.com", "Sr.", "Ana"), ("bad", "Sra.", "Bea")]);
    let config = DispatchConfig::builder("noreply@example.com")
        .dry_run(true)
        .build()
        .unwrap();
    let mut dispatcher = dispatcher(config, "Olá {{nome}}", "<p>Olá</p>");

    let report = dispatcher.validate(&table, &NullSink).unwrap();
    assert_eq!(report.invalid_recipients.len(), 1);
    assert_eq!(report.invalid_recipients[0].recipient, "bad");

    let (sink, mut events) = ChannelSink::new();
    let summary = dispatcher
        .run(&table, None, &sink, &CancellationToken::new())
        .await
        .unwrap();
    drop(sink);

    let mut previews = Vec::new();
    while let Some(event) = events.recv().await {
        if let DispatchEvent::Preview {
            recipient, subject, ..
        } = event
        {
            previews.push((recipient, subject));
        }
    }

    assert_eq!(
        previews,
        vec![
            ("a@x.com".to_string(), "Olá Ana".to_string()),
            ("bad".to_string(), "Olá Bea".to_string()),
        ]
    );
    assert!(summary
        .results
        .iter()
        .all(|result| result.status == DispatchStatus::WouldSend));
}

#[tokio::test]
async fn test_live_malformed_address_fails_only_its_row() {
    let table = contacts(&[
        ("a@x.com", "Sr.", "Ana"),
        ("bad", "Sra.", "Bea"),
        ("c@x.com", "Sr.", "Caio"),
    ]);
    let transport = RecordingSender::new();
    let mut dispatcher = dispatcher(live(0.0), "Olá {{ nome }}", "<p>Olá</p>");
    dispatcher.validate(&table, &NullSink).unwrap();

    let summary = dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.results[1].error_kind(), Some(ErrorKind::Address));
    assert_eq!(summary.results[1].attempts, 0);
    assert_eq!(
        transport.attempted_recipients(),
        vec!["a@x.com", "c@x.com"]
    );
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interval_between_attempt_starts() {
    let table = numbered(4);
    let transport = RecordingSender::new();
    let mut dispatcher = dispatcher(live(0.5), "Olá {{ nome }}", "<p>Olá</p>");
    dispatcher.validate(&table, &NullSink).unwrap();

    dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await
        .unwrap();

    let attempts = transport.attempts();
    assert_eq!(attempts.len(), 4);
    for pair in attempts.windows(2) {
        assert!(pair[1].at.duration_since(pair[0].at) >= Duration::from_millis(500));
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_after_row_stops_before_next() {
    let table = numbered(5);
    let cancel = CancellationToken::new();
    let transport = RecordingSender::new().cancel_after(2, cancel.clone());
    let mut dispatcher = dispatcher(live(0.25), "Olá {{ nome }}", "<p>Olá</p>");
    dispatcher.validate(&table, &NullSink).unwrap();

    let summary = dispatcher
        .run(&table, Some(&transport), &NullSink, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Cancelled);
    assert!(summary.cancelled);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.not_processed(), 3);
    assert_eq!(
        transport.attempted_recipients(),
        vec!["user1@example.com", "user2@example.com"]
    );
}

#[tokio::test]
async fn test_missing_placeholder_blocks_run() {
    let table = contacts(&[("a@x.com", "Sr.", "Ana")]);
    let transport = RecordingSender::new();
    let mut dispatcher = dispatcher(live(0.0), "Olá {{ nome }}", "<p>{{ cidade }}</p>");

    let err = dispatcher.validate(&table, &NullSink).unwrap_err();
    let DispatchError::Validation(report) = &err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert!(report.missing_names().contains("cidade"));
    assert_eq!(err.kind(), ErrorKind::MissingPlaceholder);
    assert_eq!(dispatcher.state(), RunState::Validating);

    let result = dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(DispatchError::NotReady(RunState::Validating))));
    assert!(transport.attempts().is_empty());
}

#[tokio::test]
async fn test_blank_optional_cell_renders_empty() {
    let table = ContactTable::from_records(
        vec!["email".into(), "tratamento".into(), "nome".into(), "cidade".into()],
        vec![
            vec![
                CellValue::from_text("a@x.com"),
                CellValue::from_text("Sr."),
                CellValue::from_text("Ana"),
                CellValue::from_text("Recife"),
            ],
            vec![
                CellValue::from_text("b@x.com"),
                CellValue::from_text("Sra."),
                CellValue::from_text("Bea"),
                CellValue::Empty,
            ],
        ],
    )
    .unwrap();
    let transport = RecordingSender::new();
    let mut dispatcher = dispatcher(live(0.0), "Olá {{ nome }}", "<p>{{ cidade }}</p>");

    dispatcher.validate(&table, &NullSink).unwrap();
    let summary = dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(transport.sent()[1].email().html.as_deref(), Some("<p></p>"));
}

#[tokio::test(start_paused = true)]
async fn test_temporary_failures_are_retried_with_backoff() {
    let table = contacts(&[("a@x.com", "Sr.", "Ana"), ("b@x.com", "Sra.", "Bea")]);
    let transport = RecordingSender::new()
        .fail_temporarily("a@x.com", 2)
        .fail_permanently("b@x.com");
    let config = DispatchConfig::builder("noreply@example.com")
        .interval_seconds(0.0)
        .retry(RetryPolicy::new(
            3,
            vec![Duration::from_secs(1), Duration::from_secs(2)],
        ))
        .build()
        .unwrap();
    let mut dispatcher = dispatcher(config, "Olá {{ nome }}", "<p>Olá</p>");
    dispatcher.validate(&table, &NullSink).unwrap();

    let summary = dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.results[0].attempts, 3);
    assert!(summary.results[0].is_success());
    assert_eq!(summary.results[1].attempts, 1);
    assert_eq!(summary.results[1].error_kind(), Some(ErrorKind::Transport));
    assert!(summary.results[1]
        .error_detail()
        .unwrap()
        .contains("mailbox unavailable"));

    let attempts = transport.attempts();
    assert!(attempts[1].at.duration_since(attempts[0].at) >= Duration::from_secs(1));
    assert!(attempts[2].at.duration_since(attempts[1].at) >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_blank_required_values_are_skipped() {
    let table = contacts(&[("a@x.com", "Sr.", "Ana"), ("", "Sra.", "Bea")]);
    let transport = RecordingSender::new();
    let mut dispatcher = dispatcher(live(0.0), "Olá {{ nome }}", "<p>Olá</p>");
    dispatcher.validate(&table, &NullSink).unwrap();

    let summary = dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.attempted, 1);
    assert!(summary.results[1].error_detail().unwrap().contains("email"));
}

#[tokio::test]
async fn test_panicking_transport_does_not_abort_batch() {
    let table = contacts(&[("a@x.com", "Sr.", "Ana"), ("b@x.com", "Sra.", "Bea")]);
    let transport = RecordingSender::new().panic_on("a@x.com");
    let mut dispatcher = dispatcher(live(0.0), "Olá {{ nome }}", "<p>Olá</p>");
    dispatcher.validate(&table, &NullSink).unwrap();

    let summary = dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.results[0].error_kind(), Some(ErrorKind::Unexpected));
    assert!(summary.results[1].is_success());
    assert!(transport.was_sent_to("b@x.com"));
}

#[tokio::test]
async fn test_rows_are_sent_in_table_order_with_run_addressing() {
    let table = numbered(3);
    let transport = RecordingSender::new();
    let config = DispatchConfig::builder("Equipe <noreply@example.com>")
        .cc("chefe@example.com")
        .bcc("arquivo@example.com")
        .reply_to("suporte@example.com")
        .interval_seconds(0.0)
        .build()
        .unwrap();
    let mut dispatcher = dispatcher(config, "Olá {{ nome }} ({{ linha }})", "<p>Olá</p>");
    dispatcher.validate(&table, &NullSink).unwrap();

    dispatcher
        .run(&table, Some(&transport), &NullSink, &CancellationToken::new())
        .await
        .unwrap();

    let sent = transport.sent();
    let subjects: Vec<&str> = sent.iter().map(TransportMessage::subject).collect();
    assert_eq!(
        subjects,
        vec!["Olá Pessoa 1 (1)", "Olá Pessoa 2 (2)", "Olá Pessoa 3 (3)"]
    );
    assert_eq!(sent[0].email().cc, vec!["chefe@example.com"]);
    assert_eq!(sent[0].envelope_size(), 3);
}
