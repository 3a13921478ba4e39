//! Tests for kolab-reporting

use async_trait::async_trait;
use kolab_core::ManualClock;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ReportingConfig;
use crate::context::{ReportingContext, StaticEnvironment};
use crate::delivery::{
    send_report, CollaboratorError, DeliveryReport, ErrorReportRow, NotificationDispatcher,
    ReportStore,
};
use crate::payload::{Dimensions, ErrorSource, RawError, Severity, UNKNOWN_ERROR};
use crate::prompt::{PromptHandler, PromptOutcome, PromptState};
use crate::reporter::{ErrorReporter, SubmitOutcome};

#[derive(Default)]
struct RecordingStore {
    fail: bool,
    rows: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl ReportStore for RecordingStore {
    async fn insert(&self, table: &str, record: Value) -> Result<Value, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Store("relation does not exist".into()));
        }
        self.rows.lock().push((table.to_string(), record.clone()));
        Ok(record)
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    fail: bool,
    calls: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn invoke(&self, function_name: &str, payload: Value) -> Result<(), CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Dispatch("502 Bad Gateway".into()));
        }
        self.calls.lock().push((function_name.to_string(), payload));
        Ok(())
    }
}

fn context(url: &str, ua: &str) -> ReportingContext {
    ReportingContext::with_clock(
        Arc::new(StaticEnvironment::new(url, ua)),
        Arc::new(ManualClock::default()),
    )
}

struct Harness {
    reporter: ErrorReporter,
    store: Arc<RecordingStore>,
    dispatcher: Arc<RecordingDispatcher>,
    prompts: Arc<AtomicUsize>,
}

fn harness(store: RecordingStore, dispatcher: RecordingDispatcher) -> Harness {
    let store = Arc::new(store);
    let dispatcher = Arc::new(dispatcher);
    let reporter = ErrorReporter::new(
        context("https://x/a", "UA1"),
        store.clone(),
        dispatcher.clone(),
        ReportingConfig::default(),
    );

    let prompts = Arc::new(AtomicUsize::new(0));
    let counter = prompts.clone();
    let handler: PromptHandler = Arc::new(move |_payload| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    reporter.register_prompt_handler(handler);

    Harness {
        reporter,
        store,
        dispatcher,
        prompts,
    }
}

mod payload_tests {
    use super::*;

    #[test]
    fn test_same_context_same_fingerprint() {
        let ctx = context("https://x/a", "UA1");
        let a = ctx.build_payload(&"Network timeout".into(), ErrorSource::Automatic);
        let b = ctx.build_payload(&"Network timeout".into(), ErrorSource::Manual);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint, "4d35aaaf2f7a8eea");
    }

    #[test]
    fn test_stack_does_not_affect_fingerprint() {
        let ctx = context("https://x/a", "UA1");
        let a = ctx.build_payload(
            &RawError::Error {
                message: Some("boom".into()),
                stack: Some("at render (App.tsx:10)".into()),
            },
            ErrorSource::Automatic,
        );
        let b = ctx.build_payload(
            &RawError::Error {
                message: Some("boom".into()),
                stack: Some("at submit (Form.tsx:88)".into()),
            },
            ErrorSource::Automatic,
        );
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.stack_trace, b.stack_trace);
    }

    #[test]
    fn test_missing_parts_fall_back() {
        let ctx = ReportingContext::new(Arc::new(StaticEnvironment::default()));
        let payload = ctx.build_payload(
            &RawError::Error {
                message: None,
                stack: Some("   ".into()),
            },
            ErrorSource::Automatic,
        );
        assert_eq!(payload.message, UNKNOWN_ERROR);
        assert_eq!(payload.stack_trace, None);
        assert_eq!(payload.url, "unknown");
        assert_eq!(payload.user_agent, "unknown");
        assert_eq!(payload.viewport_size, None);
    }

    #[test]
    fn test_non_error_values_are_coerced() {
        assert_eq!(RawError::Value(serde_json::json!(42)).message(), "42");
        assert_eq!(RawError::Value(serde_json::json!("plain")).message(), "plain");
        assert_eq!(RawError::Value(Value::Null).message(), UNKNOWN_ERROR);
        assert_eq!(
            RawError::Value(serde_json::json!({"code": 7})).message(),
            r#"{"code":7}"#
        );
        assert_eq!(RawError::Message("".into()).message(), UNKNOWN_ERROR);
    }

    #[test]
    fn test_from_error_captures_source_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("request failed")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"));
        let raw = RawError::from_error(&err);
        assert_eq!(raw.message(), "request failed");
        assert_eq!(raw.stack().as_deref(), Some("caused by: timed out"));
    }

    #[test]
    fn test_default_severity() {
        let img = RawError::image_load("https://cdn/x.png");
        assert_eq!(img.default_severity(ErrorSource::Automatic), Severity::Low);
        assert_eq!(img.message(), "Failed to load image: https://cdn/x.png");
        let crash: RawError = "boom".into();
        assert_eq!(crash.default_severity(ErrorSource::Automatic), Severity::High);
        assert_eq!(crash.default_severity(ErrorSource::Manual), Severity::Medium);
    }

    #[test]
    fn test_session_id_is_stable_and_lazy() {
        let ctx = context("https://x/a", "UA1");
        let first = ctx.session_id().to_string();
        assert!(first.starts_with("sess_"));
        let payload = ctx.build_payload(&"x".into(), ErrorSource::Manual);
        assert_eq!(payload.session_id, first);
        assert_eq!(ctx.session_id(), first);
        assert_ne!(context("https://x/a", "UA1").session_id(), first);
    }

    #[test]
    fn test_row_maps_table_columns() {
        let ctx = ReportingContext::new(Arc::new(StaticEnvironment {
            viewport: Some(Dimensions {
                width: 390,
                height: 844,
            }),
            ..StaticEnvironment::new("https://x/a", "UA1")
        }));
        let payload = ctx.build_payload(&"Network timeout".into(), ErrorSource::Manual);
        let row = ErrorReportRow::from_payload(&payload, Some("  clicked RSVP\u{0000} "));

        assert_eq!(row.title, "User error report: Network timeout");
        assert_eq!(row.description, "clicked RSVP");
        assert_eq!(row.severity, "medium");
        assert_eq!(row.status, "new");
        assert_eq!(row.browser_info["viewport"], "390x844");
        assert_eq!(row.error_details["fingerprint"], Value::String(payload.fingerprint));

        let record = row.to_record();
        for column in [
            "title",
            "description",
            "url",
            "user_agent",
            "browser_info",
            "error_details",
            "severity",
            "status",
        ] {
            assert!(record.get(column).is_some(), "missing column {}", column);
        }
    }
}

mod prompt_tests {
    use super::*;

    #[test]
    fn test_repeat_error_prompts_once() {
        let h = harness(RecordingStore::default(), RecordingDispatcher::default());

        let first = h.reporter.open_prompt_for("Network timeout", ErrorSource::Automatic);
        let second = h.reporter.open_prompt_for("Network timeout", ErrorSource::Automatic);

        assert!(first.was_shown());
        assert!(matches!(second, PromptOutcome::Suppressed { .. }));
        assert_eq!(h.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(h.reporter.prompts_suppressed(), 1);
    }

    #[test]
    fn test_distinct_errors_prompt_twice() {
        let h = harness(RecordingStore::default(), RecordingDispatcher::default());

        h.reporter.open_prompt_for("Network timeout", ErrorSource::Automatic);
        h.reporter.open_prompt_for("Payment declined", ErrorSource::Automatic);

        assert_eq!(h.prompts.load(Ordering::SeqCst), 2);
        assert_eq!(h.reporter.prompts_shown(), 2);
    }

    #[test]
    fn test_state_machine_transitions() {
        let h = harness(RecordingStore::default(), RecordingDispatcher::default());
        assert_eq!(h.reporter.prompt_state(), PromptState::Idle);

        let PromptOutcome::Shown(payload) = h.reporter.open_prompt_for("boom", ErrorSource::Automatic)
        else {
            panic!("expected prompt");
        };
        assert_eq!(h.reporter.prompt_state(), PromptState::Prompted(payload.fingerprint.clone()));

        h.reporter.dismiss();
        assert_eq!(h.reporter.prompt_state(), PromptState::Dismissed(payload.fingerprint.clone()));

        // same fingerprint cannot re-enter Prompted
        h.reporter.open_prompt_for("boom", ErrorSource::Automatic);
        assert_eq!(h.reporter.prompt_state(), PromptState::Dismissed(payload.fingerprint));

        // a new one can
        assert!(h.reporter.open_prompt_for("other", ErrorSource::Automatic).was_shown());
        assert!(matches!(h.reporter.prompt_state(), PromptState::Prompted(_)));
    }

    #[test]
    fn test_no_handler_leaves_dedup_untouched() {
        let reporter = ErrorReporter::new(
            context("https://x/a", "UA1"),
            Arc::new(RecordingStore::default()),
            Arc::new(RecordingDispatcher::default()),
            ReportingConfig::default(),
        );
        assert!(matches!(
            reporter.open_prompt_for("boom", ErrorSource::Automatic),
            PromptOutcome::NoHandler(_)
        ));

        let shown = Arc::new(AtomicUsize::new(0));
        let counter = shown.clone();
        reporter.register_prompt_handler(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(reporter.open_prompt_for("boom", ErrorSource::Automatic).was_shown());
        assert_eq!(shown.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_escape() {
        let reporter = ErrorReporter::new(
            context("https://x/a", "UA1"),
            Arc::new(RecordingStore::default()),
            Arc::new(RecordingDispatcher::default()),
            ReportingConfig::default(),
        );
        reporter.register_prompt_handler(Arc::new(|_| panic!("modal failed to mount")));

        let outcome = reporter.open_prompt_for("boom", ErrorSource::Automatic);
        assert!(outcome.was_shown());
        assert!(matches!(reporter.prompt_state(), PromptState::Prompted(_)));

        // dedup still applies to the payload that was handed over
        assert!(matches!(
            reporter.open_prompt_for("boom", ErrorSource::Automatic),
            PromptOutcome::Suppressed { .. }
        ));
    }

    #[test]
    fn test_handler_receives_payload() {
        let reporter = ErrorReporter::new(
            context("https://x/a", "UA1"),
            Arc::new(RecordingStore::default()),
            Arc::new(RecordingDispatcher::default()),
            ReportingConfig::default(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        reporter.register_prompt_handler(Arc::new(move |payload| sink.lock().push(payload)));

        reporter.open_prompt_for(RawError::image_load("/img/venue.jpg"), ErrorSource::Automatic);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].severity, Severity::Low);
        assert_eq!(seen[0].url, "https://x/a");
    }
}

mod delivery_tests {
    use super::*;

    #[tokio::test]
    async fn test_send_report_persists_and_notifies() {
        let h = harness(RecordingStore::default(), RecordingDispatcher::default());
        let payload = h.reporter.build_payload(&"Network timeout".into(), ErrorSource::Manual);

        let report = h.reporter.send_report(&payload, Some("<b>it broke</b>")).await;
        assert_eq!(
            report,
            DeliveryReport {
                persisted: true,
                notified: true
            }
        );

        let rows = h.store.rows.lock();
        assert_eq!(rows[0].0, "error_reports");
        assert_eq!(rows[0].1["description"], "<b>it broke</b>");

        let calls = h.dispatcher.calls.lock();
        assert_eq!(calls[0].0, "send-error-report");
        assert_eq!(calls[0].1["description_html"], "&lt;b&gt;it broke&lt;/b&gt;");
        assert_eq!(calls[0].1["fingerprint"], Value::String(payload.fingerprint.clone()));
    }

    #[tokio::test]
    async fn test_send_report_resolves_when_both_collaborators_fail() {
        let h = harness(
            RecordingStore {
                fail: true,
                ..Default::default()
            },
            RecordingDispatcher {
                fail: true,
                ..Default::default()
            },
        );
        let payload = h.reporter.build_payload(&"boom".into(), ErrorSource::Automatic);

        let report = h.reporter.send_report(&payload, None).await;
        assert_eq!(report, DeliveryReport::default());
        assert_eq!(h.reporter.reports_sent(), 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_other() {
        let store = RecordingStore {
            fail: true,
            ..Default::default()
        };
        let dispatcher = RecordingDispatcher::default();
        let config = ReportingConfig::default();
        let payload = context("https://x/a", "UA1").build_payload(&"boom".into(), ErrorSource::Automatic);

        let report = send_report(&store, &dispatcher, &config, &payload, None).await;
        assert!(!report.persisted);
        assert!(report.notified);
        assert_eq!(dispatcher.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_marks_sent_then_rate_limits() {
        let h = harness(RecordingStore::default(), RecordingDispatcher::default());
        let PromptOutcome::Shown(payload) = h.reporter.open_prompt_for("boom", ErrorSource::Automatic)
        else {
            panic!("expected prompt");
        };

        let outcome = h.reporter.submit(&payload, None).await;
        assert!(matches!(outcome, SubmitOutcome::Sent(_)));
        assert_eq!(h.reporter.prompt_state(), PromptState::Sent(payload.fingerprint.clone()));

        // default bucket admits five per minute per session
        for _ in 0..4 {
            assert!(matches!(h.reporter.submit(&payload, None).await, SubmitOutcome::Sent(_)));
        }
        match h.reporter.submit(&payload, None).await {
            SubmitOutcome::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert_eq!(h.store.rows.lock().len(), 5);
    }

    #[test]
    fn test_send_report_with_tokio_test_runtime() {
        let h = harness(RecordingStore::default(), RecordingDispatcher::default());
        let payload = h.reporter.build_payload(&"x".into(), ErrorSource::Manual);
        let report = tokio_test::block_on(h.reporter.send_report(&payload, None));
        assert!(report.persisted && report.notified);
    }
}

mod global_tests {
    use super::*;
    use crate::global;

    #[test]
    fn test_global_facade_routes_to_installed_reporter() {
        let h = harness(RecordingStore::default(), RecordingDispatcher::default());
        let prompts = h.prompts.clone();
        let reporter = Arc::new(h.reporter);

        assert!(global::install(reporter.clone()));
        assert!(!global::install(reporter.clone()));

        global::open_error_prompt_for("Network timeout", ErrorSource::Automatic);
        global::open_error_prompt_for("Network timeout", ErrorSource::Automatic);
        global::report_image_failure("/img/a.png");

        assert_eq!(prompts.load(Ordering::SeqCst), 2);
        assert!(global::reporter().is_some());

        let shown = Arc::new(AtomicUsize::new(0));
        let counter = shown.clone();
        assert!(global::register_prompt_handler(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        global::open_error_prompt_for("fresh", ErrorSource::Manual);
        assert_eq!(shown.load(Ordering::SeqCst), 1);
    }
}
