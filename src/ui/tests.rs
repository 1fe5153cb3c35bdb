use super::*;
use crate::invoke::{Envelope, Invocation};
use anyhow::anyhow;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns a fixed invocation and records what it was asked
struct FixedInvoker {
    response: Result<Invocation, String>,
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<(String, Value)>>>,
}

impl FixedInvoker {
    fn new(response: Result<Invocation, String>) -> Self {
        Self {
            response,
            calls: Arc::new(AtomicUsize::new(0)),
            last: Arc::new(Mutex::new(None)),
        }
    }
}

impl Invoker for FixedInvoker {
    fn invoke(&self, function: &str, payload: &Value) -> Result<Invocation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().expect("lock") = Some((function.to_string(), payload.clone()));
        self.response.clone().map_err(|e| anyhow!(e))
    }
}

fn envelope_invocation(status_code: u16, envelope: &Envelope) -> Invocation {
    Invocation {
        status_code,
        payload: envelope.to_json().expect("serializes"),
    }
}

#[test]
fn mocked_client_returns_canned_output() {
    let output = UiClient::Mocked.ask("anything");
    assert_eq!(output.answer, MOCK_ANSWER);
    assert_eq!(output.sources, "### Mocked source");
}

#[test]
fn mock_flag_selects_mocked_client() {
    let mut config = Config::default();
    config.ui.mock = true;
    assert!(matches!(UiClient::from_config(&config), UiClient::Mocked));
}

#[test]
fn live_client_sends_question_and_decodes_answer() {
    let body = serde_json::to_string(&QueryAnswer {
        answer: "It is 42.".to_string(),
        sources: "# Title\nfact".to_string(),
    })
    .expect("serializes");
    let invoker = FixedInvoker::new(Ok(envelope_invocation(200, &Envelope::ok(body))));
    let last = Arc::clone(&invoker.last);

    let client = UiClient::live(Box::new(invoker), "docs-rag-chat-handler");
    let output = client.ask("What is it?");

    assert_eq!(output.answer, "It is 42.");
    assert_eq!(output.sources, "# Title\nfact");
    let (function, payload) = last.lock().expect("lock").clone().expect("invoked");
    assert_eq!(function, "docs-rag-chat-handler");
    assert_eq!(payload, json!({"input": "What is it?"}));
}

#[test]
fn transport_error_status_is_formatted() {
    let invoker = FixedInvoker::new(Ok(envelope_invocation(
        500,
        &Envelope::new(500, "Failed to load index"),
    )));
    let output = UiClient::live(Box::new(invoker), "f").ask("q");
    assert_eq!(output.answer, "Error 500: Failed to load index");
    assert_eq!(output.sources, "");
}

#[test]
fn non_envelope_error_payload_is_shown_raw() {
    let invoker = FixedInvoker::new(Ok(Invocation {
        status_code: 404,
        payload: "Function not found".to_string(),
    }));
    let output = UiClient::live(Box::new(invoker), "f").ask("q");
    assert_eq!(output.answer, "Error 404: Function not found");
}

#[test]
fn handler_rejection_is_formatted() {
    let invoker = FixedInvoker::new(Ok(envelope_invocation(
        200,
        &Envelope::new(400, "No question provided."),
    )));
    let output = UiClient::live(Box::new(invoker), "f").ask("");
    assert_eq!(output.answer, "Error 400: No question provided.");
}

#[test]
fn failed_invocation_is_formatted() {
    let invoker = FixedInvoker::new(Err("connection refused".to_string()));
    let calls = Arc::clone(&invoker.calls);
    let output = UiClient::live(Box::new(invoker), "f").ask("q");
    assert_eq!(output.answer, "Error: connection refused");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn undecodable_answer_is_formatted() {
    let invoker = FixedInvoker::new(Ok(envelope_invocation(200, &Envelope::ok("not json"))));
    let output = UiClient::live(Box::new(invoker), "f").ask("q");
    assert!(output.answer.starts_with("Error: Invalid answer payload"));
}

#[test]
fn in_process_client_rejects_blank_question() {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let mut config = Config::default();
    config.storage.root = temp_dir.path().to_path_buf();
    config.storage.scratch_dir = temp_dir.path().join("scratch");

    let client = UiClient::from_config(&config);
    let output = client.ask("  ");
    assert_eq!(output.answer, "Error 400: No question provided.");
}
