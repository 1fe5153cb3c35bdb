#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// HTTP invocation and the question form against a mocked invocation endpoint

use docs_rag::invoke::{Envelope, HttpInvoker, Invoker};
use docs_rag::ui::UiClient;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FUNCTION_PATH: &str = "/2015-03-31/functions/docs-rag-chat-handler/invocations";

fn invoker(server: &MockServer, api_key: Option<&str>) -> HttpInvoker {
    HttpInvoker::new(
        Url::parse(&server.uri()).expect("mock server uri"),
        api_key.map(str::to_string),
    )
}

#[tokio::test]
async fn posts_payload_and_returns_envelope() {
    let server = MockServer::start().await;
    let body = json!({"answer": "Use the installer.", "sources": "# Install"}).to_string();
    Mock::given(method("POST"))
        .and(path(FUNCTION_PATH))
        .and(header("Authorization", "Bearer key"))
        .and(body_json(json!({"input": "How?"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"statusCode": 200, "body": body})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let invoker = invoker(&server, Some("key"));
    let invocation = tokio::task::spawn_blocking(move || {
        invoker.invoke("docs-rag-chat-handler", &json!({"input": "How?"}))
    })
    .await
    .expect("task completes")
    .expect("invocation succeeds");

    assert_eq!(invocation.status_code, 200);
    assert_eq!(
        invocation.envelope().expect("envelope"),
        Envelope::ok(body)
    );
}

#[tokio::test]
async fn ui_shows_answer_from_remote_handler() {
    let server = MockServer::start().await;
    let body = json!({"answer": "Use the installer.", "sources": "# Install"}).to_string();
    Mock::given(method("POST"))
        .and(path(FUNCTION_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"statusCode": 200, "body": body})),
        )
        .mount(&server)
        .await;

    let client = UiClient::live(Box::new(invoker(&server, None)), "docs-rag-chat-handler");
    let output = tokio::task::spawn_blocking(move || client.ask("How?"))
        .await
        .expect("task completes");

    assert_eq!(output.answer, "Use the installer.");
    assert_eq!(output.sources, "# Install");
}

#[tokio::test]
async fn ui_formats_transport_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FUNCTION_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let client = UiClient::live(Box::new(invoker(&server, None)), "docs-rag-chat-handler");
    let output = tokio::task::spawn_blocking(move || client.ask("How?"))
        .await
        .expect("task completes");

    assert_eq!(output.answer, "Error 502: Bad Gateway");
}

#[tokio::test]
async fn ui_formats_handler_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FUNCTION_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"statusCode": 400, "body": "No question provided."})),
        )
        .mount(&server)
        .await;

    let client = UiClient::live(Box::new(invoker(&server, None)), "docs-rag-chat-handler");
    let output = tokio::task::spawn_blocking(move || client.ask(""))
        .await
        .expect("task completes");

    assert_eq!(output.answer, "Error 400: No question provided.");
}

#[tokio::test]
async fn unreachable_endpoint_is_reported() {
    let server = MockServer::start().await;
    let endpoint = Url::parse(&server.uri()).expect("mock server uri");
    drop(server);

    let client = UiClient::live(
        Box::new(HttpInvoker::new(endpoint, None)),
        "docs-rag-chat-handler",
    );
    let output = tokio::task::spawn_blocking(move || client.ask("How?"))
        .await
        .expect("task completes");

    assert!(output.answer.starts_with("Error: "));
}
