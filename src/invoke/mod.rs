// Function invocation
// Named request/response invocation of handlers, in-process or over HTTP


use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Response shape shared by every handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl Envelope {
    #[inline]
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    #[inline]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    #[inline]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize envelope")
    }
}

/// Result of one invocation as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Status reported by the invocation transport
    pub status_code: u16,
    /// Raw response payload; an envelope when the handler returned normally
    pub payload: String,
}

impl Invocation {
    #[inline]
    pub fn envelope(&self) -> Result<Envelope> {
        serde_json::from_str(&self.payload).context("Response payload is not an envelope")
    }
}

/// Synchronous request/response invocation of a named function
pub trait Invoker: Send + Sync {
    /// `Err` means the invocation could not be performed at all
    fn invoke(&self, function: &str, payload: &Value) -> Result<Invocation>;
}

pub type Handler = Box<dyn Fn(&Value) -> Result<Envelope> + Send + Sync>;

/// Runs registered handlers in the current process
#[derive(Default)]
pub struct LocalInvoker {
    handlers: HashMap<String, Handler>,
}

impl LocalInvoker {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn register<F>(&mut self, function: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> Result<Envelope> + Send + Sync + 'static,
    {
        self.handlers.insert(function.into(), Box::new(handler));
    }

    #[inline]
    pub fn with_handler<F>(mut self, function: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<Envelope> + Send + Sync + 'static,
    {
        self.register(function, handler);
        self
    }
}

impl Invoker for LocalInvoker {
    fn invoke(&self, function: &str, payload: &Value) -> Result<Invocation> {
        let handler = self
            .handlers
            .get(function)
            .ok_or_else(|| anyhow!("Function not found: {function}"))?;

        debug!("Invoking {} in-process", function);
        match handler(payload) {
            Ok(envelope) => Ok(Invocation {
                status_code: 200,
                payload: envelope.to_json()?,
            }),
            Err(e) => {
                error!("Function {} failed: {:#}", function, e);
                Ok(Invocation {
                    status_code: 500,
                    payload: Envelope::new(500, format!("{e:#}")).to_json()?,
                })
            }
        }
    }
}

/// Invokes functions through a Lambda-style HTTP invocation endpoint
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    endpoint: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl HttpInvoker {
    #[inline]
    pub fn new(endpoint: Url, api_key: Option<String>) -> Self {
        Self {
            endpoint,
            api_key,
            agent: ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
                .http_status_as_error(false)
                .build()
                .into(),
        }
    }

    #[inline]
    pub fn function_url(&self, function: &str) -> Result<Url> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let url = format!("{base}/2015-03-31/functions/{function}/invocations");
        Url::parse(&url).with_context(|| format!("Invalid invocation URL: {url}"))
    }
}

impl Invoker for HttpInvoker {
    fn invoke(&self, function: &str, payload: &Value) -> Result<Invocation> {
        let url = self.function_url(function)?;
        let request_json = serde_json::to_string(payload).context("Failed to serialize payload")?;

        debug!("Invoking {} at {}", function, url);

        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let mut response = request
            .send(&request_json)
            .with_context(|| format!("Failed to invoke {function}"))?;
        let status_code = response.status().as_u16();
        let payload = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("Failed to read response from {function}"))?;

        Ok(Invocation {
            status_code,
            payload,
        })
    }
}
