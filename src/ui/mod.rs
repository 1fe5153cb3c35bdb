// Question form
// Terminal form that sends questions to the chat handler and shows the answer

#[cfg(test)]
mod tests;

use anyhow::Result;
use console::style;
use dialoguer::Input;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::context::Context;
use crate::invoke::{HttpInvoker, Invoker, LocalInvoker};
use crate::query::{QueryAnswer, QueryHandler};

pub const MOCK_ANSWER: &str = "Mocked response, to get real response you need to configure the model service and storage and set mock to false in the configuration";
pub const MOCK_SOURCES: &str = "### Mocked source";

/// What the form displays for one question
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiOutput {
    pub answer: String,
    pub sources: String,
}

impl UiOutput {
    fn error(message: String) -> Self {
        Self {
            answer: message,
            sources: String::new(),
        }
    }
}

pub enum UiClient {
    /// Canned output, no collaborator is contacted
    Mocked,
    Live {
        invoker: Box<dyn Invoker>,
        function_name: String,
    },
}

impl UiClient {
    #[inline]
    pub fn live(invoker: Box<dyn Invoker>, function_name: impl Into<String>) -> Self {
        Self::Live {
            invoker,
            function_name: function_name.into(),
        }
    }

    /// Mocked, remote or in-process client depending on `ui` settings
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        if config.ui.mock {
            debug!("Question form is mocked");
            return Self::Mocked;
        }

        let function_name = config.ui.function_name.clone();
        match &config.ui.endpoint {
            Some(endpoint) => {
                debug!("Question form invokes {} at {}", function_name, endpoint);
                Self::live(
                    Box::new(HttpInvoker::new(endpoint.clone(), config.ui.api_key.clone())),
                    function_name,
                )
            }
            None => {
                debug!("Question form invokes {} in-process", function_name);
                let handler = QueryHandler::new(Arc::new(Context::from_config(config.clone())));
                let invoker = LocalInvoker::new()
                    .with_handler(function_name.clone(), move |event| handler.handle_event(event));
                Self::live(Box::new(invoker), function_name)
            }
        }
    }

    /// Ask one question. Failures are rendered into the answer text.
    #[inline]
    pub fn ask(&self, question: &str) -> UiOutput {
        match self {
            Self::Mocked => UiOutput {
                answer: MOCK_ANSWER.to_string(),
                sources: MOCK_SOURCES.to_string(),
            },
            Self::Live {
                invoker,
                function_name,
            } => ask_live(invoker.as_ref(), function_name, question),
        }
    }
}

fn ask_live(invoker: &dyn Invoker, function_name: &str, question: &str) -> UiOutput {
    let invocation = match invoker.invoke(function_name, &json!({ "input": question })) {
        Ok(invocation) => invocation,
        Err(e) => {
            warn!("Invocation of {} failed: {:#}", function_name, e);
            return UiOutput::error(format!("Error: {e:#}"));
        }
    };

    if invocation.status_code != 200 {
        let body = invocation
            .envelope()
            .map_or_else(|_| invocation.payload.clone(), |envelope| envelope.body);
        return UiOutput::error(format!("Error {}: {}", invocation.status_code, body));
    }

    let envelope = match invocation.envelope() {
        Ok(envelope) => envelope,
        Err(e) => return UiOutput::error(format!("Error: {e:#}")),
    };
    if envelope.status_code != 200 {
        return UiOutput::error(format!("Error {}: {}", envelope.status_code, envelope.body));
    }

    match serde_json::from_str::<QueryAnswer>(&envelope.body) {
        Ok(answer) => UiOutput {
            answer: answer.answer,
            sources: answer.sources,
        },
        Err(e) => UiOutput::error(format!("Error: Invalid answer payload: {e}")),
    }
}

/// Prompt for questions until an empty line or end of input
#[inline]
pub fn run_form(client: &UiClient) -> Result<()> {
    println!("{}", style("# Docs RAG").bold().cyan());
    println!();

    loop {
        let question: String = match Input::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()
        {
            Ok(question) => question,
            Err(e) => {
                debug!("Question form closed: {}", e);
                break;
            }
        };

        if question.trim().is_empty() {
            break;
        }

        let output = client.ask(&question);
        println!();
        println!("{}", style("Answer").bold().yellow());
        println!("{}", output.answer);
        println!();
        println!("{}", style("### Sources").bold().yellow());
        println!("{}", output.sources);
        println!();
    }

    Ok(())
}
