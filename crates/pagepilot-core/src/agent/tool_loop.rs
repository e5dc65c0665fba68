//! The bounded tool-calling loop.
//!
//! One round is one model invocation. While the model keeps requesting
//! tools and the round budget allows, each requested tool runs and its
//! output (or error text) is fed back as a tool-result message. The loop
//! ends on a tool-free response or when the budget runs out; in the latter
//! case the last response is returned as-is and flagged `exhausted`.

use pagepilot_types::config::AgentSettings;
use pagepilot_types::error::ToolError;
use pagepilot_types::llm::{CompletionRequest, CompletionResponse, LlmError, Message, Usage};
use tracing::{Instrument, debug, info_span, warn};

use crate::llm::box_provider::BoxLlmProvider;

use super::cycle_detector::{CycleCheckResult, CycleDetector};
use super::tools::ToolRegistry;

/// Model and budget for one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub model: String,
    /// Model invocations allowed per turn; never below 1.
    pub max_rounds: u32,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

impl AgentConfig {
    pub fn from_settings(model: impl Into<String>, settings: &AgentSettings) -> Self {
        Self {
            model: model.into(),
            max_rounds: settings.max_tool_rounds.max(1),
            max_tokens: settings.max_tokens,
            temperature: Some(settings.temperature),
        }
    }
}

/// Result of one agent run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The last model response.
    pub response: CompletionResponse,
    /// Model invocations performed.
    pub rounds: u32,
    /// Tools actually executed (repetitions refused by the cycle detector
    /// are not counted).
    pub tool_invocations: u32,
    /// True when the budget ran out while the model still wanted tools.
    pub exhausted: bool,
    /// Token usage summed over all rounds.
    pub usage: Usage,
}

/// Drives the model through tool calls until it answers or the budget runs out.
pub struct AgentLoop<'a> {
    provider: &'a BoxLlmProvider,
    tools: &'a ToolRegistry,
    config: &'a AgentConfig,
}

impl<'a> AgentLoop<'a> {
    pub fn new(provider: &'a BoxLlmProvider, tools: &'a ToolRegistry, config: &'a AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Run the loop over `messages` (prior history plus the new user message).
    pub async fn run(&self, system: String, mut messages: Vec<Message>) -> Result<AgentOutcome, LlmError> {
        let detector = CycleDetector::new();
        let definitions = self.tools.definitions();
        let budget = self.config.max_rounds.max(1);
        let mut usage = Usage::default();
        let mut tool_invocations = 0u32;
        let mut rounds = 0u32;

        loop {
            rounds += 1;
            let request = CompletionRequest {
                model: self.config.model.clone(),
                messages: messages.clone(),
                system: Some(system.clone()),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                stream: false,
                tools: definitions.clone(),
            };

            let span = info_span!(
                "gen_ai.complete",
                gen_ai.system = self.provider.name(),
                gen_ai.request.model = %request.model,
                gen_ai.request.max_tokens = request.max_tokens,
                gen_ai.request.temperature = ?request.temperature,
                gen_ai.request.stream = false,
                round = rounds,
            );
            let response = self.provider.complete(&request).instrument(span).await?;
            usage.add(&response.usage);

            if !response.requests_tools() {
                debug!(rounds, tool_invocations, "agent loop finished");
                return Ok(AgentOutcome {
                    response,
                    rounds,
                    tool_invocations,
                    exhausted: false,
                    usage,
                });
            }

            if rounds >= budget {
                warn!(
                    rounds,
                    pending_tools = response.tool_calls.len(),
                    "tool round budget exhausted, returning last response"
                );
                return Ok(AgentOutcome {
                    response,
                    rounds,
                    tool_invocations,
                    exhausted: true,
                    usage,
                });
            }

            messages.push(Message::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let output = match detector.check_and_register(&call.name, &call.arguments) {
                    CycleCheckResult::CycleDetected { tool, count } => {
                        warn!(tool = %tool, count, "refusing repeated tool call");
                        ToolError::Repeated {
                            tool,
                            count: u32::try_from(count).unwrap_or(u32::MAX),
                        }
                        .to_string()
                    }
                    CycleCheckResult::Ok => {
                        tool_invocations += 1;
                        match self.tools.execute(&call.name, call.arguments.clone()).await {
                            Ok(output) => {
                                debug!(tool = %call.name, round = rounds, "tool succeeded");
                                output
                            }
                            Err(e) => {
                                warn!(tool = %call.name, round = rounds, error = %e, "tool failed");
                                format!("Error: {e}")
                            }
                        }
                    }
                };
                messages.push(Message::tool_result(call.id.clone(), output));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pagepilot_types::chat::TabId;
    use pagepilot_types::llm::MessageRole;
    use serde_json::json;

    use crate::agent::tools::{ToolBinder, page_tools};
    use crate::test_support::{FakePage, RecordingActions, ScriptedProvider, text_response, tool_response};

    fn config(max_rounds: u32) -> AgentConfig {
        AgentConfig {
            model: "test-model".to_string(),
            max_rounds,
            max_tokens: 256,
            temperature: None,
        }
    }

    fn registry() -> (Arc<RecordingActions>, ToolRegistry) {
        let page = Arc::new(FakePage::with_text("7", "https://acme.test", "Acme Corp develops routers."));
        let actions = Arc::new(RecordingActions::new());
        let tools = page_tools(page, actions.clone()).bind(&TabId::from("7"));
        (actions, tools)
    }

    #[tokio::test]
    async fn test_tool_free_response_ends_after_one_round() {
        let scripted = ScriptedProvider::new(vec![text_response("Acme builds routers.")]);
        let provider = BoxLlmProvider::new(scripted.clone());
        let (_, tools) = registry();
        let cfg = config(5);

        let outcome = AgentLoop::new(&provider, &tools, &cfg)
            .run("system".into(), vec![Message::user("what does Acme do?")])
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 1);
        assert!(!outcome.exhausted);
        assert_eq!(outcome.response.content, "Acme builds routers.");
        let requests = scripted.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 8);
        assert_eq!(requests[0].system.as_deref(), Some("system"));
    }

    #[tokio::test]
    async fn test_tool_results_are_fed_back() {
        let scripted = ScriptedProvider::new(vec![
            tool_response(vec![("read_page_content", json!({}))]),
            tool_response(vec![("click", json!({"selector": "#buy"}))]),
            text_response("Clicked buy."),
        ]);
        let provider = BoxLlmProvider::new(scripted.clone());
        let (actions, tools) = registry();
        let cfg = config(5);

        let outcome = AgentLoop::new(&provider, &tools, &cfg)
            .run("system".into(), vec![Message::user("buy it")])
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.tool_invocations, 2);
        assert_eq!(actions.calls(), vec!["click #buy"]);

        let last = scripted.requests().pop().unwrap();
        let tool_messages: Vec<_> = last
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 2);
        assert!(tool_messages[0].content.contains("Acme Corp develops routers."));
    }

    #[tokio::test]
    async fn test_always_calling_model_stops_at_budget() {
        let scripted = ScriptedProvider::always_calling("go_back", json!({}));
        let provider = BoxLlmProvider::new(scripted.clone());
        let (_, tools) = registry();
        let cfg = config(5);

        let outcome = AgentLoop::new(&provider, &tools, &cfg)
            .run("system".into(), vec![Message::user("loop forever")])
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 5);
        assert!(outcome.exhausted);
        assert!(outcome.response.requests_tools());
        assert_eq!(scripted.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_and_failing_tools_become_error_results() {
        let scripted = ScriptedProvider::new(vec![
            tool_response(vec![
                ("teleport", json!({})),
                ("click", json!({"selector": "#missing"})),
            ]),
            text_response("I could not do that."),
        ]);
        let provider = BoxLlmProvider::new(scripted.clone());
        let (_, tools) = registry();
        let cfg = config(5);

        let outcome = AgentLoop::new(&provider, &tools, &cfg)
            .run("system".into(), vec![Message::user("do things")])
            .await
            .unwrap();

        assert!(!outcome.exhausted);
        let last = scripted.requests().pop().unwrap();
        let results: Vec<&str> = last
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert!(results[0].starts_with("Error: unknown tool 'teleport'"));
        assert!(results[1].contains("#missing"));
    }

    #[tokio::test]
    async fn test_repeated_identical_calls_are_refused() {
        let scripted = ScriptedProvider::always_calling("click", json!({"selector": "#go"}));
        let provider = BoxLlmProvider::new(scripted.clone());
        let (actions, tools) = registry();
        let cfg = config(6);

        let outcome = AgentLoop::new(&provider, &tools, &cfg)
            .run("system".into(), vec![Message::user("click go")])
            .await
            .unwrap();

        // Rounds 1-3 click, rounds 4-5 are refused, round 6 exhausts the budget.
        assert_eq!(outcome.rounds, 6);
        assert_eq!(outcome.tool_invocations, 3);
        assert_eq!(actions.calls().len(), 3);
        let last = scripted.requests().pop().unwrap();
        let refused = last
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .last()
            .unwrap();
        assert!(refused.content.contains("repeated with identical arguments"));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let scripted = ScriptedProvider::failing();
        let provider = BoxLlmProvider::new(scripted);
        let (_, tools) = registry();
        let cfg = config(5);

        let err = AgentLoop::new(&provider, &tools, &cfg)
            .run("system".into(), vec![Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Provider { .. }));
    }

    #[test]
    fn test_config_budget_is_at_least_one() {
        let settings = AgentSettings {
            max_tool_rounds: 0,
            ..AgentSettings::default()
        };
        assert_eq!(AgentConfig::from_settings("m", &settings).max_rounds, 1);
    }
}
