//! SSE stream to [`StreamEvent`] adapter for the chat completions protocol.
//!
//! Tool call arguments arrive as partial JSON fragments across chunks, keyed
//! by tool call index. [`ChunkMapper`] accumulates them and emits
//! [`StreamEvent::ToolUseComplete`] when a finish reason arrives or the
//! stream ends.

use std::collections::BTreeMap;
use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};

use pagepilot_types::llm::{LlmError, StopReason, StreamEvent, Usage};

use super::types::{ChatChunk, map_finish_reason, parse_arguments};

struct ToolCallAccumulator {
    id: String,
    name: String,
    json_buffer: String,
}

/// Turns decoded chunks into provider-agnostic events.
#[derive(Default)]
pub struct ChunkMapper {
    tools: BTreeMap<u32, ToolCallAccumulator>,
}

impl ChunkMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events produced by one chunk.
    pub fn apply(&mut self, chunk: ChatChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content
                && !text.is_empty()
            {
                events.push(StreamEvent::TextDelta { text });
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let acc = self.tools.entry(delta.index).or_insert_with(|| ToolCallAccumulator {
                    id: String::new(),
                    name: String::new(),
                    json_buffer: String::new(),
                });
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    acc.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        acc.name = name;
                    }
                    if let Some(args) = function.arguments {
                        acc.json_buffer.push_str(&args);
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                events.extend(self.drain_tools());
                let stop_reason = map_finish_reason(Some(&reason));
                events.push(StreamEvent::MessageDelta { stop_reason });
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage(Usage::from(usage)));
        }

        events
    }

    /// Flush tool calls still pending when the stream closes, then `Done`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = self.drain_tools();
        if !events.is_empty() {
            events.push(StreamEvent::MessageDelta {
                stop_reason: StopReason::ToolUse,
            });
        }
        events.push(StreamEvent::Done);
        events
    }

    fn drain_tools(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.tools)
            .into_values()
            .map(|acc| StreamEvent::ToolUseComplete {
                input: parse_arguments(&acc.json_buffer),
                id: acc.id,
                name: acc.name,
            })
            .collect()
    }
}

/// Map an HTTP response body carrying server-sent events to [`StreamEvent`]s.
///
/// Emits `Connected` first and `Done` last; a `[DONE]` sentinel ends the
/// stream early.
pub fn map_sse_response(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::Connected;

        let mut mapper = ChunkMapper::new();
        let mut events = response.bytes_stream().eventsource();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                break;
            }

            let chunk: ChatChunk = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("invalid stream chunk: {e}")))?;
            for mapped in mapper.apply(chunk) {
                yield mapped;
            }
        }

        for mapped in mapper.finish() {
            yield mapped;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(value: serde_json::Value) -> ChatChunk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_text_deltas_pass_through() {
        let mut mapper = ChunkMapper::new();
        let events = mapper.apply(chunk(json!({
            "choices": [{"delta": {"content": "Hel"}}]
        })));
        assert!(matches!(&events[..], [StreamEvent::TextDelta { text }] if text == "Hel"));

        let events = mapper.apply(chunk(json!({
            "choices": [{"delta": {"content": ""}, "finish_reason": "stop"}]
        })));
        assert!(matches!(
            &events[..],
            [StreamEvent::MessageDelta { stop_reason: StopReason::EndTurn }]
        ));
    }

    #[test]
    fn test_tool_call_fragments_are_assembled() {
        let mut mapper = ChunkMapper::new();
        mapper.apply(chunk(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_1", "function": {"name": "click", "arguments": "{\"sel"}}
        ]}}]})));
        mapper.apply(chunk(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "ector\":\"#buy\"}"}}
        ]}}]})));
        let events = mapper.apply(chunk(json!({
            "choices": [{"delta": {}, "finish_reason": "tool_calls"}]
        })));

        match &events[..] {
            [
                StreamEvent::ToolUseComplete { id, name, input },
                StreamEvent::MessageDelta { stop_reason: StopReason::ToolUse },
            ] => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "click");
                assert_eq!(input, &json!({"selector": "#buy"}));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_parallel_calls_come_out_in_index_order() {
        let mut mapper = ChunkMapper::new();
        mapper.apply(chunk(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 1, "id": "b", "function": {"name": "scroll", "arguments": "{}"}},
            {"index": 0, "id": "a", "function": {"name": "read_page_content", "arguments": ""}}
        ]}}]})));

        let events = mapper.finish();
        let ids: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolUseComplete { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[test]
    fn test_usage_only_chunk() {
        let mut mapper = ChunkMapper::new();
        let events = mapper.apply(chunk(json!({
            "choices": [],
            "usage": {"prompt_tokens": 20, "completion_tokens": 4}
        })));
        assert!(matches!(
            &events[..],
            [StreamEvent::Usage(Usage { input_tokens: 20, output_tokens: 4 })]
        ));
    }

    #[test]
    fn test_finish_without_pending_tools_is_just_done() {
        let mut mapper = ChunkMapper::new();
        assert!(matches!(&mapper.finish()[..], [StreamEvent::Done]));
    }
}
