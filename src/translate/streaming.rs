//! State machine for rebuilding generate-content chunks from an OpenAI SSE stream.
//!
//! [`LineBuffer`] turns arbitrarily split reads into complete lines, and
//! [`StreamReconstructor`] consumes those lines one at a time. Text deltas are
//! emitted as soon as they arrive; tool-call fragments are accumulated per
//! stream index and released as one consolidated chunk on a finish signal, the
//! `[DONE]` sentinel, or transport exhaustion, together with any reported
//! usage. Both types are pure (no I/O).

use std::collections::BTreeMap;

use super::gemini_types::{FunctionCall, GenerateContentResponse, Part, UsageMetadata};
use super::openai_types::{ChatCompletionChunk, ChunkToolCall};
use super::response::{map_finish_reason, map_usage, parse_arguments};
use crate::error::{BridgeError, Result};

/// Payload that ends an OpenAI stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Rolling byte buffer that yields complete lines and keeps any trailing
/// partial line for the next read. Lines are decoded only once complete, so
/// multi-byte characters split across reads survive intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    start: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    pub fn next_line(&mut self) -> Option<String> {
        let rest = &self.buf[self.start..];
        let pos = rest.iter().position(|b| *b == b'\n')?;
        let mut line = &rest[..pos];
        if let [head @ .., b'\r'] = line {
            line = head;
        }
        let line = String::from_utf8_lossy(line).into_owned();
        self.start += pos + 1;
        Some(line)
    }

    /// Whatever is left once the transport has ended, if non-blank.
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buf[self.start..]).into_owned();
        self.buf.clear();
        self.start = 0;
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Partial tool call for one stream index.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    /// `id` and `name` are filled once and never overwritten; argument text
    /// is always appended.
    fn merge(&mut self, delta: &ChunkToolCall) {
        if self.id.is_none() {
            self.id = delta.id.clone().filter(|id| !id.is_empty());
        }
        if let Some(func) = &delta.function {
            if self.name.is_none() {
                self.name = func.name.clone().filter(|n| !n.is_empty());
            }
            if let Some(args) = &func.arguments {
                self.arguments.push_str(args);
            }
        }
    }

    fn into_function_call(self, index: u32) -> FunctionCall {
        FunctionCall {
            id: Some(self.id.unwrap_or_else(|| format!("call_{index}"))),
            name: self.name.unwrap_or_default(),
            args: parse_arguments(&self.arguments),
        }
    }
}

/// Rebuilds generate-content chunks from OpenAI stream lines.
///
/// Usage:
///   let mut reconstructor = StreamReconstructor::new();
///   for line in lines {
///       for chunk in reconstructor.process_line(&line) { /* hand to caller */ }
///       if reconstructor.is_done() { break; }
///   }
///   let last = reconstructor.finish();
#[derive(Debug, Default)]
pub struct StreamReconstructor {
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<UsageMetadata>,
    response_id: Option<String>,
    model_version: Option<String>,
    done: bool,
}

impl StreamReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel or [`finish`](Self::finish) has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Process one SSE line, returning zero or more chunks.
    ///
    /// Non-`data:` lines and empty payloads are ignored. A payload that is not
    /// valid JSON is skipped; the stream carries on.
    pub fn process_line(&mut self, line: &str) -> Vec<GenerateContentResponse> {
        if self.done {
            return Vec::new();
        }

        let Some(data) = sse_data(line) else {
            return Vec::new();
        };
        if data.is_empty() {
            return Vec::new();
        }

        if data == DONE_SENTINEL {
            self.done = true;
            return self.flush(None).into_iter().collect();
        }

        match parse_frame(data) {
            Ok(chunk) => self.process_chunk(&chunk),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparseable stream frame");
                Vec::new()
            }
        }
    }

    /// Process a single parsed frame.
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<GenerateContentResponse> {
        let mut chunks = Vec::new();
        if self.done {
            return chunks;
        }

        if let Some(id) = non_empty(Some(chunk.id.as_str())) {
            self.response_id = Some(id.to_string());
        }
        if let Some(model) = non_empty(Some(chunk.model.as_str())) {
            self.model_version = Some(model.to_string());
        }
        if let Some(usage) = chunk.usage.as_ref().and_then(map_usage) {
            self.usage = Some(usage);
        }

        // Usage-only frames have no choices; their usage goes out with the final flush
        let Some(choice) = chunk.choices.first() else {
            return chunks;
        };

        if let Some(reasoning) = non_empty(choice.delta.reasoning_content.as_deref()) {
            chunks.push(self.response(vec![Part::thought(reasoning)], None));
        }

        if let Some(content) = non_empty(choice.delta.content.as_deref()) {
            chunks.push(self.response(vec![Part::text(content)], None));
        }

        for delta in choice.delta.tool_calls.iter().flatten() {
            let index = delta.index.unwrap_or(0);
            self.tool_calls.entry(index).or_default().merge(delta);
        }

        // Some backends end a tool-call turn with a finish_reason and no sentinel
        if let Some(reason) = non_empty(choice.finish_reason.as_deref()) {
            chunks.extend(self.flush(Some(reason)));
        }

        chunks
    }

    /// The transport ended. Flushes whatever tool calls are pending, complete
    /// or not, and marks the stream done.
    pub fn finish(&mut self) -> Option<GenerateContentResponse> {
        if self.done {
            return None;
        }
        self.done = true;
        self.flush(None)
    }

    /// Release all accumulated tool calls, in index order, as one chunk that
    /// also carries any usage seen so far. With neither pending, nothing is
    /// emitted.
    fn flush(&mut self, finish_reason: Option<&str>) -> Option<GenerateContentResponse> {
        let usage = self.usage.take();
        if self.tool_calls.is_empty() {
            let mut response = self.response(Vec::new(), None);
            response.usage_metadata = Some(usage?);
            return Some(response);
        }

        let parts: Vec<Part> = std::mem::take(&mut self.tool_calls)
            .into_iter()
            .map(|(index, acc)| Part::function_call(acc.into_function_call(index)))
            .collect();

        let reason = finish_reason.map_or_else(|| "STOP".to_string(), map_finish_reason);
        let mut response = self.response(parts, Some(reason));
        response.usage_metadata = usage;
        Some(response)
    }

    fn response(&self, parts: Vec<Part>, finish_reason: Option<String>) -> GenerateContentResponse {
        let mut response = GenerateContentResponse::from_parts(parts, finish_reason);
        response.response_id.clone_from(&self.response_id);
        response.model_version.clone_from(&self.model_version);
        response
    }
}

/// Payload of a `data:` line, if this is one.
fn sse_data(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix("data:").map(str::trim)
}

fn parse_frame(data: &str) -> Result<ChatCompletionChunk> {
    serde_json::from_str(data)
        .map_err(|e| BridgeError::stream_protocol(format!("invalid chunk JSON: {e}")))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data_line(frame: serde_json::Value) -> String {
        format!("data: {frame}")
    }

    fn tool_frame(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> String {
        data_line(json!({
            "choices": [{
                "index": 0,
                "delta": {
                    "tool_calls": [{
                        "index": index,
                        "id": id,
                        "function": {"name": name, "arguments": args}
                    }]
                },
                "finish_reason": null
            }]
        }))
    }

    fn text_frame(text: &str) -> String {
        data_line(json!({
            "id": "c1",
            "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
        }))
    }

    #[test]
    fn test_line_buffer_keeps_partial_lines() {
        let mut lines = LineBuffer::new();
        lines.push(b"data: {\"a\"");
        assert_eq!(lines.next_line(), None);

        lines.push(b":1}\r\n\ndata: [DO");
        assert_eq!(lines.next_line().as_deref(), Some("data: {\"a\":1}"));
        assert_eq!(lines.next_line().as_deref(), Some(""));
        assert_eq!(lines.next_line(), None);

        lines.push(b"NE]");
        assert_eq!(lines.take_remainder().as_deref(), Some("data: [DONE]"));
        assert_eq!(lines.take_remainder(), None);
    }

    #[test]
    fn test_line_buffer_split_multibyte_char() {
        let bytes = "data: héllo\n".as_bytes();
        let mut lines = LineBuffer::new();
        lines.push(&bytes[..8]);
        lines.push(&bytes[8..]);
        assert_eq!(lines.next_line().as_deref(), Some("data: héllo"));
    }

    #[test]
    fn test_text_deltas_are_emitted_immediately() {
        let mut reconstructor = StreamReconstructor::new();

        let chunks = reconstructor.process_line(&text_frame("Hel"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text(), "Hel");

        let chunks = reconstructor.process_line(&text_frame("lo"));
        assert_eq!(chunks[0].text(), "lo");
        assert!(chunks[0].finish_reason().is_none());
    }

    #[test]
    fn test_argument_fragments_are_joined() {
        let mut reconstructor = StreamReconstructor::new();
        assert!(reconstructor
            .process_line(&tool_frame(0, Some("call_a"), Some("calc"), r#"{"a":1"#))
            .is_empty());
        assert!(reconstructor
            .process_line(&tool_frame(0, None, None, "}"))
            .is_empty());

        let chunks = reconstructor.process_line("data: [DONE]");
        assert_eq!(chunks.len(), 1);
        let calls = chunks[0].function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id.as_deref(), Some("call_a"));
        assert_eq!(calls[0].name, "calc");
        assert_eq!(calls[0].args, json!({"a": 1}));
        assert!(reconstructor.is_done());
    }

    #[test]
    fn test_flush_orders_by_index() {
        let mut reconstructor = StreamReconstructor::new();
        reconstructor.process_line(&tool_frame(1, Some("call_b"), Some("second"), "{}"));
        reconstructor.process_line(&tool_frame(0, Some("call_a"), Some("first"), "{}"));

        let chunks = reconstructor.process_line("data: [DONE]");
        let names: Vec<&str> = chunks[0]
            .function_calls()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_sentinel_without_tool_calls_flushes_nothing() {
        let mut reconstructor = StreamReconstructor::new();
        reconstructor.process_line(&text_frame("hi"));
        assert!(reconstructor.process_line("data: [DONE]").is_empty());
        assert!(reconstructor.process_line(&text_frame("late")).is_empty());
        assert!(reconstructor.finish().is_none());
    }

    #[test]
    fn test_id_and_name_are_never_overwritten() {
        let mut reconstructor = StreamReconstructor::new();
        reconstructor.process_line(&tool_frame(0, Some("call_first"), Some("ls"), ""));
        reconstructor.process_line(&tool_frame(0, Some("call_other"), Some("rm"), "{}"));

        let chunk = reconstructor.finish().unwrap();
        let calls = chunk.function_calls();
        assert_eq!(calls[0].id.as_deref(), Some("call_first"));
        assert_eq!(calls[0].name, "ls");
    }

    #[test]
    fn test_missing_index_and_id_are_defaulted() {
        let mut reconstructor = StreamReconstructor::new();
        let frame = data_line(json!({
            "choices": [{"delta": {"tool_calls": [{"function": {"name": "pwd"}}]}}]
        }));
        reconstructor.process_line(&frame);

        let chunk = reconstructor.finish().unwrap();
        let calls = chunk.function_calls();
        assert_eq!(calls[0].id.as_deref(), Some("call_0"));
        assert_eq!(calls[0].args, json!({}));
        assert_eq!(chunk.finish_reason(), Some("STOP"));
    }

    #[test]
    fn test_finish_reason_flushes_before_sentinel() {
        let mut reconstructor = StreamReconstructor::new();
        reconstructor.process_line(&tool_frame(0, Some("call_a"), Some("calc"), "{}"));

        let finish = data_line(json!({
            "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]
        }));
        let chunks = reconstructor.process_line(&finish);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].finish_reason(), Some("TOOL_CALLS"));

        // Already flushed: the sentinel adds nothing
        assert!(reconstructor.process_line("data: [DONE]").is_empty());
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let mut reconstructor = StreamReconstructor::new();
        assert!(reconstructor.process_line("data: {not json").is_empty());
        assert!(!reconstructor.is_done());

        let chunks = reconstructor.process_line(&text_frame("still here"));
        assert_eq!(chunks[0].text(), "still here");
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let mut reconstructor = StreamReconstructor::new();
        assert!(reconstructor.process_line(": keep-alive").is_empty());
        assert!(reconstructor.process_line("event: message").is_empty());
        assert!(reconstructor.process_line("data:").is_empty());
        assert!(reconstructor.process_line("").is_empty());
        assert!(!reconstructor.is_done());
    }

    #[test]
    fn test_exhaustion_flushes_partial_tool_call() {
        let mut reconstructor = StreamReconstructor::new();
        reconstructor.process_line(&tool_frame(0, Some("call_a"), Some("write"), r#"{"path":"#));

        let chunk = reconstructor.finish().unwrap();
        let calls = chunk.function_calls();
        assert_eq!(calls[0].args["raw_arguments"], r#"{"path":"#);
        assert!(reconstructor.finish().is_none());
    }

    #[test]
    fn test_reasoning_delta_is_a_thought_chunk() {
        let mut reconstructor = StreamReconstructor::new();
        let frame = data_line(json!({
            "choices": [{"delta": {"reasoning_content": "hmm", "content": "ok"}}]
        }));
        let chunks = reconstructor.process_line(&frame);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].candidates[0].content.parts[0].thought, Some(true));
        assert_eq!(chunks[1].text(), "ok");
    }

    fn usage_frame(total: u64) -> String {
        data_line(json!({
            "id": "c1",
            "choices": [],
            "usage": {"prompt_tokens": 5, "completion_tokens": total - 5, "total_tokens": total}
        }))
    }

    #[test]
    fn test_usage_frame_rides_on_tool_call_flush() {
        let mut reconstructor = StreamReconstructor::new();
        reconstructor.process_line(&tool_frame(0, Some("call_a"), Some("calc"), "{}"));
        assert!(reconstructor.process_line(&usage_frame(12)).is_empty());

        let chunks = reconstructor.process_line("data: [DONE]");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].function_calls().len(), 1);
        assert_eq!(chunks[0].usage_metadata.as_ref().unwrap().total_token_count, 12);
    }

    #[test]
    fn test_usage_without_tool_calls_is_its_own_chunk() {
        let mut reconstructor = StreamReconstructor::new();
        reconstructor.process_line(&text_frame("hi"));
        reconstructor.process_line(&usage_frame(9));

        let chunk = reconstructor.finish().unwrap();
        assert!(chunk.function_calls().is_empty());
        assert_eq!(chunk.text(), "");
        assert!(chunk.finish_reason().is_none());
        let usage = chunk.usage_metadata.unwrap();
        assert_eq!(usage.prompt_token_count, Some(5));
        assert_eq!(usage.total_token_count, 9);
    }

    #[test]
    fn test_non_string_argument_fragments_are_kept() {
        let mut reconstructor = StreamReconstructor::new();
        let frame = data_line(json!({
            "choices": [{"delta": {
                "content": "calling",
                "tool_calls": [
                    {"index": 0, "id": "call_a", "function": {"name": "ping", "arguments": null}},
                    {"index": 1, "id": "call_b", "function": {"name": "add", "arguments": {"a": 1}}}
                ]
            }}]
        }));

        let chunks = reconstructor.process_line(&frame);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text(), "calling");

        let chunk = reconstructor.finish().unwrap();
        let calls = chunk.function_calls();
        assert_eq!(calls[0].args, json!({}));
        assert_eq!(calls[1].args, json!({"a": 1}));
    }

    #[test]
    fn test_chunks_carry_response_id_and_model() {
        let mut reconstructor = StreamReconstructor::new();
        let frame = data_line(json!({
            "id": "chatcmpl-7",
            "model": "deepseek-chat",
            "choices": [{"delta": {"content": "x"}}]
        }));
        let chunks = reconstructor.process_line(&frame);
        assert_eq!(chunks[0].response_id.as_deref(), Some("chatcmpl-7"));
        assert_eq!(chunks[0].model_version.as_deref(), Some("deepseek-chat"));
    }
}
