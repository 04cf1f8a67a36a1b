use super::gemini_types::{FunctionCall, GenerateContentResponse, Part, UsageMetadata};
use super::openai_types::{ChatCompletionResponse, ChatUsage};

/// Key under which unparseable tool-call arguments are passed through.
pub const RAW_ARGUMENTS_KEY: &str = "raw_arguments";

/// Translate an OpenAI Chat Completion response into a generate-content response.
/// Pure function: a single candidate carrying text and function-call parts.
pub fn openai_to_gemini(resp: &ChatCompletionResponse) -> GenerateContentResponse {
    let choice = resp.choices.first();

    let mut parts: Vec<Part> = Vec::new();

    if let Some(c) = choice {
        if let Some(reasoning) = c.message.reasoning_content.as_deref() {
            if !reasoning.is_empty() {
                parts.push(Part::thought(reasoning));
            }
        }

        if let Some(text) = c.message.content.as_deref() {
            if !text.is_empty() {
                parts.push(Part::text(text));
            }
        }

        for (i, tc) in c.message.tool_calls.iter().flatten().enumerate() {
            let id = tc
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{i}"));
            parts.push(Part::function_call(FunctionCall {
                id: Some(id),
                name: tc.function.name.clone(),
                args: parse_arguments(&tc.function.arguments),
            }));
        }
    }

    let finish_reason = choice
        .and_then(|c| c.finish_reason.as_deref())
        .map_or_else(|| "STOP".to_string(), map_finish_reason);

    let mut response = GenerateContentResponse::from_parts(parts, Some(finish_reason));
    response.usage_metadata = resp.usage.as_ref().and_then(map_usage);
    if !resp.id.is_empty() {
        response.response_id = Some(resp.id.clone());
    }
    if !resp.model.is_empty() {
        response.model_version = Some(resp.model.clone());
    }
    response
}

/// Map an OpenAI finish_reason to the calling layer's upper-case form.
pub fn map_finish_reason(reason: &str) -> String {
    reason.to_uppercase()
}

/// Parse a tool-call argument string as a JSON object. Anything that is not an
/// object is wrapped under [`RAW_ARGUMENTS_KEY`] so the call is never lost.
pub fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => serde_json::json!({ RAW_ARGUMENTS_KEY: arguments }),
    }
}

/// Usage is only reported when the provider gave a total.
pub(crate) fn map_usage(usage: &ChatUsage) -> Option<UsageMetadata> {
    usage.total_tokens.map(|total| UsageMetadata {
        prompt_token_count: usage.prompt_tokens,
        candidates_token_count: usage.completion_tokens,
        total_token_count: total,
    })
}
