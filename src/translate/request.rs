//! Translate generate-content requests into `OpenAI` Chat Completions requests.
//!
//! Handles the system instruction, multi-part turns, function responses and
//! tool declarations. A single user turn can expand into multiple `OpenAI`
//! messages (each function response becomes its own `tool`-role message).
//! Only text and function parts survive faithfully; any other part is sent as
//! its JSON serialization.

use super::gemini_types::{FunctionResponse, GenerateContentRequest, Part, Role, Tool};
use super::openai_types::{ChatCompletionRequest, ChatFunction, ChatMessage, ChatTool};

/// Per-call values that do not come from the request itself.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub model: String,
    pub temperature_override: Option<f64>,
    pub call_id: String,
    pub stream: bool,
}

/// Translate a generate-content request into an `OpenAI` Chat Completions request.
/// Pure function: takes the request + per-call options, returns the translated request.
pub fn gemini_to_openai(
    req: &GenerateContentRequest,
    options: &TranslateOptions,
) -> ChatCompletionRequest {
    let tools = req.config.tools.as_deref().and_then(translate_tools);
    let tool_choice = tools.as_ref().map(|_| "auto".to_string());

    ChatCompletionRequest {
        model: options.model.clone(),
        messages: translate_messages(req),
        tools,
        tool_choice,
        temperature: options.temperature_override.or(req.config.temperature),
        top_p: req.config.top_p,
        max_tokens: req.config.max_output_tokens,
        stop: req.config.stop_sequences.clone(),
        stream: options.stream.then_some(true),
        user: options.call_id.clone(),
    }
}

/// The ordered message list, system instruction first when it has any text.
pub fn translate_messages(req: &GenerateContentRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    if let Some(system) = req
        .config
        .system_instruction
        .as_ref()
        .and_then(|s| s.as_text())
    {
        messages.push(ChatMessage::system(system));
    }

    for content in &req.contents {
        match content.role.unwrap_or(Role::User) {
            Role::Model => messages.push(ChatMessage::assistant(flatten_model_parts(
                &content.parts,
            ))),
            Role::User | Role::Function => translate_user_turn(&content.parts, &mut messages),
        }
    }

    messages
}

/// Flattened declarations; nameless ones are dropped and an empty result is `None`.
pub fn translate_tools(tools: &[Tool]) -> Option<Vec<ChatTool>> {
    let translated: Vec<ChatTool> = tools
        .iter()
        .flat_map(|t| t.function_declarations.iter().flatten())
        .filter_map(|decl| {
            let name = decl.name.as_ref().filter(|n| !n.is_empty())?;
            Some(ChatTool {
                tool_type: "function".to_string(),
                function: ChatFunction {
                    name: name.clone(),
                    description: decl.description.clone(),
                    parameters: decl
                        .parameters
                        .clone()
                        .or_else(|| decl.parameters_json_schema.clone()),
                },
            })
        })
        .collect();

    if translated.is_empty() {
        None
    } else {
        Some(translated)
    }
}

fn translate_user_turn(parts: &[Part], messages: &mut Vec<ChatMessage>) {
    let start = messages.len();
    let mut text = String::new();
    let mut pending_text = false;

    for part in parts {
        if let Some(response) = &part.function_response {
            // Flush any accumulated text as a user message first
            if pending_text {
                messages.push(ChatMessage::user(std::mem::take(&mut text)));
                pending_text = false;
            }
            messages.push(ChatMessage::tool(
                tool_call_id(response),
                tool_output(response),
            ));
        } else {
            text.push_str(&part_text(part));
            pending_text = true;
        }
    }

    // An empty turn still produces an (empty) user message
    if pending_text || messages.len() == start {
        messages.push(ChatMessage::user(text));
    }
}

fn flatten_model_parts(parts: &[Part]) -> String {
    parts
        .iter()
        .filter(|p| p.function_call.is_none() && p.thought != Some(true))
        .map(part_text)
        .collect()
}

fn part_text(part: &Part) -> String {
    match &part.text {
        Some(text) => text.clone(),
        None => serde_json::to_string(part).unwrap_or_default(),
    }
}

fn tool_call_id(response: &FunctionResponse) -> String {
    if let Some(id) = response.id.as_ref().filter(|id| !id.is_empty()) {
        return id.clone();
    }
    let name = if response.name.is_empty() {
        "tool"
    } else {
        response.name.as_str()
    };
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{name}_{}", &suffix[..12])
}

fn tool_output(response: &FunctionResponse) -> String {
    match response.response.get("output").and_then(|o| o.as_str()) {
        Some(output) => output.to_string(),
        None => serde_json::to_string(&response.response).unwrap_or_default(),
    }
}
