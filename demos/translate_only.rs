//! Run the translation layer offline, with no provider or network.
//!
//! Usage:
//!   `cargo run --example translate_only`

use compat_bridge::translate::gemini_types::{
    Content, FunctionDeclaration, GenerateContentConfig, GenerateContentRequest, Part,
    SystemInstruction, Tool,
};
use compat_bridge::translate::openai_types::ChatCompletionResponse;
use compat_bridge::translate::request::{gemini_to_openai, TranslateOptions};
use compat_bridge::translate::response::openai_to_gemini;
use compat_bridge::translate::streaming::StreamReconstructor;
use serde_json::json;

fn main() -> anyhow::Result<()> {
    let request = GenerateContentRequest {
        model: "gemini-2.5-pro".to_string(),
        contents: vec![
            Content::user("What is the capital of France?"),
            Content::model(vec![Part::text("The capital of France is Paris.")]),
            Content::user("And the weather there?"),
        ],
        config: GenerateContentConfig {
            system_instruction: Some(SystemInstruction::Text(
                "You are a geography expert. Be concise.".to_string(),
            )),
            tools: Some(vec![Tool {
                function_declarations: Some(vec![FunctionDeclaration {
                    name: Some("get_weather".to_string()),
                    description: Some("Current weather for a city".to_string()),
                    parameters: Some(json!({
                        "type": "object",
                        "properties": {"city": {"type": "string"}}
                    })),
                    parameters_json_schema: None,
                }]),
            }]),
            temperature: Some(0.7),
            ..GenerateContentConfig::default()
        },
    };

    let options = TranslateOptions {
        model: "deepseek-chat".to_string(),
        temperature_override: None,
        call_id: "demo-1".to_string(),
        stream: true,
    };
    let wire = gemini_to_openai(&request, &options);

    println!("=== Chat completions request ===");
    println!("{}", serde_json::to_string_pretty(&wire)?);

    let completion: ChatCompletionResponse = serde_json::from_value(json!({
        "id": "chatcmpl-demo",
        "model": "deepseek-chat",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Berlin is the capital of Germany."},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 8, "total_tokens": 50}
    }))?;

    println!();
    println!("=== Generate-content response ===");
    println!("{}", serde_json::to_string_pretty(&openai_to_gemini(&completion))?);

    println!();
    println!("=== Stream reconstruction ===");
    let lines = [
        r#"data: {"choices":[{"delta":{"content":"Checking"}}]}"#,
        r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_w","function":{"name":"get_weather","arguments":"{\"city\":"}}]}}]}"#,
        r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Paris\"}"}}]}}]}"#,
        "data: [DONE]",
    ];

    let mut reconstructor = StreamReconstructor::new();
    for line in lines {
        for chunk in reconstructor.process_line(line) {
            println!("{}", serde_json::to_string(&chunk)?);
        }
    }

    Ok(())
}
