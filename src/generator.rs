//! The content-generator facade over an OpenAI-compatible backend.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::logging::CallLog;
use crate::providers::ResolvedProvider;
use crate::stream::{reconstruct_stream, ResponseStream};
use crate::translate::gemini_types::{
    CountTokensRequest, CountTokensResponse, EmbedContentRequest, EmbedContentResponse,
    GenerateContentRequest, GenerateContentResponse,
};
use crate::translate::openai_types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatErrorResponse,
};
use crate::translate::request::{gemini_to_openai, TranslateOptions};
use crate::translate::response::openai_to_gemini;

/// Uniform entry point the calling layer talks to, whatever the backend.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
        call_id: &str,
    ) -> Result<GenerateContentResponse>;

    async fn generate_content_stream(
        &self,
        request: &GenerateContentRequest,
        call_id: &str,
    ) -> Result<ResponseStream>;

    async fn count_tokens(&self, request: &CountTokensRequest) -> Result<CountTokensResponse>;

    async fn embed_content(&self, request: &EmbedContentRequest) -> Result<EmbedContentResponse>;
}

/// Generator for DeepSeek and other chat-completions endpoints.
///
/// Token counting and embeddings are not available on this backend family;
/// callers are expected to have their own fallback for both.
#[derive(Clone)]
pub struct CompatContentGenerator {
    provider: ResolvedProvider,
    client: reqwest::Client,
    call_log: Option<CallLog>,
}

impl CompatContentGenerator {
    pub fn new(provider: ResolvedProvider, client: reqwest::Client) -> Self {
        Self {
            provider,
            client,
            call_log: None,
        }
    }

    /// Resolve the provider and build an HTTP client with the configured timeout.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let provider = ResolvedProvider::resolve(config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::new(provider, client))
    }

    #[must_use]
    pub fn with_call_log(mut self, call_log: CallLog) -> Self {
        self.call_log = Some(call_log);
        self
    }

    pub fn provider(&self) -> &ResolvedProvider {
        &self.provider
    }

    /// Capability and credential checks, then translation. No I/O happens here.
    fn prepare(
        &self,
        request: &GenerateContentRequest,
        call_id: &str,
        stream: bool,
    ) -> Result<(String, &str, ChatCompletionRequest)> {
        let url = self
            .provider
            .chat_completions_url()
            .ok_or(BridgeError::ProviderInactive {
                provider: self.provider.kind().name(),
            })?;
        let api_key = self.provider.api_key_or_fail()?;

        let options = TranslateOptions {
            model: self.provider.model(&request.model),
            temperature_override: self.provider.temperature_override(),
            call_id: call_id.to_string(),
            stream,
        };

        Ok((url, api_key, gemini_to_openai(request, &options)))
    }

    /// POST the request and fail on any non-2xx status with the body verbatim.
    async fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &ChatCompletionRequest,
        call_id: &str,
        abort: Option<&CancellationToken>,
    ) -> Result<reqwest::Response> {
        let send = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(body)
            .send();
        let response = with_abort(abort, send).await??;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = with_abort(abort, response.text()).await??;
        let message = serde_json::from_str::<ChatErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| truncate(&body, 300).to_string());

        tracing::warn!(call_id, status = status.as_u16(), %message, "Provider error");
        self.log_warn(call_id, format!("Provider error status={}: {}", status.as_u16(), message));

        Err(BridgeError::UpstreamHttp {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }

    fn log_info(&self, call_id: &str, message: impl Into<String>) {
        if let Some(log) = &self.call_log {
            log.info(call_id, "generator", message);
        }
    }

    fn log_warn(&self, call_id: &str, message: impl Into<String>) {
        if let Some(log) = &self.call_log {
            log.warn(call_id, "generator", message);
        }
    }
}

#[async_trait]
impl ContentGenerator for CompatContentGenerator {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
        call_id: &str,
    ) -> Result<GenerateContentResponse> {
        let (url, api_key, body) = self.prepare(request, call_id, false)?;
        let abort = request.config.abort_signal.as_ref();

        tracing::info!(call_id, %url, model = %body.model, "POST chat completion");
        self.log_info(call_id, format!("POST {} model={}", url, body.model));

        let response = self.post(&url, api_key, &body, call_id, abort).await?;
        let text = with_abort(abort, response.text()).await??;

        let completion: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            let message = format!(
                "Failed to parse provider response: {}. Body: {}",
                e,
                truncate(&text, 300)
            );
            if let Some(log) = &self.call_log {
                log.error(call_id, "generator", message.clone());
            }
            BridgeError::translation(message)
        })?;

        let result = openai_to_gemini(&completion);

        if let Some(usage) = &result.usage_metadata {
            self.log_info(
                call_id,
                format!("Completed: total={} tokens", usage.total_token_count),
            );
        }

        Ok(result)
    }

    async fn generate_content_stream(
        &self,
        request: &GenerateContentRequest,
        call_id: &str,
    ) -> Result<ResponseStream> {
        let (url, api_key, body) = self.prepare(request, call_id, true)?;
        let abort = request.config.abort_signal.as_ref();

        tracing::info!(call_id, %url, model = %body.model, "POST chat completion (streaming)");
        self.log_info(call_id, format!("POST {} model={} (streaming)", url, body.model));

        let response = self.post(&url, api_key, &body, call_id, abort).await?;

        let chunks = reconstruct_stream(
            response.bytes_stream(),
            abort.cloned(),
            call_id.to_string(),
        );

        Ok(ResponseStream::new(chunks, call_id))
    }

    async fn count_tokens(&self, _request: &CountTokensRequest) -> Result<CountTokensResponse> {
        Err(BridgeError::unsupported("countTokens"))
    }

    async fn embed_content(&self, _request: &EmbedContentRequest) -> Result<EmbedContentResponse> {
        Err(BridgeError::unsupported("embedContent"))
    }
}

/// Race `fut` against the caller's abort signal.
async fn with_abort<F: Future>(abort: Option<&CancellationToken>, fut: F) -> Result<F::Output> {
    match abort {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(BridgeError::TransportAbort),
            out = fut => Ok(out),
        },
        None => Ok(fut.await),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::gemini_types::Content;

    fn generator(vars: &[(&str, &str)]) -> CompatContentGenerator {
        let config = BridgeConfig::default().with_env_vars(
            vars.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        );
        CompatContentGenerator::from_config(&config).unwrap()
    }

    fn request() -> GenerateContentRequest {
        GenerateContentRequest {
            model: "deepseek-chat".to_string(),
            contents: vec![Content::user("hi")],
            ..GenerateContentRequest::default()
        }
    }

    #[tokio::test]
    async fn test_inactive_provider_fails_without_io() {
        let gen = generator(&[("LLM_PROVIDER", "gemini"), ("DEEPSEEK_API_KEY", "d")]);
        let err = gen.generate_content(&request(), "p-1").await.unwrap_err();
        assert!(matches!(err, BridgeError::ProviderInactive { provider: "gemini" }));

        let err = gen.generate_content_stream(&request(), "p-1").await.err().unwrap();
        assert!(matches!(err, BridgeError::ProviderInactive { .. }));
    }

    #[tokio::test]
    async fn test_counting_and_embedding_always_fail() {
        for gen in [
            generator(&[("DEEPSEEK_API_KEY", "d")]),
            generator(&[("LLM_PROVIDER", "vertex-ai")]),
        ] {
            let err = gen
                .count_tokens(&CountTokensRequest::default())
                .await
                .unwrap_err();
            assert!(matches!(err, BridgeError::UnsupportedOperation { .. }));

            let err = gen
                .embed_content(&EmbedContentRequest::default())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                BridgeError::UnsupportedOperation {
                    operation: "embedContent"
                }
            ));
        }
    }

    #[test]
    fn test_prepare_builds_wire_request() {
        let gen = generator(&[("DEEPSEEK_API_KEY", "sk-1")]);
        let (url, key, body) = gen.prepare(&request(), "p-7", true).unwrap();
        assert_eq!(url, "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(key, "sk-1");
        assert_eq!(body.model, "deepseek-chat");
        assert_eq!(body.user, "p-7");
        assert_eq!(body.stream, Some(true));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
