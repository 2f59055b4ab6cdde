use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, Choice, ContentPart, EmbeddingRequest,
    EmbeddingResponse, FunctionCall, ImageRequest, ImageResponse, Message, MessageContent, Role,
    SpeechRequest, SpeechResponse, StreamChunk, ToolCall, Usage,
};
use crate::providers::image;
use crate::providers::{
    HealthStatus, Provider, ProviderCapabilities, ProviderConfig, ProviderHealth, StreamResult,
};
use async_stream::stream;
use serde::{Deserialize, Serialize};

use super::http_client::{map_error_response, AuthStrategy, HttpProviderClient};
use std::collections::HashMap;
use std::time::Instant;

pub struct AnthropicProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    response_type: String,
    #[allow(dead_code)]
    role: String,
    content: Vec<AnthropicContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let mut headers = config.headers.clone();
        headers.insert("anthropic-version".to_string(), "2023-06-01".to_string());
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://api.anthropic.com",
            &headers,
            AuthStrategy::Header {
                name: "x-api-key".to_string(),
                value: config.api_key.clone(),
            },
        )?;

        Ok(Self { http, config })
    }

    fn map_model(&self, model: &str) -> String {
        self.config
            .model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| match model {
                "claude-3" | "claude" => "claude-3-5-sonnet-20241022".to_string(),
                "claude-3-opus" => "claude-opus-4-20250514".to_string(),
                "claude-3-sonnet" => "claude-3-5-sonnet-20241022".to_string(),
                "claude-3-haiku" => "claude-3-5-haiku-20241022".to_string(),
                "claude-4-opus" => "claude-opus-4-20250514".to_string(),
                "claude-4-sonnet" => "claude-sonnet-4-20250514".to_string(),
                _ => model.to_string(),
            })
    }

    /// Splits a normalized request into Anthropic's top-level `system` plus
    /// an ordered `user`/`assistant` message list. Only the latest system
    /// message survives; earlier ones are discarded rather than concatenated,
    /// matching how the adapter is actually called (at most one system turn
    /// per request in practice).
    async fn convert_messages(
        &self,
        messages: Vec<Message>,
    ) -> Result<(Option<String>, Vec<AnthropicMessage>), ProviderError> {
        let mut system = None;
        let mut out = Vec::with_capacity(messages.len());

        for msg in messages {
            match msg.role {
                Role::System => {
                    system = Some(msg.content.as_text());
                }
                Role::User => {
                    out.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: self.convert_content(&msg.content).await?,
                    });
                }
                Role::Assistant => {
                    let mut blocks = self.convert_content(&msg.content).await?;
                    if let Some(tool_calls) = &msg.tool_calls {
                        for call in tool_calls {
                            let input = serde_json::from_str(&call.function.arguments)
                                .unwrap_or(serde_json::Value::Null);
                            blocks.push(AnthropicContentBlock::ToolUse {
                                id: call.id.clone(),
                                name: call.function.name.clone(),
                                input,
                            });
                        }
                    }
                    out.push(AnthropicMessage {
                        role: "assistant".to_string(),
                        content: blocks,
                    });
                }
                Role::Tool => {
                    let tool_use_id = msg.tool_call_id.clone().unwrap_or_default();
                    out.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: vec![AnthropicContentBlock::ToolResult {
                            tool_use_id,
                            content: msg.content.as_text(),
                        }],
                    });
                }
            }
        }

        Ok((system, out))
    }

    async fn convert_content(
        &self,
        content: &MessageContent,
    ) -> Result<Vec<AnthropicContentBlock>, ProviderError> {
        match content {
            MessageContent::Text(text) => Ok(vec![AnthropicContentBlock::Text {
                text: text.clone(),
            }]),
            MessageContent::Parts(parts) => {
                let mut blocks = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        ContentPart::Text { text } => {
                            blocks.push(AnthropicContentBlock::Text { text: text.clone() });
                        }
                        ContentPart::ImageUrl { image_url } => {
                            let resolved = image::resolve(&image_url.url).await?;
                            blocks.push(AnthropicContentBlock::Image {
                                source: AnthropicImageSource {
                                    source_type: "base64".to_string(),
                                    media_type: resolved.mime_type.clone(),
                                    data: resolved.to_base64(),
                                },
                            });
                        }
                    }
                }
                Ok(blocks)
            }
        }
    }

    fn convert_response(&self, response: AnthropicResponse) -> ChatResponse {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block {
                AnthropicContentBlock::Text { text: t } => text.push_str(&t),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        call_type: "function".to_string(),
                        function: FunctionCall {
                            name,
                            arguments: input.to_string(),
                        },
                    });
                }
                AnthropicContentBlock::Image { .. } | AnthropicContentBlock::ToolResult { .. } => {}
            }
        }

        let finish_reason = match response.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => Some("stop".to_string()),
            Some("max_tokens") => Some("length".to_string()),
            Some("tool_use") => Some("tool_calls".to_string()),
            other => other.map(|s| s.to_string()),
        };

        ChatResponse {
            id: response.id,
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: response.model,
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: MessageContent::Text(text),
                    name: None,
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                },
                finish_reason,
                logprobs: None,
            }],
            usage: Some(Usage {
                prompt_tokens: response.usage.input_tokens,
                completion_tokens: response.usage.output_tokens,
                total_tokens: response.usage.input_tokens + response.usage.output_tokens,
            }),
            system_fingerprint: None,
            original_model_alias: None,
        }
    }

    fn clamp_params(request: &ChatRequest) -> (Option<f32>, Option<f32>, Option<Vec<String>>) {
        let temperature = crate::params::clamp(request.temperature, crate::params::UNIT_TEMPERATURE_RANGE);
        let top_p = crate::params::clamp(request.top_p, crate::params::TOP_P_RANGE);
        let stop = request
            .stop
            .as_ref()
            .map(|s| crate::params::cap_stop_sequences(s.as_vec(), 5));
        (temperature, top_p, stop)
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "claude-opus-4-20250514".to_string(),
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-7-sonnet-20250219".to_string(),
            "claude-3-5-sonnet-20241022".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
            "claude-3-5-sonnet-20240620".to_string(),
            "claude-3-haiku-20240307".to_string(),
            "claude-3".to_string(),
            "claude".to_string(),
        ]
    }

    fn get_capabilities(&self, model_id: Option<&str>) -> ProviderCapabilities {
        let model = model_id.unwrap_or("");
        // All Claude 3+ models accept image content blocks; see `providers::image`.
        let supports_vision = model.starts_with("claude-3")
            || model.starts_with("claude-sonnet-4")
            || model.starts_with("claude-opus-4")
            || model.is_empty();
        ProviderCapabilities {
            supports_chat: true,
            supports_streaming: true,
            supports_vision,
            supports_function_calling: true,
            max_input_tokens: Some(200_000),
            max_output_tokens: Some(8_192),
            ..ProviderCapabilities::default()
        }
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.map_model(&request.model);
        let (temperature, top_p, stop_sequences) = Self::clamp_params(&request);
        let (system, messages) = self.convert_messages(request.messages).await?;

        let anthropic_request = AnthropicRequest {
            model,
            max_tokens: request.max_tokens.unwrap_or(4096),
            messages,
            system,
            temperature,
            top_p,
            stop_sequences,
            stream: Some(false),
        };

        let anthropic_response: AnthropicResponse = self
            .http
            .post_json("/v1/messages", &anthropic_request)
            .await?;
        Ok(self.convert_response(anthropic_response))
    }

    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        let model = self.map_model(&request.model);
        let (temperature, top_p, stop_sequences) = Self::clamp_params(&request);
        let (system, messages) = self.convert_messages(request.messages).await?;

        let anthropic_request = AnthropicRequest {
            model: model.clone(),
            max_tokens: request.max_tokens.unwrap_or(4096),
            messages,
            system,
            temperature,
            top_p,
            stop_sequences,
            stream: Some(true),
        };

        let response = self
            .http
            .post_json_raw("/v1/messages", &anthropic_request)
            .await?;
        if !response.status().is_success() {
            return Err(map_error_response(response).await);
        }

        let stream = Box::pin(stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut message_id = String::new();

            while let Some(chunk_result) = futures::StreamExt::next(&mut bytes_stream).await {
                match chunk_result {
                    Ok(chunk) => {
                        let chunk_str = String::from_utf8_lossy(&chunk);
                        buffer.push_str(&chunk_str);

                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].trim().to_string();
                            buffer = buffer[line_end + 1..].to_string();

                            let Some(json_str) = line.strip_prefix("data: ") else { continue };

                            match serde_json::from_str::<serde_json::Value>(json_str) {
                                Ok(event) => {
                                    let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");

                                    match event_type {
                                        "message_start" => {
                                            if let Some(id) = event["message"]["id"].as_str() {
                                                message_id = id.to_string();
                                            }
                                        }
                                        "content_block_delta" => {
                                            if let Some(text) = event["delta"]["text"].as_str() {
                                                yield Ok(StreamChunk {
                                                    id: message_id.clone(),
                                                    object: "chat.completion.chunk".to_string(),
                                                    created: chrono::Utc::now().timestamp() as u64,
                                                    model: model.clone(),
                                                    choices: vec![crate::models::StreamChoice {
                                                        index: 0,
                                                        delta: crate::models::Delta {
                                                            role: None,
                                                            content: Some(text.to_string()),
                                                            tool_calls: None,
                                                        },
                                                        finish_reason: None,
                                                    }],
                                                    original_model_alias: None,
                                                });
                                            }
                                        }
                                        "message_stop" => {
                                            yield Ok(StreamChunk {
                                                id: message_id.clone(),
                                                object: "chat.completion.chunk".to_string(),
                                                created: chrono::Utc::now().timestamp() as u64,
                                                model: model.clone(),
                                                choices: vec![crate::models::StreamChoice {
                                                    index: 0,
                                                    delta: crate::models::Delta {
                                                        role: None,
                                                        content: None,
                                                        tool_calls: None,
                                                    },
                                                    finish_reason: Some("stop".to_string()),
                                                }],
                                                original_model_alias: None,
                                            });
                                            return;
                                        }
                                        _ => {}
                                    }
                                }
                                Err(e) => yield Err(ProviderError::Serialization(e)),
                            }
                        }
                    }
                    Err(e) => yield Err(ProviderError::Http(e)),
                }
            }
        });

        Ok(stream)
    }

    async fn embedding(
        &self,
        _request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Anthropic does not support embeddings".to_string(),
        })
    }

    async fn image_generation(
        &self,
        _request: ImageRequest,
    ) -> Result<ImageResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Anthropic does not support image generation".to_string(),
        })
    }

    async fn audio_transcription(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Anthropic does not support audio transcription".to_string(),
        })
    }

    async fn text_to_speech(
        &self,
        _request: SpeechRequest,
    ) -> Result<SpeechResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Anthropic does not support text-to-speech".to_string(),
        })
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let start = Instant::now();

        // Auth-probe trick: a deliberately invalid temperature (2.0, outside
        // Anthropic's accepted [0,1] range) gets a 400 validation error when
        // the key is good, vs. a 401/403 when it isn't. Avoids spending a
        // real completion just to check the key.
        let health_request = AnthropicRequest {
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 1,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: vec![AnthropicContentBlock::Text {
                    text: "ping".to_string(),
                }],
            }],
            system: None,
            temperature: Some(2.0),
            top_p: None,
            stop_sequences: None,
            stream: Some(false),
        };

        let response = self
            .http
            .post_json_raw("/v1/messages", &health_request)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if status == 401 || status == 403 {
                    let mut details = HashMap::new();
                    details.insert("error".to_string(), "invalid api key".to_string());
                    return Ok(ProviderHealth {
                        status: HealthStatus::Unhealthy,
                        latency_ms: Some(latency_ms),
                        error_rate: 1.0,
                        last_check: chrono::Utc::now(),
                        details,
                    });
                }
                Ok(ProviderHealth {
                    status: HealthStatus::Healthy,
                    latency_ms: Some(latency_ms),
                    error_rate: 0.0,
                    last_check: chrono::Utc::now(),
                    details: HashMap::new(),
                })
            }
            Err(e) => {
                let mut details = HashMap::new();
                details.insert("error".to_string(), e.to_string());

                Ok(ProviderHealth {
                    status: HealthStatus::Degraded,
                    latency_ms: Some(latency_ms),
                    error_rate: 1.0,
                    last_check: chrono::Utc::now(),
                    details,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig::new("anthropic", "test-key")
    }

    #[test]
    fn maps_common_model_aliases() {
        let provider = AnthropicProvider::new(config()).unwrap();
        assert_eq!(provider.map_model("claude-3-haiku"), "claude-3-5-haiku-20241022");
        assert_eq!(provider.map_model("claude-opus-4-20250514"), "claude-opus-4-20250514");
    }

    #[test]
    fn clamps_temperature_and_top_p_to_unit_range() {
        let request = ChatRequest {
            temperature: Some(1.9),
            top_p: Some(1.5),
            ..Default::default()
        };
        let (temperature, top_p, _) = AnthropicProvider::clamp_params(&request);
        assert_eq!(temperature, Some(1.0));
        assert_eq!(top_p, Some(1.0));
    }

    #[test]
    fn caps_stop_sequences_at_five() {
        let request = ChatRequest {
            stop: Some(crate::models::StopSequences::from_vec(
                (0..8).map(|i| i.to_string()).collect(),
            )),
            ..Default::default()
        };
        let (_, _, stop) = AnthropicProvider::clamp_params(&request);
        assert_eq!(stop.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn extracts_system_message_to_top_level_field() {
        let provider = AnthropicProvider::new(config()).unwrap();
        let messages = vec![
            Message::system("be terse"),
            Message::user("hello"),
            Message::assistant("hi there"),
        ];
        let (system, converted) = provider.convert_messages(messages).await.unwrap();
        assert_eq!(system.as_deref(), Some("be terse"));
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[1].role, "assistant");
    }

    #[test]
    fn maps_finish_reasons() {
        let provider = AnthropicProvider::new(config()).unwrap();
        let resp = provider.convert_response(AnthropicResponse {
            id: "msg_1".to_string(),
            response_type: "message".to_string(),
            role: "assistant".to_string(),
            content: vec![AnthropicContentBlock::Text { text: "hi".to_string() }],
            model: "claude-3-5-sonnet-20241022".to_string(),
            stop_reason: Some("max_tokens".to_string()),
            usage: AnthropicUsage { input_tokens: 3, output_tokens: 1 },
        });
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("length"));
    }
}
