use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, ContentPart, EmbeddingRequest,
    EmbeddingResponse, ImageRequest, ImageResponse, Message, MessageContent, Role, SpeechRequest,
    SpeechResponse, StreamChunk, Usage,
};
use crate::providers::image;
use crate::providers::{HealthStatus, Provider, ProviderConfig, ProviderHealth, StreamResult};
use async_stream::stream;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Instant;

pub struct GeminiProvider {
    client: Client,
    config: ProviderConfig,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration {
                message: "Gemini requires a non-empty api key".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Gemini authenticates via an API key in the URL query string; an
    /// `Authorization` header would be silently ignored by the API but we
    /// build the request from scratch so there's nothing to clear.
    fn build_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Content-Type", "application/json".parse().unwrap());
        for (key, value) in &self.config.headers {
            if let (Ok(header_name), Ok(header_value)) =
                (key.parse::<reqwest::header::HeaderName>(), value.parse())
            {
                headers.insert(header_name, header_value);
            }
        }
        headers
    }

    fn map_model(&self, model: &str) -> String {
        self.config
            .model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status();

        match response.text().await {
            Ok(body) => {
                if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(&body) {
                    let message = error_json
                        .get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .unwrap_or("Unknown API error")
                        .to_string();

                    match status.as_u16() {
                        400 | 401 | 403 => ProviderError::InvalidApiKey,
                        404 => ProviderError::ModelNotFound {
                            model: "unknown".to_string(),
                        },
                        429 => ProviderError::RateLimit,
                        500 => ProviderError::ServiceUnavailable,
                        _ => ProviderError::Api {
                            code: status.as_u16(),
                            message,
                        },
                    }
                } else {
                    ProviderError::Api {
                        code: status.as_u16(),
                        message: body,
                    }
                }
            }
            Err(_) => ProviderError::Api {
                code: status.as_u16(),
                message: "Failed to read error response".to_string(),
            },
        }
    }

    async fn convert_content(&self, content: &MessageContent) -> Result<Vec<GeminiPart>, ProviderError> {
        match content {
            MessageContent::Text(text) => Ok(vec![GeminiPart {
                text: Some(text.clone()),
                inline_data: None,
            }]),
            MessageContent::Parts(parts) => {
                let mut out = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        ContentPart::Text { text } => out.push(GeminiPart {
                            text: Some(text.clone()),
                            inline_data: None,
                        }),
                        ContentPart::ImageUrl { image_url } => {
                            let resolved = image::resolve(&image_url.url).await?;
                            out.push(GeminiPart {
                                text: None,
                                inline_data: Some(GeminiInlineData {
                                    mime_type: resolved.mime_type.clone(),
                                    data: resolved.to_base64(),
                                }),
                            });
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// `system` has no dedicated slot on the `generateContent` wire shape:
    /// it's prepended as an extra `user` turn ahead of the real messages.
    async fn convert_to_gemini_format(
        &self,
        request: &ChatRequest,
    ) -> Result<GeminiRequest, ProviderError> {
        let mut contents = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            match message.role {
                Role::System => {
                    contents.push(GeminiContent {
                        role: "user".to_string(),
                        parts: self.convert_content(&message.content).await?,
                    });
                }
                Role::User | Role::Tool => {
                    contents.push(GeminiContent {
                        role: "user".to_string(),
                        parts: self.convert_content(&message.content).await?,
                    });
                }
                Role::Assistant => {
                    contents.push(GeminiContent {
                        role: "model".to_string(),
                        parts: self.convert_content(&message.content).await?,
                    });
                }
            }
        }

        let generation_config = GeminiGenerationConfig {
            temperature: crate::params::clamp(request.temperature, crate::params::UNIT_TEMPERATURE_RANGE),
            max_output_tokens: request.max_tokens.map(|t| t as i32),
            top_p: crate::params::clamp(request.top_p, crate::params::TOP_P_RANGE),
            top_k: request.top_k.map(|k| k as i32),
            stop_sequences: request.stop.as_ref().map(|s| s.as_vec()),
        };

        Ok(GeminiRequest {
            contents,
            generation_config: Some(generation_config),
        })
    }

    fn convert_from_gemini_format(
        &self,
        response: GeminiResponse,
        model: &str,
    ) -> Result<ChatResponse, ProviderError> {
        let mut choices = Vec::new();

        for (index, candidate) in response.candidates.iter().enumerate() {
            let content = candidate
                .content
                .parts
                .iter()
                .filter_map(|part| part.text.clone())
                .collect::<Vec<String>>()
                .join("");

            let finish_reason = map_finish_reason(candidate.finish_reason.as_deref());

            // SAFETY is a fatal condition on the non-streaming path, not just
            // an unusual finish reason: surface it as a typed error instead
            // of an empty "successful" completion.
            if candidate.finish_reason.as_deref() == Some("SAFETY") {
                return Err(ProviderError::ValidationError {
                    field: "content".to_string(),
                    message: "Gemini blocked the response for safety reasons".to_string(),
                });
            }

            choices.push(crate::models::Choice {
                index: index as u32,
                message: Message {
                    role: Role::Assistant,
                    content: MessageContent::Text(content),
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                },
                finish_reason,
                logprobs: None,
            });
        }

        let usage = response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ChatResponse {
            id: uuid::Uuid::new_v4().to_string(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: model.to_string(),
            choices,
            usage,
            system_fingerprint: None,
            original_model_alias: None,
        })
    }

    fn convert_to_gemini_embedding_format(
        &self,
        request: EmbeddingRequest,
    ) -> GeminiEmbeddingRequest {
        let text = match &request.input {
            crate::models::EmbeddingInput::String(s) => s.clone(),
            crate::models::EmbeddingInput::StringArray(arr) => arr.join(" "),
            crate::models::EmbeddingInput::TokenArray(_) => String::new(),
            crate::models::EmbeddingInput::TokenArrayArray(_) => String::new(),
        };

        GeminiEmbeddingRequest {
            content: Some(GeminiEmbeddingContent {
                parts: vec![GeminiEmbeddingPart { text }],
            }),
        }
    }

    fn convert_from_gemini_embedding_format(
        &self,
        response: GeminiEmbeddingResponse,
        model: &str,
    ) -> EmbeddingResponse {
        EmbeddingResponse {
            object: "list".to_string(),
            data: vec![crate::models::Embedding {
                object: "embedding".to_string(),
                embedding: response.embedding.values,
                index: 0,
            }],
            model: model.to_string(),
            usage: Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            },
        }
    }
}

/// `STOP→stop, MAX_TOKENS→length, SAFETY→content_filter, RECITATION→content_filter, OTHER→null`.
fn map_finish_reason(reason: Option<&str>) -> Option<String> {
    match reason {
        Some("STOP") => Some("stop".to_string()),
        Some("MAX_TOKENS") => Some("length".to_string()),
        Some("SAFETY") | Some("RECITATION") => Some("content_filter".to_string()),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        false
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "gemini-1.5-pro".to_string(),
            "gemini-1.5-pro-latest".to_string(),
            "gemini-1.5-flash".to_string(),
            "gemini-1.5-flash-latest".to_string(),
            "gemini-1.0-pro".to_string(),
            "gemini-1.0-pro-vision".to_string(),
        ]
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.map_model(&request.model);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.config.api_key
        );
        let headers = self.build_headers();
        let gemini_request = self.convert_to_gemini_format(&request).await?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&gemini_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let gemini_response: GeminiResponse = response.json().await?;
        self.convert_from_gemini_format(gemini_response, &model)
    }

    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        let model = self.map_model(&request.model);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, self.config.api_key
        );
        let headers = self.build_headers();
        let gemini_request = self.convert_to_gemini_format(&request).await?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&gemini_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let stream_id = uuid::Uuid::new_v4().to_string();

        let stream = Box::pin(stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = futures::StreamExt::next(&mut bytes_stream).await {
                match chunk_result {
                    Ok(chunk) => {
                        let chunk_str = String::from_utf8_lossy(&chunk);
                        buffer.push_str(&chunk_str);

                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].trim().to_string();
                            buffer = buffer[line_end + 1..].to_string();

                            let Some(json_str) = line.strip_prefix("data: ") else { continue };
                            if json_str.is_empty() {
                                continue;
                            }

                            match serde_json::from_str::<GeminiResponse>(json_str) {
                                Ok(gemini_chunk) => {
                                    for candidate in &gemini_chunk.candidates {
                                        let text = candidate.content.parts.iter()
                                            .filter_map(|p| p.text.clone())
                                            .collect::<Vec<_>>()
                                            .join("");
                                        let finish_reason = map_finish_reason(candidate.finish_reason.as_deref());

                                        if !text.is_empty() || finish_reason.is_some() {
                                            yield Ok(StreamChunk {
                                                id: stream_id.clone(),
                                                object: "chat.completion.chunk".to_string(),
                                                created: chrono::Utc::now().timestamp() as u64,
                                                model: model.clone(),
                                                choices: vec![crate::models::StreamChoice {
                                                    index: 0,
                                                    delta: crate::models::Delta {
                                                        role: None,
                                                        content: if text.is_empty() { None } else { Some(text) },
                                                        tool_calls: None,
                                                    },
                                                    finish_reason,
                                                }],
                                                original_model_alias: None,
                                            });
                                        }
                                    }
                                }
                                Err(_) => continue,
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
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        let model = self.map_model(&request.model);
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, model, self.config.api_key
        );
        let headers = self.build_headers();
        let gemini_request = self.convert_to_gemini_embedding_format(request);

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&gemini_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let gemini_response: GeminiEmbeddingResponse = response.json().await?;
        Ok(self.convert_from_gemini_embedding_format(gemini_response, &model))
    }

    async fn image_generation(
        &self,
        _request: ImageRequest,
    ) -> Result<ImageResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Image generation not supported by Gemini".to_string(),
        })
    }

    async fn audio_transcription(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Audio transcription not supported by Gemini".to_string(),
        })
    }

    async fn text_to_speech(
        &self,
        _request: SpeechRequest,
    ) -> Result<SpeechResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Text-to-speech not supported by Gemini".to_string(),
        })
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let start = Instant::now();

        let url = format!("{}/models?key={}", self.base_url, self.config.api_key);
        let headers = self.build_headers();

        let response = self.client.get(&url).headers(headers).send().await?;

        let latency = start.elapsed();
        let is_healthy = response.status().is_success();

        let mut details = HashMap::new();
        details.insert("status".to_string(), response.status().to_string());

        Ok(ProviderHealth {
            status: if is_healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            latency_ms: Some(latency.as_millis() as u64),
            error_rate: if is_healthy { 0.0 } else { 1.0 },
            last_check: chrono::Utc::now(),
            details,
        })
    }
}

#[derive(serde::Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(serde::Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(serde::Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(serde::Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(serde::Deserialize)]
struct GeminiUsage {
    prompt_token_count: u32,
    candidates_token_count: u32,
    total_token_count: u32,
}

#[derive(serde::Serialize)]
struct GeminiEmbeddingRequest {
    content: Option<GeminiEmbeddingContent>,
}

#[derive(serde::Serialize)]
struct GeminiEmbeddingContent {
    parts: Vec<GeminiEmbeddingPart>,
}

#[derive(serde::Serialize)]
struct GeminiEmbeddingPart {
    text: String,
}

#[derive(serde::Deserialize)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbedding,
}

#[derive(serde::Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig::new("gemini", "test-key")
    }

    #[test]
    fn rejects_empty_api_key() {
        let mut cfg = config();
        cfg.api_key = String::new();
        assert!(GeminiProvider::new(cfg).is_err());
    }

    #[test]
    fn maps_finish_reasons() {
        assert_eq!(map_finish_reason(Some("STOP")), Some("stop".to_string()));
        assert_eq!(map_finish_reason(Some("MAX_TOKENS")), Some("length".to_string()));
        assert_eq!(map_finish_reason(Some("SAFETY")), Some("content_filter".to_string()));
        assert_eq!(map_finish_reason(Some("RECITATION")), Some("content_filter".to_string()));
        assert_eq!(map_finish_reason(Some("OTHER")), None);
        assert_eq!(map_finish_reason(None), None);
    }

    #[tokio::test]
    async fn prepends_system_message_as_user_turn() {
        let provider = GeminiProvider::new(config()).unwrap();
        let request = ChatRequest {
            model: "gemini-1.5-pro".to_string(),
            messages: vec![
                Message::system("be terse"),
                Message::user("hello"),
                Message::assistant("hi"),
            ],
            ..Default::default()
        };
        let converted = provider.convert_to_gemini_format(&request).await.unwrap();
        assert_eq!(converted.contents.len(), 3);
        assert_eq!(converted.contents[0].role, "user");
        assert_eq!(converted.contents[1].role, "user");
        assert_eq!(converted.contents[2].role, "model");
    }

    #[test]
    fn safety_finish_is_fatal_on_non_streaming_path() {
        let provider = GeminiProvider::new(config()).unwrap();
        let response = GeminiResponse {
            candidates: vec![GeminiCandidate {
                content: GeminiContent {
                    role: "model".to_string(),
                    parts: vec![],
                },
                finish_reason: Some("SAFETY".to_string()),
            }],
            usage_metadata: None,
        };
        assert!(provider.convert_from_gemini_format(response, "gemini-1.5-pro").is_err());
    }
}
