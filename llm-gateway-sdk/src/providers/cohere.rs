use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, Choice, Delta, Embedding,
    EmbeddingInput, EmbeddingRequest, EmbeddingResponse, ImageRequest, ImageResponse, Message,
    MessageContent, Role, SpeechRequest, SpeechResponse, StreamChoice, StreamChunk, Usage,
};
use crate::providers::{HealthStatus, Provider, ProviderConfig, ProviderHealth, StreamResult};
use async_stream::stream;
use serde_json::json;

use reqwest::Client;

use std::collections::HashMap;
use std::time::Instant;

pub struct CohereProvider {
    client: Client,
    config: ProviderConfig,
    base_url: String,
}

impl CohereProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration {
                message: "Cohere requires a non-empty api key".to_string(),
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
            .unwrap_or_else(|| "https://api.cohere.ai/v1".to_string());

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();

        headers.insert(
            "Authorization",
            format!("Bearer {}", self.config.api_key).parse().unwrap(),
        );

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
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("Unknown API error")
                        .to_string();

                    match status.as_u16() {
                        401 => ProviderError::InvalidApiKey,
                        404 => ProviderError::ModelNotFound {
                            model: "unknown".to_string(),
                        },
                        429 => ProviderError::RateLimit,
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

    /// Splits a normalized message list into Cohere's `(preamble,
    /// chat_history, message)` triple. The last message must be a user
    /// turn -- Cohere's `/chat` has no notion of "assistant goes last" --
    /// so anything else is rejected before the request ever reaches the
    /// wire.
    fn split_for_cohere(
        messages: &[Message],
    ) -> Result<(Option<String>, Vec<serde_json::Value>, String), ProviderError> {
        if messages.is_empty() {
            return Err(ProviderError::ValidationError {
                field: "messages".to_string(),
                message: "messages must not be empty".to_string(),
            });
        }

        let last = messages.last().unwrap();
        if last.role != Role::User {
            return Err(ProviderError::ValidationError {
                field: "messages".to_string(),
                message: "the last message must be a user turn for Cohere".to_string(),
            });
        }

        let mut preamble = None;
        let mut chat_history = Vec::new();

        for msg in &messages[..messages.len() - 1] {
            match msg.role {
                Role::System => {
                    preamble = Some(msg.content.as_text());
                }
                Role::User | Role::Tool => {
                    chat_history.push(json!({
                        "role": "USER",
                        "message": msg.content.as_text(),
                    }));
                }
                Role::Assistant => {
                    chat_history.push(json!({
                        "role": "CHATBOT",
                        "message": msg.content.as_text(),
                    }));
                }
            }
        }

        Ok((preamble, chat_history, last.content.as_text()))
    }

    fn build_request(
        model: &str,
        preamble: Option<String>,
        chat_history: Vec<serde_json::Value>,
        message: String,
        request: &ChatRequest,
        stream: bool,
    ) -> serde_json::Value {
        let mut body = json!({
            "model": model,
            "message": message,
            "chat_history": chat_history,
            "temperature": crate::params::clamp(Some(request.temperature.unwrap_or(0.7)), crate::params::DEFAULT_TEMPERATURE_RANGE),
            "max_tokens": request.max_tokens,
            "stream": stream,
        });
        if let Some(preamble) = preamble {
            body["preamble"] = json!(preamble);
        }
        if let Some(top_p) = crate::params::clamp(request.top_p, crate::params::TOP_P_RANGE) {
            body["p"] = json!(top_p);
        }
        if let Some(top_k) = request.top_k {
            body["k"] = json!(top_k);
        }
        body
    }
}

/// `COMPLETE→stop, MAX_TOKENS→length, ERROR_TOXIC→content_filter, ERROR_LIMIT|ERROR→error`.
fn map_finish_reason(reason: Option<&str>) -> Option<String> {
    match reason {
        Some("COMPLETE") => Some("stop".to_string()),
        Some("MAX_TOKENS") => Some("length".to_string()),
        Some("ERROR_TOXIC") => Some("content_filter".to_string()),
        Some("ERROR_LIMIT") | Some("ERROR") => Some("error".to_string()),
        other => other.map(|s| s.to_string()),
    }
}

#[async_trait::async_trait]
impl Provider for CohereProvider {
    fn name(&self) -> &str {
        "cohere"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        false
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "command".to_string(),
            "command-light".to_string(),
            "command-r".to_string(),
            "command-r-plus".to_string(),
            "command-nightly".to_string(),
            "command-light-nightly".to_string(),
            "embed-english-v3.0".to_string(),
            "embed-multilingual-v3.0".to_string(),
        ]
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.map_model(&request.model);
        let (preamble, chat_history, message) = Self::split_for_cohere(&request.messages)?;
        let cohere_request = Self::build_request(&model, preamble, chat_history, message, &request, false);

        let url = format!("{}/chat", self.base_url);
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&cohere_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let cohere_response: serde_json::Value = response.json().await?;

        let finish_reason = map_finish_reason(cohere_response["finish_reason"].as_str());

        let chat_response = ChatResponse {
            id: cohere_response["response_id"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model,
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: MessageContent::Text(
                        cohere_response["text"].as_str().unwrap_or("").to_string(),
                    ),
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                },
                finish_reason,
                logprobs: None,
            }],
            usage: Some(Usage {
                prompt_tokens: cohere_response["meta"]["billed_units"]["input_tokens"]
                    .as_u64()
                    .unwrap_or(0) as u32,
                completion_tokens: cohere_response["meta"]["billed_units"]["output_tokens"]
                    .as_u64()
                    .unwrap_or(0) as u32,
                total_tokens: cohere_response["meta"]["billed_units"]["input_tokens"]
                    .as_u64()
                    .unwrap_or(0) as u32
                    + cohere_response["meta"]["billed_units"]["output_tokens"]
                        .as_u64()
                        .unwrap_or(0) as u32,
            }),
            system_fingerprint: None,
            original_model_alias: None,
        };

        Ok(chat_response)
    }

    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        let model = self.map_model(&request.model);
        let (preamble, chat_history, message) = Self::split_for_cohere(&request.messages)?;
        let cohere_request = Self::build_request(&model, preamble, chat_history, message, &request, true);

        let url = format!("{}/chat", self.base_url);
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&cohere_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let stream = Box::pin(stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut generation_id = String::new();
            let mut first_event = true;

            while let Some(chunk_result) = futures::StreamExt::next(&mut bytes_stream).await {
                match chunk_result {
                    Ok(chunk) => {
                        let chunk_str = String::from_utf8_lossy(&chunk);
                        buffer.push_str(&chunk_str);

                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].trim().to_string();
                            buffer = buffer[line_end + 1..].to_string();

                            if line.is_empty() {
                                continue;
                            }

                            let event = match serde_json::from_str::<serde_json::Value>(&line) {
                                Ok(event) => event,
                                Err(e) => {
                                    if first_event {
                                        yield Err(ProviderError::Serialization(e));
                                        return;
                                    }
                                    continue;
                                }
                            };
                            first_event = false;

                            match event["event_type"].as_str() {
                                Some("stream-start") => {
                                    generation_id = event["generation_id"].as_str().unwrap_or("").to_string();
                                }
                                Some("text-generation") => {
                                    if let Some(text) = event["text"].as_str() {
                                        yield Ok(StreamChunk {
                                            id: generation_id.clone(),
                                            object: "chat.completion.chunk".to_string(),
                                            created: chrono::Utc::now().timestamp() as u64,
                                            model: model.clone(),
                                            choices: vec![StreamChoice {
                                                index: 0,
                                                delta: Delta {
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
                                Some("stream-end") => {
                                    let finish_reason = map_finish_reason(
                                        event["finish_reason"].as_str(),
                                    ).or(Some("stop".to_string()));
                                    yield Ok(StreamChunk {
                                        id: generation_id.clone(),
                                        object: "chat.completion.chunk".to_string(),
                                        created: chrono::Utc::now().timestamp() as u64,
                                        model: model.clone(),
                                        choices: vec![StreamChoice {
                                            index: 0,
                                            delta: Delta {
                                                role: None,
                                                content: None,
                                                tool_calls: None,
                                            },
                                            finish_reason,
                                        }],
                                        original_model_alias: None,
                                    });
                                    return;
                                }
                                _ => {}
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

        let input = match &request.input {
            EmbeddingInput::String(s) => vec![s.clone()],
            EmbeddingInput::StringArray(arr) => arr.clone(),
            _ => {
                return Err(ProviderError::Configuration {
                    message: "Unsupported embedding input format".to_string(),
                })
            }
        };

        let cohere_request = json!({
            "model": model,
            "texts": input,
            "input_type": "search_document",
        });

        let url = format!("{}/embed", self.base_url);
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&cohere_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let cohere_response: serde_json::Value = response.json().await?;

        let embeddings = cohere_response["embeddings"]
            .as_array()
            .unwrap_or(&vec![])
            .iter()
            .enumerate()
            .map(|(i, embedding)| {
                let embedding_vec = embedding["values"]
                    .as_array()
                    .unwrap_or(&vec![])
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect::<Vec<f32>>();

                Embedding {
                    object: "embedding".to_string(),
                    embedding: embedding_vec,
                    index: i as u32,
                }
            })
            .collect();

        let embedding_response = EmbeddingResponse {
            object: "list".to_string(),
            data: embeddings,
            model,
            usage: Usage {
                prompt_tokens: cohere_response["meta"]["billed_units"]["input_tokens"]
                    .as_u64()
                    .unwrap_or(0) as u32,
                completion_tokens: 0,
                total_tokens: cohere_response["meta"]["billed_units"]["input_tokens"]
                    .as_u64()
                    .unwrap_or(0) as u32,
            },
        };

        Ok(embedding_response)
    }

    async fn image_generation(
        &self,
        _request: ImageRequest,
    ) -> Result<ImageResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Image generation not supported by Cohere".to_string(),
        })
    }

    async fn audio_transcription(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Audio transcription not supported by Cohere".to_string(),
        })
    }

    async fn text_to_speech(
        &self,
        _request: SpeechRequest,
    ) -> Result<SpeechResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Text-to-speech not supported by Cohere".to_string(),
        })
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let start = Instant::now();

        let url = format!("{}/models", self.base_url);
        let headers = self.build_headers();

        let response = self.client.get(&url).headers(headers).send().await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(ProviderHealth {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency_ms),
                error_rate: 0.0,
                last_check: chrono::Utc::now(),
                details: HashMap::new(),
            }),
            Ok(resp) => {
                let mut details = HashMap::new();
                details.insert(
                    "status_code".to_string(),
                    resp.status().as_u16().to_string(),
                );

                Ok(ProviderHealth {
                    status: HealthStatus::Degraded,
                    latency_ms: Some(latency_ms),
                    error_rate: 1.0,
                    last_check: chrono::Utc::now(),
                    details,
                })
            }
            Err(e) => {
                let mut details = HashMap::new();
                details.insert("error".to_string(), e.to_string());

                Ok(ProviderHealth {
                    status: HealthStatus::Unhealthy,
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
        ProviderConfig::new("cohere", "test-key")
    }

    #[test]
    fn rejects_empty_api_key() {
        let mut cfg = config();
        cfg.api_key = String::new();
        assert!(CohereProvider::new(cfg).is_err());
    }

    #[test]
    fn rejects_request_not_ending_in_user_turn() {
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        assert!(CohereProvider::split_for_cohere(&messages).is_err());
    }

    #[test]
    fn rejects_empty_messages() {
        assert!(CohereProvider::split_for_cohere(&[]).is_err());
    }

    #[test]
    fn splits_system_message_into_preamble() {
        let messages = vec![
            Message::system("be terse"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("how are you"),
        ];
        let (preamble, history, message) = CohereProvider::split_for_cohere(&messages).unwrap();
        assert_eq!(preamble.as_deref(), Some("be terse"));
        assert_eq!(history.len(), 2);
        assert_eq!(message, "how are you");
    }

    #[test]
    fn maps_finish_reasons() {
        assert_eq!(map_finish_reason(Some("COMPLETE")), Some("stop".to_string()));
        assert_eq!(map_finish_reason(Some("MAX_TOKENS")), Some("length".to_string()));
        assert_eq!(map_finish_reason(Some("ERROR_TOXIC")), Some("content_filter".to_string()));
        assert_eq!(map_finish_reason(Some("ERROR_LIMIT")), Some("error".to_string()));
        assert_eq!(map_finish_reason(Some("ERROR")), Some("error".to_string()));
    }
}
