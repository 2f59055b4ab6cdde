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
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Vertex AI fronts two unrelated model families behind one host. Gemini
/// models speak the same content/parts wire as the standalone Gemini API;
/// everything else is assumed to be the older PaLM (`*-bison`) dialect,
/// which wants a flattened `Human:`/`Assistant:` prompt instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VertexDialect {
    Gemini,
    Palm,
}

fn dialect_for(model: &str) -> VertexDialect {
    if model.starts_with("gemini-") || model == "gemini-pro" || model == "gemini-pro-vision" {
        VertexDialect::Gemini
    } else {
        VertexDialect::Palm
    }
}

pub struct GoogleVertexAIProvider {
    client: Client,
    config: ProviderConfig,
    base_url: String,
    #[allow(dead_code)]
    project_id: String,
    location: String,
}

impl GoogleVertexAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        let project_id = config.headers.get("project-id").cloned().ok_or_else(|| {
            ProviderError::Configuration {
                message: "project-id is required for Google Vertex AI".to_string(),
            }
        })?;

        let location = config
            .headers
            .get("location")
            .cloned()
            .unwrap_or_else(|| "us-central1".to_string());

        let base_url = config.base_url.clone().unwrap_or_else(|| {
            format!("https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}")
        });

        Ok(Self {
            client,
            config,
            base_url,
            project_id,
            location,
        })
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/locations/{}/publishers/google/models/{}:predict",
            self.base_url, self.location, endpoint
        )
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
            .unwrap_or_else(|| match model {
                "gpt-4" | "gpt-3.5-turbo" => "chat-bison".to_string(),
                "text-embedding-ada-002" => "textembedding-gecko".to_string(),
                _ => model.to_string(),
            })
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

    /// Flattens the conversation into PaLM's `Human:`/`Assistant:` prompt
    /// format. System messages are folded in as a leading unlabeled line.
    fn flatten_to_palm_prompt(messages: &[Message]) -> String {
        let mut prompt = String::new();
        for msg in messages {
            match msg.role {
                Role::System => {
                    prompt.push_str(&msg.content.as_text());
                    prompt.push('\n');
                }
                Role::User | Role::Tool => {
                    prompt.push_str("Human: ");
                    prompt.push_str(&msg.content.as_text());
                    prompt.push('\n');
                }
                Role::Assistant => {
                    prompt.push_str("Assistant: ");
                    prompt.push_str(&msg.content.as_text());
                    prompt.push('\n');
                }
            }
        }
        prompt.push_str("Assistant:");
        prompt
    }

    async fn convert_content(&self, content: &MessageContent) -> Result<Vec<VertexPart>, ProviderError> {
        match content {
            MessageContent::Text(text) => Ok(vec![VertexPart {
                text: Some(text.clone()),
                inline_data: None,
            }]),
            MessageContent::Parts(parts) => {
                let mut out = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        ContentPart::Text { text } => out.push(VertexPart {
                            text: Some(text.clone()),
                            inline_data: None,
                        }),
                        ContentPart::ImageUrl { image_url } => {
                            let resolved = image::resolve(&image_url.url).await?;
                            out.push(VertexPart {
                                text: None,
                                inline_data: Some(VertexInlineData {
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

    async fn convert_to_gemini_format(
        &self,
        request: &ChatRequest,
    ) -> Result<VertexGeminiRequest, ProviderError> {
        let mut contents = Vec::with_capacity(request.messages.len());
        for msg in &request.messages {
            let role = match msg.role {
                Role::Assistant => "model",
                _ => "user",
            };
            contents.push(VertexContent {
                role: role.to_string(),
                parts: self.convert_content(&msg.content).await?,
            });
        }

        Ok(VertexGeminiRequest {
            contents,
            generation_config: Some(VertexGenerationConfig {
                temperature: crate::params::clamp(request.temperature, crate::params::UNIT_TEMPERATURE_RANGE),
                max_output_tokens: request.max_tokens.map(|t| t as i32),
                top_p: crate::params::clamp(request.top_p, crate::params::TOP_P_RANGE),
                top_k: request.top_k.map(|k| k as i32),
            }),
        })
    }

    fn convert_to_palm_format(&self, request: &ChatRequest) -> VertexPalmRequest {
        let prompt = Self::flatten_to_palm_prompt(&request.messages);
        VertexPalmRequest {
            instances: vec![VertexPalmInstance { prompt }],
            parameters: Some(VertexPalmParameters {
                temperature: request.temperature.unwrap_or(0.7),
                max_output_tokens: request.max_tokens.unwrap_or(1024) as i32,
                top_p: request.top_p,
                top_k: request.top_k.map(|k| k as i32),
            }),
        }
    }

    fn convert_from_gemini_response(&self, response: VertexGeminiResponse, model: &str) -> ChatResponse {
        let choices = response
            .candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                let text = candidate
                    .content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.clone())
                    .collect::<Vec<_>>()
                    .join("");
                crate::models::Choice {
                    index: index as u32,
                    message: Message {
                        role: Role::Assistant,
                        content: MessageContent::Text(text),
                        name: None,
                        tool_calls: None,
                        tool_call_id: None,
                    },
                    finish_reason: Some("stop".to_string()),
                    logprobs: None,
                }
            })
            .collect();

        ChatResponse {
            id: uuid::Uuid::new_v4().to_string(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: model.to_string(),
            choices,
            usage: None,
            system_fingerprint: None,
            original_model_alias: None,
        }
    }

    fn convert_from_palm_response(&self, response: VertexPalmResponse, model: &str) -> ChatResponse {
        let choices = response
            .predictions
            .into_iter()
            .enumerate()
            .flat_map(|(pred_index, pred)| {
                pred.candidates
                    .into_iter()
                    .enumerate()
                    .map(move |(cand_index, candidate)| crate::models::Choice {
                        index: (pred_index + cand_index) as u32,
                        message: Message {
                            role: Role::Assistant,
                            content: MessageContent::Text(candidate.content),
                            name: None,
                            tool_calls: None,
                            tool_call_id: None,
                        },
                        finish_reason: Some("stop".to_string()),
                        logprobs: None,
                    })
            })
            .collect();

        ChatResponse {
            id: uuid::Uuid::new_v4().to_string(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: model.to_string(),
            choices,
            usage: None,
            system_fingerprint: None,
            original_model_alias: None,
        }
    }
}

#[async_trait::async_trait]
impl Provider for GoogleVertexAIProvider {
    fn name(&self) -> &str {
        "google-vertex-ai"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        false
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "chat-bison".to_string(),
            "chat-bison-32k".to_string(),
            "text-bison".to_string(),
            "text-bison-32k".to_string(),
            "gemini-pro".to_string(),
            "gemini-pro-vision".to_string(),
            "textembedding-gecko".to_string(),
            "textembedding-gecko-multilingual".to_string(),
        ]
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.map_model(&request.model);
        let url = self.build_url(&model);
        let headers = self.build_headers();

        match dialect_for(&model) {
            VertexDialect::Gemini => {
                let vertex_request = self.convert_to_gemini_format(&request).await?;
                let response = self
                    .client
                    .post(&url)
                    .headers(headers)
                    .json(&vertex_request)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(self.handle_error_response(response).await);
                }
                let vertex_response: VertexGeminiResponse = response.json().await?;
                Ok(self.convert_from_gemini_response(vertex_response, &model))
            }
            VertexDialect::Palm => {
                let vertex_request = self.convert_to_palm_format(&request);
                let response = self
                    .client
                    .post(&url)
                    .headers(headers)
                    .json(&vertex_request)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(self.handle_error_response(response).await);
                }
                let vertex_response: VertexPalmResponse = response.json().await?;
                Ok(self.convert_from_palm_response(vertex_response, &model))
            }
        }
    }

    /// Vertex has no true token-streaming endpoint in this adapter's scope:
    /// the full response is fetched once and then replayed as a sequence of
    /// chunks, one per candidate/prediction, in order. Because this is a
    /// plain async generator, dropping the stream (caller cancellation)
    /// simply stops further chunks from being produced.
    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        let response = self.chat_completion(request).await?;
        let stream_id = response.id.clone();
        let model = response.model.clone();

        let stream = Box::pin(stream! {
            let last_index = response.choices.len().saturating_sub(1);
            for (i, choice) in response.choices.into_iter().enumerate() {
                yield Ok(StreamChunk {
                    id: stream_id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created: chrono::Utc::now().timestamp() as u64,
                    model: model.clone(),
                    choices: vec![crate::models::StreamChoice {
                        index: 0,
                        delta: crate::models::Delta {
                            role: None,
                            content: Some(choice.message.content.as_text()),
                            tool_calls: None,
                        },
                        finish_reason: if i == last_index { choice.finish_reason } else { None },
                    }],
                    original_model_alias: None,
                });
            }
        });

        Ok(stream)
    }

    async fn embedding(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        let model = self.map_model(&request.model);
        let url = self.build_url(&model);
        let headers = self.build_headers();

        let vertex_embedding_request = VertexAIEmbeddingRequest {
            instances: vec![VertexAIEmbeddingInstance {
                content: match request.input {
                    crate::models::EmbeddingInput::String(s) => s,
                    _ => {
                        return Err(ProviderError::Configuration {
                            message:
                                "Only string input is supported for Google Vertex AI embeddings"
                                    .to_string(),
                        })
                    }
                },
            }],
        };

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&vertex_embedding_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let vertex_response: VertexAIEmbeddingResponse = response.json().await?;

        Ok(EmbeddingResponse {
            object: "list".to_string(),
            data: vertex_response
                .predictions
                .into_iter()
                .map(|pred| crate::models::Embedding {
                    object: "embedding".to_string(),
                    embedding: pred.embeddings.values,
                    index: 0,
                })
                .collect(),
            model: request.model.clone(),
            usage: Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            },
        })
    }

    async fn image_generation(
        &self,
        _request: ImageRequest,
    ) -> Result<ImageResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Google Vertex AI does not support image generation via this API".to_string(),
        })
    }

    async fn audio_transcription(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Google Vertex AI does not support audio transcription via this API"
                .to_string(),
        })
    }

    async fn text_to_speech(
        &self,
        _request: SpeechRequest,
    ) -> Result<SpeechResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "Google Vertex AI does not support text-to-speech via this API".to_string(),
        })
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let start = Instant::now();

        let url = format!(
            "{}/locations/{}/publishers/google/models",
            self.base_url, self.location
        );
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

#[derive(Debug, Serialize, Deserialize)]
struct VertexGeminiRequest {
    contents: Vec<VertexContent>,
    generation_config: Option<VertexGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexContent {
    role: String,
    parts: Vec<VertexPart>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct VertexPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<VertexInlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexGenerationConfig {
    temperature: Option<f32>,
    max_output_tokens: Option<i32>,
    top_p: Option<f32>,
    top_k: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexGeminiResponse {
    #[serde(default)]
    candidates: Vec<VertexGeminiCandidate>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexGeminiCandidate {
    content: VertexContent,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexPalmRequest {
    instances: Vec<VertexPalmInstance>,
    parameters: Option<VertexPalmParameters>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexPalmInstance {
    prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexPalmParameters {
    temperature: f32,
    max_output_tokens: i32,
    top_p: Option<f32>,
    top_k: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexPalmResponse {
    predictions: Vec<VertexPalmPrediction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexPalmPrediction {
    candidates: Vec<VertexPalmCandidate>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexPalmCandidate {
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexAIEmbeddingRequest {
    instances: Vec<VertexAIEmbeddingInstance>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexAIEmbeddingInstance {
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexAIEmbeddingResponse {
    predictions: Vec<VertexAIEmbeddingPrediction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexAIEmbeddingPrediction {
    embeddings: VertexAIEmbeddings,
}

#[derive(Debug, Serialize, Deserialize)]
struct VertexAIEmbeddings {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        let mut cfg = ProviderConfig::new("google-vertex-ai", "test-key");
        cfg.headers.insert("project-id".to_string(), "my-project".to_string());
        cfg
    }

    #[test]
    fn picks_gemini_dialect_for_gemini_models() {
        assert_eq!(dialect_for("gemini-1.5-pro"), VertexDialect::Gemini);
        assert_eq!(dialect_for("gemini-pro"), VertexDialect::Gemini);
    }

    #[test]
    fn falls_back_to_palm_dialect_otherwise() {
        assert_eq!(dialect_for("chat-bison"), VertexDialect::Palm);
        assert_eq!(dialect_for("text-bison-32k"), VertexDialect::Palm);
    }

    #[test]
    fn requires_project_id() {
        let cfg = ProviderConfig::new("google-vertex-ai", "test-key");
        assert!(GoogleVertexAIProvider::new(cfg).is_err());
    }

    #[test]
    fn flattens_conversation_to_human_assistant_prompt() {
        let messages = vec![
            Message::system("be terse"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("how are you"),
        ];
        let prompt = GoogleVertexAIProvider::flatten_to_palm_prompt(&messages);
        assert!(prompt.contains("Human: hi"));
        assert!(prompt.contains("Assistant: hello"));
        assert!(prompt.trim_end().ends_with("Assistant:"));
    }

    #[tokio::test]
    async fn simulated_streaming_emits_one_chunk_per_choice_with_terminal_finish_reason() {
        let provider = GoogleVertexAIProvider::new(config()).unwrap();
        let response = provider.convert_from_gemini_response(
            VertexGeminiResponse {
                candidates: vec![VertexGeminiCandidate {
                    content: VertexContent {
                        role: "model".to_string(),
                        parts: vec![VertexPart { text: Some("hi".to_string()), inline_data: None }],
                    },
                }],
            },
            "gemini-pro",
        );
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
