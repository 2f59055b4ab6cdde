use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    ImageRequest, ImageResponse, SpeechRequest, SpeechResponse, StreamChunk,
};
use crate::providers::{
    HealthStatus, Provider, ProviderCapabilities, ProviderConfig, ProviderHealth, StreamResult,
};
use async_stream::stream;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Instant;

pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();

        headers.insert(
            "Authorization",
            format!("Bearer {}", self.config.api_key).parse().unwrap(),
        );
        headers.insert("Content-Type", "application/json".parse().unwrap());

        if let Some(org) = self.config.headers.get("openai-organization") {
            if let Ok(value) = org.parse() {
                headers.insert("OpenAI-Organization", value);
            }
        }

        for (key, value) in &self.config.headers {
            if key == "openai-organization" {
                continue;
            }
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
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
            "gpt-4".to_string(),
            "gpt-3.5-turbo".to_string(),
            "text-embedding-3-small".to_string(),
            "text-embedding-3-large".to_string(),
            "text-embedding-ada-002".to_string(),
            "dall-e-2".to_string(),
            "dall-e-3".to_string(),
            "whisper-1".to_string(),
            "tts-1".to_string(),
            "tts-1-hd".to_string(),
        ]
    }

    async fn chat_completion(
        &self,
        mut request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        request.model = self.map_model(&request.model);
        let url = self.build_url("chat/completions");
        let headers = self.build_headers();
        let body = crate::params::openai_wire_body(&request)?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response)
    }

    async fn stream_chat_completion(
        &self,
        mut request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        request.model = self.map_model(&request.model);
        request.stream = Some(true);

        let url = self.build_url("chat/completions");
        let headers = self.build_headers();
        let body = crate::params::openai_wire_body(&request)?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

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

                            if let Some(json_str) = line.strip_prefix("data: ") {
                                if json_str == "[DONE]" {
                                    return;
                                }

                                match serde_json::from_str::<StreamChunk>(json_str) {
                                    Ok(stream_chunk) => yield Ok(stream_chunk),
                                    Err(e) => yield Err(ProviderError::Serialization(e)),
                                }
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
        mut request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        request.model = self.map_model(&request.model);
        let url = self.build_url("embeddings");
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let embedding_response: EmbeddingResponse = response.json().await?;
        Ok(embedding_response)
    }

    async fn image_generation(
        &self,
        mut request: ImageRequest,
    ) -> Result<ImageResponse, ProviderError> {
        if let Some(ref model) = request.model {
            request.model = Some(self.map_model(model));
        }

        let url = self.build_url("images/generations");
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let image_response: ImageResponse = response.json().await?;
        Ok(image_response)
    }

    async fn audio_transcription(
        &self,
        mut request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        request.model = self.map_model(&request.model);
        let url = self.build_url("audio/transcriptions");
        let headers = self.build_headers();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(request.file)
                    .file_name("audio.mp3")
                    .mime_str("audio/mpeg")?,
            )
            .text("model", request.model);

        let form = if let Some(language) = request.language {
            form.text("language", language)
        } else {
            form
        };

        let form = if let Some(prompt) = request.prompt {
            form.text("prompt", prompt)
        } else {
            form
        };

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let audio_response: AudioResponse = response.json().await?;
        Ok(audio_response)
    }

    async fn text_to_speech(
        &self,
        mut request: SpeechRequest,
    ) -> Result<SpeechResponse, ProviderError> {
        request.model = self.map_model(&request.model);
        let url = self.build_url("audio/speech");
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let audio_bytes = response.bytes().await?;

        Ok(SpeechResponse {
            audio: audio_bytes.to_vec(),
            content_type,
        })
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let start = Instant::now();

        let url = self.build_url("models");
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

    async fn get_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = self.build_url("models");
        let headers = self.build_headers();

        let response = self.client.get(&url).headers(headers).send().await?;
        if !response.status().is_success() {
            return Ok(self.supported_models());
        }

        #[derive(serde::Deserialize)]
        struct ModelsList {
            data: Vec<ModelEntry>,
        }
        #[derive(serde::Deserialize)]
        struct ModelEntry {
            id: String,
        }

        match response.json::<ModelsList>().await {
            Ok(list) => Ok(list.data.into_iter().map(|m| m.id).collect()),
            Err(_) => Ok(self.supported_models()),
        }
    }

    fn get_capabilities(&self, model_id: Option<&str>) -> ProviderCapabilities {
        let model = model_id.unwrap_or("");
        ProviderCapabilities {
            supports_chat: !model.starts_with("text-embedding")
                && !model.starts_with("dall-e")
                && !model.starts_with("tts")
                && !model.starts_with("whisper"),
            supports_streaming: true,
            supports_vision: model.starts_with("gpt-4o") || model.starts_with("gpt-4-turbo"),
            supports_function_calling: true,
            supports_embeddings: model.starts_with("text-embedding"),
            supports_image_generation: model.starts_with("dall-e"),
            supports_audio_transcription: model.starts_with("whisper"),
            supports_audio_synthesis: model.starts_with("tts"),
            max_input_tokens: Some(128_000),
            max_output_tokens: Some(16_384),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProviderConfig {
        ProviderConfig::new("openai", "sk-test")
    }

    #[test]
    fn builds_default_base_url() {
        let provider = OpenAIProvider::new(test_config()).unwrap();
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn honors_custom_base_url_for_compatible_gateways() {
        let mut config = test_config();
        config.base_url = Some("https://my-proxy.internal/v1".to_string());
        let provider = OpenAIProvider::new(config).unwrap();
        assert_eq!(
            provider.build_url("chat/completions"),
            "https://my-proxy.internal/v1/chat/completions"
        );
    }

    #[test]
    fn maps_model_aliases() {
        let mut config = test_config();
        config
            .model_mapping
            .insert("fast".to_string(), "gpt-4o-mini".to_string());
        let provider = OpenAIProvider::new(config).unwrap();
        assert_eq!(provider.map_model("fast"), "gpt-4o-mini");
        assert_eq!(provider.map_model("gpt-4o"), "gpt-4o");
    }
}
