//! # Normalized Model Types
//!
//! This module defines the normalized, OpenAI-shaped data structures shared by
//! every provider adapter. It includes request and response types for chat
//! completions, embeddings, image generation, audio processing, and streaming.
//!
//! ## Overview
//!
//! The models module provides:
//! - **Chat Completions**: Conversational AI model interactions
//! - **Embeddings**: Text embedding generation and processing
//! - **Image Generation**: AI-powered image creation
//! - **Audio Processing**: Speech-to-text and text-to-speech
//! - **Streaming Support**: Real-time response streaming
//! - **Tool Integration**: Function calling and tool usage
//!
//! ## Chat Completions
//!
//! The primary interface for conversational AI models:
//!
//! ```rust
//! use llm_gateway_sdk::{ChatRequest, ChatResponse, Message, Role};
//!
//! let request = ChatRequest {
//!     model: "gpt-4".to_string(),
//!     messages: vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("Hello, how are you?"),
//!     ],
//!     temperature: Some(0.7),
//!     max_tokens: Some(100),
//!     stream: Some(false),
//!     ..Default::default()
//! };
//!
//! // Response includes choices, usage statistics, and metadata
//! let response: ChatResponse = client.chat_completion(request).await?;
//! ```
//!
//! ## Message Content
//!
//! `Message::content` is either a plain string or a list of content parts
//! (`text` / `image_url`), mirroring the OpenAI vision wire shape. Use
//! [`Message::user_with_images`] to build a multimodal turn, and
//! [`MessageContent::as_text`] to collapse either shape back down to text for
//! token counting, caching, and non-multimodal providers.
//!
//! ```rust
//! let system_msg = Message::system("You are a helpful assistant.");
//! let user_msg = Message::user("What's the weather like?");
//! let assistant_msg = Message::assistant("I don't have access to real-time weather data.");
//! ```
//!
//! ## Embeddings
//!
//! Text embedding generation for semantic analysis:
//!
//! ```rust
//! use llm_gateway_sdk::{EmbeddingRequest, EmbeddingResponse};
//!
//! let request = EmbeddingRequest {
//!     model: "text-embedding-ada-002".to_string(),
//!     input: EmbeddingInput::StringArray(vec![
//!         "Hello, world!".to_string(),
//!         "How are you?".to_string(),
//!     ]),
//!     ..Default::default()
//! };
//!
//! let response: EmbeddingResponse = client.embedding(request).await?;
//! ```
//!
//! ## Image Generation
//!
//! AI-powered image creation from text prompts:
//!
//! ```rust
//! use llm_gateway_sdk::{ImageRequest, ImageResponse};
//!
//! let request = ImageRequest {
//!     prompt: "A beautiful sunset over mountains".to_string(),
//!     model: Some("dall-e-3".to_string()),
//!     n: Some(1),
//!     size: Some("1024x1024".to_string()),
//!     quality: Some("standard".to_string()),
//!     response_format: Some("url".to_string()),
//!     ..Default::default()
//! };
//!
//! let response: ImageResponse = client.image_generation(request).await?;
//! ```
//!
//! ## Streaming Support
//!
//! Real-time response streaming for chat completions. The first chunk for a
//! choice carries `delta.role`; subsequent chunks omit it. Exactly one chunk
//! — the last one — carries a non-null `finish_reason`.
//!
//! ```rust
//! use llm_gateway_sdk::{StreamChunk, StreamChoice};
//!
//! let mut request = ChatRequest {
//!     model: "gpt-4".to_string(),
//!     messages: vec![Message::user("Tell me a story.")],
//!     stream: Some(true),
//!     ..Default::default()
//! };
//!
//! let mut stream = client.stream_chat_completion(request).await?;
//!
//! while let Some(chunk) = stream.next().await {
//!     match chunk {
//!         Ok(StreamChunk { choices, .. }) => {
//!             for choice in choices {
//!                 if let Some(content) = choice.delta.content {
//!                     print!("{}", content);
//!                 }
//!             }
//!         }
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! ## Tool Integration
//!
//! Function calling and tool usage capabilities:
//!
//! ```rust
//! use llm_gateway_sdk::{Tool, Function, ToolChoice};
//!
//! let request = ChatRequest {
//!     model: "gpt-4".to_string(),
//!     messages: vec![Message::user("What's the weather in New York?")],
//!     tools: Some(vec![Tool {
//!         tool_type: "function".to_string(),
//!         function: Function {
//!             name: "get_weather".to_string(),
//!             description: Some("Get current weather for a location".to_string()),
//!             parameters: serde_json::json!({
//!                 "type": "object",
//!                 "properties": {
//!                     "location": {"type": "string"}
//!                 },
//!                 "required": ["location"]
//!             }),
//!         },
//!     }]),
//!     tool_choice: Some(ToolChoice::Auto),
//!     ..Default::default()
//! };
//! ```
//!
//! ## Provider Compatibility
//!
//! All models are designed to be compatible with multiple AI providers:
//!
//! - **OpenAI / Cerebras / Groq / Mistral / OpenRouter / Perplexity / Azure / Ollama**: OpenAI-compatible wire
//! - **Anthropic**: Claude-3 family via `/v1/messages` content blocks
//! - **Google Gemini / Vertex AI**: `generateContent` / PaLM `:predict` dialects
//! - **Cohere**: `chat_history` + `preamble` dialect
//! - **Custom Providers**: Extensible for any OpenAI-compatible backend
//!
//! ## Serialization
//!
//! All models support JSON serialization with provider-specific optimizations:
//!
//! - **Optional Fields**: Skip serialization of None values
//! - **Custom Serialization**: Provider-specific field mapping
//! - **Validation**: Automatic request validation
//! - **Error Handling**: Comprehensive error responses

use serde::{Deserialize, Serialize};

/// Chat completion request.
///
/// Represents a request to generate a chat completion using an AI model.
/// Supports various parameters for controlling the generation process.
///
/// # Example
///
/// ```rust
/// let request = ChatRequest {
///     model: "gpt-4".to_string(),
///     messages: vec![Message::user("Hello, world!")],
///     temperature: Some(0.7),
///     max_tokens: Some(100),
///     stream: Some(false),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// The model to use for completion. May be a direct alias or a
    /// `router[:strategy][:model]` routing microformat string.
    pub model: String,
    /// The messages to generate a response for
    pub messages: Vec<Message>,
    /// Controls randomness (0.0 to 2.0); clamped per-provider by the parameter converter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tools available for the model to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// How the model should use tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Controls diversity via nucleus sampling (0.0 to 1.0); clamped to `[0,1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff. Not part of the OpenAI wire shape but accepted
    /// on the normalized request and forwarded by adapters (Anthropic,
    /// Gemini, Cohere) whose native APIs support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Reduces repetition of similar tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// Reduces repetition of similar topics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Sequences that stop generation. Serializes as a bare string when a
    /// single sequence is given, and as an array otherwise, matching the
    /// OpenAI-compatible wire convention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
    /// Number of completions to generate for each input message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// User identifier for tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Per-token logit bias, keyed by token id as a string. Accepted as
    /// integers on the normalized request; OpenAI-compatible adapters
    /// convert to floats before forwarding (see [`crate::params`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<std::collections::HashMap<String, i32>>,
}

/// `stop` sequences: either a single string or a list of strings.
///
/// OpenAI-compatible adapters serialize a single sequence as a bare string
/// and two-or-more as an array; Anthropic additionally caps the forwarded
/// list at 5 sequences (see `providers::anthropic`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    Single(String),
    Multiple(Vec<String>),
}

impl StopSequences {
    /// Builds the wire-correct shape from a list of sequences: a bare string
    /// for exactly one sequence, an array otherwise (including zero, which
    /// serializes as `[]` — callers should not construct `StopSequences`
    /// from an empty list if they mean "no stop sequences", which is `None`).
    pub fn from_vec(mut sequences: Vec<String>) -> Self {
        if sequences.len() == 1 {
            StopSequences::Single(sequences.remove(0))
        } else {
            StopSequences::Multiple(sequences)
        }
    }

    pub fn as_vec(&self) -> Vec<String> {
        match self {
            StopSequences::Single(s) => vec![s.clone()],
            StopSequences::Multiple(v) => v.clone(),
        }
    }
}

/// Chat completion response.
///
/// Contains the generated response, metadata, and usage statistics.
///
/// # Example
///
/// ```rust
/// let response = ChatResponse {
///     id: "chatcmpl-123".to_string(),
///     object: "chat.completion".to_string(),
///     created: 1677652288,
///     model: "gpt-4".to_string(),
///     choices: vec![Choice { /* ... */ }],
///     usage: Some(Usage { /* ... */ }),
///     system_fingerprint: Some("fp_44709d6fcb".to_string()),
///     original_model_alias: None,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Unique identifier for the completion
    pub id: String,
    /// Object type (always "chat.completion")
    pub object: String,
    /// Unix timestamp of creation
    pub created: u64,
    /// Provider-native model id that actually served the request
    pub model: String,
    /// Generated completions
    pub choices: Vec<Choice>,
    /// Token usage statistics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// System fingerprint for model version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    /// The alias the caller originally requested (e.g. `router:roundrobin`
    /// or `gpt-4`), stamped on by the dispatcher after routing resolves the
    /// concrete provider + model. `None` until the dispatcher sets it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_model_alias: Option<String>,
}

/// A message in a conversation.
///
/// Represents a single message with role, content, and optional metadata.
/// Supports different message types for conversation context.
///
/// # Example
///
/// ```rust
/// let user_msg = Message::user("Hello, how are you?");
/// let assistant_msg = Message::assistant("I'm doing well, thank you!");
/// let system_msg = Message::system("You are a helpful assistant.");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message: plain text, or a list of text/image parts
    /// for multimodal turns.
    pub content: MessageContent,
    /// Optional name for the message sender
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call being responded to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a multimodal user message: text plus one or more images
    /// (either `https://` URLs or `data:` URLs already produced by
    /// [`crate::image::to_data_url`]).
    pub fn user_with_images(text: impl Into<String>, image_urls: Vec<String>) -> Self {
        let mut parts = vec![ContentPart::Text { text: text.into() }];
        parts.extend(
            image_urls
                .into_iter()
                .map(|url| ContentPart::ImageUrl { image_url: ImageUrl { url } }),
        );
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a tool-result message.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Message content: either plain text or a list of content parts.
///
/// Serializes untagged, matching the OpenAI vision wire shape exactly: a
/// bare JSON string for text-only messages, or an array of `{type, ...}`
/// objects for multimodal ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Collapses either shape down to its text, concatenating the `text`
    /// parts of a multimodal message and dropping images. Used for token
    /// estimation, cache-key hashing, and non-multimodal adapters.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Whether this message carries at least one image part.
    pub fn has_image(&self) -> bool {
        matches!(self, MessageContent::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }

    /// The image URLs (HTTP or `data:`) attached to this message, if any.
    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
            MessageContent::Text(_) => Vec::new(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// A single part of a multimodal message's content array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Either an `https://` URL to fetch or a `data:<mime>;base64,<...>` URL.
    pub url: String,
}

/// Role of a message in a conversation.
///
/// Defines the type of message sender in a conversation context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions and context
    System,
    /// User input and questions
    User,
    /// AI assistant responses
    Assistant,
    /// Tool function results
    Tool,
}

/// A generated completion choice.
///
/// Represents a single completion option with message and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of the choice in the response
    pub index: u32,
    /// The generated message
    pub message: Message,
    /// Reason why generation stopped: `"stop"`, `"length"`,
    /// `"content_filter"`, `"tool_calls"`, `"error"`, or `None` while a
    /// stream is still in progress.
    pub finish_reason: Option<String>,
    /// Log probability of the choice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    None,
    Auto,
    Required,
    Specific { function: FunctionChoice },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionChoice {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Default for EmbeddingRequest {
    fn default() -> Self {
        Self {
            model: "text-embedding-ada-002".to_string(),
            input: EmbeddingInput::String("".to_string()),
            encoding_format: None,
            dimensions: None,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    String(String),
    StringArray(Vec<String>),
    TokenArray(Vec<u32>),
    TokenArrayArray(Vec<Vec<u32>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub object: String,
    pub data: Vec<Embedding>,
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub object: String,
    pub embedding: Vec<f32>,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub created: u64,
    pub data: Vec<ImageData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRequest {
    pub file: Vec<u8>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: f32,
    pub end: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    pub seek: u32,
    pub start: f32,
    pub end: f32,
    pub text: String,
    pub tokens: Vec<u32>,
    pub temperature: f32,
    pub avg_logprob: f32,
    pub compression_ratio: f32,
    pub no_speech_prob: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub model: String,
    pub input: String,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechResponse {
    pub audio: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_model_alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<DeltaToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaToolCall {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    pub call_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<DeltaFunction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_serializes_as_bare_string() {
        let msg = Message::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], serde_json::json!("hi"));
    }

    #[test]
    fn multimodal_message_serializes_as_parts_array() {
        let msg = Message::user_with_images(
            "describe this",
            vec!["https://example.com/cat.png".to_string()],
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json["content"].is_array());
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
    }

    #[test]
    fn as_text_drops_images() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "a".to_string() },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: "data:image/png;base64,AA==".to_string() },
            },
            ContentPart::Text { text: "b".to_string() },
        ]);
        assert_eq!(content.as_text(), "ab");
        assert!(content.has_image());
    }

    #[test]
    fn single_stop_sequence_serializes_as_string() {
        let stop = StopSequences::from_vec(vec!["END".to_string()]);
        assert_eq!(serde_json::to_value(&stop).unwrap(), serde_json::json!("END"));
    }

    #[test]
    fn multiple_stop_sequences_serialize_as_array() {
        let stop = StopSequences::from_vec(vec!["A".to_string(), "B".to_string()]);
        assert_eq!(
            serde_json::to_value(&stop).unwrap(),
            serde_json::json!(["A", "B"])
        );
    }
}
