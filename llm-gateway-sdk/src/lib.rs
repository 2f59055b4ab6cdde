//! # LlmGateway Models SDK
//!
//! A high-performance Rust SDK for interacting with multiple AI/LLM providers
//! through a unified interface. The SDK provides seamless integration with
//! various AI services including OpenAI, Anthropic, Google, and more.
//!
//! ## Overview
//!
//! The LlmGateway Models SDK provides:
//! - **Unified Interface**: Single API for multiple AI providers
//! - **Intelligent Routing**: Automatic provider selection and load balancing
//! - **Circuit Breakers**: Automatic failover and recovery mechanisms
//! - **Caching Layer**: Built-in response caching for performance
//! - **Rate Limiting**: Per-provider rate limiting and throttling
//! - **Error Handling**: Comprehensive error handling and retry logic
//! - **Metrics Collection**: Performance monitoring and analytics
//!
//! ## Supported Providers
//!
//! The SDK supports a wide range of AI providers:
//!
//! - **OpenAI**: GPT-4, GPT-3.5, and other OpenAI models
//! - **Anthropic**: Claude-3, Claude-2, and Claude Instant
//! - **Google**: Gemini Pro, Gemini Pro Vision, and PaLM
//! - **Azure OpenAI**: Azure-hosted OpenAI models
//! - **Ollama**: Local and remote Ollama instances
//! - **Mistral AI**: Mistral 7B, Mixtral, and other models
//! - **Cohere**: Command, Command R, and other Cohere models
//! - **Custom Providers**: Extensible provider system
//!
//! ## Quick Start
//!
//! ```rust
//! use llm_gateway_sdk::{GatewayClient, ChatRequest, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create a client with multiple providers
//!     let client = GatewayClient::standalone()
//!         .with_openai("your-openai-key")
//!         .with_anthropic("your-anthropic-key")
//!         .with_ollama("http://localhost:11434")
//!         .build()?;
//!
//!     // Create a chat request
//!     let request = ChatRequest {
//!         model: "gpt-4".to_string(),
//!         messages: vec![Message::user("Hello, world!")],
//!         temperature: Some(0.7),
//!         max_tokens: Some(100),
//!         stream: Some(false),
//!         ..Default::default()
//!     };
//!
//!     // Send the request
//!     let response = client.chat_completion(request).await?;
//!     println!("Response: {}", response.choices[0].message.content);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Client Construction
//!
//! `GatewayClient::standalone()` builds a client that talks to upstream
//! providers directly, in-process:
//!
//! ```rust
//! let client = GatewayClient::standalone()
//!     .with_openai("your-key")
//!     .with_anthropic("your-key")
//!     .build()?;
//! ```
//!
//! For multi-tenant dispatch, billing, and the `router:` alias microformat
//! against persisted model mappings, see the `llm-gateway` crate, which
//! embeds this SDK's adapters behind its own HTTP surface.
//!
//! ## Routing Strategies
//!
//! Aliases of the form `router:<strategy>:<model>` resolve against the set
//! of mappings currently eligible for that model rather than naming a
//! single provider directly:
//!
//! - **Simple** / **Passthrough**: use the named mapping as-is.
//! - **Random**: uniform random choice among eligible mappings.
//! - **RoundRobin**: monotonic counter modulo the eligible count.
//! - **LeastUsed**: the eligible mapping with the smallest request count.
//!
//! ```rust
//! use llm_gateway_sdk::routing::{parse_router_alias, RoutingStrategy};
//!
//! let alias = parse_router_alias("router:roundrobin:gpt-4").unwrap();
//! assert_eq!(alias.strategy, RoutingStrategy::RoundRobin);
//! assert_eq!(alias.model.as_deref(), Some("gpt-4"));
//! ```
//!
//! ## Context Window Management
//!
//! Before a request leaves the gateway, [`trim_to_budget`] drops the oldest
//! non-protected messages so the estimated prompt fits a mapping's
//! `max_context_tokens`. The system message(s) and the final user turn are
//! never dropped; if the protected messages alone exceed the budget, the
//! request is rejected rather than silently sent to the upstream.
//!
//! ```rust
//! use llm_gateway_sdk::{trim_to_budget, TokenizerType, ChatRequest, Message};
//!
//! let mut request = ChatRequest {
//!     messages: vec![Message::system("be terse"), Message::user("hi")],
//!     ..Default::default()
//! };
//! trim_to_budget(&mut request, TokenizerType::Cl100kBase, 4096).unwrap();
//! ```
//!
//! ## Advanced Features
//!
//! ### Circuit Breakers
//!
//! Each provider can be wrapped with a [`circuit_breaker::CircuitBreaker`] via
//! [`providers::create_provider_with_circuit_breaker`], so a failing provider
//! is tripped out of rotation instead of retried into the ground:
//!
//! ```rust,ignore
//! use llm_gateway_sdk::circuit_breaker::CircuitBreakerConfig;
//! use llm_gateway_sdk::providers::create_provider_with_circuit_breaker;
//!
//! let provider = create_provider_with_circuit_breaker(
//!     inner_provider,
//!     CircuitBreakerConfig::default(),
//! );
//! ```
//!
//! ### Caching
//!
//! Built-in response caching, enabled on the builder:
//!
//! ```rust,ignore
//! use llm_gateway_sdk::cache::CacheConfig;
//!
//! let client = GatewayClient::standalone()
//!     .with_openai("your-key")
//!     .with_cache(CacheConfig::default())
//!     .build()?;
//! ```
//!
//! ## API Examples
//!
//! ### Streaming Responses
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let mut stream = client
//!     .stream_chat_completion(ChatRequest {
//!         model: "gpt-4".to_string(),
//!         messages: vec![Message::user("Tell me a story")],
//!         stream: Some(true),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! while let Some(chunk) = stream.next().await {
//!     match chunk {
//!         Ok(chunk) => {
//!             if let Some(content) = &chunk.choices[0].delta.content {
//!                 print!("{}", content);
//!             }
//!         }
//!         Err(e) => eprintln!("Error: {:?}", e),
//!     }
//! }
//! ```
//!
//! ### Embeddings
//!
//! ```rust,ignore
//! use llm_gateway_sdk::models::{EmbeddingInput, EmbeddingRequest};
//!
//! let request = EmbeddingRequest {
//!     model: "text-embedding-ada-002".to_string(),
//!     input: EmbeddingInput::String("This is a test sentence.".to_string()),
//!     ..Default::default()
//! };
//!
//! let response = client.embedding(request).await?;
//! println!("Embedding dimensions: {}", response.data[0].embedding.len());
//! ```
//!
//! ### Image Generation
//!
//! ```rust,ignore
//! use llm_gateway_sdk::models::ImageRequest;
//!
//! let request = ImageRequest {
//!     model: "dall-e-3".to_string(),
//!     prompt: "A beautiful sunset over the ocean".to_string(),
//!     n: Some(1),
//!     size: Some("1024x1024".to_string()),
//!     ..Default::default()
//! };
//!
//! let response = client.image_generation(request).await?;
//! println!("Image URL: {}", response.data[0].url);
//! ```
//!
//! ## Error Handling
//!
//! Comprehensive error handling with specific error types:
//!
//! ```rust,ignore
//! use llm_gateway_sdk::error::ClientError;
//!
//! match client.chat_completion(request).await {
//!     Ok(response) => println!("Success: {:?}", response),
//!     Err(ClientError::Authentication { message }) => {
//!         eprintln!("Authentication failed: {message}");
//!     }
//!     Err(ClientError::RateLimit) => {
//!         eprintln!("Rate limit exceeded");
//!     }
//!     Err(ClientError::Provider(inner)) => {
//!         eprintln!("Provider error: {inner}");
//!     }
//!     Err(e) => eprintln!("Other error: {:?}", e),
//! }
//! ```
//!
//! ## Testing
//!
//! Provider calls mock cleanly against `wiremock` since every adapter goes
//! through `reqwest`:
//!
//! ```rust,ignore
//! #[cfg(test)]
//! mod tests {
//!     use super::*;
//!
//!     #[tokio::test]
//!     async fn test_chat_completion() {
//!         let client = GatewayClient::standalone()
//!             .with_openai("test-key")
//!             .build()
//!             .unwrap();
//!
//!         let request = ChatRequest {
//!             model: "gpt-4".to_string(),
//!             messages: vec![Message::user("Hello")],
//!             ..Default::default()
//!         };
//!
//!         let result = client.chat_completion(request).await;
//!         assert!(result.is_ok());
//!     }
//! }
//! ```
//!
//! ## Retry Policy
//!
//! Each request is retried against the provider's retry policy before the
//! router falls back to the next eligible mapping:
//!
//! ```rust,ignore
//! use llm_gateway_sdk::client::RetryPolicy;
//! use std::time::Duration;
//!
//! let client = GatewayClient::standalone()
//!     .with_retry_policy(RetryPolicy {
//!         max_retries: 3,
//!         initial_delay: Duration::from_millis(200),
//!         max_delay: Duration::from_secs(5),
//!         backoff_multiplier: 2.0,
//!     })
//!     .with_openai("your-key")
//!     .build()?;
//! ```
//!
//! ## Contributing
//!
//! We welcome contributions! Please see our contributing guide for details on:
//!
//! - Code style and formatting
//! - Testing requirements
//! - Documentation standards
//! - Pull request process
//!
//! ## License
//!
//! This project is licensed under the MIT License - see the [LICENSE](LICENSE) file for details.
//!
//! ## Support
//!
//! For support and questions:
//!
//! - **Issues**: [GitHub Issues](https://github.com/llm-gateway/llm-gateway/issues)
//! - **Discussions**: [GitHub Discussions](https://github.com/llm-gateway/llm-gateway/discussions)
//! - **Documentation**: [Project Wiki](https://github.com/llm-gateway/llm-gateway/wiki)

pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod common;
pub mod context;
pub mod error;
pub mod models;
pub mod params;
pub mod providers;
pub mod routing;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{GatewayClient, GatewayClientBuilder};
pub use context::{trim_to_budget, TokenizerType};
pub use error::{ClientError, ProviderError};
pub use models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, Choice, EmbeddingRequest,
    EmbeddingResponse, ImageRequest, ImageResponse, Message, Role, SpeechRequest, SpeechResponse,
    Usage,
};
pub use providers::{
    create_provider_with_circuit_breaker, Provider, ProviderConfig, ProviderMetrics,
};
pub use routing::{parse_router_alias, Router, RouterAlias, RoutingStrategy};

/// Result type for SDK operations.
///
/// This is a convenience type alias for SDK operations that can fail.
/// It uses `ClientError` as the error type.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatRequest, Message, Role};

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello, world!");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content.as_text(), "Hello, world!");

        let assistant_msg = Message::assistant("Hi there!");
        assert_eq!(assistant_msg.role, Role::Assistant);
        assert_eq!(assistant_msg.content.as_text(), "Hi there!");

        let system_msg = Message::system("You are a helpful assistant.");
        assert_eq!(system_msg.role, Role::System);
        assert_eq!(system_msg.content.as_text(), "You are a helpful assistant.");
    }

    #[test]
    fn test_chat_request_default() {
        let request = ChatRequest::default();
        assert_eq!(request.model, "");
        assert_eq!(request.messages.len(), 0);
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, None);
        assert_eq!(request.stream, None);
    }

    #[test]
    fn test_provider_config_creation() {
        let config = ProviderConfig::new("test-provider", "test-key");
        assert_eq!(config.name, "test-provider");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.timeout.as_secs(), 30);
        assert_eq!(config.max_retries, 3);
        assert!(config.enabled);
    }

    #[test]
    fn test_routing_strategy_creation() {
        let simple = RoutingStrategy::Simple;
        let round_robin = RoutingStrategy::RoundRobin;
        let least_used = RoutingStrategy::LeastUsed;

        assert!(matches!(simple, RoutingStrategy::Simple));
        assert!(matches!(round_robin, RoutingStrategy::RoundRobin));
        assert!(matches!(least_used, RoutingStrategy::LeastUsed));
    }

    #[test]
    fn test_router_alias_parsing() {
        let alias = parse_router_alias("router:leastused:gpt-4").unwrap();
        assert_eq!(alias.strategy, RoutingStrategy::LeastUsed);
        assert_eq!(alias.model.as_deref(), Some("gpt-4"));

        let bare = parse_router_alias("router").unwrap();
        assert_eq!(bare.strategy, RoutingStrategy::Simple);
        assert_eq!(bare.model, None);

        assert!(parse_router_alias("gpt-4").is_none());
    }
}
