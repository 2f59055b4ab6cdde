//! # HTTP Server Module
//!
//! This module provides the HTTP server setup and configuration for the LLM Gateway.
//! It handles server initialization, middleware setup, routing, and application state management.
//!
//! ## Overview
//!
//! The server module is responsible for:
//! - **Server Initialization**: Setting up the HTTP server with Axum
//! - **Middleware Configuration**: Authentication, CORS, logging, and metrics
//! - **Route Registration**: API endpoints for chat, embeddings, and admin functions
//! - **Application State**: Shared state across all handlers
//!
//! ## Architecture
//!
//! The server uses Axum as the web framework with the following layers:
//!
//! 1. **Timeout Layer**: Request timeout handling
//! 2. **CORS Middleware**: Cross-origin resource sharing
//! 3. **Logging Middleware**: Request/response logging
//! 4. **Metrics Middleware**: Performance monitoring
//! 5. **Authentication Middleware**: API key and JWT validation
//! 6. **Input Validation Middleware**: Request validation and sanitization
//!
//! ## API Endpoints
//!
//! ### Core API Endpoints
//!
//! - `POST /v1/chat/completions` - Chat completion API
//! - `POST /v1/embeddings` - Text embedding API
//! - `POST /v1/images/generations` - Image generation API
//!
//! ### Admin Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /metrics` - Performance metrics
//! - `GET /admin/providers` - Provider status
//! - `GET /admin/config` - Configuration status
//!
//! ## Usage
//!
//! ```rust
//! use llm_gateway::server::create_server;
//! use llm_gateway::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml")?;
//!     let app = create_server(config).await?;
//!     
//!     // The server is ready to handle requests
//!     Ok(())
//! }
//! ```
//!
//! ## Middleware Stack
//!
//! The server applies middleware in the following order:
//!
//! 1. **Timeout**: Ensures requests don't hang indefinitely
//! 2. **CORS**: Handles cross-origin requests
//! 3. **Logging**: Records request/response details
//! 4. **Metrics**: Tracks performance metrics
//! 5. **Authentication**: Validates API keys and JWT tokens
//! 6. **Input Validation**: Validates and sanitizes requests
//!
//! ## Application State
//!
//! The `AppState` struct contains shared state accessible to all handlers:
//!
//! - **Configuration**: Server and provider configuration
//! - **Client**: LlmGateway SDK client for provider communication
//! - **Cache Manager**: Redis and in-memory caching
//!
//! ## Error Handling
//!
//! The server includes comprehensive error handling:
//!
//! - **Timeout Errors**: Automatic request cancellation
//! - **Authentication Errors**: Proper HTTP status codes
//! - **Validation Errors**: Detailed error messages
//! - **Provider Errors**: Graceful fallback handling

use crate::billing::{BillingPipeline, RegistryBalanceStore, DEFAULT_FLUSH_INTERVAL};
use crate::config::Config;
use crate::data_model::Registry;
use crate::dispatcher::Dispatcher;
use crate::gateway_caching::CacheManager;
use crate::handlers;
use crate::middleware::{auth_middleware, cors_middleware, logging_middleware, metrics_middleware};
use axum::{
    routing::{get, post},
    Router,
};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use llm_gateway_sdk::routing::Router as RequestRouter;
use llm_gateway_sdk::GatewayClient;

/// Application state shared across all HTTP handlers.
///
/// Contains all the necessary components for handling requests:
/// configuration, client, and caching.
///
/// # Thread Safety
///
/// All fields are wrapped in `Arc` for thread-safe sharing across
/// multiple request handlers.
pub struct AppState {
    /// Server and provider configuration
    pub config: Arc<Config>,
    /// LlmGateway SDK client for provider communication
    pub client: Arc<GatewayClient>,
    /// Redis and in-memory caching layer
    pub cache_manager: Arc<CacheManager>,
    /// Provider/mapping/virtual-key snapshot the dispatcher and auth layer
    /// resolve requests against. Readers never block a writer and never
    /// block each other; an admin-side update swaps in a whole new
    /// snapshot rather than mutating the one in place.
    pub registry: Arc<ArcSwap<Registry>>,
    /// Orchestrates validate -> context-trim -> route -> adapter -> bill
    /// for the data-plane endpoints.
    pub dispatcher: Arc<Dispatcher>,
    /// Pending-charge accumulator and background flusher.
    pub billing: Arc<BillingPipeline>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            client: self.client.clone(),
            cache_manager: self.cache_manager.clone(),
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            billing: self.billing.clone(),
        }
    }
}

/// Create and configure the HTTP server with all middleware and routes.
///
/// This function initializes all components of the gateway:
/// - LlmGateway SDK client with configured providers
/// - Cache manager (Redis or in-memory)
/// - Authentication service and rate limiter
/// - Metrics collection system
/// - HTTP server with middleware stack and routes
///
/// # Arguments
///
/// * `config` - The gateway configuration containing all settings
///
/// # Returns
///
/// Returns a configured Axum router ready to handle HTTP requests.
///
/// # Errors
///
/// Returns an error if:
/// - SDK client cannot be created
/// - Cache manager cannot be initialized
/// - Authentication service cannot be set up
/// - Metrics system cannot be initialized
///
/// # Example
///
/// ```rust
/// let config = Config::load("config.toml")?;
/// let app = create_server(config).await?;
/// ```
pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    // Create the SDK client in standalone mode with configured providers
    let mut client_builder = GatewayClient::standalone();

    // Add configured providers to the client
    for (name, provider_config) in &config.providers {
        client_builder = client_builder.with_provider(name.clone(), provider_config.clone());
    }

    // If no providers configured, add Ollama as default for development
    if config.providers.is_empty() {
        client_builder = client_builder.with_ollama("http://localhost:11434");
    }

    // Build the client with the configured routing strategy
    let client = client_builder
        .with_routing_strategy(config.routing.strategy.clone())
        .build()?;

    // Initialize cache manager with the configured backend
    let cache_manager = Arc::new(CacheManager::new(config.cache.clone()).await?);

    // Initialize authentication service and rate limiter with cache manager
    crate::auth::initialize_auth_service(config.auth.clone(), cache_manager.clone()).await;

    // Perform security sanity check for JWT secrets
    if let Err(e) = {
        // Create a temporary auth service instance for sanity checking
        let tmp = crate::auth::AuthService::new(config.auth.clone());
        tmp.sanity_check()
    } {
        return Err(anyhow::anyhow!(e.to_string()));
    }

    // Initialize rate limiter with cache manager for distributed rate limiting
    crate::auth::initialize_rate_limiter(cache_manager.clone()).await?;

    // Initialize metrics collector with configuration
    let metrics_config = crate::metrics::MetricsConfig {
        enabled: config.metrics.enabled,
        max_requests: config.metrics.max_requests,
        retention_duration: config.metrics.retention_duration,
        cleanup_interval: config.metrics.cleanup_interval,
    };
    crate::metrics::initialize_metrics(metrics_config).await;

    // Build the provider/mapping/virtual-key registry from configuration
    // and wire up the orchestrator and billing pipeline that sit behind
    // the data-plane routes.
    let registry = Arc::new(ArcSwap::new(Arc::new(Registry::from_config(&config))));
    let billing = Arc::new(BillingPipeline::new(Arc::new(RegistryBalanceStore::new(
        Arc::clone(&registry),
    ))));
    billing.spawn_flusher(DEFAULT_FLUSH_INTERVAL);
    let request_router = Arc::new(RequestRouter::default());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        request_router,
        Arc::clone(&billing),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        client: Arc::new(client),
        cache_manager,
        registry,
        dispatcher,
        billing,
    };

    // Warn if permissive CORS is used in production-like settings
    if config.server.cors.enabled && config.server.cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!(
            "CORS is enabled with wildcard origins. This is unsafe for production. Configure explicit allowed_origins."
        );
    }

    // Create the main router
    let app = Router::new()
        // OpenAI-compatible endpoints
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/completions", post(handlers::completions))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/images/generations", post(handlers::image_generations))
        .route(
            "/v1/audio/transcriptions",
            post(handlers::audio_transcriptions),
        )
        .route("/v1/audio/speech", post(handlers::text_to_speech))
        .route("/v1/models", get(handlers::list_models))
        // Health and admin endpoints
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics))
        .route("/admin/providers", get(handlers::list_providers))
        .route("/admin/config", get(handlers::get_config))
        .route(
            "/admin/circuit-breakers",
            get(handlers::get_circuit_breaker_metrics),
        )
        .route(
            "/api/batch-spending/flush",
            post(handlers::batch_spending_flush),
        )
        .layer(
            ServiceBuilder::new()
                .layer(cors_middleware(&config.server.cors)) // 1. CORS (first)
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )) // 2. Authentication (includes rate limiting)
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    logging_middleware,
                )) // 3. Logging (only authenticated requests)
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                )) // 4. Metrics (only authenticated requests)
                .layer(TimeoutLayer::new(config.server.timeout)), // 5. Timeout (last)
        )
        .with_state(state);

    Ok(app)
}
