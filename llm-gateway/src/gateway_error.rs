//! # Gateway Error Types Module
//!
//! This module defines the comprehensive error types for the LLM Gateway,
//! providing standardized error handling and HTTP response mapping for all
//! gateway operations.
//!
//! ## Overview
//!
//! The error system provides:
//! - **Standardized Error Types**: Consistent error patterns across the gateway
//! - **HTTP Response Mapping**: Automatic conversion to appropriate HTTP status codes
//! - **Error Context**: Rich error information for debugging and monitoring
//! - **Error Propagation**: Proper error handling throughout the application
//! - **Client-Friendly Messages**: User-friendly error messages
//!
//! ## Error Categories
//!
//! The gateway defines several error categories:
//!
//! ### Client Errors
//! Errors originating from the client SDK:
//! - **Authentication Errors**: Invalid API keys or tokens
//! - **Rate Limit Errors**: Request or token limit violations
//! - **Invalid Request Errors**: Malformed or invalid requests
//! - **Network Errors**: Connection and communication failures
//!
//! ### Provider Errors
//! Errors from AI/LLM providers:
//! - **API Key Errors**: Invalid provider API keys
//! - **Rate Limit Errors**: Provider-specific rate limits
//! - **Quota Errors**: Provider quota exceeded
//! - **Model Errors**: Unsupported or unavailable models
//! - **Service Errors**: Provider service unavailability
//!
//! ### Gateway Errors
//! Internal gateway errors:
//! - **Authentication Errors**: Gateway authentication failures
//! - **Rate Limit Errors**: Gateway rate limiting
//! - **Content Filtering**: Content moderation failures
//! - **Configuration Errors**: Invalid gateway configuration
//! - **Cache Errors**: Caching operation failures
//! - **Plugin Errors**: Plugin execution failures
//!
//! ## HTTP Status Code Mapping
//!
//! Errors are automatically mapped to appropriate HTTP status codes:
//!
//! - **400 Bad Request**: Invalid requests and malformed data
//! - **401 Unauthorized**: Authentication and authorization failures
//! - **429 Too Many Requests**: Rate limit violations
//! - **500 Internal Server Error**: Internal gateway errors
//! - **503 Service Unavailable**: Provider or service unavailability
//!
//! ## Usage
//!
//! ```rust
//! use llm_gateway::gateway_error::GatewayError;
//!
//! // Create specific error types
//! let auth_error = GatewayError::Auth {
//!     message: "Invalid API key".to_string(),
//! };
//!
//! let rate_limit_error = GatewayError::RateLimit {
//!     message: "Rate limit exceeded".to_string(),
//! };
//!
//! // Errors automatically convert to HTTP responses
//! let response = auth_error.into_response();
//! ```
//!
//! ## Error Handling
//!
//! The error system integrates with Axum for automatic HTTP response generation:
//!
//! ```rust
//! use axum::{Json, extract::State};
//! use llm_gateway::gateway_error::GatewayError;
//!
//! async fn handler() -> Result<Json<Value>, GatewayError> {
//!     // Your handler logic here
//!     if some_condition {
//!         return Err(GatewayError::Auth {
//!             message: "Authentication required".to_string(),
//!         });
//!     }
//!     Ok(Json(json!({"status": "success"})))
//! }
//! ```
//!
//! ## Error Context
//!
//! Each error includes context for debugging and monitoring:
//!
//! - **Error Type**: Categorized error type for filtering
//! - **Error Message**: Human-readable error description
//! - **HTTP Status**: Appropriate HTTP status code
//! - **Error Code**: Machine-readable error identifier
//! - **Timestamp**: When the error occurred
//! - **Request ID**: Associated request identifier

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use llm_gateway_sdk::error::{ClientError, ProviderError};

/// Comprehensive error types for the LLM Gateway.
///
/// This enum defines all possible error types that can occur in the gateway,
/// including client errors, provider errors, and internal gateway errors.
/// Each error variant includes appropriate error messages and can be
/// automatically converted to HTTP responses.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Errors originating from the client SDK
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Errors from AI/LLM providers
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Gateway authentication and authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Invalid or malformed request errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Rate limiting and quota violation errors
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    /// Content filtering and moderation errors
    #[error("Content filtered: {message}")]
    ContentFiltered { message: String },

    /// Internal gateway server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// Service unavailability errors
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Configuration and setup errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// JSON serialization and deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Plugin execution and management errors
    #[error("Plugin error: {message}")]
    Plugin { message: String },

    /// No virtual key matched the bearer token on a data-plane request.
    #[error("Virtual key not found")]
    VirtualKeyNotFound,

    /// The virtual key resolved but is disabled, or its group has been
    /// exhausted/disabled externally.
    #[error("Virtual key disabled: {message}")]
    VirtualKeyDisabled { message: String },

    /// Admin-plane auth failed (master key mismatch or expired ephemeral key).
    #[error("Admin authentication failed")]
    AdminAuthFailed,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type) = match &self {
            GatewayError::Client(e) => match e {
                ClientError::Authentication { .. } => (
                    StatusCode::UNAUTHORIZED,
                    self.to_string(),
                    "authentication_error",
                ),
                ClientError::RateLimit => (
                    StatusCode::TOO_MANY_REQUESTS,
                    self.to_string(),
                    "rate_limit_error",
                ),
                ClientError::InvalidRequest { .. } => {
                    (StatusCode::BAD_REQUEST, self.to_string(), "invalid_request")
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    self.to_string(),
                    "client_error",
                ),
            },
            // Every ProviderError is classified into one of the ten error
            // kinds in llm_gateway_sdk::error::ErrorKind; the HTTP status
            // and the `type` tag surfaced to callers both derive from that
            // single classification rather than being re-derived per variant.
            GatewayError::Provider(e) => {
                let kind = e.kind();
                let status = StatusCode::from_u16(kind.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let kind_tag = match kind {
                    llm_gateway_sdk::error::ErrorKind::Configuration => "configuration",
                    llm_gateway_sdk::error::ErrorKind::Validation => "validation",
                    llm_gateway_sdk::error::ErrorKind::Authentication => "authentication",
                    llm_gateway_sdk::error::ErrorKind::RateLimited => "rate_limited",
                    llm_gateway_sdk::error::ErrorKind::ModelUnavailable => "model_unavailable",
                    llm_gateway_sdk::error::ErrorKind::Upstream => "upstream",
                    llm_gateway_sdk::error::ErrorKind::Timeout => "timeout",
                    llm_gateway_sdk::error::ErrorKind::Cancelled => "cancelled",
                    llm_gateway_sdk::error::ErrorKind::Unsupported => "unsupported",
                    llm_gateway_sdk::error::ErrorKind::Communication => "communication",
                };
                (status, self.to_string(), kind_tag)
            }
            GatewayError::Auth { .. } => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "authentication_error",
            ),
            GatewayError::RateLimit { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                self.to_string(),
                "rate_limit_error",
            ),
            GatewayError::InvalidRequest { .. } => {
                (StatusCode::BAD_REQUEST, self.to_string(), "invalid_request")
            }
            GatewayError::ContentFiltered { .. } => (
                StatusCode::BAD_REQUEST,
                self.to_string(),
                "content_filtered",
            ),
            GatewayError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                self.to_string(),
                "service_unavailable",
            ),
            GatewayError::Config { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
                "configuration_error",
            ),
            GatewayError::Cache { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
                "cache_error",
            ),
            GatewayError::Plugin { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
                "plugin_error",
            ),
            GatewayError::VirtualKeyNotFound => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "authentication",
            ),
            GatewayError::VirtualKeyDisabled { .. } => (
                StatusCode::FORBIDDEN,
                self.to_string(),
                "virtual_key_disabled",
            ),
            GatewayError::AdminAuthFailed => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "admin_authentication",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
                "internal_error",
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}
