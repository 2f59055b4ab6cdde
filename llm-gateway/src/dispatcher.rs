//! # Dispatcher / Orchestrator
//!
//! The outward-facing API the HTTP handlers call into. Ties together
//! request validation, the Context Window Manager, the Router, a Provider
//! adapter call, and the Billing pipeline into the four public operations:
//! `create_chat_completion`, `stream_chat_completion`, `create_embedding`,
//! `create_image`.
//!
//! Embeddings and images are resolved directly against a single mapping —
//! per the spec they are never routed (no fallback) — while chat completions
//! go through the Router so a `router:...` alias can fail over across
//! eligible mappings.

use std::collections::HashMap;
use std::sync::Arc;
use arc_swap::ArcSwap;

use llm_gateway_sdk::context::{trim_to_budget, TokenizerType};
use llm_gateway_sdk::error::ProviderError;
use llm_gateway_sdk::models::{
    ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, ImageRequest, ImageResponse,
    StreamChunk,
};
use llm_gateway_sdk::providers::{create_provider, Provider, ProviderConfig};
use llm_gateway_sdk::routing::{parse_router_alias, RoutableMapping, Router, RoutingStrategy};
use uuid::Uuid;

use crate::billing::{compute_cost, BillingPipeline, PendingCharge, Usage};
use crate::data_model::{ModelMapping, Registry};
use crate::gateway_error::GatewayError;

const DEFAULT_MAX_CONTEXT_TOKENS: u32 = 8192;

/// Orchestrates one data-plane request end to end. Holds no per-request
/// state; everything it needs is threaded through the method arguments or
/// read from the shared `Registry`/`Router`/`BillingPipeline`.
pub struct Dispatcher {
    registry: Arc<ArcSwap<Registry>>,
    router: Arc<Router>,
    billing: Arc<BillingPipeline>,
    providers: dashmap::DashMap<String, Arc<dyn Provider>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ArcSwap<Registry>>, router: Arc<Router>, billing: Arc<BillingPipeline>) -> Self {
        Self {
            registry,
            router,
            billing,
            providers: dashmap::DashMap::new(),
        }
    }

    /// Resolves (building and caching if necessary) the provider adapter
    /// for a mapping, honoring a per-call key override by constructing a
    /// fresh, uncached instance rather than mutating the shared one — per
    /// the spec's rule that adapters never share connection-level auth
    /// across calls.
    fn provider_for(
        &self,
        mapping: &ModelMapping,
        registry: &Registry,
        override_key: Option<&str>,
    ) -> Result<Arc<dyn Provider>, GatewayError> {
        let provider_record = registry.provider_for(mapping).ok_or_else(|| {
            GatewayError::Provider(ProviderError::Configuration {
                message: format!("no provider record for mapping '{}'", mapping.alias),
            })
        })?;

        if let Some(key) = override_key {
            let config = self.build_provider_config(mapping, provider_record, key, registry)?;
            let provider = create_provider(config)?;
            return Ok(Arc::from(provider));
        }

        if let Some(cached) = self.providers.get(&mapping.provider_id) {
            return Ok(Arc::clone(cached.value()));
        }

        let credential = registry
            .primary_credential(&mapping.provider_id)
            .ok_or_else(|| {
                GatewayError::Provider(ProviderError::Configuration {
                    message: format!("no primary credential for provider '{}'", mapping.provider_id),
                })
            })?;
        let config = self.build_provider_config(mapping, provider_record, &credential.api_key, registry)?;
        let provider: Arc<dyn Provider> = Arc::from(create_provider(config)?);
        self.providers.insert(mapping.provider_id.clone(), Arc::clone(&provider));
        Ok(provider)
    }

    fn build_provider_config(
        &self,
        mapping: &ModelMapping,
        provider_record: &crate::data_model::Provider,
        api_key: &str,
        _registry: &Registry,
    ) -> Result<ProviderConfig, GatewayError> {
        if api_key.is_empty() {
            return Err(GatewayError::Provider(ProviderError::Configuration {
                message: format!("empty API key for provider '{}'", mapping.provider_id),
            }));
        }
        let mut config = ProviderConfig::new(provider_record.kind.adapter_name(), api_key);
        if let Some(base_url) = &provider_record.base_url {
            config.base_url = Some(base_url.clone());
        }
        // Cloud-scoped providers (Vertex AI) resolve project/region through
        // `ProviderConfig.headers` rather than dedicated fields — mirrors
        // `GoogleVertexAIProvider::new`'s `headers.get("project-id"/"location")`.
        if let Some(project) = &provider_record.project {
            config.headers.insert("project-id".to_string(), project.clone());
        }
        if let Some(region) = &provider_record.region {
            config.headers.insert("location".to_string(), region.clone());
        }
        config
            .model_mapping
            .insert(mapping.alias.clone(), mapping.native_model_id.clone());
        Ok(config)
    }

    /// Resolves `request.model` (a concrete alias or a `router[...]`
    /// microformat string) to the ordered, eligible set of mappings a chat
    /// request may be dispatched against.
    fn resolve_chat_candidates<'a>(
        &self,
        model: &str,
        registry: &'a Registry,
    ) -> Result<(RoutingStrategy, Vec<&'a ModelMapping>), GatewayError> {
        let not_found = || {
            GatewayError::Provider(ProviderError::ModelNotFound {
                model: model.to_string(),
            })
        };

        match parse_router_alias(model) {
            Some(alias) => {
                let candidates: Vec<&ModelMapping> = registry
                    .mappings
                    .values()
                    .filter(|m| m.enabled && m.capabilities.supports_chat)
                    .filter(|m| match &alias.model {
                        Some(constraint) => &m.alias == constraint || &m.native_model_id == constraint,
                        None => true,
                    })
                    .collect();
                if candidates.is_empty() {
                    return Err(not_found());
                }
                Ok((alias.strategy, candidates))
            }
            None => {
                let mapping = registry.resolve_mapping(model).ok_or_else(not_found)?;
                if !mapping.enabled || !mapping.capabilities.supports_chat {
                    return Err(not_found());
                }
                Ok((RoutingStrategy::Simple, vec![mapping]))
            }
        }
    }

    fn routable_key(mapping: &ModelMapping) -> String {
        format!("{}::{}", mapping.provider_id, mapping.alias)
    }

    /// Pre-dispatch validation shared by chat and streaming-chat, per §4.4:
    /// non-empty model, non-empty messages, non-empty roles, and a vision
    /// capability gate enforced before any upstream is contacted.
    fn validate_chat_request(request: &ChatRequest, mapping: &ModelMapping) -> Result<(), GatewayError> {
        if request.model.trim().is_empty() {
            return Err(validation("model must not be empty"));
        }
        if request.messages.is_empty() {
            return Err(validation("messages must not be empty"));
        }
        let has_image = request.messages.iter().any(|m| m.content.has_image());
        if has_image && !mapping.capabilities.supports_vision {
            return Err(validation(&format!(
                "mapping '{}' does not support vision input",
                mapping.alias
            )));
        }
        Ok(())
    }

    fn tokenizer_for(mapping: &ModelMapping) -> TokenizerType {
        mapping
            .capabilities
            .tokenizer_type
            .as_deref()
            .map(TokenizerType::parse)
            .unwrap_or(TokenizerType::CharEstimate)
    }

    fn context_budget(mapping: &ModelMapping) -> u32 {
        mapping
            .max_context_tokens
            .or(mapping.capabilities.max_input_tokens)
            .unwrap_or(DEFAULT_MAX_CONTEXT_TOKENS)
    }

    /// `CreateChatCompletion(req, override_key?) → NormalizedResponse`.
    pub async fn create_chat_completion(
        &self,
        mut request: ChatRequest,
        group_id: &str,
        override_key: Option<String>,
    ) -> Result<ChatResponse, GatewayError> {
        let registry = self.registry.load();
        let original_alias = request.model.clone();
        let (strategy, candidates) = self.resolve_chat_candidates(&request.model, &registry)?;

        let routables: Vec<RoutableMapping> = candidates
            .iter()
            .map(|m| RoutableMapping {
                key: Self::routable_key(m),
            })
            .collect();
        let ordered = self
            .router
            .order_by_strategy(strategy, &original_alias, &routables);
        let eligible = self.router.eligible(&ordered);
        if eligible.is_empty() {
            return Err(GatewayError::Provider(ProviderError::ServiceUnavailable));
        }

        let by_key: HashMap<String, &ModelMapping> = candidates
            .iter()
            .map(|m| (Self::routable_key(m), *m))
            .collect();

        let mut last_err: Option<GatewayError> = None;
        let max_attempts = self.router.max_retries().max(1).min(eligible.len() as u32);

        for routable in eligible.iter().take(max_attempts as usize) {
            let mapping = match by_key.get(&routable.key) {
                Some(m) => *m,
                None => continue,
            };
            Self::validate_chat_request(&request, mapping)?;

            request.model = mapping.native_model_id.clone();
            trim_to_budget(
                &mut request,
                Self::tokenizer_for(mapping),
                Self::context_budget(mapping),
            )
            .map_err(GatewayError::Provider)?;

            let provider = match self.provider_for(mapping, &registry, override_key.as_deref()) {
                Ok(p) => p,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };

            match provider.chat_completion(request.clone()).await {
                Ok(mut response) => {
                    self.router.record_success(&routable.key);
                    response.model = original_alias.clone();
                    response.original_model_alias = Some(original_alias.clone());
                    self.bill_chat_usage(group_id, &response, mapping.cost.clone());
                    return Ok(response);
                }
                Err(err) => {
                    let kind = err.kind();
                    self.router.record_failure(&routable.key);
                    last_err = Some(GatewayError::Provider(err));
                    if !kind.is_some_and_retriable() {
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(GatewayError::ServiceUnavailable))
    }

    /// `StreamChatCompletion(req, override_key?) → lazy sequence of NormalizedChunk`.
    ///
    /// Unlike `create_chat_completion`, a stream that has already begun
    /// cannot be silently retried against another mapping — once the first
    /// chunk is handed to the caller the router's fallback window is
    /// closed, per §4.2's "finite; not restartable" contract. Mapping
    /// selection (including the one initial attempt) still goes through the
    /// router so `router:...` aliases resolve consistently with
    /// non-streaming calls.
    ///
    /// Returns the dispatched mapping's cost table alongside the stream so
    /// the caller can later bill the terminal usage estimate against it —
    /// the caller-facing alias (e.g. a `router:...` string) has no cost
    /// entry of its own to re-resolve.
    pub async fn stream_chat_completion(
        &self,
        mut request: ChatRequest,
        override_key: Option<String>,
    ) -> Result<
        (
            std::pin::Pin<Box<dyn futures::Stream<Item = Result<StreamChunk, ProviderError>> + Send>>,
            crate::data_model::ModelCost,
        ),
        GatewayError,
    > {
        let registry = self.registry.load();
        let original_alias = request.model.clone();
        let (strategy, candidates) = self.resolve_chat_candidates(&request.model, &registry)?;
        let routables: Vec<RoutableMapping> = candidates
            .iter()
            .map(|m| RoutableMapping {
                key: Self::routable_key(m),
            })
            .collect();
        let ordered = self
            .router
            .order_by_strategy(strategy, &original_alias, &routables);
        let eligible = self.router.eligible(&ordered);
        let routable = eligible
            .first()
            .ok_or(GatewayError::ServiceUnavailable)?;
        let mapping = candidates
            .iter()
            .find(|m| Self::routable_key(m) == routable.key)
            .copied()
            .ok_or(GatewayError::ServiceUnavailable)?;

        Self::validate_chat_request(&request, mapping)?;
        request.model = mapping.native_model_id.clone();
        trim_to_budget(
            &mut request,
            Self::tokenizer_for(mapping),
            Self::context_budget(mapping),
        )
        .map_err(GatewayError::Provider)?;

        let provider = self.provider_for(mapping, &registry, override_key.as_deref())?;
        let key = routable.key.clone();
        let router = Arc::clone(&self.router);
        let cost_table = mapping.cost.clone();
        match provider.stream_chat_completion(request).await {
            Ok(stream) => {
                router.record_success(&key);
                Ok((Box::pin(stream), cost_table))
            }
            Err(err) => {
                router.record_failure(&key);
                Err(GatewayError::Provider(err))
            }
        }
    }

    /// `CreateEmbedding(req, override_key?)` — never routed; resolves
    /// directly to the aliased mapping.
    pub async fn create_embedding(
        &self,
        request: EmbeddingRequest,
        group_id: &str,
        override_key: Option<String>,
    ) -> Result<EmbeddingResponse, GatewayError> {
        let registry = self.registry.load();
        let original_alias = request.model.clone();
        let mapping = registry.resolve_mapping(&original_alias).ok_or_else(|| {
            GatewayError::Provider(ProviderError::ModelNotFound {
                model: original_alias.clone(),
            })
        })?;
        if !mapping.enabled || !mapping.capabilities.supports_embeddings {
            return Err(GatewayError::Provider(ProviderError::FeatureNotSupported {
                feature: "embeddings".to_string(),
            }));
        }

        let provider = self.provider_for(mapping, &registry, override_key.as_deref())?;
        let mut req = request;
        req.model = mapping.native_model_id.clone();
        let response = provider.embedding(req).await.map_err(GatewayError::Provider)?;

        let cost = compute_cost(
            &Usage::Embedding {
                tokens: response.usage.total_tokens as u64,
            },
            &mapping.cost,
        );
        self.billing
            .record(PendingCharge {
                group_id: group_id.to_string(),
                cost,
                request_id: Uuid::new_v4().to_string(),
                estimated: false,
            })
            .await;
        Ok(response)
    }

    /// `CreateImage(req, override_key?)` — never routed.
    pub async fn create_image(
        &self,
        request: ImageRequest,
        group_id: &str,
        override_key: Option<String>,
    ) -> Result<ImageResponse, GatewayError> {
        let registry = self.registry.load();
        let original_alias = request.model.clone().unwrap_or_default();
        let mapping = registry.resolve_mapping(&original_alias).ok_or_else(|| {
            GatewayError::Provider(ProviderError::ModelNotFound {
                model: original_alias.clone(),
            })
        })?;
        if !mapping.enabled || !mapping.capabilities.supports_image_generation {
            return Err(GatewayError::Provider(ProviderError::FeatureNotSupported {
                feature: "image_generation".to_string(),
            }));
        }

        let provider = self.provider_for(mapping, &registry, override_key.as_deref())?;
        let mut req = request;
        req.model = Some(mapping.native_model_id.clone());
        let count = req.n.unwrap_or(1) as u64;
        let response = provider.image_generation(req).await.map_err(GatewayError::Provider)?;

        let cost = compute_cost(&Usage::Image { count }, &mapping.cost);
        self.billing
            .record(PendingCharge {
                group_id: group_id.to_string(),
                cost,
                request_id: Uuid::new_v4().to_string(),
                estimated: false,
            })
            .await;
        Ok(response)
    }

    /// Bills usage against the mapping that was actually dispatched to —
    /// `mapping.cost`, not a re-resolution of the caller-facing alias, since
    /// for a `router:...` request the alias is the microformat string and
    /// carries no cost entry of its own (`Registry::resolve_mapping` is an
    /// exact-key lookup against `ModelMapping::alias`).
    fn bill_chat_usage(&self, group_id: &str, response: &ChatResponse, cost_table: crate::data_model::ModelCost) {
        let Some(usage) = &response.usage else {
            return;
        };
        let group_id = group_id.to_string();
        let billing = Arc::clone(&self.billing);
        let prompt_tokens = usage.prompt_tokens as u64;
        let completion_tokens = usage.completion_tokens as u64;
        let request_id = response.id.clone();
        tokio::spawn(async move {
            let cost = compute_cost(
                &Usage::Chat {
                    prompt_tokens,
                    completion_tokens,
                },
                &cost_table,
            );
            billing
                .record(PendingCharge {
                    group_id,
                    cost,
                    request_id,
                    estimated: false,
                })
                .await;
        });
    }

    /// Convenience for the streaming path: the orchestrator falls back to a
    /// character-estimate of emitted text when the provider never reported
    /// usage on the terminal chunk, per §4.5 "Streaming" ("less accurate,
    /// flagged in audit"). Takes the dispatched mapping's cost table
    /// directly for the same reason `bill_chat_usage` does: the caller-facing
    /// alias (e.g. a `router:...` string) has no cost entry of its own.
    pub async fn bill_stream_usage_estimate(
        &self,
        group_id: &str,
        cost_table: &crate::data_model::ModelCost,
        estimated_completion_tokens: u64,
        request_id: String,
    ) {
        let cost = compute_cost(
            &Usage::Chat {
                prompt_tokens: 0,
                completion_tokens: estimated_completion_tokens,
            },
            cost_table,
        );
        self.billing
            .record(PendingCharge {
                group_id: group_id.to_string(),
                cost,
                request_id,
                estimated: true,
            })
            .await;
    }
}

fn validation(message: &str) -> GatewayError {
    GatewayError::Provider(ProviderError::ValidationError {
        field: "request".to_string(),
        message: message.to_string(),
    })
}

/// Small helper so [`Dispatcher`] doesn't need to special-case every
/// non-retriable kind inline; mirrors §4.2's retry table.
trait RetriableExt {
    fn is_some_and_retriable(&self) -> bool;
}

impl RetriableExt for llm_gateway_sdk::error::ErrorKind {
    fn is_some_and_retriable(&self) -> bool {
        matches!(
            self,
            llm_gateway_sdk::error::ErrorKind::RateLimited
                | llm_gateway_sdk::error::ErrorKind::Upstream
                | llm_gateway_sdk::error::ErrorKind::Timeout
                | llm_gateway_sdk::error::ErrorKind::Communication
        )
    }
}

