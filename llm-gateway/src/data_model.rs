//! # Core Data Model
//!
//! The entities the dispatcher and billing pipeline reason about: providers,
//! model aliases, capabilities, cost tables, and the virtual-key credentials
//! presented on data-plane requests. These are read-mostly from the core's
//! point of view — they are created and updated by an external admin plane
//! and the gateway only resolves them at call time.
//!
//! None of these types own I/O; a [`Registry`] snapshot is loaded once (from
//! `Config` today, from a control-plane store in a fuller deployment) and
//! shared via `Arc` so that readers never block on admin-side writes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Named upstream integration, e.g. `openai`, `anthropic`, `vertex`.
///
/// The core only reads `Provider` records; they're created/updated by
/// whatever admin surface owns configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub region: Option<String>,
    pub project: Option<String>,
    pub enabled: bool,
}

/// Enumerated provider kind. Drives which SDK adapter `create_provider`
/// instantiates for this record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Vertex,
    Cohere,
    Cerebras,
    AzureOpenAi,
    Groq,
    Mistral,
    Ollama,
    OpenRouter,
    Perplexity,
    Custom,
}

impl ProviderKind {
    /// The adapter name `create_provider` dispatches on.
    pub fn adapter_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Vertex => "google",
            ProviderKind::Cohere => "cohere",
            ProviderKind::Cerebras => "cerebras",
            ProviderKind::AzureOpenAi => "azure",
            ProviderKind::Groq => "groq",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Perplexity => "perplexity",
            ProviderKind::Custom => "custom",
        }
    }

    /// Inverse of [`Self::adapter_name`], with any unrecognized name
    /// treated as a `Custom` provider rather than rejected — configuration
    /// is free to name providers after vendors this enum hasn't special-cased.
    pub fn from_adapter_name(name: &str) -> Self {
        match name {
            "openai" => ProviderKind::OpenAi,
            "anthropic" => ProviderKind::Anthropic,
            "gemini" => ProviderKind::Gemini,
            "google" | "vertex" | "google-vertex-ai" => ProviderKind::Vertex,
            "cohere" => ProviderKind::Cohere,
            "cerebras" => ProviderKind::Cerebras,
            "azure" => ProviderKind::AzureOpenAi,
            "groq" => ProviderKind::Groq,
            "mistral" => ProviderKind::Mistral,
            "ollama" => ProviderKind::Ollama,
            "openrouter" => ProviderKind::OpenRouter,
            "perplexity" => ProviderKind::Perplexity,
            _ => ProviderKind::Custom,
        }
    }
}

/// An API key (plus optional secondary metadata, e.g. an Azure resource
/// name) bound to a [`Provider`]. Exactly one credential per provider is
/// marked `primary`; the dispatcher resolves "primary" at call time unless
/// a per-call override key is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderKeyCredential {
    pub id: String,
    pub provider_id: String,
    pub api_key: String,
    pub secondary: Option<String>,
    pub primary: bool,
}

/// Declarative feature map shared by reference across one or more
/// [`ModelMapping`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_chat: bool,
    pub supports_streaming: bool,
    pub supports_vision: bool,
    pub supports_function_calling: bool,
    pub supports_embeddings: bool,
    pub supports_image_generation: bool,
    pub supports_audio_transcription: bool,
    pub supports_audio_synthesis: bool,
    pub supports_realtime: bool,
    pub max_input_tokens: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub tokenizer_type: Option<String>,
    pub voices: Vec<String>,
    pub languages: Vec<String>,
    pub formats: Vec<String>,
}

impl Default for Capabilities {
    /// A plain chat-and-streaming model with no multimodal or embedding support.
    fn default() -> Self {
        Self {
            supports_chat: true,
            supports_streaming: true,
            supports_vision: false,
            supports_function_calling: false,
            supports_embeddings: false,
            supports_image_generation: false,
            supports_audio_transcription: false,
            supports_audio_synthesis: false,
            supports_realtime: false,
            max_input_tokens: None,
            max_output_tokens: None,
            tokenizer_type: None,
            voices: Vec::new(),
            languages: Vec::new(),
            formats: Vec::new(),
        }
    }
}

/// Input/output cost per million tokens (or per-unit, for embeddings/images)
/// for one or more mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCost {
    pub input_cost_per_million: Decimal,
    pub output_cost_per_million: Decimal,
    pub embedding_cost_per_million: Decimal,
    pub image_cost_each: Decimal,
}

impl Default for ModelCost {
    fn default() -> Self {
        Self {
            input_cost_per_million: Decimal::ZERO,
            output_cost_per_million: Decimal::ZERO,
            embedding_cost_per_million: Decimal::ZERO,
            image_cost_each: Decimal::ZERO,
        }
    }
}

/// A tenant-visible model alias (e.g. `gpt-4`) mapped to a concrete
/// provider + native model id, its capability flags, and optional per-alias
/// context window override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMapping {
    pub alias: String,
    pub provider_id: String,
    pub native_model_id: String,
    pub capabilities: Capabilities,
    pub cost: ModelCost,
    pub max_context_tokens: Option<u32>,
    pub enabled: bool,
}

/// Prepaid balance bucket. `balance` is monotonically non-increasing under
/// use and replenished externally (the core never increases it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualKeyGroup {
    pub id: String,
    pub name: String,
    pub balance: Decimal,
}

/// Prefix every [`VirtualKey::secret`] carries, per the spec's bearer-token
/// format `ck-<48-char-secret>`.
pub const VIRTUAL_KEY_PREFIX: &str = "ck-";

/// The bearer token presented on data-plane requests. Only the SHA-256 hash
/// of the secret is persisted/compared; the plaintext secret exists only at
/// issuance time and in the `Authorization` header of each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualKey {
    pub id: String,
    pub group_id: String,
    pub secret_hash: String,
    pub enabled: bool,
    pub allowed_models: Vec<String>,
}

impl VirtualKey {
    /// SHA-256 hex digest of a bearer secret, as persisted in `secret_hash`.
    pub fn hash_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Strips the `ck-` prefix and hashes the remainder; returns `None` if
    /// the bearer value doesn't carry the expected prefix.
    pub fn hash_from_bearer(bearer: &str) -> Option<String> {
        bearer
            .strip_prefix(VIRTUAL_KEY_PREFIX)
            .map(Self::hash_secret)
    }
}

/// Short-TTL, optionally single-use credential for admin-plane requests.
/// Created server-side, flagged on the request context for deletion, and
/// reaped post-response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralMasterKey {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub single_use: bool,
}

impl EphemeralMasterKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Read-mostly snapshot of the entities above, built from [`crate::config::Config`]
/// today. Lookups never mutate; admin-side changes replace the whole
/// snapshot (write-through, readers hold the old `Arc` until they next
/// resolve).
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub providers: HashMap<String, Provider>,
    pub credentials: HashMap<String, ProviderKeyCredential>,
    pub mappings: HashMap<String, ModelMapping>,
    pub groups: HashMap<String, VirtualKeyGroup>,
    pub keys_by_hash: HashMap<String, VirtualKey>,
}

impl Registry {
    /// Resolves a tenant-visible alias to its mapping. Per invariant 1, an
    /// alias with no mapping must fail fast — callers map `None` to a
    /// `ModelUnavailable` error.
    pub fn resolve_mapping(&self, alias: &str) -> Option<&ModelMapping> {
        self.mappings.get(alias)
    }

    pub fn provider_for(&self, mapping: &ModelMapping) -> Option<&Provider> {
        self.providers.get(&mapping.provider_id)
    }

    pub fn primary_credential(&self, provider_id: &str) -> Option<&ProviderKeyCredential> {
        self.credentials
            .values()
            .find(|c| c.provider_id == provider_id && c.primary)
    }

    /// Resolves a bearer `Authorization` header value to the presenting
    /// `VirtualKey`, or `None` if unknown/malformed.
    pub fn resolve_virtual_key(&self, bearer: &str) -> Option<&VirtualKey> {
        let hash = VirtualKey::hash_from_bearer(bearer)?;
        self.keys_by_hash.get(&hash)
    }

    pub fn group_for(&self, key: &VirtualKey) -> Option<&VirtualKeyGroup> {
        self.groups.get(&key.group_id)
    }

    /// Builds a `Registry` snapshot from `Config`: one `Provider` +
    /// `ProviderKeyCredential` per configured provider entry, one
    /// `ModelMapping` per `model_mapping` pair it declares, and one
    /// `VirtualKeyGroup`/`VirtualKey` per configured API key (bridging the
    /// donor's flat `ApiKeyConfig` list onto the spec's balance-bucket
    /// model with an unmetered/unlimited starting balance, since the
    /// existing config schema carries no cost data).
    ///
    /// Mappings default to a plain chat-and-streaming `Capabilities` and
    /// zero cost; an admin surface that manages `ModelMapping`/`ModelCost`
    /// directly would replace this bridge entirely.
    pub fn from_config(config: &crate::config::Config) -> Self {
        let mut registry = Registry::default();

        for (name, provider_config) in &config.providers {
            let kind = ProviderKind::from_adapter_name(name);
            registry.providers.insert(
                name.clone(),
                Provider {
                    id: name.clone(),
                    kind,
                    base_url: provider_config.base_url.clone(),
                    region: provider_config.headers.get("location").cloned(),
                    project: provider_config.headers.get("project-id").cloned(),
                    enabled: provider_config.enabled,
                },
            );
            registry.credentials.insert(
                format!("{name}-primary"),
                ProviderKeyCredential {
                    id: format!("{name}-primary"),
                    provider_id: name.clone(),
                    api_key: provider_config.api_key.clone(),
                    secondary: None,
                    primary: true,
                },
            );
            for (alias, native_model_id) in &provider_config.model_mapping {
                registry.mappings.insert(
                    alias.clone(),
                    ModelMapping {
                        alias: alias.clone(),
                        provider_id: name.clone(),
                        native_model_id: native_model_id.clone(),
                        capabilities: Capabilities::default(),
                        cost: ModelCost::default(),
                        max_context_tokens: None,
                        enabled: true,
                    },
                );
            }
        }

        registry.groups.insert(
            "default".to_string(),
            VirtualKeyGroup {
                id: "default".to_string(),
                name: "default".to_string(),
                balance: Decimal::from(1_000_000),
            },
        );
        for api_key in &config.auth.api_keys {
            let hash = VirtualKey::hash_from_bearer(&api_key.key)
                .unwrap_or_else(|| VirtualKey::hash_secret(&api_key.key));
            registry.keys_by_hash.insert(
                hash,
                VirtualKey {
                    id: api_key.name.clone(),
                    group_id: "default".to_string(),
                    secret_hash: String::new(),
                    enabled: api_key.enabled,
                    allowed_models: api_key.allowed_models.clone().unwrap_or_default(),
                },
            );
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_secret_deterministically() {
        let a = VirtualKey::hash_secret("abc123");
        let b = VirtualKey::hash_secret("abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_from_bearer_requires_prefix() {
        assert!(VirtualKey::hash_from_bearer("not-a-key").is_none());
        assert!(VirtualKey::hash_from_bearer("ck-abc123").is_some());
    }

    #[test]
    fn registry_resolves_virtual_key_by_hash() {
        let secret = "ck-testsecret";
        let hash = VirtualKey::hash_from_bearer(secret).unwrap();
        let mut registry = Registry::default();
        registry.keys_by_hash.insert(
            hash,
            VirtualKey {
                id: "vk_1".into(),
                group_id: "grp_1".into(),
                secret_hash: String::new(),
                enabled: true,
                allowed_models: vec![],
            },
        );
        let resolved = registry.resolve_virtual_key(secret).unwrap();
        assert_eq!(resolved.id, "vk_1");
        assert!(registry.resolve_virtual_key("ck-wrong").is_none());
    }
}
