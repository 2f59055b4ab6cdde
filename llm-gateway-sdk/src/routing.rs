//! # Routing Module
//!
//! Provider/model selection for `router`-style aliases. A request whose
//! `model` field is `router`, `router:<strategy>`, `router:<model>`, or
//! `router:<strategy>:<model>` is resolved against the set of mappings that
//! are currently eligible (enabled, capable, and not in cool-off) rather than
//! naming a single mapping directly.
//!
//! ## Alias microformat
//!
//! - `router` — default strategy (`simple`), no model constraint.
//! - `router:<strategy>` — `strategy ∈ {simple,random,roundrobin,leastused,passthrough}`,
//!   matched case-insensitively, no model constraint.
//! - `router:<model>` — second segment isn't a known strategy, so it's taken
//!   as the model constraint with the default strategy.
//! - `router:<strategy>:<model>` — both given explicitly.
//! - Anything else is a direct model alias; routing does not apply.
//!
//! ## Health tracking
//!
//! Each mapping key accumulates a consecutive-failure counter. After
//! `failure_threshold` (default 3) consecutive upstream/communication
//! failures the mapping is placed in cool-off for `cooldown` (default 60s)
//! and excluded from selection unless it is the only eligible mapping left.
//! A single success resets the counter and clears cool-off immediately.

use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The five routing strategies recognized in the `router:<strategy>:<model>`
/// alias microformat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingStrategy {
    /// Use the named model as-is; no alternative is considered.
    #[default]
    Simple,
    /// Identical to `Simple` — accepted as an explicit synonym in aliases.
    Passthrough,
    /// Uniform random choice among eligible mappings.
    Random,
    /// Monotonic per-group counter, advanced atomically, modulo the eligible count.
    RoundRobin,
    /// The eligible mapping with the smallest in-process request count;
    /// ties broken by insertion order.
    LeastUsed,
}

impl RoutingStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "passthrough" => Some(Self::Passthrough),
            "random" => Some(Self::Random),
            "roundrobin" => Some(Self::RoundRobin),
            "leastused" => Some(Self::LeastUsed),
            _ => None,
        }
    }
}

/// A parsed `router[...]` alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAlias {
    pub strategy: RoutingStrategy,
    pub model: Option<String>,
}

/// Parses the `model` field of an incoming request against the `router`
/// microformat. Returns `None` when `model` does not start with `router` —
/// the caller should then treat it as a direct alias with no routing.
pub fn parse_router_alias(model: &str) -> Option<RouterAlias> {
    let mut parts = model.splitn(3, ':');
    if parts.next()? != "router" {
        return None;
    }

    let second = parts.next();
    let third = parts.next();

    match (second, third) {
        (None, _) => Some(RouterAlias {
            strategy: RoutingStrategy::default(),
            model: None,
        }),
        (Some(seg2), None) => match RoutingStrategy::parse(seg2) {
            Some(strategy) => Some(RouterAlias {
                strategy,
                model: None,
            }),
            None => Some(RouterAlias {
                strategy: RoutingStrategy::default(),
                model: Some(seg2.to_string()),
            }),
        },
        (Some(seg2), Some(seg3)) => {
            let strategy = RoutingStrategy::parse(seg2).unwrap_or_default();
            Some(RouterAlias {
                strategy,
                model: Some(seg3.to_string()),
            })
        }
    }
}

/// An eligible mapping handed to the router for one selection round.
/// `key` is whatever the caller uses to correlate a selection back to a
/// concrete provider+model mapping (e.g. a UUID or a composite string).
#[derive(Debug, Clone)]
pub struct RoutableMapping {
    pub key: String,
}

#[derive(Debug, Default)]
struct MappingHealth {
    consecutive_failures: AtomicU64,
    /// Millis since process start at which cool-off ends; 0 means not cooling off.
    cooldown_until_millis: AtomicU64,
    request_count: AtomicU64,
}

/// Tracks per-mapping health and request counts and resolves `router`
/// aliases to a concrete mapping, retrying over the remaining eligible set
/// on retriable failures.
pub struct Router {
    started_at: Instant,
    failure_threshold: u64,
    cooldown: Duration,
    max_retries: u32,
    health: dashmap::DashMap<String, Arc<MappingHealth>>,
    round_robin_counters: dashmap::DashMap<String, AtomicU64>,
}

impl Router {
    pub fn new(failure_threshold: u64, cooldown: Duration, max_retries: u32) -> Self {
        Self {
            started_at: Instant::now(),
            failure_threshold,
            cooldown,
            max_retries,
            health: dashmap::DashMap::new(),
            round_robin_counters: dashmap::DashMap::new(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn health_for(&self, key: &str) -> Arc<MappingHealth> {
        self.health
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(MappingHealth::default()))
            .clone()
    }

    /// Whether `key` is currently in cool-off.
    pub fn is_unhealthy(&self, key: &str) -> bool {
        let health = self.health_for(key);
        let until = health.cooldown_until_millis.load(Ordering::Relaxed);
        until != 0 && self.now_millis() < until
    }

    /// Records a successful call: resets the failure counter and lifts any
    /// cool-off immediately.
    pub fn record_success(&self, key: &str) {
        let health = self.health_for(key);
        health.consecutive_failures.store(0, Ordering::Relaxed);
        health.cooldown_until_millis.store(0, Ordering::Relaxed);
        health.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed call. Once `failure_threshold` consecutive failures
    /// accumulate, the mapping enters cool-off for `cooldown`.
    pub fn record_failure(&self, key: &str) {
        let health = self.health_for(key);
        let failures = health.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.failure_threshold {
            health
                .cooldown_until_millis
                .store(self.now_millis() + self.cooldown.as_millis() as u64, Ordering::Relaxed);
        }
    }

    fn request_count(&self, key: &str) -> u64 {
        self.health_for(key).request_count.load(Ordering::Relaxed)
    }

    /// Filters `mappings` down to those not currently in cool-off, unless
    /// doing so would leave nothing — in that case the full set is returned
    /// so a caller can still attempt the call against a degraded mapping.
    pub fn eligible<'a>(&self, mappings: &'a [RoutableMapping]) -> Vec<&'a RoutableMapping> {
        let healthy: Vec<&RoutableMapping> = mappings
            .iter()
            .filter(|m| !self.is_unhealthy(&m.key))
            .collect();
        if healthy.is_empty() {
            mappings.iter().collect()
        } else {
            healthy
        }
    }

    /// Orders the eligible mappings according to `strategy` for a single
    /// selection round (first element is the primary choice, the rest are
    /// the fallback order for retries).
    pub fn order_by_strategy(
        &self,
        strategy: RoutingStrategy,
        group_key: &str,
        mappings: &[RoutableMapping],
    ) -> Vec<RoutableMapping> {
        if mappings.is_empty() {
            return Vec::new();
        }
        match strategy {
            RoutingStrategy::Simple | RoutingStrategy::Passthrough => mappings.to_vec(),
            RoutingStrategy::Random => {
                let mut ordered = mappings.to_vec();
                let mut rng = rand::thread_rng();
                let start = rng.gen_range(0..ordered.len());
                ordered.rotate_left(start);
                ordered
            }
            RoutingStrategy::RoundRobin => {
                let counter = self
                    .round_robin_counters
                    .entry(group_key.to_string())
                    .or_insert_with(|| AtomicU64::new(0));
                let idx = counter.fetch_add(1, Ordering::Relaxed) as usize % mappings.len();
                let mut ordered = mappings.to_vec();
                ordered.rotate_left(idx);
                ordered
            }
            RoutingStrategy::LeastUsed => {
                let mut ordered: Vec<RoutableMapping> = mappings.to_vec();
                ordered.sort_by_key(|m| self.request_count(&m.key));
                ordered
            }
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60), 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_router() {
        let alias = parse_router_alias("router").unwrap();
        assert_eq!(alias.strategy, RoutingStrategy::Simple);
        assert_eq!(alias.model, None);
    }

    #[test]
    fn parses_strategy_only() {
        let alias = parse_router_alias("router:roundrobin").unwrap();
        assert_eq!(alias.strategy, RoutingStrategy::RoundRobin);
        assert_eq!(alias.model, None);
    }

    #[test]
    fn parses_strategy_case_insensitively() {
        let alias = parse_router_alias("router:RoundRobin").unwrap();
        assert_eq!(alias.strategy, RoutingStrategy::RoundRobin);
    }

    #[test]
    fn second_segment_falls_back_to_model_when_not_a_strategy() {
        let alias = parse_router_alias("router:gpt-4o").unwrap();
        assert_eq!(alias.strategy, RoutingStrategy::Simple);
        assert_eq!(alias.model, Some("gpt-4o".to_string()));
    }

    #[test]
    fn parses_strategy_and_model() {
        let alias = parse_router_alias("router:leastused:gpt-4o").unwrap();
        assert_eq!(alias.strategy, RoutingStrategy::LeastUsed);
        assert_eq!(alias.model, Some("gpt-4o".to_string()));
    }

    #[test]
    fn non_router_model_is_not_parsed() {
        assert!(parse_router_alias("gpt-4o").is_none());
    }

    #[test]
    fn mapping_becomes_unhealthy_after_threshold_and_recovers_on_success() {
        let router = Router::new(3, Duration::from_secs(60), 3);
        router.record_failure("m1");
        router.record_failure("m1");
        assert!(!router.is_unhealthy("m1"));
        router.record_failure("m1");
        assert!(router.is_unhealthy("m1"));
        router.record_success("m1");
        assert!(!router.is_unhealthy("m1"));
    }

    #[test]
    fn eligible_falls_back_to_full_set_when_all_unhealthy() {
        let router = Router::new(1, Duration::from_secs(60), 3);
        let mappings = vec![
            RoutableMapping { key: "a".to_string() },
            RoutableMapping { key: "b".to_string() },
        ];
        router.record_failure("a");
        router.record_failure("b");
        let eligible = router.eligible(&mappings);
        assert_eq!(eligible.len(), 2);
    }

    #[test]
    fn round_robin_advances_monotonically() {
        let router = Router::new(3, Duration::from_secs(60), 3);
        let mappings = vec![
            RoutableMapping { key: "a".to_string() },
            RoutableMapping { key: "b".to_string() },
            RoutableMapping { key: "c".to_string() },
        ];
        let first = router.order_by_strategy(RoutingStrategy::RoundRobin, "g", &mappings);
        let second = router.order_by_strategy(RoutingStrategy::RoundRobin, "g", &mappings);
        assert_ne!(first[0].key, second[0].key);
    }

    #[test]
    fn least_used_prefers_lower_request_count() {
        let router = Router::new(3, Duration::from_secs(60), 3);
        router.record_success("a");
        router.record_success("a");
        router.record_success("b");
        let mappings = vec![
            RoutableMapping { key: "a".to_string() },
            RoutableMapping { key: "b".to_string() },
        ];
        let ordered = router.order_by_strategy(RoutingStrategy::LeastUsed, "g", &mappings);
        assert_eq!(ordered[0].key, "b");
    }
}
