//! # Billing Pipeline
//!
//! Computes post-hoc cost from reported token/unit usage, decrements the
//! owning [`VirtualKeyGroup`](crate::data_model::VirtualKeyGroup) balance in
//! batches, and exposes an explicit-flush path for deterministic testing and
//! the `/api/batch-spending/flush` admin endpoint.
//!
//! Mirrors the accumulate-then-flush shape `gateway_caching`'s
//! background-task pattern uses elsewhere in this crate: a `DashMap`-backed
//! in-memory buffer, a periodic `tokio::spawn` flusher, and an explicit
//! trigger channel so tests don't have to sleep past the flush interval.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::data_model::Registry;

/// Default interval between automatic flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Accumulator size that forces an immediate flush regardless of the timer.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 500;
/// Retries before a failed debit is moved to the error queue.
pub const DEFAULT_MAX_DEBIT_RETRIES: u32 = 5;

/// One accumulated charge awaiting a batched debit.
#[derive(Debug, Clone)]
pub struct PendingCharge {
    pub group_id: String,
    pub cost: Decimal,
    pub request_id: String,
    pub estimated: bool,
}

/// Source of the usage figures a charge was computed from.
pub enum Usage {
    Chat { prompt_tokens: u64, completion_tokens: u64 },
    Embedding { tokens: u64 },
    Image { count: u64 },
}

/// Computes cost per the formula in the billing spec:
/// `prompt_tokens * input_cost_per_M / 1e6 + completion_tokens * output_cost_per_M / 1e6`
/// (and the embedding/image analogues), at full `Decimal` precision.
pub fn compute_cost(usage: &Usage, cost: &crate::data_model::ModelCost) -> Decimal {
    const MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
    match usage {
        Usage::Chat {
            prompt_tokens,
            completion_tokens,
        } => {
            let input = Decimal::from(*prompt_tokens) * cost.input_cost_per_million / MILLION;
            let output = Decimal::from(*completion_tokens) * cost.output_cost_per_million / MILLION;
            input + output
        }
        Usage::Embedding { tokens } => {
            Decimal::from(*tokens) * cost.embedding_cost_per_million / MILLION
        }
        Usage::Image { count } => Decimal::from(*count) * cost.image_cost_each,
    }
}

/// A durable record of one applied (or failed) debit, for audit purposes.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub request_id: String,
    pub group_id: String,
    pub cost: Decimal,
    pub estimated: bool,
    pub attempt: u32,
    pub succeeded: bool,
}

/// Applies a batched debit to group balances. The default implementation
/// mutates the in-memory [`Registry`] snapshot; a real deployment would swap
/// this for a transactional store, which is why the trait exists rather than
/// inlining the mutation into the flusher.
#[async_trait::async_trait]
pub trait BalanceStore: Send + Sync {
    /// Applies all charges atomically per group and returns the subset that
    /// failed to persist (to be re-queued). `request_id` is the idempotency
    /// key: a store MUST NOT apply the same `request_id` twice.
    async fn apply_batch(&self, charges: &[PendingCharge]) -> Vec<PendingCharge>;
}

/// `BalanceStore` over the shared in-process [`Registry`]. Tracks applied
/// `request_id`s in memory so a re-delivered charge (e.g. after a retry) is
/// a no-op rather than a double debit.
pub struct RegistryBalanceStore {
    registry: Arc<arc_swap::ArcSwap<Registry>>,
    applied_request_ids: DashMap<String, ()>,
}

impl RegistryBalanceStore {
    pub fn new(registry: Arc<arc_swap::ArcSwap<Registry>>) -> Self {
        Self {
            registry,
            applied_request_ids: DashMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl BalanceStore for RegistryBalanceStore {
    async fn apply_batch(&self, charges: &[PendingCharge]) -> Vec<PendingCharge> {
        let mut by_group: std::collections::HashMap<String, Decimal> =
            std::collections::HashMap::new();
        let mut fresh: Vec<&PendingCharge> = Vec::new();
        for charge in charges {
            if self.applied_request_ids.contains_key(&charge.request_id) {
                continue;
            }
            *by_group.entry(charge.group_id.clone()).or_insert(Decimal::ZERO) += charge.cost;
            fresh.push(charge);
        }

        // Registry updates are whole-snapshot swaps, not in-place mutation:
        // clone the current snapshot, apply the batch, publish the result.
        // A concurrent admin-side swap between load and store would be lost;
        // acceptable here since the flusher is the sole writer of balances.
        let current = self.registry.load_full();
        let mut next = (*current).clone();
        for (group_id, total) in &by_group {
            if let Some(group) = next.groups.get_mut(group_id) {
                group.balance -= total;
            } else {
                tracing::warn!(group_id, "billing flush referenced unknown virtual key group");
            }
        }
        self.registry.store(Arc::new(next));

        for charge in fresh {
            self.applied_request_ids.insert(charge.request_id.clone(), ());
        }

        Vec::new()
    }
}

/// Reason an explicit flush was requested, mirrored from the admin API body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPriority {
    Normal,
    High,
}

/// Owns the pending-charge accumulator and the background flusher task.
///
/// Per the concurrency model, the accumulator is single-writer-per-group in
/// spirit but implemented as a plain mutex-guarded `Vec`: billing volume is
/// orders of magnitude lower than data-plane request volume, so a full
/// lock-free structure isn't warranted.
pub struct BillingPipeline {
    pending: Mutex<Vec<PendingCharge>>,
    store: Arc<dyn BalanceStore>,
    audit_log: Mutex<Vec<AuditEntry>>,
    error_queue: Mutex<Vec<(PendingCharge, u32)>>,
    flush_threshold: usize,
    max_debit_retries: u32,
    total_charges_recorded: AtomicU64,
}

impl BillingPipeline {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            store,
            audit_log: Mutex::new(Vec::new()),
            error_queue: Mutex::new(Vec::new()),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_debit_retries: DEFAULT_MAX_DEBIT_RETRIES,
            total_charges_recorded: AtomicU64::new(0),
        }
    }

    /// Appends a charge to the accumulator. Called by the dispatcher after a
    /// successful request; never blocks on I/O. Triggers an out-of-band
    /// flush if the accumulator has grown past `flush_threshold`.
    pub async fn record(&self, charge: PendingCharge) {
        let should_flush = {
            let mut pending = self.pending.lock().await;
            pending.push(charge);
            self.total_charges_recorded.fetch_add(1, Ordering::Relaxed);
            pending.len() >= self.flush_threshold
        };
        if should_flush {
            self.flush(FlushPriority::Normal).await;
        }
    }

    /// Starts the periodic flusher as a background task. The task runs for
    /// the lifetime of the pipeline `Arc`; there is no explicit shutdown
    /// since the process exiting is the only supported teardown path today.
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                pipeline.flush(FlushPriority::Normal).await;
            }
        });
    }

    /// Forces an immediate flush and waits for the debit to be durably
    /// applied before returning, per the `/api/batch-spending/flush`
    /// contract ("acknowledges only after the debit has been durably
    /// persisted").
    pub async fn explicit_flush(&self, _reason: &str, priority: FlushPriority) {
        self.flush(priority).await;
    }

    async fn flush(&self, _priority: FlushPriority) {
        let batch = {
            let mut pending = self.pending.lock().await;
            if pending.is_empty() {
                return;
            }
            std::mem::take(&mut *pending)
        };

        let failed = self.store.apply_batch(&batch).await;
        let failed_ids: std::collections::HashSet<&str> =
            failed.iter().map(|c| c.request_id.as_str()).collect();

        let mut audit = self.audit_log.lock().await;
        for charge in &batch {
            audit.push(AuditEntry {
                request_id: charge.request_id.clone(),
                group_id: charge.group_id.clone(),
                cost: charge.cost,
                estimated: charge.estimated,
                attempt: 1,
                succeeded: !failed_ids.contains(charge.request_id.as_str()),
            });
        }
        drop(audit);

        if !failed.is_empty() {
            self.requeue_or_drop(failed).await;
        }
    }

    async fn requeue_or_drop(&self, failed: Vec<PendingCharge>) {
        let mut error_queue = self.error_queue.lock().await;
        let mut pending = self.pending.lock().await;
        for charge in failed {
            let prior_attempts = error_queue
                .iter()
                .find(|(c, _)| c.request_id == charge.request_id)
                .map(|(_, attempts)| *attempts)
                .unwrap_or(0);
            let attempts = prior_attempts + 1;
            if attempts >= self.max_debit_retries {
                tracing::error!(
                    request_id = %charge.request_id,
                    group_id = %charge.group_id,
                    attempts,
                    "billing debit failed permanently; moved to error queue"
                );
                error_queue.retain(|(c, _)| c.request_id != charge.request_id);
                error_queue.push((charge, attempts));
            } else {
                pending.push(charge);
            }
        }
    }

    /// Snapshot of entries the flusher has given up retrying.
    pub async fn error_queue_snapshot(&self) -> Vec<PendingCharge> {
        self.error_queue
            .lock()
            .await
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub async fn audit_log_snapshot(&self) -> Vec<AuditEntry> {
        self.audit_log.lock().await.clone()
    }

    pub fn total_charges_recorded(&self) -> u64 {
        self.total_charges_recorded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::VirtualKeyGroup;
    use std::collections::HashMap;

    fn decimal(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn compute_cost_matches_spec_formula() {
        let cost = crate::data_model::ModelCost {
            input_cost_per_million: decimal("3.00"),
            output_cost_per_million: decimal("15.00"),
            embedding_cost_per_million: decimal("0.10"),
            image_cost_each: decimal("0.04"),
        };
        let usage = Usage::Chat {
            prompt_tokens: 1_000_000,
            completion_tokens: 500_000,
        };
        let result = compute_cost(&usage, &cost);
        assert_eq!(result, decimal("3.00") + decimal("7.50"));
    }

    #[tokio::test]
    async fn flush_debits_group_balance_exactly_once_per_request_id() {
        let mut groups = HashMap::new();
        groups.insert(
            "grp_1".to_string(),
            VirtualKeyGroup {
                id: "grp_1".into(),
                name: "test".into(),
                balance: decimal("100.00"),
            },
        );
        let registry = Arc::new(arc_swap::ArcSwap::new(Arc::new(Registry {
            groups,
            ..Default::default()
        })));
        let store = Arc::new(RegistryBalanceStore::new(Arc::clone(&registry)));
        let pipeline = Arc::new(BillingPipeline::new(store));

        pipeline
            .record(PendingCharge {
                group_id: "grp_1".into(),
                cost: decimal("1.50"),
                request_id: "req_1".into(),
                estimated: false,
            })
            .await;
        pipeline.explicit_flush("test", FlushPriority::High).await;

        // A re-delivered charge for the same request_id must not double-debit.
        pipeline
            .record(PendingCharge {
                group_id: "grp_1".into(),
                cost: decimal("1.50"),
                request_id: "req_1".into(),
                estimated: false,
            })
            .await;
        pipeline.explicit_flush("test", FlushPriority::High).await;

        let balance = registry.load().groups["grp_1"].balance;
        assert_eq!(balance, decimal("98.50"));
    }

    #[tokio::test]
    async fn flush_threshold_triggers_automatic_flush() {
        let mut groups = HashMap::new();
        groups.insert(
            "grp_1".to_string(),
            VirtualKeyGroup {
                id: "grp_1".into(),
                name: "test".into(),
                balance: decimal("1000.00"),
            },
        );
        let registry = Arc::new(arc_swap::ArcSwap::new(Arc::new(Registry {
            groups,
            ..Default::default()
        })));
        let store = Arc::new(RegistryBalanceStore::new(Arc::clone(&registry)));
        let mut pipeline = BillingPipeline::new(store);
        pipeline.flush_threshold = 2;
        let pipeline = Arc::new(pipeline);

        for i in 0..2 {
            pipeline
                .record(PendingCharge {
                    group_id: "grp_1".into(),
                    cost: decimal("1.00"),
                    request_id: format!("req_{i}"),
                    estimated: false,
                })
                .await;
        }

        let balance = registry.load().groups["grp_1"].balance;
        assert_eq!(balance, decimal("998.00"));
        assert_eq!(pipeline.total_charges_recorded(), 2);
    }
}
