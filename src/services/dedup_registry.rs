//! Dedup failure registry.
//!
//! Two disjoint mechanisms consulted by ingestion (section 4.7):
//! a bounded recent-digest window preventing resurrection of a
//! just-completed/just-failed intent, and a category cooldown keyed by
//! failure classification with tiered TTLs. Grounded on the teacher's
//! `CircuitBreaker`: a per-key map of state guarded behind a service type,
//! `check`/`record` methods, TTL-based expiry — but a flat cooldown
//! rather than an open/half-open/closed state machine.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::error::FailureClass;
use crate::services::task_store::TaskStore;

const TRANSIENT_TTL: Duration = Duration::from_secs(5);
const DURABLE_TTL: Duration = Duration::from_secs(30);
const NONSENSICAL_TTL: Duration = Duration::from_secs(120);

fn ttl_for(class: FailureClass) -> Duration {
    match class {
        FailureClass::Transient => TRANSIENT_TTL,
        FailureClass::Durable => DURABLE_TTL,
        FailureClass::Nonsensical => NONSENSICAL_TTL,
    }
}

/// Inputs available at failure time, in the strict precedence order of
/// section 4.7.
#[derive(Debug, Clone, Default)]
pub struct FailureContext<'a> {
    pub tool_diagnostics_reason_code: Option<&'a str>,
    pub blocked_reason: Option<&'a str>,
    pub no_steps_reason: Option<&'a str>,
}

/// Classify a failure context per the strict-precedence table.
pub fn classify(ctx: &FailureContext<'_>) -> FailureClass {
    if let Some(code) = ctx.tool_diagnostics_reason_code {
        return match code {
            "no_mcdata" | "no_recipe_available" | "craft_timeout" => FailureClass::Transient,
            "invalid_recipe_id" | "unknown_item" => FailureClass::Durable,
            _ => FailureClass::Durable,
        };
    }
    if let Some(reason) = ctx.blocked_reason {
        if reason.ends_with("_context_unavailable") || reason.starts_with("blocked_") && reason.contains("context_unavailable") {
            return FailureClass::Transient;
        }
        if reason == "blocked_invalid_ir_bundle"
            || reason == "blocked_missing_digest"
            || reason.starts_with("deterministic-failure:")
        {
            return FailureClass::Durable;
        }
        if reason == "expansion_retries_exhausted"
            || reason == "max_retries_exceeded"
            || reason.starts_with("budget-exhausted:")
        {
            return FailureClass::Nonsensical;
        }
    }
    if let Some(reason) = ctx.no_steps_reason {
        return match reason {
            "solver-unsolved" | "solver-error" => FailureClass::Transient,
            "unplannable" | "no-requirement" => FailureClass::Durable,
            "advisory-skip" => FailureClass::Nonsensical,
            _ => FailureClass::Durable,
        };
    }
    FailureClass::Durable
}

struct CooldownEntry {
    classification: FailureClass,
    expires_at: DateTime<Utc>,
}

/// Observable metrics (section 4.7).
#[derive(Debug, Clone, Default)]
pub struct DedupRegistryMetrics {
    pub size: usize,
    pub hits_by_classification: HashMap<&'static str, u64>,
}

pub struct DedupFailureRegistry {
    recent_digests: VecDeque<String>,
    recent_digests_set: HashSet<String>,
    recent_digest_capacity: usize,
    cooldowns: HashMap<String, CooldownEntry>,
    hits_by_classification: HashMap<&'static str, u64>,
}

impl DedupFailureRegistry {
    pub fn new(recent_digest_capacity: usize) -> Self {
        Self {
            recent_digests: VecDeque::with_capacity(recent_digest_capacity),
            recent_digests_set: HashSet::with_capacity(recent_digest_capacity),
            recent_digest_capacity,
            cooldowns: HashMap::new(),
            hits_by_classification: HashMap::new(),
        }
    }

    /// Records a `dedupe_key` ("<schema_version>:<committed_ir_digest>")
    /// into the bounded LRU window, evicting the oldest entry if full.
    pub fn remember_digest(&mut self, dedupe_key: impl Into<String>) {
        let key = dedupe_key.into();
        if self.recent_digests_set.contains(&key) {
            return;
        }
        if self.recent_digests.len() >= self.recent_digest_capacity {
            if let Some(evicted) = self.recent_digests.pop_front() {
                self.recent_digests_set.remove(&evicted);
            }
        }
        self.recent_digests_set.insert(key.clone());
        self.recent_digests.push_back(key);
    }

    /// `true` if `dedupe_key` was seen recently. Consults both the
    /// in-process LRU window and `store`'s live map + history ring, so a
    /// digest belonging to a task already evicted from the LRU but still
    /// held (or historized) in the store is still caught (section 4.7).
    pub fn has_recent_digest(&self, store: &TaskStore, dedupe_key: &str) -> bool {
        self.recent_digests_set.contains(dedupe_key) || store.find_by_sterling_dedupe_key(dedupe_key).is_some()
    }

    /// Registers a failure, classifying it and setting a cooldown expiry
    /// per [`ttl_for`].
    pub fn register_failure(&mut self, category_key: impl Into<String>, ctx: &FailureContext<'_>) -> FailureClass {
        let class = classify(ctx);
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl_for(class)).unwrap_or_default();
        self.cooldowns.insert(
            category_key.into(),
            CooldownEntry {
                classification: class,
                expires_at,
            },
        );
        class
    }

    /// `true` if `category_key` is currently cooling down.
    pub fn in_cooldown(&mut self, category_key: &str) -> bool {
        let Some(entry) = self.cooldowns.get(category_key) else {
            return false;
        };
        if Utc::now() >= entry.expires_at {
            self.cooldowns.remove(category_key);
            return false;
        }
        let label = match entry.classification {
            FailureClass::Transient => "transient",
            FailureClass::Durable => "durable",
            FailureClass::Nonsensical => "nonsensical",
        };
        *self.hits_by_classification.entry(label).or_insert(0) += 1;
        true
    }

    pub fn metrics(&self) -> DedupRegistryMetrics {
        DedupRegistryMetrics {
            size: self.cooldowns.len(),
            hits_by_classification: self.hits_by_classification.clone(),
        }
    }
}
