//! In-memory task store.
//!
//! Owns the live `id -> Task` map, a bounded history ring for terminal
//! tasks, and the dedup probes the ingestion pipeline depends on. Per
//! section 5, this is a plain struct mutated with `&mut self` from a
//! single owning caller — never an `Arc<Mutex<TaskStore>>` shared across
//! call sites. Concurrent access is a layering violation, not something
//! this type defends against internally.

use std::collections::VecDeque;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::models::{DedupeKey, Task, TaskStatus};
use crate::services::canonicalize;

/// Options controlling a [`TaskStore::put`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Bypasses the strict-mode origin-missing warning; used by ingestion's
    /// skeleton-handoff path before finalization has run.
    pub allow_unfinalized: bool,
}

/// Aggregate counts surfaced by [`TaskStore::statistics`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatistics {
    pub total: usize,
    pub pending: usize,
    pub pending_planning: usize,
    pub active: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub unplannable: usize,
}

/// Filter criteria for [`TaskStore::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<String>,
    pub goal_key: Option<String>,
}

impl TaskFilter {
    fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(task_type) = &self.task_type {
            if &task.task_type != task_type {
                return false;
            }
        }
        if let Some(goal_key) = &self.goal_key {
            if task.metadata.goal_key.as_deref() != Some(goal_key.as_str()) {
                return false;
            }
        }
        true
    }
}

/// The store itself.
pub struct TaskStore {
    tasks: std::collections::HashMap<Uuid, Task>,
    history: VecDeque<Task>,
    max_history: usize,
    strict_finalize: bool,
}

impl TaskStore {
    pub fn new(max_history: usize, strict_finalize: bool) -> Self {
        Self {
            tasks: std::collections::HashMap::new(),
            history: VecDeque::with_capacity(max_history),
            max_history,
            strict_finalize,
        }
    }

    /// Upsert a task. Logs (but never rejects outside strict mode) a
    /// `put` of a brand-new id lacking `metadata.origin`.
    pub fn put(&mut self, task: Task, opts: PutOptions) {
        let is_new = !self.tasks.contains_key(&task.id);
        if is_new && !opts.allow_unfinalized && task.metadata.origin.is_none() {
            if self.strict_finalize {
                tracing::warn!(
                    task_id = %task.id,
                    "strict_finalize: task persisted without metadata.origin"
                );
            } else {
                tracing::debug!(task_id = %task.id, "task persisted without metadata.origin");
            }
        }
        self.tasks.insert(task.id, task);
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn delete(&mut self, id: Uuid) -> Option<Task> {
        self.tasks.remove(&id)
    }

    pub fn list(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.tasks.values().filter(|t| filter.matches(t)).collect()
    }

    pub fn get_active_tasks(&self) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.status.is_active()).collect()
    }

    fn active_or_pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::PendingPlanning | TaskStatus::Active))
    }

    /// Dedup probe used by ingestion step 1. First match wins across the
    /// three tiers described in section 4.1.
    pub fn find_similar(&self, title: &str, task_type: &str, source_str: &str) -> Option<&Task> {
        // Tier 1: exact title match among active/pending tasks.
        if let Some(hit) = self.active_or_pending().find(|t| t.title == title) {
            return Some(hit);
        }
        // Tier 2: same type + source, title word-overlap >= 0.7.
        let incoming_words = word_set(title);
        self.active_or_pending().find(|t| {
            t.task_type == task_type
                && t.source.as_str() == source_str
                && word_overlap(&incoming_words, &word_set(&t.title)) >= 0.7
        })
    }

    /// Tier 3 of the dedup probe: compares a pre-resolved requirement
    /// digest against each active/pending task's stored requirement.
    pub fn find_by_requirement_digest(&self, digest: &str) -> Option<&Task> {
        self.active_or_pending().find(|t| {
            t.metadata
                .requirement
                .as_ref()
                .map(canonicalize::digest)
                .as_deref()
                == Some(digest)
        })
    }

    /// Searches both the live map and the history ring, since terminal
    /// tasks must still dedup recent digests (section 4.1). Matches on
    /// `metadata.sterling_dedupe_key`, the Sterling
    /// `"<schema_version>:<committed_ir_digest>"` key — distinct from
    /// `subtask_key`, which identifies sub-task position, not reduction
    /// output.
    pub fn find_by_sterling_dedupe_key(&self, key: &str) -> Option<&Task> {
        self.tasks
            .values()
            .chain(self.history.iter())
            .find(|t| t.metadata.sterling_dedupe_key.as_ref().map(DedupeKey::as_str) == Some(key))
    }

    /// Moves terminal tasks into the bounded history ring, truncating to
    /// `max_history`.
    pub fn cleanup_completed(&mut self) {
        let terminal_ids: Vec<Uuid> = self
            .tasks
            .values()
            .filter(|t| t.status.is_terminal())
            .map(|t| t.id)
            .collect();
        for id in terminal_ids {
            if let Some(task) = self.tasks.remove(&id) {
                self.history.push_back(task);
            }
        }
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn statistics(&self) -> TaskStatistics {
        let mut stats = TaskStatistics {
            total: self.tasks.len(),
            ..TaskStatistics::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::PendingPlanning => stats.pending_planning += 1,
                TaskStatus::Active => stats.active += 1,
                TaskStatus::Paused => stats.paused += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Unplannable => stats.unplannable += 1,
            }
        }
        stats
    }

    pub fn history(&self, limit: usize) -> Vec<&Task> {
        self.history.iter().rev().take(limit).collect()
    }
}

fn word_set(s: &str) -> std::collections::HashSet<String> {
    s.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn word_overlap(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskSource;

    fn sample(title: &str, task_type: &str, source: TaskSource) -> Task {
        Task::new(title, "d").with_type(task_type).with_source(source)
    }

    #[test]
    fn test_put_and_get_roundtrip() {
        let mut store = TaskStore::new(10, false);
        let task = sample("Build a shelter", "building", TaskSource::Manual);
        let id = task.id;
        store.put(task, PutOptions::default());
        assert!(store.get(id).is_some());
    }

    #[test]
    fn test_find_similar_exact_title_match() {
        let mut store = TaskStore::new(10, false);
        store.put(
            sample("Build a shelter", "building", TaskSource::Manual),
            PutOptions::default(),
        );
        assert!(store.find_similar("Build a shelter", "building", "manual").is_some());
        assert!(store.find_similar("Craft a pickaxe", "crafting", "manual").is_none());
    }

    #[test]
    fn test_find_similar_word_overlap_threshold() {
        let mut store = TaskStore::new(10, false);
        store.put(
            sample("collect ten oak logs quickly", "collect", TaskSource::Autonomous),
            PutOptions::default(),
        );
        assert!(store
            .find_similar("collect ten oak logs", "collect", "autonomous")
            .is_some());
        assert!(store
            .find_similar("mine some iron ore", "collect", "autonomous")
            .is_none());
    }

    #[test]
    fn test_cleanup_completed_moves_to_history_and_truncates() {
        let mut store = TaskStore::new(1, false);
        let mut a = sample("a", "t", TaskSource::Manual);
        a.transition_to(crate::domain::models::TaskStatus::Completed).unwrap();
        let mut b = sample("b", "t", TaskSource::Manual);
        b.transition_to(crate::domain::models::TaskStatus::Completed).unwrap();
        store.put(a, PutOptions::default());
        store.put(b, PutOptions::default());
        store.cleanup_completed();
        assert_eq!(store.statistics().total, 0);
        assert_eq!(store.history(10).len(), 1);
    }

    #[test]
    fn test_sterling_dedupe_key_searches_history_too() {
        let mut store = TaskStore::new(10, false);
        let mut task = sample("a", "t", TaskSource::Manual);
        task.metadata.sterling_dedupe_key = Some(DedupeKey::new("1", "abc123"));
        task.transition_to(crate::domain::models::TaskStatus::Failed).unwrap();
        store.put(task, PutOptions::default());
        store.cleanup_completed();
        assert!(store.find_by_sterling_dedupe_key("1:abc123").is_some());
    }

    #[test]
    fn test_sterling_dedupe_key_distinct_from_subtask_key() {
        let mut store = TaskStore::new(10, false);
        let mut task = sample("a", "t", TaskSource::Manual);
        task.metadata.subtask_key = Some("1:abc123".to_string());
        store.put(task, PutOptions::default());
        assert!(store.find_by_sterling_dedupe_key("1:abc123").is_none());
    }
}
