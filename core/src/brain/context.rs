//! Context Preprocessor: builds a [`ContextBundle`] from a [`Percept`] plus
//! retrieved memory and per-user working memory.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::memory::store::MemoryStore;
use super::types::{ContextBundle, MemoryHit, Percept, ReasoningDepth};

pub const DEFAULT_WM_CAPACITY: usize = 7;
const RAW_TEXT_PREVIEW_LEN: usize = 280;
const RECENT_EPISODIC_TAIL: usize = 5;
const PROCEDURAL_HINT_CAP: usize = 10;
const RETRIEVAL_TOP_K: usize = 5;

/// A per-user (or process-global when `user_id` is absent) ring of recent
/// contextual entries, append-wins with oldest evicted first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingMemoryRing {
    pub entries: Vec<String>,
    pub capacity: usize,
}

impl WorkingMemoryRing {
    pub fn new(capacity: usize) -> Self {
        WorkingMemoryRing { entries: Vec::new(), capacity }
    }

    pub fn push_all(&mut self, items: impl IntoIterator<Item = String>) {
        for item in items {
            self.entries.push(item);
        }
        let cap = self.capacity.max(1);
        if self.entries.len() > cap {
            let drop = self.entries.len() - cap;
            self.entries.drain(0..drop);
        }
    }
}

/// Tracks one ring per user, plus a process-global ring for anonymous calls.
#[derive(Default)]
pub struct WorkingMemoryRegistry {
    rings: Mutex<HashMap<String, WorkingMemoryRing>>,
    global: Mutex<WorkingMemoryRing>,
    capacity: usize,
}

impl WorkingMemoryRegistry {
    pub fn new(capacity: usize) -> Self {
        WorkingMemoryRegistry {
            rings: Mutex::new(HashMap::new()),
            global: Mutex::new(WorkingMemoryRing::new(capacity)),
            capacity,
        }
    }

    pub fn update(&self, user_id: Option<&str>, text: &str, retrieved: &[MemoryHit]) -> Vec<String> {
        let mut items = vec![text.to_string()];
        items.extend(retrieved.iter().map(|h| h.snippet.clone()));

        match user_id {
            Some(uid) => {
                let mut rings = self.rings.lock();
                let ring = rings.entry(uid.to_string()).or_insert_with(|| WorkingMemoryRing::new(self.capacity));
                ring.push_all(items);
                ring.entries.clone()
            }
            None => {
                let mut ring = self.global.lock();
                ring.push_all(items);
                ring.entries.clone()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessedContext {
    pub timestamp: chrono::DateTime<Utc>,
    pub recent_episodic_summaries: Vec<String>,
    pub retrieved_snippets: Vec<MemoryHit>,
    pub raw_text_preview: String,
    pub procedural_hints: Vec<String>,
    pub working_memory: Vec<String>,
}

pub struct ContextPreprocessor {
    memory: Arc<MemoryStore>,
    wm: Arc<WorkingMemoryRegistry>,
}

impl ContextPreprocessor {
    pub fn new(memory: Arc<MemoryStore>, wm: Arc<WorkingMemoryRegistry>) -> Self {
        ContextPreprocessor { memory, wm }
    }

    /// preprocess(user_id, text) -> PreprocessedContext
    pub async fn preprocess(&self, user_id: Option<&str>, text: &str) -> PreprocessedContext {
        let hits = self.memory.retrieve(text, RETRIEVAL_TOP_K).await;
        let retrieved_snippets: Vec<MemoryHit> = hits
            .iter()
            .map(|h| MemoryHit {
                id: h.memory_id.clone(),
                score: h.score,
                kind: "retrieval".to_string(),
                snippet: h.chunk_text.clone(),
            })
            .collect();

        let recent_episodic_summaries = self.memory.recent_episodic_summaries(RECENT_EPISODIC_TAIL);
        let procedural_hints = self.memory.procedural_hints(PROCEDURAL_HINT_CAP);

        let preview: String = text.chars().take(RAW_TEXT_PREVIEW_LEN).collect();
        let working_memory = self.wm.update(user_id, text, &retrieved_snippets);

        PreprocessedContext {
            timestamp: Utc::now(),
            recent_episodic_summaries,
            retrieved_snippets,
            raw_text_preview: preview,
            procedural_hints,
            working_memory,
        }
    }

    /// Assemble the final [`ContextBundle`] once classification has produced
    /// labels/depth (invoked by the Orchestrator once classification runs).
    pub fn build_bundle(
        &self,
        percept: Percept,
        preprocessed: &PreprocessedContext,
        labels: Vec<String>,
        label_confidences: HashMap<String, f32>,
        reasoning_depth: ReasoningDepth,
    ) -> ContextBundle {
        let mut memories: HashMap<String, Vec<MemoryHit>> = HashMap::new();
        memories.insert("retrieved".to_string(), preprocessed.retrieved_snippets.clone());

        ContextBundle {
            percept,
            memories,
            labels,
            label_confidences,
            reasoning_depth,
            working_memory: preprocessed.working_memory.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_first() {
        let mut ring = WorkingMemoryRing::new(3);
        ring.push_all(["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]);
        assert_eq!(ring.entries, vec!["b", "c", "d"]);
    }

    #[test]
    fn registry_separates_users_from_global() {
        let registry = WorkingMemoryRegistry::new(7);
        registry.update(Some("alice"), "hi", &[]);
        registry.update(None, "anon", &[]);
        let alice_ring = registry.rings.lock().get("alice").cloned().unwrap();
        assert_eq!(alice_ring.entries, vec!["hi"]);
        assert_eq!(registry.global.lock().entries, vec!["anon"]);
    }
}
