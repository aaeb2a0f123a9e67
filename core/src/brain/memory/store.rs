//! Memory Store: content-addressed episodic/semantic/
//! reflective/procedural records with a vector index, working-memory ring,
//! audit log, scoring, consolidation, pruning, and tombstones.
//!
//! Embedding-backed retrieval over a `Memory`/`MemoryType` shape, but the
//! vector index here is a crate-local flat index scored by exact cosine
//! similarity rather than an on-disk ANN engine — see DESIGN.md for the
//! dropped-dependency note.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::super::embedder::{cosine_similarity, Embedder};
use super::super::error::Result;
use super::super::types::{Chunk, MemoryItem, MemoryKind, PrivacyLevel, RetrievalHit};
use super::chunk::build_chunks;

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: String,
    pub memory_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Tombstone share beyond which an index rebuild is triggered automatically.
    pub tombstone_rebuild_ratio: f32,
    /// Number of episodic items folded into one semantic summary per run.
    pub consolidation_window: usize,
    /// Importance floor and minimum age (days) for pruning eligibility.
    pub prune_importance_floor: f32,
    pub prune_min_age_days: i64,
    /// Floor below which near-duplicate writes are rejected unless forced.
    pub novelty_floor: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            tombstone_rebuild_ratio: 0.3,
            consolidation_window: 50,
            prune_importance_floor: 0.2,
            prune_min_age_days: 30,
            novelty_floor: 0.05,
        }
    }
}

struct Inner {
    items: HashMap<String, MemoryItem>,
    chunks: Vec<Chunk>,
    audit: Vec<AuditEntry>,
    wm_rings: HashMap<String, Vec<String>>,
}

pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    config: MemoryConfig,
    inner: RwLock<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>, config: MemoryConfig) -> Self {
        MemoryStore {
            embedder,
            config,
            inner: RwLock::new(Inner {
                items: HashMap::new(),
                chunks: Vec::new(),
                audit: Vec::new(),
                wm_rings: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// write(kind, text, tags, importance, consent) -> id. Rejects when consent=false.
    pub async fn write(
        &self,
        kind: MemoryKind,
        text: &str,
        tags: Vec<String>,
        importance: f32,
        consent: bool,
        privacy_level: PrivacyLevel,
    ) -> Result<Option<String>> {
        if !consent {
            self.record_audit("write_rejected_no_consent", "");
            return Ok(None);
        }
        let id = Uuid::new_v4().to_string();
        let summary = summarize(text);
        let item = MemoryItem {
            id: id.clone(),
            kind,
            raw_text: text.to_string(),
            summary,
            tags,
            importance: importance.clamp(0.0, 1.0),
            consent,
            privacy_level,
            created_at: Utc::now(),
            tombstoned: false,
        };
        let new_chunks = build_chunks(&id, text, self.embedder.as_ref()).await?;

        let mut inner = self.inner.write();
        inner.items.insert(id.clone(), item);
        inner.chunks.extend(new_chunks);
        inner.audit.push(AuditEntry { action: "write".to_string(), memory_id: id.clone(), at: Utc::now() });
        Ok(Some(id))
    }

    /// evaluate_write(...) -> bool, gating low-value or duplicate writes.
    pub async fn evaluate_write(&self, text: &str, importance: f32, utility: f32, emotion_weight: f32, allow_memory_write: bool) -> Result<bool> {
        let novelty = self.novelty_of(text).await?;
        if novelty < self.config.novelty_floor && !allow_memory_write {
            return Ok(false);
        }
        let score = importance * 0.5 + novelty * 0.2 + utility * 0.2 + emotion_weight * 0.1;
        Ok(score >= 0.5)
    }

    async fn novelty_of(&self, text: &str) -> Result<f32> {
        let embedding = self.embedder.embed(text).await?;
        let inner = self.inner.read();
        let max_sim = inner
            .chunks
            .iter()
            .map(|c| cosine_similarity(&embedding, &c.embedding))
            .fold(0.0f32, f32::max);
        Ok((1.0 - max_sim).clamp(0.0, 1.0))
    }

    /// retrieve(query, k) -> top-k scored hits, honoring consent/privacy exclusion.
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievalHit> {
        let query_embedding = match self.embedder.embed(query).await {
            Ok(e) => e,
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Vec::new();
            }
        };
        let inner = self.inner.read();
        let now = Utc::now();
        let mut scored: Vec<RetrievalHit> = inner
            .chunks
            .iter()
            .filter_map(|chunk| {
                let item = inner.items.get(&chunk.memory_id)?;
                if item.tombstoned || !item.consent || matches!(item.privacy_level, PrivacyLevel::High | PrivacyLevel::Sensitive) {
                    return None;
                }
                let similarity = cosine_similarity(&query_embedding, &chunk.embedding);
                let distance = 1.0 - similarity;
                let age_days = (now - item.created_at).num_seconds() as f32 / 86400.0;
                let recency = (-age_days.max(0.0) / 30.0).exp();
                let score = 0.6 * (1.0 / (1.0 + distance)) + 0.3 * item.importance + 0.1 * recency;
                Some(RetrievalHit {
                    memory_id: item.id.clone(),
                    chunk_text: chunk.chunk_text.clone(),
                    distance,
                    importance: item.importance,
                    timestamp: item.created_at,
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        if scored.is_empty() {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        scored
    }

    pub fn recent_episodic_summaries(&self, tail: usize) -> Vec<String> {
        let inner = self.inner.read();
        let mut episodic: Vec<&MemoryItem> = inner
            .items
            .values()
            .filter(|i| i.kind == MemoryKind::Episodic && !i.tombstoned)
            .collect();
        episodic.sort_by_key(|i| i.created_at);
        episodic.into_iter().rev().take(tail).map(|i| i.summary.clone()).collect()
    }

    pub fn procedural_hints(&self, cap: usize) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .items
            .values()
            .filter(|i| i.kind == MemoryKind::Procedural && !i.tombstoned)
            .take(cap)
            .map(|i| i.summary.clone())
            .collect()
    }

    pub fn wm_add(&self, user: &str, entries: Vec<String>, cap: usize) {
        let mut inner = self.inner.write();
        let ring = inner.wm_rings.entry(user.to_string()).or_default();
        ring.extend(entries);
        if ring.len() > cap {
            let drop = ring.len() - cap;
            ring.drain(0..drop);
        }
    }

    pub fn wm_get(&self, user: &str, cap: usize) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .wm_rings
            .get(user)
            .map(|ring| ring.iter().rev().take(cap).rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn wm_clear(&self, user: &str) {
        self.inner.write().wm_rings.remove(user);
    }

    /// Summarize related episodic items into semantic facts. Returns count created.
    pub async fn consolidate(&self) -> Result<usize> {
        let batch: Vec<MemoryItem> = {
            let inner = self.inner.read();
            let mut episodic: Vec<MemoryItem> = inner
                .items
                .values()
                .filter(|i| i.kind == MemoryKind::Episodic && !i.tombstoned)
                .cloned()
                .collect();
            episodic.sort_by_key(|i| i.created_at);
            episodic.into_iter().take(self.config.consolidation_window).collect()
        };
        if batch.len() < 2 {
            return Ok(0);
        }
        let combined: String = batch.iter().map(|i| i.summary.clone()).collect::<Vec<_>>().join(" ");
        let id = self
            .write(MemoryKind::Semantic, &combined, vec!["consolidated".to_string()], 0.6, true, PrivacyLevel::Low)
            .await?;
        if id.is_some() {
            let mut inner = self.inner.write();
            for item in &batch {
                if let Some(stored) = inner.items.get_mut(&item.id) {
                    stored.tombstoned = true;
                }
            }
            self.maybe_rebuild_index(&mut inner);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    /// Remove low-importance, old episodic items. Returns count removed.
    pub fn prune(&self) -> usize {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let floor = self.config.prune_importance_floor;
        let min_age = self.config.prune_min_age_days;
        let mut removed = 0usize;
        let ids: Vec<String> = inner
            .items
            .values()
            .filter(|i| {
                i.kind == MemoryKind::Episodic
                    && !i.tombstoned
                    && i.importance < floor
                    && (now - i.created_at).num_days() >= min_age
            })
            .map(|i| i.id.clone())
            .collect();
        for id in ids {
            if let Some(item) = inner.items.get_mut(&id) {
                item.tombstoned = true;
                removed += 1;
            }
        }
        self.record_audit_locked(&mut inner, "prune", &format!("{removed}"));
        self.maybe_rebuild_index(&mut inner);
        removed
    }

    pub fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        let found = if let Some(item) = inner.items.get_mut(id) {
            item.tombstoned = true;
            true
        } else {
            false
        };
        if found {
            self.record_audit_locked(&mut inner, "delete", id);
            self.maybe_rebuild_index(&mut inner);
        }
        found
    }

    fn maybe_rebuild_index(&self, inner: &mut Inner) {
        if inner.items.is_empty() {
            return;
        }
        let tombstoned = inner.items.values().filter(|i| i.tombstoned).count();
        let ratio = tombstoned as f32 / inner.items.len() as f32;
        if ratio >= self.config.tombstone_rebuild_ratio {
            let live_ids: std::collections::HashSet<String> =
                inner.items.iter().filter(|(_, i)| !i.tombstoned).map(|(id, _)| id.clone()).collect();
            inner.chunks.retain(|c| live_ids.contains(&c.memory_id));
        }
    }

    fn record_audit(&self, action: &str, memory_id: &str) {
        self.inner.write().audit.push(AuditEntry { action: action.to_string(), memory_id: memory_id.to_string(), at: Utc::now() });
    }

    fn record_audit_locked(&self, inner: &mut Inner, action: &str, memory_id: &str) {
        inner.audit.push(AuditEntry { action: action.to_string(), memory_id: memory_id.to_string(), at: Utc::now() });
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.inner.read().audit.clone()
    }

    pub fn metrics(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    pub fn get(&self, id: &str) -> Option<MemoryItem> {
        self.inner.read().items.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn summarize(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        text.to_string()
    } else {
        format!("{}…", &text[..MAX])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::embedder::HashEmbedder;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(HashEmbedder::new()), MemoryConfig::default())
    }

    #[tokio::test]
    async fn write_rejects_without_consent() {
        let store = store();
        let id = store
            .write(MemoryKind::Episodic, "hello", vec![], 0.5, false, PrivacyLevel::Low)
            .await
            .unwrap();
        assert!(id.is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn round_trip_write_then_retrieve() {
        let store = store();
        store
            .write(MemoryKind::Episodic, "My name is Alice and I live in Boston", vec![], 0.7, true, PrivacyLevel::Low)
            .await
            .unwrap();
        let hits = store.retrieve("Alice", 5).await;
        assert!(!hits.is_empty());
        assert!(hits[0].chunk_text.contains("Alice"));
    }

    #[tokio::test]
    async fn retrieval_excludes_sensitive_and_no_consent() {
        let store = store();
        store
            .write(MemoryKind::Episodic, "secret medical record", vec![], 0.9, true, PrivacyLevel::Sensitive)
            .await
            .unwrap();
        let hits = store.retrieve("medical record", 5).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn pii_is_redacted_in_chunks() {
        let store = store();
        let id = store
            .write(MemoryKind::Episodic, "Contact me at john.doe@example.com or +1-555-234-5678", vec![], 0.5, true, PrivacyLevel::Low)
            .await
            .unwrap()
            .unwrap();
        let hits = store.retrieve("contact", 5).await;
        let chunk = hits.iter().find(|h| h.memory_id == id).unwrap();
        assert!(chunk.chunk_text.contains("[email]") || chunk.chunk_text.contains("[phone]"));
        assert!(!chunk.chunk_text.contains("john.doe@example.com"));
    }

    #[test]
    fn wm_add_respects_cap() {
        let store = store();
        store.wm_add("bob", vec!["a".into(), "b".into(), "c".into()], 2);
        assert_eq!(store.wm_get("bob", 2), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn prune_tombstones_low_importance_old_items() {
        let store = store();
        let id = store
            .write(MemoryKind::Episodic, "trivial note", vec![], 0.05, true, PrivacyLevel::Low)
            .await
            .unwrap()
            .unwrap();
        {
            let mut inner = store.inner.write();
            let item = inner.items.get_mut(&id).unwrap();
            item.created_at = Utc::now() - chrono::Duration::days(60);
        }
        let removed = store.prune();
        assert_eq!(removed, 1);
        assert!(store.get(&id).unwrap().tombstoned);
    }
}
