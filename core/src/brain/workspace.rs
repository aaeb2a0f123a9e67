//! Global Workspace + Working Memory: a shared, TTL'd broadcast
//! table with pub/sub, and a 7±2 slot working-memory buffer with lazy decay.
//!
//! Grounded on `ra9/core/global_workspace.py`'s `GlobalWorkspace` (max_items,
//! TTL, cleanup loop, subscriber isolation) and `WorkingMemory` (slot cap,
//! decay-on-access, priority/decay eviction); locking model follows
//! `parking_lot::RwLock`, matching `brain/memory/store.rs`'s `Inner` pattern.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::types::{ActiveRepresentation, AgentType, BroadcastItem};

pub const DEFAULT_MAX_ITEMS: usize = 1000;
pub const DEFAULT_TTL_SECS: i64 = 3600;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_SLOTS: usize = 7;
pub const DEFAULT_WM_DECAY_RATE: f32 = 0.1;
pub const WM_DROP_THRESHOLD: f32 = 0.01;

pub type Subscriber = Box<dyn Fn(&BroadcastItem) + Send + Sync>;

struct Subscription {
    topics: Option<Vec<String>>,
    callback: Subscriber,
}

struct WorkspaceInner {
    items: HashMap<String, BroadcastItem>,
    subscribers: HashMap<u64, Subscription>,
    next_subscriber_id: u64,
}

/// Thread-safe broadcast table.
pub struct GlobalWorkspace {
    inner: RwLock<WorkspaceInner>,
    max_items: usize,
    ttl: Duration,
    last_cleanup: Mutex<Instant>,
    cleanup_interval: Duration,
}

impl GlobalWorkspace {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_ITEMS, DEFAULT_TTL_SECS, DEFAULT_CLEANUP_INTERVAL_SECS)
    }

    pub fn with_config(max_items: usize, ttl_secs: i64, cleanup_interval_secs: u64) -> Self {
        GlobalWorkspace {
            inner: RwLock::new(WorkspaceInner { items: HashMap::new(), subscribers: HashMap::new(), next_subscriber_id: 0 }),
            max_items,
            ttl: Duration::from_secs(ttl_secs.max(0) as u64),
            last_cleanup: Mutex::new(Instant::now()),
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
        }
    }

    /// Inserts an item, notifies matching subscribers, and runs the
    /// periodic TTL + capacity cleanup if due.
    pub fn broadcast(&self, item: BroadcastItem) {
        self.maybe_cleanup();
        let mut inner = self.inner.write();
        inner.items.insert(item.id.clone(), item.clone());
        for sub in inner.subscribers.values() {
            let matches = match &sub.topics {
                None => true,
                Some(topics) => topics.iter().any(|t| {
                    let t = t.to_lowercase();
                    item.text.to_lowercase().contains(&t) || item.contributors.iter().any(|a| a.as_str() == t)
                }),
            };
            if matches {
                // Isolate subscriber panics so one bad listener can't poison a broadcast.
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (sub.callback)(&item)));
            }
        }
    }

    /// Subscribes to broadcasts, optionally filtered by topic: a topic matches
    /// when it appears as a substring of the item's text or equals a
    /// contributor's agent-type name.
    /// Returns a handle usable with [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, topics: Option<Vec<String>>, callback: Subscriber) -> u64 {
        let mut inner = self.inner.write();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.insert(id, Subscription { topics, callback });
        id
    }

    pub fn unsubscribe(&self, handle: u64) {
        self.inner.write().subscribers.remove(&handle);
    }

    pub fn get_by_id(&self, id: &str) -> Option<BroadcastItem> {
        self.inner.read().items.get(id).cloned()
    }

    pub fn by_agent(&self, agent: AgentType) -> Vec<BroadcastItem> {
        self.inner.read().items.values().filter(|i| i.contributors.contains(&agent)).cloned().collect()
    }

    pub fn by_min_confidence(&self, min_confidence: f32) -> Vec<BroadcastItem> {
        self.inner.read().items.values().filter(|i| i.confidence >= min_confidence).cloned().collect()
    }

    pub fn recent(&self, minutes: i64) -> Vec<BroadcastItem> {
        let cutoff = Utc::now() - chrono::Duration::minutes(minutes);
        self.inner.read().items.values().filter(|i| i.created_at >= cutoff).cloned().collect()
    }

    /// Case-insensitive substring search over item text, sorted by
    /// (confidence, created_at) descending.
    pub fn search(&self, query: &str) -> Vec<BroadcastItem> {
        let needle = query.to_lowercase();
        let mut hits: Vec<BroadcastItem> = self.inner.read().items.values().filter(|i| i.text.to_lowercase().contains(&needle)).cloned().collect();
        hits.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal).then(b.created_at.cmp(&a.created_at)));
        hits
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_cleanup(&self) {
        let mut last = self.last_cleanup.lock();
        if last.elapsed() < self.cleanup_interval {
            return;
        }
        *last = Instant::now();
        drop(last);
        self.cleanup();
    }

    /// TTL eviction, then oldest-first capacity eviction.
    pub fn cleanup(&self) {
        let mut inner = self.inner.write();
        let ttl_secs = self.ttl.as_secs() as i64;
        let cutoff = Utc::now() - chrono::Duration::seconds(ttl_secs);
        inner.items.retain(|_, item| item.created_at >= cutoff);

        if inner.items.len() > self.max_items {
            let mut by_age: Vec<(String, chrono::DateTime<Utc>)> = inner.items.iter().map(|(id, item)| (id.clone(), item.created_at)).collect();
            by_age.sort_by_key(|(_, created_at)| *created_at);
            let excess = inner.items.len() - self.max_items;
            for (id, _) in by_age.into_iter().take(excess) {
                inner.items.remove(&id);
            }
        }
    }
}

impl Default for GlobalWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded, decaying attention buffer.
pub struct WorkingMemory {
    slots: Mutex<Vec<ActiveRepresentation>>,
    max_slots: usize,
    decay_rate: f32,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_SLOTS, DEFAULT_WM_DECAY_RATE)
    }

    pub fn with_config(max_slots: usize, decay_rate: f32) -> Self {
        WorkingMemory { slots: Mutex::new(Vec::new()), max_slots, decay_rate }
    }

    /// Applies lazy decay to every slot, dropping any that fall to or below
    /// [`WM_DROP_THRESHOLD`], then inserts `item`, evicting the
    /// lowest-(priority, decay) slot if over capacity.
    pub fn insert(&self, item: ActiveRepresentation) {
        let mut slots = self.slots.lock();
        Self::decay_all(&mut slots, self.decay_rate);
        slots.push(item);
        if slots.len() > self.max_slots {
            let worst_idx = slots
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.priority.partial_cmp(&b.priority).unwrap_or(std::cmp::Ordering::Equal).then(a.decay.partial_cmp(&b.decay).unwrap_or(std::cmp::Ordering::Equal)))
                .map(|(i, _)| i);
            if let Some(idx) = worst_idx {
                slots.remove(idx);
            }
        }
    }

    fn decay_all(slots: &mut Vec<ActiveRepresentation>, decay_rate: f32) {
        let now = Utc::now();
        for slot in slots.iter_mut() {
            let elapsed_minutes = (now - slot.created_at).num_seconds() as f32 / 60.0;
            if elapsed_minutes > 0.0 {
                slot.decay *= (1.0 - decay_rate * elapsed_minutes).max(0.0);
                slot.created_at = now;
            }
        }
        slots.retain(|s| s.decay > WM_DROP_THRESHOLD);
    }

    pub fn snapshot(&self) -> Vec<ActiveRepresentation> {
        let mut slots = self.slots.lock();
        Self::decay_all(&mut slots, self.decay_rate);
        slots.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Atomically broadcasts a gated item and, when requested, mirrors it into
/// working memory as an active representation.
pub fn broadcast_and_store(workspace: &GlobalWorkspace, working_memory: &WorkingMemory, item: BroadcastItem, store_in_wm: bool) {
    if store_in_wm {
        working_memory.insert(ActiveRepresentation {
            content: item.text.clone(),
            source_agents: item.contributors.clone(),
            priority: item.confidence,
            decay: 1.0,
            created_at: item.created_at,
        });
    }
    workspace.broadcast(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn item(id: &str, text: &str, confidence: f32, agent: AgentType) -> BroadcastItem {
        BroadcastItem {
            id: id.to_string(),
            text: text.to_string(),
            contributors: vec![agent],
            confidence,
            speculative: false,
            iteration: 0,
            created_at: Utc::now(),
            metadata: StdHashMap::new(),
        }
    }

    #[test]
    fn broadcast_and_retrieve_by_id() {
        let workspace = GlobalWorkspace::new();
        workspace.broadcast(item("1", "hello world", 0.8, AgentType::Logical));
        assert!(workspace.get_by_id("1").is_some());
    }

    #[test]
    fn subscribers_receive_matching_broadcasts() {
        let workspace = GlobalWorkspace::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        workspace.subscribe(Some(vec!["logical".to_string()]), Box::new(move |_item| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));
        workspace.broadcast(item("1", "x", 0.8, AgentType::Logical));
        workspace.broadcast(item("2", "y", 0.8, AgentType::Emotional));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn search_is_case_insensitive_and_sorted() {
        let workspace = GlobalWorkspace::new();
        workspace.broadcast(item("1", "Quantum mechanics overview", 0.5, AgentType::Logical));
        workspace.broadcast(item("2", "quantum leap theory", 0.9, AgentType::Strategic));
        let hits = workspace.search("quantum");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "2");
    }

    #[test]
    fn cleanup_evicts_over_capacity_oldest_first() {
        let workspace = GlobalWorkspace::with_config(2, DEFAULT_TTL_SECS, DEFAULT_CLEANUP_INTERVAL_SECS);
        workspace.broadcast(item("1", "a", 0.5, AgentType::Logical));
        workspace.broadcast(item("2", "b", 0.5, AgentType::Logical));
        workspace.broadcast(item("3", "c", 0.5, AgentType::Logical));
        workspace.cleanup();
        assert_eq!(workspace.len(), 2);
    }

    #[test]
    fn working_memory_respects_slot_cap() {
        let wm = WorkingMemory::new();
        for i in 0..10 {
            wm.insert(ActiveRepresentation {
                content: format!("item {i}"),
                source_agents: vec![AgentType::Logical],
                priority: i as f32 / 10.0,
                decay: 1.0,
                created_at: Utc::now(),
            });
        }
        assert!(wm.len() <= DEFAULT_MAX_SLOTS);
    }

    #[test]
    fn working_memory_evicts_lowest_priority_first() {
        let wm = WorkingMemory::with_config(1, DEFAULT_WM_DECAY_RATE);
        wm.insert(ActiveRepresentation { content: "low".to_string(), source_agents: vec![], priority: 0.1, decay: 1.0, created_at: Utc::now() });
        wm.insert(ActiveRepresentation { content: "high".to_string(), source_agents: vec![], priority: 0.9, decay: 1.0, created_at: Utc::now() });
        let snapshot = wm.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].content, "high");
    }
}
