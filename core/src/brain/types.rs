//! Core data model for the brain orchestration pipeline.
//!
//! Mirrors the entities of the cognitive pipeline: a [`Percept`] flows into a
//! [`ContextBundle`], reasoners emit [`AgentOutput`]s, critics emit
//! [`AgentCritique`]s, the coherence engine emits [`ConflictTicket`]s, gating
//! promotes candidates to [`BroadcastItem`]s, and working memory holds
//! [`ActiveRepresentation`] slots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input modality, detected by the perception adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Code,
    Multimodal,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
            Modality::Code => "code",
            Modality::Multimodal => "multimodal",
        };
        write!(f, "{}", s)
    }
}

/// The six typed local reasoners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Logical,
    Emotional,
    Creative,
    Strategic,
    Verifier,
    Arbiter,
}

impl AgentType {
    pub const ALL: [AgentType; 6] = [
        AgentType::Logical,
        AgentType::Emotional,
        AgentType::Creative,
        AgentType::Strategic,
        AgentType::Verifier,
        AgentType::Arbiter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Logical => "logical",
            AgentType::Emotional => "emotional",
            AgentType::Creative => "creative",
            AgentType::Strategic => "strategic",
            AgentType::Verifier => "verifier",
            AgentType::Arbiter => "arbiter",
        }
    }

    /// Focus/keyword list used both in prompts and in specialized critique.
    pub fn focus_keywords(&self) -> &'static [&'static str] {
        match self {
            AgentType::Logical => &["logical consistency", "evidence quality", "reasoning validity"],
            AgentType::Emotional => &["empathy", "emotional intelligence", "human impact"],
            AgentType::Creative => &["originality", "innovation", "imagination"],
            AgentType::Strategic => &["long-term thinking", "resource optimization", "risk"],
            AgentType::Verifier => &["factual accuracy", "source verification", "evidence quality"],
            AgentType::Arbiter => &["fairness", "balance", "conflict resolution"],
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reasoning depth requested for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningDepth {
    Shallow,
    Deep,
    Auto,
}

impl std::fmt::Display for ReasoningDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReasoningDepth::Shallow => "shallow",
            ReasoningDepth::Deep => "deep",
            ReasoningDepth::Auto => "auto",
        };
        write!(f, "{}", s)
    }
}

/// A single citation extracted from a reasoner's draft text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub score: f32,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A memory hit surfaced to, or referenced by, a reasoner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub score: f32,
    pub kind: String,
    pub snippet: String,
}

/// Sensory input representation, immutable once created by Perception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percept {
    pub modality: Modality,
    pub embedding: Vec<f32>,
    pub tokens: Vec<String>,
    pub raw_text: String,
    pub session_id: String,
    pub user_id: String,
    pub privacy_flags: HashMap<String, bool>,
    pub created_at: DateTime<Utc>,
}

/// Intent features extracted alongside a Percept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentFeatures {
    pub length: usize,
    pub token_count: usize,
    pub has_question: bool,
    pub has_imperative: bool,
    pub has_technical_terms: bool,
    pub sentiment_indicators: SentimentIndicators,
    pub complexity_score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentimentIndicators {
    pub positive: usize,
    pub negative: usize,
    pub urgent: usize,
}

/// Output of a single Local Reasoner invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent: AgentType,
    pub text_draft: String,
    /// Ordered, capped at 5.
    pub reasoning_trace: Vec<String>,
    pub confidence: f32,
    pub confidence_rationale: String,
    pub citations: Vec<Citation>,
    pub memory_hits: Vec<MemoryHit>,
    pub iteration: u32,
    pub created_at: DateTime<Utc>,
    /// Free-form metadata: coherence resolutions, critique/verifier summaries, etc.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentOutput {
    pub fn degraded(agent: AgentType, reason: &str) -> Self {
        AgentOutput {
            agent,
            text_draft: String::new(),
            reasoning_trace: vec![format!("Error occurred: {reason}")],
            confidence: 0.0,
            confidence_rationale: "reasoner failure".to_string(),
            citations: Vec::new(),
            memory_hits: Vec::new(),
            iteration: 0,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn has_evidence(&self) -> bool {
        !self.citations.is_empty() || !self.memory_hits.is_empty()
    }
}

/// Self-critique result for one [`AgentOutput`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCritique {
    pub agent: AgentType,
    pub passed: bool,
    pub issues: Vec<String>,
    pub suggested_edits: Vec<String>,
    /// Clamped to [-0.5, 0.5].
    pub confidence_impact: f32,
    pub escalate: bool,
    pub created_at: DateTime<Utc>,
}

/// Conflict type detected by the meta-coherence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Contradiction,
    Inconsistency,
    MissingEvidence,
}

impl ConflictType {
    pub fn severity(&self) -> f32 {
        match self {
            ConflictType::Contradiction => 0.8,
            ConflictType::Inconsistency => 0.6,
            ConflictType::MissingEvidence => 0.4,
        }
    }
}

/// A detected cross-agent conflict, with a targeted resolution attached once resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictTicket {
    pub id: String,
    pub conflicting_agents: Vec<AgentType>,
    #[serde(rename = "type")]
    pub kind: ConflictType,
    pub description: String,
    pub severity: f32,
    pub suggested_resolution: String,
}

impl ConflictTicket {
    pub fn new(kind: ConflictType, agents: Vec<AgentType>, description: String, suggested_resolution: String) -> Self {
        ConflictTicket {
            id: Uuid::new_v4().to_string(),
            conflicting_agents: agents,
            severity: kind.severity(),
            kind,
            description,
            suggested_resolution,
        }
    }
}

/// Resolution produced for a [`ConflictTicket`] by a targeted LLM prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub conflict_id: String,
    pub text: String,
    pub confidence: f32,
}

/// A gated candidate visible in the Global Workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastItem {
    pub id: String,
    pub text: String,
    pub contributors: Vec<AgentType>,
    pub confidence: f32,
    pub speculative: bool,
    pub iteration: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BroadcastItem {
    pub fn disclaimer(&self) -> Option<&str> {
        self.metadata
            .get("disclaimer")
            .and_then(|v| v.as_str())
    }
}

/// A Working Memory slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRepresentation {
    pub content: String,
    pub source_agents: Vec<AgentType>,
    pub priority: f32,
    pub decay: f32,
    pub created_at: DateTime<Utc>,
}

/// Three global scalar modulators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NeuromodulatorState {
    pub attention_gain: f32,
    pub explore_noise: f32,
    pub reward_signal: f32,
    pub updated_at: DateTime<Utc>,
}

impl Default for NeuromodulatorState {
    fn default() -> Self {
        NeuromodulatorState {
            attention_gain: 1.0,
            explore_noise: 0.2,
            reward_signal: 0.0,
            updated_at: Utc::now(),
        }
    }
}

/// Memory record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Episodic,
    Semantic,
    Reflective,
    Procedural,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemoryKind::Episodic => "episodic",
            MemoryKind::Semantic => "semantic",
            MemoryKind::Reflective => "reflective",
            MemoryKind::Procedural => "procedural",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Low,
    Medium,
    High,
    Sensitive,
}

/// A persisted memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub kind: MemoryKind,
    pub raw_text: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub importance: f32,
    pub consent: bool,
    pub privacy_level: PrivacyLevel,
    pub created_at: DateTime<Utc>,
    pub tombstoned: bool,
}

/// A PII-redacted chunk of a [`MemoryItem`], embedded for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub memory_id: String,
    pub position: usize,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
}

/// A scored retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub memory_id: String,
    pub chunk_text: String,
    pub distance: f32,
    pub importance: f32,
    pub timestamp: DateTime<Utc>,
    pub score: f32,
}

/// Preprocessed context handed to the classifier and reasoners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub percept: Percept,
    pub memories: HashMap<String, Vec<MemoryHit>>,
    pub labels: Vec<String>,
    pub label_confidences: HashMap<String, f32>,
    pub reasoning_depth: ReasoningDepth,
    /// Bounded to W entries (default 7), most-recent last.
    pub working_memory: Vec<String>,
}

/// Classifier output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub intent: String,
    pub query_type: String,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub confidence: f32,
    pub labels: Vec<String>,
    pub label_confidences: HashMap<String, f32>,
    pub reasoning_depth: ReasoningDepth,
}
