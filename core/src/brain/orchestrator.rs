//! Orchestrator: the end-to-end pipeline that turns one query
//! into a synthesized answer, iterating reasoning/critique/coherence/gating
//! until quality converges or `loop_depth` is exhausted.
//!
//! Grounded on `ra9/core/engine.py`'s `run_ra9_cognitive_engine`/
//! `recursive_thinking_loop` for the step sequence, using bounded
//! concurrency via `futures::future::join_all` over a capped reasoner
//! slice, since `tokio::task::JoinSet` is overkill for ≤8 tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;

use super::coherence::{self, CoherenceReport, DEFAULT_COHERENCE_THRESHOLD};
use super::context::ContextPreprocessor;
use super::critique::CritiqueManager;
use super::error::Result;
use super::gating::{self, GatingContext, GatingPolicyConfig, ResourceTracker};
use super::llm::LlmGateway;
use super::memory::store::MemoryStore;
use super::neuromodulation::NeuromodulationController;
use super::perception::{PerceptionAdapter, PerceptionMetadata};
use super::reasoners::{self, degraded_output};
use super::types::{AgentOutput, AgentType, BroadcastItem, MemoryKind, PrivacyLevel};
use super::workspace::{broadcast_and_store, GlobalWorkspace, WorkingMemory};

pub const DEFAULT_LOOP_DEPTH: u32 = 3;
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_MAX_AGENTS: usize = 8;
const QUALITY_STOP_THRESHOLD: f32 = 0.95;

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub loop_depth: u32,
    pub allow_memory_write: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        QueryRequest { text: String::new(), session_id: "default".to_string(), user_id: None, loop_depth: DEFAULT_LOOP_DEPTH, allow_memory_write: false }
    }
}

#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: u32,
    pub quality: f32,
    pub coherence_score: f32,
    pub broadcast_count: usize,
    pub quarantine_count: usize,
}

#[derive(Debug, Clone)]
pub struct QuarantinedItem {
    pub agent: AgentType,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub final_answer: String,
    pub iteration_trace: Vec<IterationRecord>,
    pub quality_score: f32,
    pub coherence_score: f32,
    pub quarantine: Vec<QuarantinedItem>,
}

/// A cooperative cancel token, checked at iteration boundaries and between
/// pipeline steps.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    gateway: Arc<dyn LlmGateway>,
    perception: PerceptionAdapter,
    context: ContextPreprocessor,
    memory: Arc<MemoryStore>,
    neuromodulation: Arc<NeuromodulationController>,
    critique: CritiqueManager,
    workspace: GlobalWorkspace,
    working_memory: WorkingMemory,
    resources: ResourceTracker,
    max_workers: usize,
    max_agents: usize,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        embedder: Arc<dyn super::embedder::Embedder>,
        memory: Arc<MemoryStore>,
        wm_registry: Arc<super::context::WorkingMemoryRegistry>,
        neuromodulation: Arc<NeuromodulationController>,
    ) -> Self {
        Orchestrator {
            gateway,
            perception: PerceptionAdapter::new(embedder),
            context: ContextPreprocessor::new(memory.clone(), wm_registry),
            memory,
            neuromodulation,
            critique: CritiqueManager::new(),
            workspace: GlobalWorkspace::new(),
            working_memory: WorkingMemory::new(),
            resources: ResourceTracker::new(10.0, 0.1),
            max_workers: DEFAULT_MAX_WORKERS,
            max_agents: DEFAULT_MAX_AGENTS,
        }
    }

    pub fn workspace(&self) -> &GlobalWorkspace {
        &self.workspace
    }

    pub fn working_memory(&self) -> &WorkingMemory {
        &self.working_memory
    }

    /// Runs one query end-to-end: perceive, classify, reason, critique,
    pub async fn process(&self, request: QueryRequest, cancel: &CancelToken) -> Result<QueryResult> {
        if request.text.trim().is_empty() {
            return Err(super::error::CoreError::input("query text must not be empty"));
        }

        // Step 1: perception.
        let metadata = PerceptionMetadata { session_id: request.session_id.clone(), user_id: request.user_id.clone().unwrap_or_default(), privacy_flags: HashMap::new() };
        let percept = self.perception.process(&request.text, metadata).await?;
        let preprocessed = self.context.preprocess(request.user_id.as_deref(), &request.text).await;

        if cancel.is_cancelled() {
            return Ok(cancelled_result());
        }

        // Step 2: classify.
        let classifier = super::classifier::QueryClassifier::new(self.gateway.as_ref());
        let memory_context = preprocessed.recent_episodic_summaries.join("; ");
        let classification = classifier.classify(&request.text, &memory_context, request.user_id.as_deref()).await;

        let context_bundle = self.context.build_bundle(
            percept,
            &preprocessed,
            classification.labels.clone(),
            classification.label_confidences.clone(),
            classification.reasoning_depth,
        );

        if cancel.is_cancelled() {
            return Ok(cancelled_result());
        }

        // Step 3: select agents.
        let selected = self.select_agents(&classification.labels, classification.reasoning_depth);

        let mut iteration_trace = Vec::new();
        let mut quarantine: Vec<QuarantinedItem> = Vec::new();
        let mut last_broadcast: Vec<BroadcastItem> = Vec::new();
        let mut last_coherence = CoherenceReport { coherence_score: 0.0, conflicts: vec![], resolutions: vec![], is_coherent: false };
        let mut previous_quality: Option<f32> = None;

        // Step 4: iterate.
        for iteration in 0..request.loop_depth.max(1) {
            if cancel.is_cancelled() {
                break;
            }

            // 4a: modulation.
            let modulations: HashMap<AgentType, _> =
                selected.iter().map(|a| (*a, self.neuromodulation.modulate_agent_behavior(*a, 0.6, 0.7))).collect();

            // 4b: parallel reasoning, bounded to max_workers per chunk.
            let mut outputs = Vec::new();
            for chunk in selected.chunks(self.max_workers) {
                if cancel.is_cancelled() {
                    break;
                }
                let futures = chunk.iter().map(|agent| {
                    let reasoner = reasoners::reasoner_for(*agent);
                    let modulation = modulations[agent];
                    let gateway = self.gateway.clone();
                    let bundle = context_bundle.clone();
                    async move { reasoner.run(&bundle, &modulation, gateway.as_ref()).await }
                });
                for result in join_all(futures).await {
                    match result {
                        Ok(output) => outputs.push(output),
                        Err(err) => outputs.push(degraded_output(AgentType::Logical, &err.to_string())),
                    }
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            // 4c: critique/rewrite.
            let mut critiqued = Vec::new();
            for output in outputs {
                match self.critique.critique_and_rewrite(output, self.gateway.as_ref()).await {
                    Ok((rewritten, critique)) => critiqued.push((rewritten, critique)),
                    Err(err) => {
                        let agent = AgentType::Logical;
                        let fallback = degraded_output(agent, &err.to_string());
                        let critique = super::types::AgentCritique {
                            agent,
                            passed: true,
                            issues: vec![],
                            suggested_edits: vec![],
                            confidence_impact: 0.0,
                            escalate: false,
                            created_at: Utc::now(),
                        };
                        critiqued.push((fallback, critique));
                    }
                }
            }
            critiqued.sort_by_key(|(o, _)| format!("{}", o.agent));

            // 4d: coherence analysis.
            let all_outputs: Vec<AgentOutput> = critiqued.iter().map(|(o, _)| o.clone()).collect();
            let coherence_report = match coherence::analyze(&all_outputs, self.gateway.as_ref(), DEFAULT_COHERENCE_THRESHOLD).await {
                Ok(report) => report,
                Err(_) => {
                    let mean_confidence = mean(all_outputs.iter().map(|o| o.confidence));
                    CoherenceReport { coherence_score: mean_confidence, conflicts: vec![], resolutions: vec![], is_coherent: mean_confidence >= DEFAULT_COHERENCE_THRESHOLD }
                }
            };

            // 4e: form candidates.
            let verifier_passed = critiqued.iter().find(|(o, _)| o.agent == AgentType::Verifier).map(|(_, c)| c.passed);
            let speculative_count = critiqued.iter().filter(|(_, c)| !c.passed).count();
            let ratio_denominator = critiqued.len().max(1);

            let mut broadcast_this_round = Vec::new();
            let mut quarantine_this_round = Vec::new();

            for (output, agent_critique) in &critiqued {
                let speculative = !agent_critique.passed;
                let mut metadata = HashMap::new();
                metadata.insert("agent_critique".to_string(), serde_json::json!({"passed": agent_critique.passed, "issues": agent_critique.issues}));
                if let Some(passed) = verifier_passed {
                    metadata.insert("verifier".to_string(), serde_json::json!({"passed": passed}));
                }
                metadata.insert("speculative".to_string(), serde_json::Value::Bool(speculative));
                if speculative {
                    metadata.insert("disclaimer".to_string(), serde_json::Value::String(
                        "This response includes speculative content that did not pass full verification.".to_string(),
                    ));
                }

                let candidate = BroadcastItem {
                    id: uuid::Uuid::new_v4().to_string(),
                    text: output.text_draft.clone(),
                    contributors: vec![output.agent],
                    confidence: output.confidence,
                    speculative,
                    iteration,
                    created_at: Utc::now(),
                    metadata,
                };

                if !gating::quality_gate_passes(&candidate) {
                    quarantine_this_round.push(QuarantinedItem { agent: output.agent, reason: "Blocked by quality gate".to_string() });
                    continue;
                }

                let gating_context = GatingContext { neuromodulator_state: self.neuromodulation.get_state(), query_intent: classification.labels.clone() };
                let speculative_ratio = speculative_count as f32 / ratio_denominator as f32;
                let decision = gating::evaluate_policy(&candidate, self.resources.remaining(), speculative_ratio, &gating_context, &GatingPolicyConfig::default());

                if decision.should_gate {
                    self.resources.consume(&candidate);
                    broadcast_and_store(&self.workspace, &self.working_memory, candidate.clone(), true);
                    broadcast_this_round.push(candidate);
                } else {
                    quarantine_this_round.push(QuarantinedItem { agent: output.agent, reason: decision.reason });
                }
            }

            // 4g: assess quality.
            let critique_pass_rate = if critiqued.is_empty() {
                0.0
            } else {
                critiqued.iter().filter(|(_, c)| c.passed).count() as f32 / critiqued.len() as f32
            };
            let mean_broadcast_confidence = mean(broadcast_this_round.iter().map(|b| b.confidence));
            let quality = ((mean_broadcast_confidence + coherence_report.coherence_score + critique_pass_rate) / 3.0).clamp(0.0, 1.0);

            iteration_trace.push(IterationRecord {
                iteration,
                quality,
                coherence_score: coherence_report.coherence_score,
                broadcast_count: broadcast_this_round.len(),
                quarantine_count: quarantine_this_round.len(),
            });

            last_broadcast = broadcast_this_round;
            quarantine = quarantine_this_round;
            last_coherence = coherence_report;

            let converged = previous_quality.map(|p| (quality - p).abs() < 1e-3).unwrap_or(false);
            previous_quality = Some(quality);
            if quality >= QUALITY_STOP_THRESHOLD || converged {
                break;
            }
        }

        // Step 5: synthesize.
        let final_answer = self.synthesize(&request.text, &last_broadcast).await?;

        // Step 6: feedback.
        let quality_score = iteration_trace.last().map(|r| r.quality).unwrap_or(0.0);
        self.neuromodulation.success(quality_score);
        if classification.labels.iter().any(|l| !preprocessed.recent_episodic_summaries.iter().any(|s| s.contains(l.as_str()))) {
            self.neuromodulation.novelty(0.3);
        }

        // Step 7: memory write.
        if request.allow_memory_write && last_coherence.is_coherent {
            self.write_memory_outcomes(&request.text, &final_answer, &last_coherence).await?;
        }

        Ok(QueryResult { final_answer, iteration_trace, quality_score, coherence_score: last_coherence.coherence_score, quarantine })
    }

    /// Always Logical, then label-matched agents, then (for deep queries)
    /// the remaining suite, capped at `max_agents`.
    fn select_agents(&self, labels: &[String], depth: super::types::ReasoningDepth) -> Vec<AgentType> {
        let mut selected = vec![AgentType::Logical];
        let label_agent = |label: &str| -> Option<AgentType> {
            match label {
                "logical" => Some(AgentType::Logical),
                "emotional" => Some(AgentType::Emotional),
                "creative" => Some(AgentType::Creative),
                "strategic" => Some(AgentType::Strategic),
                "factual" => Some(AgentType::Verifier),
                "reflective" => Some(AgentType::Arbiter),
                _ => None,
            }
        };
        for label in labels {
            if let Some(agent) = label_agent(label) {
                if !selected.contains(&agent) {
                    selected.push(agent);
                }
            }
        }
        if depth == super::types::ReasoningDepth::Deep {
            for agent in AgentType::ALL {
                if !selected.contains(&agent) {
                    selected.push(agent);
                }
            }
        }
        selected.truncate(self.max_agents);
        selected
    }

    async fn synthesize(&self, query: &str, items: &[BroadcastItem]) -> Result<String> {
        if items.is_empty() {
            return Ok("I was unable to produce a confident answer to this query.".to_string());
        }
        let mut prompt = format!("Synthesize a final answer to: {query}\n\nGated perspectives:\n");
        let mut disclaimers = Vec::new();
        for item in items {
            prompt.push_str(&format!("- [{}] {}\n", item.contributors.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(","), item.text));
            if let Some(d) = item.disclaimer() {
                disclaimers.push(d.to_string());
            }
        }
        let request = super::llm::CompletionRequest { prompt, temperature: 0.4, max_tokens: 1024 };
        let response = super::llm::complete_with_retry(self.gateway.as_ref(), &request, super::llm::RetryPolicy::default()).await?;
        let mut answer = response.text;
        for disclaimer in disclaimers {
            if !answer.contains(&disclaimer) {
                answer.push_str(&format!("\n\n{disclaimer}"));
            }
        }
        Ok(answer)
    }

    async fn write_memory_outcomes(&self, query: &str, answer: &str, coherence: &CoherenceReport) -> Result<()> {
        let episodic_text = format!("Q: {query}\nA: {answer}");
        self.memory.write(MemoryKind::Episodic, &episodic_text, vec![], 0.5, true, PrivacyLevel::Low).await?;

        if answer.len() > 300 {
            self.memory.write(MemoryKind::Semantic, &format!("Summary: {}", &answer[..answer.len().min(300)]), vec![], 0.6, true, PrivacyLevel::Low).await?;
        }

        if !coherence.resolutions.is_empty() {
            let note = coherence.resolutions.iter().map(|r| r.text.clone()).collect::<Vec<_>>().join("; ");
            self.memory.write(MemoryKind::Reflective, &note, vec![], 0.4, true, PrivacyLevel::Low).await?;
        }
        Ok(())
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

fn cancelled_result() -> QueryResult {
    QueryResult {
        final_answer: String::new(),
        iteration_trace: vec![],
        quality_score: 0.0,
        coherence_score: 0.0,
        quarantine: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::embedder::HashEmbedder;
    use crate::brain::llm::CompletionResponse;
    use crate::brain::memory::store::MemoryConfig;
    use crate::brain::context::WorkingMemoryRegistry;
    use async_trait::async_trait;

    struct StubGateway;

    #[async_trait]
    impl LlmGateway for StubGateway {
        async fn complete(&self, request: &super::super::llm::CompletionRequest) -> Result<CompletionResponse> {
            if request.prompt.contains("classifier") {
                return Ok(CompletionResponse {
                    text: r#"{"intent": "plan", "query_type": "strategic", "labels": ["strategic", "logical"], "label_confidences": {"strategic": 0.8}, "confidence": 0.7, "reasoning_depth": "shallow"}"#.to_string(),
                });
            }
            if request.prompt.contains("STRICT JSON only: {\"pass\"") {
                return Ok(CompletionResponse { text: r#"{"pass": true, "issues": [], "suggested_edits": []}"#.to_string() });
            }
            Ok(CompletionResponse { text: "Step one: plan. Step two: execute. Step three: reflect on risks.".to_string() })
        }
    }

    fn build_orchestrator() -> Orchestrator {
        let gateway: Arc<dyn LlmGateway> = Arc::new(StubGateway);
        let embedder: Arc<dyn super::super::embedder::Embedder> = Arc::new(HashEmbedder::default());
        let memory = Arc::new(MemoryStore::new(embedder.clone(), MemoryConfig::default()));
        let wm_registry = Arc::new(WorkingMemoryRegistry::new(7));
        let neuromodulation = Arc::new(NeuromodulationController::new());
        Orchestrator::new(gateway, embedder, memory, wm_registry, neuromodulation)
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let orchestrator = build_orchestrator();
        let result = orchestrator.process(QueryRequest { text: "".to_string(), ..Default::default() }, &CancelToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn happy_path_produces_answer_and_trace() {
        let orchestrator = build_orchestrator();
        let request = QueryRequest {
            text: "Plan a 3-step launch strategy for a new AI product and reflect on risks.".to_string(),
            loop_depth: 1,
            ..Default::default()
        };
        let result = orchestrator.process(request, &CancelToken::new()).await.unwrap();
        assert!(!result.iteration_trace.is_empty());
        assert!(!result.final_answer.is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_empty_result() {
        let orchestrator = build_orchestrator();
        let cancel = CancelToken::new();
        cancel.cancel();
        let request = QueryRequest { text: "hello".to_string(), ..Default::default() };
        let result = orchestrator.process(request, &cancel).await.unwrap();
        assert!(result.final_answer.is_empty());
    }

    #[test]
    fn agent_selection_always_includes_logical() {
        let orchestrator = build_orchestrator();
        let selected = orchestrator.select_agents(&["creative".to_string()], super::super::types::ReasoningDepth::Shallow);
        assert!(selected.contains(&AgentType::Logical));
        assert!(selected.contains(&AgentType::Creative));
    }
}
