//! Local Reasoner Suite: six typed reasoners sharing one
//! `run(context, modulation) -> AgentOutput` contract, dispatched in
//! parallel by the Orchestrator.
//!
//! Grounded on `ra9/core/local_reasoners.py`'s `LocalReasoner` base class for
//! the prompt/confidence/citation/memory-hit extraction pipeline, and on the
//! `name`/`description`/async-`run` shape common to this kind of
//! pluggable reasoning-engine trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

use super::error::Result;
use super::llm::{complete_with_retry, CompletionRequest, LlmGateway, RetryPolicy};
use super::neuromodulation::AgentModulation;
use super::types::{AgentOutput, AgentType, Citation, ContextBundle, MemoryHit};

const UNCERTAIN_WORDS: &[&str] = &["maybe", "perhaps", "might", "could", "unclear", "not sure", "possibly"];
const CERTAIN_WORDS: &[&str] = &["definitely", "certainly", "sure", "clearly", "obviously", "confident"];
const MAX_REASONING_STEPS: usize = 5;
const MAX_CITATIONS: usize = 5;
const MAX_MEMORY_HITS: usize = 5;
const MIN_OVERLAP: usize = 3;

fn bare_decimal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b0\.\d+\d*\b").unwrap())
}

fn bracket_citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").unwrap())
}

fn paren_citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]{3,60})\)").unwrap())
}

fn according_to_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)according to ([^,.]+)").unwrap())
}

/// A typed local reasoner, analogous to a cortical column specialized for one
/// reasoning perspective.
#[async_trait]
pub trait LocalReasoner: Send + Sync {
    fn agent_type(&self) -> AgentType;
    fn role(&self) -> &'static str;
    fn prompt_template(&self) -> &'static str;
    fn confidence_threshold(&self) -> f32 {
        0.3
    }
    fn max_reasoning_steps(&self) -> usize {
        MAX_REASONING_STEPS
    }

    async fn run(&self, context: &ContextBundle, modulation: &AgentModulation, gateway: &dyn LlmGateway) -> Result<AgentOutput> {
        let prompt = build_prompt(self.role(), self.prompt_template(), self.agent_type(), context, modulation);
        let request = CompletionRequest { prompt, temperature: modulation.temperature, max_tokens: 1024 };
        let response = complete_with_retry(gateway, &request, RetryPolicy::default()).await?;
        Ok(finish_output(self.agent_type(), &response.text, context, modulation, self.max_reasoning_steps()))
    }
}

fn build_prompt(role: &str, template: &str, agent: AgentType, context: &ContextBundle, modulation: &AgentModulation) -> String {
    let memory_summary = summarize_memory(context);
    format!(
        "{template}\n\nRole: {role}\nFocus: {focus:?}\nQuery: {query}\nModality: {modality}\nReasoning depth: {depth}\n\
         Labels: {labels}\nMemory context: {memory_summary}\n\n\
         Instructions:\n- Respond from the {role} perspective.\n- Show your reasoning steps.\n\
         - Temperature hint: {temperature:.2}\n- Confidence factor hint: {confidence:.2}\n\nResponse:\n",
        template = template,
        role = role,
        focus = agent.focus_keywords(),
        query = context.percept.raw_text,
        modality = context.percept.modality,
        depth = context.reasoning_depth,
        labels = context.labels.join(", "),
        memory_summary = memory_summary,
        temperature = modulation.temperature,
        confidence = modulation.confidence,
    )
}

fn summarize_memory(context: &ContextBundle) -> String {
    if context.memories.is_empty() {
        return "No relevant memories found.".to_string();
    }
    context
        .memories
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(kind, v)| format!("{kind}: {} items", v.len()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Shared tail of the reasoning pipeline: trace/confidence/citation/memory-hit extraction plus
/// the text_draft sanitization invariant.
fn finish_output(agent: AgentType, raw_text: &str, context: &ContextBundle, modulation: &AgentModulation, max_steps: usize) -> AgentOutput {
    let reasoning_trace = extract_reasoning_trace(raw_text, max_steps);
    let confidence = calculate_confidence(raw_text, &reasoning_trace, modulation);
    let citations = extract_citations(raw_text);
    let memory_hits = extract_memory_hits(raw_text, context);
    let (text_draft, elided) = sanitize_text(raw_text);

    let mut rationale_parts = Vec::new();
    if !reasoning_trace.is_empty() {
        rationale_parts.push(format!("{} reasoning steps", reasoning_trace.len()));
    }
    if modulation.attention_factor > 1.0 {
        rationale_parts.push("heightened attention".to_string());
    }
    if modulation.explore_factor > 1.0 {
        rationale_parts.push("some exploration".to_string());
    }
    if elided {
        rationale_parts.push("numeric confidence elided from prose".to_string());
    }
    if rationale_parts.is_empty() {
        rationale_parts.push("balanced assessment".to_string());
    }

    AgentOutput {
        agent,
        text_draft,
        reasoning_trace,
        confidence,
        confidence_rationale: rationale_parts.join(", "),
        citations,
        memory_hits,
        iteration: 0,
        created_at: Utc::now(),
        metadata: Default::default(),
    }
}

/// Strip bare decimal tokens ("0.xx") from prose so a model's raw
/// substituting "[confidence elided]". Returns whether anything was elided.
fn sanitize_text(text: &str) -> (String, bool) {
    let elided = bare_decimal_re().is_match(text);
    let cleaned = bare_decimal_re().replace_all(text, "[confidence elided]").to_string();
    (cleaned, elided)
}

fn extract_reasoning_trace(text: &str, max_steps: usize) -> Vec<String> {
    let mut steps: Vec<String> = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| {
            !l.is_empty()
                && (l.starts_with(|c: char| c.is_ascii_digit()) && l.contains('.')
                    || l.starts_with('-')
                    || l.starts_with('*')
                    || l.starts_with('\u{2022}')
                    || l.to_lowercase().contains("step")
                    || l.to_lowercase().contains("reasoning"))
        })
        .map(|l| l.to_string())
        .collect();

    if steps.is_empty() {
        steps = text
            .split('.')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| format!("{s}."))
            .collect();
    }
    steps.truncate(max_steps);
    steps
}

/// confidence = clamp((0.5 + length_factor + trace_factor + uncertainty_factor
/// + confidence_factor)/5 * modulation.confidence, [0,1]).
fn calculate_confidence(text: &str, trace: &[String], modulation: &AgentModulation) -> f32 {
    let lower = text.to_lowercase();
    let length_factor = (text.len() as f32 / 500.0).min(1.0);
    let trace_factor = (trace.len() as f32 / 3.0).min(1.0);
    let uncertainty_hits = UNCERTAIN_WORDS.iter().filter(|w| lower.contains(*w)).count() as f32;
    let uncertainty_factor = (1.0 - 0.1 * uncertainty_hits).max(0.0);
    let certainty_hits = CERTAIN_WORDS.iter().filter(|w| lower.contains(*w)).count() as f32;
    let confidence_factor = (1.0 + 0.05 * certainty_hits).min(1.0);

    let base = (0.5 + length_factor + trace_factor + uncertainty_factor + confidence_factor) / 5.0;
    (base * modulation.confidence).clamp(0.0, 1.0)
}

fn extract_citations(text: &str) -> Vec<Citation> {
    let mut citations = Vec::new();
    for cap in bracket_citation_re().captures_iter(text) {
        citations.push(Citation { source: cap[1].to_string(), score: 0.8, kind: "text_reference".to_string() });
    }
    for cap in paren_citation_re().captures_iter(text) {
        citations.push(Citation { source: cap[1].to_string(), score: 0.7, kind: "parenthetical".to_string() });
    }
    for cap in according_to_re().captures_iter(text) {
        citations.push(Citation { source: cap[1].trim().to_string(), score: 0.75, kind: "attribution".to_string() });
    }
    citations.truncate(MAX_CITATIONS);
    citations
}

fn extract_memory_hits(text: &str, context: &ContextBundle) -> Vec<MemoryHit> {
    let response_words: std::collections::HashSet<String> = text.to_lowercase().split_whitespace().map(str::to_string).collect();
    let mut hits = Vec::new();
    for (kind, memories) in &context.memories {
        for hit in memories {
            let memory_words: std::collections::HashSet<String> =
                hit.snippet.to_lowercase().split_whitespace().map(str::to_string).collect();
            let overlap = memory_words.intersection(&response_words).count();
            if overlap >= MIN_OVERLAP {
                hits.push(MemoryHit {
                    id: hit.id.clone(),
                    score: (overlap as f32 / 10.0).min(1.0),
                    kind: kind.clone(),
                    snippet: hit.snippet.clone(),
                });
            }
        }
    }
    hits.truncate(MAX_MEMORY_HITS);
    hits
}

/// Produce a degraded output when a reasoner fails, so the pipeline proceeds
/// when a reasoner errors or times out.
pub fn degraded_output(agent: AgentType, reason: &str) -> AgentOutput {
    AgentOutput::degraded(agent, reason)
}

macro_rules! reasoner {
    ($name:ident, $agent:expr, $role:expr, $template:expr) => {
        pub struct $name;

        #[async_trait]
        impl LocalReasoner for $name {
            fn agent_type(&self) -> AgentType {
                $agent
            }
            fn role(&self) -> &'static str {
                $role
            }
            fn prompt_template(&self) -> &'static str {
                $template
            }
        }
    };
}

reasoner!(
    LogicalReasoner,
    AgentType::Logical,
    "Logical Analysis Expert",
    "You are a logical reasoning expert. Focus on step-by-step reasoning, evidence evaluation, \
     and structured, consistent conclusions."
);
reasoner!(
    EmotionalReasoner,
    AgentType::Emotional,
    "Emotional Intelligence Expert",
    "You are an emotionally intelligent reasoner. Focus on empathy, human impact, and the \
     emotional dimensions of the query."
);
reasoner!(
    CreativeReasoner,
    AgentType::Creative,
    "Creative Thinking Expert",
    "You are a creative reasoner. Focus on originality, novel framings, and imaginative \
     solutions."
);
reasoner!(
    StrategicReasoner,
    AgentType::Strategic,
    "Strategic Planning Expert",
    "You are a strategic reasoner. Focus on long-term thinking, resource optimization, and risk."
);
reasoner!(
    VerifierReasoner,
    AgentType::Verifier,
    "Fact Verification Expert",
    "You are a verification reasoner. Focus on factual accuracy, source verification, and \
     evidence quality; flag unsupported claims explicitly."
);
reasoner!(
    ArbiterReasoner,
    AgentType::Arbiter,
    "Balanced Arbitration Expert",
    "You are an arbitration reasoner. Focus on fairness, balance across perspectives, and \
     conflict resolution."
);

/// Construct the full suite, keyed by [`AgentType`].
pub fn registry() -> Vec<Arc<dyn LocalReasoner>> {
    vec![
        Arc::new(LogicalReasoner),
        Arc::new(EmotionalReasoner),
        Arc::new(CreativeReasoner),
        Arc::new(StrategicReasoner),
        Arc::new(VerifierReasoner),
        Arc::new(ArbiterReasoner),
    ]
}

pub fn reasoner_for(agent: AgentType) -> Arc<dyn LocalReasoner> {
    match agent {
        AgentType::Logical => Arc::new(LogicalReasoner),
        AgentType::Emotional => Arc::new(EmotionalReasoner),
        AgentType::Creative => Arc::new(CreativeReasoner),
        AgentType::Strategic => Arc::new(StrategicReasoner),
        AgentType::Verifier => Arc::new(VerifierReasoner),
        AgentType::Arbiter => Arc::new(ArbiterReasoner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::neuromodulation::NeuromodulationController;
    use std::collections::HashMap;

    fn bundle(text: &str) -> ContextBundle {
        use crate::brain::types::{Modality, Percept};
        ContextBundle {
            percept: Percept {
                modality: Modality::Text,
                embedding: vec![0.0; 8],
                tokens: vec![],
                raw_text: text.to_string(),
                session_id: "s".into(),
                user_id: "u".into(),
                privacy_flags: HashMap::new(),
                created_at: Utc::now(),
            },
            memories: HashMap::new(),
            labels: vec!["logical".to_string()],
            label_confidences: HashMap::new(),
            reasoning_depth: crate::brain::types::ReasoningDepth::Shallow,
            working_memory: vec![],
        }
    }

    #[tokio::test]
    async fn run_strips_bare_decimals_from_draft() {
        use crate::brain::llm::{CompletionResponse, LlmGateway};
        struct G;
        #[async_trait]
        impl LlmGateway for G {
            async fn complete(&self, _r: &CompletionRequest) -> Result<CompletionResponse> {
                Ok(CompletionResponse { text: "I am 0.87 confident. 1. First step. 2. Second step.".to_string() })
            }
        }
        let controller = NeuromodulationController::new();
        let modulation = controller.modulate_agent_behavior(AgentType::Logical, 0.6, 0.7);
        let output = LogicalReasoner.run(&bundle("test"), &modulation, &G).await.unwrap();
        assert!(!bare_decimal_re().is_match(&output.text_draft));
        assert!(output.text_draft.contains("[confidence elided]"));
    }

    #[test]
    fn extracts_numbered_reasoning_trace() {
        let trace = extract_reasoning_trace("1. First.\n2. Second.\n3. Third.", 5);
        assert_eq!(trace.len(), 3);
    }

    #[test]
    fn falls_back_to_sentence_split_when_no_markers() {
        let trace = extract_reasoning_trace("This is one. This is two.", 5);
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn degraded_output_has_zero_confidence() {
        let output = degraded_output(AgentType::Logical, "timeout");
        assert_eq!(output.confidence, 0.0);
        assert_eq!(output.reasoning_trace.len(), 1);
    }
}
