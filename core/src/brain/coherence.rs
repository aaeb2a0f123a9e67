//! Meta-Coherence Engine: contradiction / inconsistency / missing-evidence
//! detection across agent outputs, with targeted LLM resolutions and a
//! composite coherence score.
//!
//! Grounded on `ra9/core/meta_coherence_engine.py` for claim extraction,
//! the negation/opposite-word contradiction check, the inconsistency marker
//! list, and the coherence-score formula.

use super::error::Result;
use super::llm::{complete_with_retry, CompletionRequest, LlmGateway, RetryPolicy};
use super::types::{AgentOutput, ConflictResolution, ConflictTicket, ConflictType};

pub const DEFAULT_COHERENCE_THRESHOLD: f32 = 0.85;
const MAX_CLAIMS: usize = 5;
const MIN_CLAIM_WORDS: usize = 4;

const NEGATION_PAIRS: &[(&str, &str)] = &[
    ("is", "is not"),
    ("are", "are not"),
    ("can", "cannot"),
    ("will", "will not"),
    ("should", "should not"),
    ("must", "must not"),
];
const OPPOSITE_PAIRS: &[(&str, &str)] = &[
    ("good", "bad"),
    ("right", "wrong"),
    ("true", "false"),
    ("correct", "incorrect"),
    ("valid", "invalid"),
    ("success", "failure"),
];
const INCONSISTENCY_MARKERS: &[&str] = &[
    "however", "but", "although", "despite", "on the other hand", "conversely", "alternatively", "meanwhile", "in contrast",
];
const DISCOURSE_STARTERS: &[&str] = &["however", "but", "although", "despite"];

pub struct CoherenceReport {
    pub coherence_score: f32,
    pub conflicts: Vec<ConflictTicket>,
    pub resolutions: Vec<ConflictResolution>,
    pub is_coherent: bool,
}

/// analyze(outputs) -> CoherenceReport.
pub async fn analyze(outputs: &[AgentOutput], gateway: &dyn LlmGateway, threshold: f32) -> Result<CoherenceReport> {
    let claims: Vec<(usize, Vec<String>)> = outputs.iter().enumerate().map(|(i, o)| (i, extract_claims(&o.text_draft))).collect();

    let mut conflicts = Vec::new();
    for a in 0..outputs.len() {
        for b in (a + 1)..outputs.len() {
            if let Some(conflict) = detect_pair(&outputs[a], &outputs[b], &claims[a].1, &claims[b].1) {
                conflicts.push(conflict);
            }
        }
    }

    let mut resolutions = Vec::new();
    for conflict in &conflicts {
        resolutions.push(resolve(conflict, gateway).await?);
    }

    let mean_confidence = if outputs.is_empty() {
        0.0
    } else {
        outputs.iter().map(|o| o.confidence).sum::<f32>() / outputs.len() as f32
    };
    let severity_penalty: f32 = conflicts.iter().map(|c| c.severity * 0.2).sum();
    let evidence_bonus = 0.1 * outputs.iter().filter(|o| o.has_evidence()).count() as f32;
    let coherence_score = (mean_confidence - severity_penalty + evidence_bonus).clamp(0.0, 1.0);
    let is_coherent = coherence_score >= threshold;

    Ok(CoherenceReport { coherence_score, conflicts, resolutions, is_coherent })
}

/// Up to 5 declarative sentences: non-question, non-exclamatory, >=4 words,
/// not starting with a discourse marker.
fn extract_claims(text: &str) -> Vec<String> {
    text.split('.')
        .map(|s| s.trim())
        .filter(|s| {
            !s.is_empty()
                && !s.ends_with('?')
                && !s.ends_with('!')
                && !s.starts_with('?')
                && !s.starts_with('!')
                && s.split_whitespace().count() >= MIN_CLAIM_WORDS
                && !DISCOURSE_STARTERS.iter().any(|m| s.to_lowercase().starts_with(m))
        })
        .map(|s| s.to_string())
        .take(MAX_CLAIMS)
        .collect()
}

fn detect_pair(a: &AgentOutput, b: &AgentOutput, claims_a: &[String], claims_b: &[String]) -> Option<ConflictTicket> {
    for claim_a in claims_a {
        for claim_b in claims_b {
            if are_contradictory(claim_a, claim_b) {
                return Some(ConflictTicket::new(
                    ConflictType::Contradiction,
                    vec![a.agent, b.agent],
                    format!("Contradiction between {} and {}", a.agent, b.agent),
                    format!("Reconcile conflicting claims: '{claim_a}' vs '{claim_b}'"),
                ));
            }
        }
    }
    for claim_a in claims_a {
        for claim_b in claims_b {
            if are_inconsistent(claim_a, claim_b) {
                return Some(ConflictTicket::new(
                    ConflictType::Inconsistency,
                    vec![a.agent, b.agent],
                    format!("Inconsistency between {} and {}", a.agent, b.agent),
                    format!("Clarify relationship between: '{claim_a}' and '{claim_b}'"),
                ));
            }
        }
    }
    missing_evidence(a, b)
}

fn are_contradictory(claim_a: &str, claim_b: &str) -> bool {
    let lower_a = claim_a.to_lowercase();
    let lower_b = claim_b.to_lowercase();
    for (pos, neg) in NEGATION_PAIRS {
        if (lower_a.contains(pos) && lower_b.contains(neg)) || (lower_b.contains(pos) && lower_a.contains(neg)) {
            return true;
        }
    }
    for (w1, w2) in OPPOSITE_PAIRS {
        if (lower_a.contains(w1) && lower_b.contains(w2)) || (lower_b.contains(w1) && lower_a.contains(w2)) {
            return true;
        }
    }
    false
}

fn are_inconsistent(claim_a: &str, claim_b: &str) -> bool {
    let lower_a = claim_a.to_lowercase();
    let lower_b = claim_b.to_lowercase();
    INCONSISTENCY_MARKERS.iter().any(|m| lower_a.contains(m) || lower_b.contains(m))
}

fn missing_evidence(a: &AgentOutput, b: &AgentOutput) -> Option<ConflictTicket> {
    let has_a = a.has_evidence();
    let has_b = b.has_evidence();
    if has_a && !has_b {
        Some(ConflictTicket::new(
            ConflictType::MissingEvidence,
            vec![a.agent, b.agent],
            format!("{} lacks supporting evidence", b.agent),
            format!("Provide evidence for {} claims", b.agent),
        ))
    } else if has_b && !has_a {
        Some(ConflictTicket::new(
            ConflictType::MissingEvidence,
            vec![a.agent, b.agent],
            format!("{} lacks supporting evidence", a.agent),
            format!("Provide evidence for {} claims", a.agent),
        ))
    } else {
        None
    }
}

/// Targeted resolution prompt, varying by conflict type: arbitration /
/// clarification / evidence generation.
async fn resolve(conflict: &ConflictTicket, gateway: &dyn LlmGateway) -> Result<ConflictResolution> {
    let (kind, expected_confidence) = match conflict.kind {
        ConflictType::Contradiction => ("arbitration", 0.7),
        ConflictType::Inconsistency => ("clarification", 0.8),
        ConflictType::MissingEvidence => ("evidence generation", 0.6),
    };
    let prompt = format!(
        "Perform {kind} for the following conflict: {}\nSuggested resolution: {}",
        conflict.description, conflict.suggested_resolution
    );
    let request = CompletionRequest { prompt, temperature: 0.3, max_tokens: 256 };
    let response = complete_with_retry(gateway, &request, RetryPolicy::default()).await?;
    Ok(ConflictResolution { conflict_id: conflict.id.clone(), text: response.text, confidence: expected_confidence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::llm::CompletionResponse;
    use crate::brain::types::AgentType;
    use async_trait::async_trait;
    use chrono::Utc;

    struct EchoGateway;

    #[async_trait]
    impl LlmGateway for EchoGateway {
        async fn complete(&self, _r: &CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse { text: "resolved.".to_string() })
        }
    }

    fn output(agent: AgentType, text: &str) -> AgentOutput {
        AgentOutput {
            agent,
            text_draft: text.to_string(),
            reasoning_trace: vec![],
            confidence: 0.7,
            confidence_rationale: String::new(),
            citations: vec![],
            memory_hits: vec![],
            iteration: 0,
            created_at: Utc::now(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn detects_contradiction() {
        let a = output(AgentType::Logical, "Photosynthesis is endothermic overall process.");
        let b = output(AgentType::Emotional, "Photosynthesis is not endothermic at all.");
        let report = analyze(&[a, b], &EchoGateway, DEFAULT_COHERENCE_THRESHOLD).await.unwrap();
        assert!(report.conflicts.iter().any(|c| matches!(c.kind, ConflictType::Contradiction)));
    }

    #[tokio::test]
    async fn no_conflict_when_outputs_agree() {
        let a = output(AgentType::Logical, "The launch plan has three clear steps forward.");
        let b = output(AgentType::Strategic, "The launch plan has three clear steps forward.");
        let report = analyze(&[a, b], &EchoGateway, DEFAULT_COHERENCE_THRESHOLD).await.unwrap();
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn claims_exclude_questions_and_discourse_starters() {
        let claims = extract_claims("Is this correct? However this point should not count. This is a valid claim here.");
        assert!(claims.iter().all(|c| !c.to_lowercase().starts_with("however")));
        assert!(!claims.iter().any(|c| c.contains("Is this correct")));
    }
}
