//! Agent Critique Manager: per-agent critic -> rewrite -> re-critique, with
//! rolling pass-rate statistics and a one-rewrite escalation cap.
//!
//! Grounded on `ra9/core/agent_critique.py` for the exact severity-keyword
//! tables, the `passed := issues empty OR all issues contain "minor"` rule,
//! and the single-rewrite-then-escalate loop.

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;

use super::error::Result;
use super::llm::{complete_with_retry, CompletionRequest, LlmGateway, RetryPolicy};
use super::types::{AgentCritique, AgentOutput, AgentType};

const HIGH_SEVERITY: &[&str] = &["error", "contradiction", "inconsistent", "wrong", "incorrect"];
const MEDIUM_SEVERITY: &[&str] = &["unclear", "vague", "missing", "incomplete"];
const LOW_SEVERITY: &[&str] = &["minor", "suggestion", "improvement"];
const ROLLING_WINDOW: usize = 1000;

#[derive(Debug, Deserialize, Default)]
struct RawCritique {
    #[serde(default)]
    pass: Option<bool>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggested_edits: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CritiqueStats {
    recent: VecDeque<bool>,
    total_issues: u64,
    total_critiques: u64,
}

impl CritiqueStats {
    pub fn pass_rate(&self) -> f32 {
        if self.recent.is_empty() {
            return 1.0;
        }
        self.recent.iter().filter(|p| **p).count() as f32 / self.recent.len() as f32
    }

    pub fn avg_issues_per_critique(&self) -> f32 {
        if self.total_critiques == 0 {
            0.0
        } else {
            self.total_issues as f32 / self.total_critiques as f32
        }
    }

    fn record(&mut self, passed: bool, issue_count: usize) {
        self.recent.push_back(passed);
        if self.recent.len() > ROLLING_WINDOW {
            self.recent.pop_front();
        }
        self.total_issues += issue_count as u64;
        self.total_critiques += 1;
    }
}

pub struct CritiqueManager {
    /// Overrides the empty-or-all-minor pass rule: passed := issues.len() <= n.
    pub max_allowed_issues: Option<usize>,
    stats: Mutex<CritiqueStats>,
}

impl CritiqueManager {
    pub fn new() -> Self {
        CritiqueManager { max_allowed_issues: None, stats: Mutex::new(CritiqueStats::default()) }
    }

    pub fn with_max_allowed_issues(max_allowed_issues: usize) -> Self {
        CritiqueManager { max_allowed_issues: Some(max_allowed_issues), stats: Mutex::new(CritiqueStats::default()) }
    }

    pub fn stats(&self) -> CritiqueStats {
        self.stats.lock().clone()
    }

    /// Runs the critic, optionally rewrites once, and re-critiques. Returns
    /// the (possibly rewritten) output plus its final critique.
    pub async fn critique_and_rewrite(
        &self,
        output: AgentOutput,
        gateway: &dyn LlmGateway,
    ) -> Result<(AgentOutput, AgentCritique)> {
        let critique = self.critique(&output, gateway).await?;
        if critique.passed {
            self.record(&critique);
            return Ok((output, critique));
        }

        let rewritten = rewrite(&output, &critique);
        let mut second = self.critique(&rewritten, gateway).await?;
        if !second.passed {
            second.escalate = true;
        }
        self.record(&second);
        Ok((rewritten, second))
    }

    /// Run only the critic (used by idempotence tests / already-passed outputs).
    pub async fn critique(&self, output: &AgentOutput, gateway: &dyn LlmGateway) -> Result<AgentCritique> {
        let prompt = critique_prompt(output);
        let request = CompletionRequest { prompt, temperature: 0.1, max_tokens: 512 };

        let (mut issues, mut suggested_edits) = match complete_with_retry(gateway, &request, RetryPolicy::default()).await {
            Ok(resp) => match parse_structured(&resp.text) {
                Some(raw) => (raw.issues, raw.suggested_edits),
                None => parse_unstructured(&resp.text),
            },
            Err(_) => (Vec::new(), Vec::new()),
        };

        augment_with_focus(output, &mut issues);
        suggested_edits.dedup();

        let passed = match self.max_allowed_issues {
            Some(max) => issues.len() <= max,
            None => issues.is_empty() || issues.iter().all(|i| i.to_lowercase().contains("minor")),
        };

        let confidence_impact = calculate_confidence_impact(&issues, &suggested_edits);

        Ok(AgentCritique {
            agent: output.agent,
            passed,
            issues,
            suggested_edits,
            confidence_impact,
            escalate: false,
            created_at: Utc::now(),
        })
    }

    fn record(&self, critique: &AgentCritique) {
        self.stats.lock().record(critique.passed, critique.issues.len());
    }
}

impl Default for CritiqueManager {
    fn default() -> Self {
        Self::new()
    }
}

fn critique_prompt(output: &AgentOutput) -> String {
    format!(
        "You are a strict critic for a {} reasoner's draft. Respond with STRICT JSON only: \
         {{\"pass\": true|false, \"issues\": [string], \"suggested_edits\": [string]}}.\n\nDraft:\n{}",
        output.agent, output.text_draft
    )
}

fn parse_structured(text: &str) -> Option<RawCritique> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Legacy unstructured parsing: ISSUES:/SUGGESTED_EDITS: sections, falling
/// back to heuristic sentence extraction when the critic ignores the JSON
/// contract (`CritiqueError`).
fn parse_unstructured(text: &str) -> (Vec<String>, Vec<String>) {
    let mut issues = Vec::new();
    let mut edits = Vec::new();
    let mut in_issues = false;
    let mut in_edits = false;
    for line in text.lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_uppercase();
        if upper.starts_with("ISSUES") {
            in_issues = true;
            in_edits = false;
            continue;
        }
        if upper.starts_with("SUGGESTED_EDITS") || upper.starts_with("SUGGESTED EDITS") {
            in_edits = true;
            in_issues = false;
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        let cleaned = trimmed.trim_start_matches(['-', '*', '\u{2022}']).trim().to_string();
        if cleaned.is_empty() {
            continue;
        }
        if in_issues {
            issues.push(cleaned);
        } else if in_edits {
            edits.push(cleaned);
        }
    }

    if issues.is_empty() {
        let keywords = ["issue", "problem", "concern", "error"];
        for sentence in text.split('.') {
            let trimmed = sentence.trim();
            if !trimmed.is_empty() && keywords.iter().any(|k| trimmed.to_lowercase().contains(k)) {
                issues.push(trimmed.to_string());
            }
        }
    }

    (issues, edits)
}

/// Specialized criteria per agent focus/keyword list:
/// missing focus coverage, or <2 relevant keywords, adds an issue.
fn augment_with_focus(output: &AgentOutput, issues: &mut Vec<String>) {
    let lower_draft = output.text_draft.to_lowercase();
    let keywords = output.agent.focus_keywords();
    let hits = keywords.iter().filter(|k| lower_draft.contains(*k)).count();
    if hits < 2 {
        issues.push(format!(
            "missing focus: draft touches only {hits} of the {} {} keywords",
            output.agent,
            keywords.len()
        ));
    }
}

/// confidence_impact = -0.3|high| -0.15|medium| -0.05|low| + 0.05|edits|,
/// clamped to [-0.5, 0.5].
fn calculate_confidence_impact(issues: &[String], edits: &[String]) -> f32 {
    let mut high = 0usize;
    let mut medium = 0usize;
    let mut low = 0usize;
    for issue in issues {
        let lower = issue.to_lowercase();
        if HIGH_SEVERITY.iter().any(|k| lower.contains(k)) {
            high += 1;
        } else if MEDIUM_SEVERITY.iter().any(|k| lower.contains(k)) {
            medium += 1;
        } else if LOW_SEVERITY.iter().any(|k| lower.contains(k)) {
            low += 1;
        }
    }
    let impact = -0.3 * high as f32 - 0.15 * medium as f32 - 0.05 * low as f32 + 0.05 * edits.len() as f32;
    impact.clamp(-0.5, 0.5)
}

/// Rewrite prompt/output: confidence = min(1.0, old + 0.1), iteration + 1.
/// The actual rewritten text is derived deterministically
/// from the suggested edits here; a real deployment would route this through
/// the LLM gateway with `critique.suggested_edits` folded into the prompt.
fn rewrite(output: &AgentOutput, critique: &AgentCritique) -> AgentOutput {
    let mut text_draft = output.text_draft.clone();
    if !critique.suggested_edits.is_empty() {
        text_draft.push_str("\n\nRevision notes addressed: ");
        text_draft.push_str(&critique.suggested_edits.join("; "));
    }
    AgentOutput {
        agent: output.agent,
        text_draft,
        reasoning_trace: output.reasoning_trace.clone(),
        confidence: (output.confidence + 0.1).min(1.0),
        confidence_rationale: format!("{} (rewritten after critique)", output.confidence_rationale),
        citations: output.citations.clone(),
        memory_hits: output.memory_hits.clone(),
        iteration: output.iteration + 1,
        created_at: Utc::now(),
        metadata: output.metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::llm::CompletionResponse;
    use async_trait::async_trait;

    struct JsonGateway(&'static str);

    #[async_trait]
    impl LlmGateway for JsonGateway {
        async fn complete(&self, _r: &CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse { text: self.0.to_string() })
        }
    }

    fn output(agent: AgentType, text: &str) -> AgentOutput {
        AgentOutput {
            agent,
            text_draft: text.to_string(),
            reasoning_trace: vec!["1. step".to_string()],
            confidence: 0.6,
            confidence_rationale: "ok".to_string(),
            citations: vec![],
            memory_hits: vec![],
            iteration: 0,
            created_at: Utc::now(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn passes_when_no_issues() {
        let gateway = JsonGateway(r#"{"pass": true, "issues": [], "suggested_edits": []}"#);
        let manager = CritiqueManager::new();
        let draft = "logical consistency holds; evidence quality is strong; reasoning validity confirmed.";
        let critique = manager.critique(&output(AgentType::Logical, draft), &gateway).await.unwrap();
        assert!(critique.passed);
    }

    #[tokio::test]
    async fn escalates_after_failed_rewrite() {
        let gateway = JsonGateway(r#"{"pass": false, "issues": ["error: wrong conclusion"], "suggested_edits": ["fix conclusion"]}"#);
        let manager = CritiqueManager::new();
        let draft = output(AgentType::Logical, "short");
        let (rewritten, critique) = manager.critique_and_rewrite(draft, &gateway).await.unwrap();
        assert!(critique.escalate);
        assert_eq!(rewritten.iteration, 1);
    }

    #[tokio::test]
    async fn max_allowed_issues_relaxes_pass_criterion() {
        let gateway = JsonGateway(r#"{"pass": false, "issues": ["minor: style"], "suggested_edits": []}"#);
        let manager = CritiqueManager::with_max_allowed_issues(5);
        let draft = "logical consistency and evidence quality and reasoning validity all hold.";
        let critique = manager.critique(&output(AgentType::Logical, draft), &gateway).await.unwrap();
        assert!(critique.passed);
    }

    #[test]
    fn confidence_impact_weighs_severity() {
        let issues = vec!["error: wrong".to_string(), "unclear point".to_string(), "minor nit".to_string()];
        let impact = calculate_confidence_impact(&issues, &[]);
        assert!(impact < 0.0);
        assert!(impact >= -0.5);
    }

    #[tokio::test]
    async fn unstructured_fallback_extracts_issue_sentences() {
        let gateway = JsonGateway("not json. There is a clear problem with the logic here. Everything else is fine.");
        let manager = CritiqueManager::new();
        let critique = manager.critique(&output(AgentType::Logical, "draft"), &gateway).await.unwrap();
        assert!(critique.issues.iter().any(|i| i.to_lowercase().contains("problem")));
    }
}
