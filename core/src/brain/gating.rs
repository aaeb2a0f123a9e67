//! Gating Engine: quality gate + confidence/resource/speculative policy
//! gate, a resource tracker with exponential restoration, and an
//! observability quarantine.
//!
//! Grounded on `ra9/core/gating_manager.py`'s `DeterministicGatingPolicy` /
//! `AdaptiveGatingPolicy` / `GateEngine` / `ResourceTracker` split, carried
//! here as an explicit `AdaptivePolicy` wrapper.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::types::{AgentType, BroadcastItem, NeuromodulatorState};

pub const DEFAULT_MIN_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_MAX_SPECULATIVE_RATIO: f32 = 0.5;
pub const DEFAULT_PRIORITY_BOOST_FACTOR: f32 = 1.2;

#[derive(Debug, Clone)]
pub struct GatingContext {
    pub neuromodulator_state: NeuromodulatorState,
    pub query_intent: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GatingDecision {
    pub should_gate: bool,
    pub adjusted_confidence: f32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GatingPolicyConfig {
    pub min_confidence_threshold: f32,
    pub max_speculative_ratio: f32,
    pub priority_boost_factor: f32,
}

impl Default for GatingPolicyConfig {
    fn default() -> Self {
        GatingPolicyConfig {
            min_confidence_threshold: DEFAULT_MIN_CONFIDENCE_THRESHOLD,
            max_speculative_ratio: DEFAULT_MAX_SPECULATIVE_RATIO,
            priority_boost_factor: DEFAULT_PRIORITY_BOOST_FACTOR,
        }
    }
}

/// Hard gate, evaluated first: admit only if
/// `metadata.agent_critique.passed == true` OR `metadata.verifier.passed == true`.
pub fn quality_gate_passes(item: &BroadcastItem) -> bool {
    let critique_passed = item
        .metadata
        .get("agent_critique")
        .and_then(|v| v.get("passed"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let verifier_passed = item
        .metadata
        .get("verifier")
        .and_then(|v| v.get("passed"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    critique_passed || verifier_passed
}

/// Confidence/policy gate, run after the quality gate.
pub fn evaluate_policy(
    item: &BroadcastItem,
    resource_budget: f32,
    speculative_ratio: f32,
    context: &GatingContext,
    config: &GatingPolicyConfig,
) -> GatingDecision {
    let state = &context.neuromodulator_state;
    let attention_factor = 1.0 + 0.3 * (state.attention_gain - 1.0);
    let mut adjusted = item.confidence * attention_factor;

    let explore_relevant = item.contributors.iter().any(|a| matches!(a, AgentType::Creative | AgentType::Strategic));
    if explore_relevant {
        adjusted *= 1.0 + state.explore_noise;
    }
    if state.reward_signal > 0.0 {
        adjusted *= 1.0 + 0.1 * state.reward_signal;
    }

    if adjusted < config.min_confidence_threshold {
        return GatingDecision {
            should_gate: false,
            adjusted_confidence: adjusted,
            reason: format!("Below confidence threshold ({adjusted:.2} < {})", config.min_confidence_threshold),
        };
    }
    if item.speculative && speculative_ratio >= config.max_speculative_ratio {
        return GatingDecision {
            should_gate: false,
            adjusted_confidence: adjusted,
            reason: format!("Speculative ratio limit exceeded ({speculative_ratio:.2} >= {})", config.max_speculative_ratio),
        };
    }
    if resource_budget < 0.1 && adjusted < 0.7 {
        return GatingDecision {
            should_gate: false,
            adjusted_confidence: adjusted,
            reason: "Low resource budget, only high-confidence items allowed".to_string(),
        };
    }

    let boost = priority_boost(&item.contributors, &context.query_intent, config.priority_boost_factor);
    let final_confidence = (adjusted * boost).min(1.0);
    let should_gate = final_confidence >= config.min_confidence_threshold;

    GatingDecision {
        should_gate,
        adjusted_confidence: final_confidence,
        reason: format!("confidence={final_confidence:.2} speculative={} boost={boost:.2}", item.speculative),
    }
}

/// Intent-based priority boost: logical<->logical, creative<->creative,
/// verifier<->factual, emotional<->personal.
fn priority_boost(contributors: &[AgentType], query_intent: &[String], factor: f32) -> f32 {
    let mut boost = 1.0;
    let matches = |agent: AgentType, label: &str| contributors.contains(&agent) && query_intent.iter().any(|i| i == label);
    if matches(AgentType::Logical, "logical") {
        boost *= factor;
    }
    if matches(AgentType::Creative, "creative") {
        boost *= factor;
    }
    if matches(AgentType::Verifier, "factual") {
        boost *= factor;
    }
    if matches(AgentType::Emotional, "personal") {
        boost *= factor;
    }
    boost
}

/// Adaptive re-scaling based on a rolling success_rate, plus a
/// `min_confidence_threshold` drift clamped to [0.1, 0.9].
pub struct AdaptivePolicy {
    inner: Mutex<AdaptiveInner>,
}

struct AdaptiveInner {
    history: VecDeque<(Instant, bool)>,
    min_confidence_threshold: f32,
}

impl AdaptivePolicy {
    pub fn new(base_threshold: f32) -> Self {
        AdaptivePolicy { inner: Mutex::new(AdaptiveInner { history: VecDeque::new(), min_confidence_threshold: base_threshold }) }
    }

    pub fn record_feedback(&self, success: bool) {
        let mut inner = self.inner.lock();
        inner.history.push_back((Instant::now(), success));
        self.prune(&mut inner);
        self.update_threshold(&mut inner);
    }

    fn prune(&self, inner: &mut AdaptiveInner) {
        let cutoff = Instant::now() - Duration::from_secs(86_400);
        while matches!(inner.history.front(), Some((t, _)) if *t < cutoff) {
            inner.history.pop_front();
        }
    }

    fn success_rate(&self, inner: &AdaptiveInner) -> f32 {
        let cutoff = Instant::now() - Duration::from_secs(3600);
        let recent: Vec<bool> = inner.history.iter().filter(|(t, _)| *t >= cutoff).map(|(_, s)| *s).collect();
        if recent.is_empty() {
            return 0.5;
        }
        recent.iter().filter(|s| **s).count() as f32 / recent.len() as f32
    }

    fn update_threshold(&self, inner: &mut AdaptiveInner) {
        let rate = self.success_rate(inner);
        if rate > 0.8 {
            inner.min_confidence_threshold *= 0.99;
        } else if rate < 0.5 {
            inner.min_confidence_threshold *= 1.01;
        }
        inner.min_confidence_threshold = inner.min_confidence_threshold.clamp(0.1, 0.9);
    }

    pub fn min_confidence_threshold(&self) -> f32 {
        self.inner.lock().min_confidence_threshold
    }

    /// Applies the 0.95 / 1.05 adjustment to an already-computed confidence.
    pub fn rescale(&self, adjusted_conf: f32) -> f32 {
        let inner = self.inner.lock();
        let rate = self.success_rate(&inner);
        if rate > 0.8 {
            adjusted_conf * 0.95
        } else if rate < 0.5 {
            adjusted_conf * 1.05
        } else {
            adjusted_conf
        }
    }
}

/// Estimates cost and restores budget exponentially toward `max_budget`
/// over time, so the gate can deny low-confidence items when resources
/// run low without ever going negative.
pub struct ResourceTracker {
    max_budget: f32,
    current: Mutex<f32>,
    decay_rate: f32,
    last_update: Mutex<Instant>,
}

impl ResourceTracker {
    pub fn new(max_budget: f32, decay_rate: f32) -> Self {
        ResourceTracker {
            max_budget,
            current: Mutex::new(max_budget),
            decay_rate,
            last_update: Mutex::new(Instant::now()),
        }
    }

    pub fn remaining(&self) -> f32 {
        self.restore();
        *self.current.lock()
    }

    fn restore(&self) {
        let mut last = self.last_update.lock();
        let elapsed_minutes = last.elapsed().as_secs_f32() / 60.0;
        if elapsed_minutes <= 0.0 {
            return;
        }
        let mut current = self.current.lock();
        let deficit = self.max_budget - *current;
        let restored = deficit * (1.0 - (-self.decay_rate * elapsed_minutes).exp());
        *current = (*current + restored).min(self.max_budget);
        *last = Instant::now();
    }

    pub fn consume(&self, item: &BroadcastItem) {
        self.restore();
        let cost = estimate_broadcast_cost(item);
        let mut current = self.current.lock();
        *current = (*current - cost).max(0.0);
    }
}

fn estimate_broadcast_cost(item: &BroadcastItem) -> f32 {
    let base = 1.0;
    let length_factor = (item.text.len() as f32 / 1000.0).min(1.0);
    base + (1.0 - item.confidence) + length_factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn item(confidence: f32, speculative: bool, passed: bool, contributors: Vec<AgentType>) -> BroadcastItem {
        let mut metadata = HashMap::new();
        metadata.insert("agent_critique".to_string(), serde_json::json!({"passed": passed}));
        BroadcastItem {
            id: "1".to_string(),
            text: "some text".to_string(),
            contributors,
            confidence,
            speculative,
            iteration: 0,
            created_at: Utc::now(),
            metadata,
        }
    }

    #[test]
    fn quality_gate_blocks_unpassed_items() {
        let candidate = item(0.9, false, false, vec![AgentType::Logical]);
        assert!(!quality_gate_passes(&candidate));
    }

    #[test]
    fn quality_gate_admits_critique_pass() {
        let candidate = item(0.9, false, true, vec![AgentType::Logical]);
        assert!(quality_gate_passes(&candidate));
    }

    #[test]
    fn identical_candidates_yield_identical_decisions() {
        let candidate = item(0.6, false, true, vec![AgentType::Logical]);
        let ctx = GatingContext { neuromodulator_state: NeuromodulatorState::default(), query_intent: vec!["logical".to_string()] };
        let config = GatingPolicyConfig::default();
        let a = evaluate_policy(&candidate, 1.0, 0.0, &ctx, &config);
        let b = evaluate_policy(&candidate, 1.0, 0.0, &ctx, &config);
        assert_eq!(a.should_gate, b.should_gate);
        assert!((a.adjusted_confidence - b.adjusted_confidence).abs() < 1e-6);
    }

    #[test]
    fn speculative_items_rejected_over_ratio() {
        let candidate = item(0.55, true, true, vec![AgentType::Creative]);
        let ctx = GatingContext { neuromodulator_state: NeuromodulatorState::default(), query_intent: vec![] };
        let config = GatingPolicyConfig::default();
        let decision = evaluate_policy(&candidate, 1.0, 0.9, &ctx, &config);
        assert!(!decision.should_gate);
    }

    #[test]
    fn monotonic_gating_threshold_within_clamp() {
        let mut state = NeuromodulatorState::default();
        state.attention_gain = 1.5;
        let base = 0.3;
        let factor = (1.0 + 0.3 * (state.attention_gain - 1.0)) * (1.0 - 0.2 * state.reward_signal);
        assert!(factor * base <= 0.9);
    }

    #[test]
    fn resource_tracker_never_goes_negative() {
        let tracker = ResourceTracker::new(1.0, 0.1);
        for _ in 0..10 {
            tracker.consume(&item(0.1, false, true, vec![AgentType::Logical]));
        }
        assert!(tracker.remaining() >= 0.0);
    }

    #[test]
    fn adaptive_threshold_stays_clamped() {
        let policy = AdaptivePolicy::new(0.3);
        for _ in 0..50 {
            policy.record_feedback(false);
        }
        assert!((0.1..=0.9).contains(&policy.min_confidence_threshold()));
    }
}
