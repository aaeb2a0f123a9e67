//! Neuromodulation Controller: three global scalars (attention, exploration,
//! reward) that bias thresholds and reasoner sampling, updated by five
//! feedback handlers and decaying toward their targets over time.
//!
//! Grounded on `ra9/core/neuromodulation_controller.py` for the feedback
//! deltas, decay formula, and `modulate_agent_behavior`/
//! `modulate_gating_threshold` outputs; the lock model uses
//! `parking_lot::Mutex`, with lock contention kept
//! to the width of a single field update.

use chrono::Utc;
use parking_lot::Mutex;

use super::types::{AgentType, NeuromodulatorState};

const ATTENTION_RANGE: (f32, f32) = (0.1, 2.0);
const EXPLORE_RANGE: (f32, f32) = (0.0, 1.0);
const REWARD_RANGE: (f32, f32) = (-1.0, 1.0);
const ATTENTION_TARGET: f32 = 1.0;
const EXPLORE_TARGET: f32 = 0.2;
const REWARD_TARGET: f32 = 0.0;

/// Modulated parameters handed to a [`super::reasoners::LocalReasoner`].
#[derive(Debug, Clone, Copy)]
pub struct AgentModulation {
    pub confidence: f32,
    pub temperature: f32,
    pub learning_rate: f32,
    pub attention_factor: f32,
    pub explore_factor: f32,
    pub reward_factor: f32,
    // Agent-specific fields; only the ones matching `agent_type` are meaningful.
    pub creativity_boost: f32,
    pub novelty_threshold: f32,
    pub precision_boost: f32,
    pub confidence_threshold: f32,
    pub empathy_boost: f32,
    pub sensitivity: f32,
    pub planning_horizon: f32,
    pub risk_tolerance: f32,
    pub verification_strictness: f32,
    pub evidence_threshold: f32,
}

struct Inner {
    state: NeuromodulatorState,
    decay_rate: f32,
    callbacks: Vec<Box<dyn Fn(&NeuromodulatorState) + Send + Sync>>,
}

/// Process-wide owner of the three scalars; readers receive a decayed
/// snapshot so callers never observe a stale value.
pub struct NeuromodulationController {
    inner: Mutex<Inner>,
}

impl NeuromodulationController {
    pub fn new() -> Self {
        NeuromodulationController {
            inner: Mutex::new(Inner { state: NeuromodulatorState::default(), decay_rate: 0.05, callbacks: Vec::new() }),
        }
    }

    pub fn subscribe(&self, callback: Box<dyn Fn(&NeuromodulatorState) + Send + Sync>) {
        self.inner.lock().callbacks.push(callback);
    }

    /// Lazily decays the state toward its targets, then returns a decayed
    /// snapshot (state mutates only via the controller; readers never see
    /// a stale value).
    pub fn get_state(&self) -> NeuromodulatorState {
        let mut inner = self.inner.lock();
        Self::apply_decay(&mut inner);
        inner.state
    }

    fn apply_decay(inner: &mut Inner) {
        let now = Utc::now();
        let elapsed_hours = (now - inner.state.updated_at).num_seconds() as f32 / 3600.0;
        if elapsed_hours <= 0.0 {
            return;
        }
        let decay_amount = inner.decay_rate * elapsed_hours;
        inner.state.attention_gain = decay_toward(inner.state.attention_gain, ATTENTION_TARGET, decay_amount);
        inner.state.explore_noise = decay_toward(inner.state.explore_noise, EXPLORE_TARGET, decay_amount);
        inner.state.reward_signal = decay_toward(inner.state.reward_signal, REWARD_TARGET, decay_amount);
        inner.state.updated_at = now;
    }

    fn update(&self, attention_delta: f32, explore_delta: f32, reward_delta: f32) {
        let mut inner = self.inner.lock();
        Self::apply_decay(&mut inner);
        inner.state.attention_gain = (inner.state.attention_gain + attention_delta).clamp(ATTENTION_RANGE.0, ATTENTION_RANGE.1);
        inner.state.explore_noise = (inner.state.explore_noise + explore_delta).clamp(EXPLORE_RANGE.0, EXPLORE_RANGE.1);
        inner.state.reward_signal = (inner.state.reward_signal + reward_delta).clamp(REWARD_RANGE.0, REWARD_RANGE.1);
        inner.state.updated_at = Utc::now();
        let snapshot = inner.state;
        for cb in &inner.callbacks {
            // Isolate callback panics so one bad subscriber can't poison an update.
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&snapshot)));
        }
    }

    /// success(v): reward += 0.1v; attention += 0.05v.
    pub fn success(&self, v: f32) {
        self.update(0.05 * v, 0.0, 0.1 * v);
    }

    /// failure(v): reward -= 0.1v; explore += 0.1v.
    pub fn failure(&self, v: f32) {
        self.update(0.0, 0.1 * v, -0.1 * v);
    }

    /// uncertainty(v): explore += 0.15v; attention += 0.1v.
    pub fn uncertainty(&self, v: f32) {
        self.update(0.1 * v, 0.15 * v, 0.0);
    }

    /// novelty(v): explore += 0.2v; reward += 0.05v.
    pub fn novelty(&self, v: f32) {
        self.update(0.0, 0.2 * v, 0.05 * v);
    }

    /// user_engagement(v): reward += 0.08v; attention += 0.06v.
    pub fn user_engagement(&self, v: f32) {
        self.update(0.06 * v, 0.0, 0.08 * v);
    }

    /// Derives per-agent-type sampling parameters from the current scalars.
    pub fn modulate_agent_behavior(&self, agent: AgentType, base_conf: f32, base_temp: f32) -> AgentModulation {
        let state = self.get_state();
        let attention_factor = state.attention_gain;
        let confidence = (base_conf * attention_factor).min(1.0);
        let temperature = (base_temp / state.attention_gain.max(0.1)).min(2.0);
        let learning_rate = 0.01 * (1.0 + 0.5 * state.reward_signal);
        let explore_factor = 1.0 + state.explore_noise;
        let reward_factor = 1.0 + 0.5 * state.reward_signal;

        let mut modulation = AgentModulation {
            confidence,
            temperature,
            learning_rate,
            attention_factor,
            explore_factor,
            reward_factor,
            creativity_boost: 0.0,
            novelty_threshold: 0.0,
            precision_boost: 0.0,
            confidence_threshold: 0.0,
            empathy_boost: 0.0,
            sensitivity: 0.0,
            planning_horizon: 0.0,
            risk_tolerance: 0.0,
            verification_strictness: 0.0,
            evidence_threshold: 0.0,
        };

        match agent {
            AgentType::Creative => {
                modulation.creativity_boost = explore_factor;
                modulation.novelty_threshold = (0.5 - 0.2 * state.explore_noise).max(0.0);
            }
            AgentType::Logical => {
                modulation.precision_boost = attention_factor;
                modulation.confidence_threshold = (0.3 * attention_factor).min(1.0);
            }
            AgentType::Emotional => {
                modulation.empathy_boost = 1.0 + 0.2 * state.reward_signal;
                modulation.sensitivity = explore_factor;
            }
            AgentType::Strategic => {
                modulation.planning_horizon = 1.0 + state.attention_gain;
                modulation.risk_tolerance = state.explore_noise;
            }
            AgentType::Verifier => {
                modulation.verification_strictness = attention_factor;
                modulation.evidence_threshold = (0.5 * attention_factor).min(1.0);
            }
            AgentType::Arbiter => {}
        }

        modulation
    }

    /// Adjusts a base gating threshold by attention gain and reward signal.
    pub fn modulate_gating_threshold(&self, base: f32) -> f32 {
        let state = self.get_state();
        let adjusted = base * (1.0 + 0.3 * (state.attention_gain - 1.0)) * (1.0 - 0.2 * state.reward_signal);
        adjusted.clamp(0.1, 0.9)
    }
}

impl Default for NeuromodulationController {
    fn default() -> Self {
        Self::new()
    }
}

fn decay_toward(value: f32, target: f32, amount: f32) -> f32 {
    if value > target {
        (value - amount).max(target)
    } else if value < target {
        (value + amount).min(target)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_matches_targets() {
        let controller = NeuromodulationController::new();
        let state = controller.get_state();
        assert_eq!(state.attention_gain, 1.0);
        assert_eq!(state.explore_noise, 0.2);
        assert_eq!(state.reward_signal, 0.0);
    }

    #[test]
    fn success_increases_reward_and_attention() {
        let controller = NeuromodulationController::new();
        controller.success(1.0);
        let state = controller.get_state();
        assert!(state.reward_signal > 0.0);
        assert!(state.attention_gain > 1.0);
    }

    #[test]
    fn state_always_within_clamps() {
        let controller = NeuromodulationController::new();
        for _ in 0..100 {
            controller.novelty(1.0);
            controller.failure(1.0);
        }
        let state = controller.get_state();
        assert!((0.1..=2.0).contains(&state.attention_gain));
        assert!((0.0..=1.0).contains(&state.explore_noise));
        assert!((-1.0..=1.0).contains(&state.reward_signal));
    }

    #[test]
    fn gating_threshold_stays_within_bounds() {
        let controller = NeuromodulationController::new();
        controller.success(1.0);
        let threshold = controller.modulate_gating_threshold(0.3);
        assert!((0.1..=0.9).contains(&threshold));
    }

    #[test]
    fn creative_agent_gets_specialized_fields() {
        let controller = NeuromodulationController::new();
        let modulation = controller.modulate_agent_behavior(AgentType::Creative, 0.5, 0.7);
        assert!(modulation.creativity_boost > 0.0);
    }
}
