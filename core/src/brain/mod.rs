//! Cognitive orchestration engine: perception -> parallel local reasoning ->
//! self-critique -> coherence -> gating -> broadcast -> working memory ->
//! synthesis, with neuromodulator feedback driving thresholds throughout.

pub mod classifier;
pub mod coherence;
pub mod context;
pub mod critique;
pub mod embedder;
pub mod error;
pub mod features;
pub mod gating;
pub mod llm;
pub mod memory;
pub mod neuromodulation;
pub mod orchestrator;
pub mod perception;
pub mod reasoners;
pub mod types;
pub mod workspace;

pub use error::{CoreError, Result};
