//! `mylm-core`: the cognitive orchestration engine.
//!
//! The crate's only member is [`brain`]: perception -> parallel local
//! reasoning -> self-critique -> coherence -> gating -> broadcast ->
//! working memory -> synthesis, with neuromodulator feedback driving
//! thresholds throughout.

#![deny(unsafe_code)]

pub mod brain;

pub use brain::error::{CoreError, Result};
