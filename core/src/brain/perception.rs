//! Perception Adapter: modality detection, tokenization,
//! embedding, and intent feature extraction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use super::embedder::Embedder;
use super::error::Result;
use super::types::{IntentFeatures, Modality, Percept, SentimentIndicators};

const CODE_KEYWORDS: &[&str] = &["fn ", "function ", "def ", "class ", "impl ", "```", "#include", "import "];
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".bmp"];
const IMAGE_MARKERS: &[&str] = &["<img", "![image]"];
const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".flac", ".m4a"];
const AUDIO_KEYWORDS: &[&str] = &["audio clip", "recording", "voice memo"];

#[derive(Debug, Clone, Default)]
pub struct PerceptionMetadata {
    pub session_id: String,
    pub user_id: String,
    pub privacy_flags: HashMap<String, bool>,
}

pub struct PerceptionAdapter {
    embedder: Arc<dyn Embedder>,
}

impl PerceptionAdapter {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        PerceptionAdapter { embedder }
    }

    /// process(raw_input, metadata) -> Percept
    pub async fn process(&self, raw_input: &str, metadata: PerceptionMetadata) -> Result<Percept> {
        let modality = detect_modality(raw_input);
        let tokens = tokenize(raw_input, modality);
        let embedding = self.embedder.embed(raw_input).await?;
        Ok(Percept {
            modality,
            embedding,
            tokens,
            raw_text: raw_input.to_string(),
            session_id: metadata.session_id,
            user_id: metadata.user_id,
            privacy_flags: metadata.privacy_flags,
            created_at: Utc::now(),
        })
    }

    /// extract_intent_features: derived from the raw text independent of modality.
    pub fn extract_intent_features(&self, text: &str) -> IntentFeatures {
        extract_intent_features(text)
    }
}

/// Modality priority: code > image > audio > text.
fn detect_modality(text: &str) -> Modality {
    let lower = text.to_lowercase();
    if CODE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Modality::Code;
    }
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext)) || IMAGE_MARKERS.iter().any(|m| lower.contains(m)) {
        return Modality::Image;
    }
    if AUDIO_EXTENSIONS.iter().any(|ext| lower.contains(ext)) || AUDIO_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Modality::Audio;
    }
    Modality::Text
}

fn tokenize(text: &str, modality: Modality) -> Vec<String> {
    match modality {
        Modality::Code => tokenize_code(text),
        _ => tokenize_words(text),
    }
}

/// Word+punctuation split for prose.
fn tokenize_words(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.push(ch);
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if !ch.is_whitespace() {
                tokens.push(ch.to_string());
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Language-aware split for code: preserves common operator clusters as
/// single tokens, without assuming any external tooling.
fn tokenize_code(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch.is_alphanumeric() || ch == '_' {
            current.push(ch);
            i += 1;
            continue;
        }
        if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if ch.is_whitespace() {
            i += 1;
            continue;
        }
        // Group common two-char operators.
        if i + 1 < chars.len() {
            let pair: String = [ch, chars[i + 1]].iter().collect();
            if ["::", "->", "=>", "==", "!=", "<=", ">=", "&&", "||"].contains(&pair.as_str()) {
                tokens.push(pair);
                i += 2;
                continue;
            }
        }
        tokens.push(ch.to_string());
        i += 1;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

const POSITIVE_WORDS: &[&str] = &["good", "great", "excellent", "happy", "love", "awesome", "thanks"];
const NEGATIVE_WORDS: &[&str] = &["bad", "terrible", "hate", "angry", "sad", "awful", "problem"];
const URGENT_WORDS: &[&str] = &["urgent", "asap", "immediately", "now", "emergency", "critical"];
const TECHNICAL_WORDS: &[&str] = &[
    "api", "function", "algorithm", "database", "server", "protocol", "compile", "runtime", "framework",
];
const IMPERATIVE_STARTERS: &[&str] = &[
    "please", "do", "make", "create", "build", "write", "fix", "implement", "generate", "add", "remove", "update",
];

pub fn extract_intent_features(text: &str) -> IntentFeatures {
    let lower = text.to_lowercase();
    let tokens = tokenize_words(text);
    let has_question = text.contains('?');
    let first_word = lower.split_whitespace().next().unwrap_or("");
    let has_imperative = IMPERATIVE_STARTERS.contains(&first_word);
    let has_technical_terms = TECHNICAL_WORDS.iter().any(|w| lower.contains(w));

    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let urgent = URGENT_WORDS.iter().filter(|w| lower.contains(*w)).count();

    let sentences: Vec<&str> = text
        .split(|c| c == '.' || c == '!' || c == '?')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let avg_sentence_length = if sentences.is_empty() {
        0.0
    } else {
        sentences
            .iter()
            .map(|s| s.split_whitespace().count())
            .sum::<usize>() as f32
            / sentences.len() as f32
    };
    let complex_words = tokens.iter().filter(|t| t.len() > 7).count();
    let complex_word_ratio = if tokens.is_empty() {
        0.0
    } else {
        complex_words as f32 / tokens.len() as f32
    };
    let complexity_score = (avg_sentence_length / 20.0 + complex_word_ratio).min(1.0);

    IntentFeatures {
        length: text.len(),
        token_count: tokens.len(),
        has_question,
        has_imperative,
        has_technical_terms,
        sentiment_indicators: SentimentIndicators { positive, negative, urgent },
        complexity_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::embedder::HashEmbedder;

    #[tokio::test]
    async fn detects_code_over_text() {
        let adapter = PerceptionAdapter::new(Arc::new(HashEmbedder::new()));
        let percept = adapter
            .process("```fn main() {}```", PerceptionMetadata::default())
            .await
            .unwrap();
        assert_eq!(percept.modality, Modality::Code);
    }

    #[tokio::test]
    async fn detects_image_over_text() {
        let adapter = PerceptionAdapter::new(Arc::new(HashEmbedder::new()));
        let percept = adapter
            .process("see attached photo.png", PerceptionMetadata::default())
            .await
            .unwrap();
        assert_eq!(percept.modality, Modality::Image);
    }

    #[test]
    fn intent_features_detect_question_and_urgency() {
        let features = extract_intent_features("Can you fix this urgent bug immediately?");
        assert!(features.has_question);
        assert!(features.sentiment_indicators.urgent >= 1);
    }

    #[test]
    fn complexity_score_is_capped_at_one() {
        let long_text = "supercalifragilisticexpialidocious ".repeat(50);
        let features = extract_intent_features(&long_text);
        assert!(features.complexity_score <= 1.0);
    }
}
