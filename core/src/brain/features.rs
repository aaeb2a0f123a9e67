//! Feature Encoders: per-modality feature bundles attached to a [`Percept`].
//! One encoder per modality; multimodal composes the others.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::{Modality, Percept};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextFeatures {
    pub topic_scores: HashMap<String, f32>,
    pub abstractness: f32,
    pub concreteness: f32,
    pub avg_sentence_length: f32,
    pub is_question: bool,
    pub question_word_count: usize,
    pub is_imperative: bool,
    pub sentence_count: usize,
    pub vocabulary_richness: f32,
    pub avg_word_length: f32,
    pub technical_term_count: usize,
    pub politeness_count: usize,
    pub uncertainty_count: usize,
    pub confidence_count: usize,
    pub tone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeFeatures {
    pub language: String,
    pub language_confidence: f32,
    pub total_lines: usize,
    pub non_empty_lines: usize,
    pub comment_lines: usize,
    pub comment_ratio: f32,
    pub avg_indentation: f32,
    pub max_indentation: usize,
    pub control_flow_count: usize,
    pub function_count: usize,
    pub variable_count: usize,
    pub complexity_score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultimodalFeatures {
    pub has_code: bool,
    pub has_text: bool,
    pub is_mixed_content: bool,
    pub content_balance: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub text: Option<TextFeatures>,
    pub code: Option<CodeFeatures>,
    pub multimodal: Option<MultimodalFeatures>,
}

const TOPIC_WORDS: &[(&str, &[&str])] = &[
    ("technology", &["computer", "software", "code", "api", "algorithm", "data"]),
    ("science", &["research", "experiment", "hypothesis", "theory", "physics", "biology"]),
    ("business", &["revenue", "market", "strategy", "customer", "sales", "profit"]),
    ("personal", &["feel", "family", "friend", "myself", "my life", "relationship"]),
    ("creative", &["story", "art", "design", "imagine", "creative", "poem"]),
];

const QUESTION_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "which"];
const POLITE_WORDS: &[&str] = &["please", "thank you", "thanks", "appreciate", "kindly"];
const UNCERTAIN_WORDS: &[&str] = &["maybe", "perhaps", "might", "could", "unclear", "not sure", "possibly"];
const CERTAIN_WORDS: &[&str] = &["definitely", "certainly", "sure", "clearly", "obviously", "confident"];
const ABSTRACT_WORDS: &[&str] = &["concept", "idea", "theory", "principle", "notion", "philosophy"];
const CONCRETE_WORDS: &[&str] = &["table", "chair", "car", "building", "object", "device"];
const IMPERATIVE_STARTERS: &[&str] = &["please", "do", "make", "create", "build", "write", "fix", "implement"];

pub fn encode_text(percept: &Percept) -> TextFeatures {
    let text = &percept.raw_text;
    let lower = text.to_lowercase();

    let mut topic_scores = HashMap::new();
    for (topic, words) in TOPIC_WORDS {
        let hits = words.iter().filter(|w| lower.contains(*w)).count();
        topic_scores.insert(topic.to_string(), (hits as f32 / words.len() as f32).min(1.0));
    }

    let abstractness = ABSTRACT_WORDS.iter().filter(|w| lower.contains(*w)).count() as f32;
    let concreteness = CONCRETE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f32;

    let sentences: Vec<&str> = text
        .split(|c| c == '.' || c == '!' || c == '?')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let avg_sentence_length = if sentences.is_empty() {
        0.0
    } else {
        sentences.iter().map(|s| s.split_whitespace().count()).sum::<usize>() as f32 / sentences.len() as f32
    };

    let question_word_count = QUESTION_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let is_question = text.contains('?') || question_word_count > 0;
    let first_word = lower.split_whitespace().next().unwrap_or("");
    let is_imperative = IMPERATIVE_STARTERS.contains(&first_word);

    let words: Vec<&str> = text.split_whitespace().collect();
    let unique_words: std::collections::HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let vocabulary_richness = if words.is_empty() {
        0.0
    } else {
        unique_words.len() as f32 / words.len() as f32
    };
    let avg_word_length = if words.is_empty() {
        0.0
    } else {
        words.iter().map(|w| w.len()).sum::<usize>() as f32 / words.len() as f32
    };
    let technical_term_count = super::perception::extract_intent_features(text).has_technical_terms as usize;

    let politeness_count = POLITE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let uncertainty_count = UNCERTAIN_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let confidence_count = CERTAIN_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let tone = if confidence_count > uncertainty_count && confidence_count > 0 {
        "positive"
    } else if uncertainty_count > 0 {
        "negative"
    } else {
        "neutral"
    }
    .to_string();

    TextFeatures {
        topic_scores,
        abstractness: abstractness.min(1.0),
        concreteness: concreteness.min(1.0),
        avg_sentence_length,
        is_question,
        question_word_count,
        is_imperative,
        sentence_count: sentences.len(),
        vocabulary_richness,
        avg_word_length,
        technical_term_count,
        politeness_count,
        uncertainty_count,
        confidence_count,
        tone,
    }
}

const LANGUAGE_INDICATORS: &[(&str, &[&str])] = &[
    ("rust", &["fn ", "let mut", "impl ", "::new(", "match "]),
    ("python", &["def ", "import ", "self.", "elif ", "    return"]),
    ("javascript", &["function ", "const ", "=>", "require(", "console.log"]),
    ("go", &["func ", "package ", ":=", "import (", "defer "]),
    ("java", &["public class", "private ", "void ", "System.out", "import java"]),
];

pub fn encode_code(percept: &Percept) -> CodeFeatures {
    let text = &percept.raw_text;
    let lower = text.to_lowercase();

    let mut best_language = "unknown".to_string();
    let mut best_score = 0usize;
    let mut total_hits = 0usize;
    for (lang, indicators) in LANGUAGE_INDICATORS {
        let hits = indicators.iter().filter(|ind| lower.contains(*ind)).count();
        total_hits += hits;
        if hits > best_score {
            best_score = hits;
            best_language = lang.to_string();
        }
    }
    let language_confidence = if total_hits == 0 {
        0.0
    } else {
        best_score as f32 / total_hits as f32
    };

    let lines: Vec<&str> = text.lines().collect();
    let total_lines = lines.len();
    let non_empty: Vec<&&str> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
    let non_empty_lines = non_empty.len();
    let comment_lines = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("//") || t.starts_with('#') || t.starts_with("/*") || t.starts_with('*')
        })
        .count();
    let comment_ratio = if non_empty_lines == 0 {
        0.0
    } else {
        comment_lines as f32 / non_empty_lines as f32
    };

    let indentations: Vec<usize> = non_empty
        .iter()
        .map(|l| l.chars().take_while(|c| *c == ' ' || *c == '\t').count())
        .collect();
    let avg_indentation = if indentations.is_empty() {
        0.0
    } else {
        indentations.iter().sum::<usize>() as f32 / indentations.len() as f32
    };
    let max_indentation = indentations.iter().copied().max().unwrap_or(0);

    let control_flow_count = ["if ", "for ", "while ", "match ", "switch ", "else"]
        .iter()
        .map(|kw| lower.matches(kw).count())
        .sum();
    let function_count = ["fn ", "def ", "function ", "func "]
        .iter()
        .map(|kw| lower.matches(kw).count())
        .sum();
    let variable_count = ["let ", "var ", "const "].iter().map(|kw| lower.matches(kw).count()).sum();

    let complexity_score = ((control_flow_count as f32 * 0.1)
        + (function_count as f32 * 0.05)
        + (max_indentation as f32 / 20.0))
        .min(1.0);

    CodeFeatures {
        language: best_language,
        language_confidence,
        total_lines,
        non_empty_lines,
        comment_lines,
        comment_ratio,
        avg_indentation,
        max_indentation,
        control_flow_count,
        function_count,
        variable_count,
        complexity_score,
    }
}

pub fn encode_multimodal(percept: &Percept, text: &Option<TextFeatures>, code: &Option<CodeFeatures>) -> MultimodalFeatures {
    let has_code = code.is_some();
    let has_text = text.is_some();
    let is_mixed_content = has_code && has_text;
    let content_balance = if !is_mixed_content {
        if has_code { 1.0 } else { 0.0 }
    } else {
        let code_lines = code.as_ref().map(|c| c.non_empty_lines).unwrap_or(0) as f32;
        let text_sentences = text.as_ref().map(|t| t.sentence_count).unwrap_or(0) as f32;
        let total = code_lines + text_sentences;
        if total == 0.0 { 0.5 } else { code_lines / total }
    };
    let _ = percept;
    MultimodalFeatures { has_code, has_text, is_mixed_content, content_balance }
}

/// Dispatch across modalities, composing the multimodal cross-section when
/// `percept.modality` is [`Modality::Multimodal`].
pub fn encode(percept: &Percept) -> FeatureBundle {
    match percept.modality {
        Modality::Code => FeatureBundle { code: Some(encode_code(percept)), ..Default::default() },
        Modality::Multimodal => {
            let text = Some(encode_text(percept));
            let code = Some(encode_code(percept));
            let multimodal = Some(encode_multimodal(percept, &text, &code));
            FeatureBundle { text, code, multimodal }
        }
        _ => FeatureBundle { text: Some(encode_text(percept)), ..Default::default() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn percept(text: &str, modality: Modality) -> Percept {
        Percept {
            modality,
            embedding: vec![0.0; 8],
            tokens: text.split_whitespace().map(str::to_string).collect(),
            raw_text: text.to_string(),
            session_id: String::new(),
            user_id: String::new(),
            privacy_flags: Map::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn text_encoder_detects_question() {
        let p = percept("What is the best approach here?", Modality::Text);
        let features = encode_text(&p);
        assert!(features.is_question);
    }

    #[test]
    fn code_encoder_detects_rust() {
        let p = percept("fn main() {\n    let mut x = 1;\n    if x > 0 { println!(\"{}\", x); }\n}", Modality::Code);
        let features = encode_code(&p);
        assert_eq!(features.language, "rust");
        assert!(features.function_count >= 1);
    }

    #[test]
    fn multimodal_balances_content() {
        let p = percept("fn f() {} some prose.", Modality::Multimodal);
        let bundle = encode(&p);
        assert!(bundle.multimodal.unwrap().is_mixed_content);
    }
}
