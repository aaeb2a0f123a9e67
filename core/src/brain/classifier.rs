//! Query Classifier: assigns primary intent/type, secondary labels with
//! confidences, and reasoning depth via a strict-JSON LLM prompt.
//!
//! Grounded on `ra9/council/query_analyzer.py` and `ra9/core/schemas.py`'s
//! `StructuredQuery` for the JSON contract, with parse-failure/LLM-error
//! fallbacks (`ClassificationError`) so the pipeline always gets a usable
//! result.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use super::llm::{complete_with_retry, CompletionRequest, LlmGateway, RetryPolicy};
use super::types::{ReasoningDepth, StructuredQuery};

const QUERY_TYPES: &[&str] = &["logical", "emotional", "strategic", "creative", "factual", "reflective"];

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    label_confidences: HashMap<String, f32>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning_depth: Option<String>,
}

pub struct QueryClassifier<'a> {
    gateway: &'a dyn LlmGateway,
}

impl<'a> QueryClassifier<'a> {
    pub fn new(gateway: &'a dyn LlmGateway) -> Self {
        QueryClassifier { gateway }
    }

    /// classify(text, memory_context, user_id) -> StructuredQuery
    pub async fn classify(&self, text: &str, memory_context: &str, user_id: Option<&str>) -> StructuredQuery {
        let prompt = build_prompt(text, memory_context, user_id);
        let request = CompletionRequest { prompt, temperature: 0.2, max_tokens: 512 };

        let response = match complete_with_retry(self.gateway, &request, RetryPolicy::default()).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "classifier llm call failed");
                return error_query(text);
            }
        };

        match parse_classification(&response.text) {
            Some(raw) => {
                let query_type = raw
                    .query_type
                    .filter(|t| QUERY_TYPES.contains(&t.as_str()))
                    .unwrap_or_else(|| "logical".to_string());
                let labels: Vec<String> = raw.labels.into_iter().filter(|l| QUERY_TYPES.contains(&l.as_str())).collect();
                let reasoning_depth = match raw.reasoning_depth.as_deref() {
                    Some("shallow") => ReasoningDepth::Shallow,
                    Some("deep") => ReasoningDepth::Deep,
                    _ => ReasoningDepth::Auto,
                };
                StructuredQuery {
                    intent: raw.intent,
                    query_type,
                    content: text.to_string(),
                    metadata: HashMap::new(),
                    confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                    labels,
                    label_confidences: raw.label_confidences,
                    reasoning_depth,
                }
            }
            None => {
                let mut metadata = HashMap::new();
                metadata.insert("raw_response".to_string(), serde_json::Value::String(response.text.clone()));
                StructuredQuery {
                    intent: "parse_error".to_string(),
                    query_type: "logical".to_string(),
                    content: text.to_string(),
                    metadata,
                    confidence: 0.0,
                    labels: Vec::new(),
                    label_confidences: HashMap::new(),
                    reasoning_depth: ReasoningDepth::Auto,
                }
            }
        }
    }
}

fn build_prompt(text: &str, memory_context: &str, user_id: Option<&str>) -> String {
    format!(
        "You are a query classifier. Respond with STRICT JSON only, matching this schema:\n\
         {{\"intent\": string, \"query_type\": one of {:?}, \"labels\": [string], \
         \"label_confidences\": {{label: number 0-1}}, \"confidence\": number 0-1, \
         \"reasoning_depth\": one of [\"shallow\",\"deep\",\"auto\"]}}\n\n\
         User: {}\n\
         Context: {}\n\
         Query: {}",
        QUERY_TYPES,
        user_id.unwrap_or("anonymous"),
        memory_context,
        text
    )
}

fn parse_classification(text: &str) -> Option<RawClassification> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn error_query(text: &str) -> StructuredQuery {
    StructuredQuery {
        intent: "error".to_string(),
        query_type: "logical".to_string(),
        content: text.to_string(),
        metadata: HashMap::new(),
        confidence: 0.0,
        labels: Vec::new(),
        label_confidences: HashMap::new(),
        reasoning_depth: ReasoningDepth::Auto,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::error::{CoreError, LlmErrorKind};
    use crate::brain::llm::CompletionResponse;
    use async_trait::async_trait;

    struct JsonGateway(&'static str);

    #[async_trait]
    impl LlmGateway for JsonGateway {
        async fn complete(&self, _req: &CompletionRequest) -> super::super::error::Result<CompletionResponse> {
            Ok(CompletionResponse { text: self.0.to_string() })
        }
    }

    struct FailingGateway;

    #[async_trait]
    impl LlmGateway for FailingGateway {
        async fn complete(&self, _req: &CompletionRequest) -> super::super::error::Result<CompletionResponse> {
            Err(CoreError::llm(LlmErrorKind::Validation, "boom"))
        }
    }

    #[tokio::test]
    async fn parses_well_formed_json() {
        let gateway = JsonGateway(
            r#"{"intent": "plan_launch", "query_type": "strategic", "labels": ["strategic", "logical"], "label_confidences": {"strategic": 0.9}, "confidence": 0.8, "reasoning_depth": "deep"}"#,
        );
        let classifier = QueryClassifier::new(&gateway);
        let result = classifier.classify("plan a launch", "", None).await;
        assert_eq!(result.query_type, "strategic");
        assert_eq!(result.reasoning_depth, ReasoningDepth::Deep);
        assert!(result.labels.contains(&"logical".to_string()));
    }

    #[tokio::test]
    async fn falls_back_on_parse_failure() {
        let gateway = JsonGateway("not json at all");
        let classifier = QueryClassifier::new(&gateway);
        let result = classifier.classify("hello", "", None).await;
        assert_eq!(result.intent, "parse_error");
        assert_eq!(result.confidence, 0.0);
        assert!(result.metadata.contains_key("raw_response"));
    }

    #[tokio::test]
    async fn llm_error_yields_error_intent() {
        let gateway = FailingGateway;
        let classifier = QueryClassifier::new(&gateway);
        let result = classifier.classify("hello", "", None).await;
        assert_eq!(result.intent, "error");
    }
}
