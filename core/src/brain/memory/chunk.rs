//! PII redaction and chunking for memory writes.

use regex::Regex;
use std::sync::OnceLock;

use super::super::embedder::Embedder;
use super::super::types::Chunk;

const CHUNK_SIZE_CHARS: usize = 400;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\+?\d{1,2}[\s.-]?)?(\(?\d{3}\)?[\s.-]?)\d{3}[\s.-]?\d{4}").unwrap())
}

/// Replace raw email addresses and phone numbers with sentinel tokens.
pub fn redact_pii(text: &str) -> String {
    let redacted = email_re().replace_all(text, "[email]");
    phone_re().replace_all(&redacted, "[phone]").to_string()
}

/// Split text into 1..N chunks of bounded size, PII-redacted, before embedding.
pub fn split_into_chunks(text: &str) -> Vec<String> {
    let redacted = redact_pii(text);
    if redacted.len() <= CHUNK_SIZE_CHARS {
        return vec![redacted];
    }
    redacted
        .as_bytes()
        .chunks(CHUNK_SIZE_CHARS)
        .map(|bytes| String::from_utf8_lossy(bytes).to_string())
        .collect()
}

pub async fn build_chunks(memory_id: &str, text: &str, embedder: &dyn Embedder) -> super::super::error::Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (position, chunk_text) in split_into_chunks(text).into_iter().enumerate() {
        let embedding = embedder.embed(&chunk_text).await?;
        chunks.push(Chunk { memory_id: memory_id.to_string(), position, chunk_text, embedding });
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_email_and_phone() {
        let text = "Contact me at john.doe@example.com or +1-555-234-5678";
        let redacted = redact_pii(text);
        assert!(redacted.contains("[email]"));
        assert!(redacted.contains("[phone]"));
        assert!(!redacted.contains("john.doe@example.com"));
        assert!(!redacted.contains("555-234-5678"));
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_into_chunks("hello world");
        assert_eq!(chunks.len(), 1);
    }
}
