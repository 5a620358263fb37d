//! `TripleExtractor` backed by a locally running Ollama model (§6 wire contract).

use async_trait::async_trait;
use noema_core::error::{NoemaError, NoemaResult};
use noema_core::traits::{Triple, TripleExtractor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use noema_core::TripleExtractorConfig;

const PROMPT_PREAMBLE: &str = "You are a knowledge graph builder. Extract semantic triples from the text.\n\
Rules:\n\
- Each triple: [head, relation, tail]\n\
- head and tail MUST be short, atomic concepts (1-3 words max)\n\
- NO full sentences, clauses, or phrases like 'in...', 'for...', 'has been...'\n\
- Normalize to singular nouns where possible (e.g., 'Apples' -> 'Apple')\n\
- Use simple, clear relations (e.g., 'ORIGINATES_FROM', 'IS_A', 'CULTIVATED_IN')\n\
- Output ONLY a JSON list of lists. No other text.\n\n";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Extracts `(head, relation, tail)` triples by prompting an Ollama model's
/// `/api/generate` endpoint and recovering a JSON array from its output.
pub struct OllamaTripleExtractor {
    client: reqwest::Client,
    config: TripleExtractorConfig,
}

impl OllamaTripleExtractor {
    pub fn new(config: TripleExtractorConfig) -> NoemaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NoemaError::external_unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TripleExtractor for OllamaTripleExtractor {
    async fn extract(&self, text: &str) -> NoemaResult<Vec<Triple>> {
        let prompt = format!("{PROMPT_PREAMBLE}Text: {text}\n\nTriples:");
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| NoemaError::external_unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NoemaError::external_unavailable(format!(
                "ollama returned status {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| NoemaError::malformed_adapter_response(e.to_string()))?;

        Ok(parse_triples(&body.response))
    }
}

/// Recover a list of triples from a model's raw text output. Tolerates
/// markdown code fences and leading/trailing prose by falling back to the
/// first bracketed array found in the text. Any failure yields an empty list.
fn parse_triples(raw: &str) -> Vec<Triple> {
    let cleaned = strip_fences(raw.trim());

    if let Some(triples) = try_parse_json_triples(cleaned) {
        return triples;
    }

    if let Some(array_slice) = extract_bracketed_array(cleaned) {
        if let Some(triples) = try_parse_json_triples(array_slice) {
            return triples;
        }
    }

    warn!(raw = %raw, "could not recover a triple list from model output");
    Vec::new()
}

fn strip_fences(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn extract_bracketed_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn try_parse_json_triples(text: &str) -> Option<Vec<Triple>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let items = value.as_array()?;

    let mut triples = Vec::with_capacity(items.len());
    for item in items {
        let parts = item.as_array()?;
        if parts.len() != 3 {
            continue;
        }
        let head = parts[0].as_str()?.trim().to_string();
        let relation = parts[1].as_str()?.trim().to_string();
        let tail = parts[2].as_str()?.trim().to_string();
        if head.is_empty() || relation.is_empty() || tail.is_empty() {
            continue;
        }
        triples.push((head, relation, tail));
    }
    Some(triples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json_array() {
        let raw = r#"[["Apple", "IS_A", "Fruit"], ["Apple", "ORIGINATES_FROM", "China"]]"#;
        let triples = parse_triples(raw);
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[0], ("Apple".to_string(), "IS_A".to_string(), "Fruit".to_string()));
    }

    #[test]
    fn recovers_array_wrapped_in_fences_and_prose() {
        let raw = "Here are the triples:\n```json\n[[\"Cat\", \"IS_A\", \"Animal\"]]\n```\nThanks!";
        let triples = parse_triples(raw);
        assert_eq!(triples, vec![("Cat".to_string(), "IS_A".to_string(), "Animal".to_string())]);
    }

    #[test]
    fn unparsable_output_yields_empty_list() {
        assert!(parse_triples("not json at all").is_empty());
    }

    #[test]
    fn malformed_triples_are_dropped_not_fatal() {
        let raw = r#"[["OnlyHead"], ["Good", "IS_A", "Thing"]]"#;
        let triples = parse_triples(raw);
        assert_eq!(triples, vec![("Good".to_string(), "IS_A".to_string(), "Thing".to_string())]);
    }
}
