use std::time::Duration;

use ai_client::OpenAi;
use serde::Deserialize;
use storywire_common::{truncate, Category, Entities, NormalizedFields};
use tracing::warn;

use crate::og_image;

const MIN_TEXT_CHARS: usize = 50;
const MAX_SUMMARY_CHARS: usize = 500;
const MAX_HEADLINE_CHARS: usize = 120;
const LLM_MAX_ATTEMPTS: u32 = 3;
const LLM_BASE_DELAY: Duration = Duration::from_secs(2);
pub const PROMPT_VERSION: &str = "v1";

/// Everything the normalizer needs about one pending signal.
pub struct NormalizeInput<'a> {
    pub title: &'a str,
    pub text: &'a str,
    pub source_name: &'a str,
    pub url: &'a str,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeDecision {
    Accepted,
    Rejected { reason: String },
    Failed { reason: String },
}

pub struct NormalizeOutcome {
    pub decision: NormalizeDecision,
    pub fields: Option<NormalizedFields>,
    pub raw_response: Option<String>,
    pub image_url: Option<String>,
    pub known_platforms: Vec<String>,
    pub unknown_platforms: Vec<String>,
}

/// Runs the LLM-backed accept/reject/fail decision for one pending signal,
/// per the normalization policy: a short-text early reject, a single LLM
/// round with one fallback-prompt retry on shape-validation failure only,
/// and a silent best-effort Open Graph image lookup on acceptance.
pub struct Normalizer {
    client: OpenAi,
    min_confidence: f64,
    known_platform_slugs: Vec<String>,
    http: reqwest::Client,
}

impl Normalizer {
    pub fn new(client: OpenAi, min_confidence: f64, known_platform_slugs: Vec<String>) -> Self {
        Self {
            client,
            min_confidence,
            known_platform_slugs,
            http: og_image::build_client(),
        }
    }

    pub async fn normalize(&self, input: NormalizeInput<'_>) -> NormalizeOutcome {
        let combined_len = input.title.chars().count() + input.text.chars().count();
        if combined_len < MIN_TEXT_CHARS {
            return NormalizeOutcome {
                decision: NormalizeDecision::Rejected {
                    reason: "text too short".to_string(),
                },
                fields: None,
                raw_response: None,
                image_url: None,
                known_platforms: Vec::new(),
                unknown_platforms: Vec::new(),
            };
        }

        let system = system_prompt();
        let user = user_prompt(&input);

        let raw_response = match self
            .client
            .chat_completion_with_retry(system.clone(), user.clone(), LLM_MAX_ATTEMPTS, LLM_BASE_DELAY)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                return NormalizeOutcome {
                    decision: NormalizeDecision::Failed {
                        reason: format!("LLM request failed: {e}"),
                    },
                    fields: None,
                    raw_response: None,
                    image_url: None,
                    known_platforms: Vec::new(),
                    unknown_platforms: Vec::new(),
                }
            }
        };

        let mut parsed = parse_and_validate(&raw_response, self.min_confidence);

        if let Err(ValidationError::ShapeInvalid(_)) = &parsed {
            let fallback_user = fallback_prompt(&input);
            match self
                .client
                .chat_completion(system, fallback_user)
                .await
            {
                Ok(retry_response) => {
                    parsed = parse_and_validate(&retry_response, self.min_confidence);
                }
                Err(e) => {
                    warn!(error = %e, "fallback normalization retry failed");
                }
            }
        }

        match parsed {
            Ok(fields) => self.finish_accepted_or_rejected(fields, raw_response, input.url).await,
            Err(ValidationError::JsonError(msg)) => NormalizeOutcome {
                decision: NormalizeDecision::Failed {
                    reason: format!("no valid JSON object in model response: {msg}"),
                },
                fields: None,
                raw_response: Some(raw_response),
                image_url: None,
                known_platforms: Vec::new(),
                unknown_platforms: Vec::new(),
            },
            Err(ValidationError::ShapeInvalid(msg)) => NormalizeOutcome {
                decision: NormalizeDecision::Failed { reason: msg },
                fields: None,
                raw_response: Some(raw_response),
                image_url: None,
                known_platforms: Vec::new(),
                unknown_platforms: Vec::new(),
            },
        }
    }

    async fn finish_accepted_or_rejected(
        &self,
        fields: NormalizedFields,
        raw_response: String,
        url: &str,
    ) -> NormalizeOutcome {
        if fields.confidence < self.min_confidence {
            return NormalizeOutcome {
                decision: NormalizeDecision::Rejected {
                    reason: format!("confidence {:.2} below threshold", fields.confidence),
                },
                fields: Some(fields),
                raw_response: Some(raw_response),
                image_url: None,
                known_platforms: Vec::new(),
                unknown_platforms: Vec::new(),
            };
        }

        let (known, unknown) = self.split_platform_slugs(&fields.entities.platforms);
        let image_url = og_image::fetch_og_image(&self.http, url).await;

        NormalizeOutcome {
            decision: NormalizeDecision::Accepted,
            fields: Some(fields),
            raw_response: Some(raw_response),
            image_url,
            known_platforms: known,
            unknown_platforms: unknown,
        }
    }

    fn split_platform_slugs(&self, platforms: &[String]) -> (Vec<String>, Vec<String>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for name in platforms {
            let slug = storywire_common::slugify(name);
            if self.known_platform_slugs.contains(&slug) {
                known.push(slug);
            } else {
                unknown.push(slug);
            }
        }
        (known, unknown)
    }
}

fn system_prompt() -> String {
    "You are a filter and summarizer for an AI-companion-platform news feed. \
     Accept only items that are directly about known AI companion platforms, \
     or about companion-specific regulation, safety, or business news. Respond \
     with a single JSON object and nothing else."
        .to_string()
}

fn user_prompt(input: &NormalizeInput<'_>) -> String {
    let date = input
        .published_at
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Title: {}\nSource: {}\nURL: {}\nDate: {}\n\nContent:\n{}\n\n\
         Respond with JSON: {{\"summary\": string (<=500 chars), \
         \"suggestedHeadline\": string (<=120 chars), \
         \"categories\": array of one or more of PRODUCT_UPDATE, MONETIZATION_CHANGE, \
         SAFETY_YOUTH_RISK, NSFW_CONTENT_POLICY, CULTURAL_TREND, REGULATORY_LEGAL, \
         BUSINESS_FUNDING, \"entities\": {{\"platforms\": [string], \"companies\": [string], \
         \"people\": [string], \"topics\": [string]}}, \"confidence\": number between 0 and 1}}",
        input.title, input.source_name, input.url, date, input.text
    )
}

fn fallback_prompt(input: &NormalizeInput<'_>) -> String {
    format!(
        "{}\n\nYour previous response did not match the required shape. Respond with \
         EXACTLY this JSON shape and nothing else:\n\
         {{\"summary\": \"...\", \"suggestedHeadline\": \"...\", \"categories\": [\"PRODUCT_UPDATE\"], \
         \"entities\": {{\"platforms\": [], \"companies\": [], \"people\": [], \"topics\": []}}, \
         \"confidence\": 0.8}}",
        user_prompt(input)
    )
}

#[derive(Debug, Deserialize)]
struct RawNormalizedFields {
    summary: String,
    #[serde(rename = "suggestedHeadline")]
    suggested_headline: String,
    categories: Vec<String>,
    #[serde(default)]
    entities: Option<RawEntities>,
    confidence: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntities {
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    companies: Vec<String>,
    #[serde(default)]
    people: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Debug)]
enum ValidationError {
    JsonError(String),
    ShapeInvalid(String),
}

/// Extract a balanced `{...}` substring even if the model wrapped it in
/// prose, then parse and validate it against the normalizer's output shape.
fn parse_and_validate(
    response: &str,
    _min_confidence: f64,
) -> Result<NormalizedFields, ValidationError> {
    let json_str =
        extract_json_object(response).ok_or_else(|| ValidationError::JsonError("no braces found".to_string()))?;

    let raw: RawNormalizedFields = serde_json::from_str(json_str)
        .map_err(|e| ValidationError::JsonError(e.to_string()))?;

    if raw.confidence < 0.0 || raw.confidence > 1.0 {
        return Err(ValidationError::ShapeInvalid(format!(
            "confidence {} out of range",
            raw.confidence
        )));
    }

    let categories: Vec<Category> = raw
        .categories
        .iter()
        .filter_map(|c| Category::from_wire_str(c))
        .collect();
    if categories.is_empty() {
        return Err(ValidationError::ShapeInvalid(
            "categories must be a non-empty subset of the known set".to_string(),
        ));
    }

    let raw_entities = raw.entities.unwrap_or_default();

    Ok(NormalizedFields {
        summary: truncate(&raw.summary, MAX_SUMMARY_CHARS),
        suggested_headline: truncate(&raw.suggested_headline, MAX_HEADLINE_CHARS),
        categories,
        entities: Entities {
            platforms: raw_entities.platforms,
            companies: raw_entities.companies,
            people: raw_entities.people,
            topics: raw_entities.topics,
        },
        confidence: raw.confidence,
    })
}

/// Scan for the first `{` and return the substring up to its matching `}`,
/// tracking nesting and skipping braces inside string literals.
fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_object_finds_braces_amid_prose() {
        let text = "Sure, here you go: {\"a\": 1} thanks!";
        assert_eq!(extract_json_object(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn extract_json_object_handles_nested_braces() {
        let text = "{\"a\": {\"b\": 1}}";
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn extract_json_object_ignores_braces_in_strings() {
        let text = r#"{"a": "value } with brace"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn extract_json_object_returns_none_without_braces() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn parse_and_validate_rejects_empty_categories() {
        let response = r#"{"summary":"s","suggestedHeadline":"h","categories":["NOT_REAL"],"entities":{},"confidence":0.8}"#;
        assert!(matches!(
            parse_and_validate(response, 0.6),
            Err(ValidationError::ShapeInvalid(_))
        ));
    }

    #[test]
    fn parse_and_validate_accepts_valid_shape() {
        let response = r#"{"summary":"s","suggestedHeadline":"h","categories":["PRODUCT_UPDATE"],"entities":{"platforms":["Replika"]},"confidence":0.9}"#;
        let fields = parse_and_validate(response, 0.6).expect("should parse");
        assert_eq!(fields.categories, vec![Category::ProductUpdate]);
        assert_eq!(fields.entities.platforms, vec!["Replika".to_string()]);
    }

    #[test]
    fn parse_and_validate_truncates_overlong_fields() {
        let long_summary = "a".repeat(600);
        let response = format!(
            r#"{{"summary":"{long_summary}","suggestedHeadline":"h","categories":["PRODUCT_UPDATE"],"entities":{{}},"confidence":0.9}}"#
        );
        let fields = parse_and_validate(&response, 0.6).expect("should parse");
        assert_eq!(fields.summary.chars().count(), MAX_SUMMARY_CHARS);
    }
}
