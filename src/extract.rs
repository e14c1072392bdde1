//! Restaurant mention extraction.
//!
//! - **[`HeuristicExtractor`]**: offline. Matches a small table of well-known
//!   restaurants by keyword, else capitalised names ending in
//!   Kitchen/Bar/Cafe/Bakery/Restaurant.
//! - **[`LlmExtractor`]**: asks an OpenAI-compatible chat model for a JSON
//!   array of mentions and falls back to the heuristic when the model finds
//!   nothing.
//!
//! Model output is parsed tolerantly: the first `[` through the last `]` is
//! taken as the array, and anything that does not parse yields no mentions
//! rather than an error.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use belly_buzz_core::models::{clamp_sentiment, truncate_chars, ExtractedMention};
use belly_buzz_core::traits::Extractor;
use belly_buzz_core::CollaboratorError;

use crate::config::{secret, ExtractionConfig, OPENAI_KEY_ENV};
use crate::http;

/// Sentiment given to a keyword-table match.
const HINT_SENTIMENT: f64 = 8.5;
/// Sentiment given to a pattern match.
const PATTERN_SENTIMENT: f64 = 7.0;
const PATTERN_SUMMARY: &str = "Toronto favorite mentioned online";

const NAME_PATTERN: &str =
    r"([A-Z][A-Za-z'&]+(?:\s+[A-Z][A-Za-z'&]+){0,3}\s+(?:Kitchen|Bar|Cafe|Bakery|Restaurant))";

struct Hint {
    name: &'static str,
    keywords: &'static [&'static str],
    summary: &'static str,
    tags: &'static [&'static str],
}

const HINTS: &[Hint] = &[
    Hint {
        name: "Pai Northern Thai Kitchen",
        keywords: &["Pai", "Thai", "khao soi"],
        summary: "Northern Thai comfort staples.",
        tags: &["Thai"],
    },
    Hint {
        name: "Seven Lives Tacos",
        keywords: &["Seven Lives", "taco", "Baja"],
        summary: "Baja-style fish tacos that stay sold out.",
        tags: &["Mexican"],
    },
    Hint {
        name: "Sugo",
        keywords: &["Sugo", "red sauce", "pasta"],
        summary: "Classic red-sauce Italian plates.",
        tags: &["Italian"],
    },
    Hint {
        name: "The Burger's Priest",
        keywords: &["Priest", "burger"],
        summary: "Smash burgers with cult status.",
        tags: &["Burgers"],
    },
];

const SYSTEM_PROMPT: &str = "You are a culinary trends analyst focused on restaurants in {city}. \
Read the text between <post></post> tags and extract every restaurant mentioned. \
Respond with ONLY a JSON array. Each object must contain:\n\
- \"name\": restaurant name\n\
- \"sentiment\": number from 0-10 (float allowed)\n\
- \"vibe\": max 12 words describing the vibe\n\
- \"cuisine_tags\": array of short cuisine labels\n\
- \"recommended_dishes\": array of dishes the text praises\n\
- \"price_hint\": any price mention such as \"$$\" or \"cheap\", or null\n\
If no restaurants are present return []. Avoid commentary.";

/// Keyword and pattern extractor that needs no network.
pub struct HeuristicExtractor {
    pattern: Regex,
}

impl HeuristicExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(NAME_PATTERN)?,
        })
    }

    pub fn extract_text(&self, text: &str) -> Vec<ExtractedMention> {
        let lower = text.to_lowercase();
        let hinted: Vec<ExtractedMention> = HINTS
            .iter()
            .filter(|h| h.keywords.iter().any(|k| lower.contains(&k.to_lowercase())))
            .map(|h| {
                let mut m = ExtractedMention::named(h.name)
                    .with_sentiment(HINT_SENTIMENT)
                    .with_vibe(h.summary);
                m.cuisine_tags = h.tags.iter().map(|t| t.to_string()).collect();
                m
            })
            .collect();
        if !hinted.is_empty() {
            return hinted;
        }

        let mut seen = Vec::new();
        self.pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            .filter(|name| {
                if seen.contains(name) {
                    false
                } else {
                    seen.push(name.clone());
                    true
                }
            })
            .map(|name| {
                ExtractedMention::named(name)
                    .with_sentiment(PATTERN_SENTIMENT)
                    .with_vibe(PATTERN_SUMMARY)
            })
            .collect()
    }
}

#[async_trait]
impl Extractor for HeuristicExtractor {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn extract(&self, content: &str) -> Result<Vec<ExtractedMention>, CollaboratorError> {
        Ok(self.extract_text(content))
    }
}

/// Extractor backed by an OpenAI-compatible chat completions endpoint.
pub struct LlmExtractor {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    system_prompt: String,
    max_input_chars: usize,
    timeout_secs: u64,
    fallback: HeuristicExtractor,
}

impl LlmExtractor {
    pub fn new(config: &ExtractionConfig, api_key: String, city: &str) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs, http::USER_AGENT)?,
            api_key,
            endpoint: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            system_prompt: SYSTEM_PROMPT.replace("{city}", city),
            max_input_chars: config.max_input_chars,
            timeout_secs: config.timeout_secs,
            fallback: HeuristicExtractor::new()?,
        })
    }

    async fn complete(&self, content: &str) -> Result<String, CollaboratorError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                {
                    "role": "user",
                    "content": format!("<post>\n{}\n</post>", truncate_chars(content, self.max_input_chars)),
                },
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(http::api_error(response).await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| http::transport_error(e, self.timeout_secs))?;

        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::Parse("missing choices[0].message.content".into()))
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    fn name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, content: &str) -> Result<Vec<ExtractedMention>, CollaboratorError> {
        let reply = self.complete(content).await?;
        let mentions = parse_mentions(&reply);
        if mentions.is_empty() {
            debug!("model returned no mentions; trying heuristic");
            return Ok(self.fallback.extract_text(content));
        }
        Ok(mentions)
    }
}

/// Parse a model reply into mentions, dropping entries without a name.
pub fn parse_mentions(reply: &str) -> Vec<ExtractedMention> {
    let (Some(start), Some(end)) = (reply.find('['), reply.rfind(']')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }

    let items: Vec<Value> = match serde_json::from_str(&reply[start..=end]) {
        Ok(Value::Array(items)) => items,
        _ => {
            warn!("could not parse model reply as a JSON array");
            return Vec::new();
        }
    };

    items.iter().filter_map(mention_from_value).collect()
}

fn mention_from_value(value: &Value) -> Option<ExtractedMention> {
    let name = value.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let list = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let sentiment = match value.get("sentiment") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .and_then(clamp_sentiment);

    Some(ExtractedMention {
        name: name.to_string(),
        vibe: text("vibe").or_else(|| text("summary")),
        cuisine_tags: list("cuisine_tags"),
        recommended_dishes: list("recommended_dishes"),
        price_hint: text("price_hint"),
        sentiment,
    })
}

/// Build the extractor named by the config.
///
/// `openai` without `OPENAI_API_KEY` degrades to the heuristic with a warning.
pub fn create_extractor(config: &ExtractionConfig, city: &str) -> Result<Box<dyn Extractor>> {
    match config.provider.as_str() {
        "openai" => match secret(OPENAI_KEY_ENV) {
            Some(key) => Ok(Box::new(LlmExtractor::new(config, key, city)?)),
            None => {
                warn!("{} not set; using heuristic extraction", OPENAI_KEY_ENV);
                Ok(Box::new(HeuristicExtractor::new()?))
            }
        },
        "heuristic" => Ok(Box::new(HeuristicExtractor::new()?)),
        other => anyhow::bail!("Unknown extraction provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mentions_tolerates_chatter() {
        let reply = r#"Sure! Here you go:
```json
[{"name": "Pai Northern Thai Kitchen", "sentiment": 9.5, "vibe": "busy basement",
  "cuisine_tags": ["Thai"], "recommended_dishes": ["khao soi"], "price_hint": "$$"},
 {"name": "  ", "sentiment": 3}]
```
Hope that helps."#;
        let mentions = parse_mentions(reply);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].name, "Pai Northern Thai Kitchen");
        assert_eq!(mentions[0].sentiment, Some(9.5));
        assert_eq!(mentions[0].recommended_dishes, vec!["khao soi"]);
        assert_eq!(mentions[0].price_hint.as_deref(), Some("$$"));
    }

    #[test]
    fn test_parse_mentions_malformed_is_empty() {
        assert!(parse_mentions("no array here").is_empty());
        assert!(parse_mentions("[{\"name\": \"Sugo\",").is_empty());
        assert!(parse_mentions("] backwards [").is_empty());
    }

    #[test]
    fn test_parse_mentions_sentiment_forms() {
        let mentions = parse_mentions(
            r#"[{"name":"A","sentiment":"7.5"},{"name":"B","sentiment":42},
                {"name":"C","sentiment":"great"},{"name":"D","summary":"cozy"}]"#,
        );
        assert_eq!(mentions[0].sentiment, Some(7.5));
        assert_eq!(mentions[1].sentiment, Some(10.0));
        assert_eq!(mentions[2].sentiment, None);
        assert_eq!(mentions[3].vibe.as_deref(), Some("cozy"));
    }

    #[test]
    fn test_heuristic_keyword_hints() {
        let ex = HeuristicExtractor::new().unwrap();
        let mentions =
            ex.extract_text("Khao soi at Pai is undefeated, then Baja tacos across town.");
        let names: Vec<&str> = mentions.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Pai Northern Thai Kitchen", "Seven Lives Tacos"]);
        assert_eq!(mentions[0].sentiment, Some(8.5));
        assert_eq!(
            mentions[0].vibe.as_deref(),
            Some("Northern Thai comfort staples.")
        );
    }

    #[test]
    fn test_heuristic_pattern_fallback() {
        let ex = HeuristicExtractor::new().unwrap();
        let mentions = ex.extract_text(
            "Dinner at Bar Raval Kitchen was loud. Grabbed croissants at Blackbird Bakery. \
             Back at Blackbird Bakery the next day.",
        );
        let names: Vec<&str> = mentions.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Bar Raval Kitchen", "Blackbird Bakery"]);
        assert!(mentions.iter().all(|m| m.sentiment == Some(7.0)));
    }

    #[test]
    fn test_heuristic_nothing_found() {
        let ex = HeuristicExtractor::new().unwrap();
        assert!(ex.extract_text("what a rainy week").is_empty());
    }
}
