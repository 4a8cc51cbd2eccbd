//! Natural-language to SQL generation
//!
//! The generation model is an external collaborator. The mediator only sees
//! [`QueryGenerator`]: a message and the live schema go in, one candidate
//! query string comes out. Nothing the model returns is trusted.

use crate::config::GenerationConfig;
use crate::error::AppError;
use crate::mediation::SchemaDescriptor;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

/// Sentinel the model is told to answer with when the request is not a database question
const NO_QUERY: &str = "NO_QUERY";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:sql|postgresql|postgres)?").expect("valid fence pattern"));

#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Translate a natural-language request into one candidate query
    async fn generate(&self, message: &str, schema: &SchemaDescriptor) -> Result<String, AppError>;
}

/// Client for an OpenAI-compatible chat completions endpoint (OpenRouter by default)
pub struct OpenRouterGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl OpenRouterGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl QueryGenerator for OpenRouterGenerator {
    async fn generate(&self, message: &str, schema: &SchemaDescriptor) -> Result<String, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Generation("OPENROUTER_API_KEY is not configured".to_string()))?;

        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system_prompt(schema)},
                {"role": "user", "content": message}
            ],
            "max_tokens": self.max_tokens,
            "temperature": 0
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation(format!("provider returned {}: {}", status, body)));
        }

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("unreadable provider response: {}", e)))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Generation("provider returned no choices".to_string()))?;

        let sql = clean_generated_sql(&content)?;
        info!("Generated candidate query ({} chars) with model {}", sql.len(), self.model);
        debug!("Candidate query: {}", sql);

        Ok(sql)
    }
}

/// Build the system prompt from the live schema
pub fn system_prompt(schema: &SchemaDescriptor) -> String {
    format!(
        "You are a helpful assistant that converts natural language into SQL queries for a PostgreSQL database.\n\
         The database has the following tables:\n\
         {}\n\n\
         Return ONLY the SQL query, as a single statement. Do not include markdown formatting. Do not include explanations.\n\n\
         IMPORTANT RULES:\n\
         1. When searching for text (names, emails, products), ALWAYS use ILIKE with wildcards (%) instead of exact match (=).\n\
         2. If the request is unrelated to the database or you cannot answer, return exactly {}.",
        schema.to_prompt(),
        NO_QUERY
    )
}

/// Strip markdown fences the model may add despite instructions
pub fn clean_generated_sql(raw: &str) -> Result<String, AppError> {
    let sql = CODE_FENCE.replace_all(raw, "").trim().to_string();

    if sql.is_empty() {
        return Err(AppError::Generation("provider returned an empty query".to_string()));
    }
    if sql.trim_end_matches('.').eq_ignore_ascii_case(NO_QUERY) {
        return Err(AppError::Generation(
            "the request does not correspond to a database query".to_string(),
        ));
    }

    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediation::introspect::TableSchema;

    #[test]
    fn test_strips_code_fences() {
        let sql = clean_generated_sql("```sql\nSELECT * FROM products\n```").unwrap();
        assert_eq!(sql, "SELECT * FROM products");
    }

    #[test]
    fn test_plain_sql_untouched() {
        let sql = clean_generated_sql("  SELECT name FROM users WHERE name ILIKE '%bob%'  ").unwrap();
        assert_eq!(sql, "SELECT name FROM users WHERE name ILIKE '%bob%'");
    }

    #[test]
    fn test_unusable_replies_are_generation_failures() {
        assert!(matches!(clean_generated_sql("```\n```"), Err(AppError::Generation(_))));
        assert!(matches!(clean_generated_sql("NO_QUERY"), Err(AppError::Generation(_))));
    }

    #[test]
    fn test_prompt_lists_live_tables() {
        let schema = SchemaDescriptor {
            tables: vec![TableSchema {
                name: "imported_sales".to_string(),
                columns: vec!["id".to_string(), "amount".to_string()],
            }],
        };

        let prompt = system_prompt(&schema);
        assert!(prompt.contains("- imported_sales (id, amount)"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_network() {
        let generator = OpenRouterGenerator::new(&GenerationConfig::default()).unwrap();
        let result = generator.generate("show products", &SchemaDescriptor::default()).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }
}
