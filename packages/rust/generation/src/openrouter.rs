//! OpenRouter (OpenAI-compatible) chat completions and embeddings client.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use payslip_shared::{AppConfig, OpenRouterConfig, PayslipError, Result, StructuredPayslip};
use payslip_storage::Embedder;

use crate::{GenerationRequest, Generator, PageImage, PayslipExtractor};

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("payslip-rag/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Instructions sent with every extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionPrompts {
    pub system: String,
    pub user: String,
}

/// Client for the `/chat/completions` and `/embeddings` endpoints of an
/// OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    vision_model: String,
    embedding_model: String,
    extraction: ExtractionPrompts,
}

impl OpenRouterClient {
    /// Build a client from the `[openrouter]` and `[prompts]` config sections.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = payslip_shared::validate_api_key(config)?;
        let extraction = ExtractionPrompts {
            system: config.prompts.system_extraction.clone(),
            user: config.prompts.user_extraction.clone(),
        };
        Self::new(&config.openrouter, api_key, extraction)
    }

    pub fn new(
        config: &OpenRouterConfig,
        api_key: impl Into<String>,
        extraction: ExtractionPrompts,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PayslipError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: config.chat_model.clone(),
            vision_model: config.vision_model.clone(),
            embedding_model: config.embedding_model.clone(),
            extraction,
        })
    }

    /// POST `body` to `endpoint` and decode the JSON reply.
    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| PayslipError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PayslipError::Network(format!("{url}: HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| PayslipError::Generation(format!("invalid {endpoint} response: {e}")))
    }

    /// POST a chat completion and return the first choice's content.
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<Option<String>> {
        let parsed: ChatResponse = self.post_json("chat/completions", request).await?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content))
    }
}

#[async_trait]
impl Generator for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.chat_model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(request.rendered_system()),
                },
                Message {
                    role: "user",
                    content: MessageContent::Text(request.rendered_user()),
                },
            ],
            response_format: None,
        };

        let reply = self.complete(&body).await?;
        debug!(empty = reply.is_none(), "generation finished");
        Ok(reply)
    }
}

#[async_trait]
impl PayslipExtractor for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.vision_model, media_type = %image.media_type, bytes = image.bytes.len()))]
    async fn extract(&self, image: &PageImage) -> Result<StructuredPayslip> {
        let data_url = format!(
            "data:{};base64,{}",
            image.media_type,
            general_purpose::STANDARD.encode(&image.bytes)
        );

        let body = ChatRequest {
            model: &self.vision_model,
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(self.extraction.system.clone()),
                },
                Message {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: self.extraction.user.clone(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: data_url },
                        },
                    ]),
                },
            ],
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let reply = self
            .complete(&body)
            .await?
            .ok_or_else(|| PayslipError::Generation("extraction returned no content".into()))?;

        parse_payslip_json(&reply)
    }
}

#[async_trait]
impl Embedder for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.embedding_model, texts = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let mut parsed: EmbeddingResponse = self.post_json("embeddings", &body).await?;
        if parsed.data.len() != texts.len() {
            return Err(PayslipError::Generation(format!(
                "embeddings response has {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        debug!(dims = parsed.data[0].embedding.len(), "embedded texts");
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Parse a model reply into a payslip, tolerating a fenced code block.
pub(crate) fn parse_payslip_json(reply: &str) -> Result<StructuredPayslip> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid regex")
    });

    let json = FENCE_RE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map_or(reply.trim(), |m| m.as_str());

    serde_json::from_str(json)
        .map_err(|e| PayslipError::parse(format!("extraction reply is not a payslip: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use payslip_shared::{Chunk, Metadata};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenRouterClient {
        let config = OpenRouterConfig {
            base_url: format!("{}/api/v1", server.uri()),
            ..OpenRouterConfig::default()
        };
        let extraction = ExtractionPrompts {
            system: "extract".into(),
            user: "as json".into(),
        };
        OpenRouterClient::new(&config, "test-key", extraction).expect("build client")
    }

    fn completion(content: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    #[tokio::test]
    async fn generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("Citations: p:1"))
            .respond_with(completion(serde_json::json!("Your net pay is 2199.85 EUR.")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = GenerationRequest::new("Citations: {citations}", "What is my net pay?")
            .with_param("citations", "p:1")
            .with_documents(vec![Chunk::new("financial", "Net: 2199.85", Metadata::new())]);

        let answer = client.generate(&request).await.expect("generate");
        assert_eq!(answer.as_deref(), Some("Your net pay is 2199.85 EUR."));
    }

    #[tokio::test]
    async fn generate_null_content_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(completion(serde_json::Value::Null))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let answer = client
            .generate(&GenerationRequest::new("sys", "q"))
            .await
            .expect("generate");
        assert!(answer.is_none());
    }

    #[tokio::test]
    async fn http_error_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .generate(&GenerationRequest::new("sys", "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, PayslipError::Network(_)));
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn extract_sends_data_url_and_parses_fenced_json() {
        let server = MockServer::start().await;
        let reply = "```json\n{\"personal\":{\"nationalId\":\"85.07.30-123.45\"},\
                     \"period\":{\"periodStart\":\"2024-01-01\"}}\n```";
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(body_string_contains("data:image/png;base64,iVBORw0KGgo"))
            .respond_with(completion(serde_json::json!(reply)))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let image = PageImage {
            media_type: "image/png".into(),
            bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        };
        let payslip = client.extract(&image).await.expect("extract");
        assert_eq!(payslip.national_id(), Some("85.07.30-123.45"));
        assert_eq!(payslip.month_key().as_deref(), Some("2024-01"));
    }

    #[tokio::test]
    async fn embed_orders_vectors_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("openai/text-embedding-3-small"))
            .and(body_string_contains("net pay"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0] },
                    { "index": 0, "embedding": [1.0, 0.0] }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let vectors = client
            .embed(&["net pay".to_string(), "withholding tax".to_string()])
            .await
            .expect("embed");
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embed_rejects_short_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "index": 0, "embedding": [1.0] }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PayslipError::Generation(_)));
    }

    #[test]
    fn parse_accepts_bare_json() {
        let payslip = parse_payslip_json(" {\"employment\":{\"employeeNumber\":\"E-1\"}} ")
            .expect("parse");
        assert_eq!(payslip.employee_number(), Some("E-1"));
    }

    #[test]
    fn parse_rejects_prose() {
        let err = parse_payslip_json("I could not read this payslip.").unwrap_err();
        assert!(matches!(err, PayslipError::Parse { .. }));
    }
}
