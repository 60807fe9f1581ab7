// src/llm_extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::error::GatewayError;
use crate::record::{OrderField, RawOrder};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Natural-language task sent next to every image.
const TASK_PROMPT: &str = "Analyze this image (spreadsheet or photo). Extract the following for each order row: \
Date, Customer Name, Address, Order Number, Client Total Paid, Shipping Price, Payout Date, Shopify Payout, \
Shopify Fee, Discount Amount, Discount Percentage, Wash Deduction (Afdracht was kgs), Others Deduction, \
Total Deduction, Item Quantity, and Item Description. Also infer the Laundry Service if possible.";

/// Chat-style backends have no response schema parameter, so the schema is
/// spelled out here instead.
const SYSTEM_PROMPT: &str = r#"You are a data extraction assistant for a laundry service.
Given a photo of a delivery note, bag tag or ledger page, return ONLY valid JSON of this shape:
{
  "orders": [
    {
      "date": "string (e.g. 14/07/2025)",
      "customerName": "string (required)",
      "address": "string",
      "orderNumber": "string, Shopify order number (required, e.g. #1015)",
      "laundryService": "string, name of the laundry service provider",
      "clientTotalPaid": "string (e.g. €119.80)",
      "shippingPrice": "string (e.g. €0.00)",
      "payoutDate": "string (e.g. 21-07-2025)",
      "shopifyPayout": "string (e.g. €117.18)",
      "shopifyFee": "string (e.g. €2.62)",
      "discountAmount": "string (e.g. €4.95)",
      "discountPercentage": "string (e.g. 3.97%)",
      "washDeductionKgs": "string, 'Afdracht was (kgs)' column (e.g. €54.60)",
      "othersDeduction": "string (e.g. €18.20)",
      "totalDeduction": "string",
      "itemQuantity": "string (e.g. 1)",
      "itemDescription": "string, description or weight of item (e.g. 36kg)",
      "weight": "string, weight taken from the description (e.g. 36kg)"
    }
  ]
}

Notes:
- One entry per order row.
- Omit fields you cannot read. Never invent values.
- Return ONLY the JSON object, no markdown fences, no commentary."#;

/// Inline image data above this size is refused by the hosted services.
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// A single still image, as uploaded.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl ImagePayload {
    /// Wrap raw bytes, guessing the mime type from the file signature.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = sniff_mime_type(&bytes);
        Self { bytes, mime_type }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        // JPEG, and the fallback for anything unrecognised.
        _ => "image/jpeg",
    }
}

/// Boundary to whatever reads order rows out of a photo.
///
/// Implementations either return every order found in the image or fail as
/// a whole. Callers must run each result through the normalizer.
#[async_trait]
pub trait OrderExtractor: Send + Sync {
    async fn extract(&self, image: &ImagePayload) -> Result<Vec<RawOrder>, GatewayError>;
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug)]
struct ResolvedEndpoint {
    base_url: String,
    model: String,
    api_key: String,
}

/// Resolve the LLM config section into a concrete endpoint.
fn resolve_endpoint(llm: &LlmSection) -> Result<ResolvedEndpoint, GatewayError> {
    let api_key_from_env = || {
        std::env::var(&llm.api_key_env).map_err(|_| {
            GatewayError::Configuration(format!(
                "{} env var required for {:?} backend",
                llm.api_key_env, llm.backend
            ))
        })
    };

    let (endpoint, api_key) = match llm.backend {
        LlmBackend::Gemini => (&llm.gemini, api_key_from_env()?),
        // required by the API shape but ignored by Ollama
        LlmBackend::Ollama => (&llm.ollama, "ollama".to_string()),
        LlmBackend::Remote => (&llm.remote, api_key_from_env()?),
    };

    info!(
        backend = ?llm.backend,
        url = %endpoint.base_url,
        model = %endpoint.model,
        "Using inference backend"
    );

    Ok(ResolvedEndpoint {
        base_url: endpoint.base_url.trim_end_matches('/').to_string(),
        model: endpoint.model.clone(),
        api_key,
    })
}

/// Check if the Ollama server is reachable.
async fn check_ollama_health(client: &Client, base_url: &str) -> bool {
    // Ollama's health endpoint is at the root (not under /v1)
    let health_url = base_url.trim_end_matches('/').trim_end_matches("/v1");

    match client
        .get(health_url)
        .timeout(Duration::from_secs(3))
        .send()
        .await
    {
        Ok(resp) => {
            if resp.status().is_success() {
                info!("Ollama server is reachable");
                true
            } else {
                warn!(status = %resp.status(), "Ollama server returned non-OK status");
                false
            }
        }
        Err(e) => {
            warn!(error = %e, "Ollama server not reachable");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Gemini generateContent wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum GeminiPart {
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    Text(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiReplyContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    text: Option<String>,
}

/// Target schema: an object with a single `orders` array. Every order field
/// is a string; only `customerName` and `orderNumber` are required.
pub fn response_schema() -> Value {
    let properties: serde_json::Map<String, Value> = OrderField::ALL
        .into_iter()
        .map(|field| {
            (
                field.as_str().to_string(),
                json!({ "type": "STRING", "description": field_description(field) }),
            )
        })
        .collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "orders": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": properties,
                    "required": [
                        OrderField::CustomerName.as_str(),
                        OrderField::OrderNumber.as_str()
                    ]
                }
            }
        }
    })
}

fn field_description(field: OrderField) -> &'static str {
    match field {
        OrderField::Date => "Date of the order (e.g., 14/07/2025)",
        OrderField::CustomerName => "Name of the customer",
        OrderField::Address => "Address of the customer",
        OrderField::OrderNumber => "Shopify order number (e.g., #1015)",
        OrderField::LaundryService => "Name of the laundry service provider",
        OrderField::ClientTotalPaid => {
            "Client total amount paid including discount (e.g. €119.80)"
        }
        OrderField::ShippingPrice => "Shipping price (e.g. €0.00)",
        OrderField::PayoutDate => "Date of payout (e.g., 21-07-2025)",
        OrderField::ShopifyPayout => "Net payout from Shopify (e.g. €117.18)",
        OrderField::ShopifyFee => "Shopify transaction fee (e.g., €2.62)",
        OrderField::DiscountAmount => "Discount amount (e.g. €4.95)",
        OrderField::DiscountPercentage => "Discount percentage (e.g. 3.97%)",
        OrderField::WashDeductionKgs => {
            "Monetary deduction for wash/kgs (e.g. 'Afdracht was (kgs)' column, €54.60)"
        }
        OrderField::OthersDeduction => "Other deductions (e.g. €18.20)",
        OrderField::TotalDeduction => "Total deduction amount",
        OrderField::ItemQuantity => "Quantity of items (e.g. 1)",
        OrderField::ItemDescription => "Description or weight of item (e.g. '36kg' or '12kg')",
        OrderField::Weight => "Numeric weight extracted from description (e.g. '36kg')",
    }
}

fn gemini_request(image: &ImagePayload) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![GeminiContent {
            parts: vec![
                GeminiPart::InlineData {
                    mime_type: image.mime_type.to_string(),
                    data: image.to_base64(),
                },
                GeminiPart::Text(TASK_PROMPT.to_string()),
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: response_schema(),
        },
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: ChatContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
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

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

fn chat_request(model: &str, image: &ImagePayload) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: ChatContent::Text(SYSTEM_PROMPT.to_string()),
            },
            ChatMessage {
                role: "user".to_string(),
                content: ChatContent::Parts(vec![
                    ContentPart::Text {
                        text: TASK_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_url(),
                        },
                    },
                ]),
            },
        ],
        temperature: 0.0,
        response_format: ResponseFormat {
            kind: "json_object",
        },
    }
}

// ---------------------------------------------------------------------------
// Response body handling
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OrdersEnvelope {
    #[serde(default)]
    orders: Option<Vec<RawOrder>>,
}

/// Parse the model's text answer into raw orders.
///
/// A missing `orders` key means the image held no orders. Anything that is
/// not a JSON object rejects the whole answer.
pub fn parse_orders(content: &str) -> Result<Vec<RawOrder>, GatewayError> {
    // Strip markdown fences if the model added them despite instructions
    let json_str = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if json_str.is_empty() {
        return Err(GatewayError::EmptyResponse);
    }

    // Some models prepend reasoning text before the JSON object.
    let json_str = extract_json_object(json_str)?;

    let envelope: OrdersEnvelope = serde_json::from_str(json_str)
        .map_err(|e| GatewayError::MalformedResponse(format!("{e}\nRaw: {json_str}")))?;

    Ok(envelope.orders.unwrap_or_default())
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text.
fn extract_json_object(s: &str) -> Result<&str, GatewayError> {
    let malformed = |msg: &str| GatewayError::MalformedResponse(msg.to_string());
    let start = s.find('{').ok_or_else(|| malformed("no '{' found in response"))?;
    let end = s.rfind('}').ok_or_else(|| malformed("no '}' found in response"))?;
    if end <= start {
        return Err(malformed("unbalanced JSON object in response"));
    }
    Ok(&s[start..=end])
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// [`OrderExtractor`] backed by a hosted or local multimodal model.
pub struct LlmExtractor {
    client: Client,
    backend: LlmBackend,
    endpoint: ResolvedEndpoint,
}

impl LlmExtractor {
    pub fn new(llm: &LlmSection) -> Result<Self, GatewayError> {
        let endpoint = resolve_endpoint(llm)?;

        let mut builder = Client::builder();
        if let Some(secs) = llm.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            backend: llm.backend,
            endpoint,
        })
    }

    /// Build the extractor and, for local backends, make sure the server is up.
    pub async fn connect(llm: &LlmSection) -> Result<Self, GatewayError> {
        let extractor = Self::new(llm)?;

        if extractor.backend == LlmBackend::Ollama
            && !check_ollama_health(&extractor.client, &extractor.endpoint.base_url).await
        {
            return Err(GatewayError::Unavailable(format!(
                "Ollama is not running at {}. Start it with: ollama serve",
                extractor.endpoint.base_url
            )));
        }

        Ok(extractor)
    }

    async fn send_gemini(&self, image: &ImagePayload) -> Result<String, GatewayError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.base_url, self.endpoint.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.endpoint.api_key)
            .json(&gemini_request(image))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }

        let reply: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        let text: String = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        Ok(text)
    }

    async fn send_chat(&self, image: &ImagePayload) -> Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.endpoint.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&chat_request(&self.endpoint.model, image))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrderExtractor for LlmExtractor {
    async fn extract(&self, image: &ImagePayload) -> Result<Vec<RawOrder>, GatewayError> {
        if image.bytes.is_empty() {
            return Err(GatewayError::Configuration("image is empty".to_string()));
        }
        if image.bytes.len() > MAX_IMAGE_BYTES {
            return Err(GatewayError::Configuration(format!(
                "image is {} bytes, inline limit is {MAX_IMAGE_BYTES}",
                image.bytes.len()
            )));
        }

        info!(
            backend = ?self.backend,
            model = %self.endpoint.model,
            mime = image.mime_type,
            bytes = image.bytes.len(),
            "Sending image for extraction"
        );

        let content = match self.backend {
            LlmBackend::Gemini => self.send_gemini(image).await?,
            LlmBackend::Ollama | LlmBackend::Remote => self.send_chat(image).await?,
        };
        debug!(chars = content.len(), "Received extraction response");

        let orders = parse_orders(&content)?;
        for order in &orders {
            let (filled, total) = order.coverage();
            info!(
                filled, total,
                order_number = ?order.order_number,
                customer = ?order.customer_name,
                "LLM extraction result"
            );
        }

        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_object() {
        let orders = parse_orders(
            r##"{"orders":[{"customerName":"Anna","orderNumber":"#1015","weight":"36kg"},{"customerName":"Bram"}]}"##,
        )
        .unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].customer_name.as_deref(), Some("Anna"));
        assert_eq!(orders[0].weight.as_deref(), Some("36kg"));
        assert_eq!(orders[1].order_number, None);
    }

    #[test]
    fn test_parse_fenced_and_prefixed() {
        let fenced = "```json\n{\"orders\":[{\"customerName\":\"Anna\"}]}\n```";
        assert_eq!(parse_orders(fenced).unwrap().len(), 1);

        let thinking = "Let me look at the rows first.\n{\"orders\":[]} done";
        assert_eq!(parse_orders(thinking).unwrap().len(), 0);
    }

    #[test]
    fn test_missing_orders_key_is_no_orders() {
        assert!(parse_orders("{}").unwrap().is_empty());
        assert!(parse_orders(r#"{"orders": null}"#).unwrap().is_empty());
    }

    #[test]
    fn test_empty_and_malformed_reject_the_call() {
        assert!(matches!(parse_orders(""), Err(GatewayError::EmptyResponse)));
        assert!(matches!(parse_orders("  ```  "), Err(GatewayError::EmptyResponse)));
        assert!(matches!(
            parse_orders("sorry, I cannot read this"),
            Err(GatewayError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_orders(r#"{"orders":[{"customerName":"Anna"}"#),
            Err(GatewayError::MalformedResponse(_))
        ));
        // one bad row poisons the whole answer
        assert!(matches!(
            parse_orders(r#"{"orders":[{"customerName":"Anna"}, "row two"]}"#),
            Err(GatewayError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_mime_sniffing() {
        let png = ImagePayload::from_bytes(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a]);
        assert_eq!(png.mime_type, "image/png");

        let webp = ImagePayload::from_bytes(b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec());
        assert_eq!(webp.mime_type, "image/webp");

        let jpeg = ImagePayload::from_bytes(vec![0xff, 0xd8, 0xff, 0xe0]);
        assert_eq!(jpeg.mime_type, "image/jpeg");

        let unknown = ImagePayload::from_bytes(b"hello".to_vec());
        assert_eq!(unknown.mime_type, "image/jpeg");
        assert_eq!(unknown.data_url(), "data:image/jpeg;base64,aGVsbG8=");
    }

    #[test]
    fn test_gemini_request_shape() {
        let image = ImagePayload::from_bytes(b"hello".to_vec());
        let body = serde_json::to_value(gemini_request(&image)).unwrap();

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "aGVsbG8=");
        assert_eq!(parts[1]["text"], TASK_PROMPT);

        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        let items = &config["responseSchema"]["properties"]["orders"]["items"];
        assert_eq!(items["required"], json!(["customerName", "orderNumber"]));
        assert_eq!(items["properties"].as_object().unwrap().len(), 18);
        assert_eq!(items["properties"]["washDeductionKgs"]["type"], "STRING");
    }

    #[test]
    fn test_chat_request_shape() {
        let image = ImagePayload::from_bytes(b"hello".to_vec());
        let body = serde_json::to_value(chat_request("llava", &image)).unwrap();

        assert_eq!(body["model"], "llava");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][0]["content"].is_string());

        let user = &body["messages"][1]["content"];
        assert_eq!(user[0]["type"], "text");
        assert_eq!(user[1]["type"], "image_url");
        assert_eq!(user[1]["image_url"]["url"], "data:image/jpeg;base64,aGVsbG8=");
    }

    #[test]
    fn test_resolve_ollama_needs_no_key() {
        let llm = LlmSection {
            backend: LlmBackend::Ollama,
            ollama: EndpointConfig {
                base_url: "http://localhost:11434/v1/".to_string(),
                model: "llava".to_string(),
            },
            ..LlmSection::default()
        };
        let endpoint = resolve_endpoint(&llm).unwrap();
        assert_eq!(endpoint.base_url, "http://localhost:11434/v1");
        assert_eq!(endpoint.model, "llava");
    }

    #[test]
    fn test_resolve_remote_without_key_fails() {
        let llm = LlmSection {
            backend: LlmBackend::Remote,
            api_key_env: "LAUNDRY_LEDGER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmSection::default()
        };
        assert!(matches!(
            resolve_endpoint(&llm),
            Err(GatewayError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_image_is_rejected_before_sending() {
        let llm = LlmSection {
            backend: LlmBackend::Ollama,
            ..LlmSection::default()
        };
        let extractor = LlmExtractor::new(&llm).unwrap();
        let result = extractor.extract(&ImagePayload::from_bytes(Vec::new())).await;
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }
}
