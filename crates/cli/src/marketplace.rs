//! Seller API adapters: message delivery and catalog titles.
//!
//! ureq is synchronous, so every request runs under `spawn_blocking`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relaybot_catalog::{CatalogError, CatalogFetcher};
use relaybot_outreach::{DeliveryError, Payload, Recipient, Sender};
use serde::Deserialize;
use serde_json::json;

use crate::config::MarketplaceSection;

const SEND_PATH: &str = "/v3/chat/send/message";
const SEND_FALLBACK_PATH: &str = "/v1/chat/send/message";
const PRODUCT_INFO_PATH: &str = "/v3/product/info/list";

#[derive(Debug, thiserror::Error)]
pub(crate) enum MarketplaceError {
    #[error("marketplace credentials missing (set OZON_CLIENT_ID and OZON_API_KEY)")]
    MissingCredentials,

    #[error("marketplace returned {status} on {path}: {body}")]
    Status {
        status: u16,
        path: &'static str,
        body: String,
    },

    #[error("request to {path} failed: {message}")]
    Transport { path: &'static str, message: String },

    #[error("unexpected response from {path}: {message}")]
    Decode { path: &'static str, message: String },
}

impl MarketplaceError {
    /// Rate limiting, upstream 5xx and network trouble are worth retrying.
    fn is_retryable(&self) -> bool {
        match self {
            MarketplaceError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            MarketplaceError::Transport { .. } => true,
            MarketplaceError::MissingCredentials | MarketplaceError::Decode { .. } => false,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            MarketplaceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<MarketplaceError> for DeliveryError {
    fn from(err: MarketplaceError) -> Self {
        if err.is_retryable() {
            DeliveryError::Retryable(err.to_string())
        } else {
            DeliveryError::Permanent(err.to_string())
        }
    }
}

pub(crate) struct MarketplaceClient {
    agent: ureq::Agent,
    base_url: String,
    client_id: String,
    api_key: String,
}

impl MarketplaceClient {
    pub fn from_config(section: &MarketplaceSection) -> Result<Self, MarketplaceError> {
        let credential = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let (Some(client_id), Some(api_key)) =
            (credential(&section.client_id), credential(&section.api_key))
        else {
            return Err(MarketplaceError::MissingCredentials);
        };

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(section.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(MarketplaceClient {
            agent,
            base_url: section.base_url.trim().trim_end_matches('/').to_string(),
            client_id,
            api_key,
        })
    }

    /// POST a JSON body and return the raw response text of a 2xx reply.
    fn post(&self, path: &'static str, body: &serde_json::Value) -> Result<String, MarketplaceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .agent
            .post(&url)
            .header("Client-Id", &self.client_id)
            .header("Api-Key", &self.api_key)
            .send_json(body)
            .map_err(|e| MarketplaceError::Transport {
                path,
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response
            .into_body()
            .read_to_string()
            .map_err(|e| MarketplaceError::Transport {
                path,
                message: e.to_string(),
            })?;

        if status >= 400 {
            return Err(MarketplaceError::Status {
                status,
                path,
                body: truncate(&text, 300),
            });
        }
        Ok(text)
    }

    fn send_message(&self, chat_id: &str, text: &str) -> Result<(), MarketplaceError> {
        let body = json!({ "chat_id": chat_id, "text": text });
        match self.post(SEND_PATH, &body) {
            Ok(_) => Ok(()),
            Err(err) if matches!(err.status(), Some(400 | 404)) => {
                tracing::debug!(status = err.status(), "falling back to v1 send endpoint");
                self.post(SEND_FALLBACK_PATH, &body).map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    fn product_title(&self, item_id: &str) -> Result<Option<String>, MarketplaceError> {
        match self.post(PRODUCT_INFO_PATH, &product_info_request(item_id)) {
            Ok(text) => parse_product_title(&text),
            Err(err) if err.status() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Numeric ids are marketplace SKUs; anything else is the seller's offer id.
fn product_info_request(item_id: &str) -> serde_json::Value {
    match item_id.parse::<u64>() {
        Ok(sku) => json!({ "sku": [sku] }),
        Err(_) => json!({ "offer_id": [item_id] }),
    }
}

#[derive(Debug, Deserialize)]
struct ProductInfoList {
    #[serde(default)]
    items: Vec<ProductInfo>,
}

#[derive(Debug, Deserialize)]
struct ProductInfo {
    #[serde(default)]
    name: Option<String>,
}

fn parse_product_title(text: &str) -> Result<Option<String>, MarketplaceError> {
    let list: ProductInfoList =
        serde_json::from_str(text).map_err(|e| MarketplaceError::Decode {
            path: PRODUCT_INFO_PATH,
            message: e.to_string(),
        })?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|item| item.name)
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Delivers outreach through the chat endpoint, rendering templates first.
pub(crate) struct MarketplaceSender {
    client: Arc<MarketplaceClient>,
    templates: BTreeMap<String, String>,
}

impl MarketplaceSender {
    pub fn new(client: Arc<MarketplaceClient>, templates: BTreeMap<String, String>) -> Self {
        MarketplaceSender { client, templates }
    }
}

#[async_trait]
impl Sender for MarketplaceSender {
    async fn send(&self, recipient: &Recipient, payload: &Payload) -> Result<(), DeliveryError> {
        let text = payload
            .render(&self.templates)
            .map_err(|e| DeliveryError::Permanent(e.to_string()))?;
        let client = self.client.clone();
        let chat_id = recipient.as_str().to_string();

        tokio::task::spawn_blocking(move || client.send_message(&chat_id, &text))
            .await
            .map_err(|e| DeliveryError::Retryable(format!("task join error: {}", e)))?
            .map_err(DeliveryError::from)
    }
}

pub(crate) struct MarketplaceCatalog {
    client: Arc<MarketplaceClient>,
}

impl MarketplaceCatalog {
    pub fn new(client: Arc<MarketplaceClient>) -> Self {
        MarketplaceCatalog { client }
    }
}

#[async_trait]
impl CatalogFetcher for MarketplaceCatalog {
    async fn fetch_title(&self, item_id: &str) -> Result<Option<String>, CatalogError> {
        let client = self.client.clone();
        let item_id = item_id.to_string();
        tokio::task::spawn_blocking(move || client.product_title(&item_id))
            .await
            .map_err(|e| CatalogError::Fetch(format!("task join error: {}", e)))?
            .map_err(|e| CatalogError::Fetch(e.to_string()))
    }
}
