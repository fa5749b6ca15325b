//! Persisted outreach records.
//!
//! An item lives in exactly one of three collections: the active queue
//! (`OutreachItem`), the sent log (`SentRecord`), or the dead-letter store
//! (`DeadLetterRecord`). All three are keyed by [`ItemId`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Queue-assigned identifier. Monotonic: a larger id was enqueued later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque delivery address (a marketplace chat id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(String);

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Recipient(address.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message content: literal text, or a named template filled in at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Text {
        text: String,
    },
    Template {
        template: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        params: BTreeMap<String, String>,
    },
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text {
            text: text.into().trim().to_string(),
        }
    }

    pub fn template(name: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        Payload::Template {
            template: name.into(),
            params,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Payload::Text { text } => text.trim().is_empty(),
            Payload::Template { template, .. } => template.trim().is_empty(),
        }
    }

    /// Produce the final message text.
    ///
    /// Templates are looked up by name in `templates`; `{param}`
    /// placeholders are replaced from the payload's params. Braces that do
    /// not enclose an identifier are kept as-is.
    pub fn render(&self, templates: &BTreeMap<String, String>) -> Result<String, RenderError> {
        match self {
            Payload::Text { text } => Ok(text.clone()),
            Payload::Template { template, params } => {
                let body = templates
                    .get(template)
                    .ok_or_else(|| RenderError::UnknownTemplate(template.clone()))?;
                fill_placeholders(template, body, params)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("template '{template}' needs parameter '{param}'")]
    MissingParam { template: String, param: String },
}

fn fill_placeholders(
    template: &str,
    body: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_identifier(&after[..close]) => {
                let key = &after[..close];
                let value = params.get(key).ok_or_else(|| RenderError::MissingParam {
                    template: template.to_string(),
                    param: key.to_string(),
                })?;
                out.push_str(value);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Delivery state of an item that is still in the active queue.
///
/// There is no `Dead` variant: a dead item has left the queue and lives in
/// the dead-letter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Scheduled {
        #[serde(with = "time::serde::rfc3339")]
        next_attempt_at: OffsetDateTime,
    },
}

/// One message waiting for (another) delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachItem {
    pub id: ItemId,
    pub recipient: Recipient,
    pub payload: Payload,
    pub state: ItemState,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl OutreachItem {
    /// Whether an attempt may be made at `now`.
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        match self.state {
            ItemState::Pending => true,
            ItemState::Scheduled { next_attempt_at } => next_attempt_at <= now,
        }
    }
}

/// Append-only record of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRecord {
    pub id: ItemId,
    pub recipient: Recipient,
    #[serde(with = "time::serde::rfc3339")]
    pub delivered_at: OffsetDateTime,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Terminal record of an item that will not be retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: ItemId,
    pub recipient: Recipient,
    pub payload: Payload,
    pub attempt_count: u32,
    pub last_error: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub dead_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Which collection currently holds an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Active,
    Sent,
    DeadLetter,
}

/// Stable key for "this message to this recipient", used to refuse
/// duplicate enqueues.
pub fn idempotency_key(recipient: &Recipient, payload: &Payload) -> String {
    let mut hasher = Sha256::new();
    hasher.update(recipient.as_str().as_bytes());
    hasher.update([0u8]);
    // Payload serialization is deterministic: struct fields in declaration
    // order, params in a BTreeMap.
    hasher.update(serde_json::to_vec(payload).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}
