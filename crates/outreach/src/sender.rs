use async_trait::async_trait;

use crate::model::{Payload, Recipient};

/// Why a delivery attempt failed, as classified by the sender.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Rate limiting, network trouble, upstream 5xx. Worth trying again.
    #[error("retryable delivery failure: {0}")]
    Retryable(String),

    /// The message can never be delivered as-is.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Retryable(_))
    }

    /// The error text without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            DeliveryError::Retryable(msg) | DeliveryError::Permanent(msg) => msg,
        }
    }
}

/// Adapter to the external messaging API.
///
/// Implementations must not retry internally; the worker owns retry timing.
/// The worker bounds every call with its own timeout, so a sender may also
/// rely on that instead of enforcing one.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, recipient: &Recipient, payload: &Payload) -> Result<(), DeliveryError>;
}
