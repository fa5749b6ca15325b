use relaybot_storage::StorageError;

/// Errors returned by queue operations. Delivery failures never appear
/// here; the worker absorbs them into item state.
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("recipient must not be empty")]
    EmptyRecipient,

    #[error("payload must not be empty")]
    EmptyPayload,

    #[error("queue was opened read-only")]
    ReadOnly,
}
