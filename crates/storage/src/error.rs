use std::num::ParseIntError;

use snafu::Snafu;

use loqui_core::{ConversationId, CoreError, MessageId, ServiceError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("failed to create conversation store directory at {path}"))]
    CreateStoreDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to read conversation store file {path}"))]
    ReadStore {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to write conversation store file {path}"))]
    WriteStore {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse store line {line_number} of {path}: {line}"))]
    ParseStoreLine {
        stage: &'static str,
        path: String,
        line_number: usize,
        line: String,
    },
    #[snafu(display("failed to parse stored identifier '{raw}'"))]
    ParseStoredId {
        stage: &'static str,
        raw: String,
        source: CoreError,
    },
    #[snafu(display("failed to parse stored number '{raw}'"))]
    ParseStoredNumber {
        stage: &'static str,
        raw: String,
        source: ParseIntError,
    },
    #[snafu(display("conversation '{conversation_id}' does not exist in the store"))]
    UnknownConversation {
        stage: &'static str,
        conversation_id: ConversationId,
    },
    #[snafu(display("message '{message_id}' does not exist in conversation '{conversation_id}'"))]
    UnknownMessage {
        stage: &'static str,
        conversation_id: ConversationId,
        message_id: MessageId,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for ServiceError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::UnknownConversation {
                stage,
                conversation_id,
            } => Self::ConversationNotFound {
                stage,
                conversation_id,
            },
            StorageError::UnknownMessage {
                stage,
                conversation_id,
                message_id,
            } => Self::MessageNotFound {
                stage,
                conversation_id,
                message_id,
            },
            other => Self::Backend {
                stage: "tsv-store",
                details: other.to_string(),
            },
        }
    }
}
