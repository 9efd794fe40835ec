use snafu::Snafu;

use super::ids::{ConversationId, MessageId};

/// Failures produced by the core itself.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CoreError {
    #[snafu(display("chat id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
    // Calling code must only pass identifiers taken from the same canonical
    // snapshot, so this is a programming error and fails loudly.
    #[snafu(display("truncation target message '{message_id}' is not in the canonical history"))]
    TruncateTargetMissing {
        stage: &'static str,
        message_id: MessageId,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures surfaced by collaborator implementations behind the service traits.
///
/// The session layer forwards calls fire-and-forget and only logs these; it
/// never branches on them.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    #[snafu(display("conversation '{conversation_id}' was not found"))]
    ConversationNotFound {
        stage: &'static str,
        conversation_id: ConversationId,
    },
    #[snafu(display("message '{message_id}' was not found in conversation '{conversation_id}'"))]
    MessageNotFound {
        stage: &'static str,
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    #[snafu(display("collaborator backend failed at {stage}: {details}"))]
    Backend {
        stage: &'static str,
        details: String,
    },
}

pub type ServiceResult<T> = Result<T, ServiceError>;
