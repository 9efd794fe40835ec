pub mod error;
pub mod ids;
/// Domain entities shared across the workspace.
pub mod message;
/// Derivation of display sequences and replay histories from canonical truth.
pub mod projector;
/// Multi-select bulk-action state, independent of persisted data.
pub mod selection;

pub use error::{CoreError, CoreResult, ServiceError, ServiceResult};
pub use ids::{ConversationId, MessageId};
pub use message::{Conversation, ExecutionMode, Message, MessagePatch, Role};
pub use projector::{DisplaySequence, append_ephemeral, project, truncate_at};
pub use selection::{SelectionMode, SelectionTracker};

/// Persisted conversation collaborator.
///
/// Delete and edit are fire-and-forget from the session's perspective:
/// `delete_message` must be idempotent per identifier, and callers do not
/// branch on failures.
pub trait ConversationStore: Send + Sync {
    fn find_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ServiceResult<Option<Conversation>>;
    fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> ServiceResult<()>;
    fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        patch: MessagePatch,
        touch_updated_at: bool,
    ) -> ServiceResult<()>;
}

/// Execution collaborator, invoked with a computed history.
///
/// The session's sole responsibility is producing a correct `history`
/// argument; cancellation and retry live behind this seam.
pub trait ConversationExecutor: Send + Sync {
    fn execute_conversation(
        &self,
        mode: ExecutionMode,
        conversation_id: ConversationId,
        history: Vec<Message>,
    ) -> ServiceResult<()>;
}

/// Image-generation collaborator, invoked with raw message text.
pub trait ImagineService: Send + Sync {
    fn imagine_from_text(&self, conversation_id: ConversationId, text: &str) -> ServiceResult<()>;
}
