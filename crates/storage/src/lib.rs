pub mod error;
/// TSV persistence of conversations and messages.
pub mod tsv;

pub use error::{StorageError, StorageResult};
pub use tsv::{DEFAULT_CONVERSATION_TITLE, TsvConversationStore, estimate_token_count};

use loqui_core::{
    Conversation, ConversationId, ConversationStore, MessageId, MessagePatch, ServiceResult,
};

impl ConversationStore for TsvConversationStore {
    fn find_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ServiceResult<Option<Conversation>> {
        Ok(self.load_conversation(conversation_id)?)
    }

    fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> ServiceResult<()> {
        Ok(self.remove_message(conversation_id, message_id)?)
    }

    fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        patch: MessagePatch,
        touch_updated_at: bool,
    ) -> ServiceResult<()> {
        Ok(self.patch_message(conversation_id, message_id, patch, touch_updated_at)?)
    }
}

#[cfg(test)]
mod trait_tests {
    use super::*;
    use loqui_core::{Role, ServiceError};

    fn temp_store(label: &str) -> TsvConversationStore {
        let root = std::env::temp_dir()
            .join("loqui-storage-tests")
            .join(format!("{label}-{}", ConversationId::mint()));
        TsvConversationStore::new(root)
    }

    #[test]
    fn find_conversation_returns_none_for_unknown_id() {
        let store = temp_store("trait-find");
        let found = store.find_conversation(ConversationId::mint()).unwrap();
        assert!(found.is_none());
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn edit_errors_map_to_service_not_found() {
        let store = temp_store("trait-edit");
        let conversation = store.create_conversation("mapping").unwrap();

        let missing_message = store.edit_message(
            conversation.id,
            MessageId::mint(),
            MessagePatch::content("nope"),
            false,
        );
        assert!(matches!(
            missing_message,
            Err(ServiceError::MessageNotFound { .. })
        ));

        let missing_conversation = store.edit_message(
            ConversationId::mint(),
            MessageId::mint(),
            MessagePatch::content("nope"),
            false,
        );
        assert!(matches!(
            missing_conversation,
            Err(ServiceError::ConversationNotFound { .. })
        ));
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn delete_through_trait_is_fire_and_forget_safe() {
        let store = temp_store("trait-delete");
        let conversation = store.create_conversation("deleting").unwrap();
        let message = store
            .append_message(conversation.id, Role::User, "target")
            .unwrap();

        store.delete_message(conversation.id, message.id).unwrap();
        store.delete_message(conversation.id, message.id).unwrap();

        let loaded = store.find_conversation(conversation.id).unwrap().unwrap();
        assert!(loaded.messages.is_empty());
        let _ = std::fs::remove_dir_all(store.root());
    }
}
