use std::sync::Arc;

use loqui_core::{
    ConversationExecutor, ConversationId, ConversationStore, CoreResult, DisplaySequence,
    ExecutionMode, ImagineService, Message, MessageId, MessagePatch, Role, SelectionTracker,
    ServiceResult, project, truncate_at,
};

use super::preferences::PreferencesStore;

/// One user's view over one conversation's message list.
///
/// Owns the only mutable core state (the selection tracker) and derives
/// everything else from the store's canonical snapshot on each read. All
/// collaborator calls for delete/edit/execute/imagine are fire-and-forget:
/// failures are logged, never interpreted.
pub struct MessageListSession {
    store: Arc<dyn ConversationStore>,
    executor: Arc<dyn ConversationExecutor>,
    imagine: Arc<dyn ImagineService>,
    preferences: Arc<PreferencesStore>,
    conversation_id: Option<ConversationId>,
    selection: SelectionTracker,
}

impl MessageListSession {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        executor: Arc<dyn ConversationExecutor>,
        imagine: Arc<dyn ImagineService>,
        preferences: Arc<PreferencesStore>,
    ) -> Self {
        Self {
            store,
            executor,
            imagine,
            preferences,
            conversation_id: None,
            selection: SelectionTracker::new(),
        }
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    /// Switches the session to another conversation (or none).
    ///
    /// The selection is re-keyed and therefore cleared whenever the
    /// identifier changes.
    pub fn activate_conversation(&mut self, conversation_id: Option<ConversationId>) {
        self.conversation_id = conversation_id;
        self.selection.sync_conversation(conversation_id);
    }

    /// Derives the display sequence from the current canonical snapshot.
    ///
    /// Recomputed on every call; stale selected identifiers are dropped here,
    /// at the recompute-on-read point.
    pub fn visible_messages(&mut self) -> DisplaySequence {
        let canonical = self.canonical_messages();
        self.selection.retain_existing(&canonical);
        project(&canonical, self.preferences.show_system_messages())
    }

    /// Aggregate token count for the active conversation, as derived by the
    /// store.
    pub fn history_token_count(&self) -> u64 {
        self.active_conversation()
            .map_or(0, |conversation| conversation.token_count)
    }

    pub fn delete_message(&self, message_id: MessageId) {
        let Some(conversation_id) = self.conversation_id else {
            return;
        };

        forward(
            "delete-message",
            self.store.delete_message(conversation_id, message_id),
        );
    }

    pub fn edit_message(&self, message_id: MessageId, new_content: impl Into<String>) {
        let Some(conversation_id) = self.conversation_id else {
            return;
        };

        forward(
            "edit-message",
            self.store.edit_message(
                conversation_id,
                message_id,
                MessagePatch::content(new_content),
                true,
            ),
        );
    }

    pub fn imagine_from_message_text(&self, text: &str) {
        let Some(conversation_id) = self.conversation_id else {
            return;
        };

        forward(
            "imagine-from-text",
            self.imagine.imagine_from_text(conversation_id, text),
        );
    }

    /// Replays the conversation from a chosen message.
    ///
    /// The canonical history is truncated at the target plus `offset` and
    /// re-submitted immediately. An unknown target is a caller bug and
    /// surfaces as an error instead of submitting a wrong history.
    pub fn restart_from_message(&self, message_id: MessageId, offset: i64) -> CoreResult<()> {
        let Some(conversation_id) = self.conversation_id else {
            return Ok(());
        };

        let canonical = self.canonical_messages();
        let truncated = truncate_at(&canonical, message_id, offset)?;

        forward(
            "restart-from-message",
            self.executor
                .execute_conversation(ExecutionMode::Immediate, conversation_id, truncated),
        );
        Ok(())
    }

    /// Submits the current history extended with one ephemeral user message.
    pub fn run_example(&self, text: impl Into<String>) {
        let Some(conversation_id) = self.conversation_id else {
            return;
        };

        let history =
            loqui_core::append_ephemeral(&self.canonical_messages(), Role::User, text);
        forward(
            "run-example",
            self.executor
                .execute_conversation(ExecutionMode::Immediate, conversation_id, history),
        );
    }

    pub fn selection(&self) -> &SelectionTracker {
        &self.selection
    }

    pub fn set_selection_mode(&mut self, active: bool) {
        self.selection.set_active(active);
    }

    pub fn toggle_selected(&mut self, message_id: MessageId, selected: bool) {
        self.selection.toggle(message_id, selected);
    }

    /// Selects every message in the canonical list, including hidden system
    /// messages, so bulk delete covers the whole history.
    pub fn select_all(&mut self) {
        let canonical = self.canonical_messages();
        self.selection
            .select_all(canonical.iter().map(|message| message.id));
    }

    pub fn select_none(&mut self) {
        self.selection.select_none();
    }

    /// Forwards every selected identifier to the deletion collaborator and
    /// clears the selection. Returns the number of forwarded deletes.
    pub fn delete_selected(&mut self) -> usize {
        let Some(conversation_id) = self.conversation_id else {
            self.selection.select_none();
            return 0;
        };

        let selected = self.selection.take_selected();
        let forwarded = selected.len();
        for message_id in selected {
            forward(
                "delete-selected",
                self.store.delete_message(conversation_id, message_id),
            );
        }
        forwarded
    }

    fn active_conversation(&self) -> Option<loqui_core::Conversation> {
        let conversation_id = self.conversation_id?;
        match self.store.find_conversation(conversation_id) {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!(%error, "conversation lookup failed, treating as absent");
                None
            }
        }
    }

    fn canonical_messages(&self) -> Vec<Message> {
        self.active_conversation()
            .map_or_else(Vec::new, |conversation| conversation.messages)
    }
}

fn forward(stage: &'static str, result: ServiceResult<()>) {
    // The collaborator owns retries and cancellation; the session only logs.
    if let Err(error) = result {
        tracing::warn!(%error, stage, "collaborator call failed");
    }
}
