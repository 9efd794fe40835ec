use std::collections::HashSet;
use std::mem;

use super::ids::{ConversationId, MessageId};
use super::message::Message;

/// Whether multi-select bulk actions are enabled for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionMode {
    #[default]
    Inactive,
    Active,
}

/// Tracks the set of messages marked for bulk action.
///
/// Owned by one UI session, scoped to one conversation at a time, never
/// persisted. Every operation is total; there is no reachable illegal state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionTracker {
    conversation_id: Option<ConversationId>,
    mode: SelectionMode,
    selected: HashSet<MessageId>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode == SelectionMode::Active
    }

    /// Toggles selection mode on or off.
    ///
    /// Entering `Active` starts from an empty set; leaving it discards the
    /// set, so a hidden selection can never resurface later.
    pub fn set_active(&mut self, active: bool) {
        let next = if active {
            SelectionMode::Active
        } else {
            SelectionMode::Inactive
        };

        if next != self.mode {
            self.mode = next;
            self.selected.clear();
        }
    }

    /// Idempotently adds or removes one message while selection mode is on.
    pub fn toggle(&mut self, message_id: MessageId, selected: bool) {
        if !self.is_active() {
            return;
        }

        if selected {
            self.selected.insert(message_id);
        } else {
            self.selected.remove(&message_id);
        }
    }

    /// Replaces the selection with exactly the given identifiers.
    pub fn select_all(&mut self, message_ids: impl IntoIterator<Item = MessageId>) {
        if !self.is_active() {
            return;
        }

        self.selected = message_ids.into_iter().collect();
    }

    pub fn select_none(&mut self) {
        self.selected.clear();
    }

    /// Yields the current selection for forwarding to the deletion
    /// collaborator and clears it.
    ///
    /// Iteration order over the returned set is unspecified; the collaborator
    /// is expected to be idempotent per identifier.
    pub fn take_selected(&mut self) -> HashSet<MessageId> {
        mem::take(&mut self.selected)
    }

    pub fn selected(&self) -> &HashSet<MessageId> {
        &self.selected
    }

    pub fn contains(&self, message_id: MessageId) -> bool {
        self.selected.contains(&message_id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Re-keys the tracker to the given conversation.
    ///
    /// Any identifier change clears the set unconditionally; a selection never
    /// carries across conversations, whether or not the same message ids exist
    /// in the new one.
    pub fn sync_conversation(&mut self, conversation_id: Option<ConversationId>) {
        if self.conversation_id != conversation_id {
            self.conversation_id = conversation_id;
            self.selected.clear();
        }
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    /// Drops identifiers no longer present in the canonical message list.
    ///
    /// Called at projection time so the set tracks external deletions without
    /// a dedicated invalidation protocol.
    pub fn retain_existing(&mut self, canonical: &[Message]) {
        if self.selected.is_empty() {
            return;
        }

        let known = canonical
            .iter()
            .map(|message| message.id)
            .collect::<HashSet<_>>();
        self.selected.retain(|message_id| known.contains(message_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn active_tracker() -> SelectionTracker {
        let mut tracker = SelectionTracker::new();
        tracker.set_active(true);
        tracker
    }

    #[test]
    fn toggle_is_idempotent() {
        let mut tracker = active_tracker();
        let message_id = MessageId::mint();

        tracker.toggle(message_id, true);
        tracker.toggle(message_id, true);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.contains(message_id));

        tracker.toggle(message_id, false);
        tracker.toggle(message_id, false);
        assert!(tracker.is_empty());
    }

    #[test]
    fn toggle_is_ignored_while_inactive() {
        let mut tracker = SelectionTracker::new();
        tracker.toggle(MessageId::mint(), true);
        assert!(tracker.is_empty());
    }

    #[test]
    fn select_all_then_take_consumes_exact_set() {
        let mut tracker = active_tracker();
        let ids = (0..4).map(|_| MessageId::mint()).collect::<HashSet<_>>();

        tracker.select_all(ids.iter().copied());
        assert_eq!(tracker.len(), ids.len());

        let consumed = tracker.take_selected();
        assert_eq!(consumed, ids);
        assert!(tracker.is_empty());
    }

    #[test]
    fn select_all_replaces_previous_selection() {
        let mut tracker = active_tracker();
        let stale = MessageId::mint();
        tracker.toggle(stale, true);

        let replacement = vec![MessageId::mint(), MessageId::mint()];
        tracker.select_all(replacement.iter().copied());

        assert_eq!(tracker.len(), 2);
        assert!(!tracker.contains(stale));
    }

    #[test]
    fn select_none_empties_the_set() {
        let mut tracker = active_tracker();
        tracker.toggle(MessageId::mint(), true);

        tracker.select_none();
        assert!(tracker.is_empty());
    }

    #[test]
    fn leaving_selection_mode_discards_the_set() {
        let mut tracker = active_tracker();
        tracker.toggle(MessageId::mint(), true);

        tracker.set_active(false);
        assert!(tracker.is_empty());

        tracker.set_active(true);
        assert!(tracker.is_empty());
    }

    #[test]
    fn conversation_switch_clears_selection_unconditionally() {
        let mut tracker = active_tracker();
        let conversation_a = ConversationId::mint();
        let conversation_b = ConversationId::mint();

        tracker.sync_conversation(Some(conversation_a));
        tracker.toggle(MessageId::mint(), true);
        tracker.toggle(MessageId::mint(), true);
        assert_eq!(tracker.len(), 2);

        tracker.sync_conversation(Some(conversation_b));
        assert!(tracker.is_empty());
        assert_eq!(tracker.conversation_id(), Some(conversation_b));
    }

    #[test]
    fn sync_to_same_conversation_keeps_selection() {
        let mut tracker = active_tracker();
        let conversation_id = ConversationId::mint();
        tracker.sync_conversation(Some(conversation_id));
        tracker.toggle(MessageId::mint(), true);

        tracker.sync_conversation(Some(conversation_id));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn retain_existing_drops_stale_identifiers() {
        let mut tracker = active_tracker();
        let canonical = vec![
            Message::synthesized(Role::User, "kept"),
            Message::synthesized(Role::Assistant, "also kept"),
        ];
        let stale = MessageId::mint();

        tracker.select_all(canonical.iter().map(|message| message.id));
        tracker.toggle(stale, true);
        assert_eq!(tracker.len(), 3);

        tracker.retain_existing(&canonical);
        assert_eq!(tracker.len(), 2);
        assert!(!tracker.contains(stale));
    }
}
