use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::{OptionExt, ResultExt};

use loqui_core::{Conversation, ConversationId, Message, MessageId, MessagePatch, Role};

use super::error::{
    CreateStoreDirectorySnafu, ParseStoreLineSnafu, ParseStoredIdSnafu, ParseStoredNumberSnafu,
    ReadStoreSnafu, StorageResult, UnknownConversationSnafu, UnknownMessageSnafu, WriteStoreSnafu,
};

const CONVERSATIONS_FILE_NAME: &str = "conversations.tsv";
const MESSAGES_FILE_NAME: &str = "messages.tsv";
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Rough token estimate used for the conversation aggregate count.
///
/// Four characters per token is the conventional approximation; the count is
/// presentation metadata, not billing truth.
pub fn estimate_token_count(content: &str) -> u64 {
    (content.chars().count() as u64).div_ceil(4)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConversationRow {
    id: ConversationId,
    updated_at_unix_seconds: u64,
    title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MessageRow {
    id: MessageId,
    conversation_id: ConversationId,
    seq: u64,
    role: Role,
    content: String,
}

/// TSV-file-backed conversation store.
///
/// Two files under one root directory: one row per conversation and one row
/// per message, rewritten wholesale on every mutation. Small-history chat
/// archives do not justify anything heavier.
#[derive(Debug, Clone)]
pub struct TsvConversationStore {
    root: PathBuf,
}

impl TsvConversationStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn conversations_path(&self) -> PathBuf {
        self.root.join(CONVERSATIONS_FILE_NAME)
    }

    fn messages_path(&self) -> PathBuf {
        self.root.join(MESSAGES_FILE_NAME)
    }

    pub fn create_conversation(&self, title: impl Into<String>) -> StorageResult<Conversation> {
        let mut title = title.into();
        if title.trim().is_empty() {
            title = DEFAULT_CONVERSATION_TITLE.to_string();
        }

        let row = ConversationRow {
            id: ConversationId::mint(),
            updated_at_unix_seconds: current_unix_timestamp_seconds(),
            title,
        };

        let mut conversations = self.read_conversation_rows()?;
        conversations.push(row.clone());
        self.write_conversation_rows(&conversations)?;

        let mut created = Conversation::new(row.id, row.title);
        created.updated_at_unix_seconds = row.updated_at_unix_seconds;
        Ok(created)
    }

    /// Lists all conversations with their messages, most recently updated
    /// first.
    pub fn list_conversations(&self) -> StorageResult<Vec<Conversation>> {
        let mut conversations = self.read_conversation_rows()?;
        conversations.sort_by(sort_by_recent_desc);

        let messages = self.read_message_rows()?;
        Ok(conversations
            .into_iter()
            .map(|row| assemble_conversation(row, &messages))
            .collect())
    }

    pub fn load_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Option<Conversation>> {
        let Some(row) = self
            .read_conversation_rows()?
            .into_iter()
            .find(|row| row.id == conversation_id)
        else {
            return Ok(None);
        };

        let messages = self.read_message_rows()?;
        Ok(Some(assemble_conversation(row, &messages)))
    }

    /// Appends one message to the end of a conversation's canonical sequence.
    pub fn append_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        content: impl Into<String>,
    ) -> StorageResult<Message> {
        let mut conversations = self.read_conversation_rows()?;
        let conversation = conversations
            .iter_mut()
            .find(|row| row.id == conversation_id)
            .context(UnknownConversationSnafu {
                stage: "append-message-find-conversation",
                conversation_id,
            })?;
        conversation.updated_at_unix_seconds = current_unix_timestamp_seconds();

        let mut messages = self.read_message_rows()?;
        let next_seq = messages
            .iter()
            .filter(|row| row.conversation_id == conversation_id)
            .map(|row| row.seq)
            .max()
            .unwrap_or(0)
            .saturating_add(1);

        let appended = MessageRow {
            id: MessageId::mint(),
            conversation_id,
            seq: next_seq,
            role,
            content: content.into(),
        };
        messages.push(appended.clone());

        self.write_message_rows(&messages)?;
        self.write_conversation_rows(&conversations)?;

        Ok(Message::new(appended.id, appended.role, appended.content))
    }

    /// Removes one message; removing an already-absent identifier succeeds.
    pub fn remove_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> StorageResult<()> {
        let mut messages = self.read_message_rows()?;
        let before = messages.len();
        messages
            .retain(|row| !(row.conversation_id == conversation_id && row.id == message_id));

        if messages.len() == before {
            tracing::debug!(
                conversation_id = %conversation_id,
                message_id = %message_id,
                "delete of absent message treated as no-op"
            );
            return Ok(());
        }

        self.write_message_rows(&messages)?;
        self.touch_conversation(conversation_id)?;
        Ok(())
    }

    /// Applies a content/role patch to one message in place.
    pub fn patch_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        patch: MessagePatch,
        touch_updated_at: bool,
    ) -> StorageResult<()> {
        let conversations = self.read_conversation_rows()?;
        if !conversations.iter().any(|row| row.id == conversation_id) {
            return UnknownConversationSnafu {
                stage: "patch-message-find-conversation",
                conversation_id,
            }
            .fail();
        }

        let mut messages = self.read_message_rows()?;
        let target = messages
            .iter_mut()
            .find(|row| row.conversation_id == conversation_id && row.id == message_id)
            .context(UnknownMessageSnafu {
                stage: "patch-message-find-message",
                conversation_id,
                message_id,
            })?;

        if let Some(content) = patch.content {
            target.content = content;
        }
        if let Some(role) = patch.role {
            target.role = role;
        }

        self.write_message_rows(&messages)?;
        if touch_updated_at {
            self.touch_conversation(conversation_id)?;
        }
        Ok(())
    }

    fn touch_conversation(&self, conversation_id: ConversationId) -> StorageResult<()> {
        let mut conversations = self.read_conversation_rows()?;
        if let Some(row) = conversations
            .iter_mut()
            .find(|row| row.id == conversation_id)
        {
            row.updated_at_unix_seconds = current_unix_timestamp_seconds();
            self.write_conversation_rows(&conversations)?;
        }
        Ok(())
    }

    fn read_conversation_rows(&self) -> StorageResult<Vec<ConversationRow>> {
        let path = self.conversations_path();
        let text = read_store_text(&path)?;
        let mut rows = Vec::new();

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            rows.push(parse_conversation_line(&path, line, index + 1)?);
        }

        Ok(rows)
    }

    fn read_message_rows(&self) -> StorageResult<Vec<MessageRow>> {
        let path = self.messages_path();
        let text = read_store_text(&path)?;
        let mut rows = Vec::new();

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            rows.push(parse_message_line(&path, line, index + 1)?);
        }

        // Seq assignment is monotonic per conversation, so a stable sort keeps
        // canonical chronological order even if the file was edited by hand.
        rows.sort_by_key(|row| row.seq);
        Ok(rows)
    }

    fn write_conversation_rows(&self, rows: &[ConversationRow]) -> StorageResult<()> {
        let mut serialized = String::new();
        for row in rows {
            serialized.push_str(&row.id.to_string());
            serialized.push('\t');
            serialized.push_str(&row.updated_at_unix_seconds.to_string());
            serialized.push('\t');
            serialized.push_str(&encode_field(&row.title));
            serialized.push('\n');
        }

        self.write_store_text(&self.conversations_path(), serialized)
    }

    fn write_message_rows(&self, rows: &[MessageRow]) -> StorageResult<()> {
        let mut serialized = String::new();
        for row in rows {
            serialized.push_str(&row.id.to_string());
            serialized.push('\t');
            serialized.push_str(&row.conversation_id.to_string());
            serialized.push('\t');
            serialized.push_str(&row.seq.to_string());
            serialized.push('\t');
            serialized.push_str(&encode_field(row.role.as_str()));
            serialized.push('\t');
            serialized.push_str(&encode_field(&row.content));
            serialized.push('\n');
        }

        self.write_store_text(&self.messages_path(), serialized)
    }

    fn write_store_text(&self, path: &Path, serialized: String) -> StorageResult<()> {
        std::fs::create_dir_all(&self.root).context(CreateStoreDirectorySnafu {
            stage: "create-store-directory",
            path: display_path(&self.root),
        })?;

        std::fs::write(path, serialized).context(WriteStoreSnafu {
            stage: "write-store-file",
            path: display_path(path),
        })
    }
}

fn read_store_text(path: &Path) -> StorageResult<String> {
    if !path.exists() {
        return Ok(String::new());
    }

    std::fs::read_to_string(path).context(ReadStoreSnafu {
        stage: "read-store-file",
        path: display_path(path),
    })
}

fn assemble_conversation(row: ConversationRow, messages: &[MessageRow]) -> Conversation {
    let mut conversation = Conversation::new(row.id, row.title);
    conversation.updated_at_unix_seconds = row.updated_at_unix_seconds;

    for message in messages {
        if message.conversation_id == row.id {
            conversation.token_count += estimate_token_count(&message.content);
            conversation.messages.push(Message::new(
                message.id,
                message.role.clone(),
                message.content.clone(),
            ));
        }
    }

    conversation
}

fn parse_conversation_line(
    path: &Path,
    line: &str,
    line_number: usize,
) -> StorageResult<ConversationRow> {
    let mut fields = line.splitn(3, '\t');
    let raw_id = next_field(&mut fields, path, line, line_number, "id")?;
    let raw_updated_at = next_field(&mut fields, path, line, line_number, "updated-at")?;
    let raw_title = next_field(&mut fields, path, line, line_number, "title")?;

    Ok(ConversationRow {
        id: ConversationId::parse(raw_id).context(ParseStoredIdSnafu {
            stage: "parse-conversation-id",
            raw: raw_id.to_string(),
        })?,
        updated_at_unix_seconds: raw_updated_at.parse::<u64>().context(
            ParseStoredNumberSnafu {
                stage: "parse-conversation-updated-at",
                raw: raw_updated_at.to_string(),
            },
        )?,
        title: decode_field(raw_title),
    })
}

fn parse_message_line(path: &Path, line: &str, line_number: usize) -> StorageResult<MessageRow> {
    let mut fields = line.splitn(5, '\t');
    let raw_id = next_field(&mut fields, path, line, line_number, "id")?;
    let raw_conversation_id =
        next_field(&mut fields, path, line, line_number, "conversation-id")?;
    let raw_seq = next_field(&mut fields, path, line, line_number, "seq")?;
    let raw_role = next_field(&mut fields, path, line, line_number, "role")?;
    let raw_content = next_field(&mut fields, path, line, line_number, "content")?;

    Ok(MessageRow {
        id: MessageId::parse(raw_id).context(ParseStoredIdSnafu {
            stage: "parse-message-id",
            raw: raw_id.to_string(),
        })?,
        conversation_id: ConversationId::parse(raw_conversation_id).context(
            ParseStoredIdSnafu {
                stage: "parse-message-conversation-id",
                raw: raw_conversation_id.to_string(),
            },
        )?,
        seq: raw_seq.parse::<u64>().context(ParseStoredNumberSnafu {
            stage: "parse-message-seq",
            raw: raw_seq.to_string(),
        })?,
        role: Role::parse(&decode_field(raw_role)),
        content: decode_field(raw_content),
    })
}

fn next_field<'line>(
    fields: &mut impl Iterator<Item = &'line str>,
    path: &Path,
    line: &str,
    line_number: usize,
    stage_suffix: &'static str,
) -> StorageResult<&'line str> {
    fields.next().context(ParseStoreLineSnafu {
        stage: stage_suffix,
        path: display_path(path),
        line_number,
        line: line.to_string(),
    })
}

fn sort_by_recent_desc(left: &ConversationRow, right: &ConversationRow) -> Ordering {
    right
        .updated_at_unix_seconds
        .cmp(&left.updated_at_unix_seconds)
        .then_with(|| right.id.cmp(&left.id))
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

// Escape variable-text fields so a TSV payload stays deterministic and
// line-safe.
fn encode_field(field: &str) -> String {
    let mut encoded = String::with_capacity(field.len());

    for character in field.chars() {
        match character {
            '\\' => encoded.push_str("\\\\"),
            '\n' => encoded.push_str("\\n"),
            '\t' => encoded.push_str("\\t"),
            '\r' => encoded.push_str("\\r"),
            _ => encoded.push(character),
        }
    }

    encoded
}

fn decode_field(encoded: &str) -> String {
    let mut decoded = String::with_capacity(encoded.len());
    let mut characters = encoded.chars();

    while let Some(character) = characters.next() {
        if character != '\\' {
            decoded.push(character);
            continue;
        }

        match characters.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('r') => decoded.push('\r'),
            Some('\\') => decoded.push('\\'),
            Some(other) => {
                decoded.push('\\');
                decoded.push(other);
            }
            None => decoded.push('\\'),
        }
    }

    decoded
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempStore {
        store: TsvConversationStore,
    }

    impl TempStore {
        fn new(label: &str) -> Self {
            let root = std::env::temp_dir()
                .join("loqui-storage-tests")
                .join(format!("{label}-{}", ConversationId::mint()));
            Self {
                store: TsvConversationStore::new(root),
            }
        }
    }

    impl Drop for TempStore {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(self.store.root());
        }
    }

    #[test]
    fn append_and_reload_preserves_canonical_order() {
        let temp = TempStore::new("order");
        let conversation = temp.store.create_conversation("ordering").unwrap();

        let first = temp
            .store
            .append_message(conversation.id, Role::User, "first")
            .unwrap();
        let second = temp
            .store
            .append_message(conversation.id, Role::Assistant, "second")
            .unwrap();

        // A fresh store over the same root must see the same canonical order.
        let reopened = TsvConversationStore::new(temp.store.root().to_path_buf());
        let loaded = reopened.load_conversation(conversation.id).unwrap().unwrap();

        assert_eq!(
            loaded.messages,
            vec![
                Message::new(first.id, Role::User, "first"),
                Message::new(second.id, Role::Assistant, "second"),
            ]
        );
    }

    #[test]
    fn escaped_content_roundtrips_exactly() {
        let temp = TempStore::new("escaping");
        let conversation = temp.store.create_conversation("escaping").unwrap();
        let tricky = "line one\nline two\twith tab\\and backslash\rdone";

        temp.store
            .append_message(conversation.id, Role::User, tricky)
            .unwrap();

        let loaded = temp
            .store
            .load_conversation(conversation.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.messages[0].content, tricky);
    }

    #[test]
    fn unknown_role_tag_survives_storage() {
        let temp = TempStore::new("role-tag");
        let conversation = temp.store.create_conversation("roles").unwrap();

        temp.store
            .append_message(conversation.id, Role::Other("tool".to_string()), "output")
            .unwrap();

        let loaded = temp
            .store
            .load_conversation(conversation.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.messages[0].role, Role::Other("tool".to_string()));
    }

    #[test]
    fn remove_message_is_idempotent_per_identifier() {
        let temp = TempStore::new("idempotent-delete");
        let conversation = temp.store.create_conversation("deleting").unwrap();
        let kept = temp
            .store
            .append_message(conversation.id, Role::User, "kept")
            .unwrap();
        let dropped = temp
            .store
            .append_message(conversation.id, Role::User, "dropped")
            .unwrap();

        temp.store.remove_message(conversation.id, dropped.id).unwrap();
        temp.store.remove_message(conversation.id, dropped.id).unwrap();

        let loaded = temp
            .store
            .load_conversation(conversation.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].id, kept.id);
    }

    #[test]
    fn patch_message_edits_content_and_role_in_place() {
        let temp = TempStore::new("patching");
        let conversation = temp.store.create_conversation("patching").unwrap();
        temp.store
            .append_message(conversation.id, Role::User, "before")
            .unwrap();
        let target = temp
            .store
            .append_message(conversation.id, Role::User, "original")
            .unwrap();

        temp.store
            .patch_message(
                conversation.id,
                target.id,
                MessagePatch {
                    content: Some("edited".to_string()),
                    role: Some(Role::Assistant),
                },
                true,
            )
            .unwrap();

        let loaded = temp
            .store
            .load_conversation(conversation.id)
            .unwrap()
            .unwrap();
        // Identifier and relative order never change on edit.
        assert_eq!(loaded.messages[1].id, target.id);
        assert_eq!(loaded.messages[1].content, "edited");
        assert_eq!(loaded.messages[1].role, Role::Assistant);
    }

    #[test]
    fn patch_unknown_message_is_an_error() {
        let temp = TempStore::new("patch-missing");
        let conversation = temp.store.create_conversation("patching").unwrap();

        let result = temp.store.patch_message(
            conversation.id,
            MessageId::mint(),
            MessagePatch::content("never lands"),
            false,
        );
        assert!(matches!(
            result,
            Err(crate::error::StorageError::UnknownMessage { .. })
        ));
    }

    #[test]
    fn token_count_aggregates_message_contents() {
        let temp = TempStore::new("token-count");
        let conversation = temp.store.create_conversation("tokens").unwrap();

        temp.store
            .append_message(conversation.id, Role::User, "abcd")
            .unwrap();
        temp.store
            .append_message(conversation.id, Role::Assistant, "abcdefgh")
            .unwrap();

        let loaded = temp
            .store
            .load_conversation(conversation.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.token_count, estimate_token_count("abcd") + estimate_token_count("abcdefgh"));
        assert_eq!(loaded.token_count, 3);
    }

    #[test]
    fn blank_title_falls_back_to_default() {
        let temp = TempStore::new("default-title");
        let conversation = temp.store.create_conversation("   ").unwrap();
        assert_eq!(conversation.title, DEFAULT_CONVERSATION_TITLE);
    }

    #[test]
    fn list_orders_most_recently_updated_first() {
        let temp = TempStore::new("listing");
        let older = temp.store.create_conversation("older").unwrap();
        let newer = temp.store.create_conversation("newer").unwrap();

        // Touch the first conversation so it becomes the most recent.
        temp.store
            .append_message(older.id, Role::User, "bump")
            .unwrap();

        let listed = temp.store.list_conversations().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].updated_at_unix_seconds >= listed[1].updated_at_unix_seconds);
        let listed_ids = listed
            .iter()
            .map(|conversation| conversation.id)
            .collect::<Vec<_>>();
        assert!(listed_ids.contains(&older.id) && listed_ids.contains(&newer.id));
    }
}
