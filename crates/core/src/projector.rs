use snafu::OptionExt;

use super::error::{CoreResult, TruncateTargetMissingSnafu};
use super::ids::MessageId;
use super::message::{Message, Role};

/// Read-only, reverse-ordered projection of a conversation's canonical
/// messages.
///
/// The newest message sits at index zero so renderers can pin the latest entry
/// at the bottom and grow the list upward. Recomputed from the canonical
/// snapshot on every read; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplaySequence {
    entries: Vec<Message>,
}

impl DisplaySequence {
    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derives the display sequence from the canonical message list.
///
/// Messages tagged `system` are dropped unless `show_system` is set; the
/// result is strictly reversed. Pure function of its inputs, safe to call on
/// every render pass.
pub fn project(canonical: &[Message], show_system: bool) -> DisplaySequence {
    let entries = canonical
        .iter()
        .filter(|message| show_system || !message.role.is_system())
        .rev()
        .cloned()
        .collect();

    DisplaySequence { entries }
}

/// Computes the contiguous prefix of `canonical` ending at the target message
/// plus `offset`.
///
/// A negative offset cuts before the target; a positive offset keeps trailing
/// messages after it (e.g. the assistant reply that followed). An out-of-range
/// `position + offset` clamps to an empty or full-length prefix instead of
/// failing, so replaying from the very first or last message stays total.
///
/// Unknown targets are a caller bug and fail loudly: silently returning a
/// wrong prefix would re-submit a corrupted history.
pub fn truncate_at(
    canonical: &[Message],
    target_id: MessageId,
    offset: i64,
) -> CoreResult<Vec<Message>> {
    let position = canonical
        .iter()
        .position(|message| message.id == target_id)
        .context(TruncateTargetMissingSnafu {
            stage: "truncate-locate-target",
            message_id: target_id,
        })?;

    let last_index = canonical.len() as i64 - 1;
    let requested_cut = position as i64 + offset;
    let cut = requested_cut.clamp(-1, last_index);
    if cut != requested_cut {
        tracing::debug!(
            target_id = %target_id,
            requested_cut,
            cut,
            "truncation cut point clamped to canonical bounds"
        );
    }

    if cut < 0 {
        return Ok(Vec::new());
    }

    Ok(canonical[..=cut as usize].to_vec())
}

/// Returns `history` extended with one synthesized, unpersisted message.
pub fn append_ephemeral(history: &[Message], role: Role, content: impl Into<String>) -> Vec<Message> {
    let mut extended = history.to_vec();
    extended.push(Message::synthesized(role, content));
    extended
}
