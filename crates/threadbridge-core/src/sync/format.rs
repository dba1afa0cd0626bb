//! Text formatting for notes crossing between the two systems.

use crate::models::{ChatMessage, Note, CHAT_ORIGIN_TAG};

/// Chat text for a ticket note, prefixed with its author.
pub fn note_to_chat(note: &Note) -> String {
    format!("**{}**: {}", note.user.name, note.body.trim())
}

/// Ticket note body for a chat message.
///
/// Always starts with [`CHAT_ORIGIN_TAG`]. When the author could not be
/// matched to a ticket-store user (`attributed == false`) their chat display
/// name is embedded so the note stays traceable. Returns `None` for messages
/// with neither text nor attachments.
pub fn chat_to_note(message: &ChatMessage, attributed: bool) -> Option<String> {
    let content = message.content.trim();
    if content.is_empty() && message.attachments.is_empty() {
        return None;
    }

    let mut body = String::from(CHAT_ORIGIN_TAG);
    if !attributed {
        body.push(' ');
        body.push_str(message.author.display());
        body.push(':');
    }
    if !content.is_empty() {
        body.push(' ');
        body.push_str(content);
    }
    for url in &message.attachments {
        body.push('\n');
        body.push_str(url);
    }
    Some(body)
}
