use serde::Serialize;
use tracing::warn;

use crate::backend::{RawDialog, RawMessage};
use crate::peer::{self, ChatKind, EntityClass};
use crate::sanitize::{sanitize_preview, sanitize_text};

/// A sanitized chat summary. `id` is the external peer-id form and the only
/// cross-component chat reference.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub kind: ChatKind,
    pub username: Option<String>,
    pub unread_count: u32,
    pub last_message: String,
    pub description: String,
}

/// A single fetched message. Never persisted; rebuilt from the backend on
/// every fetch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub date: i64,
    pub text: String,
    pub outbound: bool,
    pub sender_first_name: Option<String>,
}

/// Converts a raw dialog into a `Chat`, or `None` when the backend returned
/// no resolvable entity. One malformed dialog never aborts the listing.
pub fn format_dialog(dialog: &RawDialog) -> Option<Chat> {
    let Some(entity) = &dialog.entity else {
        warn!("dropping dialog without a resolvable entity");
        return None;
    };

    // Megagroups arrive channel-class (and keep the -100 id) but read as
    // groups in the UI.
    let kind = match entity.class {
        EntityClass::User => ChatKind::Private,
        EntityClass::Group => ChatKind::Group,
        EntityClass::Channel if entity.megagroup => ChatKind::Group,
        EntityClass::Channel => ChatKind::Channel,
    };

    Some(Chat {
        id: peer::encode(entity.id, entity.class),
        title: sanitize_text(&entity.title),
        kind,
        username: entity.username.clone().filter(|name| !name.is_empty()),
        unread_count: dialog.unread_count,
        last_message: sanitize_preview(dialog.last_message.as_deref().unwrap_or_default()),
        description: sanitize_text(&entity.about),
    })
}

pub fn format_message(raw: &RawMessage) -> Message {
    Message {
        date: raw.date,
        text: sanitize_text(&raw.text),
        outbound: raw.outbound,
        sender_first_name: raw
            .sender_first_name
            .as_deref()
            .map(sanitize_text)
            .filter(|name| !name.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawEntity;

    fn entity(id: i64, class: EntityClass) -> RawEntity {
        RawEntity {
            id,
            class,
            megagroup: false,
            title: "Title".to_string(),
            username: None,
            about: String::new(),
        }
    }

    #[test]
    fn entity_less_dialogs_format_to_none() {
        let dialog = RawDialog {
            entity: None,
            unread_count: 3,
            last_message: Some("hello".to_string()),
        };
        assert!(format_dialog(&dialog).is_none());
    }

    #[test]
    fn megagroups_read_as_groups_with_channel_ids() {
        let mut raw = entity(88, EntityClass::Channel);
        raw.megagroup = true;
        let dialog = RawDialog {
            entity: Some(raw),
            unread_count: 0,
            last_message: None,
        };
        let chat = format_dialog(&dialog).expect("chat");
        assert_eq!(chat.kind, ChatKind::Group);
        assert_eq!(chat.id, "-10088");
    }

    #[test]
    fn previews_are_sanitized_and_truncated() {
        let mut raw = entity(5, EntityClass::User);
        raw.title = "  Bu\u{0007}ddy ".to_string();
        let dialog = RawDialog {
            entity: Some(raw),
            unread_count: 1,
            last_message: Some("x".repeat(400)),
        };
        let chat = format_dialog(&dialog).expect("chat");
        assert_eq!(chat.title, "Buddy");
        assert_eq!(chat.kind, ChatKind::Private);
        assert_eq!(chat.last_message.chars().count(), 100);
    }

    #[test]
    fn messages_keep_date_and_direction() {
        let raw = RawMessage {
            date: 1_756_000_000,
            text: "hi\u{0000}!".to_string(),
            outbound: true,
            sender_first_name: Some("  ".to_string()),
        };
        let message = format_message(&raw);
        assert_eq!(message.date, 1_756_000_000);
        assert_eq!(message.text, "hi!");
        assert!(message.outbound);
        assert!(message.sender_first_name.is_none());
    }
}
