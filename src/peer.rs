use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Backend-native entity class, as reported by the protocol client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityClass {
    User,
    Group,
    Channel,
}

/// Externally visible chat classification, recoverable from the id prefix
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

/// Encodes a backend entity id into the stable external chat-id form used
/// everywhere across this crate and by deep links:
/// channel-class entities (broadcast channels and megagroups alike) take
/// `-100<id>`, legacy basic groups take `-<id>`, users keep the bare id.
pub fn encode(entity_id: i64, class: EntityClass) -> String {
    match class {
        EntityClass::Channel => format!("-100{entity_id}"),
        EntityClass::Group => format!("-{entity_id}"),
        EntityClass::User => entity_id.to_string(),
    }
}

/// Inverse classification by prefix, for when no entity lookup is at hand.
pub fn decode_kind(chat_id: &str) -> ChatKind {
    if chat_id.starts_with("-100") {
        ChatKind::Channel
    } else if chat_id.starts_with('-') {
        ChatKind::Group
    } else {
        ChatKind::Private
    }
}

/// Persisted form of a folder member, `{type, id}` with the id already
/// encoded externally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerRef {
    #[serde(rename = "type")]
    pub kind: PeerKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    User,
    Channel,
    Chat,
}

impl PeerRef {
    pub fn new(entity_id: i64, class: EntityClass) -> Self {
        let kind = match class {
            EntityClass::User => PeerKind::User,
            EntityClass::Channel => PeerKind::Channel,
            EntityClass::Group => PeerKind::Chat,
        };
        Self {
            kind,
            id: encode(entity_id, class),
        }
    }
}

/// Maps a chat id plus optional username to the native-client URI that
/// opens it. Usernames win; otherwise the template follows the same prefix
/// rules as `decode_kind`.
pub fn deep_link(chat_id: &str, username: Option<&str>) -> String {
    if let Some(username) = username.filter(|name| !name.is_empty()) {
        let domain: String = url::form_urlencoded::byte_serialize(username.as_bytes()).collect();
        return format!("tg://resolve?domain={domain}");
    }
    if let Some(channel_id) = chat_id.strip_prefix("-100") {
        return format!("tg://privatepost?channel={channel_id}");
    }
    if let Some(group_id) = chat_id.strip_prefix('-') {
        return format!("tg://group?id={group_id}");
    }
    format!("tg://user?id={chat_id}")
}

/// Renders the login URI encoded into the QR image shown during the
/// handshake.
pub fn login_uri(token: &[u8]) -> String {
    format!("tg://login?token={}", URL_SAFE_NO_PAD.encode(token))
}
