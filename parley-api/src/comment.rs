use std::{fmt, str::FromStr};

use uuid::Uuid;

use crate::{Error, Reaction, RoomId, Time, UserId};

/// Ids starting with this prefix are minted locally and never come from the server
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommentId(String);

impl CommentId {
    /// Id of a comment the server has not confirmed yet. It is derived from the
    /// correlation key, so both can be recovered from one another.
    pub fn local(key: ClientKey) -> CommentId {
        let mut buf = Uuid::encode_buffer();
        CommentId(format!(
            "{LOCAL_ID_PREFIX}{}",
            key.0.as_hyphenated().encode_lower(&mut buf)
        ))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn client_key(&self) -> Option<ClientKey> {
        self.0
            .strip_prefix(LOCAL_ID_PREFIX)
            .and_then(|k| Uuid::try_parse(k).ok())
            .map(ClientKey)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommentId {
    type Error = Error;

    fn try_from(s: String) -> Result<CommentId, Error> {
        crate::validate_string(&s)?;
        if s.is_empty() || s.starts_with(LOCAL_ID_PREFIX) {
            return Err(Error::InvalidId(s));
        }
        Ok(CommentId(s))
    }
}

impl FromStr for CommentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<CommentId, Error> {
        CommentId::try_from(String::from(s))
    }
}

impl From<CommentId> for String {
    fn from(id: CommentId) -> String {
        id.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation key generated by the client on submission, echoed back by servers supporting it
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct ClientKey(pub Uuid);

impl ClientKey {
    pub fn new() -> ClientKey {
        ClientKey(Uuid::new_v4())
    }
}

impl Default for ClientKey {
    fn default() -> ClientKey {
        ClientKey::new()
    }
}

/// Lightweight reference to something mentioned in a comment, eg. a candidate
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedEntity {
    pub id: String,
    pub kind: String,
    pub label: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar: Option<String>,
    pub content: String,

    /// Set iff this comment is a reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,

    #[serde(default)]
    pub reactions: Vec<Reaction>,

    /// Only ever populated on top-level comments
    #[serde(default)]
    pub replies: Vec<Comment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tagged_entities: Vec<TaggedEntity>,

    pub created_at: Time,
    pub updated_at: Time,
    #[serde(default)]
    pub is_edited: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<ClientKey>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn has_reaction(&self, user: &UserId, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.user_id == *user && r.emoji == emoji)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_are_reserved() {
        let key = ClientKey::new();
        let local = CommentId::local(key);
        assert!(local.is_local());
        assert_eq!(local.client_key(), Some(key));

        // The same string coming from the wire is refused
        let err = serde_json::from_str::<CommentId>(&format!("\"{local}\"")).unwrap_err();
        assert!(err.to_string().contains("Invalid comment id"), "{err}");

        let server: CommentId = serde_json::from_str("\"c1\"").unwrap();
        assert!(!server.is_local());
        assert_eq!(server.client_key(), None);
        assert!("".parse::<CommentId>().is_err());
    }

    #[test]
    fn comment_wire_format() {
        let json = r#"{
            "id": "c1",
            "roomId": "job-42",
            "authorId": "u1",
            "authorName": "Ada",
            "content": "Hello",
            "createdAt": "2022-12-01T10:00:00Z",
            "updatedAt": "2022-12-01T10:00:00Z"
        }"#;
        let c: Comment = serde_json::from_str(json).unwrap();
        assert_eq!(c.id.as_str(), "c1");
        assert_eq!(c.room_id, RoomId(String::from("job-42")));
        assert!(c.reactions.is_empty());
        assert!(c.replies.is_empty());
        assert!(!c.is_edited);
        assert!(!c.is_reply());
        assert_eq!(c.client_key, None);
    }
}
