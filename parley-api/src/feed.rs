use crate::{Comment, CommentId, Identity, Reaction, RoomId, Time, UserId};

/// Entry of a `presenceUpdate` broadcast
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Time>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Time>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub user_id: UserId,
    pub user_name: String,
    pub is_typing: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeleted {
    pub comment_id: CommentId,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRemoved {
    pub comment_id: CommentId,
    pub emoji: String,
    pub user_id: UserId,
}

/// Messages pushed by the realtime gateway to every participant of a room
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum FeedMessage {
    Pong,
    PresenceUpdate(Vec<PresenceUpdate>),
    UserJoined(Identity),
    UserLeft(UserLeft),
    UserTyping(UserTyping),
    NewComment(Comment),
    CommentUpdated(Comment),
    CommentDeleted(CommentDeleted),
    NewReaction(Reaction),
    ReactionRemoved(ReactionRemoved),
}

impl FeedMessage {
    /// Whether this message changes the comment tree, as opposed to presence or keepalive
    pub fn is_comment_delta(&self) -> bool {
        matches!(
            self,
            FeedMessage::NewComment(_)
                | FeedMessage::CommentUpdated(_)
                | FeedMessage::CommentDeleted(_)
                | FeedMessage::NewReaction(_)
                | FeedMessage::ReactionRemoved(_)
        )
    }
}

/// Messages sent by a participant to the realtime gateway
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayMessage {
    Ping,
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomId,
        identity: Identity,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    Typing { room_id: RoomId, is_typing: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_wire_format() {
        let msg: FeedMessage = serde_json::from_str(
            r#"{"type":"reactionRemoved","data":{"commentId":"c1","emoji":"👍","userId":"u1"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            FeedMessage::ReactionRemoved(ReactionRemoved {
                comment_id: "c1".parse().unwrap(),
                emoji: String::from("👍"),
                user_id: UserId(String::from("u1")),
            })
        );
        assert!(msg.is_comment_delta());

        let pong: FeedMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(pong, FeedMessage::Pong);
        assert!(!pong.is_comment_delta());
    }

    #[test]
    fn gateway_wire_format() {
        let msg = GatewayMessage::Typing {
            room_id: RoomId(String::from("job-1")),
            is_typing: true,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({
                "type": "typing",
                "data": { "roomId": "job-1", "isTyping": true },
            })
        );
    }
}
