use chrono::{Duration, TimeZone, Utc};

use crate::api::{Comment, CommentId, Identity, Reaction, ReactionId, RoomId, Time, UserId};

pub fn t(secs: i64) -> Time {
    Utc.timestamp_opt(1_670_000_000, 0).unwrap() + Duration::seconds(secs)
}

pub fn id(s: &str) -> CommentId {
    s.parse().unwrap()
}

pub fn user(s: &str) -> UserId {
    UserId(String::from(s))
}

pub fn identity(s: &str) -> Identity {
    Identity::new(user(s), format!("User {s}"))
}

pub fn room() -> RoomId {
    RoomId(String::from("job-1"))
}

pub fn comment(comment_id: &str, author: &str, secs: i64) -> Comment {
    Comment {
        id: id(comment_id),
        room_id: room(),
        author_id: user(author),
        author_name: format!("User {author}"),
        author_avatar: None,
        content: format!("content of {comment_id}"),
        parent_id: None,
        reactions: Vec::new(),
        replies: Vec::new(),
        tagged_entities: Vec::new(),
        created_at: t(secs),
        updated_at: t(secs),
        is_edited: false,
        client_key: None,
    }
}

pub fn reply(comment_id: &str, parent: &str, author: &str, secs: i64) -> Comment {
    Comment {
        parent_id: Some(id(parent)),
        ..comment(comment_id, author, secs)
    }
}

pub fn reaction(reaction_id: &str, comment_id: &str, by: &str, emoji: &str) -> Reaction {
    Reaction {
        id: ReactionId(String::from(reaction_id)),
        comment_id: id(comment_id),
        user_id: user(by),
        user_name: format!("User {by}"),
        emoji: String::from(emoji),
        created_at: t(0),
    }
}
