use std::fmt;

use crate::Time;

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn stub() -> UserId {
        UserId(String::from("stub-user"))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A participant, as announced when joining a room
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Identity {
    pub fn new(user_id: UserId, user_name: String) -> Identity {
        Identity {
            user_id,
            user_name,
            avatar: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Time>,
}

impl Presence {
    pub fn offline(who: &Identity) -> Presence {
        Presence {
            user_id: who.user_id.clone(),
            user_name: who.user_name.clone(),
            avatar: who.avatar.clone(),
            is_online: false,
            last_seen: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingState {
    pub user_id: UserId,
    pub user_name: String,
    pub is_typing: bool,
    pub expires_at: Time,
}
