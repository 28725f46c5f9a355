use crate::{CommentId, Time, UserId};

#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct ReactionId(pub String);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: ReactionId,
    pub comment_id: CommentId,
    pub user_id: UserId,
    pub user_name: String,
    pub emoji: String,
    pub created_at: Time,
}

impl Reaction {
    /// Reactions are identified by this triple, whatever their id
    pub fn same_as(&self, comment: &CommentId, user: &UserId, emoji: &str) -> bool {
        self.comment_id == *comment && self.user_id == *user && self.emoji == emoji
    }
}
