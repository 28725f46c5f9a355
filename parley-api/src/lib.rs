use std::fmt;

use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod auth;
pub use auth::AuthToken;

mod comment;
pub use comment::{ClientKey, Comment, CommentId, TaggedEntity, LOCAL_ID_PREFIX};

mod error;
pub use error::Error;

mod feed;
pub use feed::{
    CommentDeleted, FeedMessage, GatewayMessage, PresenceUpdate, ReactionRemoved, UserLeft,
    UserTyping,
};

mod reaction;
pub use reaction::{Reaction, ReactionId};

mod request;
pub use request::{EditComment, NewComment, NewReaction};

mod user;
pub use user::{Identity, Presence, TypingState, UserId};

/// Collaboration scope of one job's discussion thread
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn stub() -> RoomId {
        RoomId(String::from("stub-room"))
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Strings coming from the network get forwarded to other participants, so NUL bytes are refused
// early on rather than letting every consumer deal with them.
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Validates user-written text: must not be blank once trimmed
pub fn validate_text(s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.trim().is_empty() {
        return Err(Error::EmptyComment);
    }
    Ok(())
}
