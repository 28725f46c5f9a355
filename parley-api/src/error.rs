use anyhow::{anyhow, Context};
use serde_json::json;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Comment is empty")]
    EmptyComment,

    #[error("Reaction has no emoji")]
    EmptyEmoji,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid comment id {0:?}")]
    InvalidId(String),
}

impl Error {
    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NotFound(what) => json!({
                "message": "not found",
                "type": "not-found",
                "what": what,
            }),
            Error::EmptyComment => json!({
                "message": "comment is empty",
                "type": "empty-comment",
            }),
            Error::EmptyEmoji => json!({
                "message": "reaction has no emoji",
                "type": "empty-emoji",
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidId(id) => json!({
                "message": "invalid comment id",
                "type": "invalid-id",
                "id": id,
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| {
            data.get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error contents lack the {name:?} field"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(field("message").unwrap_or_default()),
                "permission-denied" => Error::PermissionDenied,
                "not-found" => Error::NotFound(field("what")?),
                "empty-comment" => Error::EmptyComment,
                "empty-emoji" => Error::EmptyEmoji,
                "null-byte" => Error::NullByteInString(field("string")?),
                "invalid-id" => Error::InvalidId(field("id")?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
