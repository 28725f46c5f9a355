use crate::api::{self, CommentId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("realtime gateway unavailable")]
    Transport(#[source] anyhow::Error),

    #[error("request to the comments service failed")]
    Request(#[source] anyhow::Error),

    #[error("failed refreshing the discussion")]
    Refresh(#[source] anyhow::Error),

    #[error(transparent)]
    Invalid(#[from] api::Error),

    #[error("comment {0} is not known")]
    UnknownComment(CommentId),

    #[error("comment {0} is not confirmed by the server yet")]
    Unconfirmed(CommentId),

    #[error("replies can only be made to top-level comments")]
    NestedReply,

    #[error("the discussion panel is closed")]
    PanelClosed,

    #[error("the discussion session is gone")]
    SessionGone,
}

impl Error {
    /// The error the server answered with, if the request reached it
    pub fn api_error(&self) -> Option<&api::Error> {
        match self {
            Error::Invalid(e) => Some(e),
            Error::Request(e) | Error::Refresh(e) => e.downcast_ref::<api::Error>(),
            _ => None,
        }
    }
}
