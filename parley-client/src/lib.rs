mod backend;
pub use backend::{CommentsApi, Feed, FeedDriver, FeedEvent, Gateway};

mod comment;
pub use comment::CommentTree;

pub mod config;
pub use config::Config;

mod error;
pub use error::Error;

mod http;
pub use http::HttpApi;

mod order;
pub use order::OrderExt;

mod panel;
pub use panel::{PanelController, PanelEffect, PanelState};

mod presence;
pub use presence::PresenceTracker;

mod session;
pub use session::{Discussion, Reply, Submission, View};

mod store;
pub use store::{CommentStore, Delivery, Draft, ReactionChange};

mod typing;
pub use typing::TypingThrottle;

mod ws;
pub use ws::WsGateway;

#[cfg(test)]
mod fuzz;
#[cfg(test)]
mod test_util;

pub mod api {
    pub use parley_api::*;
}

pub mod prelude {
    pub use crate::{CommentTree, OrderExt};
}
