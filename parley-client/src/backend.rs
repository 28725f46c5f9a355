use futures::{
    channel::{mpsc, oneshot},
    StreamExt,
};

use crate::api::{
    Comment, CommentId, EditComment, FeedMessage, GatewayMessage, Identity, NewComment,
    NewReaction, Reaction, RoomId,
};

/// The REST side of the comments service
#[async_trait::async_trait]
pub trait CommentsApi: Send + Sync {
    async fn fetch_comments(&self, room: &RoomId) -> anyhow::Result<Vec<Comment>>;
    async fn create_comment(&self, c: &NewComment) -> anyhow::Result<Comment>;
    async fn edit_comment(&self, id: &CommentId, e: &EditComment) -> anyhow::Result<Comment>;
    async fn delete_comment(&self, id: &CommentId) -> anyhow::Result<()>;
    async fn add_reaction(&self, id: &CommentId, r: &NewReaction) -> anyhow::Result<Reaction>;
    async fn remove_reaction(&self, id: &CommentId, emoji: &str) -> anyhow::Result<()>;
}

/// The realtime side of the comments service
pub trait Gateway: Send + Sync {
    /// Starts following `room` as `me`. The connection lives as long as the returned feed.
    fn connect(&self, room: &RoomId, me: &Identity) -> Feed;
}

#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    /// The room was joined. Sent again after each reconnection.
    Connected,
    Disconnected,
    Message(FeedMessage),
}

/// One room subscription, as seen by its user
pub struct Feed {
    room: RoomId,
    events: mpsc::UnboundedReceiver<FeedEvent>,
    outbound: mpsc::UnboundedSender<GatewayMessage>,

    // Dropping this ends the transport task, see `FeedDriver::cancelled`
    _canceller: oneshot::Receiver<()>,
}

/// One room subscription, as seen by the transport implementing it
pub struct FeedDriver {
    pub room: RoomId,
    pub events: mpsc::UnboundedSender<FeedEvent>,
    pub outbound: mpsc::UnboundedReceiver<GatewayMessage>,
    pub cancel: oneshot::Sender<()>,
}

impl Feed {
    pub fn new(room: RoomId) -> (Feed, FeedDriver) {
        let (events_tx, events_rx) = mpsc::unbounded();
        let (outbound_tx, outbound_rx) = mpsc::unbounded();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let feed = Feed {
            room: room.clone(),
            events: events_rx,
            outbound: outbound_tx,
            _canceller: cancel_rx,
        };
        let driver = FeedDriver {
            room,
            events: events_tx,
            outbound: outbound_rx,
            cancel: cancel_tx,
        };
        (feed, driver)
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// `None` once the transport gave up
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.next().await
    }

    pub fn send_typing(&self, is_typing: bool) {
        let msg = GatewayMessage::Typing {
            room_id: self.room.clone(),
            is_typing,
        };
        if self.outbound.unbounded_send(msg).is_err() {
            tracing::debug!(room = %self.room, "dropping typing signal, feed is closed");
        }
    }
}

impl FeedDriver {
    /// Returns false if the feed was dropped
    pub fn emit(&self, event: FeedEvent) -> bool {
        self.events.unbounded_send(event).is_ok()
    }

    /// Resolves once the feed got dropped
    pub async fn cancelled(&mut self) {
        self.cancel.cancellation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::room;

    #[tokio::test]
    async fn feed_plumbing() {
        let (mut feed, mut driver) = Feed::new(room());
        assert!(driver.emit(FeedEvent::Connected));
        assert_eq!(feed.next().await, Some(FeedEvent::Connected));

        feed.send_typing(true);
        assert_eq!(
            driver.outbound.next().await,
            Some(GatewayMessage::Typing {
                room_id: room(),
                is_typing: true,
            })
        );

        drop(feed);
        driver.cancelled().await;
        assert!(!driver.emit(FeedEvent::Disconnected));
    }
}
