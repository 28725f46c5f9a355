use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::Utc;
use futures::{channel::mpsc, StreamExt};
use parley_client::{
    api::{
        Comment, CommentDeleted, CommentId, EditComment, Error, FeedMessage, GatewayMessage,
        Identity, NewComment, NewReaction, PresenceUpdate, Reaction, ReactionId,
        ReactionRemoved, RoomId, UserId, UserLeft, UserTyping,
    },
    CommentsApi, Feed, FeedEvent, Gateway,
};
use tokio::sync::Mutex;

pub type Shared = Arc<Mutex<MockServer>>;

/// In-memory comments service, relaying every change to the participants of the room
#[derive(Debug, Default)]
pub struct MockServer {
    rooms: BTreeMap<RoomId, Room>,
    next_id: u64,
    next_conn: u64,

    /// Fail every request as if the service was down
    offline: bool,

    /// Whether created comments carry back the correlation key they were created with
    echo_client_key: bool,

    /// Time taken by each request to reach the server
    latency: Duration,
}

#[derive(Debug, Default)]
struct Room {
    // replies are stored flat, next to the comments they answer
    comments: Vec<Comment>,
    members: Vec<Member>,
    typing_signals: Vec<(UserId, bool)>,
}

#[derive(Debug)]
struct Member {
    conn: u64,
    identity: Identity,
    feed: mpsc::UnboundedSender<FeedEvent>,
}

impl Room {
    fn relay(&self, msg: FeedMessage) {
        self.relay_except(None, msg)
    }

    // Members are only removed when their connection task leaves, so that departures always
    // get announced
    fn relay_except(&self, except: Option<u64>, msg: FeedMessage) {
        for m in self.members.iter().filter(|m| Some(m.conn) != except) {
            let _ = m.feed.unbounded_send(FeedEvent::Message(msg.clone()));
        }
    }

    fn find_mut(&mut self, id: &CommentId) -> Result<&mut Comment, Error> {
        self.comments
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn presence(&self) -> Vec<PresenceUpdate> {
        let mut res: Vec<PresenceUpdate> = Vec::new();
        for m in self.members.iter() {
            if !res.iter().any(|p| p.user_id == m.identity.user_id) {
                res.push(PresenceUpdate {
                    user_id: m.identity.user_id.clone(),
                    user_name: Some(m.identity.user_name.clone()),
                    is_online: true,
                    last_seen: None,
                });
            }
        }
        res
    }

    fn tree(&self) -> Vec<Comment> {
        let mut res = self
            .comments
            .iter()
            .filter(|c| c.parent_id.is_none())
            .cloned()
            .collect::<Vec<_>>();
        for c in res.iter_mut() {
            c.replies = self
                .comments
                .iter()
                .filter(|r| r.parent_id.as_ref() == Some(&c.id))
                .cloned()
                .collect();
        }
        res
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::default()
    }

    pub fn shared(self) -> Shared {
        Arc::new(Mutex::new(self))
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn set_echo_client_key(&mut self, echo: bool) {
        self.echo_client_key = echo;
    }

    pub fn set_latency(&mut self, latency: Duration) {
        self.latency = latency;
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn check_online(&self) -> Result<(), Error> {
        match self.offline {
            true => Err(Error::Unknown(String::from("service unavailable"))),
            false => Ok(()),
        }
    }

    /// Adds comments without telling anyone, as if they were there all along
    pub fn seed(&mut self, room: &RoomId, comments: Vec<Comment>) {
        let r = self.rooms.entry(room.clone()).or_default();
        for mut c in comments {
            r.comments.extend(std::mem::take(&mut c.replies));
            r.comments.push(c);
        }
    }

    /// The comments of a room, replies nested under their parent
    pub fn comments(&self, room: &RoomId) -> Vec<Comment> {
        self.rooms.get(room).map(Room::tree).unwrap_or_default()
    }

    /// Sends a message to every participant of the room, as if another client caused it
    pub fn push(&mut self, room: &RoomId, msg: FeedMessage) {
        self.rooms.entry(room.clone()).or_default().relay(msg)
    }

    /// Users currently connected to the room, once per connection
    pub fn members(&self, room: &RoomId) -> Vec<UserId> {
        self.rooms
            .get(room)
            .map(|r| r.members.iter().map(|m| m.identity.user_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Typing signals received from the participants, in order
    pub fn typing_signals(&self, room: &RoomId) -> Vec<(UserId, bool)> {
        self.rooms
            .get(room)
            .map(|r| r.typing_signals.clone())
            .unwrap_or_default()
    }

    /// Simulates every connection to the room dropping and coming back
    pub fn bounce_connections(&mut self, room: &RoomId) {
        let r = match self.rooms.get(room) {
            Some(r) => r,
            None => return,
        };
        let presence = r.presence();
        for m in r.members.iter() {
            let _ = m.feed.unbounded_send(FeedEvent::Disconnected);
            let _ = m.feed.unbounded_send(FeedEvent::Connected);
            let _ = m.feed.unbounded_send(FeedEvent::Message(FeedMessage::PresenceUpdate(
                presence.clone(),
            )));
        }
    }

    pub fn fetch_comments(&self, room: &RoomId) -> Result<Vec<Comment>, Error> {
        self.check_online()?;
        Ok(self.comments(room))
    }

    pub fn create_comment(&mut self, author: &Identity, c: NewComment) -> Result<Comment, Error> {
        self.check_online()?;
        c.validate()?;
        let id: CommentId = self.next_id("c").parse()?;
        let client_key = c.client_key.filter(|_| self.echo_client_key);
        let r = self.rooms.entry(c.room_id.clone()).or_default();
        if let Some(parent) = &c.parent_id {
            // only top-level comments can be answered
            if !r
                .comments
                .iter()
                .any(|p| p.id == *parent && p.parent_id.is_none())
            {
                return Err(Error::NotFound(parent.to_string()));
            }
        }
        let now = Utc::now();
        let comment = Comment {
            id,
            room_id: c.room_id,
            author_id: author.user_id.clone(),
            author_name: author.user_name.clone(),
            author_avatar: author.avatar.clone(),
            content: c.content,
            parent_id: c.parent_id,
            reactions: Vec::new(),
            replies: Vec::new(),
            tagged_entities: Vec::new(),
            created_at: now,
            updated_at: now,
            is_edited: false,
            client_key,
        };
        r.comments.push(comment.clone());
        r.relay(FeedMessage::NewComment(comment.clone()));
        Ok(comment)
    }

    fn room_of(&mut self, id: &CommentId) -> Result<&mut Room, Error> {
        self.rooms
            .values_mut()
            .find(|r| r.comments.iter().any(|c| c.id == *id))
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn edit_comment(
        &mut self,
        user: &UserId,
        id: &CommentId,
        e: EditComment,
    ) -> Result<Comment, Error> {
        self.check_online()?;
        e.validate()?;
        let r = self.room_of(id)?;
        let c = r.find_mut(id)?;
        if c.author_id != *user {
            return Err(Error::PermissionDenied);
        }
        c.content = e.content;
        c.is_edited = true;
        c.updated_at = std::cmp::max(Utc::now(), c.updated_at + chrono::Duration::milliseconds(1));
        let c = c.clone();
        r.relay(FeedMessage::CommentUpdated(c.clone()));
        Ok(c)
    }

    pub fn delete_comment(&mut self, user: &UserId, id: &CommentId) -> Result<(), Error> {
        self.check_online()?;
        let r = self.room_of(id)?;
        if r.find_mut(id)?.author_id != *user {
            return Err(Error::PermissionDenied);
        }
        r.comments
            .retain(|c| c.id != *id && c.parent_id.as_ref() != Some(id));
        r.relay(FeedMessage::CommentDeleted(CommentDeleted {
            comment_id: id.clone(),
        }));
        Ok(())
    }

    pub fn add_reaction(
        &mut self,
        user: &Identity,
        id: &CommentId,
        reaction: NewReaction,
    ) -> Result<Reaction, Error> {
        self.check_online()?;
        reaction.validate()?;
        let reaction_id = ReactionId(self.next_id("r"));
        let r = self.room_of(id)?;
        let c = r.find_mut(id)?;
        if let Some(existing) = c
            .reactions
            .iter()
            .find(|e| e.same_as(id, &user.user_id, &reaction.emoji))
        {
            return Ok(existing.clone());
        }
        let res = Reaction {
            id: reaction_id,
            comment_id: id.clone(),
            user_id: user.user_id.clone(),
            user_name: user.user_name.clone(),
            emoji: reaction.emoji,
            created_at: Utc::now(),
        };
        c.reactions.push(res.clone());
        r.relay(FeedMessage::NewReaction(res.clone()));
        Ok(res)
    }

    pub fn remove_reaction(
        &mut self,
        user: &UserId,
        id: &CommentId,
        emoji: &str,
    ) -> Result<(), Error> {
        self.check_online()?;
        let r = self.room_of(id)?;
        let c = r.find_mut(id)?;
        let before = c.reactions.len();
        c.reactions.retain(|e| !e.same_as(id, user, emoji));
        if c.reactions.len() != before {
            r.relay(FeedMessage::ReactionRemoved(ReactionRemoved {
                comment_id: id.clone(),
                emoji: String::from(emoji),
                user_id: user.clone(),
            }));
        }
        Ok(())
    }

    fn join(
        &mut self,
        room: &RoomId,
        identity: Identity,
        feed: mpsc::UnboundedSender<FeedEvent>,
    ) -> u64 {
        self.next_conn += 1;
        let conn = self.next_conn;
        let r = self.rooms.entry(room.clone()).or_default();
        r.relay(FeedMessage::UserJoined(identity.clone()));
        r.members.push(Member {
            conn,
            identity,
            feed,
        });
        let presence = FeedMessage::PresenceUpdate(r.presence());
        if let Some(m) = r.members.last() {
            let _ = m.feed.unbounded_send(FeedEvent::Message(presence));
        }
        conn
    }

    fn leave(&mut self, room: &RoomId, conn: u64) {
        let r = match self.rooms.get_mut(room) {
            Some(r) => r,
            None => return,
        };
        let left = match r.members.iter().position(|m| m.conn == conn) {
            Some(idx) => r.members.remove(idx),
            None => return,
        };
        let user_id = left.identity.user_id;
        if r.members.iter().any(|m| m.identity.user_id == user_id) {
            return;
        }
        r.relay(FeedMessage::UserLeft(UserLeft {
            user_id,
            last_seen: Some(Utc::now()),
        }));
    }

    fn typing(&mut self, room: &RoomId, conn: u64, is_typing: bool) {
        let r = match self.rooms.get_mut(room) {
            Some(r) => r,
            None => return,
        };
        let who = match r.members.iter().find(|m| m.conn == conn) {
            Some(m) => m.identity.clone(),
            None => return,
        };
        r.typing_signals.push((who.user_id.clone(), is_typing));
        r.relay_except(
            Some(conn),
            FeedMessage::UserTyping(UserTyping {
                user_id: who.user_id,
                user_name: who.user_name,
                is_typing,
            }),
        );
    }
}

/// Connection of one user to a shared [`MockServer`], over both the REST and realtime sides
#[derive(Clone)]
pub struct MockClient {
    server: Shared,
    me: Identity,
    join_grace: Duration,
}

impl MockClient {
    pub fn new(server: Shared, me: Identity) -> MockClient {
        MockClient {
            server,
            me,
            join_grace: parley_client::config::JOIN_GRACE,
        }
    }

    pub fn server(&self) -> &Shared {
        &self.server
    }

    /// Runs `f` against the server once the configured latency elapsed
    async fn call<T>(
        &self,
        f: impl FnOnce(&mut MockServer) -> Result<T, Error>,
    ) -> anyhow::Result<T> {
        let latency = self.server.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut server = self.server.lock().await;
        Ok(f(&mut *server)?)
    }
}

#[async_trait::async_trait]
impl CommentsApi for MockClient {
    async fn fetch_comments(&self, room: &RoomId) -> anyhow::Result<Vec<Comment>> {
        self.call(|s| s.fetch_comments(room)).await
    }

    async fn create_comment(&self, c: &NewComment) -> anyhow::Result<Comment> {
        self.call(|s| s.create_comment(&self.me, c.clone())).await
    }

    async fn edit_comment(&self, id: &CommentId, e: &EditComment) -> anyhow::Result<Comment> {
        self.call(|s| s.edit_comment(&self.me.user_id, id, e.clone()))
            .await
    }

    async fn delete_comment(&self, id: &CommentId) -> anyhow::Result<()> {
        self.call(|s| s.delete_comment(&self.me.user_id, id)).await
    }

    async fn add_reaction(&self, id: &CommentId, r: &NewReaction) -> anyhow::Result<Reaction> {
        self.call(|s| s.add_reaction(&self.me, id, r.clone())).await
    }

    async fn remove_reaction(&self, id: &CommentId, emoji: &str) -> anyhow::Result<()> {
        self.call(|s| s.remove_reaction(&self.me.user_id, id, emoji))
            .await
    }
}

impl Gateway for MockClient {
    fn connect(&self, room: &RoomId, me: &Identity) -> Feed {
        let (feed, mut driver) = Feed::new(room.clone());
        let server = self.server.clone();
        let me = me.clone();
        let join_grace = self.join_grace;
        tokio::spawn(async move {
            tokio::select! {
                _ = driver.cancel.cancellation() => return,
                _ = tokio::time::sleep(join_grace) => (),
            }
            driver.emit(FeedEvent::Connected);
            let conn = server
                .lock()
                .await
                .join(&driver.room, me, driver.events.clone());
            loop {
                let msg = tokio::select! {
                    biased;
                    msg = driver.outbound.next() => msg,
                    _ = driver.cancel.cancellation() => None,
                };
                match msg {
                    None => break,
                    Some(GatewayMessage::Ping) => {
                        driver.emit(FeedEvent::Message(FeedMessage::Pong));
                    }
                    Some(GatewayMessage::Typing { room_id, is_typing }) => {
                        server.lock().await.typing(&room_id, conn, is_typing)
                    }
                    Some(msg) => tracing::debug!(?msg, "ignoring unexpected gateway message"),
                }
            }
            server.lock().await.leave(&driver.room, conn);
        });
        feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomId {
        RoomId(String::from("job-1"))
    }

    fn identity(id: &str) -> Identity {
        Identity::new(UserId(String::from(id)), format!("User {id}"))
    }

    fn new_comment(content: &str, parent_id: Option<CommentId>) -> NewComment {
        NewComment {
            room_id: room(),
            content: String::from(content),
            parent_id,
            tagged_ids: Vec::new(),
            client_key: None,
        }
    }

    #[test]
    fn replies_only_to_top_level() {
        let mut s = MockServer::new();
        let me = identity("u1");
        let c = s.create_comment(&me, new_comment("hi", None)).unwrap();
        let r = s
            .create_comment(&me, new_comment("reply", Some(c.id.clone())))
            .unwrap();
        assert_eq!(
            s.create_comment(&me, new_comment("nested", Some(r.id.clone()))),
            Err(Error::NotFound(r.id.to_string()))
        );
        let tree = s.comments(&room());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].replies.len(), 1);

        s.delete_comment(&me.user_id, &c.id).unwrap();
        assert!(s.comments(&room()).is_empty());
    }

    #[test]
    fn only_authors_edit() {
        let mut s = MockServer::new();
        let c = s
            .create_comment(&identity("u1"), new_comment("hi", None))
            .unwrap();
        let edit = EditComment {
            content: String::from("hijacked"),
        };
        assert_eq!(
            s.edit_comment(&UserId(String::from("u2")), &c.id, edit),
            Err(Error::PermissionDenied)
        );
        s.set_offline(true);
        assert!(s.fetch_comments(&room()).is_err());
    }

    #[test]
    fn reactions_are_idempotent() {
        let mut s = MockServer::new();
        let me = identity("u1");
        let c = s.create_comment(&me, new_comment("hi", None)).unwrap();
        let thumbs = NewReaction {
            emoji: String::from("👍"),
        };
        let first = s.add_reaction(&me, &c.id, thumbs.clone()).unwrap();
        let second = s.add_reaction(&me, &c.id, thumbs).unwrap();
        assert_eq!(first, second);
        assert_eq!(s.comments(&room())[0].reactions.len(), 1);
        s.remove_reaction(&me.user_id, &c.id, "👍").unwrap();
        assert!(s.comments(&room())[0].reactions.is_empty());
    }
}
