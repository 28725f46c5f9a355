use std::collections::{HashMap, HashSet};

use chrono::Duration;

use crate::{
    api::{
        ClientKey, Comment, CommentId, FeedMessage, Identity, NewComment, Reaction,
        ReactionRemoved, RoomId, TaggedEntity, Time, UserId,
    },
    CommentTree, Error, OrderExt,
};

/// Delivery state of a comment created locally and not confirmed by the server yet
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// The create request is in flight
    Pending,

    /// The create request failed. The comment stays displayed until it is retried or dismissed.
    Failed(String),
}

/// A comment as written by the local user, before it gets sent
#[derive(Clone, Debug)]
pub struct Draft {
    pub key: ClientKey,
    pub content: String,
    pub parent_id: Option<CommentId>,
    pub tags: Vec<TaggedEntity>,
}

impl Draft {
    pub fn new(content: String) -> Draft {
        Draft {
            key: ClientKey::new(),
            content,
            parent_id: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
struct Outgoing {
    request: NewComment,
    comment: Comment,
    delivery: Delivery,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReactionChange {
    Added(Reaction),
    Removed(ReactionRemoved),
}

/// The canonical comment tree of one room.
///
/// Top-level comments are kept newest first and replies oldest first; the order is recomputed
/// after every mutation. Every `apply_remote_*` operation is idempotent, as the realtime feed
/// and the REST responses may both deliver the same change.
#[derive(Clone, Debug)]
pub struct CommentStore {
    comments: Vec<Comment>,

    /// Locally created comments not yet confirmed, indexed by their local id
    outbox: HashMap<CommentId, Outgoing>,

    /// Max distance between the creation dates of a local comment and of the server comment
    /// it is assumed to be, when the server does not echo correlation keys
    coalescing_window: Duration,
}

impl Default for CommentStore {
    fn default() -> CommentStore {
        CommentStore::new(Duration::seconds(5))
    }
}

impl CommentStore {
    pub fn new(coalescing_window: Duration) -> CommentStore {
        CommentStore {
            comments: Vec::new(),
            outbox: HashMap::new(),
            coalescing_window,
        }
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn find(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.find_comment(id)
    }

    pub fn reaction_of(
        &self,
        comment: &CommentId,
        user: &UserId,
        emoji: &str,
    ) -> Option<&Reaction> {
        self.find(comment)?
            .reactions
            .iter()
            .find(|r| r.same_as(comment, user, emoji))
    }

    /// Number of comments held, replies included
    pub fn len(&self) -> usize {
        self.comments.count_comments()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// `None` for comments the server already confirmed
    pub fn delivery(&self, id: &CommentId) -> Option<&Delivery> {
        self.outbox.get(id).map(|o| &o.delivery)
    }

    pub fn deliveries(&self) -> HashMap<CommentId, Delivery> {
        self.outbox
            .iter()
            .map(|(id, o)| (id.clone(), o.delivery.clone()))
            .collect()
    }

    fn reorder(&mut self) {
        self.comments.sort_thread();
    }

    /// Replaces the whole tree with an authoritative listing.
    ///
    /// Comments written locally and not confirmed yet are put back on top of it, unless the
    /// listing already holds their server counterpart. Each server comment stands for at most
    /// one local comment, and the ones already held before cannot stand for any.
    pub fn load_snapshot(&mut self, snapshot: Vec<Comment>) {
        let mut claimed = self
            .comments
            .iter()
            .flat_map(|c| std::iter::once(c).chain(c.replies.iter()))
            .filter(|c| !c.id.is_local())
            .map(|c| c.id.clone())
            .collect::<HashSet<_>>();
        let mut comments: Vec<Comment> = Vec::with_capacity(snapshot.len());
        for mut c in snapshot {
            if comments.find_comment(&c.id).is_some() {
                tracing::warn!(comment_id = %c.id, "duplicate comment in snapshot");
                continue;
            }
            // Only one level of nesting: hoist any reply to a reply into the thread
            let mut replies = Vec::with_capacity(c.replies.len());
            for mut r in std::mem::take(&mut c.replies) {
                replies.extend(std::mem::take(&mut r.replies));
                replies.push(r);
            }
            replies.retain(|r| comments.find_comment(&r.id).is_none());
            c.replies = replies;
            comments.push(c);
        }
        self.comments = comments;
        self.reorder();

        let mut outbox = self.outbox.drain().collect::<Vec<_>>();
        outbox.sort_by(|(a, x), (b, y)| {
            x.comment
                .created_at
                .cmp(&y.comment.created_at)
                .then_with(|| a.cmp(b))
        });
        for (local_id, o) in outbox {
            if let Some(server_id) = self.find_counterpart(&o, &claimed) {
                tracing::debug!(%local_id, %server_id, "snapshot confirmed local comment");
                claimed.insert(server_id);
                continue;
            }
            // A local reply whose thread went away goes away too
            if self.insert(o.comment.clone()) {
                self.outbox.insert(local_id, o);
            }
        }
        self.reorder();
    }

    fn find_counterpart(&self, o: &Outgoing, claimed: &HashSet<CommentId>) -> Option<CommentId> {
        let mut server_side = self
            .comments
            .iter()
            .flat_map(|c| std::iter::once(c).chain(c.replies.iter()))
            .filter(|c| !c.id.is_local());
        let found = match o.request.client_key {
            Some(key) => server_side.find(|c| c.client_key == Some(key)),
            None => None,
        };
        let found = found.or_else(|| {
            self.comments
                .iter()
                .flat_map(|c| std::iter::once(c).chain(c.replies.iter()))
                .filter(|c| !c.id.is_local() && c.client_key.is_none())
                .filter(|c| !claimed.contains(&c.id))
                .find(|c| self.looks_like(o, c))
        });
        found.map(|c| c.id.clone())
    }

    /// The heuristic used when the server does not echo correlation keys
    fn looks_like(&self, o: &Outgoing, c: &Comment) -> bool {
        let delta = c.created_at - o.comment.created_at;
        o.comment.author_id == c.author_id
            && o.comment.parent_id == c.parent_id
            && o.comment.content == c.content
            && delta <= self.coalescing_window
            && delta >= -self.coalescing_window
    }

    /// Inserts a comment without any dedup nor ordering
    fn insert(&mut self, mut c: Comment) -> bool {
        match c.parent_id.clone() {
            None => {
                self.comments.insert(0, c);
                true
            }
            Some(parent) => match self.comments.thread_of(&parent) {
                Some(idx) => {
                    let thread = &mut self.comments[idx];
                    if thread.id != parent {
                        tracing::debug!(
                            comment_id = %c.id,
                            %parent,
                            "attaching reply to a reply to the thread holding it"
                        );
                    }
                    thread.replies.extend(std::mem::take(&mut c.replies));
                    thread.replies.push(c);
                    true
                }
                None => {
                    tracing::warn!(
                        comment_id = %c.id,
                        %parent,
                        "dropping reply to unknown comment"
                    );
                    false
                }
            },
        }
    }

    /// Inserts a comment written by `author` right away, and returns the request that will
    /// make the server aware of it.
    ///
    /// The comment gets a local id derived from the draft's key, see [`CommentId::local`].
    pub fn submit(
        &mut self,
        author: &Identity,
        room: &RoomId,
        draft: Draft,
        now: Time,
    ) -> Result<NewComment, Error> {
        let request = NewComment {
            room_id: room.clone(),
            content: draft.content,
            parent_id: draft.parent_id,
            tagged_ids: draft.tags.iter().map(|t| t.id.clone()).collect(),
            client_key: Some(draft.key),
        };
        request.validate()?;
        if let Some(parent) = &request.parent_id {
            match self.comments.iter().find(|c| c.id == *parent) {
                Some(p) if p.id.is_local() => return Err(Error::Unconfirmed(parent.clone())),
                Some(_) => (),
                None if self.find(parent).is_some() => return Err(Error::NestedReply),
                None => return Err(Error::UnknownComment(parent.clone())),
            }
        }

        let id = CommentId::local(draft.key);
        let comment = Comment {
            id: id.clone(),
            room_id: room.clone(),
            author_id: author.user_id.clone(),
            author_name: author.user_name.clone(),
            author_avatar: author.avatar.clone(),
            content: request.content.clone(),
            parent_id: request.parent_id.clone(),
            reactions: Vec::new(),
            replies: Vec::new(),
            tagged_entities: draft.tags,
            created_at: now,
            updated_at: now,
            is_edited: false,
            client_key: Some(draft.key),
        };
        match &comment.parent_id {
            None => self.comments.insert(0, comment.clone()),
            Some(parent) => {
                // checked above
                if let Some(p) = self.comments.iter_mut().find(|c| c.id == *parent) {
                    p.replies.push(comment.clone());
                }
            }
        }
        self.outbox.insert(
            id,
            Outgoing {
                request: request.clone(),
                comment,
                delivery: Delivery::Pending,
            },
        );
        self.reorder();
        Ok(request)
    }

    /// Marks a local comment as failed to be created. Returns false if it is not known.
    pub fn mark_failed(&mut self, local_id: &CommentId, reason: String) -> bool {
        match self.outbox.get_mut(local_id) {
            Some(o) => {
                o.delivery = Delivery::Failed(reason);
                true
            }
            None => false,
        }
    }

    /// Puts a failed comment back in pending state and returns the request to re-send. The
    /// correlation key is kept, so the server may detect the retry of an already-applied
    /// request.
    pub fn retry(&mut self, local_id: &CommentId) -> Option<NewComment> {
        let o = self.outbox.get_mut(local_id)?;
        if o.delivery == Delivery::Pending {
            return None;
        }
        o.delivery = Delivery::Pending;
        Some(o.request.clone())
    }

    /// Forgets a local comment. Returns whether it was known.
    pub fn dismiss(&mut self, local_id: &CommentId) -> bool {
        if self.outbox.remove(local_id).is_none() {
            return false;
        }
        self.comments.remove_comment(local_id);
        true
    }

    /// Replaces local comment `local_id` with its server version, as answered to the create
    /// request that sent it. The request says which local comment it was, so no other one gets
    /// coalesced.
    pub fn confirm(&mut self, local_id: &CommentId, c: Comment) -> bool {
        let removed = self.dismiss(local_id);
        let inserted = self.find(&c.id).is_none() && self.insert(c);
        self.reorder();
        removed || inserted
    }

    /// Returns whether the tree changed
    pub fn apply_remote_create(&mut self, c: Comment) -> bool {
        let known = self.find(&c.id).is_some();
        let mut changed = false;
        if let Some(local_id) = self.superseded_by(&c, known) {
            tracing::debug!(%local_id, comment_id = %c.id, "coalescing local comment");
            self.outbox.remove(&local_id);
            self.comments.remove_comment(&local_id);
            changed = true;
        }
        if !known {
            changed |= self.insert(c);
        }
        self.reorder();
        changed
    }

    /// The local comment that `c` is the server version of, if any
    fn superseded_by(&self, c: &Comment, known: bool) -> Option<CommentId> {
        if let Some(key) = c.client_key {
            // The server echoes correlation keys: they are the only thing to trust. A key that
            // is not ours belongs to another client, possibly of the same user.
            let local_id = CommentId::local(key);
            return self.outbox.contains_key(&local_id).then_some(local_id);
        }
        // A comment already held was already reconciled, replaying it must not take another one
        if known {
            return None;
        }
        self.outbox
            .iter()
            .filter(|(_, o)| self.looks_like(o, c))
            .min_by_key(|(id, o)| (o.comment.created_at, (*id).clone()))
            .map(|(id, _)| id.clone())
    }

    /// Returns whether the tree changed
    pub fn apply_remote_update(&mut self, mut c: Comment) -> bool {
        let existing = match self.comments.find_comment_mut(&c.id) {
            Some(existing) => existing,
            None => {
                tracing::debug!(comment_id = %c.id, "ignoring update of unknown comment");
                return false;
            }
        };
        if existing.updated_at > c.updated_at {
            tracing::debug!(comment_id = %c.id, "ignoring stale comment update");
            return false;
        }
        // The tree structure is ours to maintain, an update only carries the comment itself
        if c.replies.is_empty() {
            c.replies = std::mem::take(&mut existing.replies);
        }
        if c.reactions.is_empty() {
            c.reactions = std::mem::take(&mut existing.reactions);
        }
        c.parent_id = existing.parent_id.clone();
        let changed = *existing != c;
        *existing = c;
        self.reorder();
        changed
    }

    /// Returns whether the tree changed
    pub fn apply_remote_delete(&mut self, id: &CommentId) -> bool {
        if !self.comments.remove_comment(id) {
            return false;
        }
        // Local replies to a deleted thread went away with it
        let comments = &self.comments;
        self.outbox
            .retain(|local_id, _| comments.find_comment(local_id).is_some());
        self.reorder();
        true
    }

    /// Returns whether the tree changed
    pub fn apply_remote_reaction(&mut self, change: ReactionChange) -> bool {
        match change {
            ReactionChange::Added(r) => {
                let c = match self.comments.find_comment_mut(&r.comment_id) {
                    Some(c) => c,
                    None => {
                        tracing::debug!(comment_id = %r.comment_id, "reaction to unknown comment");
                        return false;
                    }
                };
                if c.reactions
                    .iter()
                    .any(|e| e.same_as(&r.comment_id, &r.user_id, &r.emoji))
                {
                    return false;
                }
                c.reactions.push(r);
                true
            }
            ReactionChange::Removed(r) => match self.comments.find_comment_mut(&r.comment_id) {
                None => false,
                Some(c) => {
                    let before = c.reactions.len();
                    c.reactions
                        .retain(|e| !(e.emoji == r.emoji && e.user_id == r.user_id));
                    c.reactions.len() != before
                }
            },
        }
    }

    /// Applies a comment-related feed message. Other messages are ignored.
    pub fn apply_delta(&mut self, msg: FeedMessage) -> bool {
        match msg {
            FeedMessage::NewComment(c) => self.apply_remote_create(c),
            FeedMessage::CommentUpdated(c) => self.apply_remote_update(c),
            FeedMessage::CommentDeleted(d) => self.apply_remote_delete(&d.comment_id),
            FeedMessage::NewReaction(r) => self.apply_remote_reaction(ReactionChange::Added(r)),
            FeedMessage::ReactionRemoved(r) => {
                self.apply_remote_reaction(ReactionChange::Removed(r))
            }
            FeedMessage::Pong
            | FeedMessage::PresenceUpdate(_)
            | FeedMessage::UserJoined(_)
            | FeedMessage::UserLeft(_)
            | FeedMessage::UserTyping(_) => false,
        }
    }
}
