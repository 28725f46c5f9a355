use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use anyhow::anyhow;
use chrono::Utc;
use futures::{
    channel::oneshot,
    future::{AbortHandle, Abortable, BoxFuture},
    stream::FuturesUnordered,
    FutureExt, StreamExt,
};
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};

use crate::{
    api::{
        Comment, CommentDeleted, CommentId, EditComment, FeedMessage, Identity, NewComment,
        NewReaction, Presence, Reaction, ReactionRemoved, RoomId, TypingState,
    },
    CommentStore, CommentTree, CommentsApi, Config, Delivery, Draft, Error, Feed, FeedEvent,
    Gateway, PanelController, PanelEffect, PanelState, PresenceTracker, TypingThrottle,
};

/// Everything the UI needs to render a discussion, as of the last processed event
#[derive(Clone, Debug, Default)]
pub struct View {
    pub panel: PanelState,
    pub connected: bool,

    /// Whether the comments reflect a server listing, as opposed to a cache or nothing
    pub initialized: bool,

    pub comments: Arc<Vec<Comment>>,
    pub deliveries: HashMap<CommentId, Delivery>,
    pub participants: Vec<Presence>,
    pub typing: Vec<TypingState>,
}

impl View {
    pub fn find(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.find_comment(id)
    }

    pub fn count(&self) -> usize {
        self.comments.count_comments()
    }

    pub fn delivery(&self, id: &CommentId) -> Option<&Delivery> {
        self.deliveries.get(id)
    }

    pub fn online(&self) -> impl Iterator<Item = &Presence> {
        self.participants.iter().filter(|p| p.is_online)
    }
}

type Responder<T> = oneshot::Sender<Result<T, Error>>;

/// Answer to a command sent to the discussion session
#[must_use]
pub struct Reply<T>(oneshot::Receiver<Result<T, Error>>);

impl<T> Reply<T> {
    fn new() -> (Responder<T>, Reply<T>) {
        let (tx, rx) = oneshot::channel();
        (tx, Reply(rx))
    }
}

impl<T> Future for Reply<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(Error::SessionGone)))
    }
}

/// A comment just submitted: it is displayed under `local_id` until `outcome` resolves
#[must_use]
pub struct Submission {
    pub local_id: CommentId,
    pub outcome: Reply<Comment>,
}

enum Command {
    SetPanel(PanelState),
    Submit(Draft, Responder<Comment>),
    Retry(CommentId, Responder<Comment>),
    Dismiss(CommentId, Responder<()>),
    Edit(CommentId, EditComment, Responder<Comment>),
    Delete(CommentId, Responder<()>),
    ToggleReaction(CommentId, NewReaction, Responder<()>),
    Keystroke,
    Refresh(Responder<()>),
}

enum Completion {
    Snapshot {
        epoch: u64,
        result: anyhow::Result<Vec<Comment>>,
    },
    SnapshotAborted,
    Created {
        local_id: CommentId,
        result: anyhow::Result<Comment>,
        reply: Responder<Comment>,
    },
    Edited {
        result: anyhow::Result<Comment>,
        reply: Responder<Comment>,
    },
    Deleted {
        id: CommentId,
        result: anyhow::Result<()>,
        reply: Responder<()>,
    },
    Reacted {
        result: anyhow::Result<Reaction>,
        reply: Responder<()>,
    },
    Unreacted {
        removed: ReactionRemoved,
        result: anyhow::Result<()>,
        reply: Responder<()>,
    },
}

/// Change held back until the snapshot it applies on top of is loaded
enum Buffered {
    Delta(FeedMessage),

    /// Answer to a create request of ours
    Confirmed(CommentId, Comment),
}

enum Input {
    Command(Command),
    Shutdown,
    Feed(Option<FeedEvent>),
    Completion(Completion),
    Timer,
}

struct Engine {
    config: Config,
    api: Arc<dyn CommentsApi>,
    gateway: Arc<dyn Gateway>,
    room: RoomId,
    me: Identity,

    store: CommentStore,
    presence: PresenceTracker,
    typing: TypingThrottle,
    panel: PanelController,

    feed: Option<Feed>,
    connected: bool,
    seen_connection: bool,

    /// Comment deltas received before the snapshot they apply on top of
    buffered: VecDeque<Buffered>,

    inflight: FuturesUnordered<BoxFuture<'static, Completion>>,
    snapshot: Option<AbortHandle>,
    refresh_waiters: Vec<Responder<()>>,

    view: watch::Sender<View>,
}

/// Handle to the session following one room's discussion. Cloning it gives another handle to
/// the same session, which ends once all handles are dropped.
#[derive(Clone)]
pub struct Discussion {
    room: RoomId,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<View>,
}

impl Discussion {
    /// Starts the session task. The panel starts closed, so nothing happens until it is opened.
    pub fn spawn(
        config: Config,
        api: Arc<dyn CommentsApi>,
        gateway: Arc<dyn Gateway>,
        room: RoomId,
        me: Identity,
        roster: Vec<Identity>,
    ) -> Discussion {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let presence = PresenceTracker::new(me.user_id.clone(), roster, config.typing_expiry);
        let (view_tx, view_rx) = watch::channel(View {
            participants: presence.participants(),
            ..View::default()
        });
        let engine = Engine {
            store: CommentStore::new(config.coalescing_window()),
            presence,
            typing: TypingThrottle::new(config.typing_idle),
            panel: PanelController::new(),
            config,
            api,
            gateway,
            room: room.clone(),
            me,
            feed: None,
            connected: false,
            seen_connection: false,
            buffered: VecDeque::new(),
            inflight: FuturesUnordered::new(),
            snapshot: None,
            refresh_waiters: Vec::new(),
            view: view_tx,
        };
        tokio::spawn(engine.run(commands_rx));
        Discussion {
            room,
            commands: commands_tx,
            view: view_rx,
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    fn send(&self, cmd: Command) {
        // A dropped command drops its responder, which resolves its reply with SessionGone
        if self.commands.send(cmd).is_err() {
            tracing::debug!(room = %self.room, "discussion session is gone");
        }
    }

    fn request<T>(&self, cmd: impl FnOnce(Responder<T>) -> Command) -> Reply<T> {
        let (tx, reply) = Reply::new();
        self.send(cmd(tx));
        reply
    }

    pub fn set_panel(&self, state: PanelState) {
        self.send(Command::SetPanel(state))
    }

    pub fn open(&self) {
        self.set_panel(PanelState::Expanded)
    }

    pub fn close(&self) {
        self.set_panel(PanelState::Closed)
    }

    /// Displays the comment right away, and sends it to the server
    pub fn submit_comment(&self, draft: Draft) -> Submission {
        let local_id = CommentId::local(draft.key);
        Submission {
            local_id,
            outcome: self.request(|tx| Command::Submit(draft, tx)),
        }
    }

    /// Sends again a comment whose creation failed
    pub fn retry(&self, local_id: CommentId) -> Reply<Comment> {
        self.request(|tx| Command::Retry(local_id, tx))
    }

    /// Forgets a comment whose creation failed
    pub fn dismiss(&self, local_id: CommentId) -> Reply<()> {
        self.request(|tx| Command::Dismiss(local_id, tx))
    }

    pub fn edit_comment(&self, id: CommentId, content: String) -> Reply<Comment> {
        self.request(|tx| Command::Edit(id, EditComment { content }, tx))
    }

    pub fn delete_comment(&self, id: CommentId) -> Reply<()> {
        self.request(|tx| Command::Delete(id, tx))
    }

    /// Adds the reaction if the local user has not reacted with this emoji yet, removes it
    /// otherwise
    pub fn toggle_reaction(&self, id: CommentId, emoji: String) -> Reply<()> {
        self.request(|tx| Command::ToggleReaction(id, NewReaction { emoji }, tx))
    }

    pub fn keystroke(&self) {
        self.send(Command::Keystroke)
    }

    /// Reloads the whole discussion from the server. Resolves once the listing got applied.
    pub fn refresh(&self) -> Reply<()> {
        self.request(Command::Refresh)
    }

    pub fn view(&self) -> View {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<View> {
        self.view.clone()
    }

    /// Waits for the first view matching `pred`, starting with the current one
    pub async fn wait_until(&self, mut pred: impl FnMut(&View) -> bool) -> Result<View, Error> {
        let mut rx = self.view.clone();
        loop {
            {
                let view = rx.borrow_and_update();
                if pred(&view) {
                    return Ok(view.clone());
                }
            }
            rx.changed().await.map_err(|_| Error::SessionGone)?;
        }
    }
}

impl Engine {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let input = {
                let deadline = self.next_deadline();
                let feed = self.feed.as_mut();
                let has_inflight = !self.inflight.is_empty();
                let inflight = &mut self.inflight;
                tokio::select! {
                    cmd = commands.recv() => match cmd {
                        Some(cmd) => Input::Command(cmd),
                        None => Input::Shutdown,
                    },
                    ev = async move {
                        match feed {
                            Some(feed) => feed.next().await,
                            None => futures::future::pending().await,
                        }
                    } => Input::Feed(ev),
                    Some(c) = inflight.next(), if has_inflight => Input::Completion(c),
                    _ = async move {
                        match deadline {
                            Some(d) => tokio::time::sleep_until(d).await,
                            None => futures::future::pending().await,
                        }
                    } => Input::Timer,
                }
            };
            match input {
                Input::Shutdown => {
                    tracing::debug!(room = %self.room, "all discussion handles dropped");
                    self.set_panel(PanelState::Closed);
                    self.publish();
                    return;
                }
                Input::Command(cmd) => self.command(cmd),
                Input::Feed(ev) => self.feed_event(ev),
                Input::Completion(c) => self.completion(c),
                Input::Timer => self.timer(),
            }
            self.publish();
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.presence.next_deadline(), self.typing.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn publish(&self) {
        self.view.send_replace(View {
            panel: self.panel.state(),
            connected: self.connected,
            initialized: self.panel.is_initialized(),
            comments: Arc::new(self.store.comments().to_vec()),
            deliveries: self.store.deliveries(),
            participants: self.presence.participants(),
            typing: self.presence.typing(),
        });
    }

    fn spawn<F>(&mut self, f: F)
    where
        F: 'static + Send + Future<Output = Completion>,
    {
        self.inflight.push(f.boxed());
    }

    fn command(&mut self, cmd: Command) {
        if let Command::SetPanel(state) = cmd {
            self.set_panel(state);
            return;
        }
        if !self.panel.state().is_open() {
            tracing::debug!("ignoring command while the panel is closed");
            match cmd {
                Command::Submit(_, reply)
                | Command::Retry(_, reply)
                | Command::Edit(_, _, reply) => {
                    let _ = reply.send(Err(Error::PanelClosed));
                }
                Command::Dismiss(_, reply)
                | Command::Delete(_, reply)
                | Command::ToggleReaction(_, _, reply)
                | Command::Refresh(reply) => {
                    let _ = reply.send(Err(Error::PanelClosed));
                }
                Command::SetPanel(_) | Command::Keystroke => (),
            }
            return;
        }
        match cmd {
            Command::SetPanel(_) => (),
            Command::Submit(draft, reply) => self.submit(draft, reply),
            Command::Retry(local_id, reply) => match self.store.retry(&local_id) {
                Some(req) => {
                    tracing::debug!(%local_id, "retrying comment creation");
                    self.send_create(local_id, req, reply);
                }
                None => {
                    let _ = reply.send(Err(Error::UnknownComment(local_id)));
                }
            },
            Command::Dismiss(local_id, reply) => {
                let res = match self.store.dismiss(&local_id) {
                    true => Ok(()),
                    false => Err(Error::UnknownComment(local_id)),
                };
                let _ = reply.send(res);
            }
            Command::Edit(id, edit, reply) => {
                if let Err(err) = self.check_target(&id).and(edit.validate().map_err(Error::from)) {
                    let _ = reply.send(Err(err));
                    return;
                }
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.edit_comment(&id, &edit).await;
                    Completion::Edited { result, reply }
                });
            }
            Command::Delete(id, reply) => {
                if let Err(err) = self.check_target(&id) {
                    let _ = reply.send(Err(err));
                    return;
                }
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.delete_comment(&id).await;
                    Completion::Deleted { id, result, reply }
                });
            }
            Command::ToggleReaction(id, reaction, reply) => {
                let checked = self
                    .check_target(&id)
                    .and(reaction.validate().map_err(Error::from));
                if let Err(err) = checked {
                    let _ = reply.send(Err(err));
                    return;
                }
                let api = self.api.clone();
                let reacted = self
                    .store
                    .reaction_of(&id, &self.me.user_id, &reaction.emoji)
                    .is_some();
                match reacted {
                    true => {
                        let removed = ReactionRemoved {
                            comment_id: id,
                            emoji: reaction.emoji,
                            user_id: self.me.user_id.clone(),
                        };
                        self.spawn(async move {
                            let result = api
                                .remove_reaction(&removed.comment_id, &removed.emoji)
                                .await;
                            Completion::Unreacted {
                                removed,
                                result,
                                reply,
                            }
                        });
                    }
                    false => self.spawn(async move {
                        let result = api.add_reaction(&id, &reaction).await;
                        Completion::Reacted { result, reply }
                    }),
                }
            }
            Command::Keystroke => {
                if let Some(is_typing) = self.typing.keystroke(Instant::now()) {
                    self.send_typing(is_typing);
                }
            }
            Command::Refresh(reply) => {
                self.refresh_waiters.push(reply);
                self.reload();
            }
        }
    }

    /// Comments can only be acted upon once the server knows them
    fn check_target(&self, id: &CommentId) -> Result<(), Error> {
        match self.store.find(id) {
            None => Err(Error::UnknownComment(id.clone())),
            Some(c) if c.id.is_local() => Err(Error::Unconfirmed(id.clone())),
            Some(_) => Ok(()),
        }
    }

    fn submit(&mut self, draft: Draft, reply: Responder<Comment>) {
        let local_id = CommentId::local(draft.key);
        match self.store.submit(&self.me, &self.room, draft, Utc::now()) {
            Err(err) => {
                let _ = reply.send(Err(err));
            }
            Ok(req) => {
                tracing::debug!(%local_id, "submitting comment");
                if let Some(is_typing) = self.typing.stop() {
                    self.send_typing(is_typing);
                }
                self.send_create(local_id, req, reply);
            }
        }
    }

    fn send_create(&mut self, local_id: CommentId, req: NewComment, reply: Responder<Comment>) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.create_comment(&req).await;
            Completion::Created {
                local_id,
                result,
                reply,
            }
        });
    }

    fn send_typing(&self, is_typing: bool) {
        match &self.feed {
            Some(feed) => feed.send_typing(is_typing),
            None => tracing::trace!(is_typing, "not connected, not sending typing signal"),
        }
    }

    fn set_panel(&mut self, to: PanelState) {
        for effect in self.panel.transition(to) {
            tracing::trace!(?effect, "running panel effect");
            match effect {
                PanelEffect::Connect => {
                    tracing::info!(room = %self.room, "opening discussion");
                    self.feed = Some(self.gateway.connect(&self.room, &self.me));
                }
                PanelEffect::LoadSnapshot => self.reload(),
                PanelEffect::Disconnect => {
                    tracing::info!(room = %self.room, "closing discussion");
                    if let Some(is_typing) = self.typing.stop() {
                        self.send_typing(is_typing);
                    }
                    self.feed = None;
                    self.connected = false;
                    self.seen_connection = false;
                    if let Some(snapshot) = self.snapshot.take() {
                        snapshot.abort();
                    }
                    for w in self.refresh_waiters.drain(..) {
                        let _ = w.send(Err(Error::PanelClosed));
                    }
                }
                PanelEffect::DiscardPresence => self.presence.discard(),
                PanelEffect::ResetInitialized => self.buffered.clear(),
            }
        }
    }

    /// Fetches a new snapshot, buffering deltas until it is applied
    fn reload(&mut self) {
        if let Some(previous) = self.snapshot.take() {
            previous.abort();
        }
        self.panel.reset_initialized();
        let (handle, registration) = AbortHandle::new_pair();
        let epoch = self.panel.epoch();
        let api = self.api.clone();
        let room = self.room.clone();
        let fetch = Abortable::new(async move { api.fetch_comments(&room).await }, registration);
        self.spawn(fetch.map(move |res| match res {
            Ok(result) => Completion::Snapshot { epoch, result },
            Err(_) => Completion::SnapshotAborted,
        }));
        self.snapshot = Some(handle);
    }

    fn feed_event(&mut self, ev: Option<FeedEvent>) {
        match ev {
            None => {
                tracing::warn!(room = %self.room, "realtime feed ended");
                self.feed = None;
                self.connected = false;
                self.presence.discard();
            }
            Some(FeedEvent::Connected) => {
                self.connected = true;
                if self.seen_connection {
                    tracing::info!(room = %self.room, "reconnected to realtime feed");
                    self.presence.discard();
                    if self.config.refresh_on_reconnect {
                        self.reload();
                    }
                }
                self.seen_connection = true;
            }
            Some(FeedEvent::Disconnected) => {
                tracing::warn!(room = %self.room, "disconnected from realtime feed");
                self.connected = false;
                self.presence.discard();
                self.typing.stop();
            }
            Some(FeedEvent::Message(msg)) => self.feed_message(msg),
        }
    }

    fn feed_message(&mut self, msg: FeedMessage) {
        match msg {
            FeedMessage::Pong => (),
            FeedMessage::PresenceUpdate(updates) => self.presence.merge(updates),
            FeedMessage::UserJoined(who) => self.presence.user_joined(who),
            FeedMessage::UserLeft(left) => self.presence.user_left(left, Utc::now()),
            FeedMessage::UserTyping(t) => {
                self.presence.user_typing(t, Instant::now());
            }
            delta => {
                if self.panel.is_initialized() {
                    self.store.apply_delta(delta);
                } else {
                    tracing::trace!(?delta, "buffering delta until the snapshot is loaded");
                    self.buffered.push_back(Buffered::Delta(delta));
                }
            }
        }
    }

    /// Applies the outcome of a request of ours. The pending snapshot, if any, may have been
    /// computed before the server processed the request: replay it on top of the snapshot too.
    fn apply_local_result(&mut self, msg: FeedMessage) {
        if !self.panel.is_initialized() {
            self.buffered.push_back(Buffered::Delta(msg.clone()));
        }
        self.store.apply_delta(msg);
    }

    fn completion(&mut self, c: Completion) {
        match c {
            Completion::SnapshotAborted => tracing::trace!("snapshot fetch aborted"),
            Completion::Snapshot { epoch, result } => self.snapshot_loaded(epoch, result),
            Completion::Created {
                local_id,
                result,
                reply,
            } => {
                let res = match result {
                    Ok(c) => {
                        tracing::debug!(%local_id, comment_id = %c.id, "comment created");
                        if !self.panel.is_initialized() {
                            self.buffered
                                .push_back(Buffered::Confirmed(local_id.clone(), c.clone()));
                        }
                        self.store.confirm(&local_id, c.clone());
                        Ok(c)
                    }
                    Err(err) => {
                        tracing::warn!(?err, %local_id, "failed creating comment");
                        self.store.mark_failed(&local_id, format!("{err:#}"));
                        Err(Error::Request(err))
                    }
                };
                let _ = reply.send(res);
            }
            Completion::Edited { result, reply } => {
                let res = match result {
                    Ok(c) => {
                        self.apply_local_result(FeedMessage::CommentUpdated(c.clone()));
                        Ok(c)
                    }
                    Err(err) => {
                        tracing::warn!(?err, "failed editing comment");
                        Err(Error::Request(err))
                    }
                };
                let _ = reply.send(res);
            }
            Completion::Deleted { id, result, reply } => {
                let res = match result {
                    Ok(()) => {
                        self.apply_local_result(FeedMessage::CommentDeleted(CommentDeleted {
                            comment_id: id,
                        }));
                        Ok(())
                    }
                    Err(err) => {
                        tracing::warn!(?err, comment_id = %id, "failed deleting comment");
                        Err(Error::Request(err))
                    }
                };
                let _ = reply.send(res);
            }
            Completion::Reacted { result, reply } => {
                let res = match result {
                    Ok(r) => {
                        self.apply_local_result(FeedMessage::NewReaction(r));
                        Ok(())
                    }
                    Err(err) => {
                        tracing::warn!(?err, "failed adding reaction");
                        Err(Error::Request(err))
                    }
                };
                let _ = reply.send(res);
            }
            Completion::Unreacted {
                removed,
                result,
                reply,
            } => {
                let res = match result {
                    Ok(()) => {
                        self.apply_local_result(FeedMessage::ReactionRemoved(removed));
                        Ok(())
                    }
                    Err(err) => {
                        tracing::warn!(?err, "failed removing reaction");
                        Err(Error::Request(err))
                    }
                };
                let _ = reply.send(res);
            }
        }
    }

    fn snapshot_loaded(&mut self, epoch: u64, result: anyhow::Result<Vec<Comment>>) {
        if epoch != self.panel.epoch() || !self.panel.state().is_open() {
            tracing::debug!(epoch, "ignoring snapshot of a previous opening");
            return;
        }
        self.snapshot = None;
        let outcome = match result {
            Ok(comments) => {
                tracing::info!(room = %self.room, count = comments.len(), "loaded discussion");
                self.store.load_snapshot(comments);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    ?err,
                    room = %self.room,
                    "failed loading discussion, keeping cached comments"
                );
                Err(format!("{err:#}"))
            }
        };
        self.panel.mark_initialized();
        let buffered = std::mem::take(&mut self.buffered);
        tracing::debug!(count = buffered.len(), "replaying buffered deltas");
        for change in buffered {
            match change {
                Buffered::Delta(delta) => {
                    self.store.apply_delta(delta);
                }
                Buffered::Confirmed(local_id, c) => {
                    self.store.confirm(&local_id, c);
                }
            }
        }
        for w in self.refresh_waiters.drain(..) {
            let _ = w.send(outcome.clone().map_err(|e| Error::Refresh(anyhow!(e))));
        }
    }

    fn timer(&mut self) {
        let now = Instant::now();
        self.presence.expire(now);
        if let Some(is_typing) = self.typing.poll(now) {
            self.send_typing(is_typing);
        }
    }
}
