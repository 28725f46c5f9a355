use std::{collections::HashMap, time::Duration};

use chrono::Utc;
use tokio::time::Instant;

use crate::api::{
    Identity, Presence, PresenceUpdate, Time, TypingState, UserId, UserLeft, UserTyping,
};

/// Who is around in a room, and who is typing.
///
/// The roster is the static list of people expected in the room. Participants seen on the feed
/// but absent from the roster are tracked too, and listed after it.
#[derive(Clone, Debug)]
pub struct PresenceTracker {
    me: UserId,
    roster: Vec<Identity>,
    live: HashMap<UserId, Presence>,
    typing: HashMap<UserId, (TypingState, Instant)>,
    typing_expiry: Duration,
}

impl PresenceTracker {
    pub fn new(me: UserId, roster: Vec<Identity>, typing_expiry: Duration) -> PresenceTracker {
        PresenceTracker {
            me,
            roster,
            live: HashMap::new(),
            typing: HashMap::new(),
            typing_expiry,
        }
    }

    pub fn merge(&mut self, updates: Vec<PresenceUpdate>) {
        for u in updates {
            let name = u.user_name.clone();
            let p = self.entry(&u.user_id, name);
            p.is_online = u.is_online;
            if u.last_seen.is_some() {
                p.last_seen = u.last_seen;
            }
            if !u.is_online {
                self.typing.remove(&u.user_id);
            }
        }
    }

    pub fn user_joined(&mut self, who: Identity) {
        let p = self.entry(&who.user_id, Some(who.user_name.clone()));
        p.is_online = true;
        if who.avatar.is_some() {
            p.avatar = who.avatar;
        }
    }

    pub fn user_left(&mut self, left: UserLeft, now: Time) {
        let p = self.entry(&left.user_id, None);
        p.is_online = false;
        p.last_seen = Some(left.last_seen.unwrap_or(now));
        self.typing.remove(&left.user_id);
    }

    /// Returns whether the typing list changed
    pub fn user_typing(&mut self, t: UserTyping, now: Instant) -> bool {
        if t.user_id == self.me {
            return false;
        }
        if !t.is_typing {
            return self.typing.remove(&t.user_id).is_some();
        }
        let deadline = now + self.typing_expiry;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.typing_expiry)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let state = TypingState {
            user_id: t.user_id.clone(),
            user_name: t.user_name,
            is_typing: true,
            expires_at,
        };
        self.typing.insert(t.user_id, (state, deadline));
        true
    }

    /// Drops typing indicators whose expiry passed. Returns whether anything was dropped.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.typing.len();
        self.typing.retain(|_, (_, deadline)| *deadline > now);
        self.typing.len() != before
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.typing.values().map(|(_, d)| *d).min()
    }

    /// Forgets everything learned from the feed, keeping only the roster
    pub fn discard(&mut self) {
        self.live.clear();
        self.typing.clear();
    }

    pub fn typing(&self) -> Vec<TypingState> {
        let mut res = self
            .typing
            .values()
            .map(|(s, _)| s.clone())
            .collect::<Vec<_>>();
        res.sort_unstable_by(|a, b| {
            a.user_name
                .cmp(&b.user_name)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        res
    }

    pub fn is_typing(&self, user: &UserId) -> bool {
        self.typing.contains_key(user)
    }

    pub fn presence_of(&self, user: &UserId) -> Option<&Presence> {
        self.live.get(user)
    }

    /// The roster in its own order annotated with live presence, followed by the participants
    /// that are not part of the roster
    pub fn participants(&self) -> Vec<Presence> {
        let mut res = self
            .roster
            .iter()
            .map(|who| {
                self.live
                    .get(&who.user_id)
                    .cloned()
                    .unwrap_or_else(|| Presence::offline(who))
            })
            .collect::<Vec<_>>();
        let mut outsiders = self
            .live
            .values()
            .filter(|p| !self.roster.iter().any(|r| r.user_id == p.user_id))
            .cloned()
            .collect::<Vec<_>>();
        outsiders.sort_unstable_by(|a, b| a.user_id.cmp(&b.user_id));
        res.extend(outsiders);
        res
    }

    pub fn online(&self) -> Vec<Presence> {
        self.participants()
            .into_iter()
            .filter(|p| p.is_online)
            .collect()
    }

    fn entry(&mut self, user: &UserId, name: Option<String>) -> &mut Presence {
        let roster = &self.roster;
        let p = self.live.entry(user.clone()).or_insert_with(|| {
            roster
                .iter()
                .find(|r| r.user_id == *user)
                .map(Presence::offline)
                .unwrap_or_else(|| Presence {
                    user_id: user.clone(),
                    user_name: user.0.clone(),
                    avatar: None,
                    is_online: false,
                    last_seen: None,
                })
        });
        if let Some(name) = name {
            p.user_name = name;
        }
        p
    }
}
