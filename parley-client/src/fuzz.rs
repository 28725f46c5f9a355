#![cfg(test)]

use std::collections::HashSet;

use crate::{
    api::{Comment, CommentId, FeedMessage, ReactionRemoved},
    test_util::*,
    CommentStore, Draft, ReactionChange,
};

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    Create {
        id: u8,
        parent: Option<u8>,
        author: u8,
        secs: u8,
    },
    Update {
        id: u8,
        secs: u8,
    },
    Delete {
        id: u8,
    },
    React {
        id: u8,
        user: u8,
        emoji: bool,
    },
    Unreact {
        id: u8,
        user: u8,
        emoji: bool,
    },
    Submit {
        parent: Option<u8>,
        secs: u8,
    },
    /// Server version of a pending local comment, `delay` seconds after it was written
    Echo {
        id: u8,
        pending: u8,
        keyed: bool,
        delay: u8,
    },
    Snapshot {
        #[generator(bolero::generator::gen_with::<Vec<u8>>().len(0..20usize))]
        ids: Vec<u8>,
    },
}

fn cid(n: u8) -> String {
    format!("c{}", n % 16)
}

fn emoji(which: bool) -> &'static str {
    match which {
        true => "👍",
        false => "🎉",
    }
}

impl FuzzOp {
    /// The feed message this operation stands for, if it is a remote one
    fn remote(&self) -> Option<FeedMessage> {
        Some(match *self {
            FuzzOp::Create {
                id: n,
                parent,
                author,
                secs,
            } => {
                let c = match parent {
                    None => comment(&cid(n), &format!("u{}", author % 3), secs.into()),
                    Some(p) => reply(&cid(n), &cid(p), &format!("u{}", author % 3), secs.into()),
                };
                FeedMessage::NewComment(c)
            }
            FuzzOp::Update { id: n, secs } => FeedMessage::CommentUpdated(Comment {
                content: format!("edited at {secs}"),
                is_edited: true,
                updated_at: t(secs.into()),
                ..comment(&cid(n), "u0", 0)
            }),
            FuzzOp::Delete { id: n } => FeedMessage::CommentDeleted(crate::api::CommentDeleted {
                comment_id: id(&cid(n)),
            }),
            FuzzOp::React { id: n, user: u, emoji: e } => FeedMessage::NewReaction(reaction(
                &format!("x{n}-{u}-{e}"),
                &cid(n),
                &format!("u{}", u % 3),
                emoji(e),
            )),
            FuzzOp::Unreact { id: n, user: u, emoji: e } => {
                FeedMessage::ReactionRemoved(ReactionRemoved {
                    comment_id: id(&cid(n)),
                    emoji: String::from(emoji(e)),
                    user_id: user(&format!("u{}", u % 3)),
                })
            }
            FuzzOp::Submit { .. } | FuzzOp::Echo { .. } | FuzzOp::Snapshot { .. } => return None,
        })
    }
}

/// The local comment picked by an `Echo`, and the feed message announcing it
fn echo_of(
    store: &CommentStore,
    n: u8,
    pending: u8,
    keyed: bool,
    delay: u8,
) -> Option<(CommentId, FeedMessage)> {
    let mut local_ids = store.deliveries().into_keys().collect::<Vec<_>>();
    if local_ids.is_empty() {
        return None;
    }
    local_ids.sort_unstable();
    let local_id = local_ids.swap_remove(usize::from(pending) % local_ids.len());
    let local = store.find(&local_id)?;
    let c = Comment {
        content: local.content.clone(),
        parent_id: local.parent_id.clone(),
        client_key: local_id.client_key().filter(|_| keyed),
        created_at: local.created_at + chrono::Duration::seconds(i64::from(delay % 8)),
        ..comment(&cid(n), "me", 0)
    };
    Some((local_id, FeedMessage::NewComment(c)))
}

fn apply_twice(store: &mut CommentStore, msg: FeedMessage) {
    store.apply_delta(msg.clone());
    let once = store.comments().to_vec();
    let changed = store.apply_delta(msg);
    assert!(!changed, "applying a delta twice changed the store");
    assert_eq!(
        once,
        store.comments(),
        "applying a delta twice changed the store"
    );
}

fn check_invariants(store: &CommentStore) {
    let top = store.comments();

    // newest first, ties broken by id
    for w in top.windows(2) {
        assert!(
            (w[0].created_at, &w[1].id) >= (w[1].created_at, &w[0].id),
            "top-level comments out of order: {:?} then {:?}",
            w[0].id,
            w[1].id,
        );
    }

    let mut seen = HashSet::new();
    for c in top {
        assert!(c.parent_id.is_none(), "top-level comment {:?} has a parent", c.id);
        assert!(seen.insert(c.id.clone()), "duplicate comment {:?}", c.id);
        for w in c.replies.windows(2) {
            assert!(
                (w[0].created_at, &w[0].id) <= (w[1].created_at, &w[1].id),
                "replies out of order: {:?} then {:?}",
                w[0].id,
                w[1].id,
            );
        }
        for r in c.replies.iter() {
            assert!(r.replies.is_empty(), "reply {:?} has replies", r.id);
            assert!(seen.insert(r.id.clone()), "duplicate comment {:?}", r.id);
        }
    }

    for c in top.iter().flat_map(|c| std::iter::once(c).chain(c.replies.iter())) {
        let mut triples = HashSet::new();
        for r in c.reactions.iter() {
            assert_eq!(r.comment_id, c.id);
            assert!(
                triples.insert((r.user_id.clone(), r.emoji.clone())),
                "duplicate reaction {r:?}"
            );
        }
    }
}

#[test]
fn store_invariants_hold() {
    bolero::check!()
        .with_generator(bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..100usize))
        .cloned()
        .for_each(|ops| {
            let me = identity("me");
            let mut store = CommentStore::default();
            for op in ops {
                match op {
                    FuzzOp::Echo {
                        id: n,
                        pending,
                        keyed,
                        delay,
                    } => {
                        if let Some((local_id, msg)) = echo_of(&store, n, pending, keyed, delay) {
                            let pending_before = store.deliveries().len();
                            apply_twice(&mut store, msg);
                            // at most the echoed comment got coalesced
                            assert!(store.deliveries().len() + 1 >= pending_before);
                            if keyed {
                                let left = store.find(&local_id);
                                assert!(left.is_none(), "{local_id} not coalesced");
                            }
                        }
                    }
                    FuzzOp::Submit { parent, secs } => {
                        // few distinct contents, so that identical comments are pending together
                        let mut draft = Draft::new(format!("draft {}", secs % 3));
                        draft.parent_id = parent.map(|p| id(&cid(p)));
                        // Invalid parents are refused, which is fine here
                        let _ = store.submit(&me, &room(), draft, t((secs % 16).into()));
                    }
                    FuzzOp::Snapshot { ids } => {
                        let pending: Vec<CommentId> = store
                            .deliveries()
                            .into_keys()
                            .filter(|id| store.find(id).map(|c| !c.is_reply()).unwrap_or(false))
                            .collect();
                        let snapshot = ids
                            .iter()
                            .map(|n| comment(&cid(*n), "u0", (*n).into()))
                            .collect::<Vec<_>>();
                        let expected = ids.iter().map(|n| cid(*n)).collect::<HashSet<_>>();
                        store.load_snapshot(snapshot);

                        let server_side = store
                            .comments()
                            .iter()
                            .filter(|c| !c.id.is_local())
                            .map(|c| String::from(c.id.as_str()))
                            .collect::<HashSet<_>>();
                        assert_eq!(server_side, expected);
                        for local_id in pending {
                            assert!(store.find(&local_id).is_some(), "lost pending {local_id}");
                        }
                    }
                    op => {
                        if let Some(msg) = op.remote() {
                            apply_twice(&mut store, msg);
                        }
                    }
                }
                check_invariants(&store);
            }
        })
}

#[test]
fn reactions_toggle_back() {
    bolero::check!()
        .with_type::<(u8, u8, bool)>()
        .cloned()
        .for_each(|(n, u, e)| {
            let mut store = CommentStore::default();
            store.load_snapshot(vec![comment(&cid(n), "u0", 0)]);
            let before = store.comments().to_vec();
            let add = FuzzOp::React { id: n, user: u, emoji: e };
            let remove = FuzzOp::Unreact { id: n, user: u, emoji: e };
            if let Some(FeedMessage::NewReaction(r)) = add.remote() {
                assert!(store.apply_remote_reaction(ReactionChange::Added(r)));
            }
            if let Some(msg) = remove.remote() {
                assert!(store.apply_delta(msg));
            }
            assert_eq!(before, store.comments());
        })
}
