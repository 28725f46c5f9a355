use std::cmp::Ordering;

use crate::api::Comment;

pub trait OrderExt {
    /// Sorts a top-level list newest first, and the replies of each of its comments oldest
    /// first. Ties on the creation date are broken by id so that the order is total.
    fn sort_thread(&mut self);

    /// Sorts a list of replies oldest first
    fn sort_replies(&mut self);
}

fn newest_first(a: &Comment, b: &Comment) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

fn oldest_first(a: &Comment, b: &Comment) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

impl OrderExt for [Comment] {
    fn sort_thread(&mut self) {
        self.sort_unstable_by(newest_first);
        for c in self.iter_mut() {
            c.replies.sort_replies();
        }
    }

    fn sort_replies(&mut self) {
        self.sort_unstable_by(oldest_first);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{comment, reply};

    #[test]
    fn threads_newest_first_replies_oldest_first() {
        let mut parent = comment("c1", "u1", 0);
        parent.replies = vec![reply("r2", "c1", "u2", 20), reply("r1", "c1", "u2", 10)];
        let mut thread = vec![parent, comment("c2", "u1", 30), comment("c0", "u1", 30)];
        thread.sort_thread();

        let ids = thread.iter().map(|c| c.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["c0", "c2", "c1"]);
        let replies = thread[2]
            .replies
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(replies, vec!["r1", "r2"]);
    }
}
