use crate::api::{Comment, CommentId};

/// Lookups in a top-level comment list whose comments hold their replies
pub trait CommentTree {
    fn find_comment(&self, id: &CommentId) -> Option<&Comment>;

    fn find_comment_mut(&mut self, id: &CommentId) -> Option<&mut Comment>;

    /// Index of the top-level comment that is, or holds as a reply, comment `id`
    fn thread_of(&self, id: &CommentId) -> Option<usize>;

    /// Removes comment `id` wherever it lives. Removing a top-level comment drops its replies.
    /// Returns whether anything was removed.
    fn remove_comment(&mut self, id: &CommentId) -> bool;

    /// Number of comments, replies included
    fn count_comments(&self) -> usize;
}

impl CommentTree for Vec<Comment> {
    fn find_comment(&self, id: &CommentId) -> Option<&Comment> {
        for c in self.iter() {
            if c.id == *id {
                return Some(c);
            }
            if let Some(r) = c.replies.iter().find(|r| r.id == *id) {
                return Some(r);
            }
        }
        None
    }

    fn find_comment_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        for c in self.iter_mut() {
            if c.id == *id {
                return Some(c);
            }
            if let Some(r) = c.replies.iter_mut().find(|r| r.id == *id) {
                return Some(r);
            }
        }
        None
    }

    fn thread_of(&self, id: &CommentId) -> Option<usize> {
        self.iter()
            .position(|c| c.id == *id || c.replies.iter().any(|r| r.id == *id))
    }

    fn remove_comment(&mut self, id: &CommentId) -> bool {
        let len_before = self.count_comments();
        // Both passes always run: the id may be a top-level comment, a reply, or both if some
        // server sent a broken tree
        self.retain(|c| c.id != *id);
        for c in self.iter_mut() {
            c.replies.retain(|r| r.id != *id);
        }
        self.count_comments() != len_before
    }

    fn count_comments(&self) -> usize {
        self.iter().map(|c| 1 + c.replies.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{comment, id, reply};

    fn tree() -> Vec<Comment> {
        let mut c1 = comment("c1", "u1", 0);
        c1.replies = vec![reply("r1", "c1", "u2", 5), reply("r2", "c1", "u1", 6)];
        vec![comment("c2", "u2", 10), c1]
    }

    #[test]
    fn lookups() {
        let t = tree();
        assert_eq!(t.count_comments(), 4);
        assert_eq!(t.find_comment(&id("r2")).map(|c| c.author_id.0.as_str()), Some("u1"));
        assert_eq!(t.thread_of(&id("r1")), Some(1));
        assert_eq!(t.thread_of(&id("c2")), Some(0));
        assert_eq!(t.thread_of(&id("nope")), None);
    }

    #[test]
    fn removing_a_reply_keeps_the_thread() {
        let mut t = tree();
        assert!(t.remove_comment(&id("r1")));
        assert_eq!(t.count_comments(), 3);
        assert!(t.find_comment(&id("c1")).is_some());
        assert!(!t.remove_comment(&id("r1")));
    }

    #[test]
    fn removing_a_thread_drops_its_replies() {
        let mut t = tree();
        assert!(t.remove_comment(&id("c1")));
        assert_eq!(t.count_comments(), 1);
        assert!(t.find_comment(&id("r1")).is_none());
        assert!(t.find_comment(&id("r2")).is_none());
    }
}
