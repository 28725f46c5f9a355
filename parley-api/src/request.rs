use crate::{ClientKey, CommentId, Error, RoomId};

/// Body of `POST /comments`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub room_id: RoomId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tagged_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<ClientKey>,
}

impl NewComment {
    // Note: the parent id is not validated here, as only the holder of the comment tree can
    // tell whether it designates a top-level comment
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.room_id.0)?;
        crate::validate_text(&self.content)?;
        for t in self.tagged_ids.iter() {
            crate::validate_string(t)?;
        }
        Ok(())
    }
}

/// Body of `PATCH /comments/{id}`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EditComment {
    pub content: String,
}

impl EditComment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_text(&self.content)
    }
}

/// Body of `POST /comments/{id}/reactions`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewReaction {
    pub emoji: String,
}

impl NewReaction {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.emoji)?;
        if self.emoji.trim().is_empty() {
            return Err(Error::EmptyEmoji);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_comment_body() {
        let c = NewComment {
            room_id: RoomId(String::from("job-1")),
            content: String::from("Looks good"),
            parent_id: Some("c1".parse().unwrap()),
            tagged_ids: vec![String::from("cand-7")],
            client_key: None,
        };
        assert_eq!(c.validate(), Ok(()));
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            serde_json::json!({
                "roomId": "job-1",
                "content": "Looks good",
                "parentId": "c1",
                "taggedIds": ["cand-7"],
            })
        );

        let blank = NewComment {
            content: String::from("   "),
            ..c
        };
        assert_eq!(blank.validate(), Err(Error::EmptyComment));
    }

    #[test]
    fn reaction_body() {
        assert_eq!(
            NewReaction {
                emoji: String::from("👍")
            }
            .validate(),
            Ok(())
        );
        assert_eq!(
            NewReaction {
                emoji: String::new()
            }
            .validate(),
            Err(Error::EmptyEmoji)
        );
    }
}
