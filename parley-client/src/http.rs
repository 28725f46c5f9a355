use anyhow::{anyhow, Context};

use crate::{
    api::{
        self, AuthToken, Comment, CommentId, EditComment, NewComment, NewReaction, Reaction,
        RoomId,
    },
    CommentsApi,
};

/// Comments service reached over HTTP
#[derive(Clone, Debug)]
pub struct HttpApi {
    client: reqwest::Client,
    host: String,
    token: AuthToken,
}

impl HttpApi {
    pub fn new(host: String, token: AuthToken) -> HttpApi {
        HttpApi {
            client: reqwest::Client::new(),
            host,
            token,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn token(&self) -> AuthToken {
        self.token
    }

    fn url(&self, segments: &[&str]) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.host)
            .with_context(|| format!("parsing host url {:?}", self.host))?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("host url {:?} cannot have a path", self.host))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        let resp = req
            .bearer_auth(self.token.to_header_value())
            .send()
            .await
            .context("sending request to the comments service")?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.bytes().await.context("reading error response")?;
        match api::Error::parse(&body) {
            Ok(err) => Err(anyhow::Error::new(err).context(format!("server answered {status}"))),
            Err(_) => Err(anyhow!("server answered {status} with an unparseable body")),
        }
    }
}

#[async_trait::async_trait]
impl CommentsApi for HttpApi {
    async fn fetch_comments(&self, room: &RoomId) -> anyhow::Result<Vec<Comment>> {
        let url = self.url(&["rooms", &room.0, "comments"])?;
        self.send(self.client.get(url))
            .await?
            .json()
            .await
            .with_context(|| format!("parsing the comments of room {room}"))
    }

    async fn create_comment(&self, c: &NewComment) -> anyhow::Result<Comment> {
        let url = self.url(&["comments"])?;
        self.send(self.client.post(url).json(c))
            .await?
            .json()
            .await
            .context("parsing created comment")
    }

    async fn edit_comment(&self, id: &CommentId, e: &EditComment) -> anyhow::Result<Comment> {
        let url = self.url(&["comments", id.as_str()])?;
        self.send(self.client.patch(url).json(e))
            .await?
            .json()
            .await
            .with_context(|| format!("parsing edited comment {id}"))
    }

    async fn delete_comment(&self, id: &CommentId) -> anyhow::Result<()> {
        let url = self.url(&["comments", id.as_str()])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn add_reaction(&self, id: &CommentId, r: &NewReaction) -> anyhow::Result<Reaction> {
        let url = self.url(&["comments", id.as_str(), "reactions"])?;
        self.send(self.client.post(url).json(r))
            .await?
            .json()
            .await
            .with_context(|| format!("parsing reaction to comment {id}"))
    }

    async fn remove_reaction(&self, id: &CommentId, emoji: &str) -> anyhow::Result<()> {
        let url = self.url(&["comments", id.as_str(), "reactions", emoji])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_escaped() {
        let api = HttpApi::new(String::from("https://parley.example/api/"), AuthToken::stub());
        assert_eq!(
            api.url(&["comments", "c1", "reactions", "👍"]).unwrap().as_str(),
            "https://parley.example/api/comments/c1/reactions/%F0%9F%91%8D"
        );
        assert_eq!(
            api.url(&["rooms", "job 1", "comments"]).unwrap().as_str(),
            "https://parley.example/api/rooms/job%201/comments"
        );
        let api = HttpApi::new(String::from("mailto:nobody"), AuthToken::stub());
        assert!(api.url(&["comments"]).is_err());
    }
}
