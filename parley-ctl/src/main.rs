use std::{sync::Arc, time::Duration};

use anyhow::Context;
use parley_client::{
    api::{
        AuthToken, Comment, CommentId, EditComment, Identity, NewComment, NewReaction, RoomId,
        UserId,
    },
    CommentsApi, Config, Delivery, Discussion, Draft, HttpApi, View, WsGateway,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    /// Room to act upon, usually the id of a job
    #[structopt(short, long)]
    room: String,

    /// Id of the user acting
    #[structopt(long)]
    user_id: String,

    /// Name displayed to the other participants
    #[structopt(long)]
    user_name: Option<String>,

    /// Delay between connecting to the gateway and joining the room
    #[structopt(long, default_value = "100")]
    join_grace_ms: u64,

    /// How long a remote typing indicator lasts without refresh
    #[structopt(long, default_value = "3000")]
    typing_expiry_ms: u64,

    /// Do not reload the discussion after the gateway reconnects
    #[structopt(long)]
    no_refresh_on_reconnect: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Follow the discussion live, posting each line read on stdin
    Watch,

    /// Print the discussion
    List,

    /// Post a comment
    Post {
        content: String,

        /// Id of the top-level comment to reply to
        #[structopt(long)]
        reply_to: Option<String>,
    },

    /// Edit a comment
    Edit { id: String, content: String },

    /// Delete a comment and its replies
    Delete { id: String },

    /// React to a comment
    React { id: String, emoji: String },

    /// Remove a reaction from a comment
    Unreact { id: String, emoji: String },
}

impl Opt {
    fn config(&self) -> Config {
        Config {
            join_grace: Duration::from_millis(self.join_grace_ms),
            typing_expiry: Duration::from_millis(self.typing_expiry_ms),
            refresh_on_reconnect: !self.no_refresh_on_reconnect,
            ..Config::default()
        }
    }

    fn identity(&self) -> Identity {
        Identity::new(
            UserId(self.user_id.clone()),
            self.user_name.clone().unwrap_or_else(|| self.user_id.clone()),
        )
    }
}

fn token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("PARLEY_TOKEN").context("retrieving PARLEY_TOKEN environment variable")?;
    tok.parse::<AuthToken>()
        .context("parsing PARLEY_TOKEN as an auth token")
}

fn parse_id(id: &str) -> anyhow::Result<CommentId> {
    id.parse()
        .with_context(|| format!("parsing {id:?} as a comment id"))
}

fn print_comment(c: &Comment, indent: &str, status: Option<&Delivery>) {
    let edited = if c.is_edited { " (edited)" } else { "" };
    let status = match status {
        None => "",
        Some(Delivery::Pending) => " [sending]",
        Some(Delivery::Failed(_)) => " [failed]",
    };
    println!(
        "{indent}{} {} <{}>{edited}{status}: {}",
        c.created_at.format("%Y-%m-%d %H:%M"),
        c.id,
        c.author_name,
        c.content
    );
    let mut reactions = c.reactions.iter().map(|r| r.emoji.as_str()).collect::<Vec<_>>();
    reactions.sort_unstable();
    if !reactions.is_empty() {
        println!("{indent}  {}", reactions.join(" "));
    }
}

fn print_thread(comments: &[Comment], view: Option<&View>) {
    for c in comments {
        print_comment(c, "", view.and_then(|v| v.delivery(&c.id)));
        for r in c.replies.iter() {
            print_comment(r, "    ", view.and_then(|v| v.delivery(&r.id)));
        }
    }
}

async fn watch(opt: &Opt, token: AuthToken) -> anyhow::Result<()> {
    let config = opt.config();
    let api = Arc::new(HttpApi::new(opt.host.clone(), token));
    let gateway = Arc::new(WsGateway::new(&opt.host, token, config.clone())?);
    let discussion = Discussion::spawn(
        config,
        api,
        gateway,
        RoomId(opt.room.clone()),
        opt.identity(),
        Vec::new(),
    );
    discussion.open();

    let mut views = discussion.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = views.changed() => {
                changed.context("discussion session ended")?;
                let view = views.borrow_and_update().clone();
                let online = view.online().map(|p| p.user_name.as_str()).collect::<Vec<_>>();
                let typing = view.typing.iter().map(|t| t.user_name.as_str()).collect::<Vec<_>>();
                println!("---");
                println!(
                    "{} | online: {} | typing: {}",
                    if view.connected { "connected" } else { "offline" },
                    online.join(", "),
                    typing.join(", "),
                );
                print_thread(&view.comments, Some(&view));
            }
            line = lines.next_line() => {
                let line = match line.context("reading stdin")? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                let submission = discussion.submit_comment(Draft::new(line));
                tokio::spawn(async move {
                    if let Err(err) = submission.outcome.await {
                        tracing::error!(
                            ?err,
                            local_id = %submission.local_id,
                            "failed posting comment"
                        );
                    }
                });
            }
        }
    }
    discussion.close();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();
    let token = token()?;
    let api = HttpApi::new(opt.host.clone(), token);
    let room = RoomId(opt.room.clone());

    match &opt.cmd {
        Command::Watch => watch(&opt, token).await?,
        Command::List => {
            let comments = api.fetch_comments(&room).await?;
            print_thread(&comments, None);
        }
        Command::Post { content, reply_to } => {
            let req = NewComment {
                room_id: room,
                content: content.clone(),
                parent_id: reply_to.as_deref().map(parse_id).transpose()?,
                tagged_ids: Vec::new(),
                client_key: None,
            };
            req.validate()?;
            let c = api.create_comment(&req).await?;
            println!("{}", c.id);
        }
        Command::Edit { id, content } => {
            let edit = EditComment {
                content: content.clone(),
            };
            edit.validate()?;
            let c = api.edit_comment(&parse_id(id)?, &edit).await?;
            print_comment(&c, "", None);
        }
        Command::Delete { id } => api.delete_comment(&parse_id(id)?).await?,
        Command::React { id, emoji } => {
            let reaction = NewReaction {
                emoji: emoji.clone(),
            };
            reaction.validate()?;
            api.add_reaction(&parse_id(id)?, &reaction).await?;
        }
        Command::Unreact { id, emoji } => api.remove_reaction(&parse_id(id)?, emoji).await?,
    }

    Ok(())
}
