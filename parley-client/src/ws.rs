use anyhow::{anyhow, Context};
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::Instant};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::{
    api::{AuthToken, FeedMessage, GatewayMessage, Identity, RoomId},
    Config, Error, Feed, FeedDriver, FeedEvent, Gateway,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Realtime gateway reached over a websocket, reconnecting whenever the connection drops
#[derive(Clone, Debug)]
pub struct WsGateway {
    url: String,
    token: AuthToken,
    config: Config,
}

impl WsGateway {
    /// Fails if `host` cannot be turned into the gateway's websocket url
    pub fn new(host: &str, token: AuthToken, config: Config) -> Result<WsGateway, Error> {
        Ok(WsGateway {
            url: ws_url(host).map_err(Error::Transport)?,
            token,
            config,
        })
    }
}

impl Gateway for WsGateway {
    fn connect(&self, room: &RoomId, me: &Identity) -> Feed {
        let (feed, driver) = Feed::new(room.clone());
        tokio::spawn(run_feed(
            self.url.clone(),
            self.token,
            me.clone(),
            self.config.clone(),
            driver,
        ));
        feed
    }
}

fn ws_url(host: &str) -> anyhow::Result<String> {
    let rest = host
        .strip_prefix("http")
        .ok_or_else(|| anyhow!("host {host:?} is not an http(s) url"))?;
    Ok(format!("ws{}/ws/rooms", rest.trim_end_matches('/')))
}

async fn open(url: &str, token: AuthToken) -> anyhow::Result<Socket> {
    let (mut sock, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    sock.send(Message::Text(token.to_header_value()))
        .await
        .context("sending auth token")?;
    match sock.next().await {
        Some(Ok(Message::Text(t))) if t == "ok" => Ok(sock),
        Some(Ok(m)) => Err(anyhow!("gateway refused authentication: {m:?}")),
        Some(Err(e)) => Err(anyhow::Error::new(e).context("reading authentication answer")),
        None => Err(anyhow!("gateway closed the connection during authentication")),
    }
}

async fn send(sock: &mut Socket, msg: &GatewayMessage) -> anyhow::Result<()> {
    let text = serde_json::to_string(msg).context("serializing gateway message")?;
    sock.send(Message::Text(text))
        .await
        .context("sending gateway message")
}

enum Frame {
    Feed(FeedMessage),
    Control,
    Close,
}

fn parse(msg: Message) -> anyhow::Result<Frame> {
    Ok(match msg {
        Message::Text(t) => {
            Frame::Feed(serde_json::from_str(&t).context("parsing text feed message")?)
        }
        Message::Binary(b) => {
            Frame::Feed(serde_json::from_slice(&b).context("parsing binary feed message")?)
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Frame::Control,
        Message::Close(_) => Frame::Close,
    })
}

enum Input {
    Cancelled,
    PongOverdue,
    PingDue,
    Outbound(Option<GatewayMessage>),
    Inbound(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

async fn run_feed(
    url: String,
    token: AuthToken,
    me: Identity,
    config: Config,
    mut driver: FeedDriver,
) {
    let room = driver.room.clone();

    let mut first_attempt = true;
    'reconnect: loop {
        match first_attempt {
            true => first_attempt = false,
            false => {
                tracing::warn!(%room, "lost realtime gateway connection");
                driver.emit(FeedEvent::Disconnected);
                tokio::select! {
                    _ = driver.cancel.cancellation() => return,
                    _ = tokio::time::sleep(config.reconnect_spacing) => (),
                }
            }
        }

        // Connect and authenticate
        let sock = tokio::select! {
            _ = driver.cancel.cancellation() => return,
            sock = open(&url, token) => sock,
        };
        let mut sock = match sock {
            Ok(sock) => sock,
            Err(err) => {
                tracing::warn!(?err, "failed connecting to realtime gateway");
                continue 'reconnect;
            }
        };
        tracing::info!("successfully authenticated to realtime gateway");

        // Give the gateway some time to register the connection before joining
        tokio::select! {
            _ = driver.cancel.cancellation() => return,
            _ = tokio::time::sleep(config.join_grace) => (),
        }
        let join = GatewayMessage::JoinRoom {
            room_id: room.clone(),
            identity: me.clone(),
        };
        if let Err(err) = send(&mut sock, &join).await {
            tracing::warn!(?err, %room, "failed joining room");
            continue 'reconnect;
        }
        // Typing signals queued while offline are stale by now
        while let Ok(Some(_)) = driver.outbound.try_next() {}
        tracing::info!(%room, "joined room");
        driver.emit(FeedEvent::Connected);

        // Finally, run the feed
        let mut next_ping = Instant::now() + config.ping_interval;
        let mut last_pong = Instant::now();
        loop {
            let input = tokio::select! {
                _ = driver.cancel.cancellation() => Input::Cancelled,
                _ = tokio::time::sleep_until(last_pong + config.pong_timeout) => Input::PongOverdue,
                _ = tokio::time::sleep_until(next_ping) => Input::PingDue,
                msg = driver.outbound.next() => Input::Outbound(msg),
                msg = sock.next() => Input::Inbound(msg),
            };
            match input {
                Input::Cancelled => {
                    // flush the last signals, such as the stop typing of a closing panel
                    while let Ok(Some(msg)) = driver.outbound.try_next() {
                        if let Err(err) = send(&mut sock, &msg).await {
                            tracing::debug!(?err, "failed flushing message");
                            break;
                        }
                    }
                    let leave = GatewayMessage::LeaveRoom {
                        room_id: room.clone(),
                    };
                    if let Err(err) = send(&mut sock, &leave).await {
                        tracing::debug!(?err, "failed leaving room");
                    }
                    if let Err(err) = sock.close(None).await {
                        tracing::debug!(?err, "failed closing realtime gateway connection");
                    }
                    tracing::info!(%room, "left room");
                    return;
                }
                Input::PongOverdue => {
                    tracing::warn!("no pong received in time");
                    continue 'reconnect;
                }
                Input::PingDue => {
                    if let Err(err) = send(&mut sock, &GatewayMessage::Ping).await {
                        tracing::warn!(?err, "failed sending ping");
                        continue 'reconnect;
                    }
                    next_ping += config.ping_interval;
                }
                // The feed was dropped, cancellation fires next
                Input::Outbound(None) => (),
                Input::Outbound(Some(msg)) => {
                    if let Err(err) = send(&mut sock, &msg).await {
                        tracing::warn!(?err, "failed sending message");
                        continue 'reconnect;
                    }
                }
                Input::Inbound(None) => continue 'reconnect,
                Input::Inbound(Some(Err(err))) => {
                    tracing::warn!(?err, "realtime gateway connection errored");
                    continue 'reconnect;
                }
                Input::Inbound(Some(Ok(msg))) => match parse(msg) {
                    Ok(Frame::Control) => (),
                    Ok(Frame::Close) => {
                        tracing::info!("realtime gateway closed the connection");
                        continue 'reconnect;
                    }
                    Ok(Frame::Feed(FeedMessage::Pong)) => last_pong = Instant::now(),
                    Ok(Frame::Feed(msg)) => {
                        tracing::trace!(?msg, "received feed message");
                        driver.emit(FeedEvent::Message(msg));
                    }
                    Err(err) => tracing::warn!(?err, "ignoring unexpected gateway message"),
                },
            }
        }
    }
}
