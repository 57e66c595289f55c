//! WebSocket implementation of [`RoomChannel`].
//!
//! One socket carries every joined room. Commands go out as JSON text frames,
//! [`ChannelEvent`]s come back the same way. A dropped socket is reopened
//! after a fixed delay, and [`ChannelEvent::Reconnected`] is published once
//! it is back so subscribers can rejoin and resync.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::{
    domain::RoomKey,
    protocol::{ChannelCommand, ChannelEvent},
};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::sleep,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{config::ClientSettings, RoomChannel};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
struct Endpoint {
    url: Url,
    auth_token: Option<String>,
}

impl Endpoint {
    async fn open(&self) -> Result<WsStream> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid websocket url: {}", self.url))?;
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("auth token is not a valid header value")?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (stream, _) = connect_async(request)
            .await
            .with_context(|| format!("failed to connect websocket: {}", self.url))?;
        Ok(stream)
    }
}

pub struct WebSocketRoomChannel {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    events: broadcast::Sender<ChannelEvent>,
    task: JoinHandle<()>,
}

impl WebSocketRoomChannel {
    pub async fn connect_with_settings(settings: &ClientSettings) -> Result<Arc<Self>> {
        Self::connect(
            settings.resolved_ws_url()?,
            settings.auth_token.clone(),
            settings.reconnect_delay(),
            settings.event_buffer,
        )
        .await
    }

    /// Opens the socket and starts the read/write loop. The first connection
    /// attempt must succeed; later drops are retried every `reconnect_delay`.
    pub async fn connect(
        url: Url,
        auth_token: Option<String>,
        reconnect_delay: Duration,
        event_buffer: usize,
    ) -> Result<Arc<Self>> {
        let endpoint = Endpoint { url, auth_token };
        let stream = endpoint.open().await?;
        info!(url = %endpoint.url, "transport: websocket connected");

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(event_buffer.max(1));
        let task = tokio::spawn(run_socket(
            endpoint,
            stream,
            reconnect_delay,
            command_rx,
            events.clone(),
        ));

        Ok(Arc::new(Self {
            commands,
            events,
            task,
        }))
    }

    fn send_command(&self, command: ChannelCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("websocket task has stopped"))
    }
}

impl Drop for WebSocketRoomChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl RoomChannel for WebSocketRoomChannel {
    /// Queues the join; it is written as soon as the socket is writable.
    async fn join(&self, room: &RoomKey) -> Result<()> {
        self.send_command(ChannelCommand::Join { room: room.clone() })
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}

enum SessionEnd {
    Dropped,
    Shutdown,
}

async fn run_socket(
    endpoint: Endpoint,
    mut stream: WsStream,
    reconnect_delay: Duration,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
    events: broadcast::Sender<ChannelEvent>,
) {
    loop {
        match pump_session(stream, &mut commands, &events).await {
            SessionEnd::Shutdown => return,
            SessionEnd::Dropped => {}
        }

        stream = loop {
            sleep(reconnect_delay).await;
            match endpoint.open().await {
                Ok(stream) => break stream,
                Err(err) => warn!(url = %endpoint.url, "transport: reconnect failed: {err:#}"),
            }
        };
        info!(url = %endpoint.url, "transport: websocket reconnected");
        let _ = events.send(ChannelEvent::Reconnected);
    }
}

async fn pump_session(
    stream: WsStream,
    commands: &mut mpsc::UnboundedReceiver<ChannelCommand>,
    events: &broadcast::Sender<ChannelEvent>,
) -> SessionEnd {
    let (mut writer, mut reader) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = writer.close().await;
                    return SessionEnd::Shutdown;
                };
                let text = match serde_json::to_string(&command) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("transport: failed to encode command: {err}");
                        continue;
                    }
                };
                if let Err(err) = writer.send(Message::Text(text)).await {
                    warn!("transport: websocket send failed: {err}");
                    return SessionEnd::Dropped;
                }
            }
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ChannelEvent>(&text) {
                    Ok(event) => {
                        let _ = events.send(event);
                    }
                    Err(err) => debug!("transport: ignoring invalid channel event: {err}"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    warn!("transport: websocket closed by server");
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("transport: websocket receive failed: {err}");
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
