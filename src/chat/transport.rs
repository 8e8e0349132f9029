//! Websocket receive loop with a polling fallback.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::log::SharedChatLog;
use crate::client::Client;
use crate::error::{Error, Result};
use crate::types::{Channel, ChatMessage};

const EVENT_CAPACITY: usize = 64;

/// Which transport is delivering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Socket,
    Polling,
}

/// Notifications for whoever renders the chat panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// New messages were merged into the log.
    Merged { added: usize },
    /// The active transport changed.
    Transport(TransportKind),
}

/// Receive side of the chat. Consumed by [`ChatTransport::start`].
#[derive(Debug)]
pub struct ChatTransport {
    client: Client,
    token: String,
    poll_interval: Duration,
    log: SharedChatLog,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatTransport {
    pub fn new(
        client: Client,
        token: impl Into<String>,
        poll_interval: Duration,
        log: SharedChatLog,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            token: token.into(),
            poll_interval,
            log,
            events,
        }
    }

    /// Observe merges and transport switches.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Spawn the receive loop.
    pub fn start(self) -> ChatHandle {
        let cancel = CancellationToken::new();
        let events = self.events.clone();
        let task = tokio::spawn(self.run(cancel.clone()));
        ChatHandle {
            cancel,
            task: Some(task),
            events,
        }
    }

    async fn run(self, cancel: CancellationToken) {
        match self.connect_socket(&cancel).await {
            Some(Ok(())) => tracing::info!("Chat socket closed, falling back to polling"),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Chat socket unavailable, falling back to polling");
            }
            None => return,
        }
        self.poll(&cancel).await;
    }

    /// Run the socket until it closes or fails. `None` means cancelled.
    async fn connect_socket(&self, cancel: &CancellationToken) -> Option<Result<()>> {
        let url = match self.client.chat_ws_url(&self.token) {
            Ok(url) => url,
            Err(e) => return Some(Err(e)),
        };

        let connect = tokio::time::timeout(
            self.client.resolver().config().timeout(),
            tokio_tungstenite::connect_async(url.as_str()),
        );
        let mut stream = tokio::select! {
            () = cancel.cancelled() => return None,
            res = connect => match res {
                Ok(Ok((stream, _))) => stream,
                Ok(Err(e)) => return Some(Err(Error::NetworkError(e.to_string()))),
                Err(_) => return Some(Err(Error::NetworkError("chat socket connect timed out".into()))),
            },
        };

        tracing::info!("Chat socket connected");
        self.emit(ChatEvent::Transport(TransportKind::Socket));

        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => return None,
                frame = stream.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ChatMessage>(text.as_str()) {
                        Ok(msg) => self.merge(vec![msg]),
                        Err(e) => tracing::debug!(error = %e, "Skipping undecodable chat frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Some(Ok(())),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(Error::NetworkError(e.to_string()))),
            }
        }
    }

    async fn poll(&self, cancel: &CancellationToken) {
        self.emit(ChatEvent::Transport(TransportKind::Polling));
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }
            let api = self.client.chat(&self.token);
            for channel in Channel::ALL {
                let fetched = tokio::select! {
                    () = cancel.cancelled() => return,
                    res = api.messages(channel) => res,
                };
                match fetched {
                    Ok(messages) => self.merge(messages),
                    Err(e) => tracing::warn!(
                        channel = %channel,
                        error = %e,
                        "Chat poll failed"
                    ),
                }
            }
        }
    }

    fn merge(&self, messages: Vec<ChatMessage>) {
        let added = match self.log.lock() {
            Ok(mut log) => log.merge(messages),
            Err(e) => {
                tracing::error!(error = %e, "Chat log poisoned");
                return;
            }
        };
        if added > 0 {
            self.emit(ChatEvent::Merged { added });
        }
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// A running transport. Dropping it cancels the loop.
#[derive(Debug)]
pub struct ChatHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Chat transport task ended abnormally");
            }
        }
    }
}

impl Drop for ChatHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Post a message and merge the acknowledged copy.
pub(crate) async fn send_message(
    client: &Client,
    token: &str,
    log: &SharedChatLog,
    channel: Channel,
    content: &str,
) -> Result<ChatMessage> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::InvalidInput("message cannot be empty".into()));
    }
    let created = client.chat(token).send(channel, content).await?;
    if let Ok(mut guard) = log.lock() {
        guard.merge([created.clone()]);
    }
    Ok(created)
}
