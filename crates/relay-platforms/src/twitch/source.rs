//! Twitch chat source over anonymous IRC WebSocket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chat_relay::{ChatSource, EntrySnapshot, RawEntry};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use super::irc::{self, IrcMessage};
use crate::error::{PlatformError, Result};
use crate::http::install_rustls_provider;

/// Twitch WebSocket IRC server URL
pub const TWITCH_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type IrcStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live IRC session joined to one channel.
struct IrcConnection {
    channel: String,
    connected: Arc<AtomicBool>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: JoinHandle<()>,
}

impl Drop for IrcConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Entry list shared between the reader task and the source.
///
/// Retrieval hands out the current list without copying it. The reader
/// appends in place unless a handed-out snapshot is still alive.
#[derive(Clone, Default)]
struct Transcript(Arc<Mutex<EntrySnapshot>>);

impl Transcript {
    fn push(&self, entry: RawEntry) {
        Arc::make_mut(&mut *self.0.lock()).push(entry);
    }

    fn clear(&self) {
        *self.0.lock() = EntrySnapshot::default();
    }

    fn snapshot(&self) -> EntrySnapshot {
        self.0.lock().clone()
    }
}

/// Chat source backed by Twitch IRC.
///
/// A reader task appends every chat-bearing line to a transcript that only
/// grows until the next (re)connect; retrieval returns a snapshot of it.
pub struct TwitchChatSource {
    transcript: Transcript,
    connection: Option<IrcConnection>,
    connect_timeout: Duration,
}

impl Default for TwitchChatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TwitchChatSource {
    pub fn new() -> Self {
        Self {
            transcript: Transcript::default(),
            connection: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.connected.load(Ordering::SeqCst))
    }

    async fn connect(&mut self, channel: &str) -> Result<()> {
        self.disconnect().await;
        install_rustls_provider();

        let channel = irc::normalize_channel(channel);
        info!("Connecting to WebSocket: {}", TWITCH_WS_URL);

        let (mut stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(TWITCH_WS_URL))
            .await
            .map_err(|_| {
                PlatformError::connection(format!(
                    "timed out after {:?} connecting to Twitch IRC",
                    self.connect_timeout
                ))
            })??;

        let nick = irc::generate_anonymous_nick();
        for line in irc::handshake(&channel, &nick) {
            stream.send(Message::Text(line.into())).await?;
        }

        self.transcript.clear();
        let connected = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(read_loop(
            stream,
            self.transcript.clone(),
            connected.clone(),
            shutdown_rx,
            channel.clone(),
        ));

        info!(%channel, %nick, "Joined Twitch chat");
        self.connection = Some(IrcConnection {
            channel,
            connected,
            shutdown_tx: Some(shutdown_tx),
            task,
        });
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            if let Some(tx) = conn.shutdown_tx.take() {
                let _ = tx.try_send(());
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut conn.task)
                .await
                .is_err()
            {
                debug!(channel = %conn.channel, "IRC reader did not stop in time, aborting");
            }
        }
    }
}

/// Read IRC frames until shutdown or socket loss.
async fn read_loop(
    mut stream: IrcStream,
    transcript: Transcript,
    connected: Arc<AtomicBool>,
    mut shutdown_rx: mpsc::Receiver<()>,
    channel: String,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = stream.close(None).await;
                break;
            }
            msg_opt = stream.next() => {
                let text = match msg_opt {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = stream.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!(%channel, ?frame, "Twitch closed the IRC socket");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        warn!("WebSocket stream closed");
                        break;
                    }
                };

                // Twitch may send multiple lines in one frame
                let mut reconnect = false;
                for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    let Some(msg) = IrcMessage::parse(line) else {
                        trace!("Unparsable IRC line: {}", line);
                        continue;
                    };
                    match msg.command {
                        "PING" => {
                            let pong = format!("PONG :{}", msg.trailing.unwrap_or("tmi.twitch.tv"));
                            debug!("Sending PONG: {}", pong);
                            if let Err(e) = stream.send(Message::Text(pong.into())).await {
                                error!("Failed to send PONG: {}", e);
                                reconnect = true;
                                break;
                            }
                        }
                        "RECONNECT" => {
                            info!(%channel, "Twitch requested a reconnect");
                            reconnect = true;
                            break;
                        }
                        _ => {
                            if let Some(entry) = msg.to_entry() {
                                transcript.push(entry);
                            }
                        }
                    }
                }
                if reconnect {
                    break;
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    debug!("IRC reader for {} stopped", channel);
}

#[async_trait]
impl ChatSource for TwitchChatSource {
    fn platform(&self) -> &str {
        "twitch"
    }

    fn location_of(&self, resource_id: &str) -> String {
        irc::normalize_channel(resource_id)
    }

    async fn fetch_current_entries(&mut self) -> chat_relay::Result<EntrySnapshot> {
        if !self.is_connected() {
            return Err(PlatformError::connection("not connected to Twitch IRC").into());
        }
        Ok(self.transcript.snapshot())
    }

    async fn current_location(&mut self) -> chat_relay::Result<String> {
        Ok(match &self.connection {
            Some(conn) if conn.connected.load(Ordering::SeqCst) => conn.channel.clone(),
            _ => String::new(),
        })
    }

    async fn navigate_to(&mut self, resource_id: &str) -> chat_relay::Result<()> {
        Ok(self.connect(resource_id).await?)
    }

    async fn reload(&mut self) -> chat_relay::Result<()> {
        let channel = self
            .connection
            .as_ref()
            .map(|c| c.channel.clone())
            .ok_or_else(|| PlatformError::connection("no channel joined yet"))?;
        Ok(self.connect(&channel).await?)
    }

    async fn resolve_live_resource_id(
        &mut self,
        _channel: &str,
    ) -> chat_relay::Result<Option<String>> {
        // Chat is bound to the channel, there is no broadcast id to follow.
        Ok(None)
    }

    async fn close(&mut self) -> chat_relay::Result<()> {
        self.disconnect().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_source() {
        let mut source = TwitchChatSource::new();
        assert_eq!(source.current_location().await.unwrap(), "");
        assert_eq!(source.location_of("SomeStreamer"), "#somestreamer");
        assert!(source.fetch_current_entries().await.is_err());
        assert!(source.reload().await.is_err());
        assert_eq!(source.resolve_live_resource_id("x").await.unwrap(), None);
    }

    #[test]
    fn test_transcript_snapshots_share_the_list() {
        let transcript = Transcript::default();
        transcript.push(RawEntry::chat("a", "1"));
        transcript.push(RawEntry::chat("b", "2"));

        let first = transcript.snapshot();
        assert!(Arc::ptr_eq(&first, &transcript.snapshot()));

        // a live snapshot is not affected by later appends
        transcript.push(RawEntry::chat("c", "3"));
        assert_eq!(first.len(), 2);
        assert_eq!(transcript.snapshot().len(), 3);
        drop(first);

        // with no snapshot alive, appends reuse the same list
        let list = Arc::as_ptr(&transcript.snapshot());
        transcript.push(RawEntry::chat("d", "4"));
        assert_eq!(Arc::as_ptr(&transcript.snapshot()), list);

        transcript.clear();
        assert!(transcript.snapshot().is_empty());
    }

    /// Real integration test - connects to an actual Twitch channel
    /// Run with: cargo test --package relay-platforms twitch::source::tests::test_real_connection -- --ignored --nocapture
    #[tokio::test]
    #[ignore]
    async fn test_real_connection() {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();

        let mut source = TwitchChatSource::new();
        let channel = "dota2ti";
        source.navigate_to(channel).await.expect("Failed to connect");
        assert_eq!(source.current_location().await.unwrap(), "#dota2ti");

        tokio::time::sleep(Duration::from_secs(30)).await;
        let entries = source.fetch_current_entries().await.unwrap();
        println!("Received {} entries", entries.len());
        for entry in entries.iter().take(20) {
            println!("{:?}: {:?}", entry.author, entry.body);
        }

        source.close().await.unwrap();
    }
}
