//! One relay endpoint: connect, subscribe, receive, and reconnect after a
//! fixed delay until cancelled.

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async_tls, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    codec::{subscription_request, RelayMessage, TopicFilter},
    error::{ClientError, Result},
    event::Event,
};

/// Connection phase of a [`RelayLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Disconnected,
    Connecting,
    Subscribed,
    /// Waiting out the reconnect interval.
    Backoff,
}

/// Point-in-time view of a link, exported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub url: String,
    pub phase: LinkPhase,
    /// Disconnects and failed attempts since the last successful subscribe.
    pub consecutive_failures: u32,
    /// When the next attempt is due, while in [`LinkPhase::Backoff`].
    pub reconnect_at: Option<Instant>,
}

/// Transport tuning shared by all links of a client.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Fixed delay between a disconnect and the next attempt.
    pub reconnect_interval: Duration,
    /// Upper bound on TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,
    /// Optional SOCKS5 proxy (host:port).
    pub tor_socks: Option<String>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            tor_socks: None,
        }
    }
}

/// Receiver of decoded events. Trust decisions happen behind this seam; the
/// relay URL is passed along for logging only.
pub trait EventSink: Send + Sync + 'static {
    fn submit(&self, relay: &str, event: Event);
}

/// Manages the connection to a single relay.
pub struct RelayLink {
    url: String,
    subscription_id: String,
    request: String,
    options: LinkOptions,
    state: watch::Sender<LinkSnapshot>,
}

impl RelayLink {
    /// Create a link in [`LinkPhase::Disconnected`]. Nothing connects until
    /// [`RelayLink::spawn`] or [`RelayLink::run`].
    pub fn new(url: impl Into<String>, topic: &TopicFilter, options: LinkOptions) -> Self {
        let url = url.into();
        let subscription_id = format!("filtersync-{:016x}", rand::random::<u64>());
        let request = subscription_request(topic, &subscription_id);
        let (state, _) = watch::channel(LinkSnapshot {
            url: url.clone(),
            phase: LinkPhase::Disconnected,
            consecutive_failures: 0,
            reconnect_at: None,
        });
        Self {
            url,
            subscription_id,
            request,
            options,
            state,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Subscribe to state changes. The link is the only writer.
    pub fn watch(&self) -> watch::Receiver<LinkSnapshot> {
        self.state.subscribe()
    }

    pub fn spawn(self, sink: Arc<dyn EventSink>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(sink, cancel))
    }

    /// Connect, receive and reconnect until `cancel` fires. Ends in
    /// [`LinkPhase::Disconnected`].
    pub async fn run(self, sink: Arc<dyn EventSink>, cancel: CancellationToken) {
        loop {
            let outcome = self.session(sink.as_ref(), &cancel).await;
            if cancel.is_cancelled() {
                break;
            }
            let delay = self.options.reconnect_interval;
            match outcome {
                Ok(()) => info!(relay = %self.url, ?delay, "relay closed connection"),
                Err(e) => warn!(relay = %self.url, error = %e, ?delay, "relay connection failed"),
            }
            let reconnect_at = Instant::now() + delay;
            self.state.send_modify(|s| {
                s.phase = LinkPhase::Backoff;
                s.consecutive_failures += 1;
                s.reconnect_at = Some(reconnect_at);
            });
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }
        self.state.send_modify(|s| {
            s.phase = LinkPhase::Disconnected;
            s.reconnect_at = None;
        });
        debug!(relay = %self.url, "relay link stopped");
    }

    /// One connection lifetime. `Ok` means the relay closed cleanly or the
    /// link was cancelled.
    async fn session(&self, sink: &dyn EventSink, cancel: &CancellationToken) -> Result<()> {
        self.state.send_modify(|s| {
            s.phase = LinkPhase::Connecting;
            s.reconnect_at = None;
        });
        debug!(relay = %self.url, "connecting");
        let connect = timeout(
            self.options.connect_timeout,
            connect_ws(&self.url, self.options.tor_socks.as_deref()),
        );
        let mut ws = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            res = connect => res.map_err(|_| ClientError::Transport("connect timed out".into()))??,
        };
        let subscribe = timeout(
            self.options.connect_timeout,
            ws.send(Message::Text(self.request.clone())),
        );
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            res = subscribe => res.map_err(|_| ClientError::Transport("subscribe timed out".into()))??,
        }
        self.state.send_modify(|s| {
            s.phase = LinkPhase::Subscribed;
            s.consecutive_failures = 0;
        });
        info!(relay = %self.url, subscription = %self.subscription_id, "subscribed");

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    if timeout(self.options.connect_timeout, ws.close(None)).await.is_err() {
                        debug!(relay = %self.url, "close timed out");
                    }
                    return Ok(());
                }
                msg = ws.next() => msg,
            };
            match msg {
                None | Some(Ok(Message::Close(_))) => return Ok(()),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(txt))) => self.handle_frame(&txt, sink),
                Some(Ok(_)) => {}
            }
        }
    }

    fn handle_frame(&self, frame: &str, sink: &dyn EventSink) {
        match RelayMessage::decode(frame) {
            Ok(RelayMessage::Event {
                subscription_id,
                event,
            }) => {
                if subscription_id == self.subscription_id {
                    sink.submit(&self.url, *event);
                } else {
                    debug!(relay = %self.url, subscription = %subscription_id, "event for foreign subscription");
                }
            }
            Ok(RelayMessage::EndOfStoredEvents(_)) => {
                debug!(relay = %self.url, "end of stored events");
            }
            Ok(RelayMessage::Notice(msg)) => info!(relay = %self.url, notice = %msg, "relay notice"),
            Ok(RelayMessage::Unknown(kind)) => {
                debug!(relay = %self.url, %kind, "dropping unsupported frame");
            }
            Err(e) => debug!(relay = %self.url, error = %e, "dropping undecodable frame"),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<Box<dyn AsyncReadWrite + Unpin + Send>>>;

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
pub(crate) async fn connect_ws(relay: &str, tor_socks: Option<&str>) -> Result<WsStream> {
    let url = Url::parse(relay)?;
    let host = url
        .host_str()
        .ok_or_else(|| ClientError::InvalidRelayUrl(format!("{relay}: missing host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ClientError::InvalidRelayUrl(format!("{relay}: missing port")))?;
    let req = relay.into_client_request()?;
    let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = tor_socks {
        Box::new(Socks5Stream::connect(proxy, (host, port)).await?)
    } else {
        Box::new(TcpStream::connect((host, port)).await?)
    };
    let (ws, _) = client_async_tls(req, stream).await?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}
