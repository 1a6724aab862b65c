//! Push-model subscription: a persistent connection with credit-based
//! flow control, acknowledgement, and automatic reconnection.
//!
//! ## Architecture
//!
//! ```text
//! RelayClient::subscribe ──▶ Subscription (handle)
//!                              │  recv()        bounded mpsc, capacity = permits
//!                              │  acknowledge() REST, independent of the socket
//!                              │  close()       watch flag, checked at every await
//!                              ▼
//!                            driver task ──▶ WebSocket (one live handle,
//!                                            replaced wholesale on reconnect)
//! ```
//!
//! A single driver task owns the socket and the whole lifecycle, so no
//! locks guard the connection handle. Inbound frames are decoded one
//! message per frame and forwarded in arrival order; the channel capacity
//! mirrors the broker-side prefetch credit, so an unread backlog exerts
//! backpressure on the driver rather than growing without bound.
//!
//! ## State machine
//!
//! `Connecting -> Connected` on handshake success (resets the reconnect
//! budget). Any disconnect re-enters `Connecting` after a jittered
//! exponential delay, until the attempt cap makes the subscription emit a
//! terminal [`ClientError::ConnectionExhausted`] and close. `Closed` is
//! terminal: no transition leaves it, pending reconnect timers become
//! no-ops, and in-flight frames are dropped instead of delivered.
//!
//! Two disconnect causes skip the reconnect path entirely: a frame that
//! fails to decode (protocol violation — the broker and client no longer
//! agree on the wire format, retrying cannot help), and a not-found
//! rejection (the topic's subscription endpoint does not exist; it will
//! not start existing on retry).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::client::Credential;
use crate::consumer;
use crate::error::{ClientError, Result};
use crate::message::{Message, MessageId};
use crate::rest::RequestExecutor;
use crate::retry::RetryPolicy;

const STATE_CONNECTING: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle state of a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// A connection attempt is in flight (initial or reconnect).
    Connecting,
    /// The push connection is established and delivering.
    Connected,
    /// Terminal. No further connection attempts or deliveries.
    Closed,
}

fn state_from_u8(raw: u8) -> SubscriptionState {
    match raw {
        STATE_CONNECTING => SubscriptionState::Connecting,
        STATE_CONNECTED => SubscriptionState::Connected,
        _ => SubscriptionState::Closed,
    }
}

/// An event delivered to the subscriber.
#[derive(Debug)]
pub enum SubscriptionEvent {
    /// An inbound message, in the order received from the connection.
    Message(Message),
    /// A subscription error. `Protocol` and `ConnectionExhausted` are
    /// terminal (the subscription is closed when they arrive); an
    /// `Api { status: 404 }` reports a not-found endpoint, also terminal.
    Error(ClientError),
}

pub(crate) struct SubscriptionConfig {
    pub url: String,
    pub topic: String,
    pub credential: Credential,
    pub project_id: String,
    pub permits: u32,
    pub reconnect: RetryPolicy,
}

/// Handle to a push subscription.
///
/// Construction (via [`RelayClient::subscribe`]) immediately begins
/// connecting on a dedicated driver task. Consume events with [`recv`];
/// the stream is lazy, order-preserving and potentially infinite until
/// the subscription closes, after which `recv` drains buffered events and
/// then yields `None`. A closed subscription cannot be restarted — build
/// a fresh one to resume.
///
/// Dropping the handle closes the subscription.
///
/// [`RelayClient::subscribe`]: crate::client::RelayClient::subscribe
/// [`recv`]: Subscription::recv
pub struct Subscription {
    events: mpsc::Receiver<SubscriptionEvent>,
    state: Arc<AtomicU8>,
    close: watch::Sender<bool>,
    executor: Arc<RequestExecutor>,
    project_id: String,
    topic: String,
    credential: Credential,
}

impl Subscription {
    pub(crate) fn spawn(config: SubscriptionConfig, executor: Arc<RequestExecutor>) -> Self {
        // Channel capacity mirrors the prefetch credit window.
        let capacity = config.permits.max(1) as usize;
        let (event_tx, events) = mpsc::channel(capacity);
        let (close, close_rx) = watch::channel(false);
        let state = Arc::new(AtomicU8::new(STATE_CONNECTING));

        let driver = Driver {
            url: config.url,
            authorization: config.credential.authorization(),
            reconnect: config.reconnect,
            events: event_tx,
            state: state.clone(),
            close: close_rx,
        };
        tokio::spawn(driver.run());

        Self {
            events,
            state,
            close,
            executor,
            project_id: config.project_id,
            topic: config.topic,
            credential: config.credential,
        }
    }

    /// Receive the next event, or `None` once the subscription has closed
    /// and all buffered events were drained.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        state_from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The topic this subscription delivers.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Acknowledge delivered messages over REST.
    ///
    /// Always routed through the request executor; works whether or not
    /// the push connection is currently open.
    pub async fn acknowledge(&self, message_ids: &[MessageId]) -> Result<()> {
        consumer::acknowledge(
            &self.executor,
            &self.project_id,
            &self.topic,
            message_ids,
            &self.credential.authorization(),
        )
        .await
    }

    /// Close the subscription.
    ///
    /// Idempotent. Marks the state `Closed`, tears down the connection,
    /// turns any pending reconnect timer into a no-op and stops in-flight
    /// frames from reaching the subscriber.
    pub fn close(&self) {
        if self.state.swap(STATE_CLOSED, Ordering::SeqCst) != STATE_CLOSED {
            debug!(topic = %self.topic, "subscription closed by caller");
        }
        let _ = self.close.send(true);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Outcome of one connected read loop.
enum Pump {
    /// `close()` was called, or the subscriber went away.
    Closed,
    /// Protocol violation; the error event was already emitted.
    Fatal,
    /// The broker signalled that the subscription endpoint does not exist.
    NotFound,
    /// Connection lost; eligible for reconnect.
    Disconnected,
}

/// Owns the socket and runs the subscription lifecycle on its own task.
struct Driver {
    url: String,
    authorization: String,
    reconnect: RetryPolicy,
    events: mpsc::Sender<SubscriptionEvent>,
    state: Arc<AtomicU8>,
    close: watch::Receiver<bool>,
}

impl Driver {
    async fn run(mut self) {
        let mut attempts_made: u32 = 0;

        loop {
            if self.closed() {
                break;
            }
            self.set_state(STATE_CONNECTING);
            debug!(url = %self.url, "connecting");

            let request = match self.handshake_request() {
                Ok(request) => request,
                Err(err) => {
                    // The URL is built by the facade; failing here means a
                    // config-level problem no reconnect can repair.
                    error!(error = %err, "invalid subscription request");
                    self.emit(SubscriptionEvent::Error(err)).await;
                    break;
                }
            };

            let connected = tokio::select! {
                _ = self.close.changed() => break,
                result = connect_async(request) => result,
            };

            match connected {
                Ok((socket, _response)) => {
                    info!(url = %self.url, "subscription connected");
                    self.set_state(STATE_CONNECTED);
                    // A successful connection forgives prior failures.
                    attempts_made = 0;

                    match self.pump(socket).await {
                        Pump::Closed => break,
                        Pump::Fatal => break,
                        Pump::NotFound => {
                            self.emit_not_found(None).await;
                            break;
                        }
                        Pump::Disconnected => {}
                    }
                }
                Err(WsError::Http(response)) if response.status() == http::StatusCode::NOT_FOUND => {
                    let body = response
                        .into_body()
                        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
                    self.emit_not_found(body).await;
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "subscription connection failed");
                }
            }

            // Reconnect path: recovered internally, not surfaced to the
            // subscriber unless the budget runs out.
            if self.closed() {
                break;
            }
            if attempts_made >= self.reconnect.max_attempts {
                error!(attempts = attempts_made, "giving up reconnecting");
                self.emit(SubscriptionEvent::Error(ClientError::ConnectionExhausted {
                    attempts: attempts_made,
                }))
                .await;
                break;
            }

            let delay = self.reconnect.backoff(attempts_made);
            attempts_made += 1;
            debug!(
                attempt = attempts_made,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            tokio::select! {
                _ = self.close.changed() => break,
                _ = sleep(delay) => {}
            }
            info!(attempt = attempts_made, "reconnecting");
        }

        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }

    /// Read frames until the connection ends one way or another. The old
    /// socket is dropped on return; reconnection always builds a new one.
    async fn pump(&mut self, socket: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Pump {
        let (mut sink, mut stream) = socket.split();

        loop {
            let frame = tokio::select! {
                _ = self.close.changed() => return Pump::Closed,
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(outcome) = self.deliver(text.as_bytes()).await {
                        return outcome;
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    if let Some(outcome) = self.deliver(&data).await {
                        return outcome;
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    if sink.send(WsMessage::Pong(payload)).await.is_err() {
                        return Pump::Disconnected;
                    }
                }
                Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => {
                    // The broker signals a missing subscription resource
                    // with a 404 close code.
                    if let Some(frame) = &frame {
                        if u16::from(frame.code) == 404 {
                            return Pump::NotFound;
                        }
                    }
                    debug!(?frame, "connection closed by broker");
                    return Pump::Disconnected;
                }
                Some(Err(err)) => {
                    warn!(error = %err, "socket error");
                    return Pump::Disconnected;
                }
                None => {
                    debug!("connection ended");
                    return Pump::Disconnected;
                }
            }
        }
    }

    /// Decode one frame and forward it. Returns the loop outcome when the
    /// frame terminates the connected phase, `None` to keep reading.
    async fn deliver(&mut self, raw: &[u8]) -> Option<Pump> {
        let message = match serde_json::from_slice::<Message>(raw) {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "invalid frame, closing subscription");
                self.emit(SubscriptionEvent::Error(ClientError::Protocol(format!(
                    "invalid frame: {err}"
                ))))
                .await;
                return Some(Pump::Fatal);
            }
        };

        if self.closed() {
            return Some(Pump::Closed);
        }
        debug!(message_id = %message.message_id, "message received");

        // Bounded send: when the subscriber lags by more than the credit
        // window this waits, unless close() fires first.
        tokio::select! {
            _ = self.close.changed() => Some(Pump::Closed),
            sent = self.events.send(SubscriptionEvent::Message(message)) => {
                match sent {
                    Ok(()) => None,
                    // Subscriber handle is gone.
                    Err(_) => Some(Pump::Closed),
                }
            }
        }
    }

    fn handshake_request(&self) -> Result<http::Request<()>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| ClientError::Config(format!("invalid subscription url: {err}")))?;
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            http::HeaderValue::from_str(&self.authorization)
                .map_err(|err| ClientError::Config(format!("invalid credential: {err}")))?,
        );
        Ok(request)
    }

    async fn emit_not_found(&mut self, body: Option<String>) {
        warn!(url = %self.url, "subscription endpoint not found, closing");
        self.emit(SubscriptionEvent::Error(ClientError::Api {
            status: 404,
            body: body.unwrap_or_else(|| "subscription endpoint not found".to_string()),
        }))
        .await;
    }

    async fn emit(&mut self, event: SubscriptionEvent) {
        tokio::select! {
            _ = self.close.changed() => {}
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!("subscriber gone, event dropped");
                }
            }
        }
    }

    fn set_state(&self, new: u8) {
        // Closed is terminal; never transition out of it, even if close()
        // races with a connection attempt.
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != STATE_CLOSED).then_some(new)
            });
    }

    fn closed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_CLOSED || *self.close.borrow()
    }
}
