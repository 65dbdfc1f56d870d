// WebSocket - JSON-RPC client with request correlation and subscription routing
//
// One background task owns the socket. Callers talk to it over a command
// channel; responses are matched by request id, notifications by subscription id.
// A subscription's route is registered by the task itself when the subscribe
// response arrives, so no notification can overtake its registration.

use super::types::{IncomingMessage, JsonRpcRequest, SubscriptionId};
use super::RpcError;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

type CallReply = oneshot::Sender<Result<Value, RpcError>>;
type SubscribeReply = oneshot::Sender<Result<(SubscriptionId, mpsc::UnboundedReceiver<Value>), RpcError>>;

enum Pending {
    Call(CallReply),
    Subscribe {
        reply: SubscribeReply,
        unsubscribe_method: String,
    },
}

enum Command {
    Request { id: u64, payload: String, pending: Pending },
    /// The caller stopped waiting for this request
    Cancel(u64),
    Unregister(SubscriptionId),
    Close,
}

/// State shared between the client handles and the connection task
struct Shared {
    request_id: AtomicU64,
    in_flight: AtomicUsize,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }
}

struct Inner {
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    request_timeout: Duration,
}

impl Inner {
    fn send(&self, method: &str, params: Value, pending: Pending) -> Result<u64, RpcError> {
        let id = self.shared.next_id();
        let payload = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        trace!(id, method, "rpc request");
        self.commands
            .send(Command::Request { id, payload, pending })
            .map_err(|_| RpcError::ConnectionClosed)?;
        Ok(id)
    }

    /// One call bounded by the request timeout
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let (tx, rx) = oneshot::channel();
        let id = self.send(method, params, Pending::Call(tx))?;
        let mut in_flight = InFlight { inner: self, id, settled: false };

        let Ok(received) = tokio::time::timeout(self.request_timeout, rx).await else {
            return Err(RpcError::Timeout { method: method.to_string(), timeout: self.request_timeout });
        };
        in_flight.settled = true;
        match received {
            Err(_) => Err(RpcError::ConnectionClosed),
            Ok(result) => result,
        }
    }
}

/// Withdraws a call from the connection task when its caller stops waiting,
/// whether through the request timeout or an outer cancellation.
struct InFlight<'a> {
    inner: &'a Inner,
    id: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let _ = self.inner.commands.send(Command::Cancel(self.id));
        }
    }
}

/// JSON-RPC client over a single WebSocket connection
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Inner>,
}

impl WsClient {
    /// Open the socket and spawn the connection task (single attempt)
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self, RpcError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| RpcError::Connect { url: url.to_string(), reason: e.to_string() })?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            request_id: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
        });
        tokio::spawn(connection_task(stream, command_rx, Arc::clone(&shared), url.to_string()));

        debug!(url, "WebSocket connected");
        Ok(Self {
            inner: Arc::new(Inner {
                url: url.to_string(),
                commands,
                shared,
                request_timeout,
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// False once the connection task has stopped
    pub fn is_connected(&self) -> bool {
        !self.inner.commands.is_closed()
    }

    /// Requests sent and still awaiting a response
    pub fn in_flight(&self) -> usize {
        self.inner.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Make a JSON-RPC call and deserialize the result
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let value = self.request_raw(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| RpcError::Parse(format!("{} result: {}", method, e)))
    }

    /// Make a JSON-RPC call returning the raw result; error payloads are surfaced unchanged
    pub async fn request_raw(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.inner.call(method, params).await
    }

    /// Start a subscription; notifications are delivered in arrival order.
    /// A reply that arrives after the caller gave up is unsubscribed by the
    /// connection task, so the pending entry stays until the node answers.
    pub async fn subscribe(
        &self,
        subscribe_method: &str,
        params: Value,
        unsubscribe_method: &str,
    ) -> Result<Subscription, RpcError> {
        let (tx, rx) = oneshot::channel();
        let pending = Pending::Subscribe {
            reply: tx,
            unsubscribe_method: unsubscribe_method.to_string(),
        };
        self.inner.send(subscribe_method, params, pending)?;

        let (id, receiver) = match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Err(_) => {
                return Err(RpcError::Timeout {
                    method: subscribe_method.to_string(),
                    timeout: self.inner.request_timeout,
                })
            }
            Ok(Err(_)) => return Err(RpcError::ConnectionClosed),
            Ok(Ok(result)) => result?,
        };

        debug!(method = subscribe_method, subscription = %id, "subscribed");
        Ok(Subscription {
            id,
            receiver,
            unsubscribe_method: unsubscribe_method.to_string(),
            inner: Arc::clone(&self.inner),
            active: true,
        })
    }

    /// Close the socket; pending requests fail with `ConnectionClosed`
    pub fn close(&self) {
        let _ = self.inner.commands.send(Command::Close);
    }
}

/// Stream of notification payloads for one subscription
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<Value>,
    unsubscribe_method: String,
    inner: Arc<Inner>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Next raw notification; None when the connection closed
    pub async fn next(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Next notification deserialized into `T`
    pub async fn next_item<T: DeserializeOwned>(&mut self) -> Option<Result<T, RpcError>> {
        let value = self.receiver.recv().await?;
        Some(serde_json::from_value(value).map_err(|e| RpcError::Parse(e.to_string())))
    }

    /// Release the subscription on the node and stop routing its notifications
    pub async fn unsubscribe(mut self) -> Result<(), RpcError> {
        self.active = false;
        let _ = self.inner.commands.send(Command::Unregister(self.id.clone()));
        self.inner
            .call(&self.unsubscribe_method, Value::Array(vec![self.id.to_value()]))
            .await
            .map(|_| ())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let _ = self.inner.commands.send(Command::Unregister(self.id.clone()));

        // Fire and forget; nobody waits for the reply
        let (tx, _rx) = oneshot::channel();
        let _ = self.inner.send(&self.unsubscribe_method, Value::Array(vec![self.id.to_value()]), Pending::Call(tx));
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

async fn connection_task<S>(
    stream: S,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    url: String,
) where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin
        + Send
        + 'static,
{
    let (mut sink, mut source) = stream.split();
    let mut pending: HashMap<u64, Pending> = HashMap::new();
    let mut subscriptions: HashMap<SubscriptionId, mpsc::UnboundedSender<Value>> = HashMap::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Request { id, payload, pending: entry }) => {
                    if let Err(e) = sink.send(Message::Text(payload.into())).await {
                        fail(entry, RpcError::Transport(e.to_string()));
                        break;
                    }
                    pending.insert(id, entry);
                }
                Some(Command::Cancel(id)) => {
                    // Subscribe entries stay so a late reply can be released
                    if matches!(pending.get(&id), Some(Pending::Call(_))) {
                        pending.remove(&id);
                        trace!(id, "Request abandoned");
                    }
                }
                Some(Command::Unregister(id)) => {
                    subscriptions.remove(&id);
                }
                Some(Command::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },

            message = source.next() => {
                let orphan = match message {
                    Some(Ok(Message::Text(text))) => {
                        route(text.as_str().as_bytes(), &mut pending, &mut subscriptions)
                    }
                    Some(Ok(Message::Binary(bytes))) => route(&bytes, &mut pending, &mut subscriptions),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(url = %url, "WebSocket closed by peer");
                        break;
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "WebSocket error");
                        break;
                    }
                };

                if let Some(Orphan { subscription, unsubscribe_method }) = orphan {
                    let id = shared.next_id();
                    let request = JsonRpcRequest::new(id, &unsubscribe_method, Value::Array(vec![subscription.to_value()]));
                    match serde_json::to_string(&request) {
                        Ok(payload) => {
                            debug!(subscription = %subscription, "Releasing subscription nobody waited for");
                            if let Err(e) = sink.send(Message::Text(payload.into())).await {
                                warn!(url = %url, error = %e, "WebSocket error");
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Could not encode unsubscribe request"),
                    }
                }
            },
        }

        shared.in_flight.store(pending.len(), Ordering::SeqCst);
    }

    for (_, entry) in pending.drain() {
        fail(entry, RpcError::ConnectionClosed);
    }
    shared.in_flight.store(0, Ordering::SeqCst);
    // Dropping the senders ends every open subscription stream
    subscriptions.clear();
}

/// A subscription the node opened after its caller stopped waiting
struct Orphan {
    subscription: SubscriptionId,
    unsubscribe_method: String,
}

fn route(
    bytes: &[u8],
    pending: &mut HashMap<u64, Pending>,
    subscriptions: &mut HashMap<SubscriptionId, mpsc::UnboundedSender<Value>>,
) -> Option<Orphan> {
    let message: IncomingMessage = match serde_json::from_slice(bytes) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Unparseable message from node");
            return None;
        }
    };

    match message {
        IncomingMessage::Response(response) => {
            let Some(entry) = pending.remove(&response.id) else {
                trace!(id = response.id, "Response for unknown request");
                return None;
            };
            let result = response.into_result().map_err(RpcError::Call);
            match entry {
                Pending::Call(reply) => {
                    let _ = reply.send(result);
                    None
                }
                Pending::Subscribe { reply, unsubscribe_method } => {
                    let outcome = result.and_then(|value| {
                        SubscriptionId::from_value(&value)
                            .ok_or_else(|| RpcError::Parse(format!("invalid subscription id: {}", value)))
                    });
                    match outcome {
                        Ok(id) => {
                            let (tx, rx) = mpsc::unbounded_channel();
                            subscriptions.insert(id.clone(), tx);
                            if reply.send(Ok((id.clone(), rx))).is_err() {
                                subscriptions.remove(&id);
                                return Some(Orphan { subscription: id, unsubscribe_method });
                            }
                            None
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                            None
                        }
                    }
                }
            }
        }
        IncomingMessage::Notification(notification) => {
            let id = notification.params.subscription;
            match subscriptions.get(&id) {
                Some(tx) => {
                    if tx.send(notification.params.result).is_err() {
                        subscriptions.remove(&id);
                    }
                }
                None => trace!(subscription = %id, "Notification for unknown subscription"),
            }
            None
        }
    }
}

fn fail(entry: Pending, error: RpcError) {
    match entry {
        Pending::Call(reply) => {
            let _ = reply.send(Err(error));
        }
        Pending::Subscribe { reply, .. } => {
            let _ = reply.send(Err(error));
        }
    }
}
