//! Event-bus contract and an in-process implementation.
//!
//! The contract mirrors an AMQP-style broker: messages are published to an
//! exchange with a routing key, and queues bound to that exchange receive
//! matching messages. Delivery is at-least-once: a delivery that is dropped
//! without [`Delivery::ack`] or [`Delivery::reject`] is requeued.

use async_trait::async_trait;
use costgraph_memory::CompositionEvent;
use costgraph_units::CostError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("exchange {name} already declared as {existing}, not {requested}")]
    ExchangeKindMismatch {
        name: String,
        existing: ExchangeKind,
        requested: ExchangeKind,
    },

    #[error("queue {0} already has a consumer")]
    QueueInUse(String),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode {kind} message: {message}")]
    Decode { kind: String, message: String },

    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

impl From<BusError> for CostError {
    fn from(err: BusError) -> Self {
        CostError::event_bus(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Routing key must match the binding key exactly.
    Direct,
    /// Every bound queue receives every message.
    Fanout,
    /// Dot-separated keys; `*` matches one word, `#` zero or more.
    Topic,
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeKind::Direct => f.write_str("direct"),
            ExchangeKind::Fanout => f.write_str("fanout"),
            ExchangeKind::Topic => f.write_str("topic"),
        }
    }
}

impl std::str::FromStr for ExchangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(ExchangeKind::Direct),
            "fanout" => Ok(ExchangeKind::Fanout),
            "topic" => Ok(ExchangeKind::Topic),
            other => Err(format!("unknown exchange kind: {other}")),
        }
    }
}

/// Where a message is published to, or consumed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    pub exchange_name: String,
    pub exchange_kind: ExchangeKind,
    pub routing_key: String,
    /// Only meaningful for subscriptions.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub queue_name: String,
}

impl Routing {
    pub fn new(
        exchange_name: impl Into<String>,
        exchange_kind: ExchangeKind,
        routing_key: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            exchange_kind,
            routing_key: routing_key.into(),
            queue_name: queue_name.into(),
        }
    }
}

/// A message ready to publish: type discriminator plus raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub kind: String,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    pub fn event(event: &CompositionEvent) -> Result<Self, BusError> {
        let body = event
            .to_json_bytes()
            .map_err(|e| BusError::Encode(e.to_string()))?;
        Ok(Self {
            kind: event.type_name().to_string(),
            body,
        })
    }
}

/// Settlement hooks a bus implementation attaches to each delivery.
pub trait Acknowledger: Send {
    fn ack(self: Box<Self>);
    fn reject(self: Box<Self>);
    fn requeue(self: Box<Self>, kind: String, body: Vec<u8>);
}

/// One received message.
pub struct Delivery {
    kind: String,
    body: Vec<u8>,
    redelivered: bool,
    acker: Option<Box<dyn Acknowledger>>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("kind", &self.kind)
            .field("len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

impl Delivery {
    pub fn new(
        kind: String,
        body: Vec<u8>,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            kind,
            body,
            redelivered,
            acker: Some(acker),
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The type discriminator the publisher attached.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_slice(&self.body).map_err(|e| BusError::Decode {
            kind: self.kind.clone(),
            message: e.to_string(),
        })
    }

    /// Settle successfully; the message will not be delivered again.
    pub fn ack(mut self) {
        if let Some(acker) = self.acker.take() {
            acker.ack();
        }
    }

    /// Settle as failed without redelivery.
    pub fn reject(mut self) {
        if let Some(acker) = self.acker.take() {
            acker.reject();
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            let body = std::mem::take(&mut self.body);
            let kind = std::mem::take(&mut self.kind);
            acker.requeue(kind, body);
        }
    }
}

/// Stream of deliveries for one queue.
#[async_trait]
pub trait DeliveryStream: Send {
    /// Wait for the next delivery; `None` once the queue is closed.
    async fn next(&mut self) -> Option<Delivery>;
}

pub struct Subscription {
    queue: String,
    stream: Box<dyn DeliveryStream>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn new(queue: impl Into<String>, stream: Box<dyn DeliveryStream>) -> Self {
        Self {
            queue: queue.into(),
            stream,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn next(&mut self) -> Option<Delivery> {
        self.stream.next().await
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, message: OutboundMessage, routing: &Routing) -> Result<(), BusError>;

    /// Declare the exchange and queue, bind them, and start consuming.
    async fn subscribe(&self, routing: &Routing) -> Result<Subscription, BusError>;
}

#[async_trait]
impl<T: EventBus + ?Sized> EventBus for Arc<T> {
    async fn publish(&self, message: OutboundMessage, routing: &Routing) -> Result<(), BusError> {
        (**self).publish(message, routing).await
    }

    async fn subscribe(&self, routing: &Routing) -> Result<Subscription, BusError> {
        (**self).subscribe(routing).await
    }
}

/// Serialize `event` and publish it.
pub async fn publish_event<B: EventBus + ?Sized>(
    bus: &B,
    event: &CompositionEvent,
    routing: &Routing,
) -> Result<(), BusError> {
    let message = OutboundMessage::event(event)?;
    bus.publish(message, routing).await
}

/// Whether `routing_key` matches a topic `pattern`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((word, rest)) => match key.split_first() {
            Some((head, tail)) => (*word == "*" || word == head) && match_words(rest, tail),
            None => false,
        },
    }
}

struct Envelope {
    kind: String,
    body: Vec<u8>,
    redelivered: bool,
}

/// Count of delivered-but-unsettled messages.
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

struct QueueSlot {
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: Option<mpsc::UnboundedReceiver<Envelope>>,
    bindings: Vec<(String, String)>,
}

#[derive(Default)]
struct BusState {
    exchanges: BTreeMap<String, ExchangeKind>,
    queues: BTreeMap<String, QueueSlot>,
}

impl BusState {
    fn declare_exchange(&mut self, name: &str, kind: ExchangeKind) -> Result<(), BusError> {
        match self.exchanges.get(name) {
            Some(existing) if *existing != kind => Err(BusError::ExchangeKindMismatch {
                name: name.to_string(),
                existing: *existing,
                requested: kind,
            }),
            Some(_) => Ok(()),
            None => {
                self.exchanges.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }
}

/// In-process broker with per-queue FIFO delivery.
///
/// Messages published before any queue is bound to the exchange are
/// dropped, as with a broker that has no matching binding.
#[derive(Default)]
pub struct MemoryBus {
    state: Mutex<BusState>,
    in_flight: Arc<InFlight>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of delivered messages not yet acknowledged or rejected.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Resolve once every routed message has been settled.
    ///
    /// Handlers publish follow-up events before acknowledging the message
    /// that caused them, so reaching zero means the cascade has settled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, BusState>, BusError> {
        self.state
            .lock()
            .map_err(|_| BusError::Unavailable("bus state lock poisoned".to_string()))
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, message: OutboundMessage, routing: &Routing) -> Result<(), BusError> {
        let mut state = self.lock_state()?;
        state.declare_exchange(&routing.exchange_name, routing.exchange_kind)?;

        let mut routed = 0usize;
        for (queue, slot) in &state.queues {
            let bound = slot.bindings.iter().any(|(exchange, key)| {
                exchange == &routing.exchange_name
                    && match routing.exchange_kind {
                        ExchangeKind::Direct => key == &routing.routing_key,
                        ExchangeKind::Fanout => true,
                        ExchangeKind::Topic => topic_matches(key, &routing.routing_key),
                    }
            });
            if !bound {
                continue;
            }

            self.in_flight.begin();
            let envelope = Envelope {
                kind: message.kind.clone(),
                body: message.body.clone(),
                redelivered: false,
            };
            if slot.sender.send(envelope).is_err() {
                self.in_flight.done();
                warn!(queue = %queue, "queue closed, message dropped");
                continue;
            }
            routed += 1;
        }

        debug!(
            exchange = %routing.exchange_name,
            routing_key = %routing.routing_key,
            kind = %message.kind,
            routed,
            "published"
        );
        Ok(())
    }

    async fn subscribe(&self, routing: &Routing) -> Result<Subscription, BusError> {
        let mut state = self.lock_state()?;
        state.declare_exchange(&routing.exchange_name, routing.exchange_kind)?;

        let slot = state
            .queues
            .entry(routing.queue_name.clone())
            .or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                QueueSlot {
                    sender,
                    receiver: Some(receiver),
                    bindings: Vec::new(),
                }
            });

        let binding = (routing.exchange_name.clone(), routing.routing_key.clone());
        if !slot.bindings.contains(&binding) {
            slot.bindings.push(binding);
        }

        let receiver = slot
            .receiver
            .take()
            .ok_or_else(|| BusError::QueueInUse(routing.queue_name.clone()))?;
        let stream = MemoryQueueStream {
            receiver,
            requeue: slot.sender.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };
        Ok(Subscription::new(routing.queue_name.clone(), Box::new(stream)))
    }
}

struct MemoryQueueStream {
    receiver: mpsc::UnboundedReceiver<Envelope>,
    requeue: mpsc::UnboundedSender<Envelope>,
    in_flight: Arc<InFlight>,
}

#[async_trait]
impl DeliveryStream for MemoryQueueStream {
    async fn next(&mut self) -> Option<Delivery> {
        let envelope = self.receiver.recv().await?;
        let acker = MemoryAcker {
            requeue: self.requeue.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };
        Some(Delivery::new(
            envelope.kind,
            envelope.body,
            envelope.redelivered,
            Box::new(acker),
        ))
    }
}

struct MemoryAcker {
    requeue: mpsc::UnboundedSender<Envelope>,
    in_flight: Arc<InFlight>,
}

impl Acknowledger for MemoryAcker {
    fn ack(self: Box<Self>) {
        self.in_flight.done();
    }

    fn reject(self: Box<Self>) {
        self.in_flight.done();
    }

    fn requeue(self: Box<Self>, kind: String, body: Vec<u8>) {
        let envelope = Envelope {
            kind,
            body,
            redelivered: true,
        };
        if self.requeue.send(envelope).is_err() {
            self.in_flight.done();
        }
    }
}
