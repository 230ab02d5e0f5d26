//! # Ingester Module
//!
//! The two pumps around the broker:
//! - `Ingester` marshals payloads, wraps them in a [`Message`] and
//!   publishes them on a topic
//! - `Digester` receives messages from a subscription and hands each one to
//!   a [`Handler`] until something goes wrong
//!
//! Two handlers cover the usual consumers: `StoreHandler` decodes messages
//! into a [`Store`], `SinkHandler` dumps raw message bytes to a writer.
//! Decode, handler and store errors all end the digester loop and surface
//! to its caller.

use crate::broker::{Broker, Handler, PubOptions, RecvOptions, Subscriber};
use crate::formats::{JsonMarshaler, Marshaler, Message, MessageType, Payload};
use crate::model::{Entity, LinkOptions};
use crate::store::{AddOptions, Store};
use crate::TopoError;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// =============================================================================
// INGESTER
// =============================================================================

/// Producer side: payload -> bytes -> broker.
#[derive(Debug, Clone)]
pub struct Ingester<M: Marshaler = JsonMarshaler> {
    broker: Broker,
    marshaler: M,
    opts: PubOptions,
}

impl Ingester<JsonMarshaler> {
    #[must_use]
    pub fn new(broker: Broker) -> Self {
        Self::with_marshaler(broker, JsonMarshaler)
    }
}

impl<M: Marshaler> Ingester<M> {
    #[must_use]
    pub fn with_marshaler(broker: Broker, marshaler: M) -> Self {
        Self {
            broker,
            marshaler,
            opts: PubOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, opts: PubOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Marshal and publish `payload`; the message type follows the payload.
    pub async fn publish(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        payload: &Payload,
    ) -> Result<(), TopoError> {
        let data = self.marshaler.marshal(payload)?;
        self.publish_raw(ctx, topic, payload.message_type(), data).await
    }

    /// Publish already-encoded bytes under an explicit message type.
    pub async fn publish_raw(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        kind: MessageType,
        data: Vec<u8>,
    ) -> Result<(), TopoError> {
        let msg = Message::new(kind, data);
        debug!(topic, uid = %msg.uid, kind = %kind, "ingesting");
        self.broker.publish(ctx, topic, msg, self.opts).await
    }
}

// =============================================================================
// DIGESTER
// =============================================================================

/// Counts the messages that reach the wrapped handler.
struct Counting<'a, H: ?Sized> {
    inner: &'a mut H,
    handled: usize,
}

impl<H: Handler + ?Sized> Handler for Counting<'_, H> {
    fn handle(&mut self, ctx: &CancellationToken, msg: Message) -> Result<(), TopoError> {
        self.handled = self.handled.saturating_add(1);
        self.inner.handle(ctx, msg)
    }
}

/// Consumer side: subscription -> handler.
#[derive(Debug, Clone)]
pub struct Digester {
    sub: Subscriber,
    opts: RecvOptions,
}

impl Digester {
    #[must_use]
    pub fn new(sub: Subscriber) -> Self {
        Self {
            sub,
            opts: RecvOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, opts: RecvOptions) -> Self {
        self.opts = opts;
        self
    }

    #[must_use]
    pub fn subscriber(&self) -> &Subscriber {
        &self.sub
    }

    /// Receive and handle messages until `ctx` is cancelled or a receive
    /// fails.
    ///
    /// Returns the number of messages handled when `ctx` is cancelled.
    ///
    /// # Errors
    ///
    /// The first receive error: `Timeout` when the topic stays idle,
    /// `SubscriptionInactive` after unsubscribe or broker close, or
    /// whatever the handler returned.
    pub async fn run<H: Handler + ?Sized>(
        &self,
        ctx: &CancellationToken,
        handler: &mut H,
    ) -> Result<usize, TopoError> {
        let mut counting = Counting {
            inner: handler,
            handled: 0,
        };
        loop {
            if ctx.is_cancelled() {
                debug!(topic = self.sub.topic(), handled = counting.handled, "digester cancelled");
                return Ok(counting.handled);
            }
            if let Err(e) = self.sub.receive(ctx, &mut counting, self.opts).await {
                debug!(topic = self.sub.topic(), handled = counting.handled, error = %e, "digester stopped");
                return Err(e);
            }
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Decodes messages and applies them to a store.
///
/// Entities and objects are upserted, links go through the store's
/// link-with-placeholder path, resources land in the store's plan.
#[derive(Debug, Clone)]
pub struct StoreHandler<M: Marshaler = JsonMarshaler> {
    store: Arc<Store>,
    marshaler: M,
}

impl StoreHandler<JsonMarshaler> {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_marshaler(store, JsonMarshaler)
    }
}

impl<M: Marshaler> StoreHandler<M> {
    #[must_use]
    pub fn with_marshaler(store: Arc<Store>, marshaler: M) -> Self {
        Self { store, marshaler }
    }
}

impl<M: Marshaler> Handler for StoreHandler<M> {
    fn handle(&mut self, ctx: &CancellationToken, msg: Message) -> Result<(), TopoError> {
        match self.marshaler.unmarshal(msg.kind, &msg.data)? {
            Payload::Entity(entity) => self.store.add(ctx, entity, AddOptions::upsert()),
            Payload::Object(object) => {
                self.store.add(ctx, Entity::from(object), AddOptions::upsert())
            }
            Payload::Resource(resource) => self.store.plan().insert(resource).map(|_| ()),
            Payload::Link(link) => self
                .store
                .link(ctx, &link.from, &link.to, LinkOptions::from(&link))
                .map(|_| ()),
        }
    }
}

/// Writes each message's bytes, newline-terminated, to a writer.
#[derive(Debug)]
pub struct SinkHandler<W> {
    writer: W,
}

impl<W: Write + Send> SinkHandler<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Handler for SinkHandler<W> {
    fn handle(&mut self, _ctx: &CancellationToken, msg: Message) -> Result<(), TopoError> {
        self.writer.write_all(&msg.data)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
