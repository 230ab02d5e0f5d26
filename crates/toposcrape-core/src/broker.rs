//! # Broker
//!
//! In-memory topic broker with bounded queues.
//!
//! Producers and consumers meet by topic name. Every topic owns one bounded
//! queue; in `FanIn` mode all subscribers of a topic compete for messages
//! on it, in `FanOut` mode each subscriber owns a queue of the same
//! capacity and a publish copies the message into each of them.
//!
//! ## Lifecycle
//!
//! `open` spawns one control task that removes unsubscribed entries from
//! the subscriber table; `close` cancels every topic and subscriber, clears
//! the tables and waits for that task to finish. Pending messages are not
//! drained.
//!
//! ## Capacity 0
//!
//! A zero-capacity topic is a rendezvous: a publish only hands its message
//! over while a receiver is blocked on the topic, and otherwise waits until
//! its deadline.

use crate::formats::Message;
use crate::primitives::{DEFAULT_CAPACITY, DEFAULT_PUB_TIMEOUT, DEFAULT_RECV_TIMEOUT};
use crate::{TopoError, Uid};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Delivery mode of a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sink {
    /// Each message goes to at most one subscriber of its topic.
    #[default]
    FanIn,
    /// Each message goes to every subscriber of its topic.
    FanOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Queue capacity per topic (per subscriber with `FanOut`).
    pub capacity: usize,
    pub pub_timeout: Duration,
    pub recv_timeout: Duration,
    pub sink: Sink,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            pub_timeout: DEFAULT_PUB_TIMEOUT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            sink: Sink::FanIn,
        }
    }
}

/// Per-call publish options. Unset fields use the broker configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PubOptions {
    pub timeout: Option<Duration>,
}

/// Per-call receive options. Unset fields use the broker configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecvOptions {
    pub timeout: Option<Duration>,
}

// =============================================================================
// HANDLER
// =============================================================================

/// Consumer callback invoked once per received message.
pub trait Handler: Send {
    fn handle(&mut self, ctx: &CancellationToken, msg: Message) -> Result<(), TopoError>;
}

impl<F> Handler for F
where
    F: FnMut(&CancellationToken, Message) -> Result<(), TopoError> + Send,
{
    fn handle(&mut self, ctx: &CancellationToken, msg: Message) -> Result<(), TopoError> {
        self(ctx, msg)
    }
}

// =============================================================================
// QUEUE
// =============================================================================

#[derive(Debug)]
struct Queue {
    tx: mpsc::Sender<Message>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    /// Blocked receivers, for zero-capacity queues only.
    demand: Option<Semaphore>,
    exit: CancellationToken,
}

/// Receiver registration on a zero-capacity queue. Dropping it before a
/// message arrives takes the registration back.
struct Demand<'a> {
    sem: &'a Semaphore,
    armed: bool,
}

impl Drop for Demand<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(permit) = self.sem.try_acquire() {
                permit.forget();
            }
        }
    }
}

impl Queue {
    fn new(capacity: usize, exit: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            demand: (capacity == 0).then(|| Semaphore::new(0)),
            exit,
        }
    }

    async fn send(&self, msg: Message) -> Result<(), TopoError> {
        if let Some(demand) = &self.demand {
            match demand.acquire().await {
                Ok(permit) => permit.forget(),
                // Closed by shutdown.
                Err(_) => return Ok(()),
            }
        }
        self.tx.send(msg).await.map_err(|_| TopoError::NotConnected)
    }

    async fn recv(&self) -> Option<Message> {
        let mut rx = self.rx.lock().await;
        let mut demand = self.demand.as_ref().map(|sem| {
            sem.add_permits(1);
            Demand { sem, armed: true }
        });
        let msg = rx.recv().await;
        if let Some(d) = demand.as_mut() {
            d.armed = false;
        }
        msg
    }

    fn shutdown(&self) {
        self.exit.cancel();
        if let Some(demand) = &self.demand {
            demand.close();
        }
    }
}

// =============================================================================
// BROKER STATE
// =============================================================================

/// Unsubscribe notification for the control task.
#[derive(Debug)]
struct Ctl {
    id: Uid,
    topic: String,
}

#[derive(Debug)]
struct SubEntry {
    queue: Arc<Queue>,
    exit: CancellationToken,
    active: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    topics: BTreeMap<String, Arc<Queue>>,
    subscribers: BTreeMap<String, BTreeMap<Uid, SubEntry>>,
    ctl: Option<mpsc::UnboundedSender<Ctl>>,
    exit: CancellationToken,
}

impl State {
    /// The queue of `name`, created on first use.
    fn topic(&mut self, name: &str, capacity: usize) -> Arc<Queue> {
        let exit = &self.exit;
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(topic = name, capacity, "creating topic");
                Arc::new(Queue::new(capacity, exit.child_token()))
            })
            .clone()
    }
}

#[derive(Debug)]
struct Inner {
    config: BrokerConfig,
    state: RwLock<State>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_subscriber(&self, ctl: &Ctl) {
        let mut state = self.write();
        if let Some(subs) = state.subscribers.get_mut(&ctl.topic) {
            subs.remove(&ctl.id);
            if subs.is_empty() {
                state.subscribers.remove(&ctl.topic);
            }
        }
        debug!(topic = %ctl.topic, id = %ctl.id, "subscriber removed");
    }
}

async fn control_loop(
    inner: Weak<Inner>,
    mut rx: mpsc::UnboundedReceiver<Ctl>,
    ctx: CancellationToken,
    exit: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,
            _ = exit.cancelled() => break,
            ctl = rx.recv() => {
                let Some(ctl) = ctl else { break };
                let Some(inner) = inner.upgrade() else { break };
                inner.remove_subscriber(&ctl);
            }
        }
    }
    debug!("broker control task stopped");
}

// =============================================================================
// BROKER
// =============================================================================

/// In-memory pub/sub broker. Cloning yields another handle to the same
/// broker.
#[derive(Debug, Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl Broker {
    /// Create a closed broker.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: RwLock::new(State::default()),
                task: Mutex::new(None),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.write()
    }

    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.read().connected
    }

    /// Open the broker and start its control task. Opening an open broker
    /// is a no-op. Must be called from within a Tokio runtime.
    pub fn open(&self, ctx: &CancellationToken) -> Result<(), TopoError> {
        let mut state = self.write();
        if state.connected {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let exit = CancellationToken::new();
        state.connected = true;
        state.ctl = Some(tx);
        state.exit = exit.clone();
        drop(state);

        let handle = tokio::spawn(control_loop(
            Arc::downgrade(&self.inner),
            rx,
            ctx.clone(),
            exit,
        ));
        *self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!(capacity = self.inner.config.capacity, sink = ?self.inner.config.sink, "broker opened");
        Ok(())
    }

    /// Shut the broker down: cancel every topic and subscriber, clear the
    /// tables and wait for the control task. Closing twice is a no-op.
    pub async fn close(&self) {
        let handle = {
            let mut state = self.write();
            if state.connected {
                state.exit.cancel();
                for queue in state.topics.values() {
                    queue.shutdown();
                }
                for entry in state.subscribers.values().flat_map(BTreeMap::values) {
                    entry.active.store(false, Ordering::SeqCst);
                    entry.exit.cancel();
                    entry.queue.shutdown();
                }
                state.topics.clear();
                state.subscribers.clear();
                state.ctl = None;
                state.connected = false;
                debug!("broker closed");
            }
            self.inner
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "broker control task failed");
            }
        }
    }

    /// Publish `msg` on `topic`, creating the topic on first use.
    ///
    /// Blocks while the queue is full, up to the publish timeout. Returns
    /// `Ok` without delivering when `ctx` is cancelled (after closing the
    /// broker) or when the broker shuts down meanwhile.
    pub async fn publish(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        msg: Message,
        opts: PubOptions,
    ) -> Result<(), TopoError> {
        let config = &self.inner.config;
        let timeout = opts.timeout.unwrap_or(config.pub_timeout);

        let (exit, targets) = {
            let mut state = self.write();
            if !state.connected {
                return Err(TopoError::NotConnected);
            }
            let queue = state.topic(topic, config.capacity);
            let targets: Vec<Arc<Queue>> = match config.sink {
                Sink::FanIn => vec![queue],
                Sink::FanOut => state
                    .subscribers
                    .get(topic)
                    .map(|subs| {
                        subs.values()
                            .filter(|s| s.active.load(Ordering::SeqCst))
                            .map(|s| Arc::clone(&s.queue))
                            .collect()
                    })
                    .unwrap_or_default(),
            };
            (state.exit.clone(), targets)
        };

        if targets.is_empty() {
            debug!(topic, uid = %msg.uid, "no subscribers, message dropped");
            return Ok(());
        }

        let deliver = async {
            for queue in &targets {
                queue.send(msg.clone()).await?;
            }
            Ok::<(), TopoError>(())
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                self.close().await;
                Ok(())
            }
            _ = exit.cancelled() => Ok(()),
            res = tokio::time::timeout(timeout, deliver) => match res {
                Ok(sent) => sent,
                Err(_) => {
                    warn!(topic, ?timeout, "publish timed out");
                    Err(TopoError::Timeout)
                }
            },
        }
    }

    /// Register a new subscriber on `topic`.
    pub fn subscribe(&self, topic: &str) -> Result<Subscriber, TopoError> {
        let config = &self.inner.config;
        let mut state = self.write();
        if !state.connected {
            return Err(TopoError::NotConnected);
        }

        let topic_queue = state.topic(topic, config.capacity);
        let queue = match config.sink {
            Sink::FanIn => topic_queue,
            Sink::FanOut => Arc::new(Queue::new(config.capacity, topic_queue.exit.child_token())),
        };
        let id = Uid::generate();
        let exit = CancellationToken::new();
        let active = Arc::new(AtomicBool::new(true));

        state.subscribers.entry(topic.to_string()).or_default().insert(
            id.clone(),
            SubEntry {
                queue: Arc::clone(&queue),
                exit: exit.clone(),
                active: Arc::clone(&active),
            },
        );
        debug!(topic, %id, "subscribed");

        Ok(Subscriber {
            id,
            topic: topic.to_string(),
            queue,
            exit,
            active,
            ctl: state.ctl.clone(),
            recv_timeout: config.recv_timeout,
        })
    }

    /// Names of live topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.read().topics.keys().cloned().collect()
    }

    /// Number of registered subscribers on `topic`.
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> usize {
        self.read().subscribers.get(topic).map_or(0, BTreeMap::len)
    }
}

// =============================================================================
// SUBSCRIBER
// =============================================================================

/// Handle to one subscription. Clones share the same subscription.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: Uid,
    topic: String,
    queue: Arc<Queue>,
    exit: CancellationToken,
    active: Arc<AtomicBool>,
    ctl: Option<mpsc::UnboundedSender<Ctl>>,
    recv_timeout: Duration,
}

impl Subscriber {
    #[must_use]
    pub fn id(&self) -> &Uid {
        &self.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for one message and pass it to `handler`.
    ///
    /// Returns the handler's result, `Timeout` when nothing arrives within
    /// the receive timeout, and `Ok` without calling the handler when `ctx`
    /// is cancelled or the subscription or topic shuts down.
    pub async fn receive<H: Handler + ?Sized>(
        &self,
        ctx: &CancellationToken,
        handler: &mut H,
        opts: RecvOptions,
    ) -> Result<(), TopoError> {
        if !self.is_active() {
            return Err(TopoError::SubscriptionInactive);
        }
        let timeout = opts.timeout.unwrap_or(self.recv_timeout);

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Ok(()),
            _ = self.exit.cancelled() => Ok(()),
            _ = self.queue.exit.cancelled() => Ok(()),
            res = tokio::time::timeout(timeout, self.queue.recv()) => match res {
                Ok(Some(msg)) => handler.handle(ctx, msg),
                Ok(None) => Ok(()),
                Err(_) => Err(TopoError::Timeout),
            },
        }
    }

    /// End the subscription. The broker drops its entry asynchronously.
    /// Unsubscribing twice is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.exit.cancel();
        let sent = self.ctl.as_ref().is_some_and(|ctl| {
            ctl.send(Ctl {
                id: self.id.clone(),
                topic: self.topic.clone(),
            })
            .is_ok()
        });
        if !sent {
            debug!(topic = %self.topic, id = %self.id, "broker gone, unsubscribe not forwarded");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::MessageType;

    #[derive(Default)]
    struct Collect(Vec<Message>);

    impl Handler for Collect {
        fn handle(&mut self, _ctx: &CancellationToken, msg: Message) -> Result<(), TopoError> {
            self.0.push(msg);
            Ok(())
        }
    }

    fn msg(uid: &str) -> Message {
        Message::with_uid(Uid::new(uid), MessageType::Unknown, b"x".to_vec())
    }

    fn open(config: BrokerConfig) -> (Broker, CancellationToken) {
        let ctx = CancellationToken::new();
        let broker = Broker::new(config);
        broker.open(&ctx).expect("open");
        (broker, ctx)
    }

    fn with_capacity(capacity: usize) -> BrokerConfig {
        BrokerConfig {
            capacity,
            ..BrokerConfig::default()
        }
    }

    fn short() -> RecvOptions {
        RecvOptions {
            timeout: Some(Duration::from_millis(50)),
        }
    }

    #[tokio::test]
    async fn open_and_close_are_idempotent() {
        let (broker, ctx) = open(BrokerConfig::default());
        broker.open(&ctx).expect("second open");
        assert!(broker.is_connected());

        broker.close().await;
        broker.close().await;
        assert!(!broker.is_connected());

        broker.open(&ctx).expect("reopen");
        assert!(broker.is_connected());
        broker.close().await;
    }

    #[tokio::test]
    async fn closed_broker_refuses_work() {
        let broker = Broker::default();
        let ctx = CancellationToken::new();

        assert_eq!(
            broker.publish(&ctx, "t", msg("m1"), PubOptions::default()).await,
            Err(TopoError::NotConnected)
        );
        assert!(matches!(broker.subscribe("t"), Err(TopoError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn single_delivery_then_timeout() {
        let (broker, ctx) = open(with_capacity(1));
        broker
            .publish(&ctx, "t", msg("m1"), PubOptions::default())
            .await
            .expect("publish");

        let sub = broker.subscribe("t").expect("subscribe");
        let mut got = Collect::default();
        sub.receive(&ctx, &mut got, RecvOptions::default())
            .await
            .expect("receive");
        assert_eq!(got.0.len(), 1);
        assert_eq!(got.0[0].uid, Uid::new("m1"));

        assert_eq!(
            sub.receive(&ctx, &mut got, RecvOptions::default()).await,
            Err(TopoError::Timeout)
        );
        assert_eq!(got.0.len(), 1);
        broker.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_times_out() {
        let (broker, ctx) = open(with_capacity(1));
        broker
            .publish(&ctx, "t", msg("m1"), PubOptions::default())
            .await
            .expect("first");

        let opts = PubOptions {
            timeout: Some(Duration::from_millis(100)),
        };
        let started = tokio::time::Instant::now();
        assert_eq!(
            broker.publish(&ctx, "t", msg("m2"), opts).await,
            Err(TopoError::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_millis(100));
        broker.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_capacity_without_receiver_times_out() {
        let (broker, ctx) = open(with_capacity(0));
        let opts = PubOptions {
            timeout: Some(Duration::from_millis(100)),
        };
        assert_eq!(
            broker.publish(&ctx, "t", msg("m1"), opts).await,
            Err(TopoError::Timeout)
        );
        broker.close().await;
    }

    #[tokio::test]
    async fn zero_capacity_hands_over_to_waiting_receiver() {
        let (broker, ctx) = open(with_capacity(0));
        let sub = broker.subscribe("t").expect("subscribe");

        let receiver = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut got = Collect::default();
                let res = sub
                    .receive(&ctx, &mut got, RecvOptions { timeout: Some(Duration::from_secs(5)) })
                    .await;
                (res, got.0)
            })
        };

        broker
            .publish(&ctx, "t", msg("m1"), PubOptions::default())
            .await
            .expect("publish");
        let (res, got) = receiver.await.expect("join");
        assert_eq!(res, Ok(()));
        assert_eq!(got.len(), 1);
        broker.close().await;
    }

    #[tokio::test]
    async fn fifo_within_topic() {
        let (broker, ctx) = open(BrokerConfig::default());
        let sub = broker.subscribe("t").expect("subscribe");
        for uid in ["m1", "m2", "m3"] {
            broker
                .publish(&ctx, "t", msg(uid), PubOptions::default())
                .await
                .expect("publish");
        }

        let mut got = Collect::default();
        for _ in 0..3 {
            sub.receive(&ctx, &mut got, short()).await.expect("receive");
        }
        let order: Vec<&str> = got.0.iter().map(|m| m.uid.as_str()).collect();
        assert_eq!(order, vec!["m1", "m2", "m3"]);
        broker.close().await;
    }

    #[tokio::test]
    async fn handler_error_is_returned() {
        let (broker, ctx) = open(BrokerConfig::default());
        let sub = broker.subscribe("t").expect("subscribe");
        broker
            .publish(&ctx, "t", msg("m1"), PubOptions::default())
            .await
            .expect("publish");

        let mut failing =
            |_: &CancellationToken, _: Message| -> Result<(), TopoError> { Err(TopoError::MissingEntity) };
        assert_eq!(
            sub.receive(&ctx, &mut failing, short()).await,
            Err(TopoError::MissingEntity)
        );
        broker.close().await;
    }

    #[tokio::test]
    async fn unsubscribe_deactivates_and_is_forwarded() {
        let (broker, ctx) = open(BrokerConfig::default());
        let sub = broker.subscribe("t").expect("subscribe");
        assert_eq!(broker.subscribers("t"), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());

        let mut got = Collect::default();
        assert_eq!(
            sub.receive(&ctx, &mut got, short()).await,
            Err(TopoError::SubscriptionInactive)
        );

        for _ in 0..100 {
            if broker.subscribers("t") == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(broker.subscribers("t"), 0);
        broker.close().await;
    }

    #[tokio::test]
    async fn close_ends_pending_receive() {
        let (broker, ctx) = open(BrokerConfig::default());
        let sub = broker.subscribe("t").expect("subscribe");

        let waiting = tokio::spawn(async move {
            let mut got = Collect::default();
            sub.receive(&ctx, &mut got, RecvOptions { timeout: Some(Duration::from_secs(60)) })
                .await
        });
        tokio::task::yield_now().await;

        broker.close().await;
        assert_eq!(waiting.await.expect("join"), Ok(()));
        assert!(broker.topics().is_empty());
    }

    #[tokio::test]
    async fn cancelled_publish_closes_broker() {
        let (broker, _) = open(BrokerConfig::default());
        let ctx = CancellationToken::new();
        ctx.cancel();

        assert_eq!(
            broker.publish(&ctx, "t", msg("m1"), PubOptions::default()).await,
            Ok(())
        );
        assert!(!broker.is_connected());
    }

    #[tokio::test]
    async fn fan_out_copies_to_every_subscriber() {
        let (broker, ctx) = open(BrokerConfig {
            sink: Sink::FanOut,
            ..BrokerConfig::default()
        });

        broker
            .publish(&ctx, "t", msg("dropped"), PubOptions::default())
            .await
            .expect("publish without subscribers");

        let a = broker.subscribe("t").expect("a");
        let b = broker.subscribe("t").expect("b");
        broker
            .publish(&ctx, "t", msg("m1"), PubOptions::default())
            .await
            .expect("publish");

        for sub in [&a, &b] {
            let mut got = Collect::default();
            sub.receive(&ctx, &mut got, short()).await.expect("receive");
            assert_eq!(got.0.len(), 1);
            assert_eq!(got.0[0].uid, Uid::new("m1"));
        }
        broker.close().await;
    }

    #[tokio::test]
    async fn fan_in_delivers_once() {
        let (broker, ctx) = open(BrokerConfig::default());
        let a = broker.subscribe("t").expect("a");
        let b = broker.subscribe("t").expect("b");
        broker
            .publish(&ctx, "t", msg("m1"), PubOptions::default())
            .await
            .expect("publish");

        let mut got = Collect::default();
        a.receive(&ctx, &mut got, short()).await.expect("a");
        assert_eq!(b.receive(&ctx, &mut got, short()).await, Err(TopoError::Timeout));
        assert_eq!(got.0.len(), 1);
        assert_eq!(broker.topics(), vec!["t".to_string()]);
        broker.close().await;
    }
}
