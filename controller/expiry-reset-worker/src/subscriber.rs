//! Notification subscriber - keeps an expiration pattern subscription alive
//!
//! Every successful (re)connection enables expired-key notifications and
//! pattern-subscribes to the expired event channel of all databases, once.
//! Messages are forwarded in arrival order; anything published while the
//! connection is down is lost, Redis pub/sub keeps no backlog.

use crate::notification::{NotificationEvent, EXPIRED_PATTERN, NOTIFY_EXPIRED_FLAGS};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SubscriberError {
    #[error("failed to connect to Redis: {0}")]
    Connect(#[source] redis::RedisError),

    #[error("failed to enable keyspace notifications: {0}")]
    Setup(#[source] redis::RedisError),

    #[error("failed to subscribe to {pattern}: {source}")]
    Subscribe {
        pattern: String,
        #[source]
        source: redis::RedisError,
    },
}

impl SubscriberError {
    pub fn kind(&self) -> &'static str {
        match self {
            SubscriberError::Connect(_) => "connection",
            SubscriberError::Setup(_) | SubscriberError::Subscribe { .. } => "setup",
        }
    }
}

/// Opens sessions against the store
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Session: NotificationSession + 'static;

    async fn connect(&self) -> Result<Self::Session, SubscriberError>;
}

/// One live connection able to subscribe and deliver messages
#[async_trait]
pub trait NotificationSession: Send {
    async fn enable_expired_notifications(&mut self) -> Result<(), SubscriberError>;

    async fn psubscribe(&mut self, pattern: &str) -> Result<(), SubscriberError>;

    /// Next delivered message, `None` once the connection is gone
    async fn next_event(&mut self) -> Option<NotificationEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Delay between reconnection attempts: grows linearly per attempt up to a cap,
/// never shorter than one step
const MIN_RECONNECT_STEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    step: Duration,
    max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_delay: Duration) -> Self {
        Self {
            step: Duration::from_millis(50),
            max_delay,
        }
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step.max(MIN_RECONNECT_STEP);
        self
    }

    /// Delay before the given (1-based) attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step
            .saturating_mul(attempt)
            .min(self.max_delay)
            .max(self.step)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

/// Redis connector: a command connection for CONFIG plus a pub/sub connection
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    pub fn new(info: redis::ConnectionInfo) -> Result<Self, SubscriberError> {
        let client = redis::Client::open(info).map_err(SubscriberError::Connect)?;
        Ok(Self { client })
    }
}

pub struct RedisSession {
    commands: redis::aio::MultiplexedConnection,
    pubsub: redis::aio::PubSub,
}

#[async_trait]
impl StoreConnector for RedisConnector {
    type Session = RedisSession;

    async fn connect(&self) -> Result<RedisSession, SubscriberError> {
        let commands = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(SubscriberError::Connect)?;
        let pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(SubscriberError::Connect)?;
        Ok(RedisSession { commands, pubsub })
    }
}

#[async_trait]
impl NotificationSession for RedisSession {
    async fn enable_expired_notifications(&mut self) -> Result<(), SubscriberError> {
        redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg(NOTIFY_EXPIRED_FLAGS)
            .query_async::<()>(&mut self.commands)
            .await
            .map_err(SubscriberError::Setup)
    }

    async fn psubscribe(&mut self, pattern: &str) -> Result<(), SubscriberError> {
        self.pubsub
            .psubscribe(pattern)
            .await
            .map_err(|source| SubscriberError::Subscribe {
                pattern: pattern.to_string(),
                source,
            })
    }

    async fn next_event(&mut self) -> Option<NotificationEvent> {
        let mut messages = std::pin::pin!(self.pubsub.on_message());
        loop {
            let msg = messages.next().await?;
            let channel = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => {
                    let pattern: String = msg.get_pattern().unwrap_or_default();
                    return Some(NotificationEvent {
                        pattern,
                        channel,
                        payload,
                    });
                }
                Err(e) => warn!(%channel, error = %e, "subscriber: undecodable payload; skip"),
            }
        }
    }
}

/// Notification subscriber; owns its store connection for the process lifetime
pub struct Subscriber<C: StoreConnector> {
    connector: C,
    policy: ReconnectPolicy,
    state: watch::Sender<SubscriberState>,
}

impl<C: StoreConnector> Subscriber<C> {
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(SubscriberState::Disconnected);
        Self {
            connector,
            policy,
            state,
        }
    }

    /// Watch the connection state
    pub fn state(&self) -> watch::Receiver<SubscriberState> {
        self.state.subscribe()
    }

    /// Forward expiration events into `events` until the receiver is dropped.
    pub async fn run(self, events: mpsc::Sender<NotificationEvent>) {
        let mut attempt: u32 = 0;
        loop {
            self.transition(SubscriberState::Connecting);
            match self.establish().await {
                Ok(mut session) => {
                    attempt = 0;
                    self.transition(SubscriberState::Subscribed);
                    if !self.forward(&mut session, &events).await {
                        info!("subscriber: event receiver closed; stopping");
                        self.transition(SubscriberState::Disconnected);
                        return;
                    }
                    warn!("subscriber: connection lost");
                }
                Err(e) => {
                    error!(kind = e.kind(), error = %e, "subscriber: connect/subscribe failed");
                }
            }
            self.transition(SubscriberState::Disconnected);

            if events.is_closed() {
                return;
            }
            attempt = attempt.saturating_add(1);
            let delay = self.policy.delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "subscriber: reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    async fn establish(&self) -> Result<C::Session, SubscriberError> {
        let mut session = self.connector.connect().await?;

        session.enable_expired_notifications().await?;
        info!("subscriber: keyspace notifications enabled");

        session.psubscribe(EXPIRED_PATTERN).await?;
        info!(pattern = EXPIRED_PATTERN, "subscriber: listening for expirations");

        Ok(session)
    }

    /// Returns false when the receiving side is gone.
    async fn forward(
        &self,
        session: &mut C::Session,
        events: &mpsc::Sender<NotificationEvent>,
    ) -> bool {
        while let Some(event) = session.next_event().await {
            if event.pattern != EXPIRED_PATTERN {
                debug!(pattern = %event.pattern, channel = %event.channel, "subscriber: not ours; skip");
                continue;
            }
            if events.send(event).await.is_err() {
                return false;
            }
        }
        true
    }

    fn transition(&self, next: SubscriberState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "subscriber: state");
        }
    }
}
