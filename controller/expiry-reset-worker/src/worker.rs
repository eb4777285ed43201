//! Worker composition: subscriber -> channel -> reset trigger

use crate::config::Config;
use crate::reset::{HttpResetClient, ResetClient};
use crate::subscriber::{RedisConnector, StoreConnector, Subscriber, SubscriberState};
use crate::trigger::{ResetTrigger, TriggerStats};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// Events buffered between the subscriber and the trigger
const EVENT_BUFFER: usize = 1024;

pub struct ResetWorker<C: StoreConnector, R: ResetClient> {
    subscriber: Subscriber<C>,
    trigger: ResetTrigger<R>,
}

impl ResetWorker<RedisConnector, HttpResetClient> {
    /// Build the Redis subscriber and HTTP trigger described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let connector = RedisConnector::new(config.redis_connection_info())
            .context("Invalid Redis connection settings")?;
        let client = HttpResetClient::new(
            config.reset_endpoint_url.clone(),
            config.reset_secret.clone(),
            config.reset_timeout(),
        )?;

        let subscriber = Subscriber::new(connector, config.reconnect_policy());
        let trigger = ResetTrigger::new(Arc::new(client), config.counter_key.clone())
            .with_db_index(config.expired_db_index)
            .serialized(config.serialize_resets);

        Ok(Self::new(subscriber, trigger))
    }
}

impl<C, R> ResetWorker<C, R>
where
    C: StoreConnector + 'static,
    R: ResetClient + 'static,
{
    pub fn new(subscriber: Subscriber<C>, trigger: ResetTrigger<R>) -> Self {
        Self {
            subscriber,
            trigger,
        }
    }

    pub fn state(&self) -> watch::Receiver<SubscriberState> {
        self.subscriber.state()
    }

    pub fn stats(&self) -> Arc<TriggerStats> {
        self.trigger.stats_handle()
    }

    /// Run until the subscriber task ends. Reset failures never end the loop.
    pub async fn run(self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let subscriber = tokio::spawn(self.subscriber.run(tx));

        info!(
            counter_key = %self.trigger.counter_key(),
            "Worker started"
        );

        while let Some(event) = rx.recv().await {
            // the spawned reset is detached; its outcome is logged by the trigger
            let _ = self.trigger.dispatch(event);
        }

        subscriber.await.map_err(|e| {
            error!(error = %e, "subscriber task failed");
            anyhow::anyhow!("subscriber task failed: {}", e)
        })?;
        Ok(())
    }
}
