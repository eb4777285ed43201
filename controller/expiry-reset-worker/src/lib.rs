//! Expiry Reset Worker - turns a Redis key expiration into a backend reset call
//!
//! The worker pattern-subscribes to expired-key events across every logical
//! database and, when the watched counter key expires, POSTs once to the
//! configured reset endpoint with the shared secret in an `x-secret` header.

pub mod config;
pub mod notification;
pub mod reset;
pub mod subscriber;
pub mod trigger;
pub mod worker;

pub use config::Config;
pub use notification::NotificationEvent;
pub use reset::{HttpResetClient, ResetClient, ResetError};
pub use subscriber::{RedisConnector, Subscriber, SubscriberState};
pub use trigger::{ResetTrigger, TriggerStats};
pub use worker::ResetWorker;
