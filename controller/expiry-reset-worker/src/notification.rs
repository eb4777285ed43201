//! Keyspace expiration events as delivered by a Redis pattern subscription

/// Pattern covering the expired-key event channel of every database
pub const EXPIRED_PATTERN: &str = "__keyevent@*__:expired";

/// `notify-keyspace-events` flags: keyevent channels (`E`) for expirations (`x`)
pub const NOTIFY_EXPIRED_FLAGS: &str = "Ex";

const KEYEVENT_PREFIX: &str = "__keyevent@";
const EXPIRED_SUFFIX: &str = "__:expired";

/// One message received on the expiration pattern subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub pattern: String,
    pub channel: String,
    /// Name of the key that expired
    pub payload: String,
}

impl NotificationEvent {
    pub fn new(
        pattern: impl Into<String>,
        channel: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Database index of an expired-event channel, `None` for any other channel
    pub fn db_index(&self) -> Option<u32> {
        expired_channel_db(&self.channel)
    }

    pub fn is_expiration(&self) -> bool {
        self.db_index().is_some()
    }
}

/// Parse `__keyevent@<db>__:expired` and return `<db>`.
pub fn expired_channel_db(channel: &str) -> Option<u32> {
    let db = channel
        .strip_prefix(KEYEVENT_PREFIX)?
        .strip_suffix(EXPIRED_SUFFIX)?;
    if db.is_empty() || !db.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    db.parse().ok()
}
