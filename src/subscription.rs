//! Subscription snapshots handed to a consumer by the subscription registry.
//!
//! A `Subscription` is immutable once built. Configuration changes arrive as a
//! whole new snapshot that the consumer swaps in, so no reader ever sees a
//! half-applied update.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a topic's payloads are encoded on the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Json,
    Binary,
}

impl ContentType {
    pub fn as_mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Binary => "application/octet-stream",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    #[serde(default)]
    pub content_type: ContentType,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: ContentType::Json,
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Retry behaviour the sender applies to a single delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Identity of a subscription: `<topic>$<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionName {
    pub topic: String,
    pub name: String,
}

impl SubscriptionName {
    pub fn new(topic: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.topic, self.name)
    }
}

/// Configuration snapshot of one subscription.
///
/// ## Example
///
/// ```
/// use sourced_consumer::{Subscription, Topic};
///
/// let sub = Subscription::new(Topic::new("orders"), "billing", "http://billing/orders")
///     .with_max_inflight(8)
///     .with_rate_limit(250.0);
///
/// assert_eq!(sub.id(), "orders$billing");
/// assert_eq!(sub.max_inflight, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub topic: Topic,
    pub name: String,
    pub endpoint: String,
    /// Deliveries admitted per second. `None` means unpaced.
    #[serde(default)]
    pub rate_limit: Option<f64>,
    /// Upper bound on messages under delivery at once.
    pub max_inflight: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Subscription {
    pub fn new(topic: Topic, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            topic,
            name: name.into(),
            endpoint: endpoint.into(),
            rate_limit: None,
            max_inflight: 100,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_inflight(mut self, max_inflight: usize) -> Self {
        self.max_inflight = max_inflight;
        self
    }

    pub fn with_rate_limit(mut self, per_second: f64) -> Self {
        self.rate_limit = Some(per_second);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn subscription_name(&self) -> SubscriptionName {
        SubscriptionName::new(&self.topic.name, &self.name)
    }

    pub fn id(&self) -> String {
        self.subscription_name().to_string()
    }
}
