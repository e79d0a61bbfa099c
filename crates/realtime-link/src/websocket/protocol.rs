//! Subscription protocol trait for server-agnostic topic intents.
//!
//! The [`SubscriptionProtocol`] trait abstracts the shape of the messages
//! that tell the server which topic the client is interested in. The link
//! decides *when* an intent goes on the wire; the protocol decides *what* it
//! looks like.

use serde_json::{Map, Value};

use super::types::Topic;
use crate::codec::Payload;

/// Field carrying the topic in the default intent messages.
pub const DEFAULT_TOPIC_FIELD: &str = "canvasId";

/// Builds the subscribe and unsubscribe intent messages for a topic.
///
/// # Example
///
/// ```rust,ignore
/// use realtime_link::{codec::Payload, websocket::{SubscriptionProtocol, Topic}};
///
/// struct ChannelProtocol;
///
/// impl SubscriptionProtocol for ChannelProtocol {
///     fn build_subscribe(&self, topic: &Topic) -> Payload {
///         Payload::text(format!("JOIN {topic}"))
///     }
///
///     fn build_unsubscribe(&self, topic: &Topic) -> Payload {
///         Payload::text(format!("PART {topic}"))
///     }
/// }
/// ```
pub trait SubscriptionProtocol: Send + Sync + 'static {
    fn build_subscribe(&self, topic: &Topic) -> Payload;

    fn build_unsubscribe(&self, topic: &Topic) -> Payload;
}

/// JSON intents of the form `{"type":"subscribe","canvasId":"<topic>"}`.
#[derive(Clone, Debug)]
pub struct JsonTopicProtocol {
    field: String,
}

impl JsonTopicProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `field` instead of `canvasId` to carry the topic.
    pub fn with_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn intent(&self, kind: &str, topic: &Topic) -> Payload {
        let mut body = Map::new();
        body.insert("type".to_string(), Value::String(kind.to_string()));
        body.insert(self.field.clone(), Value::String(topic.as_str().to_string()));
        Payload::Json(Value::Object(body))
    }
}

impl Default for JsonTopicProtocol {
    fn default() -> Self {
        Self::with_field(DEFAULT_TOPIC_FIELD)
    }
}

impl SubscriptionProtocol for JsonTopicProtocol {
    fn build_subscribe(&self, topic: &Topic) -> Payload {
        self.intent("subscribe", topic)
    }

    fn build_unsubscribe(&self, topic: &Topic) -> Payload {
        self.intent("unsubscribe", topic)
    }
}
