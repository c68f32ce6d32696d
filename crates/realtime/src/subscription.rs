//! Subscription registry and payload filters.
//!
//! Subscriptions are bookkeeping only: they never touch the transport. Each
//! one names the message types it wants plus an optional [`Filter`] over the
//! payload, and owns the handlers bound to its id.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use creatorguard_protocol::{Message, MessageType};

/// Callback invoked synchronously for each matching message.
pub type Handler = Box<dyn Fn(&Message) + Send + Sync>;

/// Payload predicate. Field paths use dot notation (`"match.platform"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    /// The field exists and equals `value`.
    FieldEquals { field: String, value: Value },
    /// The field exists and equals one of `values`.
    FieldIn { field: String, values: Vec<Value> },
    /// Every inner filter matches. An empty list matches everything.
    All { filters: Vec<Filter> },
    /// At least one inner filter matches.
    Any { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::FieldIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::FieldEquals { field, value } => message
                .field(field)
                .is_some_and(|actual| values_equal(actual, value)),
            Self::FieldIn { field, values } => message
                .field(field)
                .is_some_and(|actual| values.iter().any(|v| values_equal(actual, v))),
            Self::All { filters } => filters.iter().all(|f| f.matches(message)),
            Self::Any { filters } => filters.iter().any(|f| f.matches(message)),
            Self::Not { filter } => !filter.matches(message),
        }
    }
}

/// JSON equality where `42` and `42.0` are the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// What a consumer wants to receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionConfig {
    pub message_types: Vec<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

impl SubscriptionConfig {
    /// Interest in the given types; duplicates are dropped.
    pub fn new(types: impl IntoIterator<Item = MessageType>) -> Self {
        let mut message_types = Vec::new();
        for t in types {
            if !message_types.contains(&t) {
                message_types.push(t);
            }
        }
        Self {
            message_types,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.message_types.contains(&message.msg_type)
            && self.filter.as_ref().is_none_or(|f| f.matches(message))
    }
}

/// A registered interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(flatten)]
    pub config: SubscriptionConfig,
}

struct Entry {
    subscription: Subscription,
    handlers: Vec<Handler>,
}

/// Ordered table of subscriptions and their handler bindings.
///
/// Iteration follows registration order. Re-registering an id keeps its
/// position but swaps config and handlers wholesale.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Entry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the subscription `id`. Returns `true` if an
    /// existing registration was replaced.
    pub fn subscribe(
        &mut self,
        id: impl Into<String>,
        config: SubscriptionConfig,
        handler: Handler,
    ) -> bool {
        let subscription = Subscription {
            id: id.into(),
            config,
        };
        match self.position(&subscription.id) {
            Some(idx) => {
                self.entries[idx] = Entry {
                    subscription,
                    handlers: vec![handler],
                };
                true
            }
            None => {
                self.entries.push(Entry {
                    subscription,
                    handlers: vec![handler],
                });
                false
            }
        }
    }

    /// Adds another handler to an existing subscription.
    pub fn bind(&mut self, id: &str, handler: Handler) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.entries[idx].handlers.push(handler);
                true
            }
            None => false,
        }
    }

    /// Removes the subscription and every handler bound to it.
    pub fn unsubscribe(&mut self, id: &str) -> Option<Subscription> {
        let idx = self.position(id)?;
        Some(self.entries.remove(idx).subscription)
    }

    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.position(id).map(|idx| &self.entries[idx].subscription)
    }

    pub fn handler_count(&self, id: &str) -> usize {
        self.position(id)
            .map_or(0, |idx| self.entries[idx].handlers.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter().map(|e| &e.subscription)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invokes every handler of every matching subscription, in registration
    /// order. Returns the number of handler calls.
    pub fn fan_out(&self, message: &Message) -> usize {
        let mut calls = 0;
        for entry in &self.entries {
            if !entry.subscription.config.matches(message) {
                continue;
            }
            for handler in &entry.handlers {
                handler(message);
                calls += 1;
            }
        }
        calls
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.subscription.id == id)
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| (&e.subscription.id, e.handlers.len())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    fn msg(msg_type: MessageType, payload: Value) -> Message {
        Message::new(msg_type, &payload).unwrap()
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for = {
            let log = log.clone();
            move |tag: &str| -> Handler {
                let log = log.clone();
                let tag = tag.to_string();
                Box::new(move |m: &Message| {
                    log.lock().unwrap().push(format!("{tag}:{}", m.payload["n"]));
                })
            }
        };
        (log, log_for)
    }

    // --- Filter ---

    #[test]
    fn field_equals_matches_numbers_loosely() {
        let f = Filter::field_equals("profileId", 42);
        assert!(f.matches(&msg(MessageType::DetectionFound, json!({"profileId": 42}))));
        assert!(f.matches(&msg(MessageType::DetectionFound, json!({"profileId": 42.0}))));
        assert!(!f.matches(&msg(MessageType::DetectionFound, json!({"profileId": 7}))));
        assert!(!f.matches(&msg(MessageType::DetectionFound, json!({"profileId": "42"}))));
        assert!(!f.matches(&msg(MessageType::DetectionFound, json!({}))));
    }

    #[test]
    fn field_in_acts_as_id_set() {
        let f = Filter::field_in("submissionId", ["s-1", "s-2"]);
        assert!(f.matches(&msg(MessageType::ScanProgress, json!({"submissionId": "s-2"}))));
        assert!(!f.matches(&msg(MessageType::ScanProgress, json!({"submissionId": "s-3"}))));
    }

    #[test]
    fn combinators() {
        let f = Filter::All {
            filters: vec![
                Filter::field_equals("profileId", 1),
                Filter::Not {
                    filter: Box::new(Filter::field_equals("match.platform", "tube")),
                },
            ],
        };
        assert!(f.matches(&msg(
            MessageType::DetectionFound,
            json!({"profileId": 1, "match": {"platform": "pics"}})
        )));
        assert!(!f.matches(&msg(
            MessageType::DetectionFound,
            json!({"profileId": 1, "match": {"platform": "tube"}})
        )));

        let any = Filter::Any { filters: vec![] };
        assert!(!any.matches(&msg(MessageType::Activity, json!({}))));
        let all = Filter::All { filters: vec![] };
        assert!(all.matches(&msg(MessageType::Activity, json!({}))));
    }

    #[test]
    fn filter_serialization_is_tagged() {
        let f = Filter::field_equals("profileId", 42);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(
            json,
            json!({"kind": "field_equals", "field": "profileId", "value": 42})
        );
        let back: Filter = serde_json::from_value(json).unwrap();
        assert_eq!(back, f);
    }

    // --- Config ---

    #[test]
    fn config_dedups_types() {
        let cfg = SubscriptionConfig::new([
            MessageType::ScanProgress,
            MessageType::ScanComplete,
            MessageType::ScanProgress,
        ]);
        assert_eq!(
            cfg.message_types,
            vec![MessageType::ScanProgress, MessageType::ScanComplete]
        );
    }

    #[test]
    fn config_requires_type_and_filter() {
        let cfg = SubscriptionConfig::new([MessageType::DetectionFound])
            .with_filter(Filter::field_equals("profileId", 42));
        assert!(cfg.matches(&msg(MessageType::DetectionFound, json!({"profileId": 42}))));
        assert!(!cfg.matches(&msg(MessageType::Notification, json!({"profileId": 42}))));
        assert!(!cfg.matches(&msg(MessageType::DetectionFound, json!({"profileId": 7}))));
    }

    // --- Registry ---

    #[test]
    fn resubscribe_replaces_instead_of_duplicating() {
        let (log, handler) = recorder();
        let mut reg = SubscriptionRegistry::new();
        let cfg = SubscriptionConfig::new([MessageType::Activity]);

        assert!(!reg.subscribe("feed", cfg.clone(), handler("a")));
        assert!(reg.subscribe("feed", cfg, handler("b")));
        assert_eq!(reg.len(), 1);

        let calls = reg.fan_out(&msg(MessageType::Activity, json!({"n": 1})));
        assert_eq!(calls, 1);
        assert_eq!(*log.lock().unwrap(), vec!["b:1"]);
    }

    #[test]
    fn unsubscribe_drops_all_bindings() {
        let (log, handler) = recorder();
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(
            "feed",
            SubscriptionConfig::new([MessageType::Activity]),
            handler("a"),
        );
        assert!(reg.bind("feed", handler("b")));
        assert_eq!(reg.handler_count("feed"), 2);

        let removed = reg.unsubscribe("feed").unwrap();
        assert_eq!(removed.id, "feed");
        assert_eq!(reg.handler_count("feed"), 0);
        assert_eq!(reg.fan_out(&msg(MessageType::Activity, json!({"n": 1}))), 0);
        assert!(log.lock().unwrap().is_empty());
        assert!(reg.unsubscribe("feed").is_none());
    }

    #[test]
    fn bind_to_unknown_id_fails() {
        let (_, handler) = recorder();
        let mut reg = SubscriptionRegistry::new();
        assert!(!reg.bind("missing", handler("x")));
    }

    #[test]
    fn fan_out_follows_registration_order() {
        let (log, handler) = recorder();
        let mut reg = SubscriptionRegistry::new();
        let cfg = SubscriptionConfig::new([MessageType::Activity]);
        reg.subscribe("first", cfg.clone(), handler("first"));
        reg.subscribe("second", cfg.clone(), handler("second"));
        reg.bind("first", handler("first-extra"));
        // Replacing keeps the original slot.
        reg.subscribe("first", cfg, handler("first-new"));
        reg.bind("first", handler("first-extra"));

        reg.fan_out(&msg(MessageType::Activity, json!({"n": 1})));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first-new:1", "first-extra:1", "second:1"]
        );
    }

    #[test]
    fn subscription_serializes_flat() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(
            "alerts",
            SubscriptionConfig::new([MessageType::Notification])
                .with_filter(Filter::field_equals("level", "critical")),
            Box::new(|_: &Message| {}),
        );
        let json = serde_json::to_value(reg.get("alerts").unwrap()).unwrap();
        assert_eq!(json["id"], "alerts");
        assert_eq!(json["messageTypes"], json!(["notification"]));
        assert_eq!(json["filter"]["kind"], "field_equals");
    }
}
