//! Shared dashboard state folded from recognized message types.
//!
//! Consumers that read state directly (rather than through subscription
//! handlers) see every recognized message, whether or not any subscription
//! matched it.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use creatorguard_protocol::{Message, MessageType};

/// Bounded list of recent items.
///
/// When full, the oldest entry is evicted on each push. Iteration order is
/// oldest → newest (arrival order).
#[derive(Debug, Clone)]
pub struct RecentList<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RecentList<T> {
    /// Create an empty list. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a value, evicting the oldest entry when at capacity.
    pub fn push(&mut self, value: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.buf.iter()
    }

    /// Iterate from newest to oldest, the usual order for a feed.
    pub fn newest_first(&self) -> impl Iterator<Item = &T> {
        self.buf.iter().rev()
    }

    /// The most recently pushed value, if any.
    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Keyed tables fed by upsert rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    ScanProgress,
    Takedowns,
}

/// Bounded lists fed by push rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Detections,
    Notifications,
    Activity,
}

/// How a recognized message type is folded into state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Replace the entry keyed by the payload field `key`.
    Upsert { table: Table, key: &'static str },
    /// Append to a bounded feed.
    Push(Feed),
}

const RULES: &[(MessageType, Rule)] = &[
    (
        MessageType::ScanProgress,
        Rule::Upsert {
            table: Table::ScanProgress,
            key: "submissionId",
        },
    ),
    (
        MessageType::ScanComplete,
        Rule::Upsert {
            table: Table::ScanProgress,
            key: "submissionId",
        },
    ),
    (MessageType::DetectionFound, Rule::Push(Feed::Detections)),
    (
        MessageType::TakedownUpdate,
        Rule::Upsert {
            table: Table::Takedowns,
            key: "takedownId",
        },
    ),
    (MessageType::Notification, Rule::Push(Feed::Notifications)),
    (MessageType::AdminNotification, Rule::Push(Feed::Notifications)),
    (MessageType::Activity, Rule::Push(Feed::Activity)),
];

/// Looks up the projection rule for a message type.
pub fn rule_for(msg_type: MessageType) -> Option<Rule> {
    RULES
        .iter()
        .find(|(t, _)| *t == msg_type)
        .map(|(_, rule)| *rule)
}

/// Dashboard state derived from the event stream.
#[derive(Debug, Clone)]
pub struct ProjectedState {
    scan_progress: HashMap<String, Value>,
    takedowns: HashMap<String, Value>,
    detections: RecentList<Message>,
    notifications: RecentList<Message>,
    activity: RecentList<Message>,
    last_message: Option<Message>,
}

impl ProjectedState {
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            scan_progress: HashMap::new(),
            takedowns: HashMap::new(),
            detections: RecentList::new(recent_capacity),
            notifications: RecentList::new(recent_capacity),
            activity: RecentList::new(recent_capacity),
            last_message: None,
        }
    }

    /// Records `message` as the last one seen and applies its rule, if any.
    /// Returns whether a rule applied.
    pub fn apply(&mut self, message: &Message) -> bool {
        self.last_message = Some(message.clone());

        match rule_for(message.msg_type) {
            Some(Rule::Upsert { table, key }) => {
                let Some(id) = message.field(key).and_then(key_string) else {
                    return false;
                };
                self.table_mut(table).insert(id, message.payload.clone());
                true
            }
            Some(Rule::Push(feed)) => {
                self.feed_mut(feed).push(message.clone());
                true
            }
            None => false,
        }
    }

    /// Latest scan progress payload for a submission.
    pub fn scan_progress(&self, submission_id: &str) -> Option<&Value> {
        self.scan_progress.get(submission_id)
    }

    pub fn scans(&self) -> &HashMap<String, Value> {
        &self.scan_progress
    }

    /// Latest takedown status payload.
    pub fn takedown(&self, takedown_id: &str) -> Option<&Value> {
        self.takedowns.get(takedown_id)
    }

    pub fn takedowns(&self) -> &HashMap<String, Value> {
        &self.takedowns
    }

    pub fn feed(&self, feed: Feed) -> &RecentList<Message> {
        match feed {
            Feed::Detections => &self.detections,
            Feed::Notifications => &self.notifications,
            Feed::Activity => &self.activity,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.last_message.as_ref()
    }

    /// Reset all state.
    pub fn clear(&mut self) {
        self.scan_progress.clear();
        self.takedowns.clear();
        self.detections.clear();
        self.notifications.clear();
        self.activity.clear();
        self.last_message = None;
    }

    fn table_mut(&mut self, table: Table) -> &mut HashMap<String, Value> {
        match table {
            Table::ScanProgress => &mut self.scan_progress,
            Table::Takedowns => &mut self.takedowns,
        }
    }

    fn feed_mut(&mut self, feed: Feed) -> &mut RecentList<Message> {
        match feed {
            Feed::Detections => &mut self.detections,
            Feed::Notifications => &mut self.notifications,
            Feed::Activity => &mut self.activity,
        }
    }
}

/// Ids arrive as strings or integers depending on the backend table.
fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn msg(msg_type: MessageType, payload: Value) -> Message {
        Message::new(msg_type, &payload).unwrap()
    }

    // --- RecentList ---

    #[test]
    fn push_over_capacity_evicts_oldest() {
        let mut list = RecentList::new(3);
        for i in 1..=5 {
            list.push(i);
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(list.newest_first().copied().collect::<Vec<_>>(), vec![5, 4, 3]);
        assert_eq!(list.latest(), Some(&5));
    }

    #[test]
    fn zero_capacity_is_raised() {
        let mut list = RecentList::new(0);
        list.push("a");
        list.push("b");
        assert_eq!(list.capacity(), 1);
        assert_eq!(list.latest(), Some(&"b"));
    }

    // --- Rules ---

    #[test]
    fn every_rule_is_unique() {
        for (i, (t, _)) in RULES.iter().enumerate() {
            assert!(
                RULES[i + 1..].iter().all(|(other, _)| other != t),
                "{t:?} has two rules"
            );
        }
    }

    #[test]
    fn control_and_unknown_types_have_no_rule() {
        for t in [
            MessageType::Ping,
            MessageType::Pong,
            MessageType::Subscribe,
            MessageType::Error,
            MessageType::Unknown,
        ] {
            assert_eq!(rule_for(t), None, "{t:?}");
        }
    }

    // --- ProjectedState ---

    #[test]
    fn scan_progress_upserts_by_submission() {
        let mut state = ProjectedState::new(10);
        assert!(state.apply(&msg(
            MessageType::ScanProgress,
            json!({"submissionId": "s-1", "percent": 10})
        )));
        state.apply(&msg(
            MessageType::ScanProgress,
            json!({"submissionId": "s-2", "percent": 50})
        ));
        state.apply(&msg(
            MessageType::ScanComplete,
            json!({"submissionId": "s-1", "percent": 100, "matches": 3})
        ));

        assert_eq!(state.scans().len(), 2);
        assert_eq!(state.scan_progress("s-1").unwrap()["percent"], 100);
        assert_eq!(state.scan_progress("s-2").unwrap()["percent"], 50);
    }

    #[test]
    fn takedowns_accept_numeric_ids() {
        let mut state = ProjectedState::new(10);
        state.apply(&msg(
            MessageType::TakedownUpdate,
            json!({"takedownId": 77, "status": "sent"})
        ));
        assert_eq!(state.takedown("77").unwrap()["status"], "sent");
    }

    #[test]
    fn upsert_without_key_is_skipped() {
        let mut state = ProjectedState::new(10);
        let m = msg(MessageType::ScanProgress, json!({"percent": 10}));
        assert!(!state.apply(&m));
        assert!(state.scans().is_empty());
        assert_eq!(state.last_message(), Some(&m));
    }

    #[test]
    fn notifications_share_one_feed() {
        let mut state = ProjectedState::new(10);
        state.apply(&msg(MessageType::Notification, json!({"text": "a"})));
        state.apply(&msg(MessageType::AdminNotification, json!({"text": "b"})));
        let texts: Vec<_> = state
            .feed(Feed::Notifications)
            .iter()
            .map(|m| m.payload["text"].clone())
            .collect();
        assert_eq!(texts, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn unknown_type_only_updates_last_message() {
        let mut state = ProjectedState::new(10);
        let m = msg(MessageType::Unknown, json!({"x": 1}));
        assert!(!state.apply(&m));
        assert_eq!(state.last_message(), Some(&m));
        assert!(state.feed(Feed::Activity).is_empty());
    }

    #[test]
    fn clear_resets() {
        let mut state = ProjectedState::new(10);
        state.apply(&msg(MessageType::Activity, json!({})));
        state.apply(&msg(
            MessageType::TakedownUpdate,
            json!({"takedownId": "t", "status": "filed"})
        ));
        state.clear();
        assert!(state.feed(Feed::Activity).is_empty());
        assert!(state.takedowns().is_empty());
        assert!(state.last_message().is_none());
    }
}
