//! Inbound frame dispatch: decode, count, project, fan out.

use tracing::{debug, trace, warn};

use creatorguard_protocol::{FrameError, Message, MessageType};

use crate::health::HealthTracker;
use crate::projection::ProjectedState;
use crate::subscription::SubscriptionRegistry;

/// Outcome of dispatching one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    /// A projection rule folded the message into shared state.
    pub projected: bool,
    /// Number of handler invocations.
    pub handler_calls: usize,
}

/// Routes decoded frames to projections and subscription handlers.
///
/// Dispatch is synchronous: the next frame isn't looked at until every
/// handler for the current one has returned, so arrival order is delivery
/// order.
#[derive(Debug)]
pub struct Dispatcher {
    state: ProjectedState,
    verbose: bool,
}

impl Dispatcher {
    pub fn new(recent_capacity: usize, verbose: bool) -> Self {
        Self {
            state: ProjectedState::new(recent_capacity),
            verbose,
        }
    }

    /// Decodes a text frame and dispatches it. Malformed frames are returned
    /// as errors without touching counters or state.
    pub fn dispatch_frame(
        &mut self,
        text: &str,
        health: &mut HealthTracker,
        registry: &SubscriptionRegistry,
    ) -> Result<(Message, Dispatched), FrameError> {
        let message = match Message::decode(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return Err(e);
            }
        };
        let outcome = self.dispatch(&message, health, registry);
        Ok((message, outcome))
    }

    /// Dispatches an already decoded message.
    pub fn dispatch(
        &mut self,
        message: &Message,
        health: &mut HealthTracker,
        registry: &SubscriptionRegistry,
    ) -> Dispatched {
        health.record_received();
        let projected = self.state.apply(message);

        let handler_calls = if message.msg_type == MessageType::Unknown {
            0
        } else {
            registry.fan_out(message)
        };

        if self.verbose {
            debug!(
                msg_type = ?message.msg_type,
                seq = ?message.seq,
                projected,
                handler_calls,
                "dispatched frame"
            );
        } else {
            trace!(msg_type = ?message.msg_type, handler_calls, "dispatched frame");
        }

        Dispatched {
            projected,
            handler_calls,
        }
    }

    pub fn state(&self) -> &ProjectedState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::projection::Feed;
    use crate::subscription::{Filter, SubscriptionConfig};

    fn frame(msg_type: &str, payload: serde_json::Value) -> String {
        json!({"type": msg_type, "payload": payload, "timestamp": "2026-03-01T12:00:00Z"})
            .to_string()
    }

    #[test]
    fn counts_every_decoded_frame_once() {
        let mut dispatcher = Dispatcher::new(10, false);
        let mut health = HealthTracker::new();
        let mut registry = SubscriptionRegistry::new();
        let cfg = SubscriptionConfig::new([MessageType::Activity]);
        registry.subscribe("a", cfg.clone(), Box::new(|_: &Message| {}));
        registry.subscribe("b", cfg, Box::new(|_: &Message| {}));

        let (_, outcome) = dispatcher
            .dispatch_frame(&frame("activity", json!({})), &mut health, &registry)
            .unwrap();
        assert_eq!(outcome.handler_calls, 2);
        assert_eq!(health.snapshot().messages_received, 1);

        dispatcher
            .dispatch_frame(&frame("notification", json!({})), &mut health, &registry)
            .unwrap();
        assert_eq!(health.snapshot().messages_received, 2);
    }

    #[test]
    fn malformed_frame_is_dropped_without_counting() {
        let mut dispatcher = Dispatcher::new(10, true);
        let mut health = HealthTracker::new();
        let registry = SubscriptionRegistry::new();

        let result = dispatcher.dispatch_frame("{oops", &mut health, &registry);
        assert!(result.is_err());
        assert_eq!(health.snapshot().messages_received, 0);
        assert!(dispatcher.state().last_message().is_none());
    }

    #[test]
    fn projection_runs_without_subscribers() {
        let mut dispatcher = Dispatcher::new(10, false);
        let mut health = HealthTracker::new();
        let registry = SubscriptionRegistry::new();

        let (_, outcome) = dispatcher
            .dispatch_frame(
                &frame("detection_found", json!({"profileId": 3})),
                &mut health,
                &registry,
            )
            .unwrap();
        assert!(outcome.projected);
        assert_eq!(outcome.handler_calls, 0);
        assert_eq!(dispatcher.state().feed(Feed::Detections).len(), 1);
    }

    #[test]
    fn unknown_types_are_counted_but_not_delivered() {
        let mut dispatcher = Dispatcher::new(10, false);
        let mut health = HealthTracker::new();
        let mut registry = SubscriptionRegistry::new();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        registry.subscribe(
            "all",
            SubscriptionConfig::new([MessageType::Unknown]),
            Box::new(move |_: &Message| *h.lock().unwrap() += 1),
        );

        let (message, outcome) = dispatcher
            .dispatch_frame(&frame("invoice_paid", json!({})), &mut health, &registry)
            .unwrap();
        assert_eq!(message.msg_type, MessageType::Unknown);
        assert!(!outcome.projected);
        assert_eq!(outcome.handler_calls, 0);
        assert_eq!(*hits.lock().unwrap(), 0);
        assert_eq!(health.snapshot().messages_received, 1);
        assert_eq!(dispatcher.state().last_message(), Some(&message));
    }

    #[test]
    fn filtered_subscription_only_sees_matching_payloads() {
        let mut dispatcher = Dispatcher::new(10, false);
        let mut health = HealthTracker::new();
        let mut registry = SubscriptionRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        registry.subscribe(
            "profile-42",
            SubscriptionConfig::new([MessageType::DetectionFound])
                .with_filter(Filter::field_equals("profileId", 42)),
            Box::new(move |m: &Message| s.lock().unwrap().push(m.payload["profileId"].clone())),
        );

        for id in [42, 7, 42] {
            dispatcher
                .dispatch_frame(
                    &frame("detection_found", json!({"profileId": id})),
                    &mut health,
                    &registry,
                )
                .unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), vec![json!(42), json!(42)]);
        // All three still land in the projection.
        assert_eq!(dispatcher.state().feed(Feed::Detections).len(), 3);
    }
}
