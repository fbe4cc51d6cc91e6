//! # Routing Integration Tests
//!
//! Destination resolution through a live [`MessageBus`]:
//!
//! 1. **Unicast**: the most specific pattern wins, ties go to the earliest
//!    registration, handlers under one pattern take turns
//! 2. **Multicast**: every match receives a copy, most specific first
//! 3. **Registration**: malformed patterns are rejected up front

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bus_runtime::services::{RESOLUTION_PATTERNS, RESOLUTION_TABLE};
    use shared_bus::{
        handler_fn, BusConfig, BusError, Handler, MatchMode, MessageBus, MessageBusApi, Outcome,
        Payload, PatternError, Wait,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn bus() -> MessageBus {
        MessageBus::new(BusConfig::default()).unwrap()
    }

    /// Replies with the pattern the request was routed through.
    fn pattern_reporter() -> Arc<dyn Handler> {
        handler_fn(|request| async move { Ok(Outcome::reply(request.pattern)) })
    }

    /// Replies with a fixed label.
    fn labelled(label: &'static str) -> Arc<dyn Handler> {
        handler_fn(move |_| async move { Ok(Outcome::reply(label)) })
    }

    fn text(payload: &Payload) -> String {
        String::from_utf8_lossy(payload).into_owned()
    }

    // =============================================================================
    // UNICAST RESOLUTION
    // =============================================================================

    #[tokio::test]
    async fn test_resolution_table_through_bus() {
        let bus = bus();
        for pattern in RESOLUTION_PATTERNS {
            bus.register(pattern, pattern_reporter()).unwrap();
        }

        for (name, expected) in RESOLUTION_TABLE {
            let reply = bus.send_sync(name, Payload::new()).await.unwrap();
            assert_eq!(text(&reply), expected, "{name} resolved wrongly");
        }
    }

    #[tokio::test]
    async fn test_registration_order_does_not_change_winner() {
        let bus = bus();
        for pattern in RESOLUTION_PATTERNS.iter().rev() {
            bus.register(pattern, pattern_reporter()).unwrap();
        }

        for (name, expected) in RESOLUTION_TABLE {
            let reply = bus.send_sync(name, Payload::new()).await.unwrap();
            assert_eq!(text(&reply), expected, "{name} resolved wrongly");
        }
    }

    #[tokio::test]
    async fn test_three_pattern_scenario() {
        let bus = bus();
        bus.register("*", labelled("any")).unwrap();
        bus.register("/db/*", labelled("db")).unwrap();
        bus.register("/db/users", labelled("users")).unwrap();

        let users = bus.send_sync("/db/users", Payload::new()).await.unwrap();
        let orders = bus.send_sync("/db/orders", Payload::new()).await.unwrap();
        let other = bus.send_sync("/cache/x", Payload::new()).await.unwrap();

        assert_eq!(text(&users), "users");
        assert_eq!(text(&orders), "db");
        assert_eq!(text(&other), "any");
    }

    #[tokio::test]
    async fn test_handlers_under_one_pattern_take_turns() {
        let bus = bus();
        assert_eq!(bus.register("/svc", labelled("first")).unwrap(), 1);
        assert_eq!(bus.register("/svc", labelled("second")).unwrap(), 2);

        let mut replies = Vec::new();
        for _ in 0..4 {
            replies.push(text(&bus.send_sync("/svc", Payload::new()).await.unwrap()));
        }
        assert_eq!(replies, ["first", "second", "first", "second"]);
    }

    #[tokio::test]
    async fn test_segment_mode_keeps_wildcard_in_one_segment() {
        let config = BusConfig::default().with_match_mode(MatchMode::Segment);
        let bus = MessageBus::new(config).unwrap();
        bus.register("/a/*", labelled("one-level")).unwrap();
        bus.register("/*", labelled("top")).unwrap();

        let reply = bus.send_sync("/a/b", Payload::new()).await.unwrap();
        assert_eq!(text(&reply), "one-level");

        let err = bus.send_sync("/a/b/c", Payload::new()).await.unwrap_err();
        assert!(matches!(err, BusError::NoSubscriber { .. }));
    }

    #[tokio::test]
    async fn test_unmatched_and_empty_names() {
        let bus = bus();
        bus.register("/only", labelled("only")).unwrap();

        let err = bus.send_sync("/other", Payload::new()).await.unwrap_err();
        assert_eq!(
            err,
            BusError::NoSubscriber {
                name: "/other".into()
            }
        );
        assert!(bus.send_async("", Payload::new()).is_err());
        assert!(bus.send_multicast("", Payload::new()).unwrap().is_empty());
        assert!(bus.send_multicast("/other", Payload::new()).unwrap().is_empty());
    }

    // =============================================================================
    // MULTICAST
    // =============================================================================

    #[tokio::test]
    async fn test_multicast_reaches_every_match_in_order() {
        let bus = bus();
        bus.register("*", labelled("any")).unwrap();
        bus.register("/a/*", labelled("wild-1")).unwrap();
        bus.register("/a/b", labelled("exact-1")).unwrap();
        bus.register("/a/*", labelled("wild-2")).unwrap();
        bus.register("/a/b", labelled("exact-2")).unwrap();
        bus.register("/z/*", labelled("unrelated")).unwrap();

        let ids = bus.send_multicast("/a/b", Payload::new()).unwrap();
        assert_eq!(ids.len(), 5);

        let wait = Wait::Bounded(Duration::from_secs(1));
        let mut labels = Vec::new();
        for id in ids {
            let received = bus.recv(id, wait).await.unwrap();
            assert_eq!(received.trans_id, id);
            labels.push(text(&received.payload));
        }
        assert_eq!(labels, ["exact-1", "exact-2", "wild-1", "wild-2", "any"]);
    }

    #[tokio::test]
    async fn test_multicast_ids_are_distinct() {
        let bus = bus();
        for _ in 0..8 {
            bus.register("/e", labelled("digit")).unwrap();
        }

        let ids = bus.send_multicast("/e", Payload::new()).unwrap();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 8);
        assert!(ids.iter().all(|id| !id.is_null()));
    }

    // =============================================================================
    // REGISTRATION
    // =============================================================================

    #[test]
    fn test_malformed_patterns_rejected() {
        let bus = bus();
        assert_eq!(
            bus.register("", labelled("x")).unwrap_err(),
            BusError::InvalidPattern(PatternError::Empty)
        );
        assert!(matches!(
            bus.register("/a/*/b/*", labelled("x")).unwrap_err(),
            BusError::InvalidPattern(PatternError::TooManyWildcards { count: 2, .. })
        ));
        assert!(bus.router().registry().is_empty());
    }
}
