//! # Forwarding Integration Tests
//!
//! A transaction handed from service to service keeps its id, its source
//! and whatever is left of its timeout budget, whether the hand-off is an
//! in-band [`Outcome::Forward`] or an out-of-band `forward` call.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bus_runtime::services::{StepBack, StepForward};
    use shared_bus::{
        handler_fn, BusConfig, BusError, ForwardTimeoutPolicy, Handler, MessageBus,
        MessageBusApi, Outcome, Payload, SendOptions, Wait,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn bus_with(policy: ForwardTimeoutPolicy) -> MessageBus {
        MessageBus::new(BusConfig::default().with_forward_timeout(policy)).unwrap()
    }

    /// Replies with `id|source|timeout_ms` of the request it sees.
    fn context_reporter() -> Arc<dyn Handler> {
        handler_fn(|request| async move {
            let context = &request.context;
            Ok(Outcome::reply(format!(
                "{}|{}|{}",
                context.trans_id(),
                context.source(),
                context.timeout().as_millis()
            )))
        })
    }

    /// Sleeps `hop` and forwards to `next`.
    fn slow_hop(hop: Duration, next: &'static str) -> Arc<dyn Handler> {
        handler_fn(move |request| async move {
            tokio::time::sleep(hop).await;
            Ok(Outcome::forward(next, request.payload().clone()))
        })
    }

    fn text(payload: &Payload) -> String {
        String::from_utf8_lossy(payload).into_owned()
    }

    // =============================================================================
    // IN-BAND FORWARDING
    // =============================================================================

    #[tokio::test]
    async fn test_in_band_forward_keeps_transaction() {
        let bus = bus_with(ForwardTimeoutPolicy::Preserve);
        bus.register("/front", handler_fn(|_| async { Ok(Outcome::forward("/back", "")) }))
            .unwrap();
        bus.register("/back", context_reporter()).unwrap();

        let options = SendOptions::new()
            .with_source("client")
            .with_timeout(Duration::from_millis(700));
        let id = bus
            .send_async_with("/front", Payload::new(), options)
            .unwrap();

        let received = bus
            .recv(id, Wait::Bounded(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(received.trans_id, id);
        assert_eq!(text(&received.payload), format!("{id}|client|700"));
    }

    #[tokio::test]
    async fn test_sync_send_follows_forward_chain() {
        let bus = bus_with(ForwardTimeoutPolicy::default());
        bus.register("/one", handler_fn(|_| async { Ok(Outcome::forward("/two", "2")) }))
            .unwrap();
        bus.register(
            "/two",
            handler_fn(|request| async move {
                let mut body = request.payload().to_vec();
                body.extend_from_slice(b"+3");
                Ok(Outcome::forward("/three", body))
            }),
        )
        .unwrap();
        bus.register(
            "/three",
            handler_fn(|request| async move { Ok(Outcome::Reply(request.payload().clone())) }),
        )
        .unwrap();

        let reply = bus.send_sync("/one", Payload::new()).await.unwrap();
        assert_eq!(text(&reply), "2+3");
        assert_eq!(
            bus.dispatch_stats()
                .forwarded
                .load(std::sync::atomic::Ordering::Relaxed),
            2
        );
    }

    #[tokio::test]
    async fn test_forward_to_unknown_name_fails_transaction() {
        let bus = bus_with(ForwardTimeoutPolicy::default());
        bus.register("/front", handler_fn(|_| async { Ok(Outcome::forward("/nowhere", "")) }))
            .unwrap();

        let err = bus.send_sync("/front", Payload::new()).await.unwrap_err();
        assert_eq!(
            err,
            BusError::NoSubscriber {
                name: "/nowhere".into()
            }
        );
    }

    // =============================================================================
    // OUT-OF-BAND FORWARDING
    // =============================================================================

    #[tokio::test]
    async fn test_step_chain_settles_under_original_id() {
        let bus = bus_with(ForwardTimeoutPolicy::default());
        bus.subscribe("f1", Arc::new(StepForward::new(bus.prefix())))
            .unwrap();
        bus.subscribe("f2", Arc::new(StepBack::new(bus.clone())))
            .unwrap();

        let id = bus
            .send_async(&bus.prefixed("f1"), Payload::from_static(b"0"))
            .unwrap();
        let received = bus
            .recv(id, Wait::Bounded(Duration::from_secs(2)))
            .await
            .unwrap();

        assert_eq!(received.trans_id, id);
        assert_eq!(received.payload.as_ref(), b"done");
        assert_eq!(bus.correlator().outstanding_count(), 0);
    }

    #[tokio::test]
    async fn test_step_chain_answers_sync_caller() {
        let bus = bus_with(ForwardTimeoutPolicy::default());
        bus.subscribe("f1", Arc::new(StepForward::new(bus.prefix())))
            .unwrap();
        bus.subscribe("f2", Arc::new(StepBack::new(bus.clone())))
            .unwrap();

        let reply = bus
            .send_sync(&bus.prefixed("f1"), Payload::from_static(b"0"))
            .await
            .unwrap();
        assert_eq!(reply.as_ref(), b"done");

        // nothing from the chain may leak into oldest-pull
        let leftover = bus.recv_oldest(Wait::Poll).await.unwrap();
        assert!(leftover.is_null());
        assert_eq!(bus.correlator().stored_count(), 0);
        assert_eq!(bus.correlator().outstanding_count(), 0);
    }

    #[tokio::test]
    async fn test_silent_handler_still_reports_no_reply() {
        let bus = bus_with(ForwardTimeoutPolicy::default());
        bus.register("/quiet", handler_fn(|_| async { Ok(Outcome::NoReply) }))
            .unwrap();

        let err = bus.send_sync("/quiet", Payload::new()).await.unwrap_err();
        assert!(matches!(err, BusError::NoReply { ref name, .. } if name == "/quiet"));
    }

    // =============================================================================
    // TIMEOUT BUDGET
    // =============================================================================

    #[tokio::test]
    async fn test_unbounded_timeouts_do_not_overflow() {
        let bus = bus_with(ForwardTimeoutPolicy::default());
        bus.register("/front", handler_fn(|_| async { Ok(Outcome::forward("/back", "")) }))
            .unwrap();
        bus.register("/back", context_reporter()).unwrap();

        let forever = SendOptions::new().with_timeout(Duration::MAX);
        let first = bus
            .send_async_with("/front", Payload::new(), forever.clone())
            .unwrap();
        let fanned = bus
            .send_multicast_with("/back", Payload::new(), forever.clone())
            .unwrap();
        let reply = bus
            .send_sync_with("/front", Payload::new(), forever)
            .await
            .unwrap();
        assert_eq!(text(&reply).split('|').count(), 3);

        let wait = Wait::Bounded(Duration::MAX);
        assert_eq!(bus.peek(first, wait).await.unwrap().trans_id, first);
        assert_eq!(bus.recv(first, wait).await.unwrap().trans_id, first);
        assert_eq!(bus.recv_oldest(wait).await.unwrap().trans_id, fanned[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_exhausts_budget() {
        let bus = bus_with(ForwardTimeoutPolicy::default());
        bus.register(
            "/slow",
            handler_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Outcome::reply("too late"))
            }),
        )
        .unwrap();

        let options = SendOptions::new().with_timeout(Duration::from_millis(100));
        let err = bus
            .send_sync_with("/slow", Payload::new(), options)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::BudgetExhausted { ref name, .. } if name == "/slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_shrinks_across_hops() {
        let bus = bus_with(ForwardTimeoutPolicy::DecrementElapsed);
        bus.register("/ping", slow_hop(Duration::from_millis(40), "/pong"))
            .unwrap();
        bus.register("/pong", slow_hop(Duration::from_millis(40), "/ping"))
            .unwrap();

        let options = SendOptions::new().with_timeout(Duration::from_millis(150));
        let id = bus
            .send_async_with("/ping", Payload::new(), options)
            .unwrap();
        let err = bus
            .recv(id, Wait::Bounded(Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert!(matches!(err, BusError::BudgetExhausted { trans_id, .. } if trans_id == id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preserved_budget_allows_long_chains() {
        let bus = bus_with(ForwardTimeoutPolicy::Preserve);
        for (name, next) in [("/h1", "/h2"), ("/h2", "/h3"), ("/h3", "/h4")] {
            bus.register(name, slow_hop(Duration::from_millis(40), next))
                .unwrap();
        }
        bus.register("/h4", context_reporter()).unwrap();

        let options = SendOptions::new().with_timeout(Duration::from_millis(60));
        let reply = bus
            .send_sync_with("/h1", Payload::new(), options)
            .await
            .unwrap();

        assert!(text(&reply).ends_with("|60"));
    }
}
