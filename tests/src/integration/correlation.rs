//! # Correlation Integration Tests
//!
//! Async results as seen by callers of the bus:
//!
//! - claim by id, peek without consuming, oldest-pull in arrival order
//! - handler failures are stored under the transaction and surface on claim
//! - each result is delivered exactly once, even to racing claimants

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::join_all;
    use shared_bus::{
        handler_fn, BusConfig, BusError, Handler, HandlerError, MessageBus, MessageBusApi,
        Outcome, Payload, TransId, Wait,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn bus() -> MessageBus {
        let config = BusConfig::default().with_recv_timeout(Duration::from_millis(500));
        MessageBus::new(config).unwrap()
    }

    fn echo() -> Arc<dyn Handler> {
        handler_fn(|request| async move { Ok(Outcome::Reply(request.payload().clone())) })
    }

    fn wait() -> Wait {
        Wait::Bounded(Duration::from_secs(1))
    }

    // =============================================================================
    // CLAIMING
    // =============================================================================

    #[tokio::test]
    async fn test_oldest_pull_returns_arrival_order_then_null() {
        let bus = bus();
        bus.register("/echo", echo()).unwrap();

        let mut sent = Vec::new();
        for index in 0..5 {
            let id = bus
                .send_async("/echo", Payload::from(format!("body{index}")))
                .unwrap();
            bus.peek(id, wait()).await.unwrap();
            sent.push(id);
        }

        for (index, id) in sent.iter().enumerate() {
            let received = bus.recv_oldest(wait()).await.unwrap();
            assert_eq!(received.trans_id, *id);
            assert_eq!(received.payload, Payload::from(format!("body{index}")));
        }

        let empty = bus
            .recv_oldest(Wait::Bounded(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(empty.is_null());
        assert!(empty.payload.is_empty());
    }

    #[tokio::test]
    async fn test_peek_leaves_result_for_recv() {
        let bus = bus();
        bus.register("/echo", echo()).unwrap();

        let id = bus.send_async("/echo", Payload::from_static(b"kept")).unwrap();
        let first = bus.peek(id, wait()).await.unwrap();
        let second = bus.peek(id, Wait::Poll).await.unwrap();
        let claimed = bus.recv(id, Wait::Poll).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(claimed.payload.as_ref(), b"kept");
        assert_eq!(bus.recv(id, Wait::Poll).await.unwrap_err(), BusError::Timeout);
    }

    #[tokio::test]
    async fn test_recv_waits_for_slow_handler() {
        let bus = bus();
        bus.register(
            "/slow",
            handler_fn(|_| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Outcome::reply("late"))
            }),
        )
        .unwrap();

        let id = bus.send_async("/slow", Payload::new()).unwrap();
        assert_eq!(bus.recv(id, Wait::Poll).await.unwrap_err(), BusError::Timeout);

        let received = bus.recv(id, Wait::Indefinite).await.unwrap();
        assert_eq!(received.payload.as_ref(), b"late");
    }

    #[tokio::test]
    async fn test_result_delivered_once_to_racing_claimants() {
        let bus = bus();
        bus.register(
            "/slow",
            handler_fn(|_| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Outcome::reply("once"))
            }),
        )
        .unwrap();
        let id = bus.send_async("/slow", Payload::new()).unwrap();

        let claims = (0..4).map(|_| {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.recv(id, Wait::Bounded(Duration::from_millis(300))).await
            })
        });
        let results: Vec<_> = join_all(claims)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(|err| *err == BusError::Timeout));
    }

    #[tokio::test]
    async fn test_unknown_id_times_out() {
        let bus = bus();
        let err = bus
            .recv(TransId::new(), Wait::Bounded(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::Timeout);
        assert_eq!(bus.correlator().stored_count(), 0);
    }

    // =============================================================================
    // STORED FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_handler_failure_is_stored_under_id() {
        let bus = bus();
        bus.register(
            "/broken",
            handler_fn(|_| async { Err(HandlerError::new("disk on fire")) }),
        )
        .unwrap();

        let id = bus.send_async("/broken", Payload::new()).unwrap();
        let err = bus.recv(id, wait()).await.unwrap_err();

        match err {
            BusError::HandlerFailure {
                trans_id,
                pattern,
                reason,
            } => {
                assert_eq!(trans_id, id);
                assert_eq!(pattern, "/broken");
                assert!(reason.contains("disk on fire"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            bus.dispatch_stats().handler_failures.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_multicast_failure_isolated_to_its_copy() {
        let bus = bus();
        bus.register("/m", handler_fn(|_| async { Ok(Outcome::reply("fine")) }))
            .unwrap();
        bus.register("/m", handler_fn(|_| async { Err(HandlerError::new("nope")) }))
            .unwrap();

        let ids = bus.send_multicast("/m", Payload::new()).unwrap();
        assert_eq!(ids.len(), 2);

        let ok = bus.recv(ids[0], wait()).await.unwrap();
        assert_eq!(ok.payload.as_ref(), b"fine");
        assert!(matches!(
            bus.recv(ids[1], wait()).await.unwrap_err(),
            BusError::HandlerFailure { .. }
        ));
    }

    #[tokio::test]
    async fn test_sync_send_does_not_leave_results_behind() {
        let bus = bus();
        bus.register("/echo", echo()).unwrap();

        for _ in 0..3 {
            bus.send_sync("/echo", Payload::from_static(b"x")).await.unwrap();
        }

        assert_eq!(bus.correlator().stored_count(), 0);
        assert_eq!(bus.correlator().outstanding_count(), 0);
        let empty = bus.recv_oldest(Wait::Poll).await.unwrap();
        assert!(empty.is_null());
    }
}
