//! # Messaging Harness
//!
//! Runs the bus runtime end to end: several service instances, all three
//! sequences, more than one iteration.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use bus_runtime::sequences::expected_digits;
    use bus_runtime::{register_instance, BusRuntime, RuntimeConfig};
    use shared_bus::{MessageBusApi, Payload, Wait};

    fn runtime(instances: usize, iterations: u64) -> BusRuntime {
        BusRuntime::new(RuntimeConfig {
            instances,
            iterations,
            ..RuntimeConfig::default()
        })
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_instances_two_iterations() {
        let runtime = runtime(2, 2);
        let handles = runtime.start().unwrap();

        assert_eq!(runtime.run().await.unwrap(), 2);

        let stats = runtime.bus().dispatch_stats();
        // at least one full fan-out per iteration
        assert!(stats.multicast_deliveries.load(Ordering::Relaxed) >= 2 * 16);
        assert_eq!(stats.handler_failures.load(Ordering::Relaxed), 0);
        assert_eq!(runtime.bus().correlator().stored_count(), 0);

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stray_result_fails_sequence1() {
        let runtime = runtime(1, 1);
        register_instance(runtime.bus(), 1).unwrap();
        // a stray result breaks the oldest-pull checks of sequence1
        runtime
            .bus()
            .send_async(&runtime.bus().prefixed("g1"), Payload::from_static(b"stray"))
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let err = runtime.run().await.unwrap_err();
        assert!(format!("{err:#}").contains("sequence1"));
    }

    #[tokio::test]
    async fn test_multicast_fan_out_matches_expected_digits() {
        let runtime = runtime(3, 1);
        for _ in 0..3 {
            register_instance(runtime.bus(), 3).unwrap();
        }

        let bus = runtime.bus();
        let ids = bus.send_multicast(&bus.prefixed("e"), Payload::new()).unwrap();
        let mut replies = Vec::new();
        for id in ids {
            let received = bus.recv(id, Wait::Indefinite).await.unwrap();
            replies.push(String::from_utf8_lossy(&received.payload).into_owned());
        }
        replies.sort();

        assert_eq!(replies.concat(), expected_digits(3));
    }
}
