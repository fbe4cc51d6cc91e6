//! # Messaging Sequences
//!
//! Each sequence is itself a service on the bus. The runtime sends it the
//! iteration number synchronously; it drives its scenario through the bus
//! and replies `end`, or fails with the first check that did not hold.
//!
//! - **sequence1**: async send to every name of the resolution table, then
//!   alternate a peek by id with an oldest-pull until every result is
//!   claimed.
//! - **sequence2**: multicast to `e` until every instance answers, claim
//!   each id and compare the sorted replies.
//! - **sequence3**: the `f1`/`f2` forwarding chain under one transaction id,
//!   then a synchronous call to `g1`.

use crate::services::{ensure, parse_number, test_body, DIGITS, RESOLUTION_TABLE};
use async_trait::async_trait;
use shared_bus::{
    Handler, HandlerError, MessageBus, MessageBusApi, Outcome, Payload, Request, TransId, Wait,
};
use std::time::Duration;
use tracing::{debug, info};

/// Reply every sequence ends with.
pub const END: &str = "end";

/// Oldest-pull wait used to confirm nothing else is pending.
const SETTLE_WAIT: Duration = Duration::from_secs(1);

/// Sorted concatenation of the multicast replies from `instances` copies
/// of the digit services.
#[must_use]
pub fn expected_digits(instances: usize) -> String {
    DIGITS.iter().map(|digit| digit.repeat(instances)).collect()
}

fn check_body(id: TransId, payload: &Payload, index: usize) -> Result<(), HandlerError> {
    let body = test_body(index);
    ensure(payload.as_ref() == body.as_bytes(), || {
        format!(
            "{id} returned {:?}, expected {body:?}",
            String::from_utf8_lossy(payload)
        )
    })
}

pub struct Sequence1 {
    bus: MessageBus,
}

impl Sequence1 {
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Handler for Sequence1 {
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError> {
        let iteration: u64 = parse_number(request.payload())?;
        let wait = self.bus.default_wait();
        info!(iteration, "messaging sequence1 start");

        let mut sent = Vec::with_capacity(RESOLUTION_TABLE.len());
        for (index, (name, _)) in RESOLUTION_TABLE.iter().enumerate() {
            let id = self
                .bus
                .send_async(&self.bus.prefixed(name), Payload::from(test_body(index)))?;
            sent.push(id);
        }

        let mut claimed = vec![false; sent.len()];
        for (index, id) in sent.iter().enumerate() {
            // an earlier oldest-pull may already have claimed `id`
            if !claimed[index] {
                let peeked = self.bus.peek(*id, wait).await?;
                ensure(peeked.trans_id == *id, || {
                    format!("peek of {id} returned {}", peeked.trans_id)
                })?;
                check_body(*id, &peeked.payload, index)?;
            }

            let received = self.bus.recv_oldest(wait).await?;
            let position = sent
                .iter()
                .position(|sent_id| *sent_id == received.trans_id)
                .filter(|position| !claimed[*position]);
            let Some(position) = position else {
                return Err(HandlerError::new(format!(
                    "oldest result was {}, expected one of this sequence's results",
                    received.trans_id
                )));
            };
            if position != index {
                debug!(expected = %id, got = %received.trans_id, "Result arrived out of send order");
            }
            check_body(received.trans_id, &received.payload, position)?;
            claimed[position] = true;
        }

        info!(iteration, "messaging sequence1 end");
        Ok(Outcome::reply(END))
    }
}

pub struct Sequence2 {
    bus: MessageBus,
    instances: usize,
}

impl Sequence2 {
    #[must_use]
    pub fn new(bus: MessageBus, instances: usize) -> Self {
        Self { bus, instances }
    }
}

#[async_trait]
impl Handler for Sequence2 {
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError> {
        let iteration: u64 = parse_number(request.payload())?;
        let wait = self.bus.default_wait();
        let expected = DIGITS.len() * self.instances;
        let name = self.bus.prefixed("e");
        info!(iteration, "messaging sequence2 start");

        loop {
            let ids = self.bus.send_multicast(&name, Payload::from_static(b" "))?;

            if ids.len() >= expected {
                let mut replies = Vec::with_capacity(ids.len());
                for id in &ids {
                    let received = self.bus.recv(*id, wait).await?;
                    ensure(received.trans_id == *id, || {
                        format!("recv of {id} returned {}", received.trans_id)
                    })?;
                    replies.push(String::from_utf8_lossy(&received.payload).into_owned());
                }
                replies.sort();

                let joined = replies.concat();
                let wanted = expected_digits(self.instances);
                ensure(joined == wanted, || {
                    format!("multicast replies {joined:?}, expected {wanted:?}")
                })?;
                break;
            }

            let missing = self.instances - ids.len() / DIGITS.len();
            info!(missing, "Waiting for services to initialize");
            for id in &ids {
                let received = self.bus.recv(*id, wait).await?;
                ensure(received.trans_id == *id, || {
                    format!("recv of {id} returned {}", received.trans_id)
                })?;
            }

            let settled = self.bus.recv_oldest(Wait::Bounded(SETTLE_WAIT)).await?;
            ensure(settled.is_null(), || {
                format!("expected no pending results, got {}", settled.trans_id)
            })?;
        }

        info!(iteration, "messaging sequence2 end");
        Ok(Outcome::reply(END))
    }
}

pub struct Sequence3 {
    bus: MessageBus,
}

impl Sequence3 {
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Handler for Sequence3 {
    async fn handle(&self, request: Request) -> Result<Outcome, HandlerError> {
        let iteration: u64 = parse_number(request.payload())?;
        let wait = self.bus.default_wait();
        info!(iteration, "messaging sequence3 start");

        let id = self
            .bus
            .send_async(&self.bus.prefixed("f1"), Payload::from_static(b"0"))?;
        let received = self.bus.recv(id, wait).await?;
        ensure(received.trans_id == id, || {
            format!("forwarded reply came back as {}", received.trans_id)
        })?;
        ensure(received.payload.as_ref() == b"done", || {
            format!(
                "forwarding chain ended with {:?}",
                String::from_utf8_lossy(&received.payload)
            )
        })?;

        let reply = self
            .bus
            .send_sync(&self.bus.prefixed("g1"), Payload::from_static(b"prefix_"))
            .await?;
        ensure(reply.as_ref() == b"prefix_suffix", || {
            format!("g1 replied {:?}", String::from_utf8_lossy(&reply))
        })?;

        info!(iteration, "messaging sequence3 end");
        Ok(Outcome::reply(END))
    }
}
