use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::messaging::config::{ConnectConfig, ConnectOptions};
use crate::messaging::delivery::{Endpoint, PendingDelivery};
use crate::messaging::envelope::OutboundPayload;
use crate::messaging::error::MessagingError;
use crate::messaging::ids::{EndpointId, IdGenerator};
use crate::messaging::pending::PendingConfirmations;
use crate::messaging::transport::MessageTarget;

pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Connection, MessagingError>> + Send>>;

/// Validates the options, allocates a fresh endpoint and posts the first handshake message
///  before returning. The returned future drives the remaining attempts:
///
/// ```text
///  Attempting(n) --confirmed--------------------------> Connected
///  Attempting(n) --timed out, n > 0 --retry delay-----> Attempting(n-1)
///  Attempting(0) --timed out--------------------------> Failed
/// ```
///
/// Attempts are strictly sequential, each one with the full timeout.
///
/// Only the first attempt is independent of the returned future. Later attempts are driven by
///  polling it: a retry goes out `handshake_retry_delay` after the previous attempt's timeout was
///  observed, so a caller that starts awaiting late delays the retries accordingly. Spawn the
///  future to have retries run on schedule in the background.
pub fn connect(ids: &IdGenerator, pending: &Arc<PendingConfirmations>, target: Arc<dyn MessageTarget>, options: &ConnectOptions) -> Result<ConnectFuture, MessagingError> {
    let config = options.validate()?;
    let endpoint = Arc::new(Endpoint::new(ids.next_endpoint_id(), target, &config, pending.clone()));

    debug!(endpoint = ?endpoint.id(), attempts = config.handshake_attempts(), "starting handshake");
    let first_attempt = send_handshake(&endpoint);

    Ok(Box::pin(run_handshake(endpoint, config, first_attempt)))
}

fn send_handshake(endpoint: &Endpoint) -> PendingDelivery {
    let attempt = endpoint.send(OutboundPayload::Handshake(endpoint.id().clone()), &[]);
    debug!(endpoint = ?endpoint.id(), message_id = ?attempt.message_id(), "sent handshake");
    attempt
}

async fn run_handshake(endpoint: Arc<Endpoint>, config: ConnectConfig, first_attempt: PendingDelivery) -> Result<Connection, MessagingError> {
    let mut retries_left = config.handshake_retries;
    let mut attempt = first_attempt;

    loop {
        match attempt.await {
            Ok(()) => {
                info!(endpoint = ?endpoint.id(), "connection established");
                return Ok(Connection { endpoint });
            }
            Err(e) if retries_left > 0 => {
                retries_left -= 1;
                debug!(endpoint = ?endpoint.id(), "handshake attempt failed: {} - retrying in {:?} ({} retries left)", e, config.handshake_retry_delay, retries_left);
                sleep(config.handshake_retry_delay).await;
                attempt = send_handshake(&endpoint);
            }
            Err(e) => {
                warn!(endpoint = ?endpoint.id(), "giving up on handshake after {} attempts: {}", config.handshake_attempts(), e);
                return Err(MessagingError::HandshakeFailed {
                    attempts: config.handshake_attempts(),
                });
            }
        }
    }
}


/// An established connection to a peer. Each message sent through it is acknowledged
///  independently; there is no ordering between messages.
///
/// Cloning is cheap, and clones share the endpoint and its message numbering.
#[derive(Clone)]
pub struct Connection {
    endpoint: Arc<Endpoint>,
}
impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection{{{:?}}}", self.endpoint)
    }
}

impl Connection {
    pub fn endpoint_id(&self) -> &EndpointId {
        self.endpoint.id()
    }

    pub fn send(&self, data: Value) -> PendingDelivery {
        self.endpoint.send(OutboundPayload::Data(data), &[])
    }

    /// `transfer` is handed to the underlying send primitive untouched
    pub fn send_with_transfer(&self, data: Value, transfer: &[Bytes]) -> PendingDelivery {
        self.endpoint.send(OutboundPayload::Data(data), transfer)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use serde_json::json;
    use tokio::time::Instant;

    use crate::messaging::confirmation::ConfirmationHandler;
    use crate::messaging::ids::MessageId;
    use crate::messaging::transport::MessageEventHandler;
    use crate::test_util::event::confirmation_event;
    use crate::test_util::target::TrackingMockTarget;
    use super::*;

    struct Fixture {
        ids: IdGenerator,
        pending: Arc<PendingConfirmations>,
        confirmations: ConfirmationHandler,
        peer: Arc<TrackingMockTarget>,
    }

    fn fixture() -> Fixture {
        let pending = Arc::new(PendingConfirmations::new());
        Fixture {
            ids: IdGenerator::with_host_token("h"),
            confirmations: ConfirmationHandler::new(pending.clone()),
            pending,
            peer: TrackingMockTarget::new(),
        }
    }

    impl Fixture {
        fn connect(&self, options: ConnectOptions) -> Result<ConnectFuture, MessagingError> {
            connect(&self.ids, &self.pending, self.peer.clone(), &options)
        }

        fn confirm(&self, message_id: &MessageId) {
            let source: Arc<dyn MessageTarget> = self.peer.clone();
            self.confirmations.handle_event(&confirmation_event(json!("c"), message_id, "*", Some(source)));
        }
    }

    fn within(actual: Duration, expected_millis: u64) -> bool {
        actual >= Duration::from_millis(expected_millis) && actual < Duration::from_millis(expected_millis + 10)
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_fails_after_all_attempts() {
        let f = fixture();
        let start = Instant::now();

        let connecting = f.connect(ConnectOptions::new("c").timeout(100).handshake_retries(1).handshake_retry_delay(50)).unwrap();
        assert_eq!(f.peer.num_posted(), 1);

        let error = connecting.await.unwrap_err();
        assert_eq!(error, MessagingError::HandshakeFailed { attempts: 2 });
        assert!(error.to_string().contains("2 attempts"));
        assert!(within(Instant::now() - start, 250), "{:?}", Instant::now() - start);

        let posted = f.peer.posted();
        assert_eq!(posted.len(), 2);
        assert!(within(posted[0].at - start, 0));
        assert!(within(posted[1].at - start, 150), "{:?}", posted[1].at - start);
        assert!(f.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_number_of_attempts() {
        let f = fixture();
        let start = Instant::now();

        let error = f.connect(ConnectOptions::new("c")).unwrap().await.unwrap_err();
        assert_eq!(error, MessagingError::HandshakeFailed { attempts: 3 });
        assert_eq!(f.peer.num_posted(), 3);
        // three timeouts of 10s and two retry delays of 500ms
        assert!(within(Instant::now() - start, 31_000), "{:?}", Instant::now() - start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_messages() {
        let f = fixture();
        let connecting = f.connect(ConnectOptions::new("c").origin("https://peer").timeout(10).handshake_retries(2).handshake_retry_delay(1)).unwrap();
        let _ = connecting.await;

        let posted = f.peer.posted();
        assert_eq!(posted.len(), 3);

        let message_ids = posted.iter()
            .map(|p| p.message_id().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(message_ids, vec![
            MessageId::from("h:-2gosa7pa2gu:-2gosa7pa2gu"),
            MessageId::from("h:-2gosa7pa2gu:-2gosa7pa2gt"),
            MessageId::from("h:-2gosa7pa2gu:-2gosa7pa2gs"),
        ]);
        for p in posted {
            assert_eq!(p.target_origin, "https://peer");
            assert_eq!(p.message["handshake"], json!("h:-2gosa7pa2gu"));
            assert_eq!(p.message["channel"], json!("c"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_on_first_attempt() {
        let f = fixture();
        let connecting = f.connect(ConnectOptions::new("c")).unwrap();
        f.confirm(&f.peer.last_message_id().unwrap());

        let connection = connecting.await.unwrap();
        assert_eq!(connection.endpoint_id().as_str(), "h:-2gosa7pa2gu");
        assert_eq!(f.peer.num_posted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_on_retry() {
        let f = fixture();
        let mut connecting = f.connect(ConnectOptions::new("c").timeout(100).handshake_retries(2).handshake_retry_delay(50)).unwrap();

        // let the first attempt time out and the second one go out
        tokio::select! {
            _ = &mut connecting => panic!("handshake should still be in progress"),
            _ = sleep(Duration::from_millis(160)) => {}
        }
        assert_eq!(f.peer.num_posted(), 2);

        f.confirm(&f.peer.last_message_id().unwrap());
        assert!(connecting.await.is_ok());
        assert_eq!(f.peer.num_posted(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_driven_by_polling() {
        let f = fixture();
        let start = Instant::now();
        let connecting = f.connect(ConnectOptions::new("c").timeout(100).handshake_retries(1).handshake_retry_delay(50)).unwrap();

        sleep(Duration::from_millis(500)).await;
        assert_eq!(f.peer.num_posted(), 1);

        assert_eq!(connecting.await.unwrap_err(), MessagingError::HandshakeFailed { attempts: 2 });
        let posted = f.peer.posted();
        assert_eq!(posted.len(), 2);
        assert!(within(posted[1].at - start, 550), "{:?}", posted[1].at - start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_handshake_retries_on_schedule() {
        let f = fixture();
        let start = Instant::now();
        let connecting = tokio::spawn(f.connect(ConnectOptions::new("c").timeout(100).handshake_retries(1).handshake_retry_delay(50)).unwrap());

        sleep(Duration::from_millis(500)).await;
        let posted = f.peer.posted();
        assert_eq!(posted.len(), 2);
        assert!(within(posted[1].at - start, 150), "{:?}", posted[1].at - start);

        assert_eq!(connecting.await.unwrap().unwrap_err(), MessagingError::HandshakeFailed { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_confirmation_of_previous_attempt_is_ignored() {
        let f = fixture();
        let mut connecting = f.connect(ConnectOptions::new("c").timeout(100).handshake_retries(1).handshake_retry_delay(50)).unwrap();
        let first_message_id = f.peer.last_message_id().unwrap();

        tokio::select! {
            _ = &mut connecting => panic!("handshake should still be in progress"),
            _ = sleep(Duration::from_millis(160)) => {}
        }
        f.confirm(&first_message_id);

        assert_eq!(connecting.await.unwrap_err(), MessagingError::HandshakeFailed { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_connect() {
        let f = fixture();
        let connecting = f.connect(ConnectOptions::new("c").timeout(100)).unwrap();
        f.confirm(&f.peer.last_message_id().unwrap());
        let connection = connecting.await.unwrap();

        let delivery = connection.send_with_transfer(json!([1, 2, 4]), &[Bytes::from_static(b"x")]);
        let posted = f.peer.posted();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[1].message, json!({
            "channel": "c",
            "data": [1, 2, 4],
            "messageId": "h:-2gosa7pa2gu:-2gosa7pa2gt",
        }));
        assert_eq!(posted[1].transfer, vec![Bytes::from_static(b"x")]);

        f.confirm(delivery.message_id());
        assert_eq!(delivery.await, Ok(()));

        assert_eq!(connection.send(json!(1)).await, Err(MessagingError::Timeout { millis: 100 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_options_send_nothing() {
        let f = fixture();
        let result = f.connect(ConnectOptions::new("c").timeout(-5));
        assert!(matches!(result, Err(MessagingError::InvalidOption { option: "timeout", .. })));
        assert_eq!(f.peer.num_posted(), 0);
        assert!(f.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoints_are_distinct_per_connect() {
        let f = fixture();
        let first = f.connect(ConnectOptions::new("c")).unwrap();
        let first_id = f.peer.last_message_id().unwrap();
        let second = f.connect(ConnectOptions::new("c")).unwrap();
        let second_id = f.peer.last_message_id().unwrap();

        assert_ne!(first_id, second_id);
        assert_eq!(first_id.as_str(), "h:-2gosa7pa2gu:-2gosa7pa2gu");
        assert_eq!(second_id.as_str(), "h:-2gosa7pa2gt:-2gosa7pa2gu");
        assert_eq!(f.pending.len(), 2);

        drop(first);
        drop(second);
        assert!(f.pending.is_empty());
    }
}
