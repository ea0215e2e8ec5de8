use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::util::base36::to_base36;

/// Both the endpoint counter and every per-endpoint message counter start here, so the first
///  value handed out is `MIN_SAFE_INTEGER + 1`. This keeps identifiers textually compatible with
///  peers that represent the counters as IEEE doubles.
pub const MIN_SAFE_INTEGER: i64 = -9_007_199_254_740_991;

/// The endpoint counter shared by all generators created with [IdGenerator::new]
static PROCESS_ENDPOINT_COUNTER: AtomicI64 = AtomicI64::new(MIN_SAFE_INTEGER);
static PROCESS_HOST_TOKEN: OnceLock<String> = OnceLock::new();

enum EndpointCounter {
    Process,
    Own(AtomicI64),
}
impl EndpointCounter {
    fn next(&self) -> i64 {
        let counter = match self {
            EndpointCounter::Process => &PROCESS_ENDPOINT_COUNTER,
            EndpointCounter::Own(counter) => counter,
        };
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Hands out [EndpointId]s. There is one generator per [crate::messaging::messaging::Messaging]
///  context, and it is shared by all connections created through that context.
///
/// Generators created with [IdGenerator::new] share one host token and one endpoint counter per
///  process, so endpoint ids (and therefore message ids) never collide between contexts of the
///  same process. The host token is derived from the time it was first needed (millis since
///  epoch, base 36), so two processes started at different times produce disjoint identifiers
///  even when their counters are in the same position.
pub struct IdGenerator {
    host_token: String,
    endpoint_counter: EndpointCounter,
}

impl Debug for IdGenerator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdGenerator{{host_token:{:?}}}", self.host_token)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> IdGenerator {
        let host_token = PROCESS_HOST_TOKEN.get_or_init(|| {
            let millis = SystemTime::now().duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or_default();
            to_base36(millis)
        });
        IdGenerator {
            host_token: host_token.clone(),
            endpoint_counter: EndpointCounter::Process,
        }
    }

    /// A generator with its own host token and its own endpoint counter, for deterministic ids.
    ///  Ids from such a generator are only unique as long as no other generator uses the same
    ///  host token.
    pub fn with_host_token(host_token: impl Into<String>) -> IdGenerator {
        IdGenerator {
            host_token: host_token.into(),
            endpoint_counter: EndpointCounter::Own(AtomicI64::new(MIN_SAFE_INTEGER)),
        }
    }

    pub fn host_token(&self) -> &str {
        &self.host_token
    }

    pub fn next_endpoint_id(&self) -> EndpointId {
        let counter = self.endpoint_counter.next();
        EndpointId {
            counter,
            repr: format!("{}:{}", self.host_token, to_base36(counter)),
        }
    }
}

/// Identifies one logical connection attempt: `hostToken:counter`, the counter in base 36.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct EndpointId {
    counter: i64,
    repr: String,
}
impl EndpointId {
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// position of this endpoint in its generator's sequence - later endpoints have larger values
    pub fn counter(&self) -> i64 {
        self.counter
    }
}
impl Debug for EndpointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.repr)
    }
}
impl Display for EndpointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.repr)
    }
}


/// Per-endpoint message numbering. Handshake messages and data messages draw from the same
///  sequence, so no two messages of an endpoint ever share an id.
pub struct MessageIdSequence {
    endpoint: EndpointId,
    last_counter: AtomicI64,
}
impl MessageIdSequence {
    pub fn new(endpoint: EndpointId) -> MessageIdSequence {
        MessageIdSequence {
            endpoint,
            last_counter: AtomicI64::new(MIN_SAFE_INTEGER),
        }
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn next_message_id(&self) -> MessageId {
        let counter = self.last_counter.fetch_add(1, Ordering::Relaxed) + 1;
        MessageId(format!("{}:{}", self.endpoint, to_base36(counter)))
    }
}


/// `endpointId:messageCounter`. Inbound message ids are arbitrary strings chosen by the peer, so
///  this type accepts any text.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MessageId(String);
impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for MessageId {
    fn from(value: String) -> Self {
        MessageId(value)
    }
}
impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId(value.to_string())
    }
}
impl Debug for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
