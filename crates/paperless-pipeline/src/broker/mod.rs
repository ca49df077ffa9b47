//! Durable-queue broker abstraction
//!
//! Workers never talk to a concrete broker client. They receive an
//! `Arc<dyn MessageBroker>` built at startup, which exposes exactly the
//! operations the pipeline needs: declare, publish, consume, ack and nack.
//!
//! Two implementations ship with the crate:
//!
//! - [`amqp::AmqpBroker`] - RabbitMQ over AMQP 0-9-1 (production)
//! - [`memory::MemoryBroker`] - in-process queues with the same delivery
//!   semantics (tests and local runs)

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub mod amqp;
pub mod memory;

pub use amqp::{AmqpBroker, BrokerConfig};
pub use memory::MemoryBroker;

/// Broker-assigned identifier of an unacknowledged delivery.
pub type DeliveryTag = u64;

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
    /// Set when the broker has delivered this message before.
    pub redelivered: bool,
}

/// Stream of deliveries for one consumer. Ends when the channel closes.
pub type DeliveryStream = BoxStream<'static, BrokerResult<Delivery>>;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Broker channel error: {0}")]
    Channel(String),

    #[error("Broker refused message on '{queue}'")]
    PublishRejected { queue: String },

    #[error("Queue '{0}' has not been declared")]
    UnknownQueue(String),

    #[error("Delivery {0} is not pending acknowledgement")]
    UnknownDelivery(DeliveryTag),

    #[error("Broker is closed")]
    Closed,
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        BrokerError::Channel(err.to_string())
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Operations a pipeline worker needs from the broker.
///
/// Queues are durable, non-exclusive and never auto-deleted. Publishing
/// targets the default exchange with the queue name as routing key.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Idempotently declare a durable queue.
    async fn declare_durable_queue(&self, queue: &str) -> BrokerResult<()>;

    /// Publish a body to `queue`. Returns once the broker has accepted it.
    async fn publish(&self, queue: &str, body: &[u8]) -> BrokerResult<()>;

    /// Start consuming `queue` with manual acknowledgement and at most
    /// `prefetch` unacknowledged deliveries in flight for this consumer.
    async fn consume(&self, queue: &str, prefetch: u16) -> BrokerResult<DeliveryStream>;

    async fn ack(&self, tag: DeliveryTag) -> BrokerResult<()>;

    /// Negative acknowledgement. `requeue = false` drops the message for good.
    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> BrokerResult<()>;

    /// Release the channel and connection. Unacked deliveries are returned
    /// to their queues by the broker.
    async fn close(&self) -> BrokerResult<()>;
}
