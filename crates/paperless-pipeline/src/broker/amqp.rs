//! RabbitMQ broker over AMQP 0-9-1
//!
//! One connection and one channel per worker process. Publisher confirms are
//! enabled on the channel, so `publish` only returns `Ok` once the broker has
//! taken responsibility for the message.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::fmt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{BrokerError, BrokerResult, Delivery, DeliveryStream, DeliveryTag, MessageBroker};
use crate::config::{optional, parse_or, require, ConfigResult};

/// AMQP reply code for a normal close
const REPLY_SUCCESS: u16 = 200;

/// Persistent delivery mode, survives a broker restart together with the durable queue
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Default AMQP port
pub const DEFAULT_BROKER_PORT: u16 = 5672;

/// Connection settings for RabbitMQ
#[derive(Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    /// Shown in the RabbitMQ management UI, e.g. "ocr-worker"
    pub connection_name: String,
}

impl BrokerConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_BROKER_PORT,
            user: user.into(),
            password: password.into(),
            vhost: "/".to_string(),
            connection_name: "paperless-pipeline".to_string(),
        }
    }

    /// `RABBITMQ_HOST`, `RABBITMQ_USER` and `RABBITMQ_PASSWORD` are required.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::new(
            require("RABBITMQ_HOST")?,
            require("RABBITMQ_USER")?,
            require("RABBITMQ_PASSWORD")?,
        );
        config.port = parse_or("RABBITMQ_PORT", DEFAULT_BROKER_PORT)?;
        config.vhost = optional("RABBITMQ_VHOST", "/");
        Ok(config)
    }

    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    /// AMQP URI with credentials and vhost percent-encoded.
    pub fn uri(&self) -> String {
        let vhost = match self.vhost.as_str() {
            "/" | "" => "%2f".to_string(),
            other => urlencoding::encode(other.trim_start_matches('/')).into_owned(),
        };
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            vhost
        )
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

/// RabbitMQ-backed [`MessageBroker`]
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    consumer_prefix: String,
}

impl AmqpBroker {
    /// Open the connection and the worker's single channel.
    ///
    /// Failure here is an infrastructure failure: the caller should exit and
    /// leave the restart to the process supervisor.
    #[instrument(skip(config), fields(host = %config.host, port = config.port))]
    pub async fn connect(config: &BrokerConfig) -> BrokerResult<Self> {
        debug!("Connecting to broker with config: {:?}", config);

        let properties = ConnectionProperties::default()
            .with_connection_name(config.connection_name.clone().into());

        let connection = Connection::connect(&config.uri(), properties)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        info!(
            connection_name = %config.connection_name,
            "Broker connection established"
        );

        Ok(Self {
            connection,
            channel,
            consumer_prefix: format!("{}@{}", config.connection_name, host),
        })
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    #[instrument(skip(self))]
    async fn declare_durable_queue(&self, queue: &str) -> BrokerResult<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        debug!(queue, "Declared durable queue");
        Ok(())
    }

    #[instrument(skip(self, body), fields(bytes = body.len()))]
    async fn publish(&self, queue: &str, body: &[u8]) -> BrokerResult<()> {
        let properties = BasicProperties::default()
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_content_type("application/json".into());

        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions {
                    mandatory: false,
                    ..BasicPublishOptions::default()
                },
                body,
                properties,
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(BrokerError::PublishRejected {
                queue: queue.to_string(),
            });
        }

        debug!(queue, "Message confirmed by broker");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn consume(&self, queue: &str, prefetch: u16) -> BrokerResult<DeliveryStream> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("{}-{}", self.consumer_prefix, Uuid::new_v4());
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, consumer_tag = %consumer_tag, prefetch, "Consuming queue");

        let deliveries = consumer.map(|result| {
            result
                .map(|delivery| Delivery {
                    tag: delivery.delivery_tag,
                    body: delivery.data,
                    redelivered: delivery.redelivered,
                })
                .map_err(BrokerError::from)
        });

        Ok(deliveries.boxed())
    }

    async fn ack(&self, tag: DeliveryTag) -> BrokerResult<()> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> BrokerResult<()> {
        self.channel
            .basic_nack(
                tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "worker shutdown").await {
            warn!(error = %e, "Failed to close broker channel cleanly");
        }

        self.connection
            .close(REPLY_SUCCESS, "worker shutdown")
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        info!("Broker connection closed");
        Ok(())
    }
}
