pub mod buffer;
pub mod metrics;
pub mod rabbitmq;

pub use metrics::BrokerMetrics;
pub use rabbitmq::RabbitBatchConsumer;

use crate::model::MessageLike;
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::BasicAckOptions;

/// One message delivered by the broker: an opaque body, a dotted routing
/// key, and an acknowledgement handle bound to the broker session. Lifetime:
/// from delivery until the batch containing it has been ack'd or nack'd.
pub struct Message {
    body: Vec<u8>,
    routing_key: Option<String>,
    acker: Acker,
}

impl Message {
    pub(crate) fn from_delivery(delivery: Delivery) -> Self {
        let routing_key = delivery.routing_key.as_str();
        Self {
            body: delivery.data,
            routing_key: (!routing_key.is_empty()).then(|| routing_key.to_string()),
            acker: delivery.acker,
        }
    }

    /// Acknowledges this message and everything the broker delivered before
    /// it on the same channel (multi-acknowledgement).
    pub(crate) async fn multi_ack(&self) -> Result<(), lapin::Error> {
        self.acker.ack(BasicAckOptions { multiple: true }).await
    }
}

impl MessageLike for Message {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }
}
