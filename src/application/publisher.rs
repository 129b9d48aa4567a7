use crate::domain::directive::{self, Directive};
use crate::domain::idempotency::derive_key;
use crate::domain::payment::{IncomingPayment, OutgoingRequest};
use crate::domain::ports::{PublishAck, RequestQueueRef};
use crate::error::Result;
use tracing::{debug, info};

/// Turns decisions about a source payment into queued outgoing requests.
///
/// Every request is keyed on `(source payment id, destination)`, so running the
/// same decision again after a crash or redelivery is absorbed by the queue.
#[derive(Clone)]
pub struct RequestPublisher {
    queue: RequestQueueRef,
}

impl RequestPublisher {
    pub fn new(queue: RequestQueueRef) -> Self {
        Self { queue }
    }

    /// Enqueues a payment of `amount` to `destination` funded by `source`.
    pub async fn publish(
        &self,
        source: &IncomingPayment,
        destination: &str,
        amount: u64,
        meta: Option<&Directive>,
    ) -> Result<PublishAck> {
        let key = derive_key(&source.id, destination);
        let request = OutgoingRequest::new(destination, amount, directive::encode(meta))?;

        let ack = self.queue.publish(&request, key).await?;
        if ack.duplicate {
            debug!(source = %source.id, to = destination, %key, "outgoing request already queued");
        } else {
            info!(source = %source.id, to = destination, amount, %key, "queued outgoing request");
        }
        Ok(ack)
    }

    /// Sends `partial` (or the whole payment) back to the payer.
    ///
    /// The destination is the `return` address from the source metadata when
    /// present, otherwise the sending address. Returns `None` when there is
    /// nothing to send back.
    pub async fn refund(
        &self,
        source: &IncomingPayment,
        meta: Option<&Directive>,
        partial: Option<u64>,
    ) -> Result<Option<PublishAck>> {
        let source_meta = Directive::decode(source.metadata.as_deref());
        let destination = source_meta
            .return_to
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&source.from);
        let amount = partial.unwrap_or(source.value);

        if amount == 0 {
            info!(source = %source.id, "nothing to refund");
            return Ok(None);
        }

        info!(source = %source.id, to = destination, amount, "refunding payment");
        self.publish(source, destination, amount, meta).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryQueue;
    use std::sync::Arc;

    fn payment(metadata: Option<&str>) -> IncomingPayment {
        IncomingPayment {
            id: "42".to_string(),
            from: "kpayer0001".to_string(),
            to: "ksoak00000".to_string(),
            value: 75,
            sent_name: "soak".to_string(),
            metadata: metadata.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_publish_encodes_metadata() {
        let queue = InMemoryQueue::new();
        let publisher = RequestPublisher::new(Arc::new(queue.clone()));

        publisher
            .publish(&payment(None), "kdest00001", 10, Some(&Directive::with_message("hi")))
            .await
            .unwrap();

        let requests = queue.pending_requests().await.unwrap();
        assert_eq!(
            requests,
            vec![OutgoingRequest::new("kdest00001", 10, Some("message=hi".to_string())).unwrap()]
        );
    }

    #[tokio::test]
    async fn test_republishing_is_deduplicated() {
        let queue = InMemoryQueue::new();
        let publisher = RequestPublisher::new(Arc::new(queue.clone()));
        let source = payment(None);

        let first = publisher.publish(&source, "kdest00001", 10, None).await.unwrap();
        let second = publisher.publish(&source, "kdest00001", 10, None).await.unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(queue.pending_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refund_defaults_to_sender_and_full_value() {
        let queue = InMemoryQueue::new();
        let publisher = RequestPublisher::new(Arc::new(queue.clone()));

        let ack = publisher
            .refund(&payment(None), Some(&Directive::with_error("nope")), None)
            .await
            .unwrap();
        assert!(ack.is_some());

        let requests = queue.pending_requests().await.unwrap();
        assert_eq!(requests[0].to, "kpayer0001");
        assert_eq!(requests[0].amount, 75);
        assert_eq!(requests[0].meta.as_deref(), Some("error=nope"));
    }

    #[tokio::test]
    async fn test_refund_honours_return_address_and_partial_amount() {
        let queue = InMemoryQueue::new();
        let publisher = RequestPublisher::new(Arc::new(queue.clone()));

        publisher
            .refund(&payment(Some("soak.kst;return=kreturn001")), None, Some(3))
            .await
            .unwrap();

        let requests = queue.pending_requests().await.unwrap();
        assert_eq!(requests[0].to, "kreturn001");
        assert_eq!(requests[0].amount, 3);
        assert_eq!(requests[0].meta, None);
    }

    #[tokio::test]
    async fn test_zero_refund_is_skipped() {
        let queue = InMemoryQueue::new();
        let publisher = RequestPublisher::new(Arc::new(queue.clone()));
        let mut source = payment(None);
        source.value = 0;

        let ack = publisher.refund(&source, None, None).await.unwrap();
        assert!(ack.is_none());
        assert!(queue.pending_requests().await.unwrap().is_empty());
    }
}
