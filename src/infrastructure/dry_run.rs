use crate::domain::payment::OutgoingRequest;
use crate::domain::ports::{PaymentNetwork, TransferReceipt};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A payment network that records transfers instead of sending them.
#[derive(Default, Clone)]
pub struct DryRunNetwork {
    transfers: Arc<RwLock<Vec<OutgoingRequest>>>,
}

impl DryRunNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transfer submitted so far, in submission order.
    pub async fn transfers(&self) -> Vec<OutgoingRequest> {
        self.transfers.read().await.clone()
    }
}

#[async_trait]
impl PaymentNetwork for DryRunNetwork {
    async fn submit(&self, request: &OutgoingRequest, _private_key: &str) -> Result<TransferReceipt> {
        let mut transfers = self.transfers.write().await;
        transfers.push(request.clone());
        Ok(TransferReceipt {
            id: Some(format!("dry-run-{}", transfers.len())),
        })
    }

    async fn balance(&self, _address: &str) -> Result<u64> {
        Ok(0)
    }
}
