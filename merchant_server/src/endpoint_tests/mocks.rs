use std::sync::Arc;

use mint_client::{
    DepositConfirmation,
    DepositQuery,
    DepositRequest,
    MintApi,
    MintApiError,
    RefundQuery,
    RefundStatus,
    TrackDepositResult,
    TransferDetails,
};
use mockall::mock;

mock! {
    pub Mint {}
    impl MintApi for Mint {
        async fn deposit(&self, mint_base_url: &str, request: &DepositRequest) -> Result<DepositConfirmation, MintApiError>;
        async fn refund_status(&self, mint_base_url: &str, query: &RefundQuery) -> Result<RefundStatus, MintApiError>;
        async fn track_deposit(&self, mint_base_url: &str, query: &DepositQuery) -> Result<TrackDepositResult, MintApiError>;
        async fn track_transfer(&self, mint_base_url: &str, wtid: &str) -> Result<TransferDetails, MintApiError>;
    }
}

/// Every worker of the test app gets a clone, and all of them must see the same expectations.
#[derive(Clone)]
pub struct SharedMint(pub Arc<MockMint>);

impl SharedMint {
    pub fn new(mock: MockMint) -> Self {
        Self(Arc::new(mock))
    }

    /// A mint that must not be called at all.
    pub fn untouched() -> Self {
        Self::new(MockMint::new())
    }
}

impl MintApi for SharedMint {
    async fn deposit(&self, mint_base_url: &str, request: &DepositRequest) -> Result<DepositConfirmation, MintApiError> {
        self.0.deposit(mint_base_url, request).await
    }

    async fn refund_status(&self, mint_base_url: &str, query: &RefundQuery) -> Result<RefundStatus, MintApiError> {
        self.0.refund_status(mint_base_url, query).await
    }

    async fn track_deposit(&self, mint_base_url: &str, query: &DepositQuery) -> Result<TrackDepositResult, MintApiError> {
        self.0.track_deposit(mint_base_url, query).await
    }

    async fn track_transfer(&self, mint_base_url: &str, wtid: &str) -> Result<TransferDetails, MintApiError> {
        self.0.track_transfer(mint_base_url, wtid).await
    }
}
