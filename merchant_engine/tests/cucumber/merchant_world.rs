use std::collections::HashMap;

use cucumber::World;
use merchant_engine::{
    db_types::OrderId,
    merchant_api::{
        order_objects::ClaimResponse,
        payment_objects::{
            PaymentResult,
            RefundIncreaseResult,
            RefundLookupResponse,
            RefundPermission,
            TrackTransferResponse,
        },
    },
    test_utils::{merchant::TestMerchant, wallet::TestCoin},
    MerchantError,
};

#[derive(Default, Debug, World)]
pub struct MerchantWorld {
    pub system: Option<TestMerchant>,
    pub coins: HashMap<String, TestCoin>,
    pub claims: HashMap<OrderId, ClaimResponse>,
    pub receipts: HashMap<OrderId, String>,
    pub last_payment: Option<Result<PaymentResult, MerchantError>>,
    pub permissions: HashMap<OrderId, Vec<RefundPermission>>,
    pub last_refund: Option<Result<RefundIncreaseResult, MerchantError>>,
    pub last_lookup: Option<RefundLookupResponse>,
    pub last_transfer: Option<Result<TrackTransferResponse, MerchantError>>,
}

impl MerchantWorld {
    pub fn merchant(&self) -> &TestMerchant {
        self.system.as_ref().expect("Merchant backend not initialised")
    }

    pub fn claim(&self, order_id: &OrderId) -> &ClaimResponse {
        self.claims.get(order_id).unwrap_or_else(|| panic!("Order {order_id} has not been claimed"))
    }

    pub fn coin(&self, name: &str) -> &TestCoin {
        self.coins.get(name).unwrap_or_else(|| panic!("No coin called {name}"))
    }

    pub fn payment_error(&self) -> &MerchantError {
        match self.last_payment.as_ref().expect("No payment was made") {
            Err(e) => e,
            Ok(result) => panic!("Expected the payment to fail, but got {result:?}"),
        }
    }
}
