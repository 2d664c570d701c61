//! The wallet side of the protocol, just enough of it to pay for contracts in tests.
use merchant_common::Amount;

use crate::{
    db_types::ContractTerms,
    helpers::{DenominationStatement, DepositPermissionStatement, MerchantKeys, SignedPurpose},
    merchant_api::{order_objects::ClaimResponse, payment_objects::CoinPermission},
};

/// A fresh claim nonce.
pub fn new_nonce() -> String {
    MerchantKeys::random().public_hex()
}

/// A denomination key. Coins "withdrawn" from it carry its signature.
#[derive(Debug)]
pub struct Denomination {
    keys: MerchantKeys,
    pub value: Amount,
}

impl Denomination {
    pub fn new(value: Amount) -> Self {
        Self { keys: MerchantKeys::random(), value }
    }

    pub fn denom_pub(&self) -> String {
        self.keys.public_hex()
    }

    pub fn withdraw(&self) -> TestCoin {
        let keys = MerchantKeys::random();
        let coin_pub = keys.public_hex();
        let denom_sig = DenominationStatement { coin_pub: &coin_pub }
            .sign_hex(self.keys.secret())
            .expect("Could not sign a coin");
        TestCoin { keys, denom_pub: self.denom_pub(), denom_sig, value: self.value.clone() }
    }
}

#[derive(Debug)]
pub struct TestCoin {
    keys: MerchantKeys,
    pub denom_pub: String,
    pub denom_sig: String,
    pub value: Amount,
}

impl TestCoin {
    pub fn coin_pub(&self) -> String {
        self.keys.public_hex()
    }

    /// A deposit permission for `claim`, spending the whole coin with the given fees.
    pub fn pay(
        &self,
        claim: &ClaimResponse,
        mint_url: &str,
        deposit_fee: &Amount,
        refund_fee: &Amount,
    ) -> CoinPermission {
        let amount_without_fee = self.value.checked_sub(deposit_fee).expect("The fee exceeds the coin value");
        self.permission(claim, mint_url, &self.value, &amount_without_fee, refund_fee)
    }

    pub fn permission(
        &self,
        claim: &ClaimResponse,
        mint_url: &str,
        amount_with_fee: &Amount,
        amount_without_fee: &Amount,
        refund_fee: &Amount,
    ) -> CoinPermission {
        let terms = contract_terms(claim);
        let coin_pub = self.coin_pub();
        let coin_sig = DepositPermissionStatement {
            h_contract: &claim.h_contract,
            h_wire: &terms.h_wire,
            amount_with_fee,
            amount_without_fee,
            refund_fee,
            coin_pub: &coin_pub,
            merchant_pub: &terms.merchant_pub,
            timestamp: terms.timestamp,
            refund_deadline: terms.refund_deadline,
        }
        .sign_hex(self.keys.secret())
        .expect("Could not sign a deposit permission");
        CoinPermission {
            coin_pub,
            denom_pub: self.denom_pub.clone(),
            denom_sig: self.denom_sig.clone(),
            amount_with_fee: amount_with_fee.clone(),
            amount_without_fee: amount_without_fee.clone(),
            refund_fee: refund_fee.clone(),
            mint_url: mint_url.to_string(),
            coin_sig,
        }
    }
}

pub fn contract_terms(claim: &ClaimResponse) -> ContractTerms {
    serde_json::from_value(claim.contract_terms.clone()).expect("Claimed contract does not parse")
}
