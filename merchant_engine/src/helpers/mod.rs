mod canonical_json;
mod order_id;
mod payment_math;
mod signatures;
mod wire;

pub use canonical_json::{canonical_json, canonicalize, hash_bytes, hash_canonical};
pub use order_id::new_order_id;
pub use payment_math::{
    credited_value,
    distribute_refund,
    is_sufficient,
    CoinRefundable,
    RefundDistributionError,
    RefundShare,
};
pub use signatures::{
    parse_public_key,
    ContractStatement,
    CryptoError,
    DenominationStatement,
    DepositPermissionStatement,
    MerchantKeys,
    PaymentOkStatement,
    PurposeSignature,
    RefundApprovalStatement,
    RefundOkStatement,
    SignaturePayload,
    SignaturePurpose,
    SignedPurpose,
    TransferStatement,
    WireDepositStatement,
};
pub use wire::{h_wire, new_account, random_salt, same_account, wire_method};
