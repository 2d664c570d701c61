use chrono::Utc;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Generates a date-stamped order id such as `2024.123-01HN5Q3Z8W4XT`.
///
/// The random suffix makes collisions within an instance vanishingly unlikely; the store's unique constraint catches
/// the rest.
pub fn new_order_id() -> String {
    let date = Utc::now().format("%Y.%j");
    format!("{date}-{}", crockford_base32(rand::random::<u64>()))
}

fn crockford_base32(mut v: u64) -> String {
    let mut chars = [b'0'; 13];
    for c in chars.iter_mut().rev() {
        *c = CROCKFORD[(v & 0x1f) as usize];
        v >>= 5;
    }
    chars.iter().map(|&c| c as char).collect()
}
