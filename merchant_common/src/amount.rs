use std::{cmp::Ordering, fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef},
    Decode,
    Encode,
    Sqlite,
    Type,
};
use thiserror::Error;

/// The number of fractional units in one unit of currency.
pub const FRACTION_BASE: u32 = 100_000_000;
/// Amounts larger than this cannot be represented exactly by JSON number parsers, so they are rejected.
pub const MAX_AMOUNT_VALUE: u64 = 1 << 52;
const FRACTION_DIGITS: usize = 8;
const MAX_CURRENCY_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Invalid amount string: {0}")]
    InvalidFormat(String),
    #[error("Currency mismatch: {0} vs {1}")]
    CurrencyMismatch(String, String),
    #[error("Amount overflow")]
    Overflow,
    #[error("Amount would become negative")]
    Negative,
}

//--------------------------------------       Amount        ---------------------------------------------------------
/// A monetary value in a single currency.
///
/// The value is stored as whole units plus a fraction in units of `1/FRACTION_BASE`. Currency codes are normalised to
/// upper case when parsed, so `eur:1` and `EUR:1` are the same amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount {
    currency: String,
    value: u64,
    fraction: u32,
}

impl Amount {
    pub fn new(currency: &str, value: u64, fraction: u32) -> Result<Self, AmountError> {
        let currency = normalise_currency(currency)?;
        let carry = u64::from(fraction / FRACTION_BASE);
        let value = value.checked_add(carry).ok_or(AmountError::Overflow)?;
        if value > MAX_AMOUNT_VALUE {
            return Err(AmountError::Overflow);
        }
        Ok(Self { currency, value, fraction: fraction % FRACTION_BASE })
    }

    pub fn zero(currency: &str) -> Result<Self, AmountError> {
        Self::new(currency, 0, 0)
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn fraction(&self) -> u32 {
        self.fraction
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0 && self.fraction == 0
    }

    pub fn same_currency(&self, other: &Amount) -> bool {
        self.currency == other.currency
    }

    /// A zero amount in the same currency as `self`.
    pub fn to_zero(&self) -> Amount {
        Amount { currency: self.currency.clone(), value: 0, fraction: 0 }
    }

    fn check_currency(&self, other: &Amount) -> Result<(), AmountError> {
        if self.same_currency(other) {
            Ok(())
        } else {
            Err(AmountError::CurrencyMismatch(self.currency.clone(), other.currency.clone()))
        }
    }

    fn as_fractions(&self) -> u128 {
        u128::from(self.value) * u128::from(FRACTION_BASE) + u128::from(self.fraction)
    }

    fn from_fractions(currency: &str, total: u128) -> Result<Self, AmountError> {
        let base = u128::from(FRACTION_BASE);
        let value = u64::try_from(total / base).map_err(|_| AmountError::Overflow)?;
        #[allow(clippy::cast_possible_truncation)]
        let fraction = (total % base) as u32;
        if value > MAX_AMOUNT_VALUE {
            return Err(AmountError::Overflow);
        }
        Ok(Self { currency: currency.to_string(), value, fraction })
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.check_currency(other)?;
        Self::from_fractions(&self.currency, self.as_fractions() + other.as_fractions())
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.check_currency(other)?;
        let total = self.as_fractions().checked_sub(other.as_fractions()).ok_or(AmountError::Negative)?;
        Self::from_fractions(&self.currency, total)
    }

    /// `self - other`, or zero when `other` is larger than `self`.
    pub fn sub_or_zero(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.check_currency(other)?;
        let total = self.as_fractions().saturating_sub(other.as_fractions());
        Self::from_fractions(&self.currency, total)
    }

    pub fn cmp_amount(&self, other: &Amount) -> Result<Ordering, AmountError> {
        self.check_currency(other)?;
        Ok(self.as_fractions().cmp(&other.as_fractions()))
    }

    /// The smaller of the two amounts. Both must share a currency.
    pub fn min_amount(&self, other: &Amount) -> Result<Amount, AmountError> {
        match self.cmp_amount(other)? {
            Ordering::Greater => Ok(other.clone()),
            _ => Ok(self.clone()),
        }
    }

    /// Adds up all the amounts in `amounts`. An empty iterator yields zero in `currency`.
    pub fn sum<'a, I>(currency: &str, amounts: I) -> Result<Amount, AmountError>
    where I: IntoIterator<Item = &'a Amount> {
        amounts.into_iter().try_fold(Amount::zero(currency)?, |acc, a| acc.checked_add(a))
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.cmp_amount(other).ok()
    }
}

fn normalise_currency(currency: &str) -> Result<String, AmountError> {
    let valid = !currency.is_empty()
        && currency.len() <= MAX_CURRENCY_LEN
        && currency.chars().all(|c| c.is_ascii_alphabetic());
    if valid {
        Ok(currency.to_ascii_uppercase())
    } else {
        Err(AmountError::InvalidFormat(format!("'{currency}' is not a valid currency code")))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (currency, number) =
            s.split_once(':').ok_or_else(|| AmountError::InvalidFormat(format!("'{s}' has no currency separator")))?;
        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        let digits_ok = |v: &str| v.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !digits_ok(whole) || !digits_ok(frac) || frac.len() > FRACTION_DIGITS {
            return Err(AmountError::InvalidFormat(s.to_string()));
        }
        if number.ends_with('.') {
            return Err(AmountError::InvalidFormat(s.to_string()));
        }
        let value = whole.parse::<u64>().map_err(|_| AmountError::InvalidFormat(s.to_string()))?;
        let fraction = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = FRACTION_DIGITS);
            padded.parse::<u32>().map_err(|_| AmountError::InvalidFormat(s.to_string()))?
        };
        Amount::new(currency, value, fraction)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.fraction == 0 {
            return write!(f, "{}:{}", self.currency, self.value);
        }
        let frac = format!("{:0width$}", self.fraction, width = FRACTION_DIGITS);
        write!(f, "{}:{}.{}", self.currency, self.value, frac.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// Amounts are stored in their canonical string form, so that they survive a round trip through the database exactly.
impl Type<Sqlite> for Amount {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for Amount {
    fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> IsNull {
        <String as Encode<'q, Sqlite>>::encode(self.to_string(), buf)
    }
}

impl<'r> Decode<'r, Sqlite> for Amount {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as Decode<Sqlite>>::decode(value)?;
        Ok(s.parse::<Amount>()?)
    }
}
