//! Pure arithmetic for payments and refunds. Nothing in here touches the store or the mint.
use std::cmp::Ordering;

use merchant_common::{Amount, AmountError};
use thiserror::Error;

/// What the merchant is credited with for a set of deposits.
///
/// Deposit fees up to `max_fee` are absorbed by the merchant. Anything above that is the customer's to cover, so it is
/// deducted from the value the coins contribute:
///
/// `credited = Σ amount_with_fee − max(0, Σ deposit_fee − max_fee)`
pub fn credited_value<'a, I>(currency: &str, max_fee: &Amount, deposits: I) -> Result<Amount, AmountError>
where I: IntoIterator<Item = (&'a Amount, &'a Amount)> {
    let (with_fee, fees) = deposits.into_iter().try_fold(
        (Amount::zero(currency)?, Amount::zero(currency)?),
        |(total, fees), (with_fee, fee)| Ok::<_, AmountError>((total.checked_add(with_fee)?, fees.checked_add(fee)?)),
    )?;
    let excess_fee = fees.sub_or_zero(max_fee)?;
    with_fee.sub_or_zero(&excess_fee)
}

/// True when the deposits cover `amount` under the fee policy of [`credited_value`].
pub fn is_sufficient<'a, I>(amount: &Amount, max_fee: &Amount, deposits: I) -> Result<bool, AmountError>
where I: IntoIterator<Item = (&'a Amount, &'a Amount)> {
    let credited = credited_value(amount.currency(), max_fee, deposits)?;
    Ok(credited.cmp_amount(amount)? != Ordering::Less)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefundDistributionError {
    #[error("The refund exceeds the refundable amount by {0}")]
    ExceedsPayment(Amount),
    #[error("{0}")]
    Amount(#[from] AmountError),
}

/// The refund position of one deposited coin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinRefundable {
    pub coin_pub: String,
    pub deposited: Amount,
    pub refunded: Amount,
    /// The highest rtransaction_id issued for this coin so far, 0 if none.
    pub max_rtransaction_id: i64,
}

/// A slice of a refund assigned to a single coin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundShare {
    pub coin_pub: String,
    pub amount: Amount,
    pub rtransaction_id: i64,
}

/// Spreads `delta` over the coins in ascending `(deposited, coin_pub)` order, filling each coin up to what is left to
/// refund on it before moving on. Each touched coin gets the next rtransaction_id in its sequence.
pub fn distribute_refund(
    delta: &Amount,
    coins: &[CoinRefundable],
) -> Result<Vec<RefundShare>, RefundDistributionError> {
    let mut ordered = coins.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| {
        a.deposited.cmp_amount(&b.deposited).unwrap_or(Ordering::Equal).then_with(|| a.coin_pub.cmp(&b.coin_pub))
    });
    let mut remaining = delta.clone();
    let mut shares = Vec::new();
    for coin in ordered {
        if remaining.is_zero() {
            break;
        }
        let available = coin.deposited.sub_or_zero(&coin.refunded)?;
        if available.is_zero() {
            continue;
        }
        let amount = available.min_amount(&remaining)?;
        remaining = remaining.checked_sub(&amount)?;
        shares.push(RefundShare {
            coin_pub: coin.coin_pub.clone(),
            amount,
            rtransaction_id: coin.max_rtransaction_id + 1,
        });
    }
    if remaining.is_zero() {
        Ok(shares)
    } else {
        Err(RefundDistributionError::ExceedsPayment(remaining))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn eur(s: &str) -> Amount {
        format!("EUR:{s}").parse().unwrap()
    }

    fn coin(id: &str, deposited: &str, refunded: &str, rtid: i64) -> CoinRefundable {
        CoinRefundable {
            coin_pub: id.to_string(),
            deposited: eur(deposited),
            refunded: eur(refunded),
            max_rtransaction_id: rtid,
        }
    }

    #[test]
    fn merchant_absorbs_fees_up_to_max_fee() {
        let (five, fee) = (eur("5"), eur("0.01"));
        assert!(is_sufficient(&eur("5"), &eur("0.1"), [(&five, &fee)]).unwrap());
        assert!(!is_sufficient(&eur("5"), &eur("0"), [(&five, &fee)]).unwrap());
        assert_eq!(credited_value("EUR", &eur("0"), [(&five, &fee)]).unwrap(), eur("4.99"));
        assert!(!is_sufficient(&eur("10"), &eur("0.1"), [(&five, &fee)]).unwrap());
        assert!(is_sufficient(&eur("0"), &eur("0"), std::iter::empty()).unwrap());
    }

    #[test]
    fn refunds_fill_small_coins_first() {
        let coins = vec![coin("b", "5", "0", 0), coin("a", "2", "0", 3), coin("c", "2", "1.5", 1)];
        let shares = distribute_refund(&eur("3"), &coins).unwrap();
        assert_eq!(shares, vec![
            RefundShare { coin_pub: "a".into(), amount: eur("2"), rtransaction_id: 4 },
            RefundShare { coin_pub: "c".into(), amount: eur("0.5"), rtransaction_id: 2 },
            RefundShare { coin_pub: "b".into(), amount: eur("0.5"), rtransaction_id: 1 },
        ]);
    }

    #[test]
    fn refunds_cannot_exceed_deposits() {
        let coins = vec![coin("a", "5", "4.9", 1)];
        let err = distribute_refund(&eur("0.2"), &coins).unwrap_err();
        assert_eq!(err, RefundDistributionError::ExceedsPayment(eur("0.1")));
        assert!(distribute_refund(&eur("0"), &coins).unwrap().is_empty());
    }
}
