//! Purchase cost and fee schedule for a reward.
//!
//! Rates are fixed. Each component is rounded half-up to 4 places before it
//! feeds the next one, so GST is charged on the rounded brokerage.

use crate::models::FeeBreakdown;
use crate::money::{Money, MoneyError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Brokerage: 0.2% of cost
pub const BROKERAGE_RATE: Decimal = dec!(0.002);
/// Securities transaction tax: 0.1% of cost
pub const STT_RATE: Decimal = dec!(0.001);
/// GST: 18% of brokerage
pub const GST_RATE: Decimal = dec!(0.18);

/// Cost of buying `quantity` shares at `price`, with fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseCosting {
    pub cost: Money,
    pub fees: FeeBreakdown,
    pub total_outflow: Money,
}

/// Fails with `MoneyError::Overflow` when an amount leaves the decimal range.
pub fn compute(price: Money, quantity: Money) -> Result<PurchaseCosting, MoneyError> {
    let cost = price.checked_mul(quantity)?;
    let brokerage = cost.checked_mul(Money::new(BROKERAGE_RATE))?.round4();
    let stt = cost.checked_mul(Money::new(STT_RATE))?.round4();
    let gst = brokerage.checked_mul(Money::new(GST_RATE))?.round4();
    let total = brokerage.checked_add(stt)?.checked_add(gst)?.round4();
    let total_outflow = cost.checked_add(total)?.round4();

    Ok(PurchaseCosting {
        cost,
        fees: FeeBreakdown {
            brokerage,
            stt,
            gst,
            total,
        },
        total_outflow,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    #[test]
    fn test_reference_purchase() {
        let costing = compute(money("130.0000"), money("10")).unwrap();

        assert_eq!(costing.cost.to_string(), "1300.0000");
        assert_eq!(costing.fees.brokerage.to_string(), "2.6000");
        assert_eq!(costing.fees.stt.to_string(), "1.3000");
        assert_eq!(costing.fees.gst.to_string(), "0.4680");
        assert_eq!(costing.fees.total.to_string(), "4.3680");
        assert_eq!(costing.total_outflow.to_string(), "1304.3680");
    }

    #[test]
    fn test_zero_price_costs_nothing() {
        let costing = compute(Money::ZERO, money("7.5")).unwrap();

        assert!(costing.cost.is_zero());
        assert!(costing.fees.total.is_zero());
        assert!(costing.total_outflow.is_zero());
    }

    #[test]
    fn test_gst_uses_rounded_brokerage() {
        // cost 0.0125 -> brokerage 0.000025 rounds to 0.0000, so no GST
        let costing = compute(money("0.0125"), money("1")).unwrap();
        assert!(costing.fees.brokerage.is_zero());
        assert!(costing.fees.gst.is_zero());
        assert_eq!(costing.fees.stt.to_string(), "0.0000");

        // cost 25 -> brokerage 0.05, gst 0.009
        let costing = compute(money("12.5"), money("2")).unwrap();
        assert_eq!(costing.fees.brokerage.to_string(), "0.0500");
        assert_eq!(costing.fees.gst.to_string(), "0.0090");
        assert_eq!(costing.fees.stt.to_string(), "0.0250");
        assert_eq!(costing.fees.total.to_string(), "0.0840");
        assert_eq!(costing.total_outflow.to_string(), "25.0840");
    }

    #[test]
    fn test_total_outflow_is_cost_plus_fees() {
        for (price, qty) in [("101.2345", "3"), ("250.5", "0.75"), ("99.9999", "12.125")] {
            let costing = compute(money(price), money(qty)).unwrap();
            assert_eq!(
                costing.total_outflow,
                costing.cost.checked_add(costing.fees.total).unwrap().round4()
            );
            let fee_sum = costing
                .fees
                .brokerage
                .checked_add(costing.fees.stt)
                .and_then(|m| m.checked_add(costing.fees.gst))
                .unwrap();
            assert_eq!(costing.fees.total, fee_sum.round4());
        }
    }

    #[test]
    fn test_cost_outside_decimal_range_is_an_error() {
        let result = compute(money("130.0000"), money("1000000000000000000000000000"));
        assert!(matches!(result, Err(MoneyError::Overflow(_))));
    }
}
