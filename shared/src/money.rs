//! Money calculation utilities using rust_decimal for precision
//!
//! All calculations are done using `Decimal` internally, then converted
//! to `f64` for storage/serialization.

use rust_decimal::prelude::*;

use crate::models::OrderItem;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Convert f64 to Decimal for precise arithmetic.
///
/// Non-finite input is a programming error upstream; it is logged and
/// treated as zero rather than poisoning the whole calculation.
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!(value = ?value, "Non-finite f64 in monetary calculation, defaulting to zero");
        Decimal::ZERO
    })
}

/// Convert Decimal back to f64, rounded to 2 decimal places.
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .expect("Decimal rounded to 2dp is always representable as f64")
}

/// Compare two monetary values within MONEY_TOLERANCE.
pub fn money_eq(a: f64, b: f64) -> bool {
    let diff = (to_decimal(a) - to_decimal(b)).abs();
    diff < MONEY_TOLERANCE
}

/// Price of one unit of an item: base price plus its additions.
///
/// Additions carry their own quantity and are priced per product unit.
pub fn unit_total(item: &OrderItem) -> Decimal {
    let additions: Decimal = item
        .additions
        .iter()
        .map(|a| to_decimal(a.unit_price) * Decimal::from(a.quantity))
        .sum();

    (to_decimal(item.unit_price) + additions).max(Decimal::ZERO)
}

/// Line total for an item: unit total times quantity, rounded.
pub fn line_total(item: &OrderItem) -> Decimal {
    (unit_total(item) * Decimal::from(item.quantity))
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Order total: sum of line totals plus the delivery fee, rounded.
pub fn order_total(items: &[OrderItem], delivery_fee: f64) -> Decimal {
    let items_total: Decimal = items.iter().map(line_total).sum();

    (items_total + to_decimal(delivery_fee))
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemAddition;

    fn item(unit_price: f64, quantity: i32, additions: Vec<ItemAddition>) -> OrderItem {
        OrderItem {
            product_id: 1,
            name: "Test".to_string(),
            unit_price,
            quantity,
            note: None,
            additions,
        }
    }

    fn addition(unit_price: f64, quantity: i32) -> ItemAddition {
        ItemAddition {
            id: 1,
            name: "Extra".to_string(),
            unit_price,
            quantity,
        }
    }

    #[test]
    fn test_money_eq_tolerance() {
        assert!(money_eq(10.0, 10.0));
        assert!(money_eq(10.0, 10.005));
        assert!(!money_eq(10.0, 10.01));
        assert!(!money_eq(10.0, 10.02));
    }

    #[test]
    fn test_float_sum_does_not_drift() {
        // 0.1 + 0.2 style drift must not leak into totals
        let items = vec![item(0.1, 1, vec![]), item(0.2, 1, vec![])];
        assert_eq!(order_total(&items, 0.0), Decimal::new(30, 2));
    }

    #[test]
    fn test_line_total_with_additions() {
        // (8.50 + 1.25×2) × 3 = 33.00
        let it = item(8.5, 3, vec![addition(1.25, 2)]);
        assert_eq!(line_total(&it), Decimal::new(3300, 2));
    }

    #[test]
    fn test_order_total_includes_delivery_fee() {
        let items = vec![item(10.0, 2, vec![]), item(5.5, 1, vec![])];
        assert_eq!(order_total(&items, 7.0), Decimal::new(3250, 2));
    }

    #[test]
    fn test_non_finite_defaults_to_zero() {
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
        assert_eq!(to_decimal(f64::INFINITY), Decimal::ZERO);
    }

    #[test]
    fn test_to_f64_rounds_midpoint_away_from_zero() {
        assert_eq!(to_f64(Decimal::new(10125, 3)), 10.13);
        assert_eq!(to_f64(Decimal::new(-10125, 3)), -10.13);
    }
}
