// src/aggregate.rs

use crate::numeric::{Sign, parse_numeric};
use crate::record::OrderRecord;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashSet;

/// Summary figures over a set of orders. Always derived, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub total_weight: Decimal,
    pub total_deduction: Decimal,
    pub total_paid: Decimal,
    pub unique_customers: usize,
    pub total_orders: usize,
}

impl AggregateStats {
    /// Kilograms, one decimal place.
    pub fn weight_display(&self) -> String {
        format!("{:.1}", round_half_up(self.total_weight, 1))
    }

    /// Money, two decimal places.
    pub fn paid_display(&self) -> String {
        format!("{:.2}", round_half_up(self.total_paid, 2))
    }

    pub fn deduction_display(&self) -> String {
        format!("{:.2}", round_half_up(self.total_deduction, 2))
    }
}

// `{:.N}` on a Decimal truncates.
fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Fold every record into totals. Unparseable fields count as zero, and the
/// result does not depend on record order. Sums clamp at `Decimal::MAX`
/// (or `MIN` for deductions) instead of overflowing.
pub fn aggregate<'a, I>(records: I) -> AggregateStats
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    let mut stats = AggregateStats::default();
    let mut customers: HashSet<&str> = HashSet::new();

    for record in records {
        stats.total_weight = stats
            .total_weight
            .saturating_add(parse_numeric(&record.weight, Sign::Unsigned));
        stats.total_deduction = stats
            .total_deduction
            .saturating_add(parse_numeric(&record.total_deduction, Sign::Signed));
        stats.total_paid = stats
            .total_paid
            .saturating_add(parse_numeric(&record.client_total_paid, Sign::Unsigned));
        if !record.customer_name.is_empty() {
            customers.insert(&record.customer_name);
        }
        stats.total_orders += 1;
    }

    stats.unique_customers = customers.len();
    stats
}

/// One bar of the per-order weight chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeightPoint {
    /// First word of the customer name.
    pub label: String,
    /// `"{order number} - {customer name}"`.
    pub full_label: String,
    pub weight: Decimal,
}

pub fn weight_series<'a, I>(records: I) -> Vec<WeightPoint>
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    records
        .into_iter()
        .map(|record| WeightPoint {
            label: record
                .customer_name
                .split(' ')
                .next()
                .unwrap_or_default()
                .to_string(),
            full_label: format!("{} - {}", record.order_number, record.customer_name),
            weight: parse_numeric(&record.weight, Sign::Unsigned),
        })
        .collect()
}
