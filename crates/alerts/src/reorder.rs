//! Reorder sizing.
//!
//! All arithmetic is integral and truncates toward zero, so results are
//! reproducible bit-for-bit across platforms.

use serde::{Deserialize, Serialize};

/// Price (in cents) above which a product is treated as high value.
pub const DEFAULT_HIGH_VALUE_PRICE_CENTS: u64 = 100_000;

/// Parameters for sizing reorder suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPolicy {
    /// Strictly greater prices get the 1.5x uplift on the base level.
    pub high_value_price_cents: u64,
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        Self {
            high_value_price_cents: DEFAULT_HIGH_VALUE_PRICE_CENTS,
        }
    }
}

/// Computed target level and order size for one product/warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderSuggestion {
    pub optimal_stock_level: i64,
    pub suggested_reorder_quantity: i64,
}

impl ReorderPolicy {
    /// `max(threshold * 3 (x1.5 for high value), threshold * 2)`.
    pub fn optimal_stock_level(&self, threshold: i64, unit_price_cents: u64) -> i64 {
        let mut base = threshold * 3;
        if unit_price_cents > self.high_value_price_cents {
            base = base * 3 / 2;
        }
        base.max(threshold * 2)
    }

    /// Deficit to the optimal level plus a 20% buffer, never below one unit.
    pub fn suggested_reorder_quantity(&self, optimal_stock_level: i64, current_stock: i64) -> i64 {
        let deficit = optimal_stock_level - current_stock;
        let buffer = deficit / 5;
        (deficit + buffer).max(1)
    }

    pub fn suggest(
        &self,
        threshold: i64,
        unit_price_cents: u64,
        current_stock: i64,
    ) -> ReorderSuggestion {
        let optimal_stock_level = self.optimal_stock_level(threshold, unit_price_cents);
        ReorderSuggestion {
            optimal_stock_level,
            suggested_reorder_quantity: self
                .suggested_reorder_quantity(optimal_stock_level, current_stock),
        }
    }
}
