//! Per-token pricing.

use domain::{TokenCost, TokenCount, UsageInfo};

/// USD price per 1,000 tokens, split by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    /// Price of 1,000 prompt tokens.
    pub input_per_1k: f64,
    /// Price of 1,000 completion tokens.
    pub output_per_1k: f64,
}

impl Pricing {
    /// Creates a pricing table.
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Cost of a call with the given token counts.
    ///
    /// A non-finite or negative result (from a misconfigured table) is
    /// reported as zero.
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> TokenCost {
        let cost = prompt_tokens as f64 / 1000.0 * self.input_per_1k
            + completion_tokens as f64 / 1000.0 * self.output_per_1k;
        TokenCost::new(cost).unwrap_or_else(TokenCost::zero)
    }

    /// Builds the [`UsageInfo`] for a call, priced with this table.
    pub fn usage(&self, prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> UsageInfo {
        UsageInfo {
            prompt_tokens: TokenCount::new(prompt_tokens),
            completion_tokens: TokenCount::new(completion_tokens),
            total_tokens: TokenCount::new(total_tokens),
            cost: self.cost(prompt_tokens, completion_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_priced_per_thousand_tokens() {
        let pricing = Pricing::new(0.5, 1.5);
        let cost = pricing.cost(2000, 1000).as_f64();
        assert!((cost - 2.5).abs() < 1e-9);
    }

    #[test]
    fn total_is_taken_as_reported() {
        let usage = Pricing::default().usage(5, 10, 16);
        assert_eq!(usage.total_tokens.as_u64(), 16);
        assert!(usage.cost.is_zero());
    }

    #[test]
    fn negative_prices_degrade_to_zero() {
        assert!(Pricing::new(-1.0, 0.0).cost(1000, 0).is_zero());
    }
}
