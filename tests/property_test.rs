//! Property tests for the volatility solver and the rank statistics.

use proptest::prelude::*;
use quantx::domain::option_chain::OptionType;
use quantx::domain::option_math::{OptionParams, black_scholes_price};
use quantx::domain::volatility::{implied_vol_solve, iv_percentile, iv_rank};

fn option_type() -> impl Strategy<Value = OptionType> {
    prop_oneof![Just(OptionType::Call), Just(OptionType::Put)]
}

proptest! {
    #[test]
    fn implied_vol_recovers_pricing_vol(
        strike in 95.0f64..105.0,
        time in 0.25f64..2.0,
        vol in 0.1f64..3.0,
        kind in option_type(),
    ) {
        let price = black_scholes_price(&OptionParams::new(100.0, strike, 0.05, vol, time, kind)).unwrap();
        let solved = implied_vol_solve(price, 100.0, strike, 0.05, time, kind).unwrap();
        prop_assert!((solved - vol).abs() < 1e-4, "solved {} for {}", solved, vol);
    }

    #[test]
    fn iv_rank_bounded_and_monotonic(
        history in prop::collection::vec(0.05f64..1.5, 1..60),
        a in 0.0f64..2.0,
        b in 0.0f64..2.0,
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let rank_low = iv_rank(low, &history).unwrap();
        let rank_high = iv_rank(high, &history).unwrap();
        prop_assert!((0.0..=100.0).contains(&rank_low));
        prop_assert!((0.0..=100.0).contains(&rank_high));
        prop_assert!(rank_low <= rank_high);
    }

    #[test]
    fn iv_percentile_bounded_and_monotonic(
        history in prop::collection::vec(0.05f64..1.5, 1..60),
        a in 0.0f64..2.0,
        b in 0.0f64..2.0,
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let p_low = iv_percentile(low, &history).unwrap();
        let p_high = iv_percentile(high, &history).unwrap();
        prop_assert!((0.0..=100.0).contains(&p_low));
        prop_assert!(p_low <= p_high);
    }
}

#[test]
fn rank_of_empty_history_is_an_error() {
    assert!(iv_rank(0.2, &[]).is_err());
    assert!(iv_percentile(0.2, &[]).is_err());
}
